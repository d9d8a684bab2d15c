use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("reference invariant violated: {0}")]
    InvalidReferenceState(String),

    #[error("unknown reference type: {0}")]
    UnknownReferenceType(String),

    #[error("unknown card type: {0}")]
    UnknownCardType(String),
}
