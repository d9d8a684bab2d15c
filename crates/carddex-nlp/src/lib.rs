//! # carddex-nlp
//!
//! Text layer for CardDex.
//!
//! - [`normalize`]: tokenization, suffix stemming, card field normalization
//! - [`fingerprint`]: top-N TF-IDF term profiles and overlap scoring
//! - [`query`]: prepared free-text queries with weighted field hits
//! - [`concepts`]: concept-mention detection for suggested references

pub mod concepts;
pub mod fingerprint;
pub mod normalize;
pub mod query;

pub use concepts::ConceptMap;
pub use fingerprint::{semantic_overlap, Fingerprint, FingerprintGenerator, FINGERPRINT_SIZE};
pub use normalize::{normalize_card, normalized_words, stemmed_normalized_words, Stemmer};
pub use query::{decode_query_text, encode_query_text, PreparedQuery};
