//! # carddex-algo
//!
//! Graph ranking for CardDex: PageRank over the snapshot's link structure,
//! with a generation-keyed cache for the collection pipeline.

pub mod pagerank;

pub use pagerank::{page_rank, PageRankCache, PageRankConfig, PageRankResult};
