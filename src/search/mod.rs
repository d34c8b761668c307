//! Retrieval layer: lexical search over the FTS5 shadow indexes, fusion of
//! ranked lists, and the hybrid search entry points

mod fts;
pub mod fusion;
mod hybrid;

pub use fts::FtsHit;
pub use fusion::{fuse_rrf, fuse_weighted};
