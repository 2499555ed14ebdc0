//! Kinship Engine - matching and bonding service for cross-generational pairs
//!
//! This crate pairs users who seek and offer complementary social roles,
//! harvests personal facts from their chat, turns those facts into timed
//! contests and folds contest results back into the relationship.

pub mod config;
pub mod contest;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BondError, Result};
pub use types::*;

// Re-export key components
pub use contest::{AnswerScorer, ContestAggregator, ContestGenerator, FactExtractor};
pub use matching::{MatchQueue, MatchScorer, Role};
pub use notify::NotificationSink;
pub use service::{BondService, SearchOutcome};
pub use storage::InMemoryStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
