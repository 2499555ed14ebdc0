//! Fact-driven contests: extraction, generation, grading and completion

pub mod aggregator;
pub mod answers;
pub mod facts;
pub mod generator;

pub use aggregator::{tally, ContestAggregator, ContestSummary, ContestTally};
pub use answers::{grade, AnswerReceipt, AnswerScorer, Grade};
pub use facts::{CategoryRule, ExtractedFact, FactExtractor, RuleTableExtractor};
pub use generator::{
    contest_title, question_template, render_question, ContestGenerator, GeneratedContest,
    TEMPLATE_POOL,
};
