pub mod cli;
pub mod commands;
pub mod indexer;
pub mod pipeline;
pub mod resolver;
pub mod walker;

pub use commands::{AnalyzeReport, Session};
pub use pipeline::{AnalysisOptions, PipelineError, run_analysis};
