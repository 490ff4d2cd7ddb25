use thiserror::Error;

use crate::builder::BuildError;
use crate::config::ConfigError;
use crate::names::NameSpaceExhausted;
use crate::packaging::PackagingError;
use crate::tools::ToolError;
use crate::wordlist::WordlistError;

/// Fatal errors. Any of these ends the run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("wordlist error: {0}")]
    Wordlist(#[from] WordlistError),
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("build error: {0}")]
    Build(#[from] BuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid term pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to build term matcher: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),
    #[error("gave up after {attempts} attempts with {successful} successful builds")]
    AttemptsExhausted { attempts: u64, successful: u64 },
}

/// Errors contained inside one loop iteration. They discard the attempt and
/// never end the run.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("packaging error: {0}")]
    Packaging(#[from] PackagingError),
    #[error("placeholder error: {0}")]
    Placeholders(#[from] NameSpaceExhausted),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
