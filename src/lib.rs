//! Variant builder: produces many distinct, policy-checked obfuscated
//! variants of one build artifact, each in its own archive.

pub mod builder;
pub mod config;
pub mod errors;
pub mod logger;
pub mod metrics;
pub mod names;
pub mod packaging;
pub mod pipeline;
pub mod scrub;
pub mod substitutor;
pub mod tools;
pub mod verifier;
pub mod wordlist;

// Re-exports
pub use builder::{BaseArtifactBuilder, CanonicalTemplate};
pub use config::{load_config, ConfigOverrides, PipelineConfig, ToolCommand};
pub use errors::{AppError, IterationError, Result};
pub use packaging::ArtifactPackage;
pub use pipeline::{
    execute, BuildCounters, IterationOutcome, Pipeline, PipelineContext, PipelineSettings,
    RunSummary, Stage,
};
pub use substitutor::{ForbiddenTermSubstitutor, PlaceholderMap};
pub use tools::{ArchiveTool, ObfuscationTool, ToolError};
pub use verifier::{ComplianceVerifier, Verdict};
pub use wordlist::SensitiveTermSet;
