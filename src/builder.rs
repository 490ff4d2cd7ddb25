//! Produces the canonical template from one run of the external build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::BuildConfig;
use crate::scrub::{strip_control_chars, DebugTagScrubber};
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command failed: {0}")]
    Tool(#[from] ToolError),
    #[error("build finished but {0} does not exist")]
    MissingOutput(PathBuf),
    #[error("failed to read build output {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid debug call name: {0}")]
    Pattern(#[from] regex::Error),
}

/// Immutable post-build snapshot every iteration restores from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTemplate {
    text: Arc<str>,
}

impl CanonicalTemplate {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A fresh mutable copy for one iteration.
    pub fn restore(&self) -> String {
        self.text.to_string()
    }
}

/// Applies the one-time scrubs: debug tags first, then control characters.
pub fn prepare_template(raw: &str, scrubber: &DebugTagScrubber) -> CanonicalTemplate {
    let (scrubbed, tags) = scrubber.scrub(raw);
    let cleaned = strip_control_chars(&scrubbed);
    info!(
        "Scrubbed {} debug tags and {} non-printable characters",
        tags,
        scrubbed.chars().count() - cleaned.chars().count()
    );
    CanonicalTemplate::new(cleaned)
}

pub struct BaseArtifactBuilder {
    config: BuildConfig,
    scrubber: DebugTagScrubber,
}

impl BaseArtifactBuilder {
    pub fn new(config: BuildConfig, debug_call_name: &str) -> Result<Self, BuildError> {
        Ok(Self {
            config,
            scrubber: DebugTagScrubber::new(debug_call_name)?,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output
    }

    /// Runs the build exactly once and turns its output into the template.
    pub async fn build(&self) -> Result<CanonicalTemplate, BuildError> {
        info!("Building base artifact with `{}`", self.config.command.program);
        self.config.command.run(None, None).await?;

        let output = &self.config.output;
        if !output.is_file() {
            return Err(BuildError::MissingOutput(output.clone()));
        }
        let bytes = tokio::fs::read(output)
            .await
            .map_err(|source| BuildError::Read {
                path: output.clone(),
                source,
            })?;
        let raw = String::from_utf8_lossy(&bytes);
        Ok(prepare_template(&raw, &self.scrubber))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommand;
    use regex::Regex;

    #[test]
    fn template_restore_is_independent_copy() {
        let template = CanonicalTemplate::new("let a = 1;");
        let mut copy = template.restore();
        copy.push_str("mutated");
        assert_eq!(template.text(), "let a = 1;");
    }

    #[test]
    fn prepare_scrubs_tags_and_control_chars() {
        let scrubber = DebugTagScrubber::new("__name").unwrap();
        let template = prepare_template("__name(f, \"login\");\u{7}\n", &scrubber);
        let re = Regex::new(r#"^__name\(f, "[0-9a-f]{8}"\);\n$"#).unwrap();
        assert!(re.is_match(template.text()), "got {:?}", template.text());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn builds_from_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bundle.js");
        let script = format!(
            "printf '__name(run, \"startServer\");' > '{}'",
            output.display()
        );
        let builder = BaseArtifactBuilder::new(
            BuildConfig {
                command: ToolCommand::new("sh", &["-c", &script]),
                output: output.clone(),
            },
            "__name",
        )
        .unwrap();

        let template = builder.build().await.unwrap();
        assert!(!template.text().contains("startServer"));
        assert!(template.text().starts_with("__name(run, \""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let builder = BaseArtifactBuilder::new(
            BuildConfig {
                command: ToolCommand::new("true", &[]),
                output: dir.path().join("never-written.js"),
            },
            "__name",
        )
        .unwrap();

        assert!(matches!(
            builder.build().await,
            Err(BuildError::MissingOutput(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_build_is_fatal() {
        let builder = BaseArtifactBuilder::new(
            BuildConfig {
                command: ToolCommand::new("false", &[]),
                output: PathBuf::from("unused.js"),
            },
            "__name",
        )
        .unwrap();

        assert!(matches!(builder.build().await, Err(BuildError::Tool(_))));
    }
}
