//! External tool invocation.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolCommand;

pub const ARTIFACT_TOKEN: &str = "{artifact}";
pub const ARCHIVE_TOKEN: &str = "{archive}";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{0}` was not found on PATH")]
    NotFound(String),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

impl ToolCommand {
    /// Arguments with `{artifact}` / `{archive}` expanded.
    pub fn expand_args(&self, artifact: Option<&Path>, archive: Option<&Path>) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                let mut arg = arg.clone();
                if let Some(path) = artifact {
                    arg = arg.replace(ARTIFACT_TOKEN, &path.to_string_lossy());
                }
                if let Some(path) = archive {
                    arg = arg.replace(ARCHIVE_TOKEN, &path.to_string_lossy());
                }
                arg
            })
            .collect()
    }

    /// Runs the command to completion. There is no timeout: a hung tool
    /// hangs the caller.
    pub async fn run(&self, artifact: Option<&Path>, archive: Option<&Path>) -> Result<(), ToolError> {
        let args = self.expand_args(artifact, archive);
        debug!("Running {} {:?}", self.program, args);
        let status = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }

    /// Checks that the program resolves to a file, either as given or via
    /// `PATH`.
    pub fn ensure_available(&self) -> Result<PathBuf, ToolError> {
        find_program(&self.program).ok_or_else(|| ToolError::NotFound(self.program.clone()))
    }
}

fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let full = dir.join(program);
        if full.is_file() {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Heavy structural obfuscation, applied in place to the working artifact.
#[async_trait]
pub trait ObfuscationTool: Send + Sync {
    async fn obfuscate(&self, artifact: &Path) -> Result<(), ToolError>;
}

/// Writes `artifact` into a store-only archive at `archive`.
#[async_trait]
pub trait ArchiveTool: Send + Sync {
    async fn archive(&self, artifact: &Path, archive: &Path) -> Result<(), ToolError>;
}

#[derive(Debug, Clone)]
pub struct CommandObfuscator {
    command: ToolCommand,
}

impl CommandObfuscator {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ObfuscationTool for CommandObfuscator {
    async fn obfuscate(&self, artifact: &Path) -> Result<(), ToolError> {
        self.command.run(Some(artifact), None).await
    }
}

#[derive(Debug, Clone)]
pub struct CommandArchiver {
    command: ToolCommand,
}

impl CommandArchiver {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ArchiveTool for CommandArchiver {
    async fn archive(&self, artifact: &Path, archive: &Path) -> Result<(), ToolError> {
        self.command.run(Some(artifact), Some(archive)).await
    }
}
