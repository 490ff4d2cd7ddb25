use std::path::{Path, PathBuf};

use config as config_rs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest `placeholder_max_len` accepted; 16^4 names per iteration.
pub const MIN_PLACEHOLDER_MAX_LEN: usize = 4;

/// An external command line; `{artifact}` and `{archive}` in `args` are
/// expanded when the command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_build_command")]
    pub command: ToolCommand,
    /// File the build command is expected to leave behind.
    #[serde(default = "default_build_output")]
    pub output: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            output: default_build_output(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_target_count")]
    pub target_count: u64,
    #[serde(default = "default_auto_wordlist")]
    pub auto_wordlist: PathBuf,
    #[serde(default = "default_manual_wordlist")]
    pub manual_wordlist: PathBuf,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default = "default_obfuscate_command")]
    pub obfuscate: ToolCommand,
    #[serde(default = "default_archive_command")]
    pub archive: ToolCommand,
    #[serde(default = "default_debug_call_name")]
    pub debug_call_name: String,
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_prefix: String,
    #[serde(default = "default_placeholder_min_len")]
    pub placeholder_min_len: usize,
    #[serde(default = "default_placeholder_max_len")]
    pub placeholder_max_len: usize,
    #[serde(default = "default_true")]
    pub normalize_declarations: bool,
    /// `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u64>,
    #[serde(default = "default_true")]
    pub bell: bool,
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            target_count: default_target_count(),
            auto_wordlist: default_auto_wordlist(),
            manual_wordlist: default_manual_wordlist(),
            build: BuildConfig::default(),
            obfuscate: default_obfuscate_command(),
            archive: default_archive_command(),
            debug_call_name: default_debug_call_name(),
            placeholder_prefix: default_placeholder_prefix(),
            placeholder_min_len: default_placeholder_min_len(),
            placeholder_max_len: default_placeholder_max_len(),
            normalize_declarations: true,
            max_attempts: None,
            bell: true,
            metrics_path: None,
            report_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn zips_dir(&self) -> PathBuf {
        self.output_dir.join("zips")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_count == 0 {
            return Err(ConfigError::Invalid("target_count must be at least 1".into()));
        }
        if self.placeholder_min_len == 0 || self.placeholder_min_len > self.placeholder_max_len {
            return Err(ConfigError::Invalid(format!(
                "placeholder length range {}..={} is empty",
                self.placeholder_min_len, self.placeholder_max_len
            )));
        }
        if self.placeholder_max_len < MIN_PLACEHOLDER_MAX_LEN {
            return Err(ConfigError::Invalid(format!(
                "placeholder_max_len must be at least {}",
                MIN_PLACEHOLDER_MAX_LEN
            )));
        }
        if !is_identifier(&self.placeholder_prefix) {
            return Err(ConfigError::Invalid(format!(
                "placeholder_prefix {:?} is not an identifier",
                self.placeholder_prefix
            )));
        }
        if self.debug_call_name.trim().is_empty() {
            return Err(ConfigError::Invalid("debug_call_name is empty".into()));
        }
        for (name, cmd) in [
            ("build", &self.build.command),
            ("obfuscate", &self.obfuscate),
            ("archive", &self.archive),
        ] {
            if cmd.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} command has no program", name)));
            }
        }
        Ok(())
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub output_dir: Option<PathBuf>,
    pub target_count: Option<u64>,
    pub auto_wordlist: Option<PathBuf>,
    pub manual_wordlist: Option<PathBuf>,
    pub max_attempts: Option<u64>,
    pub no_bell: bool,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("config error: {0}")]
    Config(#[from] config_rs::ConfigError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<PipelineConfig, ConfigError> {
    let mut builder = config_rs::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        builder = builder.add_source(config_rs::File::from(path));
    }

    builder = builder.add_source(
        config_rs::Environment::with_prefix("VARIANT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // CLI flags take precedence
    if let Some(dir) = &overrides.output_dir {
        builder = builder.set_override("output_dir", dir.to_string_lossy().into_owned())?;
    }
    if let Some(count) = overrides.target_count {
        builder = builder.set_override("target_count", to_i64(count))?;
    }
    if let Some(list) = &overrides.auto_wordlist {
        builder = builder.set_override("auto_wordlist", list.to_string_lossy().into_owned())?;
    }
    if let Some(list) = &overrides.manual_wordlist {
        builder = builder.set_override("manual_wordlist", list.to_string_lossy().into_owned())?;
    }
    if let Some(max) = overrides.max_attempts {
        builder = builder.set_override("max_attempts", to_i64(max))?;
    }
    if overrides.no_bell {
        builder = builder.set_override("bell", false)?;
    }
    if let Some(report) = &overrides.report_path {
        builder = builder.set_override("report_path", report.to_string_lossy().into_owned())?;
    }

    let cfg: PipelineConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// A JavaScript-style identifier start followed by word characters, so a
/// prefix plus hex digits is always a valid name.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_target_count() -> u64 {
    1
}

fn default_auto_wordlist() -> PathBuf {
    PathBuf::from("wordlists/auto.txt")
}

fn default_manual_wordlist() -> PathBuf {
    PathBuf::from("wordlists/manual.txt")
}

fn default_build_command() -> ToolCommand {
    ToolCommand::new("npm", &["run", "build"])
}

fn default_build_output() -> PathBuf {
    PathBuf::from("dist/index.js")
}

fn default_obfuscate_command() -> ToolCommand {
    ToolCommand::new(
        "javascript-obfuscator",
        &["{artifact}", "--output", "{artifact}"],
    )
}

fn default_archive_command() -> ToolCommand {
    ToolCommand::new("zip", &["-0", "-j", "-q", "{archive}", "{artifact}"])
}

fn default_debug_call_name() -> String {
    "__name".to_string()
}

fn default_placeholder_prefix() -> String {
    "var_".to_string()
}

fn default_placeholder_min_len() -> usize {
    4
}

fn default_placeholder_max_len() -> usize {
    8
}
