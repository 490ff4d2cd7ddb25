//! The transform, verify, retry loop.
//!
//! Every iteration starts by restoring the working artifact from the
//! canonical template, so whatever a failed or rejected attempt left behind
//! never reaches the next one. Only an archived variant advances the build
//! counter; rejections and failures are retried without limit unless
//! `max_attempts` is set.

use std::fmt;
use std::path::{Path, PathBuf};

use prometheus::Registry;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::builder::{BaseArtifactBuilder, BuildError, CanonicalTemplate};
use crate::config::{ConfigError, PipelineConfig};
use crate::errors::{AppError, IterationError, Result};
use crate::metrics::{write_to, Metrics};
use crate::packaging::{normalize_declarations, ArtifactPackage, Packager};
use crate::substitutor::ForbiddenTermSubstitutor;
use crate::tools::{ArchiveTool, CommandArchiver, CommandObfuscator, ObfuscationTool};
use crate::verifier::{ComplianceVerifier, Verdict};
use crate::wordlist::SensitiveTermSet;

const DEFAULT_EXTENSION: &str = "js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    BuildingBase,
    Restoring,
    Substituting,
    Obfuscating,
    Verifying,
    Packaging,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::BuildingBase => "building-base",
            Stage::Restoring => "restoring",
            Stage::Substituting => "substituting",
            Stage::Obfuscating => "obfuscating",
            Stage::Verifying => "verifying",
            Stage::Packaging => "packaging",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildCounters {
    pub successful_builds: u64,
    pub attempts: u64,
    pub rejections: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub enum IterationOutcome {
    Accepted(ArtifactPackage),
    /// The verifier found `term`. Expected and frequent, not an error.
    Rejected { term: String },
    Failed { stage: Stage, error: IterationError },
}

/// Run-wide state handed from stage to stage.
#[derive(Debug)]
pub struct PipelineContext {
    template: CanonicalTemplate,
    working_path: PathBuf,
    target: u64,
    max_attempts: Option<u64>,
    counters: BuildCounters,
    stage: Stage,
}

impl PipelineContext {
    /// A context in `Init` with an empty template; call
    /// [`build_base`](Self::build_base) before running the loop.
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            template: CanonicalTemplate::new(""),
            working_path: settings.working_path.clone(),
            target: settings.target_count,
            max_attempts: settings.max_attempts,
            counters: BuildCounters::default(),
            stage: Stage::Init,
        }
    }

    /// Runs the one base build and keeps its output as the template.
    pub async fn build_base(
        &mut self,
        builder: &BaseArtifactBuilder,
    ) -> std::result::Result<(), BuildError> {
        self.stage = Stage::BuildingBase;
        info!("Stage {}: running the base build", self.stage);
        self.template = builder.build().await?;
        Ok(())
    }

    pub fn template(&self) -> &CanonicalTemplate {
        &self.template
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn counters(&self) -> BuildCounters {
        self.counters
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.counters.successful_builds >= self.target
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_count: u64,
    pub max_attempts: Option<u64>,
    pub working_path: PathBuf,
    pub zips_dir: PathBuf,
    pub placeholder_prefix: String,
    pub placeholder_min_len: usize,
    pub placeholder_max_len: usize,
    pub normalize_declarations: bool,
    pub bell: bool,
}

impl PipelineSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            target_count: cfg.target_count,
            max_attempts: cfg.max_attempts,
            working_path: cfg
                .output_dir
                .join(format!("working.{}", artifact_extension(cfg))),
            zips_dir: cfg.zips_dir(),
            placeholder_prefix: cfg.placeholder_prefix.clone(),
            placeholder_min_len: cfg.placeholder_min_len,
            placeholder_max_len: cfg.placeholder_max_len,
            normalize_declarations: cfg.normalize_declarations,
            bell: cfg.bell,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub target: u64,
    #[serde(flatten)]
    pub counters: BuildCounters,
    pub archives: Vec<ArtifactPackage>,
}

pub struct Pipeline<O, A> {
    ctx: PipelineContext,
    substitutor: ForbiddenTermSubstitutor,
    verifier: ComplianceVerifier,
    obfuscator: O,
    packager: Packager<A>,
    metrics: Metrics,
    normalize: bool,
    bell: bool,
    archives: Vec<ArtifactPackage>,
}

impl<O: ObfuscationTool, A: ArchiveTool> Pipeline<O, A> {
    /// Starts from an already built template.
    pub fn new(
        template: CanonicalTemplate,
        terms: &SensitiveTermSet,
        settings: PipelineSettings,
        obfuscator: O,
        archiver: A,
        metrics: Metrics,
    ) -> Result<Self> {
        let mut ctx = PipelineContext::new(&settings);
        ctx.template = template;
        Self::with_context(ctx, terms, settings, obfuscator, archiver, metrics)
    }

    /// Takes over a context whose base build has already run.
    pub fn with_context(
        ctx: PipelineContext,
        terms: &SensitiveTermSet,
        settings: PipelineSettings,
        obfuscator: O,
        archiver: A,
        metrics: Metrics,
    ) -> Result<Self> {
        let substitutor = ForbiddenTermSubstitutor::new(
            terms.manual_substitute(),
            &settings.placeholder_prefix,
            settings.placeholder_min_len,
            settings.placeholder_max_len,
        )?;
        if !substitutor.has_room_for_terms() {
            return Err(ConfigError::Invalid(format!(
                "placeholder lengths {}..={} cannot name {} manual terms",
                settings.placeholder_min_len,
                settings.placeholder_max_len,
                substitutor.term_count()
            ))
            .into());
        }
        let verifier = ComplianceVerifier::new(terms.auto_checked())?;

        Ok(Self {
            ctx,
            substitutor,
            verifier,
            obfuscator,
            packager: Packager::new(settings.zips_dir, archiver),
            metrics,
            normalize: settings.normalize_declarations,
            bell: settings.bell,
            archives: Vec::new(),
        })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn archives(&self) -> &[ArtifactPackage] {
        &self.archives
    }

    /// Loops until the target number of variants is archived.
    pub async fn run(&mut self) -> Result<RunSummary> {
        info!("Producing {} variants", self.ctx.target);
        if let Some(parent) = self.ctx.working_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        while !self.ctx.is_done() {
            if let Some(max) = self.ctx.max_attempts {
                if self.ctx.counters.attempts >= max {
                    self.remove_working_file().await;
                    return Err(AppError::AttemptsExhausted {
                        attempts: self.ctx.counters.attempts,
                        successful: self.ctx.counters.successful_builds,
                    });
                }
            }
            self.run_iteration().await;
        }

        self.ctx.stage = Stage::Done;
        self.remove_working_file().await;
        let summary = self.summary();
        info!(
            "Done: {} variants in {} attempts ({} rejected, {} failed)",
            summary.counters.successful_builds,
            summary.counters.attempts,
            summary.counters.rejections,
            summary.counters.failures
        );
        Ok(summary)
    }

    /// Runs one attempt and books its outcome. The build counter moves only
    /// for an archived variant.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        self.ctx.counters.attempts += 1;
        self.metrics.attempts.inc();

        let outcome = match self.attempt().await {
            Ok(outcome) => outcome,
            Err(error) => IterationOutcome::Failed {
                stage: self.ctx.stage,
                error,
            },
        };

        match &outcome {
            IterationOutcome::Accepted(package) => {
                self.ctx.counters.successful_builds += 1;
                self.metrics.builds.inc();
                self.archives.push(package.clone());
                info!(
                    "Build {}/{} packaged as {} ({} bytes)",
                    self.ctx.counters.successful_builds,
                    self.ctx.target,
                    package.path.display(),
                    package.size_bytes
                );
            }
            IterationOutcome::Rejected { term } => {
                self.ctx.counters.rejections += 1;
                self.metrics.rejections.inc();
                warn!(
                    "Attempt {} rejected: output contains forbidden term {:?}, retrying",
                    self.ctx.counters.attempts, term
                );
                if self.bell {
                    eprint!("\x07");
                }
            }
            IterationOutcome::Failed { stage, error } => {
                self.ctx.counters.failures += 1;
                self.metrics.failures.inc();
                error!(
                    "Attempt {} failed while {}: {}, retrying",
                    self.ctx.counters.attempts, stage, error
                );
            }
        }
        outcome
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            target: self.ctx.target,
            counters: self.ctx.counters,
            archives: self.archives.clone(),
        }
    }

    async fn attempt(&mut self) -> std::result::Result<IterationOutcome, IterationError> {
        let path = self.ctx.working_path.clone();

        self.ctx.stage = Stage::Restoring;
        let mut working = self.ctx.template.restore();
        tokio::fs::write(&path, &working).await?;

        self.ctx.stage = Stage::Substituting;
        let placeholders = self.substitutor.apply(&mut working)?;
        debug!("Substituted {} manual terms", placeholders.len());
        tokio::fs::write(&path, &working).await?;

        self.ctx.stage = Stage::Obfuscating;
        self.obfuscator.obfuscate(&path).await?;
        let mut working = tokio::fs::read_to_string(&path).await?;

        self.ctx.stage = Stage::Verifying;
        if let Verdict::Flagged { term } = self.verifier.check(&working) {
            return Ok(IterationOutcome::Rejected { term });
        }

        self.ctx.stage = Stage::Packaging;
        if self.normalize {
            working = normalize_declarations(&working);
            // The rewrite adds `var` text the first check never saw.
            if let Verdict::Flagged { term } = self.verifier.check(&working) {
                return Ok(IterationOutcome::Rejected { term });
            }
            tokio::fs::write(&path, &working).await?;
        }
        let package = self.packager.package(&path).await?;
        Ok(IterationOutcome::Accepted(package))
    }

    async fn remove_working_file(&self) {
        if let Err(err) = tokio::fs::remove_file(&self.ctx.working_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.ctx.working_path.display(), err);
            }
        }
    }
}

fn artifact_extension(cfg: &PipelineConfig) -> String {
    cfg.build
        .output
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

/// Full run from configuration: load wordlists, build once, loop, clean up.
pub async fn execute(cfg: &PipelineConfig, registry: &Registry) -> Result<RunSummary> {
    let terms = SensitiveTermSet::load(&cfg.auto_wordlist, &cfg.manual_wordlist)?;
    for tool in [&cfg.build.command, &cfg.obfuscate, &cfg.archive] {
        tool.ensure_available()?;
    }

    let settings = PipelineSettings::from_config(cfg);
    let builder = BaseArtifactBuilder::new(cfg.build.clone(), &cfg.debug_call_name)?;
    let mut ctx = PipelineContext::new(&settings);
    ctx.build_base(&builder).await?;

    let metrics = Metrics::new(registry)?;
    let mut pipeline = Pipeline::with_context(
        ctx,
        &terms,
        settings,
        CommandObfuscator::new(cfg.obfuscate.clone()),
        CommandArchiver::new(cfg.archive.clone()),
        metrics,
    )?;

    tokio::fs::create_dir_all(cfg.zips_dir()).await?;
    let canonical_path = cfg
        .output_dir
        .join(format!("canonical.{}", artifact_extension(cfg)));
    tokio::fs::write(&canonical_path, pipeline.context().template().text()).await?;

    let result = pipeline.run().await;

    if let Err(err) = tokio::fs::remove_file(&canonical_path).await {
        warn!("Could not remove {}: {}", canonical_path.display(), err);
    }
    if let Some(path) = &cfg.metrics_path {
        write_to(registry, path).await?;
    }

    let summary = result?;
    if let Some(path) = &cfg.report_path {
        tokio::fs::write(path, serde_json::to_string_pretty(&summary)?).await?;
        info!("Wrote run report to {}", path.display());
    }
    Ok(summary)
}
