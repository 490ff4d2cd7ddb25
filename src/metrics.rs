use std::path::Path;

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Run counters. Policy rejections and iteration failures are kept apart so
/// an operator can tell a noisy wordlist from a broken tool.
#[derive(Clone)]
pub struct Metrics {
    pub attempts: IntCounter,
    pub builds: IntCounter,
    pub rejections: IntCounter,
    pub failures: IntCounter,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let attempts = IntCounter::new("variant_attempts_total", "Loop iterations started")?;
        let builds = IntCounter::new("variant_builds_total", "Variants accepted and packaged")?;
        let rejections = IntCounter::new(
            "variant_rejections_total",
            "Variants rejected by the compliance verifier",
        )?;
        let failures = IntCounter::new(
            "variant_failures_total",
            "Iterations discarded because a stage failed",
        )?;

        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(builds.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self {
            attempts,
            builds,
            rejections,
            failures,
        })
    }
}

/// Renders `registry` in the prometheus text format.
pub fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub async fn write_to(registry: &Registry, path: &Path) -> Result<(), crate::errors::AppError> {
    let text = render(registry)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}
