//! Full runs with shell commands standing in for the real tools.
#![cfg(unix)]

use std::path::Path;

use prometheus::Registry;
use variant_builder::{execute, AppError, PipelineConfig, ToolCommand};

fn config(dir: &Path, target: u64) -> PipelineConfig {
    let auto = dir.join("auto.txt");
    let manual = dir.join("manual.txt");
    std::fs::write(&auto, "# rejected outright\ninternalonly\n").unwrap();
    std::fs::write(&manual, "adminToken\n").unwrap();

    let bundle = dir.join("dist").join("bundle.js");
    let build_script = format!(
        "mkdir -p '{dist}' && printf 'const login = __name(function(){{}}, \"adminLogin\");\\nlet adminToken = 1;\\n' > '{out}'",
        dist = bundle.parent().unwrap().display(),
        out = bundle.display()
    );

    PipelineConfig {
        output_dir: dir.join("out"),
        target_count: target,
        auto_wordlist: auto,
        manual_wordlist: manual,
        build: variant_builder::config::BuildConfig {
            command: ToolCommand::new("sh", &["-c", &build_script]),
            output: bundle,
        },
        obfuscate: ToolCommand::new("sh", &["-c", "echo '// obfuscated' >> \"$0\"", "{artifact}"]),
        archive: ToolCommand::new("cp", &["{artifact}", "{archive}"]),
        bell: false,
        report_path: Some(dir.join("report.json")),
        metrics_path: Some(dir.join("metrics.prom")),
        ..Default::default()
    }
}

#[tokio::test]
async fn produces_archives_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 3);

    let summary = execute(&cfg, &Registry::new()).await.unwrap();

    assert_eq!(summary.counters.successful_builds, 3);
    let out = dir.path().join("out");
    let mut entries: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["zips".to_string()]);
    assert_eq!(std::fs::read_dir(out.join("zips")).unwrap().count(), 3);

    for package in &summary.archives {
        let text = std::fs::read_to_string(&package.path).unwrap();
        assert!(!text.contains("adminLogin"));
        assert!(!text.to_lowercase().contains("admintoken"));
        assert!(text.starts_with("var login = __name(function(){}, \""));
        assert!(text.ends_with("// obfuscated\n"));
    }

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("report.json")).unwrap())
            .unwrap();
    assert_eq!(report["successful_builds"], 3);
    assert_eq!(report["archives"].as_array().unwrap().len(), 3);

    let metrics = std::fs::read_to_string(dir.path().join("metrics.prom")).unwrap();
    assert!(metrics.contains("variant_builds_total 3"));
}

#[tokio::test]
async fn missing_wordlist_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 1);
    cfg.manual_wordlist = dir.path().join("nope.txt");

    let err = execute(&cfg, &Registry::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Wordlist(_)));
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn failing_build_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 1);
    cfg.build.command = ToolCommand::new("sh", &["-c", "exit 1"]);

    let err = execute(&cfg, &Registry::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Build(_)));
}

#[tokio::test]
async fn missing_tool_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 1);
    cfg.obfuscate = ToolCommand::new("no-such-obfuscator-91ab", &[]);

    let err = execute(&cfg, &Registry::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Tool(_)));
}
