//! Declaration normalization and archive output.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::tools::{ArchiveTool, ToolError};

/// `let` / `const` as a keyword, i.e. not a property (`.let`) or part of a
/// longer identifier.
static BLOCK_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w$.])(?:let|const)\b").expect("valid declaration regex"));

/// Rewrites block-scoped declarations to `var`.
///
/// This is a textual rewrite. A program that redeclares the same name in
/// sibling blocks, or depends on temporal dead zones, can change behavior.
pub fn normalize_declarations(text: &str) -> String {
    BLOCK_DECLARATION.replace_all(text, "${1}var").into_owned()
}

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive tool failed: {0}")]
    Tool(#[from] ToolError),
    #[error("archive tool did not produce {0}")]
    MissingArchive(PathBuf),
}

/// One finished variant on disk. Never touched again after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPackage {
    pub id: Uuid,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Names and writes archives under one directory.
pub struct Packager<A> {
    zips_dir: PathBuf,
    archiver: A,
    issued: HashSet<Uuid>,
}

impl<A: ArchiveTool> Packager<A> {
    pub fn new(zips_dir: impl Into<PathBuf>, archiver: A) -> Self {
        Self {
            zips_dir: zips_dir.into(),
            archiver,
            issued: HashSet::new(),
        }
    }

    pub fn zips_dir(&self) -> &Path {
        &self.zips_dir
    }

    /// Picks a v4 UUID that has not been handed out and does not name an
    /// existing file.
    fn next_archive_path(&mut self) -> (Uuid, PathBuf) {
        loop {
            let id = Uuid::new_v4();
            let path = self.zips_dir.join(format!("{}.zip", id));
            if self.issued.contains(&id) || path.exists() {
                continue;
            }
            self.issued.insert(id);
            return (id, path);
        }
    }

    /// Archives the artifact at `artifact`. The archive is only reported
    /// once the tool has finished and the file is on disk.
    pub async fn package(&mut self, artifact: &Path) -> Result<ArtifactPackage, PackagingError> {
        tokio::fs::create_dir_all(&self.zips_dir).await?;
        let (id, path) = self.next_archive_path();

        if let Err(err) = self.archiver.archive(artifact, &path).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err.into());
        }

        let size_bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PackagingError::MissingArchive(path))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(ArtifactPackage {
            id,
            path,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Reports success without writing anything.
    struct SilentArchiver;

    #[async_trait]
    impl ArchiveTool for SilentArchiver {
        async fn archive(&self, _artifact: &Path, _archive: &Path) -> Result<(), ToolError> {
            Ok(())
        }
    }

    /// Swaps the archive directory for a plain file, so the archive path
    /// can no longer be looked up.
    struct DirClobberingArchiver;

    #[async_trait]
    impl ArchiveTool for DirClobberingArchiver {
        async fn archive(&self, _artifact: &Path, archive: &Path) -> Result<(), ToolError> {
            let dir = archive.parent().unwrap();
            tokio::fs::remove_dir_all(dir).await.unwrap();
            tokio::fs::write(dir, "not a directory").await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn silent_tool_is_reported_as_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("working.js");
        tokio::fs::write(&artifact, "var a = 1;").await.unwrap();

        let mut packager = Packager::new(dir.path().join("zips"), SilentArchiver);
        let err = packager.package(&artifact).await.unwrap_err();
        assert!(matches!(err, PackagingError::MissingArchive(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_archive_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("working.js");
        tokio::fs::write(&artifact, "var a = 1;").await.unwrap();

        let mut packager = Packager::new(dir.path().join("zips"), DirClobberingArchiver);
        let err = packager.package(&artifact).await.unwrap_err();
        assert!(matches!(err, PackagingError::Io(_)), "got {:?}", err);
    }

    #[test]
    fn rewrites_let_and_const() {
        let out = normalize_declarations("const a=1;let b=2;\nfor(let i=0;;){}");
        assert_eq!(out, "var a=1;var b=2;\nfor(var i=0;;){}");
    }

    #[test]
    fn leaves_identifiers_and_properties_alone() {
        let input = "var letter=constant;obj.let=1;$const=2;x.const";
        assert_eq!(normalize_declarations(input), input);
    }

    #[test]
    fn handles_destructuring_without_space() {
        assert_eq!(normalize_declarations("const{a}=b"), "var{a}=b");
    }
}
