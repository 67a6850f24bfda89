pub mod command;
pub mod logging;

use std::path::{Path, PathBuf};
use which::which;

use crate::errors::{FileSystemError, ToolError};

/// Resolves a PostgreSQL client binary: the configured path if any, otherwise PATH.
pub fn find_executable(name: &str, configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    which(name).map_err(|source| ToolError::NotFound {
        program: name.to_string(),
        source,
    })
}

/// Checks that `dir` exists, is a directory and accepts new files.
pub fn ensure_writable_dir(dir: &Path) -> Result<(), FileSystemError> {
    if !dir.exists() {
        return Err(FileSystemError::MissingDirectory { path: dir.to_path_buf() });
    }
    if !dir.is_dir() {
        return Err(FileSystemError::NotADirectory { path: dir.to_path_buf() });
    }
    // An unnamed temp file is removed by the OS as soon as it is dropped.
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|source| FileSystemError::NotWritable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Creates `dir` and its parents when missing.
pub fn create_dir_all(dir: &Path) -> Result<(), FileSystemError> {
    std::fs::create_dir_all(dir).map_err(|source| FileSystemError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_executable_wins() -> anyhow::Result<()> {
        let path = find_executable("pg_dump", Some(Path::new("/opt/pg16/bin/pg_dump")))?;
        assert_eq!(path, PathBuf::from("/opt/pg16/bin/pg_dump"));
        Ok(())
    }

    #[test]
    fn test_missing_executable_is_reported() {
        let err = find_executable("definitely-not-a-real-pg-tool", None).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn test_ensure_writable_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        ensure_writable_dir(dir.path())?;

        let missing = dir.path().join("missing");
        assert!(matches!(
            ensure_writable_dir(&missing),
            Err(FileSystemError::MissingDirectory { .. })
        ));

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x")?;
        assert!(matches!(
            ensure_writable_dir(&file),
            Err(FileSystemError::NotADirectory { .. })
        ));

        let nested = dir.path().join("a/b/c");
        create_dir_all(&nested)?;
        assert!(nested.is_dir());
        Ok(())
    }
}
