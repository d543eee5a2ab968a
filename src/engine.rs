//! Instrumentation engine: scan, resolve, inject, write back
//!
//! Every included file is read and parsed before the first write, so a
//! syntax error anywhere aborts the run with the tree untouched. Write-back
//! failures abort the remaining writes.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::injector::{self, Instrumented, ProbePolicy};
use crate::scanner::{self, FileFilter, SourceFile};
use crate::writer;

/// Settings for one instrumentation run
#[derive(Debug, Clone, Default)]
pub struct InstrumentConfig {
    /// Which files take part (default: `.rs` files that are not test code)
    pub filter: FileFilter,
    /// Copy each modified file to `<name>_<YYYYMMDDHHMMSS>` first
    pub backup: bool,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Package half of every label; derived from each file's path when unset
    pub package: Option<String>,
    pub policy: ProbePolicy,
}

/// Outcome for one modified file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub probes: Vec<String>,
    pub backup: Option<PathBuf>,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentSummary {
    pub files_scanned: usize,
    pub modified: Vec<FileReport>,
    pub already_marked: usize,
    pub excluded: usize,
    pub skipped_const: usize,
}

impl InstrumentSummary {
    pub fn probes_inserted(&self) -> usize {
        self.modified.iter().map(|file| file.probes.len()).sum()
    }
}

/// Instrument every included file directly under `root`
pub fn instrument_dir(root: &Path, config: &InstrumentConfig) -> Result<InstrumentSummary> {
    let paths = scanner::candidate_files(root, &config.filter, config.recursive)?;
    debug!(root = %root.display(), files = paths.len(), "scanning");

    let mut parser = scanner::rust_parser()?;
    let files = paths
        .iter()
        .map(|path| SourceFile::load(path, config.package.as_deref(), &mut parser))
        .collect::<Result<Vec<_>>>()?;

    let rewritten: Vec<(&SourceFile, Instrumented)> = files
        .iter()
        .map(|file| (file, injector::instrument(file, &config.policy)))
        .collect();

    let mut summary = InstrumentSummary {
        files_scanned: files.len(),
        ..Default::default()
    };

    for (file, outcome) in rewritten {
        summary.already_marked += outcome.already_marked;
        summary.excluded += outcome.excluded;
        summary.skipped_const += outcome.skipped_const.len();

        if !outcome.modified() {
            debug!(path = %file.path().display(), "nothing to instrument");
            continue;
        }

        let backup = writer::write_back(file.path(), &outcome.source, config.backup)?;
        info!(
            path = %file.path().display(),
            probes = outcome.probes.len(),
            "file instrumented"
        );
        summary.modified.push(FileReport {
            path: file.path().to_path_buf(),
            probes: outcome.probes,
            backup,
        });
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_instrument_dir_counts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn one() {}\nfn two() {}\n").unwrap();
        fs::write(dir.path().join("b.rs"), "// wcprof: OFF\nfn three() {}\n").unwrap();

        let summary = instrument_dir(dir.path(), &InstrumentConfig::default()).unwrap();

        assert_eq!(summary.files_scanned, 2);
        assert_eq!(summary.modified.len(), 1);
        assert_eq!(summary.probes_inserted(), 2);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.modified[0].probes, vec!["a/one", "a/two"]);
    }

    #[test]
    fn test_package_override() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn one() {}\n").unwrap();

        let config = InstrumentConfig {
            package: Some("app".to_string()),
            ..Default::default()
        };
        let summary = instrument_dir(dir.path(), &config).unwrap();

        assert_eq!(summary.modified[0].probes, vec!["app/one"]);
    }

    #[test]
    fn test_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn one() {}\n").unwrap();

        let err = instrument_dir(&file, &InstrumentConfig::default()).unwrap_err();
        assert!(matches!(err, crate::InstrumentError::NotADirectory(_)));
    }
}
