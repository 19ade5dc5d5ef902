//! Write the text artifacts of a run.
//!
//! - `fTestResults[_<cat>].txt`: the LaTeX results table
//! - `dat/fTest[_<cat>].dat`: the bias-study summary

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::FtestConfig;
use crate::error::AppError;

/// Output file locations for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub results_table: PathBuf,
    pub bias_summary: PathBuf,
    pub workspace: PathBuf,
    pub plots: PathBuf,
}

impl OutputPaths {
    pub fn new(config: &FtestConfig) -> Self {
        let suffix = config.output_suffix();
        let out = &config.out_dir;
        Self {
            results_table: out.join(format!("fTestResults{suffix}.txt")),
            bias_summary: out.join("dat").join(format!("fTest{suffix}.dat")),
            workspace: out.join("multipdf").join(format!("multipdf_{}{suffix}.json", config.ext)),
            plots: out.join("plots"),
        }
    }
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", parent.display())))?;
    }
    Ok(())
}

/// Write a preformatted text artifact (`what` names it in errors and logs).
pub fn write_text(path: &Path, what: &str, content: &str) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))?;
    file.write_all(content.as_bytes())
        .map_err(|e| AppError::new(2, format!("Failed to write {what}: {e}")))?;
    info!(path = %path.display(), "wrote {what}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_category_runs_suffix_every_file() {
        let config = FtestConfig {
            out_dir: PathBuf::from("out"),
            categories: vec!["UntaggedTag_0".to_string(), "VBFTag_0".to_string()],
            single_category: Some(1),
            ..FtestConfig::default()
        };
        let paths = OutputPaths::new(&config);
        assert_eq!(paths.results_table, PathBuf::from("out/fTestResults_VBFTag_0.txt"));
        assert_eq!(paths.bias_summary, PathBuf::from("out/dat/fTest_VBFTag_0.dat"));
        assert_eq!(paths.workspace, PathBuf::from("out/multipdf/multipdf_13TeV_VBFTag_0.json"));
    }

    #[test]
    fn text_is_written_under_new_directories() {
        let dir = std::env::temp_dir().join(format!("bkg-ftest-export-{}", std::process::id()));
        let path = dir.join("dat").join("fTest.dat");
        write_text(&path, "summary", "cat = [cat0, 0]\n\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "cat = [cat0, 0]\n\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
