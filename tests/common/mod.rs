//! Common test utilities and helpers

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const LEFT_CSV: &str = "id,name,value1\n1,Alice,100\n2,Bob,200\n3,Charlie,300\n";
pub const RIGHT_CSV: &str = "id,name,value2\n2,Bob,20\n3,Charlie,30\n4,David,40\n";

/// A temporary working directory laid out like a pipeline run:
/// `data/file1.csv`, `data/file2.csv` and optionally `merge-csv.yml`.
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Workspace with the reference inputs in `data/`
    pub fn new() -> Self {
        Self::with_inputs(LEFT_CSV, RIGHT_CSV)
    }

    pub fn with_inputs(left: &str, right: &str) -> Self {
        let workspace = Self::empty();
        workspace.write("data/file1.csv", left);
        workspace.write("data/file2.csv", right);
        workspace
    }

    /// Workspace with an empty `data/` directory
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        fs::create_dir_all(temp_dir.path().join("data")).expect("create data dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.path().join("data").join(name)
    }

    /// Write `contents` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write fixture");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).expect("read file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path().join(relative).exists()
    }
}
