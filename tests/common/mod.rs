//! Shared testing utilities for prompty integration tests.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Checked-in manifests under `tests/fixtures/prompts`.
#[allow(dead_code)]
pub fn fixture_prompts() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/prompts")
}

/// Checked-in variable files under `tests/fixtures/vars`.
#[allow(dead_code)]
pub fn fixture_vars(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/vars").join(name)
}

/// Isolated working directory with its own `prompts/` folder.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp directory for tests");
        fs::create_dir_all(root.path().join("prompts")).expect("Failed to create prompts dir");
        Self { root }
    }

    /// Working directory for CLI invocations.
    pub fn work_dir(&self) -> &Path {
        self.root.path()
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.path().join("prompts")
    }

    /// Write a file relative to `prompts/`, creating parent directories.
    pub fn write_prompt(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.prompts_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write prompt file");
        path
    }

    /// Write a file relative to the working directory.
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(relative);
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Copy every checked-in fixture manifest (and partial) into `prompts/`.
    pub fn copy_fixture_prompts(&self) {
        copy_dir(&fixture_prompts(), &self.prompts_dir());
    }

    /// Build a command for the compiled `prompty` binary in the working directory.
    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("prompty").expect("Failed to locate prompty binary");
        cmd.current_dir(self.work_dir()).env_remove("RUST_LOG");
        cmd
    }
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("Failed to create destination");
    for entry in fs::read_dir(from).expect("Failed to read fixture directory") {
        let entry = entry.expect("Failed to read fixture entry");
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).expect("Failed to copy fixture");
        }
    }
}
