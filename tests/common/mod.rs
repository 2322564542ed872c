use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Two empty roots to align.
pub struct Roots {
    pub a: TempDir,
    pub b: TempDir,
}

impl Roots {
    pub fn new() -> Self {
        Roots {
            a: TempDir::new().unwrap(),
            b: TempDir::new().unwrap(),
        }
    }

    pub fn a(&self) -> &Path {
        self.a.path()
    }

    pub fn b(&self) -> &Path {
        self.b.path()
    }

    /// Write the same file into both roots, creating parent directories.
    pub fn write_both(&self, path: &str, content: &str) {
        for root in [self.a(), self.b()] {
            let file = root.join(path);
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(file, content).unwrap();
        }
    }

    /// `renametree <A> <B>` with any extra flags placed before the roots.
    pub fn cmd(&self, flags: &[&str]) -> Command {
        let mut cmd = cargo_bin_cmd!("renametree");
        cmd.args(flags).arg(self.a()).arg(self.b());
        cmd
    }

    /// Run once with default flags so both roots share identities.
    // Not every integration test crate starts from an aligned pair.
    #[allow(dead_code)]
    pub fn align(&self) {
        self.cmd(&[]).assert().success();
    }
}
