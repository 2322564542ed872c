use super::*;
use crate::identity_source::NullSource;
use std::fs;
use std::os::unix::fs::MetadataExt;
use tempfile::TempDir;

const T1: u64 = 1_700_000_000;
const T2: u64 = 1_700_000_100;
const T3: u64 = 1_700_000_200;

fn scan(index: &mut Index, root: &Path, time: u64) -> ScanReport {
    scan_tree(index, root, &NullSource, &ScanOptions::default(), time).unwrap()
}

fn inode(path: &Path) -> u64 {
    fs::symlink_metadata(path).unwrap().ino()
}
