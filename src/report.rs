use crate::align::AlignResult;
use crate::conflicts::PathConflict;
use crate::reconcile::{HistoryConflict, RenameProposal};
use std::path::Path;

pub fn print_result(result: &AlignResult) {
    for line in format_lines(result) {
        println!("{}", line);
    }
}

fn format_lines(result: &AlignResult) -> Vec<String> {
    let renames = result
        .renames
        .iter()
        .map(|rename| format_rename(rename, result.root(rename.side), result.dry_run));
    let history_conflicts = result
        .history_conflicts
        .iter()
        .map(|conflict| format_history_conflict(conflict, &result.root_a, &result.root_b));
    let path_conflicts = result
        .path_conflicts
        .iter()
        .map(|conflict| format_path_conflict(conflict, &result.root_a, &result.root_b));

    renames.chain(history_conflicts).chain(path_conflicts).collect()
}

fn format_rename(rename: &RenameProposal, root: &Path, dry_run: bool) -> String {
    format!(
        "{}rename in {}: {} -> {}",
        if dry_run { "would " } else { "" },
        root.display(),
        rename.from,
        rename.to
    )
}

fn format_history_conflict(conflict: &HistoryConflict, root_a: &Path, root_b: &Path) -> String {
    let since = match conflict.agreed_at {
        Some(time) => format!("diverged since {}", format_scan_time(time)),
        None => "no common history".to_string(),
    };
    format!(
        "conflict {}: {} vs {} ({})",
        conflict.uuid,
        root_a.join(&conflict.path_a).display(),
        root_b.join(&conflict.path_b).display(),
        since
    )
}

fn format_path_conflict(conflict: &PathConflict, root_a: &Path, root_b: &Path) -> String {
    format!(
        "conflict at {}: {} in {}, {} in {}",
        conflict.path,
        conflict.uuid_a,
        root_a.display(),
        conflict.uuid_b,
        root_b.display()
    )
}

fn format_scan_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("@{}", secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Side;
    use crate::scan::ScanReport;
    use std::path::PathBuf;

    fn rename(side: Side, from: &str, to: &str) -> RenameProposal {
        RenameProposal {
            side,
            uuid: "u".to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn empty_result(dry_run: bool) -> AlignResult {
        AlignResult {
            root_a: PathBuf::from("/a"),
            root_b: PathBuf::from("/b"),
            scan_a: ScanReport::default(),
            scan_b: ScanReport::default(),
            renames: Vec::new(),
            rename_errors: Vec::new(),
            history_conflicts: Vec::new(),
            path_conflicts: Vec::new(),
            dry_run,
        }
    }

    #[test]
    fn rename_line() {
        assert_eq!(
            format_rename(&rename(Side::B, "x", "d/y"), Path::new("/b"), false),
            "rename in /b: x -> d/y"
        );
    }

    #[test]
    fn dry_run_rename_line() {
        assert_eq!(
            format_rename(&rename(Side::A, "x", "y"), Path::new("/a"), true),
            "would rename in /a: x -> y"
        );
    }

    #[test]
    fn history_conflict_line() {
        let conflict = HistoryConflict {
            uuid: "abc".to_string(),
            path_a: "y".to_string(),
            path_b: "z".to_string(),
            agreed_at: Some(1704067200),
        };

        assert_eq!(
            format_history_conflict(&conflict, Path::new("/a"), Path::new("/b")),
            "conflict abc: /a/y vs /b/z (diverged since 2024-01-01 00:00:00 UTC)"
        );
    }

    #[test]
    fn history_conflict_without_common_point() {
        let conflict = HistoryConflict {
            uuid: "abc".to_string(),
            path_a: "p".to_string(),
            path_b: "q".to_string(),
            agreed_at: None,
        };

        assert_eq!(
            format_history_conflict(&conflict, Path::new("/a"), Path::new("/b")),
            "conflict abc: /a/p vs /b/q (no common history)"
        );
    }

    #[test]
    fn path_conflict_line() {
        let conflict = PathConflict {
            path: "p".to_string(),
            uuid_a: "1".to_string(),
            uuid_b: "2".to_string(),
        };

        assert_eq!(
            format_path_conflict(&conflict, Path::new("/a"), Path::new("/b")),
            "conflict at p: 1 in /a, 2 in /b"
        );
    }

    #[test]
    fn out_of_range_time_falls_back_to_raw_seconds() {
        assert_eq!(format_scan_time(u64::MAX), format!("@{}", u64::MAX));
    }

    #[test]
    fn lines_list_renames_before_conflicts() {
        let mut result = empty_result(false);
        result.renames = vec![rename(Side::A, "x", "y"), rename(Side::B, "p", "q")];
        result.path_conflicts = vec![PathConflict {
            path: "c".to_string(),
            uuid_a: "1".to_string(),
            uuid_b: "2".to_string(),
        }];

        assert_eq!(
            format_lines(&result),
            vec![
                "rename in /a: x -> y",
                "rename in /b: p -> q",
                "conflict at c: 1 in /a, 2 in /b",
            ]
        );
    }

    #[test]
    fn nothing_to_report() {
        assert!(format_lines(&empty_result(true)).is_empty());
    }
}
