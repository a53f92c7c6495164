//! Human-readable scan diff.

use sfs_core::FileTree;

/// Describe how `current` differs from `previous`, one entry per line
/// (`+` added, `-` removed, `~` metadata or content changed), headed by
/// the totals. Returns `"no changes"` for identical trees.
pub fn diff_summary(previous: &FileTree, current: &FileTree) -> String {
    let mut added: Vec<&str> = Vec::new();
    let mut modified: Vec<&str> = Vec::new();
    let mut removed: Vec<&str> = Vec::new();

    for (path, node) in current.iter() {
        match previous.get(path) {
            None => added.push(path.as_str()),
            Some(prev) if prev != node => modified.push(path.as_str()),
            Some(_) => {}
        }
    }
    for (path, _) in previous.iter() {
        if !current.contains(path) {
            removed.push(path.as_str());
        }
    }

    if added.is_empty() && modified.is_empty() && removed.is_empty() {
        return "no changes".to_string();
    }

    added.sort_unstable();
    modified.sort_unstable();
    removed.sort_unstable();

    let mut out = format!(
        "{} added, {} removed, {} modified",
        added.len(),
        removed.len(),
        modified.len()
    );
    for path in added {
        out.push_str("\n+ ");
        out.push_str(path);
    }
    for path in removed {
        out.push_str("\n- ");
        out.push_str(path);
    }
    for path in modified {
        out.push_str("\n~ ");
        out.push_str(path);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_core::{Node, NodeKind};

    fn file(size: u64, mtime: u64) -> Node {
        Node {
            size,
            mtime,
            kind: NodeKind::File { chunks: vec![] },
        }
    }

    #[test]
    fn identical_trees_report_no_changes() {
        let mut a = FileTree::new();
        a.insert("x".into(), file(0, 1));
        assert_eq!(diff_summary(&a, &a.clone()), "no changes");
    }

    #[test]
    fn all_three_categories_show_up() {
        let mut old = FileTree::new();
        old.insert("kept".into(), file(0, 1));
        old.insert("gone".into(), file(0, 1));
        old.insert("touched".into(), file(0, 1));

        let mut new = FileTree::new();
        new.insert("kept".into(), file(0, 1));
        new.insert("touched".into(), file(0, 2));
        new.insert("fresh".into(), file(0, 1));

        let s = diff_summary(&old, &new);
        assert!(s.starts_with("1 added, 1 removed, 1 modified"));
        assert!(s.contains("+ fresh"));
        assert!(s.contains("- gone"));
        assert!(s.contains("~ touched"));
        assert!(!s.contains("kept"));
    }
}
