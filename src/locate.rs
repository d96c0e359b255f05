//! Engine and log discovery.
//!
//! Both files normally live in the engine's build tree, which sits at or
//! above wherever this tool is launched from. Discovery checks a fixed
//! relative candidate in the start directory, then walks upward through a
//! bounded number of parents, nearest hit wins. Explicit CLI overrides
//! bypass the walk entirely.

use std::path::{Path, PathBuf};

const ENGINE_RELATIVE: &str = "cpp/main";
const LOG_RELATIVE: &str = "processing_log.txt";

// Directories tried, the start directory included.
const ENGINE_SEARCH_DEPTH: usize = 5;
const LOG_SEARCH_DEPTH: usize = 6;

/// Locate the engine binary at `cpp/main` in `start` or an ancestor.
pub fn find_engine(start: &Path) -> Option<PathBuf> {
    ascend(start, ENGINE_RELATIVE, ENGINE_SEARCH_DEPTH)
}

/// Locate the engine's log file, written next to wherever the engine ran.
pub fn find_log(start: &Path) -> Option<PathBuf> {
    ascend(start, LOG_RELATIVE, LOG_SEARCH_DEPTH)
}

fn ascend(start: &Path, relative: &str, depth: usize) -> Option<PathBuf> {
    let mut dir = start;
    for _ in 0..depth {
        let candidate = dir.join(relative);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn deep_dir(root: &Path, levels: usize) -> PathBuf {
        let mut dir = root.to_path_buf();
        for i in 0..levels {
            dir = dir.join(format!("level{i}"));
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn engine_is_found_in_the_start_directory() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("cpp")).unwrap();
        fs::write(root.path().join("cpp/main"), b"").unwrap();

        assert_eq!(
            find_engine(root.path()),
            Some(root.path().join("cpp/main"))
        );
    }

    #[test]
    fn engine_is_found_four_parents_up_but_not_five() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("cpp")).unwrap();
        fs::write(root.path().join("cpp/main"), b"").unwrap();

        let four_down = deep_dir(root.path(), 4);
        assert_eq!(
            find_engine(&four_down),
            Some(root.path().join("cpp/main"))
        );

        let five_down = deep_dir(root.path(), 5);
        assert_eq!(find_engine(&five_down), None);
    }

    #[test]
    fn log_walk_reaches_one_level_further() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("processing_log.txt"), b"").unwrap();

        let five_down = deep_dir(root.path(), 5);
        assert_eq!(
            find_log(&five_down),
            Some(root.path().join("processing_log.txt"))
        );

        let six_down = deep_dir(root.path(), 6);
        assert_eq!(find_log(&six_down), None);
    }

    #[test]
    fn nearest_candidate_wins() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("processing_log.txt"), b"far").unwrap();
        let inner = deep_dir(root.path(), 2);
        fs::write(inner.join("processing_log.txt"), b"near").unwrap();

        assert_eq!(
            find_log(&inner),
            Some(inner.join("processing_log.txt"))
        );
    }

    #[test]
    fn directory_with_the_candidate_name_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("cpp/main")).unwrap();
        assert_eq!(find_engine(root.path()), None);
    }
}
