//! Project root discovery.

use std::path::{Path, PathBuf};

/// Walk `start` and its ancestors; return the first directory containing `marker`.
pub fn find_project_root(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_marker_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("docker-compose.dev.yml"), "services: {}\n").unwrap();
        let nested = root.path().join("tests").join("e2e");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_project_root(&nested, "docker-compose.dev.yml");
        assert_eq!(found.as_deref(), Some(root.path()));
    }

    #[test]
    fn test_start_directory_itself_matches() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("marker.yml"), "").unwrap();

        assert_eq!(
            find_project_root(root.path(), "marker.yml").as_deref(),
            Some(root.path())
        );
    }

    #[test]
    fn test_directory_named_like_marker_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("compose-marker-dir.yml")).unwrap();

        assert_eq!(
            find_project_root(root.path(), "compose-marker-dir.yml"),
            None
        );
    }
}
