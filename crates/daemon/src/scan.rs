//! Scanner module for discovering candidate files under the input root.
//!
//! Recursively walks the watched directory and keeps files whose extension
//! matches the configured input extensions.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file discovered by a poll, not yet confirmed stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Full path to the file.
    pub path: PathBuf,
}

impl CandidateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File name, used for log lines and derived output paths.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory holding the file.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Checks if a file's extension is one of `extensions` (case-insensitive).
///
/// Configured extensions may be written with or without the leading dot.
pub fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Scans `root` for candidate files.
///
/// This function:
/// - Recursively walks the root, entries sorted by name within each directory
/// - Skips hidden directories (names starting with `.`)
/// - Filters files by the configured extensions
///
/// Entries that cannot be read are skipped. A missing root yields nothing.
pub fn scan_input(root: &Path, extensions: &[String]) -> Vec<CandidateFile> {
    if !root.exists() {
        tracing::warn!("Input path {} does not exist", root.display());
        return Vec::new();
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Allow the root directory even if it starts with '.'
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.')))
        });

    walker
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matches_extension(entry.path(), extensions))
        .map(|entry| CandidateFile::new(entry.into_path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn video_extensions() -> Vec<String> {
        vec!["m4v".to_string(), "mp4".to_string(), "mkv".to_string()]
    }

    #[test]
    fn test_matches_extension() {
        let exts = video_extensions();
        assert!(matches_extension(Path::new("/in/movie.mkv"), &exts));
        assert!(matches_extension(Path::new("/in/movie.MKV"), &exts)); // case-insensitive
        assert!(matches_extension(Path::new("/in/movie.m4v"), &exts));
        assert!(!matches_extension(Path::new("/in/movie.avi"), &exts));
        assert!(!matches_extension(Path::new("/in/movie"), &exts)); // no extension
    }

    #[test]
    fn test_matches_extension_with_leading_dot() {
        let exts = vec![".ts".to_string()];
        assert!(matches_extension(Path::new("/in/capture.ts"), &exts));
    }

    #[test]
    fn test_candidate_basename_and_directory() {
        let candidate = CandidateFile::new("/in/show/episode.mkv");
        assert_eq!(candidate.basename(), "episode.mkv");
        assert_eq!(candidate.directory(), Path::new("/in/show"));
    }

    #[test]
    fn test_scan_recurses_into_subdirectories_in_name_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("rip")).unwrap();
        File::create(root.join("b.mp4")).unwrap();
        File::create(root.join("a.mkv")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("rip").join("c.m4v")).unwrap();

        let found: Vec<PathBuf> = scan_input(root, &video_extensions())
            .into_iter()
            .map(|c| c.path)
            .collect();

        assert_eq!(
            found,
            vec![
                root.join("a.mkv"),
                root.join("b.mp4"),
                root.join("rip").join("c.m4v"),
            ]
        );
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone");
        assert!(scan_input(&missing, &video_extensions()).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("mkv"), Just("MKV"), Just("Mkv"),
                Just("mp4"), Just("MP4"),
                Just("m4v"), Just("M4V"),
                Just("txt"), Just("avi"), Just("srt"), Just("part"),
            ],
        ) {
            let path = PathBuf::from(format!("/in/{}.{}", basename, ext));
            let expected = matches!(ext.to_lowercase().as_str(), "mkv" | "mp4" | "m4v");
            prop_assert_eq!(matches_extension(&path, &video_extensions()), expected);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_hidden_directory_exclusion(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();

            let visible_video = root.join(&visible_dir).join(format!("{}.mkv", filename));
            fs::create_dir_all(visible_video.parent().unwrap()).unwrap();
            File::create(&visible_video).unwrap();

            let hidden_video = root.join(&hidden_dir).join(format!("{}.mkv", filename));
            fs::create_dir_all(hidden_video.parent().unwrap()).unwrap();
            File::create(&hidden_video).unwrap();

            let candidates = scan_input(root, &video_extensions());

            prop_assert!(candidates.iter().any(|c| c.path == visible_video));
            prop_assert!(!candidates.iter().any(|c| c.path == hidden_video));
        }
    }
}
