//! Plain-text playlists: one utterance per line.

use std::path::Path;

use crate::error::{Result, VoxError};

/// Parse playlist text. Blank lines and lines starting with `#` are skipped.
pub fn parse_playlist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Read and parse a playlist file.
pub fn load_playlist(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let lines = parse_playlist(&content);
    if lines.is_empty() {
        return Err(VoxError::Config(format!(
            "playlist {} has no lines to speak",
            path.display()
        )));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_playlist_skips_blanks_and_comments() {
        let lines = parse_playlist("# greetings\nHello there\n\n   \n  Good night  \r\n");
        assert_eq!(lines, vec!["Hello there", "Good night"]);
    }

    #[test]
    fn test_load_playlist_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = load_playlist(&tmp.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, VoxError::Io(_)));
    }

    #[test]
    fn test_load_playlist_empty_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "# only a comment\n").unwrap();
        assert!(load_playlist(&path).unwrap_err().is_config());
    }

    #[test]
    fn test_load_playlist_reads_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lines.txt");
        std::fs::write(&path, "one\ntwo\n").unwrap();
        assert_eq!(load_playlist(&path).unwrap(), vec!["one", "two"]);
    }
}
