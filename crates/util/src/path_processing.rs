use std::path::PathBuf;

use dirs_next::home_dir;

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Returns `true` when `candidate` is a usable file stem for a cache record.
pub fn is_safe_file_stem(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate != "."
        && candidate != ".."
        && candidate.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        let expanded = expand_tilde("~/specs");
        assert!(!expanded.starts_with("~") || home_dir().is_none());
        assert_eq!(expand_tilde(" /tmp/specs "), PathBuf::from("/tmp/specs"));
    }

    #[test]
    fn file_stems_reject_traversal() {
        assert!(is_safe_file_stem("OK7XM1000938DS17215"));
        assert!(!is_safe_file_stem(".."));
        assert!(!is_safe_file_stem("a/b"));
        assert!(!is_safe_file_stem(""));
    }
}
