use std::path::PathBuf;

/// Replaces a bare `~` or a leading `~/` with the home directory; other
/// paths pass through. Separators become `\` on Windows.
pub fn expand_tilde(path: &str) -> String {
    let expanded = match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(""), Some(home)) => home.to_string_lossy().to_string(),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            home.join(&rest[1..]).to_string_lossy().to_string()
        }
        _ => path.to_string(),
    };
    if cfg!(windows) {
        expanded.replace('/', "\\")
    } else {
        expanded
    }
}

/// Directory of the running user's seclab state, `~/.seclab`.
pub fn seclab_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".seclab"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~"), home.to_string_lossy());
        assert_eq!(
            PathBuf::from(expand_tilde("~/.seclab")),
            home.join(".seclab")
        );
        assert_eq!(expand_tilde("/var/lib/seclab"), "/var/lib/seclab");
        // Only a leading "~/" refers to home
        assert_eq!(expand_tilde("~other/x"), "~other/x");
    }
}
