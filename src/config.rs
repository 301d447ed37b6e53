//! Optional config file loading. Search order: ./novel-archiver.toml, then
//! $XDG_CONFIG_HOME/novel-archiver/config.toml (or ~/.config/novel-archiver/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "novel-archiver";
const LOCAL_CONFIG: &str = "novel-archiver.toml";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Where archived works are stored. Relative paths are relative to CWD.
    pub library_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Pause after each archived chapter, in milliseconds.
    pub chapter_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Author written into converted EPUBs.
    pub author: Option<String>,
    /// Indent archived chapter pages (default: true).
    pub pretty: Option<bool>,
}

/// Library used when neither `--library` nor `library_dir` is set: `<data dir>/novel-archiver`,
/// or `./novel-archiver` when the platform has no data directory.
pub fn default_library_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

/// Search order: (1) ./novel-archiver.toml, (2) $XDG_CONFIG_HOME/novel-archiver/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join(LOCAL_CONFIG)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join(APP_DIR).join("config.toml"));
    }
    load_first(&paths)
}

fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            return read_config(path).map(Some);
        }
    }
    Ok(None)
}

fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.library_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.chapter_delay_ms.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.author.is_none());
        assert!(c.pretty.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            library_dir = "novels"
            user_agent = "Custom/1.0"
            chapter_delay_ms = 2500
            timeout_secs = 60
            author = "Someone"
            pretty = false
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.library_dir.as_deref(), Some(Path::new("novels")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.chapter_delay_ms, Some(2500));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.author.as_deref(), Some("Someone"));
        assert_eq!(c.pretty, Some(false));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("library_dir = [").is_err());
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, "chapter_delay_ms = 10").unwrap();
        std::fs::write(&second, "chapter_delay_ms = 20").unwrap();
        let c = load_first(&[missing.clone(), first, second]).unwrap().unwrap();
        assert_eq!(c.chapter_delay_ms, Some(10));
        assert!(load_first(&[missing]).unwrap().is_none());
    }

    #[test]
    fn unreadable_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "pretty = \"yes\"").unwrap();
        let err = load_first(&[path]).unwrap_err();
        assert!(err.contains("bad.toml"));
    }
}
