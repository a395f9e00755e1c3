//! `%APPDATA%\envtool.cfg`.
//!
//! The configuration file shares the cache's sectioned key/value format.
//! The sections envtool itself consumes are the per-area ignore lists
//! (`[Compiler]`, `[Registry]`, `[Python]`, `[PE-resources]`,
//! `[EveryThing]`) where every `ignore = <glob>` line suppresses matching
//! paths, plus `[Login]` and the un-sectioned `beep.*`/`ETP.*` keys that
//! external integrations read through [`Config::value`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::kvfile::KvFile;

#[derive(Debug, Default)]
pub struct Config {
    file: KvFile,
    ignore: HashMap<String, Vec<Pattern>>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .map(|dir| dir.join("envtool.cfg"))
    }

    pub fn load(path: Option<&Path>) -> Config {
        let file = match path {
            Some(path) => KvFile::load(path),
            None => KvFile::default(),
        };
        Config::from_file(file)
    }

    pub(crate) fn from_file(file: KvFile) -> Config {
        let mut ignore: HashMap<String, Vec<Pattern>> = HashMap::new();
        for section in &file.sections {
            for (key, value) in &section.entries {
                if !key.eq_ignore_ascii_case("ignore") {
                    continue;
                }
                // Globs in the file use backslashes; store them with forward
                // slashes and normalize candidates the same way on match.
                match Pattern::new(&value.replace('\\', "/")) {
                    Ok(pattern) => ignore
                        .entry(section.name.to_ascii_lowercase())
                        .or_default()
                        .push(pattern),
                    Err(err) => {
                        tracing::warn!("[{}] bad ignore glob {value:?}: {err}", section.name)
                    }
                }
            }
        }
        Config { file, ignore }
    }

    /// True when `candidate` matches any `ignore` glob of `section`.
    /// Matching is case-insensitive to mirror the filesystem.
    pub fn is_ignored(&self, section: &str, candidate: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let candidate = candidate.replace('\\', "/");
        self.ignore
            .get(&section.to_ascii_lowercase())
            .map(|patterns| patterns.iter().any(|p| p.matches_with(&candidate, options)))
            .unwrap_or(false)
    }

    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.file.section(section)?.get(key)
    }

    /// `[Compiler] cygwin_root` override for POSIX-path conversion.
    pub fn cygwin_root(&self) -> Option<PathBuf> {
        self.value("Compiler", "cygwin_root").map(PathBuf::from)
    }

    pub fn everything_host(&self) -> Option<&str> {
        self.value("EveryThing", "host")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config::from_file(KvFile::parse(
            "\
beep.enable = 0

[Compiler]
ignore = c:\\old-tools\\*
ignore = *\\avr-gcc.exe

[Registry]
ignore = *\\uninstall.exe

[Login]
host = ftp.example.net
",
        ))
    }

    #[test]
    fn ignore_globs_are_per_section_and_case_insensitive() {
        let config = sample();
        assert!(config.is_ignored("Compiler", "C:\\Old-Tools\\gcc.exe"));
        assert!(config.is_ignored("compiler", "d:\\bin\\avr-gcc.exe"));
        assert!(!config.is_ignored("Compiler", "c:\\mingw64\\bin\\gcc.exe"));
        assert!(config.is_ignored("Registry", "c:\\apps\\uninstall.exe"));
        assert!(!config.is_ignored("Python", "c:\\apps\\uninstall.exe"));
    }

    #[test]
    fn plain_values_stay_reachable() {
        let config = sample();
        assert_eq!(config.value("", "beep.enable"), Some("0"));
        assert_eq!(config.value("Login", "host"), Some("ftp.example.net"));
        assert_eq!(config.value("Login", "missing"), None);
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let config = Config::load(Some(Path::new("definitely/not/here.cfg")));
        assert!(!config.is_ignored("Compiler", "c:\\x"));
        assert_eq!(config.value("Login", "host"), None);
    }
}
