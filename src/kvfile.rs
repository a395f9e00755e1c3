//! Sectioned `key = value` text files.
//!
//! Both the metadata cache (`%TEMP%\envtool.cache`) and the configuration
//! file (`%APPDATA%\envtool.cfg`) use the same line format: `#`/`;` comment
//! lines, `[section]` headers, and `key = value` records belonging to the
//! most recent header. Keys seen before any header land in an unnamed
//! section. Line order within a section is preserved across a rewrite.

use std::path::Path;

use anyhow::Result;
use fs_err as fs;

#[derive(Debug, Default, Clone)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: String) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, v)) => *v = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.entries.len() != before
    }
}

#[derive(Debug, Default, Clone)]
pub struct KvFile {
    pub sections: Vec<Section>,
}

impl KvFile {
    /// Parse from text. Malformed lines are skipped; this format is advisory
    /// state, never a hard failure.
    pub fn parse(text: &str) -> KvFile {
        let mut file = KvFile::default();
        let mut current = Section::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if !current.name.is_empty() || !current.entries.is_empty() {
                    file.sections.push(std::mem::take(&mut current));
                }
                current.name = name.trim().to_string();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                current
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            } else {
                tracing::debug!("ignoring malformed line: {line:?}");
            }
        }
        if !current.name.is_empty() || !current.entries.is_empty() {
            file.sections.push(current);
        }
        file
    }

    pub fn load(path: &Path) -> KvFile {
        match fs::read_to_string(path) {
            Ok(text) => KvFile::parse(&text),
            Err(err) => {
                tracing::debug!("{}: {err}; starting empty", path.display());
                KvFile::default()
            }
        }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        if let Some(pos) = self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            &mut self.sections[pos]
        } else {
            self.sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            self.sections.last_mut().unwrap()
        }
    }

    pub fn to_text(&self, banner: &str) -> String {
        let mut out = String::new();
        if !banner.is_empty() {
            for line in banner.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        for section in &self.sections {
            if !section.name.is_empty() {
                out.push_str(&format!("[{}]\n", section.name));
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("{key} = {value}\n"));
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path, banner: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_text(banner))?;
        Ok(())
    }
}
