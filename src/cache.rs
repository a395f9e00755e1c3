//! Persisted probe-memoization.
//!
//! Spawning compilers and walking the vcpkg ports tree is the expensive part
//! of a run, so the results are kept in `%TEMP%\envtool.cache` between
//! invocations. The cache is advisory: the filesystem stays the ground
//! truth, and a client that finds a cached filename gone is expected to
//! delete the related keys and re-probe. Read failures degrade to an empty
//! cache; the file is rewritten once on clean exit.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;

use crate::kvfile::KvFile;

#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    file: KvFile,
    dirty: bool,
    enabled: bool,
}

impl Cache {
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("envtool.cache")
    }

    pub fn open(path: PathBuf) -> Cache {
        Cache {
            file: KvFile::load(&path),
            path,
            dirty: false,
            enabled: true,
        }
    }

    /// A cache that never hits and never persists (`-d` runs use this to
    /// force live probing).
    pub fn disabled() -> Cache {
        Cache {
            path: PathBuf::new(),
            file: KvFile::default(),
            dirty: false,
            enabled: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.file.section(section)?.get(key)
    }

    pub fn get_parsed<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key)?.trim().parse().ok()
    }

    pub fn get2<A: FromStr, B: FromStr>(&self, section: &str, key: &str) -> Option<(A, B)> {
        let mut it = self.get(section, key)?.splitn(2, ',');
        Some((
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
        ))
    }

    pub fn get3<A: FromStr, B: FromStr, C: FromStr>(
        &self,
        section: &str,
        key: &str,
    ) -> Option<(A, B, C)> {
        let mut it = self.get(section, key)?.splitn(3, ',');
        Some((
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
        ))
    }

    pub fn get4<A: FromStr, B: FromStr, C: FromStr, D: FromStr>(
        &self,
        section: &str,
        key: &str,
    ) -> Option<(A, B, C, D)> {
        let mut it = self.get(section, key)?.splitn(4, ',');
        Some((
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
            it.next()?.trim().parse().ok()?,
        ))
    }

    pub fn put(&mut self, section: &str, key: &str, value: impl Display) {
        if !self.enabled {
            return;
        }
        self.file.section_mut(section).set(key, value.to_string());
        self.dirty = true;
    }

    pub fn put2(&mut self, section: &str, key: &str, a: impl Display, b: impl Display) {
        self.put(section, key, format!("{a},{b}"));
    }

    pub fn put3(
        &mut self,
        section: &str,
        key: &str,
        a: impl Display,
        b: impl Display,
        c: impl Display,
    ) {
        self.put(section, key, format!("{a},{b},{c}"));
    }

    pub fn put4(
        &mut self,
        section: &str,
        key: &str,
        a: impl Display,
        b: impl Display,
        c: impl Display,
        d: impl Display,
    ) {
        self.put(section, key, format!("{a},{b},{c},{d}"));
    }

    pub fn del(&mut self, section: &str, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match self
            .file
            .sections
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(section))
        {
            Some(sec) => {
                let removed = sec.remove(key);
                self.dirty |= removed;
                removed
            }
            None => false,
        }
    }

    /// Remove every key in `section` starting with `prefix`; used to drop
    /// numbered record families (`port_0`, `port_1`, ...) in one go.
    pub fn del_prefixed(&mut self, section: &str, prefix: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let Some(sec) = self
            .file
            .sections
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(section))
        else {
            return 0;
        };
        let prefix = prefix.to_ascii_lowercase();
        let before = sec.entries.len();
        sec.entries
            .retain(|(k, _)| !k.to_ascii_lowercase().starts_with(&prefix));
        let removed = before - sec.entries.len();
        self.dirty |= removed > 0;
        removed
    }

    /// Number of keys in a section with the given prefix.
    pub fn count_prefixed(&self, section: &str, prefix: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let prefix = prefix.to_ascii_lowercase();
        self.file
            .section(section)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|(k, _)| k.to_ascii_lowercase().starts_with(&prefix))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Write back if anything changed since load.
    pub fn save(&mut self) -> Result<()> {
        if !self.enabled || !self.dirty {
            return Ok(());
        }
        self.file.save(
            &self.path,
            "envtool probe cache; delete this file to force re-probing",
        )?;
        self.dirty = false;
        Ok(())
    }
}
