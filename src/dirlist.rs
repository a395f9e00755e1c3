//! Directory lists built from PATH-like environment values.
//!
//! One [`DirList`] is the parsed form of a single environment value (or of
//! one probe's output). Entries keep both the expanded text used for
//! filesystem access and the canonical text used for duplicate detection
//! and display, plus the classification flags the driver turns into
//! warnings.

use std::path::Path;

use crate::canon;

#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Component text exactly as found in the source value.
    pub raw: String,
    /// After `%VAR%` expansion and quote/trailing-separator cleanup; the
    /// spelling used for filesystem access.
    pub expanded: String,
    /// Canonical spelling used for duplicate keys and display.
    pub canonical: String,
    /// Where the entry came from (env-var or probe name); debug provenance.
    pub origin: String,
    pub exists: bool,
    pub is_dir: bool,
    pub is_cwd: bool,
    /// Entry lives under a System32 that WOW64 would redirect for this
    /// process; a 32-bit walk sees different files than a native one.
    pub native_shadow: bool,
    /// False when an unresolved `%NAME%` remains; such entries are listed
    /// and counted but never walked.
    pub expansion_ok: bool,
    /// `c:` style entry with no separator after the drive.
    pub bare_drive: bool,
    /// Contains spaces but was not quoted in the source value.
    pub needs_quotes: bool,
    /// How many earlier entries in the same list share this entry's
    /// duplicate key.
    pub duplicates: usize,
}

impl DirEntry {
    pub fn dedup_key(&self, case_sensitive: bool) -> String {
        canon::dedup_key(&self.canonical, case_sensitive)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExpandMode {
    /// Process environment.
    Process,
    /// System environment block (registry `REG_EXPAND_SZ` semantics).
    System,
}

#[derive(Debug, Clone, Copy)]
pub struct SplitOptions<'a> {
    pub case_sensitive: bool,
    pub separator: char,
    pub expand: ExpandMode,
    pub cygwin_root: Option<&'a Path>,
}

impl Default for SplitOptions<'_> {
    fn default() -> Self {
        SplitOptions {
            case_sensitive: false,
            separator: ';',
            expand: ExpandMode::Process,
            cygwin_root: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DirList {
    /// Env-var or probe this list was built from.
    pub origin: String,
    pub entries: Vec<DirEntry>,
}

impl DirList {
    pub fn new(origin: impl Into<String>) -> DirList {
        DirList {
            origin: origin.into(),
            entries: Vec::new(),
        }
    }

    /// Split one environment value into entries.
    ///
    /// Empty components (as produced by a doubled separator or a trailing
    /// one) are dropped. Matched quotes are trimmed, a single trailing
    /// separator is removed unless the component is a bare drive root, and
    /// the current-directory tokens `.`, `.\`, `./` are recognized.
    pub fn split(name: &str, value: &str, opts: &SplitOptions) -> DirList {
        let mut list = DirList::new(name);
        for raw in value.split(opts.separator) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            list.push_component(raw, opts);
        }
        list
    }

    fn push_component(&mut self, raw: &str, opts: &SplitOptions) {
        let quoted = raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"');
        let unquoted = if quoted { &raw[1..raw.len() - 1] } else { raw };

        let expanded = match opts.expand {
            ExpandMode::Process => canon::expand(unquoted),
            ExpandMode::System => canon::expand_system(unquoted),
        };
        let mut text = expanded.text;
        // One trailing separator is tolerated, but `c:\` must keep its root.
        if text.len() > 1 && (text.ends_with('\\') || text.ends_with('/')) {
            let trimmed = &text[..text.len() - 1];
            if !canon::is_bare_drive(trimmed) {
                text = trimmed.to_string();
            }
        }

        let is_cwd = canon::is_cwd_token(&text);
        let bare_drive = canon::is_bare_drive(&text);
        let needs_quotes = !quoted && text.contains(' ');
        let canonical = if expanded.complete {
            canon::canonicalize(&text, opts.cygwin_root)
        } else {
            text.clone()
        };
        let class = if expanded.complete {
            canon::classify(&text)
        } else {
            canon::PathClass::default()
        };
        let native_shadow = is_native_shadow_path(&canonical.to_ascii_lowercase());

        let mut entry = DirEntry {
            raw: raw.to_string(),
            expanded: text,
            canonical,
            origin: self.origin.clone(),
            exists: class.exists,
            is_dir: class.is_dir,
            is_cwd: is_cwd || class.is_cwd,
            native_shadow,
            expansion_ok: expanded.complete,
            bare_drive,
            needs_quotes,
            duplicates: 0,
        };
        entry.duplicates = self.count_duplicates(&entry, opts.case_sensitive);
        self.entries.push(entry);
    }

    /// Append a directory produced by a probe. The text is trusted to be a
    /// plain directory path; it still gets canonicalized and classified.
    pub fn push_dir(&mut self, text: &str, cygwin_root: Option<&Path>, case_sensitive: bool) {
        let class = canon::classify(text);
        let mut entry = DirEntry {
            raw: text.to_string(),
            expanded: text.to_string(),
            canonical: canon::canonicalize(text, cygwin_root),
            origin: self.origin.clone(),
            exists: class.exists,
            is_dir: class.is_dir,
            is_cwd: class.is_cwd,
            native_shadow: false,
            expansion_ok: true,
            bare_drive: false,
            needs_quotes: false,
            duplicates: 0,
        };
        entry.duplicates = self.count_duplicates(&entry, case_sensitive);
        self.entries.push(entry);
    }

    fn count_duplicates(&self, entry: &DirEntry, case_sensitive: bool) -> usize {
        let key = entry.dedup_key(case_sensitive);
        self.entries
            .iter()
            .filter(|e| e.dedup_key(case_sensitive) == key)
            .count()
    }

    /// Make sure the current directory is walked first, the way the shell
    /// itself resolves commands on Windows.
    pub fn add_cwd_if_absent(&mut self) {
        if self.entries.iter().any(|e| e.is_cwd) {
            return;
        }
        let class = canon::classify(".");
        let entry = DirEntry {
            raw: ".".to_string(),
            expanded: ".".to_string(),
            canonical: canon::canonicalize(".", None),
            origin: self.origin.clone(),
            exists: class.exists,
            is_dir: class.is_dir,
            is_cwd: true,
            native_shadow: false,
            expansion_ok: true,
            bare_drive: false,
            needs_quotes: false,
            duplicates: 0,
        };
        self.entries.insert(0, entry);
    }

    /// Stable removal of duplicates; the first occurrence wins and the
    /// surviving entries report zero duplicates again.
    pub fn uniquify(&mut self, case_sensitive: bool) {
        let mut seen = std::collections::HashSet::new();
        self.entries.retain(|e| seen.insert(e.dedup_key(case_sensitive)));
        for entry in &mut self.entries {
            entry.duplicates = 0;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(windows)]
fn is_native_shadow_path(lower: &str) -> bool {
    // Under WOW64 a 32-bit process walking System32 is silently redirected
    // to SysWOW64; Sysnative exposes the real directory.
    std::env::var_os("PROCESSOR_ARCHITEW6432").is_some() && lower.contains("\\system32")
}

#[cfg(not(windows))]
fn is_native_shadow_path(_lower: &str) -> bool {
    false
}
