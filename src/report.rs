//! Hit formatting and run totals.
//!
//! Every match funnels through one [`Reporter`], which renders the fixed
//! fragment order (note, time, size, owner, path, link/she-bang), keeps the
//! running totals for the final summary, and watches for the registry/PATH
//! shadowing situation that gets an advisory footer of its own.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};

/// Where a hit came from; selects formatting, warnings and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    EnvDefault,
    EnvCurrentUser,
    EnvLocalMachine,
    EnvSessionManager,
    PythonEgg,
    EverythingDb,
    IncludeOrLib,
    ManPage,
    PkgConfig,
    EverythingFtp,
    CmakeRegistry,
    CmakeModule,
    Vcpkg,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::EnvDefault => "environment",
            SourceKind::EnvCurrentUser => "HKCU registry",
            SourceKind::EnvLocalMachine => "HKLM registry",
            SourceKind::EnvSessionManager => "Session Manager environment",
            SourceKind::PythonEgg => "PYTHONPATH",
            SourceKind::EverythingDb => "Everything database",
            SourceKind::IncludeOrLib => "compiler search path",
            SourceKind::ManPage => "MANPATH",
            SourceKind::PkgConfig => "PKG_CONFIG_PATH",
            SourceKind::EverythingFtp => "remote Everything",
            SourceKind::CmakeRegistry => "CMake package registry",
            SourceKind::CmakeModule => "CMake module path",
            SourceKind::Vcpkg => "vcpkg",
        }
    }

    /// Sources resolved through the registry rather than the process
    /// environment; these participate in the shadowing advisory.
    pub fn is_registry(self) -> bool {
        matches!(
            self,
            SourceKind::EnvCurrentUser
                | SourceKind::EnvLocalMachine
                | SourceKind::EnvSessionManager
                | SourceKind::CmakeRegistry
        )
    }

    pub fn is_default_env(self) -> bool {
        matches!(self, SourceKind::EnvDefault)
    }
}

/// What the external PE parser reports for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeInfo {
    pub bits: u16,
    pub checksum_ok: bool,
    pub version: (u16, u16, u16, u16),
    /// None when trust was not evaluated.
    pub verified: Option<bool>,
    pub signer: Option<String>,
}

/// Seam for the out-of-scope PE-image parser.
pub trait PeReader {
    fn inspect(&self, path: &Path, want_trust: bool) -> Option<PeInfo>;
}

/// Default collaborator: no PE information available.
pub struct NoPeReader;

impl PeReader for NoPeReader {
    fn inspect(&self, _path: &Path, _want_trust: bool) -> Option<PeInfo> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub path: String,
    pub mtime: Option<SystemTime>,
    pub size: u64,
    pub is_dir: bool,
    pub link_target: Option<String>,
    pub shebang: Option<String>,
    pub source: SourceKind,
    pub pe: Option<PeInfo>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub note: Option<String>,
}

impl Hit {
    pub fn new(path: impl Into<String>, source: SourceKind) -> Hit {
        Hit {
            path: path.into(),
            mtime: None,
            size: 0,
            is_dir: false,
            link_target: None,
            shebang: None,
            source,
            pe: None,
            description: None,
            owner: None,
            note: None,
        }
    }

    fn leaf(&self) -> &str {
        self.path
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Names,
    Files,
    Dirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub reverse: bool,
    pub exact_case: bool,
}

impl std::str::FromStr for SortSpec {
    type Err = anyhow::Error;

    /// `names|files|dirs[,reverse][,exact]`.
    fn from_str(s: &str) -> Result<SortSpec> {
        let mut key = None;
        let mut reverse = false;
        let mut exact_case = false;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "names" | "name" => key = Some(SortKey::Names),
                "files" | "file" => key = Some(SortKey::Files),
                "dirs" | "dir" => key = Some(SortKey::Dirs),
                "reverse" => reverse = true,
                "exact" => exact_case = true,
                other => bail!("unknown sort token {other:?}"),
            }
        }
        match key {
            Some(key) => Ok(SortSpec {
                key,
                reverse,
                exact_case,
            }),
            None => bail!("sort type missing in {s:?}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub show_size_total: bool,
    pub decimal_time: bool,
    pub unix_paths: bool,
    pub dirs_only: bool,
    pub quiet: bool,
    pub sort: Option<SortSpec>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub hits: usize,
    pub dirs: usize,
    pub bytes: u64,
    pub pe_version_ok: usize,
    pub verified: usize,
    pub remote_dups: usize,
    pub ignored: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct NameSources {
    default_env: bool,
    registry: bool,
}

pub struct Reporter {
    opts: ReportOptions,
    totals: Totals,
    buffered: Vec<Hit>,
    by_leaf: HashMap<String, NameSources>,
}

/// Group digits in threes, the way sizes are easiest to eyeball.
fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_time(mtime: Option<SystemTime>, decimal: bool) -> String {
    match mtime {
        Some(mtime) => {
            let local: DateTime<Local> = mtime.into();
            if decimal {
                local.format("%Y%m%d.%H%M%S").to_string()
            } else {
                local.format("%d %b %Y %H:%M:%S").to_string()
            }
        }
        None => "-- --- ---- --:--:--".to_string(),
    }
}

/// Render the single-line part of a hit in the fixed fragment order.
pub fn format_hit(hit: &Hit, opts: &ReportOptions) -> String {
    let mut line = String::new();
    match &hit.note {
        Some(note) => {
            let _ = write!(line, "{note:<7}");
        }
        None => line.push_str("       "),
    }
    let _ = write!(line, "{} ", format_time(hit.mtime, opts.decimal_time));
    if hit.is_dir {
        let _ = write!(line, "{:>15} ", "<DIR>");
    } else {
        let _ = write!(line, "{:>15} ", group_digits(hit.size));
    }
    if let Some(owner) = &hit.owner {
        let _ = write!(line, "{owner:<20} ");
    }
    let path = if opts.unix_paths {
        hit.path.replace('\\', "/")
    } else {
        hit.path.clone()
    };
    line.push_str(&path);
    if let Some(target) = &hit.link_target {
        let _ = write!(line, " -> {target}");
    } else if let Some(shebang) = &hit.shebang {
        let _ = write!(line, " ({shebang})");
    }
    line
}

/// Render the optional follow-up lines (PE version/trust, description).
pub fn format_details(hit: &Hit) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(pe) = &hit.pe {
        let (a, b, c, d) = pe.version;
        lines.push(format!(
            "       ver {a}.{b}.{c}.{d}, {}-bit, chksum {}",
            pe.bits,
            if pe.checksum_ok { "OK" } else { "BAD" }
        ));
        if let Some(verified) = pe.verified {
            let mut trust = if verified {
                "       (Verified)".to_string()
            } else {
                "       (Not trusted)".to_string()
            };
            if let Some(signer) = &pe.signer {
                let _ = write!(trust, ", {signer}");
            }
            lines.push(trust);
        }
    }
    if let Some(descr) = &hit.description {
        lines.push(format!("       {descr}"));
    }
    lines
}

fn sort_hits(hits: &mut [Hit], spec: SortSpec) {
    let name_key = |hit: &Hit| {
        if spec.exact_case {
            hit.leaf().to_string()
        } else {
            hit.leaf().to_ascii_lowercase()
        }
    };
    hits.sort_by(|a, b| {
        let primary = match spec.key {
            SortKey::Names => std::cmp::Ordering::Equal,
            // Files first, directories last (or the reverse for `dirs`).
            SortKey::Files => a.is_dir.cmp(&b.is_dir),
            SortKey::Dirs => b.is_dir.cmp(&a.is_dir),
        };
        let ordering = primary.then_with(|| name_key(a).cmp(&name_key(b)));
        if spec.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

impl Reporter {
    pub fn new(opts: ReportOptions) -> Reporter {
        Reporter {
            opts,
            totals: Totals::default(),
            buffered: Vec::new(),
            by_leaf: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ReportOptions {
        &self.opts
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Record one hit; printed immediately unless a sort mode buffers it.
    pub fn report(&mut self, hit: Hit) {
        if self.opts.dirs_only && !hit.is_dir {
            self.totals.ignored += 1;
            return;
        }
        self.totals.hits += 1;
        if hit.is_dir {
            self.totals.dirs += 1;
        }
        self.totals.bytes += hit.size;
        if let Some(pe) = &hit.pe {
            if pe.version != (0, 0, 0, 0) {
                self.totals.pe_version_ok += 1;
            }
            if pe.verified == Some(true) {
                self.totals.verified += 1;
            }
        }
        if hit.source == SourceKind::EverythingFtp {
            self.totals.remote_dups += 1;
        }

        let entry = self
            .by_leaf
            .entry(hit.leaf().to_ascii_lowercase())
            .or_default();
        entry.default_env |= hit.source.is_default_env();
        entry.registry |= hit.source.is_registry();

        if self.opts.sort.is_some() {
            self.buffered.push(hit);
        } else {
            self.print(&hit);
        }
    }

    fn print(&self, hit: &Hit) {
        println!("{}", format_hit(hit, &self.opts));
        for line in format_details(hit) {
            println!("{line}");
        }
    }

    pub fn ignored(&mut self) {
        self.totals.ignored += 1;
    }

    /// Count a match that is not a file hit (vcpkg port listings); it
    /// contributes to the exit code and the summary but prints elsewhere.
    pub fn external_match(&mut self) {
        self.totals.hits += 1;
    }

    /// User-facing warning; counted, and suppressed by `-q`.
    pub fn warn(&mut self, message: impl std::fmt::Display) {
        self.totals.warnings += 1;
        if !self.opts.quiet {
            eprintln!("envtool: {message}");
        }
    }

    /// True when some leaf name was found both on the default environment
    /// and through a registry source.
    pub fn has_shadowed_matches(&self) -> bool {
        self.by_leaf
            .values()
            .any(|sources| sources.default_env && sources.registry)
    }

    /// Flush buffered hits and print the summary; returns the totals.
    pub fn finish(mut self) -> Totals {
        if let Some(spec) = self.opts.sort {
            let mut hits = std::mem::take(&mut self.buffered);
            sort_hits(&mut hits, spec);
            for hit in &hits {
                self.print(hit);
            }
        }
        if !self.opts.quiet {
            let mut summary = format!("{} match(es) found", self.totals.hits);
            if self.opts.show_size_total {
                let _ = write!(summary, ", {} bytes", group_digits(self.totals.bytes));
            }
            if self.totals.ignored > 0 {
                let _ = write!(summary, ", {} ignored", self.totals.ignored);
            }
            println!("{summary}");
            if self.has_shadowed_matches() {
                println!(
                    "Note: some matches were found both on the default environment and in the \
                     registry (App Paths). Launching such a program from the Start menu may run \
                     a different binary than launching it from a shell."
                );
            }
        }
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, size: u64, is_dir: bool) -> Hit {
        Hit {
            size,
            is_dir,
            ..Hit::new(path, SourceKind::EnvDefault)
        }
    }

    #[test]
    fn fragment_order_and_size_grouping() {
        let mut h = hit("c:\\windows\\system32\\notepad.exe", 360448, false);
        h.mtime = Some(SystemTime::UNIX_EPOCH);
        let line = format_hit(&h, &ReportOptions::default());
        assert!(line.contains("360,448"));
        assert!(line.ends_with("c:\\windows\\system32\\notepad.exe"));
        let time_then_size = line.find("360,448").unwrap() > line.find("19").unwrap();
        assert!(time_then_size);
    }

    #[test]
    fn unix_paths_and_link_target() {
        let mut h = hit("c:\\tools\\bin", 0, true);
        h.link_target = Some("d:\\real\\bin".to_string());
        let opts = ReportOptions {
            unix_paths: true,
            ..ReportOptions::default()
        };
        let line = format_hit(&h, &opts);
        assert!(line.contains("c:/tools/bin -> d:\\real\\bin"));
        assert!(line.contains("<DIR>"));
    }

    #[test]
    fn pe_details_render_version_and_trust() {
        let mut h = hit("c:\\x\\a.dll", 10, false);
        h.pe = Some(PeInfo {
            bits: 64,
            checksum_ok: true,
            version: (10, 0, 19041, 1),
            verified: Some(true),
            signer: Some("Microsoft Windows".to_string()),
        });
        let details = format_details(&h);
        assert_eq!(details.len(), 2);
        assert!(details[0].contains("ver 10.0.19041.1"));
        assert!(details[0].contains("64-bit"));
        assert!(details[1].contains("(Verified), Microsoft Windows"));
    }

    #[test]
    fn sort_is_stable_with_reverse_and_exact() {
        let mut hits = vec![
            hit("c:\\b\\zeta.txt", 1, false),
            hit("c:\\a\\Alpha.txt", 1, false),
            hit("c:\\d\\sub", 0, true),
            hit("c:\\c\\alpha.txt", 1, false),
        ];
        sort_hits(
            &mut hits,
            SortSpec {
                key: SortKey::Names,
                reverse: false,
                exact_case: false,
            },
        );
        let leaves: Vec<_> = hits.iter().map(|h| h.leaf()).collect();
        // Stable: the two alphas keep their input order.
        assert_eq!(leaves, ["Alpha.txt", "alpha.txt", "sub", "zeta.txt"]);

        sort_hits(
            &mut hits,
            SortSpec {
                key: SortKey::Files,
                reverse: true,
                exact_case: false,
            },
        );
        assert!(hits[0].is_dir);

        let mut hits = vec![hit("c:\\1\\b.txt", 1, false), hit("c:\\2\\A.txt", 1, false)];
        sort_hits(
            &mut hits,
            SortSpec {
                key: SortKey::Names,
                reverse: false,
                exact_case: true,
            },
        );
        assert_eq!(hits[0].leaf(), "A.txt");
    }

    #[test]
    fn sort_spec_parsing() {
        let spec: SortSpec = "files,reverse".parse().unwrap();
        assert_eq!(spec.key, SortKey::Files);
        assert!(spec.reverse && !spec.exact_case);
        assert!("bogus".parse::<SortSpec>().is_err());
        assert!("reverse".parse::<SortSpec>().is_err());
    }

    #[test]
    fn totals_and_shadow_detection() {
        let mut reporter = Reporter::new(ReportOptions {
            quiet: true,
            ..ReportOptions::default()
        });
        reporter.report(hit("c:\\tools\\foo.exe", 100, false));
        let mut registry_hit = hit("d:\\other\\FOO.EXE", 200, false);
        registry_hit.source = SourceKind::EnvLocalMachine;
        reporter.report(registry_hit);
        reporter.report(hit("c:\\tools\\sub", 0, true));

        assert!(reporter.has_shadowed_matches());
        let totals = reporter.finish();
        assert_eq!(totals.hits, 3);
        assert_eq!(totals.dirs, 1);
        assert_eq!(totals.bytes, 300);
    }

    #[test]
    fn dirs_only_ignores_files() {
        let mut reporter = Reporter::new(ReportOptions {
            dirs_only: true,
            quiet: true,
            ..ReportOptions::default()
        });
        reporter.report(hit("c:\\x\\file.txt", 1, false));
        reporter.report(hit("c:\\x\\dir", 0, true));
        let totals = reporter.finish();
        assert_eq!(totals.hits, 1);
        assert_eq!(totals.ignored, 1);
    }
}
