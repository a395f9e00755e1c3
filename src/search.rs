//! The search driver.
//!
//! One [`Searcher`] per run: it owns the matcher and the reporter, borrows
//! the config and the cache, and exposes one method per mode. Every mode
//! reduces to the same shape — obtain a [`DirList`] from somewhere (an
//! environment value, a registry block, a compiler probe, a catalog), walk
//! its entries, and funnel matches into the reporter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fs_err as fs;
use glob::{MatchOptions, Pattern};

use crate::cache::Cache;
use crate::canon;
use crate::config::Config;
use crate::dirlist::{DirEntry, DirList, ExpandMode, SplitOptions};
use crate::owner;
use crate::pattern::Matcher;
use crate::probe::{self, Disables, ProbeOptions};
use crate::registry::{self, Hive};
use crate::report::{Hit, NoPeReader, PeReader, Reporter, SourceKind};
use crate::vcpkg;
use crate::{halt, Bitness};

/// Env-vars whose directories should not be empty; an empty one usually
/// means a stale installer entry.
const NO_EMPTY_DIRS: &[&str] = &[
    "PATH",
    "LIB",
    "INCLUDE",
    "LIBRARY_PATH",
    "C_INCLUDE_PATH",
    "CPLUS_INCLUDE_PATH",
];

const MAN_SUBDIRS: &[&str] = &[
    "cat1", "cat2", "cat3", "cat4", "cat5", "cat6", "cat7", "cat8", "cat9", "man1", "man2",
    "man3", "man4", "man5", "man6", "man7", "man8", "man9", "mann",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedFilter {
    /// Report trust status for every hit.
    All,
    OnlySigned,
    OnlyUnsigned,
}

#[derive(Debug, Clone)]
pub struct OwnerFilter {
    pub negated: bool,
    pub pattern: Pattern,
}

#[derive(Debug, Default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub bits: Bitness,
    pub verbose: bool,
    pub no_cwd: bool,
    pub no_sys: bool,
    pub no_usr: bool,
    pub no_app: bool,
    pub use_pe: bool,
    pub signed: Option<SignedFilter>,
    pub show_owner: bool,
    pub owner_filters: Vec<OwnerFilter>,
    pub show_descriptions: bool,
    pub disables: Disables,
}

pub struct Searcher<'a> {
    matcher: Matcher,
    opts: SearchOptions,
    config: &'a Config,
    cache: &'a mut Cache,
    pub reporter: Reporter,
    pe: Box<dyn PeReader>,
    cygwin_root: Option<PathBuf>,
    /// DESCRIPT.ION contents, keyed by directory.
    descriptions: HashMap<PathBuf, HashMap<String, String>>,
    warned_subdir_wildcards: bool,
}

impl<'a> Searcher<'a> {
    pub fn new(
        matcher: Matcher,
        opts: SearchOptions,
        config: &'a Config,
        cache: &'a mut Cache,
        reporter: Reporter,
    ) -> Searcher<'a> {
        Searcher::with_pe_reader(matcher, opts, config, cache, reporter, Box::new(NoPeReader))
    }

    pub fn with_pe_reader(
        matcher: Matcher,
        opts: SearchOptions,
        config: &'a Config,
        cache: &'a mut Cache,
        reporter: Reporter,
        pe: Box<dyn PeReader>,
    ) -> Searcher<'a> {
        let cygwin_root = config.cygwin_root().or_else(canon::detect_cygwin_root);
        Searcher {
            matcher,
            opts,
            config,
            cache,
            reporter,
            pe,
            cygwin_root,
            descriptions: HashMap::new(),
            warned_subdir_wildcards: false,
        }
    }

    pub fn into_reporter(self) -> Reporter {
        self.reporter
    }

    /// Modes use different default extensions; the driver swaps the
    /// matcher in before running each one.
    pub fn set_matcher(&mut self, matcher: Matcher) {
        self.matcher = matcher;
    }

    fn split_options(&self, expand: ExpandMode) -> SplitOptions<'_> {
        SplitOptions {
            case_sensitive: self.opts.case_sensitive,
            separator: ';',
            expand,
            cygwin_root: self.cygwin_root.as_deref(),
        }
    }

    // ------------------------------------------------------------------
    // Environment walks
    // ------------------------------------------------------------------

    /// Search one environment variable; a missing variable is a warning
    /// and the mode moves on.
    pub fn check_env(&mut self, env_name: &str, source: SourceKind, lib_mode: bool) -> usize {
        match canon::env_lookup(env_name) {
            Some(value) if !value.trim().is_empty() => {
                self.check_value(env_name, &value, ExpandMode::Process, source, lib_mode, false)
            }
            _ => {
                self.reporter.warn(format!("Env-var {env_name} not defined"));
                0
            }
        }
    }

    /// Like [`check_env`] for variables that are routinely absent.
    fn check_env_optional(&mut self, env_name: &str, source: SourceKind, lib_mode: bool) -> usize {
        match canon::env_lookup(env_name) {
            Some(value) if !value.trim().is_empty() => {
                self.check_value(env_name, &value, ExpandMode::Process, source, lib_mode, false)
            }
            _ => 0,
        }
    }

    /// Split one PATH-like value and walk it.
    pub fn check_value(
        &mut self,
        name: &str,
        value: &str,
        expand: ExpandMode,
        source: SourceKind,
        lib_mode: bool,
        add_cwd: bool,
    ) -> usize {
        let mut list = DirList::split(name, value, &self.split_options(expand));
        if add_cwd && !self.opts.no_cwd {
            list.add_cwd_if_absent();
        }
        self.walk_list(&list, source, lib_mode)
    }

    /// Walk every entry of a list, emitting the per-entry warnings of the
    /// error policy. Returns the number of hits.
    pub fn walk_list(&mut self, list: &DirList, source: SourceKind, lib_mode: bool) -> usize {
        let mut hits = 0;
        let mut warned_duplicate = false;
        for entry in &list.entries {
            if halt::halted() {
                break;
            }
            if entry.duplicates > 0 {
                if !warned_duplicate {
                    self.reporter.warn(format!(
                        "{}: directory \"{}\" is duplicated",
                        list.origin, entry.expanded
                    ));
                    warned_duplicate = true;
                }
                continue;
            }
            if !entry.expansion_ok {
                self.reporter.warn(format!(
                    "{}: entry \"{}\" has an unresolved %-reference; skipped",
                    list.origin, entry.raw
                ));
                continue;
            }
            if entry.bare_drive {
                self.reporter.warn(format!(
                    "{}: entry \"{}\" is missing a directory separator",
                    list.origin, entry.raw
                ));
            }
            if entry.needs_quotes {
                self.reporter.warn(format!(
                    "{}: entry \"{}\" contains spaces but is not quoted",
                    list.origin, entry.expanded
                ));
            }
            if !entry.exists {
                self.reporter.warn(format!(
                    "{}: directory \"{}\" doesn't exist",
                    list.origin, entry.expanded
                ));
                continue;
            }
            if entry.native_shadow && self.opts.verbose {
                self.reporter.warn(format!(
                    "{}: \"{}\" is redirected for 32-bit processes (see Sysnative)",
                    list.origin, entry.expanded
                ));
            }
            let (found, any_files) = self.walk_entry(entry, source, lib_mode);
            hits += found;
            if found == 0
                && !any_files
                && !entry.is_cwd
                && NO_EMPTY_DIRS.iter().any(|v| v.eq_ignore_ascii_case(&list.origin))
            {
                self.reporter.warn(format!(
                    "{}: directory \"{}\" is empty",
                    list.origin, entry.expanded
                ));
            }
        }
        hits
    }

    /// Enumerate one directory entry; returns (hits, saw-anything).
    fn walk_entry(&mut self, entry: &DirEntry, source: SourceKind, lib_mode: bool) -> (usize, bool) {
        let mut base = PathBuf::from(&entry.expanded);
        let mut display_base = entry.canonical.clone();
        if let Some(subdir) = self.matcher.subdir() {
            if self.matcher.subdir_has_wildcards && !self.warned_subdir_wildcards {
                self.reporter.warn(format!(
                    "wildcards in the directory part \"{subdir}\" are matched literally"
                ));
                self.warned_subdir_wildcards = true;
            }
            base = base.join(subdir.replace('\\', std::path::MAIN_SEPARATOR_STR));
            display_base = format!("{display_base}\\{subdir}");
        }
        self.walk_dir(&base, &display_base, source, lib_mode)
    }

    fn walk_dir(
        &mut self,
        dir: &Path,
        display_base: &str,
        source: SourceKind,
        lib_mode: bool,
    ) -> (usize, bool) {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return (0, false);
        };
        let mut hits = 0;
        let mut any = false;
        let mut names: Vec<(String, bool)> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (e.file_name().to_string_lossy().into_owned(), is_dir)
            })
            .collect();
        names.sort();
        for (name, is_dir) in names {
            any = true;
            if !self.matcher.matches_name(&name) {
                continue;
            }
            if is_dir && lib_mode {
                continue;
            }
            let display = format!("{}\\{}", display_base.trim_end_matches('\\'), name);
            if self.emit_hit(&dir.join(&name), display, is_dir, source) {
                hits += 1;
            }
        }
        (hits, any)
    }

    // ------------------------------------------------------------------
    // Hit assembly
    // ------------------------------------------------------------------

    fn ignore_section(source: SourceKind) -> Option<&'static str> {
        match source {
            SourceKind::IncludeOrLib => Some("Compiler"),
            SourceKind::EnvCurrentUser
            | SourceKind::EnvLocalMachine
            | SourceKind::EnvSessionManager
            | SourceKind::CmakeRegistry => Some("Registry"),
            SourceKind::PythonEgg => Some("Python"),
            SourceKind::EverythingDb | SourceKind::EverythingFtp => Some("EveryThing"),
            _ => None,
        }
    }

    fn owner_allowed(&self, owner: Option<&str>) -> bool {
        if self.opts.owner_filters.is_empty() {
            return true;
        }
        let owner = owner.unwrap_or("");
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let mut any_positive = false;
        let mut positive_hit = false;
        for filter in &self.opts.owner_filters {
            let matched = filter.pattern.matches_with(owner, options);
            if filter.negated {
                if matched {
                    return false;
                }
            } else {
                any_positive = true;
                positive_hit |= matched;
            }
        }
        !any_positive || positive_hit
    }

    fn emit_hit(&mut self, path: &Path, display: String, is_dir: bool, source: SourceKind) -> bool {
        if let Some(section) = Self::ignore_section(source) {
            if self.config.is_ignored(section, &display) {
                self.reporter.ignored();
                return false;
            }
        }

        let mut hit = Hit::new(display, source);
        hit.is_dir = is_dir;
        let link_meta = fs::symlink_metadata(path).ok();
        if link_meta.as_ref().map(|m| m.file_type().is_symlink()) == Some(true) {
            hit.link_target = fs::read_link(path)
                .ok()
                .map(|t| t.to_string_lossy().into_owned());
        }
        if let Ok(meta) = fs::metadata(path) {
            hit.size = if meta.is_dir() { 0 } else { meta.len() };
            hit.mtime = meta.modified().ok();
            hit.is_dir = meta.is_dir();
        } else if let Some(meta) = link_meta {
            hit.size = meta.len();
            hit.mtime = meta.modified().ok();
        }

        if self.opts.show_owner || !self.opts.owner_filters.is_empty() {
            hit.owner = owner::file_owner(path);
            if !self.owner_allowed(hit.owner.as_deref()) {
                self.reporter.ignored();
                return false;
            }
            if !self.opts.show_owner {
                hit.owner = None;
            }
        }

        if self.opts.use_pe && !hit.is_dir && is_pe_candidate(path) {
            hit.pe = self
                .pe
                .inspect(path, self.opts.signed.is_some());
            match self.opts.bits {
                Bitness::Any => {}
                Bitness::Bits32 => {
                    if hit.pe.as_ref().map(|pe| pe.bits) == Some(64) {
                        self.reporter.ignored();
                        return false;
                    }
                }
                Bitness::Bits64 => {
                    if hit.pe.as_ref().map(|pe| pe.bits) == Some(32) {
                        self.reporter.ignored();
                        return false;
                    }
                }
            }
            match self.opts.signed {
                Some(SignedFilter::OnlySigned) => {
                    if hit.pe.as_ref().and_then(|pe| pe.verified) != Some(true) {
                        self.reporter.ignored();
                        return false;
                    }
                }
                Some(SignedFilter::OnlyUnsigned) => {
                    if hit.pe.as_ref().and_then(|pe| pe.verified) == Some(true) {
                        self.reporter.ignored();
                        return false;
                    }
                }
                Some(SignedFilter::All) | None => {}
            }
        }

        if !hit.is_dir && hit.link_target.is_none() {
            hit.shebang = read_shebang(path);
        }
        if self.opts.show_descriptions {
            if let Some(parent) = path.parent() {
                let leaf = path.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase());
                if let Some(leaf) = leaf {
                    hit.description = self.directory_descriptions(parent).get(&leaf).cloned();
                }
            }
        }

        self.reporter.report(hit);
        true
    }

    /// Lazily parse a 4NT/TCC `DESCRIPT.ION` file.
    fn directory_descriptions(&mut self, dir: &Path) -> &HashMap<String, String> {
        self.descriptions
            .entry(dir.to_path_buf())
            .or_insert_with(|| {
                fs::read_to_string(dir.join("DESCRIPT.ION"))
                    .map(|text| parse_descriptions(&text))
                    .unwrap_or_default()
            })
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    /// `--path`: process `PATH` (CWD first), App Paths, registry `PATH`
    /// blocks. Registry hits participate in the shadowing advisory.
    pub fn path_mode(&mut self) -> usize {
        let mut hits = match canon::env_lookup("PATH") {
            Some(value) => {
                self.check_value("PATH", &value, ExpandMode::Process, SourceKind::EnvDefault, false, true)
            }
            None => {
                self.reporter.warn("Env-var PATH not defined");
                0
            }
        };
        if !self.opts.no_app {
            hits += self.app_paths(Hive::CurrentUser, SourceKind::EnvCurrentUser);
            hits += self.app_paths(Hive::LocalMachine, SourceKind::EnvLocalMachine);
        }
        hits += self.registry_env(|env| env.path.clone(), "PATH", false);
        hits
    }

    fn app_paths(&mut self, hive: Hive, source: SourceKind) -> usize {
        let mut hits = 0;
        for record in registry::enumerate_app_paths(hive, self.opts.case_sensitive) {
            if halt::halted() {
                break;
            }
            if !self.matcher.matches_name(&record.key_name)
                && !self.matcher.matches_name(&record.file_name)
            {
                continue;
            }
            if !record.exists {
                self.reporter.warn(format!(
                    "{}\\App Paths\\{}: \"{}\" doesn't exist",
                    hive.label(),
                    record.key_name,
                    record.path
                ));
                continue;
            }
            let mut note = Hit::new(record.path.clone(), source);
            note.size = record.size;
            note.mtime = record.mtime;
            note.note = Some("(apps)".to_string());
            self.reporter.report(note);
            hits += 1;
        }
        hits
    }

    /// Walk one of `PATH`/`INCLUDE`/`LIB` from the registry environment
    /// blocks, honoring `--no-sys`/`--no-usr`.
    fn registry_env(
        &mut self,
        pick: impl Fn(&registry::RegistryEnv) -> Option<String>,
        label: &str,
        lib_mode: bool,
    ) -> usize {
        let mut hits = 0;
        if !self.opts.no_sys {
            let env = registry::scan_environment(Hive::LocalMachine, registry::SESSION_MANAGER_ENV);
            if let Some(value) = pick(&env) {
                hits += self.check_value(
                    &format!("{label} (HKLM)"),
                    &value,
                    ExpandMode::System,
                    SourceKind::EnvSessionManager,
                    lib_mode,
                    false,
                );
            }
        }
        if !self.opts.no_usr {
            let env = registry::scan_environment(Hive::CurrentUser, registry::USER_ENV);
            if let Some(value) = pick(&env) {
                hits += self.check_value(
                    &format!("{label} (HKCU)"),
                    &value,
                    ExpandMode::System,
                    SourceKind::EnvCurrentUser,
                    lib_mode,
                    false,
                );
            }
        }
        hits
    }

    /// `--include`: `INCLUDE` + GNU-style include variables + registry
    /// blocks + every probeable toolchain's include paths.
    pub fn include_mode(&mut self) -> usize {
        let mut hits = self.check_env("INCLUDE", SourceKind::EnvDefault, false);
        hits += self.check_env_optional("C_INCLUDE_PATH", SourceKind::EnvDefault, false);
        hits += self.check_env_optional("CPLUS_INCLUDE_PATH", SourceKind::EnvDefault, false);
        hits += self.registry_env(|env| env.include.clone(), "INCLUDE", false);
        hits += self.probe_toolchains(false);
        hits
    }

    /// `--lib`: `LIB` + `LIBRARY_PATH` + registry blocks + toolchain
    /// library paths. Directories never match here.
    pub fn lib_mode(&mut self) -> usize {
        let mut hits = self.check_env("LIB", SourceKind::EnvDefault, true);
        hits += self.check_env_optional("LIBRARY_PATH", SourceKind::EnvDefault, true);
        hits += self.registry_env(|env| env.lib.clone(), "LIB", true);
        hits += self.probe_toolchains(true);
        hits
    }

    fn probe_toolchains(&mut self, libraries: bool) -> usize {
        let mut hits = 0;
        let toolchains = probe::detect(self.config, &self.opts.disables);
        for tc in &toolchains {
            if halt::halted() {
                break;
            }
            if !tc.probeable() {
                if tc.ignored {
                    tracing::debug!("{}: ignored", tc.short_name);
                }
                continue;
            }
            let popts = ProbeOptions {
                case_sensitive: self.opts.case_sensitive,
                bits: self.opts.bits,
                cygwin_root: self.cygwin_root.as_deref(),
            };
            let probed = if libraries {
                tc.library_dirs(&popts)
            } else {
                tc.include_dirs(&popts)
            };
            match probed {
                Ok(list) => {
                    tracing::debug!("{}: {} directories", tc.short_name, list.len());
                    hits += self.walk_list(&list, SourceKind::IncludeOrLib, libraries);
                }
                Err(err) => {
                    self.reporter
                        .warn(format!("skipping {}: {err}", tc.short_name));
                }
            }
        }
        hits
    }

    /// `--man`: every `MANPATH` entry fans out over the conventional
    /// `cat1..cat9`/`man1..man9`/`mann` sub-directories.
    pub fn man_mode(&mut self) -> usize {
        let Some(value) = canon::env_lookup("MANPATH") else {
            self.reporter.warn("Env-var MANPATH not defined");
            return 0;
        };
        let list = DirList::split("MANPATH", &value, &self.split_options(ExpandMode::Process));
        if list.entries.iter().filter(|e| e.is_cwd).count() > 1 {
            self.reporter.warn("MANPATH: \".\" appears more than once");
        }
        let mut hits = 0;
        let mut warned_duplicate = false;
        for entry in &list.entries {
            if halt::halted() {
                break;
            }
            if entry.duplicates > 0 {
                if !warned_duplicate {
                    self.reporter.warn(format!(
                        "MANPATH: directory \"{}\" is duplicated",
                        entry.expanded
                    ));
                    warned_duplicate = true;
                }
                continue;
            }
            if !entry.expansion_ok {
                self.reporter.warn(format!(
                    "MANPATH: entry \"{}\" has an unresolved %-reference; skipped",
                    entry.raw
                ));
                continue;
            }
            if !entry.exists {
                self.reporter.warn(format!(
                    "MANPATH: directory \"{}\" doesn't exist",
                    entry.expanded
                ));
                continue;
            }
            for sub in MAN_SUBDIRS {
                let dir = Path::new(&entry.expanded).join(sub);
                if !dir.is_dir() {
                    continue;
                }
                let display = format!("{}\\{}", entry.canonical.trim_end_matches('\\'), sub);
                hits += self.walk_dir(&dir, &display, SourceKind::ManPage, false).0;
            }
        }
        hits
    }

    /// `--pkg`: `PKG_CONFIG_PATH`, with the pkg-config version memoized.
    pub fn pkg_mode(&mut self) -> usize {
        if let Some((exe, version)) = resolve_tool(
            self.cache,
            "pkgconfig",
            "pkg_config_exe",
            "pkg_config_version",
            "pkg-config",
            &["--version"],
        ) {
            tracing::debug!(
                "pkg-config {}.{} at {}",
                version.0,
                version.1,
                exe.display()
            );
        }
        self.check_env("PKG_CONFIG_PATH", SourceKind::PkgConfig, false)
    }

    /// `--cmake`: the Modules directory next to the cmake executable,
    /// `CMAKE_MODULE_PATH`, and the Kitware package registries.
    pub fn cmake_mode(&mut self) -> usize {
        let mut hits = 0;
        match resolve_tool(
            self.cache,
            "cmake",
            "cmake_exe",
            "cmake_version",
            "cmake",
            &["-version"],
        ) {
            Some((exe, version)) => {
                let modules = exe
                    .parent()
                    .and_then(Path::parent)
                    .map(|root| {
                        root.join("share")
                            .join(format!("cmake-{}.{}", version.0, version.1))
                            .join("Modules")
                    })
                    .filter(|dir| dir.is_dir());
                if let Some(modules) = modules {
                    let display = canon::canonicalize(&modules.to_string_lossy(), None);
                    hits += self
                        .walk_dir(&modules, &display, SourceKind::CmakeModule, false)
                        .0;
                } else {
                    self.reporter.warn(format!(
                        "cmake at \"{}\" has no Modules directory",
                        exe.display()
                    ));
                }
            }
            None => self.reporter.warn("cmake not found on PATH"),
        }
        hits += self.check_env_optional("CMAKE_MODULE_PATH", SourceKind::CmakeModule, false);
        for hive in [Hive::CurrentUser, Hive::LocalMachine] {
            for package in registry::enumerate_kitware_packages(hive) {
                if halt::halted() {
                    break;
                }
                let dir = PathBuf::from(&package.path);
                if !dir.is_dir() {
                    self.reporter.warn(format!(
                        "{}\\Kitware\\CMake\\Packages\\{}: \"{}\" doesn't exist",
                        hive.label(),
                        package.name,
                        package.path
                    ));
                    continue;
                }
                let display = canon::canonicalize(&package.path, None);
                hits += self
                    .walk_dir(&dir, &display, SourceKind::CmakeRegistry, false)
                    .0;
            }
        }
        hits
    }

    /// `--python[=variant]`: walk `PYTHONPATH`. Interpreter introspection
    /// belongs to an external collaborator; the variant only narrows the
    /// origin label.
    pub fn python_mode(&mut self, variant: Option<&str>) -> usize {
        if let Some(variant) = variant {
            tracing::debug!("python variant {variant} requested");
        }
        self.check_env("PYTHONPATH", SourceKind::PythonEgg, false)
    }

    /// `--evry[=host]`: the Everything engine (local window or remote FTP)
    /// is an external service; without one configured this mode only
    /// reports its absence.
    pub fn evry_mode(&mut self, host: Option<&str>) -> usize {
        let host = host
            .map(str::to_string)
            .or_else(|| self.config.everything_host().map(str::to_string));
        match host {
            Some(host) => self.reporter.warn(format!(
                "Everything service at \"{host}\" is not reachable in this build"
            )),
            None => self
                .reporter
                .warn("no Everything service configured ([EveryThing] section)"),
        }
        0
    }

    /// `--vcpkg[=all]`: query the port catalog; `all` adds the installed
    /// file lists and orphaned binary archives.
    pub fn vcpkg_mode(&mut self, all: bool) -> usize {
        let Some(root) = vcpkg::resolve_root() else {
            self.reporter
                .warn("VCPKG_ROOT not set and vcpkg not found on PATH");
            return 0;
        };
        if let Some((exe, version)) = vcpkg::resolve_exe(self.cache) {
            tracing::debug!(
                "vcpkg {}.{}.{} at {}",
                version.0,
                version.1,
                version.2,
                exe.display()
            );
        }
        let catalog = vcpkg::Catalog::load(root, self.cache);
        let mut hits = 0;

        for idx in catalog.find_ports(&self.matcher) {
            if halt::halted() {
                break;
            }
            let port = catalog.port_details(idx);
            let mut line = format!("{:<28} {}", port.name, port.version);
            if !port.homepage.is_empty() {
                line.push_str(&format!("  {}", port.homepage));
            }
            println!("{line}");
            if self.opts.verbose && !port.description.is_empty() {
                println!("       {}", port.description);
            }
            for dep in catalog.dependency_report(idx, self.opts.verbose) {
                println!("{dep}");
            }
            self.reporter.external_match();
            hits += 1;
        }

        if all {
            let installed = catalog.installed_matching(&self.matcher, self.opts.bits);
            for &idx in &installed {
                let package = &catalog.installed[idx];
                for file in &package.files {
                    let path = catalog.root.join("installed").join(file);
                    let display = canon::canonicalize(&path.to_string_lossy(), None);
                    if self.emit_hit(&path, display, false, SourceKind::Vcpkg) {
                        hits += 1;
                    }
                }
            }
            if let Some(archive_root) = vcpkg::binary_cache_root() {
                for orphan in catalog.orphaned_archives(&archive_root) {
                    self.reporter.warn(format!(
                        "orphaned binary archive \"{}\"",
                        orphan.display()
                    ));
                }
            }
        }
        hits
    }

    /// `--check`: no pattern, no hits — a diagnostic sweep over every
    /// known search root.
    pub fn check_mode(&mut self) {
        for var in [
            "PATH",
            "LIB",
            "INCLUDE",
            "LIBRARY_PATH",
            "C_INCLUDE_PATH",
            "CPLUS_INCLUDE_PATH",
            "MANPATH",
            "PKG_CONFIG_PATH",
            "CMAKE_MODULE_PATH",
            "PYTHONPATH",
        ] {
            let Some(value) = canon::env_lookup(var) else {
                continue;
            };
            let list = DirList::split(var, &value, &self.split_options(ExpandMode::Process));
            let mut problems = 0;
            for entry in &list.entries {
                if entry.duplicates > 0 {
                    self.reporter
                        .warn(format!("{var}: \"{}\" is duplicated", entry.expanded));
                    problems += 1;
                }
                if !entry.expansion_ok {
                    self.reporter
                        .warn(format!("{var}: \"{}\" has an unresolved %-reference", entry.raw));
                    problems += 1;
                } else if !entry.exists {
                    self.reporter
                        .warn(format!("{var}: \"{}\" doesn't exist", entry.expanded));
                    problems += 1;
                }
                if entry.needs_quotes {
                    self.reporter.warn(format!(
                        "{var}: \"{}\" contains spaces but is not quoted",
                        entry.expanded
                    ));
                    problems += 1;
                }
            }
            println!(
                "{var:<20} {:>3} entries, {problems} problem(s)",
                list.len()
            );
        }

        for hive in [Hive::CurrentUser, Hive::LocalMachine] {
            let records = registry::enumerate_app_paths(hive, self.opts.case_sensitive);
            let stale = records.iter().filter(|r| !r.exists).count();
            println!(
                "{:<20} {:>3} App Paths entries, {stale} stale",
                hive.label(),
                records.len()
            );
            for record in records.iter().filter(|r| !r.exists) {
                self.reporter.warn(format!(
                    "{}\\App Paths\\{}: \"{}\" doesn't exist",
                    hive.label(),
                    record.key_name,
                    record.path
                ));
            }
        }
    }
}

fn is_pe_candidate(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            matches!(ext.as_str(), "exe" | "dll" | "sys" | "ocx" | "drv" | "cpl")
        })
        .unwrap_or(false)
}

/// First line of a `#!` script, if the file starts with one.
fn read_shebang(path: &Path) -> Option<String> {
    use std::io::Read;
    let mut file = fs::File::open(path).ok()?;
    let mut buf = [0u8; 256];
    let n = file.read(&mut buf).ok()?;
    let head = &buf[..n];
    if !head.starts_with(b"#!") {
        return None;
    }
    let line = head.split(|&b| b == b'\n' || b == b'\r').next()?;
    Some(String::from_utf8_lossy(line).trim().to_string())
}

/// Parse a 4NT/TCC `DESCRIPT.ION` file: `name description` per line, the
/// name quoted when it contains spaces.
fn parse_descriptions(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, descr) = if let Some(rest) = line.strip_prefix('"') {
            match rest.split_once('"') {
                Some((name, descr)) => (name, descr.trim()),
                None => continue,
            }
        } else {
            match line.split_once(char::is_whitespace) {
                Some((name, descr)) => (name, descr.trim()),
                None => continue,
            }
        };
        if !name.is_empty() && !descr.is_empty() {
            map.insert(name.to_ascii_lowercase(), descr.to_string());
        }
    }
    map
}

/// Resolve a helper tool through the cache, invalidating a stale record
/// when the remembered executable vanished, then re-probing `PATH` and the
/// version output.
fn resolve_tool(
    cache: &mut Cache,
    section: &str,
    exe_key: &str,
    version_key: &str,
    program: &str,
    version_args: &[&str],
) -> Option<(PathBuf, (u32, u32, u32, u32))> {
    if let Some(cached) = cache.get(section, exe_key).map(PathBuf::from) {
        if cached.is_file() {
            if let Some(version) = cache.get4(section, version_key) {
                return Some((cached, version));
            }
        } else {
            tracing::debug!("cached {program} at {} is gone", cached.display());
            cache.del(section, exe_key);
            cache.del(section, version_key);
        }
    }
    let exe = which::which(program).ok()?;
    let version = crate::spawn::capture(&exe, version_args)
        .ok()
        .and_then(|lines| crate::spawn::version_numbers(&lines))
        .unwrap_or((0, 0, 0, 0));
    cache.put(section, exe_key, exe.display());
    cache.put4(
        section,
        version_key,
        version.0,
        version.1,
        version.2,
        version.3,
    );
    Some((exe, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::DefaultExt;
    use crate::report::ReportOptions;

    struct Fixture {
        _cache_dir: tempfile::TempDir,
        config: Config,
        cache: Cache,
    }

    impl Fixture {
        fn new() -> Fixture {
            let cache_dir = tempfile::tempdir().unwrap();
            Fixture {
                cache: Cache::open(cache_dir.path().join("envtool.cache")),
                _cache_dir: cache_dir,
                config: Config::default(),
            }
        }

        fn searcher(&mut self, pattern: &str) -> Searcher<'_> {
            let matcher = Matcher::glob(pattern, false, DefaultExt::DotStar).unwrap();
            let reporter = Reporter::new(ReportOptions {
                quiet: true,
                ..ReportOptions::default()
            });
            Searcher::new(
                matcher,
                SearchOptions::default(),
                &self.config,
                &mut self.cache,
                reporter,
            )
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn duplicated_directory_is_walked_once() {
        let dir = tempfile::tempdir().unwrap();
        let windows = dir.path().join("windows");
        let system32 = dir.path().join("system32");
        touch(&system32.join("notepad.exe"));
        fs::create_dir_all(&windows).unwrap();

        let value = format!(
            "{};{};{};",
            windows.display(),
            system32.display(),
            system32.display()
        );
        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("notepad.exe");
        let hits = searcher.check_value(
            "PATH",
            &value,
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        assert_eq!(hits, 1);
        let totals = searcher.into_reporter().finish();
        assert_eq!(totals.hits, 1);
        // One duplicate warning, one empty-directory warning for `windows`.
        assert!(totals.warnings >= 1);
    }

    #[test]
    fn missing_variable_warns_and_yields_nothing() {
        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("stdio.h");
        let hits = searcher.check_env("ENVTOOL_TEST_NO_SUCH_VAR", SourceKind::EnvDefault, false);
        assert_eq!(hits, 0);
        assert_eq!(searcher.into_reporter().finish().warnings, 1);
    }

    #[test]
    fn unresolved_reference_is_skipped_but_missing_dir_warns() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        touch(&real.join("tool.exe"));
        let value = format!(
            "%ENVTOOL_TEST_NO_SUCH_VAR%\\bin;{};{}",
            real.display(),
            dir.path().join("gone").display()
        );
        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("tool.exe");
        let hits = searcher.check_value(
            "PATH",
            &value,
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        assert_eq!(hits, 1);
        let totals = searcher.into_reporter().finish();
        assert_eq!(totals.warnings, 2);
    }

    #[test]
    fn library_mode_never_matches_directories() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        touch(&lib.join("zlib.lib"));
        fs::create_dir_all(lib.join("zlib.dir")).unwrap();

        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("zlib.*");
        let hits = searcher.check_value(
            "LIB",
            &lib.display().to_string(),
            ExpandMode::Process,
            SourceKind::EnvDefault,
            true,
            false,
        );
        assert_eq!(hits, 1);
    }

    #[test]
    fn empty_canonical_directory_warns() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("anything.exe");
        searcher.check_value(
            "PATH",
            &empty.display().to_string(),
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        assert_eq!(searcher.into_reporter().finish().warnings, 1);

        // The same directory under a non-canonical variable stays silent.
        let mut searcher = fixture.searcher("anything.exe");
        searcher.check_value(
            "MY_OWN_VAR",
            &empty.display().to_string(),
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        assert_eq!(searcher.into_reporter().finish().warnings, 0);
    }

    #[test]
    fn subdirectory_patterns_walk_below_each_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("python");
        touch(&root.join("Scripts").join("pip.exe"));

        let mut fixture = Fixture::new();
        let matcher = Matcher::glob("Scripts\\pip.exe", false, DefaultExt::DotStar).unwrap();
        let reporter = Reporter::new(ReportOptions {
            quiet: true,
            ..ReportOptions::default()
        });
        let mut searcher = Searcher::new(
            matcher,
            SearchOptions::default(),
            &fixture.config,
            &mut fixture.cache,
            reporter,
        );
        let hits = searcher.check_value(
            "PATH",
            &root.display().to_string(),
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        assert_eq!(hits, 1);
    }

    #[test]
    fn man_mode_fans_out_over_section_directories() {
        let dir = tempfile::tempdir().unwrap();
        let man = dir.path().join("man");
        touch(&man.join("man1").join("gcc.1"));
        touch(&man.join("cat5").join("gcc.5"));
        fs::create_dir_all(man.join("man9")).unwrap();

        std::env::set_var("MANPATH", man.display().to_string());
        let mut fixture = Fixture::new();
        let mut searcher = fixture.searcher("gcc.*");
        let hits = searcher.man_mode();
        std::env::remove_var("MANPATH");
        assert_eq!(hits, 2);
    }

    #[test]
    fn owner_filters_drop_unmatched_hits() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("tool.exe"));

        let mut fixture = Fixture::new();
        let matcher = Matcher::glob("tool.exe", false, DefaultExt::DotStar).unwrap();
        let reporter = Reporter::new(ReportOptions {
            quiet: true,
            ..ReportOptions::default()
        });
        let opts = SearchOptions {
            owner_filters: vec![OwnerFilter {
                negated: false,
                pattern: Pattern::new("*admin*").unwrap(),
            }],
            ..SearchOptions::default()
        };
        let mut searcher = Searcher::new(
            matcher,
            opts,
            &fixture.config,
            &mut fixture.cache,
            reporter,
        );
        let hits = searcher.check_value(
            "PATH",
            &dir.path().display().to_string(),
            ExpandMode::Process,
            SourceKind::EnvDefault,
            false,
            false,
        );
        // No owner information is available, so the positive filter
        // excludes the hit.
        assert_eq!(hits, 0);
        assert_eq!(searcher.into_reporter().finish().ignored, 1);
    }

    #[test]
    fn shebang_and_descriptions_are_attached() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.py");
        fs::write(&script, b"#!/usr/bin/env python3\nprint()\n").unwrap();
        fs::write(
            dir.path().join("DESCRIPT.ION"),
            "run.py The runner script\n\"two words.txt\" something else\n",
        )
        .unwrap();

        assert_eq!(
            read_shebang(&script).as_deref(),
            Some("#!/usr/bin/env python3")
        );
        let map = parse_descriptions(&fs::read_to_string(dir.path().join("DESCRIPT.ION")).unwrap());
        assert_eq!(map.get("run.py").map(String::as_str), Some("The runner script"));
        assert_eq!(
            map.get("two words.txt").map(String::as_str),
            Some("something else")
        );
    }

    #[test]
    fn stale_cached_tool_is_reprobed() {
        let mut fixture = Fixture::new();
        fixture
            .cache
            .put("cmake", "cmake_exe", "d:\\old\\cmake.exe");
        fixture.cache.put4("cmake", "cmake_version", 3, 20, 0, 0);
        let _ = resolve_tool(
            &mut fixture.cache,
            "cmake",
            "cmake_exe",
            "cmake_version",
            "envtool-test-not-a-real-cmake",
            &["-version"],
        );
        assert_eq!(fixture.cache.get("cmake", "cmake_exe"), None);
        assert_eq!(fixture.cache.get("cmake", "cmake_version"), None);
    }
}
