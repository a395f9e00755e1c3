//! The vcpkg catalog.
//!
//! Two arena vectors — ports and installed packages — indexed by position,
//! with edges by index. A cold start walks `<root>/ports/` and parses the
//! installed-status file; warm starts rebuild the arenas from the `[vcpkg]`
//! cache section and only go back to disk for details (descriptions, file
//! lists) when asked.

pub mod manifest;
pub mod platform;
pub mod status;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use fs_err as fs;
use walkdir::WalkDir;
use which::which;

use crate::cache::Cache;
use crate::pattern::Matcher;
use crate::spawn;
use crate::Bitness;

pub use manifest::{Dependency, PortNode};
pub use status::InstalledPackage;

const SECTION: &str = "vcpkg";

#[derive(Debug, Default)]
pub struct Catalog {
    pub root: PathBuf,
    pub ports: Vec<PortNode>,
    pub installed: Vec<InstalledPackage>,
    by_name: HashMap<String, usize>,
}

/// `%VCPKG_ROOT%`, or the directory holding `vcpkg` on `PATH`.
pub fn resolve_root() -> Option<PathBuf> {
    if let Some(root) = std::env::var_os("VCPKG_ROOT") {
        let root = PathBuf::from(root);
        if root.is_dir() {
            return Some(root);
        }
    }
    which("vcpkg")
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolve the vcpkg executable and its version, memoized under
/// `vcpkg_exe`/`vcpkg_version`. A cached path whose file vanished drops
/// both keys and triggers a fresh `PATH` search.
pub fn resolve_exe(cache: &mut Cache) -> Option<(PathBuf, (u32, u32, u32, u32))> {
    if let Some(cached) = cache.get(SECTION, "vcpkg_exe").map(PathBuf::from) {
        if cached.is_file() {
            if let Some(version) = cache.get4(SECTION, "vcpkg_version") {
                return Some((cached, version));
            }
        } else {
            tracing::debug!("cached vcpkg at {} is gone", cached.display());
            cache.del(SECTION, "vcpkg_exe");
            cache.del(SECTION, "vcpkg_version");
        }
    }
    let exe = which("vcpkg").ok()?;
    let version = spawn::capture(&exe, &["version"])
        .ok()
        .and_then(|lines| spawn::version_numbers(&lines))
        .unwrap_or((0, 0, 0, 0));
    cache.put(SECTION, "vcpkg_exe", exe.display());
    cache.put4(
        SECTION, "vcpkg_version", version.0, version.1, version.2, version.3,
    );
    Some((exe, version))
}

impl Catalog {
    pub fn load(root: PathBuf, cache: &mut Cache) -> Catalog {
        if let Some(catalog) = Catalog::from_cache(&root, cache) {
            tracing::debug!(
                "vcpkg catalog from cache: {} ports, {} installed",
                catalog.ports.len(),
                catalog.installed.len()
            );
            return catalog;
        }
        let mut catalog = Catalog::scan(root);
        catalog.store(cache);
        catalog
    }

    /// Walk `ports/` and `installed/vcpkg/status`.
    pub fn scan(root: PathBuf) -> Catalog {
        let mut ports = Vec::new();
        let ports_dir = root.join("ports");
        let mut entries: Vec<PathBuf> = fs::read_dir(&ports_dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        entries.sort();
        for dir in entries {
            if crate::halt::halted() {
                break;
            }
            if let Some(port) = manifest::load_port(&dir) {
                ports.push(port);
            }
        }

        let status_file = root.join("installed").join("vcpkg").join("status");
        let mut installed = match fs::read_to_string(&status_file) {
            Ok(text) => status::parse_status(&text),
            Err(err) => {
                tracing::debug!("{}: {err}", status_file.display());
                Vec::new()
            }
        };
        for package in &mut installed {
            package.files = status::load_file_list(&root, package);
        }

        let mut catalog = Catalog {
            root,
            ports,
            installed,
            by_name: HashMap::new(),
        };
        catalog.reindex();
        catalog
    }

    fn reindex(&mut self) {
        self.by_name = self
            .ports
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.to_ascii_lowercase(), i))
            .collect();
        for package in &mut self.installed {
            package.port = self.by_name.get(&package.name.to_ascii_lowercase()).copied();
        }
    }

    fn flags(port: &PortNode) -> u32 {
        (port.has_control as u32)
            | (port.has_json as u32) << 1
            | (port.has_portfile as u32) << 2
    }

    fn store(&self, cache: &mut Cache) {
        if !cache.enabled() {
            return;
        }
        cache.del_prefixed(SECTION, "port_");
        cache.del_prefixed(SECTION, "installed_");
        cache.put(SECTION, "ports_count", self.ports.len());
        for (i, port) in self.ports.iter().enumerate() {
            cache.put3(
                SECTION,
                &format!("port_{i}"),
                &port.name,
                if port.version.is_empty() { "-" } else { port.version.as_str() },
                Self::flags(port),
            );
            if !port.dependencies.is_empty() {
                let deps: Vec<String> = port
                    .dependencies
                    .iter()
                    .map(|d| {
                        if d.qualifiers.is_empty() {
                            d.name.clone()
                        } else {
                            let quals: Vec<String> =
                                d.qualifiers.iter().map(|q| q.to_string()).collect();
                            format!("{} ({})", d.name, quals.join("&"))
                        }
                    })
                    .collect();
                cache.put(SECTION, &format!("port_deps_{i}"), deps.join(";"));
            }
            if !port.features.is_empty() {
                cache.put(SECTION, &format!("port_feats_{i}"), port.features.join(";"));
            }
        }
        cache.put(SECTION, "installed_count", self.installed.len());
        for (i, package) in self.installed.iter().enumerate() {
            cache.put4(
                SECTION,
                &format!("installed_{i}"),
                &package.name,
                if package.version.is_empty() { "-" } else { package.version.as_str() },
                &package.triplet,
                if package.abi.is_empty() { "-" } else { package.abi.as_str() },
            );
        }
    }

    fn from_cache(root: &Path, cache: &Cache) -> Option<Catalog> {
        let ports_count: usize = cache.get_parsed(SECTION, "ports_count")?;
        let installed_count: usize = cache.get_parsed(SECTION, "installed_count")?;
        let mut ports = Vec::with_capacity(ports_count);
        for i in 0..ports_count {
            let (name, version, flags): (String, String, u32) =
                cache.get3(SECTION, &format!("port_{i}"))?;
            let mut port = PortNode {
                name,
                version: if version == "-" { String::new() } else { version },
                has_control: flags & 1 != 0,
                has_json: flags & 2 != 0,
                has_portfile: flags & 4 != 0,
                ..PortNode::default()
            };
            if let Some(deps) = cache.get(SECTION, &format!("port_deps_{i}")) {
                port.dependencies = deps
                    .split(';')
                    .filter_map(manifest::parse_dependency)
                    .collect();
            }
            if let Some(feats) = cache.get(SECTION, &format!("port_feats_{i}")) {
                port.features = feats.split(';').map(str::to_string).collect();
            }
            ports.push(port);
        }
        let mut installed = Vec::with_capacity(installed_count);
        for i in 0..installed_count {
            let (name, version, triplet, abi): (String, String, String, String) =
                cache.get4(SECTION, &format!("installed_{i}"))?;
            let mut package = InstalledPackage {
                name,
                version: if version == "-" { String::new() } else { version },
                platforms: platform::triplet_platforms(&triplet),
                triplet,
                abi: if abi == "-" { String::new() } else { abi },
                status: "install ok installed".to_string(),
                ..InstalledPackage::default()
            };
            package.files = status::load_file_list(root, &package);
            installed.push(package);
        }
        let mut catalog = Catalog {
            root: root.to_path_buf(),
            ports,
            installed,
            by_name: HashMap::new(),
        };
        catalog.reindex();
        Some(catalog)
    }

    pub fn port_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Ports whose package name matches.
    pub fn find_ports(&self, matcher: &Matcher) -> Vec<usize> {
        self.ports
            .iter()
            .enumerate()
            .filter(|(_, p)| matcher.matches_name(&p.name))
            .map(|(i, _)| i)
            .collect()
    }

    /// A cache-rebuilt node carries no description/homepage; re-read the
    /// port directory when the caller wants the full record.
    pub fn port_details(&self, idx: usize) -> PortNode {
        let port = &self.ports[idx];
        if port.description.is_empty() && port.homepage.is_empty() {
            if let Some(full) = manifest::load_port(&self.root.join("ports").join(&port.name)) {
                return full;
            }
        }
        port.clone()
    }

    /// Render the dependency tree below one port. Each sub-package is
    /// expanded at most once per query (the visited set makes dependency
    /// cycles terminate).
    pub fn dependency_report(&self, idx: usize, verbose: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(idx);
        self.walk_deps(idx, verbose, 1, &mut visited, &mut lines);
        lines
    }

    fn walk_deps(
        &self,
        idx: usize,
        verbose: bool,
        depth: usize,
        visited: &mut HashSet<usize>,
        lines: &mut Vec<String>,
    ) {
        for dep in &self.ports[idx].dependencies {
            let mut line = format!("{}{}", "  ".repeat(depth), dep.name);
            if !dep.qualifiers.is_empty() {
                let quals: Vec<String> = dep.qualifiers.iter().map(|q| q.to_string()).collect();
                line.push_str(&format!(" ({})", quals.join("&")));
            }
            if let Some(di) = self.port_index(&dep.name) {
                if verbose {
                    if visited.insert(di) {
                        lines.push(line);
                        self.walk_deps(di, verbose, depth + 1, visited, lines);
                    } else {
                        line.push_str(" (shown above)");
                        lines.push(line);
                    }
                    continue;
                }
            }
            lines.push(line);
        }
    }

    /// Installed packages matching the pattern and the bitness filter.
    pub fn installed_matching(&self, matcher: &Matcher, bits: Bitness) -> Vec<usize> {
        self.installed
            .iter()
            .enumerate()
            .filter(|(_, p)| matcher.matches_name(&p.name))
            .filter(|(_, p)| status::matches_bits(&p.triplet, bits))
            .map(|(i, _)| i)
            .collect()
    }

    /// Zip archives in the binary cache whose ABI belongs to no installed
    /// package.
    pub fn orphaned_archives(&self, cache_root: &Path) -> Vec<PathBuf> {
        let known: HashSet<&str> = self
            .installed
            .iter()
            .filter(|p| !p.abi.is_empty())
            .map(|p| p.abi.as_str())
            .collect();
        let mut orphans = Vec::new();
        for entry in WalkDir::new(cache_root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().map(|e| e.eq_ignore_ascii_case("zip")) != Some(true) {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !known.contains(stem.as_str()) {
                orphans.push(path.to_path_buf());
            }
        }
        orphans.sort();
        orphans
    }

    /// Expected archive location for one installed package.
    pub fn archive_path(cache_root: &Path, abi: &str) -> Option<PathBuf> {
        if abi.len() < 2 {
            return None;
        }
        Some(cache_root.join(&abi[..2]).join(format!("{abi}.zip")))
    }
}

/// The binary-archive cache root: `%VCPKG_DEFAULT_BINARY_CACHE%`, then
/// `%LOCALAPPDATA%\vcpkg\archives`, then `%APPDATA%\vcpkg\archives` —
/// first one that exists.
pub fn binary_cache_root() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::var_os("VCPKG_DEFAULT_BINARY_CACHE") {
        candidates.push(PathBuf::from(dir));
    }
    for var in ["LOCALAPPDATA", "APPDATA"] {
        if let Some(dir) = std::env::var_os(var) {
            candidates.push(PathBuf::from(dir).join("vcpkg").join("archives"));
        }
    }
    candidates.into_iter().find(|dir| dir.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::DefaultExt;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    /// Fake vcpkg root: zlib depends on the two cmake helper ports, which
    /// share a sub-dependency to exercise the visited set.
    fn fake_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("ports/zlib/CONTROL"),
            "Source: zlib\nVersion: 1.2.13\nBuild-Depends: vcpkg-cmake, vcpkg-cmake-config\n",
        );
        write(
            &root.join("ports/vcpkg-cmake/vcpkg.json"),
            r#"{ "name": "vcpkg-cmake", "version": "2023-05-04", "dependencies": ["cmake-common"] }"#,
        );
        write(
            &root.join("ports/vcpkg-cmake-config/vcpkg.json"),
            r#"{ "name": "vcpkg-cmake-config", "version": "2022-02-06", "dependencies": ["cmake-common"] }"#,
        );
        write(
            &root.join("ports/cmake-common/vcpkg.json"),
            r#"{ "name": "cmake-common", "version": "1" }"#,
        );
        write(
            &root.join("installed/vcpkg/status"),
            "Package: zlib\nArchitecture: x64-windows\nVersion: 1.2.13\nAbi: aabbccdd\nStatus: install ok installed\n\nPackage: zlib\nArchitecture: x86-windows\nVersion: 1.2.13\nAbi: eeff0011\nStatus: install ok installed\n",
        );
        write(
            &root.join("installed/vcpkg/info/zlib_1.2.13_x64-windows.list"),
            "x64-windows/\nx64-windows/bin/zlib1.dll\nx64-windows/lib/zlib.lib\nx64-windows/share/zlib/copyright\n",
        );
        dir
    }

    fn glob(q: &str) -> Matcher {
        Matcher::glob(q, false, DefaultExt::Star).unwrap()
    }

    #[test]
    fn scan_builds_both_arenas_and_links_them() {
        let dir = fake_root();
        let catalog = Catalog::scan(dir.path().to_path_buf());
        assert_eq!(catalog.ports.len(), 4);
        assert_eq!(catalog.installed.len(), 2);
        let zlib = &catalog.installed[0];
        assert_eq!(zlib.files, ["x64-windows/bin/zlib1.dll", "x64-windows/lib/zlib.lib"]);
        assert_eq!(zlib.port, catalog.port_index("zlib"));
    }

    #[test]
    fn find_with_dependency_listing() {
        let dir = fake_root();
        let catalog = Catalog::scan(dir.path().to_path_buf());
        let hits = catalog.find_ports(&glob("zlib"));
        assert_eq!(hits.len(), 1);

        let flat = catalog.dependency_report(hits[0], false);
        assert_eq!(flat, ["  vcpkg-cmake", "  vcpkg-cmake-config"]);

        let verbose = catalog.dependency_report(hits[0], true);
        // cmake-common is expanded under vcpkg-cmake and only referenced
        // under vcpkg-cmake-config.
        let expanded = verbose
            .iter()
            .filter(|l| l.trim_start().starts_with("cmake-common") && !l.contains("shown above"))
            .count();
        assert_eq!(expanded, 1);
        assert!(verbose.iter().any(|l| l.contains("shown above")));
    }

    #[test]
    fn dependency_cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("ports/a/vcpkg.json"),
            r#"{ "name": "a", "version": "1", "dependencies": ["b"] }"#,
        );
        write(
            &root.join("ports/b/vcpkg.json"),
            r#"{ "name": "b", "version": "1", "dependencies": ["a"] }"#,
        );
        let catalog = Catalog::scan(root.to_path_buf());
        let idx = catalog.port_index("a").unwrap();
        let lines = catalog.dependency_report(idx, true);
        assert!(!lines.is_empty());
        assert!(lines.len() < 10);
    }

    #[test]
    fn cache_round_trip_restores_the_arenas() {
        let dir = fake_root();
        let cache_dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::open(cache_dir.path().join("envtool.cache"));

        let scanned = Catalog::load(dir.path().to_path_buf(), &mut cache);
        let cached = Catalog::from_cache(dir.path(), &mut cache).unwrap();
        assert_eq!(cached.ports.len(), scanned.ports.len());
        assert_eq!(cached.installed.len(), scanned.installed.len());
        let zi = cached.port_index("zlib").unwrap();
        let deps: Vec<_> = cached.ports[zi]
            .dependencies
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(deps, ["vcpkg-cmake", "vcpkg-cmake-config"]);
        // File lists are re-read from disk, not from the cache.
        assert_eq!(cached.installed[0].files.len(), 2);
    }

    #[test]
    fn bitness_filter_on_installed() {
        let dir = fake_root();
        let catalog = Catalog::scan(dir.path().to_path_buf());
        assert_eq!(catalog.installed_matching(&glob("zlib"), Bitness::Any).len(), 2);
        let only64 = catalog.installed_matching(&glob("zlib"), Bitness::Bits64);
        assert_eq!(only64.len(), 1);
        assert_eq!(catalog.installed[only64[0]].triplet, "x64-windows");
    }

    #[test]
    fn orphaned_archives_are_detected() {
        let dir = fake_root();
        let catalog = Catalog::scan(dir.path().to_path_buf());
        let archives = tempfile::tempdir().unwrap();
        write(&archives.path().join("aa/aabbccdd.zip"), "zip");
        write(&archives.path().join("de/deadbeef.zip"), "zip");
        let orphans = catalog.orphaned_archives(archives.path());
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].ends_with(Path::new("de").join("deadbeef.zip")));

        assert_eq!(
            Catalog::archive_path(Path::new("/c"), "aabbccdd").unwrap(),
            Path::new("/c").join("aa").join("aabbccdd.zip")
        );
    }

    #[test]
    fn stale_cached_exe_is_invalidated() {
        let cache_dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::open(cache_dir.path().join("envtool.cache"));
        cache.put(SECTION, "vcpkg_exe", "d:\\old\\vcpkg.exe");
        cache.put4(SECTION, "vcpkg_version", 2022, 1, 1, 0);

        // The stale keys must be gone even when no replacement is found.
        let _ = resolve_exe(&mut cache);
        assert_ne!(
            cache.get(SECTION, "vcpkg_exe"),
            Some("d:\\old\\vcpkg.exe")
        );
    }
}
