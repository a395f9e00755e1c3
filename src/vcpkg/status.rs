//! The installed-status index.
//!
//! `<root>/installed/vcpkg/status` is a record-oriented file with
//! blank-line separators. Base records and per-feature records for the
//! same (package, architecture) are merged; only records whose `Status`
//! says `install ok installed` count. Each accepted package's file list
//! comes from `<root>/installed/vcpkg/info/<pkg>_<ver>_<arch>.list`,
//! narrowed to the bin/lib/include trees.

use std::collections::HashMap;
use std::path::Path;

use fs_err as fs;

use crate::vcpkg::platform::{self, Platform};
use crate::Bitness;

#[derive(Debug, Default, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub triplet: String,
    pub abi: String,
    pub status: String,
    pub features: Vec<String>,
    /// Derived from the triplet.
    pub platforms: Vec<Platform>,
    /// Relative paths under the install root, bin/lib/include only.
    pub files: Vec<String>,
    /// Index of the corresponding port in the catalog arena.
    pub port: Option<usize>,
}

pub fn parse_status(text: &str) -> Vec<InstalledPackage> {
    let mut packages: Vec<InstalledPackage> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for paragraph in text.split("\n\n") {
        let mut package = String::new();
        let mut architecture = String::new();
        let mut version = String::new();
        let mut abi = String::new();
        let mut status = String::new();
        let mut features: Vec<String> = Vec::new();

        for line in paragraph.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "package" => package = value.to_string(),
                "architecture" => architecture = value.to_string(),
                "version" => version = value.to_string(),
                "abi" => abi = value.to_string(),
                "status" => status = value.to_string(),
                "feature" => features.push(value.to_string()),
                "default-features" | "depends" => {}
                _ => {}
            }
        }

        if package.is_empty()
            || architecture.is_empty()
            || !status.starts_with("install ok installed")
        {
            continue;
        }

        let key = (package.to_ascii_lowercase(), architecture.to_ascii_lowercase());
        match index.get(&key) {
            Some(&pos) => {
                // Feature record: merge into the first record seen.
                let existing = &mut packages[pos];
                for feature in features {
                    if !existing.features.contains(&feature) {
                        existing.features.push(feature);
                    }
                }
                if existing.abi.is_empty() {
                    existing.abi = abi;
                }
            }
            None => {
                index.insert(key, packages.len());
                packages.push(InstalledPackage {
                    name: package,
                    version,
                    platforms: platform::triplet_platforms(&architecture),
                    triplet: architecture,
                    abi,
                    status,
                    features,
                    files: Vec::new(),
                    port: None,
                });
            }
        }
    }
    packages
}

/// Keep only the `<arch>/bin`, `<arch>/lib` and `<arch>/include` trees of
/// one `.list` file.
pub fn filter_file_list(lines: &str, triplet: &str) -> Vec<String> {
    let keep = [
        format!("{triplet}/bin/"),
        format!("{triplet}/lib/"),
        format!("{triplet}/include/"),
    ];
    lines
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .filter(|line| keep.iter().any(|prefix| line.starts_with(prefix)))
        .map(str::to_string)
        .collect()
}

/// Resolve and read the `.list` file for one installed package.
pub fn load_file_list(root: &Path, package: &InstalledPackage) -> Vec<String> {
    // The info file name uses the version without any port-version suffix.
    let version = package.version.split('#').next().unwrap_or("");
    let list = root
        .join("installed")
        .join("vcpkg")
        .join("info")
        .join(format!("{}_{}_{}.list", package.name, version, package.triplet));
    match fs::read_to_string(&list) {
        Ok(text) => filter_file_list(&text, &package.triplet),
        Err(err) => {
            tracing::debug!("{}: {err}", list.display());
            Vec::new()
        }
    }
}

/// The `--32`/`--64` filter over triplets.
pub fn matches_bits(triplet: &str, bits: Bitness) -> bool {
    match bits {
        Bitness::Any => true,
        Bitness::Bits32 => triplet.split('-').any(|t| t == "x86"),
        Bitness::Bits64 => triplet.split('-').any(|t| t == "x64"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
Package: zlib
Version: 1.2.13
Architecture: x64-windows
Multi-Arch: same
Abi: 8ef064e51e9eee07cbfd2355e0b88e26b2fd04b4
Status: install ok installed

Package: zlib
Architecture: x86-windows
Version: 1.2.13
Abi: 02ab7c9cbdc3d4b3de01c0bc62b1e7530b5c2c62
Status: install ok installed

Package: curl
Feature: ssl
Architecture: x64-windows
Version: 8.4.0
Status: install ok installed

Package: curl
Architecture: x64-windows
Version: 8.4.0
Abi: 1111111111111111111111111111111111111111
Depends: zlib
Status: install ok installed

Package: stale
Architecture: x64-windows
Version: 0.1
Status: deinstall ok not-installed

Package: no-arch
Version: 0.2
Status: install ok installed
";

    #[test]
    fn accepts_installed_records_only() {
        let packages = parse_status(STATUS);
        let names: Vec<_> = packages
            .iter()
            .map(|p| format!("{}:{}", p.name, p.triplet))
            .collect();
        assert_eq!(
            names,
            ["zlib:x64-windows", "zlib:x86-windows", "curl:x64-windows"]
        );
    }

    #[test]
    fn feature_records_merge_into_the_first() {
        let packages = parse_status(STATUS);
        let curl = packages.iter().find(|p| p.name == "curl").unwrap();
        assert_eq!(curl.features, ["ssl"]);
        // The abi from the base record survives the merge.
        assert_eq!(curl.abi, "1111111111111111111111111111111111111111");
        assert_eq!(curl.platforms.len(), 2);
    }

    #[test]
    fn one_package_per_name_and_triplet() {
        let packages = parse_status(STATUS);
        let mut keys: Vec<_> = packages
            .iter()
            .map(|p| (p.name.clone(), p.triplet.clone()))
            .collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn file_list_is_narrowed_to_runtime_trees() {
        let text = "\
x64-windows/
x64-windows/bin/zlib1.dll
x64-windows/lib/zlib.lib
x64-windows/include/zlib.h
x64-windows/share/zlib/copyright
x64-windows/tools/protobuf/protoc.exe
";
        let files = filter_file_list(text, "x64-windows");
        assert_eq!(
            files,
            [
                "x64-windows/bin/zlib1.dll",
                "x64-windows/lib/zlib.lib",
                "x64-windows/include/zlib.h"
            ]
        );
    }

    #[test]
    fn bitness_filter_follows_triplet_tokens() {
        assert!(matches_bits("x64-windows", Bitness::Any));
        assert!(matches_bits("x64-windows", Bitness::Bits64));
        assert!(!matches_bits("x64-windows", Bitness::Bits32));
        assert!(matches_bits("x86-windows-static", Bitness::Bits32));
        assert!(!matches_bits("arm64-windows", Bitness::Bits64));
    }
}
