//! Port manifest parsing.
//!
//! A port directory carries its metadata in the legacy `CONTROL` format
//! (RFC-822-ish paragraphs), in `vcpkg.json`, or both; `portfile.cmake`
//! can contribute a GitHub homepage when the manifest has none. A manifest
//! that fails to parse leaves a minimally filled node — the port still
//! exists, it just has nothing to say about itself.

use std::path::Path;

use fs_err as fs;
use serde::Deserialize;

use crate::vcpkg::platform::{PlatformExpr, Qualifier};

#[derive(Debug, Default, Clone)]
pub struct Dependency {
    pub name: String,
    /// Flattened qualifier vector of the platform expression, if any.
    pub qualifiers: Vec<Qualifier>,
}

#[derive(Debug, Default, Clone)]
pub struct PortNode {
    pub name: String,
    pub version: String,
    pub homepage: String,
    pub description: String,
    pub has_control: bool,
    pub has_json: bool,
    pub has_portfile: bool,
    pub dependencies: Vec<Dependency>,
    pub features: Vec<String>,
    pub supports: Vec<Qualifier>,
}

/// Parse one dependency spec: `name`, `name[feature,...]`, `name (expr)`.
pub(crate) fn parse_dependency(spec: &str) -> Option<Dependency> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    let (head, expr) = match spec.split_once('(') {
        Some((head, rest)) => (head.trim(), Some(rest.trim_end_matches(')').trim())),
        None => (spec, None),
    };
    // Feature brackets don't matter for the dependency graph.
    let name = head.split('[').next().unwrap_or(head).trim().to_string();
    if name.is_empty() {
        return None;
    }
    let qualifiers = expr
        .and_then(|text| match PlatformExpr::parse(text) {
            Ok(expr) => Some(expr.qualifiers()),
            Err(err) => {
                tracing::debug!("dependency {name:?}: {err}");
                None
            }
        })
        .unwrap_or_default();
    Some(Dependency { name, qualifiers })
}

fn parse_supports(text: &str) -> Vec<Qualifier> {
    match PlatformExpr::parse(text) {
        Ok(expr) => expr.qualifiers(),
        Err(err) => {
            tracing::debug!("Supports {text:?}: {err}");
            Vec::new()
        }
    }
}

/// Split an RFC-822-ish paragraph into (field, value) pairs, folding
/// continuation lines into the previous field.
fn paragraph_fields(paragraph: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in paragraph.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    fields
}

pub fn parse_control(name: &str, text: &str) -> PortNode {
    let mut port = PortNode {
        name: name.to_string(),
        has_control: true,
        ..PortNode::default()
    };
    for paragraph in text.split("\n\n") {
        let fields = paragraph_fields(paragraph);
        let is_feature = fields.iter().any(|(k, _)| k.eq_ignore_ascii_case("Feature"));
        for (key, value) in fields {
            match key.to_ascii_lowercase().as_str() {
                "feature" if is_feature => port.features.push(value),
                "version" | "version-string" if !is_feature => port.version = value,
                "description" if !is_feature => port.description = value,
                "homepage" => port.homepage = value,
                "supports" if !is_feature => port.supports = parse_supports(&value),
                "build-depends" => {
                    port.dependencies
                        .extend(split_depends(&value).filter_map(|s| parse_dependency(s)));
                }
                "default-features" if !is_feature => {
                    for feature in value.split(',') {
                        let feature = feature.trim().to_string();
                        if !feature.is_empty() && !port.features.contains(&feature) {
                            port.features.push(feature);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    port
}

/// Split a `Build-Depends` value on commas that are not inside a platform
/// expression.
fn split_depends(value: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in value.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts.into_iter()
}

/// `vcpkg.json`, limited to the keys the catalog consumes. Several fields
/// are polymorphic in the wild, hence the untagged helpers.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "version-string")]
    version_string: Option<String>,
    #[serde(rename = "version-semver")]
    version_semver: Option<String>,
    #[serde(rename = "version-date")]
    version_date: Option<String>,
    #[serde(rename = "port-version")]
    port_version: Option<u64>,
    description: Option<OneOrMany>,
    homepage: Option<String>,
    supports: Option<String>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    features: Option<RawFeatures>,
    #[serde(rename = "default-features", default)]
    default_features: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn join(self) -> String {
        match self {
            OneOrMany::One(s) => s,
            // Multi-paragraph descriptions come as an array.
            OneOrMany::Many(parts) => parts.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Name(String),
    Table {
        name: String,
        platform: Option<String>,
    },
}

impl RawDependency {
    fn name(&self) -> &str {
        match self {
            RawDependency::Name(name) => name,
            RawDependency::Table { name, .. } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFeatures {
    Map(serde_json::Map<String, serde_json::Value>),
    List(Vec<RawDependency>),
}

pub fn parse_vcpkg_json(name: &str, text: &str) -> Option<PortNode> {
    let raw: RawManifest = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!("{name}/vcpkg.json: {err}");
            return None;
        }
    };
    let mut port = PortNode {
        name: raw.name.unwrap_or_else(|| name.to_string()),
        has_json: true,
        ..PortNode::default()
    };
    port.version = raw
        .version
        .or(raw.version_string)
        .or(raw.version_semver)
        .or(raw.version_date)
        .unwrap_or_default();
    if let Some(port_version) = raw.port_version {
        if port_version > 0 && !port.version.is_empty() {
            port.version = format!("{}#{port_version}", port.version);
        }
    }
    port.description = raw.description.map(OneOrMany::join).unwrap_or_default();
    port.homepage = raw.homepage.unwrap_or_default();
    if let Some(supports) = &raw.supports {
        port.supports = parse_supports(supports);
    }
    for dep in &raw.dependencies {
        match dep {
            RawDependency::Name(spec) => {
                if let Some(dep) = parse_dependency(spec) {
                    port.dependencies.push(dep);
                }
            }
            RawDependency::Table { name, platform } => {
                port.dependencies.push(Dependency {
                    name: name.clone(),
                    qualifiers: platform
                        .as_deref()
                        .map(parse_supports)
                        .unwrap_or_default(),
                });
            }
        }
    }
    match raw.features {
        Some(RawFeatures::Map(map)) => port.features.extend(map.keys().cloned()),
        Some(RawFeatures::List(list)) => port
            .features
            .extend(list.iter().map(|f| f.name().to_string())),
        None => {}
    }
    for feature in &raw.default_features {
        let feature = feature.name();
        if !port.features.iter().any(|f| f == feature) {
            port.features.push(feature.to_string());
        }
    }
    Some(port)
}

/// Pull `https://github.com/org/name` out of a `vcpkg_from_github(...)`
/// call.
pub fn github_homepage(portfile: &str) -> Option<String> {
    if !portfile.contains("vcpkg_from_github") {
        return None;
    }
    let re = regex::Regex::new(r#"REPO\s+"?([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)"?"#).unwrap();
    re.captures(portfile)
        .map(|caps| format!("https://github.com/{}", &caps[1]))
}

/// Per-port discovery over one `ports/<name>/` directory.
pub fn load_port(dir: &Path) -> Option<PortNode> {
    let name = dir.file_name()?.to_string_lossy().into_owned();
    let control = dir.join("CONTROL");
    let json = dir.join("vcpkg.json");
    let portfile = dir.join("portfile.cmake");

    let mut port = if control.is_file() {
        let mut port = match fs::read_to_string(&control) {
            Ok(text) => parse_control(&name, &text),
            Err(err) => {
                tracing::debug!("{}: {err}", control.display());
                PortNode {
                    name: name.clone(),
                    ..PortNode::default()
                }
            }
        };
        port.has_control = true;
        port.has_json = json.is_file();
        port
    } else if json.is_file() {
        match fs::read_to_string(&json) {
            Ok(text) => parse_vcpkg_json(&name, &text).unwrap_or_else(|| PortNode {
                name: name.clone(),
                has_json: true,
                ..PortNode::default()
            }),
            Err(err) => {
                tracing::debug!("{}: {err}", json.display());
                PortNode {
                    name: name.clone(),
                    has_json: true,
                    ..PortNode::default()
                }
            }
        }
    } else {
        return None;
    };

    port.has_portfile = portfile.is_file();
    if port.homepage.is_empty() && port.has_portfile {
        if let Ok(text) = fs::read_to_string(&portfile) {
            if let Some(homepage) = github_homepage(&text) {
                port.homepage = homepage;
            }
        }
    }
    Some(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcpkg::platform::Platform;

    const ZLIB_CONTROL: &str = "\
Source: zlib
Version: 1.2.13
Homepage: https://www.zlib.net/
Description: A compression library.
 Used by about everything.
Build-Depends: vcpkg-cmake, vcpkg-cmake-config, libgit2 (!uwp&!windows)

Feature: bzip2
Description: bzip2 support
";

    #[test]
    fn control_paragraphs_and_continuations() {
        let port = parse_control("zlib", ZLIB_CONTROL);
        assert_eq!(port.version, "1.2.13");
        assert_eq!(port.homepage, "https://www.zlib.net/");
        assert_eq!(
            port.description,
            "A compression library. Used by about everything."
        );
        let deps: Vec<_> = port.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deps, ["vcpkg-cmake", "vcpkg-cmake-config", "libgit2"]);
        assert_eq!(port.dependencies[2].qualifiers.len(), 2);
        assert!(port.dependencies[2].qualifiers.iter().all(|q| q.negated));
        assert_eq!(port.features, ["bzip2"]);
    }

    #[test]
    fn json_manifest_with_object_dependencies() {
        let text = r#"{
            "name": "libssh2",
            "version-semver": "1.11.0",
            "port-version": 2,
            "description": ["The SSH library.", "Client-side."],
            "homepage": "https://libssh2.org",
            "supports": "!uwp",
            "dependencies": [
                "openssl",
                { "name": "zlib", "platform": "!windows" },
                { "name": "vcpkg-cmake", "host": true }
            ],
            "features": { "zlib-ng": { "description": "use zlib-ng" } }
        }"#;
        let port = parse_vcpkg_json("libssh2", text).unwrap();
        assert_eq!(port.version, "1.11.0#2");
        assert_eq!(port.description, "The SSH library. Client-side.");
        assert_eq!(
            port.supports,
            [Qualifier {
                platform: Platform::Uwp,
                negated: true
            }]
        );
        let deps: Vec<_> = port.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deps, ["openssl", "zlib", "vcpkg-cmake"]);
        assert_eq!(
            port.dependencies[1].qualifiers,
            [Qualifier {
                platform: Platform::Windows,
                negated: true
            }]
        );
        assert_eq!(port.features, ["zlib-ng"]);
    }

    #[test]
    fn broken_json_yields_none() {
        assert!(parse_vcpkg_json("broken", "{ not json").is_none());
    }

    #[test]
    fn portfile_contributes_github_homepage() {
        let portfile = r#"
vcpkg_from_github(
    OUT_SOURCE_PATH SOURCE_PATH
    REPO madler/zlib
    REF v1.2.13
    SHA512 deadbeef
)
"#;
        assert_eq!(
            github_homepage(portfile).as_deref(),
            Some("https://github.com/madler/zlib")
        );
        assert_eq!(github_homepage("vcpkg_download_distfile(...)"), None);
    }

    #[test]
    fn port_discovery_prefers_control_and_falls_back_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let port_dir = dir.path().join("zstd");
        fs::create_dir_all(&port_dir).unwrap();
        fs::write(
            port_dir.join("vcpkg.json"),
            r#"{ "name": "zstd", "version": "1.5.5" }"#,
        )
        .unwrap();
        fs::write(
            port_dir.join("portfile.cmake"),
            "vcpkg_from_github(REPO facebook/zstd)",
        )
        .unwrap();

        let port = load_port(&port_dir).unwrap();
        assert!(port.has_json && !port.has_control && port.has_portfile);
        assert_eq!(port.version, "1.5.5");
        assert_eq!(port.homepage, "https://github.com/facebook/zstd");

        // An empty directory is not a port.
        let empty = dir.path().join("not-a-port");
        fs::create_dir_all(&empty).unwrap();
        assert!(load_port(&empty).is_none());
    }
}
