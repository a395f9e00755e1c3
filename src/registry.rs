//! Read-only Windows registry access.
//!
//! Three registry areas feed searches: the per-executable "App Paths"
//! mappings, the machine/user environment blocks (`PATH`/`INCLUDE`/`LIB`
//! outside the process environment), and the Kitware CMake package
//! registry. Missing keys are simply empty; access-denied is logged and
//! treated the same. Non-Windows builds compile the same API returning
//! nothing, which keeps the driver and the test suite portable.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hive {
    CurrentUser,
    LocalMachine,
}

impl Hive {
    pub fn label(self) -> &'static str {
        match self {
            Hive::CurrentUser => "HKCU",
            Hive::LocalMachine => "HKLM",
        }
    }
}

pub const APP_PATHS: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\App Paths";
pub const APP_PATHS_WOW64: &str = r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\App Paths";
pub const SESSION_MANAGER_ENV: &str =
    r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";
pub const USER_ENV: &str = "Environment";
pub const KITWARE_PACKAGES: &str = r"Software\Kitware\CMake\Packages";

/// One `App Paths` mapping. `key_name` is the sub-key (the name typed in
/// the Run dialog); `file_name` is the leaf of the payload, which may
/// differ when the registration aliases another binary.
#[derive(Debug, Clone)]
pub struct AppPathRecord {
    pub hive: Hive,
    pub key_name: String,
    pub file_name: String,
    pub path: String,
    pub directory: String,
    pub exists: bool,
    pub size: u64,
    pub mtime: Option<std::time::SystemTime>,
}

/// `PATH`/`INCLUDE`/`LIB` as found in one registry environment block.
#[derive(Debug, Default, Clone)]
pub struct RegistryEnv {
    pub path: Option<String>,
    pub include: Option<String>,
    pub lib: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CmakePackage {
    pub hive: Hive,
    pub name: String,
    pub uuid: String,
    pub path: String,
}

#[cfg_attr(not(windows), allow(dead_code))]
fn finish_app_path(hive: Hive, key_name: &str, payload: &str) -> AppPathRecord {
    let path = crate::canon::canonicalize(payload, None);
    let (directory, file_name) = match path.rsplit_once('\\') {
        Some((dir, leaf)) => (dir.to_string(), leaf.to_string()),
        None => (String::new(), path.clone()),
    };
    let meta = std::fs::metadata(payload).ok();
    AppPathRecord {
        hive,
        key_name: key_name.to_string(),
        file_name,
        directory,
        exists: meta.is_some(),
        size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
        mtime: meta.and_then(|m| m.modified().ok()),
        path,
    }
}

#[cfg_attr(not(windows), allow(dead_code))]
fn sort_app_paths(records: &mut [AppPathRecord], case_sensitive: bool) {
    records.sort_by(|a, b| {
        let ka = format!("{}{}", a.directory, a.file_name);
        let kb = format!("{}{}", b.directory, b.file_name);
        if case_sensitive {
            ka.cmp(&kb)
        } else {
            ka.to_ascii_lowercase().cmp(&kb.to_ascii_lowercase())
        }
    });
}

#[cfg(windows)]
mod imp {
    use super::*;
    use std::path::Path;
    use windows_registry::{Key, CURRENT_USER, LOCAL_MACHINE};

    fn root(hive: Hive) -> &'static Key {
        match hive {
            Hive::CurrentUser => CURRENT_USER,
            Hive::LocalMachine => LOCAL_MACHINE,
        }
    }

    // HRESULT for ERROR_FILE_NOT_FOUND; a missing key is normal, anything
    // else (typically access denied) deserves a warning.
    const E_FILE_NOT_FOUND: i32 = 0x8007_0002_u32 as i32;

    fn open(hive: Hive, subkey: &str) -> Option<Key> {
        match root(hive).open(subkey) {
            Ok(key) => Some(key),
            Err(err) => {
                if err.code().0 == E_FILE_NOT_FOUND {
                    tracing::debug!("{}\\{subkey}: not present", hive.label());
                } else {
                    tracing::warn!("{}\\{subkey}: {err}", hive.label());
                }
                None
            }
        }
    }

    /// Pick the payload value of one App Paths sub-key: the string value
    /// whose extension matches the sub-key's own extension, falling back to
    /// the default value. Expand-string payloads see the *system*
    /// environment, matching what the shell itself would resolve.
    fn app_path_payload(key: &Key, key_name: &str) -> Option<String> {
        let want_ext = Path::new(key_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let mut fallback = None;
        let Ok(values) = key.values() else {
            return None;
        };
        for (name, value) in values {
            let text = match String::try_from(value) {
                Ok(text) => text,
                Err(_) => continue,
            };
            let text = text.trim().trim_matches('"').to_string();
            if text.is_empty() {
                continue;
            }
            let expanded = if text.contains('%') {
                crate::canon::expand_system(&text).text
            } else {
                text
            };
            let ext = Path::new(&expanded)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase());
            if want_ext.is_some() && ext == want_ext {
                return Some(expanded);
            }
            if name.is_empty() {
                fallback = Some(expanded);
            }
        }
        fallback
    }

    pub fn enumerate_app_paths(hive: Hive, case_sensitive: bool) -> Vec<AppPathRecord> {
        let mut records = Vec::new();
        for area in [APP_PATHS, APP_PATHS_WOW64] {
            let Some(app_paths) = open(hive, area) else {
                continue;
            };
            let Ok(keys) = app_paths.keys() else {
                tracing::warn!("{}\\{area}: cannot enumerate sub-keys", hive.label());
                continue;
            };
            for key_name in keys {
                let Ok(sub) = app_paths.open(&key_name) else {
                    continue;
                };
                if let Some(payload) = app_path_payload(&sub, &key_name) {
                    records.push(finish_app_path(hive, &key_name, &payload));
                }
            }
        }
        sort_app_paths(&mut records, case_sensitive);
        records
    }

    pub fn scan_environment(hive: Hive, subkey: &str) -> RegistryEnv {
        let mut env = RegistryEnv::default();
        let Some(key) = open(hive, subkey) else {
            return env;
        };
        for name in ["Path", "PATH", "path"] {
            if env.path.is_none() {
                env.path = key.get_string(name).ok();
            }
        }
        for name in ["Include", "INCLUDE", "include"] {
            if env.include.is_none() {
                env.include = key.get_string(name).ok();
            }
        }
        for name in ["Lib", "LIB", "lib"] {
            if env.lib.is_none() {
                env.lib = key.get_string(name).ok();
            }
        }
        env
    }

    pub fn enumerate_kitware_packages(hive: Hive) -> Vec<CmakePackage> {
        let mut packages = Vec::new();
        let Some(key) = open(hive, KITWARE_PACKAGES) else {
            return packages;
        };
        let Ok(names) = key.keys() else {
            return packages;
        };
        for name in names {
            let Ok(pkg) = key.open(&name) else { continue };
            let Ok(values) = pkg.values() else { continue };
            for (uuid, value) in values {
                let path = match String::try_from(value) {
                    Ok(path) => path,
                    Err(_) => continue,
                };
                packages.push(CmakePackage {
                    hive,
                    name: name.clone(),
                    uuid,
                    path,
                });
            }
        }
        packages
    }

    pub fn system_env_var(name: &str) -> Option<String> {
        let key = open(Hive::LocalMachine, SESSION_MANAGER_ENV)?;
        key.get_string(name).ok()
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub fn enumerate_app_paths(_hive: Hive, _case_sensitive: bool) -> Vec<AppPathRecord> {
        Vec::new()
    }

    pub fn scan_environment(_hive: Hive, _subkey: &str) -> RegistryEnv {
        RegistryEnv::default()
    }

    pub fn enumerate_kitware_packages(_hive: Hive) -> Vec<CmakePackage> {
        Vec::new()
    }

    pub fn system_env_var(_name: &str) -> Option<String> {
        None
    }
}

pub use imp::{enumerate_app_paths, enumerate_kitware_packages, scan_environment, system_env_var};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_path_record_splits_directory_and_alias() {
        let rec = finish_app_path(
            Hive::CurrentUser,
            "WinZip.exe",
            "C:\\Program Files\\WinZip\\winzip64.exe",
        );
        assert_eq!(rec.key_name, "WinZip.exe");
        assert_eq!(rec.file_name, "winzip64.exe");
        assert_eq!(rec.directory, "c:\\Program Files\\WinZip");
        assert_eq!(rec.path, "c:\\Program Files\\WinZip\\winzip64.exe");
    }

    #[test]
    fn sorting_follows_case_mode() {
        let mut records = vec![
            finish_app_path(Hive::CurrentUser, "b.exe", "c:\\x\\Beta.exe"),
            finish_app_path(Hive::CurrentUser, "a.exe", "c:\\x\\alpha.exe"),
        ];
        sort_app_paths(&mut records, false);
        assert_eq!(records[0].file_name, "alpha.exe");

        let mut records = vec![
            finish_app_path(Hive::CurrentUser, "b.exe", "c:\\x\\beta.exe"),
            finish_app_path(Hive::CurrentUser, "a.exe", "c:\\x\\Alpha.exe"),
        ];
        sort_app_paths(&mut records, true);
        // Upper-case sorts first under byte-exact comparison.
        assert_eq!(records[0].file_name, "Alpha.exe");
    }

    #[cfg(not(windows))]
    #[test]
    fn stubs_are_empty_off_windows() {
        assert!(enumerate_app_paths(Hive::LocalMachine, false).is_empty());
        assert!(scan_environment(Hive::CurrentUser, USER_ENV).path.is_none());
        assert!(enumerate_kitware_packages(Hive::CurrentUser).is_empty());
        assert_eq!(system_env_var("PATH"), None);
    }
}
