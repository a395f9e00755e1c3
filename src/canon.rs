//! Path expansion and canonicalization.
//!
//! Every directory entry that enters a walk goes through here first: `%VAR%`
//! references are expanded, Cygwin-style paths are converted, and the result
//! is normalized to one canonical spelling (absolute, backslash-separated,
//! lower-cased drive letter) so that duplicate detection can compare plain
//! strings.

use std::env;
use std::path::{Path, PathBuf};

/// Result of `%NAME%` expansion. `complete` is false when at least one
/// reference could not be resolved; such entries are listed but excluded
/// from the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub text: String,
    pub complete: bool,
}

/// Expand `%NAME%` references against the process environment.
pub fn expand(raw: &str) -> Expanded {
    expand_with(raw, env_lookup)
}

/// Expand `%NAME%` references against the *system* environment block.
///
/// Registry values of type `REG_EXPAND_SZ` must not see user-level
/// overrides, so this consults the Session Manager environment key on
/// Windows and falls back to the process environment elsewhere.
pub fn expand_system(raw: &str) -> Expanded {
    expand_with(raw, |name| {
        crate::registry::system_env_var(name).or_else(|| env_lookup(name))
    })
}

pub fn expand_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Expanded {
    let mut out = String::with_capacity(raw.len());
    let mut complete = true;
    let mut rest = raw;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                        complete = false;
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                // Lone or doubled '%' is literal text.
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Expanded { text: out, complete }
}

pub(crate) fn env_lookup(name: &str) -> Option<String> {
    if let Ok(value) = env::var(name) {
        return Some(value);
    }
    // Windows treats environment names case-insensitively; mirror that even
    // when the host platform does not.
    env::vars().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v)
}

/// Locate the Cygwin installation root by finding `cygwin1.dll` along PATH.
pub fn detect_cygwin_root() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        if dir.join("cygwin1.dll").is_file() {
            // PATH points at <root>\bin.
            return dir.parent().map(Path::to_path_buf);
        }
    }
    None
}

/// Normalize `text` to the canonical spelling used for display and for
/// duplicate keys. Pure string surgery: the path does not need to exist.
pub fn canonicalize(text: &str, cygwin_root: Option<&Path>) -> String {
    let mut t = text.trim().trim_matches('"').to_string();
    if t.is_empty() {
        return t;
    }

    // Cygwin notation first: /cygdrive/X/... carries its own drive, any
    // other POSIX-absolute path is rooted in the Cygwin installation.
    if let Some(rest) = strip_cygdrive(&t) {
        t = rest;
    } else if (t.starts_with('/') || t.starts_with("\\usr\\") || t.starts_with("/usr/"))
        && !t.starts_with("//")
    {
        if let Some(root) = cygwin_root {
            t = format!("{}{}", root.display(), t);
        }
    }

    let t = t.replace('/', "\\");
    let unc = t.starts_with("\\\\");
    let (drive, remainder, rooted) = if unc {
        (None, t.trim_start_matches('\\').to_string(), true)
    } else if is_drive_prefixed(&t) {
        (
            Some(t.as_bytes()[0].to_ascii_lowercase() as char),
            t[2..].trim_start_matches('\\').to_string(),
            true,
        )
    } else if let Some(rest) = t.strip_prefix('\\') {
        (None, rest.to_string(), true)
    } else {
        (None, t, false)
    };

    let mut parts: Vec<&str> = Vec::new();
    if !rooted {
        // Relative entry: root it in the current directory.
        let cwd = env::current_dir().unwrap_or_default();
        let base = canonicalize(&cwd.to_string_lossy(), None);
        let mut out = base.trim_end_matches('\\').to_string();
        if !remainder.is_empty() {
            out.push('\\');
            out.push_str(&remainder);
        }
        return canonicalize(&out, None);
    }
    for comp in remainder.split('\\') {
        match comp {
            "" | "." => {}
            ".." => {
                // Never pop the UNC host/share pair.
                if parts.len() > if unc { 2 } else { 0 } {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }

    let body = parts.join("\\");
    match (unc, drive) {
        (true, _) => format!("\\\\{body}"),
        (false, Some(d)) => {
            if body.is_empty() {
                format!("{d}:\\")
            } else {
                format!("{d}:\\{body}")
            }
        }
        (false, None) => format!("\\{body}"),
    }
}

fn strip_cygdrive(t: &str) -> Option<String> {
    let rest = t
        .strip_prefix("/cygdrive/")
        .or_else(|| t.strip_prefix("\\cygdrive\\"))?;
    let mut it = rest.splitn(2, ['/', '\\']);
    let drive = it.next()?;
    if drive.len() != 1 || !drive.as_bytes()[0].is_ascii_alphabetic() {
        return None;
    }
    let tail = it.next().unwrap_or("");
    Some(format!(
        "{}:\\{}",
        drive.to_ascii_lowercase(),
        tail
    ))
}

fn is_drive_prefixed(t: &str) -> bool {
    let b = t.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// True for a bare drive spec like `c:` that is missing its separator; the
/// splitter warns about these because `c:` means "current directory on C"
/// to most tools, which is rarely what the user intended.
pub fn is_bare_drive(t: &str) -> bool {
    is_drive_prefixed(t) && t.len() == 2
}

pub fn is_unc(t: &str) -> bool {
    t.starts_with("\\\\") || t.starts_with("//")
}

pub fn is_cwd_token(t: &str) -> bool {
    matches!(t, "." | ".\\" | "./")
}

/// The string used for duplicate detection.
pub fn dedup_key(canonical: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        canonical.to_string()
    } else {
        canonical.to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathClass {
    pub exists: bool,
    pub is_dir: bool,
    pub is_cwd: bool,
}

/// Stat-level classification of one entry.
///
/// UNC paths skip the stat entirely: an unreachable SMB host blocks the
/// calling thread for minutes, and a wrong "exists" on a dead share is the
/// lesser evil.
pub fn classify(text: &str) -> PathClass {
    if is_cwd_token(text) {
        return PathClass {
            exists: true,
            is_dir: true,
            is_cwd: true,
        };
    }
    if is_unc(text) {
        return PathClass {
            exists: true,
            is_dir: true,
            is_cwd: false,
        };
    }
    match std::fs::metadata(text) {
        Ok(meta) => PathClass {
            exists: true,
            is_dir: meta.is_dir(),
            is_cwd: false,
        },
        Err(_) => PathClass::default(),
    }
}
