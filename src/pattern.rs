//! Pattern matching over file names.
//!
//! One run uses exactly one mode: a shell-style glob (`*`, `?`, POSIX
//! `[a-z]` classes) or an extended regular expression (`-r`). In glob mode
//! the surface query is rewritten before any directory is enumerated: an
//! optional sub-directory portion is preserved literally, the leaf gets a
//! default extension when none was given, and character classes are
//! approximated to `*` for the filesystem layer while the real class is
//! re-applied here.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};

/// What to append to a glob leaf that carries no extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultExt {
    /// `.` modes: `notepad` becomes `notepad.*`.
    DotStar,
    /// pkg-config mode: `zlib` becomes `zlib.pc*`.
    PcStar,
    /// vcpkg/python modes: `zlib` becomes `zlib*`.
    Star,
    /// Leaf used verbatim.
    None,
}

#[derive(Debug)]
enum Mode {
    Glob {
        pattern: Pattern,
        /// Pattern truncated at its last `.`; a candidate without any dot
        /// is accepted when its whole name matches this (so `ratio.*`
        /// still finds `ratio`).
        stem: Option<Pattern>,
        options: MatchOptions,
    },
    Regex(Regex),
}

#[derive(Debug)]
pub struct Matcher {
    raw: String,
    /// Leaf pattern after the extension default was applied.
    effective: String,
    /// Literal sub-directory portion of the query, if any.
    subdir: Option<String>,
    /// The sub-directory contained wildcards; it is used literally anyway
    /// and the driver warns once.
    pub subdir_has_wildcards: bool,
    /// Leaf with POSIX classes widened to `*`, for enumeration layers that
    /// only understand `*`/`?`.
    fs_pattern: String,
    mode: Mode,
}

impl Matcher {
    pub fn glob(query: &str, case_sensitive: bool, default_ext: DefaultExt) -> Result<Matcher> {
        let normalized = query.replace('\\', "/");
        let (subdir, leaf) = match normalized.rsplit_once('/') {
            Some((dir, leaf)) if !dir.is_empty() => (Some(dir.to_string()), leaf.to_string()),
            Some((_, leaf)) => (None, leaf.to_string()),
            None => (None, normalized.clone()),
        };
        let subdir_has_wildcards = subdir
            .as_deref()
            .map(|d| d.contains(['*', '?', '[']))
            .unwrap_or(false);

        let mut effective = leaf;
        if !effective.contains('.') {
            match default_ext {
                DefaultExt::DotStar => effective.push_str(".*"),
                DefaultExt::PcStar => effective.push_str(".pc*"),
                DefaultExt::Star => {
                    if !effective.ends_with('*') {
                        effective.push('*');
                    }
                }
                DefaultExt::None => {}
            }
        }

        let options = MatchOptions {
            case_sensitive,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let pattern = Pattern::new(&effective)
            .with_context(|| format!("bad file pattern {effective:?}"))?;
        let stem = match effective.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() && !stem.contains('.') => Pattern::new(stem).ok(),
            _ => None,
        };

        Ok(Matcher {
            raw: query.to_string(),
            fs_pattern: widen_classes(&effective),
            effective,
            subdir: subdir.map(|d| d.replace('/', "\\")),
            subdir_has_wildcards,
            mode: Mode::Glob {
                pattern,
                stem,
                options,
            },
        })
    }

    pub fn regex(query: &str, case_sensitive: bool) -> Result<Matcher> {
        let regex = RegexBuilder::new(query)
            .case_insensitive(!case_sensitive)
            .build()
            .with_context(|| format!("bad regular expression {query:?}"))?;
        Ok(Matcher {
            raw: query.to_string(),
            effective: query.to_string(),
            subdir: None,
            subdir_has_wildcards: false,
            fs_pattern: "*".to_string(),
            mode: Mode::Regex(regex),
        })
    }

    pub fn is_regex(&self) -> bool {
        matches!(self.mode, Mode::Regex(_))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn effective(&self) -> &str {
        &self.effective
    }

    pub fn subdir(&self) -> Option<&str> {
        self.subdir.as_deref()
    }

    pub fn fs_pattern(&self) -> &str {
        &self.fs_pattern
    }

    /// Match one leaf name.
    pub fn matches_name(&self, name: &str) -> bool {
        match &self.mode {
            Mode::Glob {
                pattern,
                stem,
                options,
            } => {
                if pattern.matches_with(name, *options) {
                    return true;
                }
                // `ratio.*` should still find a dotless `ratio`.
                if !name.contains('.') && self.effective.contains('.') {
                    if let Some(stem) = stem {
                        return stem.matches_with(name, *options);
                    }
                }
                false
            }
            Mode::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Replace `[...]` classes with `*` so that enumeration layers that only
/// understand `*`/`?` over-approximate; the real class is re-checked by
/// [`Matcher::matches_name`].
fn widen_classes(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '[' {
            if c != '*' || !out.ends_with('*') {
                out.push(c);
            }
            continue;
        }
        let mut at_start = true;
        for c in chars.by_ref() {
            // `]` directly after `[` or `[!` is a literal member.
            if c == ']' && !at_start {
                break;
            }
            at_start = c == '!' && at_start;
        }
        if !out.ends_with('*') {
            out.push('*');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(q: &str) -> Matcher {
        Matcher::glob(q, false, DefaultExt::DotStar).unwrap()
    }

    #[test]
    fn plain_name_gets_default_extension() {
        let m = glob("notepad");
        assert_eq!(m.effective(), "notepad.*");
        assert!(m.matches_name("notepad.exe"));
        assert!(m.matches_name("NOTEPAD.EXE"));
        assert!(!m.matches_name("notepad2.exe"));
    }

    #[test]
    fn dotless_candidate_accepted_by_prefix_rule() {
        let m = glob("ratio");
        assert_eq!(m.effective(), "ratio.*");
        assert!(m.matches_name("ratio"));
        assert!(!m.matches_name("rationale"));
    }

    #[test]
    fn pkg_and_star_defaults() {
        let m = Matcher::glob("zlib", false, DefaultExt::PcStar).unwrap();
        assert_eq!(m.effective(), "zlib.pc*");
        assert!(m.matches_name("zlib.pc"));

        let m = Matcher::glob("zlib", false, DefaultExt::Star).unwrap();
        assert_eq!(m.effective(), "zlib*");
        assert!(m.matches_name("zlib-ng"));
    }

    #[test]
    fn subdirectory_is_split_off_literally() {
        let m = glob("python\\Scripts\\pip.exe");
        assert_eq!(m.subdir(), Some("python\\Scripts"));
        assert!(!m.subdir_has_wildcards);
        assert!(m.matches_name("pip.exe"));

        let m = glob("py*\\pip.exe");
        assert_eq!(m.subdir(), Some("py*"));
        assert!(m.subdir_has_wildcards);
    }

    #[test]
    fn classes_match_exactly_but_widen_for_enumeration() {
        let m = glob("ms[gh]*.dll");
        assert_eq!(m.fs_pattern(), "ms*.dll");
        assert!(m.matches_name("msgsvc.dll"));
        assert!(m.matches_name("mshtml.dll"));
        assert!(!m.matches_name("msasn1.dll"));
    }

    #[test]
    fn case_sensitive_glob() {
        let m = Matcher::glob("Make*", true, DefaultExt::DotStar).unwrap();
        assert!(m.matches_name("Makefile.am"));
        assert!(!m.matches_name("makefile.am"));
    }

    #[test]
    fn regex_mode_searches_names() {
        let m = Matcher::regex(r"^lib.*\.a$", false).unwrap();
        assert!(m.is_regex());
        assert!(m.matches_name("libz.a"));
        assert!(m.matches_name("LIBC.A"));
        assert!(!m.matches_name("zlib.lib"));

        assert!(Matcher::regex(r"(unclosed", false).is_err());
    }
}
