//! GNU gcc/g++ probing.
//!
//! The include list comes from `<gcc> -v -dM -xc -c -` with stdin closed;
//! the directories sit between the `#include <...> search starts here:` and
//! `End of search list.` markers on stderr. Library directories come from
//! the `LIBRARY_PATH=` line of a second invocation (which fails to link —
//! that is fine, the line is printed anyway).

use std::path::Path;

use anyhow::Result;
use fs_err as fs;

use crate::dirlist::DirList;
use crate::spawn;
use crate::Bitness;

const INCLUDE_START: &str = "#include <...> search starts here:";
const INCLUDE_END: &str = "End of search list.";
const LIBRARY_PATH: &str = "LIBRARY_PATH=";

/// Extract the raw include directories between the gcc markers.
pub fn parse_include_lines(lines: &[String]) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut inside = false;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with(INCLUDE_START) {
            inside = true;
            continue;
        }
        if trimmed.starts_with(INCLUDE_END) {
            break;
        }
        if inside && !trimmed.is_empty() {
            dirs.push(trimmed.to_string());
        }
    }
    dirs
}

/// Find the `LIBRARY_PATH=` report.
pub fn parse_library_path(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .find_map(|l| l.strip_prefix(LIBRARY_PATH))
        .map(str::to_string)
}

/// Whether the candidates betray a Cygwin-hosted compiler.
pub fn is_cygwin_output(dirs: &[String]) -> bool {
    dirs.iter()
        .any(|d| d.starts_with("/usr/") || d.starts_with("/cygdrive/"))
}

/// Split a `LIBRARY_PATH=` style list. Windows-hosted compilers separate
/// with `;`; Cygwin ones with `:`, where a lone letter before a slash is a
/// drive, not a separator.
pub fn split_path_list(value: &str) -> Vec<String> {
    if value.contains(';') {
        return value
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    let mut out: Vec<String> = Vec::new();
    for piece in value.split(':') {
        if piece.is_empty() {
            continue;
        }
        // Re-join `c` + `/mingw/lib` into `c:/mingw/lib`.
        if let Some(last) = out.last_mut() {
            if last.len() == 1 && last.as_bytes()[0].is_ascii_alphabetic() {
                *last = format!("{last}:{piece}");
                continue;
            }
        }
        out.push(piece.to_string());
    }
    out
}

pub fn include_dirs(
    short_name: &str,
    exe: &Path,
    cxx: bool,
    cygwin_root: Option<&Path>,
    case_sensitive: bool,
) -> Result<DirList> {
    let lines = spawn::capture(exe, &["-v", "-dM", "-xc", "-c", "-"])?;
    // gcc leaves the object for `-` behind in the current directory.
    let _ = fs::remove_file("-.o");

    let raw = parse_include_lines(&lines);
    let cygwin = is_cygwin_output(&raw);
    let mut list = DirList::new(short_name);
    let mut cxx_subs = Vec::new();
    for dir in &raw {
        let root = if cygwin { cygwin_root } else { None };
        let converted = crate::canon::canonicalize(dir, root);
        if cxx {
            // libstdc++ headers live in a c++ sub-directory next to the C
            // ones on MinGW layouts; they are appended after the reported
            // list.
            let sub = Path::new(&converted).join("c++");
            if sub.is_dir() {
                cxx_subs.push(sub.to_string_lossy().into_owned());
            }
        }
        list.push_dir(&converted, None, case_sensitive);
    }
    for sub in cxx_subs {
        list.push_dir(&sub, None, case_sensitive);
    }
    list.uniquify(case_sensitive);
    Ok(list)
}

pub fn library_dirs(
    short_name: &str,
    exe: &Path,
    bits: Bitness,
    cygwin_root: Option<&Path>,
    case_sensitive: bool,
) -> Result<DirList> {
    let mut args = vec!["-v"];
    match bits {
        Bitness::Bits32 => args.push("-m32"),
        Bitness::Bits64 => args.push("-m64"),
        Bitness::Any => {}
    }
    args.extend(["-xc", "-"]);
    let lines = spawn::capture_unchecked(exe, &args)?;
    let mut list = DirList::new(short_name);
    if let Some(value) = parse_library_path(&lines) {
        let cygwin = value.starts_with('/') || value.contains(":/cygdrive/");
        for dir in split_path_list(&value) {
            let root = if cygwin || dir.starts_with('/') {
                cygwin_root
            } else {
                None
            };
            list.push_dir(&crate::canon::canonicalize(&dir, root), None, case_sensitive);
        }
    }
    list.uniquify(case_sensitive);
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const GCC_V: &str = "\
Using built-in specs.
COLLECT_GCC=gcc
Target: x86_64-w64-mingw32
ignoring nonexistent directory \"C:/mingw64/lib/gcc/../include\"
#include \"...\" search starts here:
#include <...> search starts here:
 C:/mingw64/lib/gcc/x86_64-w64-mingw32/13.2.0/include
 C:/mingw64/x86_64-w64-mingw32/include
End of search list.
COMPILER_PATH=C:/mingw64/bin
LIBRARY_PATH=C:/mingw64/lib/gcc;C:/mingw64/lib/gcc;C:/mingw64/lib
";

    #[test]
    fn include_markers_bound_the_list() {
        let dirs = parse_include_lines(&lines(GCC_V));
        assert_eq!(
            dirs,
            [
                "C:/mingw64/lib/gcc/x86_64-w64-mingw32/13.2.0/include",
                "C:/mingw64/x86_64-w64-mingw32/include"
            ]
        );
    }

    #[test]
    fn library_path_line_is_found() {
        assert_eq!(
            parse_library_path(&lines(GCC_V)).as_deref(),
            Some("C:/mingw64/lib/gcc;C:/mingw64/lib/gcc;C:/mingw64/lib")
        );
        assert_eq!(parse_library_path(&lines("nothing here")), None);
    }

    #[test]
    fn cygwin_detection() {
        assert!(is_cygwin_output(&lines(
            "/usr/lib/gcc/i686-w64-mingw32/6.4.0/include"
        )));
        assert!(is_cygwin_output(&lines("/cygdrive/c/x")));
        assert!(!is_cygwin_output(&lines("C:/mingw64/include")));
    }

    #[test]
    fn path_list_split_handles_both_separators() {
        assert_eq!(
            split_path_list("C:/a;C:/b"),
            ["C:/a", "C:/b"]
        );
        assert_eq!(
            split_path_list("/usr/lib:/usr/local/lib"),
            ["/usr/lib", "/usr/local/lib"]
        );
        // Drive letters survive colon splitting.
        assert_eq!(split_path_list("c:/mingw/lib:/usr/lib"), ["c:/mingw/lib", "/usr/lib"]);
    }
}
