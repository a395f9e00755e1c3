//! Child-process probes.
//!
//! Every toolchain/package-manager probe is one short-lived spawn whose
//! whole output is captured before parsing; components then match lines
//! against their sentinels. Stdout and stderr are both collected since
//! gcc-style compilers report their search paths on stderr.

use std::ffi::OsStr;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

/// Run `program` with `args`, stdin closed, and return the captured output
/// as lines (stdout first, then stderr). A non-zero exit is an error whose
/// message carries the last non-blank captured line, which is what gets
/// shown when a toolchain is skipped.
pub fn capture<S: AsRef<OsStr>>(program: S, args: &[&str]) -> Result<Vec<String>> {
    let program = program.as_ref();
    let prog_display = program.to_string_lossy().into_owned();
    tracing::debug!("spawning {prog_display} {args:?}");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("failed to spawn {prog_display}"))?;

    let mut lines: Vec<String> = Vec::new();
    for chunk in [&output.stdout, &output.stderr] {
        lines.extend(String::from_utf8_lossy(chunk).lines().map(str::to_string));
    }
    if !output.status.success() {
        let reason = lines
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| output.status.to_string());
        return Err(anyhow!("{prog_display}: {reason}"));
    }
    Ok(lines)
}

/// Like [`capture`] but the exit status is ignored. Some probes are
/// expected to fail overall while still printing the line of interest
/// (gcc run without a `main` still reports `LIBRARY_PATH=`).
pub fn capture_unchecked<S: AsRef<OsStr>>(program: S, args: &[&str]) -> Result<Vec<String>> {
    let program = program.as_ref();
    let prog_display = program.to_string_lossy().into_owned();
    tracing::debug!("spawning {prog_display} {args:?} (status ignored)");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("failed to spawn {prog_display}"))?;
    let mut lines: Vec<String> = Vec::new();
    for chunk in [&output.stdout, &output.stderr] {
        lines.extend(String::from_utf8_lossy(chunk).lines().map(str::to_string));
    }
    Ok(lines)
}

/// Pull the first dotted version out of probe output, zero-padded to four
/// components. Accepts `cmake version 3.27.9`, `0.29.2`,
/// `Vcpkg package management program version 2023-11-20`, and the like.
pub fn version_numbers(lines: &[String]) -> Option<(u32, u32, u32, u32)> {
    let re = regex::Regex::new(r"(\d+)[.-](\d+)(?:[.-](\d+))?(?:[.-](\d+))?").unwrap();
    for line in lines {
        if let Some(caps) = re.captures(line) {
            let num = |i: usize| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0u32)
            };
            return Some((num(1), num(2), num(3), num(4)));
        }
    }
    None
}
