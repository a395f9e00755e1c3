//! Command-line surface.
//!
//! Modes are plain flags (at least one is required, `--check` stands
//! alone); everything else tunes matching, reporting, or disables a
//! search root. `%ENVTOOL_OPTIONS%` is applied in front of the real
//! command line before parsing.

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use glob::Pattern;

use crate::pattern::{DefaultExt, Matcher};
use crate::probe::Disables;
use crate::report::{ReportOptions, SortSpec};
use crate::search::{OwnerFilter, SearchOptions, SignedFilter};
use crate::Bitness;

#[derive(Debug, Default, Parser)]
#[command(
    name = "envtool",
    disable_version_flag = true,
    about = "Locate files along PATH-like environment variables, registry App Paths, \
             compiler search paths and package catalogs",
    after_help = "At least one mode option is required. The pattern is a shell glob \
                  unless --regex is given."
)]
pub struct Cli {
    /// Search along %PATH%, the registry App Paths and the registry PATH blocks
    #[arg(long)]
    pub path: bool,

    /// Search along %LIB%, %LIBRARY_PATH% and the compilers' library paths
    #[arg(long)]
    pub lib: bool,

    /// Search along %INCLUDE% and the compilers' include paths
    #[arg(long)]
    pub include: bool,

    /// Search along %MANPATH% (manN/catN sub-directories included)
    #[arg(long)]
    pub man: bool,

    /// Search the CMake Modules directory, %CMAKE_MODULE_PATH% and the
    /// Kitware package registries
    #[arg(long)]
    pub cmake: bool,

    /// Search along %PKG_CONFIG_PATH%
    #[arg(long)]
    pub pkg: bool,

    /// Query the vcpkg catalog; =all also lists installed files and
    /// orphaned binary archives
    #[arg(long, value_name = "all", num_args = 0..=1, require_equals = true)]
    pub vcpkg: Option<Option<String>>,

    /// Search along %PYTHONPATH%
    #[arg(long, value_name = "variant", num_args = 0..=1, require_equals = true)]
    pub python: Option<Option<String>>,

    /// Query an Everything service (external)
    #[arg(long, value_name = "host", num_args = 0..=1, require_equals = true)]
    pub evry: Option<Option<String>>,

    /// Diagnostic sweep over all search roots; must be used alone
    #[arg(long)]
    pub check: bool,

    /// Case-sensitive matching
    #[arg(short = 'c')]
    pub case_sensitive: bool,

    /// Debug trace; repeat for more
    #[arg(short = 'd', action = ArgAction::Count)]
    pub debug: u8,

    /// Report directories only
    #[arg(short = 'D', long = "dir")]
    pub dir_only: bool,

    /// Treat the pattern as an extended regular expression
    #[arg(short = 'r', long)]
    pub regex: bool,

    /// Show the total size in the summary
    #[arg(short = 's', long)]
    pub size: bool,

    /// Sort the output: names|files|dirs[,reverse][,exact]
    #[arg(short = 'S', long, value_name = "type")]
    pub sort: Option<SortSpec>,

    /// No warnings, no summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// More detail (vcpkg dependency recursion, descriptions)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print version information; repeat for more
    #[arg(short = 'V', long = "version", action = ArgAction::Count)]
    pub version: u8,

    /// Decimal timestamps (YYYYMMDD.HHMMSS)
    #[arg(short = 'T')]
    pub decimal_time: bool,

    /// Unix-style slashes in reported paths
    #[arg(short = 'u')]
    pub unix_paths: bool,

    /// Look inside PE images (bitness, checksum, version)
    #[arg(long)]
    pub pe: bool,

    /// Trust filtering: bare reports status, =1 keeps signed, =0 keeps unsigned
    #[arg(long, value_name = "0|1", num_args = 0..=1, require_equals = true)]
    pub signed: Option<Option<u8>>,

    /// Only 32-bit PE images / x86 vcpkg triplets
    #[arg(long = "32", conflicts_with = "only64")]
    pub only32: bool,

    /// Only 64-bit PE images / x64 vcpkg triplets
    #[arg(long = "64")]
    pub only64: bool,

    #[arg(long = "no-gcc")]
    pub no_gcc: bool,

    #[arg(long = "no-g++")]
    pub no_gxx: bool,

    /// Skip the cross-prefixed GNU compilers
    #[arg(long = "no-prefix")]
    pub no_prefix: bool,

    /// Skip the Session-Manager (HKLM) environment
    #[arg(long = "no-sys")]
    pub no_sys: bool,

    /// Skip the per-user (HKCU) environment
    #[arg(long = "no-usr")]
    pub no_usr: bool,

    /// Skip the registry App Paths
    #[arg(long = "no-app")]
    pub no_app: bool,

    /// Accepted for compatibility; output is never colored
    #[arg(long = "no-colour", alias = "no-color", hide = true)]
    pub no_colour: bool,

    /// Accepted for compatibility; output is never colored
    #[arg(long = "no-ansi", hide = true)]
    pub no_ansi: bool,

    #[arg(long = "no-borland")]
    pub no_borland: bool,

    #[arg(long = "no-clang")]
    pub no_clang: bool,

    #[arg(long = "no-watcom")]
    pub no_watcom: bool,

    /// Do not prepend the current directory in --path mode
    #[arg(long = "no-cwd")]
    pub no_cwd: bool,

    /// Show file owners; with =[!]pattern, filter on them (repeatable)
    #[arg(
        long,
        value_name = "[!]pattern",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "*",
        action = ArgAction::Append
    )]
    pub owner: Vec<String>,

    /// Show 4NT/TCC DESCRIPT.ION descriptions
    #[arg(long)]
    pub descr: bool,

    /// The file pattern (glob, or regex with -r)
    pub pattern: Option<String>,
}

impl Cli {
    /// Parse the real command line with `%ENVTOOL_OPTIONS%` injected
    /// between the program name and the user's arguments.
    pub fn parse_with_env_options() -> Cli {
        let mut args: Vec<String> = std::env::args().collect();
        if let Ok(extra) = std::env::var("ENVTOOL_OPTIONS") {
            let injected: Vec<String> = extra.split_whitespace().map(str::to_string).collect();
            if !injected.is_empty() {
                tracing::debug!("ENVTOOL_OPTIONS adds {injected:?}");
                args.splice(1..1, injected);
            }
        }
        Cli::parse_from(args)
    }

    pub fn mode_count(&self) -> usize {
        [
            self.path,
            self.lib,
            self.include,
            self.man,
            self.cmake,
            self.pkg,
            self.vcpkg.is_some(),
            self.python.is_some(),
            self.evry.is_some(),
            self.check,
        ]
        .iter()
        .filter(|&&m| m)
        .count()
    }

    /// Cross-option validation the derive attributes cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.version > 0 {
            return Ok(());
        }
        if self.mode_count() == 0 {
            bail!("no mode option given; try --path, --include, --lib, ...");
        }
        if self.check && self.mode_count() > 1 {
            bail!("--check must be used alone");
        }
        if self.check && self.pattern.is_some() {
            bail!("--check takes no pattern");
        }
        if !self.check && self.pattern.is_none() {
            bail!("a file pattern is required");
        }
        if let Some(Some(value)) = &self.signed {
            if *value > 1 {
                bail!("--signed takes 0 or 1");
            }
        }
        if let Some(Some(value)) = &self.vcpkg {
            if !value.is_empty() && !value.eq_ignore_ascii_case("all") {
                bail!("--vcpkg takes only \"all\"");
            }
        }
        Ok(())
    }

    pub fn bits(&self) -> Bitness {
        if self.only32 {
            Bitness::Bits32
        } else if self.only64 {
            Bitness::Bits64
        } else {
            Bitness::Any
        }
    }

    pub fn signed_filter(&self) -> Option<SignedFilter> {
        match &self.signed {
            None => None,
            Some(None) => Some(SignedFilter::All),
            Some(Some(0)) => Some(SignedFilter::OnlyUnsigned),
            Some(Some(_)) => Some(SignedFilter::OnlySigned),
        }
    }

    pub fn owner_filters(&self) -> Result<Vec<OwnerFilter>> {
        let mut filters = Vec::new();
        for spec in &self.owner {
            if spec == "*" {
                // Bare --owner only turns the column on.
                continue;
            }
            let (negated, raw) = match spec.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, spec.as_str()),
            };
            match Pattern::new(raw) {
                Ok(pattern) => filters.push(OwnerFilter { negated, pattern }),
                Err(err) => bail!("bad --owner pattern {raw:?}: {err}"),
            }
        }
        Ok(filters)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            show_size_total: self.size,
            decimal_time: self.decimal_time,
            unix_paths: self.unix_paths,
            dirs_only: self.dir_only,
            quiet: self.quiet,
            sort: self.sort,
        }
    }

    pub fn search_options(&self) -> Result<SearchOptions> {
        Ok(SearchOptions {
            case_sensitive: self.case_sensitive,
            bits: self.bits(),
            verbose: self.verbose,
            no_cwd: self.no_cwd,
            no_sys: self.no_sys,
            no_usr: self.no_usr,
            no_app: self.no_app,
            use_pe: self.pe || self.signed.is_some(),
            signed: self.signed_filter(),
            show_owner: !self.owner.is_empty(),
            owner_filters: self.owner_filters()?,
            show_descriptions: self.descr,
            disables: Disables {
                gcc: self.no_gcc,
                gxx: self.no_gxx,
                clang: self.no_clang,
                borland: self.no_borland,
                watcom: self.no_watcom,
                prefixed: self.no_prefix,
            },
        })
    }

    /// Build the matcher for one mode; the default extension differs.
    pub fn matcher(&self, default_ext: DefaultExt) -> Result<Matcher> {
        let pattern = self.pattern.as_deref().unwrap_or("*");
        if self.regex {
            Matcher::regex(pattern, self.case_sensitive)
        } else {
            Matcher::glob(pattern, self.case_sensitive, default_ext)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("envtool").chain(args.iter().copied()))
    }

    #[test]
    fn a_mode_and_a_pattern_are_required() {
        assert!(parse(&["notepad.exe"]).validate().is_err());
        assert!(parse(&["--path"]).validate().is_err());
        assert!(parse(&["--path", "notepad.exe"]).validate().is_ok());
    }

    #[test]
    fn check_stands_alone() {
        assert!(parse(&["--check"]).validate().is_ok());
        assert!(parse(&["--check", "--path", "x"]).validate().is_err());
    }

    #[test]
    fn optional_values_accept_bare_and_equals_forms() {
        let cli = parse(&["--vcpkg", "zlib"]);
        assert_eq!(cli.vcpkg, Some(None));
        assert_eq!(cli.pattern.as_deref(), Some("zlib"));

        let cli = parse(&["--vcpkg=all", "zlib"]);
        assert_eq!(cli.vcpkg, Some(Some("all".to_string())));
        assert!(cli.validate().is_ok());

        let cli = parse(&["--python=py3", "six"]);
        assert_eq!(cli.python, Some(Some("py3".to_string())));
    }

    #[test]
    fn signed_tristate() {
        assert_eq!(
            parse(&["--path", "x", "--signed"]).signed_filter(),
            Some(SignedFilter::All)
        );
        assert_eq!(
            parse(&["--path", "x", "--signed=1"]).signed_filter(),
            Some(SignedFilter::OnlySigned)
        );
        assert_eq!(
            parse(&["--path", "x", "--signed=0"]).signed_filter(),
            Some(SignedFilter::OnlyUnsigned)
        );
        assert_eq!(parse(&["--path", "x"]).signed_filter(), None);
    }

    #[test]
    fn bitness_flags() {
        assert_eq!(parse(&["--path", "x", "--32"]).bits(), Bitness::Bits32);
        assert_eq!(parse(&["--path", "x", "--64"]).bits(), Bitness::Bits64);
        assert_eq!(parse(&["--path", "x"]).bits(), Bitness::Any);
        assert!(Cli::try_parse_from(["envtool", "--path", "x", "--32", "--64"]).is_err());
    }

    #[test]
    fn owner_specs_build_filters() {
        let cli = parse(&["--path", "x", "--owner", "--owner=!SYSTEM*", "--owner=MYPC\\*"]);
        let filters = cli.owner_filters().unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters[0].negated);
        assert!(!filters[1].negated);
        assert!(cli.search_options().unwrap().show_owner);
    }

    #[test]
    fn repeatable_counters() {
        let cli = parse(&["-d", "-d", "-V", "--path", "x"]);
        assert_eq!(cli.debug, 2);
        assert_eq!(cli.version, 1);
    }
}
