use std::path::Path;

use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;

use envtool::cache::Cache;
use envtool::config::Config;
use envtool::options::Cli;
use envtool::pattern::DefaultExt;
use envtool::report::Reporter;
use envtool::search::Searcher;
use envtool::{halt, probe};

fn setup_logger(debug: u8) {
    let level = match debug {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    // `-d` only raises envtool's own level; other crates follow RUST_LOG.
    if let Ok(directive) = format!("envtool={level}").parse() {
        env_filter = env_filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_version(level: u8, config_path: Option<&Path>) {
    println!("envtool {}", env!("CARGO_PKG_VERSION"));
    if level >= 2 {
        println!("cache file:  {}", Cache::default_path().display());
        match config_path {
            Some(path) => println!("config file: {}", path.display()),
            None => println!("config file: (none)"),
        }
    }
    if level >= 3 {
        let config = Config::load(config_path);
        for tc in probe::detect(&config, &Default::default()) {
            let location = tc
                .full_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not found".to_string());
            let ignored = if tc.ignored { " (ignored)" } else { "" };
            println!("{:<28} {location}{ignored}", tc.short_name);
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let config_path = Config::default_path();
    if cli.version > 0 {
        print_version(cli.version, config_path.as_deref());
        return Ok(true);
    }
    cli.validate()?;

    halt::install();
    let config = Config::load(config_path.as_deref());
    // Heavy debugging implies distrust of memoized probe results.
    let mut cache = if cli.debug >= 2 {
        Cache::disabled()
    } else {
        Cache::open(Cache::default_path())
    };

    let reporter = Reporter::new(cli.report_options());
    let mut searcher = Searcher::new(
        cli.matcher(DefaultExt::DotStar)?,
        cli.search_options()?,
        &config,
        &mut cache,
        reporter,
    );

    if cli.check {
        searcher.check_mode();
    } else {
        if cli.path {
            searcher.path_mode();
        }
        if cli.include {
            searcher.include_mode();
        }
        if cli.lib {
            searcher.lib_mode();
        }
        if cli.man {
            searcher.man_mode();
        }
        if cli.cmake {
            searcher.cmake_mode();
        }
        if cli.pkg {
            searcher.set_matcher(cli.matcher(DefaultExt::PcStar)?);
            searcher.pkg_mode();
            searcher.set_matcher(cli.matcher(DefaultExt::DotStar)?);
        }
        if let Some(variant) = &cli.python {
            searcher.set_matcher(cli.matcher(DefaultExt::Star)?);
            searcher.python_mode(variant.as_deref());
            searcher.set_matcher(cli.matcher(DefaultExt::DotStar)?);
        }
        if let Some(arg) = &cli.vcpkg {
            let all = arg.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("all"));
            searcher.set_matcher(cli.matcher(DefaultExt::Star)?);
            searcher.vcpkg_mode(all);
            searcher.set_matcher(cli.matcher(DefaultExt::DotStar)?);
        }
        if let Some(host) = &cli.evry {
            searcher.evry_mode(host.as_deref());
        }
    }

    let totals = searcher.into_reporter().finish();
    if halt::count() <= 1 {
        if let Err(err) = cache.save() {
            tracing::warn!("could not save the cache: {err}");
        }
    }
    Ok(cli.check || totals.hits > 0)
}

fn main() {
    let cli = Cli::parse_with_env_options();
    setup_logger(cli.debug);
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("envtool: {err}");
            std::process::exit(2);
        }
    }
}
