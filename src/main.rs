//! wxbuild - build tool for mini-program projects
//!
//! - TypeScript → JavaScript through an external transpiler
//! - SCSS → WXSS with px → rpx conversion and vendor prefixes
//! - JSON / WXML copied as-is
//! - Watch mode for development

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use console::style;

mod assets;
mod cli;
mod config;
mod error;
mod graph;
mod orchestrator;
mod paths;
mod postprocess;
mod report;
mod script;
mod source;
mod style;
mod tsconfig;
mod watch;
mod writer;

use cli::{CheckFormat, Cli, Commands};
use config::Config;
use error::{BuildError, Result};
use orchestrator::{BuildMode, Orchestrator};
use paths::{OutputExtensions, ProjectPaths};
use report::Reporter;
use source::{Patterns, Sources};

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Change working directory if specified
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    match cli.effective_command() {
        Commands::Build { dry_run } => build(&cli, BuildMode::from_name(&cli.mode), dry_run).await,
        Commands::Watch => build(&cli, BuildMode::Development, false).await,
        Commands::Check { format } => check(&cli, format),
        Commands::Init { force } => init_config(force),
    }
}

/// Load config and resolve the project root: the config file's directory,
/// or the working directory when running on defaults.
fn load(cli: &Cli) -> Result<(Config, ProjectPaths)> {
    let (config, dir) = Config::load(cli.config.as_deref())?;
    let root = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let paths = ProjectPaths::from_config(&root, &config.paths);
    Ok((config, paths))
}

async fn build(cli: &Cli, mode: BuildMode, dry_run: bool) -> Result<()> {
    let (config, paths) = load(cli)?;
    let reporter = if cli.quiet {
        Reporter::hidden(&paths.root)
    } else {
        Reporter::new(&paths.root, false)
    };

    tracing::debug!(root = %paths.root.display(), ?mode, "starting build");
    let orchestrator = Orchestrator::new(config, paths, mode, reporter)?;

    if dry_run {
        let sources = orchestrator.discover()?;
        orchestrator.print_plan(&sources);
        return Ok(());
    }

    orchestrator
        .run(|report| {
            if report.failed() > 0 {
                tracing::warn!(failed = report.failed(), "build finished with failures");
            }
        })
        .await?;

    Ok(())
}

fn check(cli: &Cli, format: CheckFormat) -> Result<()> {
    let (config, paths) = load(cli)?;
    let patterns = Patterns::from_config(&config, &paths)?;
    let sources = Sources::discover(&patterns, &paths)?;
    let extensions = OutputExtensions {
        script: config.scripts.extension.clone(),
        stylesheet: config.styles.extension.clone(),
    };
    sources.check_destinations(&paths, &extensions)?;

    match format {
        CheckFormat::Table => {
            println!(
                "{} {} → {}",
                style("✓").green(),
                display_dir(&paths, &paths.source_root),
                display_dir(&paths, &paths.output_root)
            );
            for (label, count) in [
                ("scripts", sources.scripts.len()),
                ("styles", sources.styles.len()),
                ("assets", sources.assets.len()),
            ] {
                println!("  {:<8} {}", style(label).cyan().bold(), count);
            }
            println!("  {}", style("no output collisions").dim());
        }

        CheckFormat::Json => {
            let output = serde_json::json!({
                "root": paths.root,
                "source_root": paths.source_root,
                "output_root": paths.output_root,
                "scripts": sources.scripts.len(),
                "styles": sources.styles.len(),
                "assets": sources.assets.len(),
            });
            let text = serde_json::to_string_pretty(&output).map_err(|e| BuildError::InvalidConfig {
                reason: e.to_string(),
            })?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn display_dir(paths: &ProjectPaths, dir: &Path) -> String {
    paths.relative_to_root(dir).display().to_string()
}

fn init_config(force: bool) -> Result<()> {
    let path = Path::new("wxbuild.toml");

    if path.exists() && !force {
        return Err(BuildError::InvalidConfig {
            reason: "wxbuild.toml already exists (use --force to overwrite)".to_string(),
        });
    }

    let template = r#"# wxbuild.toml - build configuration
# Every key is optional; the values below are the defaults.

[paths]
src = "src"
dist = "dist"

[scripts]
# include = []            # empty: tsconfig.json "files" + "include", else <src>/**/*.ts
exclude = ["node_modules/**", "_scripts/**", "**/*.d.ts"]
# {target} and {format} come from tsconfig.json compilerOptions.target / module
command = "esbuild {file} --format={format} --target={target} --log-level=warning"

[styles]
# Unset globs are rooted at [paths].src
# include = ["src/**/*.scss"]
# exclude = ["src/styles/**"]   # partials, compiled only through @import
# load_paths = ["src/styles"]
px_to_rpx = 2.0
precision = 6
browsers = ["last 5 versions"]

[assets]
# include = ["src/**/*.json", "src/**/*.wxml"]

[watch]
debounce_ms = 50

[settings]
# parallelism = 0           # Max files compiled at once (0 = auto)
"#;

    std::fs::write(path, template)?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style("wxbuild.toml").bold()
    );

    Ok(())
}
