//! wxbuild - build tool for mini-program projects
//!
//! This crate provides both a CLI tool and a library for building
//! mini-program sources into a deployable output tree.
//!
//! # Features
//!
//! - **TypeScript** - each `.ts` file is transpiled to `.js` by an external command
//! - **SCSS** - compiled to `.wxss`, then `px` → `rpx` and vendor prefixes
//! - **Assets** - `.json` and `.wxml` copied as-is
//! - **Collision check** - two sources mapping to one output fail the build
//! - **Watch mode** - per-file rebuilds in development
//!
//! # Example
//!
//! ```toml
//! # wxbuild.toml
//!
//! [paths]
//! src = "src"
//! dist = "dist"
//!
//! [styles]
//! px_to_rpx = 2.0
//! browsers = ["last 5 versions"]
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use wxbuild::{BuildMode, Config, Orchestrator, ProjectPaths, Reporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, dir) = Config::load(None)?;
//!     let root = dir.unwrap_or(std::env::current_dir()?);
//!     let paths = ProjectPaths::from_config(&root, &config.paths);
//!
//!     let orchestrator = Orchestrator::new(config, paths, BuildMode::Production, Reporter::new(&root, false))?;
//!     orchestrator.run(|report| println!("{} files built", report.succeeded())).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod paths;
pub mod postprocess;
pub mod report;
pub mod script;
pub mod source;
pub mod style;
pub mod tsconfig;
pub mod watch;
pub mod writer;

// Re-export main types
pub use assets::AssetMover;
pub use config::Config;
pub use error::{BuildError, Result};
pub use graph::{BuildGraph, BuildPlan, ProducerReport, Step};
pub use orchestrator::{BuildMode, BuildReport, Orchestrator, Producers};
pub use paths::{OutputExtensions, ProjectPaths};
pub use postprocess::{Autoprefixer, PostProcess, PostProcessChain, PxToRpx};
pub use report::Reporter;
pub use script::{CommandTranspiler, ScriptCompiler, Transpile};
pub use source::{FileSet, Patterns, SourceFile, SourceKind, Sources};
pub use style::StyleCompiler;
pub use tsconfig::{CompilerOptions, TsProject};
pub use watch::{Trigger, Watcher};
