//! Build orchestration
//!
//! Runs the step graph stage by stage: the collision check first, then the
//! three producers concurrently behind a join barrier. After the build the
//! caller's continuation runs and, in development mode, the watcher starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use futures::future::join_all;

use crate::assets::AssetMover;
use crate::config::Config;
use crate::error::Result;
use crate::graph::{BuildGraph, BuildPlan, ProducerReport, Step};
use crate::paths::{OutputExtensions, ProjectPaths};
use crate::report::Reporter;
use crate::script::{ScriptCompiler, Transpile};
use crate::source::{Patterns, Sources};
use crate::style::StyleCompiler;
use crate::tsconfig::TsProject;
use crate::watch::Watcher;

/// Whether a finished build hands over to the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    /// Map a `NODE_ENV`-style value; anything but `development` is a one-shot build
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("development") {
            BuildMode::Development
        } else {
            BuildMode::Production
        }
    }
}

/// The three leaf producers, shared between the build and the watcher
pub struct Producers {
    pub scripts: Arc<ScriptCompiler>,
    pub styles: Arc<StyleCompiler>,
    pub assets: Arc<AssetMover>,
}

/// Outcome of one build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub steps: Vec<ProducerReport>,
    pub duration: Duration,
}

impl BuildReport {
    pub fn step(&self, step: Step) -> Option<&ProducerReport> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn succeeded(&self) -> usize {
        self.steps.iter().map(|r| r.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.steps.iter().map(|r| r.failed).sum()
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    paths: ProjectPaths,
    patterns: Patterns,
    extensions: OutputExtensions,
    mode: BuildMode,
    graph: BuildGraph,
    producers: Arc<Producers>,
    reporter: Reporter,
}

impl Orchestrator {
    pub fn new(config: Config, paths: ProjectPaths, mode: BuildMode, reporter: Reporter) -> Result<Self> {
        let project = TsProject::load(&paths.root.join(&config.scripts.tsconfig))?;
        let patterns = Patterns::with_project(&config, &paths, &project)?;
        let producers = Producers {
            scripts: Arc::new(ScriptCompiler::new(&config, &paths, &project, reporter.clone())?),
            styles: Arc::new(StyleCompiler::new(&config, &paths, reporter.clone())?),
            assets: Arc::new(AssetMover::new(&config, &paths, reporter.clone())),
        };
        let extensions = OutputExtensions {
            script: config.scripts.extension.clone(),
            stylesheet: config.styles.extension.clone(),
        };

        Ok(Self {
            config: Arc::new(config),
            paths,
            patterns,
            extensions,
            mode,
            graph: BuildGraph::standard()?,
            producers: Arc::new(producers),
            reporter,
        })
    }

    /// Replace the script transpiler (the default runs an external command)
    pub fn with_transpiler(mut self, transpiler: Arc<dyn Transpile>) -> Self {
        let scripts = ScriptCompiler::with_transpiler(
            &self.config,
            &self.paths,
            self.reporter.clone(),
            transpiler,
        );
        self.producers = Arc::new(Producers {
            scripts: Arc::new(scripts),
            styles: Arc::clone(&self.producers.styles),
            assets: Arc::clone(&self.producers.assets),
        });
        self
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn plan(&self) -> BuildPlan {
        self.graph.plan()
    }

    pub fn discover(&self) -> Result<Sources> {
        Sources::discover(&self.patterns, &self.paths)
    }

    /// Run one build, then the continuation; in development mode keep
    /// watching afterwards.
    pub async fn run<F>(&self, on_complete: F) -> Result<BuildReport>
    where
        F: FnOnce(&BuildReport),
    {
        let report = self.build().await?;

        on_complete(&report);
        self.reporter.build_complete(&report);

        if self.mode == BuildMode::Development {
            self.watch().await?;
        }

        Ok(report)
    }

    /// One build: every stage is joined before the next one starts
    pub async fn build(&self) -> Result<BuildReport> {
        let start = Instant::now();
        let sources = self.discover()?;
        let mut steps = Vec::new();

        for stage in self.plan().stages {
            let results = join_all(stage.iter().map(|step| self.run_step(*step, &sources))).await;
            for result in results {
                steps.push(result?);
            }
        }

        Ok(BuildReport {
            steps,
            duration: start.elapsed(),
        })
    }

    async fn run_step(&self, step: Step, sources: &Sources) -> Result<ProducerReport> {
        let count = match step {
            Step::Verify => sources.len(),
            Step::Scripts => sources.scripts.len(),
            Step::Styles => sources.styles.len(),
            Step::Assets => sources.assets.len(),
        };
        let pb = self.reporter.spinner(format!("{} ({} files)", step, count));

        let report = match step {
            Step::Verify => sources
                .check_destinations(&self.paths, &self.extensions)
                .map(|()| ProducerReport::empty(Step::Verify)),
            Step::Scripts => Ok(self.producers.scripts.compile_all(&sources.scripts).await),
            Step::Styles => Ok(self.producers.styles.compile_all(&sources.styles).await),
            Step::Assets => Ok(self.producers.assets.move_all(&sources.assets).await),
        };

        pb.finish_and_clear();
        tracing::debug!(%step, ?report, "step finished");
        report
    }

    /// Start the watcher. Only returns if watching fails.
    pub async fn watch(&self) -> Result<()> {
        let watcher = Watcher::new(
            Arc::clone(&self.producers),
            self.patterns.clone(),
            self.paths.clone(),
            self.extensions.clone(),
            self.reporter.clone().with_timestamps(),
            Duration::from_millis(self.config.watch.debounce_ms),
        );
        Arc::new(watcher).run().await
    }

    /// Print the stages and what each would process, without running anything
    pub fn print_plan(&self, sources: &Sources) {
        println!("{}", style("Build plan (dry run):").bold().cyan());
        println!();

        for (i, stage) in self.plan().stages.iter().enumerate() {
            let parallel_note = if stage.len() > 1 { " (parallel)" } else { "" };
            println!(
                "{} {}{}",
                style(format!("Stage {}:", i + 1)).bold(),
                stage.iter().map(Step::name).collect::<Vec<_>>().join(", "),
                style(parallel_note).dim()
            );

            for step in stage {
                let files = match step {
                    Step::Verify => {
                        println!("    {} {} destinations", style("→").dim(), sources.len());
                        continue;
                    }
                    Step::Scripts => &sources.scripts,
                    Step::Styles => &sources.styles,
                    Step::Assets => &sources.assets,
                };
                for file in files {
                    println!(
                        "    {} {}",
                        style("→").dim(),
                        self.paths.relative_to_root(&file.path).display()
                    );
                }
            }
        }
    }
}
