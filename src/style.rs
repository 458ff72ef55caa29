//! Stylesheet compilation
//!
//! Renders each `.scss` entry with grass, runs the post-processing chain and
//! writes the result next to its mirrored path with the platform extension.
//! Each stage returns a `Result`; [`StyleCompiler::compile`] is the per-file
//! error boundary, so one broken stylesheet never aborts the build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::graph::{ProducerReport, Step};
use crate::paths::{OutputExtensions, ProjectPaths};
use crate::postprocess::PostProcessChain;
use crate::report::Reporter;
use crate::source::{SourceFile, SourceKind};
use crate::writer;

pub struct StyleCompiler {
    paths: ProjectPaths,
    extensions: OutputExtensions,
    load_paths: Vec<PathBuf>,
    chain: Arc<PostProcessChain>,
    reporter: Reporter,
    limit: Arc<Semaphore>,
}

impl StyleCompiler {
    pub fn new(config: &Config, paths: &ProjectPaths, reporter: Reporter) -> Result<Self> {
        let chain = PostProcessChain::from_config(&config.styles)
            .map_err(|reason| BuildError::InvalidConfig { reason })?;

        Ok(Self {
            paths: paths.clone(),
            extensions: OutputExtensions {
                script: config.scripts.extension.clone(),
                stylesheet: config.styles.extension.clone(),
            },
            load_paths: config
                .styles
                .resolved_load_paths(&paths.source_dir())
                .iter()
                .map(|p| paths.root.join(p))
                .collect(),
            chain: Arc::new(chain),
            reporter,
            limit: Arc::new(Semaphore::new(config.settings.parallelism())),
        })
    }

    pub fn destination(&self, source: &Path) -> PathBuf {
        self.paths
            .destination(source, SourceKind::Stylesheet, &self.extensions)
    }

    /// Compile every stylesheet concurrently and wait for all of them
    pub async fn compile_all(&self, sources: &[SourceFile]) -> ProducerReport {
        let results = join_all(sources.iter().map(|source| async move {
            let _permit = self.limit.acquire().await.ok();
            self.compile(source).await
        }))
        .await;

        ProducerReport::from_results(Step::Styles, &results)
    }

    /// Compile one stylesheet. Failures are logged here and reported as
    /// `false`; nothing is written for a failed file.
    pub async fn compile(&self, source: &SourceFile) -> bool {
        match self.try_compile(&source.path).await {
            Ok(destination) => {
                tracing::debug!(source = %source.path.display(), dest = %destination.display(), "stylesheet written");
                true
            }
            Err(e) => {
                self.reporter.failed(&source.path, &e);
                false
            }
        }
    }

    async fn try_compile(&self, source: &Path) -> Result<PathBuf> {
        let destination = self.destination(source);

        self.reporter.compiling(source);
        let css = self.render(source).await?;
        self.reporter.compiled(source);

        let processed = self.post_process(source, css).await?;
        writer::write(&destination, processed).await?;
        self.reporter.written(&destination);

        Ok(destination)
    }

    async fn render(&self, source: &Path) -> Result<String> {
        let path = source.to_path_buf();
        let load_paths = self.load_paths.clone();

        tokio::task::spawn_blocking(move || {
            let mut options = grass::Options::default();
            for dir in &load_paths {
                options = options.load_path(dir);
            }
            grass::from_path(&path, &options).map_err(|e| BuildError::StyleRender {
                path: path.clone(),
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| BuildError::StepAborted {
            step: Step::Styles.to_string(),
            message: e.to_string(),
        })?
    }

    async fn post_process(&self, source: &Path, css: String) -> Result<String> {
        let chain = Arc::clone(&self.chain);
        let path = source.to_path_buf();

        tokio::task::spawn_blocking(move || {
            chain
                .process(&css)
                .map_err(|message| BuildError::PostProcess { path, message })
        })
        .await
        .map_err(|e| BuildError::StepAborted {
            step: Step::Styles.to_string(),
            message: e.to_string(),
        })?
    }
}
