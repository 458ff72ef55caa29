//! Static asset copying (`.json` data, `.wxml` markup)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Result;
use crate::graph::{ProducerReport, Step};
use crate::paths::ProjectPaths;
use crate::report::Reporter;
use crate::source::SourceFile;
use crate::writer;

pub struct AssetMover {
    paths: ProjectPaths,
    reporter: Reporter,
    limit: Arc<Semaphore>,
}

impl AssetMover {
    pub fn new(config: &Config, paths: &ProjectPaths, reporter: Reporter) -> Self {
        Self {
            paths: paths.clone(),
            reporter,
            limit: Arc::new(Semaphore::new(config.settings.parallelism())),
        }
    }

    pub fn destination(&self, source: &Path) -> PathBuf {
        self.paths.mirror(source)
    }

    pub async fn move_all(&self, sources: &[SourceFile]) -> ProducerReport {
        let results = join_all(sources.iter().map(|source| async move {
            let _permit = self.limit.acquire().await.ok();
            self.copy(source).await
        }))
        .await;

        ProducerReport::from_results(Step::Assets, &results)
    }

    /// Copy one asset unmodified; a failure is logged and reported as `false`
    pub async fn copy(&self, source: &SourceFile) -> bool {
        match self.try_copy(&source.path).await {
            Ok(destination) => {
                self.reporter.copied(&destination);
                true
            }
            Err(e) => {
                self.reporter.failed(&source.path, &e);
                false
            }
        }
    }

    async fn try_copy(&self, source: &Path) -> Result<PathBuf> {
        let destination = self.destination(source);
        let bytes = writer::copy(source, &destination).await?;
        tracing::debug!(source = %source.display(), bytes, "asset copied");
        Ok(destination)
    }
}
