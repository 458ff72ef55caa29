//! File watching for development builds
//!
//! Uses `notify` with debouncing. Three subscriptions (scripts, stylesheets,
//! assets) each re-run only their own producer for the changed file. A path
//! that is already compiling is not started twice: further changes coalesce
//! into a single follow-up run. A path seen for the first time is checked
//! for output collisions before it is built, as a full build would.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::mpsc;

use crate::error::{BuildError, Result};
use crate::orchestrator::Producers;
use crate::paths::{OutputExtensions, ProjectPaths};
use crate::report::Reporter;
use crate::source::{Patterns, SourceFile, SourceKind, Sources};

/// What a change event asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Script(PathBuf),
    Style(PathBuf),
    /// A partial changed; every stylesheet may import it
    AllStyles,
    Asset(PathBuf, SourceKind),
}

/// Per-path in-flight guard
///
/// `true` in the map means another change arrived while the path was compiling.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<HashMap<PathBuf, bool>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the path. Returns `false` when a run is already going; that run
    /// will go round once more instead.
    pub fn try_begin(&self, key: &Path) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(key) {
            Some(follow_up) => {
                *follow_up = true;
                false
            }
            None => {
                slots.insert(key.to_path_buf(), false);
                true
            }
        }
    }

    /// Release the path, or keep it and return `true` when a follow-up run is owed
    pub fn finish(&self, key: &Path) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(key) {
            Some(follow_up) if *follow_up => {
                *follow_up = false;
                true
            }
            _ => {
                slots.remove(key);
                false
            }
        }
    }

    pub fn is_running(&self, key: &Path) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

pub struct Watcher {
    producers: Arc<Producers>,
    patterns: Patterns,
    paths: ProjectPaths,
    extensions: OutputExtensions,
    /// Sources that passed the collision check
    known: Mutex<HashSet<PathBuf>>,
    canonical_root: Option<PathBuf>,
    reporter: Reporter,
    debounce: Duration,
    in_flight: InFlight,
}

impl Watcher {
    pub fn new(
        producers: Arc<Producers>,
        patterns: Patterns,
        paths: ProjectPaths,
        extensions: OutputExtensions,
        reporter: Reporter,
        debounce: Duration,
    ) -> Self {
        let canonical_root = std::fs::canonicalize(&paths.root).ok();
        Self {
            producers,
            patterns,
            paths,
            extensions,
            known: Mutex::new(HashSet::new()),
            canonical_root,
            reporter,
            debounce,
            in_flight: InFlight::new(),
        }
    }

    /// Every pattern being watched, for display
    pub fn patterns(&self) -> Vec<String> {
        [
            &self.patterns.scripts,
            &self.patterns.styles,
            &self.patterns.partials,
            &self.patterns.assets,
        ]
        .iter()
        .flat_map(|set| set.patterns().iter().cloned())
        .collect()
    }

    /// Map a changed path to its producer. Deleted paths, the output tree and
    /// unmatched files yield nothing.
    pub fn route(&self, path: &Path) -> Option<Trigger> {
        let relative = path
            .strip_prefix(&self.paths.root)
            .ok()
            .or_else(|| {
                self.canonical_root
                    .as_ref()
                    .and_then(|root| path.strip_prefix(root).ok())
            })?;
        let path = self.paths.root.join(relative);

        if self.paths.is_in_output(&path) || !path.is_file() {
            return None;
        }

        if self.patterns.is_partial(relative) {
            return Some(Trigger::AllStyles);
        }

        match self.patterns.classify(relative)? {
            SourceKind::Script => Some(Trigger::Script(path)),
            SourceKind::Stylesheet => Some(Trigger::Style(path)),
            kind => Some(Trigger::Asset(path, kind)),
        }
    }

    /// Watch until the event channel closes
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(64);

        let mut debouncer = new_debouncer(
            self.debounce,
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match events {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    let _ = tx.blocking_send(paths);
                }
                Err(e) => tracing::warn!("watch error: {}", e),
            },
        )
        .map_err(|source| BuildError::Watch { source })?;

        debouncer
            .watcher()
            .watch(&self.paths.root, RecursiveMode::Recursive)
            .map_err(|source| BuildError::Watch { source })?;

        self.reporter.watching(&self.patterns());

        while let Some(paths) = rx.recv().await {
            for path in paths {
                if let Some(trigger) = self.route(&path) {
                    self.reporter.changed(&path);
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.handle(trigger).await });
                }
            }
        }

        Ok(())
    }

    fn key(&self, trigger: &Trigger) -> PathBuf {
        match trigger {
            Trigger::Script(path) | Trigger::Style(path) | Trigger::Asset(path, _) => path.clone(),
            Trigger::AllStyles => self.paths.source_root.clone(),
        }
    }

    /// Check a path not seen before against every current source. On a
    /// collision the path is reported and not built; it is checked again on
    /// its next change.
    fn admit(&self, trigger: &Trigger) -> bool {
        let path = match trigger {
            Trigger::Script(path) | Trigger::Style(path) | Trigger::Asset(path, _) => path,
            Trigger::AllStyles => return true,
        };

        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        if known.contains(path) {
            return true;
        }

        let checked = Sources::discover(&self.patterns, &self.paths)
            .and_then(|sources| {
                sources.check_destinations(&self.paths, &self.extensions)?;
                Ok(sources)
            });
        match checked {
            Ok(sources) => {
                known.extend(sources.iter().map(|source| source.path.clone()));
                // may be gone already; the producer reports that
                known.insert(path.clone());
                true
            }
            Err(e) => {
                self.reporter.failed(path, &e);
                false
            }
        }
    }

    /// Run the producer for a trigger under the in-flight guard
    pub async fn handle(&self, trigger: Trigger) {
        if !self.admit(&trigger) {
            return;
        }

        let key = self.key(&trigger);
        if !self.in_flight.try_begin(&key) {
            tracing::debug!(key = %key.display(), "already compiling, queued one follow-up");
            return;
        }

        loop {
            self.execute(&trigger).await;
            if !self.in_flight.finish(&key) {
                break;
            }
        }
    }

    async fn execute(&self, trigger: &Trigger) {
        match trigger {
            Trigger::Script(path) => {
                self.producers
                    .scripts
                    .compile(&SourceFile::new(path, SourceKind::Script))
                    .await;
            }
            Trigger::Style(path) => {
                self.producers
                    .styles
                    .compile(&SourceFile::new(path, SourceKind::Stylesheet))
                    .await;
            }
            Trigger::AllStyles => match Sources::discover(&self.patterns, &self.paths) {
                Ok(sources) => {
                    self.producers.styles.compile_all(&sources.styles).await;
                }
                Err(e) => self.reporter.failed(&self.paths.source_root, &e),
            },
            Trigger::Asset(path, kind) => {
                self.producers
                    .assets
                    .copy(&SourceFile::new(path, *kind))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetMover;
    use crate::config::Config;
    use crate::script::{ScriptCompiler, Transpile};
    use crate::style::StyleCompiler;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl Transpile for Counting {
        fn transpile<'a>(&'a self, _source: &'a Path) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("compiled".to_string())
            })
        }
    }

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn watcher(root: &Path, calls: Arc<AtomicUsize>) -> Watcher {
        watcher_with(root, Config::default(), calls)
    }

    fn watcher_with(root: &Path, config: Config, calls: Arc<AtomicUsize>) -> Watcher {
        let paths = ProjectPaths::resolve(root);
        let reporter = Reporter::hidden(root);
        let producers = Producers {
            scripts: Arc::new(ScriptCompiler::with_transpiler(
                &config,
                &paths,
                reporter.clone(),
                Arc::new(Counting(calls)),
            )),
            styles: Arc::new(StyleCompiler::new(&config, &paths, reporter.clone()).unwrap()),
            assets: Arc::new(AssetMover::new(&config, &paths, reporter.clone())),
        };
        let patterns = Patterns::from_config(&config, &paths).unwrap();
        let extensions = OutputExtensions {
            script: config.scripts.extension.clone(),
            stylesheet: config.styles.extension.clone(),
        };
        Watcher::new(
            Arc::new(producers),
            patterns,
            paths,
            extensions,
            reporter,
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_in_flight_coalesces() {
        let guard = InFlight::new();
        let key = Path::new("/proj/src/a.scss");

        assert!(guard.try_begin(key));
        assert!(!guard.try_begin(key));
        assert!(!guard.try_begin(key));
        // two extra events owe exactly one follow-up
        assert!(guard.finish(key));
        assert!(guard.is_running(key));
        assert!(!guard.finish(key));
        assert!(!guard.is_running(key));
        assert!(guard.try_begin(key));
    }

    #[test]
    fn test_route() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let ts = write(root, "src/app.ts", "");
        let scss = write(root, "src/app.scss", "");
        let partial = write(root, "src/styles/_vars.scss", "");
        let json = write(root, "src/app.json", "");
        let out = write(root, "dist/app.json", "");
        let other = write(root, "src/readme.md", "");

        let w = watcher(root, Arc::new(AtomicUsize::new(0)));
        assert_eq!(w.route(&ts), Some(Trigger::Script(ts.clone())));
        assert_eq!(w.route(&scss), Some(Trigger::Style(scss.clone())));
        assert_eq!(w.route(&partial), Some(Trigger::AllStyles));
        assert_eq!(
            w.route(&json),
            Some(Trigger::Asset(json.clone(), SourceKind::AssetData))
        );
        assert_eq!(w.route(&out), None);
        assert_eq!(w.route(&other), None);
        assert_eq!(w.route(&root.join("src/deleted.scss")), None);
    }

    #[tokio::test]
    async fn test_style_change_only_rebuilds_that_file() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let scss = write(root, "src/pages/a.scss", ".a { top: 1px; }\n");
        write(root, "src/pages/b.scss", ".b { top: 1px; }\n");
        write(root, "src/app.json", "{}");

        let calls = Arc::new(AtomicUsize::new(0));
        let w = watcher(root, Arc::clone(&calls));
        let trigger = w.route(&scss).unwrap();
        w.handle(trigger).await;

        assert!(root.join("dist/pages/a.wxss").exists());
        assert!(!root.join("dist/pages/b.wxss").exists());
        assert!(!root.join("dist/app.json").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_asset_change_only_recopies() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let json = write(root, "src/app.json", "{\"a\":1}");
        write(root, "src/app.scss", ".a { top: 1px; }\n");

        let calls = Arc::new(AtomicUsize::new(0));
        let w = watcher(root, Arc::clone(&calls));
        w.handle(w.route(&json).unwrap()).await;

        assert_eq!(std::fs::read_to_string(root.join("dist/app.json")).unwrap(), "{\"a\":1}");
        assert!(!root.join("dist/app.wxss").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_change_rebuilds_all_styles() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let partial = write(root, "src/styles/_vars.scss", "$c: red;\n");
        write(root, "src/a.scss", "@import \"vars\";\n.a { color: $c; }\n");
        write(root, "src/b.scss", "@import \"vars\";\n.b { color: $c; }\n");

        let w = watcher(root, Arc::new(AtomicUsize::new(0)));
        w.handle(w.route(&partial).unwrap()).await;

        assert!(root.join("dist/a.wxss").exists());
        assert!(root.join("dist/b.wxss").exists());
        assert!(!root.join("dist/styles").exists());
    }

    #[tokio::test]
    async fn test_added_file_with_colliding_output_is_not_built() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let scss = write(root, "src/a.scss", ".a { top: 1px; }\n");
        let other = write(root, "src/b.scss", ".b { top: 1px; }\n");

        let mut config = Config::default();
        config.assets.include = Some(vec!["src/**/*.wxss".to_string()]);
        let w = watcher_with(root, config, Arc::new(AtomicUsize::new(0)));

        // first sighting passes while nothing collides
        w.handle(w.route(&scss).unwrap()).await;
        let compiled = std::fs::read_to_string(root.join("dist/a.wxss")).unwrap();

        // a hand-written a.wxss appears during development
        let added = write(root, "src/a.wxss", ".hand { color: blue; }\n");
        w.handle(w.route(&added).unwrap()).await;
        assert_eq!(
            std::fs::read_to_string(root.join("dist/a.wxss")).unwrap(),
            compiled
        );

        // unrelated new files still build
        w.handle(w.route(&other).unwrap()).await;
        assert!(root.join("dist/b.wxss").exists());

        // once the clash is gone the added file is accepted
        std::fs::remove_file(&scss).unwrap();
        w.handle(w.route(&added).unwrap()).await;
        assert_eq!(
            std::fs::read_to_string(root.join("dist/a.wxss")).unwrap(),
            ".hand { color: blue; }\n"
        );
    }

    #[tokio::test]
    async fn test_burst_of_changes_runs_at_most_twice() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let ts = write(root, "src/app.ts", "");

        let calls = Arc::new(AtomicUsize::new(0));
        let w = Arc::new(watcher(root, Arc::clone(&calls)));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let w = Arc::clone(&w);
                let trigger = Trigger::Script(ts.clone());
                tokio::spawn(async move { w.handle(trigger).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let n = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&n), "transpiled {n} times");
        assert!(root.join("dist/app.js").exists());
        assert!(!w.in_flight.is_running(&ts));
    }

    #[tokio::test]
    async fn test_live_watch_recompiles_changed_stylesheet() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        std::fs::create_dir_all(root.join("src")).unwrap();

        let w = Arc::new(watcher(&root, Arc::new(AtomicUsize::new(0))));
        let out = root.join("dist/late.wxss");

        let poll = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            write(&root, "src/late.scss", ".late { top: 2px; }\n");
            for _ in 0..100 {
                if out.exists() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            false
        };

        let found = tokio::select! {
            result = Arc::clone(&w).run() => panic!("watcher stopped early: {result:?}"),
            found = poll => found,
        };

        assert!(found, "watcher never wrote {}", out.display());
    }
}
