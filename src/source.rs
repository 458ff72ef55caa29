//! Source discovery
//!
//! Walks the project root and sorts files into the three producers' inputs
//! using gulp-style glob lists (`./` prefixes allowed, `!` entries exclude).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::paths::{OutputExtensions, ProjectPaths};
use crate::tsconfig::TsProject;

/// What a source file is compiled as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Script,
    Stylesheet,
    AssetData,
    AssetMarkup,
}

impl SourceKind {
    fn asset_for(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SourceKind::AssetData,
            _ => SourceKind::AssetMarkup,
        }
    }
}

/// A discovered input. Contents are read by the compiler that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Include/exclude glob pair, matched against root-relative paths
#[derive(Debug, Clone)]
pub struct FileSet {
    include: GlobSet,
    exclude: GlobSet,
    patterns: Vec<String>,
}

impl FileSet {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let mut inc = GlobSetBuilder::new();
        let mut exc = GlobSetBuilder::new();
        let mut patterns = Vec::new();

        for raw in include {
            match raw.strip_prefix('!') {
                Some(negated) => {
                    exc.add(build_glob(negated)?);
                }
                None => {
                    inc.add(build_glob(raw)?);
                    patterns.push(clean_pattern(raw).to_string());
                }
            }
        }
        for raw in exclude {
            exc.add(build_glob(raw.trim_start_matches('!'))?);
        }

        Ok(Self {
            include: build_set(inc)?,
            exclude: build_set(exc)?,
            patterns,
        })
    }

    /// Match a path relative to the project root
    pub fn is_match(&self, relative: &Path) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Match the include entries only
    pub fn is_included(&self, relative: &Path) -> bool {
        self.include.is_match(relative)
    }

    /// The include patterns, cleaned, for display
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn clean_pattern(pattern: &str) -> &str {
    pattern.trim_start_matches("./")
}

fn build_glob(pattern: &str) -> Result<globset::Glob> {
    let cleaned = clean_pattern(pattern);
    GlobBuilder::new(cleaned)
        .literal_separator(true)
        .build()
        .map_err(|e| BuildError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn build_set(builder: GlobSetBuilder) -> Result<GlobSet> {
    builder.build().map_err(|e| BuildError::InvalidGlob {
        pattern: "<set>".to_string(),
        message: e.to_string(),
    })
}

/// Compiled glob sets for every file kind
#[derive(Debug, Clone)]
pub struct Patterns {
    pub scripts: FileSet,
    pub styles: FileSet,
    /// Stylesheets that are watched but never compiled on their own
    pub partials: FileSet,
    pub assets: FileSet,
}

impl Patterns {
    /// Read tsconfig.json and compile the sets
    pub fn from_config(config: &Config, paths: &ProjectPaths) -> Result<Self> {
        let project = TsProject::load(&paths.root.join(&config.scripts.tsconfig))?;
        Self::with_project(config, paths, &project)
    }

    /// Compile the sets against an already loaded tsconfig. Defaults that
    /// name no directory are rooted at the configured source directory.
    pub fn with_project(config: &Config, paths: &ProjectPaths, project: &TsProject) -> Result<Self> {
        let src = paths.source_dir();

        let mut script_include = config.scripts.include.clone();
        if script_include.is_empty() {
            script_include = project.include_patterns();
        }
        if script_include.is_empty() {
            script_include = vec![format!("{}/**/*.ts", src)];
        }
        let mut script_exclude = config.scripts.exclude.clone();
        script_exclude.extend(project.exclude_patterns());

        let style_exclude = config.styles.resolved_exclude(&src);
        let mut partial_include = style_exclude.clone();
        if partial_include.is_empty() {
            // nothing is reserved; the set must still build
            partial_include.push("!**".to_string());
        }

        Ok(Self {
            scripts: FileSet::new(&script_include, &script_exclude)?,
            styles: FileSet::new(&config.styles.resolved_include(&src), &style_exclude)?,
            partials: FileSet::new(&partial_include, &[])?,
            assets: FileSet::new(&config.assets.resolved_include(&src), &config.assets.exclude)?,
        })
    }

    /// Classify a root-relative path. Scripts must carry a `.ts` extension
    /// whatever the include list says.
    pub fn classify(&self, relative: &Path) -> Option<SourceKind> {
        let is_ts = relative.extension().is_some_and(|e| e == "ts");
        if is_ts && self.scripts.is_match(relative) {
            Some(SourceKind::Script)
        } else if self.styles.is_match(relative) {
            Some(SourceKind::Stylesheet)
        } else if self.assets.is_match(relative) {
            Some(SourceKind::asset_for(relative))
        } else {
            None
        }
    }

    /// A stylesheet inside the reserved subtree
    pub fn is_partial(&self, relative: &Path) -> bool {
        self.partials.is_match(relative) && self.styles.is_included(relative)
    }
}

/// Every input of one build, grouped by producer
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub scripts: Vec<SourceFile>,
    pub styles: Vec<SourceFile>,
    pub assets: Vec<SourceFile>,
}

impl Sources {
    /// Walk the project root. The output tree, `node_modules` and hidden
    /// directories are never entered.
    pub fn discover(patterns: &Patterns, paths: &ProjectPaths) -> Result<Self> {
        let mut sources = Sources::default();

        let walker = WalkDir::new(&paths.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                let path = entry.path();
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !(paths.is_in_output(path) || name == "node_modules" || name.starts_with('.'))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = paths.relative_to_root(path);
            match patterns.classify(relative) {
                Some(SourceKind::Script) => {
                    sources.scripts.push(SourceFile::new(path, SourceKind::Script))
                }
                Some(SourceKind::Stylesheet) => {
                    sources.styles.push(SourceFile::new(path, SourceKind::Stylesheet))
                }
                Some(kind) => sources.assets.push(SourceFile::new(path, kind)),
                None => {}
            }
        }

        sources.scripts.sort_by(|a, b| a.path.cmp(&b.path));
        sources.styles.sort_by(|a, b| a.path.cmp(&b.path));
        sources.assets.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            scripts = sources.scripts.len(),
            styles = sources.styles.len(),
            assets = sources.assets.len(),
            "discovered sources"
        );

        Ok(sources)
    }

    pub fn len(&self) -> usize {
        self.scripts.len() + self.styles.len() + self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.scripts
            .iter()
            .chain(self.styles.iter())
            .chain(self.assets.iter())
    }

    /// Fail when two distinct sources resolve to one output path
    pub fn check_destinations(&self, paths: &ProjectPaths, extensions: &OutputExtensions) -> Result<()> {
        let mut by_destination: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        for source in self.iter() {
            let destination = paths.destination(&source.path, source.kind, extensions);
            by_destination
                .entry(destination)
                .or_default()
                .push(source.path.clone());
        }

        match by_destination.into_iter().find(|(_, sources)| sources.len() > 1) {
            Some((destination, sources)) => Err(BuildError::DestinationCollision {
                destination,
                sources,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn fixture() -> (tempfile::TempDir, ProjectPaths, Patterns) {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/app.ts");
        touch(root, "src/types/wx.d.ts");
        touch(root, "src/app.scss");
        touch(root, "src/pages/index/index.scss");
        touch(root, "src/styles/_vars.scss");
        touch(root, "src/app.json");
        touch(root, "src/pages/index/index.wxml");
        touch(root, "src/pages/index/notes.md");
        touch(root, "dist/app.json");
        touch(root, "node_modules/pkg/index.ts");

        let paths = ProjectPaths::resolve(root);
        let patterns = Patterns::from_config(&Config::default(), &paths).unwrap();
        (temp, paths, patterns)
    }

    fn names(files: &[SourceFile], paths: &ProjectPaths) -> Vec<String> {
        files
            .iter()
            .map(|f| paths.relative_to_root(&f.path).to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_discover_classifies_sources() {
        let (_temp, paths, patterns) = fixture();
        let sources = Sources::discover(&patterns, &paths).unwrap();

        assert_eq!(names(&sources.scripts, &paths), vec!["src/app.ts"]);
        assert_eq!(
            names(&sources.styles, &paths),
            vec!["src/app.scss", "src/pages/index/index.scss"]
        );
        assert_eq!(
            names(&sources.assets, &paths),
            vec!["src/app.json", "src/pages/index/index.wxml"]
        );
        assert_eq!(sources.assets[0].kind, SourceKind::AssetData);
        assert_eq!(sources.assets[1].kind, SourceKind::AssetMarkup);
    }

    #[test]
    fn test_partials_are_reserved() {
        let (_temp, _paths, patterns) = fixture();
        let partial = Path::new("src/styles/_vars.scss");
        assert!(patterns.is_partial(partial));
        assert_eq!(patterns.classify(partial), None);
        assert!(!patterns.is_partial(Path::new("src/app.scss")));
        assert!(!patterns.is_partial(Path::new("src/styles/theme.json")));
    }

    #[test]
    fn test_gulp_style_patterns() {
        let set = FileSet::new(
            &["./src/**/*.scss".to_string(), "!./src/styles/**".to_string()],
            &[],
        )
        .unwrap();
        assert!(set.is_match(Path::new("src/a.scss")));
        assert!(set.is_match(Path::new("src/a/b.scss")));
        assert!(!set.is_match(Path::new("src/styles/base.scss")));
        assert_eq!(set.patterns(), &["src/**/*.scss".to_string()]);
    }

    #[test]
    fn test_single_star_stays_in_directory() {
        let set = FileSet::new(&["src/*.json".to_string()], &[]).unwrap();
        assert!(set.is_match(Path::new("src/app.json")));
        assert!(!set.is_match(Path::new("src/pages/index.json")));
    }

    #[test]
    fn test_invalid_glob() {
        let err = FileSet::new(&["src/[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, BuildError::InvalidGlob { .. }));
    }

    #[test]
    fn test_tsconfig_include_drives_scripts() {
        let (temp, paths, _) = fixture();
        touch(temp.path(), "typings/global.ts");
        std::fs::write(
            temp.path().join("tsconfig.json"),
            r#"{ "include": ["typings/**/*.ts"] }"#,
        )
        .unwrap();

        let patterns = Patterns::from_config(&Config::default(), &paths).unwrap();
        let sources = Sources::discover(&patterns, &paths).unwrap();
        assert_eq!(names(&sources.scripts, &paths), vec!["typings/global.ts"]);
    }

    #[test]
    fn test_tsconfig_files_and_exclude_drive_scripts() {
        let (temp, paths, _) = fixture();
        touch(temp.path(), "src/vendor/lib.ts");
        touch(temp.path(), "src/pages/index/index.ts");
        touch(temp.path(), "src/pages/index/index.spec.ts");
        touch(temp.path(), "tools/gen.ts");
        std::fs::write(
            temp.path().join("tsconfig.json"),
            r#"{
                "files": ["tools/gen.ts"],
                "include": ["src"],
                "exclude": ["src/vendor", "**/*.spec.ts"],
            }"#,
        )
        .unwrap();

        let patterns = Patterns::from_config(&Config::default(), &paths).unwrap();
        let sources = Sources::discover(&patterns, &paths).unwrap();
        assert_eq!(
            names(&sources.scripts, &paths),
            vec!["src/app.ts", "src/pages/index/index.ts", "tools/gen.ts"]
        );
    }

    #[test]
    fn test_defaults_follow_configured_source_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "app/app.ts");
        touch(root, "app/app.scss");
        touch(root, "app/app.json");
        touch(root, "app/pages/index.wxml");
        touch(root, "app/styles/_vars.scss");
        touch(root, "src/stray.scss");

        let config: Config = toml::from_str("[paths]\nsrc = \"app\"\n").unwrap();
        let paths = ProjectPaths::from_config(root, &config.paths);
        let patterns = Patterns::from_config(&config, &paths).unwrap();
        let sources = Sources::discover(&patterns, &paths).unwrap();

        assert_eq!(names(&sources.scripts, &paths), vec!["app/app.ts"]);
        assert_eq!(names(&sources.styles, &paths), vec!["app/app.scss"]);
        assert_eq!(
            names(&sources.assets, &paths),
            vec!["app/app.json", "app/pages/index.wxml"]
        );
        assert!(patterns.is_partial(Path::new("app/styles/_vars.scss")));
    }

    #[test]
    fn test_destination_collision_rejected() {
        let paths = ProjectPaths::resolve(Path::new("/proj"));
        let sources = Sources {
            scripts: vec![],
            styles: vec![SourceFile::new("/proj/src/a.scss", SourceKind::Stylesheet)],
            assets: vec![SourceFile::new("/proj/src/a.wxss", SourceKind::AssetMarkup)],
        };

        let err = sources
            .check_destinations(&paths, &OutputExtensions::default())
            .unwrap_err();
        match err {
            BuildError::DestinationCollision {
                destination,
                sources,
            } => {
                assert_eq!(destination, PathBuf::from("/proj/dist/a.wxss"));
                assert_eq!(sources.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_distinct_destinations_pass() {
        let (_temp, paths, patterns) = fixture();
        let sources = Sources::discover(&patterns, &paths).unwrap();
        sources
            .check_destinations(&paths, &OutputExtensions::default())
            .unwrap();
        assert_eq!(sources.len(), 5);
    }
}
