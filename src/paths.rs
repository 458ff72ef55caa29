//! Project directory layout and source → output path mirroring

use std::path::{Component, Path, PathBuf};

use crate::config::PathsConfig;
use crate::source::SourceKind;

/// Absolute project directories, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
}

impl ProjectPaths {
    /// Resolve the conventional `<root>/src` → `<root>/dist` layout
    pub fn resolve(root: &Path) -> Self {
        Self::from_config(root, &PathsConfig::default())
    }

    /// Resolve using configured directory names. `~` is expanded; absolute
    /// entries are used as-is.
    pub fn from_config(root: &Path, config: &PathsConfig) -> Self {
        let root = absolute(root);
        let source_root = normalize(&root.join(expand(&config.src)));
        let output_root = normalize(&root.join(expand(&config.dist)));

        Self {
            root,
            source_root,
            output_root,
        }
    }

    /// Path relative to the project root, for log lines
    pub fn relative_to_root<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// The source directory as written at the head of root-relative globs
    pub fn source_dir(&self) -> String {
        let relative = self.relative_to_root(&self.source_root);
        if relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            relative.to_string_lossy().replace('\\', "/")
        }
    }

    /// Relocate `source` from the source root onto the output root.
    /// Files outside the source root keep their path relative to the project root.
    pub fn mirror(&self, source: &Path) -> PathBuf {
        let relative = source
            .strip_prefix(&self.source_root)
            .or_else(|_| source.strip_prefix(&self.root))
            .unwrap_or(source);

        self.output_root.join(relative)
    }

    /// Output path for a source of the given kind
    pub fn destination(&self, source: &Path, kind: SourceKind, extensions: &OutputExtensions) -> PathBuf {
        let mirrored = self.mirror(source);
        match kind {
            SourceKind::Script => mirrored.with_extension(&extensions.script),
            SourceKind::Stylesheet => mirrored.with_extension(&extensions.stylesheet),
            SourceKind::AssetData | SourceKind::AssetMarkup => mirrored,
        }
    }

    pub fn is_in_output(&self, path: &Path) -> bool {
        path.starts_with(&self.output_root)
    }
}

/// Extensions written for compiled kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputExtensions {
    pub script: String,
    pub stylesheet: String,
}

impl Default for OutputExtensions {
    fn default() -> Self {
        Self {
            script: "js".to_string(),
            stylesheet: "wxss".to_string(),
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_default();
        normalize(&cwd.join(path))
    }
}

/// Lexically drop `.` and resolve `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> ProjectPaths {
        ProjectPaths::resolve(Path::new("/proj"))
    }

    #[test]
    fn test_resolve_layout() {
        let p = paths();
        assert_eq!(p.root, PathBuf::from("/proj"));
        assert_eq!(p.source_root, PathBuf::from("/proj/src"));
        assert_eq!(p.output_root, PathBuf::from("/proj/dist"));
    }

    #[test]
    fn test_resolve_normalizes_dots() {
        let p = ProjectPaths::resolve(Path::new("/proj/./app/../"));
        assert_eq!(p.root, PathBuf::from("/proj"));
    }

    #[test]
    fn test_stylesheet_destination() {
        let p = paths();
        let dest = p.destination(
            Path::new("/proj/src/pages/index/index.scss"),
            SourceKind::Stylesheet,
            &OutputExtensions::default(),
        );
        assert_eq!(dest, PathBuf::from("/proj/dist/pages/index/index.wxss"));
    }

    #[test]
    fn test_script_destination_strips_ts() {
        let p = paths();
        let dest = p.destination(
            Path::new("/proj/src/utils/date.util.ts"),
            SourceKind::Script,
            &OutputExtensions::default(),
        );
        assert_eq!(dest, PathBuf::from("/proj/dist/utils/date.util.js"));
    }

    #[test]
    fn test_asset_destination_unchanged_name() {
        let p = paths();
        let dest = p.destination(
            Path::new("/proj/src/app.json"),
            SourceKind::AssetData,
            &OutputExtensions::default(),
        );
        assert_eq!(dest, PathBuf::from("/proj/dist/app.json"));
    }

    #[test]
    fn test_mirror_outside_source_root() {
        let p = paths();
        assert_eq!(
            p.mirror(Path::new("/proj/typings/global.ts")),
            PathBuf::from("/proj/dist/typings/global.ts")
        );
    }

    #[test]
    fn test_source_dir() {
        assert_eq!(paths().source_dir(), "src");

        let config = PathsConfig {
            src: PathBuf::from("./app/"),
            dist: PathBuf::from("dist"),
        };
        let p = ProjectPaths::from_config(Path::new("/proj"), &config);
        assert_eq!(p.source_dir(), "app");

        let config = PathsConfig {
            src: PathBuf::from("."),
            dist: PathBuf::from("dist"),
        };
        let p = ProjectPaths::from_config(Path::new("/proj"), &config);
        assert_eq!(p.source_dir(), ".");
    }

    #[test]
    fn test_relative_to_root() {
        let p = paths();
        assert_eq!(
            p.relative_to_root(Path::new("/proj/src/app.scss")),
            Path::new("src/app.scss")
        );
    }
}
