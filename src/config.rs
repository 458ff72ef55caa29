//! Configuration parsing for wxbuild.toml
//!
//! The file is optional: every field has a default matching the
//! conventional mini-program layout (`src/` compiled into `dist/`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["wxbuild.toml", "Wxbuild.toml"];

/// Decimal places beyond this no longer survive an `f64`
const MAX_PRECISION: u32 = 15;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub styles: StylesConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub settings: Settings,
}

/// Source and output directory names, relative to the project root
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_src")]
    pub src: PathBuf,

    #[serde(default = "default_dist")]
    pub dist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            dist: default_dist(),
        }
    }
}

/// Typed-script compilation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Include globs. Empty means tsconfig.json's `files` and `include`.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default = "default_script_exclude")]
    pub exclude: Vec<String>,

    /// Transpiler command. `{file}` is replaced by the source path,
    /// `{target}` and `{format}` by values derived from tsconfig.json.
    #[serde(default = "default_script_command")]
    pub command: String,

    #[serde(default = "default_tsconfig")]
    pub tsconfig: PathBuf,

    /// Output extension, without the dot
    #[serde(default = "default_script_extension")]
    pub extension: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_script_exclude(),
            command: default_script_command(),
            tsconfig: default_tsconfig(),
            extension: default_script_extension(),
        }
    }
}

/// Stylesheet compilation and post-processing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StylesConfig {
    /// Unset means `<src>/**/*.scss`
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// Partials directory; watched, but never compiled on its own.
    /// Unset means `<src>/styles/**`.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Extra import search paths. Unset means `<src>/styles`.
    #[serde(default)]
    pub load_paths: Option<Vec<PathBuf>>,

    #[serde(default = "default_style_extension")]
    pub extension: String,

    /// rpx per px. 0 disables the conversion.
    #[serde(default = "default_px_ratio")]
    pub px_to_rpx: f64,

    /// Decimal places kept after px conversion
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Browserslist queries for vendor prefixing. Empty disables prefixing.
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            load_paths: None,
            extension: default_style_extension(),
            px_to_rpx: default_px_ratio(),
            precision: default_precision(),
            browsers: default_browsers(),
        }
    }
}

impl StylesConfig {
    /// Include globs; `src` is the source directory relative to the root
    pub fn resolved_include(&self, src: &str) -> Vec<String> {
        self.include
            .clone()
            .unwrap_or_else(|| vec![format!("{}/**/*.scss", src)])
    }

    pub fn resolved_exclude(&self, src: &str) -> Vec<String> {
        self.exclude
            .clone()
            .unwrap_or_else(|| vec![format!("{}/styles/**", src)])
    }

    pub fn resolved_load_paths(&self, src: &str) -> Vec<PathBuf> {
        self.load_paths
            .clone()
            .unwrap_or_else(|| vec![Path::new(src).join("styles")])
    }
}

/// Files copied verbatim
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssetsConfig {
    /// Unset means `<src>/**/*.json` and `<src>/**/*.wxml`
    #[serde(default)]
    pub include: Option<Vec<String>>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl AssetsConfig {
    pub fn resolved_include(&self, src: &str) -> Vec<String> {
        self.include.clone().unwrap_or_else(|| {
            vec![format!("{}/**/*.json", src), format!("{}/**/*.wxml", src)]
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Watch debounce delay in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
        }
    }
}

/// Global settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Max files compiled at once per producer (0 = number of CPUs)
    #[serde(default)]
    pub parallelism: usize,
}

impl Settings {
    /// Effective parallelism, never zero
    pub fn parallelism(&self) -> usize {
        if self.parallelism == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.parallelism
        }
    }
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

fn default_script_exclude() -> Vec<String> {
    vec![
        "node_modules/**".to_string(),
        "_scripts/**".to_string(),
        "**/*.d.ts".to_string(),
    ]
}

fn default_script_command() -> String {
    "esbuild {file} --format={format} --target={target} --log-level=warning".to_string()
}

fn default_tsconfig() -> PathBuf {
    PathBuf::from("tsconfig.json")
}

fn default_script_extension() -> String {
    "js".to_string()
}

fn default_style_extension() -> String {
    "wxss".to_string()
}

fn default_px_ratio() -> f64 {
    2.0
}

fn default_precision() -> u32 {
    6
}

fn default_browsers() -> Vec<String> {
    vec!["last 5 versions".to_string()]
}

fn default_debounce() -> u64 {
    50
}

impl Config {
    /// Load configuration from the specified path, or search for it.
    ///
    /// Returns the config and the directory it was found in. When no file
    /// exists anywhere up the tree the defaults are used and no directory is
    /// returned.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    Some(p.to_path_buf())
                } else {
                    return Err(BuildError::ConfigNotFound {
                        path: p.to_path_buf(),
                    });
                }
            }
            None => Self::find_config()?,
        };

        let Some(config_path) = config_path else {
            return Ok((Self::default(), None));
        };

        let config = Self::from_file(&config_path)?;
        let dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .filter(|d| !d.as_os_str().is_empty());

        Ok((config, dir))
    }

    /// Parse and validate a single file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| BuildError::ConfigParse {
            source: e,
            path: path.to_path_buf(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Search for config file starting from current directory
    fn find_config() -> Result<Option<PathBuf>> {
        let mut current = std::env::current_dir()?;

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                if candidate.exists() {
                    return Ok(Some(candidate));
                }
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.paths.src == self.paths.dist {
            return Err(BuildError::InvalidConfig {
                reason: "paths.src and paths.dist must differ".to_string(),
            });
        }

        if self.styles.include.as_ref().is_some_and(Vec::is_empty) {
            return Err(BuildError::InvalidConfig {
                reason: "styles.include must list at least one pattern".to_string(),
            });
        }

        if self.assets.include.as_ref().is_some_and(Vec::is_empty) {
            return Err(BuildError::InvalidConfig {
                reason: "assets.include must list at least one pattern".to_string(),
            });
        }

        if !self.styles.px_to_rpx.is_finite() || self.styles.px_to_rpx < 0.0 {
            return Err(BuildError::InvalidConfig {
                reason: format!("styles.px_to_rpx must be >= 0, got {}", self.styles.px_to_rpx),
            });
        }

        if self.styles.precision > MAX_PRECISION {
            return Err(BuildError::InvalidConfig {
                reason: format!(
                    "styles.precision must be at most {}, got {}",
                    MAX_PRECISION, self.styles.precision
                ),
            });
        }

        if !self.scripts.command.contains("{file}") {
            return Err(BuildError::InvalidConfig {
                reason: "scripts.command must contain a {file} placeholder".to_string(),
            });
        }

        Ok(())
    }
}
