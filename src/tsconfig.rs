//! Project-wide TypeScript settings from tsconfig.json
//!
//! Read once per build. Only the parts that decide which files are compiled
//! and how are kept: `files`, `include`, `exclude` and
//! `compilerOptions.{target,module}`. Everything else is left to the
//! transpiler. The file may carry comments and trailing commas.

use std::path::Path;

use serde::Deserialize;

use crate::error::{BuildError, Result};

/// Replaced by the lowercased `compilerOptions.target`
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Replaced by the output module format (`cjs` or `esm`)
pub const FORMAT_PLACEHOLDER: &str = "{format}";

const DEFAULT_TARGET: &str = "es2017";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsProject {
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub compiler_options: CompilerOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerOptions {
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub module: Option<String>,
}

impl TsProject {
    /// Parse `path`. A missing file is an empty project, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        json5::from_str(&content).map_err(|e| BuildError::TsconfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Include globs: every `files` entry literally, then `include`.
    /// A bare directory in `include` means everything below it.
    pub fn include_patterns(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|file| globset::escape(file.trim_start_matches("./")))
            .chain(self.include.iter().map(|p| expand_directory(p, "**/*")))
            .collect()
    }

    /// Exclude globs. A bare directory excludes its whole subtree.
    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude
            .iter()
            .map(|p| expand_directory(p, "**"))
            .collect()
    }
}

impl CompilerOptions {
    pub fn target(&self) -> String {
        self.target
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_TARGET.to_string())
    }

    /// The module system as a bundler format. ES module kinds map to `esm`;
    /// CommonJS, Node's hybrid modes and an unset value map to `cjs`.
    pub fn format(&self) -> &'static str {
        match self.module.as_deref().map(str::to_ascii_lowercase) {
            Some(module) if module.starts_with("es") => "esm",
            _ => "cjs",
        }
    }

    /// Fill the `{target}` and `{format}` placeholders of a command template
    pub fn render_command(&self, template: &str) -> String {
        template
            .replace(TARGET_PLACEHOLDER, &self.target())
            .replace(FORMAT_PLACEHOLDER, self.format())
    }
}

fn expand_directory(pattern: &str, below: &str) -> String {
    let trimmed = pattern.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return below.to_string();
    }

    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if last.contains('*') || last.contains('.') {
        trimmed.to_string()
    } else {
        format!("{}/{}", trimmed, below)
    }
}
