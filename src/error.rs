//! Error types for wxbuild
//!
//! Uses `miette` for pretty error reporting with help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for wxbuild operations
#[derive(Error, Diagnostic, Debug)]
pub enum BuildError {
    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(wxbuild::config::not_found),
        help("Run `wxbuild init` to create a wxbuild.toml, or drop --config to use defaults")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse configuration {}", path.display())]
    #[diagnostic(code(wxbuild::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(wxbuild::config::invalid))]
    InvalidConfig { reason: String },

    #[error("Failed to read {}: {message}", path.display())]
    #[diagnostic(
        code(wxbuild::config::tsconfig),
        help("Only the `include` list of tsconfig.json is used")
    )]
    TsconfigParse { path: PathBuf, message: String },

    #[error("Invalid glob '{pattern}': {message}")]
    #[diagnostic(code(wxbuild::config::glob))]
    InvalidGlob { pattern: String, message: String },

    #[error("Failed to create directory {}", path.display())]
    #[diagnostic(code(wxbuild::fs::create_dir))]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}", path.display())]
    #[diagnostic(code(wxbuild::fs::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}", path.display())]
    #[diagnostic(code(wxbuild::fs::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stylesheet {} failed to render: {message}", path.display())]
    #[diagnostic(code(wxbuild::style::render))]
    StyleRender { path: PathBuf, message: String },

    #[error("Post-processing {} failed: {message}", path.display())]
    #[diagnostic(code(wxbuild::style::postprocess))]
    PostProcess { path: PathBuf, message: String },

    #[error("Command not found: {command}")]
    #[diagnostic(
        code(wxbuild::script::command_not_found),
        help("Install it with npm, or set `scripts.command` in wxbuild.toml")
    )]
    CommandNotFound { command: String },

    #[error("Script {} failed to compile (exit code {code})", path.display())]
    #[diagnostic(code(wxbuild::script::failed))]
    ScriptFailed {
        path: PathBuf,
        code: i32,
        #[help]
        stderr: Option<String>,
    },

    #[error("{} source files write to {}", sources.len(), destination.display())]
    #[diagnostic(
        code(wxbuild::build::collision),
        help("Rename one of the sources or narrow the include patterns")
    )]
    DestinationCollision {
        destination: PathBuf,
        sources: Vec<PathBuf>,
    },

    #[error("Build step '{step}' aborted: {message}")]
    #[diagnostic(code(wxbuild::build::step))]
    StepAborted { step: String, message: String },

    #[error("I/O error")]
    #[diagnostic(code(wxbuild::io))]
    Io(#[from] std::io::Error),

    #[error("Watch error")]
    #[diagnostic(code(wxbuild::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },
}

/// Result type alias for wxbuild operations
pub type Result<T> = std::result::Result<T, BuildError>;
