//! Typed-script compilation
//!
//! Each `.ts` source is handed to a [`Transpile`] implementation and the
//! result is written to the mirrored `.js` path. The default transpiler runs
//! an external command (esbuild unless configured otherwise) and takes its
//! stdout as the compiled script. Compiler diagnostics are passed through to
//! the console untouched.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use once_cell::sync::OnceCell;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::graph::{ProducerReport, Step};
use crate::paths::{OutputExtensions, ProjectPaths};
use crate::report::Reporter;
use crate::source::{SourceFile, SourceKind};
use crate::tsconfig::TsProject;
use crate::writer;

/// Placeholder replaced by the source path in a command template
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Turns one typed-script file into plain script
pub trait Transpile: Send + Sync {
    fn transpile<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, Result<String>>;
}

/// Runs an external compiler per file
pub struct CommandTranspiler {
    args: Vec<String>,
    root: PathBuf,
    reporter: Reporter,
    program: OnceCell<PathBuf>,
}

impl CommandTranspiler {
    /// `template` is a command line with a `{file}` placeholder. `~` and
    /// `$VARS` are expanded before it is split.
    pub fn new(template: &str, root: &Path, reporter: Reporter) -> Result<Self> {
        let expanded = shellexpand::full(template).map_err(|e| BuildError::InvalidConfig {
            reason: format!("scripts.command: {}", e),
        })?;

        let args = split_command(&expanded);
        if args.is_empty() {
            return Err(BuildError::InvalidConfig {
                reason: "scripts.command is empty".to_string(),
            });
        }

        Ok(Self {
            args,
            root: root.to_path_buf(),
            reporter,
            program: OnceCell::new(),
        })
    }

    /// Locate the program: project-local `node_modules/.bin` first, then `PATH`.
    /// Only runs once, and only when there is something to compile.
    fn program(&self) -> Result<&PathBuf> {
        self.program.get_or_try_init(|| {
            let name = &self.args[0];
            let candidate = Path::new(name);
            if candidate.components().count() > 1 {
                let path = self.root.join(candidate);
                return if path.exists() {
                    Ok(path)
                } else {
                    Err(BuildError::CommandNotFound {
                        command: name.clone(),
                    })
                };
            }

            let local = self.root.join("node_modules").join(".bin").join(name);
            if local.exists() {
                return Ok(local);
            }

            which::which(name).map_err(|_| BuildError::CommandNotFound {
                command: name.clone(),
            })
        })
    }

    async fn run(&self, source: &Path) -> Result<String> {
        let program = self.program()?;
        let file = source.to_string_lossy();
        let args: Vec<String> = self.args[1..]
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();

        tracing::debug!(program = %program.display(), ?args, "running transpiler");

        let output = Command::new(program)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            self.reporter.passthrough(&stderr);
        }

        if !output.status.success() {
            return Err(BuildError::ScriptFailed {
                path: source.to_path_buf(),
                code: output.status.code().unwrap_or(1),
                stderr: Some(stderr.into_owned()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Transpile for CommandTranspiler {
    fn transpile<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.run(source))
    }
}

/// Split a command line into arguments (handles quotes)
pub fn split_command(cmd: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in cmd.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

pub struct ScriptCompiler {
    paths: ProjectPaths,
    extensions: OutputExtensions,
    transpiler: Arc<dyn Transpile>,
    reporter: Reporter,
    limit: Arc<Semaphore>,
}

impl ScriptCompiler {
    /// Compiler settings come from the project's tsconfig, loaded once by the caller
    pub fn new(config: &Config, paths: &ProjectPaths, project: &TsProject, reporter: Reporter) -> Result<Self> {
        let template = project.compiler_options.render_command(&config.scripts.command);
        let transpiler = CommandTranspiler::new(&template, &paths.root, reporter.clone())?;
        Ok(Self::with_transpiler(config, paths, reporter, Arc::new(transpiler)))
    }

    pub fn with_transpiler(
        config: &Config,
        paths: &ProjectPaths,
        reporter: Reporter,
        transpiler: Arc<dyn Transpile>,
    ) -> Self {
        Self {
            paths: paths.clone(),
            extensions: OutputExtensions {
                script: config.scripts.extension.clone(),
                stylesheet: config.styles.extension.clone(),
            },
            transpiler,
            reporter,
            limit: Arc::new(Semaphore::new(config.settings.parallelism())),
        }
    }

    pub fn destination(&self, source: &Path) -> PathBuf {
        self.paths
            .destination(source, SourceKind::Script, &self.extensions)
    }

    /// Compile the whole batch; failing files do not stop the others
    pub async fn compile_all(&self, sources: &[SourceFile]) -> ProducerReport {
        let results = join_all(sources.iter().map(|source| async move {
            let _permit = self.limit.acquire().await.ok();
            self.compile(source).await
        }))
        .await;

        ProducerReport::from_results(Step::Scripts, &results)
    }

    pub async fn compile(&self, source: &SourceFile) -> bool {
        match self.try_compile(&source.path).await {
            Ok(_) => true,
            Err(e) => {
                self.reporter.failed(&source.path, &e);
                false
            }
        }
    }

    async fn try_compile(&self, source: &Path) -> Result<PathBuf> {
        let destination = self.destination(source);

        self.reporter.compiling(source);
        let script = self.transpiler.transpile(source).await?;
        writer::write(&destination, script).await?;
        self.reporter.written(&destination);

        Ok(destination)
    }
}
