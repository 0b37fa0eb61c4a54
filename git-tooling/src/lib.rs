//! VCS collaborator for the logbook lifecycle.
//!
//! The lifecycle never runs VCS logic itself; it talks to a [`Vcs`]
//! implementation. [`GitCli`] shells out to the `git` binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Errors from VCS operations.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The `git` binary could not be located.
    #[error("git executable not found: {0}")]
    NotFound(String),

    /// The process could not be spawned.
    #[error("failed to run `git {command}` in {cwd}: {source}")]
    Spawn {
        command: String,
        cwd: PathBuf,
        source: std::io::Error,
    },

    /// The process ran but exited unsuccessfully.
    #[error("`git {command}` failed in {cwd} ({status}): {stderr}")]
    CommandFailed {
        command: String,
        cwd: PathBuf,
        status: String,
        stderr: String,
    },

    /// Output was not what the caller expected.
    #[error("unexpected output from `git {command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },
}

/// Operations the lifecycle needs from version control.
pub trait Vcs {
    /// Whether `path` is inside a work tree.
    fn is_repository(&self, path: &Path) -> bool;

    /// Human-readable status text.
    fn status(&self, path: &Path) -> Result<String, VcsError>;

    /// Staged plus unstaged diff against HEAD.
    fn combined_diff(&self, path: &Path) -> Result<String, VcsError>;

    /// Stage every change beneath `path`.
    fn stage_all(&self, path: &Path) -> Result<(), VcsError>;

    /// Stage a single file, relative to `path`.
    fn stage_file(&self, path: &Path, name: &Path) -> Result<(), VcsError>;

    /// Commit what is staged and return the new commit id.
    fn commit(&self, path: &Path, message: &str) -> Result<String, VcsError>;
}

/// [`Vcs`] backed by the `git` command line.
#[derive(Clone, Debug)]
pub struct GitCli {
    program: PathBuf,
    excluded: Vec<String>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            excluded: Vec::new(),
        }
    }
}

impl GitCli {
    /// Use `git` from `PATH`, resolved now so a missing binary fails early.
    pub fn locate() -> Result<Self, VcsError> {
        let program = which::which("git").map_err(|e| VcsError::NotFound(e.to_string()))?;
        Ok(Self {
            program,
            excluded: Vec::new(),
        })
    }

    /// Never stage these names in [`Vcs::stage_all`].
    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    fn output<I, S>(&self, cwd: &Path, args: I) -> Result<Output, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let command = render_args(&args);
        tracing::debug!(cwd = %cwd.display(), %command, "running git");

        Command::new(&self.program)
            .args(&args)
            .current_dir(cwd)
            .output()
            .map_err(|source| VcsError::Spawn {
                command,
                cwd: cwd.to_path_buf(),
                source,
            })
    }

    fn run<I, S>(&self, cwd: &Path, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = self.output(cwd, &args)?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: render_args(&args),
                cwd: cwd.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn has_head(&self, cwd: &Path) -> bool {
        self.output(cwd, ["rev-parse", "--verify", "--quiet", "HEAD"])
            .is_ok_and(|o| o.status.success())
    }
}

fn render_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Vcs for GitCli {
    fn is_repository(&self, path: &Path) -> bool {
        self.run(path, ["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.trim() == "true")
    }

    fn status(&self, path: &Path) -> Result<String, VcsError> {
        self.run(path, ["status", "--short", "--branch", "--untracked-files=all"])
    }

    fn combined_diff(&self, path: &Path) -> Result<String, VcsError> {
        if self.has_head(path) {
            return self.run(path, ["diff", "HEAD", "--no-color", "--", "."]);
        }
        // No commits yet: fall back to index and work tree separately.
        let mut diff = self.run(path, ["diff", "--cached", "--no-color", "--", "."])?;
        diff.push_str(&self.run(path, ["diff", "--no-color", "--", "."])?);
        Ok(diff)
    }

    fn stage_all(&self, path: &Path) -> Result<(), VcsError> {
        let mut args = vec!["add".to_string(), "-A".to_string(), "--".to_string(), ".".to_string()];
        args.extend(self.excluded.iter().map(|name| format!(":(exclude){name}")));
        self.run(path, &args)?;
        Ok(())
    }

    fn stage_file(&self, path: &Path, name: &Path) -> Result<(), VcsError> {
        self.run(path, [OsStr::new("add"), OsStr::new("--"), name.as_os_str()])?;
        Ok(())
    }

    fn commit(&self, path: &Path, message: &str) -> Result<String, VcsError> {
        self.run(path, ["commit", "-m", message])?;
        let head = self.run(path, ["rev-parse", "HEAD"])?;
        let commit_id = head.trim().to_string();
        if commit_id.is_empty() {
            return Err(VcsError::UnexpectedOutput {
                command: "rev-parse HEAD".into(),
                detail: "empty commit id".into(),
            });
        }
        tracing::info!(cwd = %path.display(), %commit_id, "created commit");
        Ok(commit_id)
    }
}
