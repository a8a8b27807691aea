//! Typed invocation of the external collaborators. A command is a value object
//! (program, argument vector, working dir, optional redirections) executed
//! through `std::process::Command`; paths are never interpolated into shell
//! strings.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    stdin_from: Option<PathBuf>,
    stdout_to: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            cwd: None,
            stdin_from: None,
            stdout_to: None,
        }
    }
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }
    /// Convenience for path-valued arguments.
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.arg(path)
    }
    pub fn cwd<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.into());
        self
    }
    pub fn stdin_from<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stdin_from = Some(path.into());
        self
    }
    pub fn stdout_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stdout_to = Some(path.into());
        self
    }
    /// Human-readable rendering for logs and failure reports.
    pub fn render(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for arg in self.args.iter() {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    fn build(&self) -> Result<std::process::Command> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        match &self.stdin_from {
            Some(path) => {
                cmd.stdin(File::open(path)?);
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        cmd.stderr(Stdio::piped());
        Ok(cmd)
    }

    /// Run to completion. Non-zero exit is a `ToolFailure` carrying the
    /// rendered command line and the captured stderr.
    pub fn run(&self) -> Result<()> {
        let mut cmd = self.build()?;
        match &self.stdout_to {
            Some(path) => {
                cmd.stdout(File::create(path)?);
            }
            None => {
                cmd.stdout(Stdio::null());
            }
        }
        debug!("EXEC\t{}", self.render());
        let child = cmd.spawn().map_err(|e| {
            PipelineError::Config(format!("failed to launch {}: {}", self.render(), e))
        })?;
        let output = child.wait_with_output()?;
        self.check(&output)?;
        Ok(())
    }

    /// Run to completion and return the captured stdout. Used for the trainer
    /// and evaluator whose reports are parsed, not redirected.
    pub fn run_capture(&self) -> Result<String> {
        let mut cmd = self.build()?;
        cmd.stdout(Stdio::piped());
        debug!("EXEC\t{}", self.render());
        let child = cmd.spawn().map_err(|e| {
            PipelineError::Config(format!("failed to launch {}: {}", self.render(), e))
        })?;
        let output = child.wait_with_output()?;
        self.check(&output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn check(&self, output: &std::process::Output) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Err(PipelineError::ToolFailure {
            command: self.render(),
            status: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

/// Locate a tool on PATH, or validate an explicit override.
pub fn locate(tool: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) => Err(PipelineError::Config(format!(
            "{} was given as {} but that path does not exist",
            tool,
            path.display()
        ))),
        None => which::which(tool).map_err(|_| {
            PipelineError::Config(format!(
                "{} not found on PATH; install it or pass an explicit path",
                tool
            ))
        }),
    }
}

/// Explicit tool-path overrides, typically from the pipeline profile.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub predictor: Option<PathBuf>,
    pub trainer: Option<PathBuf>,
    pub optimizer: Option<PathBuf>,
    pub merger: Option<PathBuf>,
    pub resolver: Option<PathBuf>,
    pub similarity: Option<PathBuf>,
    pub converter: Option<PathBuf>,
}

/// All external collaborators, discovered eagerly at setup so a missing
/// prerequisite fails the run before any stage starts.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Gene prediction engine (hints file + species config -> gene models).
    pub predictor: PathBuf,
    /// Supervised parameter estimator, also used in validation-only mode.
    pub trainer: PathBuf,
    /// Hyperparameter search driver.
    pub optimizer: PathBuf,
    /// Structural merge of two gene sets with per-set priorities.
    pub merger: PathBuf,
    /// Boundary resolution over chunk-overlapping partial calls.
    pub resolver: PathBuf,
    /// All-against-all protein similarity search.
    pub similarity: PathBuf,
    /// Format converter for the final gene set.
    pub converter: PathBuf,
}

impl Toolchain {
    pub fn discover(overrides: &ToolOverrides) -> Result<Self> {
        let mut missing = vec![];
        let mut find = |name: &str, explicit: &Option<PathBuf>| match locate(
            name,
            explicit.as_deref(),
        ) {
            Ok(path) => path,
            Err(why) => {
                missing.push(why.to_string());
                PathBuf::new()
            }
        };
        let toolchain = Toolchain {
            predictor: find("augustus", &overrides.predictor),
            trainer: find("etraining", &overrides.trainer),
            optimizer: find("optimize_augustus.pl", &overrides.optimizer),
            merger: find("joingenes", &overrides.merger),
            resolver: find("join_aug_pred.pl", &overrides.resolver),
            similarity: find("diamond", &overrides.similarity),
            converter: find("gtf2gff.pl", &overrides.converter),
        };
        if missing.is_empty() {
            Ok(toolchain)
        } else {
            Err(PipelineError::Config(missing.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn run_captures_stdout() {
        let cmd = ExternalCommand::new("sh").args(["-c", "echo hello"]);
        assert_eq!(cmd.run_capture().unwrap().trim(), "hello");
    }

    #[test]
    fn failure_carries_command_and_stderr() {
        let cmd = ExternalCommand::new("sh").args(["-c", "echo oops >&2; exit 3"]);
        match cmd.run() {
            Err(PipelineError::ToolFailure {
                command,
                status,
                stderr,
            }) => {
                assert!(command.starts_with("sh"));
                assert_eq!(status, 3);
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn stdout_redirection_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        ExternalCommand::new("sh")
            .args(["-c", "echo redirected"])
            .stdout_to(&out)
            .run()
            .unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.trim(), "redirected");
    }

    #[test]
    fn stdin_redirection_feeds_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "fed").unwrap();
        let got = ExternalCommand::new("cat")
            .stdin_from(&input)
            .run_capture()
            .unwrap();
        assert_eq!(got.trim(), "fed");
    }

    #[test]
    fn locate_rejects_bogus_override() {
        let err = locate("sometool", Some(Path::new("/no/such/file"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
