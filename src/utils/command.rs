// pgopstool/src/utils/command.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::errors::ToolError;

const STDERR_TAIL_LINES: usize = 20;

/// One element of an external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArg {
    /// `-v`, `--no-password`
    Flag(&'static str),
    /// `--host=<value>`
    Assign(&'static str, String),
    /// `--password=<value>`, masked when displayed
    Secret(&'static str, String),
    /// `-f <value>` as two argv entries
    Separate(&'static str, String),
    Positional(String),
}

impl ToolArg {
    fn render_into(&self, argv: &mut Vec<String>) {
        match self {
            ToolArg::Flag(flag) => argv.push(flag.to_string()),
            ToolArg::Assign(flag, value) | ToolArg::Secret(flag, value) => {
                argv.push(format!("{}={}", flag, value))
            }
            ToolArg::Separate(flag, value) => {
                argv.push(flag.to_string());
                argv.push(value.clone());
            }
            ToolArg::Positional(value) => argv.push(value.clone()),
        }
    }
}

impl fmt::Display for ToolArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolArg::Flag(flag) => write!(f, "{}", flag),
            ToolArg::Assign(flag, value) => write!(f, "{}={}", flag, value),
            ToolArg::Secret(flag, _) => write!(f, "{}=***", flag),
            ToolArg::Separate(flag, value) => write!(f, "{} {}", flag, value),
            ToolArg::Positional(value) => write!(f, "{}", value),
        }
    }
}

/// An ordered, typed argument list for an external tool, rendered to argv at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<ToolArg>,
    env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ToolArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn flag(self, flag: &'static str) -> Self {
        self.arg(ToolArg::Flag(flag))
    }

    pub fn assign(self, flag: &'static str, value: impl Into<String>) -> Self {
        self.arg(ToolArg::Assign(flag, value.into()))
    }

    pub fn secret(self, flag: &'static str, value: impl Into<String>) -> Self {
        self.arg(ToolArg::Secret(flag, value.into()))
    }

    pub fn separate(self, flag: &'static str, value: impl Into<String>) -> Self {
        self.arg(ToolArg::Separate(flag, value.into()))
    }

    pub fn positional(self, value: impl Into<String>) -> Self {
        self.arg(ToolArg::Positional(value.into()))
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Short program name for error messages (`pg_dump` rather than its full path).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn args(&self) -> &[ToolArg] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        for arg in &self.args {
            arg.render_into(&mut argv);
        }
        argv
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs a tool to completion and returns its standard output.
///
/// Any exit code other than zero is an error.
pub trait ToolRunner {
    fn run(&self, command: &ToolCommand) -> Result<Vec<u8>, ToolError>;
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn run(&self, command: &ToolCommand) -> Result<Vec<u8>, ToolError> {
        (**self).run(command)
    }
}

/// Spawns the tool as a child process and blocks until it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<Vec<u8>, ToolError> {
        let program = command.program_name();
        let output = Command::new(command.program())
            .args(command.argv())
            .envs(command.envs().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        match output.status.code() {
            Some(0) => {
                debug!(program = %program, stderr = %stderr.trim(), "tool finished");
                Ok(output.stdout)
            }
            Some(code) => Err(ToolError::NonZeroExit {
                program,
                code,
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            }),
            None => Err(ToolError::Terminated { program }),
        }
    }
}

fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}
