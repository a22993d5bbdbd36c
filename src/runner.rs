//! External tool invocation.
//!
//! Every step reaches conda, pip, Jupyter, MyST, and pytest through the
//! `ToolRunner` trait. The system runner inherits stderr so the user sees the
//! tool's own diagnostics; tests substitute a recording runner.
use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Capture stdout instead of streaming it to the terminal.
    pub capture_stdout: bool,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }

    pub fn captured(mut self) -> Self {
        self.capture_stdout = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub elapsed_ms: u128,
}

impl RunOutcome {
    pub fn status_string(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome>;
}

/// Runs tools as child processes of this one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
        let program = which::which(&invocation.program)
            .with_context(|| format!("{} not found on PATH", invocation.program))?;
        tracing::debug!(command = %invocation.command_line(), cwd = %invocation.cwd.display(), "spawn");

        let start = Instant::now();
        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        let (exit_status, stdout) = if invocation.capture_stdout {
            let output = cmd
                .stdout(Stdio::piped())
                .output()
                .with_context(|| format!("run {}", invocation.command_line()))?;
            (
                output.status,
                String::from_utf8_lossy(&output.stdout).to_string(),
            )
        } else {
            let status = cmd
                .stdout(Stdio::inherit())
                .status()
                .with_context(|| format!("run {}", invocation.command_line()))?;
            (status, String::new())
        };
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            elapsed_ms,
            program = %invocation.program,
            exit_code = exit_status.code(),
            "tool invoke complete"
        );

        Ok(RunOutcome {
            exit_code: exit_status.code(),
            success: exit_status.success(),
            stdout,
            elapsed_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Conda,
    Pip,
    Jupyter,
    Myst,
    Pytest,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Conda => "conda",
            Tool::Pip => "pip",
            Tool::Jupyter => "jupyter",
            Tool::Myst => "myst",
            Tool::Pytest => "pytest",
        }
    }

    /// Tools that must run inside the provisioned environment.
    fn runs_in_env(&self) -> bool {
        !matches!(self, Tool::Conda)
    }
}

/// Builds invocations from the configured command templates.
#[derive(Debug, Clone)]
pub struct ToolSet<'a> {
    config: &'a PipelineConfig,
    cwd: &'a Path,
}

impl<'a> ToolSet<'a> {
    pub fn new(config: &'a PipelineConfig, cwd: &'a Path) -> Self {
        Self { config, cwd }
    }

    fn template(&self, tool: Tool) -> &str {
        let tools = &self.config.tools;
        match tool {
            Tool::Conda => &tools.conda,
            Tool::Pip => &tools.pip,
            Tool::Jupyter => &tools.jupyter,
            Tool::Myst => &tools.myst,
            Tool::Pytest => &tools.pytest,
        }
    }

    pub fn command<I, S>(&self, tool: Tool, args: I) -> Result<Invocation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = Vec::new();
        if tool.runs_in_env() && self.config.tools.run_in_env {
            words.extend(split_template(self.template(Tool::Conda), Tool::Conda)?);
            words.extend([
                "run".to_string(),
                "--no-capture-output".to_string(),
                "-n".to_string(),
                self.config.env_name.clone(),
            ]);
        }
        words.extend(split_template(self.template(tool), tool)?);
        words.extend(args.into_iter().map(Into::into));
        let program = words.remove(0);
        Ok(Invocation {
            program,
            args: words,
            cwd: self.cwd.to_path_buf(),
            capture_stdout: false,
        })
    }
}

fn split_template(template: &str, tool: Tool) -> Result<Vec<String>> {
    let words = shell_words::split(template)
        .with_context(|| format!("parse {} command: {template}", tool.as_str()))?;
    if words.is_empty() {
        return Err(anyhow!("{} command is empty", tool.as_str()));
    }
    Ok(words)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{Invocation, RunOutcome, ToolRunner};
    use anyhow::Result;
    use std::cell::RefCell;

    type Handler = Box<dyn Fn(&Invocation) -> Result<RunOutcome>>;

    /// Records invocations and answers them with a scripted handler.
    pub struct FakeRunner {
        handler: Handler,
        calls: RefCell<Vec<Invocation>>,
    }

    impl FakeRunner {
        pub fn new(handler: impl Fn(&Invocation) -> Result<RunOutcome> + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(|_| Ok(ok("")))
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        pub fn command_lines(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(Invocation::command_line)
                .collect()
        }
    }

    impl ToolRunner for FakeRunner {
        fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
            self.calls.borrow_mut().push(invocation.clone());
            (self.handler)(invocation)
        }
    }

    pub fn ok(stdout: &str) -> RunOutcome {
        RunOutcome {
            exit_code: Some(0),
            success: true,
            stdout: stdout.to_string(),
            elapsed_ms: 0,
        }
    }

    pub fn failed(code: i32) -> RunOutcome {
        RunOutcome {
            exit_code: Some(code),
            success: false,
            stdout: String::new(),
            elapsed_ms: 0,
        }
    }
}
