//! External Tool Execution
//!
//! Every heavy computation in this system lives in an external program
//! (hdrgen, the Radiance suite, gphoto2). This crate is the single place
//! those programs are spawned:
//! - Single invocations with stdout discarded, captured, or written to a file
//! - Stage chains where one tool's stdout feeds the next tool's stdin

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Tool invocation error types
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("I/O error around {tool}: {source}")]
    Io {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} produced non-UTF-8 output")]
    NonUtf8 { tool: String },
}

/// A single external program invocation
#[derive(Debug, Clone)]
pub struct Tool {
    program: String,
    args: Vec<String>,
}

impl Tool {
    /// Create a new invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full command line for logging
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn check_status(&self, status: ExitStatus, stderr: &[u8]) -> Result<(), ToolError> {
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                tool: self.program.clone(),
                status,
                stderr: String::from_utf8_lossy(stderr).trim().to_string(),
            })
        }
    }

    /// Run to completion, discarding stdout
    pub async fn run(&self) -> Result<(), ToolError> {
        debug!("running {}", self.command_line());
        let output = self
            .command()
            .stdout(Stdio::null())
            .output()
            .await
            .map_err(|e| ToolError::Launch {
                tool: self.program.clone(),
                source: e,
            })?;
        self.check_status(output.status, &output.stderr)
    }

    /// Run to completion, capturing stdout
    pub async fn output(&self) -> Result<Vec<u8>, ToolError> {
        debug!("running {}", self.command_line());
        let output = self
            .command()
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| ToolError::Launch {
                tool: self.program.clone(),
                source: e,
            })?;
        self.check_status(output.status, &output.stderr)?;
        Ok(output.stdout)
    }

    /// Run to completion, capturing stdout as UTF-8 text
    pub async fn output_text(&self) -> Result<String, ToolError> {
        let bytes = self.output().await?;
        String::from_utf8(bytes).map_err(|_| ToolError::NonUtf8 {
            tool: self.program.clone(),
        })
    }

    /// Run with `input` fed to stdin, capturing stdout
    pub async fn run_with_input(&self, input: Vec<u8>) -> Result<Vec<u8>, ToolError> {
        debug!("running {} (stdin: {} bytes)", self.command_line(), input.len());
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Launch {
                tool: self.program.clone(),
                source: e,
            })?;

        // Feed stdin from a separate task so a filling stdout pipe
        // cannot deadlock against the write.
        let mut stdin = child.stdin.take().ok_or_else(|| ToolError::Io {
            tool: self.program.clone(),
            source: std::io::Error::other("stdin not captured"),
        })?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ToolError::Io {
                tool: self.program.clone(),
                source: e,
            })?;

        match writer.await {
            Ok(Ok(())) => {}
            // A stage that stops reading early (broken pipe) is only a
            // problem if it also exited non-zero, checked below.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(ToolError::Io {
                    tool: self.program.clone(),
                    source: e,
                })
            }
            Err(e) => {
                return Err(ToolError::Io {
                    tool: self.program.clone(),
                    source: std::io::Error::other(e),
                })
            }
        }

        self.check_status(output.status, &output.stderr)?;
        Ok(output.stdout)
    }

    /// Run with `input` fed to stdin, discarding stdout
    pub async fn run_consuming(&self, input: Vec<u8>) -> Result<(), ToolError> {
        self.run_with_input(input).await.map(|_| ())
    }

    /// Run to completion, writing captured stdout to `path`
    pub async fn output_to_file(&self, path: &Path) -> Result<(), ToolError> {
        let bytes = self.output().await?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| ToolError::Io {
                tool: self.program.clone(),
                source: e,
            })
    }

    /// Start a stage chain with this tool
    pub fn pipe(self, next: Tool) -> Pipeline {
        Pipeline {
            stages: vec![self, next],
        }
    }
}

/// An ordered chain of tools where each stage's stdout feeds the next
/// stage's stdin. Output is buffered between stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Tool>,
}

impl Pipeline {
    /// Create a chain starting with `first`
    pub fn new(first: Tool) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Append a stage
    pub fn pipe(mut self, next: Tool) -> Self {
        self.stages.push(next);
        self
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the chain has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    async fn run_until_last(&self) -> Result<Vec<u8>, ToolError> {
        let (first, rest) = match self.stages.split_first() {
            Some(split) => split,
            None => return Ok(Vec::new()),
        };
        let mut bytes = first.output().await?;
        for stage in rest {
            bytes = stage.run_with_input(bytes).await?;
        }
        Ok(bytes)
    }

    /// Run all stages, capturing the final stage's stdout
    pub async fn output(&self) -> Result<Vec<u8>, ToolError> {
        self.run_until_last().await
    }

    /// Run all stages, capturing the final stage's stdout as UTF-8 text
    pub async fn output_text(&self) -> Result<String, ToolError> {
        let bytes = self.output().await?;
        String::from_utf8(bytes).map_err(|_| ToolError::NonUtf8 {
            tool: self
                .stages
                .last()
                .map(|t| t.program().to_string())
                .unwrap_or_default(),
        })
    }

    /// Run all stages, writing the final stage's stdout to `path`
    pub async fn output_to_file(&self, path: &Path) -> Result<(), ToolError> {
        let bytes = self.output().await?;
        let tool = self
            .stages
            .last()
            .map(|t| t.program().to_string())
            .unwrap_or_default();
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| ToolError::Io { tool, source: e })
    }

    /// Run all stages, discarding the final stage's stdout. Used when the
    /// last tool writes its product to a file named in its arguments.
    pub async fn run(&self) -> Result<(), ToolError> {
        self.run_until_last().await.map(|_| ())
    }
}
