use std::process::Stdio;

use tokio::process::Command;

pub trait HostPower: Send + Sync {
    fn request_poweroff(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownCommand {
    program: String,
    args: Vec<String>,
}

impl ShutdownCommand {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl HostPower for ShutdownCommand {
    fn request_poweroff(&self) {
        tracing::warn!(program = %self.program, args = ?self.args, "requesting host shutdown");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(program = %self.program, error = %error, "host shutdown command could not start");
                return;
            }
        };

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    tracing::info!(program = %program, "host shutdown command accepted");
                }
                Ok(output) => {
                    tracing::error!(
                        program = %program,
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "host shutdown command failed"
                    );
                }
                Err(error) => {
                    tracing::error!(program = %program, error = %error, "host shutdown command did not finish");
                }
            }
        });
    }
}
