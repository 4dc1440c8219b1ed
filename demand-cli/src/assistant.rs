use std::io::Write;
use std::process::{Command, Stdio};

use demand_core::domain::ports::outbound::Assistant;
use demand_core::DemandError;

/// Runs a shell command with the prompt on stdin and takes stdout as the reply.
pub struct CommandAssistant {
    command: String,
}

impl CommandAssistant {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Assistant for CommandAssistant {
    fn complete(&self, prompt: &str) -> Result<String, DemandError> {
        let failed = |what: &str, e: std::io::Error| {
            DemandError::validation(format!("assistant command {what}: {e}"))
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| failed("could not start", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| failed("rejected the prompt", e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| failed("did not finish", e))?;
        if !output.status.success() {
            return Err(DemandError::validation(format!(
                "assistant command exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn echoes_through_the_command() {
        let assistant = CommandAssistant::new("tr a-z A-Z");
        assert_eq!(assistant.complete("two stories").unwrap(), "TWO STORIES");
    }

    #[test]
    fn failing_command_is_an_error() {
        assert!(CommandAssistant::new("exit 3").complete("x").is_err());
    }
}
