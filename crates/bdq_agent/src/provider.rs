//! Subprocess test provider.
//!
//! Runs the BDQ test library (the vendored Java service) as one process
//! invocation per tuple: a JSON request on stdin, a JSON outcome on stdout.
//! The engine owns timeouts and retries; this adapter only classifies
//! failures as transient (crash, I/O) or permanent (malformed response).

use async_trait::async_trait;
use bdq_engine::error::ProviderError;
use bdq_engine::provider::{NamedArgs, TestProvider, WireOutcome};
use bdq_protocol::Outcome;
use serde_json::json;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Provider that shells out to a configured command for every invocation.
pub struct SubprocessProvider {
    program: String,
    args: Vec<String>,
}

impl SubprocessProvider {
    /// Build from a whitespace-separated command line, e.g.
    /// `java -jar bdqtestrunner.jar --single`.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl TestProvider for SubprocessProvider {
    async fn invoke(&self, handle: &str, args: &NamedArgs) -> Result<Outcome, ProviderError> {
        let request = json!({
            "test": handle,
            "args": args,
        });
        let payload = serde_json::to_vec(&request)
            .map_err(|err| ProviderError::Permanent(format!("request encode: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // the engine drops this future on timeout; take the process down
            // with it
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ProviderError::Permanent(format!("failed to spawn '{}': {}", self.program, err))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|err| ProviderError::Transient(format!("stdin write: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ProviderError::Transient(format!("provider I/O: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Transient(format!(
                "provider exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        debug!(test = handle, bytes = output.stdout.len(), "provider responded");
        let wire: WireOutcome = serde_json::from_slice(&output.stdout).map_err(|err| {
            ProviderError::Permanent(format!("malformed provider response: {err}"))
        })?;
        Ok(wire.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splits_program_and_args() {
        let provider =
            SubprocessProvider::from_command_line("java -jar bdqtestrunner.jar --single").unwrap();
        assert_eq!(provider.program, "java");
        assert_eq!(provider.args, vec!["-jar", "bdqtestrunner.jar", "--single"]);
        assert!(SubprocessProvider::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn spawn_failure_is_permanent() {
        let provider =
            SubprocessProvider::from_command_line("/nonexistent/bdq-provider").unwrap();
        let err = provider
            .invoke("countrycode_standard", &NamedArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[tokio::test]
    async fn well_formed_response_round_trips() {
        // `cat` is not a BDQ provider, but echoing the request back proves
        // the stdin/stdout plumbing; the request is not a valid outcome, so
        // this classifies as a malformed (permanent) response.
        let provider = SubprocessProvider::from_command_line("cat").unwrap();
        let mut args = NamedArgs::new();
        args.insert("dwc:countryCode".into(), "US".into());
        let err = provider
            .invoke("countrycode_standard", &args)
            .await
            .unwrap_err();
        match err {
            ProviderError::Permanent(msg) => assert!(msg.contains("malformed")),
            other => panic!("expected permanent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scripted_shell_provider_yields_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("provider.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\nprintf '{\"status\":\"RUN_HAS_RESULT\",\"result\":\"COMPLIANT\",\"comment\":\"ok\"}'\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let provider =
            SubprocessProvider::from_command_line(script.to_str().unwrap()).unwrap();
        let outcome = provider
            .invoke("countrycode_standard", &NamedArgs::new())
            .await
            .unwrap();
        assert_eq!(outcome.status.as_str(), "RUN_HAS_RESULT");
        assert_eq!(outcome.comment, "ok");
    }
}
