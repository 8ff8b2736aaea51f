//! Tunnel keypair generation
//!
//! Each link node owns a WireGuard keypair minted at creation time. The
//! private key only ever lives in the link's config record and the
//! container environment. Generation goes through the [`KeyGenerator`]
//! trait so the reconciler can be tested without the `wg` tool installed.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Errors from key generation
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key generation tool failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Key generation tool exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("Key generation tool produced empty output")]
    EmptyOutput,
}

/// A generated tunnel keypair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

/// Trait for minting tunnel keypairs
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Generate a fresh keypair. Invoked once per call; never called when
    /// an existing keypair is being carried forward.
    async fn generate(&self) -> Result<KeyPair, KeyError>;
}

/// Key generator backed by the `wg` command-line tool.
///
/// Runs `wg genkey` for the private half, then pipes it through
/// `wg pubkey` to derive the public half.
pub struct WgKeygen {
    program: String,
}

impl WgKeygen {
    pub fn new() -> Self {
        Self {
            program: "wg".to_string(),
        }
    }

    /// Use a different executable in place of `wg` (for testing).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn genkey(&self) -> Result<String, KeyError> {
        let output = Command::new(&self.program).arg("genkey").output().await?;
        check_tool_output(output.status, &output.stderr)?;
        non_empty(&output.stdout)
    }

    async fn pubkey(&self, private_key: &str) -> Result<String, KeyError> {
        let mut child = Command::new(&self.program)
            .arg("pubkey")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(private_key.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        check_tool_output(output.status, &output.stderr)?;
        non_empty(&output.stdout)
    }
}

impl Default for WgKeygen {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyGenerator for WgKeygen {
    async fn generate(&self) -> Result<KeyPair, KeyError> {
        let private_key = self.genkey().await?;
        let public_key = self.pubkey(&private_key).await?;
        debug!("Generated tunnel keypair (pubkey: {})", public_key);
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }
}

fn check_tool_output(status: std::process::ExitStatus, stderr: &[u8]) -> Result<(), KeyError> {
    if !status.success() {
        return Err(KeyError::ToolFailed {
            status: status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn non_empty(stdout: &[u8]) -> Result<String, KeyError> {
    let key = String::from_utf8_lossy(stdout).trim().to_string();
    if key.is_empty() {
        return Err(KeyError::EmptyOutput);
    }
    Ok(key)
}
