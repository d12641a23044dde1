//! The fragment generator boundary.
//!
//! Generation is delegated to an opaque external collaborator behind the
//! `FragmentGenerator` trait; the engine never inspects how fragments are
//! produced. `CommandGenerator` is the production implementation: it spawns
//! a configured command per task, writes the request as JSON to stdin, and
//! reads the fragment body from stdout.

use crate::errors::GenerationError;
use crate::fragment::Fragment;
use crate::phase::{SpecPayload, TaskSpec};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// External collaborator producing fragment content for one marker.
#[async_trait]
pub trait FragmentGenerator: Send + Sync {
    async fn generate(&self, task: &TaskSpec) -> Result<Fragment, GenerationError>;
}

/// Request shape written to the generator command's stdin.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    task_id: &'a str,
    marker: &'a str,
    payload: &'a SpecPayload,
}

/// Spawns an external command per generation request.
pub struct CommandGenerator {
    command: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            args,
        }
    }
}

#[async_trait]
impl FragmentGenerator for CommandGenerator {
    async fn generate(&self, task: &TaskSpec) -> Result<Fragment, GenerationError> {
        let request = GenerateRequest {
            task_id: &task.id,
            marker: &task.marker,
            payload: &task.payload,
        };
        let request_json =
            serde_json::to_string(&request).map_err(|e| GenerationError::Failed {
                marker: task.marker.clone(),
                message: format!("failed to encode request: {}", e),
            })?;

        debug!(task = %task.id, command = %self.command, "spawning generator");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| GenerationError::Failed {
                marker: task.marker.clone(),
                message: format!("failed to spawn {}: {}", self.command, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request_json.as_bytes())
                .await
                .map_err(|e| GenerationError::Failed {
                    marker: task.marker.clone(),
                    message: format!("failed to write request: {}", e),
                })?;
            stdin.shutdown().await.ok();
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GenerationError::Failed {
                marker: task.marker.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Failed {
                marker: task.marker.clone(),
                message: format!(
                    "generator exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        let content = String::from_utf8_lossy(&output.stdout).to_string();
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyOutput {
                marker: task.marker.clone(),
            });
        }

        Ok(
            Fragment::new(&task.id, &task.marker, &content, task.payload.kind)
                .with_priority(task.priority),
        )
    }
}
