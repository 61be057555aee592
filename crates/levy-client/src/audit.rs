//! Append-only audit log of tax service exchanges.
//!
//! One block per correlated response:
//!
//! ```text
//! 2026-03-01T12:00:00.123456Z Create Or Adjust Transaction (elapsed 48211093 ns)
//! Request:
//! { ... }
//! Response:
//! { ... }
//! ```
//!
//! Write failures are logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use levy_core::RequestKind;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Audit log file writer.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Log to `path`, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one exchange.
    pub async fn append(
        &self,
        kind: RequestKind,
        elapsed: Duration,
        request: Option<&str>,
        response: &str,
    ) {
        let block = format_block(kind, elapsed, request, response);
        if let Err(e) = self.write(block.as_bytes()).await {
            tracing::warn!(path = %self.path.display(), "failed to write audit log: {e}");
        }
    }

    async fn write(&self, block: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(block).await?;
        file.flush().await
    }
}

fn format_block(
    kind: RequestKind,
    elapsed: Duration,
    request: Option<&str>,
    response: &str,
) -> String {
    format!(
        "{} {} (elapsed {} ns)\nRequest:\n{}\nResponse:\n{}\n\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        kind.label(),
        elapsed.as_nanos(),
        pretty(request.unwrap_or_default()),
        pretty(response),
    )
}

/// Pretty-print JSON; anything else is written as-is.
fn pretty(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|doc| serde_json::to_string_pretty(&doc).ok())
        .unwrap_or_else(|| text.to_string())
}
