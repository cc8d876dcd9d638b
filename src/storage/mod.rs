// Storage module - writes trim events to disk in JSON Lines format
//
// One JSON object per line, so the log can be grepped, streamed, or fed to jq:
//   jq 'select(.type == "trimmed") | .kept_renderable' logs/tailtrim-*.jsonl
//
// Each run gets its own file: tailtrim-YYYYMMDD-HHMMSS-XXXX.jsonl

use crate::events::TrimEvent;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Generate a unique session ID for log file naming
/// Format: YYYYMMDD-HHMMSS-XXXX (timestamp + 4 random hex chars)
pub fn generate_session_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    // RandomState gives a random value without another dependency
    let random = RandomState::new().build_hasher().finish();
    format!("{}-{:04x}", timestamp, random & 0xFFFF)
}

/// Drains [`TrimEvent`]s from a channel into a JSONL file
pub struct EventLog {
    path: PathBuf,
    event_rx: mpsc::Receiver<TrimEvent>,
}

impl EventLog {
    /// Create the log directory and bind the file for this session
    pub fn new(log_dir: &Path, session_id: &str, event_rx: mpsc::Receiver<TrimEvent>) -> Result<Self> {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;

        Ok(Self {
            path: log_dir.join(format!("tailtrim-{}.jsonl", session_id)),
            event_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write events as they arrive until every sender is dropped.
    ///
    /// A failed write is logged and the loop keeps going.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!("Event log started: {:?}", self.path);
        let mut written = 0usize;

        while let Some(event) = self.event_rx.recv().await {
            match self.write_event(&event) {
                Ok(()) => written += 1,
                Err(e) => tracing::error!("Failed to write trim event: {:?}", e),
            }
        }

        tracing::debug!(written, "Event log closed");
        Ok(())
    }

    fn write_event(&self, event: &TrimEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open event log")?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        writeln!(file, "{}", json).context("Failed to write to event log")?;

        // Flush immediately so the log survives a crash
        file.flush().context("Failed to flush event log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Channel;

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        // YYYYMMDD-HHMMSS-XXXX
        assert_eq!(id.len(), 20);
        assert_eq!(id.matches('-').count(), 2);
    }

    #[tokio::test]
    async fn test_events_are_written_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let log = EventLog::new(dir.path(), "test", rx).unwrap();
        let path = log.path().to_path_buf();

        tx.send(TrimEvent::Trimmed {
            conv_id: "c".to_string(),
            timestamp: Utc::now(),
            channel: Channel::Fragment,
            nodes_before: 30,
            nodes_after: 12,
            renderable_total: 25,
            kept_renderable: 10,
        })
        .await
        .unwrap();
        drop(tx);
        log.run().await.unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["type"], "trimmed");
        assert_eq!(value["channel"], "fragment");
    }
}
