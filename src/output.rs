use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FetchResult, ListResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Line-oriented progress on stderr for interactive runs.
pub struct ConsoleProgress;

impl ConsoleProgress {
    fn render(event: &ProgressEvent) -> Option<String> {
        let line = match event {
            ProgressEvent::Queue(progress) => {
                let total = progress.completed + progress.remaining;
                format!("{} / {}", progress.completed, total)
            }
            ProgressEvent::Transfer {
                file,
                received,
                expected,
            } => format!("\r{file} ({received} / {expected})"),
            ProgressEvent::SlotCompleted { image, bytes, .. } => {
                format!("\rsaved {image} ({bytes} bytes)")
            }
            ProgressEvent::SlotSkipped { image, .. } => format!("present {image}"),
            ProgressEvent::SlotRetry {
                source,
                slot,
                attempt,
                ..
            } => format!("{source}: {slot} unavailable (attempt {attempt})"),
            ProgressEvent::ItemAborted { source, reason } => format!("{source}: aborted: {reason}"),
            ProgressEvent::ItemCancelled { source } => format!("{source}: cancelled"),
            ProgressEvent::ItemFinished { source } => format!("{source}: done"),
            ProgressEvent::Idle => return None,
        };
        Some(line)
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let Some(line) = Self::render(&event) else {
            return;
        };
        let mut stderr = io::stderr().lock();
        let result = if matches!(event, ProgressEvent::Transfer { .. }) {
            stderr.write_all(line.as_bytes()).and_then(|_| stderr.flush())
        } else {
            writeln!(stderr, "{line}")
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "progress output failed");
        }
    }
}
