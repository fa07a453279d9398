use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::app::{ProgressEvent, ProgressSink, QueueProgress};
use crate::domain::{ChartSource, SourceId};
use crate::error::ChartError;
use crate::fetcher::{SlotFetcher, SlotOutcome};
use crate::slot::{TimeSlot, latest_slot};
use crate::store::Store;
use crate::transport::ChartTransport;

/// Consecutive missing slots tolerated before an item is given up.
pub const MAX_RETRIES: u32 = 10;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Finished,
    Aborted { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub source: SourceId,
    pub requested: u32,
    pub downloaded: u32,
    pub skipped: u32,
    pub files: Vec<String>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, ItemStatus::Aborted { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSummary {
    pub items: Vec<ItemReport>,
}

struct QueueItem {
    source: Arc<ChartSource>,
    requested: u32,
    remaining: u32,
    cursor: Option<TimeSlot>,
    retries: u32,
    cancel: CancellationToken,
    downloaded: u32,
    skipped: u32,
    files: Vec<String>,
}

impl QueueItem {
    fn step_back(&mut self) {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor.previous(self.source.interval_secs));
        }
    }

    fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.step_back();
    }

    fn report(self, status: ItemStatus) -> ItemReport {
        ItemReport {
            source: self.source.id.clone(),
            requested: self.requested,
            downloaded: self.downloaded,
            skipped: self.skipped,
            files: self.files,
            status,
        }
    }
}

struct Submission {
    source: Arc<ChartSource>,
    count: u32,
}

/// Cloneable control surface of a running [`Downloader`].
#[derive(Clone)]
pub struct DownloadHandle {
    submissions: UnboundedSender<Submission>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

impl DownloadHandle {
    pub fn submit(&self, source: Arc<ChartSource>, count: u32) -> Result<(), ChartError> {
        if count == 0 {
            return Ok(());
        }
        self.submissions
            .send(Submission { source, count })
            .map_err(|_| ChartError::QueueClosed)
    }

    /// Drops the item at the head of the queue, including its in-flight transfer.
    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Sequential download queue: one item at a time, one slot at a time.
pub struct Downloader<T, C = SystemClock> {
    fetcher: SlotFetcher<T>,
    clock: C,
    queue: VecDeque<QueueItem>,
    submissions: UnboundedReceiver<Submission>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
    completed: u64,
    summary: DownloadSummary,
}

impl<T: ChartTransport, C: Clock> Downloader<T, C> {
    pub fn new(transport: T, store: Store, clock: C) -> (Self, DownloadHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();
        let handle = DownloadHandle {
            submissions: tx,
            current: Arc::clone(&current),
            shutdown: shutdown.clone(),
        };
        let downloader = Self {
            fetcher: SlotFetcher::new(transport, store),
            clock,
            queue: VecDeque::new(),
            submissions: rx,
            current,
            shutdown,
            completed: 0,
            summary: DownloadSummary::default(),
        };
        (downloader, handle)
    }

    pub fn submit(&mut self, source: Arc<ChartSource>, count: u32) {
        if count == 0 {
            return;
        }
        tracing::debug!(source = %source.id, count, "queued");
        self.queue.push_back(QueueItem {
            source,
            requested: count,
            remaining: count,
            cursor: None,
            retries: 0,
            cancel: self.shutdown.child_token(),
            downloaded: 0,
            skipped: 0,
            files: Vec::new(),
        });
    }

    pub fn progress(&self) -> QueueProgress {
        QueueProgress {
            completed: self.completed,
            remaining: self.queue.iter().map(|item| u64::from(item.remaining)).sum(),
            items: self.queue.len(),
        }
    }

    /// Works through everything queued so far, then reports idle.
    pub async fn run_until_idle(&mut self, sink: &dyn ProgressSink) -> DownloadSummary {
        self.pull_submissions();
        sink.event(ProgressEvent::Queue(self.progress()));
        if let Err(err) = self.fetcher.store().ensure_root() {
            tracing::warn!(error = %err, "download directory unavailable");
        }

        while !self.queue.is_empty() {
            if self.shutdown.is_cancelled() {
                self.cancel_all(sink);
                break;
            }
            self.step(sink).await;
            self.pull_submissions();
            sink.event(ProgressEvent::Queue(self.progress()));
        }

        self.set_current(None);
        sink.event(ProgressEvent::Idle);
        std::mem::take(&mut self.summary)
    }

    /// Long-running mode: processes submissions until every handle is gone or shutdown.
    pub async fn run(mut self, sink: &dyn ProgressSink) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        loop {
            summary.items.extend(self.run_until_idle(sink).await.items);
            if self.shutdown.is_cancelled() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                next = self.submissions.recv() => next,
            };
            match next {
                Some(Submission { source, count }) => self.submit(source, count),
                None => break,
            }
        }
        summary
    }

    fn pull_submissions(&mut self) {
        while let Ok(Submission { source, count }) = self.submissions.try_recv() {
            self.submit(source, count);
        }
    }

    fn set_current(&self, token: Option<CancellationToken>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn cancel_all(&mut self, sink: &dyn ProgressSink) {
        while let Some(item) = self.queue.pop_front() {
            sink.event(ProgressEvent::ItemCancelled {
                source: item.source.id.clone(),
            });
            self.summary.items.push(item.report(ItemStatus::Cancelled));
        }
    }

    async fn step(&mut self, sink: &dyn ProgressSink) {
        let Some(item) = self.queue.front_mut() else {
            return;
        };
        if item.cancel.is_cancelled() {
            self.finish_head(ItemStatus::Cancelled, sink);
            return;
        }

        let (interval, offset) = (item.source.interval_secs, item.source.offset_secs);
        let clock = &self.clock;
        let slot = *item
            .cursor
            .get_or_insert_with(|| latest_slot(clock.now(), interval, offset));
        let source = Arc::clone(&item.source);
        let cancel = item.cancel.clone();
        self.set_current(Some(cancel.clone()));

        let target = source.target(slot);
        let outcome = self
            .fetcher
            .fetch(&source, &target, &cancel, |received, expected| {
                sink.event(ProgressEvent::Transfer {
                    file: target.image.clone(),
                    received,
                    expected,
                })
            })
            .await;

        let Some(item) = self.queue.front_mut() else {
            return;
        };
        match outcome {
            SlotOutcome::Skipped { image } => {
                item.skipped += 1;
                item.consume();
                sink.event(ProgressEvent::SlotSkipped {
                    source: source.id.clone(),
                    slot,
                    image: image.to_string(),
                });
            }
            SlotOutcome::Completed {
                image,
                sidecar,
                bytes,
            } => {
                item.retries = 0;
                item.downloaded += 1;
                item.files.push(image.to_string());
                item.consume();
                self.completed += 1;
                sink.event(ProgressEvent::SlotCompleted {
                    source: source.id.clone(),
                    slot,
                    image: image.to_string(),
                    sidecar: sidecar.to_string(),
                    bytes,
                });
            }
            SlotOutcome::Transient { reason } => {
                item.retries += 1;
                if item.retries >= MAX_RETRIES {
                    let err = ChartError::RetriesExhausted {
                        attempts: item.retries,
                    };
                    self.abort_head(err, sink);
                    return;
                }
                tracing::debug!(source = %source.id, %slot, attempt = item.retries, %reason, "slot unavailable, stepping back");
                let attempt = item.retries;
                item.step_back();
                sink.event(ProgressEvent::SlotRetry {
                    source: source.id.clone(),
                    slot,
                    attempt,
                    reason,
                });
            }
            SlotOutcome::Abort(err) => {
                self.abort_head(err, sink);
                return;
            }
            SlotOutcome::Cancelled => {
                self.finish_head(ItemStatus::Cancelled, sink);
                return;
            }
        }

        if self.queue.front().is_some_and(|item| item.remaining == 0) {
            self.finish_head(ItemStatus::Finished, sink);
        }
    }

    fn abort_head(&mut self, err: ChartError, sink: &dyn ProgressSink) {
        if let Some(item) = self.queue.front() {
            tracing::warn!(source = %item.source.id, error = %err, "download aborted");
        }
        self.finish_head(
            ItemStatus::Aborted {
                reason: err.to_string(),
            },
            sink,
        );
    }

    fn finish_head(&mut self, status: ItemStatus, sink: &dyn ProgressSink) {
        let Some(item) = self.queue.pop_front() else {
            return;
        };
        self.set_current(None);
        let source = item.source.id.clone();
        let event = match &status {
            ItemStatus::Finished => ProgressEvent::ItemFinished { source },
            ItemStatus::Aborted { reason } => ProgressEvent::ItemAborted {
                source,
                reason: reason.clone(),
            },
            ItemStatus::Cancelled => ProgressEvent::ItemCancelled { source },
        };
        sink.event(event);
        self.summary.items.push(item.report(status));
    }
}
