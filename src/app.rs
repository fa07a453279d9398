use std::sync::Arc;

use serde::Serialize;

use crate::config::Catalog;
use crate::credentials::Credentials;
use crate::domain::{ChartSource, SourceId};
use crate::error::ChartError;
use crate::queue::{Clock, DownloadHandle, DownloadSummary, Downloader, ItemReport};
use crate::slot::TimeSlot;
use crate::store::Store;
use crate::transport::ChartTransport;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub id: SourceId,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub downloaded: u32,
    pub skipped: u32,
    pub aborted: usize,
    pub items: Vec<ItemReport>,
}

impl FetchResult {
    fn from_summary(summary: DownloadSummary) -> Self {
        let aborted = summary.items.iter().filter(|item| item.is_aborted()).count();
        Self {
            downloaded: summary.items.iter().map(|item| item.downloaded).sum(),
            skipped: summary.items.iter().map(|item| item.skipped).sum(),
            aborted,
            items: summary.items,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub sources: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: SourceId,
    pub name: String,
    pub interval_secs: u32,
    pub realm: Option<String>,
    pub available: bool,
}

/// Queue totals, recomputed after every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueProgress {
    pub completed: u64,
    pub remaining: u64,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Queue(QueueProgress),
    Transfer {
        file: String,
        received: u64,
        expected: u64,
    },
    SlotCompleted {
        source: SourceId,
        slot: TimeSlot,
        image: String,
        sidecar: String,
        bytes: u64,
    },
    SlotSkipped {
        source: SourceId,
        slot: TimeSlot,
        image: String,
    },
    SlotRetry {
        source: SourceId,
        slot: TimeSlot,
        attempt: u32,
        reason: String,
    },
    ItemAborted {
        source: SourceId,
        reason: String,
    },
    ItemCancelled {
        source: SourceId,
    },
    ItemFinished {
        source: SourceId,
    },
    Idle,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: ChartTransport> {
    catalog: Catalog,
    credentials: Credentials,
    store: Store,
    transport: T,
}

impl<T: ChartTransport + Clone> App<T> {
    pub fn new(catalog: Catalog, credentials: Credentials, store: Store, transport: T) -> Self {
        Self {
            catalog,
            credentials,
            store,
            transport,
        }
    }

    pub fn list(&self) -> ListResult {
        let sources = self
            .catalog
            .sources()
            .iter()
            .map(|source| ListEntry {
                id: source.id.clone(),
                name: source.name.clone(),
                interval_secs: source.interval_secs,
                realm: source.realm.clone(),
                available: Catalog::is_available(source, &self.credentials),
            })
            .collect();
        ListResult { sources }
    }

    /// Checks every request against the catalog and credentials before anything is queued.
    pub fn resolve(
        &self,
        requests: &[FetchRequest],
    ) -> Result<Vec<(Arc<ChartSource>, u32)>, ChartError> {
        requests
            .iter()
            .map(|request| {
                self.catalog
                    .require(&request.id, &self.credentials)
                    .map(|source| (source, request.count))
            })
            .collect()
    }

    pub fn downloader<C: Clock>(&self, clock: C) -> (Downloader<T, C>, DownloadHandle) {
        Downloader::new(self.transport.clone(), self.store.clone(), clock)
    }

    pub async fn fetch<C: Clock>(
        &self,
        requests: &[FetchRequest],
        downloader: &mut Downloader<T, C>,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, ChartError> {
        for (source, count) in self.resolve(requests)? {
            downloader.submit(source, count);
        }
        let summary = downloader.run_until_idle(sink).await;
        Ok(FetchResult::from_summary(summary))
    }
}
