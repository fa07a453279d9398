use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;

use crate::domain::{ChartSource, SlotTarget};
use crate::error::ChartError;
use crate::sidecar::write_sidecar;
use crate::store::Store;
use crate::transfer::{Transfer, TransferOutcome};
use crate::transport::ChartTransport;

/// Responses announcing less than this are treated as a missing slot.
pub const MIN_EXPECTED_BYTES: u64 = 1024;

const STATUS_NOT_FOUND: u16 = 404;

/// Result of one attempt at one slot.
#[derive(Debug)]
pub enum SlotOutcome {
    Skipped {
        image: Utf8PathBuf,
    },
    Completed {
        image: Utf8PathBuf,
        sidecar: Utf8PathBuf,
        bytes: u64,
    },
    /// The slot is not (yet) published; an earlier one may be.
    Transient {
        reason: String,
    },
    Abort(ChartError),
    Cancelled,
}

pub struct SlotFetcher<T> {
    transport: T,
    store: Store,
}

impl<T: ChartTransport> SlotFetcher<T> {
    pub fn new(transport: T, store: Store) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn fetch(
        &self,
        source: &ChartSource,
        target: &SlotTarget,
        cancel: &CancellationToken,
        progress: impl FnMut(u64, u64),
    ) -> SlotOutcome {
        let image = self.store.resolve(&target.image);
        if self.store.exists(&image) {
            tracing::debug!(source = %source.id, image = %image, "already present");
            return SlotOutcome::Skipped { image };
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(source = %source.id, slot = %target.slot, "transfer cancelled");
                SlotOutcome::Cancelled
            }
            outcome = self.request(source, target, image, progress) => {
                outcome.unwrap_or_else(SlotOutcome::Abort)
            }
        }
    }

    async fn request(
        &self,
        source: &ChartSource,
        target: &SlotTarget,
        image: Utf8PathBuf,
        progress: impl FnMut(u64, u64),
    ) -> Result<SlotOutcome, ChartError> {
        tracing::debug!(source = %source.id, url = %target.url, "requesting slot");
        let response = self.transport.open(&target.url).await?;

        if response.status == STATUS_NOT_FOUND {
            return Ok(SlotOutcome::Transient {
                reason: format!("not found: {}", target.url),
            });
        }
        if !response.is_success() {
            return Err(ChartError::HttpStatus {
                status: response.status,
                url: target.url.clone(),
            });
        }

        let expected = response
            .content_length
            .unwrap_or_else(|| source.fallback_bytes());
        if expected < MIN_EXPECTED_BYTES {
            return Ok(SlotOutcome::Transient {
                reason: format!("undersized response ({expected} bytes)"),
            });
        }

        let mut transfer = Transfer::create(&image, expected)?;
        let mut body = response.body;
        match transfer.drive(&mut body, progress).await? {
            TransferOutcome::Empty => {
                return Ok(SlotOutcome::Transient {
                    reason: "empty response body".to_string(),
                });
            }
            TransferOutcome::Complete { .. } => {}
        }
        let bytes = transfer.persist()?;
        let sidecar = match write_sidecar(&self.store, source, target, &image) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                // Images are only kept together with their sidecar.
                if let Err(cleanup) = Store::remove_file(&image) {
                    tracing::warn!(image = %image, error = %cleanup, "could not remove image");
                }
                return Err(err);
            }
        };

        tracing::info!(source = %source.id, image = %image, bytes, "slot downloaded");
        Ok(SlotOutcome::Completed {
            image,
            sidecar,
            bytes,
        })
    }
}
