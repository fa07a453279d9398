use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::ChartError;
use crate::store::Store;

pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Complete { bytes: u64 },
    /// The body ended before any byte arrived.
    Empty,
}

/// The single in-flight download: a body being drained into a partial file.
///
/// Dropping a `Transfer` before [`Transfer::persist`] removes the partial
/// file, so an abandoned or cancelled slot leaves nothing at the target path.
#[derive(Debug)]
pub struct Transfer {
    target: Utf8PathBuf,
    partial: NamedTempFile,
    file: File,
    received: u64,
    expected: u64,
}

impl Transfer {
    pub fn create(target: &Utf8Path, expected: u64) -> Result<Self, ChartError> {
        let partial = Store::partial_file(target)?;
        let handle = partial
            .as_file()
            .try_clone()
            .map_err(|err| ChartError::Filesystem(format!("open {target}: {err}")))?;
        Ok(Self {
            target: target.to_path_buf(),
            partial,
            file: File::from_std(handle),
            received: 0,
            expected,
        })
    }

    /// Copies `body` in [`CHUNK_SIZE`] chunks until a short chunk marks the end.
    pub async fn drive<R>(
        &mut self,
        body: &mut R,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<TransferOutcome, ChartError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = read_chunk(body, &mut buf)
                .await
                .map_err(|err| ChartError::Transport(format!("reading body: {err}")))?;
            if n > 0 {
                self.file
                    .write_all(&buf[..n])
                    .await
                    .map_err(|err| ChartError::Filesystem(format!("write {}: {err}", self.target)))?;
                self.received += n as u64;
                progress(self.received, self.expected);
            }
            if n < CHUNK_SIZE {
                break;
            }
        }

        self.file
            .flush()
            .await
            .map_err(|err| ChartError::Filesystem(format!("write {}: {err}", self.target)))?;

        if self.received == 0 {
            return Ok(TransferOutcome::Empty);
        }
        Ok(TransferOutcome::Complete {
            bytes: self.received,
        })
    }

    /// Moves the finished download to its target; fails if the target appeared meanwhile.
    pub fn persist(self) -> Result<u64, ChartError> {
        let Self {
            target,
            partial,
            file,
            received,
            ..
        } = self;
        drop(file);
        Store::persist_new(partial, &target)?;
        Ok(received)
    }
}

/// Fills `buf` unless the body ends first; returns the number of bytes read.
async fn read_chunk<R>(body: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = body.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
