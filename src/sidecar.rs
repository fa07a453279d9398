use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{ChartSource, SlotTarget};
use crate::error::ChartError;
use crate::store::Store;

/// Writes the georeferencing record that accompanies a completed image.
pub fn write_sidecar(
    store: &Store,
    source: &ChartSource,
    target: &SlotTarget,
    image_path: &Utf8Path,
) -> Result<Utf8PathBuf, ChartError> {
    let path = store.resolve(&target.sidecar_file);
    let text = source.sidecar_text(image_path.as_str(), target.slot);
    Store::write_text_atomic(&path, &text)?;
    tracing::debug!(source = %source.id, sidecar = %path, "sidecar written");
    Ok(path)
}
