//! Cached array files with cheap row-range reads.

pub mod npy;

use std::path::Path;

use ndarray::ArrayD;
use num_complex::Complex32;

use crate::error::DatasetResult;

pub use npy::NpyStore;

/// Random access over on-disk arrays whose first axis is the row axis.
///
/// One implementation per on-disk layout. Implementations must never read
/// payload bytes outside the requested row window in `read_rows`.
pub trait ChunkedArrayStore: Send + Sync {
    /// Report the array shape from the header alone.
    fn shape_of(&self, path: &Path) -> DatasetResult<Vec<usize>>;

    /// Read rows `[start_row, start_row + row_count)`, shaped
    /// `[row_count, ...remaining dims]`.
    ///
    /// Fails with `CropOutOfRange` if the window exceeds the stored rows.
    fn read_rows(
        &self,
        path: &Path,
        start_row: usize,
        row_count: usize,
    ) -> DatasetResult<ArrayD<Complex32>>;

    /// Read the whole array.
    fn read_all(&self, path: &Path) -> DatasetResult<ArrayD<Complex32>>;
}
