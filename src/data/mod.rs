//! Loading, splitting and windowing of time series.

/// Wide observation tables loaded from CSV.
pub mod table;

/// Long-format frames with time index and group id.
pub mod frame;

/// Ordered train / validation / test splits.
pub mod split;

/// Per-feature min-max scaling.
pub mod scaler;

/// Sliding encoder / decoder windows and batches.
pub mod window;

/// Benchmark-style JSON-lines series records.
pub mod records;

/// Data module tying the above together.
pub mod module;

pub use frame::SeriesFrame;
pub use module::{DatasetProvider, SeriesDataModule};
pub use split::{split_time_indices, SplitIndices};
pub use table::ObservationTable;
pub use window::{Batch, WindowSpec, WindowedDataset};
