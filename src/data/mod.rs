//! Consumer-side data handling: history, slicing and storage.

pub mod history;
pub mod slice;
pub mod storage;

pub use history::HistoryStore;
pub use slice::{slice_window, SliceResult};
