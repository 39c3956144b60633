//! Execution history: typed events and the paginated reader

mod event;
mod iterator;

pub use event::*;
pub use iterator::{HistoryError, HistoryIterator, HistoryPage, HistoryPager};
