//! Performance sample retrieval.
//!
//! `pager` splits the inventory into query pages; `points` turns each page of
//! results into [`OutputPoint`]s as soon as it arrives.

pub mod pager;
pub mod points;

pub use pager::{InvIterator, PerfFetcher};
pub use points::{OutputPoint, PointSink, PointsService};
