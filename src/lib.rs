//! Bulk creation of Track & Graph features from CSV files.
//!
//! A CSV file is either imported entirely into a group or not at all. The workflow is driven by
//! [import::session::ImportSession], rows are decoded and persisted by [features], and
//! [storage] keeps features in per-group record files.

pub mod cli;
pub mod features;
pub mod import;
pub mod storage;
pub mod utils;
