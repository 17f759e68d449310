//! Feature definitions and their CSV representation.
//!
//! [parser::FeatureCsvReader] decodes rows, [loader::import_features] validates and persists
//! them atomically, [export::write_features_csv] writes a group back out in the same layout.

pub mod entities;
pub mod export;
pub mod loader;
pub mod parser;
