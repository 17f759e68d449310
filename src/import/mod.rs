//! Import workflow. [session::ImportSession] drives a single attempt from file selection to
//! the final outcome, reporting failures through [error::ImportFeaturesError].

pub mod error;
pub mod session;
pub mod source;
