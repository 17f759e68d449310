//!  Storage is organized through [feature_store::FileFeatureStore].
//!  The basic idea is:
//!   - There is a directory with one record file per group.
//!   - Every line of a record file is a JSON encoded feature.
//!   - Writers hold an exclusive lock on the group for the lifetime of a transaction and publish
//!     their changes by replacing the record file in one rename.

pub mod feature_store;
