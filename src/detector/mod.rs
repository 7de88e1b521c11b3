//! Leaf estimators over raw bytes and names
//!
//! Nothing here knows about operations or users; the analyzers wrap these
//! into classified results.

pub mod entropy;
pub mod filename;
pub mod header;
