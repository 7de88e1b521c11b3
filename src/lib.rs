//! Sentinel Scan - ransomware detection over file operation streams
//!
//! Every observed create/write/delete/rename is scored for abnormal entropy,
//! random-looking names and content that contradicts its declared type.
//! Operations close together in time form a sequence, scored for size
//! replacement and for file type and entropy funnelling. The classifier fuses
//! all signals into one suspicion level per operation, and offending
//! operations can be undone from the trash or an earlier version.
//!
//! # Example
//!
//! ```rust,no_run
//! use sentinel_scan::{Config, Scanner, UserContext};
//!
//! fn main() -> anyhow::Result<()> {
//!     let scanner = Scanner::from_config(Config::default())?;
//!     let ctx = UserContext::new("alice");
//!
//!     let summary = scanner.scan_changes(&ctx)?;
//!     println!("highest suspicion: {:?}", summary.highest_suspicion);
//!
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod monitor;
pub mod recovery;
pub mod scan;
pub mod storage;

pub use classifier::{Classifier, SuspicionLevel};
pub use config::Config;
pub use error::{Error, Result};
pub use monitor::{Command, FileOperation, RawOperation};
pub use recovery::RecoveryOutcome;
pub use scan::{ScanSummary, Scanner, Verdict};
pub use storage::UserContext;
