//! Durable job log for the warren download job manager.
//!
//! This crate persists the full set of job records:
//!
//! - [`JobLog`] - Load and atomically replace the persisted record set
//! - [`FileJobLog`] - JSON document on disk, replaced via rename
//! - [`MemoryJobLog`] - Shared in-memory log for tests and dry runs
//! - [`StoreError`] - Errors raised by log implementations

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/warren-rs/warren/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod file;
mod log;
mod memory;

pub use error::{Result, StoreError};
pub use file::{FORMAT_VERSION, FileJobLog};
pub use log::JobLog;
pub use memory::MemoryJobLog;
