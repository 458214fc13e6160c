//! Job lifecycle coordination for the warren download job manager.
//!
//! This crate provides the coordination core that sits on top of a
//! peer-to-peer transfer engine:
//!
//! - [`JobManager`] - Record store, state machine and background task owner
//! - [`TransferEngine`] / [`TransferJob`] - Contract consumed from the engine
//! - [`Backend`] - Opens an engine and a job log for a given [`Settings`]
//! - [`ProgressSampler`] - Throughput and ETA from periodic byte counts
//! - [`MessageFromWeb`] / [`EngineMessage`] - Notification boundary
//! - [`sim`] - In-process simulated engine

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/warren-rs/warren/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod completion;
mod config;
mod engine;
mod error;
mod index;
mod manager;
mod notify;
mod progress;
mod recovery;
mod resolver;
mod shutdown;
pub mod sim;
#[cfg(test)]
mod testing;

pub use config::{DEFAULT_MAX_ESTABLISHED_CONNS, Settings};
pub use engine::{Backend, EngineError, JobHandle, TransferEngine, TransferJob};
pub use error::{Error, Result};
pub use manager::{Admission, JobManager};
pub use notify::{EngineMessage, MessageFromWeb, MessageKind, ProgressInfo};
pub use progress::{ESTIMATING, FileInfo, ProgressSampler, Snapshot, humanize_duration};

pub use warren_store::{FileJobLog, JobLog, MemoryJobLog, StoreError};
pub use warren_types::{
    Descriptor, DescriptorError, FileEntry, InfoHash, JobRecord, JobStatus, Metainfo,
};
