//! Core types for the warren download job manager.
//!
//! This crate provides the data structures shared by every other crate in
//! the workspace:
//!
//! - [`InfoHash`] - Fixed-size content identifier of a job
//! - [`Descriptor`] - Lazy reference (magnet URI or bare hash) awaiting metadata
//! - [`Metainfo`] - Decoded `.torrent` metadata
//! - [`JobStatus`] - Lifecycle state of a job
//! - [`JobRecord`] - Durable record of a single job

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/warren-rs/warren/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod descriptor;
mod error;
mod info_hash;
mod metainfo;
mod record;
mod status;

pub use descriptor::Descriptor;
pub use error::{DescriptorError, InfoHashError, MetainfoError};
pub use info_hash::{INFO_HASH_LEN, InfoHash};
pub use metainfo::{FileEntry, Metainfo};
pub use record::JobRecord;
pub use status::{JobStatus, StatusParseError};
