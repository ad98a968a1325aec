//! nfscheck library
//!
//! Scheduled disk usage collection for NFS volumes: a bounded-depth directory
//! walker, a `duc` based measurer and a batching bulk indexer.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod index;
pub mod job;
pub mod measure;
pub mod observability;
pub mod records;
pub mod walker;

pub use config::Config;
pub use error::{Error, Result};
