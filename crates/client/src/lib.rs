#![forbid(unsafe_code)]

mod client;
pub mod config;
mod error;
pub mod fetch;

pub use client::{
    FprClient, MARKER_UNITTYPE, MARKER_VARIABLE, SyncResult, SyncStats, SyncStatus,
};
pub use config::{ClientConfig, Command};
pub use error::{DecodeError, FetchError, PageError, SyncError};
pub use fetch::{HttpTransport, PageQuery, RecordPages, Transport};
