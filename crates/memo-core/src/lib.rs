//! Study memo persistence.
//!
//! Attaches a free-text memo to a DICOM study held in an Orthanc catalog.
//! Memos are written to study metadata when the server is reachable, read
//! back from metadata or from legacy embedded attributes, and fall back to a
//! local backup when the server cannot be used.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use services::MemoService;
pub use state::AppState;
