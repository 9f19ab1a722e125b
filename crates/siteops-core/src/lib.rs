pub mod collab;
pub mod config;
pub mod daemon;
pub mod db;
pub mod entity;
pub mod error;
pub mod housekeeping;
pub mod io;
pub mod orchestrator;
pub mod reconcile;
pub mod store;
pub mod types;

pub use daemon::Daemon;
pub use error::{Result, SiteopsError};
