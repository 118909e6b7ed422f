//! Virtual power meter for a Freifunk mesh network.
//!
//! Estimates the power draw of the online mesh nodes, submits it as a
//! reading of a virtual meter on the Corrently API and fetches the CO2
//! emission calculated for that meter.

pub mod config;
pub mod corrently;
pub mod identity;
pub mod meshviewer;
pub mod pipeline;
pub mod power;
pub mod store;

pub use config::{Config, ConfigError};
pub use identity::{load_identity, Identity};
pub use pipeline::{run, OutputFormat, Pipeline, RunError, RunSummary};
