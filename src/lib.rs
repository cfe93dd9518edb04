//! flomo note service client library
//!
//! This library signs and pages through requests to the flomo API, normalizes
//! note markup into plain text, markdown and tags, builds similarity graphs from
//! the service's recommendations and exports the results to CSV and JSON.

mod analysis;
mod cli;
mod client;
mod config;
mod errors;
mod export;
mod graph;
mod helper;
mod normalizer;
mod note;
mod pagination;
mod signer;
mod types;

// Re-export key components
pub use analysis::*;
pub use cli::*;
pub use client::*;
pub use config::*;
pub use errors::*;
pub use export::*;
pub use graph::*;
pub use helper::*;
pub use normalizer::*;
pub use note::*;
pub use pagination::*;
pub use signer::*;
pub use types::*;
