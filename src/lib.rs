//! Autosend - triggered-transaction tool
//!
//! Watches balances at designated bitcoind wallet addresses and, once a
//! configured threshold is met, splits the balance (minus a fixed fee)
//! across destination addresses in fixed proportions with one atomic
//! sendmany. Intended to be invoked periodically, e.g. from cron.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod node;
pub mod rules;

// Re-export commonly used types
pub use config::ConfigStore;
pub use error::{Error, Result};
