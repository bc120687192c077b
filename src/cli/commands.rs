//! CLI command implementations
//!
//! Thin dispatch from verbs to the store, model and engine. Mutating
//! commands save the whole document on success and never on failure.

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::info;

use crate::config::ConfigStore;
use crate::engine::{self, ExecutionOutcome};
use crate::node::{BitcoindClient, NodeRpc};
use crate::rules::{parse_destination, SplitCandidate};

/// Create a split rule and persist it
pub async fn create(
    store: &mut ConfigStore,
    address: &str,
    destinations: &[String],
    fee: Decimal,
    minimum: Decimal,
) -> Result<()> {
    let node = BitcoindClient::new(&store.doc.bitcoind)?;

    let destinations = destinations
        .iter()
        .map(|arg| parse_destination(arg))
        .collect::<crate::error::Result<Vec<_>>>()?;

    let candidate = SplitCandidate {
        source: address.to_string(),
        destinations,
        fee,
        minimum,
    };
    let params = candidate.validate(&node, &store.doc.rules).await?;

    // Label the address as its own account so getbalance/sendmany can
    // address it by name during execution.
    node.set_account(address, address).await?;

    store.doc.rules.insert(address.to_string(), params);
    store.save().await?;

    info!("Created rule for {}", address);
    Ok(())
}

/// Execute all rules, or only the given addresses
pub async fn execute(store: &ConfigStore, addresses: &[String]) -> Result<()> {
    let node = BitcoindClient::new(&store.doc.bitcoind)?;
    let outcomes = engine::run_all(&store.doc.rules, addresses, &node).await;

    for outcome in &outcomes {
        match outcome {
            ExecutionOutcome::Skipped {
                address,
                balance,
                minimum,
            } => println!(
                "{}: SKIPPED: balance {} below execution balance {}",
                address, balance, minimum
            ),
            ExecutionOutcome::Executed {
                address,
                total,
                payouts,
                txid,
            } => {
                println!("{}: EXECUTED: split {} across {} destinations (txid {})",
                    address, total, payouts.len(), txid);
                for (dest, amount) in payouts {
                    println!("  {} -> {}", dest, amount);
                }
            }
            ExecutionOutcome::NoRule { address } => println!(
                "WARNING: No rule defined to send from address {} (skipping)",
                address
            ),
            ExecutionOutcome::Failed { address, error } => {
                println!("{}: FAILED: {}", address, error)
            }
        }
    }

    Ok(())
}

/// Print a one-line description of every configured rule
pub fn list(store: &ConfigStore) -> Result<()> {
    for (address, params) in &store.doc.rules {
        println!("{}", params.describe(address)?);
    }
    Ok(())
}

/// Delete a rule and persist the removal
pub async fn delete(store: &mut ConfigStore, address: &str) -> Result<()> {
    if store.doc.rules.remove(address).is_none() {
        return Err(crate::error::Error::NoSuchRule(address.to_string()).into());
    }
    store.save().await?;

    info!("Deleted rule for {}", address);
    Ok(())
}

/// Print a connection parameter
pub fn get_param(store: &ConfigStore, name: &str) -> Result<()> {
    println!("{}", store.get_param(name)?);
    Ok(())
}

/// Set a connection parameter and persist it
pub async fn set_param(store: &mut ConfigStore, name: &str, value: &str) -> Result<()> {
    store.set_param(name, value)?;
    store.save().await?;
    Ok(())
}
