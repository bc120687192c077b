//! Rule engine - trigger evaluation and payout execution
//!
//! The only component with runtime decision logic. Every invocation
//! re-evaluates the trigger against the live balance; nothing is persisted
//! between runs, so re-invoking immediately after a payout just observes
//! the smaller balance and skips (or re-triggers) accordingly.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};

use crate::error::Result;
use crate::node::NodeRpc;
use crate::rules::{RuleKind, RuleParams};

/// The node's native amount precision (fractional digits)
const AMOUNT_DP: u32 = 8;

/// What happened to one rule during an execution pass
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Balance below the trigger threshold; no node mutation occurred
    Skipped {
        address: String,
        balance: Decimal,
        minimum: Decimal,
    },
    /// Payout sent in one sendmany transaction
    Executed {
        address: String,
        total: Decimal,
        payouts: Vec<(String, Decimal)>,
        txid: String,
    },
    /// An explicitly requested address has no rule (filtered runs only)
    NoRule { address: String },
    /// Node or validation failure for this address; the batch continues
    Failed { address: String, error: String },
}

/// Execute one rule against live node state.
///
/// The source address must already be registered as an account on the node,
/// which rule creation takes care of.
pub async fn execute_rule(
    address: &str,
    params: &RuleParams,
    node: &dyn NodeRpc,
) -> Result<ExecutionOutcome> {
    match params.kind()? {
        RuleKind::Split => execute_split(address, params, node).await,
    }
}

async fn execute_split(
    address: &str,
    params: &RuleParams,
    node: &dyn NodeRpc,
) -> Result<ExecutionOutcome> {
    let balance = node.get_balance(address).await?;

    if balance < params.minimum {
        info!(
            "{}: skipping: balance {} below execution balance {}",
            address, balance, params.minimum
        );
        return Ok(ExecutionOutcome::Skipped {
            address: address.to_string(),
            balance,
            minimum: params.minimum,
        });
    }

    let distributable = balance - params.fee;
    let payouts = split_amounts(distributable, &params.destinations);

    let amounts: BTreeMap<String, Decimal> = payouts.iter().cloned().collect();
    let txid = node.send_many(address, &amounts).await?;

    info!("{}: executing: splitting {} (txid {})", address, distributable, txid);
    Ok(ExecutionOutcome::Executed {
        address: address.to_string(),
        total: distributable,
        payouts,
        txid,
    })
}

/// Divide `distributable` per the fixed proportions.
///
/// Each share is truncated to the node's amount precision; the residual the
/// truncation leaves is assigned to the last destination, so the payouts
/// always sum to exactly `distributable`.
fn split_amounts(distributable: Decimal, destinations: &[(String, Decimal)]) -> Vec<(String, Decimal)> {
    let mut payouts = Vec::with_capacity(destinations.len());
    let mut allocated = Decimal::ZERO;

    for (i, (address, proportion)) in destinations.iter().enumerate() {
        let amount = if i + 1 == destinations.len() {
            distributable - allocated
        } else {
            (*proportion * distributable)
                .round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToZero)
        };
        allocated += amount;
        payouts.push((address.clone(), amount.normalize()));
    }

    payouts
}

/// Execute every configured rule, or only the filtered addresses.
///
/// Best-effort: one address's failure never aborts the rest, since no
/// rule's execution depends on another's. Each rule runs against its own
/// copy of the stored parameters.
pub async fn run_all(
    rules: &BTreeMap<String, RuleParams>,
    filter: &[String],
    node: &dyn NodeRpc,
) -> Vec<ExecutionOutcome> {
    let addresses: Vec<String> = if filter.is_empty() {
        rules.keys().cloned().collect()
    } else {
        filter.to_vec()
    };

    let mut outcomes = Vec::with_capacity(addresses.len());
    for address in addresses {
        let Some(params) = rules.get(&address).cloned() else {
            warn!("No rule defined to send from address {} (skipping)", address);
            outcomes.push(ExecutionOutcome::NoRule { address });
            continue;
        };

        match execute_rule(&address, &params, node).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!("{}: execution failed: {}", address, e);
                outcomes.push(ExecutionOutcome::Failed {
                    address,
                    error: e.to_string(),
                });
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::node::mock::MockNode;

    fn split_rule(dests: Vec<(&str, Decimal)>) -> RuleParams {
        RuleParams {
            action: "split".to_string(),
            minimum: dec!(0.2),
            fee: dec!(0.1),
            destinations: dests
                .into_iter()
                .map(|(a, p)| (a.to_string(), p))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_skips_below_threshold() {
        let mut node = MockNode::default();
        node.set_balance("msource", dec!(0.05));

        let params = split_rule(vec![("mdest1", dec!(1))]);
        let outcome = execute_rule("msource", &params, &node).await.unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::Skipped { balance, minimum, .. }
                if balance == dec!(0.05) && minimum == dec!(0.2)
        ));
        assert_eq!(node.send_count(), 0);
    }

    #[tokio::test]
    async fn test_split_amounts_and_single_send() {
        let mut node = MockNode::default();
        node.set_balance("msource", dec!(10));

        let params = split_rule(vec![("mdest1", dec!(0.6)), ("mdest2", dec!(0.4))]);
        let outcome = execute_rule("msource", &params, &node).await.unwrap();

        let ExecutionOutcome::Executed { total, payouts, .. } = outcome else {
            panic!("expected Executed");
        };
        assert_eq!(total, dec!(9.9));
        assert_eq!(payouts[0], ("mdest1".to_string(), dec!(5.94)));
        assert_eq!(payouts[1], ("mdest2".to_string(), dec!(3.96)));

        let sends = node.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        let (from, amounts) = &sends[0];
        assert_eq!(from, "msource");
        assert_eq!(amounts["mdest1"], dec!(5.94));
        assert_eq!(amounts["mdest2"], dec!(3.96));
    }

    #[test]
    fn test_rounding_residual_goes_to_last_destination() {
        let third = dec!(1) / dec!(3);
        let dests = vec![
            ("a".to_string(), third),
            ("b".to_string(), third),
            ("c".to_string(), third),
        ];
        let payouts = split_amounts(dec!(1), &dests);

        assert_eq!(payouts[0].1, dec!(0.33333333));
        assert_eq!(payouts[1].1, dec!(0.33333333));
        assert_eq!(payouts[2].1, dec!(0.33333334));

        let sum: Decimal = payouts.iter().map(|(_, a)| *a).sum();
        assert_eq!(sum, dec!(1));
    }

    #[tokio::test]
    async fn test_filtered_run_warns_on_missing_rule() {
        let mut node = MockNode::default();
        node.set_balance("msource", dec!(10));

        let mut rules = BTreeMap::new();
        rules.insert("msource".to_string(), split_rule(vec![("mdest1", dec!(1))]));

        let filter = vec!["munknown".to_string(), "msource".to_string()];
        let outcomes = run_all(&rules, &filter, &node).await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], ExecutionOutcome::NoRule { address } if address == "munknown"));
        assert!(matches!(&outcomes[1], ExecutionOutcome::Executed { .. }));
        assert_eq!(node.send_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_continues_past_node_failure() {
        let mut node = MockNode::default();
        node.unreachable.insert("mbroken".to_string());
        node.set_balance("msource", dec!(10));

        let mut rules = BTreeMap::new();
        rules.insert("mbroken".to_string(), split_rule(vec![("mdest1", dec!(1))]));
        rules.insert("msource".to_string(), split_rule(vec![("mdest1", dec!(1))]));

        let outcomes = run_all(&rules, &[], &node).await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], ExecutionOutcome::Failed { address, .. } if address == "mbroken"));
        assert!(matches!(&outcomes[1], ExecutionOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_that_rule_only() {
        let mut node = MockNode::default();
        node.set_balance("msource", dec!(10));

        let mut rules = BTreeMap::new();
        rules.insert(
            "modd".to_string(),
            RuleParams {
                action: "sweep".to_string(),
                minimum: dec!(1),
                fee: dec!(0.1),
                destinations: vec![],
            },
        );
        rules.insert("msource".to_string(), split_rule(vec![("mdest1", dec!(1))]));

        let outcomes = run_all(&rules, &[], &node).await;
        assert!(matches!(&outcomes[0], ExecutionOutcome::Failed { .. }));
        assert!(matches!(&outcomes[1], ExecutionOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_exact_threshold_triggers() {
        let mut node = MockNode::default();
        node.set_balance("msource", dec!(0.2));

        let params = split_rule(vec![("mdest1", dec!(1))]);
        let outcome = execute_rule("msource", &params, &node).await.unwrap();

        // balance == minimum executes; distributable is balance - fee
        let ExecutionOutcome::Executed { total, payouts, .. } = outcome else {
            panic!("expected Executed");
        };
        assert_eq!(total, dec!(0.1));
        assert_eq!(payouts[0].1, dec!(0.1));
    }
}
