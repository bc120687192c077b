//! Rule model - disbursement policies and their validation
//!
//! A rule is keyed by the source address it watches. The stored shape keeps
//! the rule kind as its string tag so a config holding an unsupported kind
//! still loads; the tag is resolved to [`RuleKind`] only when an operation
//! needs the variant's behavior, and from there dispatch is an exhaustive
//! match.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::NodeRpc;

/// Implemented rule kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Proportional payout of (balance - fee) to fixed destinations
    Split,
}

impl RuleKind {
    /// Resolve a stored tag. Unknown tags fail here, not at config parse
    /// time, so they only surface when the rule is actually used.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "split" => Ok(RuleKind::Split),
            other => Err(Error::UnknownRuleKind(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RuleKind::Split => "split",
        }
    }
}

/// Persisted parameters of one rule
///
/// Decimal fields go to disk as JSON numbers with arbitrary precision,
/// not strings and not binary floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleParams {
    /// Rule kind tag ("split")
    pub action: String,
    /// Balance threshold below which execution is a no-op
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub minimum: Decimal,
    /// Fixed fee withheld from the distributed amount
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub fee: Decimal,
    /// Ordered (address, proportion) pairs; proportions sum to 1
    #[serde(with = "destination_pairs")]
    pub destinations: Vec<(String, Decimal)>,
}

/// Serde helper keeping destination proportions as JSON numbers inside
/// the `[[address, proportion], ...]` pairs.
mod destination_pairs {
    use rust_decimal::Decimal;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Pair(
        String,
        #[serde(with = "rust_decimal::serde::arbitrary_precision")] Decimal,
    );

    pub fn serialize<S: Serializer>(
        pairs: &[(String, Decimal)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
        for (address, proportion) in pairs {
            seq.serialize_element(&Pair(address.clone(), *proportion))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, Decimal)>, D::Error> {
        let pairs = Vec::<Pair>::deserialize(deserializer)?;
        Ok(pairs.into_iter().map(|Pair(a, p)| (a, p)).collect())
    }
}

impl RuleParams {
    pub fn kind(&self) -> Result<RuleKind> {
        RuleKind::from_tag(&self.action)
    }

    /// Human-readable one-line description:
    /// `split <source> <dest1>:<prop1> <dest2>:<prop2> ...`
    pub fn describe(&self, source: &str) -> Result<String> {
        let kind = self.kind()?;
        let mut line = format!("{} {}", kind.tag(), source);
        for (addr, prop) in &self.destinations {
            line.push_str(&format!(" {}:{}", addr, prop));
        }
        Ok(line)
    }
}

/// A split rule as entered by the user, before validation
#[derive(Debug, Clone)]
pub struct SplitCandidate {
    pub source: String,
    pub destinations: Vec<(String, Decimal)>,
    pub fee: Decimal,
    pub minimum: Decimal,
}

impl SplitCandidate {
    /// Check every creation-time invariant and produce the persisted shape.
    ///
    /// Checks run in a fixed, documented order and the first violation is
    /// returned: duplicate rule, source validity and ownership, destination
    /// validity and proportion range, non-negative fee, minimum above fee,
    /// proportions summing to exactly 1. Nothing is mutated on failure; the
    /// caller registers the account and persists on success.
    pub async fn validate(
        self,
        node: &dyn NodeRpc,
        existing: &BTreeMap<String, RuleParams>,
    ) -> Result<RuleParams> {
        if existing.contains_key(&self.source) {
            return Err(Error::DuplicateRule(self.source));
        }

        let info = node.validate_address(&self.source).await?;
        if !info.is_valid {
            return Err(Error::InvalidAddress(self.source));
        }
        if !info.is_mine {
            return Err(Error::AddressNotMine(self.source));
        }

        for (address, proportion) in &self.destinations {
            if !node.validate_address(address).await?.is_valid {
                return Err(Error::InvalidAddress(address.clone()));
            }
            if *proportion < Decimal::ZERO || *proportion > Decimal::ONE {
                return Err(Error::InvalidProportion {
                    address: address.clone(),
                    proportion: *proportion,
                });
            }
        }

        if self.fee < Decimal::ZERO {
            return Err(Error::NegativeFee);
        }
        if self.minimum <= self.fee {
            return Err(Error::MinimumNotAboveFee {
                minimum: self.minimum,
                fee: self.fee,
            });
        }

        let sum: Decimal = self.destinations.iter().map(|(_, p)| *p).sum();
        if sum != Decimal::ONE {
            return Err(Error::ProportionSum(sum));
        }

        Ok(RuleParams {
            action: RuleKind::Split.tag().to_string(),
            minimum: self.minimum,
            fee: self.fee,
            destinations: self.destinations,
        })
    }
}

/// Parse a `ADDRESS:PROPORTION` destination argument
pub fn parse_destination(arg: &str) -> Result<(String, Decimal)> {
    let (address, proportion) = arg
        .split_once(':')
        .ok_or_else(|| Error::InvalidDestination(arg.to_string()))?;
    let proportion = proportion
        .parse()
        .map_err(|_| Error::InvalidDestination(arg.to_string()))?;
    Ok((address.to_string(), proportion))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::node::mock::MockNode;

    fn candidate(dests: Vec<(&str, Decimal)>) -> SplitCandidate {
        SplitCandidate {
            source: "msource".to_string(),
            destinations: dests
                .into_iter()
                .map(|(a, p)| (a.to_string(), p))
                .collect(),
            fee: dec!(0.0001),
            minimum: dec!(0.1),
        }
    }

    fn node() -> MockNode {
        let mut node = MockNode::with_wallet(&["msource"]);
        node.add_valid("mdest1");
        node.add_valid("mdest2");
        node
    }

    #[tokio::test]
    async fn test_valid_split() {
        let params = candidate(vec![("mdest1", dec!(0.6)), ("mdest2", dec!(0.4))])
            .validate(&node(), &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(params.action, "split");
        assert_eq!(params.destinations.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_rule_rejected_first() {
        let mut existing = BTreeMap::new();
        existing.insert(
            "msource".to_string(),
            RuleParams {
                action: "split".to_string(),
                minimum: dec!(1),
                fee: dec!(0.01),
                destinations: vec![("mdest1".to_string(), dec!(1))],
            },
        );

        // Even an otherwise-invalid candidate reports the duplicate first
        let err = candidate(vec![("bogus", dec!(2))])
            .validate(&node(), &existing)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRule(_)));

        // The stored rule is untouched by the failed attempt
        assert_eq!(existing["msource"].minimum, dec!(1));
    }

    #[tokio::test]
    async fn test_source_must_be_wallet_owned() {
        let mut node = MockNode::default();
        node.add_valid("msource");
        node.add_valid("mdest1");

        let err = candidate(vec![("mdest1", dec!(1))])
            .validate(&node, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AddressNotMine(_)));
    }

    #[tokio::test]
    async fn test_invalid_destination_address() {
        let err = candidate(vec![("mbogus", dec!(1))])
            .validate(&node(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(a) if a == "mbogus"));
    }

    #[tokio::test]
    async fn test_proportion_out_of_range() {
        let err = candidate(vec![("mdest1", dec!(1.5))])
            .validate(&node(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProportion { .. }));
    }

    #[tokio::test]
    async fn test_proportions_must_sum_to_one() {
        let err = candidate(vec![("mdest1", dec!(0.5)), ("mdest2", dec!(0.49))])
            .validate(&node(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProportionSum(s) if s == dec!(0.99)));
    }

    #[tokio::test]
    async fn test_negative_fee() {
        let mut c = candidate(vec![("mdest1", dec!(1))]);
        c.fee = dec!(-0.01);
        let err = c.validate(&node(), &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::NegativeFee));
    }

    #[tokio::test]
    async fn test_minimum_must_exceed_fee() {
        let mut c = candidate(vec![("mdest1", dec!(1))]);
        c.minimum = dec!(0.0001);
        let err = c.validate(&node(), &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::MinimumNotAboveFee { .. }));
    }

    #[test]
    fn test_describe() {
        let params = RuleParams {
            action: "split".to_string(),
            minimum: dec!(0.1),
            fee: dec!(0.0001),
            destinations: vec![
                ("mdest1".to_string(), dec!(0.6)),
                ("mdest2".to_string(), dec!(0.4)),
            ],
        };
        assert_eq!(
            params.describe("msource").unwrap(),
            "split msource mdest1:0.6 mdest2:0.4"
        );
    }

    #[test]
    fn test_describe_without_destinations_has_no_trailing_space() {
        let params = RuleParams {
            action: "split".to_string(),
            minimum: dec!(0.1),
            fee: dec!(0.0001),
            destinations: vec![],
        };
        assert_eq!(params.describe("msource").unwrap(), "split msource");
    }

    #[test]
    fn test_params_serialize_decimals_as_numbers() {
        // bitcoind-shaped documents carry numeric decimals, never strings
        let params = RuleParams {
            action: "split".to_string(),
            minimum: dec!(0.1),
            fee: dec!(0.0001),
            destinations: vec![("mdest1".to_string(), dec!(0.6))],
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains(r#""minimum":0.1"#), "got {}", json);
        assert!(json.contains(r#""fee":0.0001"#), "got {}", json);
        assert!(json.contains(r#"["mdest1",0.6]"#), "got {}", json);

        let back: RuleParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.minimum, dec!(0.1));
        assert_eq!(back.destinations[0].1, dec!(0.6));
    }

    #[test]
    fn test_unknown_kind_surfaces_at_lookup() {
        // The document still loads; the tag only fails when used
        let params: RuleParams = serde_json::from_str(
            r#"{"action": "sweep", "minimum": 1, "fee": 0.1, "destinations": []}"#,
        )
        .unwrap();
        let err = params.kind().unwrap_err();
        assert!(matches!(err, Error::UnknownRuleKind(k) if k == "sweep"));
        assert!(params.describe("msource").is_err());
    }

    #[test]
    fn test_parse_destination() {
        let (addr, prop) = parse_destination("mdest1:0.25").unwrap();
        assert_eq!(addr, "mdest1");
        assert_eq!(prop, dec!(0.25));

        assert!(parse_destination("mdest1").is_err());
        assert!(parse_destination("mdest1:lots").is_err());
    }
}
