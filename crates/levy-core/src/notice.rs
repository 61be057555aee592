//! Database-originated `calculatetax` notifications.
//!
//! Payload format: `<orderType>,<orderId>[,<record>]`, for example `SO,1042`
//! or `INV,77,t`.

use serde::{Deserialize, Serialize};

use crate::config::parse_flag;
use crate::error::ValidationError;
use crate::order::{OrderReference, OrderType};

/// Notification channel name.
pub const CALCULATE_TAX_CHANNEL: &str = "calculatetax";

/// A request from the database to (re)calculate tax for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculateTaxNotice {
    /// Order type tag.
    pub order_type: OrderType,
    /// Order id.
    pub order_id: i64,
    /// Record the transaction with the service, not just quote it.
    pub record: bool,
}

impl CalculateTaxNotice {
    /// The order this notice refers to.
    pub fn order(&self) -> OrderReference {
        OrderReference::new(self.order_type.clone(), self.order_id)
    }
}

impl std::str::FromStr for CalculateTaxNotice {
    type Err = ValidationError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ValidationError::MalformedNotice {
            payload: payload.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = payload.split(',').map(str::trim);
        let order_type = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| malformed("missing order type"))?;
        let order_type = OrderType::new(order_type).map_err(|e| malformed(&e.to_string()))?;
        let order_id = parts
            .next()
            .ok_or_else(|| malformed("missing order id"))?
            .parse::<i64>()
            .map_err(|e| malformed(&format!("order id: {e}")))?;
        let record = parse_flag(parts.next());
        if parts.next().is_some() {
            return Err(malformed("too many fields"));
        }

        Ok(Self {
            order_type,
            order_id,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_field_payload() {
        let n: CalculateTaxNotice = "SO,1042".parse().unwrap();
        assert_eq!(n.order_type.as_str(), "SO");
        assert_eq!(n.order_id, 1042);
        assert!(!n.record);
    }

    #[test]
    fn parses_record_flag() {
        let n: CalculateTaxNotice = "INV, 77, t".parse().unwrap();
        assert_eq!(n.order_id, 77);
        assert!(n.record);
        let n: CalculateTaxNotice = "INV,77,false".parse().unwrap();
        assert!(!n.record);
    }

    #[test]
    fn rejects_malformed_payloads() {
        for bad in ["", "SO", "SO,", "SO,abc", ",12", "S-O,1", "SO,1,t,extra"] {
            assert!(
                bad.parse::<CalculateTaxNotice>().is_err(),
                "payload {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn order_reference_from_notice() {
        let n: CalculateTaxNotice = "CM,42".parse().unwrap();
        let order = n.order();
        assert_eq!(order.order_id, 42);
        assert_eq!(order.order_type.unwrap().as_str(), "CM");
    }

    proptest::proptest! {
        #[test]
        fn well_formed_payloads_parse(tag in "[A-Z]{1,8}", id in 0i64..1_000_000, record: bool) {
            let payload = format!("{tag},{id},{}", if record { "t" } else { "f" });
            let notice: CalculateTaxNotice = payload.parse().unwrap();
            proptest::prop_assert_eq!(notice.order_type.as_str(), tag.as_str());
            proptest::prop_assert_eq!(notice.order_id, id);
            proptest::prop_assert_eq!(notice.record, record);
        }
    }
}
