//! Pre-built Test Fixtures
//!
//! Ready-to-use values for policy request tests. They are consistent and
//! predictable; reach for [`crate::builders`] when a test needs variation.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{CustomerId, RequestId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for monetary amounts
pub struct AmountFixtures;

impl AmountFixtures {
    /// Monthly premium used by default requests
    pub fn monthly_premium() -> Decimal {
        dec!(75.25)
    }

    /// Insured amount eligible for every classification and category
    pub fn eligible_insured_amount() -> Decimal {
        dec!(50000.00)
    }

    /// Above every limit in the eligibility table
    pub fn oversized_insured_amount() -> Decimal {
        dec!(1000000.00)
    }

    /// Auto coverage split that fits inside the eligible insured amount
    pub fn auto_coverages() -> BTreeMap<String, Decimal> {
        BTreeMap::from([
            ("Collision".to_string(), dec!(30000.00)),
            ("Theft".to_string(), dec!(15000.00)),
        ])
    }
}

/// Fixture for free-text request attributes
pub struct StringFixtures;

impl StringFixtures {
    pub fn product_id() -> &'static str {
        "1b2da7cc-b367-4196-8a78-9cfeec21f587"
    }

    pub fn sales_channel() -> &'static str {
        "MOBILE"
    }

    pub fn payment_method() -> &'static str {
        "CREDIT_CARD"
    }

    pub fn assistances() -> Vec<String> {
        vec!["Towing up to 250km".to_string(), "Glass replacement".to_string()]
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    /// A stable request ID for deterministic tests
    pub fn stable_request_id() -> RequestId {
        RequestId::from_uuid(Uuid::from_u128(0x0192_0000_0000_7000_8000_0000_0000_0001))
    }

    /// A stable customer ID for deterministic tests
    pub fn stable_customer_id() -> CustomerId {
        CustomerId::from_uuid(Uuid::from_u128(0x0192_0000_0000_7000_8000_0000_0000_0002))
    }

    pub fn customer_id() -> CustomerId {
        CustomerId::new()
    }
}

/// Fixture for timestamps
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// A fixed instant for event payloads
    pub fn reference_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverages_fit_inside_insured_amount() {
        let total: Decimal = AmountFixtures::auto_coverages().values().copied().sum();
        assert!(total <= AmountFixtures::eligible_insured_amount());
    }

    #[test]
    fn test_stable_ids_are_stable() {
        assert_eq!(IdFixtures::stable_request_id(), IdFixtures::stable_request_id());
        assert_eq!(IdFixtures::stable_customer_id(), IdFixtures::stable_customer_id());
    }
}
