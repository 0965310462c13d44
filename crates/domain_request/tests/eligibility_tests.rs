//! Eligibility Rules Tests
//!
//! Covers the full limit table, the inclusive boundary for every entry and
//! the rejection message contents.

use domain_request::{EligibilityRules, ProductCategory, RiskClassification};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ProductCategory::*;
use RiskClassification::*;

const TABLE: [(RiskClassification, [Decimal; 5]); 4] = [
    (Regular, [dec!(500000.00), dec!(350000.00), dec!(500000.00), dec!(255000.00), dec!(255000.00)]),
    (HighRisk, [dec!(125000.00), dec!(250000.00), dec!(150000.00), dec!(125000.00), dec!(125000.00)]),
    (Preferred, [dec!(800000.00), dec!(450000.00), dec!(450000.00), dec!(375000.00), dec!(375000.00)]),
    (NoInformation, [dec!(200000.00), dec!(75000.00), dec!(200000.00), dec!(55000.00), dec!(55000.00)]),
];

const CATEGORIES: [ProductCategory; 5] = [Life, Auto, Home, Business, Other];

// ============================================================================
// LIMIT TABLE
// ============================================================================

#[test]
fn test_limits_match_table() {
    let rules = EligibilityRules::new();
    for (classification, limits) in TABLE {
        for (category, limit) in CATEGORIES.into_iter().zip(limits) {
            assert_eq!(rules.limit(classification, category), limit, "{} / {}", classification, category);
        }
    }
}

#[test]
fn test_boundary_inclusive_for_all_twenty_entries() {
    let rules = EligibilityRules::new();
    let mut checked = 0;
    for (classification, limits) in TABLE {
        for (category, limit) in CATEGORIES.into_iter().zip(limits) {
            assert!(rules.is_eligible(classification, category, limit));
            assert!(!rules.is_eligible(classification, category, limit + dec!(0.01)));
            checked += 1;
        }
    }
    assert_eq!(checked, 20);
}

// ============================================================================
// REJECTION REASON
// ============================================================================

#[test]
fn test_rejection_reason_embeds_amount_limit_and_labels() {
    let rules = EligibilityRules::new();
    let reason = rules.rejection_reason(HighRisk, Auto, dec!(250000.01));

    assert!(reason.contains("250000.01"));
    assert!(reason.contains("250000.00"));
    assert!(reason.contains("High Risk"));
    assert!(reason.contains("Auto"));
}

#[test]
fn test_rejection_reason_formats_limit_with_two_decimals() {
    let rules = EligibilityRules::new();
    let reason = rules.rejection_reason(NoInformation, Business, dec!(60000));
    assert!(reason.contains("55000.00"));
    assert!(reason.contains("No Information"));
}

#[test]
fn test_evaluate_matches_is_eligible() {
    let rules = EligibilityRules::new();
    let decision = rules.evaluate(Preferred, Life, dec!(800000.00));
    assert!(decision.eligible);
    assert_eq!(decision.limit, dec!(800000.00));
    assert!(decision.reason.is_none());
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn classification_strategy() -> impl Strategy<Value = RiskClassification> {
    prop::sample::select(RiskClassification::ALL.to_vec())
}

fn category_strategy() -> impl Strategy<Value = ProductCategory> {
    prop::sample::select(ProductCategory::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_eligibility_is_amount_at_most_limit(
        classification in classification_strategy(),
        category in category_strategy(),
        cents in 1i64..100_000_000_00i64,
    ) {
        let rules = EligibilityRules::new();
        let amount = Decimal::new(cents, 2);
        let limit = rules.limit(classification, category);
        prop_assert_eq!(rules.is_eligible(classification, category, amount), amount <= limit);
        prop_assert_eq!(rules.evaluate(classification, category, amount).reason.is_some(), amount > limit);
    }
}
