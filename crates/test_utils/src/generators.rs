//! Property-Based Test Generators
//!
//! Proptest strategies for policy request data. Generated payloads always
//! pass intake validation.

use std::collections::BTreeMap;

use core_kernel::CustomerId;
use domain_request::{NewPolicyRequest, ProductCategory, RequestStatus, RiskClassification};
use proptest::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

pub fn category_strategy() -> impl Strategy<Value = ProductCategory> {
    prop::sample::select(ProductCategory::ALL.to_vec())
}

pub fn classification_strategy() -> impl Strategy<Value = RiskClassification> {
    prop::sample::select(RiskClassification::ALL.to_vec())
}

pub fn status_strategy() -> impl Strategy<Value = RequestStatus> {
    prop::sample::select(RequestStatus::ALL.to_vec())
}

/// Amounts with two decimal places between 0.01 and `max_cents / 100`
pub fn money_strategy(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (1i64..=max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

/// Insured amounts spanning the whole eligibility table and beyond
pub fn insured_amount_strategy() -> impl Strategy<Value = Decimal> {
    money_strategy(100_000_000)
}

pub fn customer_id_strategy() -> impl Strategy<Value = CustomerId> {
    any::<u128>().prop_map(|n| CustomerId::from_uuid(Uuid::from_u128(n)))
}

/// A valid intake payload with coverages summing to at most the insured amount
pub fn new_request_strategy() -> impl Strategy<Value = NewPolicyRequest> {
    (
        customer_id_strategy(),
        category_strategy(),
        money_strategy(1_000_000),
        insured_amount_strategy(),
        1u32..=4,
    )
        .prop_map(|(customer_id, category, premium, insured, coverage_count)| {
            let share = (insured / Decimal::from(coverage_count))
                .round_dp_with_strategy(2, RoundingStrategy::ToZero);
            let coverages: BTreeMap<String, Decimal> = if share.is_zero() {
                BTreeMap::from([("Basic".to_string(), insured)])
            } else {
                (1..=coverage_count)
                    .map(|n| (format!("Coverage {}", n), share))
                    .collect()
            };

            NewPolicyRequest {
                customer_id,
                product_id: "generated-product".to_string(),
                category,
                sales_channel: "WEB".to_string(),
                payment_method: "BANK_SLIP".to_string(),
                total_monthly_premium_amount: premium,
                insured_amount: insured,
                coverages,
                assistances: Vec::new(),
            }
        })
}
