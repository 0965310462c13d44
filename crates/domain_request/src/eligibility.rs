//! Eligibility rules
//!
//! Maximum insured amount per (risk classification, product category).
//! The boundary is inclusive: an amount equal to the limit is eligible.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::category::ProductCategory;
use crate::classification::RiskClassification;

/// Outcome of an eligibility evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub limit: Decimal,
    /// Audit note when not eligible
    pub reason: Option<String>,
}

/// Fixed limit table for insured amounts
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityRules;

impl EligibilityRules {
    pub fn new() -> Self {
        Self
    }

    /// Maximum insured amount for the pair
    pub fn limit(&self, classification: RiskClassification, category: ProductCategory) -> Decimal {
        use ProductCategory::*;
        use RiskClassification::*;
        match (classification, category) {
            (Regular, Life | Home) => dec!(500000.00),
            (Regular, Auto) => dec!(350000.00),
            (Regular, Business | Other) => dec!(255000.00),

            (HighRisk, Auto) => dec!(250000.00),
            (HighRisk, Home) => dec!(150000.00),
            (HighRisk, Life | Business | Other) => dec!(125000.00),

            (Preferred, Life) => dec!(800000.00),
            (Preferred, Auto | Home) => dec!(450000.00),
            (Preferred, Business | Other) => dec!(375000.00),

            (NoInformation, Life | Home) => dec!(200000.00),
            (NoInformation, Auto) => dec!(75000.00),
            (NoInformation, Business | Other) => dec!(55000.00),
        }
    }

    /// `amount <= limit`
    pub fn is_eligible(
        &self,
        classification: RiskClassification,
        category: ProductCategory,
        amount: Decimal,
    ) -> bool {
        amount <= self.limit(classification, category)
    }

    /// Audit message embedding the amount, the limit and both labels
    pub fn rejection_reason(
        &self,
        classification: RiskClassification,
        category: ProductCategory,
        amount: Decimal,
    ) -> String {
        format!(
            "Insured amount of {} exceeds the limit of {:.2} for a {} customer on {} insurance",
            amount,
            self.limit(classification, category),
            classification.label(),
            category.label(),
        )
    }

    pub fn evaluate(
        &self,
        classification: RiskClassification,
        category: ProductCategory,
        amount: Decimal,
    ) -> EligibilityDecision {
        let limit = self.limit(classification, category);
        let eligible = amount <= limit;
        EligibilityDecision {
            eligible,
            limit,
            reason: (!eligible).then(|| self.rejection_reason(classification, category, amount)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_two_decimal_places() {
        let rules = EligibilityRules::new();
        for classification in RiskClassification::ALL {
            for category in ProductCategory::ALL {
                assert_eq!(rules.limit(classification, category).scale(), 2);
            }
        }
    }

    #[test]
    fn test_evaluate_sets_reason_only_when_rejected() {
        let rules = EligibilityRules::new();
        let accepted = rules.evaluate(RiskClassification::Regular, ProductCategory::Auto, dec!(1000.00));
        assert!(accepted.eligible);
        assert!(accepted.reason.is_none());

        let rejected = rules.evaluate(RiskClassification::NoInformation, ProductCategory::Business, dec!(55000.01));
        assert!(!rejected.eligible);
        assert_eq!(rejected.limit, dec!(55000.00));
        assert!(rejected.reason.is_some());
    }
}
