//! Test Data Builders
//!
//! Builder for policy requests with sensible defaults. Tests set only the
//! fields they care about; [`TestRequestBuilder::random`] fills the rest
//! with fake data.

use std::collections::BTreeMap;

use core_kernel::CustomerId;
use domain_request::{
    EligibilityRules, NewPolicyRequest, PolicyRequest, ProductCategory, RequestStatus,
    RiskClassification,
};
use fake::faker::lorem::en::Word;
use fake::Fake;
use rust_decimal::Decimal;

use crate::fixtures::{AmountFixtures, IdFixtures, StringFixtures};

/// Builder for constructing policy requests
#[derive(Debug, Clone)]
pub struct TestRequestBuilder {
    customer_id: CustomerId,
    product_id: String,
    category: ProductCategory,
    sales_channel: String,
    payment_method: String,
    premium: Decimal,
    insured_amount: Decimal,
    coverages: BTreeMap<String, Decimal>,
    assistances: Vec<String>,
    classification: RiskClassification,
}

impl Default for TestRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRequestBuilder {
    /// Creates a new builder with default values
    ///
    /// The defaults are eligible under every classification.
    pub fn new() -> Self {
        Self {
            customer_id: IdFixtures::customer_id(),
            product_id: StringFixtures::product_id().to_string(),
            category: ProductCategory::Auto,
            sales_channel: StringFixtures::sales_channel().to_string(),
            payment_method: StringFixtures::payment_method().to_string(),
            premium: AmountFixtures::monthly_premium(),
            insured_amount: AmountFixtures::eligible_insured_amount(),
            coverages: AmountFixtures::auto_coverages(),
            assistances: StringFixtures::assistances(),
            classification: RiskClassification::Regular,
        }
    }

    /// Creates a builder with fake product data and amounts
    ///
    /// Amounts stay below the smallest limit in the eligibility table.
    pub fn random() -> Self {
        let insured_units: i64 = (1_000i64..55_000).fake();
        let insured_amount = Decimal::new(insured_units * 100, 2);
        let coverage_name: String = Word().fake();
        let product: String = Word().fake();
        let premium_cents: i64 = (1_000i64..50_000).fake();

        Self::new()
            .with_product_id(format!("{}-{}", product, insured_units))
            .with_premium(Decimal::new(premium_cents, 2))
            .with_insured_amount(insured_amount)
            .with_coverages(BTreeMap::from([(coverage_name, insured_amount)]))
    }

    pub fn with_customer_id(mut self, id: CustomerId) -> Self {
        self.customer_id = id;
        self
    }

    pub fn with_product_id(mut self, id: impl Into<String>) -> Self {
        self.product_id = id.into();
        self
    }

    pub fn with_category(mut self, category: ProductCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_sales_channel(mut self, channel: impl Into<String>) -> Self {
        self.sales_channel = channel.into();
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn with_premium(mut self, premium: Decimal) -> Self {
        self.premium = premium;
        self
    }

    /// Sets the insured amount and shrinks coverages into a single one of that size
    /// if they would no longer fit
    pub fn with_insured_amount(mut self, amount: Decimal) -> Self {
        self.insured_amount = amount;
        let total: Decimal = self.coverages.values().copied().sum();
        if total > amount {
            self.coverages = BTreeMap::from([("Basic".to_string(), amount)]);
        }
        self
    }

    pub fn with_coverages(mut self, coverages: BTreeMap<String, Decimal>) -> Self {
        self.coverages = coverages;
        self
    }

    pub fn with_assistances(mut self, assistances: Vec<String>) -> Self {
        self.assistances = assistances;
        self
    }

    /// Classification applied when [`build_with_status`](Self::build_with_status)
    /// passes through validation
    pub fn with_classification(mut self, classification: RiskClassification) -> Self {
        self.classification = classification;
        self
    }

    /// The intake payload, unvalidated
    pub fn new_request(&self) -> NewPolicyRequest {
        NewPolicyRequest {
            customer_id: self.customer_id,
            product_id: self.product_id.clone(),
            category: self.category,
            sales_channel: self.sales_channel.clone(),
            payment_method: self.payment_method.clone(),
            total_monthly_premium_amount: self.premium,
            insured_amount: self.insured_amount,
            coverages: self.coverages.clone(),
            assistances: self.assistances.clone(),
        }
    }

    /// Builds a RECEIVED request
    ///
    /// # Panics
    ///
    /// Panics if the configured payload fails validation
    pub fn build(&self) -> PolicyRequest {
        PolicyRequest::create(self.new_request()).expect("test request should be valid")
    }

    /// Builds a request and walks it to `status` through legal transitions
    ///
    /// VALIDATED uses the configured classification. REJECTED is reached by
    /// an underwriting denial, CANCELLED by cancelling straight from RECEIVED.
    ///
    /// # Panics
    ///
    /// Panics if the configured amounts are not eligible for the classification
    pub fn build_with_status(&self, status: RequestStatus) -> PolicyRequest {
        let mut request = self.build();
        if status == RequestStatus::Received {
            return request;
        }
        if status == RequestStatus::Cancelled {
            request.cancel().expect("RECEIVED is cancellable");
            return request;
        }

        let decision = request
            .apply_classification(self.classification, &EligibilityRules::new())
            .expect("RECEIVED accepts a classification");
        assert!(decision.eligible, "builder amounts must be eligible to reach {}", status);
        if status == RequestStatus::Validated {
            return request;
        }

        request.confirm_payment().expect("VALIDATED accepts payment");
        match status {
            RequestStatus::Pending => {}
            RequestStatus::Approved => {
                request.apply_underwriting(true, None).expect("PENDING accepts underwriting");
            }
            RequestStatus::Rejected => {
                request.apply_underwriting(false, None).expect("PENDING accepts underwriting");
            }
            _ => unreachable!("handled above"),
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builds_received() {
        let request = TestRequestBuilder::new().build();
        assert_eq!(request.status(), RequestStatus::Received);
        assert_eq!(request.history().len(), 1);
    }

    #[test]
    fn test_random_is_valid_and_eligible_everywhere() {
        for _ in 0..20 {
            let request = TestRequestBuilder::random()
                .with_classification(RiskClassification::NoInformation)
                .with_category(ProductCategory::Business)
                .build_with_status(RequestStatus::Validated);
            assert_eq!(request.status(), RequestStatus::Validated);
        }
    }

    #[test]
    fn test_build_with_status_reaches_every_status() {
        let builder = TestRequestBuilder::new();
        for status in RequestStatus::ALL {
            assert_eq!(builder.build_with_status(status).status(), status);
        }
    }

    #[test]
    fn test_insured_amount_shrinks_coverages() {
        let request = TestRequestBuilder::new()
            .with_insured_amount(Decimal::new(1_000_00, 2))
            .build();
        let total: Decimal = request.coverages().values().copied().sum();
        assert!(total <= request.insured_amount());
    }
}
