//! Policy Request Aggregate Root
//!
//! A `PolicyRequest` tracks one customer's request for a policy from intake
//! to a terminal outcome. It is the consistency boundary for the lifecycle.
//!
//! # Invariants
//!
//! - Identity, customer, product, amounts and coverages never change after creation
//! - Coverage values are positive and sum to at most the insured amount
//! - `history` starts with exactly one RECEIVED entry and grows by exactly one
//!   entry per accepted transition
//! - `finished_at` is set once, on the first transition into a terminal status
//! - A rejected transition leaves status, history and `finished_at` untouched

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::{CustomerId, RequestId};

use crate::category::ProductCategory;
use crate::classification::RiskClassification;
use crate::eligibility::{EligibilityDecision, EligibilityRules};
use crate::error::RequestError;
use crate::status::RequestStatus;

/// Note written with the initial history entry
pub const NOTE_RECEIVED: &str = "request received";
/// Note written when eligibility passes
pub const NOTE_VALIDATION_APPROVED: &str = "validation approved";
/// Note written when payment moves the request to PENDING
pub const NOTE_PAYMENT_CONFIRMED: &str = "payment confirmed, awaiting underwriting";
/// Note written when underwriting authorizes the policy
pub const NOTE_UNDERWRITING_AUTHORIZED: &str = "underwriting authorized";
/// Default note when underwriting denies without a reason
pub const NOTE_UNDERWRITING_DENIED: &str = "underwriting denied";
/// Note written when the customer cancels
pub const NOTE_CANCELLED: &str = "cancellation requested by customer";

/// One audit entry in a request's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: RequestStatus,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

impl StatusHistoryEntry {
    pub fn new(status: RequestStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            note: note.into(),
        }
    }
}

/// Intake payload for a new request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_amounts"))]
pub struct NewPolicyRequest {
    pub customer_id: CustomerId,
    #[validate(length(min = 1, message = "product id is required"))]
    pub product_id: String,
    pub category: ProductCategory,
    #[validate(length(min = 1, message = "sales channel is required"))]
    pub sales_channel: String,
    #[validate(length(min = 1, message = "payment method is required"))]
    pub payment_method: String,
    pub total_monthly_premium_amount: Decimal,
    pub insured_amount: Decimal,
    pub coverages: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub assistances: Vec<String>,
}

const MAX_PREMIUM_EXCLUSIVE: Decimal = dec!(100000000);
const MAX_INSURED_EXCLUSIVE: Decimal = dec!(10000000000);

fn validation_error(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn has_money_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}

fn validate_amounts(request: &NewPolicyRequest) -> Result<(), ValidationError> {
    if request.total_monthly_premium_amount < dec!(0.01)
        || request.total_monthly_premium_amount >= MAX_PREMIUM_EXCLUSIVE
        || !has_money_precision(request.total_monthly_premium_amount)
    {
        return Err(validation_error(
            "premium",
            format!(
                "monthly premium must be between 0.01 and 99999999.99 with at most 2 decimals, got {}",
                request.total_monthly_premium_amount
            ),
        ));
    }

    if request.insured_amount < dec!(0.01)
        || request.insured_amount >= MAX_INSURED_EXCLUSIVE
        || !has_money_precision(request.insured_amount)
    {
        return Err(validation_error(
            "insured_amount",
            format!(
                "insured amount must be between 0.01 and 9999999999.99 with at most 2 decimals, got {}",
                request.insured_amount
            ),
        ));
    }

    if request.coverages.is_empty() {
        return Err(validation_error("coverages", "at least one coverage is required".to_string()));
    }

    if let Some((name, amount)) = request
        .coverages
        .iter()
        .find(|(name, amount)| name.trim().is_empty() || **amount <= Decimal::ZERO)
    {
        return Err(validation_error(
            "coverages",
            format!("coverage '{}' must have a name and a positive amount, got {}", name, amount),
        ));
    }

    let total: Decimal = request.coverages.values().copied().sum();
    if total > request.insured_amount {
        return Err(validation_error(
            "coverages",
            format!(
                "coverages sum to {} which exceeds the insured amount of {}",
                total, request.insured_amount
            ),
        ));
    }

    Ok(())
}

/// Persisted state of a request, used to rebuild the aggregate from storage
#[derive(Debug, Clone)]
pub struct PolicyRequestParts {
    pub id: RequestId,
    pub customer_id: CustomerId,
    pub product_id: String,
    pub category: ProductCategory,
    pub sales_channel: String,
    pub payment_method: String,
    pub total_monthly_premium_amount: Decimal,
    pub insured_amount: Decimal,
    pub coverages: BTreeMap<String, Decimal>,
    pub assistances: Vec<String>,
    pub status: RequestStatus,
    pub classification: Option<RiskClassification>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusHistoryEntry>,
    pub version: u32,
}

/// The Policy Request aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    id: RequestId,
    customer_id: CustomerId,
    product_id: String,
    category: ProductCategory,
    sales_channel: String,
    payment_method: String,
    total_monthly_premium_amount: Decimal,
    insured_amount: Decimal,
    coverages: BTreeMap<String, Decimal>,
    assistances: Vec<String>,
    status: RequestStatus,
    /// Classification obtained while handling `Received`
    classification: Option<RiskClassification>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    history: Vec<StatusHistoryEntry>,
    /// Incremented on every accepted transition
    version: u32,
}

impl PolicyRequest {
    /// Creates a new request in RECEIVED with its initial history entry
    ///
    /// # Errors
    ///
    /// Returns `RequestError::Validation` if the intake payload is invalid
    pub fn create(new: NewPolicyRequest) -> Result<Self, RequestError> {
        new.validate()?;

        let now = Utc::now();
        Ok(Self {
            id: RequestId::new_v7(),
            customer_id: new.customer_id,
            product_id: new.product_id,
            category: new.category,
            sales_channel: new.sales_channel,
            payment_method: new.payment_method,
            total_monthly_premium_amount: new.total_monthly_premium_amount,
            insured_amount: new.insured_amount,
            coverages: new.coverages,
            assistances: new.assistances,
            status: RequestStatus::Received,
            classification: None,
            created_at: now,
            finished_at: None,
            history: vec![StatusHistoryEntry {
                status: RequestStatus::Received,
                timestamp: now,
                note: NOTE_RECEIVED.to_string(),
            }],
            version: 0,
        })
    }

    /// Rebuilds a request from persisted state
    ///
    /// # Errors
    ///
    /// Returns `RequestError::Validation` if the stored history is empty or
    /// disagrees with the stored status
    pub fn restore(parts: PolicyRequestParts) -> Result<Self, RequestError> {
        match (parts.history.first(), parts.history.last()) {
            (Some(first), Some(last)) => {
                if first.status != RequestStatus::Received {
                    return Err(RequestError::validation(format!(
                        "request {} history starts with {}",
                        parts.id, first.status
                    )));
                }
                if last.status != parts.status {
                    return Err(RequestError::validation(format!(
                        "request {} status {} disagrees with last history entry {}",
                        parts.id, parts.status, last.status
                    )));
                }
            }
            _ => {
                return Err(RequestError::validation(format!(
                    "request {} has no history",
                    parts.id
                )))
            }
        }

        Ok(Self {
            id: parts.id,
            customer_id: parts.customer_id,
            product_id: parts.product_id,
            category: parts.category,
            sales_channel: parts.sales_channel,
            payment_method: parts.payment_method,
            total_monthly_premium_amount: parts.total_monthly_premium_amount,
            insured_amount: parts.insured_amount,
            coverages: parts.coverages,
            assistances: parts.assistances,
            status: parts.status,
            classification: parts.classification,
            created_at: parts.created_at,
            finished_at: parts.finished_at,
            history: parts.history,
            version: parts.version,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn sales_channel(&self) -> &str {
        &self.sales_channel
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn total_monthly_premium_amount(&self) -> Decimal {
        self.total_monthly_premium_amount
    }

    pub fn insured_amount(&self) -> Decimal {
        self.insured_amount
    }

    pub fn coverages(&self) -> &BTreeMap<String, Decimal> {
        &self.coverages
    }

    pub fn assistances(&self) -> &[String] {
        &self.assistances
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn classification(&self) -> Option<RiskClassification> {
        self.classification
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }

    /// Applies a status change and appends its history entry
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidTransition` if the lifecycle table does
    /// not allow `target` from the current status. Nothing is modified then.
    pub fn transition_to(
        &mut self,
        target: RequestStatus,
        note: impl Into<String>,
    ) -> Result<(), RequestError> {
        self.status.ensure_transition(target)?;

        let entry = StatusHistoryEntry::new(target, note);
        if target.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(entry.timestamp);
        }
        self.status = target;
        self.history.push(entry);
        self.version += 1;
        Ok(())
    }

    /// Records the classification and moves to VALIDATED or REJECTED
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidTransition` unless the request is RECEIVED
    pub fn apply_classification(
        &mut self,
        classification: RiskClassification,
        rules: &EligibilityRules,
    ) -> Result<EligibilityDecision, RequestError> {
        let decision = rules.evaluate(classification, self.category, self.insured_amount);
        let target = if decision.eligible {
            RequestStatus::Validated
        } else {
            RequestStatus::Rejected
        };
        if self.status != RequestStatus::Received {
            return Err(RequestError::invalid_transition(self.status, target));
        }

        let note = decision
            .reason
            .clone()
            .unwrap_or_else(|| NOTE_VALIDATION_APPROVED.to_string());
        self.transition_to(target, note)?;
        self.classification = Some(classification);
        Ok(decision)
    }

    /// VALIDATED -> PENDING
    pub fn confirm_payment(&mut self) -> Result<(), RequestError> {
        self.transition_to(RequestStatus::Pending, NOTE_PAYMENT_CONFIRMED)
    }

    /// PENDING -> APPROVED when authorized, PENDING -> REJECTED otherwise
    ///
    /// Returns the note written to history.
    pub fn apply_underwriting(
        &mut self,
        authorized: bool,
        reason: Option<&str>,
    ) -> Result<String, RequestError> {
        let (target, note) = if authorized {
            (RequestStatus::Approved, NOTE_UNDERWRITING_AUTHORIZED.to_string())
        } else {
            let note = reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(NOTE_UNDERWRITING_DENIED)
                .to_string();
            (RequestStatus::Rejected, note)
        };
        if self.status != RequestStatus::Pending {
            return Err(RequestError::invalid_transition(self.status, target));
        }
        self.transition_to(target, note.clone())?;
        Ok(note)
    }

    /// Customer cancellation from any non-terminal status
    pub fn cancel(&mut self) -> Result<(), RequestError> {
        self.transition_to(RequestStatus::Cancelled, NOTE_CANCELLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(insured: Decimal) -> NewPolicyRequest {
        NewPolicyRequest {
            customer_id: CustomerId::new(),
            product_id: "1b2da7cc-b367-4196-8a78-9cfeec21f587".to_string(),
            category: ProductCategory::Auto,
            sales_channel: "MOBILE".to_string(),
            payment_method: "CREDIT_CARD".to_string(),
            total_monthly_premium_amount: dec!(75.25),
            insured_amount: insured,
            coverages: BTreeMap::from([
                ("Roubo".to_string(), dec!(100000.25)),
                ("Perda Total".to_string(), dec!(100000.25)),
            ]),
            assistances: vec!["Guincho até 250km".to_string()],
        }
    }

    #[test]
    fn test_create_starts_received_with_one_entry() {
        let request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        assert_eq!(request.status(), RequestStatus::Received);
        assert_eq!(request.history().len(), 1);
        assert_eq!(request.history()[0].note, NOTE_RECEIVED);
        assert_eq!(request.history()[0].timestamp, request.created_at());
        assert!(request.finished_at().is_none());
    }

    #[test]
    fn test_create_rejects_coverages_above_insured_amount() {
        let result = PolicyRequest::create(new_request(dec!(200000.00)));
        assert!(matches!(result, Err(RequestError::Validation(_))));
    }

    #[test]
    fn test_create_rejects_non_positive_coverage() {
        let mut new = new_request(dec!(250000.00));
        new.coverages.insert("Vidros".to_string(), Decimal::ZERO);
        assert!(PolicyRequest::create(new).is_err());
    }

    #[test]
    fn test_create_rejects_blank_product() {
        let mut new = new_request(dec!(250000.00));
        new.product_id = String::new();
        assert!(PolicyRequest::create(new).is_err());
    }

    #[test]
    fn test_create_rejects_three_decimal_amounts() {
        let mut new = new_request(dec!(250000.00));
        new.total_monthly_premium_amount = dec!(75.255);
        assert!(PolicyRequest::create(new).is_err());
    }

    #[test]
    fn test_invalid_transition_leaves_state_untouched() {
        let mut request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        let before = request.clone();

        let result = request.transition_to(RequestStatus::Approved, "skip ahead");

        assert!(matches!(
            result,
            Err(RequestError::InvalidTransition {
                from: RequestStatus::Received,
                to: RequestStatus::Approved
            })
        ));
        assert_eq!(request, before);
    }

    #[test]
    fn test_apply_classification_records_classification() {
        let mut request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        let decision = request
            .apply_classification(RiskClassification::Regular, &EligibilityRules::new())
            .unwrap();
        assert!(decision.eligible);
        assert_eq!(request.status(), RequestStatus::Validated);
        assert_eq!(request.classification(), Some(RiskClassification::Regular));
        assert_eq!(request.history()[1].note, NOTE_VALIDATION_APPROVED);
    }

    #[test]
    fn test_apply_classification_twice_is_rejected() {
        let mut request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        let rules = EligibilityRules::new();
        request.apply_classification(RiskClassification::Regular, &rules).unwrap();
        assert!(request.apply_classification(RiskClassification::Regular, &rules).is_err());
        assert_eq!(request.history().len(), 2);
    }

    #[test]
    fn test_blank_underwriting_reason_falls_back_to_default() {
        let mut request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        request.apply_classification(RiskClassification::Regular, &EligibilityRules::new()).unwrap();
        request.confirm_payment().unwrap();
        let note = request.apply_underwriting(false, Some("  ")).unwrap();
        assert_eq!(note, NOTE_UNDERWRITING_DENIED);
        assert_eq!(request.status(), RequestStatus::Rejected);
    }

    #[test]
    fn test_restore_requires_history() {
        let request = PolicyRequest::create(new_request(dec!(250000.00))).unwrap();
        let parts = PolicyRequestParts {
            id: request.id(),
            customer_id: request.customer_id(),
            product_id: request.product_id().to_string(),
            category: request.category(),
            sales_channel: request.sales_channel().to_string(),
            payment_method: request.payment_method().to_string(),
            total_monthly_premium_amount: request.total_monthly_premium_amount(),
            insured_amount: request.insured_amount(),
            coverages: request.coverages().clone(),
            assistances: request.assistances().to_vec(),
            status: request.status(),
            classification: None,
            created_at: request.created_at(),
            finished_at: None,
            history: Vec::new(),
            version: 0,
        };
        assert!(PolicyRequest::restore(parts).is_err());
    }
}
