//! Risk classification returned by the fraud/risk gateway
//!
//! The classification only selects an eligibility limit. Occurrences are
//! carried along for audit and are not interpreted by the workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{CustomerId, RequestId};

use crate::error::RequestError;

/// Customer risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskClassification {
    /// Standard profile
    Regular,
    /// Frequent claims or fraud indicators
    HighRisk,
    /// Good relationship history, low risk
    Preferred,
    /// No history available
    NoInformation,
}

impl RiskClassification {
    pub const ALL: [RiskClassification; 4] = [
        RiskClassification::Regular,
        RiskClassification::HighRisk,
        RiskClassification::Preferred,
        RiskClassification::NoInformation,
    ];

    /// Human-readable label used in audit notes
    pub fn label(self) -> &'static str {
        match self {
            RiskClassification::Regular => "Regular",
            RiskClassification::HighRisk => "High Risk",
            RiskClassification::Preferred => "Preferred",
            RiskClassification::NoInformation => "No Information",
        }
    }

    /// Wire/storage name
    pub fn as_str(self) -> &'static str {
        match self {
            RiskClassification::Regular => "REGULAR",
            RiskClassification::HighRisk => "HIGH_RISK",
            RiskClassification::Preferred => "PREFERRED",
            RiskClassification::NoInformation => "NO_INFORMATION",
        }
    }
}

impl fmt::Display for RiskClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskClassification {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|classification| classification.as_str() == s)
            .ok_or_else(|| RequestError::validation(format!("unknown risk classification: {}", s)))
    }
}

/// Kind of occurrence recorded against a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceType {
    Fraud,
    Suspicion,
    #[serde(other)]
    Unknown,
}

/// A single fraud/suspicion record attached to a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: Uuid,
    pub product_id: Option<String>,
    #[serde(rename = "type")]
    pub occurrence_type: OccurrenceType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gateway answer for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(rename = "orderId")]
    pub request_id: RequestId,
    pub customer_id: CustomerId,
    pub analyzed_at: DateTime<Utc>,
    pub classification: RiskClassification,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

impl ClassificationResult {
    /// A result with no occurrences, analyzed now
    pub fn clean(
        request_id: RequestId,
        customer_id: CustomerId,
        classification: RiskClassification,
    ) -> Self {
        Self {
            request_id,
            customer_id,
            analyzed_at: Utc::now(),
            classification,
            occurrences: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraud_api_payload_parses() {
        let request_id = RequestId::new();
        let customer_id = CustomerId::new();
        let body = serde_json::json!({
            "orderId": request_id.as_uuid(),
            "customerId": customer_id.as_uuid(),
            "analyzedAt": "2024-05-10T12:00:00Z",
            "classification": "HIGH_RISK",
            "occurrences": [{
                "id": Uuid::new_v4(),
                "productId": "78900069",
                "type": "FRAUD",
                "description": "Attempted fraud with stolen card",
                "createdAt": "2024-05-10T12:00:00Z",
                "updatedAt": "2024-05-10T12:00:00Z"
            }]
        });

        let result: ClassificationResult = serde_json::from_value(body).unwrap();
        assert_eq!(result.request_id, request_id);
        assert_eq!(result.classification, RiskClassification::HighRisk);
        assert_eq!(result.occurrences[0].occurrence_type, OccurrenceType::Fraud);
    }

    #[test]
    fn test_unknown_occurrence_type_is_tolerated() {
        let parsed: OccurrenceType = serde_json::from_str("\"CHARGEBACK\"").unwrap();
        assert_eq!(parsed, OccurrenceType::Unknown);
    }
}
