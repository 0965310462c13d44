//! Lifecycle events
//!
//! Events are immutable values created at emission time with a fresh id and
//! timestamp. On the wire they are JSON objects discriminated by an
//! `event_type` field.
//!
//! - [`RequestEvent`] is what the workflow emits: Received, Validated, Rejected
//! - [`InboundEvent`] is what the workflow consumes: Received plus the two
//!   external decisions, payment confirmation and underwriting

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, EventId, RequestId};

use crate::category::ProductCategory;
use crate::classification::RiskClassification;
use crate::request::PolicyRequest;
use crate::status::RequestStatus;

pub const EVENT_TYPE_RECEIVED: &str = "REQUEST_RECEIVED";
pub const EVENT_TYPE_VALIDATED: &str = "REQUEST_VALIDATED";
pub const EVENT_TYPE_REJECTED: &str = "REQUEST_REJECTED";
pub const EVENT_TYPE_PAYMENT_CONFIRMED: &str = "PAYMENT_CONFIRMED";
pub const EVENT_TYPE_UNDERWRITING_DECIDED: &str = "UNDERWRITING_DECIDED";

/// Denormalized view of a request at emission time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    #[serde(default)]
    pub event_id: EventId,
    pub request_id: RequestId,
    pub customer_id: CustomerId,
    pub product_id: String,
    pub category: ProductCategory,
    pub status: RequestStatus,
    pub insured_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl RequestSnapshot {
    pub fn of(request: &PolicyRequest) -> Self {
        Self {
            event_id: EventId::new_v7(),
            request_id: request.id(),
            customer_id: request.customer_id(),
            product_id: request.product_id().to_string(),
            category: request.category(),
            status: request.status(),
            insured_amount: request.insured_amount(),
            timestamp: Utc::now(),
        }
    }
}

/// Events emitted by the policy request workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum RequestEvent {
    #[serde(rename = "REQUEST_RECEIVED")]
    Received {
        #[serde(flatten)]
        snapshot: RequestSnapshot,
    },

    #[serde(rename = "REQUEST_VALIDATED")]
    Validated {
        #[serde(flatten)]
        snapshot: RequestSnapshot,
        classification: RiskClassification,
    },

    #[serde(rename = "REQUEST_REJECTED")]
    Rejected {
        #[serde(flatten)]
        snapshot: RequestSnapshot,
        classification: Option<RiskClassification>,
        reason: String,
    },
}

impl RequestEvent {
    pub fn received(request: &PolicyRequest) -> Self {
        RequestEvent::Received {
            snapshot: RequestSnapshot::of(request),
        }
    }

    pub fn validated(request: &PolicyRequest, classification: RiskClassification) -> Self {
        RequestEvent::Validated {
            snapshot: RequestSnapshot::of(request),
            classification,
        }
    }

    /// Carries the classification persisted on the request, if any
    pub fn rejected(request: &PolicyRequest, reason: impl Into<String>) -> Self {
        RequestEvent::Rejected {
            snapshot: RequestSnapshot::of(request),
            classification: request.classification(),
            reason: reason.into(),
        }
    }

    pub fn snapshot(&self) -> &RequestSnapshot {
        match self {
            RequestEvent::Received { snapshot }
            | RequestEvent::Validated { snapshot, .. }
            | RequestEvent::Rejected { snapshot, .. } => snapshot,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.snapshot().request_id
    }

    pub fn event_id(&self) -> EventId {
        self.snapshot().event_id
    }

    /// Value of the `event_type` discriminator
    pub fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::Received { .. } => EVENT_TYPE_RECEIVED,
            RequestEvent::Validated { .. } => EVENT_TYPE_VALIDATED,
            RequestEvent::Rejected { .. } => EVENT_TYPE_REJECTED,
        }
    }
}

/// Payment confirmation from the billing side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    #[serde(default)]
    pub event_id: EventId,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
}

impl PaymentConfirmed {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            event_id: EventId::new_v7(),
            request_id,
            timestamp: Utc::now(),
        }
    }
}

/// Underwriting outcome for a request awaiting subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderwritingDecision {
    #[serde(default)]
    pub event_id: EventId,
    pub request_id: RequestId,
    pub authorized: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UnderwritingDecision {
    pub fn authorized(request_id: RequestId) -> Self {
        Self {
            event_id: EventId::new_v7(),
            request_id,
            authorized: true,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn denied(request_id: RequestId, reason: Option<String>) -> Self {
        Self {
            event_id: EventId::new_v7(),
            request_id,
            authorized: false,
            reason,
            timestamp: Utc::now(),
        }
    }
}

/// Every event kind the orchestration consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum InboundEvent {
    #[serde(rename = "REQUEST_RECEIVED")]
    Received(RequestSnapshot),

    #[serde(rename = "PAYMENT_CONFIRMED")]
    PaymentConfirmed(PaymentConfirmed),

    #[serde(rename = "UNDERWRITING_DECIDED")]
    UnderwritingDecided(UnderwritingDecision),
}

impl InboundEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            InboundEvent::Received(snapshot) => snapshot.request_id,
            InboundEvent::PaymentConfirmed(event) => event.request_id,
            InboundEvent::UnderwritingDecided(event) => event.request_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::Received(_) => EVENT_TYPE_RECEIVED,
            InboundEvent::PaymentConfirmed(_) => EVENT_TYPE_PAYMENT_CONFIRMED,
            InboundEvent::UnderwritingDecided(_) => EVENT_TYPE_UNDERWRITING_DECIDED,
        }
    }
}
