//! Policy Request Domain
//!
//! Domain model for insurance policy requests moving from intake to a
//! terminal outcome, following the same Domain-Driven Design and Hexagonal
//! Architecture layout as the rest of the workspace.
//!
//! # Architecture
//!
//! - **Aggregate**: [`PolicyRequest`], the single long-lived entity
//! - **State machine**: [`RequestStatus`], a pure transition table
//! - **Rules**: [`EligibilityRules`], insured-amount limits per risk tier and category
//! - **Events**: [`RequestEvent`] (emitted) and [`InboundEvent`] (consumed)
//! - **Ports**: [`RequestStore`], [`RiskClassificationGateway`], [`EventPublisher`]
//!
//! # Request Lifecycle
//!
//! ```text
//! RECEIVED -> VALIDATED -> PENDING -> APPROVED
//!          \            \          \-> REJECTED
//!           \            \-> REJECTED
//!            \-> CANCELLED (from any non-terminal status)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_request::{PolicyRequest, EligibilityRules, RiskClassification};
//!
//! let mut request = PolicyRequest::create(new_request)?;
//! let decision = request.apply_classification(RiskClassification::Regular, &EligibilityRules::new())?;
//! request.confirm_payment()?;
//! request.apply_underwriting(true, None)?;
//! ```

pub mod adapters;
pub mod category;
pub mod classification;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod ports;
pub mod request;
pub mod status;

pub use category::ProductCategory;
pub use classification::{ClassificationResult, Occurrence, OccurrenceType, RiskClassification};
pub use eligibility::{EligibilityDecision, EligibilityRules};
pub use error::RequestError;
pub use events::{
    InboundEvent, PaymentConfirmed, RequestEvent, RequestSnapshot, UnderwritingDecision,
};
pub use ports::{EventPublisher, RequestStore, RiskClassificationGateway};
pub use request::{NewPolicyRequest, PolicyRequest, PolicyRequestParts, StatusHistoryEntry};
pub use status::RequestStatus;
