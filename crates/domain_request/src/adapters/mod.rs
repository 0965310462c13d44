//! Risk classification gateway adapters
//!
//! - [`FraudApiGateway`]: REST client for the external fraud-check API
//! - [`StaticClassificationGateway`]: deterministic per-customer table

pub mod fraud_api;
pub mod static_classification;

pub use fraud_api::{FraudApiConfig, FraudApiGateway};
pub use static_classification::StaticClassificationGateway;
