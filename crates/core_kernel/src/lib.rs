//! Core Kernel - Foundational types shared by the policy request workflow
//!
//! This crate provides the building blocks used across the domain and
//! infrastructure crates:
//! - Strongly-typed identifiers
//! - The kernel error type
//! - Port error taxonomy and adapter traits for the hexagonal boundary

pub mod identifiers;
pub mod error;
pub mod ports;

pub use identifiers::{RequestId, CustomerId, EventId, MessageId};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
    CircuitBreakerConfig, OperationMetadata,
};
