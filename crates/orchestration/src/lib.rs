//! Policy Request Workflow
//!
//! Drives policy requests from intake to a terminal outcome by applying
//! asynchronous lifecycle events exactly once and in order.
//!
//! # Components
//!
//! - [`OrchestrationService`]: the three event handlers (received, payment
//!   confirmed, underwriting decided)
//! - [`RequestIntake`]: create, cancel and query entry points
//! - [`WorkflowConsumer`]: decodes channel messages and dispatches them
//! - [`ChannelEventPublisher`]: publishes workflow events on their topics
//! - [`WorkflowConfig`]: worker settings from the environment
//!
//! # Wiring
//!
//! ```rust,ignore
//! let channel = Arc::new(PostgresEventChannel::new(pool, config.channel_config()));
//! let publisher = Arc::new(ChannelEventPublisher::new(channel.clone()));
//! let service = OrchestrationService::new(store.clone(), gateway, publisher.clone())
//!     .with_settings(config.service_settings());
//! subscribe_all(channel.as_ref(), Arc::new(WorkflowConsumer::new(Arc::new(service)))).await?;
//!
//! let intake = RequestIntake::new(store, publisher);
//! let request = intake.create_request(new_request).await?;
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod intake;
pub mod publisher;
pub mod service;
pub mod topics;

pub use config::WorkflowConfig;
pub use consumer::{subscribe_all, WorkflowConsumer};
pub use error::{WorkflowError, WorkflowResult};
pub use intake::RequestIntake;
pub use publisher::ChannelEventPublisher;
pub use service::{DiscardReason, HandleOutcome, OrchestrationService, ServiceSettings};
