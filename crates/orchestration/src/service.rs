//! Orchestration Service
//!
//! Applies lifecycle events to policy requests. Every handler follows the
//! same shape:
//!
//! ```text
//!   read ──► guard on current status ──► decide ──► save(expected = status read)
//!    ▲                                                   │
//!    └────────────── Conflict: re-read and re-decide ◄───┘
//! ```
//!
//! The guard makes each handler idempotent: a redelivered event finds the
//! request already advanced and is discarded. The conditioned save makes
//! concurrent handlers for the same request serialize: the loser re-reads
//! and usually discards on the guard. Events are emitted only after the
//! save succeeds.
//!
//! Gateway and store failures are returned as retryable errors with no
//! state written; the channel's redelivery drives the retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use core_kernel::{OperationMetadata, RequestId};
use domain_request::{
    EligibilityRules, EventPublisher, PolicyRequest, PaymentConfirmed, RequestEvent, RequestSnapshot,
    RequestStatus, RequestStore, RiskClassificationGateway, UnderwritingDecision,
};

use crate::error::{WorkflowError, WorkflowResult};

/// Tunables for [`OrchestrationService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Upper bound for one classification call
    pub gateway_timeout: Duration,
    /// Re-reads allowed after losing a conditioned write
    pub max_conflict_retries: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(2),
            max_conflict_retries: 5,
        }
    }
}

/// Why a handler left the request untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No request with this id
    NotFound,
    /// The event was already applied
    AlreadyApplied { status: RequestStatus },
    /// The request is in a status the event does not apply to
    Stale { status: RequestStatus },
}

/// Result of handling one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied { from: RequestStatus, to: RequestStatus },
    Discarded(DiscardReason),
}

impl HandleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, HandleOutcome::Applied { .. })
    }
}

impl fmt::Display for HandleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleOutcome::Applied { from, to } => write!(f, "applied {} -> {}", from, to),
            HandleOutcome::Discarded(DiscardReason::NotFound) => f.write_str("discarded: not found"),
            HandleOutcome::Discarded(DiscardReason::AlreadyApplied { status }) => {
                write!(f, "discarded: already {}", status)
            }
            HandleOutcome::Discarded(DiscardReason::Stale { status }) => {
                write!(f, "discarded: stale for {}", status)
            }
        }
    }
}

/// What a handler decided after reading the request
enum Step {
    /// Leave the request alone
    Discard(DiscardReason),
    /// Save the mutated request, then emit `event` if any
    Write {
        request: PolicyRequest,
        prior: RequestStatus,
        event: Option<RequestEvent>,
    },
}

/// The workflow engine
///
/// Safe to share across workers; holds no per-request state.
#[derive(Clone)]
pub struct OrchestrationService {
    store: Arc<dyn RequestStore>,
    gateway: Arc<dyn RiskClassificationGateway>,
    publisher: Arc<dyn EventPublisher>,
    rules: EligibilityRules,
    settings: ServiceSettings,
}

impl fmt::Debug for OrchestrationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OrchestrationService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        gateway: Arc<dyn RiskClassificationGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            gateway,
            publisher,
            rules: EligibilityRules::new(),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// RECEIVED -> VALIDATED | REJECTED after classifying the customer
    ///
    /// # Errors
    ///
    /// - `WorkflowError::Gateway` if classification fails or times out
    /// - `WorkflowError::PersistenceFatal` if the store fails
    /// - `WorkflowError::Publish` if the decision was stored but not emitted
    #[instrument(skip(self, snapshot, metadata), fields(request_id = %snapshot.request_id))]
    pub async fn handle_received(
        &self,
        snapshot: &RequestSnapshot,
        metadata: Option<OperationMetadata>,
    ) -> WorkflowResult<HandleOutcome> {
        let request_id = snapshot.request_id;
        self.run(request_id, |request| {
            let metadata = metadata.clone();
            async move { self.decide_received(request, metadata).await }
        })
        .await
    }

    /// VALIDATED -> PENDING
    #[instrument(skip(self, event), fields(request_id = %event.request_id))]
    pub async fn handle_payment_confirmed(
        &self,
        event: &PaymentConfirmed,
    ) -> WorkflowResult<HandleOutcome> {
        self.run(event.request_id, |request| async move {
            Ok::<_, WorkflowError>(Self::decide_payment(request))
        })
        .await
    }

    /// PENDING -> APPROVED | REJECTED
    #[instrument(skip(self, event), fields(request_id = %event.request_id, authorized = event.authorized))]
    pub async fn handle_underwriting_decision(
        &self,
        event: &UnderwritingDecision,
    ) -> WorkflowResult<HandleOutcome> {
        self.run(event.request_id, |request| async move {
            Self::decide_underwriting(request, event)
        })
        .await
    }

    /// Read, decide and conditionally write until the write lands or the
    /// decision is to discard
    async fn run<F, Fut>(&self, request_id: RequestId, decide: F) -> WorkflowResult<HandleOutcome>
    where
        F: Fn(PolicyRequest) -> Fut,
        Fut: std::future::Future<Output = WorkflowResult<Step>>,
    {
        let max_attempts = self.settings.max_conflict_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            let Some(request) = self
                .store
                .find_by_id(request_id)
                .await
                .map_err(|e| WorkflowError::from_store(request_id, e))?
            else {
                warn!("Policy request not found, discarding event");
                return Ok(HandleOutcome::Discarded(DiscardReason::NotFound));
            };

            let (request, prior, event) = match decide(request).await? {
                Step::Discard(reason) => {
                    match reason {
                        DiscardReason::AlreadyApplied { status } => {
                            debug!(status = %status, "Event already applied, discarding")
                        }
                        _ => warn!(reason = ?reason, "Discarding event"),
                    }
                    return Ok(HandleOutcome::Discarded(reason));
                }
                Step::Write { request, prior, event } => (request, prior, event),
            };

            match self.store.save(&request, prior).await {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {
                    warn!(attempt, expected = %prior, "Request changed concurrently, re-reading");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to persist request");
                    return Err(WorkflowError::from_store(request_id, e));
                }
            }

            info!(from = %prior, to = %request.status(), "Request status changed");

            if let Some(event) = event {
                self.emit(&event).await?;
            }

            return Ok(HandleOutcome::Applied {
                from: prior,
                to: request.status(),
            });
        }

        error!(attempts = max_attempts, "Giving up after repeated write conflicts");
        Err(WorkflowError::PersistenceConflict {
            request_id,
            attempts: max_attempts,
        })
    }

    async fn decide_received(
        &self,
        mut request: PolicyRequest,
        metadata: Option<OperationMetadata>,
    ) -> WorkflowResult<Step> {
        match request.status() {
            RequestStatus::Received => {}
            RequestStatus::Cancelled => {
                return Ok(Step::Discard(DiscardReason::Stale {
                    status: RequestStatus::Cancelled,
                }))
            }
            status if request.classification().is_some() => {
                return Ok(Step::Discard(DiscardReason::AlreadyApplied { status }))
            }
            status => return Ok(Step::Discard(DiscardReason::Stale { status })),
        }

        let request_id = request.id();
        let timeout = self.settings.gateway_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.gateway.classify(request_id, request.customer_id(), metadata),
        )
        .await
        .map_err(|_| {
            WorkflowError::gateway(
                request_id,
                core_kernel::PortError::timeout("classify", timeout.as_millis() as u64),
            )
        })?
        .map_err(|e| {
            warn!(error = %e, "Classification failed");
            WorkflowError::gateway(request_id, e)
        })?;

        let decision = request
            .apply_classification(result.classification, &self.rules)
            .map_err(|e| WorkflowError::from_domain(request_id, e))?;

        debug!(
            classification = %result.classification,
            limit = %decision.limit,
            eligible = decision.eligible,
            "Eligibility evaluated"
        );

        let event = match decision.reason {
            None => RequestEvent::validated(&request, result.classification),
            Some(reason) => RequestEvent::rejected(&request, reason),
        };

        Ok(Step::Write {
            request,
            prior: RequestStatus::Received,
            event: Some(event),
        })
    }

    fn decide_payment(mut request: PolicyRequest) -> Step {
        match request.status() {
            RequestStatus::Validated => match request.confirm_payment() {
                Ok(()) => Step::Write {
                    request,
                    prior: RequestStatus::Validated,
                    event: None,
                },
                Err(_) => Step::Discard(DiscardReason::Stale {
                    status: RequestStatus::Validated,
                }),
            },
            RequestStatus::Pending => Step::Discard(DiscardReason::AlreadyApplied {
                status: RequestStatus::Pending,
            }),
            status => Step::Discard(DiscardReason::Stale { status }),
        }
    }

    fn decide_underwriting(
        mut request: PolicyRequest,
        event: &UnderwritingDecision,
    ) -> WorkflowResult<Step> {
        let status = request.status();
        if status != RequestStatus::Pending {
            return Ok(Step::Discard(DiscardReason::Stale { status }));
        }

        let request_id = request.id();
        let note = request
            .apply_underwriting(event.authorized, event.reason.as_deref())
            .map_err(|e| WorkflowError::from_domain(request_id, e))?;

        let event = if event.authorized {
            None
        } else {
            Some(RequestEvent::rejected(&request, note))
        };

        Ok(Step::Write {
            request,
            prior: RequestStatus::Pending,
            event,
        })
    }

    async fn emit(&self, event: &RequestEvent) -> WorkflowResult<()> {
        self.publisher.publish(event).await.map_err(|source| {
            error!(
                event_type = event.event_type(),
                error = %source,
                "State stored but event could not be published"
            );
            WorkflowError::Publish {
                request_id: event.request_id(),
                event_type: event.event_type(),
                source,
            }
        })?;
        info!(event_type = event.event_type(), event_id = %event.event_id(), "Event emitted");
        Ok(())
    }
}
