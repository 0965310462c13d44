//! Lifecycle State Machine and Aggregate Tests
//!
//! # Test Organization
//!
//! - `transition_table` - every (from, to) pair against the expected table
//! - `aggregate_transitions` - history, finished_at and rollback behaviour
//! - `workflow_paths` - complete paths from RECEIVED to each terminal status
//! - `properties` - random transition sequences keep the history invariants

use std::collections::BTreeMap;

use core_kernel::CustomerId;
use domain_request::{
    EligibilityRules, NewPolicyRequest, PolicyRequest, ProductCategory, RequestError,
    RequestStatus, RiskClassification,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn new_auto_request(insured_amount: Decimal) -> NewPolicyRequest {
    NewPolicyRequest {
        customer_id: CustomerId::new(),
        product_id: "1b2da7cc-b367-4196-8a78-9cfeec21f587".to_string(),
        category: ProductCategory::Auto,
        sales_channel: "MOBILE".to_string(),
        payment_method: "CREDIT_CARD".to_string(),
        total_monthly_premium_amount: dec!(75.25),
        insured_amount,
        coverages: BTreeMap::from([("Roubo".to_string(), dec!(100000.25))]),
        assistances: vec!["Guincho até 250km".to_string()],
    }
}

fn received_request() -> PolicyRequest {
    PolicyRequest::create(new_auto_request(dec!(250000.00))).unwrap()
}

fn validated_request() -> PolicyRequest {
    let mut request = received_request();
    request
        .apply_classification(RiskClassification::Regular, &EligibilityRules::new())
        .unwrap();
    request
}

fn pending_request() -> PolicyRequest {
    let mut request = validated_request();
    request.confirm_payment().unwrap();
    request
}

// ============================================================================
// TRANSITION TABLE
// ============================================================================

mod transition_table {
    use super::*;
    use RequestStatus::*;

    const EXPECTED: [(RequestStatus, &[RequestStatus]); 6] = [
        (Received, &[Validated, Rejected, Cancelled]),
        (Validated, &[Pending, Rejected, Cancelled]),
        (Pending, &[Approved, Rejected, Cancelled]),
        (Rejected, &[]),
        (Approved, &[]),
        (Cancelled, &[]),
    ];

    #[test]
    fn test_can_transition_matches_table_for_every_pair() {
        let mut checked = 0;
        for (from, allowed) in EXPECTED {
            for to in RequestStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&to),
                    "{} -> {}",
                    from,
                    to
                );
                checked += 1;
            }
        }
        assert_eq!(checked, 36);
    }

    #[test]
    fn test_exactly_nine_legal_transitions() {
        let legal = RequestStatus::ALL
            .into_iter()
            .flat_map(|from| RequestStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(legal, 9);
    }

    #[test]
    fn test_no_self_transitions() {
        for status in RequestStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!Received.is_terminal());
        assert!(!Validated.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(Approved.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_cancellation_is_derived_from_table() {
        for status in RequestStatus::ALL {
            assert_eq!(status.is_cancellable(), status.can_transition_to(Cancelled));
            assert_eq!(status.is_cancellable(), !status.is_terminal());
        }
        assert!(!Approved.is_cancellable());
    }

    #[test]
    fn test_ensure_transition_reports_both_ends() {
        let err = Pending.ensure_transition(Validated).unwrap_err();
        assert!(matches!(
            err,
            RequestError::InvalidTransition { from: Pending, to: Validated }
        ));
        assert_eq!(err.to_string(), "Invalid state transition from PENDING to VALIDATED");
    }
}

// ============================================================================
// AGGREGATE TRANSITIONS
// ============================================================================

mod aggregate_transitions {
    use super::*;

    #[test]
    fn test_each_transition_appends_exactly_one_entry() {
        let mut request = received_request();
        assert_eq!(request.history().len(), 1);

        request.transition_to(RequestStatus::Validated, "validation approved").unwrap();
        assert_eq!(request.history().len(), 2);

        request.transition_to(RequestStatus::Pending, "payment confirmed").unwrap();
        assert_eq!(request.history().len(), 3);
        assert_eq!(request.history()[2].status, RequestStatus::Pending);
        assert_eq!(request.version(), 2);
    }

    #[test]
    fn test_finished_at_set_on_terminal_transition() {
        let mut request = pending_request();
        assert!(request.finished_at().is_none());

        request.apply_underwriting(true, None).unwrap();

        let finished_at = request.finished_at().unwrap();
        assert_eq!(finished_at, request.history().last().unwrap().timestamp);
        assert!(request.is_terminal());
    }

    #[test]
    fn test_finished_at_is_immutable_after_terminal() {
        let mut request = validated_request();
        request.cancel().unwrap();
        let finished_at = request.finished_at();

        assert!(request.cancel().is_err());
        assert!(request.transition_to(RequestStatus::Pending, "late payment").is_err());
        assert_eq!(request.finished_at(), finished_at);
        assert_eq!(request.history().len(), 3);
    }

    #[test]
    fn test_rejected_transition_has_no_partial_write() {
        let mut request = received_request();
        let before = request.clone();

        assert!(request.confirm_payment().is_err());
        assert!(request.apply_underwriting(false, Some("too early")).is_err());

        assert_eq!(request, before);
    }

    #[test]
    fn test_history_timestamps_are_ordered() {
        let mut request = pending_request();
        request.apply_underwriting(false, Some("manual review failed")).unwrap();
        let timestamps: Vec<_> = request.history().iter().map(|e| e.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cancel_from_each_non_terminal_status() {
        for mut request in [received_request(), validated_request(), pending_request()] {
            request.cancel().unwrap();
            assert_eq!(request.status(), RequestStatus::Cancelled);
            assert!(request.finished_at().is_some());
        }
    }

    #[test]
    fn test_approved_request_cannot_be_cancelled() {
        let mut request = pending_request();
        request.apply_underwriting(true, None).unwrap();
        assert!(!request.is_cancellable());
        assert!(matches!(
            request.cancel(),
            Err(RequestError::InvalidTransition { from: RequestStatus::Approved, .. })
        ));
    }
}

// ============================================================================
// WORKFLOW PATHS
// ============================================================================

mod workflow_paths {
    use super::*;

    #[test]
    fn test_happy_path_to_approved() {
        let mut request = pending_request();
        request.apply_underwriting(true, None).unwrap();

        let statuses: Vec<_> = request.history().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                RequestStatus::Received,
                RequestStatus::Validated,
                RequestStatus::Pending,
                RequestStatus::Approved
            ]
        );
        assert_eq!(request.history()[3].note, "underwriting authorized");
    }

    #[test]
    fn test_underwriting_denial_uses_supplied_reason() {
        let mut request = pending_request();
        let note = request
            .apply_underwriting(false, Some("manual review failed"))
            .unwrap();
        assert_eq!(note, "manual review failed");
        assert_eq!(request.status(), RequestStatus::Rejected);
        assert_eq!(request.classification(), Some(RiskClassification::Regular));
    }

    #[test]
    fn test_ineligible_request_rejected_with_reason() {
        let mut request = PolicyRequest::create(new_auto_request(dec!(250000.01))).unwrap();
        let decision = request
            .apply_classification(RiskClassification::HighRisk, &EligibilityRules::new())
            .unwrap();

        assert!(!decision.eligible);
        assert_eq!(request.status(), RequestStatus::Rejected);
        let note = &request.history().last().unwrap().note;
        assert!(note.contains("250000.01"));
        assert!(note.contains("250000.00"));
        assert!(request.finished_at().is_some());
    }

    #[test]
    fn test_payment_cannot_skip_validation() {
        let mut request = received_request();
        assert!(request.confirm_payment().is_err());
        assert_eq!(request.status(), RequestStatus::Received);
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

mod properties {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = RequestStatus> {
        prop::sample::select(RequestStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_history_tracks_accepted_transitions(targets in prop::collection::vec(status_strategy(), 0..12)) {
            let mut request = received_request();
            let mut accepted = 0usize;
            let mut first_finished_at = None;

            for target in targets {
                let before_len = request.history().len();
                match request.transition_to(target, "step") {
                    Ok(()) => {
                        accepted += 1;
                        prop_assert_eq!(request.history().len(), before_len + 1);
                    }
                    Err(_) => prop_assert_eq!(request.history().len(), before_len),
                }
                if let Some(finished_at) = request.finished_at() {
                    let first = *first_finished_at.get_or_insert(finished_at);
                    prop_assert_eq!(first, finished_at);
                }
            }

            prop_assert_eq!(request.history().len(), 1 + accepted);
            prop_assert_eq!(request.history()[0].status, RequestStatus::Received);
            prop_assert_eq!(request.history().last().unwrap().status, request.status());
            prop_assert_eq!(request.finished_at().is_some(), request.status().is_terminal());
        }
    }
}
