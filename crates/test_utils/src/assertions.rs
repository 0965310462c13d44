//! Custom Test Assertions
//!
//! Assertion helpers for policy requests that report the whole history on
//! failure, which plain `assert_eq!` on a status does not.

use domain_request::{PolicyRequest, RequestStatus};

fn describe(request: &PolicyRequest) -> String {
    request
        .history()
        .iter()
        .map(|h| format!("{} ({})", h.status, h.note))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Asserts the history is a legal walk through the lifecycle
///
/// Checks that it is non-empty, starts at RECEIVED, ends at the current
/// status, every consecutive pair is an allowed transition, and timestamps
/// never go backwards.
pub fn assert_history_consistent(request: &PolicyRequest) {
    let history = request.history();
    assert!(!history.is_empty(), "request {} has no history", request.id());
    assert_eq!(
        history[0].status,
        RequestStatus::Received,
        "history of {} does not start at RECEIVED: {}",
        request.id(),
        describe(request)
    );
    assert_eq!(
        history[history.len() - 1].status,
        request.status(),
        "last history entry of {} differs from its status: {}",
        request.id(),
        describe(request)
    );

    for pair in history.windows(2) {
        assert!(
            pair[0].status.can_transition_to(pair[1].status),
            "illegal step {} -> {} in {}",
            pair[0].status,
            pair[1].status,
            describe(request)
        );
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "history timestamps go backwards in {}",
            describe(request)
        );
    }
}

/// Asserts `finished_at` is set exactly when the request is terminal, and
/// matches the timestamp of the terminal entry
pub fn assert_terminal_invariants(request: &PolicyRequest) {
    if request.is_terminal() {
        let finished_at = request
            .finished_at()
            .unwrap_or_else(|| panic!("terminal request {} has no finished_at", request.id()));
        let last = &request.history()[request.history().len() - 1];
        assert_eq!(finished_at, last.timestamp, "finished_at differs from the terminal entry");
    } else {
        assert!(
            request.finished_at().is_none(),
            "non-terminal request {} has finished_at set",
            request.id()
        );
    }
}

/// Asserts the request followed exactly `expected` statuses
pub fn assert_status_path(request: &PolicyRequest, expected: &[RequestStatus]) {
    let actual: Vec<_> = request.history().iter().map(|h| h.status).collect();
    assert_eq!(actual, expected, "unexpected path: {}", describe(request));
}
