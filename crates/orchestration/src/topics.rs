//! Topic names
//!
//! Each topic has a dead-letter companion named by
//! [`infra_messaging::dead_letter_topic`].

use domain_request::{InboundEvent, RequestEvent};

pub const REQUEST_RECEIVED: &str = "policy-request.received";
pub const REQUEST_VALIDATED: &str = "policy-request.validated";
pub const REQUEST_REJECTED: &str = "policy-request.rejected";
pub const PAYMENT_CONFIRMED: &str = "payment.confirmed";
pub const UNDERWRITING_DECIDED: &str = "underwriting.decided";

/// Topics the workflow consumes
pub const INBOUND: [&str; 3] = [REQUEST_RECEIVED, PAYMENT_CONFIRMED, UNDERWRITING_DECIDED];

/// Topic an emitted event is published on
pub fn for_event(event: &RequestEvent) -> &'static str {
    match event {
        RequestEvent::Received { .. } => REQUEST_RECEIVED,
        RequestEvent::Validated { .. } => REQUEST_VALIDATED,
        RequestEvent::Rejected { .. } => REQUEST_REJECTED,
    }
}

/// Topic an inbound event is expected on
pub fn for_inbound(event: &InboundEvent) -> &'static str {
    match event {
        InboundEvent::Received(_) => REQUEST_RECEIVED,
        InboundEvent::PaymentConfirmed(_) => PAYMENT_CONFIRMED,
        InboundEvent::UnderwritingDecided(_) => UNDERWRITING_DECIDED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_request::PaymentConfirmed;
    use infra_messaging::dead_letter_topic;
    use test_utils::TestRequestBuilder;

    #[test]
    fn test_inbound_topics_have_dead_letter_companions() {
        let dlqs: Vec<_> = INBOUND.iter().map(|t| dead_letter_topic(t)).collect();
        assert_eq!(
            dlqs,
            vec![
                "policy-request.received.dlq",
                "payment.confirmed.dlq",
                "underwriting.decided.dlq"
            ]
        );
    }

    #[test]
    fn test_received_shares_one_topic_both_ways() {
        let request = TestRequestBuilder::new().build();
        assert_eq!(for_event(&RequestEvent::received(&request)), REQUEST_RECEIVED);
        assert_eq!(
            for_inbound(&InboundEvent::Received(domain_request::RequestSnapshot::of(&request))),
            REQUEST_RECEIVED
        );
        assert_eq!(
            for_inbound(&InboundEvent::PaymentConfirmed(PaymentConfirmed::new(request.id()))),
            PAYMENT_CONFIRMED
        );
    }
}
