//! In-Memory Store Tests
//!
//! The conditioned write contract every `RequestStore` must honour,
//! exercised on the in-memory adapter.

use std::collections::BTreeMap;
use std::sync::Arc;

use core_kernel::CustomerId;
use domain_request::ports::mock::{InMemoryRequestStore, RecordingEventPublisher};
use domain_request::{
    EventPublisher, NewPolicyRequest, PolicyRequest, ProductCategory, RequestEvent, RequestStatus,
    RequestStore,
};
use rust_decimal_macros::dec;

fn request_for(customer_id: CustomerId) -> PolicyRequest {
    PolicyRequest::create(NewPolicyRequest {
        customer_id,
        product_id: "PRD-LIFE-01".to_string(),
        category: ProductCategory::Life,
        sales_channel: "BRANCH".to_string(),
        payment_method: "BOLETO".to_string(),
        total_monthly_premium_amount: dec!(89.90),
        insured_amount: dec!(300000.00),
        coverages: BTreeMap::from([("Morte".to_string(), dec!(300000.00))]),
        assistances: vec!["Funeral".to_string()],
    })
    .unwrap()
}

#[tokio::test]
async fn test_create_then_find() {
    let store = InMemoryRequestStore::new();
    let request = request_for(CustomerId::new());
    store.create(&request).await.unwrap();

    assert_eq!(store.find_by_id(request.id()).await.unwrap(), Some(request.clone()));
    assert!(store.create(&request).await.unwrap_err().is_conflict());
}

#[tokio::test]
async fn test_save_with_stale_prior_status_conflicts() {
    let store = InMemoryRequestStore::new();
    let request = request_for(CustomerId::new());
    store.create(&request).await.unwrap();

    let mut cancelled = request.clone();
    cancelled.cancel().unwrap();
    store.save(&cancelled, RequestStatus::Received).await.unwrap();

    let mut validated = request.clone();
    validated.transition_to(RequestStatus::Validated, "validation approved").unwrap();
    let err = store.save(&validated, RequestStatus::Received).await.unwrap_err();

    assert!(err.is_conflict());
    let stored = store.find_by_id(request.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), RequestStatus::Cancelled);
    assert_eq!(stored.history().len(), 2);
}

#[tokio::test]
async fn test_save_unknown_request_is_not_found() {
    let store = InMemoryRequestStore::new();
    let request = request_for(CustomerId::new());
    let err = store.save(&request, RequestStatus::Received).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_have_one_winner() {
    let store = Arc::new(InMemoryRequestStore::new());
    let request = request_for(CustomerId::new());
    store.create(&request).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let mut candidate = request.clone();
        handles.push(tokio::spawn(async move {
            candidate.cancel().unwrap();
            store.save(&candidate, RequestStatus::Received).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_find_by_customer_and_active_flag() {
    let store = InMemoryRequestStore::new();
    let customer = CustomerId::new();
    let first = request_for(customer);
    let second = request_for(customer);
    store.create(&first).await.unwrap();
    store.create(&second).await.unwrap();
    store.create(&request_for(CustomerId::new())).await.unwrap();

    let found = store.find_by_customer_id(customer).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(store.exists_active_by_customer_id(customer).await.unwrap());

    for request in found {
        let mut cancelled = request.clone();
        cancelled.cancel().unwrap();
        store.save(&cancelled, RequestStatus::Received).await.unwrap();
    }
    assert!(!store.exists_active_by_customer_id(customer).await.unwrap());
}

#[tokio::test]
async fn test_injected_save_failure_is_transient() {
    let store = InMemoryRequestStore::new();
    let request = request_for(CustomerId::new());
    store.create(&request).await.unwrap();
    store.fail_next_saves(1);

    let mut cancelled = request.clone();
    cancelled.cancel().unwrap();
    assert!(store.save(&cancelled, RequestStatus::Received).await.unwrap_err().is_transient());
    assert!(store.save(&cancelled, RequestStatus::Received).await.is_ok());
}

#[tokio::test]
async fn test_recording_publisher() {
    let publisher = RecordingEventPublisher::new();
    let request = request_for(CustomerId::new());

    publisher.publish(&RequestEvent::received(&request)).await.unwrap();
    assert_eq!(publisher.events_for(request.id()).await.len(), 1);

    publisher.set_failing(true);
    assert!(publisher.publish(&RequestEvent::received(&request)).await.is_err());
    assert_eq!(publisher.events().await.len(), 1);
}
