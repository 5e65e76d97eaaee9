// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for the client pool over the mock transport.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use iota_core::{AgentError, ClientPool};
use iota_opcua::ConnectionDescriptor;
use iota_tests::common::*;

fn pool_with_server() -> (Arc<ClientPool>, Arc<MockServer>) {
    let factory = MockTransportFactory::new();
    let server = factory.server();
    (Arc::new(ClientPool::new(Arc::new(factory), fast_settings())), server)
}

// =============================================================================
// One Client Per Endpoint
// =============================================================================

#[tokio::test]
async fn test_concurrent_get_or_create_connects_once() {
    init_test_logging();
    let (pool, server) = pool_with_server();
    server.set_connect_delay(Duration::from_millis(20));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.get_or_create(&ConnectionDescriptor::anonymous(E1))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let clients: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(pool.len(), 1);
    assert_eq!(server.transports_created(), 1);
    assert_eq!(server.connects(E1), 1);
}

#[tokio::test]
async fn test_concurrent_provisioning_shares_client() {
    let harness = BindingHarness::new();
    harness.server.set_connect_delay(Duration::from_millis(20));

    let a = DeviceFixtures::tank("tank-a", E1);
    let b = DeviceFixtures::pump("pump-b", E1);
    let (ra, rb) = tokio::join!(
        harness.bindings.provision(&a),
        harness.bindings.provision(&b)
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(harness.pool.len(), 1);
    assert_eq!(harness.server.connects(E1), 1);

    let client_a = harness.bindings.binding("tank-a").unwrap();
    let client_b = harness.bindings.binding("pump-b").unwrap();
    assert!(Arc::ptr_eq(client_a.client(), client_b.client()));
    assert_eq!(client_a.client().monitored_count(), 3);
}

#[tokio::test]
async fn test_distinct_endpoints_get_distinct_clients() {
    let (pool, server) = pool_with_server();

    let a = pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.unwrap();
    let b = pool.get_or_create(&ConnectionDescriptor::anonymous(E2)).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(pool.endpoints(), vec![E1.to_string(), E2.to_string()]);
    assert_eq!(server.transports_created(), 2);
}

// =============================================================================
// Failed Starts
// =============================================================================

#[tokio::test]
async fn test_connect_failure_not_pooled_and_retryable() {
    let (pool, server) = pool_with_server();
    server.fail_connect.store(true, Ordering::SeqCst);

    assert!(pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.is_err());
    assert!(pool.is_empty());
    // Nothing was acquired, so nothing is released.
    assert_eq!(server.disconnects(E1), 0);

    server.fail_connect.store(false, Ordering::SeqCst);
    let client = pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.unwrap();
    assert!(client.state().is_ready());
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn test_session_failure_releases_connection() {
    let (pool, server) = pool_with_server();
    server.fail_session.store(true, Ordering::SeqCst);

    assert!(pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.is_err());
    assert!(pool.is_empty());
    assert_eq!(server.disconnects(E1), 1);
}

#[tokio::test]
async fn test_subscription_failure_releases_session_and_connection() {
    let (pool, server) = pool_with_server();
    server.fail_create_subscription.store(true, Ordering::SeqCst);

    assert!(pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.is_err());
    assert!(pool.is_empty());

    let calls = server.calls();
    let tail: Vec<&MockCall> = calls.iter().rev().take(2).collect();
    assert!(matches!(tail[1], MockCall::CloseSession { .. }));
    assert!(matches!(tail[0], MockCall::Disconnect { .. }));
}

#[tokio::test]
async fn test_provisioning_surfaces_protocol_error() {
    let harness = BindingHarness::new();
    harness.server.fail_connect.store(true, Ordering::SeqCst);

    let err = harness
        .bindings
        .provision(&DeviceFixtures::tank("tank-1", E1))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Protocol(_)));
    assert!(harness.bindings.is_empty());
    assert!(harness.pool.is_empty());
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_remove_all_disconnects_despite_subscription_terminate_failure() {
    init_test_logging();
    let (pool, server) = pool_with_server();
    let a = pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.unwrap();
    pool.get_or_create(&ConnectionDescriptor::anonymous(E2)).await.unwrap();

    server.fail_delete_subscription.store(true, Ordering::SeqCst);
    pool.remove_all().await;

    assert!(pool.is_empty());
    for endpoint in [E1, E2] {
        assert_eq!(server.disconnects(endpoint), 1, "{} not disconnected", endpoint);
    }
    assert_eq!(
        server
            .calls_matching(|c| matches!(c, MockCall::CloseSession { .. }))
            .len(),
        2
    );
    assert_eq!(a.stats().release_failures(), 1);
    assert!(!a.state().is_ready());
}

#[tokio::test]
async fn test_remove_all_continues_after_session_close_failure() {
    let (pool, server) = pool_with_server();
    pool.get_or_create(&ConnectionDescriptor::anonymous(E1)).await.unwrap();

    server.fail_close_session.store(true, Ordering::SeqCst);
    pool.remove_all().await;

    assert_eq!(server.disconnects(E1), 1);
    assert!(pool.is_empty());
}
