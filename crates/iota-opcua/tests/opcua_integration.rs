// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client integration tests.
//!
//! The simulated transport tests always run. The real server tests need the
//! `real-transport` feature and a reachable server:
//!
//! ```bash
//! OPCUA_TEST_ENDPOINT=opc.tcp://localhost:4840 \
//!     cargo test -p iota-opcua --features real-transport --test opcua_integration -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `OPCUA_TEST_ENDPOINT`: server endpoint (default: opc.tcp://localhost:4840)
//! - `OPCUA_TEST_NODE`: node with a changing value (default: ns=3;i=1001)

use std::sync::Arc;
use std::time::Duration;

use iota_opcua::{
    ChannelCallback, ClientSettings, ClientState, ConnectionDescriptor, MonitorEvent,
    OpcUaError, OpcUaValue, ProtocolClient, SimulatedTransportFactory, TransportFactory,
};

// =============================================================================
// Test Configuration
// =============================================================================

const DEFAULT_TEST_ENDPOINT: &str = "opc.tcp://localhost:4840";
const DEFAULT_TEST_NODE: &str = "ns=3;i=1001";

#[allow(dead_code)]
fn test_endpoint() -> String {
    std::env::var("OPCUA_TEST_ENDPOINT").unwrap_or_else(|_| DEFAULT_TEST_ENDPOINT.to_string())
}

#[allow(dead_code)]
fn test_node() -> String {
    std::env::var("OPCUA_TEST_NODE").unwrap_or_else(|_| DEFAULT_TEST_NODE.to_string())
}

fn fast_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    settings.subscription.publishing_interval = Duration::from_millis(20);
    settings.monitoring.sampling_interval = Duration::from_millis(10);
    settings
}

fn simulated_client(endpoint: &str) -> ProtocolClient {
    let descriptor = ConnectionDescriptor::anonymous(endpoint);
    let settings = fast_settings();
    let transport = SimulatedTransportFactory::new()
        .create(&descriptor, &settings.connection_strategy)
        .unwrap();
    ProtocolClient::new(descriptor, transport, settings)
}

async fn next_value(rx: &mut tokio::sync::mpsc::Receiver<MonitorEvent>) -> OpcUaValue {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(MonitorEvent::Changed { notification, .. })) => notification.value,
        other => panic!("expected a value change, got {:?}", other),
    }
}

// =============================================================================
// Simulated Transport
// =============================================================================

#[tokio::test]
async fn test_simulated_values_arrive_in_order() {
    let client = simulated_client("opc.tcp://plant-a:4840");
    client.start().await.unwrap();

    let (callback, mut rx) = ChannelCallback::with_channel(32);
    client.monitor("ns=3;i=1001", Arc::new(callback)).await.unwrap();

    let mut previous = -1.0;
    for _ in 0..5 {
        let value = next_value(&mut rx).await.as_f64().unwrap();
        assert!(value > previous, "{} after {}", value, previous);
        previous = value;
    }

    client.stop().await;
    assert_eq!(client.state(), ClientState::Idle);
}

#[tokio::test]
async fn test_no_delivery_after_unmonitor() {
    let client = simulated_client("opc.tcp://plant-a:4840");
    client.start().await.unwrap();

    let (callback, mut rx) = ChannelCallback::with_channel(64);
    let key = client.monitor("ns=2;s=Pump.Speed", Arc::new(callback)).await.unwrap();
    next_value(&mut rx).await;

    client.unmonitor_key(key).await;
    // Drain what was queued before the abort, then expect silence.
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_bad_endpoint_fails_start_and_stays_idle() {
    let client = simulated_client("tcp://plant-a:4840");
    let error = client.start().await.unwrap_err();

    assert!(matches!(error, OpcUaError::Connection(_)));
    assert_eq!(client.state(), ClientState::Idle);
    assert_eq!(client.stats().start_failures(), 1);
}

#[tokio::test]
async fn test_stop_ends_all_monitors() {
    let client = simulated_client("opc.tcp://plant-a:4840");
    client.start().await.unwrap();

    let (a, mut rx_a) = ChannelCallback::with_channel(64);
    let (b, mut rx_b) = ChannelCallback::with_channel(64);
    client.monitor("ns=3;i=1", Arc::new(a)).await.unwrap();
    client.monitor("ns=3;i=2", Arc::new(b)).await.unwrap();
    next_value(&mut rx_a).await;
    next_value(&mut rx_b).await;

    client.stop().await;
    assert_eq!(client.monitored_count(), 0);

    // The delivery tasks are gone, so both channels close.
    let closed = tokio::time::timeout(Duration::from_secs(1), async {
        while rx_a.recv().await.is_some() {}
        while rx_b.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
}

// =============================================================================
// Real Server
// =============================================================================

#[cfg(feature = "real-transport")]
mod real_server {
    use super::*;
    use iota_opcua::RealTransportFactory;

    fn real_client() -> ProtocolClient {
        let descriptor = ConnectionDescriptor::anonymous(test_endpoint());
        let settings = fast_settings();
        let transport = RealTransportFactory::new(settings.application_name.clone())
            .create(&descriptor, &settings.connection_strategy)
            .unwrap();
        ProtocolClient::new(descriptor, transport, settings)
    }

    #[tokio::test]
    #[ignore = "Requires OPC UA server"]
    async fn test_real_server_start_stop() {
        let client = real_client();
        client.start().await.expect("Failed to start client");
        assert!(client.state().is_ready());

        client.stop().await;
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    #[ignore = "Requires OPC UA server"]
    async fn test_real_server_monitor() {
        let client = real_client();
        client.start().await.unwrap();

        let (callback, mut rx) = ChannelCallback::with_channel(16);
        client
            .monitor(&test_node(), Arc::new(callback))
            .await
            .expect("Failed to monitor node");

        let value = next_value(&mut rx).await;
        println!("Received value: {}", value);

        client.stop().await;
    }
}
