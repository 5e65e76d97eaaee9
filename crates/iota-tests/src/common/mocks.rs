// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! - [`MockTransportFactory`] / [`MockTransport`]: an OPC UA transport whose
//!   server side lives in a shared [`MockServer`]. Tests inject failures,
//!   push value changes and inspect every call made by the protocol client.
//! - [`RecordingSink`]: an update sink that records what it receives.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use iota_core::{AgentError, AgentResult, AttributeValue, Device, UpdateSink};
use iota_opcua::{
    ConnectionDescriptor, ConnectionError, ConnectionStrategy, Credentials, DataChangeNotification,
    MonitorError, MonitoringParameters, NodeId, OpcUaResult, OpcUaTransport, OpcUaValue,
    SessionError, SubscriptionError, SubscriptionParameters, TransportFactory, TransportState,
};

// =============================================================================
// Recorded Calls
// =============================================================================

/// One call made on a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `connect`.
    Connect { endpoint: String },
    /// `disconnect`.
    Disconnect { endpoint: String },
    /// `create_session`, with the user name if credentials were passed.
    CreateSession { endpoint: String, user_name: Option<String> },
    /// `close_session`.
    CloseSession { endpoint: String },
    /// `create_subscription`.
    CreateSubscription { endpoint: String },
    /// `delete_subscription`.
    DeleteSubscription { endpoint: String, subscription_id: u32 },
    /// `create_monitored_item`.
    CreateMonitoredItem { endpoint: String, node_id: String },
    /// `delete_monitored_item`.
    DeleteMonitoredItem { endpoint: String, item_id: u32 },
}

impl MockCall {
    /// Returns the endpoint the call was made against.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Connect { endpoint }
            | Self::Disconnect { endpoint }
            | Self::CreateSession { endpoint, .. }
            | Self::CloseSession { endpoint }
            | Self::CreateSubscription { endpoint }
            | Self::DeleteSubscription { endpoint, .. }
            | Self::CreateMonitoredItem { endpoint, .. }
            | Self::DeleteMonitoredItem { endpoint, .. } => endpoint,
        }
    }
}

// =============================================================================
// Mock Server
// =============================================================================

#[derive(Debug)]
struct LiveItem {
    endpoint: String,
    subscription_id: u32,
    node_id: String,
    sender: mpsc::Sender<DataChangeNotification>,
}

/// Server side shared by every transport of one [`MockTransportFactory`].
#[derive(Debug, Default)]
pub struct MockServer {
    /// Fail `connect`.
    pub fail_connect: AtomicBool,
    /// Fail `create_session`.
    pub fail_session: AtomicBool,
    /// Fail `create_subscription`.
    pub fail_create_subscription: AtomicBool,
    /// Fail `delete_subscription`.
    pub fail_delete_subscription: AtomicBool,
    /// Fail `close_session`.
    pub fail_close_session: AtomicBool,

    failing_nodes: Mutex<HashSet<String>>,
    connect_delay: Mutex<Duration>,
    calls: Mutex<Vec<MockCall>>,
    items: Mutex<BTreeMap<u32, LiveItem>>,
    next_id: AtomicU32,
    transports_created: AtomicUsize,
}

impl MockServer {
    /// Rejects monitored items on `node_id` (OPC string form).
    pub fn fail_node(&self, node_id: impl Into<String>) {
        self.failing_nodes.lock().insert(node_id.into());
    }

    /// Delays every `connect` by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the recorded calls matching `predicate`.
    pub fn calls_matching(&self, predicate: impl Fn(&MockCall) -> bool) -> Vec<MockCall> {
        self.calls.lock().iter().filter(|c| predicate(c)).cloned().collect()
    }

    /// Number of `connect` calls against `endpoint`.
    pub fn connects(&self, endpoint: &str) -> usize {
        self.calls_matching(|c| matches!(c, MockCall::Connect { .. }) && c.endpoint() == endpoint)
            .len()
    }

    /// Number of `disconnect` calls against `endpoint`.
    pub fn disconnects(&self, endpoint: &str) -> usize {
        self.calls_matching(|c| matches!(c, MockCall::Disconnect { .. }) && c.endpoint() == endpoint)
            .len()
    }

    /// Number of transports handed out by the factory.
    pub fn transports_created(&self) -> usize {
        self.transports_created.load(Ordering::SeqCst)
    }

    /// Node ids with a live monitored item on `endpoint`, sorted, one
    /// entry per item.
    pub fn live_nodes(&self, endpoint: &str) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .items
            .lock()
            .values()
            .filter(|item| item.endpoint == endpoint)
            .map(|item| item.node_id.clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Number of live monitored items across all endpoints.
    pub fn live_item_count(&self) -> usize {
        self.items.lock().len()
    }

    /// Publishes `value` on every live item for `node_id` on `endpoint`.
    /// Returns the number of items that received it.
    pub async fn publish(&self, endpoint: &str, node_id: &str, value: OpcUaValue) -> usize {
        let targets: Vec<(NodeId, mpsc::Sender<DataChangeNotification>)> = self
            .items
            .lock()
            .values()
            .filter(|item| item.endpoint == endpoint && item.node_id == node_id)
            .filter_map(|item| Some((item.node_id.parse().ok()?, item.sender.clone())))
            .collect();

        let mut delivered = 0;
        for (parsed, sender) in targets {
            let notification = DataChangeNotification::new(parsed, value.clone());
            if sender.send(notification).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn drop_items(&self, endpoint: &str, subscription_id: Option<u32>) {
        self.items.lock().retain(|_, item| {
            item.endpoint != endpoint || subscription_id.is_some_and(|id| item.subscription_id != id)
        });
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

/// Transport backed by a [`MockServer`].
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,
    server: Arc<MockServer>,
    state: TransportState,
    session: bool,
    subscriptions: Mutex<HashSet<u32>>,
}

impl MockTransport {
    /// Creates a transport for `endpoint`.
    pub fn new(endpoint: impl Into<String>, server: Arc<MockServer>) -> Self {
        Self {
            endpoint: endpoint.into(),
            server,
            state: TransportState::Disconnected,
            session: false,
            subscriptions: Mutex::new(HashSet::new()),
        }
    }

    fn injected(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn connect(&mut self) -> OpcUaResult<()> {
        self.server.record(MockCall::Connect {
            endpoint: self.endpoint.clone(),
        });

        let delay = *self.server.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if Self::injected(&self.server.fail_connect) {
            self.state = TransportState::Failed;
            return Err(ConnectionError::failed(&self.endpoint, "BadCommunicationError").into());
        }
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        self.server.record(MockCall::Disconnect {
            endpoint: self.endpoint.clone(),
        });
        self.server.drop_items(&self.endpoint, None);
        self.subscriptions.lock().clear();
        self.session = false;
        self.state = TransportState::Disconnected;
        Ok(())
    }

    async fn create_session(&mut self, credentials: Option<&Credentials>) -> OpcUaResult<()> {
        self.server.record(MockCall::CreateSession {
            endpoint: self.endpoint.clone(),
            user_name: credentials.map(|c| c.user_name.clone()),
        });
        if Self::injected(&self.server.fail_session) {
            return Err(SessionError::creation_failed(&self.endpoint, "BadIdentityTokenRejected").into());
        }
        self.session = true;
        Ok(())
    }

    async fn close_session(&mut self) -> OpcUaResult<()> {
        self.server.record(MockCall::CloseSession {
            endpoint: self.endpoint.clone(),
        });
        if Self::injected(&self.server.fail_close_session) {
            return Err(SessionError::close_failed(&self.endpoint, "BadSessionIdInvalid").into());
        }
        self.session = false;
        Ok(())
    }

    async fn create_subscription(&self, _params: &SubscriptionParameters) -> OpcUaResult<u32> {
        self.server.record(MockCall::CreateSubscription {
            endpoint: self.endpoint.clone(),
        });
        if Self::injected(&self.server.fail_create_subscription) {
            return Err(SubscriptionError::creation_failed(&self.endpoint, "BadTooManySubscriptions").into());
        }
        let id = self.server.next_id();
        self.subscriptions.lock().insert(id);
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.server.record(MockCall::DeleteSubscription {
            endpoint: self.endpoint.clone(),
            subscription_id,
        });
        if Self::injected(&self.server.fail_delete_subscription) {
            return Err(SubscriptionError::terminate_failed(subscription_id, "BadTimeout").into());
        }
        self.subscriptions.lock().remove(&subscription_id);
        self.server.drop_items(&self.endpoint, Some(subscription_id));
        Ok(())
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        _params: &MonitoringParameters,
        sender: mpsc::Sender<DataChangeNotification>,
    ) -> OpcUaResult<u32> {
        let node = node_id.to_opc_string();
        self.server.record(MockCall::CreateMonitoredItem {
            endpoint: self.endpoint.clone(),
            node_id: node.clone(),
        });

        if self.server.failing_nodes.lock().contains(&node) {
            return Err(MonitorError::registration_failed(node, "BadNodeIdUnknown").into());
        }
        if !self.subscriptions.lock().contains(&subscription_id) {
            return Err(MonitorError::registration_failed(node, "BadSubscriptionIdInvalid").into());
        }

        let item_id = self.server.next_id();
        self.server.items.lock().insert(
            item_id,
            LiveItem {
                endpoint: self.endpoint.clone(),
                subscription_id,
                node_id: node,
                sender,
            },
        );
        Ok(item_id)
    }

    async fn delete_monitored_item(&self, _subscription_id: u32, item_id: u32) -> OpcUaResult<()> {
        self.server.record(MockCall::DeleteMonitoredItem {
            endpoint: self.endpoint.clone(),
            item_id,
        });
        match self.server.items.lock().remove(&item_id) {
            Some(_) => Ok(()),
            None => Err(MonitorError::terminate_failed(item_id.to_string(), "BadMonitoredItemIdInvalid").into()),
        }
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// Mock Transport Factory
// =============================================================================

/// Factory handing out [`MockTransport`]s that share one [`MockServer`].
#[derive(Debug, Clone, Default)]
pub struct MockTransportFactory {
    server: Arc<MockServer>,
}

impl MockTransportFactory {
    /// Creates a factory with a fresh server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared server.
    pub fn server(&self) -> Arc<MockServer> {
        Arc::clone(&self.server)
    }
}

impl TransportFactory for MockTransportFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
        _strategy: &ConnectionStrategy,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
        self.server.transports_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport::new(
            descriptor.endpoint.clone(),
            Arc::clone(&self.server),
        )))
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// One update received by a [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    /// Entity name.
    pub device_name: String,
    /// Entity type.
    pub device_type: String,
    /// Forwarded values.
    pub values: Vec<AttributeValue>,
}

/// Update sink that records every update.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<RecordedUpdate>>,
    notify: Notify,
    fail: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following update fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the recorded updates.
    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().clone()
    }

    /// Returns the recorded updates for `device_name`.
    pub fn updates_for(&self, device_name: &str) -> Vec<RecordedUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|u| u.device_name == device_name)
            .cloned()
            .collect()
    }

    /// Waits until at least `count` updates were recorded.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.updates.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl UpdateSink for RecordingSink {
    async fn update(
        &self,
        device_name: &str,
        device_type: &str,
        values: Vec<AttributeValue>,
        _device: &Device,
    ) -> AgentResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgentError::forwarding(device_name, "context broker unavailable"));
        }

        self.updates.lock().push(RecordedUpdate {
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            values,
        });
        self.notify.notify_waiters();
        Ok(())
    }
}
