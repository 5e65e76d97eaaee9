// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol client for one endpoint.
//!
//! [`ProtocolClient`] owns the connect → session → subscription chain of a
//! single endpoint and the monitors registered on it. Many devices share one
//! client; each monitor is an independent registration identified by a
//! [`MonitorKey`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use iota_opcua::client::{ProtocolClient, SimulatedTransportFactory, TransportFactory};
//! use iota_opcua::types::{ClientSettings, ConnectionDescriptor};
//!
//! let descriptor = ConnectionDescriptor::anonymous("opc.tcp://localhost:4840");
//! let settings = ClientSettings::default();
//! let transport = SimulatedTransportFactory::new()
//!     .create(&descriptor, &settings.connection_strategy)?;
//!
//! let client = ProtocolClient::new(descriptor, transport, settings);
//! client.start().await?;
//! let key = client.monitor("ns=3;i=1456", callback).await;
//! client.stop().await;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::{
    ConnectionError, MonitorError, OpcUaError, OpcUaResult, SessionError, SubscriptionError,
};
use crate::types::{ClientSettings, ConnectionDescriptor, NodeId};

use super::callback::MonitorCallback;
use super::state::{ClientState, ClientStats};
use super::transport::{ConnectionEvent, DataChangeNotification, OpcUaTransport};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// MonitorKey
// =============================================================================

/// Identifies one monitor registration on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorKey(u64);

impl MonitorKey {
    /// Returns the raw key value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor-{}", self.0)
    }
}

/// A live monitor. Dropping it cancels delivery to the callback.
struct MonitorHandle {
    key: MonitorKey,
    item_id: u32,
    subscription_id: u32,
    task: JoinHandle<()>,
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Resources acquired by `start`, guarded by the lifecycle lock.
#[derive(Debug, Default)]
struct Held {
    connected: bool,
    session: bool,
}

// =============================================================================
// ProtocolClient
// =============================================================================

/// Lifecycle owner for one endpoint.
pub struct ProtocolClient {
    descriptor: ConnectionDescriptor,
    settings: ClientSettings,
    transport: RwLock<Box<dyn OpcUaTransport>>,

    /// Serializes `start` and `stop`.
    lifecycle: Mutex<Held>,
    state: SyncRwLock<ClientState>,
    subscription_id: SyncRwLock<Option<u32>>,

    monitored_items: DashMap<String, Vec<MonitorHandle>>,
    key_index: DashMap<MonitorKey, String>,
    next_key: AtomicU64,

    events: broadcast::Sender<ConnectionEvent>,
    event_task: SyncMutex<Option<JoinHandle<()>>>,
    stats: Arc<ClientStats>,
}

impl ProtocolClient {
    /// Creates an idle client over `transport`.
    pub fn new(
        descriptor: ConnectionDescriptor,
        mut transport: Box<dyn OpcUaTransport>,
        settings: ClientSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        transport.set_event_sink(events.clone());

        tracing::info!(
            endpoint = %descriptor.endpoint,
            security_mode = %descriptor.security_mode,
            security_policy = %descriptor.security_policy,
            authenticated = descriptor.credentials.is_some(),
            "Creating new OPC UA client"
        );

        Self {
            descriptor,
            settings,
            transport: RwLock::new(transport),
            lifecycle: Mutex::new(Held::default()),
            state: SyncRwLock::new(ClientState::Idle),
            subscription_id: SyncRwLock::new(None),
            monitored_items: DashMap::new(),
            key_index: DashMap::new(),
            next_key: AtomicU64::new(1),
            events,
            event_task: SyncMutex::new(None),
            stats: Arc::new(ClientStats::new()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.descriptor.endpoint
    }

    /// Returns the descriptor this client was created from.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Returns the client settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Returns the current state.
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Returns the server subscription id while one exists.
    pub fn subscription_id(&self) -> Option<u32> {
        *self.subscription_id.read()
    }

    /// Returns the client statistics.
    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Returns the number of live monitors.
    pub fn monitored_count(&self) -> usize {
        self.monitored_items.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns the monitored node ids, sorted.
    pub fn monitored_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .monitored_items
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Returns `true` if at least one monitor exists for `node_id`.
    pub fn is_monitoring(&self, node_id: &str) -> bool {
        self.monitored_items.contains_key(node_id)
    }

    /// Subscribes to reconnection events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn set_state(&self, new_state: ClientState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);
        if old_state != new_state {
            tracing::trace!(
                endpoint = %self.descriptor.endpoint,
                from = %old_state,
                to = %new_state,
                "Client state changed"
            );
        }
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Connects, creates the session and creates the subscription.
    ///
    /// Returns immediately if the client is already started. On failure
    /// everything acquired by this attempt is released before the error is
    /// returned, and the client is back to [`ClientState::Idle`].
    ///
    /// # Errors
    ///
    /// `Connection`, `Session` or `Subscription` depending on the failed
    /// step.
    pub async fn start(&self) -> OpcUaResult<()> {
        let mut held = self.lifecycle.lock().await;

        if self.state().is_ready() {
            return Ok(());
        }

        self.spawn_event_listener();

        match self.establish(&mut held).await {
            Ok(()) => {
                self.stats.record_start();
                Ok(())
            }
            Err(error) => {
                self.stats.record_start_failure();
                error.log(&format!("starting client for {}", self.descriptor.endpoint));
                self.release(&mut held).await;
                self.set_state(ClientState::Idle);
                Err(error)
            }
        }
    }

    async fn establish(&self, held: &mut Held) -> OpcUaResult<()> {
        let endpoint = self.descriptor.endpoint.as_str();

        self.set_state(ClientState::Connecting);
        self.transport
            .write()
            .await
            .connect()
            .await
            .map_err(|e| match e {
                OpcUaError::Connection(_) => e,
                other => ConnectionError::failed(endpoint, other.to_string()).into(),
            })?;
        held.connected = true;
        self.set_state(ClientState::Connected);
        tracing::info!(endpoint, "connected");

        self.set_state(ClientState::SessionEstablishing);
        self.transport
            .write()
            .await
            .create_session(self.descriptor.credentials.as_ref())
            .await
            .map_err(|e| match e {
                OpcUaError::Session(_) => e,
                other => SessionError::creation_failed(endpoint, other.to_string()).into(),
            })?;
        held.session = true;
        self.set_state(ClientState::SessionReady);
        tracing::info!(endpoint, "session created");

        self.set_state(ClientState::SubscriptionEstablishing);
        let subscription_id = self
            .transport
            .read()
            .await
            .create_subscription(&self.settings.subscription)
            .await
            .map_err(|e| match e {
                OpcUaError::Subscription(_) => e,
                other => SubscriptionError::creation_failed(endpoint, other.to_string()).into(),
            })?;
        *self.subscription_id.write() = Some(subscription_id);
        self.set_state(ClientState::SubscriptionReady);
        tracing::info!(endpoint, subscription_id, "subscription created");

        Ok(())
    }

    fn spawn_event_listener(&self) {
        let mut slot = self.event_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut events = self.events.subscribe();
        let endpoint = self.descriptor.endpoint.clone();
        let stats = Arc::clone(&self.stats);

        *slot = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        stats.record_connection_event();
                        match event {
                            ConnectionEvent::Backoff { attempt, delay } => tracing::warn!(
                                endpoint = %endpoint,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "backoff attempt #{attempt}"
                            ),
                            other => tracing::info!(endpoint = %endpoint, "{other}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(endpoint = %endpoint, skipped, "Connection events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    /// Registers a value monitor on `node_id`.
    ///
    /// Registration failures are handed to [`MonitorCallback::on_error`]
    /// and yield `None`; they are never returned as errors. Each call
    /// creates an independent monitor, even for a node that is already
    /// monitored.
    pub async fn monitor(
        &self,
        node_id: &str,
        callback: Arc<dyn MonitorCallback>,
    ) -> Option<MonitorKey> {
        match self.register(node_id, Arc::clone(&callback)).await {
            Ok(key) => Some(key),
            Err(error) => {
                self.stats.record_monitor_failure();
                error.log(&format!("monitoring {} on {}", node_id, self.descriptor.endpoint));
                callback.on_error(node_id, error).await;
                None
            }
        }
    }

    async fn register(
        &self,
        node_id: &str,
        callback: Arc<dyn MonitorCallback>,
    ) -> OpcUaResult<MonitorKey> {
        let state = self.state();
        let subscription_id = match (state.is_ready(), self.subscription_id()) {
            (true, Some(id)) => id,
            _ => {
                return Err(OpcUaError::monitor(MonitorError::NotReady {
                    endpoint: self.descriptor.endpoint.clone(),
                    state: state.to_string(),
                }))
            }
        };

        let parsed: NodeId = node_id.parse()?;
        let params = self.settings.monitoring;
        let (sender, receiver) = mpsc::channel(params.channel_capacity());

        let item_id = self
            .transport
            .read()
            .await
            .create_monitored_item(subscription_id, &parsed, &params, sender)
            .await
            .map_err(|e| match e {
                OpcUaError::Monitor(_) => e,
                other => MonitorError::registration_failed(node_id, other.to_string()).into(),
            })?;

        let key = MonitorKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let task = tokio::spawn(deliver(
            node_id.to_string(),
            receiver,
            callback,
            Arc::clone(&self.stats),
        ));

        self.monitored_items
            .entry(node_id.to_string())
            .or_default()
            .push(MonitorHandle {
                key,
                item_id,
                subscription_id,
                task,
            });
        self.key_index.insert(key, node_id.to_string());
        self.stats.record_monitor();

        tracing::info!(
            endpoint = %self.descriptor.endpoint,
            node_id,
            item_id,
            %key,
            "monitoring started"
        );

        // A concurrent stop may have drained the map before our insert.
        if self.subscription_id() != Some(subscription_id) {
            self.unmonitor_key(key).await;
            return Err(OpcUaError::monitor(MonitorError::NotReady {
                endpoint: self.descriptor.endpoint.clone(),
                state: self.state().to_string(),
            }));
        }

        Ok(key)
    }

    /// Terminates every monitor on `node_id`. No-op for unknown nodes.
    pub async fn unmonitor(&self, node_id: &str) {
        let Some((_, handles)) = self.monitored_items.remove(node_id) else {
            return;
        };

        for handle in handles {
            self.key_index.remove(&handle.key);
            self.terminate(node_id, handle).await;
        }
    }

    /// Terminates the single monitor identified by `key`. No-op for
    /// unknown keys.
    pub async fn unmonitor_key(&self, key: MonitorKey) {
        let Some((_, node_id)) = self.key_index.remove(&key) else {
            return;
        };

        let handle = self.monitored_items.get_mut(&node_id).and_then(|mut entry| {
            let position = entry.iter().position(|h| h.key == key)?;
            Some(entry.swap_remove(position))
        });
        self.monitored_items.remove_if(&node_id, |_, handles| handles.is_empty());

        if let Some(handle) = handle {
            self.terminate(&node_id, handle).await;
        }
    }

    async fn terminate(&self, node_id: &str, handle: MonitorHandle) {
        handle.task.abort();

        if self.subscription_id() != Some(handle.subscription_id) {
            // The subscription is gone and took the item with it.
            return;
        }

        let result = self
            .transport
            .read()
            .await
            .delete_monitored_item(handle.subscription_id, handle.item_id)
            .await;

        match result {
            Ok(()) => tracing::info!(
                endpoint = %self.descriptor.endpoint,
                node_id,
                key = %handle.key,
                "monitoring terminated"
            ),
            Err(e) => OpcUaError::monitor(MonitorError::terminate_failed(node_id, e.to_string()))
                .log("unmonitor"),
        }
    }

    // =========================================================================
    // Stop
    // =========================================================================

    /// Releases the subscription, the session and the connection.
    ///
    /// Each release is attempted even when an earlier one fails; failures
    /// are logged. Calling `stop` on an idle client does nothing.
    pub async fn stop(&self) {
        let mut held = self.lifecycle.lock().await;

        let holds_anything =
            held.connected || held.session || self.subscription_id().is_some();
        if !holds_anything && self.monitored_items.is_empty() {
            return;
        }

        tracing::info!(endpoint = %self.descriptor.endpoint, "stopping OPC UA client");
        self.set_state(ClientState::Stopping);
        self.release(&mut held).await;
        self.set_state(ClientState::Idle);
    }

    async fn release(&self, held: &mut Held) {
        let endpoint = self.descriptor.endpoint.as_str();

        // Dropping the handles cancels delivery; the items die with the
        // subscription.
        self.monitored_items.clear();
        self.key_index.clear();

        let subscription_id = self.subscription_id.write().take();
        if let Some(subscription_id) = subscription_id {
            match self
                .transport
                .read()
                .await
                .delete_subscription(subscription_id)
                .await
            {
                Ok(()) => tracing::info!(endpoint, subscription_id, "subscription terminated"),
                Err(e) => {
                    self.stats.record_release_failure();
                    OpcUaError::subscription(SubscriptionError::terminate_failed(
                        subscription_id,
                        e.to_string(),
                    ))
                    .log("stop");
                }
            }
        }

        if std::mem::take(&mut held.session) {
            match self.transport.write().await.close_session().await {
                Ok(()) => tracing::info!(endpoint, "session closed"),
                Err(e) => {
                    self.stats.record_release_failure();
                    OpcUaError::session(SessionError::close_failed(endpoint, e.to_string()))
                        .log("stop");
                }
            }
        }

        if std::mem::take(&mut held.connected) {
            match self.transport.write().await.disconnect().await {
                Ok(()) => tracing::info!(endpoint, "disconnected"),
                Err(e) => {
                    self.stats.record_release_failure();
                    OpcUaError::connection(ConnectionError::disconnect_failed(
                        endpoint,
                        e.to_string(),
                    ))
                    .log("stop");
                }
            }
        }

        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("endpoint", &self.descriptor.endpoint)
            .field("state", &self.state())
            .field("subscription_id", &self.subscription_id())
            .field("monitors", &self.monitored_count())
            .finish()
    }
}

/// Drains one monitor's channel into its callback, in arrival order.
async fn deliver(
    node_id: String,
    mut receiver: mpsc::Receiver<DataChangeNotification>,
    callback: Arc<dyn MonitorCallback>,
    stats: Arc<ClientStats>,
) {
    while let Some(notification) = receiver.recv().await {
        stats.record_notification();
        callback.on_data_change(&node_id, notification).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::callback::{ChannelCallback, MonitorEvent};
    use crate::client::simulated::SimulatedTransportFactory;
    use crate::client::transport::TransportFactory;
    use std::time::Duration;

    fn fast_settings() -> ClientSettings {
        let mut settings = ClientSettings::default();
        settings.monitoring.sampling_interval = Duration::from_millis(10);
        settings
    }

    fn client(endpoint: &str) -> ProtocolClient {
        let descriptor = ConnectionDescriptor::anonymous(endpoint);
        let settings = fast_settings();
        let transport = SimulatedTransportFactory::new()
            .create(&descriptor, &settings.connection_strategy)
            .unwrap();
        ProtocolClient::new(descriptor, transport, settings)
    }

    #[tokio::test]
    async fn test_start_reaches_subscription_ready() {
        let client = client("opc.tcp://sim:4840");
        assert_eq!(client.state(), ClientState::Idle);

        client.start().await.unwrap();
        assert_eq!(client.state(), ClientState::SubscriptionReady);
        assert!(client.subscription_id().is_some());

        // Second start is a no-op.
        client.start().await.unwrap();
        assert_eq!(client.stats().starts(), 1);
    }

    #[tokio::test]
    async fn test_monitor_delivers_changes() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();

        let (callback, mut rx) = ChannelCallback::with_channel(16);
        let key = client.monitor("ns=3;i=1456", Arc::new(callback)).await;
        assert!(key.is_some());
        assert!(client.is_monitoring("ns=3;i=1456"));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            MonitorEvent::Changed { node_id, .. } => assert_eq!(node_id, "ns=3;i=1456"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_monitor_before_start_reports_error() {
        let client = client("opc.tcp://sim:4840");
        let (callback, mut rx) = ChannelCallback::with_channel(4);

        let key = client.monitor("ns=3;i=1456", Arc::new(callback)).await;
        assert!(key.is_none());
        assert!(matches!(rx.recv().await, Some(MonitorEvent::Failed { .. })));
        assert_eq!(client.stats().monitor_failures(), 1);
    }

    #[tokio::test]
    async fn test_invalid_node_id_reports_error() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();
        let (callback, mut rx) = ChannelCallback::with_channel(4);

        assert!(client.monitor("ns=3;x=1", Arc::new(callback)).await.is_none());
        match rx.recv().await {
            Some(MonitorEvent::Failed { error, .. }) => {
                assert!(matches!(error, OpcUaError::Monitor(MonitorError::InvalidNodeId { .. })))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_independent_monitors_on_same_node() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();

        let (a, _rx_a) = ChannelCallback::with_channel(16);
        let (b, _rx_b) = ChannelCallback::with_channel(16);
        let key_a = client.monitor("ns=2;s=Level", Arc::new(a)).await.unwrap();
        let key_b = client.monitor("ns=2;s=Level", Arc::new(b)).await.unwrap();
        assert_ne!(key_a, key_b);
        assert_eq!(client.monitored_count(), 2);

        client.unmonitor_key(key_a).await;
        assert_eq!(client.monitored_count(), 1);
        assert!(client.is_monitoring("ns=2;s=Level"));

        client.unmonitor("ns=2;s=Level").await;
        assert_eq!(client.monitored_count(), 0);
        assert!(!client.is_monitoring("ns=2;s=Level"));
    }

    #[tokio::test]
    async fn test_unmonitor_unknown_is_noop() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();
        client.unmonitor("ns=9;i=9").await;
        client.unmonitor_key(MonitorKey(42)).await;
        assert_eq!(client.monitored_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();
        let (callback, _rx) = ChannelCallback::with_channel(16);
        client.monitor("ns=3;i=1", Arc::new(callback)).await.unwrap();

        client.stop().await;
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.monitored_count(), 0);
        assert!(client.subscription_id().is_none());

        client.stop().await;
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let client = client("opc.tcp://sim:4840");
        client.start().await.unwrap();
        client.stop().await;
        client.start().await.unwrap();
        assert!(client.state().is_ready());
        assert_eq!(client.stats().starts(), 2);
    }
}
