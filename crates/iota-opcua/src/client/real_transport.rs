// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport backed by the `opcua` crate.
//!
//! `connect` discovers the server endpoint matching the requested security,
//! `create_session` opens the secure channel and activates the session, and
//! the session loop then runs on its own thread. Blocking stack calls are
//! moved off the runtime with [`tokio::task::spawn_blocking`].
//!
//! Endpoint discovery in `connect` is retried up to `max_retry` times with
//! [`ConnectionStrategy::delay_for_attempt`] between attempts, each one
//! reported as a backoff event. Lost sessions are retried by the stack
//! itself with `max_retry` and `initial_delay`; it has no notion of a
//! maximum delay.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use crate::client::transport::{
    ConnectionEvent, DataChangeNotification, OpcUaTransport, OpcUaValue, TransportFactory,
    TransportState,
};
use crate::error::{
    ConnectionError, MonitorError, OpcUaError, OpcUaResult, SessionError, SubscriptionError,
};
use crate::types::{
    ConnectionDescriptor, ConnectionStrategy, Credentials, MonitoringParameters,
    NodeId, NodeIdentifier, SecurityMode, SubscriptionParameters,
};

/// Notifications buffered for an item whose creation has not returned yet.
const MAX_EARLY_NOTIFICATIONS: usize = 16;

// =============================================================================
// Routing
// =============================================================================

/// Maps server monitored item ids to the channels of their monitors.
///
/// The stack invokes the data change callback from its session thread, and
/// may do so before `create_monitored_items` has returned the item id. Such
/// notifications wait in `early` until the route is installed.
#[derive(Default)]
struct Routes {
    senders: HashMap<u32, mpsc::Sender<DataChangeNotification>>,
    early: HashMap<u32, Vec<DataChangeNotification>>,
}

impl Routes {
    fn dispatch(&mut self, item_id: u32, notification: DataChangeNotification) {
        match self.senders.get(&item_id) {
            Some(sender) => {
                if let Err(e) = sender.try_send(notification) {
                    trace!(item_id, error = %e, "Dropping data change");
                }
            }
            None => {
                let buffered = self.early.entry(item_id).or_default();
                if buffered.len() < MAX_EARLY_NOTIFICATIONS {
                    buffered.push(notification);
                }
            }
        }
    }

    fn install(&mut self, item_id: u32, sender: mpsc::Sender<DataChangeNotification>) {
        for notification in self.early.remove(&item_id).unwrap_or_default() {
            let _ = sender.try_send(notification);
        }
        self.senders.insert(item_id, sender);
    }
}

type SharedRoutes = Arc<Mutex<Routes>>;

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// Transport speaking OPC UA binary over TCP.
pub struct RealOpcUaTransport {
    descriptor: ConnectionDescriptor,
    strategy: ConnectionStrategy,
    application_name: String,
    state: TransportState,

    client: Option<Client>,
    endpoint_description: Option<EndpointDescription>,
    session: Option<Arc<OpcUaRwLock<Session>>>,
    session_loop: Option<oneshot::Sender<SessionCommand>>,

    routes: Mutex<HashMap<u32, SharedRoutes>>,
    events: Option<broadcast::Sender<ConnectionEvent>>,
}

impl RealOpcUaTransport {
    /// Creates an unconnected transport.
    pub fn new(
        descriptor: ConnectionDescriptor,
        strategy: ConnectionStrategy,
        application_name: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            strategy,
            application_name: application_name.into(),
            state: TransportState::Disconnected,
            client: None,
            endpoint_description: None,
            session: None,
            session_loop: None,
            routes: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    fn build_client(&self) -> OpcUaResult<Client> {
        let application_uri = format!(
            "urn:{}",
            self.application_name.to_lowercase().replace(' ', "-")
        );

        ClientBuilder::new()
            .application_name(self.application_name.as_str())
            .application_uri(application_uri.as_str())
            .create_sample_keypair(true)
            .trust_server_certs(true)
            .session_retry_limit(self.strategy.max_retry as i32)
            .session_retry_interval(self.strategy.initial_delay.as_millis() as u32)
            .client()
            .ok_or_else(|| {
                ConnectionError::failed(&self.descriptor.endpoint, "invalid client configuration")
                    .into()
            })
    }

    fn security_policy(&self) -> opcua::crypto::SecurityPolicy {
        opcua::crypto::SecurityPolicy::from_uri(self.descriptor.security_policy.uri())
    }

    fn message_security_mode(&self) -> MessageSecurityMode {
        match self.descriptor.security_mode {
            SecurityMode::None => MessageSecurityMode::None,
            SecurityMode::Sign => MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn identity_token(credentials: Option<&Credentials>) -> IdentityToken {
        match credentials {
            Some(c) => IdentityToken::UserName(c.user_name.clone(), c.password.clone()),
            None => IdentityToken::Anonymous,
        }
    }

    fn session(&self) -> OpcUaResult<Arc<OpcUaRwLock<Session>>> {
        self.session
            .clone()
            .ok_or_else(|| SessionError::NotEstablished.into())
    }

    fn emit(events: &Option<broadcast::Sender<ConnectionEvent>>, event: ConnectionEvent) {
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }

    /// Error for a discovery that failed after `retries` retries.
    fn discovery_failure(endpoint: &str, retries: u32, cause: &str) -> ConnectionError {
        if retries == 0 {
            ConnectionError::failed(endpoint, cause)
        } else {
            warn!(endpoint, retries, error = cause, "Endpoint discovery retries exhausted");
            ConnectionError::retries_exhausted(endpoint, retries + 1)
        }
    }

    fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, v.clone())
            }
            NodeIdentifier::Guid(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, opcua::types::Guid::from(*v))
            }
        }
    }

    fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> Option<NodeId> {
        let namespace_index = node_id.namespace;
        match &node_id.identifier {
            Identifier::Numeric(v) => Some(NodeId::numeric(namespace_index, *v)),
            Identifier::String(v) => Some(NodeId::string(namespace_index, v.as_ref())),
            Identifier::Guid(v) => Some(NodeId {
                namespace_index,
                identifier: NodeIdentifier::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            }),
            Identifier::ByteString(_) => None,
        }
    }

    fn from_opcua_variant(variant: &Variant) -> OpcUaValue {
        match variant {
            Variant::Empty => OpcUaValue::Null,
            Variant::Boolean(v) => OpcUaValue::Boolean(*v),
            Variant::SByte(v) => OpcUaValue::SByte(*v),
            Variant::Byte(v) => OpcUaValue::Byte(*v),
            Variant::Int16(v) => OpcUaValue::Int16(*v),
            Variant::UInt16(v) => OpcUaValue::UInt16(*v),
            Variant::Int32(v) => OpcUaValue::Int32(*v),
            Variant::UInt32(v) => OpcUaValue::UInt32(*v),
            Variant::Int64(v) => OpcUaValue::Int64(*v),
            Variant::UInt64(v) => OpcUaValue::UInt64(*v),
            Variant::Float(v) => OpcUaValue::Float(*v),
            Variant::Double(v) => OpcUaValue::Double(*v),
            Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
            Variant::DateTime(v) => OpcUaValue::DateTime(v.as_chrono()),
            Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
            Variant::Array(arr) => {
                OpcUaValue::Array(arr.values.iter().map(Self::from_opcua_variant).collect())
            }
            other => OpcUaValue::String(format!("{:?}", other)),
        }
    }

    fn to_notification(item: &MonitoredItem) -> Option<DataChangeNotification> {
        let node_id = Self::from_opcua_node_id(&item.item_to_monitor().node_id)?;
        let data_value = item.last_value();
        Some(DataChangeNotification {
            node_id,
            value: data_value
                .value
                .as_ref()
                .map(Self::from_opcua_variant)
                .unwrap_or_default(),
            status_code: data_value.status.map(|s| s.bits()).unwrap_or(0),
            source_timestamp: data_value.source_timestamp.as_ref().map(|t| t.as_chrono()),
            server_timestamp: data_value.server_timestamp.as_ref().map(|t| t.as_chrono()),
        })
    }
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn connect(&mut self) -> OpcUaResult<()> {
        self.state = TransportState::Connecting;
        info!(endpoint = %self.descriptor.endpoint, "Connecting to OPC UA server");

        let mut client = match self.build_client() {
            Ok(client) => client,
            Err(e) => {
                self.state = TransportState::Failed;
                return Err(e);
            }
        };

        let mut attempt = 0;
        let endpoints = loop {
            let url = self.descriptor.endpoint.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let endpoints = client.get_server_endpoints_from_url(url.as_str());
                (client, endpoints)
            })
            .await
            .map_err(|e| ConnectionError::failed(&self.descriptor.endpoint, e.to_string()))?;
            client = returned;

            match result {
                Ok(endpoints) => break endpoints,
                Err(status) if attempt < self.strategy.max_retry => {
                    attempt += 1;
                    let delay = self.strategy.delay_for_attempt(attempt);
                    debug!(
                        endpoint = %self.descriptor.endpoint,
                        error = %status,
                        "Endpoint discovery failed"
                    );
                    Self::emit(&self.events, ConnectionEvent::Backoff { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Err(status) => {
                    self.state = TransportState::Failed;
                    return Err(
                        Self::discovery_failure(&self.descriptor.endpoint, attempt, &status.to_string())
                            .into(),
                    );
                }
            }
        };

        let policy_uri = self.security_policy().to_uri();
        let mode = self.message_security_mode();
        let Some(endpoint) = endpoints
            .into_iter()
            .find(|e| e.security_policy_uri.as_ref() == policy_uri && e.security_mode == mode)
        else {
            self.state = TransportState::Failed;
            return Err(ConnectionError::failed(
                &self.descriptor.endpoint,
                format!(
                    "no endpoint offers {} / {}",
                    self.descriptor.security_policy, self.descriptor.security_mode
                ),
            )
            .into());
        };

        debug!(
            security_policy = %endpoint.security_policy_uri,
            security_mode = ?endpoint.security_mode,
            "Found matching endpoint"
        );

        self.client = Some(client);
        self.endpoint_description = Some(endpoint);
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        if let Some(stop) = self.session_loop.take() {
            let _ = stop.send(SessionCommand::Stop);
        }
        if let Some(session) = self.session.take() {
            tokio::task::spawn_blocking(move || session.write().disconnect())
                .await
                .map_err(|e| ConnectionError::disconnect_failed(&self.descriptor.endpoint, e.to_string()))?;
        }
        self.routes.lock().clear();
        self.client = None;
        self.endpoint_description = None;
        self.state = TransportState::Disconnected;
        Self::emit(&self.events, ConnectionEvent::Closed);
        Ok(())
    }

    async fn create_session(&mut self, credentials: Option<&Credentials>) -> OpcUaResult<()> {
        let endpoint = self.descriptor.endpoint.clone();
        let (Some(client), Some(description)) =
            (self.client.as_mut(), self.endpoint_description.clone())
        else {
            return Err(OpcUaError::not_connected());
        };

        let session = client
            .new_session_from_endpoint(description, Self::identity_token(credentials))
            .map_err(|status| SessionError::creation_failed(&endpoint, status.to_string()))?;

        {
            let events = self.events.clone();
            let mut locked = session.write();
            locked.set_connection_status_callback(ConnectionStatusCallback::new(
                move |connected| {
                    let event = if connected {
                        ConnectionEvent::Reestablished
                    } else {
                        ConnectionEvent::Reconnecting
                    };
                    Self::emit(&events, event);
                },
            ));
        }

        let activating = Arc::clone(&session);
        let user_name = credentials.map(|c| c.user_name.clone());
        tokio::task::spawn_blocking(move || activating.write().connect_and_activate())
            .await
            .map_err(|e| SessionError::creation_failed(&endpoint, e.to_string()))?
            .map_err(|status| {
                let rejected = status == StatusCode::BadUserAccessDenied
                    || status == StatusCode::BadIdentityTokenRejected;
                match user_name {
                    Some(user) if rejected => SessionError::authentication_failed(&endpoint, user),
                    _ => SessionError::creation_failed(&endpoint, status.to_string()),
                }
            })?;

        self.session_loop = Some(Session::run_async(Arc::clone(&session)));
        self.session = Some(session);
        Ok(())
    }

    async fn close_session(&mut self) -> OpcUaResult<()> {
        if let Some(stop) = self.session_loop.take() {
            let _ = stop.send(SessionCommand::Stop);
        }
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.routes.lock().clear();
        tokio::task::spawn_blocking(move || session.write().disconnect())
            .await
            .map_err(|e| SessionError::close_failed(&self.descriptor.endpoint, e.to_string()))?;
        Ok(())
    }

    async fn create_subscription(&self, params: &SubscriptionParameters) -> OpcUaResult<u32> {
        params.validate()?;
        let session = self.session()?;
        let routes: SharedRoutes = Arc::default();
        let callback_routes = Arc::clone(&routes);
        let params = *params;

        let subscription_id = tokio::task::spawn_blocking(move || {
            session.read().create_subscription(
                params.publishing_interval.as_millis() as f64,
                params.lifetime_count,
                params.max_keepalive_count,
                params.max_notifications_per_publish,
                params.priority,
                params.publishing_enabled,
                DataChangeCallback::new(move |items| {
                    let mut routes = callback_routes.lock();
                    for item in items {
                        if let Some(notification) = Self::to_notification(item) {
                            routes.dispatch(item.id(), notification);
                        }
                    }
                }),
            )
        })
        .await
        .map_err(|e| SubscriptionError::creation_failed(&self.descriptor.endpoint, e.to_string()))?
        .map_err(|status| {
            SubscriptionError::creation_failed(&self.descriptor.endpoint, status.to_string())
        })?;

        self.routes.lock().insert(subscription_id, routes);
        Ok(subscription_id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let session = self.session()?;
        self.routes.lock().remove(&subscription_id);

        tokio::task::spawn_blocking(move || session.read().delete_subscription(subscription_id))
            .await
            .map_err(|e| SubscriptionError::terminate_failed(subscription_id, e.to_string()))?
            .map_err(|status| SubscriptionError::terminate_failed(subscription_id, status.to_string()))?;
        Ok(())
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        params: &MonitoringParameters,
        sender: mpsc::Sender<DataChangeNotification>,
    ) -> OpcUaResult<u32> {
        let session = self.session()?;
        let routes = self
            .routes
            .lock()
            .get(&subscription_id)
            .cloned()
            .ok_or(SubscriptionError::NotEstablished)?;

        let node = node_id.to_string();
        let request = MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId {
                node_id: Self::to_opcua_node_id(node_id),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            },
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: opcua::types::MonitoringParameters {
                client_handle: 0,
                sampling_interval: params.sampling_interval.as_millis() as f64,
                filter: ExtensionObject::null(),
                queue_size: params.queue_size,
                discard_oldest: params.discard_oldest,
            },
        };

        let results = tokio::task::spawn_blocking(move || {
            session
                .read()
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[request])
        })
        .await
        .map_err(|e| MonitorError::registration_failed(&node, e.to_string()))?
        .map_err(|status| MonitorError::registration_failed(&node, status.to_string()))?;

        let result = results
            .into_iter()
            .next()
            .ok_or_else(|| MonitorError::registration_failed(&node, "empty response"))?;
        if !result.status_code.is_good() {
            return Err(MonitorError::registration_failed(&node, result.status_code.to_string()).into());
        }

        routes.lock().install(result.monitored_item_id, sender);
        Ok(result.monitored_item_id)
    }

    async fn delete_monitored_item(&self, subscription_id: u32, item_id: u32) -> OpcUaResult<()> {
        let session = self.session()?;
        if let Some(routes) = self.routes.lock().get(&subscription_id) {
            routes.lock().senders.remove(&item_id);
        }

        tokio::task::spawn_blocking(move || {
            session
                .read()
                .delete_monitored_items(subscription_id, &[item_id])
        })
        .await
        .map_err(|e| MonitorError::terminate_failed(item_id.to_string(), e.to_string()))?
        .map_err(|status| MonitorError::terminate_failed(item_id.to_string(), status.to_string()))?;
        Ok(())
    }

    fn set_event_sink(&mut self, events: broadcast::Sender<ConnectionEvent>) {
        self.events = Some(events);
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn endpoint(&self) -> &str {
        &self.descriptor.endpoint
    }
}

impl Drop for RealOpcUaTransport {
    fn drop(&mut self) {
        if let Some(stop) = self.session_loop.take() {
            if stop.send(SessionCommand::Stop).is_err() {
                warn!(endpoint = %self.descriptor.endpoint, "Session loop already stopped");
            }
        }
    }
}

// =============================================================================
// RealTransportFactory
// =============================================================================

/// Factory for [`RealOpcUaTransport`].
#[derive(Debug, Clone)]
pub struct RealTransportFactory {
    application_name: String,
}

impl RealTransportFactory {
    /// Creates the factory. `application_name` is announced to servers.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
        }
    }
}

impl TransportFactory for RealTransportFactory {
    fn name(&self) -> &'static str {
        "opcua"
    }

    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
        strategy: &ConnectionStrategy,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
        strategy.validate()?;
        Ok(Box::new(RealOpcUaTransport::new(
            descriptor.clone(),
            *strategy,
            self.application_name.clone(),
        )))
    }
}
