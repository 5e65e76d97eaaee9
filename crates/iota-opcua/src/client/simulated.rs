// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process transport for development runs.
//!
//! Every monitored item produces a ramp value (`0.0, 1.0, 2.0, ...`) once
//! per sampling interval. No network traffic takes place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, MonitorError, OpcUaError, OpcUaResult, SessionError, SubscriptionError};
use crate::types::{
    ConnectionDescriptor, ConnectionStrategy, Credentials, MonitoringParameters, NodeId,
    SubscriptionParameters,
};

use super::transport::{
    ConnectionEvent, DataChangeNotification, OpcUaTransport, OpcUaValue, TransportFactory,
    TransportState,
};

/// Simulated OPC UA server connection.
pub struct SimulatedTransport {
    endpoint: String,
    state: TransportState,
    session: bool,
    next_id: AtomicU32,
    subscriptions: Mutex<HashMap<u32, HashMap<u32, JoinHandle<()>>>>,
    events: Option<broadcast::Sender<ConnectionEvent>>,
}

impl SimulatedTransport {
    /// Creates a transport for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: TransportState::Disconnected,
            session: false,
            next_id: AtomicU32::new(1),
            subscriptions: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    fn abort_all(&self) {
        for (_, items) in self.subscriptions.lock().drain() {
            for (_, task) in items {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl OpcUaTransport for SimulatedTransport {
    async fn connect(&mut self) -> OpcUaResult<()> {
        if !self.endpoint.starts_with("opc.tcp://") {
            self.state = TransportState::Failed;
            return Err(ConnectionError::invalid_endpoint(
                self.endpoint.clone(),
                "expected an opc.tcp:// URL",
            )
            .into());
        }
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        self.abort_all();
        self.session = false;
        self.state = TransportState::Disconnected;
        if let Some(events) = &self.events {
            let _ = events.send(ConnectionEvent::Closed);
        }
        Ok(())
    }

    async fn create_session(&mut self, _credentials: Option<&Credentials>) -> OpcUaResult<()> {
        if !self.state.is_connected() {
            return Err(OpcUaError::not_connected());
        }
        self.session = true;
        Ok(())
    }

    async fn close_session(&mut self) -> OpcUaResult<()> {
        self.abort_all();
        self.session = false;
        Ok(())
    }

    async fn create_subscription(&self, params: &SubscriptionParameters) -> OpcUaResult<u32> {
        if !self.session {
            return Err(SessionError::NotEstablished.into());
        }
        params.validate()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().insert(id, HashMap::new());
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let items = self
            .subscriptions
            .lock()
            .remove(&subscription_id)
            .ok_or(SubscriptionError::NotEstablished)?;
        for (_, task) in items {
            task.abort();
        }
        Ok(())
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        params: &MonitoringParameters,
        sender: mpsc::Sender<DataChangeNotification>,
    ) -> OpcUaResult<u32> {
        let mut subscriptions = self.subscriptions.lock();
        let items = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
            MonitorError::registration_failed(node_id.to_string(), "BadSubscriptionIdInvalid")
        })?;

        let item_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let node_id = node_id.clone();
        let interval = params.sampling_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut step = 0u64;
            loop {
                ticker.tick().await;
                let value = OpcUaValue::Double(step as f64);
                if sender
                    .send(DataChangeNotification::new(node_id.clone(), value))
                    .await
                    .is_err()
                {
                    break;
                }
                step += 1;
            }
        });
        items.insert(item_id, task);
        Ok(item_id)
    }

    async fn delete_monitored_item(&self, subscription_id: u32, item_id: u32) -> OpcUaResult<()> {
        let task = self
            .subscriptions
            .lock()
            .get_mut(&subscription_id)
            .and_then(|items| items.remove(&item_id));
        match task {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(MonitorError::terminate_failed(
                item_id.to_string(),
                "BadMonitoredItemIdInvalid",
            )
            .into()),
        }
    }

    fn set_event_sink(&mut self, events: broadcast::Sender<ConnectionEvent>) {
        self.events = Some(events);
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Factory for [`SimulatedTransport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTransportFactory;

impl SimulatedTransportFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for SimulatedTransportFactory {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
        _strategy: &ConnectionStrategy,
    ) -> OpcUaResult<Box<dyn OpcUaTransport>> {
        Ok(Box::new(SimulatedTransport::new(descriptor.endpoint.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_non_opc_endpoint() {
        let mut transport = SimulatedTransport::new("http://plc:4840");
        assert!(transport.connect().await.is_err());
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[tokio::test]
    async fn test_ramp_values() {
        let mut transport = SimulatedTransport::new("opc.tcp://sim:4840");
        transport.connect().await.unwrap();
        transport.create_session(None).await.unwrap();
        let sub = transport
            .create_subscription(&SubscriptionParameters::default())
            .await
            .unwrap();

        let params = MonitoringParameters {
            sampling_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(8);
        transport
            .create_monitored_item(sub, &NodeId::numeric(3, 1), &params, tx)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.value, OpcUaValue::Double(0.0));
        assert_eq!(second.value, OpcUaValue::Double(1.0));

        transport.delete_subscription(sub).await.unwrap();
        assert!(transport.delete_subscription(sub).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_requires_session() {
        let mut transport = SimulatedTransport::new("opc.tcp://sim:4840");
        transport.connect().await.unwrap();
        assert!(transport
            .create_subscription(&SubscriptionParameters::default())
            .await
            .is_err());
    }
}
