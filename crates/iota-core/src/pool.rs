// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol client pool.
//!
//! One [`ProtocolClient`] per endpoint, shared by every device that talks
//! to it. Clients live until [`ClientPool::remove_all`]; there is no
//! reference counting or per-device eviction.
//!
//! `remove_all` also closes the pool: no client is handed out or created
//! until [`ClientPool::reopen`].
//!
//! # Concurrency
//!
//! Lookups go through a `DashMap` and never block. Creation is serialized
//! by a single async mutex held across the check, the client `start` and
//! the insert, so simultaneous provisioning requests for one endpoint end
//! up with the same client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use iota_opcua::{
    ClientSettings, ConnectionDescriptor, ConnectionError, OpcUaResult, ProtocolClient, TransportFactory,
};
use tokio::sync::Mutex;

/// Endpoint-keyed pool of started protocol clients.
pub struct ClientPool {
    clients: DashMap<String, Arc<ProtocolClient>>,
    creation: Mutex<()>,
    closed: AtomicBool,
    factory: Arc<dyn TransportFactory>,
    settings: ClientSettings,
}

impl ClientPool {
    /// Creates an empty pool building transports with `factory`.
    pub fn new(factory: Arc<dyn TransportFactory>, settings: ClientSettings) -> Self {
        Self {
            clients: DashMap::new(),
            creation: Mutex::new(()),
            closed: AtomicBool::new(false),
            factory,
            settings,
        }
    }

    /// Returns the started client for `descriptor.endpoint`, creating and
    /// starting it on first use.
    ///
    /// A client whose `start` fails is not pooled, so a later call may try
    /// again.
    ///
    /// # Errors
    ///
    /// Transport creation or `start` failures, or a `Failed` connection
    /// error while the pool is closed.
    pub async fn get_or_create(&self, descriptor: &ConnectionDescriptor) -> OpcUaResult<Arc<ProtocolClient>> {
        self.ensure_open(&descriptor.endpoint)?;
        if let Some(client) = self.get(&descriptor.endpoint) {
            self.check_security(&client, descriptor);
            return Ok(client);
        }

        let _guard = self.creation.lock().await;
        self.ensure_open(&descriptor.endpoint)?;

        // Another request may have created it while we waited.
        if let Some(client) = self.get(&descriptor.endpoint) {
            self.check_security(&client, descriptor);
            return Ok(client);
        }

        tracing::debug!(
            endpoint = %descriptor.endpoint,
            factory = self.factory.name(),
            "No pooled client for endpoint"
        );

        let transport = self
            .factory
            .create(descriptor, &self.settings.connection_strategy)?;
        let client = Arc::new(ProtocolClient::new(
            descriptor.clone(),
            transport,
            self.settings.clone(),
        ));

        client.start().await?;

        self.clients
            .insert(descriptor.endpoint.clone(), Arc::clone(&client));
        tracing::info!(
            endpoint = %descriptor.endpoint,
            pool_size = self.clients.len(),
            "OPC UA client added to pool"
        );

        Ok(client)
    }

    /// Returns the pooled client for `endpoint`.
    pub fn get(&self, endpoint: &str) -> Option<Arc<ProtocolClient>> {
        self.clients.get(endpoint).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the number of pooled clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Returns the pooled endpoints, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        endpoints.sort();
        endpoints
    }

    /// Returns `true` between [`remove_all`](Self::remove_all) and
    /// [`reopen`](Self::reopen).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Accepts client requests again after `remove_all`.
    pub fn reopen(&self) {
        if self.closed.swap(false, Ordering::AcqRel) {
            tracing::debug!("Client pool reopened");
        }
    }

    /// Closes the pool, stops every pooled client concurrently, then
    /// empties it.
    pub async fn remove_all(&self) {
        let _guard = self.creation.lock().await;
        self.closed.store(true, Ordering::Release);

        let clients: Vec<Arc<ProtocolClient>> =
            self.clients.iter().map(|e| Arc::clone(e.value())).collect();
        if clients.is_empty() {
            return;
        }

        tracing::info!(clients = clients.len(), "Stopping all OPC UA clients");
        join_all(clients.iter().map(|client| client.stop())).await;

        self.clients.clear();
        tracing::info!("All OPC UA clients stopped");
    }

    fn ensure_open(&self, endpoint: &str) -> OpcUaResult<()> {
        if self.is_closed() {
            tracing::debug!(endpoint, "Client requested from closed pool");
            return Err(ConnectionError::failed(endpoint, "client pool is closed").into());
        }
        Ok(())
    }

    fn check_security(&self, client: &ProtocolClient, requested: &ConnectionDescriptor) {
        if !client.descriptor().same_security(requested) {
            tracing::warn!(
                endpoint = %requested.endpoint,
                pooled_mode = %client.descriptor().security_mode,
                pooled_policy = %client.descriptor().security_policy,
                requested_mode = %requested.security_mode,
                requested_policy = %requested.security_policy,
                "Reusing pooled client with different security settings"
            );
        }
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("factory", &self.factory.name())
            .field("endpoints", &self.endpoints())
            .finish()
    }
}
