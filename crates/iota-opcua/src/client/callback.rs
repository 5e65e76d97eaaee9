// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitor callbacks.
//!
//! A [`MonitorCallback`] receives the value changes of one monitor. The
//! protocol client drives it from a dedicated task, so calls for one node
//! arrive in server order and never overlap.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::OpcUaError;

use super::transport::DataChangeNotification;

/// Receives the outcome of one monitor registration.
#[async_trait]
pub trait MonitorCallback: Send + Sync {
    /// Called once per observed value change.
    async fn on_data_change(&self, node_id: &str, notification: DataChangeNotification);

    /// Called when the monitor could not be registered.
    async fn on_error(&self, node_id: &str, error: OpcUaError);
}

/// Outcome forwarded by a [`ChannelCallback`].
#[derive(Debug)]
pub enum MonitorEvent {
    /// A value change.
    Changed {
        /// Node the monitor was registered for.
        node_id: String,
        /// The change.
        notification: DataChangeNotification,
    },
    /// Registration failed.
    Failed {
        /// Node the monitor was registered for.
        node_id: String,
        /// The failure.
        error: OpcUaError,
    },
}

/// A callback that forwards everything into an mpsc channel.
pub struct ChannelCallback {
    sender: mpsc::Sender<MonitorEvent>,
}

impl ChannelCallback {
    /// Creates a new channel callback.
    pub fn new(sender: mpsc::Sender<MonitorEvent>) -> Self {
        Self { sender }
    }

    /// Creates a new channel callback with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl MonitorCallback for ChannelCallback {
    async fn on_data_change(&self, node_id: &str, notification: DataChangeNotification) {
        // Receiver gone means nobody is listening any more.
        let _ = self
            .sender
            .send(MonitorEvent::Changed {
                node_id: node_id.to_string(),
                notification,
            })
            .await;
    }

    async fn on_error(&self, node_id: &str, error: OpcUaError) {
        let _ = self
            .sender
            .send(MonitorEvent::Failed {
                node_id: node_id.to_string(),
                error,
            })
            .await;
    }
}
