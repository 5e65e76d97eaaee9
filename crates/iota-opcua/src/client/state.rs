// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol client state machine and statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// =============================================================================
// ClientState
// =============================================================================

/// Lifecycle state of a [`ProtocolClient`](super::ProtocolClient).
///
/// ```text
/// Idle → Connecting → Connected → SessionEstablishing → SessionReady
///      → SubscriptionEstablishing → SubscriptionReady → Stopping → Idle
/// ```
///
/// A failed transition releases what was acquired and returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Nothing is held.
    #[default]
    Idle,

    /// Transport connection in progress.
    Connecting,

    /// Transport connected, no session yet.
    Connected,

    /// Session creation in progress.
    SessionEstablishing,

    /// Session active, no subscription yet.
    SessionReady,

    /// Subscription creation in progress.
    SubscriptionEstablishing,

    /// Fully started; monitors may be registered.
    SubscriptionReady,

    /// Releasing resources.
    Stopping,
}

impl ClientState {
    /// Returns `true` if monitors can be registered.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::SubscriptionReady)
    }

    /// Returns `true` if the client is between two stable states.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::SessionEstablishing | Self::SubscriptionEstablishing | Self::Stopping
        )
    }

    /// Returns `true` if the client holds a transport connection.
    #[inline]
    pub fn holds_connection(&self) -> bool {
        !matches!(self, Self::Idle | Self::Connecting)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::SessionEstablishing => write!(f, "SessionEstablishing"),
            Self::SessionReady => write!(f, "SessionReady"),
            Self::SubscriptionEstablishing => write!(f, "SubscriptionEstablishing"),
            Self::SubscriptionReady => write!(f, "SubscriptionReady"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

// =============================================================================
// ClientStats
// =============================================================================

/// Counters for one protocol client.
#[derive(Debug, Default)]
pub struct ClientStats {
    starts: AtomicU64,
    start_failures: AtomicU64,
    monitors_created: AtomicU64,
    monitor_failures: AtomicU64,
    notifications: AtomicU64,
    connection_events: AtomicU64,
    release_failures: AtomicU64,
}

impl ClientStats {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful start.
    pub fn record_start(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed start.
    pub fn record_start_failure(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a registered monitor.
    pub fn record_monitor(&self) {
        self.monitors_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected monitor.
    pub fn record_monitor_failure(&self) {
        self.monitor_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delivered notification.
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnection event.
    pub fn record_connection_event(&self) {
        self.connection_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed release during stop.
    pub fn record_release_failure(&self) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of successful starts.
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Returns the number of failed starts.
    pub fn start_failures(&self) -> u64 {
        self.start_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of registered monitors.
    pub fn monitors_created(&self) -> u64 {
        self.monitors_created.load(Ordering::Relaxed)
    }

    /// Returns the number of rejected monitors.
    pub fn monitor_failures(&self) -> u64 {
        self.monitor_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of delivered notifications.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Returns the number of reconnection events.
    pub fn connection_events(&self) -> u64 {
        self.connection_events.load(Ordering::Relaxed)
    }

    /// Returns the number of failed releases.
    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_helpers() {
        assert!(ClientState::SubscriptionReady.is_ready());
        assert!(!ClientState::SessionReady.is_ready());
        assert!(ClientState::Connecting.is_transitioning());
        assert!(!ClientState::Idle.holds_connection());
        assert!(ClientState::SessionReady.holds_connection());
        assert_eq!(ClientState::default(), ClientState::Idle);
    }

    #[test]
    fn test_stats_counters() {
        let stats = ClientStats::new();
        stats.record_start();
        stats.record_monitor();
        stats.record_monitor();
        stats.record_release_failure();
        assert_eq!(stats.starts(), 1);
        assert_eq!(stats.monitors_created(), 2);
        assert_eq!(stats.release_failures(), 1);
        assert_eq!(stats.notifications(), 0);
    }
}
