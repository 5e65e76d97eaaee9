// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connection and monitoring types.
//!
//! - **NodeId**: node identifier parsing (`ns=3;i=1456`, `ns=2;s=Tank.Level`)
//! - **SecurityMode/Policy**: the enumerated security settings
//! - **ConnectionDescriptor**: everything needed to open one endpoint
//! - **ConnectionStrategy**: reconnection backoff handed to the stack
//! - **SubscriptionParameters / MonitoringParameters**: request settings
//!
//! # Examples
//!
//! ```
//! use iota_opcua::types::{ConnectionDescriptor, NodeId, SecurityMode, SecurityPolicy};
//!
//! let node: NodeId = "ns=3;i=1456".parse().unwrap();
//! assert_eq!(node.namespace_index, 3);
//!
//! let descriptor = ConnectionDescriptor::new(
//!     "opc.tcp://localhost:4840",
//!     SecurityMode::None,
//!     SecurityPolicy::None,
//!     None,
//! )
//! .unwrap();
//! assert!(descriptor.credentials.is_none());
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, MonitorError, OpcUaError, OpcUaResult};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// Byte-string identifiers are not supported; attributes are addressed by
/// numeric, string or GUID identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Converts to the OPC UA string format `ns=<namespace>;{i|s|g}=<id>`.
    pub fn to_opc_string(&self) -> String {
        let id_str = match &self.identifier {
            NodeIdentifier::Numeric(v) => format!("i={}", v),
            NodeIdentifier::String(v) => format!("s={}", v),
            NodeIdentifier::Guid(v) => format!("g={}", v),
        };

        if self.namespace_index == 0 {
            id_str
        } else {
            format!("ns={};{}", self.namespace_index, id_str)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| OpcUaError::monitor(MonitorError::invalid_node_id(s, reason));

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".into()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("Invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {}", e)))?,
            )
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s= or g=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Every accepted mode, in protocol order.
    pub const ALL: [SecurityMode; 3] = [Self::None, Self::Sign, Self::SignAndEncrypt];

    /// Returns `true` if this mode signs messages and therefore needs
    /// user credentials.
    #[inline]
    pub const fn requires_credentials(&self) -> bool {
        matches!(self, Self::Sign | Self::SignAndEncrypt)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }

    /// Returns the accepted names joined with `", "`.
    pub fn possible_values() -> String {
        Self::ALL.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::InvalidSecurityMode {
                    mode: s.to_string(),
                    possible: Self::possible_values(),
                },
            )),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,

    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,

    /// Basic256 (deprecated).
    Basic256,

    /// Basic256Sha256.
    Basic256Sha256,

    /// Aes128_Sha256_RsaOaep.
    #[serde(rename = "Aes128_Sha256_RsaOaep")]
    Aes128Sha256RsaOaep,

    /// Aes256_Sha256_RsaPss.
    #[serde(rename = "Aes256_Sha256_RsaPss")]
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Every accepted policy.
    pub const ALL: [SecurityPolicy; 6] = [
        Self::None,
        Self::Basic128Rsa15,
        Self::Basic256,
        Self::Basic256Sha256,
        Self::Aes128Sha256RsaOaep,
        Self::Aes256Sha256RsaPss,
    ];

    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the policy name as it appears in the URI fragment.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }

    /// Returns the accepted names joined with `", "`.
    pub fn possible_values() -> String {
        Self::ALL.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    /// Accepts a policy name or its full URI.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit_once('#').map_or(s, |(_, fragment)| fragment);

        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::InvalidSecurityPolicy {
                    policy: s.to_string(),
                    possible: Self::possible_values(),
                },
            )),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// User name / password identity for a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// User name.
    pub user_name: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

// =============================================================================
// ConnectionDescriptor
// =============================================================================

/// Validated connection parameters for one endpoint.
///
/// Built fresh for every provisioning request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    /// Endpoint URL, also the pool key.
    pub endpoint: String,
    /// Message security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// Session identity. Anonymous when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl ConnectionDescriptor {
    /// Creates a descriptor, enforcing that signing modes carry complete
    /// credentials.
    pub fn new(
        endpoint: impl Into<String>,
        security_mode: SecurityMode,
        security_policy: SecurityPolicy,
        credentials: Option<Credentials>,
    ) -> OpcUaResult<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "endpoint",
                "endpoint cannot be empty",
            )));
        }

        if security_mode.requires_credentials() {
            let complete = credentials
                .as_ref()
                .is_some_and(|c| !c.user_name.is_empty() && !c.password.is_empty());
            if !complete {
                return Err(OpcUaError::configuration(
                    ConfigurationError::MissingCredentials {
                        mode: security_mode.to_string(),
                    },
                ));
            }
        }

        Ok(Self {
            endpoint,
            security_mode,
            security_policy,
            credentials,
        })
    }

    /// Creates an unsecured, anonymous descriptor.
    pub fn anonymous(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            credentials: None,
        }
    }

    /// Returns `true` if both descriptors negotiate the same security.
    pub fn same_security(&self, other: &Self) -> bool {
        self.security_mode == other.security_mode
            && self.security_policy == other.security_policy
            && self.credentials.as_ref().map(|c| &c.user_name)
                == other.credentials.as_ref().map(|c| &c.user_name)
    }
}

// =============================================================================
// ConnectionStrategy
// =============================================================================

/// Reconnection backoff handed to the protocol stack.
///
/// Delays double from `initial_delay` and never exceed `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStrategy {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum number of retries.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_retry() -> u32 {
    5
}

fn default_max_delay() -> Duration {
    Duration::from_millis(5000)
}

impl Default for ConnectionStrategy {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_retry: default_max_retry(),
            max_delay: default_max_delay(),
        }
    }
}

impl ConnectionStrategy {
    /// Returns the delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Validates the strategy.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_retry == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_retry",
                "must be at least 1",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigurationError::invalid_value(
                "initial_delay",
                "must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// SubscriptionParameters
// =============================================================================

/// Subscription request settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionParameters {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Lifetime count in publishing intervals.
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub max_keepalive_count: u32,

    /// Maximum notifications per publish.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Priority (0-255).
    #[serde(default)]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    1000
}

fn default_keepalive_count() -> u32 {
    12
}

fn default_max_notifications() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionParameters {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            max_keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: 0,
            publishing_enabled: true,
        }
    }
}

impl SubscriptionParameters {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.publishing_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "publishing_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// MonitoringParameters
// =============================================================================

/// Monitored item request settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringParameters {
    /// Sampling interval.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size, also the capacity of the local channel.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Discard the oldest value when the queue is full.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_queue_size() -> u32 {
    100
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            discard_oldest: true,
        }
    }
}

impl MonitoringParameters {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sampling_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "sampling_interval",
                "must be greater than zero",
            ));
        }
        if self.queue_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Returns the local channel capacity.
    pub fn channel_capacity(&self) -> usize {
        self.queue_size.max(1) as usize
    }
}

// =============================================================================
// ClientSettings
// =============================================================================

/// Settings shared by every pooled client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Application name presented to servers.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Reconnection backoff.
    #[serde(default)]
    pub connection_strategy: ConnectionStrategy,

    /// Subscription request settings.
    #[serde(default)]
    pub subscription: SubscriptionParameters,

    /// Monitored item request settings.
    #[serde(default)]
    pub monitoring: MonitoringParameters,
}

fn default_application_name() -> String {
    "OPC UA IoT Agent".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            connection_strategy: ConnectionStrategy::default(),
            subscription: SubscriptionParameters::default(),
            monitoring: MonitoringParameters::default(),
        }
    }
}

impl ClientSettings {
    /// Validates all nested settings.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "application_name",
                "cannot be empty",
            ));
        }
        self.connection_strategy.validate()?;
        self.subscription.validate()?;
        self.monitoring.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        let node: NodeId = "ns=3;i=1456".parse().unwrap();
        assert_eq!(node, NodeId::numeric(3, 1456));

        let node: NodeId = "ns=2;s=Tank.Level".parse().unwrap();
        assert_eq!(node, NodeId::string(2, "Tank.Level"));

        let node: NodeId = "i=2253".parse().unwrap();
        assert_eq!(node.namespace_index, 0);
        assert_eq!(node.to_string(), "i=2253");
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;g=not-a-guid".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_security_mode_from_str() {
        assert_eq!("None".parse::<SecurityMode>().unwrap(), SecurityMode::None);
        assert_eq!(
            "SignAndEncrypt".parse::<SecurityMode>().unwrap(),
            SecurityMode::SignAndEncrypt
        );
        let err = "Bogus".parse::<SecurityMode>().unwrap_err();
        assert!(err.to_string().contains("None, Sign, SignAndEncrypt"));
    }

    #[test]
    fn test_security_policy_from_str_accepts_uri() {
        assert_eq!(
            SecurityPolicy::Basic256Sha256.uri().parse::<SecurityPolicy>().unwrap(),
            SecurityPolicy::Basic256Sha256
        );
        assert_eq!(
            "Aes128_Sha256_RsaOaep".parse::<SecurityPolicy>().unwrap(),
            SecurityPolicy::Aes128Sha256RsaOaep
        );
        assert!("Basic512".parse::<SecurityPolicy>().is_err());
    }

    #[test]
    fn test_descriptor_requires_credentials_for_signing() {
        let result = ConnectionDescriptor::new(
            "opc.tcp://plc:4840",
            SecurityMode::Sign,
            SecurityPolicy::Basic256Sha256,
            None,
        );
        assert!(matches!(
            result,
            Err(OpcUaError::Configuration(ConfigurationError::MissingCredentials { .. }))
        ));

        let result = ConnectionDescriptor::new(
            "opc.tcp://plc:4840",
            SecurityMode::Sign,
            SecurityPolicy::Basic256Sha256,
            Some(Credentials::new("operator", "")),
        );
        assert!(result.is_err());

        let ok = ConnectionDescriptor::new(
            "opc.tcp://plc:4840",
            SecurityMode::SignAndEncrypt,
            SecurityPolicy::Basic256Sha256,
            Some(Credentials::new("operator", "secret")),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("operator", "secret"));
        assert!(debug.contains("operator"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_connection_strategy_backoff() {
        let strategy = ConnectionStrategy::default();
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(strategy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(strategy.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(strategy.delay_for_attempt(40), Duration::from_millis(5000));
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_agent_policy() {
        let sub = SubscriptionParameters::default();
        assert_eq!(sub.publishing_interval, Duration::from_secs(1));
        assert_eq!(sub.lifetime_count, 1000);
        assert_eq!(sub.max_keepalive_count, 12);
        assert_eq!(sub.max_notifications_per_publish, 1000);

        let mon = MonitoringParameters::default();
        assert_eq!(mon.sampling_interval, Duration::from_secs(1));
        assert_eq!(mon.queue_size, 100);
        assert!(mon.discard_oldest);
    }
}
