// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection parameter resolution.
//!
//! Turns the internal attributes of a provisioning payload into a
//! [`ConnectionDescriptor`]. Every problem is collected; the caller gets the
//! full list rather than the first failure.
//!
//! # Expected Attributes
//!
//! ```json
//! {
//!   "opcuaEndpoint": "opc.tcp://plc-1:4840",
//!   "opcuaSecurityMode": "SignAndEncrypt",
//!   "opcuaSecurityPolicy": "Basic256Sha256",
//!   "opcuaCredentials": { "userName": "operator", "password": "secret" }
//! }
//! ```
//!
//! The attributes may also arrive as an array of objects, which are merged
//! in order.

use iota_opcua::{ConnectionDescriptor, Credentials, SecurityMode, SecurityPolicy};
use serde_json::{Map, Value as JsonValue};

use crate::error::ValidationErrors;

/// Internal attribute holding the endpoint URL.
pub const ENDPOINT_ATTR: &str = "opcuaEndpoint";
/// Internal attribute holding the security mode.
pub const SECURITY_MODE_ATTR: &str = "opcuaSecurityMode";
/// Internal attribute holding the security policy.
pub const SECURITY_POLICY_ATTR: &str = "opcuaSecurityPolicy";
/// Internal attribute holding the credentials object.
pub const CREDENTIALS_ATTR: &str = "opcuaCredentials";

/// Resolves connection parameters from provisioning internal attributes.
///
/// `None`, `null` and values that are neither an object nor an array count
/// as absent.
///
/// # Errors
///
/// The ordered list of every problem found.
pub fn resolve(internal_attributes: Option<&JsonValue>) -> Result<ConnectionDescriptor, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let Some(attributes) = internal_attributes.and_then(merge_attributes) else {
        errors.push("internalAttributes can't be empty!");
        return Err(errors);
    };

    let endpoint = required_text(&attributes, ENDPOINT_ATTR, &mut errors);
    let mode_text = required_text(&attributes, SECURITY_MODE_ATTR, &mut errors);
    let policy_text = required_text(&attributes, SECURITY_POLICY_ATTR, &mut errors);

    let security_mode = mode_text.and_then(|mode| match mode.parse::<SecurityMode>() {
        Ok(mode) => Some(mode),
        Err(_) => {
            errors.push(format!(
                "Security Mode provided is not valid. Possible values: {}",
                SecurityMode::possible_values()
            ));
            None
        }
    });

    let security_policy = policy_text.and_then(|policy| match policy.parse::<SecurityPolicy>() {
        Ok(policy) => Some(policy),
        Err(_) => {
            errors.push(format!(
                "Security Policy provided is not valid. Possible values: {}",
                SecurityPolicy::possible_values()
            ));
            None
        }
    });

    let credentials = resolve_credentials(&attributes, security_mode, &mut errors);

    match (endpoint, security_mode, security_policy) {
        (Some(endpoint), Some(mode), Some(policy)) if errors.is_empty() => {
            ConnectionDescriptor::new(endpoint, mode, policy, credentials).map_err(|e| {
                let mut errors = ValidationErrors::new();
                errors.push(e.to_string());
                errors
            })
        }
        _ => Err(errors),
    }
}

fn merge_attributes(value: &JsonValue) -> Option<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Some(map.clone()),
        JsonValue::Array(items) => {
            let mut merged = Map::new();
            for item in items {
                if let JsonValue::Object(map) = item {
                    merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            Some(merged)
        }
        _ => None,
    }
}

/// Non-empty string value of `key`; anything else counts as not provided.
fn text<'a>(attributes: &'a Map<String, JsonValue>, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_text(
    attributes: &Map<String, JsonValue>,
    key: &str,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = text(attributes, key).map(str::to_string);
    if value.is_none() {
        errors.push(format!("{} was expected but it was not provided!", key));
    }
    value
}

/// Credentials are optional unless the mode signs messages. When given for
/// an unsigned mode they must still be complete.
fn resolve_credentials(
    attributes: &Map<String, JsonValue>,
    mode: Option<SecurityMode>,
    errors: &mut ValidationErrors,
) -> Option<Credentials> {
    let raw = attributes.get(CREDENTIALS_ATTR).filter(|v| !v.is_null());

    let Some(raw) = raw else {
        if let Some(mode) = mode.filter(SecurityMode::requires_credentials) {
            errors.push(format!(
                "Security Mode was {} but credentials were not provided!",
                mode
            ));
        }
        return None;
    };

    let object = raw.as_object().cloned().unwrap_or_default();
    let user_name = text(&object, "userName");
    let password = text(&object, "password");

    if user_name.is_none() {
        errors.push("credentials object has not key \"userName\"");
    }
    if password.is_none() {
        errors.push("credentials object has not key \"password\"");
    }

    Some(Credentials::new(user_name?, password?))
}

// =============================================================================
// Tests
// =============================================================================
