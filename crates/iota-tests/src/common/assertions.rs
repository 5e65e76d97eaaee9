// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with failure messages that name the device or
//! endpoint involved.

use iota_core::{AgentError, AttributeValue, ValidationErrors};

/// Asserts that `error` is a validation error and returns its messages.
#[track_caller]
pub fn expect_validation(error: AgentError) -> ValidationErrors {
    match error {
        AgentError::Validation(errors) => errors,
        other => panic!("Expected a validation error, got {:?}", other),
    }
}

/// Asserts that `errors` holds exactly `expected`, in order.
#[track_caller]
pub fn assert_messages(errors: &ValidationErrors, expected: &[&str]) {
    let actual: Vec<&str> = errors.messages().iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "Unexpected validation messages");
}

/// Asserts that no message in `errors` mentions any of `present`.
#[track_caller]
pub fn assert_not_mentioned(errors: &ValidationErrors, present: &[&str]) {
    for field in present {
        assert!(
            !errors.mentions(field),
            "Field {} was provided but is reported: {}",
            field,
            errors
        );
    }
}

/// Returns the value forwarded for `attribute`, failing if absent.
#[track_caller]
pub fn value_of<'a>(values: &'a [AttributeValue], attribute: &str) -> &'a str {
    values
        .iter()
        .find(|v| v.name == attribute)
        .map(|v| v.value.as_str())
        .unwrap_or_else(|| panic!("No value forwarded for attribute {}", attribute))
}
