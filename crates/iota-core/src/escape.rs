// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node identifier escaping.
//!
//! The context broker forbids some characters in payloads, yet OPC UA node
//! identifiers use them freely (`ns=3;i=1456`). Provisioned `object_id`s
//! therefore carry escape tokens which are translated back before a node
//! identifier reaches the protocol client.
//!
//! | Token | Character |
//! |-------|-----------|
//! | `&gt` | `<`       |
//! | `&lt` | `>`       |
//! | `&dq` | `"`       |
//! | `&sq` | `'`       |
//! | `&eq` | `=`       |
//! | `&sc` | `;`       |
//! | `&lp` | `(`       |
//! | `&rp` | `)`       |
//!
//! The `&gt`/`&lt` pair is inverted with respect to HTML entities. The
//! table is applied as-is.

/// Escape tokens and their replacement, applied in this order.
pub const FORBIDDEN_CHARACTERS: [(&str, &str); 8] = [
    ("&gt", "<"),
    ("&lt", ">"),
    ("&dq", "\""),
    ("&sq", "'"),
    ("&eq", "="),
    ("&sc", ";"),
    ("&lp", "("),
    ("&rp", ")"),
];

/// Replaces every escape token in `value` with the character it stands for.
///
/// # Examples
///
/// ```
/// use iota_core::escape::replace_forbidden_characters;
///
/// assert_eq!(replace_forbidden_characters("ns&eq3&sci&eq1456"), "ns=3;i=1456");
/// ```
pub fn replace_forbidden_characters(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    FORBIDDEN_CHARACTERS
        .iter()
        .fold(value.to_string(), |acc, (token, replacement)| {
            acc.replace(token, replacement)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_table() {
        assert_eq!(
            replace_forbidden_characters("&gt&lt&dq&sq&eq&sc&lp&rp"),
            "<>\"'=;()"
        );
    }

    #[test]
    fn test_node_ids() {
        assert_eq!(replace_forbidden_characters("ns&eq3&sci&eq1456"), "ns=3;i=1456");
        assert_eq!(
            replace_forbidden_characters("ns&eq2&scs&eqPump&lp1&rp.Speed"),
            "ns=2;s=Pump(1).Speed"
        );
    }

    #[test]
    fn test_untouched() {
        assert_eq!(replace_forbidden_characters("ns=3;i=1001"), "ns=3;i=1001");
        assert_eq!(replace_forbidden_characters("a & b"), "a & b");
        assert_eq!(replace_forbidden_characters(""), "");
    }
}
