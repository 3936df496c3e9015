use std::sync::OnceLock;

use regex::Regex;

pub const PEER_UNNORMALIZED_FLAG: &str = "peer_unnormalized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
    pub value: String,
    /// `false` when the input was kept verbatim because it is not a phone
    /// number (alphanumeric sender ids, e-mail gateways).
    pub normalized: bool,
}

/// Strips formatting punctuation and keeps a leading `+` plus digits.
#[must_use]
pub fn normalize_phone_number(raw: &str) -> NormalizedAddress {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return NormalizedAddress {
            value: String::new(),
            normalized: true,
        };
    }

    let stripped = formatting_regex().replace_all(trimmed, "");
    if dialable_regex().is_match(&stripped) {
        NormalizedAddress {
            value: stripped.into_owned(),
            normalized: true,
        }
    } else {
        NormalizedAddress {
            value: trimmed.to_string(),
            normalized: false,
        }
    }
}

/// Splits a multi-address field (`"a, b; c"`) into its non-empty members.
#[must_use]
pub fn split_addresses(raw: &str) -> Vec<&str> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

fn formatting_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"[\s\-().\/]").expect("phone formatting regex should compile")
    })
}

fn dialable_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\+?[0-9]+$").expect("dialable regex should compile"))
}
