//! External key naming.
//!
//! Records use camelCase keys internally; the wire format is decided by a
//! [`KeyTransform`]. [`UnderscoreKeys`] is the snake_case convention used by
//! Rails-style APIs (`firstName` ↔ `first_name`, root `home_planet(s)`).

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

use crate::types::RelationshipKind;

/// Maps internal names to wire names and back.
pub trait KeyTransform {
    /// Wire key for an attribute.
    fn key_for_attribute(&self, attribute: &str) -> String;

    /// Wire key for a relationship.
    fn key_for_relationship(&self, key: &str, kind: RelationshipKind) -> String;

    /// Internal key for a wire key.
    fn internal_key(&self, wire_key: &str) -> String;

    /// Root key of a single-record payload.
    fn root_key(&self, type_name: &str) -> String;

    /// Root key of a multi-record payload.
    fn plural_root_key(&self, type_name: &str) -> String;

    /// Key a sideload bucket is rendered under.
    fn bucket_key(&self, type_name: &str) -> String;
}

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"))
}

fn underscore_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_-]+([A-Za-z0-9])").expect("static regex"))
}

/// `firstName` → `first_name`.
pub fn underscore(name: &str) -> String {
    camel_boundary()
        .replace_all(name, "${1}_${2}")
        .replace('-', "_")
        .to_lowercase()
}

/// `first_name` → `firstName`. Idempotent on camelCase input.
pub fn camelize(name: &str) -> String {
    underscore_boundary()
        .replace_all(name, |caps: &Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// Naive English plural of the last word: `villain` → `villains`,
/// `category` → `categories`, `box` → `boxes`.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") && !lower.ends_with("oy") && !lower.ends_with("uy") {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// snake_case wire keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreKeys;

impl KeyTransform for UnderscoreKeys {
    fn key_for_attribute(&self, attribute: &str) -> String {
        underscore(attribute)
    }

    fn key_for_relationship(&self, key: &str, _kind: RelationshipKind) -> String {
        underscore(key)
    }

    fn internal_key(&self, wire_key: &str) -> String {
        camelize(wire_key)
    }

    fn root_key(&self, type_name: &str) -> String {
        underscore(type_name)
    }

    fn plural_root_key(&self, type_name: &str) -> String {
        pluralize(&underscore(type_name))
    }

    fn bucket_key(&self, type_name: &str) -> String {
        pluralize(type_name)
    }
}
