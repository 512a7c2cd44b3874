//! Component definition objects consumed at the isolation boundary.
//!
//! The component model hands the isolation layer a definition identifying
//! which namespace a piece of code belongs to. Only the descriptor is
//! modelled here; markup, attributes, and rendering metadata stay with the
//! component subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a [`DefDescriptor`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefParseError {
    /// The namespace separator (`:`) was missing.
    #[error("descriptor '{0}' is missing the namespace separator ':'")]
    MissingSeparator(String),
    /// The namespace half was empty.
    #[error("descriptor '{0}' has an empty namespace")]
    EmptyNamespace(String),
    /// The name half was empty.
    #[error("descriptor '{0}' has an empty name")]
    EmptyName(String),
}

/// Qualified descriptor of a component definition, `namespace:name`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DefDescriptor {
    namespace: String,
    name: String,
}

impl DefDescriptor {
    /// Creates a descriptor from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the namespace half.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the name half.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DefDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for DefDescriptor {
    type Err = DefParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = input
            .split_once(':')
            .ok_or_else(|| DefParseError::MissingSeparator(input.to_owned()))?;
        if namespace.is_empty() {
            return Err(DefParseError::EmptyNamespace(input.to_owned()));
        }
        if name.is_empty() {
            return Err(DefParseError::EmptyName(input.to_owned()));
        }
        Ok(Self::new(namespace, name))
    }
}

/// A component definition as seen by the isolation layer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ComponentDef {
    descriptor: DefDescriptor,
}

impl ComponentDef {
    /// Creates a definition wrapping the given descriptor.
    #[must_use]
    pub const fn new(descriptor: DefDescriptor) -> Self {
        Self { descriptor }
    }

    /// Returns the descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &DefDescriptor {
        &self.descriptor
    }

    /// Returns the isolation namespace this definition belongs to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.descriptor.namespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let descriptor: DefDescriptor = "ui:button".parse().expect("parse");
        assert_eq!(descriptor.namespace(), "ui");
        assert_eq!(descriptor.name(), "button");
        assert_eq!(descriptor.to_string(), "ui:button");
    }

    #[test]
    fn rejects_missing_separator() {
        let err = "uibutton".parse::<DefDescriptor>().expect_err("no colon");
        assert_eq!(err, DefParseError::MissingSeparator("uibutton".into()));
    }

    #[test]
    fn rejects_empty_halves() {
        assert_eq!(
            ":button".parse::<DefDescriptor>().expect_err("namespace"),
            DefParseError::EmptyNamespace(":button".into())
        );
        assert_eq!(
            "ui:".parse::<DefDescriptor>().expect_err("name"),
            DefParseError::EmptyName("ui:".into())
        );
    }

    #[test]
    fn component_def_exposes_its_namespace() {
        let def = ComponentDef::new(DefDescriptor::new("ns1", "panel"));
        assert_eq!(def.namespace(), "ns1");
    }

    #[test]
    fn descriptor_serde_round_trip() {
        let descriptor = DefDescriptor::new("ui", "button");
        let text = serde_json::to_string(&descriptor).expect("serialise");
        let back: DefDescriptor = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, descriptor);
    }
}
