//! Configuration surface for the isolation layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::shadow::VerifyMode;

/// Declarative configuration consumed by
/// [`LockerService::new`](crate::LockerService::new).
///
/// # Example
///
/// ```
/// use atrium_locker::{LockerConfig, VerifyMode};
///
/// let config: LockerConfig = serde_json::from_str(
///     r#"{ "verify_mode": "cardinality", "privileged_namespaces": ["internal"] }"#,
/// ).expect("valid config");
/// assert_eq!(config.verify_mode, VerifyMode::Cardinality);
/// assert!(config.privileged_namespaces.contains("internal"));
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct LockerConfig {
    /// How integrity sweeps compare recomputed shadow sets.
    #[serde(default)]
    pub verify_mode: VerifyMode,
    /// Namespaces exempt from wrapping, per host policy.
    #[serde(default)]
    pub privileged_namespaces: BTreeSet<String>,
}
