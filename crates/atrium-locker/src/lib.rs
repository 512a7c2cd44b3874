//! Capability isolation for Atrium component namespaces.
//!
//! The `atrium-locker` crate lets mutually-distrusting component
//! namespaces execute as co-resident code inside one shared runtime
//! environment without being able to see, forge, or tamper with each
//! other's objects or the shared global state. Each piece of submitted
//! source is realised as a **locker**: an isolated execution unit bound to
//! exactly one namespace's capability key.
//!
//! # Architecture
//!
//! Construction flows through a fixed pipeline. The
//! [`preprocess`](preprocess::preprocess) stage statically rejects
//! prototype-tampering tokens and redirects dynamic evaluation back into
//! the pipeline; the [shadow calculator](shadow::compute_shadows)
//! snapshots the ambient global name set for later integrity sweeps; the
//! [environment cache](EnvironmentCache) supplies the namespace's secure
//! substitutes for the shared globals, minted by the
//! [`WrapperFactory`]; and the bound unit executes against exactly those
//! substitutes — the execution facility has no ambient global lookup at
//! all. Every live locker is tracked by a [`LockerRegistry`] supporting
//! registry-wide re-verification and teardown.
//!
//! Authority is modelled with unforgeable [`CapabilityKey`]s issued one
//! per namespace by the [`KeyRegistry`], which also tags objects with
//! their owning key entirely out-of-band. Unwrapping a secure wrapper back
//! to the real object requires the master key, held only by the trusted
//! host.
//!
//! # Example
//!
//! ```rust
//! use atrium_locker::{LockerConfig, LockerService};
//! use atrium_script::Value;
//!
//! # fn main() -> Result<(), atrium_locker::LockerError> {
//! let service = LockerService::new(LockerConfig::default());
//! let key = service.issue_key("ns1");
//!
//! // The locker executes immediately; its result is fixed thereafter.
//! let locker = service.create("return 1 + 1;", &key, &Default::default())?;
//! assert_eq!(locker.result(), &Value::Int(2));
//!
//! // The shared document is only ever seen through a secure wrapper.
//! let proxy = service.create("return $document;", &key, &Default::default())?;
//! assert_ne!(proxy.result(), &service.globals().get("document").unwrap_or(Value::Undefined));
//!
//! assert!(service.verify_all());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod def;
pub mod environment;
pub mod error;
pub mod globals;
pub mod key;
pub mod locker;
mod pipeline;
pub mod policy;
pub mod preprocess;
pub mod registry;
pub mod service;
pub mod shadow;
pub mod wrapper;

#[cfg(test)]
mod tests;

pub use self::config::LockerConfig;
pub use self::def::{ComponentDef, DefDescriptor, DefParseError};
pub use self::environment::{CapabilityEnvironment, EnvironmentCache};
pub use self::error::LockerError;
pub use self::globals::GlobalScope;
pub use self::key::{CapabilityKey, KeyRegistry};
pub use self::locker::{Locker, LockerId, LockerState};
pub use self::pipeline::INJECTED_BINDINGS;
pub use self::policy::{NoPrivileges, PrivilegePolicy, PrivilegedNamespaces};
pub use self::preprocess::{SAFE_EVAL_BINDING, SAFE_FUNCTION_BINDING, preprocess};
pub use self::registry::LockerRegistry;
pub use self::service::LockerService;
pub use self::shadow::{ShadowSet, VerifyMode, compute_shadows, verify_shadows};
pub use self::wrapper::{WrapperFactory, WrapperPolicy};
