//! Computation and verification of global shadow sets.
//!
//! A [`ShadowSet`] is the full set of ambient global names a locker must
//! hide from its sandboxed code, computed once at construction time and
//! snapshotted on the locker. The execution facility already guarantees
//! sandboxed units resolve nothing ambient, so the set is not used for
//! binding; its value is the drift signal. Re-computing the set later for
//! an equivalent environment must yield the same result — divergence means
//! the ambient global environment was mutated after construction, which is
//! either a breakout attempt or a corrupted runtime, and fails
//! verification.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use atrium_script::lexer;

use crate::globals::GlobalScope;

/// Framework-critical names hidden even when absent from the ambient scope.
///
/// The facade must never leak into a namespace that did not import it, even
/// while the host is still assembling the ambient environment.
pub const FRAMEWORK_CRITICAL_NAMES: [&str; 1] = ["atrium"];

/// Names that cannot be shadowed because the language binds them lexically
/// regardless: the dynamic-evaluation name, the implicit-arguments name,
/// and the primitive constants. Excluding them keeps recomputation stable;
/// their exposure is handled by the preprocessor instead.
static UNSHADOWABLE_NAMES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    ["eval", "arguments", "NaN", "Infinity", "undefined"]
        .into_iter()
        .collect()
});

/// How [`verify_shadows`] compares a recomputed set against a snapshot.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VerifyMode {
    /// Full set equality. The default.
    #[default]
    Full,
    /// Cardinality only: cheap, approximate, and blind to renames. Retained
    /// as an explicitly configured relaxed mode with a documented weakness.
    Cardinality,
}

/// Ordered snapshot of the names hidden from one locker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShadowSet {
    names: BTreeSet<String>,
}

impl ShadowSet {
    /// Number of shadowed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when nothing is shadowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` when `name` is shadowed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Iterates the shadowed names in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Computes the shadow set for one locker construction.
///
/// Every currently-reachable ambient name plus the framework-critical set,
/// minus the caller's import whitelist, minus the unshadowable names. Only
/// names with identifier syntax are retained: anything else cannot be
/// shadowed by binding and is accepted as an unavoidable residual exposure,
/// dropped silently.
#[must_use]
pub fn compute_shadows(globals: &GlobalScope, imports: &BTreeSet<String>) -> ShadowSet {
    let mut names: BTreeSet<String> = globals.names();
    for name in FRAMEWORK_CRITICAL_NAMES {
        drop(names.insert(name.to_owned()));
    }
    names.retain(|name| {
        is_identifier(name) && !imports.contains(name) && !UNSHADOWABLE_NAMES.contains(name.as_str())
    });
    ShadowSet { names }
}

/// Recomputes the shadow set and compares it against a snapshot.
///
/// Returns `false` on divergence. Reports by boolean rather than error:
/// periodic integrity sweeps must never themselves crash the host.
#[must_use]
pub fn verify_shadows(
    expected: &ShadowSet,
    globals: &GlobalScope,
    imports: &BTreeSet<String>,
    mode: VerifyMode,
) -> bool {
    let current = compute_shadows(globals, imports);
    match mode {
        VerifyMode::Full => current == *expected,
        VerifyMode::Cardinality => current.len() == expected.len(),
    }
}

/// Returns `true` when `name` is lexically a parameter-shadowable
/// identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(lexer::is_ident_start)
        && chars.all(lexer::is_ident_continue)
}
