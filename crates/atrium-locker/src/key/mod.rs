//! Capability keys and the out-of-band tagging registry.
//!
//! A [`CapabilityKey`] is the unforgeable token representing one isolation
//! namespace's authority. Keys are minted only by a [`KeyRegistry`] — there
//! is no public constructor — and equality is mint identity, never
//! structure: two registries issuing a key for the same namespace name
//! produce keys that do not match. Objects are associated with keys
//! entirely out-of-band, keyed by [`ObjectId`], so sandboxed code can
//! neither discover nor tamper with the association.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use atrium_script::ObjectId;

use crate::error::LockerError;

/// Unforgeable token identifying one isolation namespace.
///
/// Cheap to clone; all clones compare equal to each other and to nothing
/// else. The namespace name is carried for host diagnostics only and plays
/// no part in equality.
#[derive(Clone)]
pub struct CapabilityKey {
    inner: Rc<KeyInner>,
}

struct KeyInner {
    id: u64,
    namespace: String,
}

impl CapabilityKey {
    fn mint(id: u64, namespace: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(KeyInner {
                id,
                namespace: namespace.into(),
            }),
        }
    }

    /// Returns the namespace this key was issued for.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for CapabilityKey {}

impl fmt::Debug for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityKey({})", self.inner.namespace)
    }
}

/// Issues capability keys and tracks object→key associations.
///
/// The registry is a cheap-clone shared handle; all clones observe the same
/// key and tag state. The runtime is single-threaded and cooperative, so
/// interior mutability is plain `RefCell` with every borrow scoped to one
/// operation.
#[derive(Clone)]
pub struct KeyRegistry {
    inner: Rc<RegistryInner>,
}

struct RegistryInner {
    next_id: Cell<u64>,
    master: CapabilityKey,
    keys: RefCell<HashMap<String, CapabilityKey>>,
    tags: RefCell<HashMap<ObjectId, CapabilityKey>>,
}

impl KeyRegistry {
    /// Creates a registry and mints its master key.
    ///
    /// The master key is held by the trusted host, is required to unwrap
    /// secure wrappers, and is never issued for any namespace.
    #[must_use]
    pub fn new() -> Self {
        let master = CapabilityKey::mint(0, "::master");
        Self {
            inner: Rc::new(RegistryInner {
                next_id: Cell::new(1),
                master,
                keys: RefCell::new(HashMap::new()),
                tags: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Returns the host-only master key.
    #[must_use]
    pub fn master_key(&self) -> CapabilityKey {
        self.inner.master.clone()
    }

    /// Returns the key for `namespace`, minting one on first request.
    ///
    /// Idempotent per namespace: repeated calls return equal keys, and two
    /// distinct namespaces never receive equal keys.
    #[must_use]
    pub fn issue_key(&self, namespace: &str) -> CapabilityKey {
        if let Some(existing) = self.inner.keys.borrow().get(namespace) {
            return existing.clone();
        }
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let key = CapabilityKey::mint(id, namespace);
        drop(
            self.inner
                .keys
                .borrow_mut()
                .insert(namespace.to_owned(), key.clone()),
        );
        key
    }

    /// Associates `key` with the object identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AlreadyTagged`] when the object carries a
    /// different key (tagging with the key it already carries is a no-op).
    pub fn tag(&self, id: ObjectId, key: &CapabilityKey) -> Result<(), LockerError> {
        self.tag_with(id, key, None)
    }

    /// Associates `key` with an object, presenting the current key when
    /// re-tagging.
    ///
    /// Re-tagging is permitted only to a current holder: `presented` must
    /// equal the key the object already carries.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AlreadyTagged`] when the object carries a
    /// different key and `presented` does not match it.
    pub fn tag_with(
        &self,
        id: ObjectId,
        key: &CapabilityKey,
        presented: Option<&CapabilityKey>,
    ) -> Result<(), LockerError> {
        let mut tags = self.inner.tags.borrow_mut();
        if let Some(current) = tags.get(&id) {
            if current != key && presented != Some(current) {
                return Err(LockerError::AlreadyTagged {
                    namespace: current.namespace().to_owned(),
                });
            }
        }
        drop(tags.insert(id, key.clone()));
        Ok(())
    }

    /// Returns the key the object carries, when any.
    #[must_use]
    pub fn key_of(&self, id: ObjectId) -> Option<CapabilityKey> {
        self.inner.tags.borrow().get(&id).cloned()
    }

    /// Checks that the object is accessible under `key`.
    ///
    /// Untagged objects are unrestricted and always pass.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AccessDenied`] when the object carries a key
    /// different from `key`.
    pub fn verify_access(&self, key: &CapabilityKey, id: ObjectId) -> Result<(), LockerError> {
        match self.inner.tags.borrow().get(&id) {
            Some(current) if current != key => Err(LockerError::access_denied("verify_access")),
            _ => Ok(()),
        }
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("issued", &self.inner.keys.borrow().len())
            .field("tagged", &self.inner.tags.borrow().len())
            .finish()
    }
}
