//! Dynamic value model for the scripting runtime.
//!
//! Objects are reference-counted and carry a process-unique [`ObjectId`]
//! minted at creation. The id is the *out-of-band* identity hosts key
//! ancillary state on (the isolation layer tags capability ownership this
//! way); it is not a property and cannot be enumerated or forged by script
//! code. An object may also carry a [`PropertyHandler`]: when present, every
//! property read and write routes through the handler, which is the explicit
//! mediation seam secure proxies build on.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::ScriptError;

/// Process-unique identity of a script object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mints monotonically increasing [`ObjectId`]s.
///
/// Cloning an `IdSource` shares the underlying counter, so every collaborator
/// holding a clone mints from the same sequence and ids stay unique across
/// the process.
#[derive(Debug, Clone, Default)]
pub struct IdSource {
    next: Rc<Cell<u64>>,
}

impl IdSource {
    /// Creates a fresh counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next unique id.
    #[must_use]
    pub fn mint(&self) -> ObjectId {
        let id = self.next.get();
        self.next.set(id + 1);
        ObjectId(id)
    }
}

/// Mediates property access on an object.
///
/// A handler owns the full property surface of its object: direct storage is
/// bypassed entirely while a handler is installed. Handlers return script
/// faults, not host errors; boundary layers translate their own failures
/// before surfacing them to guest code.
pub trait PropertyHandler {
    /// Reads a property. Absent properties read as [`Value::Undefined`].
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Runtime`] when the read itself faults.
    fn get(&self, name: &str) -> Result<Value, ScriptError>;

    /// Writes a property.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Runtime`] when the write is not permitted.
    fn set(&self, name: &str, value: Value) -> Result<(), ScriptError>;

    /// Enumerates the property names the handler exposes.
    fn names(&self) -> Vec<String>;
}

/// A script object: property map, identity, and optional mediation.
pub struct Object {
    id: ObjectId,
    properties: RefCell<BTreeMap<String, Value>>,
    handler: Option<Rc<dyn PropertyHandler>>,
    sealed: Cell<bool>,
}

/// Shared handle to a script object.
pub type ObjectRef = Rc<Object>;

impl Object {
    pub(crate) fn new(id: ObjectId) -> ObjectRef {
        Rc::new(Self {
            id,
            properties: RefCell::new(BTreeMap::new()),
            handler: None,
            sealed: Cell::new(false),
        })
    }

    pub(crate) fn with_handler(id: ObjectId, handler: Rc<dyn PropertyHandler>) -> ObjectRef {
        Rc::new(Self {
            id,
            properties: RefCell::new(BTreeMap::new()),
            handler: Some(handler),
            sealed: Cell::new(false),
        })
    }

    /// Returns the object's out-of-band identity.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Reads a property, routing through the handler when one is installed.
    ///
    /// # Errors
    ///
    /// Propagates handler faults; direct reads never fail.
    pub fn get(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(handler) = &self.handler {
            return handler.get(name);
        }
        Ok(self
            .properties
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Undefined))
    }

    /// Writes a property, routing through the handler when one is installed.
    ///
    /// # Errors
    ///
    /// Propagates handler faults; direct writes fail on sealed objects.
    pub fn set(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        if let Some(handler) = &self.handler {
            return handler.set(name, value);
        }
        if self.sealed.get() {
            return Err(ScriptError::runtime(format!(
                "cannot set property '{name}' on a sealed object"
            )));
        }
        drop(self.properties.borrow_mut().insert(name.to_owned(), value));
        Ok(())
    }

    /// Marks the object immutable for direct writes.
    pub fn seal(&self) {
        self.sealed.set(true);
    }

    /// Returns `true` once [`Object::seal`] has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// Enumerates property names in deterministic order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.handler.as_ref().map_or_else(
            || self.properties.borrow().keys().cloned().collect(),
            |handler| handler.names(),
        )
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("mediated", &self.handler.is_some())
            .field("sealed", &self.sealed.get())
            .finish_non_exhaustive()
    }
}

/// A host function callable from script code.
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    func: Rc<dyn Fn(&[Value]) -> Result<Value, ScriptError>>,
}

impl NativeFunction {
    /// Wraps a host closure as a callable script value.
    pub fn new(
        name: impl Into<Rc<str>>,
        func: impl Fn(&[Value]) -> Result<Value, ScriptError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    /// Returns the diagnostic name of the function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the underlying host closure.
    ///
    /// # Errors
    ///
    /// Propagates whatever fault the host closure raises.
    pub fn call(&self, args: &[Value]) -> Result<Value, ScriptError> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A dynamic script value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value; unresolved identifiers read as this.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Immutable string.
    Str(Rc<str>),
    /// Shared mutable list.
    List(Rc<RefCell<Vec<Value>>>),
    /// Shared object.
    Object(ObjectRef),
    /// Host function.
    Native(NativeFunction),
}

impl Value {
    /// Builds a list value from owned elements.
    #[must_use]
    pub fn list(elements: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(elements)))
    }

    /// Returns a short name for the value's type, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Native(_) => "function",
        }
    }

    /// Truthiness used by conditions and logical operators.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null | Self::Bool(false) | Self::Int(0) => false,
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Returns the object handle when the value is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the string slice when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Equality is structural for primitives and identity for reference
    /// types, matching the language's `==` operator.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.borrow().iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(obj) => write!(f, "[object {}]", obj.id()),
            Self::Native(func) => write!(f, "[function {}]", func.name()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}
