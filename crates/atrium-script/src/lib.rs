//! Minimal embedded scripting runtime for Atrium components.
//!
//! The `atrium-script` crate is the dynamic-code execution facility the
//! framework's isolation layer drives: controller snippets submitted by
//! component namespaces are compiled here and executed to completion
//! synchronously. The runtime is built around one property that the
//! isolation design depends on: **there is no ambient global scope**. A
//! compiled unit can resolve only the names bound as parameters at
//! invocation time; any other identifier reads as `undefined`. Whatever a
//! sandboxed unit is allowed to see must be handed to it explicitly.
//!
//! Two further hooks exist for boundary layers:
//!
//! - every [`Object`](value::Object) carries an out-of-band
//!   [`ObjectId`](value::ObjectId), usable as a key for host-side state the
//!   script can neither enumerate nor forge;
//! - an object may be constructed with a [`PropertyHandler`], which then
//!   mediates every property read and write — the seam secure proxies are
//!   built on.
//!
//! # Example
//!
//! ```rust
//! use atrium_script::{ScriptEngine, Value};
//!
//! # fn main() -> Result<(), atrium_script::ScriptError> {
//! let engine = ScriptEngine::new();
//! let unit = engine.compile("return greeting + \" world\";", &["greeting".into()])?;
//! let result = unit.invoke(&[Value::from("hello")])?;
//! assert_eq!(result, Value::from("hello world"));
//! # Ok(())
//! # }
//! ```

pub mod ast;
mod engine;
mod error;
pub mod lexer;
mod parser;
pub mod value;

pub use self::engine::{ScriptEngine, ScriptFunction};
pub use self::error::ScriptError;
pub use self::lexer::{Lexer, Span, Token, TokenKind};
pub use self::parser::parse;
pub use self::value::{
    IdSource, NativeFunction, Object, ObjectId, ObjectRef, PropertyHandler, Value,
};
