//! Static preprocessing of submitted source text.
//!
//! Every piece of source entering the construction pipeline passes through
//! here first. The scan is token-level: the facility's lexer produces the
//! stream, so comments and string literals never trigger a rejection or a
//! rewrite. The check is still syntactic, not semantic — an identifier that
//! merely *looks* like the forbidden token is rejected even where it could
//! never tamper with anything. False positives are acceptable; false
//! negatives are not.

use atrium_script::lexer::Lexer;

use crate::error::LockerError;

/// Injected binding the dynamic-evaluation identifier is rewritten to.
///
/// When the locker is invoked this name resolves to a function that
/// re-applies [`preprocess`] to its argument and routes execution back
/// through the construction pipeline under the same capability key.
pub const SAFE_EVAL_BINDING: &str = "__safe_eval";

/// Injected binding the dynamic-function constructor is rewritten to.
pub const SAFE_FUNCTION_BINDING: &str = "__safe_function";

/// The prototype-tampering token. Any occurrence aborts construction.
const FORBIDDEN_PROTO: &str = "__proto__";

/// The ambient dynamic-evaluation identifier.
const DYNAMIC_EVAL: &str = "eval";

/// The ambient dynamic-function constructor identifier.
const DYNAMIC_FUNCTION: &str = "Function";

/// Scans and rewrites source text ahead of compilation.
///
/// Rejects prototype-tampering tokens and redirects every lexical
/// occurrence of the dynamic-evaluation identifiers to their locally-bound
/// safe counterparts, so no code path can reach an ambient evaluator.
///
/// # Errors
///
/// Returns [`LockerError::SecurityViolation`] on a forbidden token and
/// [`LockerError::Construction`] when the source cannot be tokenised at
/// all.
pub fn preprocess(source: &str) -> Result<String, LockerError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|err| LockerError::Construction {
            message: "source text could not be tokenised".into(),
            source: Some(err),
        })?;

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0_usize;

    for token in &tokens {
        let Some(name) = token.kind.ident() else {
            continue;
        };
        if name == FORBIDDEN_PROTO {
            return Err(LockerError::SecurityViolation {
                token: FORBIDDEN_PROTO.into(),
                line: token.span.line,
                column: token.span.column,
            });
        }
        let replacement = match name {
            DYNAMIC_EVAL => SAFE_EVAL_BINDING,
            DYNAMIC_FUNCTION => SAFE_FUNCTION_BINDING,
            _ => continue,
        };
        output.push_str(slice(source, cursor, token.span.start));
        output.push_str(replacement);
        cursor = token.span.end;
    }

    output.push_str(slice(source, cursor, source.len()));
    Ok(output)
}

/// Copies `source[start..end]`; spans come from the lexer and always sit on
/// character boundaries, so an out-of-range request yields the empty string
/// rather than panicking.
fn slice(source: &str, start: usize, end: usize) -> &str {
    source.get(start..end).unwrap_or("")
}
