//! Error types for schema registration and routine compilation
//!
//! All variants are fatal: registration aborts and no partial accessor unit
//! is cached. Runtime misuse (unregistered ids, unknown routine signatures)
//! is a caller programming error and panics instead of returning an error,
//! keeping the compiled access path free of checks.

use thiserror::Error;

/// Errors raised while inspecting, laying out or compiling a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A declared method does not match any known accessor naming pattern
    #[error("unrecognized method '{name}' in schema '{schema}'")]
    UnrecognizedMethod {
        /// Schema under inspection
        schema: String,
        /// Offending method name
        name: String,
    },

    /// Two accessors of the same member disagree on its type
    #[error("conflicting types for member '{member}' in schema '{schema}': {first} vs {second}")]
    TypeConflict {
        /// Schema under inspection
        schema: String,
        /// Member with disagreeing accessors
        member: String,
        /// Type implied by the first accessor
        first: String,
        /// Type implied by the conflicting accessor
        second: String,
    },

    /// A schema embeds itself, directly or through another schema
    #[error("cyclic layout: schema '{schema}' embeds itself")]
    CyclicLayout {
        /// Schema whose layout recursion closed a cycle
        schema: String,
    },

    /// A call expression could not be resolved to a known target
    #[error("no such method {owner}.{name}({args})")]
    NoSuchMethod {
        /// Owner of the call target (`arena`, `record`, or a static owner)
        owner: String,
        /// Target name
        name: String,
        /// Comma-separated argument type names
        args: String,
    },
}
