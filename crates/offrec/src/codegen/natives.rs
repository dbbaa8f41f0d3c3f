//! Call targets for the expression IR
//!
//! Static targets live in a per-registry [`NativeTable`], preloaded with the
//! string-building helpers the render templates use; user code registers
//! custom render functions here before registering the schema that names
//! them. Member targets (`arena.*`, `record.*`) are a closed set resolved to
//! [`MemberTarget`] variants. Both kinds resolve once, at routine compile
//! time — an unknown name fails registration with
//! [`NoSuchMethod`](crate::error::SchemaError::NoSuchMethod), and the
//! compiled routine calls its target directly.

use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::types::{ExprType, Primitive, Value};

/// A static call target. Arguments arrive mutably so a target can take
/// ownership of them; the string builders move their accumulator out instead
/// of copying it on every append.
pub type StaticFn = Arc<dyn Fn(&mut [Value]) -> Value>;

/// A resolved static target with its declared return type.
#[derive(Clone)]
pub struct StaticEntry {
    /// The target function
    pub fun: StaticFn,
    /// Result type, used by IR type inference
    pub ret: ExprType,
}

/// Registry of static call targets, keyed by `(owner, name)`.
pub struct NativeTable {
    statics: FxHashMap<(String, String), StaticEntry>,
}

/// Built-in string helpers used by the render templates.
static BUILTINS: Lazy<Vec<(&'static str, &'static str, ExprType, fn(&mut [Value]) -> Value)>> =
    Lazy::new(|| {
        vec![
            ("str", "append", ExprType::Str, str_append),
            ("str", "append_item", ExprType::Str, str_append_item),
        ]
    });

/// Move the accumulator string out of an argument slot.
fn take_text(args: &mut [Value], index: usize) -> String {
    match std::mem::replace(&mut args[index], Value::Unit) {
        Value::Str(s) => s,
        other => panic!("string accumulator must be text, got {}", other.type_name()),
    }
}

/// `str.append(acc, v)` — append the rendered form of `v` to `acc`.
fn str_append(args: &mut [Value]) -> Value {
    let mut out = take_text(args, 0);
    args[1].render_into(&mut out);
    Value::Str(out)
}

/// `str.append_item(acc, index, v)` — append a `, `-separated list item.
fn str_append_item(args: &mut [Value]) -> Value {
    let mut out = take_text(args, 0);
    if args[1].as_i32() > 0 {
        out.push_str(", ");
    }
    args[2].render_into(&mut out);
    Value::Str(out)
}

impl NativeTable {
    /// A table preloaded with the built-in helpers.
    pub fn with_builtins() -> Self {
        let mut statics = FxHashMap::default();
        for &(owner, name, ret, fun) in BUILTINS.iter() {
            statics.insert(
                (owner.to_string(), name.to_string()),
                StaticEntry {
                    fun: Arc::new(fun),
                    ret,
                },
            );
        }
        NativeTable { statics }
    }

    /// Register a static target. Later registrations under the same key
    /// replace earlier ones.
    pub fn register(
        &mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        ret: ExprType,
        fun: impl Fn(&mut [Value]) -> Value + 'static,
    ) {
        self.statics.insert(
            (owner.into(), name.into()),
            StaticEntry {
                fun: Arc::new(fun),
                ret,
            },
        );
    }

    /// Resolve a static target.
    pub fn resolve_static(&self, owner: &str, name: &str) -> Option<&StaticEntry> {
        self.statics
            .get(&(owner.to_string(), name.to_string()))
    }
}

impl Default for NativeTable {
    fn default() -> Self {
        NativeTable::with_builtins()
    }
}

/// A member call target bound to the routine context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberTarget {
    /// `arena.allocate(size) -> address`
    ArenaAllocate,
    /// `arena.copy_bytes(src, dst, len)`
    ArenaCopyBytes,
    /// `record.render(nested_slot, address) -> text`
    RecordRender,
}

impl MemberTarget {
    /// Resolve a member target and its result type by owner and name.
    pub fn resolve(owner: &str, name: &str) -> Option<(MemberTarget, ExprType)> {
        match (owner, name) {
            ("arena", "allocate") => Some((
                MemberTarget::ArenaAllocate,
                ExprType::Prim(Primitive::I64),
            )),
            ("arena", "copy_bytes") => Some((MemberTarget::ArenaCopyBytes, ExprType::Unit)),
            ("record", "render") => Some((MemberTarget::RecordRender, ExprType::Str)),
            _ => None,
        }
    }
}
