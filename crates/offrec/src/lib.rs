//! Compiled record accessors over raw arena memory
//!
//! `offrec` turns a declarative record schema into a set of compiled accessor
//! routines working directly on unaligned, pointer-free arena bytes. A schema
//! declares its surface as method signatures following the accessor naming
//! conventions (`getNumber`, `setNumber`, `increaseNumberBy`, `getPointsAt`,
//! ...); registration inspects those declarations into typed members, packs a
//! byte layout, and compiles one routine per accessor. Records are then plain
//! byte spans in a chunked arena, addressed by `u64` ids, and a [`View`] is a
//! cheap rebindable handle that dispatches into the compiled routines.
//!
//! ```no_run
//! use offrec::{Registry, Schema, TypeRef, Value};
//!
//! let schema = Schema::builder("Sample")
//!     .method("getNumber", vec![], TypeRef::INT)
//!     .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
//!     .build();
//!
//! let mut registry = Registry::new();
//! let adapter = registry.register(&schema).unwrap();
//! let record = registry.create(adapter.blueprint_id());
//! record.set("Number", Value::I32(77));
//! assert_eq!(record.get("Number"), Value::I32(77));
//! ```
//!
//! Identity is structural: two schemas with identical declarations share one
//! blueprint id and one compiled unit, whatever their display names.
//!
//! Registries, adapters and views are single-threaded by design; the arena
//! hands out raw addresses and reclamation is bulk-only (`delete_all`), so a
//! view outliving its arena's release dangles exactly like the raw pointer it
//! wraps.

#![warn(missing_docs)]

pub mod codegen;
pub mod error;
pub mod memory;
pub mod registry;
pub mod schema;
pub mod types;
pub mod view;

pub use codegen::adapter::Adapter;
pub use error::SchemaError;
pub use registry::Registry;
pub use schema::{ActionType, Fingerprint, MethodDecl, Schema, SchemaBuilder};
pub use types::{ExprType, Primitive, TypeRef, Value};
pub use view::{Sequence, View};
