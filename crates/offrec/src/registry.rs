//! Schema registry: registration, structural identity and record factories
//!
//! Registration runs the whole pipeline once per structurally distinct
//! schema: inspect, recursively register embedded schemas, plan the layout,
//! compile the routines. The resulting adapter is cached under the schema's
//! fingerprint, so registering an identical declaration again (whatever its
//! display name) returns the already-compiled unit and the same blueprint id.
//!
//! Blueprint ids are indices into the registry's adapter table; id 0 is the
//! unassigned sentinel and never handed out.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::codegen::adapter::Adapter;
use crate::codegen::natives::NativeTable;
use crate::error::SchemaError;
use crate::schema::{inspector, layout, Fingerprint, Schema};
use crate::types::{ExprType, TypeRef, Value};
use crate::view::{Sequence, View};

/// Compiles and caches accessor units, and creates records from them.
pub struct Registry {
    /// Indexed by blueprint id; slot 0 stays empty as the unassigned sentinel
    adapters: Vec<Option<Arc<Adapter>>>,
    ids: FxHashMap<Fingerprint, u32>,
    natives: NativeTable,
}

impl Registry {
    /// An empty registry with the built-in natives preloaded.
    pub fn new() -> Self {
        Registry {
            adapters: vec![None],
            ids: FxHashMap::default(),
            natives: NativeTable::with_builtins(),
        }
    }

    /// Register a static native callable from custom render declarations.
    ///
    /// Must happen before registering any schema that names it; routines
    /// resolve their targets at compilation. Arguments arrive mutably so the
    /// native may take ownership of them.
    pub fn register_native(
        &mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        ret: ExprType,
        fun: impl Fn(&mut [Value]) -> Value + 'static,
    ) {
        self.natives.register(owner, name, ret, fun);
    }

    /// Register a schema, compiling its accessor unit on first sight.
    ///
    /// Embedded schemas are registered first, depth first, deduplicated by
    /// fingerprint. A schema embedding itself (directly or through a chain)
    /// cannot be laid out inline and fails with
    /// [`SchemaError::CyclicLayout`].
    pub fn register(&mut self, schema: &Schema) -> Result<Arc<Adapter>, SchemaError> {
        let mut in_progress = Vec::new();
        self.register_rec(schema, &mut in_progress)
    }

    fn register_rec(
        &mut self,
        schema: &Schema,
        in_progress: &mut Vec<Fingerprint>,
    ) -> Result<Arc<Adapter>, SchemaError> {
        let fingerprint = schema.fingerprint();
        if let Some(&id) = self.ids.get(&fingerprint) {
            return Ok(self.adapters[id as usize].clone().expect("registered slot"));
        }
        if in_progress.contains(&fingerprint) {
            return Err(SchemaError::CyclicLayout {
                schema: schema.name().to_string(),
            });
        }
        in_progress.push(fingerprint);

        let mut class = inspector::inspect(schema)?;
        let mut nested: Vec<Arc<Adapter>> = Vec::new();
        let mut slots: FxHashMap<Fingerprint, u32> = FxHashMap::default();
        for i in 0..class.members.len() {
            let nested_schema = match &class.members[i].external {
                TypeRef::SelfRecord => {
                    return Err(SchemaError::CyclicLayout {
                        schema: schema.name().to_string(),
                    });
                }
                other => match other.nested_schema() {
                    Some(s) => s.clone(),
                    None => continue,
                },
            };
            let fp = nested_schema.fingerprint();
            let slot = match slots.get(&fp) {
                Some(&slot) => slot,
                None => {
                    let adapter = self.register_rec(&nested_schema, in_progress)?;
                    let slot = nested.len() as u32;
                    nested.push(adapter);
                    slots.insert(fp, slot);
                    slot
                }
            };
            class.members[i].nested = Some(slot);
        }
        layout::plan(&mut class, |slot| nested[slot as usize].record_size());

        let id = self.adapters.len() as u32;
        let name = class.name.clone();
        let adapter = Arc::new(Adapter::compile(
            class,
            fingerprint,
            id,
            nested,
            &self.natives,
        )?);
        self.adapters.push(Some(adapter.clone()));
        self.ids.insert(fingerprint, id);
        in_progress.pop();
        debug!(schema = %name, id, fingerprint = %fingerprint.short(), "registered schema");
        Ok(adapter)
    }

    /// Blueprint id of an already-registered schema.
    pub fn blueprint_id(&self, schema: &Schema) -> Option<u32> {
        self.ids.get(&schema.fingerprint()).copied()
    }

    /// The accessor unit registered under `blueprint_id`.
    ///
    /// # Panics
    ///
    /// Panics on an id no registration produced.
    pub fn adapter(&self, blueprint_id: u32) -> Arc<Adapter> {
        self.adapters
            .get(blueprint_id as usize)
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| panic!("unknown blueprint id {blueprint_id}"))
    }

    /// Allocate a fresh zero-filled record and return a view bound to it.
    pub fn create(&self, blueprint_id: u32) -> View {
        let adapter = self.adapter(blueprint_id);
        let record_id = adapter.create();
        View::new(adapter, record_id)
    }

    /// A view bound to an existing record of the given schema.
    ///
    /// The caller vouches that `record_id` was produced by this schema's
    /// arena and is still live.
    pub fn view(&self, blueprint_id: u32, record_id: u64) -> View {
        View::new(self.adapter(blueprint_id), record_id)
    }

    /// Allocate `count` contiguous records and return a sequence over them.
    pub fn array(&self, blueprint_id: u32, count: u32) -> Sequence {
        let adapter = self.adapter(blueprint_id);
        let address = adapter.create_many(count);
        Sequence::new(adapter, address, count)
    }

    /// Record size in bytes of a registered schema.
    pub fn record_size(&self, blueprint_id: u32) -> u32 {
        self.adapter(blueprint_id).record_size()
    }

    /// Free every record of the given schema at once.
    ///
    /// Every outstanding view of those records dangles afterwards; touching
    /// one is undefined behavior, as with any raw-memory arena.
    pub fn delete_all(&self, blueprint_id: u32) {
        self.adapter(blueprint_id).release_all();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    fn point(name: &str) -> Arc<Schema> {
        Schema::builder(name)
            .method("getX", vec![], TypeRef::INT)
            .method("setX", vec![TypeRef::INT], TypeRef::UNIT)
            .build()
    }

    #[test]
    fn registration_is_idempotent_by_structure() {
        let mut registry = Registry::new();
        let a = registry.register(&point("Point")).unwrap();
        let b = registry.register(&point("Renamed")).unwrap();
        assert_eq!(a.blueprint_id(), b.blueprint_id());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn blueprint_ids_start_at_one() {
        let mut registry = Registry::new();
        let adapter = registry.register(&point("Point")).unwrap();
        assert_eq!(adapter.blueprint_id(), 1);
    }

    #[test]
    fn embedded_schemas_register_first() {
        let mut registry = Registry::new();
        let inner = point("Inner");
        let outer = Schema::builder("Outer")
            .method("getOrigin", vec![], TypeRef::Record(inner.clone()))
            .build();
        let adapter = registry.register(&outer).unwrap();
        assert_eq!(registry.blueprint_id(&inner), Some(1));
        assert_eq!(adapter.blueprint_id(), 2);
        assert_eq!(adapter.nested().len(), 1);
    }

    #[test]
    fn repeated_embeddings_share_one_nested_slot() {
        let mut registry = Registry::new();
        let inner = point("Inner");
        let outer = Schema::builder("Outer")
            .method("getFrom", vec![], TypeRef::Record(inner.clone()))
            .method("getTo", vec![], TypeRef::Record(inner))
            .build();
        let adapter = registry.register(&outer).unwrap();
        assert_eq!(adapter.nested().len(), 1);
        assert_eq!(adapter.class().members[0].nested, Some(0));
        assert_eq!(adapter.class().members[1].nested, Some(0));
    }

    #[test]
    fn self_embedding_cannot_be_laid_out() {
        let mut registry = Registry::new();
        let schema = Schema::builder("Node")
            .method("getNext", vec![], TypeRef::SelfRecord)
            .build();
        assert!(matches!(
            registry.register(&schema).unwrap_err(),
            SchemaError::CyclicLayout { schema } if schema == "Node"
        ));
    }

    #[test]
    #[should_panic(expected = "unknown blueprint id")]
    fn unknown_blueprint_id_panics() {
        Registry::new().create(7);
    }
}
