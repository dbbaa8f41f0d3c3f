//! Accessor unit: the compiled routine set of one registered schema
//!
//! An [`Adapter`] owns everything a record of its schema needs at runtime:
//! the inspected class, the compiled routines, the adapters of embedded
//! record members, and the arena its records live in. Views are thin handles
//! over an `Arc<Adapter>` plus a record address.
//!
//! Routine dispatch is precomputed: one table keyed by `(action, member)` for
//! the typed view API, one keyed by `(name, arity)` for dynamic calls.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::SchemaError;
use crate::memory::Arena;
use crate::schema::{ActionType, Fingerprint, RecordClass};
use crate::types::Value;

use super::compile::{compile, CompileCx, Thunk};
use super::frame::{Frame, RoutineCtx};
use super::natives::NativeTable;
use super::template;

/// One compiled accessor routine.
pub struct Routine {
    /// Invocation name
    pub name: String,
    /// Accessor pattern
    pub action: ActionType,
    /// Bound member index, `None` for identity routines
    pub member: Option<u32>,
    /// Declared parameter count
    pub arity: u8,
    slots: usize,
    thunk: Thunk,
}

/// The compiled accessor unit of one registered schema.
pub struct Adapter {
    blueprint_id: u32,
    fingerprint: Fingerprint,
    class: RecordClass,
    routines: Vec<Routine>,
    by_action: FxHashMap<(ActionType, Option<u32>), usize>,
    by_signature: FxHashMap<(String, u8), usize>,
    nested: Vec<Arc<Adapter>>,
    arena: RefCell<Arena>,
}

impl Adapter {
    /// Compile every routine template of `class` into an accessor unit.
    ///
    /// `nested` carries the adapters of embedded record members, indexed by
    /// the members' nested slots; the registry registers them first.
    pub(crate) fn compile(
        class: RecordClass,
        fingerprint: Fingerprint,
        blueprint_id: u32,
        nested: Vec<Arc<Adapter>>,
        natives: &NativeTable,
    ) -> Result<Adapter, SchemaError> {
        let templates = template::build(&class, blueprint_id);
        let mut routines = Vec::with_capacity(templates.len());
        let mut by_action = FxHashMap::default();
        let mut by_signature = FxHashMap::default();
        for t in templates {
            let cx = CompileCx {
                params: t.params.clone(),
                natives,
            };
            let thunk = compile(&t.expr, &cx)?;
            let idx = routines.len();
            by_action.entry((t.action, t.member)).or_insert(idx);
            by_signature
                .entry((t.name.clone(), t.params.len() as u8))
                .or_insert(idx);
            routines.push(Routine {
                name: t.name,
                action: t.action,
                member: t.member,
                arity: t.params.len() as u8,
                slots: t.expr.slot_count(),
                thunk,
            });
        }
        debug!(
            schema = %class.name,
            id = blueprint_id,
            fingerprint = %fingerprint.short(),
            routines = routines.len(),
            "compiled accessor unit"
        );
        Ok(Adapter {
            blueprint_id,
            fingerprint,
            class,
            routines,
            by_action,
            by_signature,
            nested,
            arena: RefCell::new(Arena::new()),
        })
    }

    /// Registered blueprint id
    pub fn blueprint_id(&self) -> u32 {
        self.blueprint_id
    }

    /// Structural fingerprint of the registered schema
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The inspected record model
    pub fn class(&self) -> &RecordClass {
        &self.class
    }

    /// Record size in bytes
    pub fn record_size(&self) -> u32 {
        self.class.record_size
    }

    /// Adapters of embedded record members, indexed by nested slot
    pub fn nested(&self) -> &[Arc<Adapter>] {
        &self.nested
    }

    /// Allocate a fresh zero-filled record and return its id.
    pub fn create(&self) -> u64 {
        self.arena.borrow_mut().allocate(self.class.record_size as usize)
    }

    /// Allocate `count` contiguous zero-filled records, returning the first
    /// one's id. Element i lives at `id + i * record_size`.
    pub fn create_many(&self, count: u32) -> u64 {
        self.arena
            .borrow_mut()
            .allocate(self.class.record_size as usize * count as usize)
    }

    /// Free every record of this schema at once. Outstanding views dangle.
    pub fn release_all(&self) {
        self.arena.borrow_mut().release_all();
    }

    /// Bytes currently handed out to records of this schema
    pub fn used_bytes(&self) -> usize {
        self.arena.borrow().used_bytes()
    }

    /// Routine index for a typed accessor lookup.
    pub fn routine_for(&self, action: ActionType, member: Option<u32>) -> Option<usize> {
        self.by_action.get(&(action, member)).copied()
    }

    /// Routine index for a dynamic call by declared name and argument count.
    pub fn routine_named(&self, name: &str, arity: u8) -> Option<usize> {
        self.by_signature.get(&(name.to_string(), arity)).copied()
    }

    /// Compiled routines in template order
    pub fn routines(&self) -> &[Routine] {
        &self.routines
    }

    /// Invoke a routine against the record at `base`.
    ///
    /// Returns the routine's value and the (possibly rebound) record address;
    /// `recordId(id)` is the only routine that moves it.
    pub fn invoke(&self, idx: usize, base: u64, args: &[Value]) -> (Value, u64) {
        let routine = &self.routines[idx];
        let ctx = RoutineCtx {
            arena: &self.arena,
            nested: &self.nested,
        };
        let mut frame = Frame::new(ctx, base, args, routine.slots);
        let value = (routine.thunk)(&mut frame);
        (value, frame.base)
    }

    /// Invoke by accessor pattern.
    ///
    /// # Panics
    ///
    /// Panics when the schema has no such routine. The typed view API only
    /// asks for routines the inspector produced, so this marks misuse of the
    /// dynamic surface.
    pub fn call(
        &self,
        action: ActionType,
        member: Option<u32>,
        base: u64,
        args: &[Value],
    ) -> (Value, u64) {
        match self.routine_for(action, member) {
            Some(idx) => self.invoke(idx, base, args),
            None => panic!("record type {} has no {:?} accessor", self.class.name, action),
        }
    }

    /// Render the record at `addr` the way its `string()` routine does.
    pub fn render(&self, addr: u64) -> String {
        let (value, _) = self.call(ActionType::ToString, None, addr, &[]);
        match value {
            Value::Str(s) => s,
            other => panic!("render routine returned {}", other.type_name()),
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("schema", &self.class.name)
            .field("blueprint_id", &self.blueprint_id)
            .field("fingerprint", &self.fingerprint.short())
            .field("routines", &self.routines.len())
            .finish_non_exhaustive()
    }
}
