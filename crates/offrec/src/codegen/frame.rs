//! Invocation frame for compiled routines
//!
//! A [`Frame`] is built per routine call: the bound record address, the call
//! arguments, the memoization slots and the loop-variable stack. The
//! [`RoutineCtx`] gives member call targets access to the schema's arena and
//! nested adapters.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::memory::Arena;
use crate::types::Value;

use super::adapter::Adapter;

/// Context shared by every routine of one accessor unit.
#[derive(Clone, Copy)]
pub struct RoutineCtx<'a> {
    /// The schema's arena; `copy`/`copyFrom` allocate and duplicate here
    pub arena: &'a RefCell<Arena>,
    /// Adapters of embedded record members, indexed by the member's nested
    /// slot
    pub nested: &'a [Arc<Adapter>],
}

/// Mutable state of one routine invocation.
pub struct Frame<'a> {
    /// Record address the routine operates on; `recordId(id)` rebinds it
    pub base: u64,
    /// Call arguments
    pub args: SmallVec<[Value; 2]>,
    /// Memoization slots, unset until first use
    pub(crate) slots: SmallVec<[Option<Value>; 4]>,
    /// Loop-variable stack, innermost last
    pub(crate) loops: SmallVec<[i32; 2]>,
    /// Accessor-unit context
    pub ctx: RoutineCtx<'a>,
}

impl<'a> Frame<'a> {
    /// Build a frame for one invocation.
    pub fn new(ctx: RoutineCtx<'a>, base: u64, args: &[Value], slots: usize) -> Self {
        Frame {
            base,
            args: args.iter().cloned().collect(),
            slots: smallvec::smallvec![None; slots],
            loops: SmallVec::new(),
            ctx,
        }
    }
}
