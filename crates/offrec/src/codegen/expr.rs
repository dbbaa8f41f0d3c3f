//! Expression IR for accessor routines
//!
//! A small tree of field loads/stores, arithmetic, nullable comparison,
//! iteration, memoized locals and resolved calls. Each node infers its result
//! type; the [compiler](super::compile) lowers every node exactly once into a
//! composed closure, so invoking a compiled routine performs no per-call
//! interpretation.
//!
//! The operator set is deliberately closed: only what the accessor templates
//! need. Misusing a node (arithmetic over booleans, a loop variable outside a
//! loop) is an internal invariant violation and panics at compile time rather
//! than producing an error value.

use std::rc::Rc;

use crate::error::SchemaError;
use crate::types::{ExprType, Primitive, Value};

use super::natives::{MemberTarget, NativeTable};

/// Arithmetic operator. Integers wrap two's-complement; floats follow
/// IEEE-754.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication (index scaling)
    Mul,
}

/// Whether a call targets a free function or a context-bound member target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A registered static native, looked up by `(owner, name)`
    Static,
    /// A member of the routine context: `arena.*` or `record.*`
    Member,
}

/// One node of an accessor routine's expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant value
    Const(Value),
    /// The record address the routine is bound to
    Base,
    /// Rebind the routine's record address (compiles `recordId(id)`)
    BindBase(Box<Expr>),
    /// Read the i-th routine parameter
    Arg(usize),
    /// Overwrite the i-th routine parameter
    StoreArg(usize, Box<Expr>),
    /// Load a typed field from `base + offset`
    FieldLoad {
        /// Address of the owning record
        base: Box<Expr>,
        /// Byte offset within the record
        offset: Box<Expr>,
        /// Storage type to load
        ty: Primitive,
    },
    /// Store a typed field at `base + offset`
    FieldStore {
        /// Address of the owning record
        base: Box<Expr>,
        /// Byte offset within the record
        offset: Box<Expr>,
        /// Storage type to store
        ty: Primitive,
        /// Value to store; must carry `ty`
        value: Box<Expr>,
    },
    /// Fold `operands` left to right with `op`. The first operand fixes the
    /// result type; integer operands of other widths are widened or narrowed
    /// to it.
    Arith {
        /// Operator
        op: ArithOp,
        /// Two or more operands
        operands: Vec<Expr>,
    },
    /// Short-circuiting lexicographic comparison: the first pair whose
    /// nullable comparison is non-zero decides the result, else 0.
    Comparator {
        /// Ordered (left, right) pairs
        pairs: Vec<(Expr, Expr)>,
    },
    /// Forward stride-1 iteration over `[start, start + length)`, compiled
    /// as a single test-and-branch loop, never unrolled.
    Loop {
        /// First index
        start: Box<Expr>,
        /// Number of iterations
        length: Box<Expr>,
        /// Body, evaluated once per index with [`Expr::LoopVar`] bound
        body: Box<Expr>,
    },
    /// The innermost enclosing loop's current index
    LoopVar,
    /// A memoized local: the shared `value` is materialized into `slot` on
    /// first use within one invocation; every later use (clones of this node
    /// share the `Rc`) reads the slot instead of re-evaluating.
    Let {
        /// Slot index within the routine's frame
        slot: usize,
        /// Expression materialized on first use
        value: Rc<Expr>,
    },
    /// Overwrite a memoized slot
    StoreLet {
        /// Slot index within the routine's frame
        slot: usize,
        /// New slot value
        value: Box<Expr>,
    },
    /// Like [`Expr::Let`], but the read consumes the slot: a set slot is
    /// moved out and left unset, an unset slot materializes `value`. The
    /// render templates thread their string accumulator through this so
    /// appending never copies it.
    TakeLet {
        /// Slot index within the routine's frame
        slot: usize,
        /// Expression materialized when the slot is unset
        value: Rc<Expr>,
    },
    /// Call a target resolved at compile time; unresolvable targets fail
    /// compilation with [`SchemaError::NoSuchMethod`].
    Call {
        /// Static or member target
        kind: CallKind,
        /// Target owner
        owner: String,
        /// Target name
        name: String,
        /// Argument expressions
        args: Vec<Expr>,
    },
    /// Evaluate in order, yielding the last expression's value
    Seq(Vec<Expr>),
}

impl Expr {
    /// Infer the result type of this node.
    ///
    /// `params` carries the routine's parameter types for [`Expr::Arg`];
    /// `natives` resolves call targets, so an unresolvable call fails here
    /// exactly as it fails lowering.
    pub fn infer(
        &self,
        params: &[ExprType],
        natives: &NativeTable,
    ) -> Result<ExprType, SchemaError> {
        match self {
            Expr::Const(v) => Ok(v.into()),
            Expr::Base => Ok(ExprType::Prim(Primitive::I64)),
            Expr::BindBase(_) | Expr::StoreArg(..) | Expr::StoreLet { .. } => Ok(ExprType::Unit),
            Expr::Arg(i) => Ok(params[*i]),
            Expr::FieldLoad { ty, .. } => Ok(ExprType::Prim(*ty)),
            Expr::FieldStore { .. } => Ok(ExprType::Unit),
            Expr::Arith { operands, .. } => operands[0].infer(params, natives),
            Expr::Comparator { .. } => Ok(ExprType::Prim(Primitive::I32)),
            Expr::Loop { .. } => Ok(ExprType::Unit),
            Expr::LoopVar => Ok(ExprType::Prim(Primitive::I32)),
            Expr::Let { value, .. } | Expr::TakeLet { value, .. } => value.infer(params, natives),
            Expr::Call {
                kind, owner, name, args,
            } => match kind {
                CallKind::Static => match natives.resolve_static(owner, name) {
                    Some(entry) => Ok(entry.ret),
                    None => Err(self.no_such_method(owner, name, args, params, natives)),
                },
                CallKind::Member => match MemberTarget::resolve(owner, name) {
                    Some((_, ret)) => Ok(ret),
                    None => Err(self.no_such_method(owner, name, args, params, natives)),
                },
            },
            Expr::Seq(exprs) => match exprs.last() {
                Some(last) => last.infer(params, natives),
                None => Ok(ExprType::Unit),
            },
        }
    }

    fn no_such_method(
        &self,
        owner: &str,
        name: &str,
        args: &[Expr],
        params: &[ExprType],
        natives: &NativeTable,
    ) -> SchemaError {
        let args = args
            .iter()
            .map(|a| {
                a.infer(params, natives)
                    .map(|t| t.name().to_string())
                    .unwrap_or_else(|_| "?".to_string())
            })
            .collect::<Vec<_>>()
            .join(", ");
        SchemaError::NoSuchMethod {
            owner: owner.to_string(),
            name: name.to_string(),
            args,
        }
    }

    /// Number of memoization slots this tree uses.
    pub fn slot_count(&self) -> usize {
        fn max_slot(expr: &Expr, acc: &mut Option<usize>) {
            let mut track = |slot: usize| {
                *acc = Some(acc.map_or(slot, |m: usize| m.max(slot)));
            };
            match expr {
                Expr::Let { slot, value } | Expr::TakeLet { slot, value } => {
                    track(*slot);
                    max_slot(value, acc);
                }
                Expr::StoreLet { slot, value } => {
                    track(*slot);
                    max_slot(value, acc);
                }
                Expr::BindBase(e) | Expr::StoreArg(_, e) => max_slot(e, acc),
                Expr::FieldLoad { base, offset, .. } => {
                    max_slot(base, acc);
                    max_slot(offset, acc);
                }
                Expr::FieldStore {
                    base, offset, value, ..
                } => {
                    max_slot(base, acc);
                    max_slot(offset, acc);
                    max_slot(value, acc);
                }
                Expr::Arith { operands, .. } => {
                    for e in operands {
                        max_slot(e, acc);
                    }
                }
                Expr::Comparator { pairs } => {
                    for (l, r) in pairs {
                        max_slot(l, acc);
                        max_slot(r, acc);
                    }
                }
                Expr::Loop {
                    start, length, body,
                } => {
                    max_slot(start, acc);
                    max_slot(length, acc);
                    max_slot(body, acc);
                }
                Expr::Call { args, .. } => {
                    for e in args {
                        max_slot(e, acc);
                    }
                }
                Expr::Seq(exprs) => {
                    for e in exprs {
                        max_slot(e, acc);
                    }
                }
                Expr::Const(_) | Expr::Base | Expr::Arg(_) | Expr::LoopVar => {}
            }
        }
        let mut acc = None;
        max_slot(self, &mut acc);
        acc.map_or(0, |m| m + 1)
    }
}
