//! Routine compiler: lowers expression trees into callable closures
//!
//! Each IR node is lowered exactly once into a boxed closure composed from
//! its children's closures. All type dispatch, offset folding and call-target
//! resolution happens here, at schema registration; invoking the resulting
//! [`Thunk`] walks only the composed closures with no interpretation step.

use smallvec::SmallVec;

use crate::error::SchemaError;
use crate::memory;
use crate::types::{ExprType, Primitive, Value};

use super::expr::{ArithOp, CallKind, Expr};
use super::frame::Frame;
use super::natives::{MemberTarget, NativeTable};

/// A compiled expression: one directly callable closure.
pub type Thunk = Box<dyn Fn(&mut Frame<'_>) -> Value>;

/// Compile-time environment: routine parameter types and call targets.
pub struct CompileCx<'a> {
    /// Parameter types of the routine under construction
    pub params: Vec<ExprType>,
    /// Call-target table for `Expr::Call` resolution
    pub natives: &'a NativeTable,
}

/// Lower an expression tree into a closure.
pub fn compile(expr: &Expr, cx: &CompileCx<'_>) -> Result<Thunk, SchemaError> {
    Ok(match expr {
        Expr::Const(v) => {
            let v = v.clone();
            Box::new(move |_| v.clone())
        }
        Expr::Base => Box::new(|f| Value::I64(f.base as i64)),
        Expr::BindBase(e) => {
            let et = compile(e, cx)?;
            Box::new(move |f| {
                f.base = et(f).as_addr();
                Value::Unit
            })
        }
        Expr::Arg(i) => {
            let i = *i;
            Box::new(move |f| f.args[i].clone())
        }
        Expr::StoreArg(i, e) => {
            let i = *i;
            let et = compile(e, cx)?;
            Box::new(move |f| {
                f.args[i] = et(f);
                Value::Unit
            })
        }
        Expr::FieldLoad { base, offset, ty } => compile_load(base, offset, *ty, cx)?,
        Expr::FieldStore {
            base,
            offset,
            ty,
            value,
        } => compile_store(base, offset, *ty, value, cx)?,
        Expr::Arith { op, operands } => compile_arith(expr, *op, operands, cx)?,
        Expr::Comparator { pairs } => {
            let mut compiled = Vec::with_capacity(pairs.len());
            for (l, r) in pairs {
                compiled.push((compile(l, cx)?, compile(r, cx)?));
            }
            Box::new(move |f| {
                for (lt, rt) in &compiled {
                    let c = lt(f).compare_nullable(&rt(f));
                    if c != 0 {
                        return Value::I32(c);
                    }
                }
                Value::I32(0)
            })
        }
        Expr::Loop {
            start,
            length,
            body,
        } => {
            let st = compile(start, cx)?;
            let lt = compile(length, cx)?;
            let bt = compile(body, cx)?;
            Box::new(move |f| {
                let start = st(f).as_i32();
                let end = start + lt(f).as_i32();
                f.loops.push(start);
                let mut i = start;
                while i < end {
                    *f.loops.last_mut().unwrap() = i;
                    bt(f);
                    i += 1;
                }
                f.loops.pop();
                Value::Unit
            })
        }
        Expr::LoopVar => Box::new(|f| {
            Value::I32(*f.loops.last().expect("loop variable used outside a loop"))
        }),
        Expr::Let { slot, value } => {
            let slot = *slot;
            let vt = compile(value, cx)?;
            Box::new(move |f| {
                if f.slots[slot].is_none() {
                    let v = vt(f);
                    f.slots[slot] = Some(v);
                }
                f.slots[slot].clone().expect("memoized slot")
            })
        }
        Expr::StoreLet { slot, value } => {
            let slot = *slot;
            let vt = compile(value, cx)?;
            Box::new(move |f| {
                let v = vt(f);
                f.slots[slot] = Some(v);
                Value::Unit
            })
        }
        Expr::TakeLet { slot, value } => {
            let slot = *slot;
            let vt = compile(value, cx)?;
            Box::new(move |f| match f.slots[slot].take() {
                Some(v) => v,
                None => vt(f),
            })
        }
        Expr::Call {
            kind,
            owner,
            name,
            args,
        } => {
            // resolves the target, failing with NoSuchMethod if absent
            expr.infer(&cx.params, cx.natives)?;
            let mut arg_thunks = Vec::with_capacity(args.len());
            for a in args {
                arg_thunks.push(compile(a, cx)?);
            }
            match kind {
                CallKind::Static => {
                    let entry = cx
                        .natives
                        .resolve_static(owner, name)
                        .expect("resolved above")
                        .clone();
                    Box::new(move |f| {
                        let mut vals: SmallVec<[Value; 4]> =
                            arg_thunks.iter().map(|t| t(f)).collect();
                        (entry.fun)(&mut vals)
                    })
                }
                CallKind::Member => {
                    let (target, _) = MemberTarget::resolve(owner, name).expect("resolved above");
                    compile_member_call(target, arg_thunks)
                }
            }
        }
        Expr::Seq(exprs) => {
            let mut thunks = Vec::with_capacity(exprs.len());
            for e in exprs {
                thunks.push(compile(e, cx)?);
            }
            Box::new(move |f| {
                let mut last = Value::Unit;
                for t in &thunks {
                    last = t(f);
                }
                last
            })
        }
    })
}

fn compile_load(
    base: &Expr,
    offset: &Expr,
    ty: Primitive,
    cx: &CompileCx<'_>,
) -> Result<Thunk, SchemaError> {
    // scalar accessors resolve to a fixed offset off the bound record; fold
    // it into the closure so the hot path is a single unaligned load
    if let (Expr::Base, Expr::Const(c)) = (base, offset) {
        let off = c.as_i64() as u64;
        return Ok(Box::new(move |f| unsafe { ty.load(f.base + off) }));
    }
    let bt = compile(base, cx)?;
    let ot = compile(offset, cx)?;
    Ok(Box::new(move |f| {
        let addr = (bt(f).as_i64() + ot(f).as_i64()) as u64;
        unsafe { ty.load(addr) }
    }))
}

fn compile_store(
    base: &Expr,
    offset: &Expr,
    ty: Primitive,
    value: &Expr,
    cx: &CompileCx<'_>,
) -> Result<Thunk, SchemaError> {
    let vt = compile(value, cx)?;
    if let (Expr::Base, Expr::Const(c)) = (base, offset) {
        let off = c.as_i64() as u64;
        return Ok(Box::new(move |f| {
            let v = vt(f);
            unsafe { ty.store(f.base + off, &v) };
            Value::Unit
        }));
    }
    let bt = compile(base, cx)?;
    let ot = compile(offset, cx)?;
    Ok(Box::new(move |f| {
        let addr = (bt(f).as_i64() + ot(f).as_i64()) as u64;
        let v = vt(f);
        unsafe { ty.store(addr, &v) };
        Value::Unit
    }))
}

macro_rules! int_arith {
    ($op:expr, $thunks:expr, $variant:ident, $t:ty) => {{
        let op = $op;
        let thunks = $thunks;
        Box::new(move |f: &mut Frame<'_>| {
            let mut acc = thunks[0](f).as_i64() as $t;
            for t in &thunks[1..] {
                let rhs = t(f).as_i64() as $t;
                acc = match op {
                    ArithOp::Add => acc.wrapping_add(rhs),
                    ArithOp::Sub => acc.wrapping_sub(rhs),
                    ArithOp::Mul => acc.wrapping_mul(rhs),
                };
            }
            Value::$variant(acc)
        }) as Thunk
    }};
}

macro_rules! float_arith {
    ($op:expr, $thunks:expr, $variant:ident, $t:ty) => {{
        let op = $op;
        let thunks = $thunks;
        let get = |v: Value| -> $t {
            match v {
                Value::$variant(x) => x,
                v => panic!("expected {} operand, got {}", stringify!($t), v.type_name()),
            }
        };
        Box::new(move |f: &mut Frame<'_>| {
            let mut acc = get(thunks[0](f));
            for t in &thunks[1..] {
                let rhs = get(t(f));
                acc = match op {
                    ArithOp::Add => acc + rhs,
                    ArithOp::Sub => acc - rhs,
                    ArithOp::Mul => acc * rhs,
                };
            }
            Value::$variant(acc)
        }) as Thunk
    }};
}

fn compile_arith(
    expr: &Expr,
    op: ArithOp,
    operands: &[Expr],
    cx: &CompileCx<'_>,
) -> Result<Thunk, SchemaError> {
    assert!(operands.len() >= 2, "arithmetic needs two or more operands");
    let ty = match expr.infer(&cx.params, cx.natives)? {
        ExprType::Prim(p) if p.is_numeric() => p,
        other => panic!("arithmetic over non-numeric type {other}"),
    };
    let mut thunks = Vec::with_capacity(operands.len());
    for e in operands {
        thunks.push(compile(e, cx)?);
    }
    Ok(match ty {
        Primitive::I8 => int_arith!(op, thunks, I8, i8),
        Primitive::I16 => int_arith!(op, thunks, I16, i16),
        Primitive::I32 => int_arith!(op, thunks, I32, i32),
        Primitive::I64 => int_arith!(op, thunks, I64, i64),
        Primitive::F32 => float_arith!(op, thunks, F32, f32),
        Primitive::F64 => float_arith!(op, thunks, F64, f64),
        Primitive::Bool => unreachable!("checked numeric above"),
    })
}

fn compile_member_call(target: MemberTarget, arg_thunks: Vec<Thunk>) -> Thunk {
    match target {
        MemberTarget::ArenaAllocate => Box::new(move |f| {
            let size = arg_thunks[0](f).as_i64() as usize;
            let addr = f.ctx.arena.borrow_mut().allocate(size);
            Value::I64(addr as i64)
        }),
        MemberTarget::ArenaCopyBytes => Box::new(move |f| {
            let src = arg_thunks[0](f).as_addr();
            let dst = arg_thunks[1](f).as_addr();
            let len = arg_thunks[2](f).as_i64() as usize;
            unsafe { memory::copy_bytes(src, dst, len) };
            Value::Unit
        }),
        MemberTarget::RecordRender => Box::new(move |f| {
            let slot = arg_thunks[0](f).as_i64() as usize;
            let addr = arg_thunks[1](f).as_addr();
            Value::Str(f.ctx.nested[slot].render(addr))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::codegen::frame::RoutineCtx;
    use crate::memory::Arena;

    fn run(expr: &Expr, params: Vec<ExprType>, args: &[Value], base: u64) -> Value {
        let natives = NativeTable::with_builtins();
        let cx = CompileCx {
            params,
            natives: &natives,
        };
        let thunk = compile(expr, &cx).unwrap();
        let arena = RefCell::new(Arena::new());
        let ctx = RoutineCtx {
            arena: &arena,
            nested: &[],
        };
        let mut frame = Frame::new(ctx, base, args, expr.slot_count());
        thunk(&mut frame)
    }

    fn scratch_record(arena: &RefCell<Arena>, size: usize) -> u64 {
        arena.borrow_mut().allocate(size)
    }

    #[test]
    fn comparator_nulls_are_equal() {
        let expr = Expr::Comparator {
            pairs: vec![(Expr::Const(Value::Null), Expr::Const(Value::Null))],
        };
        assert_eq!(run(&expr, vec![], &[], 0), Value::I32(0));
    }

    #[test]
    fn comparator_null_orders_before_any_value() {
        let less = Expr::Comparator {
            pairs: vec![(Expr::Const(Value::Null), Expr::Const(Value::I32(i32::MIN)))],
        };
        let greater = Expr::Comparator {
            pairs: vec![(Expr::Const(Value::I32(i32::MIN)), Expr::Const(Value::Null))],
        };
        assert_eq!(run(&less, vec![], &[], 0), Value::I32(-1));
        assert_eq!(run(&greater, vec![], &[], 0), Value::I32(1));
    }

    #[test]
    fn comparator_short_circuits_lexicographically() {
        let expr = Expr::Comparator {
            pairs: vec![
                (Expr::Const(Value::I32(1)), Expr::Const(Value::I32(1))),
                (Expr::Const(Value::I32(9)), Expr::Const(Value::I32(2))),
                (Expr::Const(Value::I32(0)), Expr::Const(Value::I32(5))),
            ],
        };
        assert_eq!(run(&expr, vec![], &[], 0), Value::I32(1));
    }

    #[test]
    fn integer_arith_wraps() {
        let expr = Expr::Arith {
            op: ArithOp::Add,
            operands: vec![
                Expr::Const(Value::I32(i32::MAX)),
                Expr::Const(Value::I32(1)),
            ],
        };
        assert_eq!(run(&expr, vec![], &[], 0), Value::I32(i32::MIN));
    }

    #[test]
    fn loop_accumulates_into_a_field() {
        let arena = RefCell::new(Arena::new());
        let base = scratch_record(&arena, 4);
        let field = |value: Expr| Expr::FieldStore {
            base: Box::new(Expr::Base),
            offset: Box::new(Expr::Const(Value::I32(0))),
            ty: Primitive::I32,
            value: Box::new(value),
        };
        let load = Expr::FieldLoad {
            base: Box::new(Expr::Base),
            offset: Box::new(Expr::Const(Value::I32(0))),
            ty: Primitive::I32,
        };
        let expr = Expr::Seq(vec![
            Expr::Loop {
                start: Box::new(Expr::Const(Value::I32(0))),
                length: Box::new(Expr::Const(Value::I32(5))),
                body: Box::new(field(Expr::Arith {
                    op: ArithOp::Add,
                    operands: vec![load.clone(), Expr::LoopVar],
                })),
            },
            load,
        ]);
        let natives = NativeTable::with_builtins();
        let cx = CompileCx {
            params: vec![],
            natives: &natives,
        };
        let thunk = compile(&expr, &cx).unwrap();
        let ctx = RoutineCtx {
            arena: &arena,
            nested: &[],
        };
        let mut frame = Frame::new(ctx, base, &[], expr.slot_count());
        assert_eq!(thunk(&mut frame), Value::I32(10));
    }

    #[test]
    fn let_memoizes_first_use() {
        let arena = RefCell::new(Arena::new());
        let base = scratch_record(&arena, 4);
        unsafe { Primitive::I32.store(base, &Value::I32(41)) };
        let memo = Expr::Let {
            slot: 0,
            value: Rc::new(Expr::FieldLoad {
                base: Box::new(Expr::Base),
                offset: Box::new(Expr::Const(Value::I32(0))),
                ty: Primitive::I32,
            }),
        };
        // bump the field after the let's first use; the second use must see
        // the memoized value, not the mutated field
        let expr = Expr::Seq(vec![
            Expr::FieldStore {
                base: Box::new(Expr::Base),
                offset: Box::new(Expr::Const(Value::I32(0))),
                ty: Primitive::I32,
                value: Box::new(Expr::Arith {
                    op: ArithOp::Add,
                    operands: vec![memo.clone(), Expr::Const(Value::I32(1))],
                }),
            },
            memo,
        ]);
        let natives = NativeTable::with_builtins();
        let cx = CompileCx {
            params: vec![],
            natives: &natives,
        };
        let thunk = compile(&expr, &cx).unwrap();
        let ctx = RoutineCtx {
            arena: &arena,
            nested: &[],
        };
        let mut frame = Frame::new(ctx, base, &[], expr.slot_count());
        assert_eq!(thunk(&mut frame), Value::I32(41));
        assert_eq!(unsafe { Primitive::I32.load(base) }, Value::I32(42));
    }

    #[test]
    fn take_let_consumes_the_slot() {
        let take = Expr::TakeLet {
            slot: 0,
            value: Rc::new(Expr::Const(Value::I32(7))),
        };
        // the first read takes the stored value, the second finds the slot
        // unset and falls back to the node's own expression
        let expr = Expr::Seq(vec![
            Expr::StoreLet {
                slot: 0,
                value: Box::new(Expr::Const(Value::I32(5))),
            },
            Expr::Arith {
                op: ArithOp::Add,
                operands: vec![take.clone(), take],
            },
        ]);
        assert_eq!(run(&expr, vec![], &[], 0), Value::I32(12));
    }

    #[test]
    fn unresolved_call_is_no_such_method() {
        let expr = Expr::Call {
            kind: CallKind::Static,
            owner: "str".to_string(),
            name: "reverse".to_string(),
            args: vec![Expr::Const(Value::Str("ab".to_string()))],
        };
        let natives = NativeTable::with_builtins();
        let cx = CompileCx {
            params: vec![],
            natives: &natives,
        };
        let err = compile(&expr, &cx).map(|_| ()).unwrap_err();
        assert_eq!(
            err,
            crate::error::SchemaError::NoSuchMethod {
                owner: "str".to_string(),
                name: "reverse".to_string(),
                args: "text".to_string(),
            }
        );
    }

    #[test]
    fn store_arg_overwrites_a_parameter() {
        let expr = Expr::Seq(vec![
            Expr::StoreArg(0, Box::new(Expr::Const(Value::I32(7)))),
            Expr::Arg(0),
        ]);
        let got = run(
            &expr,
            vec![ExprType::Prim(Primitive::I32)],
            &[Value::I32(1)],
            0,
        );
        assert_eq!(got, Value::I32(7));
    }
}
