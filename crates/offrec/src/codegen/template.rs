//! Routine templates: one expression tree per accessor method
//!
//! Built at registration time, after the layout planner has assigned member
//! offsets: every template folds its member's offset, element size and count
//! in as constants, so the compiled routine carries no layout lookups. Meta
//! routines the schema did not declare (`recordId`, `view`, `copy`, `string`,
//! ...) are synthesized under canonical names so every adapter exposes the
//! full identity surface.

use std::rc::Rc;

use crate::schema::{ActionType, Member, RecordClass};
use crate::types::{ExprType, Primitive, Value};

use super::expr::{ArithOp, CallKind, Expr};

/// A named routine shape ready for compilation.
pub struct RoutineTemplate {
    /// Invocation name; declared methods keep theirs, synthesized meta
    /// routines use the canonical accessor names
    pub name: String,
    /// Accessor pattern
    pub action: ActionType,
    /// Bound member index, `None` for identity/meta routines
    pub member: Option<u32>,
    /// Parameter types, in declaration order
    pub params: Vec<ExprType>,
    /// Routine body
    pub expr: Expr,
}

/// Build the full template set for an inspected class.
///
/// `blueprint_id` is folded into the `blueprintId()` template as a constant,
/// which is why templates are rebuilt per registration rather than cached on
/// the class.
pub fn build(class: &RecordClass, blueprint_id: u32) -> Vec<RoutineTemplate> {
    let mut templates = Vec::with_capacity(class.methods.len() + 8);
    for method in &class.methods {
        let member = method.member.map(|i| &class.members[i as usize]);
        templates.push(RoutineTemplate {
            name: method.name.clone(),
            action: method.action,
            member: method.member,
            params: params_for(method.action, member),
            expr: expr_for(class, blueprint_id, method.action, member),
        });
    }
    synthesize_meta(class, blueprint_id, &mut templates);
    templates
}

/// Canonical names of the identity routines every adapter exposes.
const META: &[(&str, ActionType)] = &[
    ("recordId", ActionType::GetRecordId),
    ("recordId", ActionType::SetRecordId),
    ("blueprintId", ActionType::GetBlueprintId),
    ("recordSize", ActionType::GetRecordSize),
    ("view", ActionType::View),
    ("viewAt", ActionType::ViewAt),
    ("copy", ActionType::Copy),
    ("copyFrom", ActionType::CopyFrom),
    ("string", ActionType::ToString),
];

fn synthesize_meta(class: &RecordClass, blueprint_id: u32, templates: &mut Vec<RoutineTemplate>) {
    for &(name, action) in META {
        if templates.iter().any(|t| t.action == action) {
            continue;
        }
        templates.push(RoutineTemplate {
            name: name.to_string(),
            action,
            member: None,
            params: params_for(action, None),
            expr: expr_for(class, blueprint_id, action, None),
        });
    }
}

/// Parameter types implied by an action. Record-typed parameters travel as
/// their i64 address.
fn params_for(action: ActionType, member: Option<&Member>) -> Vec<ExprType> {
    let i32_ = ExprType::Prim(Primitive::I32);
    let addr = ExprType::Prim(Primitive::I64);
    let elem = || {
        member
            .and_then(|m| m.storage())
            .map(ExprType::Prim)
            .unwrap_or(addr)
    };
    match action {
        ActionType::GetValueAt => vec![i32_],
        ActionType::GetValueWith => vec![addr],
        ActionType::GetValueWithAt => vec![i32_, addr],
        ActionType::SetValue => vec![elem()],
        ActionType::SetValueAt => vec![i32_, elem()],
        ActionType::IncreaseValueBy | ActionType::DecreaseValueBy => vec![elem()],
        ActionType::SetRecordId | ActionType::ViewAt | ActionType::CopyFrom => vec![addr],
        _ => Vec::new(),
    }
}

fn expr_for(
    class: &RecordClass,
    blueprint_id: u32,
    action: ActionType,
    member: Option<&Member>,
) -> Expr {
    let m = || member.expect("member-bound action");
    match action {
        ActionType::GetValue => match m().storage() {
            Some(prim) => load(m(), prim),
            // record members read as their inline address
            None => member_addr(m()),
        },
        ActionType::GetValueAt => match m().storage() {
            Some(prim) => load_at(m(), prim, Expr::Arg(0)),
            None => element_addr(m(), Expr::Arg(0)),
        },
        ActionType::GetValueWith => member_addr(m()),
        ActionType::GetValueWithAt => element_addr(m(), Expr::Arg(0)),
        ActionType::SetValue => match m().storage() {
            Some(prim) => store(m(), prim, Expr::Arg(0)),
            None => copy_into(member_addr(m()), Expr::Arg(0), m().element_size),
        },
        ActionType::SetValueAt => match m().storage() {
            Some(prim) => store_at(m(), prim, Expr::Arg(0), Expr::Arg(1)),
            None => copy_into(element_addr(m(), Expr::Arg(0)), Expr::Arg(1), m().element_size),
        },
        ActionType::IncreaseValue => bump(m(), ArithOp::Add, one(numeric(m()))),
        ActionType::IncreaseValueBy => bump(m(), ArithOp::Add, Expr::Arg(0)),
        ActionType::DecreaseValue => bump(m(), ArithOp::Sub, one(numeric(m()))),
        ActionType::DecreaseValueBy => bump(m(), ArithOp::Sub, Expr::Arg(0)),
        ActionType::GetArraySize => Expr::Const(Value::I32(m().count as i32)),
        ActionType::GetSequence => member_addr(m()),
        ActionType::GetRecordId => Expr::Base,
        ActionType::SetRecordId => Expr::BindBase(Box::new(Expr::Arg(0))),
        ActionType::GetBlueprintId => Expr::Const(Value::I32(blueprint_id as i32)),
        ActionType::GetRecordSize => Expr::Const(Value::I32(class.record_size as i32)),
        ActionType::Copy => copy_record(class.record_size),
        ActionType::CopyFrom => Expr::Call {
            kind: CallKind::Member,
            owner: "arena".to_string(),
            name: "copy_bytes".to_string(),
            args: vec![
                Expr::Arg(0),
                Expr::Base,
                Expr::Const(Value::I64(class.record_size as i64)),
            ],
        },
        ActionType::View => Expr::Base,
        ActionType::ViewAt => Expr::Arg(0),
        ActionType::ToString => match &class.custom_render {
            Some(key) => custom_render(class, key),
            None => default_render(class),
        },
    }
}

fn numeric(m: &Member) -> Primitive {
    m.storage().expect("numeric member")
}

fn one(prim: Primitive) -> Expr {
    Expr::Const(match prim {
        Primitive::I8 => Value::I8(1),
        Primitive::I16 => Value::I16(1),
        Primitive::I32 => Value::I32(1),
        Primitive::I64 => Value::I64(1),
        Primitive::F32 => Value::F32(1.0),
        Primitive::F64 => Value::F64(1.0),
        Primitive::Bool => unreachable!("rejected at inspection"),
    })
}

fn load(m: &Member, prim: Primitive) -> Expr {
    Expr::FieldLoad {
        base: Box::new(Expr::Base),
        offset: Box::new(Expr::Const(Value::I32(m.offset as i32))),
        ty: prim,
    }
}

fn store(m: &Member, prim: Primitive, value: Expr) -> Expr {
    Expr::FieldStore {
        base: Box::new(Expr::Base),
        offset: Box::new(Expr::Const(Value::I32(m.offset as i32))),
        ty: prim,
        value: Box::new(value),
    }
}

/// `offset + index * element_size`, folded at compile time where possible
fn scaled_offset(m: &Member, index: Expr) -> Expr {
    Expr::Arith {
        op: ArithOp::Add,
        operands: vec![
            Expr::Const(Value::I32(m.offset as i32)),
            Expr::Arith {
                op: ArithOp::Mul,
                operands: vec![index, Expr::Const(Value::I32(m.element_size as i32))],
            },
        ],
    }
}

fn load_at(m: &Member, prim: Primitive, index: Expr) -> Expr {
    Expr::FieldLoad {
        base: Box::new(Expr::Base),
        offset: Box::new(scaled_offset(m, index)),
        ty: prim,
    }
}

fn store_at(m: &Member, prim: Primitive, index: Expr, value: Expr) -> Expr {
    Expr::FieldStore {
        base: Box::new(Expr::Base),
        offset: Box::new(scaled_offset(m, index)),
        ty: prim,
        value: Box::new(value),
    }
}

/// Address of the member's first byte within the bound record
fn member_addr(m: &Member) -> Expr {
    Expr::Arith {
        op: ArithOp::Add,
        operands: vec![Expr::Base, Expr::Const(Value::I64(m.offset as i64))],
    }
}

/// Address of the i-th element of an array member
fn element_addr(m: &Member, index: Expr) -> Expr {
    Expr::Arith {
        op: ArithOp::Add,
        operands: vec![
            Expr::Base,
            Expr::Const(Value::I64(m.offset as i64)),
            Expr::Arith {
                op: ArithOp::Mul,
                operands: vec![index, Expr::Const(Value::I32(m.element_size as i32))],
            },
        ],
    }
}

fn bump(m: &Member, op: ArithOp, amount: Expr) -> Expr {
    let prim = numeric(m);
    store(
        m,
        prim,
        Expr::Arith {
            op,
            operands: vec![load(m, prim), amount],
        },
    )
}

fn copy_into(dst: Expr, src: Expr, len: u32) -> Expr {
    Expr::Call {
        kind: CallKind::Member,
        owner: "arena".to_string(),
        name: "copy_bytes".to_string(),
        args: vec![src, dst, Expr::Const(Value::I64(len as i64))],
    }
}

/// `copy()`: allocate, duplicate the record's bytes, yield the new address
fn copy_record(record_size: u32) -> Expr {
    let fresh = Expr::Let {
        slot: 0,
        value: Rc::new(Expr::Call {
            kind: CallKind::Member,
            owner: "arena".to_string(),
            name: "allocate".to_string(),
            args: vec![Expr::Const(Value::I64(record_size as i64))],
        }),
    };
    Expr::Seq(vec![
        Expr::Call {
            kind: CallKind::Member,
            owner: "arena".to_string(),
            name: "copy_bytes".to_string(),
            args: vec![
                Expr::Base,
                fresh.clone(),
                Expr::Const(Value::I64(record_size as i64)),
            ],
        },
        fresh,
    ])
}

/// Consume the string accumulator in `slot`. Every read either feeds an
/// append whose result is stored right back, or is the render's final value,
/// so taking the string avoids copying it on each step. The fallback is only
/// evaluated if nothing was stored first, which the templates never allow.
fn acc(slot: usize) -> Expr {
    Expr::TakeLet {
        slot,
        value: Rc::new(Expr::Const(Value::Str(String::new()))),
    }
}

fn append(slot: usize, value: Expr) -> Expr {
    Expr::StoreLet {
        slot,
        value: Box::new(Expr::Call {
            kind: CallKind::Static,
            owner: "str".to_string(),
            name: "append".to_string(),
            args: vec![acc(slot), value],
        }),
    }
}

fn append_text(slot: usize, text: impl Into<String>) -> Expr {
    append(slot, Expr::Const(Value::Str(text.into())))
}

/// The value a member contributes to a render: its loaded scalar, or the
/// nested adapter's own render for embedded records.
fn render_value(m: &Member, addr: Expr) -> Expr {
    match m.storage() {
        Some(prim) => Expr::FieldLoad {
            base: Box::new(addr),
            offset: Box::new(Expr::Const(Value::I32(0))),
            ty: prim,
        },
        None => Expr::Call {
            kind: CallKind::Member,
            owner: "record".to_string(),
            name: "render".to_string(),
            args: vec![
                Expr::Const(Value::I32(m.nested.expect("nested member") as i32)),
                addr,
            ],
        },
    }
}

/// Append one member's rendering into the accumulator `slot`.
fn render_member(m: &Member, slot: usize, out: &mut Vec<Expr>) {
    if m.is_array() {
        out.push(append_text(slot, "["));
        out.push(Expr::Loop {
            start: Box::new(Expr::Const(Value::I32(0))),
            length: Box::new(Expr::Const(Value::I32(m.count as i32))),
            body: Box::new(Expr::StoreLet {
                slot,
                value: Box::new(Expr::Call {
                    kind: CallKind::Static,
                    owner: "str".to_string(),
                    name: "append_item".to_string(),
                    args: vec![
                        acc(slot),
                        Expr::LoopVar,
                        render_value(m, element_addr(m, Expr::LoopVar)),
                    ],
                }),
            }),
        });
        out.push(append_text(slot, "]"));
    } else {
        out.push(append(slot, render_value(m, member_addr(m))));
    }
}

/// `{Name: value, Other: [a, b], Point: {X: 1, Y: 2}}`
fn default_render(class: &RecordClass) -> Expr {
    let mut steps = vec![Expr::StoreLet {
        slot: 0,
        value: Box::new(Expr::Const(Value::Str("{".to_string()))),
    }];
    for (i, m) in class.members.iter().enumerate() {
        let label = if i == 0 {
            format!("{}: ", m.name)
        } else {
            format!(", {}: ", m.name)
        };
        steps.push(append_text(0, label));
        render_member(m, 0, &mut steps);
    }
    steps.push(append_text(0, "}"));
    steps.push(acc(0));
    Expr::Seq(steps)
}

/// A declared custom render: call the registered native with every member
/// value in declaration order. Array members are pre-rendered into their own
/// accumulator slots and passed as text.
fn custom_render(class: &RecordClass, key: &str) -> Expr {
    let (owner, name) = key.split_once('.').unwrap_or(("str", key));
    let mut preludes = Vec::new();
    let mut args = Vec::with_capacity(class.members.len());
    let mut next_slot = 0;
    for m in &class.members {
        if m.is_array() {
            let slot = next_slot;
            next_slot += 1;
            preludes.push(Expr::StoreLet {
                slot,
                value: Box::new(Expr::Const(Value::Str("[".to_string()))),
            });
            render_member_items(m, slot, &mut preludes);
            preludes.push(append_text(slot, "]"));
            args.push(acc(slot));
        } else {
            args.push(render_value(m, member_addr(m)));
        }
    }
    preludes.push(Expr::Call {
        kind: CallKind::Static,
        owner: owner.to_string(),
        name: name.to_string(),
        args,
    });
    Expr::Seq(preludes)
}

fn render_member_items(m: &Member, slot: usize, out: &mut Vec<Expr>) {
    out.push(Expr::Loop {
        start: Box::new(Expr::Const(Value::I32(0))),
        length: Box::new(Expr::Const(Value::I32(m.count as i32))),
        body: Box::new(Expr::StoreLet {
            slot,
            value: Box::new(Expr::Call {
                kind: CallKind::Static,
                owner: "str".to_string(),
                name: "append_item".to_string(),
                args: vec![
                    acc(slot),
                    Expr::LoopVar,
                    render_value(m, element_addr(m, Expr::LoopVar)),
                ],
            }),
        }),
    });
}
