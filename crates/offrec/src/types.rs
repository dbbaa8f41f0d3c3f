//! Primitive storage types, type references and runtime values
//!
//! A [`Primitive`] is the internal storage form of a field: a fixed width and
//! the unaligned load/store that moves it between raw memory and a [`Value`].
//! A [`TypeRef`] is the external type a schema declares: primitives, boxed
//! primitives (which unwrap to the same storage form), embedded records and
//! record sequences.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::schema::Schema;

/// Internal storage type of a member: fixed width, unaligned access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// 1 byte, stored as 0 or 1
    Bool,
    /// 1 byte signed
    I8,
    /// 2 bytes signed
    I16,
    /// 4 bytes signed
    I32,
    /// 8 bytes signed
    I64,
    /// 4 bytes IEEE-754, stored bit-exact
    F32,
    /// 8 bytes IEEE-754, stored bit-exact
    F64,
}

impl Primitive {
    /// Storage width in bytes
    pub fn width(self) -> u32 {
        match self {
            Primitive::Bool | Primitive::I8 => 1,
            Primitive::I16 => 2,
            Primitive::I32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::F64 => 8,
        }
    }

    /// Lowercase type name, used in error messages and fingerprints
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
        }
    }

    /// Whether add/subtract/increase apply to this type
    pub fn is_numeric(self) -> bool {
        !matches!(self, Primitive::Bool)
    }

    /// Load a value of this type from `addr`.
    ///
    /// Floats are moved through their bit pattern so NaN payloads survive.
    ///
    /// # Safety
    ///
    /// `addr` must point into live record storage with at least
    /// [`width`](Self::width) readable bytes. No bounds or liveness checks
    /// are performed.
    pub unsafe fn load(self, addr: u64) -> Value {
        match self {
            Primitive::Bool => Value::Bool(read_raw::<u8>(addr) != 0),
            Primitive::I8 => Value::I8(read_raw::<i8>(addr)),
            Primitive::I16 => Value::I16(read_raw::<i16>(addr)),
            Primitive::I32 => Value::I32(read_raw::<i32>(addr)),
            Primitive::I64 => Value::I64(read_raw::<i64>(addr)),
            Primitive::F32 => Value::F32(f32::from_bits(read_raw::<u32>(addr))),
            Primitive::F64 => Value::F64(f64::from_bits(read_raw::<u64>(addr))),
        }
    }

    /// Store `value` at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not of this type. The routine compiler only emits
    /// matching stores, so hitting this is a caller programming error.
    ///
    /// # Safety
    ///
    /// Same contract as [`load`](Self::load), for writing.
    pub unsafe fn store(self, addr: u64, value: &Value) {
        match (self, value) {
            (Primitive::Bool, Value::Bool(v)) => write_raw::<u8>(addr, *v as u8),
            (Primitive::I8, Value::I8(v)) => write_raw::<i8>(addr, *v),
            (Primitive::I16, Value::I16(v)) => write_raw::<i16>(addr, *v),
            (Primitive::I32, Value::I32(v)) => write_raw::<i32>(addr, *v),
            (Primitive::I64, Value::I64(v)) => write_raw::<i64>(addr, *v),
            (Primitive::F32, Value::F32(v)) => write_raw::<u32>(addr, v.to_bits()),
            (Primitive::F64, Value::F64(v)) => write_raw::<u64>(addr, v.to_bits()),
            (ty, v) => panic!("store of {} into {} field", v.type_name(), ty.name()),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

unsafe fn read_raw<T: Copy>(addr: u64) -> T {
    (addr as *const T).read_unaligned()
}

unsafe fn write_raw<T: Copy>(addr: u64, value: T) {
    (addr as *mut T).write_unaligned(value)
}

/// External type of a declared method parameter, return value or member.
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// No value (setter returns)
    Unit,
    /// A primitive, stored as-is
    Prim(Primitive),
    /// A nullable boxed primitive; unwraps to the same storage primitive
    Boxed(Primitive),
    /// An embedded record of another schema, laid out inline
    Record(Arc<Schema>),
    /// The schema's own record view type (`view()`, `copy()`, `copyFrom`)
    SelfRecord,
    /// A sequence over an array member of embedded records
    Sequence(Arc<Schema>),
    /// An owned string (`string()` render)
    Text,
}

impl TypeRef {
    /// Shorthand for `TypeRef::Prim(Primitive::Bool)`
    pub const BOOL: TypeRef = TypeRef::Prim(Primitive::Bool);
    /// Shorthand for `TypeRef::Prim(Primitive::I8)`
    pub const BYTE: TypeRef = TypeRef::Prim(Primitive::I8);
    /// Shorthand for `TypeRef::Prim(Primitive::I16)`
    pub const SHORT: TypeRef = TypeRef::Prim(Primitive::I16);
    /// Shorthand for `TypeRef::Prim(Primitive::I32)`
    pub const INT: TypeRef = TypeRef::Prim(Primitive::I32);
    /// Shorthand for `TypeRef::Prim(Primitive::I64)`
    pub const LONG: TypeRef = TypeRef::Prim(Primitive::I64);
    /// Shorthand for `TypeRef::Prim(Primitive::F32)`
    pub const FLOAT: TypeRef = TypeRef::Prim(Primitive::F32);
    /// Shorthand for `TypeRef::Prim(Primitive::F64)`
    pub const DOUBLE: TypeRef = TypeRef::Prim(Primitive::F64);
    /// Shorthand for `TypeRef::Unit`
    pub const UNIT: TypeRef = TypeRef::Unit;

    /// Internal storage primitive, if this type stores as one
    pub fn storage(&self) -> Option<Primitive> {
        match self {
            TypeRef::Prim(p) | TypeRef::Boxed(p) => Some(*p),
            _ => None,
        }
    }

    /// Nested schema for record-typed members
    pub fn nested_schema(&self) -> Option<&Arc<Schema>> {
        match self {
            TypeRef::Record(s) | TypeRef::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable name for error messages
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Unit => "unit".to_string(),
            TypeRef::Prim(p) => p.name().to_string(),
            TypeRef::Boxed(p) => format!("boxed {}", p.name()),
            TypeRef::Record(s) => format!("record {}", s.name()),
            TypeRef::SelfRecord => "self".to_string(),
            TypeRef::Sequence(s) => format!("sequence of {}", s.name()),
            TypeRef::Text => "text".to_string(),
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeRef::Unit, TypeRef::Unit) => true,
            (TypeRef::Prim(a), TypeRef::Prim(b)) => a == b,
            (TypeRef::Boxed(a), TypeRef::Boxed(b)) => a == b,
            (TypeRef::SelfRecord, TypeRef::SelfRecord) => true,
            (TypeRef::Text, TypeRef::Text) => true,
            // structural identity: two schemas are the same type if their
            // fingerprints agree
            (TypeRef::Record(a), TypeRef::Record(b))
            | (TypeRef::Sequence(a), TypeRef::Sequence(b))
            | (TypeRef::Record(a), TypeRef::Sequence(b))
            | (TypeRef::Sequence(a), TypeRef::Record(b)) => {
                a.fingerprint() == b.fingerprint()
            }
            _ => false,
        }
    }
}

/// A runtime value flowing through compiled routines.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (setter results)
    Unit,
    /// Absent nullable value; orders before every non-null value
    Null,
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer; also carries record addresses
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Owned string (render results)
    Str(String),
}

impl Value {
    /// Widen any integer (or bool) to i64. Used for address and index math.
    ///
    /// # Panics
    ///
    /// Panics on floats, strings and null.
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Bool(v) => *v as i64,
            Value::I8(v) => *v as i64,
            Value::I16(v) => *v as i64,
            Value::I32(v) => *v as i64,
            Value::I64(v) => *v,
            other => panic!("expected integer value, got {}", other.type_name()),
        }
    }

    /// Narrow to i32, truncating i64s. Loop bounds and indices are i32.
    pub fn as_i32(&self) -> i32 {
        self.as_i64() as i32
    }

    /// Interpret as a record address.
    pub fn as_addr(&self) -> u64 {
        self.as_i64() as u64
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "text",
        }
    }

    /// Append the rendered form of this value to `out`.
    ///
    /// Matches the default record render: shortest round-trip float form,
    /// `true`/`false` booleans, `null` for absent values.
    pub fn render_into(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Value::Unit => out.push_str("()"),
            Value::Null => out.push_str("null"),
            Value::Bool(v) => {
                let _ = write!(out, "{v}");
            }
            Value::I8(v) => {
                let _ = write!(out, "{v}");
            }
            Value::I16(v) => {
                let _ = write!(out, "{v}");
            }
            Value::I32(v) => {
                let _ = write!(out, "{v}");
            }
            Value::I64(v) => {
                let _ = write!(out, "{v}");
            }
            Value::F32(v) => {
                let _ = write!(out, "{v}");
            }
            Value::F64(v) => {
                let _ = write!(out, "{v}");
            }
            Value::Str(v) => out.push_str(v),
        }
    }

    /// Nullable comparison used by the comparator IR node.
    ///
    /// Null orders before any non-null value and equals null. Same-type
    /// primitives compare numerically; floats use total ordering (negative
    /// zero below positive zero, NaN above infinity), so the result is a
    /// consistent sign for every input pair. Strings compare naturally.
    ///
    /// # Panics
    ///
    /// Panics when the two sides have different non-null types.
    pub fn compare_nullable(&self, other: &Value) -> i32 {
        let ord = match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::I8(a), Value::I8(b)) => a.cmp(b),
            (Value::I16(a), Value::I16(b)) => a.cmp(b),
            (Value::I32(a), Value::I32(b)) => a.cmp(b),
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::F32(a), Value::F32(b)) => a.total_cmp(b),
            (Value::F64(a), Value::F64(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) => panic!(
                "comparator over mismatched types {} and {}",
                a.type_name(),
                b.type_name()
            ),
        };
        match ord {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.render_into(&mut s);
        f.write_str(&s)
    }
}

/// Result type of an IR expression, as seen by the routine compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    /// No value
    Unit,
    /// A primitive value
    Prim(Primitive),
    /// The null constant
    Null,
    /// An owned string
    Str,
}

impl ExprType {
    /// Name for error messages
    pub fn name(self) -> &'static str {
        match self {
            ExprType::Unit => "unit",
            ExprType::Prim(p) => p.name(),
            ExprType::Null => "null",
            ExprType::Str => "text",
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&Value> for ExprType {
    fn from(v: &Value) -> Self {
        match v {
            Value::Unit => ExprType::Unit,
            Value::Null => ExprType::Null,
            Value::Bool(_) => ExprType::Prim(Primitive::Bool),
            Value::I8(_) => ExprType::Prim(Primitive::I8),
            Value::I16(_) => ExprType::Prim(Primitive::I16),
            Value::I32(_) => ExprType::Prim(Primitive::I32),
            Value::I64(_) => ExprType::Prim(Primitive::I64),
            Value::F32(_) => ExprType::Prim(Primitive::F32),
            Value::F64(_) => ExprType::Prim(Primitive::F64),
            Value::Str(_) => ExprType::Str,
        }
    }
}

impl TypeRef {
    /// The IR-level type a routine parameter or return of this type carries.
    ///
    /// Records and sequences travel as their i64 address.
    pub fn expr_type(&self) -> ExprType {
        match self {
            TypeRef::Unit => ExprType::Unit,
            TypeRef::Prim(p) | TypeRef::Boxed(p) => ExprType::Prim(*p),
            TypeRef::Record(_) | TypeRef::SelfRecord | TypeRef::Sequence(_) => {
                ExprType::Prim(Primitive::I64)
            }
            TypeRef::Text => ExprType::Str,
        }
    }
}
