//! Schema declarations, structural identity, and the inspected record model
//!
//! A [`Schema`] is the declarative description of a fixed-layout record: an
//! ordered list of method declarations following the accessor naming
//! conventions (`getX`/`setX`, `getXAt`, `increaseXBy`, ...). The
//! [`inspector`] groups those declarations into [`Member`]s and [`Method`]s;
//! the [`layout`] planner assigns packed byte offsets.
//!
//! Schema identity is structural: a SHA-256 fingerprint over the ordered
//! method tuples, with nested schemas folded in by their own fingerprint.
//! Registering two schemas with identical declarations yields the same
//! blueprint id regardless of their display names.

pub mod inspector;
pub mod layout;

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::types::{Primitive, TypeRef};

/// Structural identity of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One declared method of a schema.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    /// Declared name, e.g. `getNumber` or `setPointAt`
    pub name: String,
    /// Parameter types in order
    pub params: Vec<TypeRef>,
    /// Return type
    pub ret: TypeRef,
    /// Element-count annotation, meaningful on `getXSize` declarations
    pub array_size: Option<u32>,
    /// Registered native key (`owner.name`) for a custom `string()` render
    pub render: Option<String>,
}

impl MethodDecl {
    /// Declare a method with the given signature.
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef) -> Self {
        MethodDecl {
            name: name.into(),
            params,
            ret,
            array_size: None,
            render: None,
        }
    }

    fn fold_into(&self, hasher: &mut Sha256) {
        hasher.update(self.name.as_bytes());
        hasher.update([0xff, self.params.len() as u8]);
        for p in &self.params {
            fold_type(p, hasher);
        }
        fold_type(&self.ret, hasher);
        match self.array_size {
            Some(n) => hasher.update(n.to_le_bytes()),
            None => hasher.update([0u8]),
        }
        if let Some(render) = &self.render {
            hasher.update(render.as_bytes());
        }
    }
}

fn fold_type(ty: &TypeRef, hasher: &mut Sha256) {
    fn prim_tag(p: Primitive) -> u8 {
        match p {
            Primitive::Bool => 1,
            Primitive::I8 => 2,
            Primitive::I16 => 3,
            Primitive::I32 => 4,
            Primitive::I64 => 5,
            Primitive::F32 => 6,
            Primitive::F64 => 7,
        }
    }
    match ty {
        TypeRef::Unit => hasher.update([0x10]),
        TypeRef::Prim(p) => hasher.update([0x20, prim_tag(*p)]),
        TypeRef::Boxed(p) => hasher.update([0x30, prim_tag(*p)]),
        TypeRef::SelfRecord => hasher.update([0x40]),
        TypeRef::Text => hasher.update([0x50]),
        TypeRef::Record(s) => {
            hasher.update([0x60]);
            hasher.update(s.fingerprint().as_bytes());
        }
        TypeRef::Sequence(s) => {
            hasher.update([0x70]);
            hasher.update(s.fingerprint().as_bytes());
        }
    }
}

/// Declarative description of a fixed-layout record.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    methods: Vec<MethodDecl>,
}

impl Schema {
    /// Start declaring a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Display name (not part of the structural identity)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods in declaration order
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    /// Structural fingerprint over the ordered method declarations.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for method in &self.methods {
            method.fold_into(&mut hasher);
        }
        Fingerprint(hasher.finalize().into())
    }
}

/// Builder for [`Schema`] declarations.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    methods: Vec<MethodDecl>,
}

impl SchemaBuilder {
    /// Declare a method with the given parameter and return types.
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: impl Into<Vec<TypeRef>>,
        ret: TypeRef,
    ) -> Self {
        self.methods.push(MethodDecl::new(name, params.into(), ret));
        self
    }

    /// Declare a `getXSize()` method carrying the member's element count.
    pub fn array_size(mut self, name: impl Into<String>, size: u32) -> Self {
        let mut decl = MethodDecl::new(name, Vec::new(), TypeRef::INT);
        decl.array_size = Some(size);
        self.methods.push(decl);
        self
    }

    /// Declare a custom `string()` render backed by the named registered
    /// native (`"owner.name"` key). The native receives every member value in
    /// declaration order.
    pub fn custom_render(mut self, native_key: impl Into<String>) -> Self {
        let mut decl = MethodDecl::new("string", Vec::new(), TypeRef::Text);
        decl.render = Some(native_key.into());
        self.methods.push(decl);
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            methods: self.methods,
        })
    }
}

/// The accessor pattern a declared method implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// `getX()` — load a scalar member (or the address of a record member)
    GetValue,
    /// `getXAt(i)` — load an array element
    GetValueAt,
    /// `getX(reuse)` — load a record member into a caller-supplied view
    GetValueWith,
    /// `getXAt(i, reuse)` — load a record array element into a view
    GetValueWithAt,
    /// `setX(v)` — store a scalar member
    SetValue,
    /// `setXAt(i, v)` — store an array element
    SetValueAt,
    /// `increaseX()` — add one to a numeric member
    IncreaseValue,
    /// `increaseXBy(n)` — add `n` to a numeric member
    IncreaseValueBy,
    /// `decreaseX()` — subtract one from a numeric member
    DecreaseValue,
    /// `decreaseXBy(n)` — subtract `n` from a numeric member
    DecreaseValueBy,
    /// `getXSize()` — the member's element count
    GetArraySize,
    /// `getX()` returning a sequence over a record array member
    GetSequence,
    /// `recordId()` — the record's address
    GetRecordId,
    /// `recordId(id)` — rebind the view to another record
    SetRecordId,
    /// `blueprintId()` — the schema's registered id
    GetBlueprintId,
    /// `recordSize()` — the record's size in bytes
    GetRecordSize,
    /// `copy()` — allocate a new record and duplicate this one's bytes
    Copy,
    /// `copyFrom(other)` — overwrite this record's bytes from another
    CopyFrom,
    /// `view()` — a new view of the same record
    View,
    /// `viewAt(id)` — a new view of the given record
    ViewAt,
    /// `string()` — render the record
    ToString,
}

/// A typed field of the inspected record, with its assigned layout.
#[derive(Debug, Clone)]
pub struct Member {
    /// Capitalized base name, e.g. `Number` for `getNumber`
    pub name: String,
    /// External type as declared
    pub external: TypeRef,
    /// Byte offset within the record, assigned by the layout planner
    pub offset: u32,
    /// Size of one element: primitive width or nested record size
    pub element_size: u32,
    /// Element count; 1 for scalars
    pub count: u32,
    /// Index into the adapter's nested-adapter table for record members
    pub nested: Option<u32>,
}

impl Member {
    /// Internal storage primitive, `None` for embedded records
    pub fn storage(&self) -> Option<Primitive> {
        self.external.storage()
    }

    /// Whether this member holds more than one element
    pub fn is_array(&self) -> bool {
        self.count > 1
    }

    /// Total bytes this member occupies
    pub fn size_in_bytes(&self) -> u32 {
        self.element_size * self.count
    }
}

/// A declared method resolved to an action and a member binding.
#[derive(Debug, Clone)]
pub struct Method {
    /// Declared name
    pub name: String,
    /// Accessor pattern
    pub action: ActionType,
    /// Index of the bound member; `None` for identity/meta methods
    pub member: Option<u32>,
    /// Number of declared parameters
    pub arity: u8,
}

/// Output of the schema inspector: the complete record model.
#[derive(Debug, Clone)]
pub struct RecordClass {
    /// Schema display name
    pub name: String,
    /// Members in encounter order; offsets follow this order
    pub members: Vec<Member>,
    /// All declared methods, each resolved to an action
    pub methods: Vec<Method>,
    /// Native key of a custom `string()` render, if declared
    pub custom_render: Option<String>,
    /// Total record size in bytes, assigned by the layout planner
    pub record_size: u32,
}

impl RecordClass {
    /// Look up a member index by its capitalized name.
    pub fn member_index(&self, name: &str) -> Option<u32> {
        self.members
            .iter()
            .position(|m| m.name == name)
            .map(|i| i as u32)
    }

    /// Look up a member by its capitalized name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}
