//! Schema inspector: groups declared methods into members
//!
//! Walks a schema's method declarations in order, matches each name against
//! the accessor conventions, and groups every method referencing the same
//! base field name into one [`Member`]. Encounter order of members fixes the
//! later offset order. Unknown names fail with
//! [`SchemaError::UnrecognizedMethod`]; accessors that disagree on a member's
//! type fail with [`SchemaError::TypeConflict`].

use rustc_hash::FxHashMap;

use crate::error::SchemaError;
use crate::types::{Primitive, TypeRef};

use super::{ActionType, Member, Method, MethodDecl, RecordClass, Schema};

/// Run the inspector over a schema declaration.
pub fn inspect(schema: &Schema) -> Result<RecordClass, SchemaError> {
    Inspector::new(schema).run()
}

struct MemberBuilder {
    name: String,
    ty: Option<TypeRef>,
    count: u32,
    /// first method that referenced this member, for error reporting
    first_method: String,
    needs_numeric: bool,
}

struct Inspector<'a> {
    schema: &'a Schema,
    members: Vec<MemberBuilder>,
    index: FxHashMap<String, usize>,
    methods: Vec<Method>,
    custom_render: Option<String>,
}

impl<'a> Inspector<'a> {
    fn new(schema: &'a Schema) -> Self {
        Inspector {
            schema,
            members: Vec::new(),
            index: FxHashMap::default(),
            methods: Vec::new(),
            custom_render: None,
        }
    }

    fn run(mut self) -> Result<RecordClass, SchemaError> {
        for decl in self.schema.methods() {
            self.parse(decl)?;
        }
        let mut members = Vec::with_capacity(self.members.len());
        for builder in self.members {
            let ty = builder.ty.ok_or_else(|| SchemaError::UnrecognizedMethod {
                schema: self.schema.name().to_string(),
                name: builder.first_method.clone(),
            })?;
            if builder.needs_numeric {
                let numeric = ty.storage().map(Primitive::is_numeric).unwrap_or(false);
                if !numeric {
                    return Err(SchemaError::TypeConflict {
                        schema: self.schema.name().to_string(),
                        member: builder.name,
                        first: ty.display_name(),
                        second: "a numeric type".to_string(),
                    });
                }
            }
            members.push(Member {
                name: builder.name,
                external: ty,
                offset: 0,
                element_size: 0,
                count: builder.count,
                nested: None,
            });
        }
        Ok(RecordClass {
            name: self.schema.name().to_string(),
            members,
            methods: self.methods,
            custom_render: self.custom_render,
            record_size: 0,
        })
    }

    fn parse(&mut self, decl: &MethodDecl) -> Result<(), SchemaError> {
        if self.parse_meta(decl)? {
            return Ok(());
        }
        if let Some(rest) = decl.name.strip_prefix("get") {
            return self.parse_get(decl, rest);
        }
        if let Some(rest) = decl.name.strip_prefix("set") {
            return self.parse_set(decl, rest);
        }
        if let Some(rest) = decl.name.strip_prefix("increase") {
            return self.parse_step(decl, rest, true);
        }
        if let Some(rest) = decl.name.strip_prefix("decrease") {
            return self.parse_step(decl, rest, false);
        }
        Err(self.unrecognized(decl))
    }

    /// Identity and meta methods, matched by exact name.
    fn parse_meta(&mut self, decl: &MethodDecl) -> Result<bool, SchemaError> {
        let action = match (decl.name.as_str(), decl.params.as_slice()) {
            ("blueprintId", []) => ActionType::GetBlueprintId,
            ("recordId", []) => ActionType::GetRecordId,
            ("recordId", [TypeRef::Prim(Primitive::I64)]) => ActionType::SetRecordId,
            ("recordSize", []) => ActionType::GetRecordSize,
            ("view", []) => ActionType::View,
            ("viewAt", [TypeRef::Prim(Primitive::I64)]) => ActionType::ViewAt,
            ("copy", []) => ActionType::Copy,
            ("copyFrom", [TypeRef::SelfRecord | TypeRef::Record(_)]) => ActionType::CopyFrom,
            ("string", []) => {
                self.custom_render = decl.render.clone();
                ActionType::ToString
            }
            // known meta name with a wrong signature still falls through to
            // the prefix rules, where it will fail as unrecognized
            _ => return Ok(false),
        };
        self.push_method(decl, action, None);
        Ok(true)
    }

    fn parse_get(&mut self, decl: &MethodDecl, rest: &str) -> Result<(), SchemaError> {
        if rest.is_empty() {
            return Err(self.unrecognized(decl));
        }
        // getXSize() — element count of the array member X
        if let Some(base) = rest.strip_suffix("Size") {
            if !base.is_empty() && decl.params.is_empty() {
                let member = self.member_for(base, decl);
                if let Some(size) = decl.array_size {
                    self.members[member].count = size;
                }
                self.push_method(decl, ActionType::GetArraySize, Some(member));
                return Ok(());
            }
        }
        // getXAt(i) / getXAt(i, reuse)
        if let Some(base) = rest.strip_suffix("At") {
            if !base.is_empty() {
                match decl.params.as_slice() {
                    [TypeRef::Prim(Primitive::I32)] => {
                        let member = self.member_for(base, decl);
                        self.set_type(member, &decl.ret)?;
                        self.push_method(decl, ActionType::GetValueAt, Some(member));
                        return Ok(());
                    }
                    [TypeRef::Prim(Primitive::I32), reuse] if self.reusable(reuse, &decl.ret) => {
                        let member = self.member_for(base, decl);
                        self.set_type(member, &decl.ret)?;
                        self.push_method(decl, ActionType::GetValueWithAt, Some(member));
                        return Ok(());
                    }
                    _ => return Err(self.unrecognized(decl)),
                }
            }
        }
        match decl.params.as_slice() {
            // getX() — plain load, or a sequence over a record array member
            [] => {
                let member = self.member_for(rest, decl);
                if let TypeRef::Sequence(nested) = &decl.ret {
                    self.set_type(member, &TypeRef::Record(nested.clone()))?;
                    self.push_method(decl, ActionType::GetSequence, Some(member));
                } else {
                    if matches!(decl.ret, TypeRef::Unit) {
                        return Err(self.unrecognized(decl));
                    }
                    self.set_type(member, &decl.ret)?;
                    self.push_method(decl, ActionType::GetValue, Some(member));
                }
                Ok(())
            }
            // getX(reuse) — record member loaded into a caller-supplied view
            [reuse] if self.reusable(reuse, &decl.ret) => {
                let member = self.member_for(rest, decl);
                self.set_type(member, &decl.ret)?;
                self.push_method(decl, ActionType::GetValueWith, Some(member));
                Ok(())
            }
            _ => Err(self.unrecognized(decl)),
        }
    }

    fn parse_set(&mut self, decl: &MethodDecl, rest: &str) -> Result<(), SchemaError> {
        if rest.is_empty() {
            return Err(self.unrecognized(decl));
        }
        if let Some(base) = rest.strip_suffix("At") {
            if !base.is_empty() {
                if let [TypeRef::Prim(Primitive::I32), value] = decl.params.as_slice() {
                    let value = value.clone();
                    let member = self.member_for(base, decl);
                    self.set_type(member, &value)?;
                    self.push_method(decl, ActionType::SetValueAt, Some(member));
                    return Ok(());
                }
                return Err(self.unrecognized(decl));
            }
        }
        if let [value] = decl.params.as_slice() {
            let value = value.clone();
            let member = self.member_for(rest, decl);
            self.set_type(member, &value)?;
            self.push_method(decl, ActionType::SetValue, Some(member));
            return Ok(());
        }
        Err(self.unrecognized(decl))
    }

    fn parse_step(
        &mut self,
        decl: &MethodDecl,
        rest: &str,
        increase: bool,
    ) -> Result<(), SchemaError> {
        if rest.is_empty() {
            return Err(self.unrecognized(decl));
        }
        if let Some(base) = rest.strip_suffix("By") {
            if !base.is_empty() {
                if let [step] = decl.params.as_slice() {
                    let step = step.clone();
                    let member = self.member_for(base, decl);
                    self.set_type(member, &step)?;
                    self.members[member].needs_numeric = true;
                    let action = if increase {
                        ActionType::IncreaseValueBy
                    } else {
                        ActionType::DecreaseValueBy
                    };
                    self.push_method(decl, action, Some(member));
                    return Ok(());
                }
                return Err(self.unrecognized(decl));
            }
        }
        if decl.params.is_empty() {
            let member = self.member_for(rest, decl);
            self.members[member].needs_numeric = true;
            let action = if increase {
                ActionType::IncreaseValue
            } else {
                ActionType::DecreaseValue
            };
            self.push_method(decl, action, Some(member));
            return Ok(());
        }
        Err(self.unrecognized(decl))
    }

    /// A reuse parameter must name the same record type the method returns.
    fn reusable(&self, param: &TypeRef, ret: &TypeRef) -> bool {
        matches!(param, TypeRef::Record(_) | TypeRef::SelfRecord) && param == ret
    }

    /// Find or create the member for a base field name.
    fn member_for(&mut self, base: &str, decl: &MethodDecl) -> usize {
        let name = capitalize(base);
        if let Some(&index) = self.index.get(&name) {
            return index;
        }
        let index = self.members.len();
        self.index.insert(name.clone(), index);
        self.members.push(MemberBuilder {
            name,
            ty: None,
            count: 1,
            first_method: decl.name.clone(),
            needs_numeric: false,
        });
        index
    }

    /// Record a member's type, rejecting disagreements between accessors and
    /// types that cannot back a stored field.
    fn set_type(&mut self, member: usize, ty: &TypeRef) -> Result<(), SchemaError> {
        if !storable(ty) {
            return Err(SchemaError::TypeConflict {
                schema: self.schema.name().to_string(),
                member: self.members[member].name.clone(),
                first: ty.display_name(),
                second: "a storable member type".to_string(),
            });
        }
        let builder = &mut self.members[member];
        match &builder.ty {
            None => {
                builder.ty = Some(ty.clone());
                Ok(())
            }
            Some(existing) if existing == ty => Ok(()),
            Some(existing) => Err(SchemaError::TypeConflict {
                schema: self.schema.name().to_string(),
                member: builder.name.clone(),
                first: existing.display_name(),
                second: ty.display_name(),
            }),
        }
    }

    fn push_method(&mut self, decl: &MethodDecl, action: ActionType, member: Option<usize>) {
        self.methods.push(Method {
            name: decl.name.clone(),
            action,
            member: member.map(|m| m as u32),
            arity: decl.params.len() as u8,
        });
    }

    fn unrecognized(&self, decl: &MethodDecl) -> SchemaError {
        SchemaError::UnrecognizedMethod {
            schema: self.schema.name().to_string(),
            name: decl.name.clone(),
        }
    }
}

/// Whether a type can back a stored member. `Unit` and `Text` only appear as
/// return types of setters and renders, never as fields.
fn storable(ty: &TypeRef) -> bool {
    matches!(
        ty,
        TypeRef::Prim(_)
            | TypeRef::Boxed(_)
            | TypeRef::Record(_)
            | TypeRef::Sequence(_)
            | TypeRef::SelfRecord
    )
}

fn capitalize(base: &str) -> String {
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    #[test]
    fn capitalizes_member_names() {
        let schema = Schema::builder("T")
            .method("getnumber", [], TypeRef::INT)
            .build();
        let class = inspect(&schema).unwrap();
        assert_eq!(class.members[0].name, "Number");
    }

    #[test]
    fn get_and_set_share_one_member() {
        let schema = Schema::builder("T")
            .method("getNumber", [], TypeRef::INT)
            .method("setNumber", [TypeRef::INT], TypeRef::UNIT)
            .build();
        let class = inspect(&schema).unwrap();
        assert_eq!(class.members.len(), 1);
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[0].member, class.methods[1].member);
    }

    #[test]
    fn rejects_untyped_size_only_member() {
        let schema = Schema::builder("T").array_size("getXsSize", 4).build();
        let err = inspect(&schema).unwrap_err();
        assert!(matches!(err, SchemaError::UnrecognizedMethod { name, .. } if name == "getXsSize"));
    }

    #[test]
    fn rejects_text_members() {
        let schema = Schema::builder("Person")
            .method("getName", [], TypeRef::Text)
            .build();
        assert!(matches!(
            inspect(&schema).unwrap_err(),
            SchemaError::TypeConflict { member, .. } if member == "Name"
        ));
    }

    #[test]
    fn rejects_unit_element_types() {
        let schema = Schema::builder("T")
            .method("getXsAt", [TypeRef::INT], TypeRef::UNIT)
            .build();
        assert!(matches!(
            inspect(&schema).unwrap_err(),
            SchemaError::TypeConflict { member, .. } if member == "Xs"
        ));
    }

    #[test]
    fn rejects_increase_on_bool() {
        let schema = Schema::builder("T")
            .method("getFlag", [], TypeRef::BOOL)
            .method("increaseFlag", [], TypeRef::UNIT)
            .build();
        assert!(matches!(
            inspect(&schema).unwrap_err(),
            SchemaError::TypeConflict { .. }
        ));
    }
}
