//! Layout planner: packed byte offsets for record members
//!
//! Members are placed in encounter order with no padding: each offset is the
//! running total, each size is `element_size * count`. Element size is the
//! primitive width for scalar members and the nested record's size for
//! embedded records — nested schemas must already be registered when the
//! planner runs, which the registry guarantees by registering them first.

use super::{Member, RecordClass};

/// Assign offsets and element sizes; returns the total record size.
///
/// `nested_size` resolves the record size of a member's nested schema by its
/// slot in the adapter's nested table (set by the registry before planning).
pub fn plan(class: &mut RecordClass, nested_size: impl Fn(u32) -> u32) -> u32 {
    let mut offset = 0u32;
    for member in &mut class.members {
        member.element_size = element_size(member, &nested_size);
        member.offset = offset;
        offset += member.size_in_bytes();
    }
    class.record_size = offset;
    offset
}

fn element_size(member: &Member, nested_size: &impl Fn(u32) -> u32) -> u32 {
    match member.storage() {
        Some(prim) => prim.width(),
        None => {
            let slot = member
                .nested
                .expect("record member without a nested adapter slot");
            nested_size(slot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::inspector::inspect;
    use crate::schema::Schema;
    use crate::types::TypeRef;

    #[test]
    fn packs_members_in_encounter_order() {
        let schema = Schema::builder("T")
            .method("getA", [], TypeRef::BYTE)
            .method("getB", [], TypeRef::LONG)
            .method("getC", [], TypeRef::SHORT)
            .build();
        let mut class = inspect(&schema).unwrap();
        let total = plan(&mut class, |_| unreachable!());
        assert_eq!(total, 11);
        assert_eq!(class.members[0].offset, 0);
        assert_eq!(class.members[1].offset, 1);
        assert_eq!(class.members[2].offset, 9);
    }

    #[test]
    fn empty_schema_has_size_zero() {
        let schema = Schema::builder("Empty").build();
        let mut class = inspect(&schema).unwrap();
        assert_eq!(plan(&mut class, |_| unreachable!()), 0);
    }

    #[test]
    fn arrays_scale_by_count() {
        let schema = Schema::builder("T")
            .array_size("getXsSize", 10)
            .method("getXsAt", [TypeRef::INT], TypeRef::INT)
            .method("getTail", [], TypeRef::BYTE)
            .build();
        let mut class = inspect(&schema).unwrap();
        let total = plan(&mut class, |_| unreachable!());
        assert_eq!(total, 41);
        assert_eq!(class.member("Tail").unwrap().offset, 40);
    }
}
