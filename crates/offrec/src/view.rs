//! Record views: rebindable handles over arena records
//!
//! A [`View`] pairs an accessor unit with a record address. Views are cheap
//! to clone and to rebind; all record state lives in the arena, so two views
//! of the same record observe each other's writes immediately.
//!
//! Reads and writes take `&self`: the view itself is never mutated by field
//! access, only the raw record memory behind it. Rebinding the view to
//! another record (`set_record_id`, `copy_from` reuse patterns) takes
//! `&mut self`.
//!
//! Runtime misuse (unknown member names, out-of-range sequence indices,
//! wrongly typed arguments) panics; the registration phase has already
//! rejected everything detectable from the declaration alone.

use std::fmt;
use std::sync::Arc;

use crate::codegen::adapter::Adapter;
use crate::schema::ActionType;
use crate::types::Value;

/// A handle to one record of a registered schema.
#[derive(Clone)]
pub struct View {
    adapter: Arc<Adapter>,
    record_id: u64,
}

impl View {
    pub(crate) fn new(adapter: Arc<Adapter>, record_id: u64) -> Self {
        View { adapter, record_id }
    }

    fn member(&self, name: &str) -> u32 {
        self.adapter.class().member_index(name).unwrap_or_else(|| {
            panic!(
                "record type {} has no member {name}",
                self.adapter.class().name
            )
        })
    }

    fn invoke(&self, action: ActionType, member: Option<u32>, args: &[Value]) -> Value {
        let (value, _) = self.adapter.call(action, member, self.record_id, args);
        value
    }

    /// Adapter of an embedded record member, for wrapping nested addresses.
    fn nested_adapter(&self, member: u32) -> Arc<Adapter> {
        let slot = self.adapter.class().members[member as usize]
            .nested
            .unwrap_or_else(|| {
                panic!(
                    "member {} of {} is not an embedded record",
                    self.adapter.class().members[member as usize].name,
                    self.adapter.class().name
                )
            });
        self.adapter.nested()[slot as usize].clone()
    }

    /// Load a scalar member.
    pub fn get(&self, name: &str) -> Value {
        let member = self.member(name);
        self.invoke(ActionType::GetValue, Some(member), &[])
    }

    /// Store a scalar member.
    pub fn set(&self, name: &str, value: Value) {
        let member = self.member(name);
        self.invoke(ActionType::SetValue, Some(member), &[value]);
    }

    /// Load an array member's element.
    pub fn get_at(&self, name: &str, index: i32) -> Value {
        let member = self.member(name);
        self.invoke(ActionType::GetValueAt, Some(member), &[Value::I32(index)])
    }

    /// Store an array member's element.
    pub fn set_at(&self, name: &str, index: i32, value: Value) {
        let member = self.member(name);
        self.invoke(
            ActionType::SetValueAt,
            Some(member),
            &[Value::I32(index), value],
        );
    }

    /// A fresh view of an embedded record member.
    pub fn get_record(&self, name: &str) -> View {
        let member = self.member(name);
        let addr = self
            .invoke(ActionType::GetValue, Some(member), &[])
            .as_addr();
        View::new(self.nested_adapter(member), addr)
    }

    /// A fresh view of an embedded record array element.
    pub fn get_record_at(&self, name: &str, index: i32) -> View {
        let member = self.member(name);
        let addr = self
            .invoke(ActionType::GetValueAt, Some(member), &[Value::I32(index)])
            .as_addr();
        View::new(self.nested_adapter(member), addr)
    }

    /// Rebind a caller-supplied view onto an embedded record member instead
    /// of allocating a fresh handle.
    pub fn get_with(&self, name: &str, reuse: &mut View) {
        let member = self.member(name);
        let nested = self.nested_adapter(member);
        assert_eq!(
            reuse.adapter.fingerprint(),
            nested.fingerprint(),
            "reuse view has record type {}, member {name} needs {}",
            reuse.adapter.class().name,
            nested.class().name
        );
        let addr = self
            .invoke(
                ActionType::GetValueWith,
                Some(member),
                &[Value::I64(reuse.record_id as i64)],
            )
            .as_addr();
        reuse.record_id = addr;
    }

    /// Rebind a caller-supplied view onto an embedded record array element.
    pub fn get_with_at(&self, name: &str, index: i32, reuse: &mut View) {
        let member = self.member(name);
        let nested = self.nested_adapter(member);
        assert_eq!(
            reuse.adapter.fingerprint(),
            nested.fingerprint(),
            "reuse view has record type {}, member {name} needs {}",
            reuse.adapter.class().name,
            nested.class().name
        );
        let addr = self
            .invoke(
                ActionType::GetValueWithAt,
                Some(member),
                &[Value::I32(index), Value::I64(reuse.record_id as i64)],
            )
            .as_addr();
        reuse.record_id = addr;
    }

    /// Add one to a numeric member.
    pub fn increase(&self, name: &str) {
        let member = self.member(name);
        self.invoke(ActionType::IncreaseValue, Some(member), &[]);
    }

    /// Add `amount` to a numeric member. `amount` must carry the member's
    /// storage type.
    pub fn increase_by(&self, name: &str, amount: Value) {
        let member = self.member(name);
        self.invoke(ActionType::IncreaseValueBy, Some(member), &[amount]);
    }

    /// Subtract one from a numeric member.
    pub fn decrease(&self, name: &str) {
        let member = self.member(name);
        self.invoke(ActionType::DecreaseValue, Some(member), &[]);
    }

    /// Subtract `amount` from a numeric member.
    pub fn decrease_by(&self, name: &str, amount: Value) {
        let member = self.member(name);
        self.invoke(ActionType::DecreaseValueBy, Some(member), &[amount]);
    }

    /// Element count of an array member.
    pub fn array_size(&self, name: &str) -> u32 {
        let member = self.member(name);
        self.invoke(ActionType::GetArraySize, Some(member), &[])
            .as_i32() as u32
    }

    /// A sequence over an embedded record array member.
    pub fn sequence(&self, name: &str) -> Sequence {
        let member = self.member(name);
        let address = self
            .invoke(ActionType::GetSequence, Some(member), &[])
            .as_addr();
        let count = self.adapter.class().members[member as usize].count;
        Sequence::new(self.nested_adapter(member), address, count)
    }

    /// Allocate a new record, duplicate this one's bytes into it, and return
    /// a view of the duplicate.
    pub fn copy(&self) -> View {
        let addr = self.invoke(ActionType::Copy, None, &[]).as_addr();
        View::new(self.adapter.clone(), addr)
    }

    /// Overwrite this record's bytes from another record of the same schema.
    pub fn copy_from(&self, other: &View) {
        self.invoke(
            ActionType::CopyFrom,
            None,
            &[Value::I64(other.record_id as i64)],
        );
    }

    /// Another view of the same record.
    pub fn view(&self) -> View {
        self.clone()
    }

    /// A view of the record at `record_id` under this view's schema.
    pub fn view_at(&self, record_id: u64) -> View {
        let addr = self
            .invoke(ActionType::ViewAt, None, &[Value::I64(record_id as i64)])
            .as_addr();
        View::new(self.adapter.clone(), addr)
    }

    /// The bound record's id (its arena address).
    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    /// Rebind this view to the record at `record_id`.
    pub fn set_record_id(&mut self, record_id: u64) {
        let (_, base) = self.adapter.call(
            ActionType::SetRecordId,
            None,
            self.record_id,
            &[Value::I64(record_id as i64)],
        );
        self.record_id = base;
    }

    /// Allocate a fresh zero-filled record and rebind this view to it.
    pub fn bind_new(&mut self) {
        self.record_id = self.adapter.create();
    }

    /// Registered blueprint id of this view's schema.
    pub fn blueprint_id(&self) -> u32 {
        self.adapter.blueprint_id()
    }

    /// Record size in bytes.
    pub fn record_size(&self) -> u32 {
        self.adapter.record_size()
    }

    /// The accessor unit behind this view.
    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    /// Invoke a routine by declared name and argument count.
    ///
    /// This is the dynamic surface over the same compiled routines the typed
    /// methods use; `recordId(id)` through here rebinds the view.
    ///
    /// # Panics
    ///
    /// Panics when no declared or synthesized routine matches the signature.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Value {
        let idx = self
            .adapter
            .routine_named(name, args.len() as u8)
            .unwrap_or_else(|| {
                panic!(
                    "record type {} has no routine {name}/{}",
                    self.adapter.class().name,
                    args.len()
                )
            });
        let (value, base) = self.adapter.invoke(idx, self.record_id, args);
        self.record_id = base;
        value
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.adapter.render(self.record_id))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("schema", &self.adapter.class().name)
            .field("record_id", &self.record_id)
            .finish()
    }
}

/// A fixed-length run of contiguous records of one schema.
#[derive(Clone)]
pub struct Sequence {
    adapter: Arc<Adapter>,
    address: u64,
    count: u32,
}

impl Sequence {
    pub(crate) fn new(adapter: Arc<Adapter>, address: u64, count: u32) -> Self {
        Sequence {
            adapter,
            address,
            count,
        }
    }

    /// Number of records in the run.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether the run is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Record id of the i-th element.
    fn element_id(&self, index: u32) -> u64 {
        assert!(
            index < self.count,
            "sequence index {index} out of range for length {}",
            self.count
        );
        self.address + index as u64 * self.adapter.record_size() as u64
    }

    /// A view of the i-th record.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn get(&self, index: u32) -> View {
        View::new(self.adapter.clone(), self.element_id(index))
    }

    /// Views of every record in order.
    pub fn iter(&self) -> impl Iterator<Item = View> + '_ {
        (0..self.count).map(|i| self.get(i))
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("schema", &self.adapter.class().name)
            .field("address", &self.address)
            .field("count", &self.count)
            .finish()
    }
}
