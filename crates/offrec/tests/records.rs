//! End-to-end record behavior through the registry and view API.

use offrec::{ExprType, Registry, Schema, SchemaError, TypeRef, Value, View};

fn sample_schema() -> std::sync::Arc<Schema> {
    Schema::builder("Sample")
        .method("getNumber", vec![], TypeRef::INT)
        .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
        .method("getFraction", vec![], TypeRef::DOUBLE)
        .method("setFraction", vec![TypeRef::DOUBLE], TypeRef::UNIT)
        .build()
}

fn sample_record(registry: &mut Registry) -> View {
    let adapter = registry.register(&sample_schema()).unwrap();
    registry.create(adapter.blueprint_id())
}

#[test]
fn scalars_round_trip_at_the_extremes() {
    let schema = Schema::builder("Extremes")
        .method("getByte", vec![], TypeRef::BYTE)
        .method("setByte", vec![TypeRef::BYTE], TypeRef::UNIT)
        .method("getShort", vec![], TypeRef::SHORT)
        .method("setShort", vec![TypeRef::SHORT], TypeRef::UNIT)
        .method("getInt", vec![], TypeRef::INT)
        .method("setInt", vec![TypeRef::INT], TypeRef::UNIT)
        .method("getLong", vec![], TypeRef::LONG)
        .method("setLong", vec![TypeRef::LONG], TypeRef::UNIT)
        .method("getFlag", vec![], TypeRef::BOOL)
        .method("setFlag", vec![TypeRef::BOOL], TypeRef::UNIT)
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());

    for value in [
        Value::I8(i8::MIN),
        Value::I8(i8::MAX),
        Value::I8(-1),
    ] {
        record.set("Byte", value.clone());
        assert_eq!(record.get("Byte"), value);
    }
    record.set("Short", Value::I16(i16::MIN));
    assert_eq!(record.get("Short"), Value::I16(i16::MIN));
    record.set("Int", Value::I32(i32::MAX));
    assert_eq!(record.get("Int"), Value::I32(i32::MAX));
    record.set("Long", Value::I64(i64::MIN));
    assert_eq!(record.get("Long"), Value::I64(i64::MIN));
    record.set("Flag", Value::Bool(true));
    assert_eq!(record.get("Flag"), Value::Bool(true));
}

#[test]
fn floats_survive_bit_exact() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    let quiet_nan = f64::from_bits(0x7ff8_0000_0000_1234);
    record.set("Fraction", Value::F64(quiet_nan));
    let Value::F64(got) = record.get("Fraction") else {
        panic!("expected a double");
    };
    assert_eq!(got.to_bits(), quiet_nan.to_bits());

    for value in [f64::INFINITY, f64::NEG_INFINITY, -0.0] {
        record.set("Fraction", Value::F64(value));
        let Value::F64(got) = record.get("Fraction") else {
            panic!("expected a double");
        };
        assert_eq!(got.to_bits(), value.to_bits());
    }
}

#[test]
fn fresh_records_read_all_zero() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    assert_eq!(record.get("Number"), Value::I32(0));
    assert_eq!(record.get("Fraction"), Value::F64(0.0));
}

#[test]
fn views_of_one_record_alias() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    let other = record.view();
    record.set("Number", Value::I32(12));
    assert_eq!(other.get("Number"), Value::I32(12));
    assert_eq!(other.record_id(), record.record_id());
}

#[test]
fn copy_detaches_from_the_original() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    record.set("Number", Value::I32(5));
    let copy = record.copy();
    assert_ne!(copy.record_id(), record.record_id());
    record.set("Number", Value::I32(9));
    assert_eq!(copy.get("Number"), Value::I32(5));
    copy.set("Number", Value::I32(100));
    assert_eq!(record.get("Number"), Value::I32(9));
}

#[test]
fn copy_from_overwrites_in_place() {
    let mut registry = Registry::new();
    let a = sample_record(&mut registry);
    let b = registry.create(a.blueprint_id());
    a.set("Number", Value::I32(1));
    b.set("Number", Value::I32(2));
    let id_before = a.record_id();
    a.copy_from(&b);
    assert_eq!(a.record_id(), id_before);
    assert_eq!(a.get("Number"), Value::I32(2));
}

#[test]
fn self_copy_leaves_the_record_intact() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    record.set("Number", Value::I32(4));
    record.copy_from(&record);
    assert_eq!(record.get("Number"), Value::I32(4));
}

#[test]
fn rebinding_moves_a_view_between_records() {
    let mut registry = Registry::new();
    let mut a = sample_record(&mut registry);
    let b = registry.create(a.blueprint_id());
    b.set("Number", Value::I32(42));
    a.set_record_id(b.record_id());
    assert_eq!(a.get("Number"), Value::I32(42));
}

#[test]
fn dynamic_calls_reach_the_same_routines() {
    let mut registry = Registry::new();
    let mut record = sample_record(&mut registry);
    record.call("setNumber", &[Value::I32(31)]);
    assert_eq!(record.call("getNumber", &[]), Value::I32(31));
    assert_eq!(
        record.call("recordId", &[]),
        Value::I64(record.record_id() as i64)
    );

    // recordId(id) through the dynamic surface rebinds the view
    let other = registry.create(record.blueprint_id());
    other.set("Number", Value::I32(8));
    record.call("recordId", &[Value::I64(other.record_id() as i64)]);
    assert_eq!(record.get("Number"), Value::I32(8));
}

#[test]
fn increase_and_decrease_step_numerics() {
    let schema = Schema::builder("Counter")
        .method("getHits", vec![], TypeRef::INT)
        .method("setHits", vec![TypeRef::INT], TypeRef::UNIT)
        .method("increaseHits", vec![], TypeRef::UNIT)
        .method("increaseHitsBy", vec![TypeRef::INT], TypeRef::UNIT)
        .method("decreaseHits", vec![], TypeRef::UNIT)
        .method("getLevel", vec![], TypeRef::DOUBLE)
        .method("increaseLevel", vec![], TypeRef::UNIT)
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());

    record.increase("Hits");
    record.increase_by("Hits", Value::I32(10));
    record.decrease("Hits");
    assert_eq!(record.get("Hits"), Value::I32(10));

    record.increase("Level");
    assert_eq!(record.get("Level"), Value::F64(1.0));

    // stepping wraps like the underlying integer
    record.set("Hits", Value::I32(i32::MAX));
    record.increase("Hits");
    assert_eq!(record.get("Hits"), Value::I32(i32::MIN));
}

#[test]
fn array_elements_do_not_disturb_their_neighbors() {
    let schema = Schema::builder("Block")
        .array_size("getDataSize", 10)
        .method("getDataAt", vec![TypeRef::INT], TypeRef::INT)
        .method("setDataAt", vec![TypeRef::INT, TypeRef::INT], TypeRef::UNIT)
        .method("getTail", vec![], TypeRef::BYTE)
        .method("setTail", vec![TypeRef::BYTE], TypeRef::UNIT)
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());

    assert_eq!(record.array_size("Data"), 10);
    record.set("Tail", Value::I8(7));
    for i in 0..10 {
        record.set_at("Data", i, Value::I32(i * 100));
    }
    for i in 0..10 {
        assert_eq!(record.get_at("Data", i), Value::I32(i * 100));
    }
    assert_eq!(record.get("Tail"), Value::I8(7));
}

#[test]
fn default_render_matches_the_member_order() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    record.set("Number", Value::I32(77));
    record.set("Fraction", Value::F64(-0.7));
    assert_eq!(record.to_string(), "{Number: 77, Fraction: -0.7}");
}

#[test]
fn default_render_lists_arrays() {
    let schema = Schema::builder("Block")
        .array_size("getDataSize", 3)
        .method("getDataAt", vec![TypeRef::INT], TypeRef::INT)
        .method("setDataAt", vec![TypeRef::INT, TypeRef::INT], TypeRef::UNIT)
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());
    for i in 0..3 {
        record.set_at("Data", i, Value::I32(i + 1));
    }
    assert_eq!(record.to_string(), "{Data: [1, 2, 3]}");
}

#[test]
fn custom_render_receives_every_member_value() {
    let mut registry = Registry::new();
    registry.register_native("fmt", "sample", ExprType::Str, |args| {
        Value::Str(format!("Sample[{} | {}]", args[0], args[1]))
    });
    let schema = Schema::builder("Sample")
        .method("getNumber", vec![], TypeRef::INT)
        .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
        .method("getFraction", vec![], TypeRef::DOUBLE)
        .method("setFraction", vec![TypeRef::DOUBLE], TypeRef::UNIT)
        .custom_render("fmt.sample")
        .build();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());
    record.set("Number", Value::I32(7));
    record.set("Fraction", Value::F64(0.1));
    assert_eq!(record.to_string(), "Sample[7 | 0.1]");
}

#[test]
fn unregistered_custom_render_fails_registration() {
    let schema = Schema::builder("Sample")
        .method("getNumber", vec![], TypeRef::INT)
        .custom_render("fmt.missing")
        .build();
    let mut registry = Registry::new();
    assert!(matches!(
        registry.register(&schema).unwrap_err(),
        SchemaError::NoSuchMethod { owner, name, .. } if owner == "fmt" && name == "missing"
    ));
}

fn point_schema() -> std::sync::Arc<Schema> {
    Schema::builder("Point")
        .method("getX", vec![], TypeRef::INT)
        .method("setX", vec![TypeRef::INT], TypeRef::UNIT)
        .method("getY", vec![], TypeRef::INT)
        .method("setY", vec![TypeRef::INT], TypeRef::UNIT)
        .build()
}

#[test]
fn embedded_records_live_inline() {
    let point = point_schema();
    let schema = Schema::builder("Line")
        .method("getFrom", vec![], TypeRef::Record(point.clone()))
        .method("getTo", vec![], TypeRef::Record(point))
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    assert_eq!(adapter.record_size(), 16);

    let line = registry.create(adapter.blueprint_id());
    let from = line.get_record("From");
    let to = line.get_record("To");
    from.set("X", Value::I32(1));
    from.set("Y", Value::I32(2));
    to.set("X", Value::I32(3));
    to.set("Y", Value::I32(4));
    assert_eq!(line.to_string(), "{From: {X: 1, Y: 2}, To: {X: 3, Y: 4}}");
}

#[test]
fn reuse_views_rebind_instead_of_allocating() {
    let point = point_schema();
    let from = TypeRef::Record(point.clone());
    let to = TypeRef::Record(point.clone());
    let schema = Schema::builder("Line")
        .method("getFrom", vec![from.clone()], from)
        .method("getTo", vec![to.clone()], to)
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let line = registry.create(adapter.blueprint_id());

    let point_id = registry.blueprint_id(&point).unwrap();
    let mut cursor = registry.create(point_id);
    line.get_with("From", &mut cursor);
    cursor.set("X", Value::I32(11));
    line.get_with("To", &mut cursor);
    cursor.set("X", Value::I32(22));
    line.get_with("From", &mut cursor);
    assert_eq!(cursor.get("X"), Value::I32(11));
}

#[test]
fn record_arrays_read_as_sequences() {
    let point = point_schema();
    let schema = Schema::builder("Path")
        .array_size("getStopsSize", 4)
        .method("getStops", vec![], TypeRef::Sequence(point.clone()))
        .method(
            "getStopsAt",
            vec![TypeRef::INT],
            TypeRef::Record(point),
        )
        .build();
    let mut registry = Registry::new();
    let adapter = registry.register(&schema).unwrap();
    let path = registry.create(adapter.blueprint_id());

    let stops = path.sequence("Stops");
    assert_eq!(stops.len(), 4);
    for (i, stop) in stops.iter().enumerate() {
        stop.set("X", Value::I32(i as i32));
    }
    for i in 0..4 {
        let stop = path.get_record_at("Stops", i);
        assert_eq!(stop.get("X"), Value::I32(i));
    }
}

#[test]
fn registry_arrays_are_contiguous_records() {
    let mut registry = Registry::new();
    let adapter = registry.register(&point_schema()).unwrap();
    let run = registry.array(adapter.blueprint_id(), 5);
    assert_eq!(run.len(), 5);
    for (i, record) in run.iter().enumerate() {
        record.set("X", Value::I32(i as i32 * 2));
    }
    assert_eq!(
        run.get(1).record_id() - run.get(0).record_id(),
        adapter.record_size() as u64
    );
    assert_eq!(run.get(4).get("X"), Value::I32(8));
}

#[test]
fn delete_all_releases_every_record_at_once() {
    let mut registry = Registry::new();
    let adapter = registry.register(&point_schema()).unwrap();
    registry.create(adapter.blueprint_id());
    registry.create(adapter.blueprint_id());
    assert!(adapter.used_bytes() > 0);
    registry.delete_all(adapter.blueprint_id());
    assert_eq!(adapter.used_bytes(), 0);
}

#[test]
fn blueprint_ids_survive_re_registration() {
    let mut registry = Registry::new();
    let first = registry.register(&sample_schema()).unwrap();
    let second = registry.register(&sample_schema()).unwrap();
    assert_eq!(first.blueprint_id(), second.blueprint_id());
    let record = registry.create(first.blueprint_id());
    assert_eq!(record.blueprint_id(), first.blueprint_id());
    assert_eq!(
        record.record_size(),
        registry.record_size(first.blueprint_id())
    );
}

#[test]
#[should_panic(expected = "has no member")]
fn unknown_member_names_panic() {
    let mut registry = Registry::new();
    let record = sample_record(&mut registry);
    record.get("Missing");
}
