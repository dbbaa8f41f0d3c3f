use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use offrec::{Registry, Schema, TypeRef, Value};

fn bench_field_access(c: &mut Criterion) {
    let mut registry = Registry::new();
    let schema = Schema::builder("Bench")
        .method("getNumber", vec![], TypeRef::INT)
        .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
        .method("increaseNumber", vec![], TypeRef::UNIT)
        .array_size("getDataSize", 64)
        .method("getDataAt", vec![TypeRef::INT], TypeRef::LONG)
        .method("setDataAt", vec![TypeRef::INT, TypeRef::LONG], TypeRef::UNIT)
        .build();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());

    c.bench_function("get_i32", |b| b.iter(|| black_box(record.get("Number"))));
    c.bench_function("set_i32", |b| {
        b.iter(|| record.set("Number", black_box(Value::I32(7))))
    });
    c.bench_function("increase_i32", |b| b.iter(|| record.increase("Number")));
    c.bench_function("get_i64_at", |b| {
        b.iter(|| black_box(record.get_at("Data", black_box(17))))
    });
}

fn bench_registration(c: &mut Criterion) {
    c.bench_function("register_schema", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            let schema = Schema::builder("Bench")
                .method("getNumber", vec![], TypeRef::INT)
                .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
                .build();
            black_box(registry.register(&schema).unwrap());
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let mut registry = Registry::new();
    let schema = Schema::builder("Sample")
        .method("getNumber", vec![], TypeRef::INT)
        .method("setNumber", vec![TypeRef::INT], TypeRef::UNIT)
        .method("getFraction", vec![], TypeRef::DOUBLE)
        .method("setFraction", vec![TypeRef::DOUBLE], TypeRef::UNIT)
        .build();
    let adapter = registry.register(&schema).unwrap();
    let record = registry.create(adapter.blueprint_id());
    record.set("Number", Value::I32(77));
    record.set("Fraction", Value::F64(-0.7));
    c.bench_function("render_default", |b| b.iter(|| black_box(record.to_string())));
}

criterion_group!(benches, bench_field_access, bench_registration, bench_render);
criterion_main!(benches);
