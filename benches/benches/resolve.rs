// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for key resolution and serialization in `imperial_core`.

use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use imperial_core::{Input, KeyDef, Schema, SchemaBuilder, StructDef, Tree, builtin};

fn schema() -> Arc<Schema> {
    let mut builder = SchemaBuilder::new();
    builtin::register(&mut builder).unwrap();
    builder
        .define(
            StructDef::builder("Adder")
                .key(
                    KeyDef::builder("a", "Int")
                        .calculate(&["data", "b"], |cx| {
                            Ok(Input::from(cx.number("data")? - cx.number("b")?))
                        })
                        .build()
                        .unwrap(),
                )
                .key(KeyDef::builder("b", "Int").default(8).build().unwrap())
                .key(
                    KeyDef::builder("data", "Int")
                        .calculate(&["a", "b"], |cx| {
                            Ok(Input::from(cx.number("a")? + cx.number("b")?))
                        })
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .unwrap();
    builder
        .define(
            StructDef::builder("Block")
                .key(KeyDef::builder("mode", "Str").default("text").build().unwrap())
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.build().unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("imperial_core/resolve");

    group.bench_function("explicit", |b| {
        let mut tree = Tree::new(Arc::clone(&schema));
        let adder = tree.create_root("Adder", "adder").unwrap();
        tree.set(adder, "a", 1).unwrap();
        tree.number(adder, "a").unwrap();
        b.iter(|| black_box(tree.number(adder, "a").unwrap()));
    });

    group.bench_function("calculated_cached", |b| {
        let mut tree = Tree::new(Arc::clone(&schema));
        let adder = tree.create_root("Adder", "adder").unwrap();
        tree.set(adder, "a", 1).unwrap();
        tree.number(adder, "data").unwrap();
        b.iter(|| black_box(tree.number(adder, "data").unwrap()));
    });

    group.bench_function("calculated_after_set", |b| {
        let mut tree = Tree::new(Arc::clone(&schema));
        let adder = tree.create_root("Adder", "adder").unwrap();
        let mut a = 0_i64;
        b.iter(|| {
            a += 1;
            tree.set(adder, "a", a).unwrap();
            black_box(tree.number(adder, "data").unwrap())
        });
    });

    for depth in [4_u32, 16, 64] {
        group.bench_function(BenchmarkId::new("inherited", depth), |b| {
            b.iter_batched(
                || {
                    let mut tree = Tree::new(Arc::clone(&schema));
                    let root = tree.create_root("Block", "root").unwrap();
                    tree.set(root, "mode", "binary").unwrap();
                    let mut leaf = root;
                    for i in 0..depth {
                        leaf = tree.add_child(leaf, "Block", &format!("b{i}")).unwrap();
                    }
                    (tree, leaf)
                },
                |(mut tree, leaf)| black_box(tree.string(leaf, "mode").unwrap()),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let schema = builtin::schema().unwrap();
    let mut group = c.benchmark_group("imperial_core/codec");

    group.bench_function("number_serialize", |b| {
        let mut tree = Tree::new(Arc::clone(&schema));
        let n = tree.create_root("Number", "n").unwrap();
        let mut value = 0_u32;
        b.iter(|| {
            value = value.wrapping_add(1);
            tree.set(n, "", value).unwrap();
            black_box(tree.packed(n).unwrap())
        });
    });

    group.bench_function("number_unserialize", |b| {
        let mut tree = Tree::new(Arc::clone(&schema));
        let n = tree.create_root("Number", "n").unwrap();
        b.iter(|| {
            tree.unserialize_bytes(n, &[1, 2, 3, 4]).unwrap();
            black_box(tree.number(n, "").unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_codec);
criterion_main!(benches);
