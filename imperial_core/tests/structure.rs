// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree structure: children, clones, removal, conversion and context keys.

use std::sync::Arc;

use imperial_core::{
    Error, Input, KeyDef, NumberFacet, Schema, SchemaBuilder, StructDef, Tree, Value, builtin,
};

fn schema() -> Arc<Schema> {
    let mut builder = SchemaBuilder::new();
    builtin::register(&mut builder).unwrap();
    let defs = [
        StructDef::builder("Group")
            .computed_basic(&["!children"], |cx| {
                Ok(Input::from(cx.children("!children")?.len() as u64))
            })
            .facets(NumberFacet)
            .build()
            .unwrap(),
        StructDef::builder("Holder")
            .key(KeyDef::builder("count", "Int").build().unwrap())
            .key(KeyDef::builder("inner", "Number").build().unwrap())
            .build()
            .unwrap(),
        StructDef::builder("Packet")
            .locator(KeyDef::builder("offset", "Int").default(0).build().unwrap())
            .build()
            .unwrap(),
        StructDef::builder("Header")
            .key(KeyDef::builder("tag", "Int").default(1).build().unwrap())
            .override_for(
                "Packet",
                KeyDef::builder("tag", "Int").default(2).build().unwrap(),
            )
            .build()
            .unwrap(),
    ];
    for def in defs {
        builder.define(def).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn children_keep_creation_order_and_paths() {
    let mut tree = Tree::new(schema());
    let group = tree.create_root("Group", "g").unwrap();
    let a = tree.add_child(group, "Int", "a").unwrap();
    let b = tree.add_child(group, "Int", "b").unwrap();

    assert_eq!(tree.children(group).unwrap(), [a, b]);
    assert_eq!(tree.child(group, "b").unwrap(), Some(b));
    assert_eq!(tree.child(group, "c").unwrap(), None);
    assert_eq!(tree.parent(a).unwrap(), Some(group));
    assert_eq!(tree.path(a).unwrap(), "g{a}");
    assert_eq!(tree.type_name(a).unwrap(), "Int");
}

#[test]
fn the_children_aspect_invalidates_readers() {
    let mut tree = Tree::new(schema());
    let group = tree.create_root("Group", "g").unwrap();
    assert_eq!(tree.number(group, "").unwrap(), 0);

    let a = tree.add_child(group, "Int", "a").unwrap();
    tree.add_child(group, "Int", "b").unwrap();
    assert_eq!(tree.number(group, "").unwrap(), 2);

    tree.remove(a).unwrap();
    assert_eq!(tree.number(group, "").unwrap(), 1);
}

#[test]
fn removed_structs_are_gone_for_good() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();
    tree.set(holder, "inner", 3).unwrap();
    let inner = tree.resolve(holder, "inner").unwrap();
    let size = tree.resolve(inner, "size").unwrap();
    assert_eq!(tree.len(), 3);

    tree.remove(holder).unwrap();
    assert!(tree.is_empty());
    for id in [holder, inner, size] {
        assert!(!tree.contains(id));
        assert!(matches!(tree.name(id), Err(Error::LibraryMisuse(_))));
    }
    assert!(matches!(tree.get(holder, "inner"), Err(Error::LibraryMisuse(_))));
}

#[test]
fn clones_copy_values_and_remember_their_donor() {
    let mut tree = Tree::new(schema());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", 5).unwrap();
    tree.set(n, "size", 2).unwrap();

    let copy = tree.clone_struct(n).unwrap();
    assert_eq!(tree.number(copy, "").unwrap(), 5);
    assert_eq!(tree.number(copy, "size").unwrap(), 2);
    assert_eq!(tree.donor(copy).unwrap(), Some(n));
    assert_eq!(tree.clones(n).unwrap(), [copy]);
    assert_eq!(tree.path(copy).unwrap(), tree.path(n).unwrap());

    // Owned value structs are copied, not shared.
    assert_ne!(
        tree.resolve(copy, "size").unwrap(),
        tree.resolve(n, "size").unwrap()
    );
    tree.set(copy, "size", 1).unwrap();
    assert_eq!(tree.number(n, "size").unwrap(), 2);
    assert_eq!(tree.packed(copy).unwrap(), [5]);
    assert_eq!(tree.packed(n).unwrap(), [5, 0]);

    tree.remove(n).unwrap();
    assert_eq!(tree.donor(copy).unwrap(), None);
    assert_eq!(tree.number(copy, "").unwrap(), 5);
}

#[test]
fn clones_copy_children_without_joining_the_parent() {
    let mut tree = Tree::new(schema());
    let root = tree.create_root("Group", "root").unwrap();
    let group = tree.add_child(root, "Group", "g").unwrap();
    let item = tree.add_child(group, "Int", "item").unwrap();
    tree.set(item, "", 4).unwrap();

    let copy = tree.clone_struct(group).unwrap();
    assert_eq!(tree.children(root).unwrap(), [group]);
    assert_eq!(tree.parent(copy).unwrap(), Some(root));

    let copied = tree.children(copy).unwrap().to_vec();
    assert_eq!(copied.len(), 1);
    assert_ne!(copied[0], item);
    assert_eq!(tree.number(copied[0], "").unwrap(), 4);
    assert_eq!(tree.number(copy, "").unwrap(), 1);

    // Growing the clone leaves the original alone.
    tree.add_child(copy, "Int", "extra").unwrap();
    assert_eq!(tree.number(copy, "").unwrap(), 2);
    assert_eq!(tree.number(group, "").unwrap(), 1);
}

#[test]
fn converting_makes_a_detached_struct() {
    let mut tree = Tree::new(schema());
    let text = tree.create_root("Str", "text").unwrap();
    tree.set(text, "", " 17 ").unwrap();

    let number = tree.convert(text, "Int").unwrap();
    assert_ne!(number, text);
    assert_eq!(tree.type_name(number).unwrap(), "Int");
    assert_eq!(tree.name(number).unwrap(), "text");
    assert_eq!(tree.get(number, "").unwrap(), Value::Int(17));

    let back = tree.convert(number, "Str").unwrap();
    assert_eq!(tree.string(back, "").unwrap(), "17");
    assert_eq!(tree.convert(back, "Str").unwrap(), back);
}

#[test]
fn keys_convert_or_share_assigned_structs() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();

    let text = tree.create_root("Str", "text").unwrap();
    tree.set(text, "", "5").unwrap();
    tree.set(holder, "count", text).unwrap();
    assert_eq!(tree.number(holder, "count").unwrap(), 5);
    assert_ne!(tree.resolve(holder, "count").unwrap(), text);

    let int = tree.create_root("Int", "int").unwrap();
    tree.set(int, "", 8).unwrap();
    tree.set(holder, "count", int).unwrap();
    assert_eq!(tree.resolve(holder, "count").unwrap(), int);
    tree.set_basic(int, 11).unwrap();
    assert_eq!(tree.number(holder, "count").unwrap(), 11);
}

#[test]
fn failed_assignments_leave_nothing_behind() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();
    let before = tree.len();

    assert!(matches!(
        tree.set(holder, "count", "abc"),
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(tree.len(), before);
    assert!(!tree.is_set(holder, "count").unwrap());

    let list = tree.create_root("List", "list").unwrap();
    tree.set(list, "", Value::List(Vec::new())).unwrap();
    assert!(matches!(
        tree.set(holder, "count", list),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn dotted_paths_walk_through_keys() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();
    assert!(tree.set(holder, "inner.size", 2).unwrap_err().is_key_not_found());

    tree.set(holder, "inner", 3).unwrap();
    tree.set(holder, "inner.size", 2).unwrap();
    assert_eq!(tree.number(holder, "inner.size.bits").unwrap(), 16);
    assert_eq!(tree.number(holder, ["inner", "size"]).unwrap(), 2);
    let inner = tree.resolve(holder, "inner").unwrap();
    assert_eq!(tree.packed(inner).unwrap(), [3, 0]);
}

#[test]
fn context_types_override_and_locate_keys() {
    let mut tree = Tree::new(schema());
    let lone = tree.create_root("Header", "lone").unwrap();
    let packet = tree.create_root("Packet", "p").unwrap();
    let header = tree.add_child(packet, "Header", "header").unwrap();

    assert_eq!(tree.number(lone, "tag").unwrap(), 1);
    assert_eq!(tree.number(header, "tag").unwrap(), 2);

    assert_eq!(tree.key_type(header, "offset").unwrap(), "Int");
    assert_eq!(tree.number(header, "offset").unwrap(), 0);
    assert!(tree.key_type(lone, "offset").unwrap_err().is_key_not_found());
    assert!(tree.number(packet, "offset").unwrap_err().is_key_not_found());
}

#[test]
fn set_all_assigns_keys_and_builds_structs_from_entries() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();
    tree.set_all(
        holder,
        vec![
            ("count".to_owned(), Input::from(2)),
            (
                "inner".to_owned(),
                Input::entries([("", Input::from(7)), ("size", Input::from(1))]),
            ),
        ],
    )
    .unwrap();

    assert_eq!(tree.number(holder, "count").unwrap(), 2);
    assert_eq!(tree.number(holder, "inner").unwrap(), 7);
    let inner = tree.resolve(holder, "inner").unwrap();
    assert_eq!(tree.type_name(inner).unwrap(), "Number");
    assert_eq!(tree.packed(inner).unwrap(), [7]);
}

#[test]
fn sibling_names_are_unique() {
    let mut tree = Tree::new(schema());
    let group = tree.create_root("Group", "g").unwrap();
    let a = tree.add_child(group, "Int", "a").unwrap();
    let before = tree.len();

    assert!(matches!(
        tree.add_child(group, "Int", "a"),
        Err(Error::LibraryMisuse(_))
    ));
    assert_eq!(tree.len(), before);
    assert_eq!(tree.children(group).unwrap(), [a]);

    // The same name is fine under another parent, and again once freed.
    let other = tree.add_child(a, "Int", "a").unwrap();
    assert_eq!(tree.path(other).unwrap(), "g{a}{a}");
    tree.remove(a).unwrap();
    let again = tree.add_child(group, "Int", "a").unwrap();
    assert_eq!(tree.child(group, "a").unwrap(), Some(again));
}

#[test]
fn failed_batches_put_every_key_back() {
    let mut tree = Tree::new(schema());
    let holder = tree.create_root("Holder", "h").unwrap();
    tree.set(holder, "count", 1).unwrap();
    tree.set(holder, "inner", 3).unwrap();
    let inner = tree.resolve(holder, "inner").unwrap();
    let before = tree.len();

    let err = tree
        .set_all(
            holder,
            vec![
                ("count".to_owned(), Input::from(2)),
                ("inner".to_owned(), Input::from(4)),
                ("inner.size".to_owned(), Input::from(2)),
                ("count".to_owned(), Input::from("abc")),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    assert_eq!(tree.number(holder, "count").unwrap(), 1);
    assert_eq!(tree.resolve(holder, "inner").unwrap(), inner);
    assert_eq!(tree.number(holder, "inner").unwrap(), 3);
    assert!(!tree.is_set(inner, "size").unwrap());
    assert_eq!(tree.len(), before);

    // A batch that succeeds replaces the value struct for good.
    tree.set_all(holder, vec![("inner".to_owned(), Input::from(4))])
        .unwrap();
    assert!(!tree.contains(inner));
    assert_eq!(tree.number(holder, "inner").unwrap(), 4);
    assert_eq!(tree.len(), before);
}

#[test]
fn failed_batches_restore_basic_values() {
    let mut tree = Tree::new(schema());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", 1).unwrap();
    let batch = || {
        vec![
            (String::new(), Input::from(5)),
            ("size".to_owned(), Input::from("wide")),
        ]
    };

    assert!(tree.set_all(n, batch()).is_err());
    assert_eq!(tree.number(n, "").unwrap(), 1);
    assert_eq!(tree.packed(n).unwrap(), [1, 0, 0, 0]);

    let fresh = tree.create_root("Number", "fresh").unwrap();
    assert!(tree.set_all(fresh, batch()).is_err());
    assert!(!tree.has_basic_value(fresh));
}
