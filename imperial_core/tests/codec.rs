// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serialization and (resumable) parsing through `Tree`.

use std::io::{self, Cursor};
use std::sync::Arc;

use imperial_core::codec::{
    BitStream, BytesBuffer, Codec, Endian, Field, FieldParser, Until, decode_int,
};
use imperial_core::{
    Calc, Error, Input, KeyDef, Result, Schema, SchemaBuilder, StructDef, Tree, Unserializer,
    builtin,
};

fn eight() -> Cursor<Vec<u8>> {
    Cursor::new(vec![1, 2, 3, 4, 5, 6, 7, 8])
}

#[test]
fn numbers_serialize_at_their_width() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", 1).unwrap();
    assert_eq!(tree.serialize(n).unwrap(), [1, 0, 0, 0]);
    assert_eq!(tree.packed(n).unwrap(), [1, 0, 0, 0]);
}

#[test]
fn serialization_writes_into_a_window() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", 10).unwrap();

    let mut window = BytesBuffer::window(eight(), 1, 4).unwrap();
    tree.serialize_into(n, &mut window).unwrap();
    assert_eq!(window.tell(), 4);
    assert_eq!(window.into_inner().into_inner(), [1, 10, 0, 0, 0, 6, 7, 8]);
}

#[test]
fn unserialization_reads_from_a_window() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    let mut window = BytesBuffer::window(eight(), 1, 4).unwrap();
    tree.unserialize(n, &mut window).unwrap();
    assert_eq!(tree.number(n, "").unwrap(), 0x0504_0302);
    assert_eq!(window.remaining(), 0);
}

#[test]
fn signed_big_endian_round_trip() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let layout = |tree: &mut Tree, id| {
        tree.set(id, "size", 2).unwrap();
        tree.set(id, "endian", Endian::Big.as_str()).unwrap();
        tree.set(id, "sign", "signed").unwrap();
    };
    let n = tree.create_root("Number", "n").unwrap();
    layout(&mut tree, n);
    tree.set(n, "", -2).unwrap();
    let bytes = tree.serialize(n).unwrap();
    assert_eq!(bytes, [0xff, 0xfe]);

    let m = tree.create_root("Number", "m").unwrap();
    layout(&mut tree, m);
    tree.unserialize_bytes(m, &bytes).unwrap();
    assert_eq!(tree.number(m, "").unwrap(), -2);
}

#[test]
fn unrepresentable_values_are_rejected() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", -1).unwrap();
    assert!(matches!(tree.serialize(n), Err(Error::SerializationUnsupported(_))));

    tree.set(n, "", 300).unwrap();
    tree.set(n, "size", 1).unwrap();
    assert!(matches!(tree.serialize(n), Err(Error::SerializationUnsupported(_))));

    tree.set(n, "", 3).unwrap();
    tree.set(n, "size.bits", 12).unwrap();
    assert!(matches!(tree.serialize(n), Err(Error::SerializationUnsupported(_))));

    let int = tree.create_root("Int", "int").unwrap();
    tree.set(int, "", 3).unwrap();
    assert!(matches!(tree.packed(int), Err(Error::SerializationUnsupported(_))));
}

#[test]
fn short_streams_fail_and_leave_the_struct_alone() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    let err = tree.unserialize_bytes(n, &[1, 2]).unwrap_err();
    assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    assert!(!tree.has_basic_value(n));
}

#[test]
fn packed_bytes_follow_the_layout() {
    let mut tree = Tree::new(builtin::schema().unwrap());
    let n = tree.create_root("Number", "n").unwrap();
    tree.set(n, "", 1).unwrap();
    assert_eq!(tree.packed(n).unwrap(), [1, 0, 0, 0]);

    tree.set(n, "", 2).unwrap();
    assert_eq!(tree.packed(n).unwrap(), [2, 0, 0, 0]);

    tree.set(n, "size", 2).unwrap();
    assert_eq!(tree.packed(n).unwrap(), [2, 0]);

    tree.set(n, "endian", "big").unwrap();
    assert_eq!(tree.packed(n).unwrap(), [0, 2]);
}

/// Two 16-bit numbers, `left` then `right`.
#[derive(Debug)]
struct PairCodec;

impl Codec for PairCodec {
    fn serialize(&self, cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<()> {
        for key in ["left", "right"] {
            let id = cx.resolve(key)?;
            cx.tree().serialize_into(id, stream)?;
        }
        Ok(())
    }

    fn parser(&self) -> Box<dyn FieldParser> {
        Box::new(PairParser { next: 0 })
    }
}

struct PairParser {
    next: usize,
}

impl FieldParser for PairParser {
    fn step(&mut self, _cx: &mut Calc<'_>, stream: &mut dyn BitStream) -> Result<Option<Field>> {
        let Some(key) = ["left", "right"].get(self.next) else {
            return Ok(None);
        };
        let value = decode_int(&stream.read_exact(2)?, Endian::Little, false)?;
        self.next += 1;
        Ok(Some(Field::new(
            *key,
            Input::entries([("", Input::from(value)), ("size", Input::from(2))]),
        )))
    }
}

fn pair_schema() -> Arc<Schema> {
    let mut builder = SchemaBuilder::new();
    builtin::register(&mut builder).unwrap();
    builder
        .define(
            StructDef::builder("Pair")
                .key(KeyDef::builder("left", "Number").build().unwrap())
                .key(KeyDef::builder("right", "Number").build().unwrap())
                .key(
                    KeyDef::builder("size", "Size")
                        .calculate(&["left", "right"], |cx| {
                            let (left, right) = (cx.resolve("left")?, cx.resolve("right")?);
                            let tree = cx.tree();
                            Ok(Input::from(
                                tree.number(left, "size")? + tree.number(right, "size")?,
                            ))
                        })
                        .build()
                        .unwrap(),
                )
                .codec(&["left", "right"], PairCodec)
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.build().unwrap()
}

fn stream(bytes: &[u8]) -> Option<Box<dyn BitStream>> {
    Some(Box::new(BytesBuffer::from_bytes(bytes)))
}

#[test]
fn parsing_stops_once_the_wanted_keys_are_present() {
    let mut tree = Tree::new(pair_schema());
    let pair = tree.create_root("Pair", "pair").unwrap();

    let done = tree
        .unserialize_until(pair, stream(&[1, 0, 2, 0]), &Until::keys(["left"]))
        .unwrap();
    assert!(!done);
    assert_eq!(tree.number(pair, "left").unwrap(), 1);
    assert_eq!(tree.number(pair, "left.size").unwrap(), 2);
    assert!(!tree.is_set(pair, "right").unwrap());
    assert_eq!(tree.unserializer(pair).unwrap().position(), 2);

    let done = tree.unserialize_until(pair, None, &Until::All).unwrap();
    assert!(done);
    assert_eq!(tree.number(pair, "right").unwrap(), 2);
    assert!(tree.unserializer(pair).is_none());

    // Nothing left to resume.
    assert!(tree.unserialize_until(pair, None, &Until::All).unwrap());
}

#[test]
fn incremental_and_eager_parses_agree() {
    let bytes = [7, 0, 0x34, 0x12];
    let mut tree = Tree::new(pair_schema());

    let eager = tree.create_root("Pair", "eager").unwrap();
    tree.unserialize_bytes(eager, &bytes).unwrap();

    let lazy = tree.create_root("Pair", "lazy").unwrap();
    assert!(!tree
        .unserialize_until(lazy, stream(&bytes), &Until::keys(["left"]))
        .unwrap());
    // `right` is in, but the parser has not seen the end yet.
    assert!(!tree.unserialize_until(lazy, None, &Until::keys(["right"])).unwrap());
    assert!(tree.unserialize_until(lazy, None, &Until::All).unwrap());

    for key in ["left", "right", "size"] {
        assert_eq!(
            tree.number(eager, key).unwrap(),
            tree.number(lazy, key).unwrap(),
            "{key}"
        );
    }
    assert_eq!(tree.number(lazy, "right").unwrap(), 0x1234);
    assert_eq!(tree.serialize(lazy).unwrap(), bytes);
}

#[test]
fn present_keys_are_skipped() {
    let mut tree = Tree::new(pair_schema());
    let pair = tree.create_root("Pair", "pair").unwrap();
    tree.set(pair, "left", 9).unwrap();

    assert!(tree.unserialize_until(pair, stream(&[1, 0, 2, 0]), &Until::All).unwrap());
    assert_eq!(tree.number(pair, "left").unwrap(), 9);
    assert_eq!(tree.number(pair, "left.size").unwrap(), 4);
    assert_eq!(tree.number(pair, "right").unwrap(), 2);
}

#[test]
fn failed_parses_keep_their_state() {
    let mut tree = Tree::new(pair_schema());
    let pair = tree.create_root("Pair", "pair").unwrap();
    let err = tree
        .unserialize_until(pair, stream(&[1, 0, 2]), &Until::All)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(tree.number(pair, "left").unwrap(), 1);
    assert!(!tree.is_set(pair, "right").unwrap());
    assert_eq!(tree.unserializer(pair).unwrap().position(), 2);

    // A new stream replaces the stalled parse.
    assert!(tree.unserialize_until(pair, stream(&[3, 0, 4, 0]), &Until::All).unwrap());
    assert_eq!(tree.number(pair, "right").unwrap(), 4);
    assert_eq!(tree.number(pair, "left").unwrap(), 1);
}

#[test]
fn parsers_stay_bound_to_their_struct() {
    let mut tree = Tree::new(pair_schema());
    let pair = tree.create_root("Pair", "pair").unwrap();
    let other = tree.create_root("Pair", "other").unwrap();

    let mut parser =
        Unserializer::new(&tree, pair, Box::new(BytesBuffer::from_bytes([1_u8, 0, 2, 0])))
            .unwrap();
    assert!(matches!(
        parser.resume(&mut tree, other, &Until::All),
        Err(Error::LibraryMisuse(_))
    ));
    parser.resume(&mut tree, pair, &Until::All).unwrap();
    assert!(parser.is_finished());
    assert_eq!(parser.target(), pair);
    assert_eq!(tree.number(pair, "right").unwrap(), 2);

    let int = tree.create_root("Int", "int").unwrap();
    assert!(matches!(
        tree.unserialize_until(int, stream(&[0]), &Until::All),
        Err(Error::SerializationUnsupported(_))
    ));
}
