use fieldlens::grammar::*;
use fieldlens::{Editor, EntryId};

fn open(grammar: &ConstructRef, bytes: Vec<u8>) -> Editor {
    let mut editor = Editor::default();
    editor.set_grammar(grammar).expect("grammar");
    editor.load_bytes(bytes).expect("load");
    editor
}

fn rows(editor: &mut Editor, parent: Option<EntryId>) -> Vec<EntryId> {
    match parent {
        Some(_) => editor.children_of(parent),
        None => {
            let root = editor.children_of(None)[0];
            editor.children_of(Some(root))
        }
    }
}

#[test]
fn plain_field_reads_from_root_buffer() {
    let g = structure(vec![field("a", int8ub()), field("b", int16ub())]);
    let mut editor = open(&g, vec![0x01, 0x02, 0x03]);
    let fields = rows(&mut editor, None);

    let chain = editor.stream_chain(fields[1]);
    assert_eq!(chain.len(), 1);
    assert!(chain[0].path.is_root());
    assert_eq!(chain[0].byte_range, (1, 3));
    assert_eq!(chain[0].slice(), &[0x02, 0x03]);
    assert_eq!(chain[0].stream.label(), "root");
    assert_eq!(
        Some(&chain[0].stream),
        editor.document().root_stream.as_ref()
    );
}

#[test]
fn compressed_field_adds_a_tunnel() {
    let g = structure(vec![
        field("tag", int8ub()),
        field("body", prefixed(int8ub(), compressed(greedy_bytes()))),
    ]);
    let text = b"hello hello hello".to_vec();
    let value = Value::Container(Container::from_iter([
        ("tag", Value::Int(7)),
        ("body", Value::Bytes(text.clone())),
    ]));
    let data = build_bytes(&g, &value).expect("build");
    let total = data.len();

    let mut editor = open(&g, data.clone());
    let fields = rows(&mut editor, None);
    assert_eq!(editor.obj(fields[1]), Some(&Value::Bytes(text.clone())));

    let chain = editor.stream_chain(fields[1]);
    assert_eq!(chain.len(), 2);

    // the compressed payload inside the root buffer
    assert!(chain[0].path.is_root());
    assert_eq!(chain[0].byte_range, (2, total));
    assert_eq!(chain[0].slice(), &data[2..]);

    // the decompressed buffer
    assert_eq!(chain[1].path.to_string(), "body");
    assert_eq!(chain[1].stream.label(), "compressed");
    assert_eq!(chain[1].byte_range, (0, text.len()));
    assert_eq!(chain[1].slice(), text.as_slice());
    assert_ne!(chain[0].stream.id(), chain[1].stream.id());
}

#[test]
fn bitwise_field_ranges_are_in_bits() {
    let g = structure(vec![
        field(
            "flags",
            bitwise(structure(vec![
                field("hi", bits_integer(4, false)),
                field("lo", bits_integer(4, false)),
            ])),
        ),
        field("next", int8ub()),
    ]);
    let mut editor = open(&g, vec![0xa5, 0x42]);
    let fields = rows(&mut editor, None);
    let bits = rows(&mut editor, Some(fields[0]));
    let lo = bits[1];
    assert_eq!(editor.obj(lo), Some(&Value::Int(5)));
    assert_eq!(editor.path(lo).to_string(), "flags.lo");

    let chain = editor.stream_chain(lo);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].byte_range, (0, 1));
    assert!(!chain[0].bit_mode);

    let inner = &chain[1];
    assert!(inner.bit_mode);
    assert!(inner.stream.is_bits());
    assert_eq!(inner.stream.label(), "bitwise");
    assert_eq!(inner.path.to_string(), "flags");
    assert_eq!(inner.byte_range, (4, 8));
    assert_eq!(inner.byte_span(), (0, 1));
    assert_eq!(inner.slice(), &[0, 1, 0, 1]);

    // the next byte-level field is back on the root buffer
    let next = editor.stream_chain(fields[1]);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].byte_range, (1, 2));
}

#[test]
fn every_range_lies_within_its_stream() {
    let g = structure(vec![
        field("count", rebuild(int8ub(), Expr::len_of("items"))),
        field(
            "items",
            array(
                Expr::this("count"),
                structure(vec![
                    field("len", int8ub()),
                    field("data", bytes(Expr::this("len"))),
                ]),
            ),
        ),
    ]);
    let mut editor = open(&g, vec![2, 1, 0xaa, 2, 0xbb, 0xcc]);
    let fields = rows(&mut editor, None);
    let items = editor.children_of(Some(fields[1]));
    assert_eq!(items.len(), 2);

    let mut seen = Vec::new();
    for item in items {
        for leaf in editor.children_of(Some(item)) {
            for record in editor.stream_chain(leaf) {
                let (start, end) = record.byte_range;
                assert!(start <= end && end <= record.stream.len(), "{:?}", record);
                seen.push((editor.path(leaf).to_string(), record.slice().to_vec()));
            }
        }
    }
    assert!(seen.contains(&("items[1].data".to_string(), vec![0xbb, 0xcc])));
    assert!(seen.contains(&("items[0].len".to_string(), vec![1])));
}

#[test]
fn pointer_target_gets_its_own_record() {
    let g = structure(vec![
        field("a", int8ub()),
        field("p", pointer(3usize, int8ub())),
    ]);
    let mut editor = open(&g, vec![0x01, 0x00, 0x00, 0x09]);
    let fields = rows(&mut editor, None);
    assert_eq!(editor.obj(fields[1]), Some(&Value::Int(9)));

    let chain = editor.stream_chain(fields[1]);
    assert_eq!(chain.len(), 2);

    // the pointer itself consumes nothing in the root buffer
    assert!(chain[0].path.is_root());
    assert_eq!(chain[0].stream.label(), "root");
    assert_eq!(chain[0].byte_range, (1, 1));

    // the target keeps absolute offsets into the same data
    assert_eq!(chain[1].path.to_string(), "p");
    assert_eq!(chain[1].stream.label(), "pointer");
    assert_eq!(chain[1].byte_range, (3, 4));
    assert_eq!(chain[1].slice(), &[0x09]);
    assert_ne!(chain[0].stream.id(), chain[1].stream.id());
    assert_eq!(chain[0].stream.data(), chain[1].stream.data());
}

/// Every row plus the entries it delegates to.
fn walk(editor: &mut Editor) -> Vec<EntryId> {
    let mut out = Vec::new();
    let mut pending = editor.children_of(None);
    while let Some(id) = pending.pop() {
        out.push(id);
        if let Some((tree, doc)) = editor.tree().map(|t| (t, editor.document())) {
            let mut cur = id;
            while let Some(next) = tree.active_child(cur, doc) {
                out.push(next);
                cur = next;
            }
        }
        pending.extend(editor.children_of(Some(id)));
    }
    out
}

#[test]
fn child_ranges_nest_inside_parent_ranges() {
    let g = structure(vec![
        field("a", int8ub()),
        field("p", pointer(7usize, int16ub())),
        field(
            "flags",
            bitwise(structure(vec![
                field("hi", bits_integer(4, false)),
                field("lo", bits_integer(4, false)),
            ])),
        ),
        field("ahead", peek(int8ub())),
        field("n", int8ub()),
        field(
            "items",
            array(
                2usize,
                structure(vec![
                    field("len", int8ub()),
                    field("data", bytes(Expr::this("len"))),
                ]),
            ),
        ),
    ]);
    let data = vec![0x01, 0xa5, 0x07, 0x01, 0xaa, 0x01, 0xbb, 0x12, 0x34];
    let mut editor = open(&g, data);
    let entries = walk(&mut editor);
    let tree = editor.tree().expect("tree");
    let doc = editor.document();

    let mut pairs = 0;
    for &id in &entries {
        let Some(meta) = tree.metadata_for(id, doc) else {
            continue;
        };
        let mut ancestor = tree.parent_of(id);
        while let Some(up) = ancestor {
            if let Some(outer) = tree.metadata_for(up, doc) {
                if outer.stream == meta.stream {
                    let (start, end) = meta.byte_range;
                    let (outer_start, outer_end) = outer.byte_range;
                    assert!(
                        outer_start <= start && end <= outer_end,
                        "{} {:?} escapes {} {:?}",
                        tree.path(id, doc),
                        meta.byte_range,
                        tree.path(up, doc),
                        outer.byte_range
                    );
                    pairs += 1;
                }
            }
            ancestor = tree.parent_of(up);
        }
    }
    assert!(pairs > 10, "only {} pairs checked", pairs);

    // the pointer and peek targets are read under their own streams
    let labels: Vec<&str> = entries
        .iter()
        .filter_map(|id| tree.metadata_for(*id, doc))
        .map(|m| m.stream.label())
        .collect();
    assert!(labels.contains(&"pointer"));
    assert!(labels.contains(&"peek"));
    assert!(labels.contains(&"bitwise"));
}
