use std::any::Any;
use std::sync::Arc;

use fieldlens::entry::{EntryBehavior, EntryKind, leaf_entry};
use fieldlens::grammar::*;
use fieldlens::{
    ConvertMode, Document, EditorError, EntryId, EntryRegistry, EntryTree, GrammarError,
    InstrumentPolicy, IntegerFormat, MenuAction, Orchestrator, Path, Preprocessor, ValueKind,
};

fn open(grammar: &ConstructRef, bytes: Vec<u8>) -> (Orchestrator, EntryTree) {
    open_with(grammar, bytes, Preprocessor::new(), EntryRegistry::new())
}

fn open_with(
    grammar: &ConstructRef,
    bytes: Vec<u8>,
    pre: Preprocessor,
    registry: EntryRegistry,
) -> (Orchestrator, EntryTree) {
    let instrumented = pre.instrument(grammar, false).expect("instrument");
    let tree = EntryTree::new(&instrumented, Arc::new(registry)).expect("entry tree");
    let mut orch = Orchestrator::new(ConvertMode::Foreground);
    orch.set_grammar(instrumented);
    orch.load(bytes).expect("parse");
    (orch, tree)
}

fn child(tree: &mut EntryTree, doc: &Document, id: EntryId, name: &str) -> EntryId {
    tree.subentries(id, doc)
        .into_iter()
        .find(|c| tree.entry(*c).name() == name)
        .unwrap_or_else(|| panic!("no child named {}", name))
}

fn set_root(orch: &mut Orchestrator, value: Value) {
    orch.replace_value(&Path::root(), value).expect("replace");
    orch.rebuild().expect("rebuild");
}

#[test]
fn struct_fields_follow_declaration() {
    let g = structure(vec![
        field("len", int8ub()),
        field("payload", bytes(Expr::this("len"))),
    ]);
    let (orch, mut tree) = open(&g, vec![0x02, 0xaa, 0xbb]);
    let doc = orch.document();
    let root = tree.root();

    let fields = tree.subentries(root, doc);
    let names: Vec<&str> = fields.iter().map(|f| tree.entry(*f).name()).collect();
    assert_eq!(names, vec!["len", "payload"]);
    assert!(tree.is_container(root, doc));
    assert!(!tree.is_container(fields[1], doc));
    assert_eq!(tree.path(fields[1], doc).to_string(), "payload");
    assert_eq!(tree.obj(fields[0], doc), Some(&Value::Int(2)));
    assert_eq!(tree.obj_str(fields[1], doc, IntegerFormat::Dec), "AA BB");
    assert_eq!(tree.type_label(fields[0], doc), "Int8ub");
    assert_eq!(tree.value_kind(fields[0], doc), ValueKind::Integer);
    assert_eq!(tree.value_kind(fields[1], doc), ValueKind::Bytes);
    assert_eq!(tree.value_kind(root, doc), ValueKind::Container);
    assert_eq!(tree.metadata_for(fields[1], doc).expect("meta").byte_range, (1, 3));
}

#[test]
fn if_then_else_follows_condition() {
    let g = structure(vec![
        field("choice", flag()),
        field(
            "data",
            if_then_else(Expr::this("choice"), int16ub(), bytes(2usize)),
        ),
    ]);
    let (mut orch, mut tree) = open(&g, vec![0x01, 0x12, 0x34]);
    let root = tree.root();
    let data = child(&mut tree, orch.document(), root, "data");
    let (then_entry, else_entry) = match tree.entry(data).kind() {
        EntryKind::IfThenElse {
            then_entry,
            else_entry,
            ..
        } => (*then_entry, *else_entry),
        other => panic!("expected IfThenElse, got {:?}", other),
    };
    // both branches carry the field's name
    assert_eq!(tree.entry(then_entry).name(), "data");
    assert_eq!(tree.entry(else_entry).name(), "data");

    let doc = orch.document();
    assert_eq!(tree.active_child(data, doc), Some(then_entry));
    assert_eq!(tree.type_label(data, doc), "Int16ub");
    assert_eq!(tree.obj_str(data, doc, IntegerFormat::Hex), "0x1234");
    assert!(tree.metadata_for(then_entry, doc).is_some());
    assert!(tree.metadata_for(else_entry, doc).is_none());

    set_root(
        &mut orch,
        Value::Container(Container::from_iter([
            ("choice", Value::Bool(false)),
            ("data", Value::Bytes(vec![0x12, 0x34])),
        ])),
    );
    assert_eq!(orch.bytes(), &[0x00, 0x12, 0x34]);

    // same entry, other branch
    let doc = orch.document();
    assert_eq!(child(&mut tree, doc, root, "data"), data);
    assert_eq!(tree.active_child(data, doc), Some(else_entry));
    assert_eq!(tree.type_label(data, doc), "Bytes(2)");
    assert_eq!(tree.value_kind(data, doc), ValueKind::Bytes);
}

#[test]
fn switch_without_match_has_no_active_child() {
    let g = structure(vec![
        field("kind", int8ub()),
        field(
            "data",
            switch(Expr::this("kind"), vec![(Value::Int(1), int8ub())], None),
        ),
    ]);
    let (orch, mut tree) = open(&g, vec![0x02]);
    let doc = orch.document();
    let root = tree.root();
    let data = child(&mut tree, doc, root, "data");
    assert_eq!(tree.obj(data, doc), Some(&Value::None));
    assert_eq!(tree.active_child(data, doc), None);
    assert_eq!(tree.type_label(data, doc), "Switch");
    assert_eq!(tree.value_kind(data, doc), ValueKind::ReadOnly);

    let (orch, mut tree) = open(&g, vec![0x01, 0x09]);
    let doc = orch.document();
    let root = tree.root();
    let data = child(&mut tree, doc, root, "data");
    assert!(tree.active_child(data, doc).is_some());
    assert_eq!(tree.type_label(data, doc), "Int8ub");
    assert_eq!(tree.obj_str(data, doc, IntegerFormat::Dec), "9");
}

#[test]
fn select_reports_producing_option() {
    let g = structure(vec![field(
        "v",
        select(vec![
            constant(Value::Bytes(b"AB".to_vec()), bytes(2usize)),
            int16ub(),
        ]),
    )]);

    let (orch, mut tree) = open(&g, vec![0x00, 0x07]);
    let doc = orch.document();
    let root = tree.root();
    let v = child(&mut tree, doc, root, "v");
    let options = match tree.entry(v).kind() {
        EntryKind::Select { options } => options.clone(),
        other => panic!("expected Select, got {:?}", other),
    };
    assert_eq!(tree.active_child(v, doc), Some(options[1]));
    assert_eq!(tree.type_label(v, doc), "Int16ub");
    assert_eq!(tree.value_kind(v, doc), ValueKind::Integer);

    let (orch, mut tree) = open(&g, b"AB".to_vec());
    let doc = orch.document();
    let root = tree.root();
    let v = child(&mut tree, doc, root, "v");
    let options = match tree.entry(v).kind() {
        EntryKind::Select { options } => options.clone(),
        other => panic!("expected Select, got {:?}", other),
    };
    assert_eq!(tree.active_child(v, doc), Some(options[0]));
    // a constant is never editable
    assert_eq!(tree.value_kind(v, doc), ValueKind::ReadOnly);
    assert_eq!(tree.type_label(v, doc), "Bytes(2)");
}

#[test]
fn focused_seq_delegates_to_focus() {
    let g = structure(vec![
        field("tag", int8ub()),
        field(
            "v",
            focused_seq(
                Expr::constant("value"),
                vec![
                    field("magic", constant(Value::Bytes(b"V".to_vec()), bytes(1usize))),
                    field("value", int16ub()),
                ],
            ),
        ),
    ]);
    let (orch, mut tree) = open(&g, vec![0x09, b'V', 0x00, 0x07]);
    let doc = orch.document();
    let root = tree.root();
    let v = child(&mut tree, doc, root, "v");
    let members = match tree.entry(v).kind() {
        EntryKind::FocusedSeq { members, .. } => members.clone(),
        other => panic!("expected FocusedSeq, got {:?}", other),
    };
    assert_eq!(tree.active_child(v, doc), Some(members[1]));
    assert_eq!(tree.path(members[1], doc).to_string(), "v");
    assert_eq!(tree.path(members[0], doc).to_string(), "v.magic");
    assert_eq!(tree.obj(v, doc), Some(&Value::Int(7)));
    assert_eq!(tree.type_label(v, doc), "Int16ub");
    assert!(!tree.is_container(v, doc));
}

#[test]
fn array_elements_follow_observed_length() {
    let g = structure(vec![
        field("count", rebuild(int8ub(), Expr::len_of("items"))),
        field("items", array(Expr::this("count"), int8ub())),
    ]);
    let (mut orch, mut tree) = open(&g, vec![0x02, 10, 20]);
    let root = tree.root();
    let items = child(&mut tree, orch.document(), root, "items");
    let count = child(&mut tree, orch.document(), root, "count");

    let doc = orch.document();
    // recomputed on build, so not editable
    assert_eq!(tree.value_kind(count, doc), ValueKind::ReadOnly);
    let first = tree.subentries(items, doc);
    assert_eq!(first.len(), 2);
    assert_eq!(tree.entry(first[1]).name(), "1");
    assert_eq!(tree.path(first[1], doc).to_string(), "items[1]");
    assert_eq!(tree.obj(first[1], doc), Some(&Value::Int(20)));
    // cached while the length is unchanged
    assert_eq!(tree.subentries(items, doc), first);

    orch.replace_value(
        &"items".parse().expect("path"),
        Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]),
    )
    .expect("replace");
    orch.rebuild().expect("rebuild");
    assert_eq!(orch.bytes(), &[3, 10, 20, 30]);

    let doc = orch.document();
    let second = tree.subentries(items, doc);
    assert_eq!(second.len(), 3);
    assert_eq!(tree.obj(second[2], doc), Some(&Value::Int(30)));
    // growing keeps the existing elements
    assert_eq!(&second[..2], first.as_slice());
    let allocated = tree.len();

    for list in [vec![Value::Int(10)], vec![Value::Int(1), Value::Int(2), Value::Int(3)]] {
        orch.replace_value(&"items".parse().expect("path"), Value::List(list))
            .expect("replace");
        orch.rebuild().expect("rebuild");
        let shown = tree.subentries(items, orch.document());
        assert_eq!(shown.as_slice(), &second[..shown.len()]);
    }
    assert_eq!(orch.bytes(), &[3, 1, 2, 3]);
    // shrinking and regrowing allocates nothing new
    assert_eq!(tree.len(), allocated);
}

#[test]
fn struct_with_counted_array_payload() {
    let g = structure(vec![
        field("len", int8ub()),
        field("payload", array(Expr::this("len"), int8ub())),
    ]);
    let (orch, mut tree) = open(&g, vec![0x02, 0xaa, 0xbb]);
    let doc = orch.document();
    let root = tree.root();

    let fields = tree.subentries(root, doc);
    assert_eq!(tree.path(fields[1], doc).to_string(), "payload");
    assert!(tree.is_container(fields[1], doc));
    assert_eq!(tree.metadata_for(fields[1], doc).expect("meta").byte_range, (1, 3));

    let elements = tree.subentries(fields[1], doc);
    assert_eq!(elements.len(), 2);
    assert_eq!(tree.obj(elements[0], doc), Some(&Value::Int(0xaa)));
    assert_eq!(tree.obj(elements[1], doc), Some(&Value::Int(0xbb)));
    assert_eq!(tree.metadata_for(elements[1], doc).expect("meta").byte_range, (2, 3));
}

#[test]
fn array_length_without_value() {
    let g = structure(vec![
        field("fixed", array(3usize, int8ub())),
        field("rest", greedy_range(int8ub())),
    ]);
    let instrumented = Preprocessor::new().instrument(&g, false).expect("instrument");
    let mut tree = EntryTree::new(&instrumented, Arc::new(EntryRegistry::new())).expect("tree");
    let doc = Document::default();
    let root = tree.root();
    let fields = tree.subentries(root, &doc);
    assert_eq!(tree.subentries(fields[0], &doc).len(), 3);
    assert_eq!(tree.subentries(fields[1], &doc).len(), 1);
    assert_eq!(tree.type_label(fields[0], &doc), "Array[3]");
    assert_eq!(tree.obj(fields[0], &doc), None);
}

#[test]
fn menu_items_depend_on_entry() {
    let g = structure(vec![
        field("n", int8ub()),
        field("list", array(2usize, int8ub())),
    ]);
    let (orch, mut tree) = open(&g, vec![1, 2, 3]);
    let doc = orch.document();
    let root = tree.root();
    let n = child(&mut tree, doc, root, "n");
    let list = child(&mut tree, doc, root, "list");

    let actions: Vec<MenuAction> = tree
        .menu_items(n, doc, IntegerFormat::Hex)
        .iter()
        .map(|m| m.action)
        .collect();
    assert_eq!(
        actions,
        vec![MenuAction::ToggleIntegerFormat, MenuAction::CopyPath]
    );
    let hex = &tree.menu_items(n, doc, IntegerFormat::Hex)[0];
    assert_eq!(hex.checked, Some(true));

    let items = tree.menu_items(list, doc, IntegerFormat::Dec);
    assert_eq!(items[0].label, "List view");
    assert_eq!(items[0].checked, Some(false));
    assert_eq!(items.last().map(|m| m.action), Some(MenuAction::CopyPath));
}

#[test]
fn expand_all_reaches_every_descendant() {
    let g = structure(vec![field(
        "outer",
        structure(vec![field("inner", array(2usize, int8ub()))]),
    )]);
    let (orch, mut tree) = open(&g, vec![1, 2]);
    let doc = orch.document();
    let root = tree.root();
    tree.expand_all(root, doc);
    let outer = child(&mut tree, doc, root, "outer");
    let inner = child(&mut tree, doc, outer, "inner");
    assert!(tree.entry(inner).is_expanded());
    assert!(tree.subentries(inner, doc).iter().all(|e| tree.entry(*e).is_expanded()));

    tree.collapse_all(outer, doc);
    assert!(tree.entry(root).is_expanded());
    assert!(!tree.entry(inner).is_expanded());
    assert_eq!(tree.flatten(root, doc).len(), 2);
}

/// Two-byte little-endian word with no entry constructor of its own.
#[derive(Debug)]
struct Word;

impl Construct for Word {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let b = stream.read_bytes(2)?;
        Ok(Value::Int(u16::from_le_bytes([b[0], b[1]]) as i128))
    }

    fn build(&self, value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let v = value.as_int().unwrap_or(0) as u16;
        sink.write_bytes(&v.to_le_bytes());
        Ok(Value::Int(v as i128))
    }

    fn type_name(&self) -> String {
        "Word".into()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct WordView;

impl EntryBehavior for WordView {
    fn type_label(&self, _construct: &ConstructRef, _value: Option<&Value>) -> String {
        "word (LE)".into()
    }

    fn value_kind(&self, _value: Option<&Value>) -> ValueKind {
        ValueKind::Integer
    }
}

fn word_preprocessor() -> Preprocessor {
    let mut pre = Preprocessor::new();
    pre.register::<Word>(InstrumentPolicy::Leaf);
    pre
}

#[test]
fn unregistered_node_kind_is_unimplemented() {
    let g = structure(vec![field("w", Arc::new(Word))]);
    let instrumented = word_preprocessor().instrument(&g, false).expect("instrument");
    let err = EntryTree::new(&instrumented, Arc::new(EntryRegistry::new())).unwrap_err();
    assert_eq!(err, EditorError::UnimplementedNode("Word".into()));
}

#[test]
fn custom_type_registration() {
    let g = structure(vec![field("w", Arc::new(Word))]);
    let mut registry = EntryRegistry::new();
    registry.register_type::<Word>(|_tree, _id, _node| Ok(EntryKind::Custom(Arc::new(WordView))));
    let (orch, mut tree) = open_with(&g, vec![0x34, 0x12], word_preprocessor(), registry);
    let doc = orch.document();
    let root = tree.root();
    let w = child(&mut tree, doc, root, "w");
    assert_eq!(tree.type_label(w, doc), "word (LE)");
    assert_eq!(tree.obj_str(w, doc, IntegerFormat::Hex), "0x1234");
    assert_eq!(tree.value_kind(w, doc), ValueKind::Integer);
}

#[test]
fn structural_and_instance_registration() {
    let word: ConstructRef = Arc::new(Word);
    let other: ConstructRef = Arc::new(Word);
    let g = structure(vec![field("a", word.clone()), field("b", other)]);

    let mut registry = EntryRegistry::new();
    registry.register_structural(|c| c.type_name() == "Word", leaf_entry);
    registry.register_instance(&word, |_tree, _id, _node| {
        Ok(EntryKind::Custom(Arc::new(WordView)))
    });
    let (orch, mut tree) = open_with(&g, vec![1, 0, 2, 0], word_preprocessor(), registry);
    let doc = orch.document();
    let root = tree.root();
    let a = child(&mut tree, doc, root, "a");
    let b = child(&mut tree, doc, root, "b");
    // the instance registration wins over the structural one
    assert!(matches!(tree.entry(a).kind(), EntryKind::Custom(_)));
    assert!(matches!(tree.entry(b).kind(), EntryKind::Leaf));
    assert_eq!(tree.type_label(b, doc), "Word");
    assert_eq!(tree.obj(b, doc), Some(&Value::Int(2)));
}
