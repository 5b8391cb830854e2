use std::any::Any;
use std::sync::Arc;

use fieldlens::grammar::*;
use fieldlens::orchestrator::run_parse;
use fieldlens::{EditorError, GrammarError, InstrumentPolicy, Path, Preprocessor, WithMetadata};

/// Two-byte little-endian word; a node the built-in policies do not know.
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

fn path(s: &str) -> Path {
    s.parse().expect("path")
}

#[test]
fn leaves_and_wrappers_are_decorated() {
    let g = structure(vec![
        field("a", int8ub()),
        field("b", prefixed(int8ub(), greedy_bytes())),
    ]);
    let instrumented = Preprocessor::new().instrument(&g, false).expect("instrument");

    // the root struct itself is decorated
    let root = downcast::<WithMetadata>(&instrumented).expect("decorated root");
    assert!(downcast::<Struct>(&root.inner).is_some());

    // renames are kept, their children decorated
    let fields = root.inner.subcons();
    assert_eq!(member_name(&fields[0]), Some("a"));
    let a = &fields[0].subcons()[0];
    assert!(downcast::<WithMetadata>(a).is_some());

    // the input grammar is left alone
    let original = g.subcons();
    assert!(downcast::<WithMetadata>(&original[0].subcons()[0]).is_none());

    // instrumenting twice is a no-op
    let again = Preprocessor::new().instrument(&instrumented, false).expect("instrument");
    assert!(same_node(&again, &instrumented));
}

#[test]
fn parse_records_nested_provenance() {
    let g = structure(vec![
        field("a", int8ub()),
        field("b", prefixed(int8ub(), greedy_bytes())),
    ]);
    let instrumented = Preprocessor::new().instrument(&g, false).expect("instrument");
    let doc = run_parse(
        &instrumented,
        Arc::from(vec![0x05, 0x02, 0xaa, 0xbb]),
        CancelToken::new(),
    )
    .expect("parse");

    let a = doc.metadata.get(&path("a")).expect("a");
    assert_eq!(a.byte_range, (0, 1));
    assert!(!a.bit_mode);

    // the prefixed wrapper is the stored record, the greedy bytes hang off it
    let b = doc.metadata.get(&path("b")).expect("b");
    assert_eq!(b.byte_range, (1, 4));
    assert_eq!(b.chain().count(), 2);
    assert_eq!(b.innermost().byte_range, (2, 4));
    assert_eq!(b.innermost().construct.type_name(), "GreedyBytes");

    let root = doc.metadata.get(&Path::root()).expect("root");
    assert_eq!(root.byte_range, (0, 4));
    assert!(root.child_metadata.is_none());
    assert_eq!(root.stream, b.stream);
}

#[test]
fn bitwise_children_run_in_bit_mode() {
    let g = structure(vec![field(
        "flags",
        bitwise(structure(vec![
            field("hi", bits_integer(4, false)),
            field("lo", bits_integer(4, false)),
        ])),
    )]);
    let instrumented = Preprocessor::new().instrument(&g, false).expect("instrument");
    let doc = run_parse(&instrumented, Arc::from(vec![0xa5]), CancelToken::new()).expect("parse");

    let lo = doc.metadata.get(&path("flags.lo")).expect("lo");
    assert!(lo.bit_mode);
    assert_eq!(lo.byte_range, (4, 8));
    assert!(lo.stream.is_bits());

    let flags = doc.metadata.get(&path("flags")).expect("flags");
    assert!(!flags.bit_mode);
    assert_eq!(flags.byte_range, (0, 1));
    assert_ne!(flags.stream, lo.stream);
}

#[test]
fn failed_select_options_leave_no_records() {
    let g = structure(vec![field(
        "v",
        select(vec![
            structure(vec![
                field("x", int8ub()),
                field("magic", constant(Value::Bytes(b"Z".to_vec()), bytes(1usize))),
            ]),
            int16ub(),
        ]),
    )]);
    let instrumented = Preprocessor::new().instrument(&g, false).expect("instrument");
    let doc = run_parse(&instrumented, Arc::from(vec![0x01, 0x02]), CancelToken::new())
        .expect("parse");

    assert!(doc.metadata.get(&path("v.x")).is_none());
    let v = doc.metadata.get(&path("v")).expect("v");
    assert_eq!(v.innermost().construct.type_name(), "Int16ub");
}

#[test]
fn unknown_node_is_rejected() {
    let g = structure(vec![field("w", Arc::new(Word))]);
    let err = Preprocessor::new().instrument(&g, false).unwrap_err();
    assert_eq!(err, EditorError::GrammarUnsupported("Word".into()));
    assert!(!err.is_recoverable());
}

#[test]
fn registered_node_is_decorated() {
    let g = structure(vec![field("w", Arc::new(Word))]);
    let mut pre = Preprocessor::new();
    pre.register::<Word>(InstrumentPolicy::Leaf);
    assert_eq!(pre.policy_of(&(Arc::new(Word) as ConstructRef)), Some(InstrumentPolicy::Leaf));

    let instrumented = pre.instrument(&g, false).expect("instrument");
    let doc = run_parse(&instrumented, Arc::from(vec![0x34, 0x12]), CancelToken::new())
        .expect("parse");
    let w = doc.metadata.get(&path("w")).expect("w");
    assert_eq!(w.byte_range, (0, 2));
    assert_eq!(
        path("w").resolve(doc.value.as_ref().expect("value")).expect("resolve"),
        &Value::Int(0x1234)
    );
}
