//! Built-in demo grammars.
//!
//! `sample` describes a small container file: a magic, a bit-packed flag
//! byte, a timestamp, a list of typed records and a body that is
//! zlib-compressed when the `compressed` flag is set.
use fieldlens::grammar::*;

/// Names accepted by `--format`.
pub const FORMATS: &[&str] = &["sample", "record"];

pub fn by_name(name: &str) -> Option<ConstructRef> {
    match name {
        "sample" => Some(sample()),
        "record" => Some(record()),
        _ => None,
    }
}

pub fn record() -> ConstructRef {
    structure(vec![
        field(
            "kind",
            enumeration(int8ub(), &[("NAME", 1), ("NUMBER", 2), ("ATTRS", 3)]),
        ),
        field("len", int8ub()),
        renamed(
            "data",
            "record payload, interpreted by kind",
            fixed_sized(
                Expr::this("len"),
                switch(
                    Expr::this("kind"),
                    vec![
                        (Value::from("NAME"), null_stripped(greedy_bytes())),
                        (Value::from("NUMBER"), int32ub()),
                        (
                            Value::from("ATTRS"),
                            flags_enum(int8ub(), &[("READ", 1), ("WRITE", 2), ("EXEC", 4)]),
                        ),
                    ],
                    Some(greedy_bytes()),
                ),
            ),
        ),
    ])
}

pub fn sample() -> ConstructRef {
    structure(vec![
        field("magic", constant(Value::Bytes(b"FLNS".to_vec()), bytes(4usize))),
        field("version", int8ub()),
        field(
            "flags",
            bitwise(structure(vec![
                field("compressed", flag()),
                field("has_crc", flag()),
                field("_reserved", bits_integer(6, false)),
            ])),
        ),
        field("created", timestamp(int32ub())),
        field("count", rebuild(int8ub(), Expr::len_of("records"))),
        field("records", array(Expr::this("count"), record())),
        field(
            "body",
            if_then_else(
                Expr::this("flags.compressed"),
                prefixed(int16ub(), compressed(greedy_bytes())),
                prefixed(int16ub(), greedy_bytes()),
            ),
        ),
    ])
}

fn sample_record(kind: &str, data: Value, len: usize) -> Value {
    Value::Container(Container::from_iter([
        ("kind", Value::from(kind)),
        ("len", Value::from(len)),
        ("data", data),
    ]))
}

/// A value `sample()` can build, for producing a demo file.
pub fn sample_value() -> Value {
    let flags = Container::from_iter([
        ("compressed", Value::Bool(true)),
        ("has_crc", Value::Bool(false)),
        ("_reserved", Value::Int(0)),
    ]);
    let records = vec![
        sample_record("NAME", Value::Bytes(b"fieldlens".to_vec()), 12),
        sample_record("NUMBER", Value::Int(0x1234_5678), 4),
        sample_record("ATTRS", Value::List(vec!["READ".into(), "EXEC".into()]), 1),
    ];
    Value::Container(Container::from_iter([
        ("magic", Value::Bytes(b"FLNS".to_vec())),
        ("version", Value::Int(1)),
        ("flags", Value::Container(flags)),
        ("created", Value::Int(1_700_000_000)),
        ("count", Value::Int(0)),
        ("records", Value::List(records)),
        ("body", Value::Bytes(b"hello hello hello hello fieldlens".to_vec())),
    ]))
}
