//! Grammar collaborator interface and the reference node set.
//!
//! The editing core only talks to grammars through the [`Construct`] trait:
//! `parse`, `build`, and enough introspection (`type_name`, `family`,
//! `subcons`, `with_subcons`, `as_any`) to instrument a grammar and mirror
//! it into an entry tree. The nodes in this module are a compact,
//! self-contained set covering the shapes the editor has to understand;
//! custom nodes only need to implement the trait.
//!
//! The free functions below are the usual way to assemble a grammar:
//!
//! ```
//! use fieldlens::Path;
//! use fieldlens::grammar::*;
//!
//! let record = structure(vec![
//!     field("len", int8ub()),
//!     field("payload", bytes(Expr::this("len"))),
//! ]);
//! let value = parse_bytes(&record, &[0x02, 0xaa, 0xbb]).unwrap();
//! let payload: Path = "payload".parse().unwrap();
//! assert_eq!(payload.resolve(&value).unwrap(), &Value::Bytes(vec![0xaa, 0xbb]));
//! ```
use std::sync::Arc;

pub mod compound;
pub mod construct;
pub mod context;
pub mod expr;
pub mod leaf;
pub mod stream;
pub mod value;
pub mod wrapper;

pub use compound::{Checksum, FocusedSeq, IfThenElse, Select, Struct, Switch, member_name};
pub use construct::{
    Construct, ConstructRef, Family, build_bytes, downcast, node_key, parse_bytes, same_node,
};
pub use context::{CancelToken, Context, Scope};
pub use expr::Expr;
pub use leaf::{
    BitsInteger, Bytes, Computed, Endian, Enum, Flag, FlagsEnum, FormatField, GreedyBytes,
    NumberKind, Pass, Tell, Timestamp,
};
pub use stream::{Sink, Stream, StreamId, StreamRef};
pub use value::{Container, EnumValue, FlagsValue, Value};
pub use wrapper::{
    Aligned, Array, Bitwise, Compressed, Const, Defaulted, FixedSized, GreedyRange,
    NullStripped, NullTerminated, Optional, Padded, Peek, Pointer, Prefixed, Rebuild, Renamed,
    Transformed,
};

fn number(width: usize, kind: NumberKind, endian: Endian) -> ConstructRef {
    Arc::new(FormatField {
        width,
        kind,
        endian,
    })
}

pub fn int8ub() -> ConstructRef {
    number(1, NumberKind::Unsigned, Endian::Big)
}

pub fn int16ub() -> ConstructRef {
    number(2, NumberKind::Unsigned, Endian::Big)
}

pub fn int16ul() -> ConstructRef {
    number(2, NumberKind::Unsigned, Endian::Little)
}

pub fn int32ub() -> ConstructRef {
    number(4, NumberKind::Unsigned, Endian::Big)
}

pub fn int32ul() -> ConstructRef {
    number(4, NumberKind::Unsigned, Endian::Little)
}

pub fn int64ub() -> ConstructRef {
    number(8, NumberKind::Unsigned, Endian::Big)
}

pub fn int64ul() -> ConstructRef {
    number(8, NumberKind::Unsigned, Endian::Little)
}

pub fn int8sb() -> ConstructRef {
    number(1, NumberKind::Signed, Endian::Big)
}

pub fn int16sb() -> ConstructRef {
    number(2, NumberKind::Signed, Endian::Big)
}

pub fn int16sl() -> ConstructRef {
    number(2, NumberKind::Signed, Endian::Little)
}

pub fn int32sb() -> ConstructRef {
    number(4, NumberKind::Signed, Endian::Big)
}

pub fn int32sl() -> ConstructRef {
    number(4, NumberKind::Signed, Endian::Little)
}

pub fn float32b() -> ConstructRef {
    number(4, NumberKind::Float, Endian::Big)
}

pub fn float32l() -> ConstructRef {
    number(4, NumberKind::Float, Endian::Little)
}

pub fn float64b() -> ConstructRef {
    number(8, NumberKind::Float, Endian::Big)
}

pub fn float64l() -> ConstructRef {
    number(8, NumberKind::Float, Endian::Little)
}

pub fn bytes(length: impl Into<Expr>) -> ConstructRef {
    Arc::new(Bytes {
        length: length.into(),
    })
}

pub fn greedy_bytes() -> ConstructRef {
    Arc::new(GreedyBytes)
}

pub fn bits_integer(bits: usize, signed: bool) -> ConstructRef {
    Arc::new(BitsInteger { bits, signed })
}

pub fn flag() -> ConstructRef {
    Arc::new(Flag)
}

pub fn enumeration(subcon: ConstructRef, mapping: &[(&str, i128)]) -> ConstructRef {
    Arc::new(Enum {
        subcon,
        mapping: mapping.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
    })
}

pub fn flags_enum(subcon: ConstructRef, flags: &[(&str, i128)]) -> ConstructRef {
    Arc::new(FlagsEnum {
        subcon,
        flags: flags.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
    })
}

pub fn timestamp(subcon: ConstructRef) -> ConstructRef {
    Arc::new(Timestamp { subcon })
}

pub fn tell() -> ConstructRef {
    Arc::new(Tell)
}

pub fn computed(expr: Expr) -> ConstructRef {
    Arc::new(Computed { expr })
}

pub fn pass() -> ConstructRef {
    Arc::new(Pass)
}

/// Name a node (`"name" / subcon`).
pub fn field(name: &str, subcon: ConstructRef) -> ConstructRef {
    renamed(name, "", subcon)
}

/// Name a node and attach documentation to it.
pub fn renamed(name: &str, docs: &str, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Renamed {
        name: name.to_string(),
        docs: docs.to_string(),
        subcon,
    })
}

pub fn padded(length: usize, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Padded { length, subcon })
}

/// `length` zero units that are not stored anywhere.
pub fn padding(length: usize) -> ConstructRef {
    padded(length, pass())
}

pub fn aligned(modulus: usize, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Aligned { modulus, subcon })
}

pub fn pointer(offset: impl Into<Expr>, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Pointer {
        offset: offset.into(),
        subcon,
    })
}

pub fn peek(subcon: ConstructRef) -> ConstructRef {
    Arc::new(Peek { subcon })
}

pub fn optional(subcon: ConstructRef) -> ConstructRef {
    Arc::new(Optional { subcon })
}

pub fn rebuild(subcon: ConstructRef, func: Expr) -> ConstructRef {
    Arc::new(Rebuild { func, subcon })
}

pub fn default(subcon: ConstructRef, value: impl Into<Value>) -> ConstructRef {
    Arc::new(Defaulted {
        value: value.into(),
        subcon,
    })
}

pub fn constant(value: impl Into<Value>, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Const {
        value: value.into(),
        subcon,
    })
}

pub fn fixed_sized(length: impl Into<Expr>, subcon: ConstructRef) -> ConstructRef {
    Arc::new(FixedSized {
        length: length.into(),
        subcon,
    })
}

pub fn prefixed(length_field: ConstructRef, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Prefixed {
        length_field,
        subcon,
    })
}

pub fn compressed(subcon: ConstructRef) -> ConstructRef {
    Arc::new(Compressed { subcon })
}

pub fn null_terminated(subcon: ConstructRef) -> ConstructRef {
    Arc::new(NullTerminated { subcon })
}

pub fn null_stripped(subcon: ConstructRef) -> ConstructRef {
    Arc::new(NullStripped { subcon })
}

pub fn transformed<D, E>(subcon: ConstructRef, decode: D, encode: E, size: Option<Expr>) -> ConstructRef
where
    D: Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    E: Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
{
    Arc::new(Transformed {
        decode: Arc::new(decode),
        encode: Arc::new(encode),
        size,
        subcon,
    })
}

pub fn bitwise(subcon: ConstructRef) -> ConstructRef {
    Arc::new(Bitwise { subcon })
}

pub fn array(count: impl Into<Expr>, subcon: ConstructRef) -> ConstructRef {
    Arc::new(Array {
        count: count.into(),
        subcon,
    })
}

pub fn greedy_range(subcon: ConstructRef) -> ConstructRef {
    Arc::new(GreedyRange { subcon })
}

pub fn structure(subcons: Vec<ConstructRef>) -> ConstructRef {
    Arc::new(Struct { subcons })
}

pub fn focused_seq(selector: impl Into<Expr>, subcons: Vec<ConstructRef>) -> ConstructRef {
    Arc::new(FocusedSeq {
        selector: selector.into(),
        subcons,
    })
}

pub fn select(subcons: Vec<ConstructRef>) -> ConstructRef {
    Arc::new(Select { subcons })
}

pub fn if_then_else(cond: Expr, then_subcon: ConstructRef, else_subcon: ConstructRef) -> ConstructRef {
    Arc::new(IfThenElse {
        cond,
        then_subcon,
        else_subcon,
    })
}

pub fn switch(
    key: Expr,
    cases: Vec<(Value, ConstructRef)>,
    default: Option<ConstructRef>,
) -> ConstructRef {
    Arc::new(Switch { key, cases, default })
}

pub fn checksum<H>(field: ConstructRef, hash: H, data: Expr) -> ConstructRef
where
    H: Fn(&[u8]) -> i128 + Send + Sync + 'static,
{
    Arc::new(Checksum {
        field,
        hash: Arc::new(hash),
        data,
    })
}
