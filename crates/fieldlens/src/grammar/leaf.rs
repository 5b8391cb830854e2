//! Leaf nodes: fixed-width numbers, byte blobs, bit-packed integers, flags,
//! enums, timestamps and position markers.
use std::any::Any;

use crate::error::GrammarError;
use crate::grammar::{
    Construct, ConstructRef, Context, EnumValue, Expr, Family, FlagsValue, Sink, Stream, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Unsigned,
    Signed,
    Float,
}

fn expect_int(value: &Value) -> Result<i128, GrammarError> {
    value.as_int().ok_or_else(|| GrammarError::Type {
        expected: "int",
        found: value.kind_name().to_string(),
    })
}

fn check_range(v: i128, bits: usize, signed: bool) -> Result<(), GrammarError> {
    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else if bits >= 127 {
        (0, i128::MAX)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if v < min || v > max {
        return Err(GrammarError::Range(format!(
            "{} does not fit in {} {} bits",
            v,
            if signed { "signed" } else { "unsigned" },
            bits
        )));
    }
    Ok(())
}

fn sign_extend(raw: u128, bits: usize) -> i128 {
    if bits == 0 || bits >= 128 {
        return raw as i128;
    }
    let shift = 128 - bits;
    ((raw << shift) as i128) >> shift
}

/// Fixed-width integer or float.
#[derive(Debug, Clone)]
pub struct FormatField {
    pub width: usize,
    pub kind: NumberKind,
    pub endian: Endian,
}

impl FormatField {
    pub fn bits(&self) -> usize {
        self.width * 8
    }
}

impl Construct for FormatField {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut raw = stream.read_bytes(self.width)?;
        if self.endian == Endian::Little {
            raw.reverse();
        }
        match self.kind {
            NumberKind::Float => match self.width {
                4 => {
                    let arr: [u8; 4] = raw[..].try_into().map_err(|_| {
                        GrammarError::Other("float32 needs 4 bytes".into())
                    })?;
                    Ok(Value::Float(f32::from_be_bytes(arr) as f64))
                }
                8 => {
                    let arr: [u8; 8] = raw[..].try_into().map_err(|_| {
                        GrammarError::Other("float64 needs 8 bytes".into())
                    })?;
                    Ok(Value::Float(f64::from_be_bytes(arr)))
                }
                w => Err(GrammarError::Other(format!("unsupported float width {}", w))),
            },
            kind => {
                let unsigned = raw.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128);
                Ok(Value::Int(if kind == NumberKind::Signed {
                    sign_extend(unsigned, self.bits())
                } else {
                    unsigned as i128
                }))
            }
        }
    }

    fn build(&self, value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut raw = match self.kind {
            NumberKind::Float => {
                let f = match value {
                    Value::Float(f) => *f,
                    other => expect_int(other)? as f64,
                };
                match self.width {
                    4 => (f as f32).to_be_bytes().to_vec(),
                    8 => f.to_be_bytes().to_vec(),
                    w => return Err(GrammarError::Other(format!("unsupported float width {}", w))),
                }
            }
            kind => {
                let v = expect_int(value)?;
                check_range(v, self.bits(), kind == NumberKind::Signed)?;
                let bytes = v.to_be_bytes();
                bytes[16 - self.width..].to_vec()
            }
        };
        if self.endian == Endian::Little {
            raw.reverse();
        }
        sink.write_bytes(&raw);
        Ok(match self.kind {
            NumberKind::Float => Value::Float(match value {
                Value::Float(f) => *f,
                other => expect_int(other)? as f64,
            }),
            _ => Value::Int(expect_int(value)?),
        })
    }

    fn type_name(&self) -> String {
        let endian = match self.endian {
            Endian::Big => "b",
            Endian::Little => "l",
        };
        match self.kind {
            NumberKind::Float => format!("Float{}{}", self.bits(), endian),
            NumberKind::Signed => format!("Int{}s{}", self.bits(), endian),
            NumberKind::Unsigned => format!("Int{}u{}", self.bits(), endian),
        }
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Integer of an arbitrary number of bits; only valid inside a bitwise
/// stream.
#[derive(Debug, Clone)]
pub struct BitsInteger {
    pub bits: usize,
    pub signed: bool,
}

impl Construct for BitsInteger {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = stream.read_bits(self.bits)?;
        Ok(Value::Int(if self.signed {
            sign_extend(raw, self.bits)
        } else {
            raw as i128
        }))
    }

    fn build(&self, value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let v = expect_int(value)?;
        check_range(v, self.bits, self.signed)?;
        let mask = if self.bits >= 128 {
            u128::MAX
        } else {
            (1u128 << self.bits) - 1
        };
        sink.write_bits((v as u128) & mask, self.bits)?;
        Ok(Value::Int(v))
    }

    fn type_name(&self) -> String {
        format!("BitsInteger({})", self.bits)
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Boolean stored as one byte (or one bit inside a bitwise stream).
#[derive(Debug, Clone)]
pub struct Flag;

impl Construct for Flag {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        if stream.is_bits() {
            Ok(Value::Bool(stream.read_bits(1)? != 0))
        } else {
            Ok(Value::Bool(stream.read_bytes(1)?[0] != 0))
        }
    }

    fn build(&self, value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let b = value.truthy();
        if sink.is_bits() {
            sink.write_bits(b as u128, 1)?;
        } else {
            sink.write_bytes(&[b as u8]);
        }
        Ok(Value::Bool(b))
    }

    fn type_name(&self) -> String {
        "Flag".into()
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Byte blob whose length is given by an expression.
#[derive(Debug, Clone)]
pub struct Bytes {
    pub length: Expr,
}

impl Construct for Bytes {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let n = self.length.eval_usize(&ctx.scope)?;
        Ok(Value::Bytes(stream.read_bytes(n)?))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let data = value.as_bytes().ok_or_else(|| GrammarError::Type {
            expected: "bytes",
            found: value.kind_name().to_string(),
        })?;
        let n = self.length.eval_usize(&ctx.scope)?;
        if data.len() != n {
            return Err(GrammarError::Range(format!(
                "expected {} bytes, got {}",
                n,
                data.len()
            )));
        }
        sink.write_bytes(data);
        Ok(Value::Bytes(data.to_vec()))
    }

    fn type_name(&self) -> String {
        match self.length.as_const() {
            Some(n) => format!("Bytes({})", n),
            None => "Bytes".into(),
        }
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Byte blob spanning the rest of the stream.
#[derive(Debug, Clone)]
pub struct GreedyBytes;

impl Construct for GreedyBytes {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(Value::Bytes(stream.read_rest()?))
    }

    fn build(&self, value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        let data = value.as_bytes().ok_or_else(|| GrammarError::Type {
            expected: "bytes",
            found: value.kind_name().to_string(),
        })?;
        sink.write_bytes(data);
        Ok(Value::Bytes(data.to_vec()))
    }

    fn type_name(&self) -> String {
        "GreedyBytes".into()
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Integer with symbolic names for some of its values.
#[derive(Debug, Clone)]
pub struct Enum {
    pub subcon: ConstructRef,
    pub mapping: Vec<(String, i128)>,
}

impl Enum {
    pub fn label_of(&self, value: i128) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    pub fn value_of(&self, label: &str) -> Option<i128> {
        self.mapping.iter().find(|(n, _)| n == label).map(|(_, v)| *v)
    }
}

impl Construct for Enum {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = expect_int(&self.subcon.parse(stream, ctx)?)?;
        Ok(Value::Enum(EnumValue {
            value: raw,
            label: self.label_of(raw).map(String::from),
        }))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = match value {
            Value::Str(label) => self
                .value_of(label)
                .ok_or_else(|| GrammarError::Range(format!("unknown enum label '{}'", label)))?,
            other => expect_int(other)?,
        };
        self.subcon.build(&Value::Int(raw), sink, ctx)?;
        Ok(Value::Enum(EnumValue {
            value: raw,
            label: self.label_of(raw).map(String::from),
        }))
    }

    fn type_name(&self) -> String {
        format!("Enum({})", self.subcon.type_name())
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Integer interpreted as a set of named bit flags.
#[derive(Debug, Clone)]
pub struct FlagsEnum {
    pub subcon: ConstructRef,
    pub flags: Vec<(String, i128)>,
}

impl FlagsEnum {
    fn names_set(&self, value: i128) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(_, bit)| *bit != 0 && value & *bit == *bit)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

impl Construct for FlagsEnum {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = expect_int(&self.subcon.parse(stream, ctx)?)?;
        Ok(Value::Flags(FlagsValue {
            value: raw,
            set: self.names_set(raw),
        }))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = match value {
            Value::List(names) => {
                let mut acc = 0i128;
                for n in names {
                    let label = match n {
                        Value::Str(s) => s.as_str(),
                        other => {
                            return Err(GrammarError::Type {
                                expected: "str",
                                found: other.kind_name().to_string(),
                            });
                        }
                    };
                    let bit = self
                        .flags
                        .iter()
                        .find(|(name, _)| name == label)
                        .map(|(_, bit)| *bit)
                        .ok_or_else(|| GrammarError::Range(format!("unknown flag '{}'", label)))?;
                    acc |= bit;
                }
                acc
            }
            other => expect_int(other)?,
        };
        self.subcon.build(&Value::Int(raw), sink, ctx)?;
        Ok(Value::Flags(FlagsValue {
            value: raw,
            set: self.names_set(raw),
        }))
    }

    fn type_name(&self) -> String {
        format!("FlagsEnum({})", self.subcon.type_name())
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Unix timestamp (seconds) stored in an integer field.
#[derive(Debug, Clone)]
pub struct Timestamp {
    pub subcon: ConstructRef,
}

impl Construct for Timestamp {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = expect_int(&self.subcon.parse(stream, ctx)?)?;
        let secs = i64::try_from(raw)
            .map_err(|_| GrammarError::Range(format!("timestamp {} out of range", raw)))?;
        Ok(Value::Timestamp(secs))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = expect_int(value)?;
        self.subcon.build(&Value::Int(raw), sink, ctx)?;
        Ok(Value::Timestamp(raw as i64))
    }

    fn type_name(&self) -> String {
        format!("Timestamp({})", self.subcon.type_name())
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Current stream position; consumes nothing.
#[derive(Debug, Clone)]
pub struct Tell;

impl Construct for Tell {
    fn parse(&self, stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(Value::from(stream.tell()))
    }

    fn build(&self, _value: &Value, sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(Value::from(sink.tell()))
    }

    fn type_name(&self) -> String {
        "Tell".into()
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Value computed from the context; consumes and writes nothing.
#[derive(Debug, Clone)]
pub struct Computed {
    pub expr: Expr,
}

impl Construct for Computed {
    fn parse(&self, _stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.expr.eval(&ctx.scope)
    }

    fn build(&self, _value: &Value, _sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.expr.eval(&ctx.scope)
    }

    fn type_name(&self) -> String {
        "Computed".into()
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Does nothing; parses to `None`.
#[derive(Debug, Clone)]
pub struct Pass;

impl Construct for Pass {
    fn parse(&self, _stream: &mut Stream, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(Value::None)
    }

    fn build(&self, _value: &Value, _sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(Value::None)
    }

    fn type_name(&self) -> String {
        "Pass".into()
    }

    fn family(&self) -> Family {
        Family::Leaf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
