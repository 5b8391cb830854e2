//! Single-child nodes: renaming, framing, indirection, tunnels and
//! repetition.
//!
//! Framing nodes (`Padded`, `FixedSized`, `Prefixed`, `NullTerminated`,
//! `NullStripped`) read through a window of the stream they were given, so
//! offsets recorded below them stay absolute within the same physical
//! buffer. `Pointer` and `Peek` read the same data without consuming it and
//! do so under a stream alias, keeping their child's ranges out of the
//! enclosing record. Tunnel nodes (`Compressed`, `Transformed`, `Bitwise`)
//! hand their child a brand new physical buffer.
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::GrammarError;
use crate::grammar::construct::only_subcon;
use crate::grammar::stream::{pack_bits, unpack_bits};
use crate::grammar::{
    Construct, ConstructRef, Context, Expr, Family, Sink, Stream, Value,
};
use crate::path::PathSegment;

/// Attaches a field name (and optional docs) to a node.
#[derive(Debug, Clone)]
pub struct Renamed {
    pub name: String,
    pub docs: String,
    pub subcon: ConstructRef,
}

impl Construct for Renamed {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.subcon.build(value, sink, ctx)
    }

    fn type_name(&self) -> String {
        self.subcon.type_name()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Renamed {
            subcon: only_subcon("Renamed", subcons)?,
            ..self.clone()
        }))
    }

    fn docs(&self) -> &str {
        &self.docs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Occupies exactly `length` units, zero-filling whatever the child leaves.
#[derive(Debug, Clone)]
pub struct Padded {
    pub length: usize,
    pub subcon: ConstructRef,
}

impl Construct for Padded {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let start = stream.tell();
        let value = self.subcon.parse(stream, ctx)?;
        let used = stream.tell() - start;
        if used > self.length {
            return Err(GrammarError::Framing(format!(
                "child read {} units, more than the padded length {}",
                used, self.length
            )));
        }
        stream.skip(self.length - used)?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let start = sink.tell();
        let built = self.subcon.build(value, sink, ctx)?;
        let used = sink.tell() - start;
        if used > self.length {
            return Err(GrammarError::Framing(format!(
                "child wrote {} units, more than the padded length {}",
                used, self.length
            )));
        }
        sink.pad(self.length - used);
        Ok(built)
    }

    fn type_name(&self) -> String {
        format!("Padded({})", self.length)
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Padded {
            length: self.length,
            subcon: only_subcon("Padded", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pads after the child up to the next multiple of `modulus`.
#[derive(Debug, Clone)]
pub struct Aligned {
    pub modulus: usize,
    pub subcon: ConstructRef,
}

impl Aligned {
    fn padding(&self, used: usize) -> usize {
        if self.modulus == 0 {
            0
        } else {
            (self.modulus - used % self.modulus) % self.modulus
        }
    }
}

impl Construct for Aligned {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let start = stream.tell();
        let value = self.subcon.parse(stream, ctx)?;
        stream.skip(self.padding(stream.tell() - start))?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let start = sink.tell();
        let built = self.subcon.build(value, sink, ctx)?;
        sink.pad(self.padding(sink.tell() - start));
        Ok(built)
    }

    fn type_name(&self) -> String {
        format!("Aligned({})", self.modulus)
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Aligned {
            modulus: self.modulus,
            subcon: only_subcon("Aligned", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parses the child at an absolute offset of the same buffer and leaves the
/// outer cursor where it was. The child sees a `"pointer"` stream.
#[derive(Debug, Clone)]
pub struct Pointer {
    pub offset: Expr,
    pub subcon: ConstructRef,
}

impl Construct for Pointer {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let offset = self.offset.eval_usize(&ctx.scope)?;
        let mut target = stream.detached_at("pointer", offset)?;
        self.subcon.parse(&mut target, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let offset = self.offset.eval_usize(&ctx.scope)?;
        let mut tmp = sink.sibling();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        sink.write_at(offset, tmp.as_slice());
        Ok(built)
    }

    fn type_name(&self) -> String {
        "Pointer".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Pointer {
            offset: self.offset.clone(),
            subcon: only_subcon("Pointer", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parses the child without consuming input; builds nothing.
#[derive(Debug, Clone)]
pub struct Peek {
    pub subcon: ConstructRef,
}

impl Construct for Peek {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut lookahead = stream.aliased("peek");
        self.subcon.parse(&mut lookahead, ctx)
    }

    fn build(&self, value: &Value, _sink: &mut Sink, _ctx: &mut Context) -> Result<Value, GrammarError> {
        Ok(value.clone())
    }

    fn type_name(&self) -> String {
        "Peek".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Peek {
            subcon: only_subcon("Peek", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parses the child if it can, `None` otherwise.
#[derive(Debug, Clone)]
pub struct Optional {
    pub subcon: ConstructRef,
}

impl Construct for Optional {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut attempt = stream.clone();
        match self.subcon.parse(&mut attempt, ctx) {
            Ok(value) => {
                *stream = attempt;
                Ok(value)
            }
            Err(GrammarError::Cancelled) => Err(GrammarError::Cancelled),
            Err(_) => Ok(Value::None),
        }
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        if value.is_none() {
            return Ok(Value::None);
        }
        let mut tmp = sink.sibling();
        match self.subcon.build(value, &mut tmp, ctx) {
            Ok(built) => {
                sink.write_raw(tmp.as_slice());
                Ok(built)
            }
            Err(_) => Ok(Value::None),
        }
    }

    fn type_name(&self) -> String {
        "Optional".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Optional {
            subcon: only_subcon("Optional", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Ignores the supplied value on build and writes `func` evaluated against
/// the context instead.
#[derive(Debug, Clone)]
pub struct Rebuild {
    pub func: Expr,
    pub subcon: ConstructRef,
}

impl Construct for Rebuild {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, _value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let value = self.func.eval(&ctx.scope)?;
        self.subcon.build(&value, sink, ctx)
    }

    fn type_name(&self) -> String {
        "Rebuild".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Rebuild {
            func: self.func.clone(),
            subcon: only_subcon("Rebuild", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds `value` when the supplied value is `None`.
#[derive(Debug, Clone)]
pub struct Defaulted {
    pub value: Value,
    pub subcon: ConstructRef,
}

impl Construct for Defaulted {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        if value.is_none() {
            self.subcon.build(&self.value, sink, ctx)
        } else {
            self.subcon.build(value, sink, ctx)
        }
    }

    fn type_name(&self) -> String {
        "Default".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Defaulted {
            value: self.value.clone(),
            subcon: only_subcon("Default", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A field that must always hold `value`.
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
    pub subcon: ConstructRef,
}

impl Construct for Const {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let found = self.subcon.parse(stream, ctx)?;
        if found != self.value {
            return Err(GrammarError::Const {
                expected: self.value.to_string(),
                found: found.to_string(),
            });
        }
        Ok(found)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        if !value.is_none() && *value != self.value {
            return Err(GrammarError::Const {
                expected: self.value.to_string(),
                found: value.to_string(),
            });
        }
        self.subcon.build(&self.value, sink, ctx)
    }

    fn type_name(&self) -> String {
        format!("Const({})", self.value)
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Const {
            value: self.value.clone(),
            subcon: only_subcon("Const", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Restricts the child to a window of `length` units and consumes the whole
/// window.
#[derive(Debug, Clone)]
pub struct FixedSized {
    pub length: Expr,
    pub subcon: ConstructRef,
}

impl Construct for FixedSized {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let length = self.length.eval_usize(&ctx.scope)?;
        let mut window = stream.window(length)?;
        let value = self.subcon.parse(&mut window, ctx)?;
        stream.skip(length)?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let length = self.length.eval_usize(&ctx.scope)?;
        let mut tmp = sink.sibling();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        if tmp.tell() > length {
            return Err(GrammarError::Framing(format!(
                "child wrote {} units into a window of {}",
                tmp.tell(),
                length
            )));
        }
        let written = tmp.tell();
        sink.write_raw(tmp.as_slice());
        sink.pad(length - written);
        Ok(built)
    }

    fn type_name(&self) -> String {
        "FixedSized".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(FixedSized {
            length: self.length.clone(),
            subcon: only_subcon("FixedSized", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Length-prefixed region: `length_field` holds the size of the window the
/// child is parsed from. The length field is bookkeeping, not a navigable
/// sub-node.
#[derive(Debug, Clone)]
pub struct Prefixed {
    pub length_field: ConstructRef,
    pub subcon: ConstructRef,
}

impl Construct for Prefixed {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let raw = self.length_field.parse(stream, ctx)?;
        let length = raw
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| GrammarError::Range(format!("invalid prefix length {}", raw)))?;
        let mut window = stream.window(length)?;
        let value = self.subcon.parse(&mut window, ctx)?;
        stream.skip(length)?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut tmp = sink.sibling();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        self.length_field
            .build(&Value::from(tmp.tell()), sink, ctx)?;
        sink.write_raw(tmp.as_slice());
        Ok(built)
    }

    fn type_name(&self) -> String {
        format!("Prefixed({})", self.length_field.type_name())
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Prefixed {
            length_field: self.length_field.clone(),
            subcon: only_subcon("Prefixed", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Zlib-compressed region spanning the rest of the current window. The
/// child is parsed from the decompressed buffer.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub subcon: ConstructRef,
}

impl Construct for Compressed {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let packed = stream.read_rest()?;
        let mut data = Vec::new();
        ZlibDecoder::new(packed.as_slice())
            .read_to_end(&mut data)
            .map_err(|e| GrammarError::Compression(e.to_string()))?;
        let mut inner = Stream::tunnel("compressed", data, false);
        self.subcon.parse(&mut inner, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut tmp = Sink::new();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(tmp.as_slice())
            .map_err(|e| GrammarError::Compression(e.to_string()))?;
        let packed = encoder
            .finish()
            .map_err(|e| GrammarError::Compression(e.to_string()))?;
        sink.write_bytes(&packed);
        Ok(built)
    }

    fn type_name(&self) -> String {
        "Compressed(zlib)".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Compressed {
            subcon: only_subcon("Compressed", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Region ending at the next zero byte; the terminator is consumed but not
/// part of the child's window.
#[derive(Debug, Clone)]
pub struct NullTerminated {
    pub subcon: ConstructRef,
}

impl Construct for NullTerminated {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let length = stream
            .peek_rest()
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| GrammarError::Framing("missing null terminator".into()))?;
        let mut window = stream.window(length)?;
        let value = self.subcon.parse(&mut window, ctx)?;
        stream.skip(length + 1)?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let built = self.subcon.build(value, sink, ctx)?;
        sink.write_raw(&[0]);
        Ok(built)
    }

    fn type_name(&self) -> String {
        "NullTerminated".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(NullTerminated {
            subcon: only_subcon("NullTerminated", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Consumes the rest of the window; the child sees it without trailing
/// zero bytes.
#[derive(Debug, Clone)]
pub struct NullStripped {
    pub subcon: ConstructRef,
}

impl Construct for NullStripped {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let rest = stream.peek_rest();
        let total = rest.len();
        let length = rest.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        let mut window = stream.window(length)?;
        let value = self.subcon.parse(&mut window, ctx)?;
        stream.skip(total)?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.subcon.build(value, sink, ctx)
    }

    fn type_name(&self) -> String {
        "NullStripped".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(NullStripped {
            subcon: only_subcon("NullStripped", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Codec = dyn Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync;

/// Arbitrary byte transform. The child is parsed from the decoded buffer.
#[derive(Clone)]
pub struct Transformed {
    pub decode: Arc<Codec>,
    pub encode: Arc<Codec>,
    /// Encoded size; `None` takes the rest of the window.
    pub size: Option<Expr>,
    pub subcon: ConstructRef,
}

impl fmt::Debug for Transformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformed")
            .field("size", &self.size)
            .field("subcon", &self.subcon)
            .finish()
    }
}

impl Construct for Transformed {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let encoded = match &self.size {
            Some(size) => {
                let n = size.eval_usize(&ctx.scope)?;
                stream.read_bytes(n)?
            }
            None => stream.read_rest()?,
        };
        let decoded = (self.decode)(&encoded).map_err(GrammarError::Transform)?;
        let mut inner = Stream::tunnel("transformed", decoded, false);
        self.subcon.parse(&mut inner, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut tmp = Sink::new();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        let encoded = (self.encode)(tmp.as_slice()).map_err(GrammarError::Transform)?;
        if let Some(size) = &self.size {
            let n = size.eval_usize(&ctx.scope)?;
            if encoded.len() != n {
                return Err(GrammarError::Transform(format!(
                    "encoded {} bytes, expected {}",
                    encoded.len(),
                    n
                )));
            }
        }
        sink.write_bytes(&encoded);
        Ok(built)
    }

    fn type_name(&self) -> String {
        "Transformed".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Transformed {
            subcon: only_subcon("Transformed", subcons)?,
            ..self.clone()
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Switches the child into bit addressing. The bytes of the current window
/// are unpacked into a new bit-addressed buffer; the outer cursor advances
/// by the number of whole bytes the child touched.
#[derive(Debug, Clone)]
pub struct Bitwise {
    pub subcon: ConstructRef,
}

impl Construct for Bitwise {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let bits = unpack_bits(stream.peek_rest());
        let mut inner = Stream::tunnel("bitwise", bits, true);
        let value = self.subcon.parse(&mut inner, ctx)?;
        stream.skip(inner.tell().div_ceil(8))?;
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut tmp = Sink::bits();
        let built = self.subcon.build(value, &mut tmp, ctx)?;
        let mut bits = tmp.into_inner();
        bits.resize(bits.len().div_ceil(8) * 8, 0);
        sink.write_bytes(&pack_bits(&bits)?);
        Ok(built)
    }

    fn type_name(&self) -> String {
        "Bitwise".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Bitwise {
            subcon: only_subcon("Bitwise", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `count` repetitions of the element node.
#[derive(Debug, Clone)]
pub struct Array {
    pub count: Expr,
    pub subcon: ConstructRef,
}

impl Construct for Array {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let count = self.count.eval_usize(&ctx.scope)?;
        let mut items = Vec::with_capacity(count.min(4096));
        for i in 0..count {
            ctx.cancel.check()?;
            let item = ctx.nested(PathSegment::Index(i), |ctx| self.subcon.parse(stream, ctx))?;
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let items = value.as_list().ok_or_else(|| GrammarError::Type {
            expected: "list",
            found: value.kind_name().to_string(),
        })?;
        let count = self.count.eval_usize(&ctx.scope)?;
        if items.len() != count {
            return Err(GrammarError::Range(format!(
                "expected {} elements, got {}",
                count,
                items.len()
            )));
        }
        let mut built = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            ctx.cancel.check()?;
            built.push(ctx.nested(PathSegment::Index(i), |ctx| {
                self.subcon.build(item, sink, ctx)
            })?);
        }
        Ok(Value::List(built))
    }

    fn type_name(&self) -> String {
        match self.count.as_const() {
            Some(n) => format!("Array[{}]", n),
            None => "Array".into(),
        }
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(Array {
            count: self.count.clone(),
            subcon: only_subcon("Array", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// As many repetitions of the element node as parse successfully.
#[derive(Debug, Clone)]
pub struct GreedyRange {
    pub subcon: ConstructRef,
}

impl Construct for GreedyRange {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let mut items = Vec::new();
        while stream.remaining() > 0 {
            ctx.cancel.check()?;
            let mut attempt = stream.clone();
            let i = items.len();
            match ctx.nested(PathSegment::Index(i), |ctx| self.subcon.parse(&mut attempt, ctx)) {
                Ok(item) => {
                    let progressed = attempt.tell() > stream.tell();
                    *stream = attempt;
                    items.push(item);
                    if !progressed {
                        break;
                    }
                }
                Err(GrammarError::Cancelled) => return Err(GrammarError::Cancelled),
                Err(_) => break,
            }
        }
        Ok(Value::List(items))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let items = value.as_list().ok_or_else(|| GrammarError::Type {
            expected: "list",
            found: value.kind_name().to_string(),
        })?;
        let mut built = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            built.push(ctx.nested(PathSegment::Index(i), |ctx| {
                self.subcon.build(item, sink, ctx)
            })?);
        }
        Ok(Value::List(built))
    }

    fn type_name(&self) -> String {
        "GreedyRange".into()
    }

    fn family(&self) -> Family {
        Family::Subconstruct
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        Ok(Arc::new(GreedyRange {
            subcon: only_subcon("GreedyRange", subcons)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
