//! Grammar instrumentation.
//!
//! [`Preprocessor::instrument`] rewrites a grammar so that every node which
//! produces a standalone value is wrapped in a [`WithMetadata`] decorator.
//! Parsing through the decorator records a [`GuiMetadata`] for the value in
//! the context's metadata table; building through it is a pure
//! pass-through.
//!
//! What gets decorated is decided per node type by an [`InstrumentPolicy`].
//! The registry is closed-world: a node type without a policy makes
//! instrumentation fail with [`EditorError::GrammarUnsupported`].
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::{EditorError, GrammarError};
use crate::grammar::{
    Aligned, Array, BitsInteger, Bitwise, Bytes, Checksum, Compressed, Computed, Const,
    Construct, ConstructRef, Context, Defaulted, Enum, FixedSized, Flag, FlagsEnum, FocusedSeq,
    FormatField, GreedyBytes, GreedyRange, IfThenElse, NullStripped, NullTerminated, Optional,
    Padded, Pass, Peek, Pointer, Prefixed, Rebuild, Renamed, Select, Sink, Stream, Struct,
    Switch, Tell, Timestamp, Transformed, Value, downcast,
};
use crate::meta::GuiMetadata;

/// Provenance-capturing decorator around a grammar node.
#[derive(Debug)]
pub struct WithMetadata {
    pub inner: ConstructRef,
    /// Whether the wrapped node runs inside a bit-addressed stream.
    pub bit_mode: bool,
}

impl Construct for WithMetadata {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        ctx.cancel.check()?;
        let start = stream.tell();
        let mark = ctx.metadata.mark();
        let value = match self.inner.parse(stream, ctx) {
            Ok(value) => value,
            Err(e) => {
                ctx.metadata.rollback(mark);
                return Err(e);
            }
        };
        let end = stream.tell().max(start);
        let path = ctx.path.normalized();
        let child_metadata = ctx.metadata.recorded_since(mark, &path);
        let meta = GuiMetadata {
            byte_range: (start, end),
            construct: self.inner.clone(),
            context: ctx.snapshot(),
            stream: stream.source().clone(),
            bit_mode: self.bit_mode,
            child_metadata,
        };
        ctx.metadata.record(path, meta);
        Ok(value)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.inner.build(value, sink, ctx)
    }

    fn type_name(&self) -> String {
        self.inner.type_name()
    }

    fn family(&self) -> crate::grammar::Family {
        self.inner.family()
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.inner.clone()]
    }

    fn docs(&self) -> &str {
        self.inner.docs()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How the preprocessor treats one node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentPolicy {
    /// Decorate the node itself; it has no sub-nodes to visit.
    Leaf,
    /// Instrument the single child, then decorate the copy.
    Wrapper,
    /// Like `Wrapper`, but the child runs in a bit-addressed stream.
    BitWrapper,
    /// Instrument every child independently, then decorate the copy.
    Multi,
    /// Instrument the child; the rename itself is not decorated.
    Rename,
}

/// Registry of instrumentation policies, keyed by node type.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    policies: HashMap<TypeId, (InstrumentPolicy, &'static str)>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    /// A preprocessor that knows every node in [`crate::grammar`].
    pub fn new() -> Self {
        let mut p = Self {
            policies: HashMap::new(),
        };
        use InstrumentPolicy::*;

        p.register::<FormatField>(Leaf);
        p.register::<BitsInteger>(Leaf);
        p.register::<Flag>(Leaf);
        p.register::<Bytes>(Leaf);
        p.register::<GreedyBytes>(Leaf);
        p.register::<Enum>(Leaf);
        p.register::<FlagsEnum>(Leaf);
        p.register::<Timestamp>(Leaf);
        p.register::<Tell>(Leaf);
        p.register::<Computed>(Leaf);
        p.register::<Pass>(Leaf);

        p.register::<Padded>(Wrapper);
        p.register::<Aligned>(Wrapper);
        p.register::<Pointer>(Wrapper);
        p.register::<Peek>(Wrapper);
        p.register::<Optional>(Wrapper);
        p.register::<Rebuild>(Wrapper);
        p.register::<Defaulted>(Wrapper);
        p.register::<Const>(Wrapper);
        p.register::<FixedSized>(Wrapper);
        p.register::<Prefixed>(Wrapper);
        p.register::<Compressed>(Wrapper);
        p.register::<NullTerminated>(Wrapper);
        p.register::<NullStripped>(Wrapper);
        p.register::<Transformed>(Wrapper);
        p.register::<Array>(Wrapper);
        p.register::<GreedyRange>(Wrapper);
        p.register::<Bitwise>(BitWrapper);

        p.register::<Struct>(Multi);
        p.register::<FocusedSeq>(Multi);
        p.register::<Select>(Multi);
        p.register::<IfThenElse>(Multi);
        p.register::<Switch>(Multi);
        p.register::<Checksum>(Multi);

        p.register::<Renamed>(Rename);
        p
    }

    /// Register (or override) the policy for node type `T`.
    pub fn register<T: Construct>(&mut self, policy: InstrumentPolicy) {
        self.policies
            .insert(TypeId::of::<T>(), (policy, std::any::type_name::<T>()));
    }

    pub fn policy_of(&self, node: &ConstructRef) -> Option<InstrumentPolicy> {
        self.policies
            .get(&node.as_any().type_id())
            .map(|(policy, _)| *policy)
    }

    /// Return an instrumented copy of `node`. The input grammar is not
    /// modified. Already instrumented nodes are returned unchanged.
    pub fn instrument(&self, node: &ConstructRef, bit_mode: bool) -> Result<ConstructRef, EditorError> {
        if downcast::<WithMetadata>(node).is_some() {
            return Ok(node.clone());
        }
        let policy = self
            .policy_of(node)
            .ok_or_else(|| EditorError::GrammarUnsupported(node.type_name()))?;
        trace!(node = %node.type_name(), ?policy, bit_mode, "instrument");

        let decorate = |inner: ConstructRef| -> ConstructRef {
            Arc::new(WithMetadata { inner, bit_mode })
        };
        match policy {
            InstrumentPolicy::Leaf => Ok(decorate(node.clone())),
            InstrumentPolicy::Rename => self.copy_with_children(node, bit_mode),
            InstrumentPolicy::Wrapper | InstrumentPolicy::Multi => {
                Ok(decorate(self.copy_with_children(node, bit_mode)?))
            }
            InstrumentPolicy::BitWrapper => Ok(decorate(self.copy_with_children(node, true)?)),
        }
    }

    fn copy_with_children(&self, node: &ConstructRef, bit_mode: bool) -> Result<ConstructRef, EditorError> {
        let children = node
            .subcons()
            .iter()
            .map(|c| self.instrument(c, bit_mode))
            .collect::<Result<Vec<_>, _>>()?;
        node.with_subcons(children)
            .map_err(|e| EditorError::GrammarUnsupported(format!("{}: {}", node.type_name(), e)))
    }
}
