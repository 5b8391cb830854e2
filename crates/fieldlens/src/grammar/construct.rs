//! The grammar node interface.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::GrammarError;
use crate::grammar::{Context, Sink, Stream, Value};

/// Shared handle to a grammar node. Node identity is pointer identity.
pub type ConstructRef = Arc<dyn Construct>;

/// Coarse classification of a node, the Rust stand-in for the base class a
/// node derives from. The entry factory uses it for its fallback rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Produces a standalone value with no sub-nodes worth navigating.
    Leaf,
    /// Wraps exactly one sub-node.
    Subconstruct,
    /// Combines several sub-nodes.
    Compound,
    /// Anything else.
    Other,
}

/// A typed, composable unit of a binary-format description.
pub trait Construct: fmt::Debug + Send + Sync + 'static {
    /// Read a value from `stream`.
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError>;

    /// Write `value` into `sink`, returning the value actually written
    /// (which differs from `value` for rebuilt, defaulted or constant nodes).
    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context)
    -> Result<Value, GrammarError>;

    /// Repr-style label, e.g. `Int16ub` or `Array`.
    fn type_name(&self) -> String;

    fn family(&self) -> Family {
        Family::Other
    }

    /// Navigable sub-nodes, in declaration order.
    fn subcons(&self) -> Vec<ConstructRef> {
        Vec::new()
    }

    /// A copy of this node with its sub-nodes replaced (same order and
    /// count as `subcons`).
    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        let _ = subcons;
        Err(GrammarError::Other(format!(
            "{} has no replaceable sub-nodes",
            self.type_name()
        )))
    }

    fn docs(&self) -> &str {
        ""
    }

    fn as_any(&self) -> &dyn Any;
}

/// Whether two handles are the same grammar node.
pub fn same_node(a: &ConstructRef, b: &ConstructRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Stable key for a node instance (its address).
pub fn node_key(c: &ConstructRef) -> usize {
    Arc::as_ptr(c) as *const () as usize
}

/// Downcast a node to its concrete type.
pub fn downcast<T: Construct>(c: &ConstructRef) -> Option<&T> {
    c.as_any().downcast_ref::<T>()
}

/// Take the only element of `subcons` for single-child `with_subcons`.
pub(crate) fn only_subcon(
    owner: &str,
    subcons: Vec<ConstructRef>,
) -> Result<ConstructRef, GrammarError> {
    let mut it = subcons.into_iter();
    match (it.next(), it.next()) {
        (Some(one), None) => Ok(one),
        _ => Err(GrammarError::Other(format!(
            "{} takes exactly one sub-node",
            owner
        ))),
    }
}

/// Parse `bytes` from the start with a fresh context.
pub fn parse_bytes(construct: &ConstructRef, bytes: &[u8]) -> Result<Value, GrammarError> {
    let mut stream = Stream::root(bytes.to_vec());
    let mut ctx = Context::new();
    construct.parse(&mut stream, &mut ctx)
}

/// Build `value` into a fresh byte buffer.
pub fn build_bytes(construct: &ConstructRef, value: &Value) -> Result<Vec<u8>, GrammarError> {
    let mut sink = Sink::new();
    let mut ctx = Context::new();
    construct.build(value, &mut sink, &mut ctx)?;
    Ok(sink.into_inner())
}
