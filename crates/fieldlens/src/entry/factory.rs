//! Entry factory: grammar node → entry variant.
//!
//! Dispatch order, first match wins:
//!
//! 1. `Renamed` is unwrapped; its name and docs are absorbed.
//! 2. The provenance decorator is unwrapped.
//! 3. Exact instance registrations, then exact type registrations.
//! 4. Structural registrations, in registration order.
//! 5. Fallback by node family: a single-child `Subconstruct` becomes a
//!    transparent wrapper, `Leaf` and `Compound` nodes a generic entry.
//!    Anything else is an unimplemented node kind.
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entry::{EntryId, EntryKind, EntryTree, WrapperRole};
use crate::error::EditorError;
use crate::grammar::{
    Array, BitsInteger, Bitwise, Bytes, Checksum, Compressed, Computed, Const, Construct,
    ConstructRef, Defaulted, Enum, Family, FixedSized, Flag, FlagsEnum, FocusedSeq, FormatField,
    GreedyBytes, GreedyRange, IfThenElse, NullStripped, NullTerminated, Optional, Padded, Pass,
    Peek, Pointer, Prefixed, Rebuild, Select, Struct, Switch, Tell, Timestamp, Transformed,
    Aligned, downcast, member_name, node_key,
};
use crate::path::PathSegment;

/// Builds the kind of a freshly allocated entry. Children are created
/// through the tree with the entry as their parent.
pub type EntryCtor =
    Arc<dyn Fn(&mut EntryTree, EntryId, &ConstructRef) -> Result<EntryKind, EditorError> + Send + Sync>;

type Predicate = Arc<dyn Fn(&ConstructRef) -> bool + Send + Sync>;

/// Ordered mapping from grammar node kinds to entry constructors.
#[derive(Clone)]
pub struct EntryRegistry {
    by_type: HashMap<TypeId, EntryCtor>,
    by_instance: HashMap<usize, (ConstructRef, EntryCtor)>,
    structural: Vec<(Predicate, EntryCtor)>,
}

impl fmt::Debug for EntryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRegistry")
            .field("types", &self.by_type.len())
            .field("instances", &self.by_instance.len())
            .field("structural", &self.structural.len())
            .finish()
    }
}

impl Default for EntryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ctor<F>(f: F) -> EntryCtor
where
    F: Fn(&mut EntryTree, EntryId, &ConstructRef) -> Result<EntryKind, EditorError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

impl EntryRegistry {
    /// A registry covering every node in [`crate::grammar`].
    pub fn new() -> Self {
        let mut r = Self::empty();

        for leaf in [
            TypeId::of::<FormatField>(),
            TypeId::of::<BitsInteger>(),
            TypeId::of::<Flag>(),
            TypeId::of::<Bytes>(),
            TypeId::of::<GreedyBytes>(),
            TypeId::of::<Enum>(),
            TypeId::of::<FlagsEnum>(),
            TypeId::of::<Timestamp>(),
            TypeId::of::<Tell>(),
            TypeId::of::<Computed>(),
            TypeId::of::<Pass>(),
        ] {
            r.by_type.insert(leaf, ctor(leaf_entry));
        }

        for transparent in [
            TypeId::of::<Padded>(),
            TypeId::of::<Aligned>(),
            TypeId::of::<Pointer>(),
            TypeId::of::<Peek>(),
            TypeId::of::<Optional>(),
            TypeId::of::<Defaulted>(),
            TypeId::of::<FixedSized>(),
            TypeId::of::<Prefixed>(),
            TypeId::of::<Compressed>(),
            TypeId::of::<NullTerminated>(),
            TypeId::of::<NullStripped>(),
            TypeId::of::<Transformed>(),
            TypeId::of::<Bitwise>(),
        ] {
            r.by_type.insert(transparent, ctor(wrapper_entry));
        }
        r.register_type::<Rebuild>(|tree, id, c| read_only_wrapper_entry(tree, id, c));
        r.register_type::<Const>(|tree, id, c| read_only_wrapper_entry(tree, id, c));

        r.register_type::<Array>(array_entry);
        r.register_type::<GreedyRange>(array_entry);
        r.register_type::<Struct>(struct_entry);
        r.register_type::<IfThenElse>(if_then_else_entry);
        r.register_type::<Switch>(switch_entry);
        r.register_type::<Select>(select_entry);
        r.register_type::<FocusedSeq>(focused_seq_entry);
        r.register_type::<Checksum>(checksum_entry);
        r
    }

    /// A registry with no registrations; only the family fallback applies.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            by_instance: HashMap::new(),
            structural: Vec::new(),
        }
    }

    /// Register (or replace) the constructor for node type `T`.
    pub fn register_type<T: Construct>(
        &mut self,
        f: impl Fn(&mut EntryTree, EntryId, &ConstructRef) -> Result<EntryKind, EditorError>
        + Send
        + Sync
        + 'static,
    ) {
        self.by_type.insert(TypeId::of::<T>(), ctor(f));
    }

    /// Register a constructor for one specific node instance.
    ///
    /// Instrumentation copies wrapper and multi-child nodes, so instance
    /// registrations only match leaves or nodes of grammars that are not
    /// instrumented.
    pub fn register_instance<F>(&mut self, node: &ConstructRef, f: F)
    where
        F: Fn(&mut EntryTree, EntryId, &ConstructRef) -> Result<EntryKind, EditorError>
            + Send
            + Sync
            + 'static,
    {
        self.by_instance
            .insert(node_key(node), (node.clone(), ctor(f)));
    }

    /// Register a constructor for every node matching `matches`. Structural
    /// registrations are tried in registration order after exact matches.
    pub fn register_structural<P, F>(&mut self, matches: P, f: F)
    where
        P: Fn(&ConstructRef) -> bool + Send + Sync + 'static,
        F: Fn(&mut EntryTree, EntryId, &ConstructRef) -> Result<EntryKind, EditorError>
            + Send
            + Sync
            + 'static,
    {
        self.structural.push((Arc::new(matches), ctor(f)));
    }

    pub(crate) fn lookup(&self, node: &ConstructRef) -> Option<EntryCtor> {
        if let Some((_, f)) = self.by_instance.get(&node_key(node)) {
            return Some(f.clone());
        }
        if let Some(f) = self.by_type.get(&node.as_any().type_id()) {
            return Some(f.clone());
        }
        self.structural
            .iter()
            .find(|(matches, _)| matches(node))
            .map(|(_, f)| f.clone())
    }

    pub(crate) fn fallback(
        &self,
        tree: &mut EntryTree,
        id: EntryId,
        node: &ConstructRef,
    ) -> Result<EntryKind, EditorError> {
        match node.family() {
            Family::Subconstruct if node.subcons().len() == 1 => wrapper_entry(tree, id, node),
            Family::Leaf | Family::Compound | Family::Subconstruct => Ok(EntryKind::Generic),
            Family::Other => Err(EditorError::UnimplementedNode(node.type_name())),
        }
    }
}

fn wrong_node(expected: &str, node: &ConstructRef) -> EditorError {
    EditorError::UnimplementedNode(format!("expected {}, got {}", expected, node.type_name()))
}

/// Entry without children.
pub fn leaf_entry(
    _tree: &mut EntryTree,
    _id: EntryId,
    _node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    Ok(EntryKind::Leaf)
}

/// Transparent entry delegating to the node's only sub-node.
pub fn wrapper_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let sub = node
        .subcons()
        .into_iter()
        .next()
        .ok_or_else(|| wrong_node("a single-child node", node))?;
    let name = tree.entry(id).name.clone();
    let child = tree.create_child(id, &sub, &name, PathSegment::Excluded)?;
    Ok(EntryKind::Wrapper {
        role: WrapperRole::Transparent,
        child,
    })
}

fn read_only_wrapper_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    match wrapper_entry(tree, id, node)? {
        EntryKind::Wrapper { child, .. } => Ok(EntryKind::Wrapper {
            role: WrapperRole::ReadOnly,
            child,
        }),
        other => Ok(other),
    }
}

/// One child per field. Unnamed fields get an empty name.
pub fn struct_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let mut fields = Vec::new();
    for (i, sc) in node.subcons().iter().enumerate() {
        let segment = match member_name(sc) {
            Some(name) => PathSegment::Name(name.to_string()),
            None => PathSegment::Index(i),
        };
        fields.push(tree.create_child(id, sc, "", segment)?);
    }
    Ok(EntryKind::Struct { fields })
}

/// Lazily materialized elements of an `Array` or `GreedyRange`.
pub fn array_entry(
    _tree: &mut EntryTree,
    _id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let element = node
        .subcons()
        .into_iter()
        .next()
        .ok_or_else(|| wrong_node("an array", node))?;
    let static_count = downcast::<Array>(node)
        .and_then(|a| a.count.as_const())
        .and_then(|v| v.as_int())
        .and_then(|n| usize::try_from(n).ok());
    Ok(EntryKind::Array {
        element,
        static_count,
        cached: Vec::new(),
    })
}

pub fn if_then_else_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let ite = downcast::<IfThenElse>(node).ok_or_else(|| wrong_node("IfThenElse", node))?;
    let name = tree.entry(id).name.clone();
    let then_entry = tree.create_child(id, &ite.then_subcon, &name, PathSegment::Excluded)?;
    let else_entry = tree.create_child(id, &ite.else_subcon, &name, PathSegment::Excluded)?;
    Ok(EntryKind::IfThenElse {
        cond: ite.cond.clone(),
        then_entry,
        else_entry,
    })
}

pub fn switch_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let sw = downcast::<Switch>(node).ok_or_else(|| wrong_node("Switch", node))?;
    let name = tree.entry(id).name.clone();
    let mut cases = Vec::with_capacity(sw.cases.len());
    for (key, sc) in &sw.cases {
        cases.push((key.clone(), tree.create_child(id, sc, &name, PathSegment::Excluded)?));
    }
    let default = match &sw.default {
        Some(sc) => Some(tree.create_child(id, sc, &name, PathSegment::Excluded)?),
        None => None,
    };
    Ok(EntryKind::Switch {
        key: sw.key.clone(),
        cases,
        default,
    })
}

pub fn select_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let name = tree.entry(id).name.clone();
    let mut options = Vec::new();
    for sc in node.subcons() {
        options.push(tree.create_child(id, &sc, &name, PathSegment::Excluded)?);
    }
    Ok(EntryKind::Select { options })
}

/// Members keep their own names; the focused one is addressed at the
/// sequence's path, the others below it.
pub fn focused_seq_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let seq = downcast::<FocusedSeq>(node).ok_or_else(|| wrong_node("FocusedSeq", node))?;
    let mut members = Vec::with_capacity(seq.subcons.len());
    for (i, sc) in seq.subcons.iter().enumerate() {
        let segment = match member_name(sc) {
            Some(name) => PathSegment::Name(name.to_string()),
            None => PathSegment::Index(i),
        };
        members.push(tree.create_child(id, sc, "", segment)?);
    }
    Ok(EntryKind::FocusedSeq {
        selector: seq.selector.clone(),
        members,
    })
}

pub fn checksum_entry(
    tree: &mut EntryTree,
    id: EntryId,
    node: &ConstructRef,
) -> Result<EntryKind, EditorError> {
    let ck = downcast::<Checksum>(node).ok_or_else(|| wrong_node("Checksum", node))?;
    let name = tree.entry(id).name.clone();
    let field = tree.create_child(id, &ck.field, &name, PathSegment::Excluded)?;
    Ok(EntryKind::Checksum { field })
}
