use std::sync::Arc;

use tracing::{trace, warn};

use crate::entry::{
    Entry, EntryId, EntryKind, EntryRegistry, MenuAction, MenuItem, ValueKind, WrapperRole,
    format_value,
};
use crate::error::EditorError;
use crate::grammar::{
    Computed, ConstructRef, Enum, Expr, FlagsEnum, FocusedSeq, FormatField, NumberKind, Renamed,
    Tell, Timestamp, Value, downcast, same_node,
};
use crate::meta::GuiMetadata;
use crate::orchestrator::Document;
use crate::path::{Path, PathSegment};
use crate::preprocess::WithMetadata;
use crate::settings::IntegerFormat;

/// Arena of entries mirroring one (instrumented) grammar.
#[derive(Debug, Clone)]
pub struct EntryTree {
    entries: Vec<Entry>,
    root: EntryId,
    registry: Arc<EntryRegistry>,
}

impl EntryTree {
    /// Mirror `grammar` into a new tree. Fails when a node kind has no
    /// entry constructor and no usable fallback.
    pub fn new(grammar: &ConstructRef, registry: Arc<EntryRegistry>) -> Result<Self, EditorError> {
        let mut tree = Self {
            entries: Vec::new(),
            root: EntryId(0),
            registry,
        };
        tree.root = tree.create_entry(None, grammar, "", None, "")?;
        Ok(tree)
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    /// Panics if `id` does not belong to this tree.
    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    /// Number of allocated entries, including stale array elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parent_of(&self, id: EntryId) -> Option<EntryId> {
        self.entries[id.0].parent
    }

    /// Allocate a child of `parent` for `node`. Used by entry constructors.
    pub fn create_child(
        &mut self,
        parent: EntryId,
        node: &ConstructRef,
        name: &str,
        segment: PathSegment,
    ) -> Result<EntryId, EditorError> {
        self.create_entry(Some(parent), node, name, Some(segment), "")
    }

    fn create_entry(
        &mut self,
        parent: Option<EntryId>,
        node: &ConstructRef,
        name: &str,
        segment: Option<PathSegment>,
        docs: &str,
    ) -> Result<EntryId, EditorError> {
        if let Some(renamed) = downcast::<Renamed>(node) {
            let docs = if renamed.docs.is_empty() {
                docs
            } else {
                renamed.docs.as_str()
            };
            return self.create_entry(parent, &renamed.subcon, &renamed.name, segment, docs);
        }
        if let Some(decorated) = downcast::<WithMetadata>(node) {
            return self.create_entry(parent, &decorated.inner, name, segment, docs);
        }

        let docs = if docs.is_empty() { node.docs() } else { docs };
        let id = EntryId(self.entries.len());
        self.entries.push(Entry {
            parent,
            construct: node.clone(),
            name: name.to_string(),
            docs: docs.to_string(),
            segment,
            kind: EntryKind::Pending,
            visible_row: false,
            expanded: false,
            list_view: false,
        });
        let registry = self.registry.clone();
        let kind = match registry.lookup(node) {
            Some(ctor) => ctor(self, id, node)?,
            None => registry.fallback(self, id, node)?,
        };
        self.entries[id.0].kind = kind;
        Ok(id)
    }

    /// Path of the entry's value, recomputed against `doc` (the focused
    /// member of a `FocusedSeq` shares the sequence's path).
    pub fn path(&self, id: EntryId, doc: &Document) -> Path {
        let mut segments = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.entries[cur.0].parent {
            let segment = match &self.entries[parent.0].kind {
                EntryKind::FocusedSeq { .. } if self.active_child(parent, doc) == Some(cur) => {
                    PathSegment::Excluded
                }
                _ => self.entries[cur.0]
                    .segment
                    .clone()
                    .unwrap_or(PathSegment::Excluded),
            };
            segments.push(segment);
            cur = parent;
        }
        segments.into_iter().rev().collect()
    }

    /// Current value of the entry, or `None` when there is no value or the
    /// path no longer resolves.
    pub fn obj<'d>(&self, id: EntryId, doc: &'d Document) -> Option<&'d Value> {
        let root = doc.value.as_ref()?;
        self.path(id, doc).resolve(root).ok()
    }

    /// Provenance record of the entry's current value.
    ///
    /// Picks the record in the chain stored at the entry's path that was
    /// produced by the entry's own node. Branch entries of conditionals,
    /// switches and selections get no record when they are not the branch
    /// that produced the value.
    pub fn metadata_for<'d>(&self, id: EntryId, doc: &'d Document) -> Option<&'d GuiMetadata> {
        let record = doc.metadata.get(&self.path(id, doc))?;
        let entry = &self.entries[id.0];
        if let Some(own) = record.produced_by(&entry.construct) {
            return Some(own);
        }
        let branch = entry.parent.is_some_and(|p| {
            matches!(
                self.entries[p.0].kind,
                EntryKind::IfThenElse { .. } | EntryKind::Switch { .. } | EntryKind::Select { .. }
            )
        });
        if branch { None } else { Some(record.as_ref()) }
    }

    fn evaluate(&self, id: EntryId, doc: &Document, expr: &Expr) -> Option<Value> {
        match self.metadata_for(id, doc) {
            Some(meta) => expr.eval(&meta.context).ok(),
            None => expr.as_const().cloned(),
        }
    }

    /// The child currently standing in for a delegating entry.
    pub fn active_child(&self, id: EntryId, doc: &Document) -> Option<EntryId> {
        let entry = &self.entries[id.0];
        match &entry.kind {
            EntryKind::IfThenElse {
                cond,
                then_entry,
                else_entry,
            } => {
                let truthy = self.evaluate(id, doc, cond)?.truthy();
                Some(if truthy { *then_entry } else { *else_entry })
            }
            EntryKind::Switch {
                key,
                cases,
                default,
            } => {
                let key = self.evaluate(id, doc, key)?;
                cases
                    .iter()
                    .find(|(case, _)| key.matches_key(case))
                    .map(|(_, child)| *child)
                    .or(*default)
            }
            EntryKind::Select { options } => {
                let meta = self.metadata_for(id, doc)?;
                meta.chain().skip(1).find_map(|m| {
                    options
                        .iter()
                        .find(|o| same_node(&self.entries[o.0].construct, &m.construct))
                        .copied()
                })
            }
            EntryKind::FocusedSeq { selector, members } => {
                let key = self.evaluate(id, doc, selector)?;
                let seq = downcast::<FocusedSeq>(&entry.construct)?;
                members.get(seq.focus_of(&key)?).copied()
            }
            EntryKind::Wrapper { child, .. } => Some(*child),
            EntryKind::Checksum { field } => Some(*field),
            _ => None,
        }
    }

    fn delegates(&self, id: EntryId) -> bool {
        matches!(
            self.entries[id.0].kind,
            EntryKind::Wrapper { .. }
                | EntryKind::Checksum { .. }
                | EntryKind::IfThenElse { .. }
                | EntryKind::Switch { .. }
                | EntryKind::Select { .. }
                | EntryKind::FocusedSeq { .. }
        )
    }

    /// Follow delegation down to the entry that provides display
    /// properties. Stops at the first entry without an active child.
    pub fn resolve(&self, id: EntryId, doc: &Document) -> EntryId {
        let mut cur = id;
        while self.delegates(cur) {
            match self.active_child(cur, doc) {
                Some(next) => cur = next,
                None => break,
            }
        }
        cur
    }

    /// Children of the entry as shown in the tree.
    pub fn subentries(&mut self, id: EntryId, doc: &Document) -> Vec<EntryId> {
        let target = self.resolve(id, doc);
        if matches!(self.entries[target.0].kind, EntryKind::Array { .. }) {
            return self.materialize(target, doc);
        }
        match &self.entries[target.0].kind {
            EntryKind::Struct { fields } => fields.clone(),
            EntryKind::FocusedSeq { members, .. } => members.clone(),
            _ => Vec::new(),
        }
    }

    fn materialize(&mut self, id: EntryId, doc: &Document) -> Vec<EntryId> {
        let observed = self.obj(id, doc).and_then(Value::as_list).map(|items| items.len());
        let EntryKind::Array {
            element,
            static_count,
            cached,
        } = &self.entries[id.0].kind
        else {
            return Vec::new();
        };
        let count = observed.or(*static_count).unwrap_or(1);
        if count <= cached.len() {
            return cached[..count].to_vec();
        }

        let element = element.clone();
        let mut children = cached.clone();
        trace!(entry = id.0, from = children.len(), count, "materialize array elements");
        for i in children.len()..count {
            match self.create_child(id, &element, &i.to_string(), PathSegment::Index(i)) {
                Ok(child) => children.push(child),
                Err(e) => {
                    warn!(error = %e, "cannot create array element");
                    break;
                }
            }
        }
        if let EntryKind::Array { cached, .. } = &mut self.entries[id.0].kind {
            *cached = children.clone();
        }
        children
    }

    /// Whether the entry (after delegation) has navigable children.
    pub fn is_container(&self, id: EntryId, doc: &Document) -> bool {
        matches!(
            self.entries[self.resolve(id, doc).0].kind,
            EntryKind::Struct { .. } | EntryKind::Array { .. } | EntryKind::FocusedSeq { .. }
        )
    }

    pub fn type_label(&self, id: EntryId, doc: &Document) -> String {
        let target = self.resolve(id, doc);
        let entry = &self.entries[target.0];
        match &entry.kind {
            EntryKind::Custom(behavior) => behavior.type_label(&entry.construct, self.obj(target, doc)),
            _ => entry.construct.type_name(),
        }
    }

    pub fn obj_str(&self, id: EntryId, doc: &Document, format: IntegerFormat) -> String {
        let target = self.resolve(id, doc);
        let value = self.obj(target, doc);
        match &self.entries[target.0].kind {
            EntryKind::Custom(behavior) => behavior.obj_str(value, format),
            EntryKind::Struct { .. } | EntryKind::FocusedSeq { .. } => String::new(),
            _ => value.map(|v| format_value(v, format)).unwrap_or_default(),
        }
    }

    /// How the entry's value can be edited. A read-only wrapper anywhere on
    /// the delegation chain makes the whole chain read-only.
    pub fn value_kind(&self, id: EntryId, doc: &Document) -> ValueKind {
        let mut cur = id;
        while self.delegates(cur) {
            if let EntryKind::Wrapper {
                role: WrapperRole::ReadOnly,
                ..
            } = self.entries[cur.0].kind
            {
                return ValueKind::ReadOnly;
            }
            match self.active_child(cur, doc) {
                Some(next) => cur = next,
                None => return ValueKind::ReadOnly,
            }
        }

        let entry = &self.entries[cur.0];
        let value = self.obj(cur, doc);
        match &entry.kind {
            EntryKind::Custom(behavior) => behavior.value_kind(value),
            EntryKind::Struct { .. } | EntryKind::Array { .. } | EntryKind::FocusedSeq { .. } => {
                ValueKind::Container
            }
            EntryKind::Leaf | EntryKind::Generic => leaf_value_kind(&entry.construct, value),
            _ => ValueKind::ReadOnly,
        }
    }

    /// Context menu contributions of the entry (after delegation).
    pub fn menu_items(&self, id: EntryId, doc: &Document, format: IntegerFormat) -> Vec<MenuItem> {
        let mut items = Vec::new();
        if self.is_container(id, doc) {
            items.push(MenuItem::checkable(
                "List view",
                MenuAction::ToggleListView,
                self.entries[id.0].list_view,
            ));
            items.push(MenuItem::new("Expand all", MenuAction::ExpandAll));
            items.push(MenuItem::new("Collapse all", MenuAction::CollapseAll));
        }
        if self.value_kind(id, doc) == ValueKind::Integer
            || matches!(self.obj(id, doc), Some(Value::Int(_) | Value::Enum(_)))
        {
            items.push(MenuItem::checkable(
                "Hexadecimal",
                MenuAction::ToggleIntegerFormat,
                format == IntegerFormat::Hex,
            ));
        }
        items.push(MenuItem::new("Copy path", MenuAction::CopyPath));
        items
    }

    pub fn set_expanded(&mut self, id: EntryId, expanded: bool) {
        self.entries[id.0].expanded = expanded;
    }

    /// Expand the entry and every descendant, materializing arrays on the
    /// way.
    pub fn expand_all(&mut self, id: EntryId, doc: &Document) {
        self.set_expanded(id, true);
        for child in self.subentries(id, doc) {
            self.expand_all(child, doc);
        }
    }

    pub fn collapse_all(&mut self, id: EntryId, doc: &Document) {
        self.set_expanded(id, false);
        for child in self.subentries(id, doc) {
            self.collapse_all(child, doc);
        }
    }

    pub fn set_list_view(&mut self, id: EntryId, on: bool) {
        self.entries[id.0].list_view = on;
    }

    pub(crate) fn set_visible_row(&mut self, id: EntryId, visible: bool) {
        self.entries[id.0].visible_row = visible;
    }

    /// Non-structural descendants of the entry, depth first. Struct and
    /// array boundaries are expanded; leaves are collected.
    pub fn flatten(&mut self, id: EntryId, doc: &Document) -> Vec<EntryId> {
        let mut out = Vec::new();
        for child in self.subentries(id, doc) {
            self.collect_leaves(child, doc, &mut out);
        }
        out
    }

    fn collect_leaves(&mut self, id: EntryId, doc: &Document, out: &mut Vec<EntryId>) {
        if self.is_container(id, doc) {
            for child in self.subentries(id, doc) {
                self.collect_leaves(child, doc, out);
            }
        } else {
            out.push(id);
        }
    }
}

fn leaf_value_kind(construct: &ConstructRef, value: Option<&Value>) -> ValueKind {
    if let Some(e) = downcast::<Enum>(construct) {
        return ValueKind::Enum {
            labels: e.mapping.clone(),
        };
    }
    if let Some(f) = downcast::<FlagsEnum>(construct) {
        return ValueKind::Flags {
            flags: f.flags.clone(),
        };
    }
    if downcast::<Timestamp>(construct).is_some() {
        return ValueKind::Timestamp;
    }
    if downcast::<Tell>(construct).is_some() || downcast::<Computed>(construct).is_some() {
        return ValueKind::ReadOnly;
    }
    if let Some(field) = downcast::<FormatField>(construct) {
        return match field.kind {
            NumberKind::Float => ValueKind::Float,
            NumberKind::Signed | NumberKind::Unsigned => ValueKind::Integer,
        };
    }
    match value {
        Some(Value::Int(_)) => ValueKind::Integer,
        Some(Value::Float(_)) => ValueKind::Float,
        Some(Value::Bool(_)) => ValueKind::Bool,
        Some(Value::Bytes(_)) => ValueKind::Bytes,
        Some(Value::Str(_)) => ValueKind::Text,
        Some(Value::Timestamp(_)) => ValueKind::Timestamp,
        _ => ValueKind::ReadOnly,
    }
}
