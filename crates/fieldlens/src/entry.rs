//! # Entry tree
//!
//! View-capable mirror of a grammar. Every grammar node the view should
//! know about becomes an [`Entry`] in an arena ([`EntryTree`]); entries refer
//! to their parent by [`EntryId`] only, so the tree has no ownership cycles.
//!
//! Entries never hold values. Whatever an entry displays is looked up on
//! demand from the current [`Document`](crate::orchestrator::Document): the
//! value through the entry's [`Path`](crate::path::Path), the provenance
//! through the metadata side table. This is what lets the same tree survive
//! an edit/reparse cycle: runtime-dependent shape (active branch of a
//! conditional, switch or selection, element count of an array) is resolved
//! again on every query.
//!
//! ## Variants
//!
//! - `Struct`: one fixed child per declared field.
//! - `Array`: children materialized on demand. Element entries are kept
//!   once created; a shorter array shows a prefix of them and a longer one
//!   only allocates the missing tail.
//! - `IfThenElse` / `Switch`: both (all) branches are built up front; the
//!   active one is picked by re-evaluating the condition or key against the
//!   scope captured in the metadata.
//! - `Select`: the active option is the one whose node produced the stored
//!   value, read back from the nested provenance records.
//! - `FocusedSeq`: the focused member is picked by its selector; without a
//!   value the members are listed structurally.
//! - `Wrapper` / `Checksum`: transparent, every display property comes from
//!   the single child.
//! - `Leaf` / `Generic` / `Custom`: no children.
//!
//! Entry kinds are created by an [`EntryRegistry`], which is also the
//! extension point for custom grammar nodes.
use std::fmt;
use std::sync::Arc;

use crate::grammar::{ConstructRef, Expr, Value};
use crate::path::PathSegment;
use crate::settings::IntegerFormat;

mod display;
mod factory;
mod tree;

pub use display::format_value;
pub use factory::{
    EntryCtor, EntryRegistry, array_entry, checksum_entry, focused_seq_entry, if_then_else_entry,
    leaf_entry, select_entry, struct_entry, switch_entry, wrapper_entry,
};
pub use tree::EntryTree;

/// Index of an entry in its [`EntryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Whether a transparent wrapper lets edits through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperRole {
    Transparent,
    /// The wrapped value is recomputed or fixed on build.
    ReadOnly,
}

/// Variant-specific state of an entry.
#[derive(Clone)]
pub enum EntryKind {
    /// Placeholder while the entry's children are being created.
    Pending,
    Struct {
        fields: Vec<EntryId>,
    },
    Array {
        element: ConstructRef,
        static_count: Option<usize>,
        /// Every element entry created so far, by index.
        cached: Vec<EntryId>,
    },
    IfThenElse {
        cond: Expr,
        then_entry: EntryId,
        else_entry: EntryId,
    },
    Switch {
        key: Expr,
        cases: Vec<(Value, EntryId)>,
        default: Option<EntryId>,
    },
    Select {
        options: Vec<EntryId>,
    },
    FocusedSeq {
        selector: Expr,
        members: Vec<EntryId>,
    },
    Wrapper {
        role: WrapperRole,
        child: EntryId,
    },
    Checksum {
        field: EntryId,
    },
    Leaf,
    /// Fallback for node kinds without a dedicated variant.
    Generic,
    Custom(Arc<dyn EntryBehavior>),
}

impl EntryKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::Pending => "Pending",
            EntryKind::Struct { .. } => "Struct",
            EntryKind::Array { .. } => "Array",
            EntryKind::IfThenElse { .. } => "IfThenElse",
            EntryKind::Switch { .. } => "Switch",
            EntryKind::Select { .. } => "Select",
            EntryKind::FocusedSeq { .. } => "FocusedSeq",
            EntryKind::Wrapper { .. } => "Wrapper",
            EntryKind::Checksum { .. } => "Checksum",
            EntryKind::Leaf => "Leaf",
            EntryKind::Generic => "Generic",
            EntryKind::Custom(_) => "Custom",
        }
    }
}

impl fmt::Debug for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One node of the view tree.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) parent: Option<EntryId>,
    pub(crate) construct: ConstructRef,
    pub(crate) name: String,
    pub(crate) docs: String,
    /// Step from the parent's path; `None` for the root.
    pub(crate) segment: Option<PathSegment>,
    pub(crate) kind: EntryKind,
    pub(crate) visible_row: bool,
    pub(crate) expanded: bool,
    pub(crate) list_view: bool,
}

impl Entry {
    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    /// The (instrumented) grammar node this entry mirrors.
    pub fn construct(&self) -> &ConstructRef {
        &self.construct
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn docs(&self) -> &str {
        &self.docs
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// Names that are empty or start with `_` are hidden when
    /// "hide protected" is on.
    pub fn is_protected(&self) -> bool {
        self.name.is_empty() || self.name.starts_with('_')
    }

    pub fn is_visible_row(&self) -> bool {
        self.visible_row
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_list_view(&self) -> bool {
        self.list_view
    }
}

/// What kind of input editing an entry accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Integer,
    Float,
    Bool,
    Bytes,
    Text,
    Enum { labels: Vec<(String, i128)> },
    Flags { flags: Vec<(String, i128)> },
    Timestamp,
    Container,
    ReadOnly,
}

impl ValueKind {
    pub fn is_editable(&self) -> bool {
        !matches!(self, ValueKind::Container | ValueKind::ReadOnly)
    }
}

/// Context menu actions contributed by entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ToggleListView,
    ToggleIntegerFormat,
    ExpandAll,
    CollapseAll,
    CopyPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub action: MenuAction,
    /// `Some` for checkable items.
    pub checked: Option<bool>,
}

impl MenuItem {
    pub fn new(label: &str, action: MenuAction) -> Self {
        Self {
            label: label.to_string(),
            action,
            checked: None,
        }
    }

    pub fn checkable(label: &str, action: MenuAction, checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Self::new(label, action)
        }
    }
}

/// Display behavior for custom grammar nodes registered with
/// [`EntryKind::Custom`].
pub trait EntryBehavior: fmt::Debug + Send + Sync {
    fn type_label(&self, construct: &ConstructRef, _value: Option<&Value>) -> String {
        construct.type_name()
    }

    fn obj_str(&self, value: Option<&Value>, format: IntegerFormat) -> String {
        value.map(|v| format_value(v, format)).unwrap_or_default()
    }

    fn value_kind(&self, _value: Option<&Value>) -> ValueKind {
        ValueKind::ReadOnly
    }
}
