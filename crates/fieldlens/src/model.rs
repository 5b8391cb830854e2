//! # Navigation model
//!
//! [`Editor`] is what a view talks to. It owns the orchestrator (and with
//! it the authoritative bytes and value), the entry tree and the command
//! history, and exposes the tree the way a table/tree widget consumes it:
//! `children_of`, `parent_of`, `value_at`, `set_value`.
//!
//! All value mutation goes through [`SetValueCommand`] so that undo and
//! redo stay consistent with the bytes.
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::command::{CommandHistory, SetValueCommand};
use crate::entry::{EntryId, EntryRegistry, EntryTree, MenuAction, MenuItem, ValueKind};
use crate::error::EditorError;
use crate::grammar::{ConstructRef, Value};
use crate::meta::GuiMetadata;
use crate::orchestrator::{ConvertError, ConvertEvent, Document, Orchestrator};
use crate::path::Path;
use crate::preprocess::Preprocessor;
use crate::provenance::{StreamRecord, stream_chain};
use crate::settings::{ConvertMode, EditorSettings, IntegerFormat};

/// Columns every row has: name, type label, value.
pub const BASE_COLUMNS: usize = 3;

/// Content of one table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    /// Rendered by the view from the entry's display properties.
    Entry(EntryId),
    Empty,
}

#[derive(Debug)]
pub struct Editor {
    settings: EditorSettings,
    preprocessor: Preprocessor,
    registry: Arc<EntryRegistry>,
    orchestrator: Orchestrator,
    history: CommandHistory<Orchestrator>,
    tree: Option<EntryTree>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorSettings::default())
    }
}

impl Editor {
    pub fn new(settings: EditorSettings) -> Self {
        Self::with_extensions(settings, Preprocessor::new(), EntryRegistry::new())
    }

    /// An editor with its own instrumentation policies and entry
    /// constructors, e.g. for custom grammar nodes.
    pub fn with_extensions(
        settings: EditorSettings,
        preprocessor: Preprocessor,
        registry: EntryRegistry,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(settings.convert_mode),
            history: CommandHistory::new(settings.history_size),
            settings,
            preprocessor,
            registry: Arc::new(registry),
            tree: None,
        }
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Takes effect on the next `set_grammar`.
    pub fn preprocessor_mut(&mut self) -> &mut Preprocessor {
        &mut self.preprocessor
    }

    /// Takes effect on the next `set_grammar` or `load_bytes`.
    pub fn registry_mut(&mut self) -> &mut EntryRegistry {
        Arc::make_mut(&mut self.registry)
    }

    /// Instrument `grammar`, mirror it into a fresh entry tree and parse
    /// the current bytes with it, if there are any.
    pub fn set_grammar(&mut self, grammar: &ConstructRef) -> Result<(), EditorError> {
        let instrumented = self.preprocessor.instrument(grammar, false)?;
        let tree = EntryTree::new(&instrumented, self.registry.clone())?;
        debug!(grammar = %grammar.type_name(), entries = tree.len(), "grammar set");
        self.orchestrator.set_grammar(instrumented);
        self.tree = Some(tree);
        self.history.clear();
        if self.orchestrator.bytes().is_empty() {
            return Ok(());
        }
        let result = self.orchestrator.parse();
        self.poll();
        result
    }

    /// Replace the byte buffer with externally supplied data. History is
    /// cleared and the tree rebuilt.
    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<(), EditorError> {
        self.history.clear();
        if let Some(grammar) = self.orchestrator.grammar().cloned() {
            self.tree = Some(EntryTree::new(&grammar, self.registry.clone())?);
        }
        let result = match self.orchestrator.load(bytes) {
            Err(EditorError::NoGrammar) => Ok(()),
            other => other,
        };
        self.poll();
        result
    }

    fn handle(&mut self, events: &[ConvertEvent]) {
        for event in events {
            match event {
                ConvertEvent::Parsed if !self.orchestrator.is_converting() => {
                    self.history.commit();
                }
                ConvertEvent::ParseFailed(_) => self.history.clear(),
                ConvertEvent::BuildFailed(e) => {
                    // the value went back to the last commit, so must the history
                    for rejected in self.history.rollback_uncommitted() {
                        debug!(command = rejected.name(), error = %e, "edit rejected");
                    }
                }
                _ => {}
            }
        }
    }

    /// Apply finished background work. Call regularly from the UI loop.
    pub fn poll(&mut self) -> Vec<ConvertEvent> {
        let events = self.orchestrator.poll();
        self.handle(&events);
        events
    }

    /// Block up to `timeout` for background work, then `poll`.
    pub fn wait(&mut self, timeout: Duration) -> Vec<ConvertEvent> {
        let events = self.orchestrator.wait(timeout);
        self.handle(&events);
        events
    }

    pub fn document(&self) -> &Document {
        self.orchestrator.document()
    }

    pub fn bytes(&self) -> &[u8] {
        self.orchestrator.bytes()
    }

    pub fn value(&self) -> Option<&Value> {
        self.orchestrator.value()
    }

    pub fn error_state(&self) -> Option<&ConvertError> {
        self.orchestrator.error()
    }

    pub fn is_converting(&self) -> bool {
        self.orchestrator.is_converting()
    }

    pub fn tree(&self) -> Option<&EntryTree> {
        self.tree.as_ref()
    }

    pub fn root(&self) -> Option<EntryId> {
        self.tree.as_ref().map(EntryTree::root)
    }

    fn view(&self) -> Option<(&EntryTree, &Document)> {
        let doc = self.orchestrator.document();
        self.tree.as_ref().map(|tree| (tree, doc))
    }

    fn view_mut(&mut self) -> Option<(&mut EntryTree, &Document)> {
        let doc = self.orchestrator.document();
        self.tree.as_mut().map(|tree| (tree, doc))
    }

    /// Rows below `parent`; `None` asks for the root row.
    pub fn children_of(&mut self, parent: Option<EntryId>) -> Vec<EntryId> {
        let hide = self.settings.hide_protected;
        let Some((tree, doc)) = self.view_mut() else {
            return Vec::new();
        };
        let children = match parent {
            None => vec![tree.root()],
            Some(id) => tree
                .subentries(id, doc)
                .into_iter()
                .filter(|c| !(hide && tree.entry(*c).is_protected()))
                .collect(),
        };
        for c in &children {
            tree.set_visible_row(*c, true);
        }
        children
    }

    /// Nearest ancestor that is shown as a row.
    pub fn parent_of(&self, id: EntryId) -> Option<EntryId> {
        let tree = self.tree.as_ref()?;
        let mut cur = tree.parent_of(id);
        while let Some(p) = cur {
            if tree.entry(p).is_visible_row() {
                return Some(p);
            }
            cur = tree.parent_of(p);
        }
        None
    }

    pub fn is_container(&self, id: EntryId) -> bool {
        self.view()
            .is_some_and(|(tree, doc)| tree.is_container(id, doc))
    }

    pub fn name(&self, id: EntryId) -> String {
        self.tree
            .as_ref()
            .map(|t| t.entry(id).name().to_string())
            .unwrap_or_default()
    }

    pub fn docs(&self, id: EntryId) -> String {
        self.tree
            .as_ref()
            .map(|t| t.entry(id).docs().to_string())
            .unwrap_or_default()
    }

    pub fn path(&self, id: EntryId) -> Path {
        self.view()
            .map(|(tree, doc)| tree.path(id, doc))
            .unwrap_or_default()
    }

    pub fn obj(&self, id: EntryId) -> Option<&Value> {
        let (tree, doc) = self.view()?;
        tree.obj(id, doc)
    }

    pub fn metadata(&self, id: EntryId) -> Option<&GuiMetadata> {
        let (tree, doc) = self.view()?;
        tree.metadata_for(id, doc)
    }

    pub fn active_child(&self, id: EntryId) -> Option<EntryId> {
        let (tree, doc) = self.view()?;
        tree.active_child(id, doc)
    }

    pub fn type_label(&self, id: EntryId) -> String {
        self.view()
            .map(|(tree, doc)| tree.type_label(id, doc))
            .unwrap_or_default()
    }

    pub fn obj_str(&self, id: EntryId) -> String {
        let format = self.settings.integer_format;
        self.view()
            .map(|(tree, doc)| tree.obj_str(id, doc, format))
            .unwrap_or_default()
    }

    pub fn value_kind(&self, id: EntryId) -> ValueKind {
        self.view()
            .map(|(tree, doc)| tree.value_kind(id, doc))
            .unwrap_or(ValueKind::ReadOnly)
    }

    pub fn menu_items(&self, id: EntryId) -> Vec<MenuItem> {
        let format = self.settings.integer_format;
        self.view()
            .map(|(tree, doc)| tree.menu_items(id, doc, format))
            .unwrap_or_default()
    }

    fn in_list_view(&self, id: EntryId) -> bool {
        match (self.parent_of(id), self.tree.as_ref()) {
            (Some(p), Some(tree)) => tree.entry(p).is_list_view(),
            _ => false,
        }
    }

    /// Cell content for the table view. Columns past [`BASE_COLUMNS`] only
    /// exist for rows whose parent is in list view.
    pub fn value_at(&mut self, id: EntryId, column: usize) -> Cell {
        match column {
            0 => Cell::Text(self.name(id)),
            1 => Cell::Text(self.type_label(id)),
            2 => Cell::Entry(id),
            _ => {
                if !self.in_list_view(id) {
                    return Cell::Empty;
                }
                let Some((tree, doc)) = self.view_mut() else {
                    return Cell::Empty;
                };
                tree.flatten(id, doc)
                    .get(column - BASE_COLUMNS)
                    .map_or(Cell::Empty, |e| Cell::Entry(*e))
            }
        }
    }

    /// Header names of the extra list-view columns of `container`, taken
    /// from its first row.
    pub fn list_columns(&mut self, container: EntryId) -> Vec<String> {
        let Some(first) = self.children_of(Some(container)).first().copied() else {
            return Vec::new();
        };
        let Some((tree, doc)) = self.view_mut() else {
            return Vec::new();
        };
        tree.flatten(first, doc)
            .into_iter()
            .map(|e| tree.entry(e).name().to_string())
            .collect()
    }

    /// Replace the entry's value through the history and re-serialize.
    /// Setting the value it already has does nothing.
    pub fn set_value(&mut self, id: EntryId, value: Value) -> Result<(), EditorError> {
        if self.value_kind(id) == ValueKind::ReadOnly {
            return Err(EditorError::InvalidInput {
                kind: "read-only",
                message: format!("'{}' cannot be edited", self.path(id)),
            });
        }
        let path = self.path(id);
        self.set_value_at(&path, value)
    }

    /// Parse `text` according to the entry's value kind and set it.
    pub fn set_value_str(&mut self, id: EntryId, text: &str) -> Result<(), EditorError> {
        let value = self.value_kind(id).parse_input(text)?;
        self.set_value(id, value)
    }

    /// Replace the value at `path` through the history.
    pub fn set_value_at(&mut self, path: &Path, value: Value) -> Result<(), EditorError> {
        let root = self.orchestrator.value().ok_or(EditorError::NoValue)?;
        if path.resolve(root)? == &value {
            return Ok(());
        }
        let cmd = SetValueCommand::new(path.clone(), value);
        let result = self.history.submit(Box::new(cmd), &mut self.orchestrator);
        self.poll();
        result
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let result = self.history.undo(&mut self.orchestrator);
        self.poll();
        result
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let result = self.history.redo(&mut self.orchestrator);
        self.poll();
        result
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Names of the recorded commands, oldest first.
    pub fn history_names(&self) -> Vec<String> {
        self.history.names().into_iter().map(String::from).collect()
    }

    pub fn history_cursor(&self) -> Option<usize> {
        self.history.cursor()
    }

    /// Physical streams the entry's value was read through, starting from
    /// the entry that provides the row's display.
    pub fn stream_chain(&self, id: EntryId) -> Vec<StreamRecord> {
        self.view()
            .map(|(tree, doc)| stream_chain(tree, tree.resolve(id, doc), doc))
            .unwrap_or_default()
    }

    /// Run a context menu action. `CopyPath` returns the text to copy.
    pub fn invoke_menu(&mut self, id: EntryId, action: MenuAction) -> Result<Option<String>, EditorError> {
        match action {
            MenuAction::ToggleListView => {
                let tree = self.tree.as_mut().ok_or(EditorError::NoGrammar)?;
                let on = !tree.entry(id).is_list_view();
                tree.set_list_view(id, on);
            }
            MenuAction::ToggleIntegerFormat => {
                self.settings.integer_format = self.settings.integer_format.toggled();
            }
            MenuAction::ExpandAll => {
                let (tree, doc) = self.view_mut().ok_or(EditorError::NoGrammar)?;
                tree.expand_all(id, doc);
            }
            MenuAction::CollapseAll => {
                let (tree, doc) = self.view_mut().ok_or(EditorError::NoGrammar)?;
                tree.collapse_all(id, doc);
            }
            MenuAction::CopyPath => return Ok(Some(self.path(id).to_string())),
        }
        Ok(None)
    }

    pub fn set_hide_protected(&mut self, hide: bool) {
        self.settings.hide_protected = hide;
    }

    pub fn set_integer_format(&mut self, format: IntegerFormat) {
        self.settings.integer_format = format;
    }

    pub fn set_history_size(&mut self, size: usize) {
        self.settings.history_size = size.max(1);
        self.history.set_limit(size);
    }

    pub fn set_convert_mode(&mut self, mode: ConvertMode) {
        self.settings.convert_mode = mode;
        self.orchestrator.set_mode(mode);
    }
}
