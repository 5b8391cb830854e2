//! # Command history
//!
//! Reversible edits and a bounded undo/redo history.
//!
//! ## Design
//!
//! - The history is one ordered list plus a cursor pointing at the last
//!   executed command (`None` when nothing is executed).
//! - Submitting executes the command first; a command that fails to execute
//!   is not recorded.
//! - Submitting after one or more undos discards every command after the
//!   cursor before appending (branch truncation).
//! - When the bound is exceeded the oldest command is dropped.
//! - A failing `execute`/`undo` during redo/undo leaves the cursor where it
//!   was.
//! - `commit` marks the cursor whose effects the last confirmed document
//!   reflects. When a later conversion is rejected after the fact,
//!   `rollback_uncommitted` returns to that mark: commands submitted since
//!   are dropped and undone or redone commands get their old position back.
use tracing::debug;

use crate::error::EditorError;
use crate::grammar::Value;
use crate::orchestrator::Orchestrator;
use crate::path::Path;

/// A reversible operation on a target of type `T`.
pub trait Command<T>: Send {
    fn name(&self) -> &str;

    fn can_undo(&self) -> bool {
        true
    }

    fn execute(&mut self, target: &mut T) -> Result<(), EditorError>;

    fn undo(&mut self, target: &mut T) -> Result<(), EditorError>;
}

/// Bounded command history with a cursor.
pub struct CommandHistory<T> {
    commands: Vec<Box<dyn Command<T>>>,
    cursor: Option<usize>,
    limit: usize,
    committed: Option<usize>,
    // index of the first command submitted after the last commit
    pending: Option<usize>,
    // a submit truncated commands the committed state depends on
    committed_lost: bool,
}

impl<T> std::fmt::Debug for CommandHistory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHistory")
            .field("commands", &self.names())
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("committed", &self.committed)
            .finish()
    }
}

impl<T> CommandHistory<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            commands: Vec::new(),
            cursor: None,
            limit: limit.max(1),
            committed: None,
            pending: None,
            committed_lost: false,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the bound, dropping the oldest commands if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.commands.len() > self.limit {
            self.drop_oldest();
        }
    }

    /// Execute `cmd` and record it.
    pub fn submit(&mut self, mut cmd: Box<dyn Command<T>>, target: &mut T) -> Result<(), EditorError> {
        cmd.execute(target)?;
        let keep = self.cursor.map_or(0, |c| c + 1);
        if self.committed.is_some_and(|k| k >= keep) {
            self.committed_lost = true;
        }
        self.commands.truncate(keep);
        if self.commands.len() + 1 > self.limit {
            self.drop_oldest();
        }
        debug!(command = cmd.name(), "submit");
        self.commands.push(cmd);
        let index = self.commands.len() - 1;
        self.cursor = Some(index);
        self.pending = Some(self.pending.map_or(index, |p| p.min(index)));
        Ok(())
    }

    fn drop_oldest(&mut self) {
        if self.commands.is_empty() {
            return;
        }
        self.commands.remove(0);
        let shift = |index: Option<usize>| match index {
            Some(0) | None => None,
            Some(c) => Some(c - 1),
        };
        self.cursor = shift(self.cursor);
        self.committed = shift(self.committed);
        self.pending = self.pending.map(|p| p.saturating_sub(1));
    }

    /// Undo the command at the cursor. Returns `Ok(false)` when there is
    /// nothing undoable.
    pub fn undo(&mut self, target: &mut T) -> Result<bool, EditorError> {
        let Some(c) = self.cursor else {
            return Ok(false);
        };
        let cmd = &mut self.commands[c];
        if !cmd.can_undo() {
            return Ok(false);
        }
        cmd.undo(target)?;
        debug!(command = cmd.name(), "undo");
        self.cursor = c.checked_sub(1);
        Ok(true)
    }

    /// Re-execute the command after the cursor. Returns `Ok(false)` when
    /// there is none.
    pub fn redo(&mut self, target: &mut T) -> Result<bool, EditorError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        let Some(cmd) = self.commands.get_mut(next) else {
            return Ok(false);
        };
        cmd.execute(target)?;
        debug!(command = cmd.name(), "redo");
        self.cursor = Some(next);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor
            .and_then(|c| self.commands.get(c))
            .is_some_and(|cmd| cmd.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.map_or(0, |c| c + 1) < self.commands.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = None;
        self.committed = None;
        self.pending = None;
        self.committed_lost = false;
    }

    /// Mark the current cursor as reflected by the target.
    pub fn commit(&mut self) {
        self.committed = self.cursor;
        self.pending = None;
        self.committed_lost = false;
    }

    /// Return to the last commit without running any command. Commands
    /// submitted since then are removed and returned; the cursor goes back
    /// to the committed position. If a submit already discarded commands
    /// the committed state relies on, the whole history is cleared.
    pub fn rollback_uncommitted(&mut self) -> Vec<Box<dyn Command<T>>> {
        if self.committed_lost {
            debug!(len = self.commands.len(), "committed commands lost, clearing history");
            let removed = std::mem::take(&mut self.commands);
            self.clear();
            return removed;
        }
        let removed = match self.pending.take() {
            Some(p) if p < self.commands.len() => self.commands.drain(p..).collect(),
            _ => Vec::new(),
        };
        // commands submitted since the commit all sit after it
        self.cursor = self.committed;
        removed
    }
}

/// Replace the value at `path` and re-serialize.
#[derive(Debug)]
pub struct SetValueCommand {
    name: String,
    path: Path,
    new_value: Value,
    old_value: Option<Value>,
}

impl SetValueCommand {
    pub fn new(path: Path, new_value: Value) -> Self {
        let name = if path.is_root() {
            "set <root>".to_string()
        } else {
            format!("set {}", path)
        };
        Self {
            name,
            path,
            new_value,
            old_value: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Command<Orchestrator> for SetValueCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, target: &mut Orchestrator) -> Result<(), EditorError> {
        let old = target.replace_value(&self.path, self.new_value.clone())?;
        if let Err(e) = target.rebuild() {
            target.replace_value(&self.path, old)?;
            return Err(e);
        }
        self.old_value = Some(old);
        Ok(())
    }

    fn undo(&mut self, target: &mut Orchestrator) -> Result<(), EditorError> {
        let old = self.old_value.clone().ok_or_else(|| EditorError::CommandFailed {
            name: self.name.clone(),
            message: "nothing to undo".into(),
        })?;
        let current = target.replace_value(&self.path, old)?;
        if let Err(e) = target.rebuild() {
            target.replace_value(&self.path, current)?;
            return Err(e);
        }
        Ok(())
    }
}
