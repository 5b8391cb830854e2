//! Provenance side table.
//!
//! Every value produced by an instrumented grammar gets a [`GuiMetadata`]
//! record: the byte range it was read from, the node that produced it, the
//! evaluation scope visible at that point, and the physical stream it came
//! from. Records are kept in a [`MetadataTable`] keyed by the value's
//! normalized [`Path`]; values themselves stay plain data.
//!
//! Several decorated nodes can produce the value at one path (a wrapper and
//! the node it wraps, a conditional and its active branch). The outermost
//! record is the one stored in the table; the records of the inner nodes
//! hang off it through `child_metadata`, so no provenance is lost.
use std::collections::HashMap;
use std::sync::Arc;

use crate::grammar::{ConstructRef, Scope, StreamRef, same_node};
use crate::path::Path;

/// Provenance of one parsed value.
#[derive(Debug, Clone)]
pub struct GuiMetadata {
    /// Half-open range consumed in `stream`, in the stream's own units
    /// (bits for bit-addressed streams).
    pub byte_range: (usize, usize),
    /// The grammar node that produced the value.
    pub construct: ConstructRef,
    /// Scope visible to the node right after it parsed.
    pub context: Arc<Scope>,
    pub stream: StreamRef,
    pub bit_mode: bool,
    /// Record of the inner node at the same path, if any.
    pub child_metadata: Option<Arc<GuiMetadata>>,
}

impl GuiMetadata {
    /// This record and every nested record, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &GuiMetadata> {
        std::iter::successors(Some(self), |m| m.child_metadata.as_deref())
    }

    /// The record in the chain produced by `construct`.
    pub fn produced_by(&self, construct: &ConstructRef) -> Option<&GuiMetadata> {
        self.chain().find(|m| same_node(&m.construct, construct))
    }

    /// The deepest record of the chain.
    pub fn innermost(&self) -> &GuiMetadata {
        self.chain().last().unwrap_or(self)
    }

    pub fn len(&self) -> usize {
        self.byte_range.1 - self.byte_range.0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Side table of provenance records keyed by normalized path.
///
/// Writes are journaled so that a failed attempt (an option of a selection,
/// an optional field, the last element of a greedy range) can be rolled
/// back without leaving stale records behind.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<Path, Arc<GuiMetadata>>,
    journal: Vec<(Path, Option<Arc<GuiMetadata>>)>,
}

/// Position in the journal, see [`MetadataTable::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> Mark {
        Mark(self.journal.len())
    }

    /// Undo every write made since `mark`.
    pub fn rollback(&mut self, mark: Mark) {
        while self.journal.len() > mark.0 {
            let Some((path, previous)) = self.journal.pop() else {
                break;
            };
            match previous {
                Some(meta) => {
                    self.entries.insert(path, meta);
                }
                None => {
                    self.entries.remove(&path);
                }
            }
        }
    }

    pub fn record(&mut self, path: Path, meta: GuiMetadata) -> Arc<GuiMetadata> {
        let meta = Arc::new(meta);
        let previous = self.entries.insert(path.clone(), meta.clone());
        self.journal.push((path, previous));
        meta
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<GuiMetadata>> {
        self.entries.get(&path.normalized())
    }

    /// The record at `path` if it was written after `mark`.
    pub fn recorded_since(&self, mark: Mark, path: &Path) -> Option<Arc<GuiMetadata>> {
        self.journal
            .get(mark.0..)?
            .iter()
            .any(|(p, _)| p == path)
            .then(|| self.entries.get(path).cloned())
            .flatten()
    }

    /// Drop the journal once a parse has completed.
    pub fn seal(&mut self) {
        self.journal.clear();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.journal.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Arc<GuiMetadata>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Stream, int8ub};
    use crate::path::PathSegment;

    fn meta(range: (usize, usize)) -> GuiMetadata {
        GuiMetadata {
            byte_range: range,
            construct: int8ub(),
            context: Arc::new(Scope::new()),
            stream: Stream::root(vec![0u8; 4]).source().clone(),
            bit_mode: false,
            child_metadata: None,
        }
    }

    #[test]
    fn rollback_restores_previous_records() {
        let a: Path = [PathSegment::Name("a".into())].into_iter().collect();
        let mut table = MetadataTable::new();
        table.record(a.clone(), meta((0, 1)));
        let mark = table.mark();
        table.record(a.clone(), meta((1, 2)));
        table.record(Path::root(), meta((0, 4)));
        assert!(table.recorded_since(mark, &a).is_some());

        table.rollback(mark);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&a).unwrap().byte_range, (0, 1));
        assert!(table.recorded_since(mark, &a).is_none());
    }

    #[test]
    fn chain_walks_nested_records() {
        let inner = meta((1, 2));
        let producer = inner.construct.clone();
        let outer = GuiMetadata {
            child_metadata: Some(Arc::new(inner)),
            ..meta((0, 4))
        };
        assert_eq!(outer.chain().count(), 2);
        assert_eq!(outer.innermost().byte_range, (1, 2));
        assert_eq!(outer.produced_by(&producer).unwrap().byte_range, (1, 2));
    }
}
