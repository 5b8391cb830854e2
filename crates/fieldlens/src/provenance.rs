//! Stream provenance: which bytes of which physical buffer an entry's
//! value was read from.
use crate::entry::{EntryId, EntryTree};
use crate::grammar::StreamRef;
use crate::orchestrator::Document;
use crate::path::Path;

/// One physical stream on the way from the root buffer to an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// Path of the outermost entry read from this stream.
    pub path: Path,
    /// Range of the innermost value read from this stream, in the stream's
    /// own units.
    pub byte_range: (usize, usize),
    pub stream: StreamRef,
    pub bit_mode: bool,
}

impl StreamRecord {
    /// Covering byte range; bit ranges are widened to whole bytes.
    pub fn byte_span(&self) -> (usize, usize) {
        let (start, end) = self.byte_range;
        if self.bit_mode {
            (start / 8, end.div_ceil(8))
        } else {
            (start, end)
        }
    }

    /// The recorded range of the stream's data.
    pub fn slice(&self) -> &[u8] {
        let data = self.stream.data();
        let end = self.byte_range.1.min(data.len());
        let start = self.byte_range.0.min(end);
        &data[start..end]
    }
}

/// Streams the entry's value passed through, root buffer first.
///
/// Walks from the entry up to the root and keeps one record per run of
/// entries read from the same stream: the range comes from the deepest
/// entry of the run, the path from the topmost one.
pub fn stream_chain(tree: &EntryTree, id: EntryId, doc: &Document) -> Vec<StreamRecord> {
    let mut chain: Vec<StreamRecord> = Vec::new();
    let mut cur = Some(id);
    while let Some(entry) = cur {
        if let Some(meta) = tree.metadata_for(entry, doc) {
            let path = tree.path(entry, doc);
            match chain.last_mut() {
                Some(last) if last.stream == meta.stream => last.path = path,
                _ => chain.push(StreamRecord {
                    path,
                    byte_range: meta.byte_range,
                    stream: meta.stream.clone(),
                    bit_mode: meta.bit_mode,
                }),
            }
        }
        cur = tree.parent_of(entry);
    }
    chain.reverse();
    chain
}
