#![doc = include_str!("../README.md")]
//! fieldlens: provenance-tracking editing core for declarative binary-format grammars
//!
//! Given a grammar (a tree of [`grammar::Construct`] nodes) and a byte
//! buffer, `fieldlens` parses the buffer, mirrors the grammar into a
//! navigable entry tree, lets a view edit values in place with undo/redo,
//! and re-serializes after every edit.
//!
//! Pieces:
//! - [`preprocess`]: instruments a grammar so every parsed value gets a
//!   provenance record (byte range, producing node, scope, physical stream).
//! - [`meta`]: the side table those records live in, keyed by value path.
//! - [`entry`]: the entry tree, one variant per kind of grammar node, with
//!   runtime-dependent shape (active branch, array length) resolved on
//!   every query.
//! - [`command`]: reversible edits and a bounded, branch-truncating history.
//! - [`orchestrator`]: owns bytes and value; runs parse and build inline or
//!   on a cancellable worker thread.
//! - [`provenance`]: the chain of physical streams behind an entry.
//! - [`model`]: [`Editor`], the surface a tree/table view talks to.
//!
//! Example
//!
//! ```rust
//! use fieldlens::grammar::*;
//! use fieldlens::{Editor, EditorSettings};
//!
//! let record = structure(vec![
//!     field("len", int8ub()),
//!     field("payload", bytes(Expr::this("len"))),
//! ]);
//!
//! let mut editor = Editor::new(EditorSettings::default());
//! editor.set_grammar(&record).unwrap();
//! editor.load_bytes(vec![0x02, 0xaa, 0xbb]).unwrap();
//!
//! let root = editor.children_of(None)[0];
//! let fields = editor.children_of(Some(root));
//! assert_eq!(editor.name(fields[1]), "payload");
//! assert_eq!(editor.metadata(fields[1]).unwrap().byte_range, (1, 3));
//!
//! editor.set_value_str(fields[0], "1").unwrap_err(); // payload is still 2 bytes
//! editor
//!     .set_value_at(&"payload".parse().unwrap(), Value::Bytes(vec![0xcc, 0xdd]))
//!     .unwrap();
//! assert_eq!(editor.bytes(), &[0x02, 0xcc, 0xdd]);
//! assert!(editor.undo().unwrap());
//! assert_eq!(editor.bytes(), &[0x02, 0xaa, 0xbb]);
//! ```
pub mod command;
pub mod entry;
mod error;
pub mod grammar;
pub mod meta;
pub mod model;
pub mod orchestrator;
mod path;
pub mod preprocess;
pub mod provenance;
pub mod settings;

pub use command::{Command, CommandHistory, SetValueCommand};
pub use entry::{EntryId, EntryRegistry, EntryTree, MenuAction, MenuItem, ValueKind};
pub use error::{EditorError, GrammarError};
pub use meta::{GuiMetadata, MetadataTable};
pub use model::{Cell, Editor};
pub use orchestrator::{ConvertError, ConvertEvent, Document, Orchestrator, Stage};
pub use path::{Path, PathSegment};
pub use preprocess::{InstrumentPolicy, Preprocessor, WithMetadata};
pub use provenance::{StreamRecord, stream_chain};
pub use settings::{ConvertMode, EditorSettings, IntegerFormat};
