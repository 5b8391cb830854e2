pub mod chain;
pub mod edit;
pub mod roundtrip;
pub mod tree;

use anyhow::{Context, Result};
use unicode_width::UnicodeWidthStr;

use fieldlens::grammar::ConstructRef;
use fieldlens::{Editor, EditorSettings, EntryId, IntegerFormat, Path};

/// Display flags shared by the subcommands.
#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub hex: bool,
    pub show_protected: bool,
}

/// Pad a &str to a target display width (columns) using unicode-width to
/// account for fullwidth characters.
pub(crate) fn pad_to_width(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}

/// Create an editor for `grammar` and parse `data` with it.
pub(crate) fn open_editor(grammar: &ConstructRef, data: Vec<u8>, view: &ViewOptions) -> Result<Editor> {
    let format = if view.hex {
        IntegerFormat::Hex
    } else {
        IntegerFormat::Dec
    };
    let settings = EditorSettings::default()
        .with_hide_protected(!view.show_protected)
        .with_integer_format(format);
    let mut editor = Editor::new(settings);
    editor.set_grammar(grammar).context("grammar rejected")?;
    editor.load_bytes(data).context("parse failed")?;
    Ok(editor)
}

/// Find the row whose path is `path`, searching hidden rows too.
pub(crate) fn find_entry(editor: &mut Editor, path: &str) -> Result<EntryId> {
    let wanted: Path = path.parse()?;
    let wanted = wanted.to_string();
    let hide = editor.settings().hide_protected;
    editor.set_hide_protected(false);

    let mut stack = editor.children_of(None);
    let mut found = None;
    while let Some(id) = stack.pop() {
        if editor.path(id).to_string() == wanted {
            found = Some(id);
            break;
        }
        let children = editor.children_of(Some(id));
        stack.extend(children.into_iter().rev());
    }

    editor.set_hide_protected(hide);
    found.with_context(|| format!("no field at '{}'", path))
}
