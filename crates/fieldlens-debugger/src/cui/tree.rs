use anyhow::Result;
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};

use fieldlens::grammar::ConstructRef;
use fieldlens::{Editor, EntryId};

use crate::cui::{ViewOptions, open_editor};

/// Array elements shown per array unless `--all` is given.
const ELEMENT_LIMIT: usize = 8;

fn range_text(editor: &Editor, id: EntryId) -> String {
    match editor.metadata(id) {
        Some(meta) => {
            let unit = if meta.bit_mode { "bit" } else { "" };
            format!(
                "{}:{}..{}{}",
                meta.stream.label(),
                meta.byte_range.0,
                meta.byte_range.1,
                unit
            )
        }
        None => String::new(),
    }
}

fn add_rows(editor: &mut Editor, table: &mut Table, id: EntryId, depth: usize, all: bool) {
    let label = format!("{}{}", "  ".repeat(depth), editor.name(id));
    table.add_row(vec![
        Cell::new(label),
        Cell::new(editor.type_label(id)),
        Cell::new(editor.obj_str(id)),
        Cell::new(range_text(editor, id)),
    ]);

    let children = editor.children_of(Some(id));
    let shown = if all {
        children.len()
    } else {
        children.len().min(ELEMENT_LIMIT)
    };
    for child in &children[..shown] {
        add_rows(editor, table, *child, depth + 1, all);
    }
    if shown < children.len() {
        table.add_row(vec![
            Cell::new(format!(
                "{}... {} more",
                "  ".repeat(depth + 1),
                children.len() - shown
            )),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
    }
}

/// Print every row of the entry tree with its type, value and byte range.
pub fn print_tree(grammar: &ConstructRef, data: Vec<u8>, view: &ViewOptions, all: bool) -> Result<()> {
    let mut editor = open_editor(grammar, data, view)?;

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Field"),
        Cell::new("Type"),
        Cell::new("Value"),
        Cell::new("Range"),
    ]);
    for root in editor.children_of(None) {
        add_rows(&mut editor, &mut table, root, 0, all);
    }
    println!("{}", table);
    Ok(())
}
