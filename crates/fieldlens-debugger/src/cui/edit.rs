use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use fieldlens::grammar::ConstructRef;

use crate::cui::{ViewOptions, find_entry, open_editor};

/// Set the field at `path` from `value` and write the rebuilt bytes.
pub fn edit_field(
    grammar: &ConstructRef,
    data: Vec<u8>,
    view: &ViewOptions,
    path: &str,
    value: &str,
    output: &PathBuf,
) -> Result<()> {
    let mut editor = open_editor(grammar, data, view)?;
    let id = find_entry(&mut editor, path)?;

    let before = editor.obj_str(id);
    editor
        .set_value_str(id, value)
        .with_context(|| format!("cannot set '{}' to '{}'", path, value))?;
    println!("{}: {} -> {}", path, before, editor.obj_str(id));

    let bytes = editor.bytes();
    if output.as_os_str() == "-" {
        for chunk in bytes.chunks(16) {
            let line = chunk
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}", line);
        }
    } else {
        fs::write(output, bytes)
            .with_context(|| format!("failed to write file: {}", output.display()))?;
        println!("wrote {} bytes to {}", bytes.len(), output.display());
    }
    Ok(())
}
