use anyhow::{Result, bail};
use unicode_width::UnicodeWidthStr;

use fieldlens::grammar::ConstructRef;
use fieldlens::StreamRecord;

use crate::cui::{ViewOptions, find_entry, open_editor, pad_to_width};

/// Bytes shown per stream before eliding.
const PREVIEW_LIMIT: usize = 16;

fn preview(record: &StreamRecord) -> String {
    let data = record.slice();
    if record.bit_mode {
        // bit streams hold one bit per byte
        return data
            .iter()
            .take(PREVIEW_LIMIT * 4)
            .map(|b| if *b == 0 { '0' } else { '1' })
            .collect();
    }
    let mut text = data
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > PREVIEW_LIMIT {
        text.push_str(" ..");
    }
    text
}

/// Print the physical streams `path` was read through, root buffer first.
pub fn print_chain(grammar: &ConstructRef, data: Vec<u8>, view: &ViewOptions, path: &str) -> Result<()> {
    let mut editor = open_editor(grammar, data, view)?;
    let id = find_entry(&mut editor, path)?;
    let chain = editor.stream_chain(id);
    if chain.is_empty() {
        bail!("'{}' has no provenance (no value was parsed for it)", path);
    }

    let rows: Vec<(String, String, String, String)> = chain
        .iter()
        .map(|r| {
            let stream = format!("{}#{}", r.stream.label(), r.stream.id().get());
            let at = if r.path.is_root() {
                "<root>".to_string()
            } else {
                r.path.to_string()
            };
            let unit = if r.bit_mode { " bits" } else { "" };
            let range = format!("{}..{}{}", r.byte_range.0, r.byte_range.1, unit);
            (stream, at, range, preview(r))
        })
        .collect();

    let headers = ("Stream", "From", "Range", "Data");
    let mut col0 = UnicodeWidthStr::width(headers.0);
    let mut col1 = UnicodeWidthStr::width(headers.1);
    let mut col2 = UnicodeWidthStr::width(headers.2);
    for (a, b, c, _) in &rows {
        col0 = col0.max(UnicodeWidthStr::width(a.as_str()));
        col1 = col1.max(UnicodeWidthStr::width(b.as_str()));
        col2 = col2.max(UnicodeWidthStr::width(c.as_str()));
    }

    println!(
        "{}  {}  {}  {}",
        pad_to_width(headers.0, col0),
        pad_to_width(headers.1, col1),
        pad_to_width(headers.2, col2),
        headers.3
    );
    for (a, b, c, d) in &rows {
        println!(
            "{}  {}  {}  {}",
            pad_to_width(a, col0),
            pad_to_width(b, col1),
            pad_to_width(c, col2),
            d
        );
    }
    Ok(())
}
