use std::path::Path;

use anyhow::Result;

use fieldlens::grammar::{ConstructRef, build_bytes, parse_bytes};

/// Ranges (inclusive end) where `a` and `b` differ. Bytes past the end of
/// the shorter buffer count as different.
pub(crate) fn diff_ranges(a: &[u8], b: &[u8]) -> Vec<(usize, usize)> {
    let max_len = a.len().max(b.len());
    let mut diffs = Vec::new();
    let mut in_diff = false;
    let mut diff_start = 0;
    for i in 0..max_len {
        let differs = match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => x != y,
            _ => true,
        };
        if differs {
            if !in_diff {
                in_diff = true;
                diff_start = i;
            }
        } else if in_diff {
            diffs.push((diff_start, i - 1));
            in_diff = false;
        }
    }
    if in_diff {
        diffs.push((diff_start, max_len - 1));
    }
    diffs
}

/// Parse `data`, build the parsed value again and compare the bytes.
pub fn test_roundtrip(path: &Path, grammar: &ConstructRef, data: Vec<u8>, dry_run: bool) -> Result<()> {
    let file_str = match path.canonicalize() {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    };

    let value = match parse_bytes(grammar, &data) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("\"{}\": parse error: {}", file_str, e);
            return Ok(());
        }
    };
    let rebuilt = match build_bytes(grammar, &value) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("\"{}\": build error: {}", file_str, e);
            return Ok(());
        }
    };

    if rebuilt == data {
        if !dry_run {
            println!(
                " roundtrip: serialized matches original ({} bytes)",
                rebuilt.len()
            );
        }
        return Ok(());
    }

    let diffs = diff_ranges(&data, &rebuilt);
    println!(
        "\"{}\": roundtrip: MISMATCH (original {} bytes, serialized {} bytes, {} ranges differ)",
        file_str,
        data.len(),
        rebuilt.len(),
        diffs.len()
    );
    if !dry_run {
        for (start, end) in diffs {
            let orig = data.get(start..=end.min(data.len().saturating_sub(1)));
            let new = rebuilt.get(start..=end.min(rebuilt.len().saturating_sub(1)));
            println!(
                "  0x{:08X}..=0x{:08X}: {} -> {}",
                start,
                end,
                hex(orig.unwrap_or(&[])),
                hex(new.unwrap_or(&[]))
            );
        }
    }
    Ok(())
}

fn hex(data: &[u8]) -> String {
    if data.is_empty() {
        return "-".to_string();
    }
    let mut s = data
        .iter()
        .take(8)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > 8 {
        s.push_str(" ..");
    }
    s
}
