//! String conversion of values for display, and of user input back into
//! values.
use chrono::{DateTime, Utc};

use crate::entry::ValueKind;
use crate::error::EditorError;
use crate::grammar::{EnumValue, FlagsValue, Value};
use crate::settings::IntegerFormat;

fn format_int(i: i128, format: IntegerFormat) -> String {
    match format {
        IntegerFormat::Dec => i.to_string(),
        IntegerFormat::Hex if i < 0 => format!("-0x{:X}", i.unsigned_abs()),
        IntegerFormat::Hex => format!("0x{:X}", i),
    }
}

/// Display string for a value.
pub fn format_value(value: &Value, format: IntegerFormat) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => format_int(*i, format),
        Value::Float(f) => f.to_string(),
        Value::Bytes(b) => b
            .iter()
            .map(|x| format!("{:02X}", x))
            .collect::<Vec<_>>()
            .join(" "),
        Value::Str(s) => s.clone(),
        Value::Enum(e) => match &e.label {
            Some(label) => format!("{} ({})", label, format_int(e.value, format)),
            None => format_int(e.value, format),
        },
        Value::Flags(fl) if fl.set.is_empty() => format_int(fl.value, format),
        Value::Flags(fl) => fl.set.join(" | "),
        Value::Timestamp(t) => match DateTime::<Utc>::from_timestamp(*t, 0) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => t.to_string(),
        },
        Value::List(items) => format!("{} items", items.len()),
        Value::Container(_) => String::new(),
    }
}

fn invalid(kind: &'static str, message: impl Into<String>) -> EditorError {
    EditorError::InvalidInput {
        kind,
        message: message.into(),
    }
}

fn parse_int(text: &str) -> Result<i128, EditorError> {
    let t = text.trim().replace('_', "");
    let (negative, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.as_str()),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    }
    .map_err(|e| invalid("integer", format!("'{}': {}", text.trim(), e)))?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, EditorError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = digits
        .strip_prefix("0x")
        .unwrap_or(&digits)
        .to_string();
    if digits.len() % 2 != 0 {
        return Err(invalid("bytes", "odd number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| invalid("bytes", format!("'{}': {}", &digits[i..i + 2], e)))
        })
        .collect()
}

impl ValueKind {
    /// Convert user input into a value of this kind.
    pub fn parse_input(&self, text: &str) -> Result<Value, EditorError> {
        let trimmed = text.trim();
        match self {
            ValueKind::Integer => parse_int(trimmed).map(Value::Int),
            ValueKind::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| invalid("float", e.to_string())),
            ValueKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid("bool", format!("'{}' is not true or false", trimmed))),
            },
            ValueKind::Bytes => parse_hex_bytes(trimmed).map(Value::Bytes),
            ValueKind::Text => Ok(Value::Str(text.to_string())),
            ValueKind::Enum { labels } => {
                let value = match labels.iter().find(|(name, _)| name == trimmed) {
                    Some((_, v)) => *v,
                    None => parse_int(trimmed)?,
                };
                let label = labels
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map(|(name, _)| name.clone());
                Ok(Value::Enum(EnumValue { value, label }))
            }
            ValueKind::Flags { flags } => {
                if let Ok(value) = parse_int(trimmed) {
                    let set = flags
                        .iter()
                        .filter(|(_, bit)| *bit != 0 && value & *bit == *bit)
                        .map(|(name, _)| name.clone())
                        .collect();
                    return Ok(Value::Flags(FlagsValue { value, set }));
                }
                let mut value = 0;
                let mut set = Vec::new();
                for name in trimmed.split('|').map(str::trim).filter(|s| !s.is_empty()) {
                    let (_, bit) = flags
                        .iter()
                        .find(|(n, _)| n == name)
                        .ok_or_else(|| invalid("flags", format!("unknown flag '{}'", name)))?;
                    value |= *bit;
                    set.push(name.to_string());
                }
                Ok(Value::Flags(FlagsValue { value, set }))
            }
            ValueKind::Timestamp => match parse_int(trimmed) {
                Ok(secs) => i64::try_from(secs)
                    .map(Value::Timestamp)
                    .map_err(|_| invalid("timestamp", "out of range")),
                Err(_) => DateTime::parse_from_rfc3339(trimmed)
                    .map(|dt| Value::Timestamp(dt.timestamp()))
                    .map_err(|e| invalid("timestamp", e.to_string())),
            },
            ValueKind::Container => Err(invalid("container", "containers are edited field by field")),
            ValueKind::ReadOnly => Err(invalid("read-only", "value cannot be edited")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_follow_radix() {
        assert_eq!(format_value(&Value::Int(255), IntegerFormat::Dec), "255");
        assert_eq!(format_value(&Value::Int(255), IntegerFormat::Hex), "0xFF");
        assert_eq!(format_value(&Value::Int(-16), IntegerFormat::Hex), "-0x10");
        let e = Value::Enum(EnumValue {
            value: 2,
            label: Some("TWO".into()),
        });
        assert_eq!(format_value(&e, IntegerFormat::Hex), "TWO (0x2)");
    }

    #[test]
    fn timestamps_are_utc() {
        assert_eq!(
            format_value(&Value::Timestamp(0), IntegerFormat::Dec),
            "1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn input_parsing() {
        assert_eq!(ValueKind::Integer.parse_input("0x10").unwrap(), Value::Int(16));
        assert_eq!(ValueKind::Integer.parse_input(" -3 ").unwrap(), Value::Int(-3));
        assert!(ValueKind::Integer.parse_input("abc").is_err());
        assert_eq!(
            ValueKind::Bytes.parse_input("aa BB 01").unwrap(),
            Value::Bytes(vec![0xaa, 0xbb, 0x01])
        );
        assert!(ValueKind::Bytes.parse_input("abc").is_err());
        let flags = ValueKind::Flags {
            flags: vec![("A".into(), 1), ("B".into(), 4)],
        };
        assert_eq!(
            flags.parse_input("A | B").unwrap(),
            Value::Flags(FlagsValue {
                value: 5,
                set: vec!["A".into(), "B".into()],
            })
        );
        assert!(ValueKind::ReadOnly.parse_input("1").is_err());
    }
}
