//! Dynamic values produced by grammar nodes.
//!
//! `Value` is deliberately plain data: provenance is never attached to a
//! value itself but kept in the metadata side table (see `crate::meta`),
//! keyed by the value's `Path`.
use std::fmt;

/// Integer value of an enum field together with its symbolic label, if the
/// mapping knows one.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub value: i128,
    pub label: Option<String>,
}

/// Integer value of a flags field together with the names of the set flags.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagsValue {
    pub value: i128,
    pub set: Vec<String>,
}

/// Ordered name → value mapping produced by structures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    fields: Vec<(String, Value)>,
}

impl Container {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Insert or replace `name`, keeping the position of an existing field.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Container {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut c = Container::new();
        for (n, v) in iter {
            c.insert(n, v);
        }
        c
    }
}

/// A parsed (or to-be-built) value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Enum(EnumValue),
    Flags(FlagsValue),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
    List(Vec<Value>),
    Container(Container),
}

impl Value {
    /// Short lowercase name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::Enum(_) => "enum",
            Value::Flags(_) => "flags",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Container(_) => "container",
        }
    }

    /// Integer view of the value (ints, bools, enums, flags, timestamps).
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i128),
            Value::Enum(e) => Some(e.value),
            Value::Flags(f) => Some(f.value),
            Value::Timestamp(t) => Some(*t as i128),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truthiness used by conditional nodes.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Float(f) => *f != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Container(c) => !c.is_empty(),
            other => other.as_int().is_some_and(|i| i != 0),
        }
    }

    /// Equality used for switch keys: integers compare by numeric value
    /// regardless of whether either side is an enum, and an enum also
    /// matches its label.
    pub fn matches_key(&self, key: &Value) -> bool {
        match (self, key) {
            (Value::Enum(e), Value::Str(s)) | (Value::Str(s), Value::Enum(e)) => {
                e.label.as_deref() == Some(s.as_str())
            }
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    /// Number of elements for lists, bytes and strings.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(l.len()),
            Value::Bytes(b) => Some(b.len()),
            Value::Str(s) => Some(s.len()),
            Value::Container(c) => Some(c.len()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bytes(b) => {
                write!(f, "b'")?;
                for byte in b {
                    write!(f, "\\x{:02x}", byte)?;
                }
                write!(f, "'")
            }
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Enum(e) => match &e.label {
                Some(l) => write!(f, "{}", l),
                None => write!(f, "{}", e.value),
            },
            Value::Flags(fl) => write!(f, "{}", fl.set.join(" | ")),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Container(c) => {
                write!(f, "Container(")?;
                for (i, (n, v)) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", n, v)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i128)
            }
        })*
    };
}

impl_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, i128);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Container> for Value {
    fn from(v: Container) -> Self {
        Value::Container(v)
    }
}
