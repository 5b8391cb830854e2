//! Path addressing into a parsed value.
//!
//! A `Path` is the only way the editing core refers to a location inside
//! the authoritative value. Entry trees are rebuilt freely, but a path stays
//! meaningful across rebuilds, which is what lets edit history and metadata
//! outlive individual entries.
//!
//! Segments index progressively from the root value: a `Name` looks up a
//! field of a container, an `Index` looks up an element of a list, and an
//! `Excluded` segment marks a structural-only level (for example the active
//! branch of a conditional) that does not exist in the value and is skipped
//! during resolution.
use std::fmt;
use std::str::FromStr;

use crate::error::EditorError;
use crate::grammar::Value;

/// One step of a `Path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Name(String),
    Index(usize),
    Excluded,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Name(n) => write!(f, "{}", n),
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::Excluded => write!(f, "~"),
        }
    }
}

/// Ordered sequence of segments, relative to the root value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.iter().all(|s| *s == PathSegment::Excluded)
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// Return a copy of this path extended by `segment`.
    pub fn child(&self, segment: PathSegment) -> Path {
        let mut p = self.clone();
        p.push(segment);
        p
    }

    /// Return the path with every `Excluded` marker removed.
    ///
    /// Parse-time paths never contain `Excluded`, so this is the form used
    /// as the key of the metadata side table.
    pub fn normalized(&self) -> Path {
        Path(
            self.0
                .iter()
                .filter(|s| **s != PathSegment::Excluded)
                .cloned()
                .collect(),
        )
    }

    /// Whether `self` is a (non-strict) prefix of `other`, ignoring
    /// excluded markers.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.0.len() <= b.0.len() && a.0.iter().zip(b.0.iter()).all(|(x, y)| x == y)
    }

    /// Resolve this path against `root`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, EditorError> {
        let mut cur = root;
        for seg in &self.0 {
            cur = match (seg, cur) {
                (PathSegment::Excluded, v) => v,
                (PathSegment::Name(n), Value::Container(c)) => {
                    c.get(n).ok_or_else(|| self.failure(format!("no field '{}'", n)))?
                }
                (PathSegment::Index(i), Value::List(items)) => items.get(*i).ok_or_else(|| {
                    self.failure(format!("index {} out of bounds ({} items)", i, items.len()))
                })?,
                (seg, v) => {
                    return Err(self.failure(format!(
                        "segment '{}' cannot index a {}",
                        seg,
                        v.kind_name()
                    )));
                }
            };
        }
        Ok(cur)
    }

    /// Resolve this path against `root` for mutation.
    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Result<&'a mut Value, EditorError> {
        let mut cur = root;
        for seg in &self.0 {
            cur = match (seg, cur) {
                (PathSegment::Excluded, v) => v,
                (PathSegment::Name(n), Value::Container(c)) => match c.get_mut(n) {
                    Some(v) => v,
                    None => return Err(self.failure(format!("no field '{}'", n))),
                },
                (PathSegment::Index(i), Value::List(items)) => {
                    let len = items.len();
                    match items.get_mut(*i) {
                        Some(v) => v,
                        None => {
                            return Err(self.failure(format!(
                                "index {} out of bounds ({} items)",
                                i, len
                            )));
                        }
                    }
                }
                (seg, v) => {
                    return Err(self.failure(format!(
                        "segment '{}' cannot index a {}",
                        seg,
                        v.kind_name()
                    )));
                }
            };
        }
        Ok(cur)
    }

    /// Replace the value at this path, returning the previous one.
    pub fn replace(&self, root: &mut Value, new_value: Value) -> Result<Value, EditorError> {
        let slot = self.resolve_mut(root)?;
        Ok(std::mem::replace(slot, new_value))
    }

    fn failure(&self, reason: String) -> EditorError {
        EditorError::PathResolution {
            path: self.to_string(),
            reason,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in &self.0 {
            match seg {
                PathSegment::Excluded => continue,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
                PathSegment::Name(n) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", n)?;
                }
            }
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

/// Parse a dotted path such as `header.records.3.kind`. Purely numeric
/// components become `Index` segments; an empty string is the root.
impl FromStr for Path {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "." {
            return Ok(Path::root());
        }
        s.split('.')
            .map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    Err(EditorError::InvalidInput {
                        kind: "path",
                        message: format!("empty component in '{}'", s),
                    })
                } else if let Ok(i) = part.parse::<usize>() {
                    Ok(PathSegment::Index(i))
                } else {
                    Ok(PathSegment::Name(part.to_string()))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Container;

    fn sample() -> Value {
        let mut inner = Container::new();
        inner.insert("x", Value::Int(7));
        let mut root = Container::new();
        root.insert("len", Value::Int(2));
        root.insert(
            "items",
            Value::List(vec![Value::Container(inner), Value::Int(9)]),
        );
        Value::Container(root)
    }

    #[test]
    fn resolve_skips_excluded_segments() {
        let root = sample();
        let path: Path = [
            PathSegment::Name("items".into()),
            PathSegment::Excluded,
            PathSegment::Index(0),
            PathSegment::Name("x".into()),
        ]
        .into_iter()
        .collect();
        assert_eq!(path.resolve(&root).unwrap(), &Value::Int(7));
        assert_eq!(path.to_string(), "items[0].x");
    }

    #[test]
    fn resolve_reports_stale_index() {
        let root = sample();
        let path: Path = "items.5".parse().unwrap();
        match path.resolve(&root) {
            Err(EditorError::PathResolution { path, .. }) => assert_eq!(path, "items[5]"),
            other => panic!("expected resolution failure, got {:?}", other),
        }
    }

    #[test]
    fn replace_returns_previous_value() {
        let mut root = sample();
        let path: Path = "len".parse().unwrap();
        let old = path.replace(&mut root, Value::Int(3)).unwrap();
        assert_eq!(old, Value::Int(2));
        assert_eq!(path.resolve(&root).unwrap(), &Value::Int(3));
    }

    #[test]
    fn prefix_ignores_excluded() {
        let a: Path = [PathSegment::Name("a".into()), PathSegment::Excluded]
            .into_iter()
            .collect();
        let b: Path = "a.b".parse().unwrap();
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
    }
}
