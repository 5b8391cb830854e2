//! Multi-child nodes: structures, focused sequences, selections,
//! conditionals, switches and checksums.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::GrammarError;
use crate::grammar::construct::downcast;
use crate::grammar::wrapper::Renamed;
use crate::grammar::{
    Construct, ConstructRef, Container, Context, Expr, Family, Sink, Stream, Value,
};
use crate::path::PathSegment;

/// Declared name of a member node, if it is wrapped in `Renamed`.
pub fn member_name(c: &ConstructRef) -> Option<&str> {
    downcast::<Renamed>(c).map(|r| r.name.as_str())
}

fn member_segment(c: &ConstructRef, index: usize) -> PathSegment {
    match member_name(c) {
        Some(name) => PathSegment::Name(name.to_string()),
        None => PathSegment::Index(index),
    }
}

fn expect_count(owner: &str, expected: usize, subcons: &[ConstructRef]) -> Result<(), GrammarError> {
    if subcons.len() != expected {
        return Err(GrammarError::Other(format!(
            "{} takes {} sub-nodes, got {}",
            owner,
            expected,
            subcons.len()
        )));
    }
    Ok(())
}

/// Sequence of fields producing a `Container`. Unnamed members are parsed
/// and built but not stored.
#[derive(Debug, Clone)]
pub struct Struct {
    pub subcons: Vec<ConstructRef>,
}

impl Construct for Struct {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        ctx.enter_scope(Container::new());
        for (i, sc) in self.subcons.iter().enumerate() {
            let parsed = ctx.cancel.check().and_then(|_| {
                ctx.nested(member_segment(sc, i), |ctx| sc.parse(stream, ctx))
            });
            match parsed {
                Ok(value) => {
                    if let Some(name) = member_name(sc) {
                        ctx.scope.this.insert(name, value);
                    }
                }
                Err(e) => {
                    ctx.leave_scope();
                    return Err(e);
                }
            }
        }
        Ok(Value::Container(ctx.leave_scope()))
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let obj = match value {
            Value::Container(c) => c.clone(),
            Value::None => Container::new(),
            other => {
                return Err(GrammarError::Type {
                    expected: "container",
                    found: other.kind_name().to_string(),
                });
            }
        };
        ctx.enter_scope(obj);
        for (i, sc) in self.subcons.iter().enumerate() {
            let name = member_name(sc);
            let sub = name
                .and_then(|n| ctx.scope.this.get(n).cloned())
                .unwrap_or(Value::None);
            match ctx.nested(member_segment(sc, i), |ctx| sc.build(&sub, sink, ctx)) {
                Ok(built) => {
                    if let Some(name) = name {
                        ctx.scope.this.insert(name, built);
                    }
                }
                Err(e) => {
                    ctx.leave_scope();
                    return Err(e);
                }
            }
        }
        Ok(Value::Container(ctx.leave_scope()))
    }

    fn type_name(&self) -> String {
        "Struct".into()
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        self.subcons.clone()
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        expect_count("Struct", self.subcons.len(), &subcons)?;
        Ok(Arc::new(Struct { subcons }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Parses every member but exposes only the one picked by `selector`
/// (a member name or index, evaluated against the enclosing scope).
#[derive(Debug, Clone)]
pub struct FocusedSeq {
    pub selector: Expr,
    pub subcons: Vec<ConstructRef>,
}

impl FocusedSeq {
    /// Index of the focused member for a selector value.
    pub fn focus_of(&self, key: &Value) -> Option<usize> {
        match key {
            Value::Str(name) => self
                .subcons
                .iter()
                .position(|sc| member_name(sc) == Some(name.as_str())),
            other => other
                .as_int()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < self.subcons.len()),
        }
    }

    fn focus(&self, ctx: &Context) -> Result<usize, GrammarError> {
        let key = self.selector.eval(&ctx.scope)?;
        self.focus_of(&key)
            .ok_or_else(|| GrammarError::Expression(format!("no member selected by {}", key)))
    }
}

impl Construct for FocusedSeq {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let focus = self.focus(ctx)?;
        ctx.enter_scope(Container::new());
        let mut focused = Value::None;
        for (i, sc) in self.subcons.iter().enumerate() {
            let parsed = if i == focus {
                sc.parse(stream, ctx)
            } else {
                ctx.nested(member_segment(sc, i), |ctx| sc.parse(stream, ctx))
            };
            match parsed {
                Ok(value) => {
                    if let Some(name) = member_name(sc) {
                        ctx.scope.this.insert(name, value.clone());
                    }
                    if i == focus {
                        focused = value;
                    }
                }
                Err(e) => {
                    ctx.leave_scope();
                    return Err(e);
                }
            }
        }
        ctx.leave_scope();
        Ok(focused)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let focus = self.focus(ctx)?;
        let mut seed = Container::new();
        if let Some(name) = member_name(&self.subcons[focus]) {
            seed.insert(name, value.clone());
        }
        ctx.enter_scope(seed);
        let mut focused = Value::None;
        for (i, sc) in self.subcons.iter().enumerate() {
            let sub = if i == focus { value.clone() } else { Value::None };
            let built = if i == focus {
                sc.build(&sub, sink, ctx)
            } else {
                ctx.nested(member_segment(sc, i), |ctx| sc.build(&sub, sink, ctx))
            };
            match built {
                Ok(v) => {
                    if let Some(name) = member_name(sc) {
                        ctx.scope.this.insert(name, v.clone());
                    }
                    if i == focus {
                        focused = v;
                    }
                }
                Err(e) => {
                    ctx.leave_scope();
                    return Err(e);
                }
            }
        }
        ctx.leave_scope();
        Ok(focused)
    }

    fn type_name(&self) -> String {
        "FocusedSeq".into()
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        self.subcons.clone()
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        expect_count("FocusedSeq", self.subcons.len(), &subcons)?;
        Ok(Arc::new(FocusedSeq {
            selector: self.selector.clone(),
            subcons,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tries each option in order; the first that parses wins.
#[derive(Debug, Clone)]
pub struct Select {
    pub subcons: Vec<ConstructRef>,
}

impl Construct for Select {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        for sc in &self.subcons {
            let mut attempt = stream.clone();
            match sc.parse(&mut attempt, ctx) {
                Ok(value) => {
                    *stream = attempt;
                    return Ok(value);
                }
                Err(GrammarError::Cancelled) => return Err(GrammarError::Cancelled),
                Err(_) => continue,
            }
        }
        Err(GrammarError::NoAlternative)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        for sc in &self.subcons {
            let mut tmp = sink.sibling();
            match sc.build(value, &mut tmp, ctx) {
                Ok(built) => {
                    sink.write_raw(tmp.as_slice());
                    return Ok(built);
                }
                Err(GrammarError::Cancelled) => return Err(GrammarError::Cancelled),
                Err(_) => continue,
            }
        }
        Err(GrammarError::NoAlternative)
    }

    fn type_name(&self) -> String {
        "Select".into()
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        self.subcons.clone()
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        expect_count("Select", self.subcons.len(), &subcons)?;
        Ok(Arc::new(Select { subcons }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `then_subcon` when `cond` is truthy, `else_subcon` otherwise.
#[derive(Debug, Clone)]
pub struct IfThenElse {
    pub cond: Expr,
    pub then_subcon: ConstructRef,
    pub else_subcon: ConstructRef,
}

impl IfThenElse {
    fn branch(&self, ctx: &Context) -> Result<&ConstructRef, GrammarError> {
        Ok(if self.cond.eval(&ctx.scope)?.truthy() {
            &self.then_subcon
        } else {
            &self.else_subcon
        })
    }
}

impl Construct for IfThenElse {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.branch(ctx)?.clone().parse(stream, ctx)
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        self.branch(ctx)?.clone().build(value, sink, ctx)
    }

    fn type_name(&self) -> String {
        "IfThenElse".into()
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.then_subcon.clone(), self.else_subcon.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        expect_count("IfThenElse", 2, &subcons)?;
        let mut it = subcons.into_iter();
        match (it.next(), it.next()) {
            (Some(then_subcon), Some(else_subcon)) => Ok(Arc::new(IfThenElse {
                cond: self.cond.clone(),
                then_subcon,
                else_subcon,
            })),
            _ => Err(GrammarError::Other("IfThenElse takes 2 sub-nodes".into())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Multi-way branch on `key`. With no matching case and no default the
/// switch parses to `None` and builds nothing.
#[derive(Debug, Clone)]
pub struct Switch {
    pub key: Expr,
    pub cases: Vec<(Value, ConstructRef)>,
    pub default: Option<ConstructRef>,
}

impl Switch {
    /// Case index for `key`, or `None` when the default (if any) applies.
    pub fn case_of(&self, key: &Value) -> Option<usize> {
        self.cases.iter().position(|(k, _)| key.matches_key(k))
    }

    fn branch(&self, ctx: &Context) -> Result<Option<ConstructRef>, GrammarError> {
        let key = self.key.eval(&ctx.scope)?;
        Ok(match self.case_of(&key) {
            Some(i) => Some(self.cases[i].1.clone()),
            None => self.default.clone(),
        })
    }
}

impl Construct for Switch {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        match self.branch(ctx)? {
            Some(sc) => sc.parse(stream, ctx),
            None => Ok(Value::None),
        }
    }

    fn build(&self, value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        match self.branch(ctx)? {
            Some(sc) => sc.build(value, sink, ctx),
            None => Ok(Value::None),
        }
    }

    fn type_name(&self) -> String {
        "Switch".into()
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    /// Case nodes in order, followed by the default if there is one.
    fn subcons(&self) -> Vec<ConstructRef> {
        let mut out: Vec<ConstructRef> = self.cases.iter().map(|(_, c)| c.clone()).collect();
        out.extend(self.default.clone());
        out
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        let expected = self.cases.len() + usize::from(self.default.is_some());
        expect_count("Switch", expected, &subcons)?;
        let mut it = subcons.into_iter();
        let cases = self
            .cases
            .iter()
            .zip(it.by_ref())
            .map(|((k, _), c)| (k.clone(), c))
            .collect();
        let default = if self.default.is_some() { it.next() } else { None };
        Ok(Arc::new(Switch {
            key: self.key.clone(),
            cases,
            default,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type HashFn = dyn Fn(&[u8]) -> i128 + Send + Sync;

/// Integer field that must equal `hash` over the bytes `data` evaluates to.
#[derive(Clone)]
pub struct Checksum {
    pub field: ConstructRef,
    pub hash: Arc<HashFn>,
    pub data: Expr,
}

impl Checksum {
    fn expected(&self, ctx: &Context) -> Result<i128, GrammarError> {
        let data = self.data.eval(&ctx.scope)?;
        let bytes = data.as_bytes().ok_or_else(|| GrammarError::Type {
            expected: "bytes",
            found: data.kind_name().to_string(),
        })?;
        Ok((self.hash)(bytes))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checksum")
            .field("field", &self.field)
            .field("data", &self.data)
            .finish()
    }
}

impl Construct for Checksum {
    fn parse(&self, stream: &mut Stream, ctx: &mut Context) -> Result<Value, GrammarError> {
        let found = self.field.parse(stream, ctx)?;
        let expected = self.expected(ctx)?;
        match found.as_int() {
            Some(f) if f == expected => Ok(found),
            Some(f) => Err(GrammarError::Checksum { expected, found: f }),
            None => Err(GrammarError::Type {
                expected: "int",
                found: found.kind_name().to_string(),
            }),
        }
    }

    fn build(&self, _value: &Value, sink: &mut Sink, ctx: &mut Context) -> Result<Value, GrammarError> {
        let expected = self.expected(ctx)?;
        self.field.build(&Value::Int(expected), sink, ctx)
    }

    fn type_name(&self) -> String {
        format!("Checksum({})", self.field.type_name())
    }

    fn family(&self) -> Family {
        Family::Compound
    }

    fn subcons(&self) -> Vec<ConstructRef> {
        vec![self.field.clone()]
    }

    fn with_subcons(&self, subcons: Vec<ConstructRef>) -> Result<ConstructRef, GrammarError> {
        expect_count("Checksum", 1, &subcons)?;
        Ok(Arc::new(Checksum {
            field: subcons.into_iter().next().ok_or_else(|| {
                GrammarError::Other("Checksum takes 1 sub-node".into())
            })?,
            ..self.clone()
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
