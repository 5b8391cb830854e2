//! Context expressions: lengths, counts, conditions, switch keys, selectors.
use std::fmt;
use std::sync::Arc;

use crate::error::GrammarError;
use crate::grammar::{Scope, Value};

type ExprFn = dyn Fn(&Scope) -> Result<Value, GrammarError> + Send + Sync;

/// An expression evaluated against a `Scope`.
///
/// Expressions are introspectable enough for the entry tree: a constant
/// expression exposes its value (`as_const`) so that, for example, an array
/// with a literal count can still report its size when no value is loaded.
#[derive(Clone)]
pub enum Expr {
    Const(Value),
    /// Dotted field reference such as `this.len` or `_.header.count`
    /// (the leading `this` is implied).
    Field(Vec<String>),
    Func(Arc<ExprFn>),
}

impl Expr {
    pub fn constant(v: impl Into<Value>) -> Self {
        Expr::Const(v.into())
    }

    /// Reference a field of the current scope, e.g. `Expr::this("len")` or
    /// `Expr::this("_.header.count")`.
    pub fn this(path: &str) -> Self {
        let path = path.strip_prefix("this.").unwrap_or(path);
        Expr::Field(path.split('.').map(String::from).collect())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Scope) -> Result<Value, GrammarError> + Send + Sync + 'static,
    {
        Expr::Func(Arc::new(f))
    }

    /// Number of elements (list items, bytes, characters) of a field.
    pub fn len_of(path: &str) -> Self {
        let field = Expr::this(path);
        Expr::func(move |scope| {
            let v = field.eval(scope)?;
            v.len()
                .map(Value::from)
                .ok_or_else(|| GrammarError::Expression(format!("{} has no length", v.kind_name())))
        })
    }

    /// `path == value`, using switch-key equality.
    pub fn equals(path: &str, value: impl Into<Value>) -> Self {
        let field = Expr::this(path);
        let value = value.into();
        Expr::func(move |scope| Ok(Value::Bool(field.eval(scope)?.matches_key(&value))))
    }

    pub fn eval(&self, scope: &Scope) -> Result<Value, GrammarError> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Field(names) => scope.lookup(names).cloned(),
            Expr::Func(f) => f(scope),
        }
    }

    /// Evaluate to a non-negative size.
    pub fn eval_usize(&self, scope: &Scope) -> Result<usize, GrammarError> {
        let v = self.eval(scope)?;
        let i = v.as_int().ok_or_else(|| GrammarError::Type {
            expected: "int",
            found: v.kind_name().to_string(),
        })?;
        usize::try_from(i).map_err(|_| GrammarError::Range(format!("{} is not a valid size", i)))
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Field(names) => write!(f, "this.{}", names.join(".")),
            Expr::Func(_) => write!(f, "<func>"),
        }
    }
}

impl From<usize> for Expr {
    fn from(v: usize) -> Self {
        Expr::Const(Value::from(v))
    }
}
