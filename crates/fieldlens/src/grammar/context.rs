//! Evaluation environment threaded through parse and build.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GrammarError;
use crate::grammar::{Container, Value};
use crate::meta::MetadataTable;
use crate::path::{Path, PathSegment};

/// Values visible to expressions: the fields of the innermost structure
/// (`this`) and the enclosing scopes (reached with `_`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub this: Container,
    pub parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope pre-populated with `this`.
    pub fn with_values(this: Container) -> Self {
        Self { this, parent: None }
    }

    /// Look up a dotted name sequence. `_` climbs to the parent scope; any
    /// other component indexes into containers (or lists, for numeric
    /// components).
    pub fn lookup(&self, names: &[String]) -> Result<&Value, GrammarError> {
        let mut scope = self;
        let mut rest = names;
        while let Some((first, tail)) = rest.split_first() {
            if first != "_" {
                break;
            }
            scope = scope
                .parent
                .as_deref()
                .ok_or_else(|| GrammarError::Expression("no parent context for '_'".into()))?;
            rest = tail;
        }
        let (first, tail) = rest
            .split_first()
            .ok_or_else(|| GrammarError::Expression("empty field reference".into()))?;
        let mut cur = scope.this.get(first).ok_or_else(|| {
            GrammarError::Expression(format!("no field '{}' in context", first))
        })?;
        for name in tail {
            cur = match cur {
                Value::Container(c) => c.get(name),
                Value::List(items) => name.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| GrammarError::Expression(format!("no field '{}' in context", name)))?;
        }
        Ok(cur)
    }
}

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Safe point: fail with `GrammarError::Cancelled` once cancelled.
    pub fn check(&self) -> Result<(), GrammarError> {
        if self.is_cancelled() {
            Err(GrammarError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Mutable state for one parse or build run.
#[derive(Debug, Default)]
pub struct Context {
    pub scope: Scope,
    /// Path of the value currently being produced.
    pub path: Path,
    pub cancel: CancelToken,
    /// Provenance side table, filled by instrumented grammars.
    pub metadata: MetadataTable,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Open a nested scope whose parent is the current one.
    pub fn enter_scope(&mut self, this: Container) {
        let outer = std::mem::take(&mut self.scope);
        self.scope = Scope {
            this,
            parent: Some(Arc::new(outer)),
        };
    }

    /// Close the innermost scope, returning its values.
    pub fn leave_scope(&mut self) -> Container {
        let inner = std::mem::take(&mut self.scope);
        self.scope = match inner.parent {
            Some(parent) => Arc::try_unwrap(parent).unwrap_or_else(|shared| (*shared).clone()),
            None => Scope::default(),
        };
        inner.this
    }

    /// Run `f` with `segment` appended to the current path. The segment is
    /// removed again whether `f` succeeds or not.
    pub fn nested<R>(&mut self, segment: PathSegment, f: impl FnOnce(&mut Context) -> R) -> R {
        self.path.push(segment);
        let out = f(self);
        self.path.pop();
        out
    }

    /// Snapshot of the current scope for later re-evaluation.
    pub fn snapshot(&self) -> Arc<Scope> {
        Arc::new(self.scope.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_climbs_parent_scopes() {
        let mut ctx = Context::new();
        ctx.scope.this.insert("count", Value::Int(4));
        ctx.enter_scope(Container::new());
        ctx.scope.this.insert("kind", Value::Int(1));

        let names = |s: &str| s.split('.').map(String::from).collect::<Vec<_>>();
        assert_eq!(ctx.scope.lookup(&names("kind")).unwrap(), &Value::Int(1));
        assert_eq!(ctx.scope.lookup(&names("_.count")).unwrap(), &Value::Int(4));
        assert!(ctx.scope.lookup(&names("count")).is_err());

        let snapshot = ctx.snapshot();
        let inner = ctx.leave_scope();
        assert_eq!(inner.get("kind"), Some(&Value::Int(1)));
        assert_eq!(ctx.scope.this.get("count"), Some(&Value::Int(4)));
        // the snapshot still sees both levels
        assert_eq!(snapshot.lookup(&names("_.count")).unwrap(), &Value::Int(4));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert_eq!(clone.check(), Err(GrammarError::Cancelled));
    }
}
