// Callable catalog: built-in signatures plus host-registered callables,
// looked up by alias. Host callables are bound once at configuration time
// into the same descriptor shape as built-ins; no name-based reflection.

use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::{EvalError, ResolutionError};

/// Declared parameter type. `Lambda`, `Enumeration` and `Binding` drive which
/// expression case the parser builds for `as` / `->` argument forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    Str,
    Int,
    Bool,
    Array,
    Path,
    Lambda,
    Enumeration,
    Binding,
}

/// One formal parameter of a callable.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Lazily-evaluated parameters are handed to the callable as unevaluated
    /// expressions instead of being reduced first.
    pub lazy: bool,
    pub variadic: bool,
    pub optional: bool,
}

impl Param {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Param {
            name,
            kind,
            lazy: false,
            variadic: false,
            optional: false,
        }
    }

    pub const fn lazy(name: &'static str, kind: ParamKind) -> Self {
        Param {
            name,
            kind,
            lazy: true,
            variadic: false,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Param {
            name,
            kind,
            lazy: false,
            variadic: false,
            optional: true,
        }
    }

    pub const fn lazy_optional(name: &'static str, kind: ParamKind) -> Self {
        Param {
            name,
            kind,
            lazy: true,
            variadic: false,
            optional: true,
        }
    }

    pub const fn variadic(name: &'static str, kind: ParamKind) -> Self {
        Param {
            name,
            kind,
            lazy: false,
            variadic: true,
            optional: true,
        }
    }
}

/// Tag for the declared return type; metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Any,
    Str,
    Int,
    Bool,
    Array,
}

/// Static vs. instance-bound call, and whether the callable is built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Builtin,
    HostStatic,
    HostInstance,
}

/// A resolved callable descriptor. Built-ins and host registrations share
/// this shape; the evaluator dispatches on `name` for built-ins and through
/// the catalog for host callables.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub alias: String,
    pub kind: CallKind,
    pub returns: ReturnKind,
    pub is_multi_valued: bool,
    pub allowed_in_name: bool,
    pub allowed_in_value: bool,
    pub allowed_as_statement: bool,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn is_builtin(&self) -> bool {
        self.kind == CallKind::Builtin
    }

    /// Number of arguments that must be present.
    pub fn min_args(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !p.optional && !p.variadic)
            .count()
    }

    /// Maximum argument count, `None` when the last parameter is variadic.
    pub fn max_args(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.variadic) {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// The formal parameter governing argument `index`; a trailing variadic
    /// parameter absorbs every extra argument.
    pub fn param_for(&self, index: usize) -> Option<&Param> {
        if index < self.params.len() {
            self.params.get(index)
        } else {
            self.params.last().filter(|p| p.variadic)
        }
    }

    /// At most one parameter is variadic and it must be the last formal
    /// parameter.
    fn check_variadic_invariant(&self) -> Result<(), String> {
        let count = self.params.iter().filter(|p| p.variadic).count();
        if count > 1 {
            return Err("more than one variadic parameter".to_string());
        }
        if count == 1 && !self.params.last().map(|p| p.variadic).unwrap_or(false) {
            return Err("variadic parameter must be last".to_string());
        }
        Ok(())
    }
}

// ── Built-in signature table ─────────────────────────────────────────────────

fn builtin(name: &str, alias: &str, returns: ReturnKind, params: Vec<Param>) -> Signature {
    Signature {
        name: name.to_string(),
        alias: alias.to_string(),
        kind: CallKind::Builtin,
        returns,
        is_multi_valued: false,
        allowed_in_name: true,
        allowed_in_value: true,
        allowed_as_statement: false,
        params,
    }
}

fn statement(name: &str, alias: &str, params: Vec<Param>) -> Signature {
    Signature {
        name: name.to_string(),
        alias: alias.to_string(),
        kind: CallKind::Builtin,
        returns: ReturnKind::Array,
        is_multi_valued: true,
        allowed_in_name: false,
        allowed_in_value: true,
        allowed_as_statement: true,
        params,
    }
}

use ParamKind as K;
use ReturnKind as R;

static BUILTINS: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        builtin("valueOf", "valueOf", R::Any, vec![Param::lazy("path", K::Path)]),
        builtin("exists", "exists", R::Bool, vec![Param::lazy("pathOrValue", K::Any)]),
        builtin(
            "ifCondition",
            "if",
            R::Any,
            vec![
                Param::new("condition", K::Any),
                Param::lazy("then", K::Any),
                Param::lazy("else", K::Any),
            ],
        ),
        builtin("evalExpression", "eval", R::Any, vec![Param::new("expression", K::Str)]),
        statement(
            "loop",
            "loop",
            vec![
                Param::lazy("source", K::Enumeration),
                Param::lazy_optional("binding", K::Binding),
            ],
        ),
        statement("using", "using", vec![Param::lazy("binding", K::Binding)]),
        builtin("loopIndex", "loopIndex", R::Int, vec![]),
        builtin("loopProperty", "loopProperty", R::Str, vec![]),
        builtin("loopValue", "loopValue", R::Any, vec![]),
        builtin("loopValueOf", "loopValueOf", R::Any, vec![Param::lazy("path", K::Path)]),
        builtin(
            "indexOf",
            "indexOf",
            R::Int,
            vec![Param::new("text", K::Str), Param::new("search", K::Str)],
        ),
        builtin("length", "length", R::Int, vec![Param::new("value", K::Any)]),
        builtin(
            "substring",
            "substring",
            R::Str,
            vec![
                Param::new("text", K::Str),
                Param::new("start", K::Int),
                Param::optional("length", K::Int),
            ],
        ),
        builtin(
            "contains",
            "contains",
            R::Bool,
            vec![Param::new("haystack", K::Any), Param::new("needle", K::Any)],
        ),
        builtin(
            "split",
            "split",
            R::Array,
            vec![Param::new("text", K::Str), Param::new("separator", K::Str)],
        ),
        builtin(
            "join",
            "join",
            R::Str,
            vec![Param::new("items", K::Any), Param::new("separator", K::Str)],
        ),
        builtin(
            "groupBy",
            "groupBy",
            R::Array,
            vec![Param::new("items", K::Any), Param::new("property", K::Str)],
        ),
        builtin(
            "orderBy",
            "orderBy",
            R::Array,
            vec![Param::new("items", K::Any), Param::new("property", K::Str)],
        ),
        builtin(
            "orderByDesc",
            "orderByDesc",
            R::Array,
            vec![Param::new("items", K::Any), Param::new("property", K::Str)],
        ),
        builtin("sum", "sum", R::Any, vec![Param::new("items", K::Any)]),
        builtin("min", "min", R::Any, vec![Param::new("items", K::Any)]),
        builtin("max", "max", R::Any, vec![Param::new("items", K::Any)]),
        builtin("average", "average", R::Any, vec![Param::new("items", K::Any)]),
        builtin(
            "append",
            "append",
            R::Any,
            vec![
                Param::new("value", K::Any),
                Param::variadic("additional", K::Any),
            ],
        ),
        builtin(
            "filter",
            "filter",
            R::Array,
            vec![Param::new("items", K::Any), Param::lazy("predicate", K::Lambda)],
        ),
        builtin(
            "map",
            "map",
            R::Array,
            vec![Param::new("items", K::Any), Param::lazy("projection", K::Lambda)],
        ),
        builtin("isInteger", "isInteger", R::Bool, vec![Param::new("value", K::Any)]),
        builtin("isString", "isString", R::Bool, vec![Param::new("value", K::Any)]),
        builtin("isDecimal", "isDecimal", R::Bool, vec![Param::new("value", K::Any)]),
        builtin("isBoolean", "isBoolean", R::Bool, vec![Param::new("value", K::Any)]),
        builtin("isArray", "isArray", R::Bool, vec![Param::new("value", K::Any)]),
        builtin("toInteger", "toInteger", R::Int, vec![Param::new("value", K::Any)]),
        builtin("toString", "toString", R::Str, vec![Param::new("value", K::Any)]),
        builtin("toDecimal", "toDecimal", R::Any, vec![Param::new("value", K::Any)]),
        builtin("toBoolean", "toBoolean", R::Bool, vec![Param::new("value", K::Any)]),
    ]
});

// ── Host registration ────────────────────────────────────────────────────────

/// A host callable taking evaluated JSON arguments.
pub type HostFn =
    Arc<dyn Fn(&[serde_json::Value]) -> Result<serde_json::Value, String> + Send + Sync>;

/// A host callable bound to a method context (first argument).
pub type HostMethodFn = Arc<
    dyn Fn(&serde_json::Value, &[serde_json::Value]) -> Result<serde_json::Value, String>
        + Send
        + Sync,
>;

/// The function value behind a host registration.
#[derive(Clone)]
pub enum HostCallable {
    Static(HostFn),
    Instance(HostMethodFn),
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCallable::Static(_) => f.write_str("HostCallable::Static(..)"),
            HostCallable::Instance(_) => f.write_str("HostCallable::Instance(..)"),
        }
    }
}

/// A host-declared callable: alias, declared parameter list, and a direct
/// function value. Instance registrations require a method context at bind
/// time.
#[derive(Debug, Clone)]
pub struct Registration {
    pub alias: String,
    pub params: Vec<Param>,
    pub callable: HostCallable,
}

impl Registration {
    /// Register a free function under `alias`.
    pub fn function(
        alias: impl Into<String>,
        params: Vec<Param>,
        f: impl Fn(&[serde_json::Value]) -> Result<serde_json::Value, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Registration {
            alias: alias.into(),
            params,
            callable: HostCallable::Static(Arc::new(f)),
        }
    }

    /// Register an instance method under `alias`; the configured method
    /// context is supplied as the leading argument on every invocation.
    pub fn method(
        alias: impl Into<String>,
        params: Vec<Param>,
        f: impl Fn(&serde_json::Value, &[serde_json::Value]) -> Result<serde_json::Value, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Registration {
            alias: alias.into(),
            params,
            callable: HostCallable::Instance(Arc::new(f)),
        }
    }
}

#[derive(Debug)]
struct HostEntry {
    sig: Signature,
    callable: HostCallable,
}

// ── Catalog ──────────────────────────────────────────────────────────────────

/// Alias lookup failure, mapped onto a parse or evaluation error by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    NotFound,
    Ambiguous,
}

/// The fixed built-in signature list plus an append-only list of
/// host-registered callables. Concurrent `transform` calls share one
/// catalog; registration and lookup go through the interior lock.
#[derive(Debug)]
pub struct Catalog {
    host: RwLock<Vec<HostEntry>>,
    method_context: Option<serde_json::Value>,
}

impl Catalog {
    /// A catalog with built-ins only.
    pub fn new() -> Self {
        Catalog {
            host: RwLock::new(Vec::new()),
            method_context: None,
        }
    }

    /// Bind host registrations into callable descriptors. Fails when an
    /// instance registration exists and no method context was supplied, or a
    /// declared parameter list violates the variadic invariant.
    pub fn bind(
        registrations: Vec<Registration>,
        method_context: Option<serde_json::Value>,
    ) -> Result<Self, ResolutionError> {
        let catalog = Catalog {
            host: RwLock::new(Vec::new()),
            method_context,
        };
        for reg in registrations {
            catalog.register(reg)?;
        }
        Ok(catalog)
    }

    /// Append one host registration. Append-only; `clear` resets to the
    /// built-in-only state.
    pub fn register(&self, reg: Registration) -> Result<(), ResolutionError> {
        if matches!(reg.callable, HostCallable::Instance(_)) && self.method_context.is_none() {
            return Err(ResolutionError::MissingMethodContext(reg.alias));
        }
        let kind = match reg.callable {
            HostCallable::Static(_) => CallKind::HostStatic,
            HostCallable::Instance(_) => CallKind::HostInstance,
        };
        let sig = Signature {
            name: reg.alias.clone(),
            alias: reg.alias.clone(),
            kind,
            returns: ReturnKind::Any,
            is_multi_valued: false,
            allowed_in_name: true,
            allowed_in_value: true,
            allowed_as_statement: false,
            params: reg.params,
        };
        if let Err(reason) = sig.check_variadic_invariant() {
            return Err(ResolutionError::InvalidRegistration {
                alias: sig.alias,
                reason,
            });
        }
        self.host.write().expect("catalog lock").push(HostEntry {
            sig,
            callable: reg.callable,
        });
        Ok(())
    }

    /// Drop every host registration, leaving built-ins only.
    pub fn clear(&self) {
        self.host.write().expect("catalog lock").clear();
    }

    /// Resolve an alias (case-sensitive). One match wins outright; on a
    /// collision a single built-in is preferred; two or more host callables
    /// sharing an alias is ambiguous.
    pub fn resolve(&self, alias: &str) -> Result<Signature, ResolveError> {
        let builtin_match = BUILTINS.iter().find(|s| s.alias == alias);
        let host = self.host.read().expect("catalog lock");
        let host_matches: Vec<&HostEntry> =
            host.iter().filter(|e| e.sig.alias == alias).collect();

        match (builtin_match, host_matches.len()) {
            (None, 0) => Err(ResolveError::NotFound),
            (Some(b), _) => Ok(b.clone()),
            (None, 1) => Ok(host_matches[0].sig.clone()),
            (None, _) => Err(ResolveError::Ambiguous),
        }
    }

    /// Invoke a host callable with already-evaluated arguments.
    pub fn invoke_host(
        &self,
        alias: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, EvalError> {
        let host = self.host.read().expect("catalog lock");
        let entry = host
            .iter()
            .find(|e| e.sig.alias == alias)
            .ok_or_else(|| EvalError::HostFailure {
                alias: alias.to_string(),
                message: "not registered".to_string(),
            })?;
        let result = match &entry.callable {
            HostCallable::Static(f) => f(args),
            HostCallable::Instance(f) => {
                let ctx = self.method_context.as_ref().ok_or_else(|| {
                    EvalError::HostFailure {
                        alias: alias.to_string(),
                        message: "no method context bound".to_string(),
                    }
                })?;
                f(ctx, args)
            }
        };
        result.map_err(|message| EvalError::HostFailure {
            alias: alias.to_string(),
            message,
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(args: &[serde_json::Value]) -> Result<serde_json::Value, String> {
        Ok(args.first().cloned().unwrap_or(serde_json::Value::Null))
    }

    #[test]
    fn test_resolve_builtin() {
        let catalog = Catalog::new();
        let sig = catalog.resolve("valueOf").unwrap();
        assert!(sig.is_builtin());
        assert_eq!(sig.name, "valueOf");
        assert!(sig.params[0].lazy);
    }

    #[test]
    fn test_resolve_by_alias_not_name() {
        let catalog = Catalog::new();
        let sig = catalog.resolve("if").unwrap();
        assert_eq!(sig.name, "ifCondition");
        assert!(catalog.resolve("ifCondition").is_err());
    }

    #[test]
    fn test_unknown_alias() {
        let catalog = Catalog::new();
        assert_eq!(catalog.resolve("nope"), Err(ResolveError::NotFound));
    }

    #[test]
    fn test_builtin_preferred_over_host() {
        let catalog = Catalog::new();
        catalog
            .register(Registration::function(
                "valueOf",
                vec![Param::new("value", ParamKind::Any)],
                echo,
            ))
            .unwrap();
        let sig = catalog.resolve("valueOf").unwrap();
        assert!(sig.is_builtin());
    }

    #[test]
    fn test_ambiguous_host_aliases() {
        let catalog = Catalog::new();
        for _ in 0..2 {
            catalog
                .register(Registration::function(
                    "custom",
                    vec![Param::new("value", ParamKind::Any)],
                    echo,
                ))
                .unwrap();
        }
        assert_eq!(catalog.resolve("custom"), Err(ResolveError::Ambiguous));
    }

    #[test]
    fn test_clear_resets_to_builtins() {
        let catalog = Catalog::new();
        catalog
            .register(Registration::function(
                "custom",
                vec![Param::new("value", ParamKind::Any)],
                echo,
            ))
            .unwrap();
        assert!(catalog.resolve("custom").is_ok());
        catalog.clear();
        assert_eq!(catalog.resolve("custom"), Err(ResolveError::NotFound));
    }

    #[test]
    fn test_instance_requires_method_context() {
        let reg = Registration::method(
            "greet",
            vec![Param::new("name", ParamKind::Str)],
            |ctx, args| {
                let greeting = ctx.get("greeting").and_then(|v| v.as_str()).unwrap_or("hi");
                let name = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(format!("{} {}", greeting, name)))
            },
        );
        let err = Catalog::bind(vec![reg.clone()], None).unwrap_err();
        assert_eq!(err, ResolutionError::MissingMethodContext("greet".into()));

        let catalog = Catalog::bind(vec![reg], Some(json!({"greeting": "hello"}))).unwrap();
        let out = catalog.invoke_host("greet", &[json!("world")]).unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[test]
    fn test_variadic_invariant() {
        let catalog = Catalog::new();
        let bad = Registration::function(
            "bad",
            vec![
                Param::variadic("rest", ParamKind::Any),
                Param::new("after", ParamKind::Any),
            ],
            echo,
        );
        assert!(matches!(
            catalog.register(bad),
            Err(ResolutionError::InvalidRegistration { .. })
        ));
    }

    #[test]
    fn test_param_for_variadic_tail() {
        let catalog = Catalog::new();
        let sig = catalog.resolve("append").unwrap();
        assert_eq!(sig.param_for(0).unwrap().name, "value");
        assert_eq!(sig.param_for(5).unwrap().name, "additional");
        assert_eq!(sig.min_args(), 1);
        assert_eq!(sig.max_args(), None);
    }
}
