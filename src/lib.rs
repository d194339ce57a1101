//! JSON-to-JSON transformation driven by an embedded expression language.
//!
//! A specification document (itself JSON) describes, per property name and
//! per property value, how to derive output content from an input document:
//! path queries, function calls, loops, conditionals, local variables, and
//! lambda-style filters. Strings starting with the `#` call marker are
//! expressions; everything else is a literal template.
//!
//! ```
//! use transpec::Transformer;
//!
//! let engine = Transformer::with_defaults();
//! let output = engine
//!     .transform(
//!         r##"{"Integer": "#valueOf($.integerLiteral)"}"##,
//!         r##"{"integerLiteral": 1}"##,
//!     )
//!     .unwrap();
//! assert_eq!(output, r##"{"Integer":1}"##);
//! ```
//!
//! One configured [`Transformer`] may be shared across threads; each
//! `transform` call is synchronous and keeps its own traversal queue and
//! scope. The parsed-expression cache and the callable catalog are the only
//! shared mutable state and both are internally synchronized.

pub mod ast;
pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod path;
pub mod scope;
pub mod tokenizer;
pub mod transformer;
pub mod value;

use std::sync::Arc;

pub use catalog::{Catalog, Param, ParamKind, Registration};
pub use error::{EvalError, ParseError, ResolutionError, TransformError};
pub use value::Node;

use parser::ExprCache;
use scope::Scope;

/// Error propagation policy for evaluation-time failures. Parse-time and
/// configuration-time errors always abort regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Any evaluation error aborts the whole transform call.
    #[default]
    Strict,
    /// Evaluation errors are reported to the diagnostics sink, the failed
    /// node becomes null, and the transform continues.
    Loose,
}

/// Receives evaluation errors that loose mode continues past.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, error: &EvalError);
}

/// Default sink: forwards to the `log` facade at warn level.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, error: &EvalError) {
        log::warn!("transformation continued past error: {}", error);
    }
}

/// Construction-time configuration for a [`Transformer`].
pub struct Config {
    pub error_mode: ErrorMode,
    pub registrations: Vec<Registration>,
    /// Context object supplied as the leading argument to instance-bound
    /// host callables. Required when any instance registration is present.
    pub method_context: Option<serde_json::Value>,
    /// Diagnostics sink for loose mode; defaults to [`LogSink`].
    pub sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            error_mode: ErrorMode::Strict,
            registrations: Vec::new(),
            method_context: None,
            sink: None,
        }
    }
}

/// The configured engine. Holds the callable catalog and the shared
/// parsed-expression cache; per-call state lives on the stack of each
/// `transform` invocation.
pub struct Transformer {
    pub(crate) catalog: Catalog,
    pub(crate) cache: ExprCache,
    pub(crate) error_mode: ErrorMode,
    pub(crate) sink: Arc<dyn DiagnosticsSink>,
}

impl Transformer {
    /// Bind a configuration into a ready engine. Fails when a host
    /// registration is invalid or an instance registration lacks a method
    /// context.
    pub fn new(config: Config) -> Result<Self, ResolutionError> {
        let catalog = Catalog::bind(config.registrations, config.method_context)?;
        Ok(Transformer {
            catalog,
            cache: ExprCache::new(),
            error_mode: config.error_mode,
            sink: config.sink.unwrap_or_else(|| Arc::new(LogSink)),
        })
    }

    /// An engine with built-ins only and strict error propagation.
    pub fn with_defaults() -> Self {
        Transformer {
            catalog: Catalog::new(),
            cache: ExprCache::new(),
            error_mode: ErrorMode::Strict,
            sink: Arc::new(LogSink),
        }
    }

    /// Append one host callable. The parse cache is cleared because cached
    /// expressions embed resolved signatures.
    pub fn register(&self, registration: Registration) -> Result<(), ResolutionError> {
        self.catalog.register(registration)?;
        self.cache.clear();
        Ok(())
    }

    /// Drop every host registration, leaving built-ins only.
    pub fn clear_registrations(&self) {
        self.catalog.clear();
        self.cache.clear();
    }

    /// Transform serialized input JSON against a serialized specification,
    /// returning serialized output JSON.
    pub fn transform(&self, specification: &str, input: &str) -> Result<String, TransformError> {
        let spec = Node::from_json_str(specification)?;
        let input = Node::from_json_str(input)?;
        let output = self.transform_tree(&spec, input)?;
        Ok(output.to_json_string()?)
    }

    /// Tree-level entry point: drives a working copy of the specification
    /// against the input document.
    pub fn transform_tree(
        &self,
        specification: &Node,
        input: Node,
    ) -> Result<Node, TransformError> {
        let mut scope = Scope::new(input);
        let mut tree = specification.deep_copy();
        self.walk(&mut tree, &mut scope, None)
            .map_err(|e| match e {
                EvalError::Parse(parse) => TransformError::Parse(parse),
                other => TransformError::Eval(other),
            })?;
        Ok(tree)
    }
}
