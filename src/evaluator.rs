// Expression evaluator
// Reduces parsed expressions against the current scope. Built-ins dispatch
// through `functions`; host callables cross the serde_json boundary. The
// driver owns rule selection and result application; this module only turns
// one expression into a value (or many, for statement callables).

use crate::ast::{BinOp, Expr, LiteralKind};
use crate::catalog::Signature;
use crate::error::EvalError;
use crate::functions;
use crate::scope::Scope;
use crate::transformer::{EvalToken, SourceToken};
use crate::value::Node;
use crate::Transformer;

/// Whether the expression came from a property name or a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    PropertyName,
    PropertyValue,
}

/// Everything an evaluation needs: the engine (catalog, parse cache, nested
/// walks), the token being processed, and the mutable scope.
pub struct EvalContext<'a> {
    pub mode: EvalMode,
    pub engine: &'a Transformer,
    pub token: &'a EvalToken,
    pub scope: &'a mut Scope,
}

impl<'a> EvalContext<'a> {
    /// Run the driver over a detached template copy, as loop and using do
    /// for their body content.
    pub fn transform_subtree(
        &mut self,
        template: Node,
        source: Option<SourceToken>,
    ) -> Result<Node, EvalError> {
        self.engine.transform_template(template, self.scope, source)
    }
}

/// An already-reduced argument, or the unevaluated expression for a lazy
/// parameter.
pub enum Arg<'e> {
    Value(Node),
    Lazy(&'e Expr),
}

impl<'e> Arg<'e> {
    pub fn value(&self) -> Option<&Node> {
        match self {
            Arg::Value(n) => Some(n),
            Arg::Lazy(_) => None,
        }
    }

    pub fn expr(&self) -> Option<&'e Expr> {
        match self {
            Arg::Lazy(e) => Some(e),
            Arg::Value(_) => None,
        }
    }
}

/// Single- or multi-valued evaluation output. Only statement callables
/// produce `Many`; everywhere else a sequence is wrapped into an array.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    One(Node),
    Many(Vec<Node>),
}

/// The outcome the driver applies back into the working tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Rename target from a `-> name` suffix, when present.
    pub resolved_name: Option<String>,
    pub output: Output,
}

/// Evaluate a complete expression for the driver.
pub fn evaluate(expr: &Expr, ctx: &mut EvalContext) -> Result<EvalResult, EvalError> {
    let mut resolved_name = None;
    let output = match expr {
        Expr::Call { sig, args, rename } => {
            if ctx.mode == EvalMode::PropertyName {
                resolved_name = rename.clone();
            }
            eval_call(sig, args, ctx)?
        }
        other => Output::One(evaluate_expr(other, ctx)?),
    };
    Ok(EvalResult {
        resolved_name,
        output,
    })
}

/// Evaluate a sub-expression to a single node. A multi-valued callable in
/// nested position collapses to an array.
pub fn evaluate_expr(expr: &Expr, ctx: &mut EvalContext) -> Result<Node, EvalError> {
    match expr {
        Expr::Literal { kind, raw } => literal_value(*kind, raw),
        Expr::Path { query } => Ok(resolve_path(query, ctx)),
        Expr::Call { sig, args, .. } => match eval_call(sig, args, ctx)? {
            Output::One(node) => Ok(node),
            Output::Many(items) => Ok(Node::array(items)),
        },
        Expr::Binary { left, op, right } => {
            let l = evaluate_expr(left, ctx)?;
            let r = evaluate_expr(right, ctx)?;
            apply_binary(&l, *op, &r)
        }
        Expr::PropertyDereference { variable, segments } => {
            let mut node = ctx
                .scope
                .lookup(variable)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable(variable.clone()))?;
            for segment in segments {
                node = node.get(segment).cloned().unwrap_or(Node::Absent);
            }
            Ok(node)
        }
        Expr::RangeVariable { name } => ctx
            .scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::Range { start, end } => Ok(Node::array((*start..*end).map(Node::Int).collect())),
        Expr::EnumerateAsVariable { .. }
        | Expr::VariableAlias { .. }
        | Expr::RangeVariablePair { .. }
        | Expr::LambdaMethod { .. } => Err(EvalError::Type {
            name: "argument",
            message: "binding form used outside its parameter position".to_string(),
        }),
    }
}

fn eval_call(sig: &Signature, args: &[Expr], ctx: &mut EvalContext) -> Result<Output, EvalError> {
    let mut reduced: Vec<Arg> = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        // host callables always take evaluated arguments
        let lazy = sig.is_builtin() && sig.param_for(i).map(|p| p.lazy).unwrap_or(false);
        if lazy {
            reduced.push(Arg::Lazy(arg));
        } else {
            reduced.push(Arg::Value(evaluate_expr(arg, ctx)?));
        }
    }

    if sig.is_builtin() {
        return functions::invoke(&sig.name, &reduced, ctx);
    }

    let json_args: Vec<serde_json::Value> = reduced
        .iter()
        .filter_map(Arg::value)
        .map(serde_json::Value::from)
        .collect();
    let result = ctx.engine.catalog.invoke_host(&sig.alias, &json_args)?;
    Ok(Output::One(Node::from(result)))
}

/// Bind `element` to `variable` in a fresh frame and evaluate the lambda
/// body against it.
pub fn eval_lambda(
    variable: &str,
    body: &Expr,
    element: Node,
    ctx: &mut EvalContext,
) -> Result<Node, EvalError> {
    ctx.scope.enter_frame();
    ctx.scope.bind(variable, element);
    let result = evaluate_expr(body, ctx);
    ctx.scope.exit_frame();
    result
}

/// Path queries in plain expression position resolve against the innermost
/// closure source. No match is `Absent`; several matches collapse to an
/// array.
pub(crate) fn resolve_path(query: &str, ctx: &EvalContext) -> Node {
    let mut found = ctx.scope.resolve_all(query);
    match found.len() {
        0 => Node::Absent,
        1 => found.pop().unwrap_or(Node::Absent),
        _ => Node::array(found),
    }
}

fn literal_value(kind: LiteralKind, raw: &str) -> Result<Node, EvalError> {
    match kind {
        LiteralKind::Str => Ok(Node::string(raw)),
        LiteralKind::Int => raw.parse::<i64>().map(Node::Int).map_err(|_| {
            EvalError::Conversion {
                value: raw.to_string(),
                target: "integer",
            }
        }),
        LiteralKind::Float => raw.parse::<f64>().map(Node::Float).map_err(|_| {
            EvalError::Conversion {
                value: raw.to_string(),
                target: "decimal",
            }
        }),
        LiteralKind::Bool => match raw {
            "true" => Ok(Node::Bool(true)),
            "false" => Ok(Node::Bool(false)),
            _ => Err(EvalError::Conversion {
                value: raw.to_string(),
                target: "boolean",
            }),
        },
    }
}

// ── Binary operators ─────────────────────────────────────────────────────────

/// Promoted numeric operand pair: integer arithmetic only when both sides
/// are integral, otherwise both become decimals.
enum Promoted {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn promote(l: &Node, r: &Node, op: &'static str) -> Result<Promoted, EvalError> {
    match (l, r) {
        (Node::Int(a), Node::Int(b)) => Ok(Promoted::Ints(*a, *b)),
        (Node::Int(a), Node::Float(b)) => Ok(Promoted::Floats(*a as f64, *b)),
        (Node::Float(a), Node::Int(b)) => Ok(Promoted::Floats(*a, *b as f64)),
        (Node::Float(a), Node::Float(b)) => Ok(Promoted::Floats(*a, *b)),
        (Node::Bool(_), _) | (_, Node::Bool(_)) => Err(EvalError::BooleanOperand(op)),
        _ => Err(EvalError::OperatorTypeMismatch {
            op,
            left: l.type_name(),
            right: r.type_name(),
        }),
    }
}

/// Apply a binary operator with the numeric-promotion rules. Null and absent
/// operands are rejected outright; booleans participate in equality only;
/// strings participate in equality and inequality only.
pub fn apply_binary(l: &Node, op: BinOp, r: &Node) -> Result<Node, EvalError> {
    let sym = op.symbol();
    if l.is_null() || l.is_absent() || r.is_null() || r.is_absent() {
        return Err(EvalError::NullOperand(sym));
    }

    match op {
        BinOp::Eq | BinOp::Ne => {
            let equal = match (l, r) {
                (Node::Str(a), Node::Str(b)) => a == b,
                (Node::Bool(a), Node::Bool(b)) => a == b,
                _ => match promote(l, r, sym)? {
                    Promoted::Ints(a, b) => a == b,
                    Promoted::Floats(a, b) => a == b,
                },
            };
            Ok(Node::Bool(if op == BinOp::Eq { equal } else { !equal }))
        }
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = match promote(l, r, sym)? {
                Promoted::Ints(a, b) => a.cmp(&b),
                Promoted::Floats(a, b) => {
                    a.partial_cmp(&b).ok_or(EvalError::OperatorTypeMismatch {
                        op: sym,
                        left: l.type_name(),
                        right: r.type_name(),
                    })?
                }
            };
            let holds = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Node::Bool(holds))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => match promote(l, r, sym)? {
            Promoted::Ints(a, b) => {
                let value = match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::Div => {
                        if b == 0 {
                            return Err(EvalError::Type {
                                name: "arithmetic",
                                message: "division by zero".to_string(),
                            });
                        }
                        a.checked_div(b)
                    }
                    _ => unreachable!(),
                };
                value.map(Node::Int).ok_or(EvalError::Type {
                    name: "arithmetic",
                    message: "integer overflow".to_string(),
                })
            }
            Promoted::Floats(a, b) => {
                if op == BinOp::Div && b == 0.0 {
                    return Err(EvalError::Type {
                        name: "arithmetic",
                        message: "division by zero".to_string(),
                    });
                }
                let value = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => unreachable!(),
                };
                Ok(Node::Float(value))
            }
        },
    }
}
