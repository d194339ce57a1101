// Built-in function library
// One dispatch entry per built-in signature; the implementations receive the
// reduced argument list plus the live evaluation context. Statement callables
// (loop, using) re-enter the transformation driver for their body content.

use indexmap::IndexMap;

use crate::ast::{AliasSource, Expr};
use crate::error::EvalError;
use crate::evaluator::{self, Arg, EvalContext, Output};
use crate::transformer::{Slot, SourceToken};
use crate::value::Node;

/// Dispatch a built-in by canonical name.
pub fn invoke(name: &str, args: &[Arg], ctx: &mut EvalContext) -> Result<Output, EvalError> {
    match name {
        "valueOf" => one(value_of(args, ctx)),
        "exists" => one(exists(args, ctx)),
        "ifCondition" => one(if_condition(args, ctx)),
        "evalExpression" => one(eval_expression(args, ctx)),
        "loop" => loop_over(args, ctx).map(Output::Many),
        "using" => using(args, ctx).map(Output::Many),
        "loopIndex" => one(loop_index(ctx)),
        "loopProperty" => one(loop_property(ctx)),
        "loopValue" => one(Ok(ctx.scope.innermost_source().clone())),
        "loopValueOf" => one(loop_value_of(args, ctx)),
        "indexOf" => one(index_of(args)),
        "length" => one(length(args)),
        "substring" => one(substring(args)),
        "contains" => one(contains(args)),
        "split" => one(split(args)),
        "join" => one(join(args)),
        "groupBy" => one(group_like(args, ctx, GroupKind::Group)),
        "orderBy" => one(group_like(args, ctx, GroupKind::Ascending)),
        "orderByDesc" => one(group_like(args, ctx, GroupKind::Descending)),
        "sum" => one(aggregate(args, ctx, Aggregate::Sum)),
        "min" => one(aggregate(args, ctx, Aggregate::Min)),
        "max" => one(aggregate(args, ctx, Aggregate::Max)),
        "average" => one(aggregate(args, ctx, Aggregate::Average)),
        "append" => one(append(args)),
        "filter" => one(filter(args, ctx)),
        "map" => one(map_items(args, ctx)),
        "isInteger" => one(predicate(args, Node::is_int)),
        "isString" => one(predicate(args, Node::is_string)),
        "isDecimal" => one(predicate(args, Node::is_float)),
        "isBoolean" => one(predicate(args, Node::is_bool)),
        "isArray" => one(predicate(args, Node::is_array)),
        "toInteger" => one(to_integer(args)),
        "toString" => one(to_string(args)),
        "toDecimal" => one(to_decimal(args)),
        "toBoolean" => one(to_boolean(args)),
        other => Err(EvalError::Type {
            name: "dispatch",
            message: format!("no built-in named '{}'", other),
        }),
    }
}

fn one(result: Result<Node, EvalError>) -> Result<Output, EvalError> {
    result.map(Output::One)
}

// ── Argument access ──────────────────────────────────────────────────────────

fn value<'a>(args: &'a [Arg], idx: usize, name: &'static str) -> Result<&'a Node, EvalError> {
    args.get(idx)
        .and_then(Arg::value)
        .ok_or_else(|| EvalError::Argument {
            name,
            message: format!("argument {} missing or not evaluated", idx + 1),
        })
}

fn lazy<'a, 'e>(args: &'a [Arg<'e>], idx: usize, name: &'static str) -> Result<&'e Expr, EvalError> {
    args.get(idx)
        .and_then(Arg::expr)
        .ok_or_else(|| EvalError::Argument {
            name,
            message: format!("argument {} missing", idx + 1),
        })
}

/// The query text an argument expression denotes, when it does.
fn query_of(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Path { query } => Some(query),
        Expr::Literal {
            kind: crate::ast::LiteralKind::Str,
            raw,
        } => Some(raw),
        _ => None,
    }
}

/// Resolve an eagerly-evaluated "items" argument to array elements; a string
/// that is a path query is resolved against the innermost closure source
/// first.
fn array_items(node: &Node, ctx: &EvalContext, name: &'static str) -> Result<Vec<Node>, EvalError> {
    let resolved;
    let node = match node.as_str() {
        Some(s) if s.starts_with('$') => {
            resolved = ctx.scope.resolve(s);
            &resolved
        }
        _ => node,
    };
    node.as_array().cloned().ok_or_else(|| EvalError::Type {
        name,
        message: format!("expected an array, found {}", node.type_name()),
    })
}

// ── Queries and conditionals ─────────────────────────────────────────────────

fn value_of(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let expr = lazy(args, 0, "valueOf")?;
    match query_of(expr) {
        Some(query) => Ok(evaluator::resolve_path(query, ctx)),
        None => evaluator::evaluate_expr(expr, ctx),
    }
}

fn exists(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let expr = lazy(args, 0, "exists")?;
    if let Some(query) = query_of(expr) {
        return Ok(Node::Bool(!ctx.scope.resolve_all(query).is_empty()));
    }
    match evaluator::evaluate_expr(expr, ctx) {
        Ok(node) => Ok(Node::Bool(
            !node.is_null() && !node.is_absent() && node.as_str() != Some(""),
        )),
        Err(EvalError::UnknownVariable(_)) => Ok(Node::Bool(false)),
        Err(e) => Err(e),
    }
}

/// Exactly one branch is evaluated; a non-boolean or absent condition counts
/// as false.
fn if_condition(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let condition = value(args, 0, "if")?.as_bool().unwrap_or(false);
    let branch = if condition {
        lazy(args, 1, "if")?
    } else {
        lazy(args, 2, "if")?
    };
    evaluator::evaluate_expr(branch, ctx)
}

/// One level of textual indirection: the argument value is re-parsed as an
/// expression and evaluated in the current context.
fn eval_expression(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let node = value(args, 0, "eval")?;
    let text = node.as_str().ok_or_else(|| EvalError::Type {
        name: "eval",
        message: format!("expected expression text, found {}", node.type_name()),
    })?;
    let expr = ctx
        .engine
        .cache
        .parse(text, crate::parser::Position::Value, &ctx.engine.catalog)?;
    evaluator::evaluate_expr(&expr, ctx)
}

// ── Loop and using ───────────────────────────────────────────────────────────

fn own_slot<'a>(ctx: &'a EvalContext) -> Option<&'a Slot> {
    ctx.token.location.last()
}

fn loop_over(args: &[Arg], ctx: &mut EvalContext) -> Result<Vec<Node>, EvalError> {
    let source_expr = lazy(args, 0, "loop")?;
    let (source, query, mut item_alias) = match source_expr {
        Expr::Path { query } => (nearest(ctx, query), query.clone(), None),
        Expr::EnumerateAsVariable { variable, source } => {
            (nearest(ctx, source), source.clone(), Some(variable.clone()))
        }
        Expr::Range { start, end } => (
            Node::array((*start..*end).map(Node::Int).collect()),
            format!("{}..{}", start, end),
            None,
        ),
        other => {
            return Err(EvalError::Argument {
                name: "loop",
                message: format!("unsupported source form {:?}", other),
            })
        }
    };

    let mut pair_alias = None;
    if let Some(binding) = args.get(1).and_then(Arg::expr) {
        match binding {
            Expr::RangeVariablePair { first, second } => {
                pair_alias = Some((first.clone(), second.clone()));
            }
            Expr::RangeVariable { name } => item_alias = Some(name.clone()),
            other => {
                return Err(EvalError::Argument {
                    name: "loop",
                    message: format!("unsupported binding form {:?}", other),
                })
            }
        }
    }

    let template = ctx
        .token
        .parent
        .clone()
        .ok_or(EvalError::LoopTemplateKind("document root"))?;

    match &template {
        Node::Array(elements) => {
            let own = match own_slot(ctx) {
                Some(Slot::Index(i)) => *i,
                _ => usize::MAX,
            };
            let content = elements
                .iter()
                .enumerate()
                .find(|(i, _)| *i != own)
                .map(|(_, n)| n.clone())
                .ok_or(EvalError::EmptyLoopTemplate)?;
            let items = source
                .as_array()
                .ok_or_else(|| EvalError::LoopSourceKind {
                    query,
                    expected: "array",
                    found: source.type_name(),
                })?
                .clone();
            let mut out = Vec::with_capacity(items.len());
            for (index, element) in items.into_iter().enumerate() {
                let entry = LoopEntry {
                    index,
                    property: String::new(),
                    element,
                };
                out.push(run_iteration(ctx, &content, entry, &item_alias, &pair_alias)?);
            }
            Ok(out)
        }
        Node::Object(map) => {
            let own = match own_slot(ctx) {
                Some(Slot::Key(k)) => k.as_str(),
                _ => "",
            };
            let content = map
                .iter()
                .find(|(k, _)| k.as_str() != own)
                .map(|(_, v)| v.clone())
                .ok_or(EvalError::EmptyLoopTemplate)?;
            let entries = source
                .as_object()
                .ok_or_else(|| EvalError::LoopSourceKind {
                    query,
                    expected: "object",
                    found: source.type_name(),
                })?
                .clone();
            let mut out = Vec::with_capacity(entries.len());
            for (index, (property, element)) in entries.into_iter().enumerate() {
                let entry = LoopEntry {
                    index,
                    property,
                    element,
                };
                out.push(run_iteration(ctx, &content, entry, &item_alias, &pair_alias)?);
            }
            Ok(out)
        }
        other => Err(EvalError::LoopTemplateKind(other.type_name())),
    }
}

struct LoopEntry {
    index: usize,
    property: String,
    element: Node,
}

/// One loop iteration: push the element as the closure source, bind any
/// requested variables in a fresh frame, and drive the content template copy.
fn run_iteration(
    ctx: &mut EvalContext,
    content: &Node,
    entry: LoopEntry,
    item_alias: &Option<String>,
    pair_alias: &Option<(String, String)>,
) -> Result<Node, EvalError> {
    ctx.scope.push_source(entry.element.clone());
    ctx.scope.enter_frame();
    if let Some(name) = item_alias {
        ctx.scope.bind(name.clone(), entry.element.clone());
    }
    if let Some((first, second)) = pair_alias {
        let key = if entry.property.is_empty() {
            Node::Int(entry.index as i64)
        } else {
            Node::string(entry.property.as_str())
        };
        ctx.scope.bind(first.clone(), key);
        ctx.scope.bind(second.clone(), entry.element.clone());
    }

    let source = SourceToken {
        index: entry.index,
        property: entry.property,
    };
    let result = ctx.transform_subtree(content.deep_copy(), Some(source));

    ctx.scope.exit_frame();
    ctx.scope.pop_source();
    result
}

fn using(args: &[Arg], ctx: &mut EvalContext) -> Result<Vec<Node>, EvalError> {
    let binding = lazy(args, 0, "using")?;
    let (bound, alias) = match binding {
        Expr::VariableAlias { source, alias } => {
            let node = match source {
                AliasSource::Path(query) => nearest(ctx, query),
                AliasSource::Variable(name) => ctx
                    .scope
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownVariable(name.clone()))?,
            };
            (node, alias.clone())
        }
        other => {
            return Err(EvalError::Argument {
                name: "using",
                message: format!("unsupported binding form {:?}", other),
            })
        }
    };

    let template = ctx.token.parent.clone().ok_or(EvalError::Type {
        name: "using",
        message: "statement must appear inside an array block".to_string(),
    })?;
    let elements = template.as_array().ok_or_else(|| EvalError::Type {
        name: "using",
        message: format!(
            "statement block must be an array, found {}",
            template.type_name()
        ),
    })?;
    let own = match own_slot(ctx) {
        Some(Slot::Index(i)) => *i,
        _ => usize::MAX,
    };
    let body: Vec<Node> = elements
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != own)
        .map(|(_, n)| n.clone())
        .collect();
    if body.is_empty() {
        return Err(EvalError::Type {
            name: "using",
            message: "statement block has no body statements".to_string(),
        });
    }

    // One frame for the whole block, so the binding persists across body
    // statements and dies with the block.
    ctx.scope.enter_frame();
    ctx.scope.bind(alias.clone(), bound);
    let mut out = Vec::with_capacity(body.len());
    let mut failure = None;
    for statement in body {
        let source = ctx.token.source.clone();
        match ctx.transform_subtree(statement.deep_copy(), source) {
            Ok(node) => out.push(node),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    ctx.scope.exit_frame();
    match failure {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn nearest(ctx: &EvalContext, query: &str) -> Node {
    ctx.scope
        .resolve_nearest(query)
        .into_iter()
        .next()
        .unwrap_or(Node::Absent)
}

fn loop_index(ctx: &EvalContext) -> Result<Node, EvalError> {
    ctx.token
        .source
        .as_ref()
        .map(|s| Node::Int(s.index as i64))
        .ok_or(EvalError::OutsideLoop("loopIndex"))
}

fn loop_property(ctx: &EvalContext) -> Result<Node, EvalError> {
    ctx.token
        .source
        .as_ref()
        .map(|s| Node::string(s.property.as_str()))
        .ok_or(EvalError::OutsideLoop("loopProperty"))
}

fn loop_value_of(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let expr = lazy(args, 0, "loopValueOf")?;
    let query = query_of(expr).ok_or_else(|| EvalError::Argument {
        name: "loopValueOf",
        message: "expected a path query".to_string(),
    })?;
    Ok(nearest(ctx, query))
}

// ── Strings ──────────────────────────────────────────────────────────────────

fn str_arg<'a>(args: &'a [Arg], idx: usize, name: &'static str) -> Result<&'a str, EvalError> {
    let node = value(args, idx, name)?;
    node.as_str().ok_or_else(|| EvalError::Type {
        name,
        message: format!("expected a string, found {}", node.type_name()),
    })
}

fn index_of(args: &[Arg]) -> Result<Node, EvalError> {
    let text = str_arg(args, 0, "indexOf")?;
    let search = str_arg(args, 1, "indexOf")?;
    let index = text
        .find(search)
        .map(|byte| text[..byte].chars().count() as i64)
        .unwrap_or(-1);
    Ok(Node::Int(index))
}

fn length(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "length")?;
    let len = match node {
        Node::Str(s) => s.chars().count(),
        Node::Array(arr) => arr.len(),
        Node::Object(map) => map.len(),
        other => {
            return Err(EvalError::Type {
                name: "length",
                message: format!("expected string or container, found {}", other.type_name()),
            })
        }
    };
    Ok(Node::Int(len as i64))
}

fn substring(args: &[Arg]) -> Result<Node, EvalError> {
    let text = str_arg(args, 0, "substring")?;
    let start = int_arg(args, 1, "substring")?.max(0) as usize;
    let chars: Vec<char> = text.chars().collect();
    let start = start.min(chars.len());
    let end = match args.get(2).and_then(Arg::value) {
        Some(node) => {
            let len = node.as_i64().ok_or_else(|| EvalError::Type {
                name: "substring",
                message: format!("length must be an integer, found {}", node.type_name()),
            })?;
            (start + len.max(0) as usize).min(chars.len())
        }
        None => chars.len(),
    };
    Ok(Node::string(chars[start..end].iter().collect::<String>()))
}

fn int_arg(args: &[Arg], idx: usize, name: &'static str) -> Result<i64, EvalError> {
    let node = value(args, idx, name)?;
    node.as_i64().ok_or_else(|| EvalError::Type {
        name,
        message: format!("expected an integer, found {}", node.type_name()),
    })
}

fn contains(args: &[Arg]) -> Result<Node, EvalError> {
    let haystack = value(args, 0, "contains")?;
    let needle = value(args, 1, "contains")?;
    match haystack {
        Node::Str(text) => {
            let search = needle.as_str().ok_or_else(|| EvalError::Type {
                name: "contains",
                message: format!("expected a string needle, found {}", needle.type_name()),
            })?;
            Ok(Node::Bool(text.contains(search)))
        }
        Node::Array(items) => Ok(Node::Bool(items.iter().any(|item| item == needle))),
        other => Err(EvalError::Type {
            name: "contains",
            message: format!("expected string or array, found {}", other.type_name()),
        }),
    }
}

fn split(args: &[Arg]) -> Result<Node, EvalError> {
    let text = str_arg(args, 0, "split")?;
    let separator = str_arg(args, 1, "split")?;
    let parts = if separator.is_empty() {
        text.chars().map(|c| Node::string(c.to_string())).collect()
    } else {
        text.split(separator).map(Node::string).collect()
    };
    Ok(Node::array(parts))
}

fn join(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "join")?;
    let separator = str_arg(args, 1, "join")?;
    let items = node.as_array().ok_or_else(|| EvalError::Type {
        name: "join",
        message: format!("expected an array, found {}", node.type_name()),
    })?;
    let mut rendered = Vec::with_capacity(items.len());
    for item in items.iter() {
        if item.is_array() || item.is_object() {
            return Err(EvalError::Type {
                name: "join",
                message: format!("cannot join a nested {}", item.type_name()),
            });
        }
        rendered.push(item.key_string());
    }
    Ok(Node::string(rendered.join(separator)))
}

// ── Grouping, ordering, aggregates ───────────────────────────────────────────

enum GroupKind {
    Group,
    Ascending,
    Descending,
}

fn group_like(args: &[Arg], ctx: &EvalContext, kind: GroupKind) -> Result<Node, EvalError> {
    let name = match kind {
        GroupKind::Group => "groupBy",
        GroupKind::Ascending => "orderBy",
        GroupKind::Descending => "orderByDesc",
    };
    let items = array_items(value(args, 0, name)?, ctx, name)?;
    let property = str_arg(args, 1, name)?;
    match kind {
        GroupKind::Group => Ok(group_by(items, property)),
        GroupKind::Ascending => Ok(order_by(items, property, false)),
        GroupKind::Descending => Ok(order_by(items, property, true)),
    }
}

/// Group elements by the string-rendered value of `property`. Groups appear
/// in first-encounter order; membership keeps original relative order.
fn group_by(items: Vec<Node>, property: &str) -> Node {
    let mut groups: IndexMap<String, Vec<Node>> = IndexMap::new();
    for item in items {
        let key = item.get(property).map(Node::key_string).unwrap_or_default();
        groups.entry(key).or_default().push(item);
    }
    let out = groups
        .into_iter()
        .map(|(key, members)| {
            let mut group = IndexMap::new();
            group.insert(property.to_string(), Node::string(key));
            group.insert("items".to_string(), Node::array(members));
            Node::object(group)
        })
        .collect();
    Node::array(out)
}

/// Stable sort by the string-rendered value of `property`.
fn order_by(mut items: Vec<Node>, property: &str, descending: bool) -> Node {
    let key = |item: &Node| item.get(property).map(Node::key_string).unwrap_or_default();
    if descending {
        items.sort_by(|a, b| key(b).cmp(&key(a)));
    } else {
        items.sort_by(|a, b| key(a).cmp(&key(b)));
    }
    Node::array(items)
}

enum Aggregate {
    Sum,
    Min,
    Max,
    Average,
}

/// Integer arithmetic only when every element is integral; floating when
/// every element is numeric; otherwise a type error.
fn aggregate(args: &[Arg], ctx: &EvalContext, op: Aggregate) -> Result<Node, EvalError> {
    let name = match op {
        Aggregate::Sum => "sum",
        Aggregate::Min => "min",
        Aggregate::Max => "max",
        Aggregate::Average => "average",
    };
    let items = array_items(value(args, 0, name)?, ctx, name)?;
    if items.is_empty() {
        return Ok(match op {
            Aggregate::Sum => Node::Int(0),
            _ => Node::Absent,
        });
    }
    if let Some(bad) = items.iter().find(|n| !n.is_number()) {
        return Err(EvalError::NonNumericAggregate(bad.to_string()));
    }

    if items.iter().all(Node::is_int) {
        let values: Vec<i64> = items.iter().filter_map(Node::as_i64).collect();
        let total: i64 = values.iter().sum();
        Ok(match op {
            Aggregate::Sum => Node::Int(total),
            Aggregate::Min => Node::Int(values.iter().copied().min().unwrap_or(0)),
            Aggregate::Max => Node::Int(values.iter().copied().max().unwrap_or(0)),
            Aggregate::Average => Node::Int(total / values.len() as i64),
        })
    } else {
        let values: Vec<f64> = items.iter().filter_map(Node::as_f64).collect();
        let total: f64 = values.iter().sum();
        Ok(match op {
            Aggregate::Sum => Node::Float(total),
            Aggregate::Min => Node::Float(values.iter().copied().fold(f64::INFINITY, f64::min)),
            Aggregate::Max => {
                Node::Float(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
            Aggregate::Average => Node::Float(total / values.len() as f64),
        })
    }
}

/// Left-fold pairwise concatenation: array+array, object+object, or
/// string+string.
fn append(args: &[Arg]) -> Result<Node, EvalError> {
    let mut acc = value(args, 0, "append")?.clone();
    for arg in &args[1..] {
        let next = arg.value().ok_or_else(|| EvalError::Argument {
            name: "append",
            message: "argument not evaluated".to_string(),
        })?;
        acc = append_pair(acc, next)?;
    }
    Ok(acc)
}

fn append_pair(acc: Node, next: &Node) -> Result<Node, EvalError> {
    match (acc, next) {
        (Node::Array(left), Node::Array(right)) => {
            let mut items = (*left).clone();
            items.extend(right.iter().cloned());
            Ok(Node::array(items))
        }
        (Node::Object(left), Node::Object(right)) => {
            // a JSON tree cannot hold duplicate keys; a conflicting name
            // keeps its original position with the later value
            let mut map = (*left).clone();
            for (k, v) in right.iter() {
                map.insert(k.clone(), v.clone());
            }
            Ok(Node::object(map))
        }
        (Node::Str(left), Node::Str(right)) => {
            Ok(Node::string(format!("{}{}", left, right)))
        }
        (acc, next) => Err(EvalError::Type {
            name: "append",
            message: format!(
                "cannot append {} to {}",
                next.type_name(),
                acc.type_name()
            ),
        }),
    }
}

// ── Lambdas ──────────────────────────────────────────────────────────────────

fn lambda_parts<'e>(
    args: &[Arg<'e>],
    name: &'static str,
) -> Result<(&'e str, &'e Expr), EvalError> {
    match lazy(args, 1, name)? {
        Expr::LambdaMethod { variable, body } => Ok((variable.as_str(), body.as_ref())),
        other => Err(EvalError::Argument {
            name,
            message: format!("expected a lambda, found {:?}", other),
        }),
    }
}

fn filter(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let items = array_items(value(args, 0, "filter")?, ctx, "filter")?;
    let (variable, body) = lambda_parts(args, "filter")?;
    let mut kept = Vec::new();
    for item in items {
        let verdict = evaluator::eval_lambda(variable, body, item.clone(), ctx)?;
        match verdict.as_bool() {
            Some(true) => kept.push(item),
            Some(false) => {}
            None => {
                return Err(EvalError::Type {
                    name: "filter",
                    message: format!(
                        "predicate must return a boolean, found {}",
                        verdict.type_name()
                    ),
                })
            }
        }
    }
    Ok(Node::array(kept))
}

fn map_items(args: &[Arg], ctx: &mut EvalContext) -> Result<Node, EvalError> {
    let items = array_items(value(args, 0, "map")?, ctx, "map")?;
    let (variable, body) = lambda_parts(args, "map")?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(evaluator::eval_lambda(variable, body, item, ctx)?);
    }
    Ok(Node::array(out))
}

// ── Type predicates and coercions ────────────────────────────────────────────

fn predicate(args: &[Arg], test: impl Fn(&Node) -> bool) -> Result<Node, EvalError> {
    Ok(Node::Bool(test(value(args, 0, "predicate")?)))
}

fn to_integer(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "toInteger")?;
    let conversion = || EvalError::Conversion {
        value: node.to_string(),
        target: "integer",
    };
    match node {
        Node::Int(n) => Ok(Node::Int(*n)),
        Node::Float(_) => node.as_i64().map(Node::Int).ok_or_else(conversion),
        Node::Str(s) => s.trim().parse::<i64>().map(Node::Int).map_err(|_| conversion()),
        Node::Bool(b) => Ok(Node::Int(i64::from(*b))),
        _ => Err(conversion()),
    }
}

fn to_string(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "toString")?;
    Ok(Node::string(node.key_string()))
}

fn to_decimal(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "toDecimal")?;
    let conversion = || EvalError::Conversion {
        value: node.to_string(),
        target: "decimal",
    };
    match node {
        Node::Int(n) => Ok(Node::Float(*n as f64)),
        Node::Float(f) => Ok(Node::Float(*f)),
        Node::Str(s) => s.trim().parse::<f64>().map(Node::Float).map_err(|_| conversion()),
        _ => Err(conversion()),
    }
}

fn to_boolean(args: &[Arg]) -> Result<Node, EvalError> {
    let node = value(args, 0, "toBoolean")?;
    match node {
        Node::Bool(b) => Ok(Node::Bool(*b)),
        Node::Int(n) => Ok(Node::Bool(*n != 0)),
        Node::Str(s) => match s.trim() {
            "true" => Ok(Node::Bool(true)),
            "false" => Ok(Node::Bool(false)),
            _ => Err(EvalError::Conversion {
                value: node.to_string(),
                target: "boolean",
            }),
        },
        _ => Err(EvalError::Conversion {
            value: node.to_string(),
            target: "boolean",
        }),
    }
}
