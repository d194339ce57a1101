// Transformation driver
// Breadth-first walk over a working copy of the specification tree. Each
// dequeued token is classified exactly once: name-expression, object-expand,
// array-expand, value-expression, or literal passthrough. Evaluation results
// are written back into the working tree by location.

use std::collections::VecDeque;

use crate::error::EvalError;
use crate::evaluator::{self, EvalContext, EvalMode, EvalResult, Output};
use crate::parser::Position;
use crate::scope::Scope;
use crate::value::Node;
use crate::{ErrorMode, Transformer};

pub(crate) const CALL_MARKER: char = '#';

/// One step in a location path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Key(String),
    Index(usize),
}

/// Address of a node in the working tree, from the root down.
pub type NodePath = Vec<Slot>;

/// Position within the loop source, present only inside a loop body.
/// `property` is empty when the source is an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceToken {
    pub index: usize,
    pub property: String,
}

/// One work item in the driver's traversal queue.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalToken {
    /// Property-name text this token was enqueued under (empty for array
    /// elements and the root).
    pub raw_name: String,
    pub location: NodePath,
    /// Snapshot of the specification subtree being visited, taken at dequeue
    /// time.
    pub node: Node,
    /// Snapshot of the parent specification node; absent at the root.
    pub parent: Option<Node>,
    pub source: Option<SourceToken>,
}

impl EvalToken {
    fn seed(source: Option<SourceToken>) -> Self {
        EvalToken {
            raw_name: String::new(),
            location: Vec::new(),
            node: Node::Absent,
            parent: None,
            source,
        }
    }

    /// A child work item inheriting this token's loop context.
    fn child(&self, raw_name: String, location: NodePath) -> Self {
        EvalToken {
            raw_name,
            location,
            node: Node::Absent,
            parent: None,
            source: self.source.clone(),
        }
    }
}

// ── Location access ──────────────────────────────────────────────────────────

fn node_at<'t>(tree: &'t Node, path: &[Slot]) -> Option<&'t Node> {
    let mut current = tree;
    for slot in path {
        current = match slot {
            Slot::Key(key) => current.get(key)?,
            Slot::Index(index) => current.get_index(*index)?,
        };
    }
    Some(current)
}

fn node_at_mut<'t>(tree: &'t mut Node, path: &[Slot]) -> Option<&'t mut Node> {
    let mut current = tree;
    for slot in path {
        current = match slot {
            Slot::Key(key) => current.as_object_mut()?.get_mut(key.as_str())?,
            Slot::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(current)
}

// ── Driver ───────────────────────────────────────────────────────────────────

impl Transformer {
    /// Drive a detached template copy to completion, as loop and using do for
    /// their body content. The caller has already pushed any closure source
    /// and variable bindings.
    pub(crate) fn transform_template(
        &self,
        template: Node,
        scope: &mut Scope,
        source: Option<SourceToken>,
    ) -> Result<Node, EvalError> {
        let mut tree = template;
        self.walk(&mut tree, scope, source)?;
        Ok(tree)
    }

    pub(crate) fn walk(
        &self,
        tree: &mut Node,
        scope: &mut Scope,
        source: Option<SourceToken>,
    ) -> Result<(), EvalError> {
        let mut queue = VecDeque::new();
        queue.push_back(EvalToken::seed(source));

        while let Some(mut token) = queue.pop_front() {
            // Snapshot the addressed node; a stale location (container already
            // rewritten by a statement) is simply skipped.
            let node = match node_at(tree, &token.location) {
                Some(n) => n.clone(),
                None => continue,
            };
            token.node = node.clone();
            token.parent = if token.location.is_empty() {
                None
            } else {
                node_at(tree, &token.location[..token.location.len() - 1]).cloned()
            };

            if token.raw_name.starts_with(CALL_MARKER) {
                self.evaluate_into(tree, &mut token, scope, EvalMode::PropertyName)?;
                continue;
            }
            match &node {
                Node::Object(map) => {
                    // A statement property value owns its sibling content,
                    // same as in arrays; only the statement itself is
                    // enqueued.
                    match map.iter().find(|(_, value)| self.is_statement(value)) {
                        Some((key, _)) => {
                            let mut location = token.location.clone();
                            location.push(Slot::Key(key.clone()));
                            queue.push_back(token.child(key.clone(), location));
                        }
                        None => {
                            for key in map.keys() {
                                let mut location = token.location.clone();
                                location.push(Slot::Key(key.clone()));
                                queue.push_back(token.child(key.clone(), location));
                            }
                        }
                    }
                }
                Node::Array(elements) => {
                    // A statement element owns its sibling content; only the
                    // statement itself is enqueued.
                    match elements.iter().position(|el| self.is_statement(el)) {
                        Some(index) => {
                            let mut location = token.location.clone();
                            location.push(Slot::Index(index));
                            queue.push_back(token.child(String::new(), location));
                        }
                        None => {
                            for index in 0..elements.len() {
                                let mut location = token.location.clone();
                                location.push(Slot::Index(index));
                                queue.push_back(token.child(String::new(), location));
                            }
                        }
                    }
                }
                Node::Str(text) if text.starts_with(CALL_MARKER) => {
                    self.evaluate_into(tree, &mut token, scope, EvalMode::PropertyValue)?;
                }
                // non-expression scalars are literal templates
                _ => {}
            }
        }
        Ok(())
    }

    /// True when an array element is a statement expression (loop, using)
    /// that consumes its sibling content.
    fn is_statement(&self, element: &Node) -> bool {
        let text = match element.as_str() {
            Some(t) if t.starts_with(CALL_MARKER) => t,
            _ => return false,
        };
        let alias: String = text[CALL_MARKER.len_utf8()..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            .collect();
        self.catalog
            .resolve(&alias)
            .map(|sig| sig.allowed_as_statement)
            .unwrap_or(false)
    }

    /// Parse, evaluate, and write back one expression-bearing token. Parse
    /// errors always abort; evaluation errors obey the strict/loose policy.
    fn evaluate_into(
        &self,
        tree: &mut Node,
        token: &mut EvalToken,
        scope: &mut Scope,
        mode: EvalMode,
    ) -> Result<(), EvalError> {
        let text = match mode {
            EvalMode::PropertyName => token.raw_name.clone(),
            EvalMode::PropertyValue => token.node.as_str().unwrap_or_default().to_string(),
        };
        let position = match mode {
            EvalMode::PropertyName => Position::Name,
            EvalMode::PropertyValue => Position::Value,
        };
        let expr = self.cache.parse(&text, position, &self.catalog)?;

        let outcome = {
            let mut ctx = EvalContext {
                mode,
                engine: self,
                token,
                scope,
            };
            evaluator::evaluate(&expr, &mut ctx)
        };

        match outcome {
            Ok(result) => self.apply(tree, token, result, mode),
            Err(err) => match self.error_mode {
                ErrorMode::Strict => Err(err),
                ErrorMode::Loose => {
                    self.sink.report(&err);
                    let substitute = EvalResult {
                        resolved_name: None,
                        output: Output::One(Node::Null),
                    };
                    self.apply(tree, token, substitute, mode)
                }
            },
        }
    }

    /// Write an evaluation result back into the working tree.
    fn apply(
        &self,
        tree: &mut Node,
        token: &EvalToken,
        result: EvalResult,
        mode: EvalMode,
    ) -> Result<(), EvalError> {
        let value = match result.output {
            // A multi-valued (statement) result replaces the whole enclosing
            // template container.
            Output::Many(items) => {
                if token.location.is_empty() {
                    *tree = Node::array(items);
                    return Ok(());
                }
                let parent_path = &token.location[..token.location.len() - 1];
                if let Some(container) = node_at_mut(tree, parent_path) {
                    *container = Node::array(items);
                }
                return Ok(());
            }
            Output::One(node) => node,
        };

        if token.location.is_empty() {
            *tree = value;
            return Ok(());
        }
        let parent_path = &token.location[..token.location.len() - 1];
        let parent = match node_at_mut(tree, parent_path) {
            Some(p) => p,
            None => return Ok(()), // container rewritten, nothing to apply
        };

        match mode {
            EvalMode::PropertyName => {
                let map = parent
                    .as_object_mut()
                    .ok_or_else(|| EvalError::UnsupportedParent {
                        name: token.raw_name.clone(),
                        kind: "non-object",
                    })?;
                match &result.resolved_name {
                    // rename rebuilds: remove the original, insert at the end
                    Some(new_name) => {
                        map.shift_remove(&token.raw_name);
                        map.insert(new_name.clone(), value);
                    }
                    // no rename: only the value changes, in place
                    None => {
                        map.insert(token.raw_name.clone(), value);
                    }
                }
                Ok(())
            }
            EvalMode::PropertyValue => match token.location.last() {
                Some(Slot::Key(key)) => {
                    let map = parent
                        .as_object_mut()
                        .ok_or_else(|| EvalError::UnsupportedParent {
                            name: key.clone(),
                            kind: "non-object",
                        })?;
                    map.insert(key.clone(), value);
                    Ok(())
                }
                Some(Slot::Index(index)) => {
                    let elements = parent.as_array_mut().ok_or_else(|| {
                        EvalError::UnsupportedParent {
                            name: token.raw_name.clone(),
                            kind: "non-array",
                        }
                    })?;
                    if let Some(slot) = elements.get_mut(*index) {
                        *slot = value;
                    }
                    Ok(())
                }
                None => unreachable!("non-root token has a last slot"),
            },
        }
    }
}
