// Per-run evaluation scope: the closure-source stack (input-data nodes
// visible for relative path resolution) and the range-variable binding
// frames. Created fresh per transform call, never shared across runs.

use crate::path;
use crate::value::Node;

/// A named, scope-lived binding introduced by loop/using/lambda constructs.
/// The value is reassigned once per iteration; the binding dies with the
/// frame it was created in.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVariable {
    pub name: String,
    pub value: Node,
}

/// The evaluation scope.
///
/// Entering a frame clones the enclosing frame's bindings, so additions are
/// visible only within and disappear on exit. `bind` writes into the top
/// frame in place — the "apply to current" mode a using block relies on to
/// keep bindings visible across its body statements. Within one frame,
/// names are unique: rebinding a name overwrites its value rather than
/// shadowing it.
pub struct Scope {
    sources: Vec<Node>,
    frames: Vec<Vec<RangeVariable>>,
}

impl Scope {
    pub fn new(root: Node) -> Self {
        Scope {
            sources: vec![root],
            frames: vec![Vec::new()],
        }
    }

    // ── Closure sources ──────────────────────────────────────────────────

    pub fn push_source(&mut self, node: Node) {
        self.sources.push(node);
    }

    pub fn pop_source(&mut self) {
        // the document root at the bottom is never popped
        if self.sources.len() > 1 {
            self.sources.pop();
        }
    }

    /// The most specific enclosing input-data node.
    pub fn innermost_source(&self) -> &Node {
        self.sources.last().expect("scope always has a root source")
    }

    /// Resolve a query against the innermost source only.
    pub fn resolve(&self, query: &str) -> Node {
        path::select_one(self.innermost_source(), query)
    }

    /// All matches against the innermost source.
    pub fn resolve_all(&self, query: &str) -> Vec<Node> {
        path::select(self.innermost_source(), query)
    }

    /// Nearest-enclosing-scope search: try each closure source from the
    /// innermost outward and return the first set of matches.
    pub fn resolve_nearest(&self, query: &str) -> Vec<Node> {
        for source in self.sources.iter().rev() {
            let found = path::select(source, query);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    // ── Range-variable frames ────────────────────────────────────────────

    /// Enter a new frame, cloning the enclosing frame's bindings into it.
    pub fn enter_frame(&mut self) {
        let inherited = self.frames.last().cloned().unwrap_or_default();
        self.frames.push(inherited);
    }

    pub fn exit_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind a variable in the top frame, overwriting an existing binding of
    /// the same name in place.
    pub fn bind(&mut self, name: impl Into<String>, value: Node) {
        let name = name.into();
        let frame = self.frames.last_mut().expect("scope always has a frame");
        if let Some(existing) = frame.iter_mut().find(|v| v.name == name) {
            existing.value = value;
        } else {
            frame.push(RangeVariable { name, value });
        }
    }

    /// Remove a binding from the top frame.
    pub fn unbind(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.retain(|v| v.name != name);
        }
    }

    /// Look up a variable in the top frame. Bindings from enclosing frames
    /// are visible because they were cloned in on entry; bindings from
    /// exited frames are not.
    pub fn lookup(&self, name: &str) -> Option<&Node> {
        self.frames
            .last()
            .and_then(|frame| frame.iter().find(|v| v.name == name))
            .map(|v| &v.value)
    }
}
