// Path queries over Node trees
// The JSONPath-style subset the expression language needs: root, dot child,
// bracketed index/name, wildcard, recursive descent

use crate::value::Node;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// `.name` or `['name']`
    Child(String),
    /// `[n]`
    Index(usize),
    /// `[*]` or `.*`
    Wildcard,
    /// `..name`
    Recursive(String),
}

/// Parse a query into segments. A malformed query yields `None`, which the
/// selectors treat as "no match".
fn parse_query(query: &str) -> Option<Vec<Segment>> {
    let mut chars = query.chars().peekable();
    if chars.peek() == Some(&'$') {
        chars.next();
    }
    let mut segments = Vec::new();
    while let Some(&ch) = chars.peek() {
        match ch {
            '.' => {
                chars.next();
                if chars.peek() == Some(&'.') {
                    chars.next();
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return None;
                    }
                    segments.push(Segment::Recursive(name));
                } else if chars.peek() == Some(&'*') {
                    chars.next();
                    segments.push(Segment::Wildcard);
                } else {
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return None;
                    }
                    segments.push(Segment::Child(name));
                }
            }
            '[' => {
                chars.next();
                match chars.peek() {
                    Some('*') => {
                        chars.next();
                        if chars.next() != Some(']') {
                            return None;
                        }
                        segments.push(Segment::Wildcard);
                    }
                    Some('\'') => {
                        chars.next();
                        let mut name = String::new();
                        loop {
                            match chars.next() {
                                Some('\'') => break,
                                Some(c) => name.push(c),
                                None => return None,
                            }
                        }
                        if chars.next() != Some(']') {
                            return None;
                        }
                        segments.push(Segment::Child(name));
                    }
                    Some(c) if c.is_ascii_digit() => {
                        let mut digits = String::new();
                        while let Some(&c) = chars.peek() {
                            if c.is_ascii_digit() {
                                digits.push(c);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if chars.next() != Some(']') {
                            return None;
                        }
                        segments.push(Segment::Index(digits.parse().ok()?));
                    }
                    _ => return None,
                }
            }
            _ => {
                // Bare leading name (no dot), e.g. a relative "name.sub"
                let name = take_name(&mut chars);
                if name.is_empty() {
                    return None;
                }
                segments.push(Segment::Child(name));
            }
        }
    }
    Some(segments)
}

fn take_name(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c == '.' || c == '[' {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

fn apply(segment: &Segment, current: &[Node], out: &mut Vec<Node>) {
    for node in current {
        match segment {
            Segment::Child(name) => {
                if let Some(child) = node.get(name) {
                    out.push(child.clone());
                }
            }
            Segment::Index(i) => {
                if let Some(child) = node.get_index(*i) {
                    out.push(child.clone());
                }
            }
            Segment::Wildcard => match node {
                Node::Array(arr) => out.extend(arr.iter().cloned()),
                Node::Object(map) => out.extend(map.values().cloned()),
                _ => {}
            },
            Segment::Recursive(name) => collect_recursive(node, name, out),
        }
    }
}

fn collect_recursive(node: &Node, name: &str, out: &mut Vec<Node>) {
    match node {
        Node::Object(map) => {
            for (k, v) in map.iter() {
                if k == name {
                    out.push(v.clone());
                }
                collect_recursive(v, name, out);
            }
        }
        Node::Array(arr) => {
            for v in arr.iter() {
                collect_recursive(v, name, out);
            }
        }
        _ => {}
    }
}

/// All matches for `query` against `root`, in document order.
pub fn select(root: &Node, query: &str) -> Vec<Node> {
    let segments = match parse_query(query) {
        Some(segs) => segs,
        None => return Vec::new(),
    };
    let mut current = vec![root.clone()];
    for segment in &segments {
        let mut next = Vec::new();
        apply(segment, &current, &mut next);
        if next.is_empty() {
            return Vec::new();
        }
        current = next;
    }
    current
}

/// The first match for `query`, or `Absent` when nothing matches.
pub fn select_one(root: &Node, query: &str) -> Node {
    select(root, query).into_iter().next().unwrap_or(Node::Absent)
}

/// True when the query resolves to at least one node.
pub fn matches(root: &Node, query: &str) -> bool {
    !select(root, query).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node;

    fn doc() -> Node {
        node!({
            "store": {
                "books": [
                    {"title": "A", "price": 10i64},
                    {"title": "B", "price": 20i64}
                ],
                "open": true
            },
            "odd name": {"x": 1i64}
        })
    }

    #[test]
    fn test_root_child() {
        let d = doc();
        assert_eq!(select_one(&d, "$.store.open"), Node::Bool(true));
    }

    #[test]
    fn test_index_access() {
        let d = doc();
        assert_eq!(
            select_one(&d, "$.store.books[1].title"),
            Node::string("B")
        );
    }

    #[test]
    fn test_bracket_name() {
        let d = doc();
        assert_eq!(select_one(&d, "$['odd name'].x"), Node::Int(1));
    }

    #[test]
    fn test_wildcard() {
        let d = doc();
        let titles = select(&d, "$.store.books[*].title");
        assert_eq!(titles, vec![Node::string("A"), Node::string("B")]);
    }

    #[test]
    fn test_recursive_descent() {
        let d = doc();
        let prices = select(&d, "$..price");
        assert_eq!(prices, vec![Node::Int(10), Node::Int(20)]);
    }

    #[test]
    fn test_no_match_is_absent() {
        let d = doc();
        assert_eq!(select_one(&d, "$.missing"), Node::Absent);
        assert!(!matches(&d, "$.store.books[9]"));
    }

    #[test]
    fn test_relative_query() {
        let element = node!({"id": 7i64});
        assert_eq!(select_one(&element, "$.id"), Node::Int(7));
        assert_eq!(select_one(&element, "id"), Node::Int(7));
    }

    #[test]
    fn test_malformed_query_matches_nothing() {
        let d = doc();
        assert_eq!(select_one(&d, "$.store.books[x]"), Node::Absent);
        assert_eq!(select_one(&d, "$."), Node::Absent);
    }
}
