// Node: Rc-wrapped JSON tree with O(1) cloning
// The single tree backend the evaluator and driver operate on

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A JSON tree node with O(1) clone semantics via Rc-wrapping.
///
/// Container and string variants are Rc-wrapped so that template copies and
/// closure-source pushes are cheap; mutation goes through `Rc::make_mut`
/// (copy-on-write). Numbers keep their integral/floating distinction because
/// the binary-operator promotion rules depend on it.
///
/// `Absent` marks "no value" (an unmatched path query) and is distinguishable
/// from an explicit JSON `null`; it serializes as `null` at the boundary.
#[derive(Clone, Debug)]
pub enum Node {
    Null,
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Node>>),
    Object(Rc<IndexMap<String, Node>>),
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl Node {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Absent)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Node::Bool(_))
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Node::Int(_))
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Node::Float(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Node::Int(_) | Node::Float(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Node::Str(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Node::Array(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    /// Short type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Absent => "absent",
            Node::Bool(_) => "boolean",
            Node::Int(_) => "integer",
            Node::Float(_) => "decimal",
            Node::Str(_) => "string",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl Node {
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(n) => Some(*n),
            Node::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Int(n) => Some(*n as f64),
            Node::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to the inner Vec, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Array(arr) => Some(Rc::make_mut(arr)),
            _ => None,
        }
    }

    /// Mutable access to the inner IndexMap, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Node::Object(map) => Some(Rc::make_mut(map)),
            _ => None,
        }
    }

    /// Ordered property access by name.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Indexed array access.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&Node> {
        match self {
            Node::Array(arr) => arr.get(index),
            _ => None,
        }
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Node {
    #[inline]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Node::Str(s.into())
    }

    #[inline]
    pub fn array(v: Vec<Node>) -> Self {
        Node::Array(Rc::new(v))
    }

    #[inline]
    pub fn object(m: IndexMap<String, Node>) -> Self {
        Node::Object(Rc::new(m))
    }
}

// ── Tree operations ──────────────────────────────────────────────────────────

impl Node {
    /// Structural deep copy, detached from every shared Rc in the original.
    ///
    /// A plain `clone` shares containers copy-on-write; loop bodies instead
    /// take a fully detached copy of the content template so per-iteration
    /// rewrites can never observe each other.
    pub fn deep_copy(&self) -> Node {
        match self {
            Node::Array(arr) => Node::array(arr.iter().map(Node::deep_copy).collect()),
            Node::Object(map) => Node::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Empty a container in place; scalars are untouched.
    pub fn clear_container(&mut self) {
        match self {
            Node::Array(arr) => Rc::make_mut(arr).clear(),
            Node::Object(map) => Rc::make_mut(map).clear(),
            _ => {}
        }
    }

    /// Render a scalar as a bare key string (no quotes); containers render as
    /// JSON text. Used for grouping and ordering keys.
    pub fn key_string(&self) -> String {
        match self {
            Node::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for Node {
    #[inline]
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    #[inline]
    fn from(n: i64) -> Self {
        Node::Int(n)
    }
}

impl From<i32> for Node {
    #[inline]
    fn from(n: i32) -> Self {
        Node::Int(n as i64)
    }
}

impl From<usize> for Node {
    #[inline]
    fn from(n: usize) -> Self {
        Node::Int(n as i64)
    }
}

impl From<f64> for Node {
    #[inline]
    fn from(n: f64) -> Self {
        Node::Float(n)
    }
}

impl From<&str> for Node {
    #[inline]
    fn from(s: &str) -> Self {
        Node::Str(s.into())
    }
}

impl From<String> for Node {
    #[inline]
    fn from(s: String) -> Self {
        Node::Str(s.into())
    }
}

impl From<Vec<Node>> for Node {
    #[inline]
    fn from(v: Vec<Node>) -> Self {
        Node::Array(Rc::new(v))
    }
}

impl From<IndexMap<String, Node>> for Node {
    #[inline]
    fn from(m: IndexMap<String, Node>) -> Self {
        Node::Object(Rc::new(m))
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Absent, Node::Absent) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => a == b,
            (Node::Int(a), Node::Float(b)) | (Node::Float(b), Node::Int(a)) => *a as f64 == *b,
            (Node::Str(a), Node::Str(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => a == b,
            (Node::Object(a), Node::Object(b)) => a == b,
            _ => false,
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null | Node::Absent => write!(f, "null"),
            Node::Bool(b) => write!(f, "{}", b),
            Node::Int(n) => write!(f, "{}", n),
            Node::Float(n) => {
                if n.is_finite() {
                    write!(f, "{}", n)
                } else {
                    write!(f, "null")
                }
            }
            Node::Str(s) => write!(f, "\"{}\"", escape_json_string(s)),
            Node::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Node::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":{}", escape_json_string(k), v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

// ── Serialization ────────────────────────────────────────────────────────────

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Node::Null | Node::Absent => serializer.serialize_none(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(n) => serializer.serialize_i64(*n),
            Node::Float(n) => {
                if n.is_finite() {
                    serializer.serialize_f64(*n)
                } else {
                    serializer.serialize_none()
                }
            }
            Node::Str(s) => serializer.serialize_str(s),
            Node::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for v in arr.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Node::Object(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

// ── Deserialization (single-pass JSON→Node) ──────────────────────────────────

impl<'de> serde::Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        if v <= i64::MAX as u64 {
            Ok(Node::Int(v as i64))
        } else {
            Ok(Node::Float(v as f64))
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::Str(v.into()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element()? {
            vec.push(elem);
        }
        Ok(Node::array(vec))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut m = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry()? {
            m.insert(k, v);
        }
        Ok(Node::object(m))
    }
}

// ── JSON string I/O ──────────────────────────────────────────────────────────

impl Node {
    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a JSON string into a Node (single-pass, no intermediate
    /// serde_json::Value).
    pub fn from_json_str(s: &str) -> Result<Node, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// ── Conversion from/to serde_json::Value (host boundary) ─────────────────────

impl From<serde_json::Value> for Node {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else {
                    Node::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Node::Str(s.into()),
            serde_json::Value::Array(arr) => {
                Node::Array(Rc::new(arr.into_iter().map(Node::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let m: IndexMap<String, Node> =
                    map.into_iter().map(|(k, v)| (k, Node::from(v))).collect();
                Node::Object(Rc::new(m))
            }
        }
    }
}

impl From<&Node> for serde_json::Value {
    fn from(v: &Node) -> Self {
        match v {
            Node::Null | Node::Absent => serde_json::Value::Null,
            Node::Bool(b) => serde_json::Value::Bool(*b),
            Node::Int(n) => serde_json::Value::Number((*n).into()),
            Node::Float(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Node::Str(s) => serde_json::Value::String(s.to_string()),
            Node::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(serde_json::Value::from).collect())
            }
            Node::Object(map) => {
                let m: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(m)
            }
        }
    }
}

// ── node! macro ──────────────────────────────────────────────────────────────

/// Macro for constructing Node literals, similar to serde_json::json!
///
/// Usage:
///   node!(null)           → Node::Null
///   node!(true)           → Node::Bool(true)
///   node!(42)             → Node::Int(42)
///   node!(3.14)           → Node::Float(3.14)
///   node!("hello")        → Node::Str(Rc::from("hello"))
///   node!([1, 2, 3])      → Node::Array(Rc::new(vec![...]))
///   node!({"k": v, ...})  → Node::Object(Rc::new(IndexMap from pairs))
///   node!(expr)           → Node::from(expr)
#[macro_export]
macro_rules! node {
    // null
    (null) => {
        $crate::value::Node::Null
    };

    // true
    (true) => {
        $crate::value::Node::Bool(true)
    };

    // false
    (false) => {
        $crate::value::Node::Bool(false)
    };

    // Array
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::value::Node::Array(std::rc::Rc::new(vec![ $( $crate::node!($elem) ),* ]))
    };

    // Object
    ({ $($key:tt : $val:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = indexmap::IndexMap::new();
            $(
                map.insert(($key).to_string(), $crate::node!($val));
            )*
            $crate::value::Node::Object(std::rc::Rc::new(map))
        }
    };

    // Expression (fallback)
    ($other:expr) => {
        $crate::value::Node::from($other)
    };
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_cheap() {
        let arr = Node::array(vec![Node::Int(1), Node::Int(2), Node::Int(3)]);
        let arr2 = arr.clone();
        if let (Node::Array(a), Node::Array(b)) = (&arr, &arr2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_deep_copy_detaches() {
        let inner = Node::array(vec![Node::Int(1)]);
        let outer = Node::array(vec![inner]);
        let copy = outer.deep_copy();
        if let (Node::Array(a), Node::Array(b)) = (&outer, &copy) {
            assert!(!Rc::ptr_eq(a, b));
            if let (Node::Array(ia), Node::Array(ib)) = (&a[0], &b[0]) {
                assert!(!Rc::ptr_eq(ia, ib));
            } else {
                panic!("expected inner arrays");
            }
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_clear_container() {
        let mut obj = node!({"a": 1i64, "b": 2i64});
        obj.clear_container();
        assert_eq!(obj.as_object().map(|m| m.len()), Some(0));

        let mut arr = node!([1i64, 2i64]);
        arr.clear_container();
        assert_eq!(arr.as_array().map(|a| a.len()), Some(0));
    }

    #[test]
    fn test_absent_vs_null() {
        assert_ne!(Node::Absent, Node::Null);
        assert!(Node::Absent.is_absent());
        // both render as JSON null at the boundary
        assert_eq!(Node::Absent.to_json_string().unwrap(), "null");
    }

    #[test]
    fn test_numeric_extraction() {
        assert_eq!(Node::Int(42).as_i64(), Some(42));
        assert_eq!(Node::Int(42).as_f64(), Some(42.0));
        assert_eq!(Node::Float(42.0).as_i64(), Some(42));
        assert_eq!(Node::Float(42.5).as_i64(), None);
        assert_eq!(Node::Int(3), Node::Float(3.0));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let parsed = Node::from_json_str(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        let keys: Vec<&String> = parsed.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(parsed.to_json_string().unwrap(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn test_int_float_roundtrip() {
        let parsed = Node::from_json_str(r#"{"i":7,"f":1.5}"#).unwrap();
        assert!(parsed.get("i").unwrap().is_int());
        assert!(parsed.get("f").unwrap().is_float());
        assert_eq!(parsed.to_json_string().unwrap(), r#"{"i":7,"f":1.5}"#);
    }

    #[test]
    fn test_from_serde_json() {
        let sv = serde_json::json!({"name": "Alice", "age": 30});
        let n = Node::from(sv);
        assert_eq!(n.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(n.get("age"), Some(&Node::Int(30)));
        let back = serde_json::Value::from(&n);
        assert_eq!(back, serde_json::json!({"name": "Alice", "age": 30}));
    }

    #[test]
    fn test_make_mut_is_cow() {
        let mut arr = Node::array(vec![Node::Int(1), Node::Int(2)]);
        let arr2 = arr.clone();
        arr.as_array_mut().unwrap().push(Node::Int(3));
        assert_eq!(arr.as_array().unwrap().len(), 3);
        assert_eq!(arr2.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_key_string() {
        assert_eq!(Node::string("x").key_string(), "x");
        assert_eq!(Node::Int(5).key_string(), "5");
        assert_eq!(Node::Bool(true).key_string(), "true");
    }
}
