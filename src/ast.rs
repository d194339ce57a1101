// Expression tree definitions
// Immutable after parsing; shared across concurrent runs through the
// parse cache, so every case is plain owned data

use crate::catalog::Signature;

/// Declared type of a literal; the raw text is converted lazily at
/// evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Str,
    Int,
    Float,
    Bool,
}

/// Binary operators, arithmetic and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn from_symbol(sym: &str) -> Option<BinOp> {
        Some(match sym {
            "=" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_additive(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub)
    }

    pub fn is_multiplicative(&self) -> bool {
        matches!(self, BinOp::Mul | BinOp::Div)
    }
}

/// The source of a `using` binding: a path query or an existing range
/// variable, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasSource {
    Path(String),
    Variable(String),
}

/// A parsed expression. One case per syntax form.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal; `raw` is converted to the declared kind at evaluation time.
    Literal { kind: LiteralKind, raw: String },

    /// A JSONPath-style query resolved against closure sources.
    Path { query: String },

    /// `#alias(args...)` with an optional `-> name` rename template,
    /// the latter only valid in property-name position.
    Call {
        sig: Signature,
        args: Vec<Expr>,
        rename: Option<String>,
    },

    /// `left op right`.
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// `$.path as item` in an enumeration parameter (loop source).
    EnumerateAsVariable { variable: String, source: String },

    /// `x -> body` in a lambda parameter.
    LambdaMethod { variable: String, body: Box<Expr> },

    /// `item.price.net` — a range variable dereferenced through property
    /// segments.
    PropertyDereference {
        variable: String,
        segments: Vec<String>,
    },

    /// `0..5` — a half-open integer range.
    Range { start: i64, end: i64 },

    /// A bare reference to a bound range variable.
    RangeVariable { name: String },

    /// `$.path as k:v` — name/value pair binding for object enumeration.
    RangeVariablePair { first: String, second: String },

    /// `$.path as v` (or `var as v`) in a binding parameter (`using`).
    VariableAlias { source: AliasSource, alias: String },
}

impl Expr {
    /// The rename template, when this expression carries one.
    pub fn rename_template(&self) -> Option<&str> {
        match self {
            Expr::Call { rename, .. } => rename.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop_symbols_roundtrip() {
        for sym in ["=", "!=", "<", ">", "<=", ">=", "+", "-", "*", "/"] {
            let op = BinOp::from_symbol(sym).unwrap();
            assert_eq!(op.symbol(), sym);
        }
        assert_eq!(BinOp::from_symbol("%"), None);
    }

    #[test]
    fn test_operator_classes() {
        assert!(BinOp::Le.is_comparison());
        assert!(!BinOp::Add.is_comparison());
        assert!(BinOp::Mul.is_multiplicative());
        assert!(BinOp::Sub.is_additive());
    }
}
