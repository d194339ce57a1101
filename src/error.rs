// Error taxonomy: one enum per propagation class
// Parse-time and resolution-time errors always abort; evaluation-time errors
// obey the strict/loose execution policy

use thiserror::Error;

/// Parse-time failures: malformed token streams, unresolved callables,
/// malformed operator/rename/range syntax. Never retried, never subject to
/// the loose-mode policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated literal: expected '{expected}' before end of input")]
    UnterminatedLiteral { expected: char },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expected {expected}, found '{found}' at position {pos}")]
    Expected {
        expected: &'static str,
        found: String,
        pos: usize,
    },

    #[error("unknown function '{0}'")]
    UnresolvedCallable(String),

    #[error("ambiguous method name/alias '{0}'")]
    AmbiguousAlias(String),

    #[error("only one comparison operator is allowed per expression")]
    MultipleComparisons,

    #[error("trailing comma in parameter list at position {pos}")]
    TrailingComma { pos: usize },

    #[error("negative sign must be followed by a numeric literal")]
    DanglingNegative,

    #[error("invalid token '{0}'")]
    InvalidToken(String),

    #[error("invalid range '{0}'")]
    InvalidRange(String),

    #[error("rename suffix '-> {0}' is only valid in property-name position")]
    RenameNotAllowed(String),

    #[error("'{name}' is not allowed in {position} position")]
    PositionNotAllowed {
        name: String,
        position: &'static str,
    },

    #[error("'{name}' expects at least {min} argument(s), got {actual}")]
    TooFewArguments {
        name: String,
        min: usize,
        actual: usize,
    },

    #[error("'{name}' expects at most {max} argument(s), got {actual}")]
    TooManyArguments {
        name: String,
        max: usize,
        actual: usize,
    },
}

/// Configuration/bind-time failures, surfaced before any document is
/// transformed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("instance callable '{0}' registered without a method context")]
    MissingMethodContext(String),

    #[error("registration for '{alias}' is invalid: {reason}")]
    InvalidRegistration { alias: String, reason: String },
}

/// Evaluation-time failures. Under strict mode these abort the transform;
/// under loose mode they are reported to the diagnostics sink and the failed
/// node becomes null.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: &'static str },

    #[error("null operand for operator '{0}'")]
    NullOperand(&'static str),

    #[error("boolean operand is not valid for operator '{0}'")]
    BooleanOperand(&'static str),

    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    OperatorTypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("loop template must be an array or object, found {0}")]
    LoopTemplateKind(&'static str),

    #[error("loop source '{query}' must be an enumerable {expected}, found {found}")]
    LoopSourceKind {
        query: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("loop template has no content element")]
    EmptyLoopTemplate,

    #[error("unknown range variable '{0}'")]
    UnknownVariable(String),

    #[error("'{name}': {message}")]
    Argument { name: &'static str, message: String },

    #[error("'{name}' type error: {message}")]
    Type { name: &'static str, message: String },

    #[error("non-numeric element '{0}' in aggregate")]
    NonNumericAggregate(String),

    #[error("cannot apply result of '{name}' to unsupported parent ({kind})")]
    UnsupportedParent { name: String, kind: &'static str },

    #[error("host callable '{alias}' failed: {message}")]
    HostFailure { alias: String, message: String },

    #[error("'{0}' may only be used inside a loop body")]
    OutsideLoop(&'static str),

    // eval() re-parses its argument text at run time
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Top-level error surfaced from `Transformer::transform`.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
