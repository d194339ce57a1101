// Recursive-descent expression parser
// Resolves callable aliases against the catalog at parse time, so unknown
// names, arity errors and position violations surface before evaluation.
// Parsed expressions are immutable and shared through `ExprCache`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::ast::{AliasSource, BinOp, Expr, LiteralKind};
use crate::catalog::{Catalog, Param, ParamKind, ResolveError, Signature};
use crate::error::ParseError;
use crate::tokenizer::{tokenize, Token, TokenKind};

/// Where the expression text came from. Property-name and property-value
/// expressions have different grammar (rename suffix, statement placement),
/// so cache entries are keyed by position as well as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Name,
    Value,
}

/// Parse `text` as a complete expression.
pub fn parse(text: &str, position: Position, catalog: &Catalog) -> Result<Expr, ParseError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        position,
        catalog,
    };
    let mut expr = parser.parse_expression()?;

    // The tokenizer only emits a rename target after every paren has closed,
    // so when present it is the final token.
    if parser.peek_kind() == Some(TokenKind::GeneratedName) {
        let tok = parser.advance().ok_or(ParseError::UnexpectedEnd)?;
        if position != Position::Name {
            return Err(ParseError::RenameNotAllowed(tok.text));
        }
        match &mut expr {
            Expr::Call { rename, .. } => *rename = Some(tok.text),
            _ => return Err(ParseError::RenameNotAllowed(tok.text)),
        }
    }

    if let Some(tok) = parser.peek() {
        return Err(ParseError::Expected {
            expected: "end of expression",
            found: tok.text.clone(),
            pos: tok.pos,
        });
    }
    Ok(expr)
}

struct Parser<'c> {
    tokens: Vec<Token>,
    pos: usize,
    position: Position,
    catalog: &'c Catalog,
}

impl<'c> Parser<'c> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_text(&self) -> Option<&str> {
        self.peek().map(|t| t.text.as_str())
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        match self.advance() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(ParseError::Expected {
                expected,
                found: tok.text,
                pos: tok.pos,
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn unexpected(&mut self, expected: &'static str) -> ParseError {
        match self.advance() {
            Some(tok) => ParseError::Expected {
                expected,
                found: tok.text,
                pos: tok.pos,
            },
            None => ParseError::UnexpectedEnd,
        }
    }

    // ── Precedence tiers ─────────────────────────────────────────────────

    /// comparison → additive → multiplicative → primary; at most one
    /// comparison operator per expression.
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        if let Some(op) = self.peek_operator().filter(BinOp::is_comparison) {
            self.advance();
            let right = self.parse_additive()?;
            if self.peek_operator().filter(BinOp::is_comparison).is_some() {
                return Err(ParseError::MultipleComparisons);
            }
            return Ok(Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.peek_operator().filter(BinOp::is_additive) {
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;
        while let Some(op) = self.peek_operator().filter(BinOp::is_multiplicative) {
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn peek_operator(&self) -> Option<BinOp> {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Operator => BinOp::from_symbol(&tok.text),
            _ => None,
        }
    }

    // ── Primaries ────────────────────────────────────────────────────────

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::CallStart) => self.parse_call(),
            Some(TokenKind::PathLiteral) => {
                let tok = self.advance().ok_or(ParseError::UnexpectedEnd)?;
                Ok(Expr::Path { query: tok.text })
            }
            Some(TokenKind::StringLiteral) => {
                let tok = self.advance().ok_or(ParseError::UnexpectedEnd)?;
                Ok(Expr::Literal {
                    kind: LiteralKind::Str,
                    raw: tok.text,
                })
            }
            Some(TokenKind::NumericLiteral) => {
                let tok = self.advance().ok_or(ParseError::UnexpectedEnd)?;
                numeric_literal(&tok.text, false)
            }
            Some(TokenKind::Operator) if self.peek_text() == Some("-") => {
                self.advance();
                match self.peek_kind() {
                    Some(TokenKind::NumericLiteral) => {
                        let tok = self.advance().ok_or(ParseError::UnexpectedEnd)?;
                        numeric_literal(&tok.text, true)
                    }
                    _ => Err(ParseError::DanglingNegative),
                }
            }
            Some(TokenKind::BooleanLiteral) => {
                let tok = self.advance().ok_or(ParseError::UnexpectedEnd)?;
                letter_run(&tok.text)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::CallStart, "'#'")?;
        let alias = self.expect(TokenKind::Identifier, "function name")?.text;
        let sig = self.resolve(&alias)?;
        self.check_position(&sig)?;
        self.expect(TokenKind::ParamsStart, "'('")?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::CallEnd) {
            self.advance();
        } else {
            loop {
                let param = sig.param_for(args.len()).cloned();
                args.push(self.parse_argument(param.as_ref())?);
                match self.advance() {
                    Some(tok) if tok.kind == TokenKind::ParamSeparator => {
                        if self.peek_kind() == Some(TokenKind::CallEnd) {
                            return Err(ParseError::TrailingComma { pos: tok.pos });
                        }
                    }
                    Some(tok) if tok.kind == TokenKind::CallEnd => break,
                    Some(tok) => {
                        return Err(ParseError::Expected {
                            expected: "',' or ')'",
                            found: tok.text,
                            pos: tok.pos,
                        })
                    }
                    None => return Err(ParseError::UnexpectedEnd),
                }
            }
        }

        self.check_arity(&sig, args.len())?;
        Ok(Expr::Call {
            sig,
            args,
            rename: None,
        })
    }

    fn resolve(&self, alias: &str) -> Result<Signature, ParseError> {
        self.catalog.resolve(alias).map_err(|e| match e {
            ResolveError::NotFound => ParseError::UnresolvedCallable(alias.to_string()),
            ResolveError::Ambiguous => ParseError::AmbiguousAlias(alias.to_string()),
        })
    }

    fn check_position(&self, sig: &Signature) -> Result<(), ParseError> {
        let allowed = match self.position {
            Position::Name => sig.allowed_in_name,
            Position::Value => sig.allowed_in_value,
        };
        if !allowed {
            return Err(ParseError::PositionNotAllowed {
                name: sig.alias.clone(),
                position: match self.position {
                    Position::Name => "property-name",
                    Position::Value => "property-value",
                },
            });
        }
        Ok(())
    }

    fn check_arity(&self, sig: &Signature, actual: usize) -> Result<(), ParseError> {
        let min = sig.min_args();
        if actual < min {
            return Err(ParseError::TooFewArguments {
                name: sig.alias.clone(),
                min,
                actual,
            });
        }
        if let Some(max) = sig.max_args() {
            if actual > max {
                return Err(ParseError::TooManyArguments {
                    name: sig.alias.clone(),
                    max,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// The declared parameter kind steers which grammar an argument uses;
    /// everything else falls back to the general expression grammar.
    fn parse_argument(&mut self, param: Option<&Param>) -> Result<Expr, ParseError> {
        match param.map(|p| p.kind) {
            Some(ParamKind::Enumeration) => self.parse_enumeration_argument(),
            Some(ParamKind::Binding) => self.parse_binding_argument(),
            Some(ParamKind::Lambda) => self.parse_lambda_argument(),
            _ => self.parse_expression(),
        }
    }

    /// `$.path`, `$.path as item`, or an integer range.
    fn parse_enumeration_argument(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == Some(TokenKind::PathLiteral) {
            let source = self.advance().ok_or(ParseError::UnexpectedEnd)?.text;
            if self.peek_text() == Some("as") {
                self.advance();
                let variable = self.binding_name()?;
                if variable.contains(':') {
                    return Err(ParseError::InvalidToken(variable));
                }
                return Ok(Expr::EnumerateAsVariable { variable, source });
            }
            return Ok(Expr::Path { query: source });
        }
        self.parse_expression()
    }

    /// `$.path as v`, `var as v`, `item`, or `k:v`.
    fn parse_binding_argument(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::PathLiteral) => {
                let source = self.advance().ok_or(ParseError::UnexpectedEnd)?.text;
                if self.peek_text() != Some("as") {
                    return Err(self.unexpected("'as'"));
                }
                self.advance();
                let alias = self.binding_name()?;
                if alias.contains(':') {
                    return Err(ParseError::InvalidToken(alias));
                }
                Ok(Expr::VariableAlias {
                    source: AliasSource::Path(source),
                    alias,
                })
            }
            Some(TokenKind::BooleanLiteral) => {
                let text = self.advance().ok_or(ParseError::UnexpectedEnd)?.text;
                if let Some((first, second)) = text.split_once(':') {
                    if first.is_empty() || second.is_empty() || second.contains(':') {
                        return Err(ParseError::InvalidToken(text));
                    }
                    return Ok(Expr::RangeVariablePair {
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
                if self.peek_text() == Some("as") {
                    self.advance();
                    let alias = self.binding_name()?;
                    if alias.contains(':') {
                        return Err(ParseError::InvalidToken(alias));
                    }
                    return Ok(Expr::VariableAlias {
                        source: AliasSource::Variable(text),
                        alias,
                    });
                }
                Ok(Expr::RangeVariable { name: text })
            }
            _ => Err(self.unexpected("binding")),
        }
    }

    /// `x -> body`.
    fn parse_lambda_argument(&mut self) -> Result<Expr, ParseError> {
        let variable = match self.peek_kind() {
            Some(TokenKind::BooleanLiteral) => {
                let text = self.advance().ok_or(ParseError::UnexpectedEnd)?.text;
                if text.contains('.') || text.contains(':') {
                    return Err(ParseError::InvalidToken(text));
                }
                text
            }
            _ => return Err(self.unexpected("lambda parameter")),
        };
        self.expect(TokenKind::LambdaArrow, "'->'")?;
        let body = self.parse_expression()?;
        Ok(Expr::LambdaMethod {
            variable,
            body: Box::new(body),
        })
    }

    fn binding_name(&mut self) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::BooleanLiteral) => {
                Ok(self.advance().ok_or(ParseError::UnexpectedEnd)?.text)
            }
            _ => Err(self.unexpected("binding name")),
        }
    }
}

/// Classify a digit-led run: range, decimal, or integer.
fn numeric_literal(text: &str, negative: bool) -> Result<Expr, ParseError> {
    if let Some((start, end)) = text.split_once("..") {
        if negative {
            return Err(ParseError::InvalidRange(text.to_string()));
        }
        let start: i64 = start
            .parse()
            .map_err(|_| ParseError::InvalidRange(text.to_string()))?;
        let end: i64 = end
            .parse()
            .map_err(|_| ParseError::InvalidRange(text.to_string()))?;
        return Ok(Expr::Range { start, end });
    }
    let raw = if negative {
        format!("-{}", text)
    } else {
        text.to_string()
    };
    let kind = if text.contains('.') {
        if raw.parse::<f64>().is_err() {
            return Err(ParseError::InvalidToken(raw));
        }
        LiteralKind::Float
    } else {
        if raw.parse::<i64>().is_err() {
            return Err(ParseError::InvalidToken(raw));
        }
        LiteralKind::Int
    };
    Ok(Expr::Literal { kind, raw })
}

/// Classify a letter-led run in general expression position: boolean
/// literal, dotted variable dereference, or a bare variable reference.
fn letter_run(text: &str) -> Result<Expr, ParseError> {
    if text == "true" || text == "false" {
        return Ok(Expr::Literal {
            kind: LiteralKind::Bool,
            raw: text.to_string(),
        });
    }
    if text.contains(':') {
        return Err(ParseError::InvalidToken(text.to_string()));
    }
    if text.contains('.') {
        let mut parts = text.split('.');
        let variable = parts.next().unwrap_or_default().to_string();
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if variable.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ParseError::InvalidToken(text.to_string()));
        }
        return Ok(Expr::PropertyDereference { variable, segments });
    }
    Ok(Expr::RangeVariable {
        name: text.to_string(),
    })
}

// ── Parse cache ──────────────────────────────────────────────────────────────

/// Concurrent cache of parsed expressions, keyed by (position, text).
/// Cached entries embed resolved signatures, so the cache is cleared whenever
/// the host registration set changes.
pub struct ExprCache {
    map: DashMap<(Position, String), Arc<Expr>>,
}

impl ExprCache {
    pub fn new() -> Self {
        ExprCache {
            map: DashMap::new(),
        }
    }

    pub fn parse(
        &self,
        text: &str,
        position: Position,
        catalog: &Catalog,
    ) -> Result<Arc<Expr>, ParseError> {
        if let Some(hit) = self.map.get(&(position, text.to_string())) {
            return Ok(Arc::clone(&hit));
        }
        let expr = Arc::new(parse(text, position, catalog)?);
        self.map
            .insert((position, text.to_string()), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl Default for ExprCache {
    fn default() -> Self {
        ExprCache::new()
    }
}
