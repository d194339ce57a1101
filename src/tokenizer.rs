// Expression tokenizer
// Converts the text of an expression-bearing property name or value into a
// left-to-right token stream; backtracking, where needed, happens in the parser

use crate::error::ParseError;

/// Token categories produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The `#` call marker.
    CallStart,
    /// Identifier run following the call marker (possibly dotted/qualified).
    Identifier,
    /// `(`
    ParamsStart,
    /// `,`
    ParamSeparator,
    /// `)`
    CallEnd,
    /// Single-quoted text, quotes stripped.
    StringLiteral,
    /// A `$`-led path query run.
    PathLiteral,
    /// A digit-led run (integer, decimal, or `a..b` range).
    NumericLiteral,
    /// A letter-led run; resolved to true/false, a range-variable reference,
    /// or rejected, at parse time.
    BooleanLiteral,
    /// `-> name` rename target (only produced at parameter depth zero).
    GeneratedName,
    /// `->` inside a parameter list (lambda parameter arrow).
    LambdaArrow,
    /// One of `= != < > <= >= + - * /`.
    Operator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub pos: usize,
}

impl Token {
    fn new(text: impl Into<String>, kind: TokenKind, pos: usize) -> Self {
        Token {
            text: text.into(),
            kind,
            pos,
        }
    }
}

/// Cursor over the expression text. Tokens are produced on demand;
/// `tokenize` drains the cursor into a vector for the parser.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    depth: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Tokenizer {
            input: input.chars().collect(),
            position: 0,
            depth: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while let Some(ch) = self.current() {
            if pred(ch) {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].iter().collect()
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_whitespace();
        let pos = self.position;
        let ch = match self.current() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        match ch {
            '#' => {
                self.advance();
                Ok(Some(Token::new("#", TokenKind::CallStart, pos)))
            }
            '(' => {
                self.advance();
                self.depth += 1;
                Ok(Some(Token::new("(", TokenKind::ParamsStart, pos)))
            }
            ')' => {
                self.advance();
                self.depth = self.depth.saturating_sub(1);
                Ok(Some(Token::new(")", TokenKind::CallEnd, pos)))
            }
            ',' => {
                self.advance();
                Ok(Some(Token::new(",", TokenKind::ParamSeparator, pos)))
            }
            '\'' => {
                self.advance();
                let text = self.take_while(|c| c != '\'');
                if self.current() != Some('\'') {
                    return Err(ParseError::UnterminatedLiteral { expected: '\'' });
                }
                self.advance();
                Ok(Some(Token::new(text, TokenKind::StringLiteral, pos)))
            }
            '$' => {
                // A path run; bracket segments may contain otherwise-terminating
                // characters ([*], ['some name']).
                let mut text = String::new();
                let mut brackets = 0usize;
                while let Some(c) = self.current() {
                    if brackets == 0 {
                        if c.is_whitespace() || matches!(c, ',' | ')' | '=' | '<' | '>' | '!') {
                            break;
                        }
                    }
                    if c == '[' {
                        brackets += 1;
                    } else if c == ']' {
                        brackets = brackets.saturating_sub(1);
                    }
                    text.push(c);
                    self.advance();
                }
                Ok(Some(Token::new(text, TokenKind::PathLiteral, pos)))
            }
            '-' if self.peek(1) == Some('>') => {
                self.advance();
                self.advance();
                if self.depth == 0 {
                    // Rename target: the remaining text, to end of input.
                    self.skip_whitespace();
                    let rest = self.take_while(|_| true);
                    let rest = rest.trim_end().to_string();
                    if rest.is_empty() {
                        return Err(ParseError::UnexpectedEnd);
                    }
                    Ok(Some(Token::new(rest, TokenKind::GeneratedName, pos)))
                } else {
                    Ok(Some(Token::new("->", TokenKind::LambdaArrow, pos)))
                }
            }
            '+' | '-' | '*' | '/' | '=' => {
                self.advance();
                Ok(Some(Token::new(ch.to_string(), TokenKind::Operator, pos)))
            }
            '!' => {
                if self.peek(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Ok(Some(Token::new("!=", TokenKind::Operator, pos)))
                } else {
                    Err(ParseError::UnexpectedChar { ch, pos })
                }
            }
            '<' | '>' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Ok(Some(Token::new(
                        format!("{}=", ch),
                        TokenKind::Operator,
                        pos,
                    )))
                } else {
                    Ok(Some(Token::new(ch.to_string(), TokenKind::Operator, pos)))
                }
            }
            c if c.is_ascii_digit() => {
                let text = self.take_while(|c| c.is_ascii_digit() || c == '.');
                Ok(Some(Token::new(text, TokenKind::NumericLiteral, pos)))
            }
            c if c.is_alphabetic() || c == '_' => {
                let text =
                    self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ':'));
                Ok(Some(Token::new(text, TokenKind::BooleanLiteral, pos)))
            }
            _ => Err(ParseError::UnexpectedChar { ch, pos }),
        }
    }

    /// Identifier run immediately after a call marker. The parser calls this
    /// instead of `next_token` so that dotted callable names are not mistaken
    /// for boolean-candidate runs.
    pub fn identifier(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let pos = self.position;
        let text = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if text.is_empty() {
            None
        } else {
            Some(Token::new(text, TokenKind::Identifier, pos))
        }
    }
}

/// Tokenize a whole expression string. Identifier runs after a call marker
/// are tagged `Identifier`; every other letter-led run stays a
/// `BooleanLiteral` candidate for the parser to resolve.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    let mut after_call_marker = false;
    loop {
        if after_call_marker {
            after_call_marker = false;
            if let Some(tok) = tokenizer.identifier() {
                tokens.push(tok);
                continue;
            }
        }
        match tokenizer.next_token()? {
            Some(tok) => {
                after_call_marker = tok.kind == TokenKind::CallStart;
                tokens.push(tok);
            }
            None => break,
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<String> {
        tokenize(source)
            .unwrap()
            .iter()
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn test_simple_call() {
        assert_eq!(
            kinds("#valueOf($.integerLiteral)"),
            vec![
                TokenKind::CallStart,
                TokenKind::Identifier,
                TokenKind::ParamsStart,
                TokenKind::PathLiteral,
                TokenKind::CallEnd,
            ]
        );
        assert_eq!(
            texts("#valueOf($.integerLiteral)"),
            vec!["#", "valueOf", "(", "$.integerLiteral", ")"]
        );
    }

    #[test]
    fn test_nested_call() {
        assert_eq!(
            kinds("#if(#valueOf($.flag), 'yes', 'no')"),
            vec![
                TokenKind::CallStart,
                TokenKind::Identifier,
                TokenKind::ParamsStart,
                TokenKind::CallStart,
                TokenKind::Identifier,
                TokenKind::ParamsStart,
                TokenKind::PathLiteral,
                TokenKind::CallEnd,
                TokenKind::ParamSeparator,
                TokenKind::StringLiteral,
                TokenKind::ParamSeparator,
                TokenKind::StringLiteral,
                TokenKind::CallEnd,
            ]
        );
    }

    #[test]
    fn test_string_literal_quotes_stripped() {
        let toks = tokenize("#x('a b', 'c,d')").unwrap();
        assert_eq!(toks[3].text, "a b");
        assert_eq!(toks[5].text, "c,d");
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("#x('oops)").unwrap_err(),
            ParseError::UnterminatedLiteral { expected: '\'' }
        );
    }

    #[test]
    fn test_numeric_runs() {
        assert_eq!(
            texts("#add(1, 2.5, 0..5)"),
            vec!["#", "add", "(", "1", ",", "2.5", ",", "0..5", ")"]
        );
    }

    #[test]
    fn test_operators_split_numeric_runs() {
        assert_eq!(
            texts("2 + 3 * 4 + 5"),
            vec!["2", "+", "3", "*", "4", "+", "5"]
        );
        assert_eq!(
            kinds("1 <= 2"),
            vec![
                TokenKind::NumericLiteral,
                TokenKind::Operator,
                TokenKind::NumericLiteral
            ]
        );
    }

    #[test]
    fn test_rename_suffix_top_level() {
        let toks = tokenize("#valueOf($.name) -> DisplayName").unwrap();
        let last = toks.last().unwrap();
        assert_eq!(last.kind, TokenKind::GeneratedName);
        assert_eq!(last.text, "DisplayName");
    }

    #[test]
    fn test_arrow_inside_params_is_lambda() {
        let toks = tokenize("#filter($.items, x -> #exists($.id))").unwrap();
        assert!(toks
            .iter()
            .any(|t| t.kind == TokenKind::LambdaArrow && t.text == "->"));
        assert!(!toks.iter().any(|t| t.kind == TokenKind::GeneratedName));
    }

    #[test]
    fn test_path_with_brackets() {
        assert_eq!(
            texts("#valueOf($.items[*].id)"),
            vec!["#", "valueOf", "(", "$.items[*].id", ")"]
        );
        assert_eq!(
            texts("#valueOf($['odd name'][0])"),
            vec!["#", "valueOf", "(", "$['odd name'][0]", ")"]
        );
    }

    #[test]
    fn test_path_stops_at_comparison() {
        assert_eq!(texts("$.age > 18"), vec!["$.age", ">", "18"]);
    }

    #[test]
    fn test_boolean_candidates() {
        assert_eq!(
            kinds("#x(true, item.price, k:v)"),
            vec![
                TokenKind::CallStart,
                TokenKind::Identifier,
                TokenKind::ParamsStart,
                TokenKind::BooleanLiteral,
                TokenKind::ParamSeparator,
                TokenKind::BooleanLiteral,
                TokenKind::ParamSeparator,
                TokenKind::BooleanLiteral,
                TokenKind::CallEnd,
            ]
        );
    }

    #[test]
    fn test_unrecognized_character() {
        assert_eq!(
            tokenize("#x(%)").unwrap_err(),
            ParseError::UnexpectedChar { ch: '%', pos: 3 }
        );
    }

    #[test]
    fn test_whitespace_skipped() {
        assert_eq!(
            texts("  #valueOf ( $.a )  "),
            vec!["#", "valueOf", "(", "$.a", ")"]
        );
    }
}
