//! Query tokenizer.

use crate::error::QuerySyntaxError;

/// Reserved words. Matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `filter`
    Filter,
    /// `ordered`
    Ordered,
    /// `reversed`
    Reversed,
    /// `skip`
    Skip,
    /// `limit`
    Limit,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `contains`
    Contains,
    /// `startsWith`
    StartsWith,
    /// `endsWith`
    EndsWith,
    /// `matches`
    Matches,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        let keyword = match word.to_ascii_lowercase().as_str() {
            "filter" => Self::Filter,
            "ordered" => Self::Ordered,
            "reversed" => Self::Reversed,
            "skip" => Self::Skip,
            "limit" => Self::Limit,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "matches" => Self::Matches,
            _ => return None,
        };
        Some(keyword)
    }
}

/// Kinds of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Field name segment.
    Ident(String),
    /// Integer literal.
    Int(i64),
    /// Decimal literal.
    Decimal(f64),
    /// Quoted string with quotes removed.
    Str(String),
    /// Reserved word.
    Keyword(Keyword),
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<>`
    LtGt,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// End of input.
    Eof,
}

/// A token and its byte span in the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was read.
    pub kind: TokenKind,
    /// Start offset.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: &str, start: usize) -> QuerySyntaxError {
        let end = self.pos.max(start + 1).min(self.input.len());
        let fragment = self.input.get(start..end).unwrap_or_default();
        QuerySyntaxError::new(message, fragment, start)
    }

    fn next_token(&mut self) -> Result<Token, QuerySyntaxError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            });
        };

        let kind = match c {
            '\'' | '"' => self.string(c)?,
            '-' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => self.number()?,
            d if d.is_ascii_digit() => self.number()?,
            a if a.is_alphabetic() || a == '_' => self.word(),
            _ => self.symbol()?,
        };
        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, QuerySyntaxError> {
        let start = self.pos;
        self.advance();
        let body = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let text = self.input[body..self.pos].to_string();
                self.advance();
                return Ok(TokenKind::Str(text));
            }
            self.advance();
        }
        Err(self.error("unterminated string", start))
    }

    fn number(&mut self) -> Result<TokenKind, QuerySyntaxError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let is_decimal =
            self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit());
        if is_decimal {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            return self.input[start..self.pos]
                .parse()
                .map(TokenKind::Decimal)
                .map_err(|_| self.error("invalid decimal", start));
        }
        self.input[start..self.pos]
            .parse()
            .map(TokenKind::Int)
            .map_err(|_| self.error("integer out of range", start))
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let word = &self.input[start..self.pos];
        Keyword::from_word(word).map_or_else(|| TokenKind::Ident(word.to_string()), TokenKind::Keyword)
    }

    fn symbol(&mut self) -> Result<TokenKind, QuerySyntaxError> {
        let start = self.pos;
        let first = self.peek();
        self.advance();
        let second = self.peek();
        let (kind, two_chars) = match (first, second) {
            (Some('='), Some('=')) => (TokenKind::EqEq, true),
            (Some('='), _) => (TokenKind::Eq, false),
            (Some('!'), Some('=')) => (TokenKind::NotEq, true),
            (Some('<'), Some('>')) => (TokenKind::LtGt, true),
            (Some('<'), Some('=')) => (TokenKind::Le, true),
            (Some('<'), _) => (TokenKind::Lt, false),
            (Some('>'), Some('=')) => (TokenKind::Ge, true),
            (Some('>'), _) => (TokenKind::Gt, false),
            (Some('('), _) => (TokenKind::LParen, false),
            (Some(')'), _) => (TokenKind::RParen, false),
            (Some(','), _) => (TokenKind::Comma, false),
            (Some('.'), _) => (TokenKind::Dot, false),
            _ => return Err(self.error("unexpected character", start)),
        };
        if two_chars {
            self.advance();
        }
        Ok(kind)
    }
}

/// Splits query text into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>, QuerySyntaxError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
