//! Recursive-descent parser for query text.
//!
//! ```text
//! query      := [ 'filter' or_expr ]
//!               [ ('ordered' | 'reversed') [ field (',' field)* ] ]
//!               [ 'skip' INT ] [ 'limit' INT ] [ STRING ]
//! or_expr    := and_expr ( 'or' and_expr )*
//! and_expr   := unary ( 'and' unary )*
//! unary      := [ 'not' ] primary
//! primary    := comparison | '(' or_expr ')'
//! comparison := field operator literal
//! ```

use super::ast::{
    AndExpr, ComparisonExpr, Literal, Operator, OrExpr, OrderClause, OrderDirection, Primary,
    QueryAst, Spanned, UnaryExpr,
};
use super::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::error::QuerySyntaxError;

/// Parses query text into a [`QueryAst`].
pub fn parse(input: &str) -> Result<QueryAst, QuerySyntaxError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    parser.parse_query()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        // tokenize always ends with Eof and the parser never steps past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        *self.peek() == TokenKind::Keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> QuerySyntaxError {
        let token = self.current();
        let fragment = if token.kind == TokenKind::Eof {
            "<end of query>"
        } else {
            &self.input[token.start..token.end]
        };
        QuerySyntaxError::new(message, fragment, token.start)
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, QuerySyntaxError> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn parse_query(&mut self) -> Result<QueryAst, QuerySyntaxError> {
        let mut ast = QueryAst::default();

        if self.eat_keyword(Keyword::Filter) {
            ast.filter = Some(self.parse_or()?);
        }

        let direction = if self.eat_keyword(Keyword::Ordered) {
            Some(OrderDirection::Ordered)
        } else if self.eat_keyword(Keyword::Reversed) {
            Some(OrderDirection::Reversed)
        } else {
            None
        };
        if let Some(direction) = direction {
            let mut fields = Vec::new();
            if matches!(self.peek(), TokenKind::Ident(_)) {
                fields.push(self.parse_field()?);
                while *self.peek() == TokenKind::Comma {
                    self.advance();
                    fields.push(self.parse_field()?);
                }
            }
            ast.order = Some(OrderClause { direction, fields });
        }

        if self.eat_keyword(Keyword::Skip) {
            ast.skip = Some(self.parse_count("skip")?);
        }
        if self.eat_keyword(Keyword::Limit) {
            ast.limit = Some(self.parse_count("limit")?);
        }

        if let TokenKind::Str(name) = self.peek().clone() {
            let token = self.advance();
            ast.type_name = Some(Spanned {
                value: name,
                start: token.start,
                end: token.end,
            });
        }

        if *self.peek() != TokenKind::Eof {
            return Err(self.error("unexpected input"));
        }
        Ok(ast)
    }

    fn parse_count(&mut self, clause: &str) -> Result<Spanned<i64>, QuerySyntaxError> {
        match *self.peek() {
            TokenKind::Int(value) => {
                let token = self.advance();
                Ok(Spanned {
                    value,
                    start: token.start,
                    end: token.end,
                })
            }
            _ => Err(self.error(format!("expected integer after '{clause}'"))),
        }
    }

    fn parse_or(&mut self) -> Result<OrExpr, QuerySyntaxError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_keyword(Keyword::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(OrExpr { terms })
    }

    fn parse_and(&mut self) -> Result<AndExpr, QuerySyntaxError> {
        let mut factors = vec![self.parse_unary()?];
        while self.eat_keyword(Keyword::And) {
            factors.push(self.parse_unary()?);
        }
        Ok(AndExpr { factors })
    }

    fn parse_unary(&mut self) -> Result<UnaryExpr, QuerySyntaxError> {
        let negated = self.eat_keyword(Keyword::Not);
        let primary = self.parse_primary()?;
        Ok(UnaryExpr { negated, primary })
    }

    fn parse_primary(&mut self) -> Result<Primary, QuerySyntaxError> {
        if *self.peek() == TokenKind::LParen {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(Primary::Group(Box::new(inner)));
        }
        self.parse_comparison().map(Primary::Comparison)
    }

    fn parse_comparison(&mut self) -> Result<ComparisonExpr, QuerySyntaxError> {
        let field = self.parse_field()?;
        let operator = self.parse_operator()?;
        let literal = self.parse_literal()?;
        Ok(ComparisonExpr {
            field,
            operator,
            literal,
        })
    }

    fn parse_field(&mut self) -> Result<Vec<String>, QuerySyntaxError> {
        let mut segments = vec![self.parse_identifier()?];
        while *self.peek() == TokenKind::Dot {
            self.advance();
            segments.push(self.parse_identifier()?);
        }
        Ok(segments)
    }

    fn parse_identifier(&mut self) -> Result<String, QuerySyntaxError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected field name")),
        }
    }

    fn parse_operator(&mut self) -> Result<Operator, QuerySyntaxError> {
        let operator = match self.peek() {
            TokenKind::Eq => Operator::Assign,
            TokenKind::EqEq => Operator::Equals,
            TokenKind::NotEq => Operator::BangEquals,
            TokenKind::LtGt => Operator::Diamond,
            TokenKind::Gt => Operator::Greater,
            TokenKind::Ge => Operator::GreaterOrEqual,
            TokenKind::Lt => Operator::Less,
            TokenKind::Le => Operator::LessOrEqual,
            TokenKind::Keyword(Keyword::Contains) => Operator::Contains,
            TokenKind::Keyword(Keyword::StartsWith) => Operator::StartsWith,
            TokenKind::Keyword(Keyword::EndsWith) => Operator::EndsWith,
            TokenKind::Keyword(Keyword::Matches) => Operator::Matches,
            _ => return Err(self.error("expected comparison operator")),
        };
        self.advance();
        Ok(operator)
    }

    fn parse_literal(&mut self) -> Result<Spanned<Literal>, QuerySyntaxError> {
        let value = match self.peek().clone() {
            TokenKind::Int(n) => Literal::Int(n),
            TokenKind::Decimal(d) => Literal::Decimal(d),
            TokenKind::Str(s) => Literal::Text(s),
            TokenKind::Keyword(Keyword::True) => Literal::Bool(true),
            TokenKind::Keyword(Keyword::False) => Literal::Bool(false),
            TokenKind::Keyword(Keyword::Null) => Literal::Null,
            _ => return Err(self.error("expected literal")),
        };
        let token = self.advance();
        Ok(Spanned {
            value,
            start: token.start,
            end: token.end,
        })
    }
}
