//! Recursive-descent parser for the expression language.
//!
//! Precedence, loosest first: equality, additive, multiplicative, unary
//! minus, postfix (`.field`, `[index]`), primary. `if ... then ... else ...`
//! is a primary whose `else` branch extends as far right as possible.

use super::ast::{BinaryOp, Expr, ExprKind, Key};
use super::lexer::{tokenize, unquote, Token};
use super::{Position, ScriptCompileError};
use crate::library::Namespace;
use serde_json::{Number, Value};
use std::ops::Range;

type ParseResult<T> = Result<T, ScriptCompileError>;

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    namespace: &'src Namespace,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, namespace: &'src Namespace) -> ParseResult<Self> {
        let tokens = tokenize(source).map_err(|span| ScriptCompileError::Syntax {
            position: Position::from_offset(source, span.start),
            message: format!("unexpected character '{}'", &source[span]),
        })?;

        Ok(Self {
            source,
            tokens,
            pos: 0,
            namespace,
        })
    }

    /// Parse the whole source as one expression.
    pub fn parse_script(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(self.error_here("script has no expression"));
        }
        let expr = self.parse_expr()?;
        if !self.is_at_end() {
            return Err(self.unexpected("end of script"));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.match_token(Token::EqEq) {
                BinaryOp::Equal
            } else if self.match_token(Token::NotEq) {
                BinaryOp::NotEqual
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.match_token(Token::Plus) {
                BinaryOp::Add
            } else if self.match_token(Token::Minus) {
                BinaryOp::Subtract
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.match_token(Token::Star) {
                BinaryOp::Multiply
            } else if self.match_token(Token::Slash) {
                BinaryOp::Divide
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let position = self.peek_position();
        if self.match_token(Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Negate(Box::new(operand)), position));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let position = self.peek_position();
            if self.match_token(Token::Dot) {
                let field = self.expect_ident()?;
                expr = Expr::new(ExprKind::Member(Box::new(expr), field), position);
            } else if self.match_token(Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), position);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let position = self.peek_position();
        let token = match self.peek() {
            Some((token, _)) => token.clone(),
            None => return Err(self.unexpected("an expression")),
        };

        let kind = match token {
            Token::Null => {
                self.advance();
                ExprKind::Literal(Value::Null)
            }
            Token::True => {
                self.advance();
                ExprKind::Literal(Value::Bool(true))
            }
            Token::False => {
                self.advance();
                ExprKind::Literal(Value::Bool(false))
            }
            Token::Number(text) => {
                self.advance();
                ExprKind::Literal(parse_number(text).ok_or_else(|| ScriptCompileError::Syntax {
                    position,
                    message: format!("number {} is out of range", text),
                })?)
            }
            Token::String(text) => {
                self.advance();
                ExprKind::Literal(Value::String(self.string_literal(text, position)?))
            }
            Token::Ident(name) => {
                if self.is_call() {
                    return self.parse_call(position);
                }
                self.advance();
                ExprKind::Identifier(name.to_string())
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                ExprKind::Array(self.parse_list(Token::RBracket)?)
            }
            Token::LBrace => {
                self.advance();
                ExprKind::Object(self.parse_fields()?)
            }
            Token::If => {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect(Token::Then)?;
                let then_branch = self.parse_expr()?;
                self.expect(Token::Else)?;
                let else_branch = self.parse_expr()?;
                ExprKind::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                }
            }
            _ => return Err(self.unexpected("an expression")),
        };

        Ok(Expr::new(kind, position))
    }

    /// `ident . ident (` starts a namespaced call.
    fn is_call(&self) -> bool {
        matches!(
            (self.peek_ahead(1), self.peek_ahead(2), self.peek_ahead(3)),
            (
                Some((Token::Dot, _)),
                Some((Token::Ident(_), _)),
                Some((Token::LParen, _))
            )
        )
    }

    fn parse_call(&mut self, position: Position) -> ParseResult<Expr> {
        let namespace = self.expect_ident()?;
        self.expect(Token::Dot)?;
        let function = self.expect_ident()?;
        self.expect(Token::LParen)?;

        if !self.namespace.contains(&namespace, &function) {
            return Err(ScriptCompileError::UnknownFunction {
                name: format!("{}.{}", namespace, function),
                position,
            });
        }

        let args = self.parse_list(Token::RParen)?;
        Ok(Expr::new(
            ExprKind::Call {
                namespace,
                function,
                args,
            },
            position,
        ))
    }

    /// Comma separated expressions up to `close`, trailing comma allowed.
    fn parse_list(&mut self, close: Token<'src>) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close.clone()) {
            items.push(self.parse_expr()?);
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_fields(&mut self) -> ParseResult<Vec<(Key, Expr)>> {
        let mut fields = Vec::new();
        while !self.check(Token::RBrace) {
            let position = self.peek_position();
            let key = match self.peek() {
                Some((Token::Ident(name), _)) => {
                    let name = name.to_string();
                    self.advance();
                    Key::Static(name)
                }
                Some((Token::String(text), _)) => {
                    let text = *text;
                    self.advance();
                    Key::Static(self.string_literal(text, position)?)
                }
                Some((Token::LBracket, _)) => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    Key::Computed(key)
                }
                _ => return Err(self.unexpected("a field name")),
            };
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            fields.push((key, value));

            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(fields)
    }

    fn string_literal(&self, text: &str, position: Position) -> ParseResult<String> {
        unquote(text).map_err(|message| ScriptCompileError::Syntax { position, message })
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", token)))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((Token::Ident(name), _)) => {
                let name = name.to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn peek_position(&self) -> Position {
        let offset = match self.peek() {
            Some((_, span)) => span.start,
            None => self.source.trim_end().len(),
        };
        Position::from_offset(self.source, offset)
    }

    fn error_here(&self, message: &str) -> ScriptCompileError {
        ScriptCompileError::Syntax {
            position: self.peek_position(),
            message: message.to_string(),
        }
    }

    fn unexpected(&self, expected: &str) -> ScriptCompileError {
        let found = match self.peek() {
            Some((token, _)) => token.to_string(),
            None => "end of script".to_string(),
        };
        self.error_here(&format!("expected {}, found {}", expected, found))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let position = left.position;
    Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), position)
}

fn parse_number(text: &str) -> Option<Value> {
    if !text.contains(&['.', 'e', 'E'][..]) {
        if let Ok(integer) = text.parse::<i64>() {
            return Some(Value::from(integer));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
