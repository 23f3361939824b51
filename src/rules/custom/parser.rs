use regex::Regex;

use crate::domain::Value;

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::error::ExprError;
use super::lexer::{tokenize, Token, TokenKind};

/// Maximum depth of the expression tree.
///
/// Parentheses, unary operators, calls and every chained binary operator
/// each count as one level, so a long flat chain like `a + a + ...` is
/// bounded the same way as deep parentheses.
pub const MAX_DEPTH: usize = 64;

/// Parse a rule expression.
///
/// `columns` is the rule's declared column list; every identifier must be
/// one of them and is bound to its position in the list.
pub fn parse_expr(src: &str, columns: &[String]) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        columns,
    };

    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken {
            expected: "end of expression".to_string(),
            found: token.kind.to_string(),
            offset: token.offset,
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    columns: &'a [String],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_kind_at(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                expected: kind.to_string(),
                found: token.kind.to_string(),
                offset: token.offset,
            }),
            None => Err(ExprError::UnexpectedEnd {
                expected: kind.to_string(),
            }),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn leave_folds(&mut self, folds: usize) {
        self.depth -= folds;
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        let mut folds = 0;
        while self.eat(&TokenKind::Or) {
            self.enter()?;
            folds += 1;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.leave_folds(folds);
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        let mut folds = 0;
        while self.eat(&TokenKind::And) {
            self.enter()?;
            folds += 1;
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.leave_folds(folds);
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let expr = self.parse_not()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_additive()?;

        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(BinaryOp::Eq),
            Some(TokenKind::Ne) => Some(BinaryOp::Ne),
            Some(TokenKind::Lt) => Some(BinaryOp::Lt),
            Some(TokenKind::Le) => Some(BinaryOp::Le),
            Some(TokenKind::Gt) => Some(BinaryOp::Gt),
            Some(TokenKind::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.parse_additive()?;
            return Ok(binary(op, left, right));
        }

        if self.eat(&TokenKind::Is) {
            let negated = self.eat(&TokenKind::Not);
            self.expect(TokenKind::Null)?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated_in = self.peek_kind() == Some(&TokenKind::Not)
            && self.peek_kind_at(1) == Some(&TokenKind::In);
        if negated_in {
            self.pos += 1;
        }
        if self.eat(&TokenKind::In) {
            let list = self.parse_list()?;
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated: negated_in,
            });
        }

        Ok(left)
    }

    fn parse_list(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect(TokenKind::LBracket)?;
        let mut items = Vec::new();
        if self.eat(&TokenKind::RBracket) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_additive()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RBracket)?;
            return Ok(items);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        let mut folds = 0;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            folds += 1;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        self.leave_folds(folds);
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        let mut folds = 0;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            folds += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.leave_folds(folds);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let expr = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance().ok_or_else(|| ExprError::UnexpectedEnd {
            expected: "a value".to_string(),
        })?;

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::LParen => {
                self.enter()?;
                let expr = self.parse_or()?;
                self.leave();
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident(name) if self.peek_kind() == Some(&TokenKind::LParen) => {
                self.parse_call(name, token.offset)
            }
            TokenKind::Ident(name) => self.bind_column(name, token.offset),
            other => Err(ExprError::UnexpectedToken {
                expected: "a value".to_string(),
                found: other.to_string(),
                offset: token.offset,
            }),
        }
    }

    fn parse_call(&mut self, name: String, offset: usize) -> Result<Expr, ExprError> {
        self.expect(TokenKind::LParen)?;
        self.enter()?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        self.leave();

        if name.eq_ignore_ascii_case("matches") {
            return build_matches(args);
        }

        let func = Function::lookup(&name).ok_or(ExprError::UnknownFunction {
            name: name.clone(),
            offset,
        })?;

        match func.arity() {
            Some(expected) if args.len() != expected => Err(ExprError::Arity {
                name: func.name().to_string(),
                expected: expected.to_string(),
                found: args.len(),
            }),
            None if args.is_empty() => Err(ExprError::Arity {
                name: func.name().to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            }),
            _ => Ok(Expr::Call { func, args }),
        }
    }

    fn bind_column(&self, name: String, offset: usize) -> Result<Expr, ExprError> {
        self.columns
            .iter()
            .position(|c| c == &name)
            .map(Expr::Column)
            .ok_or(ExprError::UndeclaredColumn { name, offset })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn build_matches(mut args: Vec<Expr>) -> Result<Expr, ExprError> {
    if args.len() != 2 {
        return Err(ExprError::Arity {
            name: "matches".to_string(),
            expected: "2".to_string(),
            found: args.len(),
        });
    }

    let pattern = match args.pop() {
        Some(Expr::Literal(Value::Text(pattern))) => pattern,
        _ => return Err(ExprError::PatternNotLiteral),
    };
    let regex = Regex::new(&pattern).map_err(|e| ExprError::InvalidPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let expr = args.pop().ok_or(ExprError::PatternNotLiteral)?;
    Ok(Expr::Matches {
        expr: Box::new(expr),
        pattern: regex,
    })
}
