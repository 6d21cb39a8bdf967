//! Expression parsing: precedence climbing, suffix chains, table
//! constructors, and the literal folding performed during AST construction.

use super::Parser;
use crate::ast::*;
use crate::error::Result;
use crate::token::TokenKind;

/// Binding powers, Lua's operator table. A `(left, right)` pair with
/// `right < left` makes the operator right-associative.
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8, u8)> {
    let entry = match kind {
        TokenKind::Or => (BinaryOp::Or, 1, 1),
        TokenKind::And => (BinaryOp::And, 2, 2),
        TokenKind::Less => (BinaryOp::Less, 3, 3),
        TokenKind::Greater => (BinaryOp::Greater, 3, 3),
        TokenKind::LessEqual => (BinaryOp::LessEq, 3, 3),
        TokenKind::GreaterEqual => (BinaryOp::GreaterEq, 3, 3),
        TokenKind::TildeEqual => (BinaryOp::NotEq, 3, 3),
        TokenKind::EqualEqual => (BinaryOp::Eq, 3, 3),
        TokenKind::Pipe => (BinaryOp::BOr, 4, 4),
        TokenKind::Tilde => (BinaryOp::BXor, 5, 5),
        TokenKind::Ampersand => (BinaryOp::BAnd, 6, 6),
        TokenKind::LessLess => (BinaryOp::Shl, 7, 7),
        TokenKind::GreaterGreater => (BinaryOp::Shr, 7, 7),
        TokenKind::DotDot => (BinaryOp::Concat, 9, 8),
        TokenKind::Plus => (BinaryOp::Add, 10, 10),
        TokenKind::Minus => (BinaryOp::Sub, 10, 10),
        TokenKind::Star => (BinaryOp::Mul, 11, 11),
        TokenKind::Slash => (BinaryOp::Div, 11, 11),
        TokenKind::SlashSlash => (BinaryOp::IDiv, 11, 11),
        TokenKind::Percent => (BinaryOp::Mod, 11, 11),
        TokenKind::Caret => (BinaryOp::Pow, 14, 13),
        _ => return None,
    };
    Some(entry)
}

/// Binding power of unary operators
const UNARY_PRIORITY: u8 = 12;

impl Parser {
    pub(super) fn expression(&mut self) -> Result<Expr> {
        self.sub_expression(0)
    }

    fn sub_expression(&mut self, limit: u8) -> Result<Expr> {
        let span = self.peek().span;

        let mut left = match self.unary_op() {
            Some(op) => {
                self.advance();
                let operand = self.sub_expression(UNARY_PRIORITY)?;
                fold_unary(op, operand, span)
            }
            None => self.simple_expression()?,
        };

        while let Some((op, left_power, right_power)) = binary_op(&self.peek().kind) {
            if left_power <= limit {
                break;
            }
            self.advance();
            let right = self.sub_expression(right_power)?;
            left = fold_binary(op, left, right, span);
        }

        Ok(left)
    }

    fn unary_op(&self) -> Option<UnaryOp> {
        match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Hash => Some(UnaryOp::Len),
            TokenKind::Tilde => Some(UnaryOp::BNot),
            _ => None,
        }
    }

    fn simple_expression(&mut self) -> Result<Expr> {
        let span = self.peek().span;

        let kind = match self.peek().kind.clone() {
            TokenKind::Nil => {
                self.advance();
                ExprKind::Nil
            }
            TokenKind::True => {
                self.advance();
                ExprKind::True
            }
            TokenKind::False => {
                self.advance();
                ExprKind::False
            }
            TokenKind::Integer(value) => {
                self.advance();
                ExprKind::Integer(value)
            }
            TokenKind::Float(value) => {
                self.advance();
                ExprKind::Float(value)
            }
            TokenKind::String(bytes) => {
                self.advance();
                ExprKind::Str(bytes)
            }
            TokenKind::Ellipsis => {
                self.advance();
                ExprKind::Varargs
            }
            TokenKind::Function => {
                self.advance();
                let body = self.func_body(span)?;
                ExprKind::Function(body)
            }
            TokenKind::LeftBrace => return self.table_constructor(),
            _ => return self.suffixed_expression(),
        };

        Ok(Expr::new(kind, span))
    }

    /// A primary expression followed by any chain of `.name`, `[key]`,
    /// call, and method-call suffixes
    pub(super) fn suffixed_expression(&mut self) -> Result<Expr> {
        let span = self.peek().span;

        let mut expr = match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                self.advance();
                Expr::new(ExprKind::Name(name), span)
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RightParen)?;
                // Parenthesization truncates multi-result expressions to a
                // single value; bare literals gain nothing from the wrapper.
                if inner.is_constant() {
                    inner
                } else {
                    Expr::new(ExprKind::Paren(Box::new(inner)), span)
                }
            }
            other => {
                return Err(self.error_here(&format!(
                    "unexpected {} in expression",
                    other.describe()
                )))
            }
        };

        loop {
            let suffix_span = self.peek().span;
            match self.peek().kind.clone() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Dot {
                            base: Box::new(expr),
                            name,
                        },
                        suffix_span,
                    );
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            key: Box::new(key),
                        },
                        suffix_span,
                    );
                }
                TokenKind::Colon => {
                    self.advance();
                    let name = self.expect_name()?;
                    let args = self.call_arguments()?;
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            receiver: Box::new(expr),
                            name,
                            args,
                        },
                        suffix_span,
                    );
                }
                TokenKind::LeftParen | TokenKind::String(_) | TokenKind::LeftBrace => {
                    let args = self.call_arguments()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        suffix_span,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Call arguments: a parenthesized list, a lone string literal, or a
    /// lone table constructor
    fn call_arguments(&mut self) -> Result<Vec<Expr>> {
        let span = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::LeftParen => {
                self.advance();
                let args = if self.check(&TokenKind::RightParen) {
                    Vec::new()
                } else {
                    self.expression_list()?
                };
                self.expect(TokenKind::RightParen)?;
                Ok(args)
            }
            TokenKind::String(bytes) => {
                self.advance();
                Ok(vec![Expr::new(ExprKind::Str(bytes), span)])
            }
            TokenKind::LeftBrace => Ok(vec![self.table_constructor()?]),
            other => Err(self.error_here(&format!(
                "expected call arguments, found {}",
                other.describe()
            ))),
        }
    }

    fn table_constructor(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        self.expect(TokenKind::LeftBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            match self.peek().kind.clone() {
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    self.expect(TokenKind::Equal)?;
                    let value = self.expression()?;
                    fields.push(Field::Keyed { key, value });
                }
                TokenKind::Name(name) if self.peek_next_is(&TokenKind::Equal) => {
                    self.advance();
                    self.advance();
                    let value = self.expression()?;
                    fields.push(Field::Named { name, value });
                }
                _ => {
                    fields.push(Field::Positional(self.expression()?));
                }
            }

            if self.check(&TokenKind::Comma) || self.check(&TokenKind::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RightBrace)?;

        Ok(Expr::new(ExprKind::Table(fields), span))
    }

    fn peek_next_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .map(|t| &t.kind == kind)
            .unwrap_or(false)
    }
}

// === Literal folding ===
//
// Performed while the AST is built, never later: arithmetic on two numeric
// literals when the result is exact and cannot raise, concatenation of two
// string literals. Everything else is left for the VM.

fn fold_unary(op: UnaryOp, operand: Expr, span: crate::span::Span) -> Expr {
    if op == UnaryOp::Neg {
        match operand.kind {
            ExprKind::Integer(v) => return Expr::new(ExprKind::Integer(v.wrapping_neg()), span),
            ExprKind::Float(v) => return Expr::new(ExprKind::Float(-v), span),
            _ => {}
        }
    }
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

fn fold_binary(op: BinaryOp, left: Expr, right: Expr, span: crate::span::Span) -> Expr {
    if let Some(kind) = try_fold(op, &left, &right) {
        return Expr::new(kind, span);
    }
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn try_fold(op: BinaryOp, left: &Expr, right: &Expr) -> Option<ExprKind> {
    if op == BinaryOp::Concat {
        if let (ExprKind::Str(a), ExprKind::Str(b)) = (&left.kind, &right.kind) {
            let mut bytes = a.clone();
            bytes.extend_from_slice(b);
            return Some(ExprKind::Str(bytes));
        }
        return None;
    }

    let (a, b) = (numeric_value(left)?, numeric_value(right)?);
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => fold_int(op, x, y),
        (a, b) => fold_float(op, a.to_exact_f64()?, b.to_exact_f64()?),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    /// The float value, or None when the i64 → f64 conversion would lose
    /// precision
    fn to_exact_f64(self) -> Option<f64> {
        match self {
            Num::Float(v) => Some(v),
            Num::Int(v) => {
                let f = v as f64;
                (f as i64 == v && f.is_finite()).then_some(f)
            }
        }
    }
}

fn numeric_value(expr: &Expr) -> Option<Num> {
    match expr.kind {
        ExprKind::Integer(v) => Some(Num::Int(v)),
        ExprKind::Float(v) => Some(Num::Float(v)),
        _ => None,
    }
}

fn fold_int(op: BinaryOp, x: i64, y: i64) -> Option<ExprKind> {
    let value = match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::IDiv | BinaryOp::Mod => {
            // Division by zero raises at runtime; i64::MIN // -1 overflows
            if y == 0 || (x == i64::MIN && y == -1) {
                return None;
            }
            let q = x / y;
            let floored = if x % y != 0 && (x < 0) != (y < 0) {
                q - 1
            } else {
                q
            };
            if op == BinaryOp::IDiv {
                floored
            } else {
                x - floored * y
            }
        }
        // `/` and `^` produce floats even on integers
        BinaryOp::Div | BinaryOp::Pow => {
            let a = Num::Int(x).to_exact_f64()?;
            let b = Num::Int(y).to_exact_f64()?;
            return fold_float(op, a, b);
        }
        _ => return None,
    };
    Some(ExprKind::Integer(value))
}

fn fold_float(op: BinaryOp, x: f64, y: f64) -> Option<ExprKind> {
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::IDiv => (x / y).floor(),
        BinaryOp::Mod => x - (x / y).floor() * y,
        BinaryOp::Pow => x.powf(y),
        _ => return None,
    };
    Some(ExprKind::Float(value))
}
