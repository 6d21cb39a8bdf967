//! Parsing (tokens to AST)
//!
//! Recursive descent over the token stream. Statement forms live here;
//! expression parsing (with precedence climbing and literal folding) is in
//! the `expr` submodule.

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::span::Span;
use crate::token::{Token, TokenKind};

mod expr;

/// Parser state for building an AST from tokens
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse the whole token stream into a chunk
    pub fn parse(&mut self) -> Result<Chunk> {
        let block = self.block()?;
        self.expect(TokenKind::Eof)?;
        Ok(Chunk { block })
    }

    // === Statements ===

    /// Parse statements until a block terminator (`end`, `else`, `elseif`,
    /// `until`, or end of file)
    fn block(&mut self) -> Result<Block> {
        let mut statements = Vec::new();

        while !self.at_block_end() {
            if self.check(&TokenKind::Return) {
                statements.push(self.return_statement()?);
                break;
            }
            let stmt = self.statement()?;
            statements.push(stmt);
        }

        Ok(Block { statements })
    }

    fn at_block_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    fn statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;

        match self.peek().kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt {
                    kind: StmtKind::Empty,
                    span,
                })
            }
            TokenKind::ColonColon => self.label_statement(),
            TokenKind::Break => {
                self.advance();
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span,
                })
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.expect_name()?;
                Ok(Stmt {
                    kind: StmtKind::Goto { label },
                    span,
                })
            }
            TokenKind::Do => {
                self.advance();
                let body = self.block()?;
                self.expect(TokenKind::End)?;
                Ok(Stmt {
                    kind: StmtKind::Do(body),
                    span,
                })
            }
            TokenKind::While => self.while_statement(),
            TokenKind::Repeat => self.repeat_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Function => self.function_statement(),
            TokenKind::Local => self.local_statement(),
            _ => self.expression_statement(),
        }
    }

    fn label_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::ColonColon)?;
        let name = self.expect_name()?;
        self.expect(TokenKind::ColonColon)?;
        Ok(Stmt {
            kind: StmtKind::Label { name },
            span,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::While)?;
        let condition = self.expression()?;
        self.expect(TokenKind::Do)?;
        let body = self.block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            span,
        })
    }

    fn repeat_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::Repeat)?;
        let body = self.block()?;
        self.expect(TokenKind::Until)?;
        let condition = self.expression()?;
        Ok(Stmt {
            kind: StmtKind::Repeat { body, condition },
            span,
        })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::If)?;
        let condition = self.expression()?;
        self.expect(TokenKind::Then)?;
        let body = self.block()?;

        let mut elseifs = Vec::new();
        while self.check(&TokenKind::Elseif) {
            self.advance();
            let condition = self.expression()?;
            self.expect(TokenKind::Then)?;
            let body = self.block()?;
            elseifs.push(ElseIf { condition, body });
        }

        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.block()?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;

        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                body,
                elseifs,
                else_body,
            },
            span,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::For)?;
        let first = self.expect_name()?;

        if self.check(&TokenKind::Equal) {
            self.advance();
            let initial = self.expression()?;
            self.expect(TokenKind::Comma)?;
            let limit = self.expression()?;
            let step = if self.check(&TokenKind::Comma) {
                self.advance();
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(TokenKind::Do)?;
            let body = self.block()?;
            self.expect(TokenKind::End)?;
            return Ok(Stmt {
                kind: StmtKind::NumericFor {
                    control: first,
                    initial,
                    limit,
                    step,
                    body,
                },
                span,
            });
        }

        let mut names = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.expect_name()?);
        }
        self.expect(TokenKind::In)?;
        let values = self.expression_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.block()?;
        self.expect(TokenKind::End)?;

        Ok(Stmt {
            kind: StmtKind::GenericFor {
                names,
                values,
                body,
            },
            span,
        })
    }

    fn function_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::Function)?;

        let mut names = vec![self.expect_name()?];
        while self.check(&TokenKind::Dot) {
            self.advance();
            names.push(self.expect_name()?);
        }
        let is_method = if self.check(&TokenKind::Colon) {
            self.advance();
            names.push(self.expect_name()?);
            true
        } else {
            false
        };

        let body = self.func_body(span)?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef {
                name: FuncName { names, is_method },
                body,
            },
            span,
        })
    }

    fn local_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::Local)?;

        if self.check(&TokenKind::Function) {
            self.advance();
            let name = self.expect_name()?;
            let body = self.func_body(span)?;
            return Ok(Stmt {
                kind: StmtKind::LocalFunctionDef { name, body },
                span,
            });
        }

        let mut names = vec![self.attrib_name()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.attrib_name()?);
        }

        let values = if self.check(&TokenKind::Equal) {
            self.advance();
            self.expression_list()?
        } else {
            Vec::new()
        };

        Ok(Stmt {
            kind: StmtKind::Local { names, values },
            span,
        })
    }

    fn attrib_name(&mut self) -> Result<AttribName> {
        let span = self.peek().span;
        let name = self.expect_name()?;
        let attribute = if self.check(&TokenKind::Less) {
            self.advance();
            let attribute = self.expect_name()?;
            self.expect(TokenKind::Greater)?;
            Some(attribute)
        } else {
            None
        };
        Ok(AttribName {
            name,
            attribute,
            span,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        self.expect(TokenKind::Return)?;

        let values = if self.at_block_end() || self.check(&TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.expression_list()?
        };
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        if !self.at_block_end() {
            return Err(self.error_here("'return' must be the last statement of a block"));
        }

        Ok(Stmt {
            kind: StmtKind::Return { values },
            span,
        })
    }

    /// A statement that starts with an expression: a call, or the target
    /// list of an assignment
    fn expression_statement(&mut self) -> Result<Stmt> {
        let span = self.peek().span;
        let first = self.suffixed_expression()?;

        if !self.check(&TokenKind::Comma) && !self.check(&TokenKind::Equal) {
            if first.is_multires() {
                return Ok(Stmt {
                    kind: StmtKind::Call(first),
                    span,
                });
            }
            return Err(self.error_at(span, "unexpected expression in statement position"));
        }

        let mut targets = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            targets.push(self.suffixed_expression()?);
        }
        for target in &targets {
            if !matches!(
                target.kind,
                ExprKind::Name(_) | ExprKind::Dot { .. } | ExprKind::Index { .. }
            ) {
                return Err(self.error_at(target.span, "cannot assign to this expression"));
            }
        }

        self.expect(TokenKind::Equal)?;
        let values = self.expression_list()?;

        Ok(Stmt {
            kind: StmtKind::Assign { targets, values },
            span,
        })
    }

    /// Parameter list and body of a function literal, shared by every
    /// function-definition form
    pub(super) fn func_body(&mut self, span: Span) -> Result<FuncBody> {
        self.expect(TokenKind::LeftParen)?;

        let mut params = Vec::new();
        let mut is_variadic = false;
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.check(&TokenKind::Ellipsis) {
                    self.advance();
                    is_variadic = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RightParen)?;

        let block = self.block()?;
        self.expect(TokenKind::End)?;

        Ok(FuncBody {
            params,
            is_variadic,
            block,
            span,
        })
    }

    pub(super) fn expression_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.expression()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    // === Token navigation ===

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.tokens[self.current.min(self.tokens.len() - 1)].clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    pub(super) fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek().kind.describe()
            )))
        }
    }

    pub(super) fn expect_name(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(&format!("expected a name, found {}", other.describe()))),
        }
    }

    pub(super) fn error_here(&self, message: &str) -> CompileError {
        self.error_at(self.peek().span, message)
    }

    pub(super) fn error_at(&self, span: Span, message: &str) -> CompileError {
        CompileError::Syntax {
            message: message.to_string(),
            span,
        }
    }
}
