//! Recursive-descent parser over the token stream.

use crate::ast::{AssignTarget, BinaryOp, Block, Expr, Literal, Stmt, UnaryOp};
use crate::error::ScriptError;
use crate::lexer::{Lexer, Span, Token, TokenKind};

/// Parses a complete source text into a [`Block`].
///
/// # Errors
///
/// Returns [`ScriptError::Syntax`] when the token stream does not form a
/// valid program.
pub fn parse(source: &str) -> Result<Block, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, index: 0 };
    let block = parser.parse_statements(None)?;
    Ok(block)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.index).map_or_else(
            || {
                self.tokens.last().map_or(
                    Span {
                        start: 0,
                        end: 0,
                        line: 1,
                        column: 1,
                    },
                    |t| t.span,
                )
            },
            |t| t.span,
        )
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let span = self.peek_span();
        ScriptError::Syntax {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ScriptError> {
        match self.peek() {
            Some(found) if found == kind => {
                drop(self.advance());
                Ok(())
            }
            Some(found) => Err(self.error(format!("expected {what}, found {found:?}"))),
            None => Err(self.error(format!("expected {what}, found end of input"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(name),
            Some(token) => Err(self.error(format!("expected {what}, found {:?}", token.kind))),
            None => Err(self.error(format!("expected {what}, found end of input"))),
        }
    }

    /// Parses statements until `terminator` (or end of input when `None`).
    fn parse_statements(&mut self, terminator: Option<&TokenKind>) -> Result<Block, ScriptError> {
        let mut statements = Vec::new();
        loop {
            match (self.peek(), terminator) {
                (None, None) => break,
                (None, Some(_)) => return Err(self.error("unexpected end of input in block")),
                (Some(found), Some(term)) if found == term => break,
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Some(TokenKind::Let) => self.parse_let(),
            Some(TokenKind::Return) => self.parse_return(),
            Some(TokenKind::If) => self.parse_if(),
            _ => self.parse_expr_or_assign(),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, ScriptError> {
        drop(self.advance());
        let name = self.expect_ident("binding name after 'let'")?;
        self.expect(&TokenKind::Assign, "'=' in let statement")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "';' after let statement")?;
        Ok(Stmt::Let { name, value })
    }

    fn parse_return(&mut self) -> Result<Stmt, ScriptError> {
        drop(self.advance());
        if self.peek() == Some(&TokenKind::Semi) {
            drop(self.advance());
            return Ok(Stmt::Return(None));
        }
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "';' after return statement")?;
        Ok(Stmt::Return(Some(value)))
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptError> {
        drop(self.advance());
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        self.expect(&TokenKind::LBrace, "'{' to open if body")?;
        let then_block = self.parse_statements(Some(&TokenKind::RBrace))?;
        self.expect(&TokenKind::RBrace, "'}' to close if body")?;

        let else_block = if self.peek() == Some(&TokenKind::Else) {
            drop(self.advance());
            self.expect(&TokenKind::LBrace, "'{' to open else body")?;
            let block = self.parse_statements(Some(&TokenKind::RBrace))?;
            self.expect(&TokenKind::RBrace, "'}' to close else body")?;
            Some(block)
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    /// Parses either an assignment or a bare expression statement.
    fn parse_expr_or_assign(&mut self) -> Result<Stmt, ScriptError> {
        let expr = self.parse_expr()?;
        if self.peek() == Some(&TokenKind::Assign) {
            drop(self.advance());
            let target = match expr {
                Expr::Ident(name) => AssignTarget::Local(name),
                Expr::Member { object, property } => AssignTarget::Member {
                    object: *object,
                    property,
                },
                _ => return Err(self.error("invalid assignment target")),
            };
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "';' after assignment")?;
            return Ok(Stmt::Assign { target, value });
        }
        self.expect(&TokenKind::Semi, "';' after expression statement")?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&TokenKind::OrOr) {
            drop(self.advance());
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&TokenKind::AndAnd) {
            drop(self.advance());
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::BangEq) => BinaryOp::Ne,
                _ => break,
            };
            drop(self.advance());
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::LtEq) => BinaryOp::Le,
                Some(TokenKind::GtEq) => BinaryOp::Ge,
                _ => break,
            };
            drop(self.advance());
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            drop(self.advance());
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&TokenKind::Star) {
            drop(self.advance());
            let rhs = self.parse_unary()?;
            lhs = binary(BinaryOp::Mul, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            drop(self.advance());
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    /// Parses member access and call chains.
    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(TokenKind::Dot) => {
                    drop(self.advance());
                    let property = self.expect_ident("property name after '.'")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(TokenKind::LParen) => {
                    drop(self.advance());
                    let mut args = Vec::new();
                    if self.peek() != Some(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.peek() == Some(&TokenKind::Comma) {
                                drop(self.advance());
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' to close argument list")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Int(value),
                ..
            }) => Ok(Expr::Literal(Literal::Int(value))),
            Some(Token {
                kind: TokenKind::Str(value),
                ..
            }) => Ok(Expr::Literal(Literal::Str(value))),
            Some(Token {
                kind: TokenKind::True,
                ..
            }) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token {
                kind: TokenKind::False,
                ..
            }) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token {
                kind: TokenKind::Null,
                ..
            }) => Ok(Expr::Literal(Literal::Null)),
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(Expr::Ident(name)),
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')' to close group")?;
                Ok(expr)
            }
            Some(token) => Err(self.error(format!("unexpected token {:?}", token.kind))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_return_expression() {
        let block = parse("return 1 + 2 * 3;").expect("parse");
        assert_eq!(block.statements.len(), 1);
        let Stmt::Return(Some(Expr::Binary { op, .. })) = block.statements.first().expect("statement")
        else {
            panic!("expected return of a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
    }

    #[test]
    fn parses_member_call_chain() {
        let block = parse("console.log(\"hi\", 2);").expect("parse");
        let Stmt::Expr(Expr::Call { callee, args }) = block.statements.first().expect("statement")
        else {
            panic!("expected call statement");
        };
        assert_eq!(args.len(), 2);
        let Expr::Member { property, .. } = callee.as_ref() else {
            panic!("expected member callee");
        };
        assert_eq!(property, "log");
    }

    #[test]
    fn parses_if_else() {
        let block = parse("if (a > 1) { return a; } else { return 0; }").expect("parse");
        let Stmt::If { else_block, .. } = block.statements.first().expect("statement") else {
            panic!("expected if statement");
        };
        assert!(else_block.is_some());
    }

    #[test]
    fn rejects_missing_semicolon() {
        let err = parse("return 1").expect_err("should fail");
        assert!(err.is_syntax());
    }

    #[test]
    fn rejects_literal_assignment_target() {
        let err = parse("1 = 2;").expect_err("should fail");
        assert!(err.is_syntax());
    }

    #[test]
    fn member_assignment_target() {
        let block = parse("document.title = \"x\";").expect("parse");
        let Stmt::Assign {
            target: AssignTarget::Member { property, .. },
            ..
        } = block.statements.first().expect("statement")
        else {
            panic!("expected member assignment");
        };
        assert_eq!(property, "title");
    }
}
