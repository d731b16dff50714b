//! Recursive-descent parser. One `parse_*` method per precedence level,
//! lowest binding first; the equality/relational/add/mul levels fold
//! left-associatively with a loop so long operator chains cannot deepen the
//! call stack.

use std::mem;

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{Token, TokenKind};

pub fn parse(tokens: Vec<Token<'_>>) -> Result<Program<'_>, CompileError> {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

/// Parser state: the token vector, one forward cursor, and the locals arena
/// of the function currently being parsed.
struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    locals: Vec<Var<'a>>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token<'a>>) -> Self {
        Parser {
            tokens,
            pos: 0,
            locals: Vec::new(),
        }
    }

    /// One-token lookahead. Total because the token stream always ends with
    /// an `Eof` marker and the cursor never advances past it.
    fn peek(&self) -> Token<'a> {
        self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    /// Advance past the next token if it matches.
    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), CompileError> {
        if self.consume(kind) {
            Ok(())
        } else {
            let tok = self.peek();
            Err(self.error_at(tok, format!("expected {:?}, got {:?}", kind, tok.kind)))
        }
    }

    fn consume_ident(&mut self) -> Option<Token<'a>> {
        let tok = self.peek();
        if tok.kind == TokenKind::Ident {
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect_ident(&mut self) -> Result<Token<'a>, CompileError> {
        let tok = self.peek();
        self.consume_ident()
            .ok_or_else(|| self.error_at(tok, format!("expected an identifier, got {:?}", tok.kind)))
    }

    fn error_at(&self, tok: Token<'a>, msg: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            offset: tok.offset,
            msg: msg.into(),
        }
    }

    /// Handle of the most recently declared variable with this name, if any.
    fn find_var(&self, name: &str) -> Option<VarId> {
        self.locals
            .iter()
            .rposition(|var| var.name == name)
            .map(VarId)
    }

    fn push_var(&mut self, name: &'a str) -> VarId {
        self.locals.push(Var {
            name,
            ty: None,
            offset: 0,
        });
        VarId(self.locals.len() - 1)
    }

    // program = function*
    fn parse_program(&mut self) -> Result<Program<'a>, CompileError> {
        let mut functions = Vec::new();
        while !self.at_eof() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    // function = ident "(" (ident ("," ident)*)? ")" "{" stmt* "}"
    fn parse_function(&mut self) -> Result<Function<'a>, CompileError> {
        let name = self.expect_ident()?.text;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.consume(TokenKind::RParen) {
            loop {
                let tok = self.expect_ident()?;
                params.push(self.push_var(tok.text));
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.consume(TokenKind::RBrace) {
            body.push(self.parse_stmt()?);
        }

        Ok(Function {
            name,
            params,
            body,
            locals: mem::take(&mut self.locals),
            stack_size: 0,
        })
    }

    // stmt = expr ";"
    //      | ";"
    //      | "if" "(" expr ")" stmt ("else" stmt)?
    //      | "while" "(" expr ")" stmt
    //      | "for" "(" expr? ";" expr? ";" expr? ")" stmt
    //      | "{" stmt* "}"
    //      | "return" expr ";"
    fn parse_stmt(&mut self) -> Result<Stmt<'a>, CompileError> {
        if self.consume(TokenKind::Return) {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semi)?;
            return Ok(Stmt::Return(expr));
        }

        if self.consume(TokenKind::If) {
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let then = Box::new(self.parse_stmt()?);
            let els = if self.consume(TokenKind::Else) {
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(Stmt::If { cond, then, els });
        }

        if self.consume(TokenKind::While) {
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::While { cond, body });
        }

        if self.consume(TokenKind::For) {
            self.expect(TokenKind::LParen)?;
            let init = if self.consume(TokenKind::Semi) {
                None
            } else {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Some(expr)
            };
            let cond = if self.consume(TokenKind::Semi) {
                None
            } else {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Some(expr)
            };
            let inc = if self.consume(TokenKind::RParen) {
                None
            } else {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Some(expr)
            };
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::For {
                init,
                cond,
                inc,
                body,
            });
        }

        if self.consume(TokenKind::LBrace) {
            let mut stmts = Vec::new();
            while !self.consume(TokenKind::RBrace) {
                stmts.push(self.parse_stmt()?);
            }
            return Ok(Stmt::Block(stmts));
        }

        if self.consume(TokenKind::Semi) {
            return Ok(Stmt::Null);
        }

        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Expr(expr))
    }

    // expr = assign
    fn parse_expr(&mut self) -> Result<Expr<'a>, CompileError> {
        self.parse_assign()
    }

    // assign = equality ("=" assign)?
    //
    // Assignment is right-associative, so the right side recurses instead of
    // folding in a loop.
    fn parse_assign(&mut self) -> Result<Expr<'a>, CompileError> {
        let node = self.parse_equality()?;
        let offset = self.peek().offset;
        if self.consume(TokenKind::Eq) {
            let rhs = self.parse_assign()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    lhs: Box::new(node),
                    rhs: Box::new(rhs),
                },
                offset,
            ));
        }
        Ok(node)
    }

    // equality = relational (("==" | "!=") relational)*
    fn parse_equality(&mut self) -> Result<Expr<'a>, CompileError> {
        let mut node = self.parse_relational()?;
        loop {
            let offset = self.peek().offset;
            if self.consume(TokenKind::EqEq) {
                node = Expr::binary(BinOp::Eq, node, self.parse_relational()?, offset);
            } else if self.consume(TokenKind::BangEq) {
                node = Expr::binary(BinOp::Ne, node, self.parse_relational()?, offset);
            } else {
                return Ok(node);
            }
        }
    }

    // relational = add (("<" | "<=" | ">" | ">=") add)*
    //
    // Normalization: `a > b` and `a >= b` are constructed as `b < a` and
    // `b <= a` — the tree never contains a greater-than node.
    fn parse_relational(&mut self) -> Result<Expr<'a>, CompileError> {
        let mut node = self.parse_add()?;
        loop {
            let offset = self.peek().offset;
            if self.consume(TokenKind::Lt) {
                node = Expr::binary(BinOp::Lt, node, self.parse_add()?, offset);
            } else if self.consume(TokenKind::LtEq) {
                node = Expr::binary(BinOp::Le, node, self.parse_add()?, offset);
            } else if self.consume(TokenKind::Gt) {
                node = Expr::binary(BinOp::Lt, self.parse_add()?, node, offset);
            } else if self.consume(TokenKind::GtEq) {
                node = Expr::binary(BinOp::Le, self.parse_add()?, node, offset);
            } else {
                return Ok(node);
            }
        }
    }

    // add = mul (("+" | "-") mul)*
    fn parse_add(&mut self) -> Result<Expr<'a>, CompileError> {
        let mut node = self.parse_mul()?;
        loop {
            let offset = self.peek().offset;
            if self.consume(TokenKind::Plus) {
                node = Expr::binary(BinOp::Add, node, self.parse_mul()?, offset);
            } else if self.consume(TokenKind::Minus) {
                node = Expr::binary(BinOp::Sub, node, self.parse_mul()?, offset);
            } else {
                return Ok(node);
            }
        }
    }

    // mul = unary (("*" | "/") unary)*
    fn parse_mul(&mut self) -> Result<Expr<'a>, CompileError> {
        let mut node = self.parse_unary()?;
        loop {
            let offset = self.peek().offset;
            if self.consume(TokenKind::Star) {
                node = Expr::binary(BinOp::Mul, node, self.parse_unary()?, offset);
            } else if self.consume(TokenKind::Slash) {
                node = Expr::binary(BinOp::Div, node, self.parse_unary()?, offset);
            } else {
                return Ok(node);
            }
        }
    }

    // unary = ("+" | "-" | "&" | "*") unary
    //       | "sizeof" unary
    //       | postfix
    //
    // `-x` is constructed as `0 - x`; `+x` is a no-op.
    fn parse_unary(&mut self) -> Result<Expr<'a>, CompileError> {
        let offset = self.peek().offset;
        if self.consume(TokenKind::Plus) {
            return self.parse_unary();
        }
        if self.consume(TokenKind::Minus) {
            let rhs = self.parse_unary()?;
            return Ok(Expr::binary(BinOp::Sub, Expr::num(0, offset), rhs, offset));
        }
        if self.consume(TokenKind::Amp) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Addr(Box::new(operand)), offset));
        }
        if self.consume(TokenKind::Star) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Deref(Box::new(operand)), offset));
        }
        if self.consume(TokenKind::Sizeof) {
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Sizeof(Box::new(operand)), offset));
        }
        self.parse_postfix()
    }

    // postfix = primary ("[" expr "]")*
    //
    // `a[b]` is syntax for `*(a + b)`.
    fn parse_postfix(&mut self) -> Result<Expr<'a>, CompileError> {
        let mut node = self.parse_primary()?;
        loop {
            let offset = self.peek().offset;
            if self.consume(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                let sum = Expr::binary(BinOp::Add, node, index, offset);
                node = Expr::new(ExprKind::Deref(Box::new(sum)), offset);
            } else {
                return Ok(node);
            }
        }
    }

    // primary = "(" expr ")"
    //         | ident "(" (assign ("," assign)*)? ")"
    //         | ident
    //         | number
    //
    // An identifier immediately followed by "(" is a call; any other
    // identifier is a variable, declared here on its first use.
    fn parse_primary(&mut self) -> Result<Expr<'a>, CompileError> {
        if self.consume(TokenKind::LParen) {
            let node = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            return Ok(node);
        }

        if let Some(tok) = self.consume_ident() {
            if self.consume(TokenKind::LParen) {
                let args = self.parse_call_args()?;
                return Ok(Expr::new(
                    ExprKind::Call {
                        name: tok.text,
                        args,
                    },
                    tok.offset,
                ));
            }
            let var = match self.find_var(tok.text) {
                Some(var) => var,
                None => self.push_var(tok.text),
            };
            return Ok(Expr::new(ExprKind::Var(var), tok.offset));
        }

        let tok = self.peek();
        if let TokenKind::Num(val) = tok.kind {
            self.pos += 1;
            return Ok(Expr::num(val, tok.offset));
        }
        Err(self.error_at(tok, format!("expected an expression, got {:?}", tok.kind)))
    }

    // args = (assign ("," assign)*)? ")"
    fn parse_call_args(&mut self) -> Result<Vec<Expr<'a>>, CompileError> {
        let mut args = Vec::new();
        if self.consume(TokenKind::RParen) {
            return Ok(args);
        }
        args.push(self.parse_assign()?);
        while self.consume(TokenKind::Comma) {
            args.push(self.parse_assign()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }
}
