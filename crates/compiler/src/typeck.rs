//! Type & offset pass. Runs once on a fully parsed program, between the
//! parser and the code generator: infers a static type for every expression
//! node, pins each variable's type, lays out every function's stack frame,
//! and rejects the few shapes codegen must never see (deref of a
//! non-pointer, assignment to a non-lvalue).

use std::mem;

use crate::ast::*;
use crate::error::CompileError;

/// Stack frames are rounded up to this boundary.
const STACK_ALIGN: usize = 8;

pub fn check(program: &mut Program<'_>) -> Result<(), CompileError> {
    for func in &mut program.functions {
        check_fn(func)?;
    }
    Ok(())
}

fn check_fn(func: &mut Function<'_>) -> Result<(), CompileError> {
    let Function {
        body,
        locals,
        stack_size,
        ..
    } = func;

    let mut checker = Checker { locals };
    for stmt in body.iter_mut() {
        checker.check_stmt(stmt)?;
    }

    // Frame layout: walk the locals most-recently-declared first, keeping a
    // running byte total; each variable's offset is its distance below the
    // frame base. Untyped variables (never assigned) settle as int here.
    let mut offset = 0;
    for var in checker.locals.iter_mut().rev() {
        let ty = var.ty.get_or_insert(Type::Int);
        offset += ty.size();
        var.offset = offset;
    }
    *stack_size = align_to(offset, STACK_ALIGN);
    Ok(())
}

pub fn align_to(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

struct Checker<'f, 'a> {
    locals: &'f mut Vec<Var<'a>>,
}

impl<'f, 'a> Checker<'f, 'a> {
    fn check_stmt(&mut self, stmt: &mut Stmt<'a>) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(expr) | Stmt::Return(expr) => {
                self.check_expr(expr)?;
            }
            Stmt::If { cond, then, els } => {
                self.check_expr(cond)?;
                self.check_stmt(then)?;
                if let Some(els) = els {
                    self.check_stmt(els)?;
                }
            }
            Stmt::While { cond, body } => {
                self.check_expr(cond)?;
                self.check_stmt(body)?;
            }
            Stmt::For {
                init,
                cond,
                inc,
                body,
            } => {
                if let Some(init) = init {
                    self.check_expr(init)?;
                }
                if let Some(cond) = cond {
                    self.check_expr(cond)?;
                }
                if let Some(inc) = inc {
                    self.check_expr(inc)?;
                }
                self.check_stmt(body)?;
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.check_stmt(stmt)?;
                }
            }
            Stmt::Null => {}
        }
        Ok(())
    }

    /// Bottom-up inference. Stores the result into `expr.ty` and returns it
    /// for the parent's rule.
    fn check_expr(&mut self, expr: &mut Expr<'a>) -> Result<Type, CompileError> {
        let ty = match &mut expr.kind {
            ExprKind::Num(_) => Type::Int,
            ExprKind::Var(id) => self.locals[id.0].ty.clone().unwrap_or(Type::Int),
            ExprKind::Sizeof(operand) => {
                self.check_expr(operand)?;
                Type::Int
            }
            ExprKind::Addr(operand) => {
                let operand_ty = self.check_expr(operand)?;
                ensure_lvalue(operand)?;
                Type::pointer_to(operand_ty)
            }
            ExprKind::Deref(operand) => {
                let operand_ty = self.check_expr(operand)?;
                match operand_ty.base() {
                    Some(base) => base.clone(),
                    None => {
                        return Err(CompileError::Type {
                            offset: expr.offset,
                            msg: "invalid pointer dereference".into(),
                        });
                    }
                }
            }
            ExprKind::Assign { lhs, rhs } => {
                let rhs_ty = self.check_expr(rhs)?;
                // First assignment into a still-untyped variable pins its
                // type; reads before any assignment default to int.
                if let ExprKind::Var(id) = &lhs.kind {
                    let var = &mut self.locals[id.0];
                    if var.ty.is_none() {
                        var.ty = Some(rhs_ty.clone());
                    }
                }
                let lhs_ty = self.check_expr(lhs)?;
                ensure_lvalue(lhs)?;
                lhs_ty
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.check_expr(arg)?;
                }
                // No declared return types; calls evaluate to int.
                Type::Int
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.check_expr(lhs)?;
                let rhs_ty = self.check_expr(rhs)?;
                match op {
                    BinOp::Add => {
                        if lhs_ty.base().is_some() && rhs_ty.base().is_some() {
                            return Err(invalid_operands(expr.offset));
                        }
                        if rhs_ty.base().is_some() {
                            // Canonicalize int + ptr to ptr + int so codegen
                            // only ever scales the right operand.
                            mem::swap(lhs, rhs);
                            rhs_ty
                        } else if lhs_ty.base().is_some() {
                            lhs_ty
                        } else {
                            Type::Int
                        }
                    }
                    BinOp::Sub => {
                        if rhs_ty.base().is_some() {
                            return Err(invalid_operands(expr.offset));
                        }
                        if lhs_ty.base().is_some() {
                            lhs_ty
                        } else {
                            Type::Int
                        }
                    }
                    BinOp::Mul | BinOp::Div | BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le => {
                        Type::Int
                    }
                }
            }
        };
        expr.ty = Some(ty.clone());
        Ok(ty)
    }
}

fn ensure_lvalue(expr: &Expr<'_>) -> Result<(), CompileError> {
    match expr.kind {
        ExprKind::Var(_) | ExprKind::Deref(_) => Ok(()),
        _ => Err(CompileError::Type {
            offset: expr.offset,
            msg: "not an lvalue".into(),
        }),
    }
}

fn invalid_operands(offset: usize) -> CompileError {
    CompileError::Type {
        offset,
        msg: "invalid operands".into(),
    }
}
