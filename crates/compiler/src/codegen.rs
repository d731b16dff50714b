//! Code generation: lower the typed, offset-annotated AST into x86-64
//! assembly text (Intel syntax).
//!
//! The emitter is a stack machine over a single accumulator: every
//! expression ends by pushing its value, and binary operators pop the right
//! operand into `rdi` and the left into `rax`. No registers are allocated —
//! every intermediate value round-trips through the runtime stack. That
//! costs memory traffic and buys a backend with no liveness analysis at all.

use crate::ast::*;
use crate::error::CompileError;

/// SysV integer argument registers, in parameter order.
const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

pub fn emit(program: &Program<'_>) -> Result<String, CompileError> {
    let mut emitter = Emitter {
        out: String::new(),
        labelseq: 0,
    };
    emitter.raw(".intel_syntax noprefix");
    emitter.raw(".globl main");
    for func in &program.functions {
        emitter.emit_fn(func)?;
    }
    Ok(emitter.out)
}

struct Emitter {
    out: String,
    /// One counter for every control-flow construct in the program, so
    /// sibling and nested label pairs never collide.
    labelseq: usize,
}

impl Emitter {
    fn raw(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    fn ins(&mut self, ins: impl AsRef<str>) {
        self.out.push_str("  ");
        self.raw(ins);
    }

    fn next_label(&mut self) -> usize {
        let seq = self.labelseq;
        self.labelseq += 1;
        seq
    }

    /// Pop an address, load through it, push the value.
    fn load(&mut self) {
        self.ins("pop rax");
        self.ins("mov rax, [rax]");
        self.ins("push rax");
    }

    /// Pop a value and an address, store through the address, re-push the
    /// value (assignment is an expression).
    fn store(&mut self) {
        self.ins("pop rdi");
        self.ins("pop rax");
        self.ins("mov [rax], rdi");
        self.ins("push rdi");
    }

    fn compare(&mut self, set: &str) {
        self.ins("cmp rax, rdi");
        self.ins(format!("{set} al"));
        self.ins("movzb rax, al");
    }

    fn emit_fn(&mut self, func: &Function<'_>) -> Result<(), CompileError> {
        if func.params.len() > ARG_REGS.len() {
            return Err(CompileError::Codegen(format!(
                "function {} takes more than {} parameters",
                func.name,
                ARG_REGS.len()
            )));
        }

        self.raw(format!("{}:", func.name));
        self.ins("push rbp");
        self.ins("mov rbp, rsp");
        self.ins(format!("sub rsp, {}", func.stack_size));

        // Spill incoming arguments into their frame slots, in source order.
        for (i, id) in func.params.iter().enumerate() {
            let offset = func.locals[id.0].offset;
            self.ins(format!("mov [rbp-{}], {}", offset, ARG_REGS[i]));
        }

        for stmt in &func.body {
            self.emit_stmt(stmt, func)?;
        }

        self.raw(format!(".Lreturn.{}:", func.name));
        self.ins("mov rsp, rbp");
        self.ins("pop rbp");
        self.ins("ret");
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt<'_>, func: &Function<'_>) -> Result<(), CompileError> {
        match stmt {
            Stmt::Null => {}
            // The statement's value lands in rax, so the last statement of a
            // function doubles as its result when no return is written.
            Stmt::Expr(expr) => {
                self.emit_expr(expr, func)?;
                self.ins("pop rax");
            }
            Stmt::Return(expr) => {
                self.emit_expr(expr, func)?;
                self.ins("pop rax");
                self.ins(format!("jmp .Lreturn.{}", func.name));
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.emit_stmt(stmt, func)?;
                }
            }
            Stmt::If { cond, then, els } => {
                let seq = self.next_label();
                self.emit_expr(cond, func)?;
                self.ins("pop rax");
                self.ins("cmp rax, 0");
                match els {
                    Some(els) => {
                        self.ins(format!("je .Lelse{seq}"));
                        self.emit_stmt(then, func)?;
                        self.ins(format!("jmp .Lend{seq}"));
                        self.raw(format!(".Lelse{seq}:"));
                        self.emit_stmt(els, func)?;
                    }
                    None => {
                        self.ins(format!("je .Lend{seq}"));
                        self.emit_stmt(then, func)?;
                    }
                }
                self.raw(format!(".Lend{seq}:"));
            }
            Stmt::While { cond, body } => {
                let seq = self.next_label();
                self.raw(format!(".Lbegin{seq}:"));
                self.emit_expr(cond, func)?;
                self.ins("pop rax");
                self.ins("cmp rax, 0");
                self.ins(format!("je .Lend{seq}"));
                self.emit_stmt(body, func)?;
                self.ins(format!("jmp .Lbegin{seq}"));
                self.raw(format!(".Lend{seq}:"));
            }
            Stmt::For {
                init,
                cond,
                inc,
                body,
            } => {
                let seq = self.next_label();
                if let Some(init) = init {
                    self.emit_expr(init, func)?;
                    self.ins("pop rax");
                }
                self.raw(format!(".Lbegin{seq}:"));
                // An omitted condition is always true: no comparison, just
                // the unconditional back-edge below.
                if let Some(cond) = cond {
                    self.emit_expr(cond, func)?;
                    self.ins("pop rax");
                    self.ins("cmp rax, 0");
                    self.ins(format!("je .Lend{seq}"));
                }
                self.emit_stmt(body, func)?;
                if let Some(inc) = inc {
                    self.emit_expr(inc, func)?;
                    self.ins("pop rax");
                }
                self.ins(format!("jmp .Lbegin{seq}"));
                self.raw(format!(".Lend{seq}:"));
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr<'_>, func: &Function<'_>) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Num(val) => {
                self.ins(format!("push {val}"));
            }
            ExprKind::Sizeof(operand) => {
                // The operand was typed by the type pass but is never
                // evaluated.
                let size = expr_type(operand)?.size();
                self.ins(format!("push {size}"));
            }
            ExprKind::Var(_) => {
                self.emit_addr(expr, func)?;
                self.load();
            }
            ExprKind::Deref(operand) => {
                self.emit_expr(operand, func)?;
                self.load();
            }
            ExprKind::Addr(operand) => {
                self.emit_addr(operand, func)?;
            }
            ExprKind::Assign { lhs, rhs } => {
                self.emit_addr(lhs, func)?;
                self.emit_expr(rhs, func)?;
                self.store();
            }
            ExprKind::Call { name, args } => {
                if args.len() > ARG_REGS.len() {
                    return Err(CompileError::Codegen(format!(
                        "call to {} passes more than {} arguments",
                        name,
                        ARG_REGS.len()
                    )));
                }
                for arg in args {
                    self.emit_expr(arg, func)?;
                }
                for i in (0..args.len()).rev() {
                    self.ins(format!("pop {}", ARG_REGS[i]));
                }
                // rsp must sit on a 16-byte boundary at the call
                // instruction; the parity is only known at runtime, so
                // branch on it and compensate with one spare slot.
                let seq = self.next_label();
                self.ins("mov rax, rsp");
                self.ins("and rax, 15");
                self.ins(format!("jnz .Lcall{seq}"));
                self.ins("mov rax, 0");
                self.ins(format!("call {name}"));
                self.ins(format!("jmp .Lend{seq}"));
                self.raw(format!(".Lcall{seq}:"));
                self.ins("sub rsp, 8");
                self.ins("mov rax, 0");
                self.ins(format!("call {name}"));
                self.ins("add rsp, 8");
                self.raw(format!(".Lend{seq}:"));
                self.ins("push rax");
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs, func)?;
                self.emit_expr(rhs, func)?;
                self.ins("pop rdi");
                self.ins("pop rax");
                match op {
                    BinOp::Add => {
                        self.scale_pointer_operand(lhs)?;
                        self.ins("add rax, rdi");
                    }
                    BinOp::Sub => {
                        self.scale_pointer_operand(lhs)?;
                        self.ins("sub rax, rdi");
                    }
                    BinOp::Mul => {
                        self.ins("imul rax, rdi");
                    }
                    BinOp::Div => {
                        self.ins("cqo");
                        self.ins("idiv rdi");
                    }
                    BinOp::Eq => self.compare("sete"),
                    BinOp::Ne => self.compare("setne"),
                    BinOp::Lt => self.compare("setl"),
                    BinOp::Le => self.compare("setle"),
                }
                self.ins("push rax");
            }
        }
        Ok(())
    }

    /// Pointer ± int scales the integer operand (always the right one after
    /// the type pass canonicalized operand order) by the pointee size.
    fn scale_pointer_operand(&mut self, lhs: &Expr<'_>) -> Result<(), CompileError> {
        if let Some(base) = expr_type(lhs)?.base() {
            self.ins(format!("imul rdi, {}", base.size()));
        }
        Ok(())
    }

    /// Push the address an lvalue names. The type pass has already rejected
    /// non-lvalues, so the fallthrough is a pipeline defect.
    fn emit_addr(&mut self, expr: &Expr<'_>, func: &Function<'_>) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Var(id) => {
                let offset = func.locals[id.0].offset;
                self.ins(format!("lea rax, [rbp-{offset}]"));
                self.ins("push rax");
                Ok(())
            }
            ExprKind::Deref(operand) => self.emit_expr(operand, func),
            _ => Err(CompileError::Codegen(
                "address taken of a non-lvalue node".into(),
            )),
        }
    }
}

fn expr_type<'t>(expr: &'t Expr<'_>) -> Result<&'t Type, CompileError> {
    expr.ty.as_ref().ok_or_else(|| {
        CompileError::Codegen("expression reached codegen without a type".into())
    })
}
