//! nanoc — a teaching-grade compiler for a minimal C subset.
//!
//! One source string goes in, one x86-64 assembly listing (Intel syntax)
//! comes out. The pipeline runs its four stages strictly in sequence:
//! [`lexer`] cuts the source into tokens, [`parser`] builds the syntax tree
//! and each function's variable table, [`typeck`] infers expression types
//! and lays out stack frames, and [`codegen`] walks the annotated tree and
//! emits text. The first error at any stage aborts the whole compilation.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod typeck;

pub use error::CompileError;

/// Compile one translation unit to assembly text.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let tokens = lexer::lex(source)?;
    let mut program = parser::parse(tokens)?;
    typeck::check(&mut program)?;
    codegen::emit(&program)
}
