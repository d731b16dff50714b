use logos::Logos;

use crate::error::CompileError;

/// Token classification. Logos picks the longest match at each position, so
/// a keyword followed by an identifier-continuation character lexes as one
/// identifier rather than keyword + remainder.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum TokenKind {
    // Keywords
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("int")]
    Int,
    #[token("char")]
    Char,
    #[token("sizeof")]
    Sizeof,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Num(i64),

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // Operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,
    #[token("&")]
    Amp,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    /// Input terminator. `lex` appends one for the end of input; an embedded
    /// NUL byte ends scanning at that point, the same way a C string would.
    #[token("\0")]
    Eof,
}

/// A token plus the source slice it was cut from. `text` borrows the
/// original input and is never copied; `offset` is the byte position used
/// for caret diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

/// Cut the source into a token sequence terminated by one `Eof` marker.
/// Fails on the first byte that matches no token rule.
pub fn lex(source: &str) -> Result<Vec<Token<'_>>, CompileError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut end = source.len();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(TokenKind::Eof) => {
                end = span.start;
                break;
            }
            Ok(kind) => tokens.push(Token {
                kind,
                text: lexer.slice(),
                offset: span.start,
            }),
            Err(_) => {
                return Err(CompileError::Lex {
                    offset: span.start,
                    msg: format!("invalid token: {:?}", &source[span.start..span.end]),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        offset: end,
    });
    Ok(tokens)
}
