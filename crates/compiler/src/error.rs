use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error at byte {offset}: {msg}")]
    Lex { offset: usize, msg: String },

    #[error("syntax error at byte {offset}: {msg}")]
    Syntax { offset: usize, msg: String },

    #[error("type error at byte {offset}: {msg}")]
    Type { offset: usize, msg: String },

    #[error("internal codegen error: {0}")]
    Codegen(String),
}

impl CompileError {
    /// Byte offset of the diagnostic, when the error carries a position.
    /// Codegen errors are programming defects, not user input errors, and
    /// have no source position.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CompileError::Lex { offset, .. }
            | CompileError::Syntax { offset, .. }
            | CompileError::Type { offset, .. } => Some(*offset),
            CompileError::Codegen(_) => None,
        }
    }

    /// Render the diagnostic as the offending source line with a caret
    /// aligned under the failing byte column.
    pub fn render(&self, source: &str) -> String {
        let Some(offset) = self.offset() else {
            return self.to_string();
        };
        let offset = offset.min(source.len());
        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i);
        let col = offset - line_start;
        format!(
            "{}\n{}^ {}",
            &source[line_start..line_end],
            " ".repeat(col),
            self
        )
    }
}
