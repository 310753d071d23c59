use std::fmt;

use parser::ParseError;

/// What kind of report the VM is handing to the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Compile,
    Runtime,
    /// One frame of the trace that follows a runtime error.
    StackTrace,
}

/// One frame of a runtime error trace, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub module: String,
    pub line: usize,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceEntry>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub(crate) fn push_frame(&mut self, module: &str, line: usize, function: &str) {
        self.trace.push(TraceEntry {
            module: module.to_string(),
            line,
            function: function.to_string(),
        });
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Outcome of a failed `interpret` or `call`. The details have already
/// been reported through the error callback by the time this is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretError {
    Compile(Vec<ParseError>),
    Runtime(RuntimeError),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile(errors) => {
                write!(f, "compile error")?;
                if let Some(first) = errors.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            InterpretError::Runtime(err) => write!(f, "runtime error: {err}"),
        }
    }
}

impl std::error::Error for InterpretError {}
