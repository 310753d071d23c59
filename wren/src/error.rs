use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// Marshaling and host failures raised inside a foreign call abort the
/// running fiber and are handed back from [`crate::VM::interpret`] or
/// [`crate::Value::call`] as the error that caused the abort.
#[derive(Debug, Error)]
pub enum Error {
    #[error("maximum function registration reached ({capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("slot {slot}: expected {expected}, found {found}")]
    TypeMismatch {
        slot: usize,
        expected: String,
        found: String,
    },

    #[error("slot {slot}: {what} values cannot cross the bridge")]
    UnsupportedType { slot: usize, what: &'static str },

    #[error("slot {slot}: value is not accessible from the host")]
    Inaccessible { slot: usize },

    #[error("slot {slot}: missing argument")]
    MissingArgument { slot: usize },

    #[error("no foreign member registered for '{signature}'")]
    UnresolvedForeignMember { signature: String },

    #[error("module '{module}' may not bind foreign member '{member}'")]
    TrustViolation { module: String, member: String },

    #[error("host function failed: {0}")]
    Host(String),

    #[error("compilation error")]
    Compile,

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
