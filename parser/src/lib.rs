//! # Parser
//!
//! Lexer and recursive-descent parser for the scripting dialect embedded
//! by the `vm` crate.
//!
//! ```text
//!  &str source
//!      │
//!      ▼
//!  ┌────────┐    Token stream     ┌────────┐    Stmt stream
//!  │ Lexer  │ ──────────────────▶ │ Parser │ ──────────────────▶
//!  └────────┘  (impl Iterator)    └────────┘  (impl Iterator)
//! ```
//!
//! ```rust
//! use parser::{Lexer, Parser};
//!
//! let source = "class Bird {\n  static fly(where) { \"Flying to %(where)!\" }\n}";
//! for result in Parser::new(Lexer::from_str(source)) {
//!     match result {
//!         Ok(stmt) => println!("{:#?}", stmt),
//!         Err(err) => eprintln!("Parse error: {}", err),
//!     }
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{
    AssignTarget, ClassDecl, Expr, ExprKind, InterpolationPart, LogicalOp,
    MethodDecl, MethodKind, Stmt, call_signature,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser, parse_module};
pub use span::{Pos, Span};
pub use token::{StringPart, Token, TokenKind};
