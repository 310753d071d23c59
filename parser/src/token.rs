/// Token types produced by the lexer.
use crate::span::{Pos, Span};

/// One piece of a string literal. Interpolated code is kept as raw source
/// and parsed separately by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    /// The text between `%(` and the matching `)`, and where it starts.
    Code { source: String, start: Pos },
}

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Number literal, e.g. `42`, `3.5`, `0xff`, `1e3`.
    Number(f64),
    /// String literal, split at `%(...)` interpolations.
    String(Vec<StringPart>),
    /// An identifier, e.g. `System`, `print`, `x`.
    Name(String),
    /// A field reference, e.g. `_msg` (text includes the underscore).
    Field(String),

    Break,
    Class,
    Construct,
    Else,
    False,
    For,
    Foreign,
    If,
    Import,
    Null,
    Return,
    Static,
    This,
    True,
    Var,
    While,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Bang,
    Eq,
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AmpAmp,
    PipePipe,

    /// A newline; statements are newline-terminated.
    Line,
    /// End of input.
    Eof,
    /// An unrecognized character or malformed token.
    Error(String),
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Name(_) => "name",
            Self::Field(_) => "field",
            Self::Break => "`break`",
            Self::Class => "`class`",
            Self::Construct => "`construct`",
            Self::Else => "`else`",
            Self::False => "`false`",
            Self::For => "`for`",
            Self::Foreign => "`foreign`",
            Self::If => "`if`",
            Self::Import => "`import`",
            Self::Null => "`null`",
            Self::Return => "`return`",
            Self::Static => "`static`",
            Self::This => "`this`",
            Self::True => "`true`",
            Self::Var => "`var`",
            Self::While => "`while`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Comma => "`,`",
            Self::Dot => "`.`",
            Self::Bang => "`!`",
            Self::Eq => "`=`",
            Self::EqEq => "`==`",
            Self::BangEq => "`!=`",
            Self::Lt => "`<`",
            Self::Gt => "`>`",
            Self::LtEq => "`<=`",
            Self::GtEq => "`>=`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::Percent => "`%`",
            Self::AmpAmp => "`&&`",
            Self::PipePipe => "`||`",
            Self::Line => "newline",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    pub fn keyword(ident: &str) -> Option<Self> {
        let kind = match ident {
            "break" => Self::Break,
            "class" => Self::Class,
            "construct" => Self::Construct,
            "else" => Self::Else,
            "false" => Self::False,
            "for" => Self::For,
            "foreign" => Self::Foreign,
            "if" => Self::If,
            "import" => Self::Import,
            "null" => Self::Null,
            "return" => Self::Return,
            "static" => Self::Static,
            "this" => Self::This,
            "true" => Self::True,
            "var" => Self::Var,
            "while" => Self::While,
            _ => return None,
        };
        Some(kind)
    }

    /// Operator method name when the token is usable as a binary operator.
    pub fn operator(&self) -> Option<&'static str> {
        let op = match self {
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            _ => return None,
        };
        Some(op)
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
