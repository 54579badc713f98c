use std::fmt;

use glint_core::GlintError;

use crate::preprocessor::SourceMap;

/// Source location for error reporting.
///
/// `start`/`end` index the lexed text; `line`, `column` and `file` are the
/// authoring position after mapping through macro expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    pub file: u32,
    pub expansion: Option<u32>,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
            file: 0,
            expansion: None,
        }
    }
}

/// Token kinds in GLSL.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Discard,
    Struct,
    Layout,
    Precision,
    Invariant,
    Precise,
    Subroutine,

    /// Storage, interpolation, precision and memory qualifier keywords.
    Qualifier(String),
    /// Builtin type keywords (`float`, `vec3`, `sampler2D`, ...).
    TypeName(String),

    // Literals
    Identifier(String),
    IntLiteral(String),
    FloatLiteral(String),
    BoolLiteral(bool),
    StringLiteral(String),

    /// A `#` line that survived preprocessing, without the `#`.
    Directive(String),

    // Punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,
    Bang,
    Tilde,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,
    Ampersand,
    Caret,
    Pipe,
    AndAnd,
    XorXor,
    OrOr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    LeftAssign,
    RightAssign,
    AndAssign,
    XorAssign,
    OrAssign,

    // Special
    /// Placeholder for text the lexer could not read.
    Error(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Default => "default",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Discard => "discard",
            TokenKind::Struct => "struct",
            TokenKind::Layout => "layout",
            TokenKind::Precision => "precision",
            TokenKind::Invariant => "invariant",
            TokenKind::Precise => "precise",
            TokenKind::Subroutine => "subroutine",
            TokenKind::Qualifier(s)
            | TokenKind::TypeName(s)
            | TokenKind::Identifier(s)
            | TokenKind::IntLiteral(s)
            | TokenKind::FloatLiteral(s) => s,
            TokenKind::BoolLiteral(b) => return write!(f, "{}", b),
            TokenKind::StringLiteral(s) => return write!(f, "\"{}\"", s),
            TokenKind::Directive(s) => return write!(f, "#{}", s),
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Question => "?",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Increment => "++",
            TokenKind::Decrement => "--",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Ampersand => "&",
            TokenKind::Caret => "^",
            TokenKind::Pipe => "|",
            TokenKind::AndAnd => "&&",
            TokenKind::XorXor => "^^",
            TokenKind::OrOr => "||",
            TokenKind::Assign => "=",
            TokenKind::AddAssign => "+=",
            TokenKind::SubAssign => "-=",
            TokenKind::MulAssign => "*=",
            TokenKind::DivAssign => "/=",
            TokenKind::ModAssign => "%=",
            TokenKind::LeftAssign => "<<=",
            TokenKind::RightAssign => ">>=",
            TokenKind::AndAssign => "&=",
            TokenKind::XorAssign => "^=",
            TokenKind::OrAssign => "|=",
            TokenKind::Error(s) => return write!(f, "invalid token '{}'", s),
            TokenKind::Eof => "EOF",
        };
        f.write_str(text)
    }
}

const QUALIFIERS: &[&str] = &[
    "const",
    "in",
    "out",
    "inout",
    "uniform",
    "buffer",
    "shared",
    "attribute",
    "varying",
    "centroid",
    "sample",
    "patch",
    "flat",
    "smooth",
    "noperspective",
    "highp",
    "mediump",
    "lowp",
    "coherent",
    "volatile",
    "restrict",
    "readonly",
    "writeonly",
];

const SCALAR_TYPES: &[&str] = &["void", "bool", "int", "uint", "float", "double", "atomic_uint"];

const SAMPLER_DIMS: &[&str] = &[
    "1D",
    "2D",
    "3D",
    "Cube",
    "2DRect",
    "1DArray",
    "2DArray",
    "CubeArray",
    "Buffer",
    "2DMS",
    "2DMSArray",
    "1DShadow",
    "2DShadow",
    "2DRectShadow",
    "1DArrayShadow",
    "2DArrayShadow",
    "CubeShadow",
    "CubeArrayShadow",
    "External",
];

/// Whether `word` is a GLSL builtin type keyword.
pub fn is_builtin_type(word: &str) -> bool {
    if SCALAR_TYPES.contains(&word) {
        return true;
    }
    for prefix in ["vec", "bvec", "ivec", "uvec", "dvec"] {
        if let Some(n) = word.strip_prefix(prefix) {
            return matches!(n, "2" | "3" | "4");
        }
    }
    for prefix in ["mat", "dmat"] {
        if let Some(dims) = word.strip_prefix(prefix) {
            return matches!(
                dims,
                "2" | "3" | "4" | "2x2" | "2x3" | "2x4" | "3x2" | "3x3" | "3x4" | "4x2" | "4x3"
                    | "4x4"
            );
        }
    }
    for prefix in ["isampler", "usampler", "sampler", "iimage", "uimage", "image"] {
        if let Some(dim) = word.strip_prefix(prefix) {
            return SAMPLER_DIMS.contains(&dim);
        }
    }
    false
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "discard" => TokenKind::Discard,
        "struct" => TokenKind::Struct,
        "layout" => TokenKind::Layout,
        "precision" => TokenKind::Precision,
        "invariant" => TokenKind::Invariant,
        "precise" => TokenKind::Precise,
        "subroutine" => TokenKind::Subroutine,
        "true" => TokenKind::BoolLiteral(true),
        "false" => TokenKind::BoolLiteral(false),
        _ if QUALIFIERS.contains(&word) => TokenKind::Qualifier(word.to_string()),
        _ if is_builtin_type(word) => TokenKind::TypeName(word.to_string()),
        _ => return None,
    };
    Some(kind)
}

/// A token with its kind and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The GLSL lexer (tokenizer).
pub struct Lexer<'a> {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
    map: Option<&'a SourceMap>,
    file_name: String,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            map: None,
            file_name: "<source>".to_string(),
        }
    }

    /// Lex preprocessed text, mapping positions back through `map`.
    pub fn with_source_map(source: &str, map: &'a SourceMap) -> Self {
        Self {
            map: Some(map),
            ..Self::new(source)
        }
    }

    /// Name used for file id 0 when no source map is attached.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// File names indexed by the `file` field of produced spans.
    pub fn file_names(&self) -> Vec<String> {
        match self.map {
            Some(map) if !map.files().is_empty() => map.files().to_vec(),
            _ => vec![self.file_name.clone()],
        }
    }

    /// Tokenize the entire source, stopping at the first error.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, GlintError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    /// Tokenize the entire source, replacing unreadable text with
    /// [`TokenKind::Error`] placeholders and collecting every error.
    pub fn tokenize_recovering(&mut self) -> (Vec<Token>, Vec<GlintError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            // the error placeholder starts at the offending character
            self.skip_whitespace();
            let start = self.pos;
            let (line, column) = (self.line, self.column);
            match self.next_token() {
                Ok(token) => {
                    let is_eof = token.kind == TokenKind::Eof;
                    tokens.push(token);
                    if is_eof {
                        break;
                    }
                }
                Err(err) => {
                    if self.pos == start {
                        self.advance();
                    }
                    let text: String = self.source[start..self.pos].iter().collect();
                    let span = self.span(start, line, column);
                    tokens.push(Token::new(TokenKind::Error(text.trim().to_string()), span));
                    errors.push(err);
                }
            }
        }
        (tokens, errors)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(ch) = self.peek() {
            if pred(ch) {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn span(&self, start: usize, line: usize, column: usize) -> Span {
        let mut span = Span::new(start, self.pos, line, column);
        if let Some(location) = self.map.and_then(|map| map.lookup(line, column)) {
            span.line = location.line;
            span.column = location.column;
            span.file = location.file;
            span.expansion = location.expansion;
        }
        span
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> GlintError {
        let span = self.span(self.pos, line, column);
        let file = match self.map {
            Some(map) if !map.files().is_empty() => map.file_name(span.file).to_string(),
            _ => self.file_name.clone(),
        };
        GlintError::lex(message, file, span.line, span.column)
    }

    fn next_token(&mut self) -> Result<Token, GlintError> {
        self.skip_whitespace();

        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::Eof, self.span(start, line, column))),
        };

        let line_start = self.at_line_start;
        self.at_line_start = false;

        if ch == '#' && line_start {
            self.advance();
            let text = self.read_while(|c| c != '\n');
            return Ok(Token::new(
                TokenKind::Directive(text.trim().to_string()),
                self.span(start, line, column),
            ));
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let word = self.read_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let kind = keyword(&word).unwrap_or(TokenKind::Identifier(word));
            return Ok(Token::new(kind, self.span(start, line, column)));
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            let kind = self.read_number(line, column)?;
            return Ok(Token::new(kind, self.span(start, line, column)));
        }

        if ch == '"' {
            self.advance();
            let text = self.read_while(|c| c != '"' && c != '\n');
            if self.peek() != Some('"') {
                return Err(self.error("unterminated string literal", line, column));
            }
            self.advance();
            return Ok(Token::new(
                TokenKind::StringLiteral(text),
                self.span(start, line, column),
            ));
        }

        let kind = self.read_operator().ok_or_else(|| {
            self.error(format!("unexpected character '{}'", ch), line, column)
        })?;
        Ok(Token::new(kind, self.span(start, line, column)))
    }

    fn read_number(&mut self, line: usize, column: usize) -> Result<TokenKind, GlintError> {
        let mut text = String::new();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            for _ in 0..2 {
                if let Some(c) = self.advance() {
                    text.push(c);
                }
            }
            let digits = self.read_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(self.error("hexadecimal literal has no digits", line, column));
            }
            text.push_str(&digits);
            text.push_str(&self.read_while(|c| c == 'u' || c == 'U'));
            self.reject_suffix(line, column)?;
            return Ok(TokenKind::IntLiteral(text));
        }

        let mut is_float = false;
        text.push_str(&self.read_while(|c| c.is_ascii_digit()));
        if self.dot_is_decimal_point() {
            is_float = true;
            self.advance();
            text.push('.');
            text.push_str(&self.read_while(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            if let Some(e) = self.advance() {
                text.push(e);
            }
            if matches!(self.peek(), Some('+' | '-')) {
                if let Some(sign) = self.advance() {
                    text.push(sign);
                }
            }
            let exponent = self.read_while(|c| c.is_ascii_digit());
            if exponent.is_empty() {
                return Err(self.error("unterminated exponent in literal", line, column));
            }
            text.push_str(&exponent);
        }

        if is_float {
            match (self.peek(), self.peek_at(1)) {
                (Some('l'), Some('f')) | (Some('L'), Some('F')) => {
                    text.push_str(&self.read_while(|c| matches!(c, 'l' | 'f' | 'L' | 'F')));
                }
                (Some('f' | 'F'), _) => {
                    if let Some(suffix) = self.advance() {
                        text.push(suffix);
                    }
                }
                _ => {}
            }
            self.reject_suffix(line, column)?;
            return Ok(TokenKind::FloatLiteral(text));
        }

        match self.peek() {
            Some('u' | 'U') => {
                if let Some(suffix) = self.advance() {
                    text.push(suffix);
                }
            }
            // `1f` is not valid GLSL but drivers accept it.
            Some('f' | 'F') => {
                if let Some(suffix) = self.advance() {
                    text.push(suffix);
                }
                self.reject_suffix(line, column)?;
                return Ok(TokenKind::FloatLiteral(text));
            }
            _ => {}
        }
        self.reject_suffix(line, column)?;
        Ok(TokenKind::IntLiteral(text))
    }

    /// `1.5`, `1.`, `1.e3` and `1.f` continue a literal; `a[0].x` does not.
    fn dot_is_decimal_point(&self) -> bool {
        if self.peek() != Some('.') {
            return false;
        }
        let word_char = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        match self.peek_at(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some('e' | 'E') => matches!(self.peek_at(2), Some('+' | '-' | '0'..='9')),
            Some('f' | 'F') => !word_char(self.peek_at(2)),
            Some('l' | 'L') => {
                matches!(self.peek_at(2), Some('f' | 'F')) && !word_char(self.peek_at(3))
            }
            next => !word_char(next),
        }
    }

    fn reject_suffix(&mut self, line: usize, column: usize) -> Result<(), GlintError> {
        if self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            let junk = self.read_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return Err(self.error(format!("invalid literal suffix '{}'", junk), line, column));
        }
        Ok(())
    }

    fn read_operator(&mut self) -> Option<TokenKind> {
        let ch = self.peek()?;
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let (kind, len) = match (ch, next, third) {
            ('<', Some('<'), Some('=')) => (TokenKind::LeftAssign, 3),
            ('>', Some('>'), Some('=')) => (TokenKind::RightAssign, 3),
            ('+', Some('+'), _) => (TokenKind::Increment, 2),
            ('-', Some('-'), _) => (TokenKind::Decrement, 2),
            ('<', Some('<'), _) => (TokenKind::LeftShift, 2),
            ('>', Some('>'), _) => (TokenKind::RightShift, 2),
            ('<', Some('='), _) => (TokenKind::LessEqual, 2),
            ('>', Some('='), _) => (TokenKind::GreaterEqual, 2),
            ('=', Some('='), _) => (TokenKind::EqualEqual, 2),
            ('!', Some('='), _) => (TokenKind::NotEqual, 2),
            ('&', Some('&'), _) => (TokenKind::AndAnd, 2),
            ('^', Some('^'), _) => (TokenKind::XorXor, 2),
            ('|', Some('|'), _) => (TokenKind::OrOr, 2),
            ('+', Some('='), _) => (TokenKind::AddAssign, 2),
            ('-', Some('='), _) => (TokenKind::SubAssign, 2),
            ('*', Some('='), _) => (TokenKind::MulAssign, 2),
            ('/', Some('='), _) => (TokenKind::DivAssign, 2),
            ('%', Some('='), _) => (TokenKind::ModAssign, 2),
            ('&', Some('='), _) => (TokenKind::AndAssign, 2),
            ('^', Some('='), _) => (TokenKind::XorAssign, 2),
            ('|', Some('='), _) => (TokenKind::OrAssign, 2),
            ('(', _, _) => (TokenKind::LeftParen, 1),
            (')', _, _) => (TokenKind::RightParen, 1),
            ('[', _, _) => (TokenKind::LeftBracket, 1),
            (']', _, _) => (TokenKind::RightBracket, 1),
            ('{', _, _) => (TokenKind::LeftBrace, 1),
            ('}', _, _) => (TokenKind::RightBrace, 1),
            ('.', _, _) => (TokenKind::Dot, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            (':', _, _) => (TokenKind::Colon, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            ('?', _, _) => (TokenKind::Question, 1),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('!', _, _) => (TokenKind::Bang, 1),
            ('~', _, _) => (TokenKind::Tilde, 1),
            ('<', _, _) => (TokenKind::Less, 1),
            ('>', _, _) => (TokenKind::Greater, 1),
            ('&', _, _) => (TokenKind::Ampersand, 1),
            ('^', _, _) => (TokenKind::Caret, 1),
            ('|', _, _) => (TokenKind::Pipe, 1),
            ('=', _, _) => (TokenKind::Assign, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.advance();
        }
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_types() {
        let tokens = tokenize("uniform highp vec4 color; struct S");
        assert_eq!(tokens[0], TokenKind::Qualifier("uniform".into()));
        assert_eq!(tokens[1], TokenKind::Qualifier("highp".into()));
        assert_eq!(tokens[2], TokenKind::TypeName("vec4".into()));
        assert_eq!(tokens[3], TokenKind::Identifier("color".into()));
        assert_eq!(tokens[4], TokenKind::Semicolon);
        assert_eq!(tokens[5], TokenKind::Struct);
        assert_eq!(tokens[6], TokenKind::Identifier("S".into()));
        assert_eq!(tokens[7], TokenKind::Eof);
    }

    #[test]
    fn test_builtin_type_table() {
        assert!(is_builtin_type("mat3x4"));
        assert!(is_builtin_type("usampler2DArray"));
        assert!(is_builtin_type("image2D"));
        assert!(is_builtin_type("dvec2"));
        assert!(!is_builtin_type("vec5"));
        assert!(!is_builtin_type("samplerFoo"));
    }

    #[test]
    fn test_numbers_keep_text() {
        let tokens = tokenize("1 0x1Fu 2u 1.0 .5 3e-2 1.5lf 2.0f");
        assert_eq!(tokens[0], TokenKind::IntLiteral("1".into()));
        assert_eq!(tokens[1], TokenKind::IntLiteral("0x1Fu".into()));
        assert_eq!(tokens[2], TokenKind::IntLiteral("2u".into()));
        assert_eq!(tokens[3], TokenKind::FloatLiteral("1.0".into()));
        assert_eq!(tokens[4], TokenKind::FloatLiteral(".5".into()));
        assert_eq!(tokens[5], TokenKind::FloatLiteral("3e-2".into()));
        assert_eq!(tokens[6], TokenKind::FloatLiteral("1.5lf".into()));
        assert_eq!(tokens[7], TokenKind::FloatLiteral("2.0f".into()));
    }

    #[test]
    fn test_swizzle_after_int_index() {
        let tokens = tokenize("a[0].x 1.f");
        assert_eq!(tokens[2], TokenKind::IntLiteral("0".into()));
        assert_eq!(tokens[4], TokenKind::Dot);
        assert_eq!(tokens[5], TokenKind::Identifier("x".into()));
        assert_eq!(tokens[6], TokenKind::FloatLiteral("1.f".into()));
    }

    #[test]
    fn test_operators_longest_match() {
        let tokens = tokenize("a <<= b >> c ^^ d++ -= e");
        assert_eq!(tokens[1], TokenKind::LeftAssign);
        assert_eq!(tokens[3], TokenKind::RightShift);
        assert_eq!(tokens[5], TokenKind::XorXor);
        assert_eq!(tokens[7], TokenKind::Increment);
        assert_eq!(tokens[8], TokenKind::SubAssign);
    }

    #[test]
    fn test_directive_only_at_line_start() {
        let tokens = tokenize("#version 330 core\n  #extension GL_ARB_foo : enable\nfloat x;");
        assert_eq!(tokens[0], TokenKind::Directive("version 330 core".into()));
        assert_eq!(tokens[1], TokenKind::Directive("extension GL_ARB_foo : enable".into()));
        assert_eq!(tokens[2], TokenKind::TypeName("float".into()));
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("float x;\n  int y;");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!((tokens[3].span.line, tokens[3].span.column), (2, 3));
    }

    #[test]
    fn test_invalid_char() {
        let mut lexer = Lexer::new("float $x;");
        assert!(matches!(lexer.tokenize(), Err(GlintError::Lex { .. })));
    }

    #[test]
    fn test_unterminated_literal() {
        let mut lexer = Lexer::new("\"hello\nx");
        assert!(lexer.tokenize().is_err());
        let mut lexer = Lexer::new("1e+;");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_recovering_collects_all_errors() {
        let mut lexer = Lexer::new("float a = 1 $ 2;\nint b = @;");
        let (tokens, errors) = lexer.tokenize_recovering();
        assert_eq!(errors.len(), 2);
        assert!(tokens.iter().any(|t| matches!(t.kind, TokenKind::Error(_))));
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
        match &errors[1] {
            GlintError::Lex { line, column, .. } => assert_eq!((*line, *column), (2, 9)),
            other => panic!("expected lex error, got {:?}", other),
        }
    }

    #[test]
    fn test_recovering_reports_each_bad_character_once() {
        let mut lexer = Lexer::new("a   $\n\t@ b");
        let (tokens, errors) = lexer.tokenize_recovering();
        assert_eq!(errors.len(), 2);
        let placeholders: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Error(text) => Some((text.as_str(), t.span.column)),
                _ => None,
            })
            .collect();
        assert_eq!(placeholders, vec![("$", 5), ("@", 2)]);
        assert_eq!(tokens.len(), 5);
    }
}
