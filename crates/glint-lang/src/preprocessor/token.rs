//! Preprocessing tokens: the unit macro expansion works on.

use super::source_map::{Location, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PpKind {
    Ident,
    Number,
    Punct,
    Str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PpToken {
    pub kind: PpKind,
    pub text: String,
    pub space_before: bool,
    pub file: u32,
    pub line: usize,
    pub column: usize,
    /// Number of macro expansions that produced this token.
    pub depth: usize,
    /// Outermost macro invocation this token came from.
    pub expansion: Option<u32>,
}

impl PpToken {
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == PpKind::Punct && self.text == text
    }

    pub fn location(&self) -> Location {
        Location {
            file: self.file,
            line: self.line,
            column: self.column,
            expansion: self.expansion,
        }
    }

    /// Copy of this token moved to another position.
    pub fn placed_at(&self, site: &PpToken, expansion: u32) -> PpToken {
        PpToken {
            file: site.file,
            line: site.line,
            column: site.column,
            expansion: Some(site.expansion.unwrap_or(expansion)),
            depth: site.depth + 1,
            ..self.clone()
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "##", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=",
    "-=", "*=", "/=", "%=", "&=", "^=", "|=",
];

/// Classify the text of a pasted token.
pub(crate) fn classify(text: &str) -> PpKind {
    match text.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => PpKind::Ident,
        Some(c) if c.is_ascii_digit() => PpKind::Number,
        Some('"') => PpKind::Str,
        _ => PpKind::Punct,
    }
}

/// Split one logical line into preprocessing tokens with 1-based columns.
pub(crate) fn tokenize_line(text: &str, file: u32, line: usize) -> Vec<PpToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut space_before = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            space_before = true;
            i += 1;
            continue;
        }
        let start = i;
        let kind = if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            PpKind::Ident
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            i += 1;
            while i < chars.len() {
                let ch = chars[i];
                if matches!(ch, '+' | '-') && matches!(chars[i - 1], 'e' | 'E') {
                    i += 1;
                } else if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                    i += 1;
                } else {
                    break;
                }
            }
            PpKind::Number
        } else if c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            PpKind::Str
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let len = PUNCTUATORS
                .iter()
                .find(|p| rest.starts_with(**p))
                .map(|p| p.len())
                .unwrap_or(1);
            i += len;
            PpKind::Punct
        };
        tokens.push(PpToken {
            kind,
            text: chars[start..i].iter().collect(),
            space_before,
            file,
            line,
            column: start + 1,
            depth: 0,
            expansion: None,
        });
        space_before = false;
    }
    tokens
}

fn is_word(kind: PpKind) -> bool {
    matches!(kind, PpKind::Ident | PpKind::Number)
}

fn needs_space(prev: &PpToken, next: &PpToken) -> bool {
    if is_word(prev.kind) && is_word(next.kind) {
        return true;
    }
    if prev.kind == PpKind::Punct && next.kind == PpKind::Punct {
        let mut joined = prev.text.chars().last().map(String::from).unwrap_or_default();
        joined.extend(next.text.chars().next());
        return PUNCTUATORS.contains(&joined.as_str()) || joined == "//" || joined == "/*";
    }
    false
}

/// Render tokens as one output line, recording where each token came from.
pub(crate) fn render(tokens: &[PpToken]) -> (String, Vec<Segment>) {
    let mut text = String::new();
    let mut segments = Vec::with_capacity(tokens.len());
    let mut column = 1;
    let mut prev: Option<&PpToken> = None;
    for token in tokens {
        if let Some(prev) = prev {
            if token.space_before || needs_space(prev, token) {
                text.push(' ');
                column += 1;
            }
        }
        segments.push(Segment {
            out_column: column,
            location: token.location(),
        });
        text.push_str(&token.text);
        column += token.text.chars().count();
        prev = Some(token);
    }
    (text, segments)
}

/// Render tokens as the body of a string literal, for `#param`.
pub(crate) fn stringify(tokens: &[PpToken]) -> String {
    let mut out = String::from("\"");
    for (index, token) in tokens.iter().enumerate() {
        if index > 0 && token.space_before {
            out.push(' ');
        }
        for c in token.text.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[PpToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_line() {
        let tokens = tokenize_line("  x+=FOO(1.5e-3,\"a b\") ## y", 0, 4);
        assert_eq!(
            texts(&tokens),
            vec!["x", "+=", "FOO", "(", "1.5e-3", ",", "\"a b\"", ")", "##", "y"]
        );
        assert_eq!(tokens[0].column, 3);
        assert!(tokens[0].space_before);
        assert!(!tokens[1].space_before);
        assert_eq!(tokens[4].kind, PpKind::Number);
        assert_eq!(tokens[6].kind, PpKind::Str);
    }

    #[test]
    fn test_render_separates_merging_tokens() {
        let mut tokens = tokenize_line("a - b", 0, 1);
        tokens[2] = tokenize_line("-b", 0, 1).remove(0);
        tokens[2].space_before = false;
        let (text, segments) = render(&tokens);
        assert_eq!(text, "a - -");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].out_column, 5);
    }

    #[test]
    fn test_stringify_escapes() {
        let tokens = tokenize_line("a  \"q\"", 0, 1);
        assert_eq!(stringify(&tokens), "\"a \\\"q\\\"\"");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("ab1"), PpKind::Ident);
        assert_eq!(classify("12"), PpKind::Number);
        assert_eq!(classify("+="), PpKind::Punct);
    }
}
