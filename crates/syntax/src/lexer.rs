//! Tokenizer for the supported ECMAScript subset.

use crate::{ast::Position, error::ParseError};

/// Punctuators ordered so that the longest match wins.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "===", "!==", ">>>", "<<=", ">>=", "==", "!=", "<=", ">=", "&&", "||", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "{", "}", "(", ")", "[", "]",
    ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
];

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Identifiers and keywords alike; the parser decides which is which.
    Word(String),
    Number(f64),
    String(String),
    Punct(&'static str),
    /// A regular expression literal: pattern and flags.
    Regex(String, String),
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub end: Position,
    /// Whether a line terminator separates this token from the previous one.
    pub newline_before: bool,
    /// The exact source text, used for literal `raw` values.
    pub raw: String,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self.kind, TokenKind::Punct(q) if q == p)
    }

    pub fn is_word(&self, w: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(q) if q == w)
    }

    /// Whether a `/` after this token starts a regular expression rather than a division.
    fn allows_regex(&self) -> bool {
        match &self.kind {
            TokenKind::Punct(p) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            TokenKind::Word(w) => KEYWORDS_BEFORE_EXPRESSION.contains(&w.as_str()),
            _ => false,
        }
    }
}

const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &[
    "return", "typeof", "instanceof", "in", "new", "delete", "void", "throw", "case", "do", "else",
];

struct Lexer<'a> {
    chars: Vec<char>,
    source: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

/// Split `source` into tokens. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer { chars: source.chars().collect(), source, offset: 0, line: 1, column: 0 };
    let mut tokens = Vec::new();
    loop {
        let newline_before = lexer.skip_trivia()?;
        let start = lexer.position();
        let begin = lexer.offset;
        let regex_allowed = tokens.last().map_or(true, |token: &Token| token.allows_regex());
        let kind = lexer.next_kind(regex_allowed)?;
        let raw: String = lexer.chars[begin..lexer.offset].iter().collect();
        let done = kind == TokenKind::Eof;
        tokens.push(Token { kind, start, end: lexer.position(), newline_before, raw });
        if done {
            break;
        }
    }
    trace!(count = tokens.len(), bytes = lexer.source.len(), "tokenized source");
    Ok(tokens)
}

impl Lexer<'_> {
    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.offset + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    /// Skip whitespace and comments, reporting whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut newline = false;
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    newline = true;
                    self.bump();
                }
                c if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    fn next_kind(&mut self, regex_allowed: bool) -> Result<TokenKind, ParseError> {
        let Some(c) = self.peek() else {
            return Ok(TokenKind::Eof);
        };

        if c == '/' && regex_allowed {
            return self.regex();
        }

        if is_identifier_start(c) {
            let mut word = String::new();
            while let Some(c) = self.peek().filter(|c| is_identifier_part(*c)) {
                word.push(c);
                self.bump();
            }
            return Ok(TokenKind::Word(word));
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.number();
        }

        if c == '"' || c == '\'' {
            return self.string(c);
        }

        for punct in PUNCTUATORS {
            let matches = punct.chars().enumerate().all(|(i, p)| self.peek_at(i) == Some(p));
            if matches {
                for _ in 0..punct.len() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }

        Err(self.error(format!("unexpected character {c:?}")))
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.bump();
            }
            let value = u64::from_str_radix(&digits, 16)
                .map_err(|_| self.error("invalid hexadecimal literal"))?;
            return Ok(TokenKind::Number(value as f64));
        }

        let mut text = String::new();
        let digits = |lexer: &mut Self, text: &mut String| {
            while let Some(c) = lexer.peek().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                lexer.bump();
            }
        };
        digits(self, &mut text);
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            digits(self, &mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            digits(self, &mut text);
        }
        if self.peek().is_some_and(is_identifier_start) {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        text.parse::<f64>().map(TokenKind::Number).map_err(|_| self.error("invalid number"))
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            match c {
                c if c == quote => break,
                '\n' => return Err(self.error("unterminated string literal")),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(self.error("unterminated string literal"));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'v' => value.push('\u{b}'),
                        '0' => value.push('\0'),
                        'x' => value.push(self.hex_escape(2)?),
                        'u' => value.push(self.hex_escape(4)?),
                        // line continuation
                        '\n' => {}
                        other => value.push(other),
                    }
                }
                c => value.push(c),
            }
        }
        Ok(TokenKind::String(value))
    }

    fn regex(&mut self) -> Result<TokenKind, ParseError> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let c = match self.bump() {
                None | Some('\n' | '\r' | '\u{2028}' | '\u{2029}') => {
                    return Err(self.error("unterminated regular expression"))
                }
                Some(c) => c,
            };
            match c {
                '/' if !in_class => break,
                '[' => in_class = true,
                ']' => in_class = false,
                '\\' => {
                    pattern.push(c);
                    match self.bump() {
                        None | Some('\n') => {
                            return Err(self.error("unterminated regular expression"))
                        }
                        Some(escaped) => pattern.push(escaped),
                    }
                    continue;
                }
                _ => {}
            }
            pattern.push(c);
        }
        let mut flags = String::new();
        while let Some(c) = self.peek().filter(|c| is_identifier_part(*c)) {
            flags.push(c);
            self.bump();
        }
        Ok(TokenKind::Regex(pattern, flags))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid escape sequence"))?;
            code = code * 16 + digit;
        }
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }
}

fn is_identifier_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_identifier_part(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit() || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(
            kinds("a >>>= b"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Punct(">>>="),
                TokenKind::Word("b".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds("0x1f 1.5e2 .5 'a\\nb' \"\\u0041\""),
            vec![
                TokenKind::Number(31.0),
                TokenKind::Number(150.0),
                TokenKind::Number(0.5),
                TokenKind::String("a\nb".into()),
                TokenKind::String("A".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_newline_and_positions() {
        let tokens = tokenize("a // comment\n  esprof$b").unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].kind, TokenKind::Word("esprof$b".into()));
        assert_eq!(tokens[1].start, Position::new(2, 2));
        assert_eq!(tokens[1].end, Position::new(2, 10));
    }

    #[test]
    fn test_regex_or_division() {
        assert_eq!(
            kinds("x = /a[/]\\/b/gi; y = x / 2 / z;"),
            vec![
                TokenKind::Word("x".into()),
                TokenKind::Punct("="),
                TokenKind::Regex("a[/]\\/b".into(), "gi".into()),
                TokenKind::Punct(";"),
                TokenKind::Word("y".into()),
                TokenKind::Punct("="),
                TokenKind::Word("x".into()),
                TokenKind::Punct("/"),
                TokenKind::Number(2.0),
                TokenKind::Punct("/"),
                TokenKind::Word("z".into()),
                TokenKind::Punct(";"),
                TokenKind::Eof
            ]
        );
        assert_eq!(kinds("return /b/")[1], TokenKind::Regex("b".into(), String::new()));
        assert_eq!(kinds("(a) / b")[3], TokenKind::Punct("/"));
    }

    #[test]
    fn test_unterminated_regex() {
        let err = tokenize("x = /ab\n/").unwrap_err();
        assert!(err.message.contains("unterminated regular expression"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
