//! Hand-written lexer for macro source.
//!
//! Produces a lazy token stream. Whitespace disappears, newlines survive
//! as tokens (statement separators), a `_` glyph immediately before a
//! line break joins physical lines, and comments (`'` or `Rem`) run to
//! end of line.

use crate::error::VbaError;
use crate::token::{is_reserved, Token, TokenKind};

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            finished: false,
        }
    }

    /// Collect every token up front, including the trailing Eof.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, VbaError> {
        Lexer::new(source).collect()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn token(&self, kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Token {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    fn skip_to_end_of_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// True when a `_` at the current position continues the line: it must
    /// be followed only by whitespace before the line break.
    fn is_line_continuation(&mut self) -> bool {
        let mut lookahead = self.chars.clone();
        lookahead.next(); // the underscore itself
        loop {
            match lookahead.next() {
                Some(' ') | Some('\t') | Some('\r') => continue,
                Some('\n') | None => return true,
                Some(_) => return false,
            }
        }
    }

    fn next_token(&mut self) -> Option<Result<Token, VbaError>> {
        loop {
            let (line, column) = (self.line, self.column);
            let Some(ch) = self.peek() else {
                if self.finished {
                    return None;
                }
                self.finished = true;
                return Some(Ok(self.token(TokenKind::Eof, "", line, column)));
            };

            match ch {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    return Some(Ok(self.token(TokenKind::Newline, "\n", line, column)));
                }
                '\'' => {
                    self.skip_to_end_of_line();
                }
                '_' if self.is_line_continuation() => {
                    // Consume the underscore and the line break it joins.
                    self.bump();
                    while let Some(c) = self.peek() {
                        self.bump();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '"' => return Some(self.lex_string(line, column)),
                '#' => return Some(Ok(self.lex_date_or_punct(line, column))),
                '&' => return Some(Ok(self.lex_ampersand(line, column))),
                '0'..='9' => return Some(Ok(self.lex_number(line, column))),
                'A'..='Z' | 'a'..='z' => {
                    let word = self.lex_word();
                    if word.eq_ignore_ascii_case("rem") {
                        self.skip_to_end_of_line();
                        continue;
                    }
                    let kind = if is_reserved(&word) {
                        TokenKind::Keyword
                    } else {
                        TokenKind::Identifier
                    };
                    return Some(Ok(self.token(kind, word, line, column)));
                }
                '_' => {
                    // A stray underscore not continuing a line.
                    self.bump();
                    return Some(Err(VbaError::Syntax {
                        message: "unexpected '_'".to_string(),
                        line,
                        column,
                    }));
                }
                '<' | '>' | '=' => return Some(Ok(self.lex_comparison(line, column))),
                '+' | '-' | '*' | '/' | '\\' | '^' => {
                    self.bump();
                    return Some(Ok(self.token(TokenKind::Operator, ch, line, column)));
                }
                '(' | ')' | ',' | '.' | ';' => {
                    self.bump();
                    return Some(Ok(self.token(TokenKind::Punct, ch, line, column)));
                }
                ':' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        return Some(Ok(self.token(TokenKind::Operator, ":=", line, column)));
                    }
                    return Some(Ok(self.token(TokenKind::Punct, ":", line, column)));
                }
                other => {
                    self.bump();
                    return Some(Err(VbaError::Syntax {
                        message: format!("unexpected character {other:?}"),
                        line,
                        column,
                    }));
                }
            }
        }
    }

    fn lex_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn lex_string(&mut self, line: u32, column: u32) -> Result<Token, VbaError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    // A doubled quote is an escaped quote.
                    if self.peek() == Some('"') {
                        self.bump();
                        text.push('"');
                    } else {
                        return Ok(self.token(TokenKind::String, text, line, column));
                    }
                }
                Some('\n') | None => {
                    return Err(VbaError::Syntax {
                        message: "unterminated string literal".to_string(),
                        line,
                        column,
                    });
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// `#...#` on one line is a date literal; a bare `#` is punctuation.
    fn lex_date_or_punct(&mut self, line: u32, column: u32) -> Token {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        let mut interior = String::new();
        let mut closed = false;
        for c in lookahead {
            match c {
                '#' => {
                    closed = true;
                    break;
                }
                '\n' => break,
                _ => interior.push(c),
            }
        }
        if !closed {
            self.bump();
            return self.token(TokenKind::Punct, "#", line, column);
        }
        self.bump(); // opening '#'
        for _ in 0..interior.chars().count() + 1 {
            self.bump(); // interior plus closing '#'
        }
        self.token(TokenKind::Date, interior, line, column)
    }

    /// `&H`/`&O` start a radix-prefixed number; a bare `&` is the
    /// string-concatenation operator.
    fn lex_ampersand(&mut self, line: u32, column: u32) -> Token {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        match lookahead.next() {
            Some('h') | Some('H') | Some('o') | Some('O') => {
                self.bump(); // '&'
                let radix = self.bump().expect("radix marker");
                let mut text = format!("&{radix}");
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.token(TokenKind::Number, text, line, column)
            }
            _ => {
                self.bump();
                self.token(TokenKind::Operator, "&", line, column)
            }
        }
    }

    fn lex_number(&mut self, line: u32, column: u32) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            // Only a decimal point when digits follow; `1.foo` keeps the
            // dot for member access.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.next(), Some(d) if d.is_ascii_digit()) {
                text.push('.');
                self.bump();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let next = lookahead.next();
            let after_sign = if matches!(next, Some('+') | Some('-')) {
                lookahead.next()
            } else {
                next
            };
            if matches!(after_sign, Some(d) if d.is_ascii_digit()) {
                text.push('E');
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.peek().unwrap());
                    self.bump();
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        // A single trailing type-suffix character is accepted and kept.
        if matches!(self.peek(), Some('%') | Some('!') | Some('@') | Some('$')) {
            text.push(self.peek().unwrap());
            self.bump();
        } else if self.peek() == Some('&') {
            // Long suffix, but only when not starting `&H`/`&O`.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if !matches!(lookahead.next(), Some('h') | Some('H') | Some('o') | Some('O')) {
                text.push('&');
                self.bump();
            }
        } else if self.peek() == Some('#') {
            // Double suffix; only when no date literal could start here.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if !matches!(lookahead.next(), Some(c) if c.is_ascii_digit()) {
                text.push('#');
                self.bump();
            }
        }
        self.token(TokenKind::Number, text, line, column)
    }

    fn lex_comparison(&mut self, line: u32, column: u32) -> Token {
        let first = self.bump().expect("comparison start");
        let text = match (first, self.peek()) {
            ('<', Some('=')) => {
                self.bump();
                "<=".to_string()
            }
            ('<', Some('>')) => {
                self.bump();
                "<>".to_string()
            }
            ('>', Some('=')) => {
                self.bump();
                ">=".to_string()
            }
            _ => first.to_string(),
        };
        self.token(TokenKind::Operator, text, line, column)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, VbaError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::tokenize(source)
            .expect("lexes")
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn lexes_assignment_with_positions() {
        let tokens = Lexer::tokenize("x = 42\n").expect("lexes");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert_eq!(tokens[1].kind, TokenKind::Operator);
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].column, 5);
        assert_eq!(tokens[3].kind, TokenKind::Newline);
        assert_eq!(tokens[4].kind, TokenKind::Eof);
    }

    #[test]
    fn line_continuation_joins_lines() {
        let tokens = kinds("a = 1 + _\n    2\n");
        assert!(!tokens
            .iter()
            .take_while(|(_, t)| t != "2")
            .any(|(k, _)| *k == TokenKind::Newline));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let tokens = kinds("x = 1 ' the answer\ny = 2\nRem whole line\nz = 3\n");
        let texts: Vec<&str> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert!(!texts.iter().any(|t| t.contains("answer")));
        assert!(!texts.iter().any(|t| t.contains("whole")));
        assert!(texts.contains(&"z"));
    }

    #[test]
    fn doubled_quotes_escape_inside_strings() {
        let tokens = Lexer::tokenize("s = \"He said \"\"hi\"\"\"\n").expect("lexes");
        let string = tokens.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(string.text, "He said \"hi\"");
    }

    #[test]
    fn date_literals_keep_their_interior() {
        let tokens = Lexer::tokenize("d = #1/15/2020#\n").expect("lexes");
        let date = tokens.iter().find(|t| t.kind == TokenKind::Date).unwrap();
        assert_eq!(date.text, "1/15/2020");
    }

    #[test]
    fn radix_prefixes_exponents_and_suffixes_lex_as_numbers() {
        for source in ["&HFF", "&O17", "1.5E3", "2E-4", "42%", "7&", "9#"] {
            let tokens = Lexer::tokenize(source).expect("lexes");
            assert_eq!(tokens[0].kind, TokenKind::Number, "{source}");
            assert_eq!(tokens[0].text, source, "{source}");
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = kinds("IF x THEN\n");
        assert_eq!(tokens[0].0, TokenKind::Keyword);
        assert_eq!(tokens[2].0, TokenKind::Keyword);
    }

    #[test]
    fn relexing_token_texts_is_stable() {
        let source = "Sub T()\n  x = \"a\" & 1.5 + &HFF\nEnd Sub\n";
        let first = Lexer::tokenize(source).expect("lexes");
        let mut rebuilt = String::new();
        for token in &first {
            match token.kind {
                TokenKind::Newline => rebuilt.push('\n'),
                TokenKind::String => {
                    rebuilt.push('"');
                    rebuilt.push_str(&token.text.replace('"', "\"\""));
                    rebuilt.push('"');
                }
                TokenKind::Date => {
                    rebuilt.push('#');
                    rebuilt.push_str(&token.text);
                    rebuilt.push('#');
                }
                TokenKind::Eof => {}
                _ => {
                    rebuilt.push_str(&token.text);
                    rebuilt.push(' ');
                }
            }
        }
        let second = Lexer::tokenize(&rebuilt).expect("relexes");
        let strip = |tokens: &[Token]| {
            tokens
                .iter()
                .map(|t| (t.kind, t.text.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second));
    }
}
