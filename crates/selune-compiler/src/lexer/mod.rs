//! Lexical analysis (tokenization)
//!
//! The lexer converts Selune source code into a stream of tokens with
//! accurate line/column/offset information. The first malformed construct
//! aborts the scan; there is no error recovery.

use crate::error::{CompileError, Result};
use crate::span::Span;
use crate::token::{Token, TokenKind};

mod literals;

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Characters of source code
    pub(super) chars: Vec<char>,
    /// Current position in chars
    pub(super) current: usize,
    /// Byte offset of the current position
    pub(super) offset: usize,
    /// Current line number (1-indexed)
    pub(super) line: u32,
    /// Current column number (1-indexed)
    pub(super) column: u32,
    /// Start position of current token
    pub(super) start_offset: usize,
    /// Start line of current token
    pub(super) start_line: u32,
    /// Start column of current token
    pub(super) start_column: u32,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            offset: 0,
            line: 1,
            column: 1,
            start_offset: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Tokenize the source code
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
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

    /// Scan the next token
    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        // Mark start of token
        self.start_offset = self.offset;
        self.start_line = self.line;
        self.start_column = self.column;

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '#' => TokenKind::Hash,
            '&' => TokenKind::Ampersand,
            '|' => TokenKind::Pipe,

            '[' => {
                // `[[` and `[=[` open a long string literal
                if self.peek() == '[' || self.peek() == '=' {
                    if let Some(level) = self.peek_long_bracket() {
                        return self.long_string(level);
                    }
                }
                TokenKind::LeftBracket
            }

            '/' => {
                if self.match_char('/') {
                    TokenKind::SlashSlash
                } else {
                    TokenKind::Slash
                }
            }
            '~' => {
                if self.match_char('=') {
                    TokenKind::TildeEqual
                } else {
                    TokenKind::Tilde
                }
            }
            '<' => {
                if self.match_char('<') {
                    TokenKind::LessLess
                } else if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.match_char('>') {
                    TokenKind::GreaterGreater
                } else if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            ':' => {
                if self.match_char(':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            '.' => {
                if self.match_char('.') {
                    if self.match_char('.') {
                        TokenKind::Ellipsis
                    } else {
                        TokenKind::DotDot
                    }
                } else if self.peek().is_ascii_digit() {
                    return self.number('.');
                } else {
                    TokenKind::Dot
                }
            }

            '"' | '\'' => return self.short_string(c),

            c if c.is_ascii_digit() => return self.number(c),
            c if c.is_alphabetic() || c == '_' => return Ok(self.identifier(c)),

            _ => {
                return Err(self.syntax_error(format!("unexpected character '{}'", c)));
            }
        };

        Ok(self.make_token(kind))
    }

    /// Scan an identifier or keyword
    fn identifier(&mut self, first: char) -> Token {
        let mut name = String::new();
        name.push(first);
        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            name.push(self.advance());
        }

        match TokenKind::keyword(&name) {
            Some(kind) => self.make_token(kind),
            None => self.make_token(TokenKind::Name(name)),
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            if self.is_at_end() {
                return Ok(());
            }

            match self.peek() {
                ' ' | '\r' | '\t' | '\n' => {
                    self.advance();
                }
                '-' => {
                    if self.peek_next() != Some('-') {
                        return Ok(());
                    }
                    self.advance(); // -
                    self.advance(); // -

                    // `--[[` opens a long comment; anything else runs to EOL
                    if self.peek() == '[' {
                        self.start_line = self.line;
                        self.start_column = self.column;
                        self.advance();
                        if let Some(level) = self.peek_long_bracket() {
                            self.skip_long_comment(level)?;
                            continue;
                        }
                    }
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Skip the body of a long comment whose opening bracket was consumed
    fn skip_long_comment(&mut self, level: usize) -> Result<()> {
        loop {
            if self.is_at_end() {
                return Err(self.syntax_error("unterminated long comment".to_string()));
            }
            if self.peek() == ']' && self.close_long_bracket(level) {
                return Ok(());
            }
            self.advance();
        }
    }

    // === Character navigation ===

    /// Advance to the next character and return the current one.
    /// Line and column counters follow embedded newlines.
    pub(super) fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// Peek at the current character without advancing
    pub(super) fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    /// Peek at the next character (current + 1)
    pub(super) fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    /// Check if the current character matches expected, advancing if so
    pub(super) fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    /// Check if we've reached the end of source
    pub(super) fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    /// After an initial `[`, consume `=*[` and return the level, or None
    /// if this is not a long-bracket opener. Only advances on success.
    pub(super) fn peek_long_bracket(&mut self) -> Option<usize> {
        let mut lookahead = self.current;
        let mut level = 0;
        while self.chars.get(lookahead) == Some(&'=') {
            lookahead += 1;
            level += 1;
        }
        if self.chars.get(lookahead) == Some(&'[') {
            for _ in 0..=level {
                self.advance();
            }
            Some(level)
        } else {
            None
        }
    }

    /// At a `]`, try to consume a closing `]=*]` of the given level.
    /// Only advances on success.
    pub(super) fn close_long_bracket(&mut self, level: usize) -> bool {
        let mut lookahead = self.current + 1;
        for _ in 0..level {
            if self.chars.get(lookahead) != Some(&'=') {
                return false;
            }
            lookahead += 1;
        }
        if self.chars.get(lookahead) != Some(&']') {
            return false;
        }
        for _ in 0..level + 2 {
            self.advance();
        }
        true
    }

    // === Token creation ===

    /// Create a token spanning from the marked start to the current position
    pub(super) fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.token_span())
    }

    /// The span of the token currently being scanned
    pub(super) fn token_span(&self) -> Span {
        Span::new(self.start_line, self.start_column, self.start_offset)
    }

    /// Syntax error at the current token's start
    pub(super) fn syntax_error(&self, message: String) -> CompileError {
        CompileError::Syntax {
            message,
            span: self.token_span(),
        }
    }

    /// Malformed-string error at the current token's start
    pub(super) fn string_error(&self, message: String) -> CompileError {
        CompileError::MalformedString {
            message,
            span: self.token_span(),
        }
    }
}
