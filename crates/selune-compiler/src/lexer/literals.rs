//! Literal scanning: numbers, short strings with escape decoding, and
//! long-bracket strings.

use super::Lexer;
use crate::error::Result;
use crate::token::{Token, TokenKind};

impl Lexer {
    /// Scan a numeric literal. `first` is the already-consumed character
    /// (a digit, or `.` for literals like `.5`).
    pub(super) fn number(&mut self, first: char) -> Result<Token> {
        if first == '0' && (self.peek() == 'x' || self.peek() == 'X') {
            self.advance();
            return self.hex_number();
        }

        let mut text = String::new();
        let mut is_float = first == '.';
        text.push(first);

        while self.peek().is_ascii_digit() {
            text.push(self.advance());
        }
        if !is_float && self.peek() == '.' {
            is_float = true;
            text.push(self.advance());
            while self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }
        if self.peek() == 'e' || self.peek() == 'E' {
            is_float = true;
            text.push(self.advance());
            if self.peek() == '+' || self.peek() == '-' {
                text.push(self.advance());
            }
            if !self.peek().is_ascii_digit() {
                return Err(self.syntax_error("malformed number: missing exponent".to_string()));
            }
            while self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }

        if self.peek().is_alphanumeric() {
            return Err(self.syntax_error(format!(
                "malformed number near '{}{}'",
                text,
                self.peek()
            )));
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.syntax_error(format!("malformed number '{}'", text)))?;
            Ok(self.make_token(TokenKind::Float(value)))
        } else {
            // Decimal integers too large for i64 degrade to floats
            match text.parse::<i64>() {
                Ok(value) => Ok(self.make_token(TokenKind::Integer(value))),
                Err(_) => {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| self.syntax_error(format!("malformed number '{}'", text)))?;
                    Ok(self.make_token(TokenKind::Float(value)))
                }
            }
        }
    }

    /// Scan the remainder of a hexadecimal literal (after `0x`).
    /// Plain hex integers wrap modulo 2^64; a fraction or binary exponent
    /// (`p`) makes the literal a float.
    fn hex_number(&mut self) -> Result<Token> {
        let mut mantissa: u64 = 0;
        let mut value: f64 = 0.0;
        let mut digits = 0;
        let mut is_float = false;

        while self.peek().is_ascii_hexdigit() {
            let d = self.advance().to_digit(16).unwrap() as u64;
            mantissa = mantissa.wrapping_mul(16).wrapping_add(d);
            value = value * 16.0 + d as f64;
            digits += 1;
        }

        if self.peek() == '.' {
            is_float = true;
            self.advance();
            let mut scale = 1.0 / 16.0;
            while self.peek().is_ascii_hexdigit() {
                let d = self.advance().to_digit(16).unwrap();
                value += d as f64 * scale;
                scale /= 16.0;
                digits += 1;
            }
        }

        if digits == 0 {
            return Err(self.syntax_error("malformed number: missing hex digits".to_string()));
        }

        if self.peek() == 'p' || self.peek() == 'P' {
            is_float = true;
            self.advance();
            let negative = match self.peek() {
                '-' => {
                    self.advance();
                    true
                }
                '+' => {
                    self.advance();
                    false
                }
                _ => false,
            };
            if !self.peek().is_ascii_digit() {
                return Err(self.syntax_error("malformed number: missing exponent".to_string()));
            }
            let mut exp: i32 = 0;
            while self.peek().is_ascii_digit() {
                let digit = self.advance().to_digit(10).unwrap() as i32;
                exp = exp.saturating_mul(10).saturating_add(digit);
            }
            if negative {
                exp = -exp;
            }
            value *= (exp as f64).exp2();
        }

        if is_float {
            Ok(self.make_token(TokenKind::Float(value)))
        } else {
            Ok(self.make_token(TokenKind::Integer(mantissa as i64)))
        }
    }

    /// Scan a short string delimited by `quote`, decoding escapes to bytes
    pub(super) fn short_string(&mut self, quote: char) -> Result<Token> {
        let mut bytes: Vec<u8> = Vec::new();

        loop {
            if self.is_at_end() {
                return Err(self.string_error("unterminated string literal".to_string()));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            match c {
                '\n' => {
                    return Err(self.string_error("unterminated string literal".to_string()));
                }
                '\\' => self.escape_sequence(&mut bytes)?,
                _ => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        Ok(self.make_token(TokenKind::String(bytes)))
    }

    /// Decode one escape sequence (the backslash is already consumed)
    fn escape_sequence(&mut self, bytes: &mut Vec<u8>) -> Result<()> {
        if self.is_at_end() {
            return Err(self.string_error("unterminated string literal".to_string()));
        }
        let c = self.advance();
        match c {
            'a' => bytes.push(0x07),
            'b' => bytes.push(0x08),
            'f' => bytes.push(0x0c),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            't' => bytes.push(b'\t'),
            'v' => bytes.push(0x0b),
            '\\' => bytes.push(b'\\'),
            '"' => bytes.push(b'"'),
            '\'' => bytes.push(b'\''),
            '\n' => bytes.push(b'\n'),
            'x' => {
                let hi = self.hex_digit()?;
                let lo = self.hex_digit()?;
                bytes.push((hi * 16 + lo) as u8);
            }
            'z' => {
                while !self.is_at_end() && self.peek().is_whitespace() {
                    self.advance();
                }
            }
            'u' => {
                if !self.match_char('{') {
                    return Err(self.string_error("expected '{' after \\u".to_string()));
                }
                if !self.peek().is_ascii_hexdigit() {
                    return Err(self.string_error("missing hex digits in \\u{} escape".to_string()));
                }
                let mut value: u64 = 0;
                while self.peek().is_ascii_hexdigit() {
                    value = value * 16 + self.advance().to_digit(16).unwrap() as u64;
                    if value >= 1 << 31 {
                        return Err(
                            self.string_error("code point must be less than 2^31".to_string())
                        );
                    }
                }
                if !self.match_char('}') {
                    return Err(self.string_error("unclosed \\u{} escape".to_string()));
                }
                // Big-endian minimum-width encoding of the code point
                let width = ((64 - value.leading_zeros() as usize) + 7) / 8;
                let width = width.max(1);
                for i in (0..width).rev() {
                    bytes.push((value >> (i * 8)) as u8);
                }
            }
            d if d.is_ascii_digit() => {
                let mut value = d.to_digit(10).unwrap();
                for _ in 0..2 {
                    if !self.peek().is_ascii_digit() {
                        break;
                    }
                    value = value * 10 + self.advance().to_digit(10).unwrap();
                }
                if value > 255 {
                    return Err(self.string_error(format!(
                        "decimal escape value {} exceeds 255",
                        value
                    )));
                }
                bytes.push(value as u8);
            }
            other => {
                return Err(self.string_error(format!("unknown escape sequence '\\{}'", other)));
            }
        }
        Ok(())
    }

    fn hex_digit(&mut self) -> Result<u32> {
        if self.is_at_end() || !self.peek().is_ascii_hexdigit() {
            return Err(self.string_error("expected hexadecimal digit".to_string()));
        }
        Ok(self.advance().to_digit(16).unwrap())
    }

    /// Scan a long-bracket string whose opener (of the given level) has
    /// been consumed. A single newline immediately after the opener is
    /// stripped; the rest of the content is taken verbatim.
    pub(super) fn long_string(&mut self, level: usize) -> Result<Token> {
        if self.peek() == '\r' {
            self.advance();
            if self.peek() == '\n' {
                self.advance();
            }
        } else if self.peek() == '\n' {
            self.advance();
        }

        let mut bytes: Vec<u8> = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(self.string_error("unterminated long string literal".to_string()));
            }
            if self.peek() == ']' && self.close_long_bracket(level) {
                break;
            }
            let c = self.advance();
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }

        Ok(self.make_token(TokenKind::String(bytes)))
    }
}
