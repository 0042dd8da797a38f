use crate::{Error, Keyword, Result, Token, TokenKind};

/// Hand-written scanner turning query source text into a token stream.
///
/// Whitespace is insignificant; `--` line comments and `/* ... */` block
/// comments are skipped. Keywords match case-insensitively while identifier
/// lexemes preserve case.
pub struct Lexer<'s> {
    source: &'s str,
    position: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// Scan the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'s str {
        &self.source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn error(&self, position: usize, message: impl Into<String>) -> Error {
        Error::Lex {
            position,
            message: message.into(),
        }
    }

    fn skip_insignificant(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_second() == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.position;
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_second() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(..) => {
                                self.bump();
                            }
                            None => {
                                return Err(self.error(start, "unterminated block comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_insignificant()?;
        let start = self.position;
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(start),
            c if c.is_ascii_digit() => self.number(start)?,
            '\'' | '"' => self.string(start)?,
            ':' => {
                self.bump();
                if self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                {
                    let name = self.consume_ident();
                    Token::new(TokenKind::Param(name), &self.source[start..self.position], start)
                } else {
                    Token::new(TokenKind::Colon, ":", start)
                }
            }
            _ => self.operator(start)?,
        };
        Ok(Some(token))
    }

    fn consume_ident(&mut self) -> String {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        self.source[start..self.position].to_string()
    }

    fn identifier(&mut self, start: usize) -> Token {
        let text = self.consume_ident();
        let kind = match Keyword::from_ident(&text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(text.clone()),
        };
        Token::new(kind, text, start)
    }

    fn number(&mut self, start: usize) -> Result<Token> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut float = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.source[start..self.position];
        let kind = if float {
            let value = text
                .parse::<f64>()
                .map_err(|e| self.error(start, format!("invalid numeric literal: {e}")))?;
            TokenKind::Float(value)
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|e| self.error(start, format!("invalid numeric literal: {e}")))?;
            TokenKind::Int(value)
        };
        Ok(Token::new(kind, text, start))
    }

    fn string(&mut self, start: usize) -> Result<Token> {
        let quote = self.bump().unwrap_or('\'');
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    let escape = self
                        .bump()
                        .ok_or_else(|| self.error(start, "unterminated string literal"))?;
                    value.push(match escape {
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => {
                            return Err(self.error(
                                self.position - other.len_utf8(),
                                format!("unknown escape sequence `\\{other}`"),
                            ));
                        }
                    });
                }
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
                None => return Err(self.error(start, "unterminated string literal")),
            }
        }
        Ok(Token::new(
            TokenKind::Str(value),
            &self.source[start..self.position],
            start,
        ))
    }

    fn operator(&mut self, start: usize) -> Result<Token> {
        let c = self.bump().unwrap_or_default();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '=' => TokenKind::Eq,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => match self.peek() {
                Some('>') => {
                    self.bump();
                    TokenKind::Neq
                }
                Some('=') => {
                    self.bump();
                    TokenKind::Le
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Neq
                } else {
                    return Err(self.error(start, "unexpected character `!`"));
                }
            }
            other => {
                return Err(self.error(start, format!("unexpected character `{other}`")));
            }
        };
        Ok(Token::new(kind, &self.source[start..self.position], start))
    }
}
