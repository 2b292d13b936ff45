//! Byte stream to token stream.
//!
//! The lexer makes three passes over one compilation unit:
//!
//! 1. **Line scan**: one left-to-right walk that records every line's
//!    indent (in spaces) and start offset, and rejects tabs anywhere in the
//!    file. The resulting [`Line`] index is what gives every token its
//!    line/column cheaply, and what the parser's offside rule relies on.
//! 2. **Token scan**: identifiers and keywords, numbers (decimal, `0x`
//!    hex, `0b` binary, underscores between digits), opaque string and
//!    character payloads, brackets, and operator runs split greedily into
//!    the known operators (longest first).
//! 3. **Bracket matching**: a stack pass that pairs `()`, `[]` and `{}`
//!    up front, so later phases can assume brackets balance.
//!
//! Whitespace is significant only through the line index: newlines end
//! statements and leading spaces decide the offside rule. Comments start
//! with `//` and run to end of line. Carriage returns are ignorable
//! whitespace, which is all CRLF input needs.

use crate::token::{Keyword, Line, Token, TokenKind, TokenStream};
use aike_base::{CompileError, Interner, Location, Result, SourceFile};

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

fn is_atom(ch: u8) -> bool {
    matches!(
        ch,
        b'!' | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'*'
            | b'+'
            | b','
            | b'-'
            | b'.'
            | b'/'
            | b':'
            | b';'
            | b'<'
            | b'='
            | b'>'
            | b'?'
            | b'@'
            | b'\\'
            | b'^'
            | b'`'
            | b'|'
            | b'~'
    )
}

fn is_bracket(ch: u8) -> bool {
    matches!(ch, b'(' | b')' | b'[' | b']' | b'{' | b'}')
}

struct Lexer<'s, 'i> {
    source: &'s SourceFile,
    bytes: &'s [u8],
    interner: &'i mut Interner,
    lines: Vec<Line>,
    offset: usize,
}

/// Lexes one source file into a token stream plus the line index.
pub fn tokenize(source: &SourceFile, interner: &mut Interner) -> Result<TokenStream> {
    let mut lexer =
        Lexer { source, bytes: source.text.as_bytes(), interner, lines: Vec::new(), offset: 0 };

    lexer.scan_lines()?;
    let tokens = lexer.scan_tokens()?;
    match_brackets(source, &tokens)?;

    log::debug!("lexed {}: {} tokens, {} lines", source.name, tokens.len(), lexer.lines.len());

    Ok(TokenStream { tokens, lines: lexer.lines })
}

impl<'s, 'i> Lexer<'s, 'i> {
    fn scan_lines(&mut self) -> Result<()> {
        let mut offset = 0usize;

        while offset < self.bytes.len() {
            let start = offset;

            let mut indent = 0u32;
            while offset < self.bytes.len() && self.bytes[offset] == b' ' {
                offset += 1;
                indent += 1;
            }

            while offset < self.bytes.len() && self.bytes[offset] != b'\n' {
                if self.bytes[offset] == b'\t' {
                    let location = Location::new(
                        self.source.id,
                        self.lines.len() as u32,
                        (offset - start) as u32,
                        offset as u32,
                        1,
                    );
                    return Err(CompileError::new("Source files can't have tabs", location));
                }
                offset += 1;
            }

            self.lines.push(Line { indent, offset: start as u32 });

            if offset < self.bytes.len() {
                offset += 1;
            }
        }

        if self.lines.is_empty() {
            self.lines.push(Line { indent: 0, offset: 0 });
        }

        Ok(())
    }

    /// Location of the `len` bytes starting at `offset`, found by binary
    /// search over the line index.
    fn location_at(&self, offset: usize, len: usize) -> Location {
        let line = self.lines.partition_point(|l| l.offset as usize <= offset) - 1;
        Location::new(
            self.source.id,
            line as u32,
            (offset - self.lines[line].offset as usize) as u32,
            offset as u32,
            len as u32,
        )
    }

    fn error_at(&self, offset: usize, len: usize, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.location_at(offset, len))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\n' | b'\r' => {
                    self.offset += 1;
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.offset += 1;
                    }
                }
                _ if is_ident_start(ch) => tokens.push(self.scan_ident()),
                _ if ch.is_ascii_digit() => tokens.push(self.scan_number()?),
                b'"' => tokens.push(self.scan_string()?),
                b'\'' => tokens.push(self.scan_character_or_generic()?),
                _ if is_bracket(ch) => {
                    let kind = match ch {
                        b'(' => TokenKind::LParen,
                        b')' => TokenKind::RParen,
                        b'[' => TokenKind::LBracket,
                        b']' => TokenKind::RBracket,
                        b'{' => TokenKind::LBrace,
                        _ => TokenKind::RBrace,
                    };
                    tokens.push(Token { kind, location: self.location_at(self.offset, 1) });
                    self.offset += 1;
                }
                _ if is_atom(ch) => self.scan_atoms(&mut tokens)?,
                _ => {
                    let message = if ch.is_ascii_graphic() {
                        format!("Unknown character '{}'", ch as char)
                    } else {
                        format!("Unknown character {}", ch)
                    };
                    return Err(self.error_at(self.offset, 1, message));
                }
            }
        }

        let end = self.bytes.len();
        tokens.push(Token { kind: TokenKind::Eof, location: self.location_at(end.max(1) - 1, 0) });

        Ok(tokens)
    }

    fn scan_ident(&mut self) -> Token {
        let start = self.offset;
        while self.peek().is_some_and(is_ident) {
            self.offset += 1;
        }

        let text = &self.source.text[start..self.offset];
        let kind = match Keyword::from_str(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(self.interner.intern(text)),
        };

        Token { kind, location: self.location_at(start, self.offset - start) }
    }

    fn scan_number(&mut self) -> Result<Token> {
        let start = self.offset;

        let base: i64 = if self.peek() == Some(b'0') {
            match self.peek_at(1) {
                Some(b'x') => {
                    self.offset += 2;
                    16
                }
                Some(b'b') => {
                    self.offset += 2;
                    2
                }
                Some(c) if c.is_ascii_digit() => {
                    return Err(self.error_at(start, 2, "Octal number literals are not supported"));
                }
                _ => 10,
            }
        } else {
            10
        };

        let mut value = 0i64;
        while let Some(ch) = self.peek() {
            let digit = match ch {
                b'0'..=b'9' => (ch - b'0') as i64,
                b'a'..=b'f' => (ch - b'a') as i64 + 10,
                b'A'..=b'F' => (ch - b'A') as i64 + 10,
                b'_' => {
                    self.offset += 1;
                    continue;
                }
                _ if is_ident(ch) => {
                    return Err(self.error_at(
                        start,
                        self.offset - start + 1,
                        "Unexpected letter in a number literal",
                    ));
                }
                _ => break,
            };

            if digit >= base {
                return Err(self.error_at(
                    start,
                    self.offset - start + 1,
                    "Unexpected letter in a number literal",
                ));
            }

            value = value.wrapping_mul(base).wrapping_add(digit);
            self.offset += 1;
        }

        Ok(Token {
            kind: TokenKind::Number(value),
            location: self.location_at(start, self.offset - start),
        })
    }

    fn scan_string(&mut self) -> Result<Token> {
        let start = self.offset;
        self.offset += 1;

        let payload_start = self.offset;
        while self.peek().is_some_and(|c| c != b'"') {
            self.offset += 1;
        }

        if self.peek().is_none() {
            return Err(self.error_at(start, 1, "Unterminated string literal"));
        }

        let payload = self.interner.intern(&self.source.text[payload_start..self.offset]);
        self.offset += 1;

        Ok(Token {
            kind: TokenKind::Str(payload),
            location: self.location_at(start, self.offset - start),
        })
    }

    /// Disambiguates `'x'` (character) from `'a` (generic identifier): an
    /// identifier run after the apostrophe is a character literal only when
    /// an apostrophe closes it.
    fn scan_character_or_generic(&mut self) -> Result<Token> {
        let start = self.offset;
        self.offset += 1;

        if self.peek().is_some_and(is_ident_start) {
            let payload_start = self.offset;
            while self.peek().is_some_and(is_ident) {
                self.offset += 1;
            }
            let payload = self.interner.intern(&self.source.text[payload_start..self.offset]);

            if self.peek() == Some(b'\'') {
                self.offset += 1;
                return Ok(Token {
                    kind: TokenKind::Character(payload),
                    location: self.location_at(start, self.offset - start),
                });
            }

            return Ok(Token {
                kind: TokenKind::GenericIdent(payload),
                location: self.location_at(start, self.offset - start),
            });
        }

        let payload_start = self.offset;
        while self.peek().is_some_and(|c| c != b'\'' && c != b'\n') {
            self.offset += 1;
        }

        if self.peek() != Some(b'\'') {
            return Err(self.error_at(start, 1, "Unterminated character literal"));
        }

        let payload = self.interner.intern(&self.source.text[payload_start..self.offset]);
        self.offset += 1;

        Ok(Token {
            kind: TokenKind::Character(payload),
            location: self.location_at(start, self.offset - start),
        })
    }

    /// Scans a maximal run of operator characters, then splits it greedily
    /// into known operators, longest first.
    fn scan_atoms(&mut self, tokens: &mut Vec<Token>) -> Result<()> {
        let start = self.offset;
        while self.peek().is_some_and(is_atom) {
            self.offset += 1;
        }

        let run = &self.bytes[start..self.offset];
        let mut i = 0usize;

        while i < run.len() {
            let two = if i + 1 < run.len() {
                match &run[i..i + 2] {
                    b"->" => Some(TokenKind::Arrow),
                    b".." => Some(TokenKind::DotDot),
                    b":=" => Some(TokenKind::ColonEqual),
                    b"==" => Some(TokenKind::EqualEqual),
                    b"!=" => Some(TokenKind::NotEqual),
                    b"<=" => Some(TokenKind::LessEqual),
                    b">=" => Some(TokenKind::GreaterEqual),
                    _ => None,
                }
            } else {
                None
            };

            if let Some(kind) = two {
                tokens.push(Token { kind, location: self.location_at(start + i, 2) });
                i += 2;
                continue;
            }

            let kind = match run[i] {
                b',' => TokenKind::Comma,
                b'=' => TokenKind::Equal,
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'*' => TokenKind::Star,
                b'/' => TokenKind::Slash,
                b'<' => TokenKind::Less,
                b'>' => TokenKind::Greater,
                b':' => TokenKind::Colon,
                b';' => TokenKind::Semicolon,
                b'.' => TokenKind::Dot,
                b'#' => TokenKind::Sharp,
                b'!' => TokenKind::Exclamation,
                b'|' => TokenKind::Pipe,
                other => {
                    return Err(self.error_at(
                        start + i,
                        1,
                        format!("Unknown character '{}'", other as char),
                    ));
                }
            };

            tokens.push(Token { kind, location: self.location_at(start + i, 1) });
            i += 1;
        }

        Ok(())
    }
}

/// Pairs brackets across the whole token stream, reporting both locations
/// on mismatch.
fn match_brackets(source: &SourceFile, tokens: &[Token]) -> Result<()> {
    let mut stack: Vec<&Token> = Vec::new();

    for token in tokens {
        if token.kind.is_open_bracket() {
            stack.push(token);
        } else if matches!(token.kind, TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace)
        {
            let open = match stack.pop() {
                Some(open) => open,
                None => {
                    return Err(CompileError::new(
                        format!("Unmatched closing bracket {}", token.kind.describe()),
                        token.location,
                    ));
                }
            };

            let expected = open.kind.closing_bracket();
            if expected != Some(token.kind) {
                return Err(CompileError::new(
                    format!(
                        "Mismatched closing bracket: expected {} to close bracket at ({},{})",
                        expected.map_or("bracket", |k| k.describe()),
                        open.location.line + 1,
                        open.location.column + 1
                    ),
                    token.location,
                ));
            }
        }
    }

    if let Some(open) = stack.pop() {
        return Err(CompileError::new(
            format!(
                "Unmatched opening bracket: expected {} to close but found end of file",
                open.kind.closing_bracket().map_or("bracket", |k| k.describe())
            ),
            open.location,
        ));
    }

    let _ = source;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Result<(TokenStream, Interner)> {
        let source = SourceFile::new("test.aike", text);
        let mut interner = Interner::new();
        tokenize(&source, &mut interner).map(|stream| (stream, interner))
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text).unwrap().0.tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let (stream, interner) = lex("let xs = fn1").unwrap();
        assert_eq!(stream.tokens[0].kind, TokenKind::Keyword(Keyword::Let));
        match stream.tokens[1].kind {
            TokenKind::Ident(sym) => assert_eq!(interner.resolve(sym), "xs"),
            other => panic!("expected identifier, got {other:?}"),
        }
        assert_eq!(stream.tokens[2].kind, TokenKind::Equal);
        assert_eq!(stream.tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn number_bases_and_underscores() {
        assert_eq!(
            kinds("10 0x1f 0b101 1_000_000"),
            vec![
                TokenKind::Number(10),
                TokenKind::Number(31),
                TokenKind::Number(5),
                TokenKind::Number(1_000_000),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn letter_adjacent_to_number_is_an_error() {
        assert!(lex("12ab").unwrap_err().message.contains("letter"));
        assert!(lex("0b12").unwrap_err().message.contains("letter"));
    }

    #[test]
    fn octal_is_rejected() {
        assert!(lex("07").unwrap_err().message.contains("Octal"));
    }

    #[test]
    fn tab_is_a_hard_error() {
        let err = lex("let a = 1\n\tb").unwrap_err();
        assert!(err.message.contains("tabs"));
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("1 // 2 + [ unbalanced\n3"),
            vec![TokenKind::Number(1), TokenKind::Number(3), TokenKind::Eof]
        );
    }

    #[test]
    fn operator_runs_split_greedily() {
        let ks = kinds("a<=b");
        assert!(matches!(ks[0], TokenKind::Ident(_)));
        assert_eq!(ks[1], TokenKind::LessEqual);
        assert!(matches!(ks[2], TokenKind::Ident(_)));
    }

    #[test]
    fn adjacent_operators_split_without_spaces() {
        let ks = kinds("x:=-1");
        assert!(matches!(ks[0], TokenKind::Ident(_)));
        assert_eq!(ks[1], TokenKind::ColonEqual);
        assert_eq!(ks[2], TokenKind::Minus);
        assert_eq!(ks[3], TokenKind::Number(1));
    }

    #[test]
    fn arrow_and_ranges() {
        let ks = kinds("-> .. ... ");
        assert_eq!(ks[0], TokenKind::Arrow);
        assert_eq!(ks[1], TokenKind::DotDot);
        assert_eq!(ks[2], TokenKind::DotDot);
        assert_eq!(ks[3], TokenKind::Dot);
    }

    #[test]
    fn character_versus_generic_identifier() {
        let (stream, interner) = lex("'a 'a' ' '").unwrap();
        match stream.tokens[0].kind {
            TokenKind::GenericIdent(sym) => assert_eq!(interner.resolve(sym), "a"),
            other => panic!("expected generic, got {other:?}"),
        }
        match stream.tokens[1].kind {
            TokenKind::Character(sym) => assert_eq!(interner.resolve(sym), "a"),
            other => panic!("expected character, got {other:?}"),
        }
        match stream.tokens[2].kind {
            TokenKind::Character(sym) => assert_eq!(interner.resolve(sym), " "),
            other => panic!("expected character, got {other:?}"),
        }
    }

    #[test]
    fn string_payload_is_opaque() {
        let (stream, interner) = lex(r#""ab\n""#).unwrap();
        match stream.tokens[0].kind {
            TokenKind::Str(sym) => assert_eq!(interner.resolve(sym), "ab\\n"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_literals() {
        assert!(lex("\"abc").unwrap_err().message.contains("Unterminated string"));
        assert!(lex("'").unwrap_err().message.contains("Unterminated character"));
    }

    #[test]
    fn bracket_mismatch_reports_both_locations() {
        let err = lex("(]").unwrap_err();
        assert!(err.message.contains("Mismatched closing bracket"));
        assert!(err.message.contains("(1,1)"));
        assert_eq!(err.location.column, 1);
    }

    #[test]
    fn unmatched_brackets() {
        assert!(lex("(").unwrap_err().message.contains("end of file"));
        assert!(lex(")").unwrap_err().message.contains("Unmatched closing"));
    }

    #[test]
    fn line_index_records_indent_and_offset() {
        let (stream, _) = lex("a\n  b\n    c\n").unwrap();
        let indents: Vec<u32> = stream.lines.iter().map(|l| l.indent).collect();
        assert_eq!(indents, vec![0, 2, 4]);
        assert_eq!(stream.lines[1].offset, 2);
    }

    #[test]
    fn token_locations_lie_within_the_source() {
        let text = "let f(x) = x + 1\nf(41)\n";
        let (stream, _) = lex(text).unwrap();
        for token in &stream.tokens {
            assert!(token.location.end() as usize <= text.len());
        }
    }

    #[test]
    fn columns_and_lines_are_zero_based() {
        let (stream, _) = lex("ab\n  cd").unwrap();
        assert_eq!(stream.tokens[0].location.line, 0);
        assert_eq!(stream.tokens[0].location.column, 0);
        assert_eq!(stream.tokens[1].location.line, 1);
        assert_eq!(stream.tokens[1].location.column, 2);
    }
}
