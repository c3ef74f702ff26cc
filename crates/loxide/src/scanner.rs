//! Single-pass state-machine lexer.
//!
//! The scanner walks the source bytes exactly once, driven by an explicit
//! state switch (`Start`, `Comment`, `Str`, `Ident`, `Number`, `NumberDot`).
//! It produces a token stream that is always terminated by `Eof`, even when
//! errors were encountered; errors accumulate in the shared [`Diagnostics`]
//! buffer and the pipeline decides whether to proceed.
//!
//! Token text is never copied. Each token carries a byte span; consumers
//! resolve lexemes against the source buffer. This also lets a REPL session
//! scan only the newly appended tail of its source buffer while older spans
//! stay valid.

use crate::diagnostics::{Diagnostic, Diagnostics, ErrorKind};
use crate::token::{Span, SrcLoc, Token, TokenTag};

/// Lexer states. One token is produced per excursion out of `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Comment,
    Str,
    Ident,
    Number,
    NumberDot,
}

/// The state-machine lexer. Construct with [`Scanner::new`] (whole buffer)
/// or [`Scanner::with_offset`] (REPL tail), then call [`Scanner::scan`].
#[derive(Debug)]
pub struct Scanner<'s> {
    src: &'s str,
    index: usize,
    line: u32,
    col: u32,
}

impl<'s> Scanner<'s> {
    #[must_use]
    pub fn new(src: &'s str) -> Self {
        Self {
            src,
            index: 0,
            line: 1,
            col: 1,
        }
    }

    /// Starts scanning at `offset` into `src`, treating it as the beginning
    /// of `line`. Used by the REPL to scan only the newly fed line of its
    /// append-only session buffer.
    #[must_use]
    pub fn with_offset(src: &'s str, offset: usize, line: u32) -> Self {
        debug_assert!(offset <= src.len());
        Self {
            src,
            index: offset,
            line,
            col: 1,
        }
    }

    /// Runs the lexer to completion, returning the `Eof`-terminated stream.
    ///
    /// Lexing never aborts: unknown bytes produce `Invalid` tokens, and an
    /// unterminated string ends the stream early. The caller consults
    /// [`Diagnostics::has_errors`] for the failure signal.
    #[must_use]
    pub fn scan(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let bytes = self.src.as_bytes();
        let mut tokens = Vec::new();
        let mut state = State::Start;
        // Start of the token currently being built, for multi-byte states.
        let mut start = self.index;
        let mut start_loc = self.loc();

        loop {
            match state {
                State::Start => {
                    let Some(&byte) = bytes.get(self.index) else {
                        break;
                    };
                    start = self.index;
                    start_loc = self.loc();
                    match byte {
                        b' ' | b'\t' | b'\r' => self.advance(),
                        b'\n' => self.advance_line(),
                        b'/' => {
                            if bytes.get(self.index + 1) == Some(&b'/') {
                                self.advance();
                                self.advance();
                                state = State::Comment;
                            } else {
                                self.advance();
                                tokens.push(self.token(TokenTag::Slash, start, start_loc));
                            }
                        }
                        b'"' => {
                            self.advance();
                            state = State::Str;
                        }
                        b'0'..=b'9' => {
                            self.advance();
                            state = State::Number;
                        }
                        b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                            self.advance();
                            state = State::Ident;
                        }
                        _ if byte.is_ascii() => {
                            self.advance();
                            if let Some(tag) = self.operator(byte, bytes) {
                                tokens.push(self.token(tag, start, start_loc));
                            } else {
                                let token = self.token(TokenTag::Invalid, start, start_loc);
                                diags.report_error(
                                    Diagnostic::new(
                                        ErrorKind::UnexpectedCharacter,
                                        format!("unexpected character 0x{byte:02x}"),
                                        start_loc,
                                    )
                                    .with_lexeme(token.lexeme(self.src)),
                                );
                                tokens.push(token);
                            }
                        }
                        _ => {
                            // Consume the whole multi-byte character so the
                            // Invalid span stays on a char boundary.
                            let ch = self.src[self.index..]
                                .chars()
                                .next()
                                .expect("non-empty remainder");
                            self.index += ch.len_utf8();
                            self.col += 1;
                            let token = self.token(TokenTag::Invalid, start, start_loc);
                            diags.report_error(
                                Diagnostic::new(
                                    ErrorKind::UnexpectedCharacter,
                                    format!("unexpected character '{ch}'"),
                                    start_loc,
                                )
                                .with_lexeme(token.lexeme(self.src)),
                            );
                            tokens.push(token);
                        }
                    }
                }

                State::Comment => {
                    // Consume up to, but not including, the newline; Start
                    // handles line accounting.
                    while let Some(&byte) = bytes.get(self.index) {
                        if byte == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                    state = State::Start;
                }

                State::Str => {
                    loop {
                        match bytes.get(self.index) {
                            Some(b'"') => {
                                self.advance();
                                tokens.push(self.token(TokenTag::Str, start, start_loc));
                                state = State::Start;
                                break;
                            }
                            Some(b'\n') => self.advance_line(),
                            Some(_) => self.advance(),
                            None => {
                                diags.report_error(
                                    Diagnostic::new(
                                        ErrorKind::UnterminatedString,
                                        "unterminated string",
                                        start_loc,
                                    )
                                    .with_lexeme(&self.src[start..self.index]),
                                );
                                state = State::Start;
                                break;
                            }
                        }
                    }
                }

                State::Ident => {
                    while let Some(&byte) = bytes.get(self.index) {
                        if !byte.is_ascii_alphanumeric() && byte != b'_' {
                            break;
                        }
                        self.advance();
                    }
                    let lexeme = &self.src[start..self.index];
                    let tag = TokenTag::keyword(lexeme).unwrap_or(TokenTag::Identifier);
                    tokens.push(self.token(tag, start, start_loc));
                    state = State::Start;
                }

                State::Number => {
                    while let Some(&byte) = bytes.get(self.index) {
                        if !byte.is_ascii_digit() {
                            break;
                        }
                        self.advance();
                    }
                    // A `.` joins the number only when a digit follows it; a
                    // trailing dot is a separate Dot token.
                    if bytes.get(self.index) == Some(&b'.')
                        && bytes.get(self.index + 1).is_some_and(u8::is_ascii_digit)
                    {
                        self.advance();
                        state = State::NumberDot;
                    } else {
                        tokens.push(self.token(TokenTag::Number, start, start_loc));
                        state = State::Start;
                    }
                }

                State::NumberDot => {
                    while let Some(&byte) = bytes.get(self.index) {
                        if !byte.is_ascii_digit() {
                            break;
                        }
                        self.advance();
                    }
                    tokens.push(self.token(TokenTag::Number, start, start_loc));
                    state = State::Start;
                }
            }
        }

        tokens.push(Token::new(
            TokenTag::Eof,
            Span::new(self.index, self.index),
            self.loc(),
        ));
        tokens
    }

    /// Maps a punctuation byte (already consumed) to its tag, consuming a
    /// trailing `=` for the two-byte operators. Returns `None` for bytes
    /// that are not part of the language.
    fn operator(&mut self, byte: u8, bytes: &[u8]) -> Option<TokenTag> {
        let tag = match byte {
            b'(' => TokenTag::LeftParen,
            b')' => TokenTag::RightParen,
            b'{' => TokenTag::LeftBrace,
            b'}' => TokenTag::RightBrace,
            b'[' => TokenTag::LeftBracket,
            b']' => TokenTag::RightBracket,
            b',' => TokenTag::Comma,
            b'.' => TokenTag::Dot,
            b'-' => TokenTag::Minus,
            b'+' => TokenTag::Plus,
            b';' => TokenTag::Semicolon,
            b'*' => TokenTag::Star,
            b'!' | b'=' | b'<' | b'>' => {
                let eq_follows = bytes.get(self.index) == Some(&b'=');
                if eq_follows {
                    self.advance();
                }
                match (byte, eq_follows) {
                    (b'!', true) => TokenTag::BangEqual,
                    (b'!', false) => TokenTag::Bang,
                    (b'=', true) => TokenTag::EqualEqual,
                    (b'=', false) => TokenTag::Equal,
                    (b'<', true) => TokenTag::LessEqual,
                    (b'<', false) => TokenTag::Less,
                    (b'>', true) => TokenTag::GreaterEqual,
                    _ => TokenTag::Greater,
                }
            }
            _ => return None,
        };
        Some(tag)
    }

    fn token(&self, tag: TokenTag, start: usize, loc: SrcLoc) -> Token {
        Token::new(tag, Span::new(start, self.index), loc)
    }

    fn loc(&self) -> SrcLoc {
        SrcLoc::new(self.line, self.col)
    }

    fn advance(&mut self) {
        self.index += 1;
        self.col += 1;
    }

    fn advance_line(&mut self) {
        self.index += 1;
        self.line += 1;
        self.col = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> (Vec<Token>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Scanner::new(src).scan(&mut diags);
        (tokens, diags)
    }

    fn tags(src: &str) -> Vec<TokenTag> {
        scan(src).0.into_iter().map(|t| t.tag).collect()
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(tags(""), vec![TokenTag::Eof]);
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            tags("(){}[],.-+;/*"),
            vec![
                TokenTag::LeftParen,
                TokenTag::RightParen,
                TokenTag::LeftBrace,
                TokenTag::RightBrace,
                TokenTag::LeftBracket,
                TokenTag::RightBracket,
                TokenTag::Comma,
                TokenTag::Dot,
                TokenTag::Minus,
                TokenTag::Plus,
                TokenTag::Semicolon,
                TokenTag::Slash,
                TokenTag::Star,
                TokenTag::Eof,
            ]
        );
    }

    #[test]
    fn two_byte_operators_use_lookahead() {
        assert_eq!(
            tags("! != = == < <= > >="),
            vec![
                TokenTag::Bang,
                TokenTag::BangEqual,
                TokenTag::Equal,
                TokenTag::EqualEqual,
                TokenTag::Less,
                TokenTag::LessEqual,
                TokenTag::Greater,
                TokenTag::GreaterEqual,
                TokenTag::Eof,
            ]
        );
    }

    #[test]
    fn equality_chain_splits_greedily() {
        assert_eq!(
            tags("==="),
            vec![TokenTag::EqualEqual, TokenTag::Equal, TokenTag::Eof]
        );
    }

    #[test]
    fn keywords_versus_identifiers() {
        assert_eq!(
            tags("var varnish _x x9 while"),
            vec![
                TokenTag::Var,
                TokenTag::Identifier,
                TokenTag::Identifier,
                TokenTag::Identifier,
                TokenTag::While,
                TokenTag::Eof,
            ]
        );
    }

    #[test]
    fn numbers_with_and_without_fraction() {
        let (tokens, diags) = scan("1 12.5 7.");
        assert!(!diags.has_errors());
        let src = "1 12.5 7.";
        assert_eq!(tokens[0].tag, TokenTag::Number);
        assert_eq!(tokens[0].lexeme(src), "1");
        assert_eq!(tokens[1].tag, TokenTag::Number);
        assert_eq!(tokens[1].lexeme(src), "12.5");
        // Trailing dot is not part of the number.
        assert_eq!(tokens[2].tag, TokenTag::Number);
        assert_eq!(tokens[2].lexeme(src), "7");
        assert_eq!(tokens[3].tag, TokenTag::Dot);
    }

    #[test]
    fn string_spans_include_quotes() {
        let src = "\"hello\"";
        let (tokens, diags) = scan(src);
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].tag, TokenTag::Str);
        assert_eq!(tokens[0].lexeme(src), "\"hello\"");
        assert_eq!(tokens[0].string_literal(src), "hello");
    }

    #[test]
    fn strings_may_span_lines_and_track_them() {
        let src = "\"a\nb\" x";
        let (tokens, diags) = scan(src);
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].tag, TokenTag::Str);
        // The identifier after the string sits on line 2.
        assert_eq!(tokens[1].tag, TokenTag::Identifier);
        assert_eq!(tokens[1].loc.line, 2);
    }

    #[test]
    fn unterminated_string_reports_and_still_terminates() {
        let (tokens, diags) = scan("\"oops");
        assert!(diags.has_errors());
        assert_eq!(diags.errors()[0].kind, ErrorKind::UnterminatedString);
        assert_eq!(tokens.last().unwrap().tag, TokenTag::Eof);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            tags("1 // the rest is ignored ;;;\n2"),
            vec![TokenTag::Number, TokenTag::Number, TokenTag::Eof]
        );
    }

    #[test]
    fn unknown_bytes_produce_invalid_and_continue() {
        let (tokens, diags) = scan("1 @ 2 # 3");
        assert!(diags.has_errors());
        assert_eq!(diags.errors().len(), 2);
        assert_eq!(diags.errors()[0].kind, ErrorKind::UnexpectedCharacter);
        assert_eq!(
            tokens.iter().map(|t| t.tag).collect::<Vec<_>>(),
            vec![
                TokenTag::Number,
                TokenTag::Invalid,
                TokenTag::Number,
                TokenTag::Invalid,
                TokenTag::Number,
                TokenTag::Eof,
            ]
        );
    }

    #[test]
    fn line_and_column_tracking() {
        let src = "var x;\n  x";
        let (tokens, _) = scan(src);
        assert_eq!(tokens[0].loc, SrcLoc::new(1, 1)); // var
        assert_eq!(tokens[1].loc, SrcLoc::new(1, 5)); // x
        assert_eq!(tokens[2].loc, SrcLoc::new(1, 6)); // ;
        assert_eq!(tokens[3].loc, SrcLoc::new(2, 3)); // x
    }

    #[test]
    fn offset_scan_continues_line_numbering() {
        let buffer = "var a = 1;\nprint a;\n";
        let tail = buffer.len() - "print a;\n".len();
        let mut diags = Diagnostics::new();
        let tokens = Scanner::with_offset(buffer, tail, 2).scan(&mut diags);
        assert_eq!(tokens[0].tag, TokenTag::Print);
        assert_eq!(tokens[0].loc, SrcLoc::new(2, 1));
        assert_eq!(tokens[1].lexeme(buffer), "a");
    }

    #[test]
    fn lexing_is_total_over_arbitrary_bytes() {
        let src = "\u{1F600} var\t\r\n$%^";
        let (tokens, _) = scan(src);
        assert_eq!(tokens.last().unwrap().tag, TokenTag::Eof);
        assert!(tokens.iter().any(|t| t.tag == TokenTag::Var));
    }
}
