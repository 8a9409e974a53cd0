//! Lexical scanning for candidate SQL.
//!
//! Two passes over the text:
//! - `strip_comments` removes `--` line comments and `/* */` block comments
//!   (nested), leaving string, quoted-identifier, bracket and backtick
//!   literals intact and replacing each comment with one space so
//!   neighbouring tokens never fuse together.
//! - `tokenize` splits comment-free text into words, literals and symbols.
//!
//! Literal syntax whose extent differs between PostgreSQL and SQLite
//! (`$tag$` dollar quoting, `E'...'` strings containing a backslash) is
//! refused outright: a separator the stores would see must never be hidden
//! inside what the scanner takes for a literal.

use std::iter::Peekable;
use std::str::Chars;

/// Errors that prevent the text from being scanned reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    /// A quote or bracket was opened and never closed.
    UnterminatedLiteral,
    /// Dollar-quoted or backslash-escaped literal whose extent depends on
    /// the store.
    AmbiguousLiteral,
}

/// Kind of quoted literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    /// `'text'`, with `''` as an escaped quote.
    String,
    /// `"identifier"`, with `""` as an escaped quote.
    QuotedIdent,
    /// `[identifier]`
    Bracket,
    /// `` `identifier` ``, with a doubled backtick as an escape.
    Backtick,
}

impl LiteralKind {
    fn from_opening(c: char) -> Option<Self> {
        match c {
            '\'' => Some(Self::String),
            '"' => Some(Self::QuotedIdent),
            '[' => Some(Self::Bracket),
            '`' => Some(Self::Backtick),
            _ => None,
        }
    }

    fn closing(&self) -> char {
        match self {
            Self::String => '\'',
            Self::QuotedIdent => '"',
            Self::Bracket => ']',
            Self::Backtick => '`',
        }
    }

    /// Whether a doubled closing character stands for itself.
    fn doubles_escape(&self) -> bool {
        !matches!(self, Self::Bracket)
    }
}

/// A token of comment-free SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Keyword or bare identifier: letters, digits and underscores.
    Word(String),
    /// Numeric literal.
    Number(String),
    /// Quoted literal; `content` excludes the delimiters.
    Literal { kind: LiteralKind, content: String },
    /// Statement separator.
    Semicolon,
    /// Any other character outside whitespace.
    Symbol(char),
}

impl Token {
    /// Returns the word if this is a Word token.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            _ => None,
        }
    }
}

/// Removes comments, keeping literals verbatim.
///
/// A block comment left open runs to the end of the input.
pub fn strip_comments(input: &str) -> Result<String, LexError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(kind) = LiteralKind::from_opening(c) {
            let escape_string = kind == LiteralKind::String && ends_with_escape_prefix(&out);
            out.push(c);
            let content = collect_literal(&mut chars, kind)?;
            if escape_string && content.raw.contains('\\') {
                return Err(LexError::AmbiguousLiteral);
            }
            out.push_str(&content.raw);
            out.push(kind.closing());
            continue;
        }

        if c == '$' && !continues_word(&out) && opens_dollar_quote(&chars) {
            return Err(LexError::AmbiguousLiteral);
        }

        match (c, chars.peek().copied()) {
            ('-', Some('-')) => {
                skip_line_comment(&mut chars);
                out.push(' ');
            }
            ('/', Some('*')) => {
                chars.next();
                skip_block_comment(&mut chars);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Splits comment-free SQL into tokens.
///
/// Comment markers are not recognised here; run `strip_comments` first.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if let Some(kind) = LiteralKind::from_opening(c) {
            chars.next();
            let literal = collect_literal(&mut chars, kind)?;
            tokens.push(Token::Literal {
                kind,
                content: literal.value,
            });
            continue;
        }

        if is_word_start(c) {
            tokens.push(Token::Word(collect_while(&mut chars, is_word_char)));
            continue;
        }

        if c.is_ascii_digit() {
            tokens.push(Token::Number(collect_while(&mut chars, |ch| {
                ch.is_ascii_alphanumeric() || ch == '.' || ch == '_'
            })));
            continue;
        }

        chars.next();
        tokens.push(if c == ';' {
            Token::Semicolon
        } else {
            Token::Symbol(c)
        });
    }

    Ok(tokens)
}

/// Splits free text (literal content) into word-like runs.
pub fn words_in(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
}

/// Whether the text so far ends with a standalone `E` that would make the
/// next string a backslash-escape string on PostgreSQL.
fn ends_with_escape_prefix(out: &str) -> bool {
    out.strip_suffix(['E', 'e'])
        .is_some_and(|before| !continues_word(before))
}

/// Whether a character appended to `text` would extend its last word.
fn continues_word(text: &str) -> bool {
    text.chars()
        .next_back()
        .is_some_and(|p| is_word_char(p) || p == '$')
}

/// Whether the characters after a `$` form the rest of a `$tag$` opener.
fn opens_dollar_quote(chars: &Peekable<Chars<'_>>) -> bool {
    let mut first = true;
    for c in chars.clone() {
        match c {
            '$' => return true,
            c if is_word_start(c) || (!first && is_word_char(c)) => first = false,
            _ => return false,
        }
    }
    false
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn collect_while(chars: &mut Peekable<Chars<'_>>, pred: impl Fn(char) -> bool) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if !pred(c) {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

struct Literal {
    /// Text between the delimiters exactly as written.
    raw: String,
    /// Text with doubled-quote escapes resolved.
    value: String,
}

/// Reads a literal body after its opening delimiter, consuming the closer.
fn collect_literal(chars: &mut Peekable<Chars<'_>>, kind: LiteralKind) -> Result<Literal, LexError> {
    let close = kind.closing();
    let mut raw = String::new();
    let mut value = String::new();

    loop {
        match chars.next() {
            None => return Err(LexError::UnterminatedLiteral),
            Some(c) if c == close => {
                if kind.doubles_escape() && chars.peek() == Some(&close) {
                    chars.next();
                    raw.push(close);
                    raw.push(close);
                    value.push(close);
                } else {
                    return Ok(Literal { raw, value });
                }
            }
            Some(c) => {
                raw.push(c);
                value.push(c);
            }
        }
    }
}

fn skip_line_comment(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

/// Skips a block comment body after its opening `/*`, honouring nesting.
fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    let mut depth = 1usize;
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('*', Some('/')) => {
                chars.next();
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            ('/', Some('*')) => {
                chars.next();
                depth += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_line_comment() {
        assert_eq!(
            strip_comments("SELECT 1 -- ; DROP TABLE x").unwrap(),
            "SELECT 1  "
        );
        assert_eq!(
            strip_comments("SELECT a -- note\nFROM t").unwrap(),
            "SELECT a  FROM t"
        );
    }

    #[test]
    fn test_strip_block_comment_does_not_fuse_tokens() {
        assert_eq!(strip_comments("SEL/**/ECT").unwrap(), "SEL ECT");
        assert_eq!(strip_comments("DR/* x */OP").unwrap(), "DR OP");
    }

    #[test]
    fn test_strip_nested_block_comment() {
        assert_eq!(
            strip_comments("SELECT /* a /* b */ still comment */ 1").unwrap(),
            "SELECT   1"
        );
    }

    #[test]
    fn test_unterminated_block_comment_runs_to_end() {
        assert_eq!(strip_comments("SELECT 1 /* DROP").unwrap(), "SELECT 1  ");
    }

    #[test]
    fn test_comment_markers_inside_literals_are_kept() {
        let sql = "SELECT '--not a comment', \"/*col*/\", [x--y] FROM t";
        assert_eq!(strip_comments(sql).unwrap(), sql);
    }

    #[test]
    fn test_escaped_quotes_stay_inside_literal() {
        let sql = "SELECT 'it''s -- fine' FROM t";
        assert_eq!(strip_comments(sql).unwrap(), sql);
    }

    #[test]
    fn test_unterminated_literal() {
        assert_eq!(
            strip_comments("SELECT 'open"),
            Err(LexError::UnterminatedLiteral)
        );
        assert_eq!(
            strip_comments("SELECT [EDC_BRAND"),
            Err(LexError::UnterminatedLiteral)
        );
        assert_eq!(tokenize("\"abc"), Err(LexError::UnterminatedLiteral));
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("SELECT BR_CODE, 'a;b' FROM [EDC_BRAND] WHERE x >= 1.5;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("SELECT".into()),
                Token::Word("BR_CODE".into()),
                Token::Symbol(','),
                Token::Literal {
                    kind: LiteralKind::String,
                    content: "a;b".into()
                },
                Token::Word("FROM".into()),
                Token::Literal {
                    kind: LiteralKind::Bracket,
                    content: "EDC_BRAND".into()
                },
                Token::Word("WHERE".into()),
                Token::Word("x".into()),
                Token::Symbol('>'),
                Token::Symbol('='),
                Token::Number("1.5".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_tokenize_resolves_doubled_quotes() {
        let tokens = tokenize("'O''Brien'").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Literal {
                kind: LiteralKind::String,
                content: "O'Brien".into()
            }]
        );
    }

    #[test]
    fn test_backtick_identifier_is_a_literal() {
        let tokens = tokenize("SELECT `x'` FROM t").unwrap();
        assert_eq!(
            tokens[1],
            Token::Literal {
                kind: LiteralKind::Backtick,
                content: "x'".into()
            }
        );
        assert_eq!(
            tokenize("`a``b`").unwrap(),
            vec![Token::Literal {
                kind: LiteralKind::Backtick,
                content: "a`b".into()
            }]
        );
        let sql = "SELECT `--kept` FROM t";
        assert_eq!(strip_comments(sql).unwrap(), sql);
    }

    #[test]
    fn test_dollar_quotes_are_refused() {
        for sql in [
            "SELECT $$ ' $$; DROP TABLE t",
            "SELECT $body$x$body$",
            "select 1 as a, $q$;$q$",
        ] {
            assert_eq!(strip_comments(sql), Err(LexError::AmbiguousLiteral), "{sql}");
        }
        // parameters and identifiers containing `$` are not quotes
        assert!(strip_comments("SELECT * FROM t WHERE id = $1").is_ok());
        assert!(strip_comments("SELECT price$usd FROM t").is_ok());
        assert!(strip_comments("SELECT '$$' FROM t").is_ok());
    }

    #[test]
    fn test_escape_strings_with_backslash_are_refused() {
        assert_eq!(
            strip_comments("SELECT E'\\'' ; DROP TABLE t; SELECT '"),
            Err(LexError::AmbiguousLiteral)
        );
        assert_eq!(
            strip_comments("SELECT e'a\\nb'"),
            Err(LexError::AmbiguousLiteral)
        );
        // no backslash: both stores agree on the extent
        assert!(strip_comments("SELECT E'plain'").is_ok());
        // `E` ending a longer word is not a prefix
        assert!(strip_comments("SELECT * FROM t WHERE'a\\'='a\\'").is_ok());
    }

    #[test]
    fn test_words_in() {
        assert_eq!(
            words_in("Drop-ship (fast) order_update").collect::<Vec<_>>(),
            vec!["Drop", "ship", "fast", "order_update"]
        );
    }
}
