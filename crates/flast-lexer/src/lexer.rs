// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The lexer implementation using logos.

use logos::Logos;
use flast_ast::token::{Token, TokenKind};
use flast_ast::Span;

/// Raw token type for logos - literal values are parsed in a second pass.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    // === Comments ===
    // Doc comments are kept as tokens; plain line comments are skipped.
    #[regex(r"///[^\n]*", priority = 10)]
    DocComment,

    #[regex(r"//[^\n]*", logos::skip, priority = 5)]
    LineComment,

    // Block comments are scanned by a callback; no nesting. A failed scan
    // (no closing */ before end of input) surfaces as an error token.
    #[token("/*", lex_block_comment)]
    BlockComment,

    // === Keywords ===
    #[token("func")]
    Func,
    #[token("fn")]
    Fn,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("loop")]
    Loop,
    #[token("match")]
    Match,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("static")]
    Static,
    #[token("pub")]
    Pub,
    #[token("unsafe")]
    Unsafe,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("trait")]
    Trait,
    #[token("impl")]
    Impl,
    #[token("mod")]
    Mod,
    #[token("extern")]
    Extern,
    #[token("void")]
    Void,
    #[token("bool")]
    BoolTy,
    #[token("char")]
    CharTy,
    #[token("str")]
    StrTy,
    #[token("i8")]
    I8,
    #[token("i16")]
    I16,
    #[token("i32")]
    I32,
    #[token("i64")]
    I64,
    #[token("i128")]
    I128,
    #[token("u8")]
    U8,
    #[token("u16")]
    U16,
    #[token("u32")]
    U32,
    #[token("u64")]
    U64,
    #[token("u128")]
    U128,
    #[token("f32")]
    F32,
    #[token("f64")]
    F64,
    #[token("array")]
    ArrayTy,
    #[token("slice")]
    SliceTy,
    #[token("vec")]
    VecTy,
    #[token("map")]
    MapTy,
    #[token("set")]
    SetTy,
    #[token("tuple")]
    TupleTy,
    #[token("option")]
    OptionTy,
    #[token("result")]
    ResultTy,
    #[token("auto")]
    Auto,
    #[token("new")]
    New,
    #[token("box")]
    BoxKw,
    #[token("ref")]
    RefKw,
    #[token("async")]
    Async,
    #[token("await")]
    Await,
    #[token("spawn")]
    Spawn,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("throw")]
    Throw,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("use")]
    Use,
    #[token("as")]
    As,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("xor")]
    Xor,
    #[token("self")]
    SelfKw,
    #[token("Self")]
    SelfTy,
    #[token("println")]
    Println,
    #[token("print")]
    Print,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // === Operators (longest match wins) ===
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("<=>")]
    Spaceship,
    #[token(">>>")]
    UShr,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token("**=")]
    StarStarEq,
    #[token("...")]
    Ellipsis,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("**")]
    StarStar,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("::")]
    ColonColon,
    #[token("..")]
    DotDot,
    #[token("?.")]
    QuestionDot,
    #[token("??")]
    QuestionQuestion,
    #[token("?:")]
    Elvis,
    #[token("|>")]
    Pipeline,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("@")]
    At,
    #[token("#")]
    Hash,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // === Literals ===
    // A fractional part is only consumed when a digit follows the dot, so
    // `3.method()` lexes as number, dot, identifier.
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?[eE][+-]?[0-9][0-9_]*")]
    Scientific,

    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?")]
    Number,

    // An exponent marker with no digits after it. Longest-match beats the
    // plain Number pattern, so `1e` reaches convert as an invalid number
    // instead of lexing as `1` then `e`.
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?[eE][+-]?")]
    BadExponent,

    // Raw string: no escape processing, content is the byte range between
    // the quotes.
    #[token("r\"", lex_raw_string)]
    RawStr(String),

    #[token("\"", lex_dquote_string)]
    DQuoteStr(String),

    #[token("'", lex_squote_string)]
    SQuoteStr(String),

    // Template string: backtick-delimited, ordinary escapes plus \`.
    // Interpolation is not parsed at this layer.
    #[token("`", lex_template_string)]
    Template(String),

    // === Identifier (after keywords) ===
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
}

/// Scan a block comment to the first `*/` and skip it. Nesting is not
/// supported. An unterminated comment becomes an error token.
fn lex_block_comment(lexer: &mut logos::Lexer<RawToken>) -> logos::FilterResult<(), ()> {
    let remainder = lexer.remainder();
    match remainder.find("*/") {
        Some(pos) => {
            lexer.bump(pos + 2);
            logos::FilterResult::Skip
        }
        None => logos::FilterResult::Error(()),
    }
}

/// Scan a raw string to the closing quote with no escape processing.
fn lex_raw_string(lexer: &mut logos::Lexer<RawToken>) -> Option<String> {
    let remainder = lexer.remainder();
    let pos = remainder.find('"')?;
    let content = remainder[..pos].to_string();
    lexer.bump(pos + 1);
    Some(content)
}

fn lex_dquote_string(lexer: &mut logos::Lexer<RawToken>) -> Option<String> {
    lex_quoted(lexer, '"')
}

fn lex_squote_string(lexer: &mut logos::Lexer<RawToken>) -> Option<String> {
    lex_quoted(lexer, '\'')
}

fn lex_template_string(lexer: &mut logos::Lexer<RawToken>) -> Option<String> {
    lex_quoted(lexer, '`')
}

/// Scan a quoted literal body to the closing `quote`, processing escapes.
/// `\n \t \r \\ \0` and the quote escapes are recognized; any other `\X`
/// yields the literal `X`. Returns None when unterminated.
fn lex_quoted(lexer: &mut logos::Lexer<RawToken>, quote: char) -> Option<String> {
    let remainder = lexer.remainder();
    let mut result = String::new();
    let mut chars = remainder.char_indices();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            lexer.bump(i + c.len_utf8());
            return Some(result);
        }
        if c == '\\' {
            match chars.next() {
                Some((_, esc)) => result.push(unescape(esc)),
                None => return None,
            }
        } else {
            result.push(c);
        }
    }
    None
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

/// Maximum number of errors to collect before stopping.
const MAX_ERRORS: usize = 20;

/// The lexer for Flast source code.
pub struct Lexer<'a> {
    source: &'a str,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self { source, errors: Vec::new() }
    }

    /// Tokenize the entire source, collecting multiple errors.
    /// The token stream always terminates with `Eof`.
    pub fn tokenize(&mut self) -> LexResult {
        let mut tokens = Vec::new();
        let mut logos_lexer = RawToken::lexer(self.source);

        while let Some(result) = logos_lexer.next() {
            if self.errors.len() >= MAX_ERRORS {
                break;
            }

            let span = logos_lexer.span();
            let slice = logos_lexer.slice();

            let kind = match result {
                Ok(raw) => match convert_token(raw, slice, span.start, span.end) {
                    Ok(kind) => kind,
                    Err(e) => {
                        self.errors.push(e);
                        continue;
                    }
                },
                Err(()) => {
                    // An unterminated string or comment consumes the rest of
                    // the input; classify by what the failed match starts with
                    // and stop, since everything after is inside the literal.
                    let rest = &self.source[span.start..];
                    if rest.starts_with("/*") {
                        self.errors.push(LexError::unterminated_comment(span.start, self.source.len()));
                        break;
                    }
                    if rest.starts_with('"')
                        || rest.starts_with('\'')
                        || rest.starts_with('`')
                        || rest.starts_with("r\"")
                    {
                        self.errors.push(LexError::unterminated_string(span.start, self.source.len()));
                        break;
                    }
                    let ch = rest.chars().next().unwrap_or('?');
                    self.errors.push(LexError::unexpected_char(ch, span.start));
                    continue;
                }
            };

            tokens.push(Token::new(kind, slice, Span::new(span.start, span.end)));
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::new(self.source.len(), self.source.len()),
        ));

        LexResult {
            tokens,
            errors: std::mem::take(&mut self.errors),
        }
    }
}

/// Convert a raw logos token to a `TokenKind`, parsing literal values.
fn convert_token(raw: RawToken, slice: &str, start: usize, end: usize) -> Result<TokenKind, LexError> {
    Ok(match raw {
        RawToken::DocComment => TokenKind::DocComment,

        // Keywords
        RawToken::Func => TokenKind::Func,
        RawToken::Fn => TokenKind::Fn,
        RawToken::Return => TokenKind::Return,
        RawToken::If => TokenKind::If,
        RawToken::Else => TokenKind::Else,
        RawToken::While => TokenKind::While,
        RawToken::For => TokenKind::For,
        RawToken::In => TokenKind::In,
        RawToken::Loop => TokenKind::Loop,
        RawToken::Match => TokenKind::Match,
        RawToken::Break => TokenKind::Break,
        RawToken::Continue => TokenKind::Continue,
        RawToken::Let => TokenKind::Let,
        RawToken::Const => TokenKind::Const,
        RawToken::Static => TokenKind::Static,
        RawToken::Pub => TokenKind::Pub,
        RawToken::Unsafe => TokenKind::Unsafe,
        RawToken::Struct => TokenKind::Struct,
        RawToken::Enum => TokenKind::Enum,
        RawToken::Trait => TokenKind::Trait,
        RawToken::Impl => TokenKind::Impl,
        RawToken::Mod => TokenKind::Mod,
        RawToken::Extern => TokenKind::Extern,
        RawToken::Void => TokenKind::Void,
        RawToken::BoolTy => TokenKind::BoolTy,
        RawToken::CharTy => TokenKind::CharTy,
        RawToken::StrTy => TokenKind::StrTy,
        RawToken::I8 => TokenKind::I8,
        RawToken::I16 => TokenKind::I16,
        RawToken::I32 => TokenKind::I32,
        RawToken::I64 => TokenKind::I64,
        RawToken::I128 => TokenKind::I128,
        RawToken::U8 => TokenKind::U8,
        RawToken::U16 => TokenKind::U16,
        RawToken::U32 => TokenKind::U32,
        RawToken::U64 => TokenKind::U64,
        RawToken::U128 => TokenKind::U128,
        RawToken::F32 => TokenKind::F32,
        RawToken::F64 => TokenKind::F64,
        RawToken::ArrayTy => TokenKind::ArrayTy,
        RawToken::SliceTy => TokenKind::SliceTy,
        RawToken::VecTy => TokenKind::VecTy,
        RawToken::MapTy => TokenKind::MapTy,
        RawToken::SetTy => TokenKind::SetTy,
        RawToken::TupleTy => TokenKind::TupleTy,
        RawToken::OptionTy => TokenKind::OptionTy,
        RawToken::ResultTy => TokenKind::ResultTy,
        RawToken::Auto => TokenKind::Auto,
        RawToken::New => TokenKind::New,
        RawToken::BoxKw => TokenKind::BoxKw,
        RawToken::RefKw => TokenKind::RefKw,
        RawToken::Async => TokenKind::Async,
        RawToken::Await => TokenKind::Await,
        RawToken::Spawn => TokenKind::Spawn,
        RawToken::Try => TokenKind::Try,
        RawToken::Catch => TokenKind::Catch,
        RawToken::Finally => TokenKind::Finally,
        RawToken::Throw => TokenKind::Throw,
        RawToken::Import => TokenKind::Import,
        RawToken::From => TokenKind::From,
        RawToken::Use => TokenKind::Use,
        RawToken::As => TokenKind::As,
        RawToken::And => TokenKind::And,
        RawToken::Or => TokenKind::Or,
        RawToken::Not => TokenKind::Not,
        RawToken::Xor => TokenKind::Xor,
        RawToken::SelfKw => TokenKind::SelfKw,
        RawToken::SelfTy => TokenKind::SelfTy,
        RawToken::Println => TokenKind::Println,
        RawToken::Print => TokenKind::Print,
        RawToken::True => TokenKind::Bool(true),
        RawToken::False => TokenKind::Bool(false),
        RawToken::Null => TokenKind::Null,

        // Operators
        RawToken::EqEqEq => TokenKind::EqEqEq,
        RawToken::NotEqEq => TokenKind::NotEqEq,
        RawToken::Spaceship => TokenKind::Spaceship,
        RawToken::UShr => TokenKind::UShr,
        RawToken::ShlEq => TokenKind::ShlEq,
        RawToken::ShrEq => TokenKind::ShrEq,
        RawToken::StarStarEq => TokenKind::StarStarEq,
        RawToken::Ellipsis => TokenKind::Ellipsis,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::NotEq => TokenKind::NotEq,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Shl => TokenKind::Shl,
        RawToken::Shr => TokenKind::Shr,
        RawToken::AmpAmp => TokenKind::AmpAmp,
        RawToken::PipePipe => TokenKind::PipePipe,
        RawToken::PlusPlus => TokenKind::PlusPlus,
        RawToken::MinusMinus => TokenKind::MinusMinus,
        RawToken::StarStar => TokenKind::StarStar,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::FatArrow => TokenKind::FatArrow,
        RawToken::ColonColon => TokenKind::ColonColon,
        RawToken::DotDot => TokenKind::DotDot,
        RawToken::QuestionDot => TokenKind::QuestionDot,
        RawToken::QuestionQuestion => TokenKind::QuestionQuestion,
        RawToken::Elvis => TokenKind::Elvis,
        RawToken::Pipeline => TokenKind::Pipeline,
        RawToken::PlusEq => TokenKind::PlusEq,
        RawToken::MinusEq => TokenKind::MinusEq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::SlashEq => TokenKind::SlashEq,
        RawToken::PercentEq => TokenKind::PercentEq,
        RawToken::AmpEq => TokenKind::AmpEq,
        RawToken::PipeEq => TokenKind::PipeEq,
        RawToken::CaretEq => TokenKind::CaretEq,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Eq => TokenKind::Eq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Bang => TokenKind::Bang,
        RawToken::Question => TokenKind::Question,
        RawToken::Amp => TokenKind::Amp,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Caret => TokenKind::Caret,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::At => TokenKind::At,
        RawToken::Hash => TokenKind::Hash,

        // Delimiters
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Semi => TokenKind::Semi,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Dot => TokenKind::Dot,

        // Literals
        RawToken::Number => {
            let cleaned: String = slice.chars().filter(|c| *c != '_').collect();
            let value = cleaned
                .parse::<f64>()
                .map_err(|_| LexError::invalid_number(start, end))?;
            TokenKind::Number(value)
        }
        RawToken::Scientific => {
            let cleaned: String = slice.chars().filter(|c| *c != '_').collect();
            let value = cleaned
                .parse::<f64>()
                .map_err(|_| LexError::invalid_number(start, end))?;
            TokenKind::Scientific(value)
        }
        RawToken::BadExponent => {
            return Err(LexError::invalid_number(start, end));
        }
        RawToken::RawStr(content) => TokenKind::RawStr(content),
        RawToken::DQuoteStr(content) => TokenKind::Str(content),
        RawToken::SQuoteStr(content) => {
            // A single-quoted literal with exactly one character is a
            // character literal; anything else is an ordinary string.
            let mut chars = content.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => TokenKind::Char(c),
                _ => TokenKind::Str(content),
            }
        }
        RawToken::Template(content) => TokenKind::Template(content),

        RawToken::Ident => TokenKind::Ident(slice.to_string()),

        RawToken::LineComment | RawToken::BlockComment => {
            unreachable!("comments are skipped")
        }
    })
}

/// Result of lexing: tokens plus any errors found.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

impl LexResult {
    /// Returns true if lexing completed without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The kind of lexical error, matching the diagnostic taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedComment,
    InvalidNumber,
    InvalidIdentifier,
}

/// A lexer error with location and friendly message.
#[derive(Debug, Clone)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LexError {}

impl LexError {
    fn unexpected_char(ch: char, pos: usize) -> Self {
        Self {
            kind: LexErrorKind::UnexpectedCharacter,
            span: Span::new(pos, pos + ch.len_utf8()),
            message: format!("unexpected character '{}'", ch),
            hint: Some("remove this character or check for typos".to_string()),
        }
    }

    fn unterminated_string(start: usize, end: usize) -> Self {
        Self {
            kind: LexErrorKind::UnterminatedString,
            span: Span::new(start, end),
            message: "unterminated string literal".to_string(),
            hint: Some("add a closing quote before the end of the file".to_string()),
        }
    }

    fn unterminated_comment(start: usize, end: usize) -> Self {
        Self {
            kind: LexErrorKind::UnterminatedComment,
            span: Span::new(start, end),
            message: "unterminated block comment".to_string(),
            hint: Some("close the comment with */".to_string()),
        }
    }

    fn invalid_number(start: usize, end: usize) -> Self {
        Self {
            kind: LexErrorKind::InvalidNumber,
            span: Span::new(start, end),
            message: "invalid number literal".to_string(),
            hint: Some("an exponent needs at least one digit, e.g. 1.5e-3".to_string()),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use flast_ast::token::TokenKind as K;

    fn kinds(source: &str) -> Vec<K> {
        let mut lexer = Lexer::new(source);
        let result = lexer.tokenize();
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
        result.tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn stream_terminates_with_eof() {
        let result = Lexer::new("").tokenize();
        assert_eq!(result.tokens.len(), 1);
        assert_eq!(result.tokens[0].kind, K::Eof);

        let result = Lexer::new("let x = 1;").tokenize();
        assert_eq!(result.tokens.last().unwrap().kind, K::Eof);
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("func main frobnicate"),
            vec![
                K::Func,
                K::Ident("main".into()),
                K::Ident("frobnicate".into()),
                K::Eof
            ]
        );
        // Keyword prefixes stay identifiers.
        assert_eq!(
            kinds("formula iffy letter"),
            vec![
                K::Ident("formula".into()),
                K::Ident("iffy".into()),
                K::Ident("letter".into()),
                K::Eof
            ]
        );
    }

    #[test]
    fn numbers_plain_and_underscored() {
        assert_eq!(kinds("42"), vec![K::Number(42.0), K::Eof]);
        assert_eq!(kinds("1_000_000"), vec![K::Number(1_000_000.0), K::Eof]);
        assert_eq!(kinds("3.25"), vec![K::Number(3.25), K::Eof]);
    }

    #[test]
    fn underscores_survive_in_lexeme() {
        let result = Lexer::new("1_000").tokenize();
        assert_eq!(result.tokens[0].lexeme, "1_000");
        assert_eq!(result.tokens[0].kind, K::Number(1000.0));
    }

    #[test]
    fn scientific_is_distinct_and_preserved() {
        let result = Lexer::new("1.5e-3").tokenize();
        assert!(result.is_ok());
        assert_eq!(result.tokens[0].kind, K::Scientific(0.0015));
        assert_eq!(result.tokens[0].lexeme, "1.5e-3");

        assert_eq!(kinds("2e10"), vec![K::Scientific(2e10), K::Eof]);
        assert_eq!(kinds("6.02E+23"), vec![K::Scientific(6.02e23), K::Eof]);
    }

    #[test]
    fn exponent_without_digits_is_invalid() {
        let result = Lexer::new("let x = 1e;").tokenize();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::InvalidNumber);

        let result = Lexer::new("1.5e+").tokenize();
        assert_eq!(result.errors[0].kind, LexErrorKind::InvalidNumber);
    }

    #[test]
    fn number_dot_method_disambiguation() {
        assert_eq!(
            kinds("3.method()"),
            vec![
                K::Number(3.0),
                K::Dot,
                K::Ident("method".into()),
                K::LParen,
                K::RParen,
                K::Eof
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(kinds(r#""hello""#), vec![K::Str("hello".into()), K::Eof]);
        assert_eq!(
            kinds(r#""a\tb\n""#),
            vec![K::Str("a\tb\n".into()), K::Eof]
        );
        // Unknown escapes yield the literal character.
        assert_eq!(kinds(r#""\q""#), vec![K::Str("q".into()), K::Eof]);
        // Escaped quote inside the string.
        assert_eq!(kinds(r#""say \"hi\"""#), vec![K::Str("say \"hi\"".into()), K::Eof]);
    }

    #[test]
    fn single_quotes_char_vs_string() {
        assert_eq!(kinds("'a'"), vec![K::Char('a'), K::Eof]);
        assert_eq!(kinds(r"'\n'"), vec![K::Char('\n'), K::Eof]);
        assert_eq!(kinds("'ab'"), vec![K::Str("ab".into()), K::Eof]);
    }

    #[test]
    fn raw_and_template_strings() {
        assert_eq!(
            kinds(r#"r"a\nb""#),
            vec![K::RawStr(r"a\nb".into()), K::Eof]
        );
        assert_eq!(
            kinds("`tmpl \\` done`"),
            vec![K::Template("tmpl ` done".into()), K::Eof]
        );
    }

    #[test]
    fn unterminated_string_reported() {
        let result = Lexer::new("let s = \"oops").tokenize();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn comments() {
        assert_eq!(kinds("1 // comment\n2"), vec![K::Number(1.0), K::Number(2.0), K::Eof]);
        assert_eq!(kinds("1 /* mid */ 2"), vec![K::Number(1.0), K::Number(2.0), K::Eof]);
        assert_eq!(
            kinds("/// docs\nfunc"),
            vec![K::DocComment, K::Func, K::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let result = Lexer::new("1 /* never closed").tokenize();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::UnterminatedComment);
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(kinds("<=>"), vec![K::Spaceship, K::Eof]);
        assert_eq!(kinds(">>>"), vec![K::UShr, K::Eof]);
        assert_eq!(kinds("**="), vec![K::StarStarEq, K::Eof]);
        assert_eq!(kinds("a ?. b ?? c ?: d"), vec![
            K::Ident("a".into()),
            K::QuestionDot,
            K::Ident("b".into()),
            K::QuestionQuestion,
            K::Ident("c".into()),
            K::Elvis,
            K::Ident("d".into()),
            K::Eof,
        ]);
        assert_eq!(kinds("x |> f"), vec![
            K::Ident("x".into()),
            K::Pipeline,
            K::Ident("f".into()),
            K::Eof,
        ]);
        assert_eq!(kinds("a === b !== c"), vec![
            K::Ident("a".into()),
            K::EqEqEq,
            K::Ident("b".into()),
            K::NotEqEq,
            K::Ident("c".into()),
            K::Eof,
        ]);
    }

    #[test]
    fn unexpected_character() {
        let result = Lexer::new("let $ = 1;").tokenize();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexErrorKind::UnexpectedCharacter);
        // Lexing continued past the bad character.
        assert!(result.tokens.iter().any(|t| t.kind == K::Eq));
    }

    #[test]
    fn lexemes_reconstruct_source() {
        let source = "func main() -> i32 { return 1_0; }";
        let result = Lexer::new(source).tokenize();
        assert!(result.is_ok());
        for token in &result.tokens {
            assert_eq!(token.span.lexeme(source), token.lexeme);
        }
    }
}
