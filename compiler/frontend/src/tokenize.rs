//! Convert a source file to a sequence of tokens.

use crate::{Diagnostic, Info};
use logos::Logos;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};
use tmpl_util::WithInfo;

/// A token in the source code.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum Token<'src> {
    LeftAngle,
    RightAngle,
    LeftBrace,
    RightBrace,
    LeftParenthesis,
    RightParenthesis,
    LeftBracket,
    RightBracket,
    Scope,
    Colon,
    Semicolon,
    Comma,
    Equal,
    Star,
    Ampersand,
    DoubleAmpersand,
    Ellipsis,
    Keyword(Keyword),
    Name(Cow<'src, str>),
    Literal(Cow<'src, str>),
    Operator(Cow<'src, str>),
}

/// A keyword.
#[allow(missing_docs)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Keyword {
    #[strum(serialize = "template")]
    Template,

    #[strum(serialize = "typename")]
    Typename,

    #[strum(serialize = "class")]
    Class,

    #[strum(serialize = "struct")]
    Struct,

    #[strum(serialize = "union")]
    Union,

    #[strum(serialize = "using")]
    Using,

    #[strum(serialize = "namespace")]
    Namespace,

    #[strum(serialize = "typedef")]
    Typedef,

    #[strum(serialize = "const")]
    Const,

    #[strum(serialize = "volatile")]
    Volatile,

    #[strum(serialize = "public")]
    Public,

    #[strum(serialize = "protected")]
    Protected,

    #[strum(serialize = "private")]
    Private,

    #[strum(serialize = "virtual")]
    Virtual,

    #[strum(serialize = "final")]
    Final,

    #[strum(serialize = "void")]
    Void,

    #[strum(serialize = "bool")]
    Bool,

    #[strum(serialize = "char")]
    Char,

    #[strum(serialize = "wchar_t")]
    WideChar,

    #[strum(serialize = "char8_t")]
    Char8,

    #[strum(serialize = "char16_t")]
    Char16,

    #[strum(serialize = "char32_t")]
    Char32,

    #[strum(serialize = "short")]
    Short,

    #[strum(serialize = "int")]
    Int,

    #[strum(serialize = "long")]
    Long,

    #[strum(serialize = "signed")]
    Signed,

    #[strum(serialize = "unsigned")]
    Unsigned,

    #[strum(serialize = "float")]
    Float,

    #[strum(serialize = "double")]
    Double,
}

impl Keyword {
    /// Whether the keyword is (part of) the name of a fundamental type.
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            Keyword::Void
                | Keyword::Bool
                | Keyword::Char
                | Keyword::WideChar
                | Keyword::Char8
                | Keyword::Char16
                | Keyword::Char32
                | Keyword::Short
                | Keyword::Int
                | Keyword::Long
                | Keyword::Signed
                | Keyword::Unsigned
                | Keyword::Float
                | Keyword::Double
        )
    }
}

#[derive(Debug, Logos)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[logos(skip r"#[^\n]*")]
enum RawToken<'src> {
    #[token("<")]
    LeftAngle,

    // `>>` is never a single token, so nested argument lists close one at a
    // time
    #[token(">")]
    RightAngle,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("(")]
    LeftParenthesis,

    #[token(")")]
    RightParenthesis,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token("::")]
    Scope,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token("=")]
    Equal,

    #[token("*")]
    Star,

    #[token("&")]
    Ampersand,

    #[token("&&")]
    DoubleAmpersand,

    #[token("...")]
    Ellipsis,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| Cow::Borrowed(lex.slice()))]
    Name(Cow<'src, str>),

    #[regex(r"[0-9][0-9A-Za-z_']*", |lex| Cow::Borrowed(lex.slice()))]
    #[regex(r#""([^"\\\n]|\\.)*"|'([^'\\\n]|\\.)*'"#, |lex| Cow::Borrowed(lex.slice()))]
    Literal(Cow<'src, str>),

    #[regex(r"[-+/%!~^|?.]", |lex| Cow::Borrowed(lex.slice()))]
    Operator(Cow<'src, str>),
}

/// Tokenize a source file.
pub fn tokenize<'src>(
    path: Arc<str>,
    s: &'src str,
) -> impl Iterator<Item = Result<WithInfo<Info, Token<'src>>, WithInfo<Info, Diagnostic>>> + 'src {
    logos::Lexer::new(s).spanned().map(move |(result, span)| {
        let info = Info {
            path: path.clone(),
            span: (span.start as u32)..(span.end as u32),
        };

        match result {
            Ok(raw_token) => {
                let token = match raw_token {
                    RawToken::LeftAngle => Token::LeftAngle,
                    RawToken::RightAngle => Token::RightAngle,
                    RawToken::LeftBrace => Token::LeftBrace,
                    RawToken::RightBrace => Token::RightBrace,
                    RawToken::LeftParenthesis => Token::LeftParenthesis,
                    RawToken::RightParenthesis => Token::RightParenthesis,
                    RawToken::LeftBracket => Token::LeftBracket,
                    RawToken::RightBracket => Token::RightBracket,
                    RawToken::Scope => Token::Scope,
                    RawToken::Colon => Token::Colon,
                    RawToken::Semicolon => Token::Semicolon,
                    RawToken::Comma => Token::Comma,
                    RawToken::Equal => Token::Equal,
                    RawToken::Star => Token::Star,
                    RawToken::Ampersand => Token::Ampersand,
                    RawToken::DoubleAmpersand => Token::DoubleAmpersand,
                    RawToken::Ellipsis => Token::Ellipsis,
                    RawToken::Name(name) => {
                        if let Ok(keyword) = name.parse::<Keyword>() {
                            Token::Keyword(keyword)
                        } else {
                            Token::Name(name)
                        }
                    }
                    RawToken::Literal(literal) => Token::Literal(literal),
                    RawToken::Operator(operator) => Token::Operator(operator),
                };

                Ok(WithInfo { info, item: token })
            }
            Err(()) => Err(WithInfo {
                info,
                item: Diagnostic::InvalidToken,
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<Token<'_>> {
        tokenize(Arc::from("test.cpp"), s)
            .map(|result| result.expect("invalid token").item)
            .collect()
    }

    #[test]
    fn comments_and_preprocessor_lines_are_skipped() {
        let code = "#include <vector>\n// line comment\nusing /* block\n comment */ x = int;";

        assert_eq!(
            tokens(code),
            vec![
                Token::Keyword(Keyword::Using),
                Token::Name(Cow::Borrowed("x")),
                Token::Equal,
                Token::Keyword(Keyword::Int),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn nested_argument_lists_close_separately() {
        assert_eq!(
            tokens("A<B<T>>::template type<Ts...>"),
            vec![
                Token::Name(Cow::Borrowed("A")),
                Token::LeftAngle,
                Token::Name(Cow::Borrowed("B")),
                Token::LeftAngle,
                Token::Name(Cow::Borrowed("T")),
                Token::RightAngle,
                Token::RightAngle,
                Token::Scope,
                Token::Keyword(Keyword::Template),
                Token::Name(Cow::Borrowed("type")),
                Token::LeftAngle,
                Token::Name(Cow::Borrowed("Ts")),
                Token::Ellipsis,
                Token::RightAngle,
            ]
        );
    }

    #[test]
    fn references_are_distinguished() {
        assert_eq!(
            tokens("T& U&& const* 42"),
            vec![
                Token::Name(Cow::Borrowed("T")),
                Token::Ampersand,
                Token::Name(Cow::Borrowed("U")),
                Token::DoubleAmpersand,
                Token::Keyword(Keyword::Const),
                Token::Star,
                Token::Literal(Cow::Borrowed("42")),
            ]
        );
    }

    #[test]
    fn invalid_characters_are_reported() {
        let results = tokenize(Arc::from("test.cpp"), "int @ x").collect::<Vec<_>>();

        assert_eq!(results.len(), 3);
        assert!(matches!(
            &results[1],
            Err(WithInfo {
                item: Diagnostic::InvalidToken,
                ..
            })
        ));
    }
}
