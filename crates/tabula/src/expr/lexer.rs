// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::error::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Amp,
    Pipe,
    Tilde,
    EqEq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Assign,
    AugAssign(String),
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Ident(name) => name.clone(),
            Token::AugAssign(op) => op.clone(),
            other => format!("{other:?}"),
        }
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
        }
    }

    pub fn tokenize(mut self) -> EvalResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&(start, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            if c == '#' {
                break;
            }
            let token = match c {
                '0'..='9' => self.number(start)?,
                '.' if self.peek_second().is_some_and(|n| n.is_ascii_digit()) => {
                    self.number(start)?
                }
                '\'' | '"' => {
                    self.chars.next();
                    Token::Str(self.string(c, false)?)
                }
                c if c.is_alphabetic() || c == '_' => self.word(start)?,
                _ => self.symbol(c)?,
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn number(&mut self, start: usize) -> EvalResult<Token> {
        let mut end = start;
        let mut is_float = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let accept = match c {
                '0'..='9' | '_' => true,
                '.' if !is_float => {
                    is_float = true;
                    true
                }
                'e' | 'E' => {
                    is_float = true;
                    self.chars.next();
                    end = i + 1;
                    if let Some(&(j, sign)) = self.chars.peek() {
                        if sign == '+' || sign == '-' {
                            self.chars.next();
                            end = j + 1;
                        }
                    }
                    continue;
                }
                _ => false,
            };
            if !accept {
                break;
            }
            self.chars.next();
            end = i + c.len_utf8();
        }
        let text: String = self.source[start..end].chars().filter(|&c| c != '_').collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| EvalError::syntax(format!("invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| EvalError::syntax(format!("invalid number '{text}'")))
        }
    }

    fn string(&mut self, quote: char, raw: bool) -> EvalResult<String> {
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(out),
                '\\' if !raw => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                other => out.push(other),
            }
        }
        Err(EvalError::syntax("unterminated string literal"))
    }

    fn word(&mut self, start: usize) -> EvalResult<Token> {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.chars.next();
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        let word = &self.source[start..end];
        if let Some(&(_, quote)) = self.chars.peek() {
            if quote == '\'' || quote == '"' {
                match word.to_ascii_lowercase().as_str() {
                    "r" => {
                        self.chars.next();
                        return Ok(Token::Str(self.string(quote, true)?));
                    }
                    "f" | "rf" | "fr" => {
                        return Err(EvalError::unsupported("f-strings are not supported"));
                    }
                    _ => {}
                }
            }
        }
        Ok(Token::Ident(word.to_string()))
    }

    fn symbol(&mut self, c: char) -> EvalResult<Token> {
        self.chars.next();
        let next = self.chars.peek().map(|&(_, n)| n);
        let (token, consumed_next) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, true),
            ('/', Some('/')) => (Token::DoubleSlash, true),
            ('=', Some('=')) => (Token::EqEq, true),
            ('!', Some('=')) => (Token::NotEq, true),
            ('>', Some('=')) => (Token::Ge, true),
            ('<', Some('=')) => (Token::Le, true),
            ('+' | '-' | '*' | '/' | '%' | '&' | '|', Some('=')) => {
                (Token::AugAssign(format!("{c}=")), true)
            }
            ('(', _) => (Token::LParen, false),
            (')', _) => (Token::RParen, false),
            ('[', _) => (Token::LBracket, false),
            (']', _) => (Token::RBracket, false),
            (',', _) => (Token::Comma, false),
            ('.', _) => (Token::Dot, false),
            (':', _) => (Token::Colon, false),
            ('+', _) => (Token::Plus, false),
            ('-', _) => (Token::Minus, false),
            ('*', _) => (Token::Star, false),
            ('/', _) => (Token::Slash, false),
            ('%', _) => (Token::Percent, false),
            ('&', _) => (Token::Amp, false),
            ('|', _) => (Token::Pipe, false),
            ('~', _) => (Token::Tilde, false),
            ('>', _) => (Token::Gt, false),
            ('<', _) => (Token::Lt, false),
            ('=', _) => (Token::Assign, false),
            (other, _) => {
                return Err(EvalError::syntax(format!("unexpected character '{other}'")))
            }
        };
        if consumed_next {
            self.chars.next();
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    #[test]
    fn tokens_for_a_filter() {
        assert_eq!(
            lex("df[df['age'] >= 30.5]"),
            vec![
                Token::Ident("df".into()),
                Token::LBracket,
                Token::Ident("df".into()),
                Token::LBracket,
                Token::Str("age".into()),
                Token::RBracket,
                Token::Ge,
                Token::Float(30.5),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn trailing_comment_is_ignored() {
        assert_eq!(lex("len(df) # rows").len(), 4);
    }

    #[test]
    fn assignment_operators_are_distinct() {
        assert_eq!(lex("x = 1")[1], Token::Assign);
        assert_eq!(lex("x += 1")[1], Token::AugAssign("+=".into()));
        assert_eq!(lex("a == b")[1], Token::EqEq);
    }

    #[test]
    fn raw_and_escaped_strings() {
        assert_eq!(lex(r#"r'\d+'"#), vec![Token::Str(r"\d+".into())]);
        assert_eq!(lex(r#""it\'s""#), vec![Token::Str("it's".into())]);
        assert!(Lexer::new("f'{x}'").tokenize().is_err());
        assert!(Lexer::new("'open").tokenize().is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("1_000 2e3 .5"), vec![Token::Int(1000), Token::Float(2000.0), Token::Float(0.5)]);
    }
}
