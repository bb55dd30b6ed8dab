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

//! Recursive-descent parser following Python operator precedence.

use super::error::{EvalError, EvalResult};
use super::lexer::{Lexer, Token};

pub const MAX_EXPRESSION_BYTES: usize = 4 * 1024;
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Name(String),
    Attribute {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Logical {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

pub fn parse(source: &str) -> EvalResult<Expr> {
    if source.len() > MAX_EXPRESSION_BYTES {
        return Err(EvalError::unsupported(format!(
            "expression is longer than {MAX_EXPRESSION_BYTES} bytes"
        )));
    }
    let tokens = Lexer::new(source).tokenize()?;
    if tokens.is_empty() {
        return Err(EvalError::EmptyExpression);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::Assign) | Some(Token::AugAssign(_)) => Err(EvalError::unsupported(
            "assignments are not supported; only a single expression is evaluated",
        )),
        Some(token) => Err(EvalError::syntax(format!(
            "unexpected '{}' after expression",
            token.describe()
        ))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, context: &str) -> EvalResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(match self.peek() {
                Some(token) => EvalError::syntax(format!(
                    "expected {context} but found '{}'",
                    token.describe()
                )),
                None => EvalError::syntax(format!("expected {context} before end of input")),
            })
        }
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(EvalError::syntax(format!(
                "expression is nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn expression(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let expr = self.or_expr();
        self.depth -= 1;
        expr
    }

    fn or_expr(&mut self) -> EvalResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> EvalResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> EvalResult<Expr> {
        if self.eat_keyword("not") {
            self.enter()?;
            let operand = self.not_expr();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EvalResult<Expr> {
        let first = self.bit_or()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Ident(word)) if word == "in" || word == "is" => {
                    return Err(EvalError::unsupported(format!(
                        "the '{word}' operator is not supported"
                    )))
                }
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.bit_or()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn bit_or(&mut self) -> EvalResult<Expr> {
        let mut left = self.bit_and()?;
        while self.eat(&Token::Pipe) {
            let right = self.bit_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> EvalResult<Expr> {
        let mut left = self.arith()?;
        while self.eat(&Token::Amp) {
            let right = self.arith()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn arith(&mut self) -> EvalResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> EvalResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            Some(Token::Tilde) => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn power(&mut self) -> EvalResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::DoubleStar) {
            self.enter()?;
            let exponent = self.unary();
            self.depth -= 1;
            return Ok(binary(BinaryOp::Pow, base, exponent?));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Ident(name)) => {
                            expr = Expr::Attribute {
                                target: Box::new(expr),
                                name,
                            }
                        }
                        _ => return Err(EvalError::syntax("expected attribute name after '.'")),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.subscript()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let (args, kwargs) = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn subscript(&mut self) -> EvalResult<Expr> {
        let mut items = vec![self.slice_or_expr()?];
        while self.eat(&Token::Comma) {
            if self.peek() == Some(&Token::RBracket) {
                break;
            }
            items.push(self.slice_or_expr()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Tuple(items)
        })
    }

    fn slice_or_expr(&mut self) -> EvalResult<Expr> {
        let start = if self.peek() == Some(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if !self.eat(&Token::Colon) {
            return start
                .map(|expr| *expr)
                .ok_or_else(|| EvalError::syntax("empty subscript"));
        }
        let stop = match self.peek() {
            Some(Token::RBracket) | Some(Token::Comma) | None => None,
            Some(Token::Colon) => {
                return Err(EvalError::unsupported("slice steps are not supported"))
            }
            _ => Some(Box::new(self.expression()?)),
        };
        if self.peek() == Some(&Token::Colon) {
            return Err(EvalError::unsupported("slice steps are not supported"));
        }
        Ok(Expr::Slice { start, stop })
    }

    fn arguments(&mut self) -> EvalResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat(&Token::RParen) {
            let keyword = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
                (Some(Token::Ident(name)), Some(Token::Assign)) => Some(name.clone()),
                _ => None,
            };
            match keyword {
                Some(name) => {
                    self.pos += 2;
                    kwargs.push((name, self.expression()?));
                }
                None if !kwargs.is_empty() => {
                    return Err(EvalError::syntax(
                        "positional argument follows keyword argument",
                    ))
                }
                None => args.push(self.expression()?),
            }
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, "')' to close the call")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> EvalResult<Expr> {
        match self.advance() {
            Some(Token::Int(v)) => Ok(Expr::Literal(Literal::Int(v))),
            Some(Token::Float(v)) => Ok(Expr::Literal(Literal::Float(v))),
            Some(Token::Str(mut s)) => {
                // Adjacent literals concatenate.
                while let Some(Token::Str(next)) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" => Expr::Literal(Literal::Bool(true)),
                "False" => Expr::Literal(Literal::Bool(false)),
                "None" => Expr::Literal(Literal::None),
                "lambda" => return Err(EvalError::unsupported("lambda expressions are not supported")),
                "import" | "from" | "def" | "class" | "for" | "while" | "with" => {
                    return Err(EvalError::unsupported(format!("'{name}' statements are not supported")))
                }
                _ => Expr::Name(name),
            }),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                if self.peek() == Some(&Token::Comma) {
                    let mut items = vec![inner];
                    while self.eat(&Token::Comma) {
                        if self.peek() == Some(&Token::RParen) {
                            break;
                        }
                        items.push(self.expression()?);
                    }
                    self.expect(Token::RParen, "')'")?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBracket, "']' to close the list")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(token) => Err(EvalError::syntax(format!("unexpected '{}'", token.describe()))),
            None => Err(EvalError::syntax("unexpected end of input")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.into()))
    }

    #[test]
    fn comparison_binds_looser_than_bitwise() {
        let expr = parse("a > 1 & b").unwrap();
        match expr {
            Expr::Compare { first, rest } => {
                assert_eq!(first, name("a"));
                assert!(matches!(rest[0].1, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn method_chain_with_keywords() {
        let expr = parse("df.sort_values('age', ascending=False).head(3)").unwrap();
        let Expr::Call { callee, args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args, vec![Expr::Literal(Literal::Int(3))]);
        let Expr::Attribute { target, name } = *callee else {
            panic!("expected attribute");
        };
        assert_eq!(name, "head");
        let Expr::Call { kwargs, .. } = *target else {
            panic!("expected inner call");
        };
        assert_eq!(kwargs[0].0, "ascending");
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = parse("-2 ** 2").unwrap();
        assert!(matches!(
            expr,
            Expr::Unary { op: UnaryOp::Neg, ref operand } if matches!(**operand, Expr::Binary { op: BinaryOp::Pow, .. })
        ));
    }

    #[test]
    fn loc_with_row_and_column() {
        let expr = parse("df.loc[:, 'a']").unwrap();
        let Expr::Index { index, .. } = expr else {
            panic!("expected index");
        };
        assert!(matches!(*index, Expr::Tuple(ref items) if items.len() == 2));
    }

    #[test]
    fn assignment_is_unsupported() {
        assert_eq!(parse("x = df.shape").unwrap_err().kind(), "unsupported");
        assert_eq!(parse("df['a'] += 1").unwrap_err().kind(), "unsupported");
    }

    #[test]
    fn limits_are_enforced() {
        let deep = format!("{}1{}", "(".repeat(70), ")".repeat(70));
        assert_eq!(parse(&deep).unwrap_err().kind(), "syntax");
        let long = format!("len('{}')", "x".repeat(5000));
        assert_eq!(parse(&long).unwrap_err().kind(), "unsupported");
    }

    #[test]
    fn malformed_input_is_syntax() {
        assert_eq!(parse("df[").unwrap_err().kind(), "syntax");
        assert_eq!(parse("df.head(1,").unwrap_err().kind(), "syntax");
        assert_eq!(parse("df df").unwrap_err().kind(), "syntax");
    }
}
