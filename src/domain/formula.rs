//! Price formulas: arithmetic over a `COSTO` placeholder.
//!
//! Formulas are typed by users while they edit a price list, e.g.
//! `COSTO * 1.16` or `(costo + 5) / 0.8`. Only numeric literals, the
//! placeholder and `+ - * / ( )` are accepted; anything else is rejected
//! by the tokenizer instead of being evaluated.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// Placeholder replaced by the base cost; matched case-insensitively.
pub const COST_TOKEN: &str = "COSTO";

/// Deepest allowed nesting of parentheses and unary signs.
pub const MAX_NESTING: usize = 64;
/// Longest formula accepted, in tokens.
pub const MAX_TOKENS: usize = 512;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("base cost is missing or zero")]
    MissingCost,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },
    #[error("unbalanced parenthesis at position {0}")]
    UnbalancedParen(usize),
    #[error("formula result is not a finite number")]
    NonFinite,
    #[error("formula does not reference COSTO")]
    MissingCostToken,
    #[error("formula nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("formula is longer than {0} tokens")]
    TooLong(usize),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Cost,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "{value}"),
            Token::Cost => f.write_str(COST_TOKEN),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        let start = pos;
        match ch {
            c if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            '+' => tokens.push((Token::Plus, start)),
            '-' => tokens.push((Token::Minus, start)),
            '*' => tokens.push((Token::Star, start)),
            '/' => tokens.push((Token::Slash, start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            c if c.is_ascii_digit() || c == '.' => {
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                let literal: String = chars[start..pos].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| FormulaError::InvalidNumber(literal.clone()))?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_alphabetic() => {
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                if word.eq_ignore_ascii_case(COST_TOKEN) {
                    tokens.push((Token::Cost, start));
                    continue;
                }
                return Err(FormulaError::UnknownIdentifier(word));
            }
            other => return Err(FormulaError::UnexpectedChar { ch: other, pos: start }),
        }
        pos += 1;
        if tokens.len() > MAX_TOKENS {
            return Err(FormulaError::TooLong(MAX_TOKENS));
        }
    }

    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::TooLong(MAX_TOKENS));
    }
    Ok(tokens)
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Const(f64),
    Cost,
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, cost: f64) -> f64 {
        match self {
            Expr::Const(value) => *value,
            Expr::Cost => cost,
            Expr::Neg(inner) => -inner.eval(cost),
            Expr::Add(lhs, rhs) => lhs.eval(cost) + rhs.eval(cost),
            Expr::Sub(lhs, rhs) => lhs.eval(cost) - rhs.eval(cost),
            Expr::Mul(lhs, rhs) => lhs.eval(cost) * rhs.eval(cost),
            Expr::Div(lhs, rhs) => lhs.eval(cost) / rhs.eval(cost),
        }
    }

    fn references_cost(&self) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Cost => true,
            Expr::Neg(inner) => inner.references_cost(),
            Expr::Add(lhs, rhs) | Expr::Sub(lhs, rhs) | Expr::Mul(lhs, rhs) | Expr::Div(lhs, rhs) => {
                lhs.references_cost() || rhs.references_cost()
            }
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.cursor).cloned();
        if item.is_some() {
            self.cursor += 1;
        }
        item
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        if self.depth >= MAX_NESTING {
            return Err(FormulaError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        Ok(())
    }

    // expr := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.cursor += 1;
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.term()?));
                }
                Some(Token::Minus) => {
                    self.cursor += 1;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.term()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.cursor += 1;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.unary()?));
                }
                Some(Token::Slash) => {
                    self.cursor += 1;
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.unary()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.cursor += 1;
                self.descend()?;
                let inner = self.unary();
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner?)))
            }
            Some(Token::Plus) => {
                self.cursor += 1;
                self.descend()?;
                let inner = self.unary();
                self.depth -= 1;
                inner
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some((Token::Number(value), _)) => Ok(Expr::Const(value)),
            Some((Token::Cost, _)) => Ok(Expr::Cost),
            Some((Token::LParen, open_pos)) => {
                self.descend()?;
                let inner = self.expression();
                self.depth -= 1;
                let inner = inner?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((token, pos)) => Err(FormulaError::UnexpectedToken {
                        token: token.to_string(),
                        pos,
                    }),
                    None => Err(FormulaError::UnbalancedParen(open_pos)),
                }
            }
            Some((Token::RParen, pos)) => Err(FormulaError::UnbalancedParen(pos)),
            Some((token, pos)) => Err(FormulaError::UnexpectedToken {
                token: token.to_string(),
                pos,
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

/// A parsed formula, reusable across many base costs.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut parser = Parser {
            tokens: tokenize(source)?,
            cursor: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if let Some((token, pos)) = parser.next() {
            return Err(match token {
                Token::RParen => FormulaError::UnbalancedParen(pos),
                other => FormulaError::UnexpectedToken {
                    token: other.to_string(),
                    pos,
                },
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn references_cost(&self) -> bool {
        self.expr.references_cost()
    }

    /// Evaluates with the given cost, rounded to cents.
    pub fn evaluate(&self, cost: f64) -> Result<f64, FormulaError> {
        let value = self.expr.eval(cost);
        if value.is_finite() {
            Ok(round_cents(value))
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Strict variant of [`evaluate_formula`] that reports why a formula failed.
pub fn try_evaluate_formula(base_cost: Option<f64>, formula: &str) -> Result<f64, FormulaError> {
    if formula.trim().is_empty() {
        return Err(FormulaError::Empty);
    }
    let cost = base_cost
        .filter(|cost| cost.is_finite() && *cost != 0.0)
        .ok_or(FormulaError::MissingCost)?;
    Formula::parse(formula)?.evaluate(cost)
}

/// Evaluates `formula` with `COSTO` bound to `base_cost`.
///
/// Never fails: an empty formula, a missing or zero cost, a malformed
/// expression or a non-finite result all yield `0.0`.
pub fn evaluate_formula(base_cost: Option<f64>, formula: &str) -> f64 {
    match try_evaluate_formula(base_cost, formula) {
        Ok(value) => value,
        Err(err) => {
            debug!(formula, ?base_cost, error = %err, "formula evaluation coerced to zero");
            0.0
        }
    }
}

/// Checks that a formula parses and actually uses the cost placeholder.
pub fn validate_formula(formula: &str) -> Result<(), FormulaError> {
    let parsed = Formula::parse(formula)?;
    if !parsed.references_cost() {
        return Err(FormulaError::MissingCostToken);
    }
    Ok(())
}
