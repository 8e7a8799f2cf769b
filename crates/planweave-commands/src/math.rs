//! Arithmetic expression evaluator
//!
//! A small recursive-descent evaluator over `+ - * / // % **`, unary sign,
//! and parentheses, with integer and floating-point numbers. Division `/`
//! always yields a float; `//` and `%` floor like Python's operators, which
//! is the convention the CALCULATE command documents.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MathError {
    /// The text is not a well-formed expression.
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("division by zero")]
    DivisionByZero,

    /// The expression is valid but the result is not a real number.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// An evaluation result. Integer arithmetic stays exact until an operation
/// overflows or inherently produces a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Evaluate an arithmetic expression.
pub fn eval(text: &str) -> Result<Number, MathError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(MathError::Syntax(format!(
            "unexpected trailing input at token {}",
            parser.pos + 1
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LeftParen,
    RightParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, MathError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if seen_dot {
                            return Err(MathError::Syntax(format!(
                                "malformed number at position {start}"
                            )));
                        }
                        seen_dot = true;
                    }
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = if seen_dot {
                    literal
                        .parse::<f64>()
                        .map(Number::Float)
                        .map_err(|_| MathError::Syntax(format!("malformed number '{literal}'")))?
                } else {
                    match literal.parse::<i64>() {
                        Ok(v) => Number::Int(v),
                        // Too large for i64, carry as float.
                        Err(_) => literal
                            .parse::<f64>()
                            .map(Number::Float)
                            .map_err(|_| {
                                MathError::Syntax(format!("malformed number '{literal}'"))
                            })?,
                    }
                };
                tokens.push(Token::Number(number));
            }
            other => {
                return Err(MathError::Syntax(format!(
                    "unexpected character '{other}' at position {i}"
                )))
            }
        }
    }
    if tokens.is_empty() {
        return Err(MathError::Syntax("empty expression".to_string()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Number, MathError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    value = add(value, self.term()?);
                }
                Token::Minus => {
                    self.pos += 1;
                    value = sub(value, self.term()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Number, MathError> {
        let mut value = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value = mul(value, self.unary()?);
                }
                Token::Slash => {
                    self.pos += 1;
                    value = div(value, self.unary()?)?;
                }
                Token::DoubleSlash => {
                    self.pos += 1;
                    value = floor_div(value, self.unary()?)?;
                }
                Token::Percent => {
                    self.pos += 1;
                    value = floor_mod(value, self.unary()?)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // Exponentiation binds tighter than unary sign, so -2**2 is -(2**2),
    // while the exponent itself may carry a sign: 2**-1.
    fn unary(&mut self) -> Result<Number, MathError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(neg(self.unary()?))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, MathError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::DoubleStar) {
            self.pos += 1;
            let exponent = self.unary()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, MathError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LeftParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RightParen) => Ok(value),
                    _ => Err(MathError::Syntax("missing closing parenthesis".to_string())),
                }
            }
            Some(other) => Err(MathError::Syntax(format!("unexpected token {other:?}"))),
            None => Err(MathError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

fn neg(value: Number) -> Number {
    match value {
        Number::Int(v) => v
            .checked_neg()
            .map(Number::Int)
            .unwrap_or(Number::Float(-(v as f64))),
        Number::Float(v) => Number::Float(-v),
    }
}

fn add(a: Number, b: Number) -> Number {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 + b as f64)),
        _ => Number::Float(a.as_f64() + b.as_f64()),
    }
}

fn sub(a: Number, b: Number) -> Number {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_sub(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 - b as f64)),
        _ => Number::Float(a.as_f64() - b.as_f64()),
    }
}

fn mul(a: Number, b: Number) -> Number {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_mul(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 * b as f64)),
        _ => Number::Float(a.as_f64() * b.as_f64()),
    }
}

fn div(a: Number, b: Number) -> Result<Number, MathError> {
    let divisor = b.as_f64();
    if divisor == 0.0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(Number::Float(a.as_f64() / divisor))
}

fn floor_div(a: Number, b: Number) -> Result<Number, MathError> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => {
            if b == 0 {
                return Err(MathError::DivisionByZero);
            }
            let mut q = a / b;
            if a % b != 0 && (a < 0) != (b < 0) {
                q -= 1;
            }
            Ok(Number::Int(q))
        }
        _ => {
            let divisor = b.as_f64();
            if divisor == 0.0 {
                return Err(MathError::DivisionByZero);
            }
            Ok(Number::Float((a.as_f64() / divisor).floor()))
        }
    }
}

fn floor_mod(a: Number, b: Number) -> Result<Number, MathError> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => {
            if b == 0 {
                return Err(MathError::DivisionByZero);
            }
            Ok(Number::Int(((a % b) + b) % b))
        }
        _ => {
            let divisor = b.as_f64();
            if divisor == 0.0 {
                return Err(MathError::DivisionByZero);
            }
            let rem = a.as_f64() % divisor;
            Ok(Number::Float(((rem + divisor) % divisor + divisor) % divisor))
        }
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, MathError> {
    if let (Number::Int(b), Number::Int(e)) = (base, exponent) {
        if (0..=u32::MAX as i64).contains(&e) {
            if let Some(v) = b.checked_pow(e as u32) {
                return Ok(Number::Int(v));
            }
        }
    }
    let result = base.as_f64().powf(exponent.as_f64());
    if result.is_nan() {
        return Err(MathError::Unsupported(
            "result is not a real number".to_string(),
        ));
    }
    Ok(Number::Float(result))
}
