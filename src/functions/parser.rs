//! Expression parsing
//!
//! Grammar accepted (whitespace-insensitive):
//! sums (`+`/`-`), products (`*`/`/`), powers (`^` or `**`, right
//! associative), parentheses, unary minus, the function names
//! `sin cos tan sinh cosh tanh exp sqrt log log2 log10`, the constants
//! `e`/`pi`, Chebyshev basis polynomials `T<k>(…)`, numeric literals with
//! scientific notation, and named sub-functions defined earlier in the same
//! [`FunctionContext`]. Named sub-functions are stored once and shared.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;

use super::{Expr, Expression, UnaryFn};
use crate::{Result, RootfieldError};

lazy_static! {
    /// Names that can never be variables or user function names
    static ref RESERVED_NAMES: HashSet<&'static str> = [
        "sin", "cos", "tan", "sinh", "cosh", "tanh", "exp", "sqrt", "log", "log2", "log10", "e",
        "pi",
    ]
    .into_iter()
    .collect();
}

fn unary_by_name(name: &str) -> Option<UnaryFn> {
    Some(match name {
        "sin" => UnaryFn::Sin,
        "cos" => UnaryFn::Cos,
        "tan" => UnaryFn::Tan,
        "sinh" => UnaryFn::Sinh,
        "cosh" => UnaryFn::Cosh,
        "tanh" => UnaryFn::Tanh,
        "exp" => UnaryFn::Exp,
        "sqrt" => UnaryFn::Sqrt,
        "log" => UnaryFn::Log,
        "log2" => UnaryFn::Log2,
        "log10" => UnaryFn::Log10,
        _ => return None,
    })
}

/// `T<k>` names (`T0`, `T1`, …) denote Chebyshev basis polynomials
fn chebyshev_degree(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('T')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether `name` is usable as a variable or user function name
pub fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    let leading_ok = matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_');
    leading_ok
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !RESERVED_NAMES.contains(name)
        && chebyshev_degree(name).is_none()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                // `**` is an alternate spelling of `^`
                if bytes.get(i + 1) == Some(&b'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Scientific notation: exponent may carry its own sign
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal = &source[start..i];
                let value = literal.parse::<f64>().map_err(|_| {
                    RootfieldError::input(format!("invalid numeric literal '{}'", literal))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(source[start..i].to_string()));
            }
            other => {
                return Err(RootfieldError::input(format!(
                    "unexpected character '{}' in expression '{}'",
                    other, source
                )))
            }
        }
    }
    Ok(tokens)
}

/// Names visible to expressions: the solve variables and previously defined
/// sub-functions. Definitions are checked for clashes and duplicates.
#[derive(Debug, Default, Clone)]
pub struct FunctionContext {
    variables: Vec<String>,
    definitions: HashMap<String, Arc<Expr>>,
}

impl FunctionContext {
    /// A context over the given solve variables
    pub fn new(variables: &[String]) -> Result<Self> {
        for (i, name) in variables.iter().enumerate() {
            if !is_valid_name(name) {
                return Err(RootfieldError::input(format!(
                    "illegal variable name '{}'",
                    name
                )));
            }
            if variables[..i].contains(name) {
                return Err(RootfieldError::input(format!(
                    "duplicate variable name '{}'",
                    name
                )));
            }
        }
        Ok(Self {
            variables: variables.to_vec(),
            definitions: HashMap::new(),
        })
    }

    /// The solve variables
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Parse `source` and record it under `name`
    pub fn define(&mut self, name: &str, source: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(RootfieldError::input(format!(
                "illegal function name '{}'",
                name
            )));
        }
        if self.variables.iter().any(|v| v == name) {
            return Err(RootfieldError::input(format!(
                "function name '{}' clashes with a variable",
                name
            )));
        }
        if self.definitions.contains_key(name) {
            return Err(RootfieldError::input(format!(
                "duplicate definition of function '{}'",
                name
            )));
        }
        let expr = parse_expression(source, self)?;
        self.definitions.insert(name.to_string(), Arc::new(expr));
        Ok(())
    }

    /// Whether `name` has a recorded definition
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Build the [`Expression`] for a previously defined function
    pub fn expression(&self, name: &str) -> Result<Expression> {
        let expr = self.definitions.get(name).ok_or_else(|| {
            RootfieldError::input(format!("no definition found for function '{}'", name))
        })?;
        Ok(Expression::new(
            name,
            self.variables.len(),
            Expr::Shared(Arc::clone(expr)),
        ))
    }

    fn resolve(&self, name: &str) -> Result<Expr> {
        if let Some(index) = self.variables.iter().position(|v| v == name) {
            return Ok(Expr::Variable(index));
        }
        if let Some(expr) = self.definitions.get(name) {
            return Ok(Expr::Shared(Arc::clone(expr)));
        }
        Err(RootfieldError::input(format!(
            "unknown identifier '{}'",
            name
        )))
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'a FunctionContext,
    source: &'a str,
}

impl<'a> Parser<'a> {
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

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(what))
        }
    }

    fn error(&self, what: &str) -> RootfieldError {
        RootfieldError::input(format!("expected {} in expression '{}'", what, self.source))
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut terms = vec![(false, self.parse_term()?)];
        while let Some(token) = self.peek() {
            let negate = match token {
                Token::Plus => false,
                Token::Minus => true,
                _ => break,
            };
            self.pos += 1;
            terms.push((negate, self.parse_term()?));
        }
        if terms.len() == 1 && !terms[0].0 {
            Ok(terms.pop().map(|(_, t)| t).unwrap_or(Expr::Constant(0.0)))
        } else {
            Ok(Expr::Sum(terms))
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut factors = vec![(false, self.parse_unary()?)];
        while let Some(token) = self.peek() {
            let invert = match token {
                Token::Star => false,
                Token::Slash => true,
                _ => break,
            };
            self.pos += 1;
            factors.push((invert, self.parse_unary()?));
        }
        if factors.len() == 1 {
            Ok(factors.pop().map(|(_, f)| f).unwrap_or(Expr::Constant(1.0)))
        } else {
            Ok(Expr::Product(factors))
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(match inner {
                    Expr::Constant(c) => Expr::Constant(-c),
                    other => Expr::Unary(UnaryFn::Neg, Box::new(other)),
                })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if self.peek() != Some(&Token::Caret) {
            return Ok(base);
        }
        self.pos += 1;
        // Right associative; the exponent may carry a sign
        let exponent = self.parse_unary()?;
        if let Some(value) = exponent.constant_value() {
            if value == value.trunc() && value.abs() <= i32::MAX as f64 && value >= 0.0 {
                return Ok(Expr::IntPower(Box::new(base), value as i32));
            }
        }
        Ok(Expr::Power(Box::new(base), Box::new(exponent)))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Constant(value)),
            Some(Token::LParen) => {
                let inner = self.parse_sum()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_ident(name),
            _ => Err(self.error("a value")),
        }
    }

    fn parse_ident(&mut self, name: String) -> Result<Expr> {
        match name.as_str() {
            "e" => return Ok(Expr::Constant(std::f64::consts::E)),
            "pi" => return Ok(Expr::Constant(std::f64::consts::PI)),
            _ => {}
        }
        if let Some(func) = unary_by_name(&name) {
            self.expect(Token::LParen, &format!("'(' after {}", name))?;
            let arg = self.parse_sum()?;
            self.expect(Token::RParen, &format!("')' closing {}", name))?;
            return Ok(Expr::Unary(func, Box::new(arg)));
        }
        if let Some(degree) = chebyshev_degree(&name) {
            self.expect(Token::LParen, &format!("'(' after {}", name))?;
            let arg = self.parse_sum()?;
            self.expect(Token::RParen, &format!("')' closing {}", name))?;
            return Ok(Expr::ChebyshevBasis(degree, Box::new(arg)));
        }
        self.context.resolve(&name)
    }
}

/// Parse one expression against a context of variables and definitions
pub fn parse_expression(source: &str, context: &FunctionContext) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(RootfieldError::input("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        context,
        source,
    };
    let expr = parser.parse_sum()?;
    if parser.pos != parser.tokens.len() {
        return Err(RootfieldError::input(format!(
            "trailing input in expression '{}'",
            source
        )));
    }
    Ok(expr)
}

/// Parse a standalone expression over the given variables
pub fn parse_simple(name: &str, source: &str, variables: &[&str]) -> Result<Expression> {
    let owned: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
    let context = FunctionContext::new(&owned)?;
    let expr = parse_expression(source, &context)?;
    Ok(Expression::new(name, variables.len(), expr))
}

/// Test helper: parse or panic
#[cfg(test)]
pub(crate) fn parse_test_expression(source: &str, variables: &[&str]) -> Expression {
    parse_simple("test", source, variables).expect("expression should parse")
}
