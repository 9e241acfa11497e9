//! Calculator tool.
//!
//! Evaluates arithmetic expressions such as `((313*(451+293))/(4^2))+sqrt(734)`.
//! Supported syntax:
//! - binary `+ - * / %`, power `^` (or `**`, right associative), unary `-`/`+`
//! - postfix factorial `!`
//! - constants `pi`, `e`, `tau`
//! - functions `sqrt cbrt abs exp ln log log2 sin cos tan asin acos atan
//!   floor ceil round factorial min max` (`log(x, base)` takes an optional base)
//!
//! Math errors are reported inside the tool output so the model can correct itself;
//! only malformed arguments fail the call.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{DeskError, Result};
use crate::tool::Tool;

const DEFAULT_PRECISION: u32 = 10;
const MAX_PRECISION: u32 = 15;
const MAX_FACTORIAL: f64 = 170.0;
const MAX_EXPRESSION_LEN: usize = 4096;
const MAX_DEPTH: usize = 128;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports + - * / % ^ !, parentheses, \
         the constants pi, e and tau, and functions such as sqrt, ln, log, sin, cos, \
         round, min and max. Expects {\"expression\": string, \"precision\"?: integer}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. \"(2+3)*sqrt(16)\""
                },
                "precision": {
                    "type": "integer",
                    "description": "Number of decimal places in the result (default 10)"
                }
            },
            "required": ["expression"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| DeskError::Protocol("missing `expression` for calculator".into()))?;
        let precision = match input.get("precision") {
            None | Some(Value::Null) => DEFAULT_PRECISION,
            Some(value) => value
                .as_u64()
                .map(|p| p.min(MAX_PRECISION as u64) as u32)
                .ok_or_else(|| {
                    DeskError::Protocol(
                        "`precision` for calculator must be a non-negative integer".into(),
                    )
                })?,
        };

        match evaluate(expression) {
            Ok(result) => {
                tracing::debug!(expression, result, "calculator evaluated expression");
                Ok(json!({
                    "expression": expression,
                    "result": to_json_number(round_to(result, precision)),
                }))
            }
            Err(err) => Ok(json!({ "expression": expression, "error": err.to_string() })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character `{0}` at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero is undefined")]
    DivisionByZero,
    #[error("{0}")]
    Domain(String),
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression is {0} characters long (limit {})", MAX_EXPRESSION_LEN)]
    TooLong(usize),
    #[error("expression nests deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Parse and evaluate `expression`.
pub fn evaluate(expression: &str) -> std::result::Result<f64, ExprError> {
    let len = expression.chars().count();
    if len > MAX_EXPRESSION_LEN {
        return Err(ExprError::TooLong(len));
    }
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken(token.to_string()));
    }
    finite(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Comma,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Caret => f.write_str("^"),
            Token::Bang => f.write_str("!"),
            Token::Comma => f.write_str(","),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 1e3, 2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken(literal.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(ident.to_ascii_lowercase()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '!' => Token::Bang,
                    ',' => Token::Comma,
                    '(' | '[' => Token::LParen,
                    ')' | ']' => Token::RParen,
                    other => return Err(ExprError::UnexpectedChar(other, i)),
                };
                tokens.push(token);
                i += 1;
            }
        }
    }
    Ok(tokens)
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

    fn next(&mut self) -> Option<Token> {
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

    fn expect(&mut self, expected: Token) -> std::result::Result<(), ExprError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> std::result::Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value += self.term()?;
            } else if self.eat(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> std::result::Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value *= self.unary()?;
            } else if self.eat(&Token::Slash) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                value /= divisor;
            } else if self.eat(&Token::Percent) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // Every nesting path (parentheses, call arguments, exponents, sign runs) passes
    // through here, so this is where depth is bounded.
    fn unary(&mut self) -> std::result::Result<f64, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // Unary minus binds looser than `^`, so -2^2 == -4.
    fn signed(&mut self) -> std::result::Result<f64, ExprError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> std::result::Result<f64, ExprError> {
        let base = self.postfix()?;
        if self.eat(&Token::Caret) {
            let exponent = self.unary()?;
            return finite(base.powf(exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> std::result::Result<f64, ExprError> {
        let mut value = self.primary()?;
        while self.eat(&Token::Bang) {
            value = checked_factorial(value)?;
        }
        Ok(value)
    }

    fn primary(&mut self) -> std::result::Result<f64, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    apply(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> std::result::Result<Vec<f64>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }
}

fn constant(name: &str) -> std::result::Result<f64, ExprError> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        "tau" => Ok(std::f64::consts::TAU),
        other => Err(ExprError::UnknownIdentifier(other.to_string())),
    }
}

fn apply(name: &str, args: &[f64]) -> std::result::Result<f64, ExprError> {
    let unary = |f: fn(f64) -> f64| -> std::result::Result<f64, ExprError> {
        match args {
            [x] => finite(f(*x)),
            _ => Err(ExprError::Arity {
                name: name.to_string(),
                expected: "1",
                got: args.len(),
            }),
        }
    };

    match name {
        "sqrt" => match args {
            [x] if *x < 0.0 => Err(ExprError::Domain(
                "square root of a negative number is undefined".into(),
            )),
            _ => unary(f64::sqrt),
        },
        "cbrt" => unary(f64::cbrt),
        "abs" => unary(f64::abs),
        "exp" => unary(f64::exp),
        "ln" => positive_log(name, args, f64::ln),
        "log2" => positive_log(name, args, f64::log2),
        "log" => match args {
            [x] => positive_log(name, &[*x], f64::log10),
            [_, base] if *base <= 0.0 || *base == 1.0 => Err(ExprError::Domain(format!(
                "logarithm base must be positive and not 1, got {}",
                base
            ))),
            [x, base] => positive_log(name, &[*x], |v| v.ln()).map(|ln| ln / base.ln()),
            _ => Err(ExprError::Arity {
                name: name.to_string(),
                expected: "1 or 2",
                got: args.len(),
            }),
        },
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),
        "factorial" => match args {
            [x] => checked_factorial(*x),
            _ => Err(ExprError::Arity {
                name: name.to_string(),
                expected: "1",
                got: args.len(),
            }),
        },
        "min" | "max" if args.is_empty() => Err(ExprError::Arity {
            name: name.to_string(),
            expected: "at least 1",
            got: 0,
        }),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        other => Err(ExprError::UnknownIdentifier(other.to_string())),
    }
}

fn positive_log(
    name: &str,
    args: &[f64],
    f: fn(f64) -> f64,
) -> std::result::Result<f64, ExprError> {
    match args {
        [x] if *x <= 0.0 => Err(ExprError::Domain(format!(
            "{name} is only defined for positive numbers"
        ))),
        [x] => finite(f(*x)),
        _ => Err(ExprError::Arity {
            name: name.to_string(),
            expected: "1",
            got: args.len(),
        }),
    }
}

fn checked_factorial(value: f64) -> std::result::Result<f64, ExprError> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(ExprError::Domain(
            "factorial is only defined for non-negative integers".into(),
        ));
    }
    if value > MAX_FACTORIAL {
        return Err(ExprError::NotFinite);
    }
    Ok(factorial(value as u64))
}

fn factorial(n: u64) -> f64 {
    if n <= 1 {
        1.0
    } else {
        n as f64 * factorial(n - 1)
    }
}

fn finite(value: f64) -> std::result::Result<f64, ExprError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExprError::NotFinite)
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    if value.abs() >= 1e15 {
        return value;
    }
    let scale = 10f64.powi(precision as i32);
    let rounded = (value * scale).round() / scale;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

fn to_json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(evaluate("2+3*4").unwrap(), 14.0);
        assert_eq!(evaluate("(2+3)*4").unwrap(), 20.0);
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
        assert_eq!(evaluate("2**3").unwrap(), 8.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("2^-1").unwrap(), 0.5);
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
        assert_eq!(evaluate("5!").unwrap(), 120.0);
        assert_eq!(evaluate("1.5e3").unwrap(), 1500.0);
    }

    #[test]
    fn evaluates_the_default_prompt_expression() {
        let value = evaluate("((313*(451+293))/(4^2))+(sqrt(734))").unwrap();
        assert!(close(value, 14554.5 + 734f64.sqrt()));
        assert_eq!(value.round(), 14582.0);
    }

    #[test]
    fn supports_functions_and_constants() {
        assert!(close(evaluate("sin(pi/2)").unwrap(), 1.0));
        assert!(close(evaluate("log(1000)").unwrap(), 3.0));
        assert!(close(evaluate("log(8, 2)").unwrap(), 3.0));
        assert!(close(evaluate("ln(e)").unwrap(), 1.0));
        assert_eq!(evaluate("max(3, 9, 4)").unwrap(), 9.0);
        assert_eq!(evaluate("min(3, -9, 4)").unwrap(), -9.0);
        assert_eq!(evaluate("factorial(6)").unwrap(), 720.0);
        assert_eq!(evaluate("Round(2.5)").unwrap(), 3.0);
    }

    #[test]
    fn reports_math_and_syntax_errors() {
        assert_eq!(evaluate("1/0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(ExprError::DivisionByZero));
        assert!(matches!(evaluate("sqrt(-1)"), Err(ExprError::Domain(_))));
        assert!(matches!(evaluate("ln(0)"), Err(ExprError::Domain(_))));
        assert!(matches!(evaluate("(-3)!"), Err(ExprError::Domain(_))));
        assert_eq!(evaluate("2 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("(1+2"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("1 2"), Err(ExprError::UnexpectedToken("2".into())));
        assert_eq!(
            evaluate("foo(1)"),
            Err(ExprError::UnknownIdentifier("foo".into()))
        );
        assert_eq!(evaluate("2 $ 3"), Err(ExprError::UnexpectedChar('$', 2)));
        assert!(matches!(evaluate("sqrt(1, 2)"), Err(ExprError::Arity { .. })));
        assert_eq!(evaluate("10^400"), Err(ExprError::NotFinite));
    }

    #[tokio::test]
    async fn tool_returns_rounded_result() {
        let result = CalculatorTool
            .call(json!({"expression": "sqrt(734)", "precision": 2}))
            .await
            .unwrap();
        assert_eq!(result["result"], 27.09);
        assert_eq!(result["expression"], "sqrt(734)");
    }

    #[tokio::test]
    async fn tool_returns_integers_without_fraction() {
        let result = CalculatorTool
            .call(json!({"expression": "2+2"}))
            .await
            .unwrap();
        assert_eq!(result["result"], 4);
    }

    #[tokio::test]
    async fn tool_reports_math_errors_in_output() {
        let result = CalculatorTool
            .call(json!({"expression": "1/0"}))
            .await
            .unwrap();
        assert_eq!(result["error"], "division by zero is undefined");
        assert!(result.get("result").is_none());
    }

    #[test]
    fn bounds_nesting_depth() {
        let deep = format!("{}1{}", "(".repeat(2_000), ")".repeat(2_000));
        assert_eq!(evaluate(&deep), Err(ExprError::TooDeep));

        let signs = format!("{}1", "-".repeat(1_000));
        assert_eq!(evaluate(&signs), Err(ExprError::TooDeep));

        let tower = vec!["1"; 1_000].join("^");
        assert_eq!(evaluate(&tower), Err(ExprError::TooDeep));

        let nested_calls = format!("{}2{}", "sqrt(".repeat(500), ")".repeat(500));
        assert_eq!(evaluate(&nested_calls), Err(ExprError::TooDeep));

        let fine = format!("{}7{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&fine), Ok(7.0));
        assert_eq!(evaluate("--3"), Ok(3.0));
    }

    #[test]
    fn rejects_oversized_expressions() {
        let long = vec!["1"; 3_000].join("+");
        assert_eq!(evaluate(&long), Err(ExprError::TooLong(5_999)));
    }

    #[tokio::test]
    async fn pathological_nesting_is_reported_in_output() {
        let expression = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let result = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || evaluate(&expression))
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(result, Err(ExprError::TooLong(_))));

        let expression = format!("{}1{}", "(".repeat(1_500), ")".repeat(1_500));
        let output = CalculatorTool
            .call(json!({ "expression": expression }))
            .await
            .unwrap();
        assert_eq!(output["error"], "expression nests deeper than 128 levels");
    }

    #[tokio::test]
    async fn tool_rejects_missing_expression() {
        let err = CalculatorTool.call(json!({"expr": "1"})).await.unwrap_err();
        assert!(matches!(err, DeskError::Protocol(_)));

        let err = CalculatorTool
            .call(json!({"expression": "1", "precision": "two"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Protocol(_)));
    }
}
