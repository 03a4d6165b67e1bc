//! Response validation without evaluating user text as code.
//!
//! The user-typed expression is parsed into a small fixed grammar and
//! interpreted: literals, `status` / `data.…` / `headers.…` / `response.…`
//! accessors, comparisons and boolean operators. Nothing else.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::extract::extract;
use crate::node::ResponseData;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("eval error: {0}")]
    Eval(String),
}

/// Result of checking a response against a node's validation spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub status_valid: bool,
    pub custom_valid: bool,
    /// Set when the expression could not be parsed or evaluated; the node
    /// is then reported invalid rather than failing the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Check `expected_status` and the custom expression against a response.
/// `extract_path` shifts what the expression's `data` accessor addresses:
/// `data` sees the extracted value while `response` stays the whole body.
/// A broken expression degrades to `custom_valid = false` with a detail
/// message; it never aborts execution.
pub fn validate_response(
    expected_status: Option<u16>,
    expression: &str,
    extract_path: &str,
    response: &ResponseData,
) -> ValidationOutcome {
    let status_valid = expected_status.is_none_or(|want| response.status == want);

    let (custom_valid, detail) = if expression.trim().is_empty() {
        (true, None)
    } else {
        match evaluate_at(expression, response, extract_path) {
            Ok(verdict) => (verdict, None),
            Err(err) => (false, Some(err.to_string())),
        }
    };

    ValidationOutcome {
        is_valid: status_valid && custom_valid,
        status_valid,
        custom_valid,
        detail,
    }
}

/// Evaluate an expression like `status == 200 && data.count > 3` against a
/// response. The result must be a boolean.
pub fn evaluate(expression: &str, response: &ResponseData) -> Result<bool, ExprError> {
    evaluate_at(expression, response, "")
}

/// Like [`evaluate`], with the expression's `data` accessor rooted at
/// `extract_path` inside the response body.
pub fn evaluate_at(
    expression: &str,
    response: &ResponseData,
    extract_path: &str,
) -> Result<bool, ExprError> {
    let expr = parse(expression)?;
    let ctx = EvalContext {
        response,
        data_root: extract(&response.data, extract_path)
            .cloned()
            .unwrap_or(Value::Null),
    };
    match eval(&expr, &ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Eval(format!(
            "expression result is not a boolean: {other}"
        ))),
    }
}

/// Parse-check an expression without evaluating it. An empty expression is
/// fine; it means "status check only".
pub fn check_expression(expression: &str) -> Result<(), ExprError> {
    if expression.trim().is_empty() {
        return Ok(());
    }
    parse(expression).map(|_| ())
}

fn parse(expression: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

struct EvalContext<'a> {
    response: &'a ResponseData,
    /// What `data` addresses: the body, or the extracted value when the
    /// node declares an extract path.
    data_root: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Path(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
}

fn is_path_char(c: char) -> bool {
    // Header names carry dashes, paths carry dots and indices.
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.next() == Some('=') {
                    tokens.push(Token::Eq);
                } else {
                    return Err(ExprError::Parse("single '=' is not an operator".into()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.next() == Some('&') {
                    tokens.push(Token::And);
                } else {
                    return Err(ExprError::Parse("single '&' is not an operator".into()));
                }
            }
            '|' => {
                chars.next();
                if chars.next() == Some('|') {
                    tokens.push(Token::Or);
                } else {
                    return Err(ExprError::Parse("single '|' is not an operator".into()));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => text.push(ch),
                        None => return Err(ExprError::Parse("unterminated string".into())),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = text
                    .parse()
                    .map_err(|_| ExprError::Parse(format!("bad number `{text}`")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&p) = chars.peek() {
                    if is_path_char(p) {
                        text.push(p);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Path(text));
            }
            other => {
                return Err(ExprError::Parse(format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Accessor(String),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
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
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_cmp()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_cmp()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_unary()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.next();
                match self.next() {
                    Some(Token::Number(n)) => Ok(Expr::Literal(json!(-n))),
                    _ => Err(ExprError::Parse("`-` must precede a number".into())),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(json!(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Path(p)) => match p.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => Ok(Expr::Accessor(p)),
            },
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::Parse("missing closing parenthesis".into())),
                }
            }
            other => Err(ExprError::Parse(format!("unexpected token {other:?}"))),
        }
    }
}

fn resolve_accessor(path: &str, ctx: &EvalContext<'_>) -> Value {
    if path == "status" {
        return json!(ctx.response.status);
    }
    if path == "statusText" || path == "status_text" {
        return Value::String(ctx.response.status_text.clone());
    }
    let (root, rest) = match path.split_once('.') {
        Some((root, rest)) => (root, rest),
        None => (path, ""),
    };
    match root {
        "headers" => {
            if rest.is_empty() {
                json!(ctx.response.headers)
            } else {
                ctx.response
                    .headers
                    .get(rest)
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null)
            }
        }
        // `data` is the extracted value (or the body when no extract path
        // is set); `response` always addresses the whole body.
        "data" => extract(&ctx.data_root, rest).cloned().unwrap_or(Value::Null),
        "response" => extract(&ctx.response.data, rest)
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn as_bool(value: &Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ExprError::Eval(format!("`{other}` is not a boolean"))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(values_equal(left, right)),
        CmpOp::Ne => Ok(!values_equal(left, right)),
        _ => {
            let ord = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let ord = ord.ok_or_else(|| {
                ExprError::Eval(format!("`{left}` and `{right}` are not comparable"))
            })?;
            Ok(match op {
                CmpOp::Lt => ord.is_lt(),
                CmpOp::Le => ord.is_le(),
                CmpOp::Gt => ord.is_gt(),
                CmpOp::Ge => ord.is_ge(),
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        // 200 and 200.0 are the same status code.
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Accessor(path) => Ok(resolve_accessor(path, ctx)),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(&eval(inner, ctx)?)?)),
        Expr::Cmp(op, left, right) => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            Ok(Value::Bool(compare(*op, &l, &r)?))
        }
        Expr::And(left, right) => {
            if !as_bool(&eval(left, ctx)?)? {
                return Ok(Value::Bool(false));
            }
            eval(right, ctx)
        }
        Expr::Or(left, right) => {
            if as_bool(&eval(left, ctx)?)? {
                return Ok(Value::Bool(true));
            }
            eval(right, ctx)
        }
    }
}
