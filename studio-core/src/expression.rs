//! Effectful expression evaluation.
//!
//! Actions bound to props are small statement lists such as
//! `count = count + 1; label = "clicked " + count`. The evaluator sees only
//! the boundary encoding produced by [`crate::codec`], so it can run in an
//! isolated context without sharing the engine's native values.
//!
//! Supported syntax:
//!
//! ```text
//! program   := statement ((";" | newline) statement)*
//! statement := IDENT ("=" | "+=" | "-=") expr | expr
//! expr      := or ("?" expr ":" expr)?
//! or        := and ("||" and)*
//! and       := equality ("&&" equality)*
//! equality  := compare (("==" | "!=" | "===" | "!==") compare)*
//! compare   := sum (("<" | "<=" | ">" | ">=") sum)*
//! sum       := product (("+" | "-") product)*
//! product   := unary (("*" | "/" | "%") unary)*
//! unary     := ("!" | "-") unary | postfix
//! postfix   := primary ("." IDENT | "[" expr "]")*
//! primary   := NUMBER | STRING | true | false | null | undefined
//!            | IDENT | "(" expr ")" | "[" (expr ("," expr)*)? "]"
//! ```

use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::value::Value;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The source could not be parsed.
    #[error("Parse error at {position}: {message}")]
    Parse {
        /// Byte offset of the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },
    /// An identifier is neither an argument nor a data source.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),
    /// Arguments are read-only.
    #[error("Cannot assign to argument: {0}")]
    AssignToArgument(String),
    /// Assignment target is not a declared data source.
    #[error("Cannot assign to undeclared variable: {0}")]
    UnknownTarget(String),
    /// An operator was applied to values it does not support.
    #[error("Type error: {0}")]
    Type(String),
    /// Values did not survive the boundary.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    /// The evaluator returned something other than a variables object.
    #[error("Evaluator returned {0} instead of an object")]
    BadResult(String),
}

/// Something that can execute action code against encoded values.
///
/// `args` and `values` are encoded variables objects; the result is an
/// encoded object holding only the variables the code assigned.
pub trait ExpressionEvaluator: Send + Sync {
    /// Execute `code`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] if the code fails to parse or evaluate.
    fn evaluate(&self, code: &str, args: &Json, values: &Json) -> Result<Json, ExpressionError>;
}

/// The built-in interpreter for the statement language above.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// Create an interpreter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for Interpreter {
    fn evaluate(&self, code: &str, args: &Json, values: &Json) -> Result<Json, ExpressionError> {
        let program = Parser::new(code)?.parse_program()?;
        let args = as_object(args)?;
        let mut scope = as_object(values)?.clone();
        let mut assigned = Map::new();

        for statement in &program {
            match statement {
                Statement::Assign { target, op, value } => {
                    if args.contains_key(target) {
                        return Err(ExpressionError::AssignToArgument(target.clone()));
                    }
                    let current = scope
                        .get(target)
                        .cloned()
                        .ok_or_else(|| ExpressionError::UnknownTarget(target.clone()))?;
                    let rhs = eval(value, args, &scope)?;
                    let next = match op {
                        AssignOp::Set => rhs,
                        AssignOp::Add => binary(BinaryOp::Add, &current, &rhs)?,
                        AssignOp::Sub => binary(BinaryOp::Sub, &current, &rhs)?,
                    };
                    scope.insert(target.clone(), next.clone());
                    assigned.insert(target.clone(), next);
                }
                Statement::Expr(expr) => {
                    eval(expr, args, &scope)?;
                }
            }
        }
        Ok(Json::Object(assigned))
    }
}

fn as_object(json: &Json) -> Result<&Map<String, Json>, ExpressionError> {
    json.as_object()
        .ok_or_else(|| ExpressionError::BadResult(codec::json_kind(json).to_string()))
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Assign {
        target: String,
        op: AssignOp,
        value: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Json),
    Ident(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Separator,
    End,
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "=", "<", ">", "+", "-", "*",
    "/", "%", "!", "?", ":", "(", ")", "[", "]", ".", ",",
];

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c == b'\n' || c == b';' {
            tokens.push((pos, Token::Separator));
            pos += 1;
        } else if c.is_ascii_whitespace() {
            pos += 1;
        } else if c.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &source[start..pos];
            let number = text.parse::<f64>().map_err(|_| ExpressionError::Parse {
                position: start,
                message: format!("invalid number {text}"),
            })?;
            tokens.push((start, Token::Number(number)));
        } else if c == b'"' || c == b'\'' {
            let start = pos;
            let (text, next) = lex_string(source, pos)?;
            tokens.push((start, Token::Str(text)));
            pos = next;
        } else if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let start = pos;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
            {
                pos += 1;
            }
            tokens.push((start, Token::Ident(source[start..pos].to_string())));
        } else if let Some(punct) = PUNCTUATION.iter().find(|p| source[pos..].starts_with(**p)) {
            tokens.push((pos, Token::Punct(*punct)));
            pos += punct.len();
        } else {
            return Err(ExpressionError::Parse {
                position: pos,
                message: format!("unexpected character {:?}", source[pos..].chars().next()),
            });
        }
    }
    tokens.push((source.len(), Token::End));
    Ok(tokens)
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), ExpressionError> {
    let mut chars = source[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(ExpressionError::Parse {
            position: start,
            message: "expected string".to_string(),
        });
    };
    let mut out = String::new();
    let mut escaped = false;
    for (offset, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((out, start + offset + c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    Err(ExpressionError::Parse {
        position: start,
        message: "unterminated string".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: tokenize(source)?,
            cursor: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)].1
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.cursor + offset).min(self.tokens.len() - 1)].1
    }

    fn position(&self) -> usize {
        self.tokens[self.cursor.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Token::Punct(p) if *p == punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExpressionError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected {punct}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::Parse {
            position: self.position(),
            message,
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Statement>, ExpressionError> {
        let mut statements = Vec::new();
        loop {
            while matches!(self.peek(), Token::Separator) {
                self.advance();
            }
            if matches!(self.peek(), Token::End) {
                break;
            }
            statements.push(self.parse_statement()?);
            match self.peek() {
                Token::Separator | Token::End => {}
                other => return Err(self.error(format!("unexpected {other:?}"))),
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ExpressionError> {
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.peek_at(1) {
                Token::Punct("=") => Some(AssignOp::Set),
                Token::Punct("+=") => Some(AssignOp::Add),
                Token::Punct("-=") => Some(AssignOp::Sub),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                return Ok(Statement::Assign {
                    target: name,
                    op,
                    value,
                });
            }
        }
        Ok(Statement::Expr(self.parse_expr()?))
    }

    fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.parse_binary(0)?;
        if self.eat("?") {
            let then = self.parse_expr()?;
            self.expect(":")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Ternary(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(condition)
    }

    fn binary_op(&self) -> Option<(BinaryOp, u8)> {
        let Token::Punct(p) = self.peek() else {
            return None;
        };
        let op = match *p {
            "||" => (BinaryOp::Or, 1),
            "&&" => (BinaryOp::And, 2),
            "==" | "===" => (BinaryOp::Eq, 3),
            "!=" | "!==" => (BinaryOp::Ne, 3),
            "<" => (BinaryOp::Lt, 4),
            "<=" => (BinaryOp::Le, 4),
            ">" => (BinaryOp::Gt, 4),
            ">=" => (BinaryOp::Ge, 4),
            "+" => (BinaryOp::Add, 5),
            "-" => (BinaryOp::Sub, 5),
            "*" => (BinaryOp::Mul, 6),
            "/" => (BinaryOp::Div, 6),
            "%" => (BinaryOp::Rem, 6),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.binary_op() {
            if precedence <= min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        if self.eat("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(".") {
                match self.advance() {
                    Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    other => return Err(self.error(format!("expected property, found {other:?}"))),
                }
            } else if self.eat("[") {
                let index = self.parse_expr()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(codec::encode_value(&Value::Number(n)))),
            Token::Str(s) => Ok(Expr::Literal(Json::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Json::Bool(true)),
                "false" => Expr::Literal(Json::Bool(false)),
                "null" => Expr::Literal(Json::Null),
                "undefined" => Expr::Literal(codec::encode_value(&Value::Undefined)),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let expr = self.parse_expr()?;
                self.expect(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                if !self.eat("]") {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat("]") {
                            break;
                        }
                        self.expect(",")?;
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation over encoded values
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, args: &Map<String, Json>, scope: &Map<String, Json>) -> Result<Json, ExpressionError> {
    match expr {
        Expr::Literal(json) => Ok(json.clone()),
        Expr::Ident(name) => args
            .get(name)
            .or_else(|| scope.get(name))
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, args, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Expr::Unary(UnaryOp::Not, inner) => Ok(Json::Bool(!truthy(&eval(inner, args, scope)?))),
        Expr::Unary(UnaryOp::Neg, inner) => {
            let value = eval(inner, args, scope)?;
            let n = number(&value).ok_or_else(|| type_error("-", &value))?;
            Ok(number_json(-n))
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            let left = eval(left, args, scope)?;
            if truthy(&left) {
                eval(right, args, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = eval(left, args, scope)?;
            if truthy(&left) {
                Ok(left)
            } else {
                eval(right, args, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, args, scope)?;
            let right = eval(right, args, scope)?;
            binary(*op, &left, &right)
        }
        Expr::Ternary(condition, then, otherwise) => {
            if truthy(&eval(condition, args, scope)?) {
                eval(then, args, scope)
            } else {
                eval(otherwise, args, scope)
            }
        }
        Expr::Member(target, name) => {
            let target = eval(target, args, scope)?;
            Ok(member(&target, name))
        }
        Expr::Index(target, index) => {
            let target = eval(target, args, scope)?;
            let index = eval(index, args, scope)?;
            match (&target, number(&index), index.as_str()) {
                (Json::Array(items), Some(n), _) => Ok(index_of(items, n)),
                (_, _, Some(key)) => Ok(member(&target, key)),
                _ => Err(type_error("[]", &index)),
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Json, right: &Json) -> Result<Json, ExpressionError> {
    match op {
        BinaryOp::Add => match (number(left), number(right)) {
            (Some(a), Some(b)) => Ok(number_json(a + b)),
            _ if left.is_string() || right.is_string() => {
                Ok(Json::String(format!("{}{}", display(left), display(right))))
            }
            _ => Err(type_error("+", left)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let a = number(left).ok_or_else(|| type_error("arithmetic", left))?;
            let b = number(right).ok_or_else(|| type_error("arithmetic", right))?;
            Ok(number_json(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::Eq => Ok(Json::Bool(equals(left, right))),
        BinaryOp::Ne => Ok(Json::Bool(!equals(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (number(left), number(right), left.as_str(), right.as_str()) {
                (Some(a), Some(b), _, _) => a.partial_cmp(&b),
                (_, _, Some(a), Some(b)) => Some(a.cmp(b)),
                _ => return Err(type_error("comparison", left)),
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            Ok(Json::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Json::Bool(match op {
            BinaryOp::And => truthy(left) && truthy(right),
            _ => truthy(left) || truthy(right),
        })),
    }
}

fn number(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::Object(fields) if fields.contains_key(codec::TAG_KEY) => {
            codec::decode_value(json).ok().and_then(|v| v.as_f64())
        }
        _ => None,
    }
}

fn number_json(n: f64) -> Json {
    codec::encode_value(&Value::Number(n))
}

fn is_undefined(json: &Json) -> bool {
    json.get(codec::TAG_KEY).and_then(Json::as_str) == Some("undefined")
}

fn truthy(json: &Json) -> bool {
    match json {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::String(s) => !s.is_empty(),
        Json::Array(_) => true,
        Json::Number(_) | Json::Object(_) => {
            if is_undefined(json) {
                return false;
            }
            number(json).map_or(true, |n| n != 0.0 && !n.is_nan())
        }
    }
}

fn equals(left: &Json, right: &Json) -> bool {
    match (number(left), number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn member(target: &Json, name: &str) -> Json {
    let undefined = || codec::encode_value(&Value::Undefined);
    match target {
        Json::Array(items) if name == "length" => number_json(items.len() as f64),
        Json::String(s) if name == "length" => number_json(s.chars().count() as f64),
        Json::Object(fields) if !fields.contains_key(codec::TAG_KEY) => {
            fields.get(name).cloned().unwrap_or_else(undefined)
        }
        Json::Object(fields) if fields.get(codec::TAG_KEY).and_then(Json::as_str) == Some("asset") => {
            fields.get(name).cloned().unwrap_or_else(undefined)
        }
        _ => undefined(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn index_of(items: &[Json], n: f64) -> Json {
    if n >= 0.0 && n.fract() == 0.0 {
        if let Some(item) = items.get(n as usize) {
            return item.clone();
        }
    }
    codec::encode_value(&Value::Undefined)
}

fn display(json: &Json) -> String {
    match codec::decode_value(json) {
        Ok(value) => value.to_string(),
        Err(_) => json.to_string(),
    }
}

fn type_error(op: &str, operand: &Json) -> ExpressionError {
    ExpressionError::Type(format!("{op} not supported for {}", codec::json_kind(operand)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(code: &str, args: Json, values: Json) -> Result<Json, ExpressionError> {
        Interpreter::new().evaluate(code, &args, &values)
    }

    #[test]
    fn test_increment() {
        let result = run("count = count + 1", json!({}), json!({ "count": 1.0 })).expect("eval");
        assert_eq!(result, json!({ "count": 2.0 }));
    }

    #[test]
    fn test_only_assigned_variables_returned() {
        let result = run(
            "a = 1; b += 2",
            json!({}),
            json!({ "a": 0.0, "b": 1.0, "c": "untouched" }),
        )
        .expect("eval");
        assert_eq!(result, json!({ "a": 1.0, "b": 3.0 }));
    }

    #[test]
    fn test_later_statements_see_earlier_assignments() {
        let result = run("a = 2\nb = a * 3", json!({}), json!({ "a": 0.0, "b": 0.0 }))
            .expect("eval");
        assert_eq!(result["b"], json!(6.0));
    }

    #[test]
    fn test_arguments_are_readable_not_writable() {
        let result = run("name = value", json!({ "value": "typed" }), json!({ "name": "" }))
            .expect("eval");
        assert_eq!(result["name"], "typed");

        let err = run("value = 1", json!({ "value": "x" }), json!({ "value": "" }));
        assert_eq!(err, Err(ExpressionError::AssignToArgument("value".to_string())));
    }

    #[test]
    fn test_unknown_target_and_identifier() {
        assert_eq!(
            run("missing = 1", json!({}), json!({})),
            Err(ExpressionError::UnknownTarget("missing".to_string()))
        );
        assert_eq!(
            run("a = nope", json!({}), json!({ "a": 0.0 })),
            Err(ExpressionError::UnknownIdentifier("nope".to_string()))
        );
    }

    #[test]
    fn test_string_concat_and_ternary() {
        let result = run(
            r#"label = open ? "Close " + count : 'Open'"#,
            json!({}),
            json!({ "label": "", "open": true, "count": 3.0 }),
        )
        .expect("eval");
        assert_eq!(result["label"], "Close 3");
    }

    #[test]
    fn test_member_and_index_access() {
        let result = run(
            "first = items[0]; size = items.length; city = user.address.city",
            json!({}),
            json!({
                "items": ["a", "b"],
                "first": null,
                "size": 0.0,
                "city": null,
                "user": { "address": { "city": "Oslo" } }
            }),
        )
        .expect("eval");
        assert_eq!(result["first"], "a");
        assert_eq!(result["size"], json!(2.0));
        assert_eq!(result["city"], "Oslo");
    }

    #[test]
    fn test_division_by_zero_is_tagged_infinity() {
        let result = run("x = 1 / 0", json!({}), json!({ "x": 0.0 })).expect("eval");
        assert_eq!(
            codec::decode_value(&result["x"]).expect("decode"),
            Value::Number(f64::INFINITY)
        );
    }

    #[test]
    fn test_precedence() {
        let result = run("x = 1 + 2 * 3 - 4 / 2", json!({}), json!({ "x": 0.0 })).expect("eval");
        assert_eq!(result["x"], json!(5.0));
        let result = run("x = !(1 < 2) || 2 >= 2 && 1 != 1", json!({}), json!({ "x": 0.0 }))
            .expect("eval");
        assert_eq!(result["x"], json!(false));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            run("x = (1", json!({}), json!({ "x": 0.0 })),
            Err(ExpressionError::Parse { .. })
        ));
        assert!(matches!(
            run("x = 'open", json!({}), json!({ "x": 0.0 })),
            Err(ExpressionError::Parse { .. })
        ));
        assert!(matches!(
            run("x = 1 2", json!({}), json!({ "x": 0.0 })),
            Err(ExpressionError::Parse { .. })
        ));
    }

    #[test]
    fn test_undefined_is_falsy() {
        let result = run(
            "x = maybe ? 1 : 2",
            json!({}),
            json!({ "x": 0.0, "maybe": { "$ws": "undefined" } }),
        )
        .expect("eval");
        assert_eq!(result["x"], json!(2.0));
    }
}
