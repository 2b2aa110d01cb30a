//! Filter expression language
//!
//! Each `-f` argument is compiled ahead of time into a small expression AST
//! evaluated against the current message, which is bound to the single name
//! `msg`. The language is a boolean/comparison subset: field and index
//! access on `msg`, literals, `== != < <= > >=`, `&& || !`, and parentheses.
//!
//! Evaluation is pure and fully sandboxed: an expression sees nothing but the
//! message value. Syntax errors surface at compile time (startup); runtime
//! problems such as reading a field through an absent value surface as an
//! [`EvalFault`] per message.
//!
//! Semantics notes:
//!
//! - `msg.x` with `x` absent yields the distinguished *missing* value;
//!   `msg.x.y` then faults (reading a field of missing).
//! - *missing*, `null`, `false`, `0`, `NaN`, and `""` are falsy; everything
//!   else, including empty objects and arrays, is truthy.
//! - `==` is deep structural equality; numbers compare numerically across
//!   integer/float representations; *missing* equals only *missing*.
//! - Ordering operators are defined for number/number and string/string
//!   pairs only; any other combination faults.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Compile-time errors for a filter expression
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),

    #[error("unknown identifier {0:?} (the message is bound to \"msg\")")]
    UnknownIdent(String),

    #[error("trailing input after expression, starting at `{0}`")]
    TrailingInput(String),
}

/// Runtime evaluation faults, reported per message and never fatal
#[derive(Error, Debug)]
pub enum EvalFault {
    #[error("cannot read field {field:?} of {of}")]
    FieldAccess { field: String, of: &'static str },

    #[error("cannot index {of} with [{index}]")]
    IndexAccess { index: usize, of: &'static str },

    #[error("cannot compare {lhs} {op} {rhs}")]
    Uncomparable {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Num(n) => write!(f, "{n}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Dot => write!(f, "."),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
        }
    }
}

fn lex(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
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
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '"' | '\'' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            '-' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let (n, next) = lex_number(&chars, i)?;
                tokens.push(Token::Num(n));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (n, next) = lex_number(&chars, i)?;
                tokens.push(Token::Num(n));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

/// Lex a quoted string starting at `start` (the opening quote). Returns the
/// unescaped contents and the index past the closing quote.
fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1).ok_or(ExprError::UnterminatedString)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(ExprError::UnterminatedString)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), ExprError> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if chars.get(j) == Some(&'+') || chars.get(j) == Some(&'-') {
            j += 1;
        }
        if chars.get(j).is_some_and(|d| d.is_ascii_digit()) {
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    let n = text
        .parse::<f64>()
        .map_err(|_| ExprError::InvalidNumber(text))?;
    Ok((n, i))
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Lit {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

/// One step of a `msg.a.b[0]` access path
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Lit),
    Path(Vec<Step>),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Result<(), ExprError> {
        let got = self.next()?;
        if got == tok {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(got.to_string()))
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExprError::TrailingInput(tok.to_string())),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_cmp()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Comparisons do not chain: `a < b < c` is a syntax error.
    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_unary()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Bang) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Str(s) => Ok(Expr::Literal(Lit::Str(s))),
            Token::Num(n) => Ok(Expr::Literal(Lit::Num(n))),
            Token::True => Ok(Expr::Literal(Lit::Bool(true))),
            Token::False => Ok(Expr::Literal(Lit::Bool(false))),
            Token::Null => Ok(Expr::Literal(Lit::Null)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if name == "msg" => {
                let steps = self.parse_steps()?;
                Ok(Expr::Path(steps))
            }
            Token::Ident(name) => Err(ExprError::UnknownIdent(name)),
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }

    fn parse_steps(&mut self) -> Result<Vec<Step>, ExprError> {
        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.next()? {
                    Token::Ident(name) => steps.push(Step::Field(name)),
                    // `msg.true` style accesses are allowed, as in JS member
                    // access for keyword-shaped names
                    Token::True => steps.push(Step::Field("true".to_string())),
                    Token::False => steps.push(Step::Field("false".to_string())),
                    Token::Null => steps.push(Step::Field("null".to_string())),
                    other => return Err(ExprError::UnexpectedToken(other.to_string())),
                }
            } else if self.eat(&Token::LBracket) {
                match self.next()? {
                    Token::Str(key) => steps.push(Step::Field(key)),
                    Token::Num(n) if n >= 0.0 && n.fract() == 0.0 => {
                        steps.push(Step::Index(n as usize));
                    }
                    other => return Err(ExprError::UnexpectedToken(other.to_string())),
                }
                self.expect(Token::RBracket)?;
            } else {
                return Ok(steps);
            }
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// A scalar view of an evaluated subexpression. `Missing` models access to an
/// absent field, distinct from JSON `null`.
#[derive(Debug, Clone, Copy)]
enum EvalValue<'a> {
    Missing,
    Null,
    Bool(bool),
    Num(f64),
    Str(&'a str),
    Json(&'a Value),
}

impl<'a> EvalValue<'a> {
    fn from_json(v: &'a Value) -> Self {
        match v {
            Value::Null => EvalValue::Null,
            Value::Bool(b) => EvalValue::Bool(*b),
            Value::Number(n) => EvalValue::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => EvalValue::Str(s),
            other => EvalValue::Json(other),
        }
    }

    fn from_lit(l: &'a Lit) -> Self {
        match l {
            Lit::Null => EvalValue::Null,
            Lit::Bool(b) => EvalValue::Bool(*b),
            Lit::Num(n) => EvalValue::Num(*n),
            Lit::Str(s) => EvalValue::Str(s),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            EvalValue::Missing | EvalValue::Null => false,
            EvalValue::Bool(b) => *b,
            EvalValue::Num(n) => *n != 0.0 && !n.is_nan(),
            EvalValue::Str(s) => !s.is_empty(),
            EvalValue::Json(_) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            EvalValue::Missing => "missing",
            EvalValue::Null => "null",
            EvalValue::Bool(_) => "boolean",
            EvalValue::Num(_) => "number",
            EvalValue::Str(_) => "string",
            EvalValue::Json(Value::Array(_)) => "array",
            EvalValue::Json(_) => "object",
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk an access path from the message root. An absent object field yields
/// `Missing`; any step applied to a missing or non-container value faults.
fn resolve<'a>(msg: &'a Value, steps: &[Step]) -> Result<EvalValue<'a>, EvalFault> {
    let mut cur: Option<&'a Value> = Some(msg);
    for step in steps {
        cur = match (step, cur) {
            (Step::Field(name), Some(Value::Object(map))) => map.get(name),
            (Step::Field(name), Some(v)) => {
                return Err(EvalFault::FieldAccess {
                    field: name.clone(),
                    of: json_type_name(v),
                });
            }
            (Step::Field(name), None) => {
                return Err(EvalFault::FieldAccess {
                    field: name.clone(),
                    of: "missing",
                });
            }
            (Step::Index(i), Some(Value::Array(items))) => items.get(*i),
            (Step::Index(i), Some(v)) => {
                return Err(EvalFault::IndexAccess {
                    index: *i,
                    of: json_type_name(v),
                });
            }
            (Step::Index(i), None) => {
                return Err(EvalFault::IndexAccess {
                    index: *i,
                    of: "missing",
                });
            }
        };
    }
    Ok(match cur {
        Some(v) => EvalValue::from_json(v),
        None => EvalValue::Missing,
    })
}

fn values_equal(a: &EvalValue<'_>, b: &EvalValue<'_>) -> bool {
    match (a, b) {
        (EvalValue::Missing, EvalValue::Missing) => true,
        (EvalValue::Null, EvalValue::Null) => true,
        (EvalValue::Bool(x), EvalValue::Bool(y)) => x == y,
        (EvalValue::Num(x), EvalValue::Num(y)) => x == y,
        (EvalValue::Str(x), EvalValue::Str(y)) => x == y,
        (EvalValue::Json(x), EvalValue::Json(y)) => x == y,
        _ => false,
    }
}

fn values_ordered(op: &CmpOp, a: &EvalValue<'_>, b: &EvalValue<'_>) -> Result<bool, EvalFault> {
    use std::cmp::Ordering;

    let ord = match (*a, *b) {
        (EvalValue::Num(x), EvalValue::Num(y)) => x.partial_cmp(&y),
        (EvalValue::Str(x), EvalValue::Str(y)) => Some(x.cmp(y)),
        _ => {
            return Err(EvalFault::Uncomparable {
                op: op.symbol(),
                lhs: a.type_name(),
                rhs: b.type_name(),
            });
        }
    };

    // NaN compares false under every ordering operator
    let Some(ord) = ord else { return Ok(false) };
    Ok(match op {
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!("equality handled separately"),
    })
}

fn eval_expr<'a>(expr: &'a Expr, msg: &'a Value) -> Result<EvalValue<'a>, EvalFault> {
    match expr {
        Expr::Literal(l) => Ok(EvalValue::from_lit(l)),
        Expr::Path(steps) => resolve(msg, steps),
        Expr::Not(inner) => Ok(EvalValue::Bool(!eval_expr(inner, msg)?.truthy())),
        Expr::And(lhs, rhs) => {
            if !eval_expr(lhs, msg)?.truthy() {
                Ok(EvalValue::Bool(false))
            } else {
                Ok(EvalValue::Bool(eval_expr(rhs, msg)?.truthy()))
            }
        }
        Expr::Or(lhs, rhs) => {
            if eval_expr(lhs, msg)?.truthy() {
                Ok(EvalValue::Bool(true))
            } else {
                Ok(EvalValue::Bool(eval_expr(rhs, msg)?.truthy()))
            }
        }
        Expr::Cmp(op, lhs, rhs) => {
            let a = eval_expr(lhs, msg)?;
            let b = eval_expr(rhs, msg)?;
            let result = match op {
                CmpOp::Eq => values_equal(&a, &b),
                CmpOp::Ne => !values_equal(&a, &b),
                other => values_ordered(other, &a, &b)?,
            };
            Ok(EvalValue::Bool(result))
        }
    }
}

// =============================================================================
// Predicate
// =============================================================================

/// One compiled filter expression, reusable across messages.
#[derive(Debug)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    /// Compile an expression string. Errors surface here, at startup, never
    /// at first use.
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = lex(source)?;
        let expr = Parser::new(tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The original expression text, for diagnostics.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one message, returning the truthiness of the result.
    pub fn eval(&self, msg: &Value) -> Result<bool, EvalFault> {
        Ok(eval_expr(&self.expr, msg)?.truthy())
    }
}

#[cfg(test)]
#[path = "expr_test.rs"]
mod expr_test;
