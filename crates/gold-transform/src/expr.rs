//! Sandboxed arithmetic expressions for derived parameters.
//!
//! The grammar is deliberately small: numeric literals, column references,
//! `+ - * / % **`, parentheses, unary minus and a fixed set of functions.
//! Nothing else can be expressed, so a formula can never run arbitrary code.
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := ("-" | "+") unary | power
//! power   := primary ("**" unary)?
//! primary := number | column | call | "(" expr ")"
//! column  := "$[" (string | digits) "]" | identifier
//! call    := ("abs" | "sqrt" | "log" | "exp" | "min" | "max") "(" expr ("," expr)* ")"
//! ```
//!
//! Evaluation is elementwise over columns with scalar broadcasting. A
//! missing operand yields a missing result, and so does any non-finite
//! result (division by zero, `log` of a negative value).

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use gold_model::ColumnRef;

/// Formula parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unterminated string starting at position {pos}")]
    UnterminatedString { pos: usize },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("column '{reference}' is not available")]
    UnknownColumn { reference: String },

    #[error("operands have different lengths ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            // Floored modulo: the result takes the sign of the divisor.
            Self::Rem => a - b * (a / b).floor(),
            Self::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Log,
    Exp,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Self::Abs),
            "sqrt" => Some(Self::Sqrt),
            "log" => Some(Self::Log),
            "exp" => Some(Self::Exp),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Log => "log",
            Self::Exp => "exp",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    fn check_arity(self, found: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            Self::Min | Self::Max => (found >= 2, "2 or more"),
            _ => (found == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                name: self.name().to_string(),
                expected,
                found,
            })
        }
    }
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Column(ColumnRef),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

/// Source of column values during evaluation.
pub trait ColumnSource {
    fn values(&self, reference: &ColumnRef) -> Option<&[Option<f64>]>;
}

/// Columns keyed by [`ColumnRef::key`].
impl ColumnSource for HashMap<String, Vec<Option<f64>>> {
    fn values(&self, reference: &ColumnRef) -> Option<&[Option<f64>]> {
        self.get(&reference.key()).map(Vec::as_slice)
    }
}

/// Parse a formula.
///
/// ```
/// use gold_transform::expr::parse;
///
/// let expr = parse(r#"$["PaO2"] / $["FiO2"] * 100"#).unwrap();
/// assert_eq!(expr.references().len(), 2);
/// assert!(parse("__import__('os')").is_err());
/// ```
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some((token, pos)) => Err(ExprError::UnexpectedToken {
            found: token.to_string(),
            pos: *pos,
        }),
    }
}

enum Value {
    Scalar(Option<f64>),
    Vector(Vec<Option<f64>>),
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl Expr {
    /// Column references in order of first appearance.
    pub fn references(&self) -> Vec<ColumnRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut Vec<ColumnRef>) {
        match self {
            Self::Number(_) => {}
            Self::Column(reference) => {
                if !refs.contains(reference) {
                    refs.push(reference.clone());
                }
            }
            Self::Neg(inner) => inner.collect_refs(refs),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(refs);
                rhs.collect_refs(refs);
            }
            Self::Call { args, .. } => args.iter().for_each(|arg| arg.collect_refs(refs)),
        }
    }

    /// Evaluate over `height` rows. A formula without column references is
    /// broadcast to every row.
    pub fn evaluate(
        &self,
        source: &impl ColumnSource,
        height: usize,
    ) -> Result<Vec<Option<f64>>, ExprError> {
        Ok(match self.eval(source)? {
            Value::Scalar(v) => vec![v; height],
            Value::Vector(values) => values,
        })
    }

    fn eval(&self, source: &impl ColumnSource) -> Result<Value, ExprError> {
        match self {
            Self::Number(v) => Ok(Value::Scalar(finite(*v))),
            Self::Column(reference) => source
                .values(reference)
                .map(|values| Value::Vector(values.to_vec()))
                .ok_or_else(|| ExprError::UnknownColumn {
                    reference: reference.to_string(),
                }),
            Self::Neg(inner) => Ok(map_unary(inner.eval(source)?, |v| Some(-v))),
            Self::Binary { op, lhs, rhs } => {
                let op = *op;
                combine(lhs.eval(source)?, rhs.eval(source)?, |a, b| {
                    finite(op.apply(a, b))
                })
            }
            Self::Call { func, args } => {
                let mut values = args.iter().map(|arg| arg.eval(source));
                let first = values.next().ok_or(ExprError::UnexpectedEnd)??;
                match func {
                    Function::Abs => Ok(map_unary(first, |v| Some(v.abs()))),
                    Function::Sqrt => Ok(map_unary(first, |v| finite(v.sqrt()))),
                    Function::Log => Ok(map_unary(first, |v| finite(v.ln()))),
                    Function::Exp => Ok(map_unary(first, |v| finite(v.exp()))),
                    Function::Min | Function::Max => {
                        let pick: fn(f64, f64) -> f64 =
                            if *func == Function::Min { f64::min } else { f64::max };
                        values.try_fold(first, |acc, next| {
                            combine(acc, next?, |a, b| Some(pick(a, b)))
                        })
                    }
                }
            }
        }
    }
}

fn map_unary(value: Value, f: impl Fn(f64) -> Option<f64>) -> Value {
    match value {
        Value::Scalar(v) => Value::Scalar(v.and_then(&f)),
        Value::Vector(values) => Value::Vector(values.into_iter().map(|v| v.and_then(&f)).collect()),
    }
}

fn combine(
    lhs: Value,
    rhs: Value,
    f: impl Fn(f64, f64) -> Option<f64>,
) -> Result<Value, ExprError> {
    let apply = |a: Option<f64>, b: Option<f64>| f(a?, b?);
    Ok(match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(apply(a, b)),
        (Value::Vector(a), Value::Scalar(b)) => {
            Value::Vector(a.into_iter().map(|x| apply(x, b)).collect())
        }
        (Value::Scalar(a), Value::Vector(b)) => {
            Value::Vector(b.into_iter().map(|y| apply(a, y)).collect())
        }
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() != b.len() {
                return Err(ExprError::LengthMismatch {
                    left: a.len(),
                    right: b.len(),
                });
            }
            Value::Vector(a.into_iter().zip(b).map(|(x, y)| apply(x, y)).collect())
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64, String),
    Ident(String),
    Str(String),
    Dollar,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(_, raw) => write!(f, "number {raw}"),
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Str(text) => write!(f, "string \"{text}\""),
            Self::Dollar => f.write_str("'$'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::StarStar => f.write_str("'**'"),
            Self::Slash => f.write_str("'/'"),
            Self::Percent => f.write_str("'%'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let start = i;
        let token = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '$' => Token::Dollar,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::StarStar
            }
            '*' => Token::Star,
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ch)
                    .ok_or(ExprError::UnterminatedString { pos: start })?;
                let text: String = chars[i + 1..i + 1 + close].iter().collect();
                i += close + 1;
                Token::Str(text)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                if end < chars.len() && matches!(chars[end], 'e' | 'E') {
                    let mut exp = end + 1;
                    if exp < chars.len() && matches!(chars[exp], '+' | '-') {
                        exp += 1;
                    }
                    if exp < chars.len() && chars[exp].is_ascii_digit() {
                        while exp < chars.len() && chars[exp].is_ascii_digit() {
                            exp += 1;
                        }
                        end = exp;
                    }
                }
                let raw: String = chars[i..end].iter().collect();
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar { ch, pos: start })?;
                i = end - 1;
                Token::Number(value, raw)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || matches!(chars[end], '_' | '.'))
                {
                    end += 1;
                }
                let name: String = chars[i..end].iter().collect();
                i = end - 1;
                Token::Ident(name)
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, pos: start }),
        };
        tokens.push((token, start));
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<(Token, usize), ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(token, _)| token == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        let (token, pos) = self.next()?;
        if &token == expected {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                pos,
            })
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash) {
                BinaryOp::Div
            } else if self.eat(&Token::Percent) {
                BinaryOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let (token, pos) = self.next()?;
        match token {
            Token::Number(value, _) => Ok(Expr::Number(value)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Dollar => {
                self.expect(&Token::LBracket)?;
                let reference = match self.next()? {
                    (Token::Str(name), _) => ColumnRef::parse(&name),
                    (Token::Number(_, raw), _) => ColumnRef::parse(&raw),
                    (other, pos) => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.to_string(),
                            pos,
                        });
                    }
                };
                self.expect(&Token::RBracket)?;
                Ok(Expr::Column(reference))
            }
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Column(ColumnRef::Name(name)));
                }
                let func =
                    Function::from_name(&name).ok_or(ExprError::UnknownFunction { name })?;
                let mut args = vec![self.expr()?];
                while self.eat(&Token::Comma) {
                    args.push(self.expr()?);
                }
                self.expect(&Token::RParen)?;
                func.check_arity(args.len())?;
                Ok(Expr::Call { func, args })
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                pos,
            }),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
