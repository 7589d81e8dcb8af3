//! Binding expressions
//!
//! A binding is persisted as a short expression over control names, e.g.
//! `` `Button A` | `Axis 1+` `` or `` `XInput/0/Gamepad:Trigger L` & !`Button B` ``.
//! Parsing produces an [`Expr`] tree; binding it against a registry snapshot
//! produces a [`BoundExpression`] holding only weak control handles.
//!
//! Grammar, loosest first:
//! - `a | b`  maximum
//! - `a & b`  minimum
//! - `a + b`, `a - b`
//! - `!a` (1 - a), `-a`
//! - `( .. )`, number literals, `` `quoted name` ``, bare words

use std::sync::{Arc, Weak};
use tracing::debug;

use crate::device::registry::RegistrySnapshot;
use crate::device::{ControlKind, ControlState, DeviceQualifier, InputControl, OutputControl};
use crate::error::{InputError, Result};

/// Deepest nesting of parentheses and unary operators accepted
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Add,
    Sub,
}

impl BinaryOp {
    fn apply(self, lhs: ControlState, rhs: ControlState) -> ControlState {
        match self {
            Self::Or => lhs.max(rhs),
            Self::And => lhs.min(rhs),
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
        }
    }
}

/// Parsed, unbound expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ControlState),
    Control {
        device: Option<DeviceQualifier>,
        name: String,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Turns binding text into an expression tree
pub trait ExpressionParser: Send + Sync {
    /// `Ok(None)` means the text is blank (no binding)
    fn parse(&self, text: &str) -> Result<Option<Expr>>;
}

/// Built-in parser for the grammar described in the module docs
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleExpressionParser;

impl ExpressionParser for SimpleExpressionParser {
    fn parse(&self, text: &str) -> Result<Option<Expr>> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: text.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(parse_error(*offset, format!("unexpected {:?}", token)));
        }
        Ok(Some(expr))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Number(f64),
    Or,
    And,
    Not,
    Plus,
    Minus,
    LParen,
    RParen,
}

fn parse_error(offset: usize, message: impl Into<String>) -> InputError {
    InputError::Parse {
        offset,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let simple = match c {
            '|' => Some(Token::Or),
            '&' => Some(Token::And),
            '!' => Some(Token::Not),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(token) = simple {
            chars.next();
            tokens.push((offset, token));
            continue;
        }

        if c.is_whitespace() {
            chars.next();
        } else if c == '`' {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for (_, ch) in chars.by_ref() {
                if ch == '`' {
                    closed = true;
                    break;
                }
                name.push(ch);
            }
            if !closed {
                return Err(parse_error(offset, "unterminated quoted name"));
            }
            tokens.push((offset, Token::Name(name)));
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_ascii_digit() || ch == '.' {
                    literal.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| parse_error(offset, format!("invalid number '{}'", literal)))?;
            tokens.push((offset, Token::Number(value)));
        } else if c.is_alphanumeric() || c == '_' {
            let mut word = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((offset, Token::Name(word)));
        } else {
            return Err(parse_error(offset, format!("unexpected character '{}'", c)));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Run `f` one nesting level deeper
    fn nested(&mut self, offset: usize, f: impl FnOnce(&mut Self) -> Result<Expr>) -> Result<Expr> {
        if self.depth >= MAX_DEPTH {
            return Err(parse_error(
                offset,
                format!("nesting deeper than {} levels", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_sum()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_sum()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        if self.eat(&Token::Not) {
            let inner = self.nested(offset, Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.eat(&Token::Minus) {
            let inner = self.nested(offset, Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some((_, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(parse_error(offset, "unexpected end of expression"));
        };
        self.pos += 1;

        match token {
            Token::Number(value) => Ok(Expr::Literal(value)),
            Token::Name(name) => control_term(offset, &name),
            Token::LParen => {
                let inner = self.nested(offset, Self::parse_or)?;
                if !self.eat(&Token::RParen) {
                    return Err(parse_error(self.offset(), "expected ')'"));
                }
                Ok(inner)
            },
            other => Err(parse_error(offset, format!("unexpected {:?}", other))),
        }
    }
}

/// `name` or `source/index/device:name`
fn control_term(offset: usize, text: &str) -> Result<Expr> {
    if text.is_empty() {
        return Err(parse_error(offset, "empty control name"));
    }
    match text.rsplit_once(':') {
        Some((device, name)) if device.contains('/') => {
            let qualifier: DeviceQualifier = device
                .parse()
                .map_err(|_| parse_error(offset, format!("invalid device '{}'", device)))?;
            Ok(Expr::Control {
                device: Some(qualifier),
                name: name.to_string(),
            })
        },
        _ => Ok(Expr::Control {
            device: None,
            name: text.to_string(),
        }),
    }
}

/// Expression resolved against live devices
///
/// Holds weak handles only: a device dropped from the registry makes its
/// terms read as `0.0` instead of keeping it alive.
#[derive(Debug, Clone)]
pub enum BoundExpression {
    Literal(ControlState),
    Input(Option<Weak<InputControl>>),
    Output(Option<Weak<OutputControl>>),
    Not(Box<BoundExpression>),
    Neg(Box<BoundExpression>),
    Binary(BinaryOp, Box<BoundExpression>, Box<BoundExpression>),
}

impl BoundExpression {
    /// Resolve every control term of `expr`
    pub fn bind(
        expr: &Expr,
        snapshot: &RegistrySnapshot,
        default_device: &DeviceQualifier,
        kind: ControlKind,
    ) -> Self {
        match expr {
            Expr::Literal(v) => Self::Literal(*v),
            Expr::Not(inner) => Self::Not(Box::new(Self::bind(inner, snapshot, default_device, kind))),
            Expr::Neg(inner) => Self::Neg(Box::new(Self::bind(inner, snapshot, default_device, kind))),
            Expr::Binary(op, lhs, rhs) => Self::Binary(
                *op,
                Box::new(Self::bind(lhs, snapshot, default_device, kind)),
                Box::new(Self::bind(rhs, snapshot, default_device, kind)),
            ),
            Expr::Control { device, name } => {
                let qualifier = device.as_ref().unwrap_or(default_device);
                let found = snapshot.find(qualifier);
                if found.is_none() {
                    debug!("Device {} not found for '{}'", qualifier, name);
                }
                match kind {
                    ControlKind::Input => {
                        let input = found.and_then(|d| d.find_input(name)).map(Arc::downgrade);
                        if found.is_some() && input.is_none() {
                            debug!("Input '{}' not found on {}", name, qualifier);
                        }
                        Self::Input(input)
                    },
                    ControlKind::Output => {
                        let output = found.and_then(|d| d.find_output(name)).map(Arc::downgrade);
                        if found.is_some() && output.is_none() {
                            debug!("Output '{}' not found on {}", name, qualifier);
                        }
                        Self::Output(output)
                    },
                }
            },
        }
    }

    /// Combined value; unresolved or dropped controls read as `0.0`
    pub fn value(&self) -> ControlState {
        match self {
            Self::Literal(v) => *v,
            Self::Input(input) => input
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|i| i.get_state())
                .unwrap_or(0.0),
            Self::Output(output) => output
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|o| o.last_state())
                .unwrap_or(0.0),
            Self::Not(inner) => 1.0 - inner.value(),
            Self::Neg(inner) => -inner.value(),
            Self::Binary(op, lhs, rhs) => op.apply(lhs.value(), rhs.value()),
        }
    }

    /// Write `value` to every bound output
    pub fn set_value(&self, value: ControlState) {
        match self {
            Self::Output(Some(output)) => {
                if let Some(output) = output.upgrade() {
                    output.set_state(value);
                }
            },
            Self::Not(inner) | Self::Neg(inner) => inner.set_value(value),
            Self::Binary(_, lhs, rhs) => {
                lhs.set_value(value);
                rhs.set_value(value);
            },
            _ => {},
        }
    }

    /// Number of control terms that resolved to a live control
    pub fn bound_count(&self) -> usize {
        match self {
            Self::Literal(_) => 0,
            Self::Input(i) => usize::from(i.as_ref().is_some_and(|w| w.strong_count() > 0)),
            Self::Output(o) => usize::from(o.as_ref().is_some_and(|w| w.strong_count() > 0)),
            Self::Not(inner) | Self::Neg(inner) => inner.bound_count(),
            Self::Binary(_, lhs, rhs) => lhs.bound_count() + rhs.bound_count(),
        }
    }
}
