//! Boolean filter expressions over the traversal context.
//!
//! Supported syntax:
//! - string literals in single or double quotes, `true`, `false`
//! - the variables `Datacenter` and `Cluster`
//! - `==`, `!=`, `in [..]`, `not in [..]`
//! - `matches`, `startsWith`, `endsWith`, `contains`
//! - `&&` / `and`, `||` / `or`, `!` / `not`, parentheses
//!
//! Expressions are type checked when compiled. The only failure left for
//! evaluation time is a `matches` pattern that is not a literal and turns out
//! not to be a valid regular expression.

use regex::Regex;
use std::fmt;

/// Values of the two variables for one candidate node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterContext<'a> {
    pub datacenter: &'a str,
    pub cluster: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
            Token::Eq => f.write_str("=="),
            Token::Ne => f.write_str("!="),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            ',' => tokens.push(Token::Comma),
            '=' => match chars.next() {
                Some((_, '=')) => tokens.push(Token::Eq),
                _ => return Err(format!("expected '==' at offset {pos}")),
            },
            '!' => {
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push(Token::And),
                _ => return Err(format!("expected '&&' at offset {pos}")),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push(Token::Or),
                _ => return Err(format!("expected '||' at offset {pos}")),
            },
            '\'' | '"' => {
                let quote = c;
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => literal.push(escaped),
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => literal.push(c),
                    }
                }
                if !closed {
                    return Err(format!("unterminated string starting at offset {pos}"));
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = c.to_string();
                while let Some((_, c)) = chars.peek() {
                    if c.is_alphanumeric() || *c == '_' {
                        ident.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(ident),
                });
            }
            c => return Err(format!("unexpected character {c:?} at offset {pos}")),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Datacenter,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrOp {
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Bool,
    Str,
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::Bool => "bool",
            Ty::Str => "string",
        })
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Literal(Regex),
    Dynamic(Box<Node>),
}

#[derive(Debug, Clone)]
enum Node {
    Bool(bool),
    Str(String),
    Var(Var),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Eq(Box<Node>, Box<Node>, bool),
    In(Box<Node>, Vec<Node>, bool),
    StrOp(StrOp, Box<Node>, Box<Node>),
    Matches(Box<Node>, Pattern),
}

/// Deepest allowed nesting of parentheses and negations.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    fn nest<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, String>,
    ) -> Result<T, String> {
        if self.depth == MAX_NESTING {
            return Err(format!("expression nested deeper than {MAX_NESTING} levels"));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(format!("expected '{expected}', found '{t}'")),
            None => Err(format!("expected '{expected}', found end of input")),
        }
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.nest(Self::parse_unary)?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, String> {
        let lhs = self.parse_primary()?;
        let node = match self.peek() {
            Some(Token::Eq) | Some(Token::Ne) => {
                let negated = self.advance() == Some(Token::Ne);
                Node::Eq(Box::new(lhs), Box::new(self.parse_primary()?), negated)
            }
            Some(Token::Not) if self.peek_at(1) == Some(&Token::Ident("in".to_string())) => {
                self.pos += 2;
                Node::In(Box::new(lhs), self.parse_list()?, true)
            }
            Some(Token::Ident(op)) => match op.as_str() {
                "in" => {
                    self.advance();
                    Node::In(Box::new(lhs), self.parse_list()?, false)
                }
                "matches" => {
                    self.advance();
                    let pattern = match self.parse_primary()? {
                        Node::Str(raw) => Pattern::Literal(
                            Regex::new(&raw).map_err(|e| format!("invalid regex {raw:?}: {e}"))?,
                        ),
                        other => Pattern::Dynamic(Box::new(other)),
                    };
                    Node::Matches(Box::new(lhs), pattern)
                }
                "startsWith" | "endsWith" | "contains" => {
                    let op = match op.as_str() {
                        "startsWith" => StrOp::StartsWith,
                        "endsWith" => StrOp::EndsWith,
                        _ => StrOp::Contains,
                    };
                    self.advance();
                    Node::StrOp(op, Box::new(lhs), Box::new(self.parse_primary()?))
                }
                _ => lhs,
            },
            _ => lhs,
        };
        Ok(node)
    }

    fn parse_list(&mut self) -> Result<Vec<Node>, String> {
        self.expect(Token::LBracket)?;
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_primary()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => return Ok(items),
                Some(t) => return Err(format!("expected ',' or ']', found '{t}'")),
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Node, String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Node::Str(s)),
            Some(Token::LParen) => self.nest(|p| {
                let inner = p.parse_or()?;
                p.expect(Token::RParen)?;
                Ok(inner)
            }),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Node::Bool(true)),
                "false" => Ok(Node::Bool(false)),
                "Datacenter" => Ok(Node::Var(Var::Datacenter)),
                "Cluster" => Ok(Node::Var(Var::Cluster)),
                other => Err(format!("unknown identifier '{other}'")),
            },
            Some(t) => Err(format!("unexpected '{t}'")),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

impl Node {
    fn check(&self) -> Result<Ty, String> {
        let want = |node: &Node, ty: Ty, what: &str| -> Result<(), String> {
            let actual = node.check()?;
            if actual == ty {
                Ok(())
            } else {
                Err(format!("{what} expects {ty}, found {actual}"))
            }
        };
        match self {
            Node::Bool(_) => Ok(Ty::Bool),
            Node::Str(_) | Node::Var(_) => Ok(Ty::Str),
            Node::Not(inner) => want(inner, Ty::Bool, "'!'").map(|_| Ty::Bool),
            Node::And(l, r) | Node::Or(l, r) => {
                want(l, Ty::Bool, "logical operator")?;
                want(r, Ty::Bool, "logical operator").map(|_| Ty::Bool)
            }
            Node::Eq(l, r, _) => {
                let lt = l.check()?;
                want(r, lt, "comparison").map(|_| Ty::Bool)
            }
            Node::In(needle, list, _) => {
                let ty = needle.check()?;
                for item in list {
                    want(item, ty, "'in'")?;
                }
                Ok(Ty::Bool)
            }
            Node::StrOp(_, l, r) => {
                want(l, Ty::Str, "string operator")?;
                want(r, Ty::Str, "string operator").map(|_| Ty::Bool)
            }
            Node::Matches(l, pattern) => {
                want(l, Ty::Str, "'matches'")?;
                if let Pattern::Dynamic(p) = pattern {
                    want(p, Ty::Str, "'matches'")?;
                }
                Ok(Ty::Bool)
            }
        }
    }

    fn eval_str<'a>(&'a self, ctx: &FilterContext<'a>) -> Result<&'a str, String> {
        match self {
            Node::Str(s) => Ok(s),
            Node::Var(Var::Datacenter) => Ok(ctx.datacenter),
            Node::Var(Var::Cluster) => Ok(ctx.cluster),
            _ => Err("expected a string operand".to_string()),
        }
    }

    fn eval_bool(&self, ctx: &FilterContext<'_>) -> Result<bool, String> {
        match self {
            Node::Bool(b) => Ok(*b),
            Node::Not(inner) => Ok(!inner.eval_bool(ctx)?),
            Node::And(l, r) => Ok(l.eval_bool(ctx)? && r.eval_bool(ctx)?),
            Node::Or(l, r) => Ok(l.eval_bool(ctx)? || r.eval_bool(ctx)?),
            Node::Eq(l, r, negated) => {
                let equal = match l.check()? {
                    Ty::Bool => l.eval_bool(ctx)? == r.eval_bool(ctx)?,
                    Ty::Str => l.eval_str(ctx)? == r.eval_str(ctx)?,
                };
                Ok(equal != *negated)
            }
            Node::In(needle, list, negated) => {
                let mut found = false;
                match needle.check()? {
                    Ty::Bool => {
                        let value = needle.eval_bool(ctx)?;
                        for item in list {
                            found |= item.eval_bool(ctx)? == value;
                        }
                    }
                    Ty::Str => {
                        let value = needle.eval_str(ctx)?;
                        for item in list {
                            found |= item.eval_str(ctx)? == value;
                        }
                    }
                }
                Ok(found != *negated)
            }
            Node::StrOp(op, l, r) => {
                let (l, r) = (l.eval_str(ctx)?, r.eval_str(ctx)?);
                Ok(match op {
                    StrOp::StartsWith => l.starts_with(r),
                    StrOp::EndsWith => l.ends_with(r),
                    StrOp::Contains => l.contains(r),
                })
            }
            Node::Matches(l, pattern) => {
                let subject = l.eval_str(ctx)?;
                match pattern {
                    Pattern::Literal(re) => Ok(re.is_match(subject)),
                    Pattern::Dynamic(p) => {
                        let raw = p.eval_str(ctx)?;
                        let re = Regex::new(raw)
                            .map_err(|e| format!("invalid regex {raw:?}: {e}"))?;
                        Ok(re.is_match(subject))
                    }
                }
            }
            Node::Str(_) | Node::Var(_) => Err("expected a boolean operand".to_string()),
        }
    }
}

/// A compiled, type-checked filter expression.
#[derive(Debug, Clone)]
pub struct Expression {
    root: Node,
}

impl Expression {
    /// Parse and type check `source`. The result must be boolean.
    pub fn compile(source: &str) -> Result<Self, String> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(tokens);
        let root = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(format!("unexpected '{extra}' after expression"));
        }
        match root.check()? {
            Ty::Bool => Ok(Self { root }),
            ty => Err(format!("expression evaluates to {ty}, expected bool")),
        }
    }

    pub fn evaluate(&self, ctx: &FilterContext<'_>) -> Result<bool, String> {
        self.root.eval_bool(ctx)
    }
}
