//! Query expression syntax tree and parser.

use super::QueryError;
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    /// Apply selectors to the children of each node.
    Child(Vec<Selector>),
    /// Apply selectors to the children of each node and of all its descendants.
    Descendant(Vec<Selector>),
    /// Move to the parent of each node.
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selector {
    Name(String),
    Index(i64),
    Wildcard,
    Filter(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Accessor {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    LooseEq,
    StrictEq,
    LooseNe,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// `@` followed by member accessors.
    Current(Vec<Accessor>),
    /// `@property`: key or index of the candidate.
    Property,
    Literal(Option<Value>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Longest operators first so `===` is not read as `==`.
const OPERATORS: [(&str, CompareOp); 8] = [
    ("===", CompareOp::StrictEq),
    ("!==", CompareOp::StrictNe),
    ("==", CompareOp::LooseEq),
    ("!=", CompareOp::LooseNe),
    ("<=", CompareOp::Le),
    (">=", CompareOp::Ge),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

pub(crate) struct Parser<'a> {
    expr: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(expr: &'a str) -> Self {
        Self { expr, pos: 0 }
    }

    pub(crate) fn parse(mut self) -> Result<Vec<Step>, QueryError> {
        self.skip_whitespace();
        if !self.eat("$") {
            return Err(self.error("query must start with '$'"));
        }

        let mut steps = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else { break };
            match c {
                '.' if self.rest().starts_with("..") => {
                    self.pos += 2;
                    steps.push(Step::Descendant(self.descendant_selectors()?));
                }
                '.' => {
                    self.pos += 1;
                    if self.eat("*") {
                        steps.push(Step::Child(vec![Selector::Wildcard]));
                    } else {
                        steps.push(Step::Child(vec![Selector::Name(self.member_name()?)]));
                    }
                }
                '[' => steps.push(Step::Child(self.bracket()?)),
                '^' => {
                    self.pos += 1;
                    steps.push(Step::Parent);
                }
                _ => return Err(self.error(format!("unexpected character '{c}'"))),
            }
        }
        Ok(steps)
    }

    fn descendant_selectors(&mut self) -> Result<Vec<Selector>, QueryError> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(vec![Selector::Wildcard])
            }
            Some('[') => self.bracket(),
            _ => Ok(vec![Selector::Name(self.member_name()?)]),
        }
    }

    fn member_name(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '.' | '[' | ']' | '^' | '(' | ')' | '\'' | '"') || c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
        if self.pos == start {
            return Err(self.error("expected a member name"));
        }
        Ok(self.expr[start..self.pos].to_string())
    }

    fn bracket(&mut self) -> Result<Vec<Selector>, QueryError> {
        self.expect("[")?;
        self.skip_whitespace();

        if self.eat("?") {
            self.skip_whitespace();
            self.expect("(")?;
            let filter = self.or_expr()?;
            self.skip_whitespace();
            self.expect(")")?;
            self.skip_whitespace();
            self.expect("]")?;
            return Ok(vec![Selector::Filter(filter)]);
        }

        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            let selector = match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    Selector::Wildcard
                }
                Some('\'' | '"') => Selector::Name(self.string()?),
                Some(c) if c == '-' || c.is_ascii_digit() => Selector::Index(self.integer()?),
                _ => return Err(self.error("expected a name, index or '*'")),
            };
            selectors.push(selector);
            self.skip_whitespace();
            if self.eat("]") {
                return Ok(selectors);
            }
            self.expect(",")?;
        }
    }

    fn or_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.and_expr()?;
        loop {
            self.skip_whitespace();
            if !self.eat("||") {
                return Ok(left);
            }
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
    }

    fn and_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.comparison()?;
        loop {
            self.skip_whitespace();
            if !self.eat("&&") {
                return Ok(left);
            }
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let left = self.unary()?;
        self.skip_whitespace();
        for (token, op) in OPERATORS {
            if self.eat(token) {
                let right = self.unary()?;
                return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
            }
        }
        Ok(left)
    }

    /// `!` binds tighter than comparisons: `!@.a == 1` is `(!@.a) == 1`.
    fn unary(&mut self) -> Result<Expr, QueryError> {
        self.skip_whitespace();
        if self.peek() == Some('!') && !self.rest().starts_with("!=") {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.skip_whitespace();
                self.expect(")")?;
                Ok(inner)
            }
            Some('@') => {
                self.pos += 1;
                if self.eat_word("property") {
                    return Ok(Expr::Property);
                }
                Ok(Expr::Current(self.accessors()?))
            }
            Some('\'' | '"') => Ok(Expr::Literal(Some(Value::String(self.string()?)))),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Expr::Literal(Some(self.number()?))),
            Some(_) => {
                if self.eat_word("true") {
                    Ok(Expr::Literal(Some(Value::Bool(true))))
                } else if self.eat_word("false") {
                    Ok(Expr::Literal(Some(Value::Bool(false))))
                } else if self.eat_word("null") {
                    Ok(Expr::Literal(Some(Value::Null)))
                } else if self.eat_word("undefined") {
                    Ok(Expr::Literal(None))
                } else {
                    Err(self.error("expected an operand"))
                }
            }
            None => Err(self.error("unexpected end of filter")),
        }
    }

    fn accessors(&mut self) -> Result<Vec<Accessor>, QueryError> {
        let mut accessors = Vec::new();
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let start = self.pos;
                    while let Some(c) = self.peek() {
                        if !(c.is_alphanumeric() || matches!(c, '_' | '$' | '-')) {
                            break;
                        }
                        self.pos += c.len_utf8();
                    }
                    if self.pos == start {
                        return Err(self.error("expected a member name"));
                    }
                    accessors.push(Accessor::Key(self.expr[start..self.pos].to_string()));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    let accessor = match self.peek() {
                        Some('\'' | '"') => Accessor::Key(self.string()?),
                        _ => Accessor::Index(self.integer()?),
                    };
                    self.skip_whitespace();
                    self.expect("]")?;
                    accessors.push(accessor);
                }
                _ => return Ok(accessors),
            }
        }
    }

    fn string(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        let Some(quote) = self.peek() else {
            return Err(self.error("expected a string"));
        };
        self.pos += 1;

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                self.pos = start;
                return Err(self.error("unterminated string"));
            };
            self.pos += c.len_utf8();
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("unterminated escape"));
                    };
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }

    fn integer(&mut self) -> Result<i64, QueryError> {
        let start = self.pos;
        self.eat("-");
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.expr[start..self.pos].parse().map_err(|_| {
            self.pos = start;
            self.error("expected an integer")
        })
    }

    fn number(&mut self) -> Result<Value, QueryError> {
        let start = self.pos;
        self.eat("-");
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.pos += 1;
        }
        serde_json::from_str::<Number>(&self.expr[start..self.pos])
            .map(Value::Number)
            .map_err(|_| {
                self.pos = start;
                self.error("invalid number")
            })
    }

    fn rest(&self) -> &'a str {
        &self.expr[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consumes `word` only when it is not the prefix of a longer identifier.
    fn eat_word(&mut self, word: &str) -> bool {
        let Some(after) = self.rest().strip_prefix(word) else {
            return false;
        };
        if after.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            return false;
        }
        self.pos += word.len();
        true
    }

    fn expect(&mut self, token: &str) -> Result<(), QueryError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{token}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += self.peek().map_or(0, char::len_utf8);
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError {
            query: self.expr.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }
}
