use serde_json::{Number, Value};

use super::{
    CompareOp, FilterExpr, JsonPath, Operand, PathStep, RelativePath, Segment, Selector, Slice,
    UnionMember,
};
use crate::error::QueryError;

/// Deepest filter expression tree accepted. Parentheses, `!` and each
/// `&&`/`||` operator add one level.
const MAX_FILTER_DEPTH: usize = 64;

/// Recursive-descent parser over the characters of one expression.
///
/// Positions in errors are character offsets into the input.
pub(super) struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub(super) fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    pub(super) fn parse_path(mut self) -> Result<JsonPath, QueryError> {
        self.skip_ws();
        match self.peek() {
            Some('$') => self.pos += 1,
            None => return Err(QueryError::parse(0, "empty expression")),
            Some(c) => return Err(self.unexpected(c, "expression must start with '$'")),
        }

        let mut segments = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some('.') if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    segments.push(Segment::Descendant(self.parse_dotted_selector(true)?));
                }
                Some('.') => {
                    self.pos += 1;
                    segments.push(Segment::Child(self.parse_dotted_selector(false)?));
                }
                Some('[') => segments.push(Segment::Child(self.parse_bracket()?)),
                Some(c) => return Err(self.unexpected(c, "expected '.', '..' or '['")),
            }
        }

        Ok(JsonPath { segments })
    }

    /// Selector after `.` or `..`: a member name, `*`, or (after `..` only)
    /// a bracketed selector.
    fn parse_dotted_selector(&mut self, descendant: bool) -> Result<Selector, QueryError> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(Selector::Wildcard)
            }
            Some('[') if descendant => self.parse_bracket(),
            _ => Ok(Selector::Name(self.parse_member_name()?)),
        }
    }

    fn parse_member_name(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_member_terminator(c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c, "expected a member name"),
                None => QueryError::parse(self.pos, "expected a member name, found end of input"),
            });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_bracket(&mut self) -> Result<Selector, QueryError> {
        self.expect('[')?;
        self.skip_ws();
        let selector = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Selector::Wildcard
            }
            Some('?') => {
                self.pos += 1;
                Selector::Filter(self.parse_or()?)
            }
            Some(q @ ('\'' | '"')) => {
                let first = self.parse_string(q)?;
                self.parse_union_tail(UnionMember::Name(first))?
            }
            Some(c) if c == '-' || c == ':' || c.is_ascii_digit() => self.parse_index_or_slice()?,
            Some(c) => return Err(self.unexpected(c, "expected a selector")),
            None => {
                return Err(QueryError::parse(
                    self.pos,
                    "unterminated bracket, found end of input",
                ));
            }
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(selector)
    }

    fn parse_index_or_slice(&mut self) -> Result<Selector, QueryError> {
        let start = self.parse_optional_int()?;
        self.skip_ws();
        if self.peek() != Some(':') {
            let Some(index) = start else {
                return Err(QueryError::parse(self.pos, "expected an index"));
            };
            return self.parse_union_tail(UnionMember::Index(index));
        }

        self.pos += 1;
        self.skip_ws();
        let end = self.parse_optional_int()?;
        self.skip_ws();
        let step = if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ws();
            self.parse_optional_int()?
        } else {
            None
        };
        Ok(Selector::Slice(Slice { start, end, step }))
    }

    fn parse_union_tail(&mut self, first: UnionMember) -> Result<Selector, QueryError> {
        let mut members = vec![first];
        loop {
            self.skip_ws();
            if self.peek() != Some(',') {
                break;
            }
            self.pos += 1;
            self.skip_ws();
            let member = match self.peek() {
                Some(q @ ('\'' | '"')) => UnionMember::Name(self.parse_string(q)?),
                Some(c) if c == '-' || c.is_ascii_digit() => UnionMember::Index(self.parse_int()?),
                Some(c) => return Err(self.unexpected(c, "expected a name or index in union")),
                None => {
                    return Err(QueryError::parse(
                        self.pos,
                        "unterminated union, found end of input",
                    ));
                }
            };
            members.push(member);
        }

        if members.len() == 1 {
            return Ok(match members.remove(0) {
                UnionMember::Name(name) => Selector::QuotedName(name),
                UnionMember::Index(index) => Selector::Index(index),
            });
        }
        Ok(Selector::Union(members))
    }

    // ---------------------------------------------------------------
    // Filter expressions
    // ---------------------------------------------------------------

    /// Enters one more level of the filter tree.
    fn descend(&mut self) -> Result<(), QueryError> {
        if self.depth >= MAX_FILTER_DEPTH {
            return Err(QueryError::parse(
                self.pos,
                format!("filter nesting too deep (limit {MAX_FILTER_DEPTH})"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<FilterExpr, QueryError> {
        let entry = self.depth;
        let result = self.parse_or_chain();
        self.depth = entry;
        result
    }

    // Chains build left-deep trees, so every operator counts as a level.
    fn parse_or_chain(&mut self) -> Result<FilterExpr, QueryError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if !self.eat("||") {
                return Ok(left);
            }
            self.descend()?;
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
    }

    fn parse_and(&mut self) -> Result<FilterExpr, QueryError> {
        let entry = self.depth;
        let result = self.parse_and_chain();
        self.depth = entry;
        result
    }

    fn parse_and_chain(&mut self) -> Result<FilterExpr, QueryError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            if !self.eat("&&") {
                return Ok(left);
            }
            self.descend()?;
            let right = self.parse_unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<FilterExpr, QueryError> {
        self.skip_ws();
        if self.peek() == Some('!') && self.peek_at(1) != Some('=') {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_unary();
            self.depth -= 1;
            return Ok(FilterExpr::Not(Box::new(inner?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterExpr, QueryError> {
        self.skip_ws();
        if self.peek() == Some('(') {
            self.pos += 1;
            self.descend()?;
            let expr = self.parse_or();
            self.depth -= 1;
            let expr = expr?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(expr);
        }

        let operand_pos = self.pos;
        let left = self.parse_operand()?;
        self.skip_ws();
        match self.parse_compare_op()? {
            Some(op) => {
                self.skip_ws();
                let right = self.parse_operand()?;
                Ok(FilterExpr::Compare { left, op, right })
            }
            None => match left {
                Operand::Path(path) => Ok(FilterExpr::Exists(path)),
                Operand::Literal(_) => Err(QueryError::parse(
                    operand_pos,
                    "expected a comparison after literal",
                )),
            },
        }
    }

    fn parse_compare_op(&mut self) -> Result<Option<CompareOp>, QueryError> {
        let op = if self.eat("==") {
            CompareOp::Eq
        } else if self.eat("!=") {
            CompareOp::Ne
        } else if self.eat("<=") {
            CompareOp::Le
        } else if self.eat(">=") {
            CompareOp::Ge
        } else if self.eat("<") {
            CompareOp::Lt
        } else if self.eat(">") {
            CompareOp::Gt
        } else if self.peek() == Some('=') {
            return Err(QueryError::lexical(self.pos, "single '=' is not an operator"));
        } else {
            return Ok(None);
        };
        Ok(Some(op))
    }

    fn parse_operand(&mut self) -> Result<Operand, QueryError> {
        self.skip_ws();
        match self.peek() {
            Some(c @ ('@' | '$')) => {
                self.pos += 1;
                Ok(Operand::Path(self.parse_relative_path(c == '$')?))
            }
            Some(q @ ('\'' | '"')) => Ok(Operand::Literal(Value::String(self.parse_string(q)?))),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Operand::Literal(self.parse_number()?)),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                    self.pos += 1;
                }
                let word: String = self.chars[start..self.pos].iter().collect();
                match word.as_str() {
                    "true" => Ok(Operand::Literal(Value::Bool(true))),
                    "false" => Ok(Operand::Literal(Value::Bool(false))),
                    "null" => Ok(Operand::Literal(Value::Null)),
                    _ => Err(QueryError::parse(start, format!("unknown literal '{word}'"))),
                }
            }
            Some(c) => Err(self.unexpected(c, "expected a path or literal")),
            None => Err(QueryError::parse(
                self.pos,
                "unexpected end of filter expression",
            )),
        }
    }

    fn parse_relative_path(&mut self, from_root: bool) -> Result<RelativePath, QueryError> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1) != Some('.') => {
                    self.pos += 1;
                    steps.push(PathStep::Name(self.parse_member_name()?));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let step = match self.peek() {
                        Some(q @ ('\'' | '"')) => PathStep::Name(self.parse_string(q)?),
                        Some(c) if c == '-' || c.is_ascii_digit() => {
                            PathStep::Index(self.parse_int()?)
                        }
                        Some(c) => return Err(self.unexpected(c, "expected a name or index")),
                        None => {
                            return Err(QueryError::parse(
                                self.pos,
                                "unterminated bracket, found end of input",
                            ));
                        }
                    };
                    self.skip_ws();
                    self.expect(']')?;
                    steps.push(step);
                }
                _ => return Ok(RelativePath { from_root, steps }),
            }
        }
    }

    // ---------------------------------------------------------------
    // Tokens
    // ---------------------------------------------------------------

    fn parse_string(&mut self, quote: char) -> Result<String, QueryError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(QueryError::lexical(start, "unterminated string literal"));
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => out.push(self.parse_escape()?),
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self) -> Result<char, QueryError> {
        let escape_pos = self.pos;
        let Some(c) = self.peek() else {
            return Err(QueryError::lexical(escape_pos, "unterminated escape sequence"));
        };
        self.pos += 1;
        Ok(match c {
            '\'' | '"' | '\\' | '/' => c,
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'u' => {
                let end = self.pos + 4;
                let hex: String = self.chars.get(self.pos..end).unwrap_or(&[]).iter().collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| QueryError::lexical(escape_pos, "invalid unicode escape"))?;
                self.pos = end;
                code
            }
            other => {
                return Err(QueryError::lexical(
                    escape_pos,
                    format!("invalid escape '\\{other}'"),
                ));
            }
        })
    }

    fn parse_optional_int(&mut self) -> Result<Option<i64>, QueryError> {
        match self.peek() {
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_int().map(Some),
            _ => Ok(None),
        }
    }

    fn parse_int(&mut self) -> Result<i64, QueryError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(QueryError::lexical(start, "invalid integer"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| QueryError::lexical(start, format!("integer out of range: {text}")))
    }

    fn parse_number(&mut self) -> Result<Value, QueryError> {
        let start = self.pos;
        self.parse_int()?;
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == exp_start {
                return Err(QueryError::lexical(start, "invalid number exponent"));
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if !is_float {
            let n: i64 = text
                .parse()
                .map_err(|_| QueryError::lexical(start, format!("invalid number: {text}")))?;
            return Ok(Value::from(n));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| QueryError::lexical(start, format!("invalid number: {text}")))
    }

    // ---------------------------------------------------------------
    // Cursor helpers
    // ---------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        let len = token.chars().count();
        let matches = self
            .chars
            .get(self.pos..self.pos + len)
            .is_some_and(|window| window.iter().copied().eq(token.chars()));
        if matches {
            self.pos += len;
        }
        matches
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.unexpected(c, &format!("expected '{expected}'"))),
            None => Err(QueryError::parse(
                self.pos,
                format!("expected '{expected}', found end of input"),
            )),
        }
    }

    /// Characters that cannot start any token are lexical errors; the rest
    /// are structural ones.
    fn unexpected(&self, found: char, context: &str) -> QueryError {
        if is_token_start(found) {
            QueryError::parse(self.pos, format!("{context}, found '{found}'"))
        } else {
            QueryError::lexical(self.pos, format!("unexpected character '{found}'"))
        }
    }
}

fn is_token_start(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || matches!(
            c,
            '$' | '@'
                | '.'
                | '['
                | ']'
                | '('
                | ')'
                | '*'
                | '?'
                | ','
                | ':'
                | '\''
                | '"'
                | '!'
                | '='
                | '<'
                | '>'
                | '&'
                | '|'
                | '-'
                | '_'
        )
}

fn is_member_terminator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '.' | '['
                | ']'
                | '('
                | ')'
                | '\''
                | '"'
                | ','
                | ':'
                | '?'
                | '*'
                | '='
                | '!'
                | '<'
                | '>'
                | '&'
                | '|'
        )
}
