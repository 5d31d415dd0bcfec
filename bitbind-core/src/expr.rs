//! Size expressions and the resolvers that close them

use crate::error::CodecError;
use hashbrown::HashMap;
use std::fmt;

/// Supplies bindings for the parameters of a size expression
pub trait Resolver {
    /// Look up the value bound to `name`, if any
    fn resolve(&self, name: &str) -> Option<u64>;
}

/// A resolver that binds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResolver;

impl Resolver for EmptyResolver {
    fn resolve(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// Name to value bindings, optionally layered over an outer resolver
#[derive(Default)]
pub struct Bindings<'a> {
    values: HashMap<String, u64>,
    outer: Option<&'a dyn Resolver>,
}

impl<'a> Bindings<'a> {
    /// Create an empty set of bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create bindings that fall back to `outer` for unknown names
    pub fn nested(outer: &'a dyn Resolver) -> Self {
        Self {
            values: HashMap::new(),
            outer: Some(outer),
        }
    }

    /// Bind `name` to `value`, shadowing any outer binding
    pub fn bind(&mut self, name: impl Into<String>, value: u64) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style variant of [`Bindings::bind`]
    pub fn with(mut self, name: impl Into<String>, value: u64) -> Self {
        self.bind(name, value);
        self
    }
}

impl Resolver for Bindings<'_> {
    fn resolve(&self, name: &str) -> Option<u64> {
        self.values
            .get(name)
            .copied()
            .or_else(|| self.outer.and_then(|outer| outer.resolve(name)))
    }
}

/// A possibly parameterized bit count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeExpr {
    /// A literal number of bits
    Const(u64),
    /// The value bound to a named parameter
    Ref(String),
    /// Sum of two expressions
    Add(Box<SizeExpr>, Box<SizeExpr>),
    /// Product of two expressions
    Mul(Box<SizeExpr>, Box<SizeExpr>),
}

impl SizeExpr {
    /// Parse expressions such as `8`, `len`, `len * 8 + 4` or `(a + b) * 2`
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        let mut parser = Parser {
            input: text.as_bytes(),
            pos: 0,
            depth: 0,
            terms: 0,
        };
        let expr = parser.sum()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(CodecError::InvalidExpression(format!(
                "unexpected input at offset {} in {:?}",
                parser.pos, text
            )));
        }
        Ok(expr)
    }

    /// Names of all parameters referenced, in order of appearance
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'s>(&'s self, names: &mut Vec<&'s str>) {
        match self {
            SizeExpr::Const(_) => {}
            SizeExpr::Ref(name) => names.push(name),
            SizeExpr::Add(lhs, rhs) | SizeExpr::Mul(lhs, rhs) => {
                lhs.collect_references(names);
                rhs.collect_references(names);
            }
        }
    }

    /// True if the expression references at least one parameter
    pub fn is_parameterized(&self) -> bool {
        !self.references().is_empty()
    }

    /// True if every referenced parameter is bound by `resolver`
    pub fn is_closed(&self, resolver: &dyn Resolver) -> bool {
        self.references()
            .into_iter()
            .all(|name| resolver.resolve(name).is_some())
    }

    /// Evaluate the expression to a bit count
    pub fn eval(&self, resolver: &dyn Resolver) -> Result<u64, CodecError> {
        match self {
            SizeExpr::Const(value) => Ok(*value),
            SizeExpr::Ref(name) => resolver
                .resolve(name)
                .ok_or_else(|| CodecError::UnresolvedReference(name.clone())),
            SizeExpr::Add(lhs, rhs) => lhs
                .eval(resolver)?
                .checked_add(rhs.eval(resolver)?)
                .ok_or_else(|| CodecError::InvalidValue(format!("size overflow in {}", self))),
            SizeExpr::Mul(lhs, rhs) => lhs
                .eval(resolver)?
                .checked_mul(rhs.eval(resolver)?)
                .ok_or_else(|| CodecError::InvalidValue(format!("size overflow in {}", self))),
        }
    }
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeExpr::Const(value) => write!(f, "{}", value),
            SizeExpr::Ref(name) => write!(f, "{}", name),
            SizeExpr::Add(lhs, rhs) => write!(f, "{} + {}", lhs, rhs),
            SizeExpr::Mul(lhs, rhs) => {
                let wrap = |e: &SizeExpr| matches!(e, SizeExpr::Add(..));
                match (wrap(lhs), wrap(rhs)) {
                    (true, true) => write!(f, "({}) * ({})", lhs, rhs),
                    (true, false) => write!(f, "({}) * {}", lhs, rhs),
                    (false, true) => write!(f, "{} * ({})", lhs, rhs),
                    (false, false) => write!(f, "{} * {}", lhs, rhs),
                }
            }
        }
    }
}

impl From<u64> for SizeExpr {
    fn from(bits: u64) -> Self {
        SizeExpr::Const(bits)
    }
}

/// Deepest parenthesis nesting accepted by [`SizeExpr::parse`]
pub const MAX_NESTING: usize = 64;

/// Most numbers and names accepted in one expression by [`SizeExpr::parse`]
pub const MAX_TERMS: usize = 256;

struct Parser<'t> {
    input: &'t [u8],
    pos: usize,
    depth: usize,
    terms: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        self.skip_whitespace();
        if self.input.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<SizeExpr, CodecError> {
        let mut expr = self.product()?;
        while self.eat(b'+') {
            expr = SizeExpr::Add(Box::new(expr), Box::new(self.product()?));
        }
        Ok(expr)
    }

    fn product(&mut self) -> Result<SizeExpr, CodecError> {
        let mut expr = self.atom()?;
        while self.eat(b'*') {
            expr = SizeExpr::Mul(Box::new(expr), Box::new(self.atom()?));
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<SizeExpr, CodecError> {
        if self.eat(b'(') {
            if self.depth >= MAX_NESTING {
                return Err(CodecError::InvalidExpression(format!(
                    "nesting deeper than {} at offset {}",
                    MAX_NESTING, self.pos
                )));
            }
            self.depth += 1;
            let expr = self.sum()?;
            self.depth -= 1;
            if !self.eat(b')') {
                return Err(CodecError::InvalidExpression(format!(
                    "missing ')' at offset {}",
                    self.pos
                )));
            }
            return Ok(expr);
        }

        self.skip_whitespace();
        self.terms += 1;
        if self.terms > MAX_TERMS {
            return Err(CodecError::InvalidExpression(format!(
                "more than {} terms at offset {}",
                MAX_TERMS, self.pos
            )));
        }
        let start = self.pos;
        match self.input.get(self.pos) {
            Some(b) if b.is_ascii_digit() => {
                while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let digits = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|e| CodecError::InvalidExpression(e.to_string()))?;
                digits
                    .parse()
                    .map(SizeExpr::Const)
                    .map_err(|e| CodecError::InvalidExpression(format!("{}: {}", digits, e)))
            }
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {
                while self.pos < self.input.len()
                    && (self.input[self.pos].is_ascii_alphanumeric()
                        || self.input[self.pos] == b'_'
                        || self.input[self.pos] == b'.')
                {
                    self.pos += 1;
                }
                let name = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|e| CodecError::InvalidExpression(e.to_string()))?;
                Ok(SizeExpr::Ref(name.to_string()))
            }
            _ => Err(CodecError::InvalidExpression(format!(
                "expected number or name at offset {}",
                self.pos
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precedence() {
        let expr = SizeExpr::parse("len * 8 + 4").unwrap();
        let resolver = Bindings::new().with("len", 3);
        assert_eq!(expr.eval(&resolver).unwrap(), 28);
        assert_eq!(expr.to_string(), "len * 8 + 4");

        let grouped = SizeExpr::parse("(a + b) * 2").unwrap();
        let resolver = Bindings::new().with("a", 1).with("b", 2);
        assert_eq!(grouped.eval(&resolver).unwrap(), 6);
        assert_eq!(grouped.to_string(), "(a + b) * 2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            SizeExpr::parse("8 +"),
            Err(CodecError::InvalidExpression(_))
        ));
        assert!(matches!(
            SizeExpr::parse("(8"),
            Err(CodecError::InvalidExpression(_))
        ));
        assert!(matches!(
            SizeExpr::parse("8 8"),
            Err(CodecError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_parse_rejects_deep_nesting() {
        let nested = format!("{}8{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(SizeExpr::parse(&nested).unwrap(), SizeExpr::Const(8));

        let too_deep = format!("{}8{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(
            SizeExpr::parse(&too_deep),
            Err(CodecError::InvalidExpression(_))
        ));
        assert!(matches!(
            SizeExpr::parse(&"(".repeat(200_000)),
            Err(CodecError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_parse_rejects_long_chains() {
        let chain = vec!["1"; MAX_TERMS].join(" + ");
        assert_eq!(
            SizeExpr::parse(&chain).unwrap().eval(&EmptyResolver).unwrap(),
            MAX_TERMS as u64
        );

        let too_long = vec!["1"; 100_000].join("+");
        assert!(matches!(
            SizeExpr::parse(&too_long),
            Err(CodecError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_closed_under_resolver() {
        let expr = SizeExpr::parse("header.len * 8").unwrap();
        assert!(expr.is_parameterized());
        assert!(!expr.is_closed(&EmptyResolver));
        assert!(expr.is_closed(&Bindings::new().with("header.len", 2)));
        assert!(SizeExpr::Const(8).is_closed(&EmptyResolver));
    }

    #[test]
    fn test_unresolved_reference() {
        let expr = SizeExpr::parse("count").unwrap();
        assert_eq!(
            expr.eval(&EmptyResolver),
            Err(CodecError::UnresolvedReference("count".into()))
        );
    }

    #[test]
    fn test_nested_bindings_shadow_outer() {
        let outer = Bindings::new().with("a", 1).with("b", 2);
        let mut inner = Bindings::nested(&outer);
        inner.bind("a", 10);
        assert_eq!(inner.resolve("a"), Some(10));
        assert_eq!(inner.resolve("b"), Some(2));
        assert_eq!(inner.resolve("c"), None);
    }

    #[test]
    fn test_overflow_is_reported() {
        let expr = SizeExpr::Mul(
            Box::new(SizeExpr::Const(u64::MAX)),
            Box::new(SizeExpr::Const(2)),
        );
        assert!(matches!(
            expr.eval(&EmptyResolver),
            Err(CodecError::InvalidValue(_))
        ));
    }
}
