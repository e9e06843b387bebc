//! Query parser
//!
//! Recursive descent parser over the token stream of the lexer.
//!
//! ```text
//! query     := aggregate? preamble? part+
//! aggregate := "aggregate(" (group_var ("," group_var)* ":")? function ("," function)* "):"
//! preamble  := word "=" value ("," word "=" value)* ":"
//! part      := (merge_term | <navigation>) with? sort? limit? navigation? "+"?
//! merge     := combined ("{" word ":" part+ ("," word ":" part+)* "}" combined?)?
//! combined  := simple (("and" | "or") simple)*
//! simple    := "(" combined ")" | leaf
//! ```
//!
//! `and` and `or` bind equally strong and fold from left to right.

use crate::aggregate::{
    Aggregate, AggregateFunction, AggregateOp, AggregateTarget, AggregateVariable, GroupSource,
};
use crate::ancestors::AncestorRewriter;
use crate::lexer::{tokenize, Number, Spanned, Token};
use crate::navigation::Navigation;
use crate::options::QueryOptions;
use crate::query::{MergeQuery, Part, Query, Sort, SortOrder, WithClause, WithClauseFilter};
use crate::term::{BoolOp, Function, FunctionTerm, MergeTerm, Operator, Predicate, Term};
use cinder_core::{Direction, Error, Result, Value};
use tracing::{debug, trace};

/// Parse a query with the default options
pub fn parse_query(query: &str) -> Result<Query> {
    parse_query_with(query, &QueryOptions::default())
}

/// Parse a query. Navigations without an explicit edge type get the edge type
/// of the preamble or the configured default.
pub fn parse_query_with(query: &str, options: &QueryOptions) -> Result<Query> {
    let mut parser = QueryParser::new(query)?;
    let (query, edge_type) = parser.parse_query()?;

    let edge_type = edge_type.unwrap_or_else(|| options.default_edge_type.clone());
    if !options.allowed_edge_types.contains(&edge_type) {
        return Err(Error::InvalidEdgeType {
            edge_type,
            allowed: options.allowed_edge_types.iter().cloned().collect(),
        });
    }
    let mut query = query;
    query.fill_edge_type(&edge_type);
    debug!("Parsed query with {} parts", query.parts().len());
    Ok(query)
}

/// Parse a query whose paths are relative to the configured section and
/// resolve ancestor and descendant references into merge queries.
pub fn parse_query_on_section(query: &str, options: &QueryOptions) -> Result<Query> {
    let parsed = parse_query_with(query, options)?;
    parsed.on_section_with(&options.section, &AncestorRewriter::from(options))
}

/// Parse a single term
pub fn parse_term(term: &str) -> Result<Term> {
    let options = QueryOptions::default();
    let mut parser = QueryParser::new(term)?;
    let mut parsed = parser.parse_merge_term()?;
    parser.expect_end("end of term")?;
    parsed.fill_edge_type(&options.default_edge_type);
    Ok(parsed)
}

struct QueryParser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> QueryParser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let tokens = tokenize(input)?;
        trace!("Tokenized {} tokens: {:?}", tokens.len(), tokens);
        Ok(Self {
            input,
            tokens,
            pos: 0,
        })
    }

    fn parse_query(&mut self) -> Result<(Query, Option<String>)> {
        let aggregate = if self.peek_word("aggregate") && self.peek_at(1) == Some(&Token::LParen) {
            Some(self.parse_aggregate()?)
        } else {
            None
        };
        let edge_type = if self.looks_like_preamble() {
            self.parse_preamble()?
        } else {
            None
        };
        let parts = self.parse_parts()?;
        self.expect_end("navigation or end of query")?;
        Ok((Query::new(parts, aggregate)?, edge_type))
    }

    // ========== Parts ==========

    fn parse_parts(&mut self) -> Result<Vec<Part>> {
        let mut parts = Vec::new();
        loop {
            let part = self.parse_part()?;
            let continues = part.navigation.is_some() && self.starts_part();
            parts.push(part);
            if !continues {
                return Ok(parts);
            }
        }
    }

    fn starts_part(&self) -> bool {
        match self.peek() {
            _ if self.starts_term() => true,
            Some(token) => token.is_navigation(),
            None => false,
        }
    }

    fn parse_part(&mut self) -> Result<Part> {
        // a part may start with a navigation: `--> foo` is `all --> foo`
        let term = if self.at_navigation() {
            Term::All
        } else {
            self.parse_merge_term()?
        };
        let mut part = Part::new(term);
        if self.check(&Token::With) {
            part.with_clause = Some(self.parse_with_clause()?);
        }
        if self.consume(&Token::Sort) {
            part.sort = self.parse_sort()?;
        }
        if self.consume(&Token::Limit) {
            part.limit = Some(self.parse_count("limit")?);
        }
        if self.at_navigation() {
            part.navigation = Some(self.parse_navigation()?);
        }
        part.pinned = self.consume(&Token::Plus);
        Ok(part)
    }

    fn parse_with_clause(&mut self) -> Result<WithClause> {
        self.expect(&Token::With, "'with'")?;
        self.expect(&Token::LParen, "'('")?;
        let filter = match self.peek().cloned() {
            Some(Token::Word(word)) if word == "any" => {
                self.advance();
                WithClauseFilter::any()
            }
            Some(Token::Word(word)) if word == "empty" => {
                self.advance();
                WithClauseFilter::empty()
            }
            Some(Token::Word(word)) if word == "count" => {
                self.advance();
                let op = self.parse_operator()?;
                let num = self.parse_integer()?;
                WithClauseFilter::count(op, num)
            }
            _ => return Err(self.error("Expected any, empty or count")),
        };
        self.expect(&Token::Comma, "','")?;
        let navigation = self.parse_navigation()?;
        let mut clause = WithClause::new(filter, navigation);
        if self.starts_term() {
            clause.term = Some(self.parse_combined()?);
        }
        if self.check(&Token::With) {
            clause.with_clause = Some(Box::new(self.parse_with_clause()?));
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(clause)
    }

    fn parse_sort(&mut self) -> Result<Vec<Sort>> {
        let mut sorts = Vec::new();
        loop {
            let name = self.parse_word("sort property")?;
            let order = if self.consume_word("desc") {
                SortOrder::Desc
            } else {
                self.consume_word("asc");
                SortOrder::Asc
            };
            sorts.push(Sort::new(name, order));
            // `, name:` continues an enclosing merge clause
            let next_is_merge = self.peek_at(2) == Some(&Token::Colon);
            if next_is_merge || !self.consume(&Token::Comma) {
                return Ok(sorts);
            }
        }
    }

    // ========== Navigation ==========

    fn at_navigation(&self) -> bool {
        self.peek().is_some_and(Token::is_navigation)
    }

    fn parse_navigation(&mut self) -> Result<Navigation> {
        match self.peek() {
            Some(Token::ArrowRight) => {
                self.advance();
                Ok(Navigation::new(Direction::Outbound))
            }
            Some(Token::ArrowLeft) => {
                self.advance();
                Ok(Navigation::new(Direction::Inbound))
            }
            Some(Token::DoubleDash) => {
                self.advance();
                Ok(Navigation::new(Direction::Both))
            }
            Some(Token::ArrowLeftDash) => {
                self.advance();
                let nav = self.parse_edge_definition(Direction::Inbound)?;
                self.expect(&Token::Minus, "'-'")?;
                Ok(nav)
            }
            Some(Token::Minus) => {
                self.advance();
                let mut nav = self.parse_edge_definition(Direction::Outbound)?;
                if self.consume(&Token::Minus) {
                    nav.direction = Direction::Both;
                } else {
                    self.expect(&Token::DashArrowRight, "'->' or '-'")?;
                }
                Ok(nav)
            }
            _ => Err(self.error("Expected navigation")),
        }
    }

    /// Optional edge type and hop range between the arrow heads
    fn parse_edge_definition(&mut self, direction: Direction) -> Result<Navigation> {
        let mut nav = Navigation::new(direction);
        if let Some(Token::Word(word)) = self.peek().cloned() {
            let position = self.position();
            // the lexer keeps `delete[2]` together
            let (edge_type, fixed) = match word.split_once('[') {
                Some((edge_type, marker)) => {
                    let hops = marker
                        .strip_suffix(']')
                        .and_then(|digits| digits.parse::<usize>().ok())
                        .ok_or_else(|| Error::parse(position, format!("Invalid hop range in {word}")))?;
                    (edge_type.to_string(), Some(hops))
                }
                None => (word.clone(), None),
            };
            if edge_type.contains(['.', '/']) {
                return Err(Error::parse(position, format!("Invalid edge type {word}")));
            }
            self.advance();
            nav.edge_type = Some(edge_type);
            if let Some(hops) = fixed {
                return nav.with_range(hops, Some(hops));
            }
        }
        if self.check(&Token::LBracket) {
            let position = self.position();
            let (start, until) = self.parse_range()?;
            nav = nav.with_range(start, until).map_err(|err| match err {
                Error::QueryParse { message, .. } => Error::parse(position, message),
                err => err,
            })?;
        }
        Ok(nav)
    }

    /// `[n]`, `[n:m]`, `[n..m]`, `[n,m]` or `[n:]`
    fn parse_range(&mut self) -> Result<(usize, Option<usize>)> {
        self.expect(&Token::LBracket, "'['")?;
        let start = self.parse_count("hop count")?;
        let until = if matches!(
            self.peek(),
            Some(Token::Colon | Token::DoubleDot | Token::Comma)
        ) {
            self.advance();
            if matches!(self.peek(), Some(Token::Number(_))) {
                Some(self.parse_count("hop count")?)
            } else {
                None
            }
        } else {
            Some(start)
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok((start, until))
    }

    // ========== Terms ==========

    fn parse_merge_term(&mut self) -> Result<Term> {
        let pre_filter = self.parse_combined()?;
        if !self.consume(&Token::LBrace) {
            return Ok(pre_filter);
        }
        let mut merges = Vec::new();
        loop {
            let name = self.parse_word("merge name")?;
            self.expect(&Token::Colon, "':'")?;
            let parts = self.parse_parts()?;
            merges.push(MergeQuery::new(name, Query::new(parts, None)?));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "'}' or ','")?;
        let post_filter = if self.starts_term() {
            self.parse_combined()?
        } else {
            Term::All
        };
        Ok(Term::Merge(MergeTerm::new(pre_filter, merges, post_filter)))
    }

    fn parse_combined(&mut self) -> Result<Term> {
        let mut result = self.parse_simple()?;
        loop {
            let op = match self.peek() {
                Some(Token::And) => BoolOp::And,
                Some(Token::Or) => BoolOp::Or,
                _ => return Ok(result),
            };
            self.advance();
            let right = self.parse_simple()?;
            result = Term::new_combined(result, op, right);
        }
    }

    fn parse_simple(&mut self) -> Result<Term> {
        if self.consume(&Token::LParen) {
            let term = self.parse_combined()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(term);
        }
        self.parse_leaf()
    }

    /// A word, a parenthesis or a keyword used as property name
    fn starts_term(&self) -> bool {
        matches!(self.peek(), Some(Token::Word(_) | Token::LParen)) || self.at_keyword_predicate()
    }

    /// `limit > 3` filters on a property named like a keyword
    fn at_keyword_predicate(&self) -> bool {
        self.peek().is_some_and(Token::is_keyword) && self.peek_at(1).is_some_and(Token::is_operator)
    }

    fn parse_leaf(&mut self) -> Result<Term> {
        if self.at_keyword_predicate() {
            return self.parse_predicate();
        }
        let Some(Token::Word(word)) = self.peek().cloned() else {
            return Err(self.error("Expected term"));
        };
        if self.peek_at(1) == Some(&Token::LParen) {
            return self.parse_call(&word);
        }
        if self.peek_at(1).is_some_and(Token::is_operator) {
            return self.parse_predicate();
        }
        if word == "all" {
            self.advance();
            return Ok(Term::All);
        }
        if word.contains(['.', '[', '/']) {
            return Err(self.error(&format!("Expected operator after {word}")));
        }
        self.advance();
        Ok(Term::is([word]))
    }

    /// `is(...)`, `isinstance(...)`, `id(...)` or a function term
    fn parse_call(&mut self, name: &str) -> Result<Term> {
        let position = self.position();
        self.advance();
        self.expect(&Token::LParen, "'('")?;
        let term = match name {
            "is" | "isinstance" => {
                let mut kinds = vec![self.parse_name("kind")?];
                while self.consume(&Token::Comma) {
                    kinds.push(self.parse_name("kind")?);
                }
                Term::is(kinds)
            }
            "id" => Term::Id(self.parse_name("id")?),
            _ => {
                let function = Function::from_name(name)
                    .ok_or_else(|| Error::parse(position, format!("Unknown function {name}")))?;
                let property = self.parse_word("property path")?;
                let mut args = Vec::new();
                while self.consume(&Token::Comma) {
                    args.push(self.parse_value()?);
                }
                Term::Function(FunctionTerm {
                    function,
                    property,
                    args,
                })
            }
        };
        self.expect(&Token::RParen, "')'")?;
        Ok(term)
    }

    fn parse_predicate(&mut self) -> Result<Term> {
        let name = self.parse_word("property path")?;
        let op = self.parse_operator()?;
        let value = self.parse_value()?;
        Ok(Term::Predicate(Predicate { name, op, value }))
    }

    fn parse_operator(&mut self) -> Result<Operator> {
        let op = match self.peek() {
            Some(Token::EqualsEquals | Token::Equals) => Operator::Equals,
            Some(Token::NotEquals) => Operator::NotEquals,
            Some(Token::LessThan) => Operator::LessThan,
            Some(Token::LessEquals) => Operator::LessEquals,
            Some(Token::GreaterThan) => Operator::GreaterThan,
            Some(Token::GreaterEquals) => Operator::GreaterEquals,
            Some(Token::RegexMatch | Token::Tilde) => Operator::Matches,
            Some(Token::RegexNotMatch) => Operator::NotMatches,
            Some(Token::In) => Operator::In,
            Some(Token::Not) => {
                self.advance();
                if !self.check(&Token::In) {
                    return Err(self.error("Expected 'in' after 'not'"));
                }
                Operator::NotIn
            }
            _ => return Err(self.error("Expected operator")),
        };
        self.advance();
        Ok(op)
    }

    // ========== Values ==========

    fn parse_value(&mut self) -> Result<Value> {
        let value = match self.peek().cloned() {
            Some(Token::String(s)) => Value::String(s),
            Some(Token::Number(Number::Integer(i))) => Value::Integer(i),
            Some(Token::Number(Number::BigInteger(i))) => Value::BigInteger(i),
            Some(Token::Number(Number::Float(x))) => Value::Float(x),
            Some(Token::True) => Value::Boolean(true),
            Some(Token::False) => Value::Boolean(false),
            Some(Token::Null) => Value::Null,
            // unquoted words are strings
            Some(Token::Word(w)) => Value::String(w),
            Some(Token::Minus) => {
                self.advance();
                return match self.peek() {
                    Some(Token::Number(Number::Integer(i))) => {
                        let value = Value::Integer(-i);
                        self.advance();
                        Ok(value)
                    }
                    // -9223372036854775808 fits again
                    Some(Token::Number(Number::BigInteger(i))) => {
                        let value = Value::from(-i);
                        self.advance();
                        Ok(value)
                    }
                    Some(Token::Number(Number::Float(x))) => {
                        let value = Value::Float(-x);
                        self.advance();
                        Ok(value)
                    }
                    _ => Err(self.error("Expected number after '-'")),
                };
            }
            Some(Token::LBracket) => return self.parse_array(),
            _ => return Err(self.error("Expected value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.expect(&Token::LBracket, "'['")?;
        let mut items = Vec::new();
        if !self.consume(&Token::RBracket) {
            loop {
                items.push(self.parse_value()?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBracket, "']' or ','")?;
        }
        Ok(Value::Array(items))
    }

    fn parse_integer(&mut self) -> Result<i64> {
        let negative = self.consume(&Token::Minus);
        match self.peek() {
            Some(Token::Number(Number::Integer(i))) => {
                let value = if negative { -i } else { *i };
                self.advance();
                Ok(value)
            }
            _ => Err(self.error("Expected integer")),
        }
    }

    /// Non-negative integer
    fn parse_count(&mut self, what: &str) -> Result<usize> {
        match self.peek() {
            Some(Token::Number(Number::Integer(i))) => {
                let count = usize::try_from(*i)
                    .map_err(|_| self.error(&format!("Invalid {what}")))?;
                self.advance();
                Ok(count)
            }
            _ => Err(self.error(&format!("Expected {what}"))),
        }
    }

    /// A word or quoted string
    fn parse_name(&mut self, what: &str) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Word(name) | Token::String(name)) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("Expected {what}"))),
        }
    }

    /// A word, or a keyword taken by its text
    fn parse_word(&mut self, what: &str) -> Result<String> {
        let word = match self.tokens.get(self.pos) {
            Some(Spanned {
                token: Token::Word(word),
                ..
            }) => word.clone(),
            Some(Spanned { token, span }) if token.is_keyword() => self.input[span.clone()].to_string(),
            _ => return Err(self.error(&format!("Expected {what}"))),
        };
        self.advance();
        Ok(word)
    }

    // ========== Preamble and aggregation ==========

    /// `key=value (, key=value)* :` ahead
    fn looks_like_preamble(&self) -> bool {
        let mut rest = self.tokens.get(self.pos..).unwrap_or_default();
        loop {
            let ahead: Vec<&Token> = rest.iter().take(4).map(|s| &s.token).collect();
            match ahead.as_slice() {
                [Token::Word(_), Token::Equals, Token::Word(_) | Token::String(_), Token::Colon] => {
                    return true;
                }
                [Token::Word(_), Token::Equals, Token::Word(_) | Token::String(_), Token::Comma] => {
                    rest = &rest[4..];
                }
                _ => return false,
            }
        }
    }

    /// Returns the edge type set in the preamble
    fn parse_preamble(&mut self) -> Result<Option<String>> {
        let mut edge_type = None;
        loop {
            let position = self.position();
            let key = self.parse_word("preamble key")?;
            self.expect(&Token::Equals, "'='")?;
            let value = self.parse_name("preamble value")?;
            match key.as_str() {
                "edge_type" => edge_type = Some(value),
                _ => return Err(Error::parse(position, format!("Unknown preamble key {key}"))),
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Colon, "':'")?;
        Ok(edge_type)
    }

    fn parse_aggregate(&mut self) -> Result<Aggregate> {
        self.advance();
        self.expect(&Token::LParen, "'('")?;
        let mut group_by = Vec::new();
        if self.group_variables_ahead() {
            loop {
                group_by.push(self.parse_group_variable()?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Colon, "':'")?;
        }
        let mut functions = Vec::new();
        loop {
            functions.push(self.parse_aggregate_function()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        self.expect(&Token::Colon, "':'")?;
        Ok(Aggregate::new(group_by, functions))
    }

    /// Is there a `:` before the closing parenthesis of the aggregation?
    fn group_variables_ahead(&self) -> bool {
        let mut depth = 0usize;
        for spanned in &self.tokens[self.pos..] {
            match spanned.token {
                Token::LParen => depth += 1,
                Token::RParen if depth == 0 => return false,
                Token::RParen => depth -= 1,
                Token::Colon if depth == 0 => return true,
                _ => {}
            }
        }
        false
    }

    fn parse_group_variable(&mut self) -> Result<AggregateVariable> {
        let source = match self.peek().cloned() {
            Some(Token::String(template)) => GroupSource::template(&template),
            Some(Token::Word(path)) => GroupSource::Path(path),
            _ => return Err(self.error("Expected group variable")),
        };
        self.advance();
        Ok(AggregateVariable {
            source,
            as_name: self.parse_as_name()?,
        })
    }

    fn parse_aggregate_function(&mut self) -> Result<AggregateFunction> {
        let position = self.position();
        let name = self.parse_word("aggregate function")?;
        let op = AggregateOp::from_name(&name).ok_or_else(|| {
            Error::parse(position, format!("Unknown aggregate function {name}"))
        })?;
        self.expect(&Token::LParen, "'('")?;
        let target = match self.peek() {
            Some(Token::Word(_)) => AggregateTarget::Path(self.parse_word("property path")?),
            _ => AggregateTarget::Constant(self.parse_value()?),
        };
        if let AggregateTarget::Constant(value) = &target {
            if value.as_float().is_none() {
                return Err(Error::parse(position, format!("Expected number or property in {name}")));
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(AggregateFunction {
            op,
            target,
            as_name: self.parse_as_name()?,
        })
    }

    fn parse_as_name(&mut self) -> Result<Option<String>> {
        if self.consume_word("as") {
            Ok(Some(self.parse_word("name")?))
        } else {
            Ok(None)
        }
    }

    // ========== Token cursor ==========

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == word)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn consume(&mut self, token: &Token) -> bool {
        let found = self.check(token);
        if found {
            self.advance();
        }
        found
    }

    fn consume_word(&mut self, word: &str) -> bool {
        let found = self.peek_word(word);
        if found {
            self.advance();
        }
        found
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {what}")))
        }
    }

    fn expect_end(&self, what: &str) -> Result<()> {
        if self.pos < self.tokens.len() {
            Err(self.error(&format!("Expected {what}")))
        } else {
            Ok(())
        }
    }

    /// Byte offset of the current token
    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |s| s.span.start)
    }

    fn error(&self, message: &str) -> Error {
        let found = match self.tokens.get(self.pos) {
            Some(spanned) => format!("{:?}", &self.input[spanned.span.clone()]),
            None => "end of input".to_string(),
        };
        Error::parse(self.position(), format!("{message}, found {found}"))
    }
}
