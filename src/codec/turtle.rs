//! Native-triple header dialect: a Turtle-style parser and writer.
//!
//! The dialect covers the subset of Turtle that document headers need:
//! `@prefix`/`@base` (and their SPARQL spellings), statements with `;`
//! predicate lists and `,` object lists, the `a` keyword, comments, and
//! typed literals. Subjects and predicates must resolve to absolute
//! identifiers; blank nodes are not part of the document model.
//!
//! The writer is the other half of the round-trip law: it regroups all
//! facts about one subject into a single statement, one predicate per
//! line, objects comma-joined, in a deterministic order.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::{
    codec::{diagnostic::SyncDiagnostic, StatementLayout},
    error::GraphdownError,
    model::{Fact, Iri, Literal, Term, TripleSet},
    vocab,
};

/// Parse output for a native-triple header region.
#[derive(Debug, Clone, Default)]
pub struct ParsedHeader {
    /// Facts in statement order (duplicates possible; set semantics apply
    /// downstream).
    pub facts: Vec<Fact>,
    /// Ordering hints recovered from the source, for stable re-emission.
    pub layout: StatementLayout,
    /// Prefix declarations, prefix name → namespace.
    pub prefixes: BTreeMap<String, String>,
    /// Subject of the first statement, when any statement exists.
    pub explicit_subject: Option<Iri>,
    pub diagnostics: Vec<SyncDiagnostic>,
}

/// True when a header region is written in the native-triple dialect.
/// Anything else is treated as key-value.
pub fn is_native_header(header: &str) -> bool {
    let trimmed = header.trim_start();
    trimmed.starts_with("@prefix")
        || trimmed.starts_with("@base")
        || trimmed.starts_with("PREFIX")
        || trimmed.starts_with("BASE")
        || trimmed.starts_with('<')
}

/// Parse a native-triple header. `path` and `line_offset` only feed error
/// reporting: reported lines are document lines, not header-local lines.
pub fn parse_header(
    path: &str,
    header: &str,
    line_offset: usize,
) -> Result<ParsedHeader, GraphdownError> {
    Parser::new(path, header, line_offset).run()
}

struct Parser<'a> {
    path: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    line_offset: usize,
    prefixes: BTreeMap<String, String>,
    base: Option<String>,
    out: ParsedHeader,
}

impl<'a> Parser<'a> {
    fn new(path: &'a str, header: &'a str, line_offset: usize) -> Self {
        Parser {
            path,
            chars: header.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            line_offset,
            prefixes: BTreeMap::new(),
            base: None,
            out: ParsedHeader::default(),
        }
    }

    fn run(mut self) -> Result<ParsedHeader, GraphdownError> {
        loop {
            self.skip_trivia();
            let Some(c) = self.peek() else {
                break;
            };
            if c == '@' {
                self.parse_at_directive()?;
            } else if self.at_keyword("PREFIX") {
                self.parse_sparql_prefix()?;
            } else if self.at_keyword("BASE") {
                self.parse_sparql_base()?;
            } else {
                self.parse_statement()?;
            }
        }
        self.out.prefixes = self.prefixes;
        Ok(self.out)
    }

    // ---- lexing primitives ----

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> GraphdownError {
        GraphdownError::MalformedHeader {
            path: self.path.to_string(),
            line: self.line_offset + self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), GraphdownError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of header"))),
        }
    }

    /// Case-sensitive keyword lookahead with a word boundary after it. The
    /// boundary excludes name characters so that `a:x` or `true:x` lex as
    /// prefixed names, not keywords.
    fn at_keyword(&self, word: &str) -> bool {
        for (i, w) in word.chars().enumerate() {
            if self.peek_at(i) != Some(w) {
                return false;
            }
        }
        match self.peek_at(word.chars().count()) {
            Some(c) => !c.is_alphanumeric() && !matches!(c, '_' | ':' | '-'),
            None => true,
        }
    }

    fn consume_keyword(&mut self, word: &str) {
        for _ in word.chars() {
            self.bump();
        }
    }

    // ---- directives ----

    fn parse_at_directive(&mut self) -> Result<(), GraphdownError> {
        self.expect('@')?;
        if self.at_keyword("prefix") {
            self.consume_keyword("prefix");
            self.parse_prefix_body()?;
            self.skip_trivia();
            self.expect('.')
        } else if self.at_keyword("base") {
            self.consume_keyword("base");
            self.parse_base_body()?;
            self.skip_trivia();
            self.expect('.')
        } else {
            Err(self.error("unknown directive, expected '@prefix' or '@base'"))
        }
    }

    fn parse_sparql_prefix(&mut self) -> Result<(), GraphdownError> {
        self.consume_keyword("PREFIX");
        self.parse_prefix_body()
    }

    fn parse_sparql_base(&mut self) -> Result<(), GraphdownError> {
        self.consume_keyword("BASE");
        self.parse_base_body()
    }

    fn parse_prefix_body(&mut self) -> Result<(), GraphdownError> {
        self.skip_trivia();
        let name = self.read_prefix_name()?;
        self.expect(':')?;
        self.skip_trivia();
        let iri = self.read_iri_ref()?;
        self.prefixes.insert(name, iri);
        Ok(())
    }

    fn parse_base_body(&mut self) -> Result<(), GraphdownError> {
        self.skip_trivia();
        let iri = self.read_iri_ref()?;
        self.base = Some(iri);
        Ok(())
    }

    fn read_prefix_name(&mut self) -> Result<String, GraphdownError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // The empty prefix name is legal: `@prefix : <...> .`
        Ok(name)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<(), GraphdownError> {
        let subject = match self.parse_term(TermPosition::Subject)? {
            Term::Node(iri) => iri,
            Term::Value(lit) => {
                return Err(self.error(format!("a literal ({lit}) cannot be a subject")))
            }
        };
        if self.out.explicit_subject.is_none() {
            self.out.explicit_subject = Some(subject.clone());
        }
        self.out.layout.note_subject(&subject);

        let mut first = true;
        loop {
            self.skip_trivia();
            // Allow a dangling ';' before the terminating '.', but not a
            // statement with no predicate at all.
            if !first && self.peek() == Some('.') {
                self.bump();
                return Ok(());
            }
            first = false;
            let predicate = self.parse_predicate()?;
            self.out.layout.note_predicate(&subject, &predicate);
            loop {
                self.skip_trivia();
                let object = self.parse_term(TermPosition::Object)?;
                self.out
                    .facts
                    .push(Fact::new(subject.clone(), predicate.clone(), object));
                self.skip_trivia();
                if self.peek() == Some(',') {
                    self.bump();
                } else {
                    break;
                }
            }
            match self.peek() {
                Some(';') => {
                    self.bump();
                }
                Some('.') => {
                    self.bump();
                    return Ok(());
                }
                Some(c) => {
                    return Err(self.error(format!(
                        "expected ',', ';' or '.' after object, found '{c}'"
                    )))
                }
                None => return Err(self.error("statement is missing its terminating '.'")),
            }
        }
    }

    fn parse_predicate(&mut self) -> Result<Iri, GraphdownError> {
        self.skip_trivia();
        if self.at_keyword("a") {
            self.consume_keyword("a");
            return Ok(vocab::RDF_TYPE.clone());
        }
        match self.parse_term(TermPosition::Predicate)? {
            Term::Node(iri) => Ok(iri),
            Term::Value(lit) => Err(self.error(format!("a literal ({lit}) cannot be a predicate"))),
        }
    }

    fn parse_term(&mut self, position: TermPosition) -> Result<Term, GraphdownError> {
        self.skip_trivia();
        match self.peek() {
            Some('<') => {
                let iri = self.read_iri_ref()?;
                Ok(Term::Node(self.resolve_iri(&iri)?))
            }
            Some('"') if position == TermPosition::Object => self.parse_literal(),
            Some('"') => Err(self.error("string literal is not valid here")),
            Some(c) if (c.is_ascii_digit() || c == '+' || c == '-')
                && position == TermPosition::Object =>
            {
                self.parse_numeric()
            }
            Some('_') if self.peek_at(1) == Some(':') => {
                Err(self.error("blank nodes are not supported in document headers"))
            }
            Some(c) if c.is_alphanumeric() || c == ':' || c == '_' => {
                if position == TermPosition::Object {
                    if self.at_keyword("true") {
                        self.consume_keyword("true");
                        return Ok(Term::Value(Literal::boolean(true)));
                    }
                    if self.at_keyword("false") {
                        self.consume_keyword("false");
                        return Ok(Term::Value(Literal::boolean(false)));
                    }
                    if self.at_keyword("a") {
                        return Err(
                            self.error("the 'a' keyword is only valid in predicate position")
                        );
                    }
                }
                let iri = self.parse_prefixed_name()?;
                Ok(Term::Node(iri))
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of header")),
        }
    }

    fn read_iri_ref(&mut self) -> Result<String, GraphdownError> {
        self.expect('<')?;
        let mut iri = String::new();
        loop {
            match self.bump() {
                Some('>') => break,
                Some(c) if c == '\n' => {
                    return Err(self.error("IRI reference is missing its closing '>'"))
                }
                Some(c) => iri.push(c),
                None => return Err(self.error("IRI reference is missing its closing '>'")),
            }
        }
        Ok(iri)
    }

    fn resolve_iri(&self, raw: &str) -> Result<Iri, GraphdownError> {
        if let Ok(iri) = Iri::new(raw) {
            return Ok(iri);
        }
        match &self.base {
            Some(base) => {
                let joined = url::Url::parse(base)
                    .and_then(|b| b.join(raw))
                    .map_err(|e| self.error(format!("cannot resolve <{raw}> against base: {e}")))?;
                Ok(Iri::new_unchecked(joined.to_string()))
            }
            None => Err(self.error(format!(
                "<{raw}> is relative and no @base is declared"
            ))),
        }
    }

    fn parse_prefixed_name(&mut self) -> Result<Iri, GraphdownError> {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, ':' | '_' | '-' | '.' | '%') {
                token.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // A trailing '.' belongs to the statement, not the name.
        while token.ends_with('.') {
            token.pop();
            self.pos -= 1;
            self.column -= 1;
        }
        let Some((prefix, local)) = token.split_once(':') else {
            return Err(self.error(format!("'{token}' is not a prefixed name (missing ':')")));
        };
        let Some(namespace) = self.prefixes.get(prefix) else {
            return Err(self.error(format!("prefix '{prefix}:' is not declared")));
        };
        Ok(Iri::new_unchecked(format!("{namespace}{local}")))
    }

    fn parse_numeric(&mut self) -> Result<Term, GraphdownError> {
        let mut lexeme = String::new();
        if matches!(self.peek(), Some('+') | Some('-')) {
            lexeme.push(self.bump().unwrap_or_default());
        }
        let mut has_digits = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                has_digits = true;
                lexeme.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut decimal = false;
        // `5.` is the integer 5 followed by the statement terminator; only
        // consume the dot when digits follow it.
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            decimal = true;
            lexeme.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            decimal = true;
            lexeme.push(self.bump().unwrap_or_default());
            if matches!(self.peek(), Some('+') | Some('-')) {
                lexeme.push(self.bump().unwrap_or_default());
            }
            let mut exp_digits = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    exp_digits = true;
                    lexeme.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if !exp_digits {
                return Err(self.error(format!("malformed exponent in number '{lexeme}'")));
            }
        }
        if !has_digits {
            return Err(self.error(format!("malformed number '{lexeme}'")));
        }
        if decimal {
            Ok(Term::Value(Literal::decimal_lexeme(lexeme)))
        } else {
            Ok(Term::Value(Literal::integer_lexeme(lexeme)))
        }
    }

    fn parse_literal(&mut self) -> Result<Term, GraphdownError> {
        let lexeme = self.read_string_body()?;
        match self.peek() {
            Some('@') => {
                self.bump();
                let mut tag = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        tag.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                if tag.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                Ok(Term::Value(Literal::lang_text(lexeme, tag)))
            }
            Some('^') => {
                self.bump();
                self.expect('^')?;
                let datatype = match self.peek() {
                    Some('<') => {
                        let raw = self.read_iri_ref()?;
                        self.resolve_iri(&raw)?
                    }
                    _ => self.parse_prefixed_name()?,
                };
                Ok(Term::Value(self.typed_literal(lexeme, &datatype)))
            }
            _ => Ok(Term::Value(Literal::text(lexeme))),
        }
    }

    fn read_string_body(&mut self) -> Result<String, GraphdownError> {
        self.expect('"')?;
        let long = self.peek() == Some('"') && self.peek_at(1) == Some('"');
        if long {
            self.bump();
            self.bump();
        }
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') if long => {
                    // In long form the last three quotes of a run close the
                    // literal; preceding quotes belong to the content.
                    let mut run = 1;
                    while self.peek() == Some('"') {
                        self.bump();
                        run += 1;
                    }
                    if run >= 3 {
                        for _ in 0..run - 3 {
                            value.push('"');
                        }
                        return Ok(value);
                    }
                    for _ in 0..run {
                        value.push('"');
                    }
                }
                Some('"') => return Ok(value),
                Some('\\') => value.push(self.read_escape()?),
                Some('\n') if !long => {
                    return Err(self.error("string literal is missing its closing '\"'"))
                }
                Some(c) => value.push(c),
                None => return Err(self.error("string literal is missing its closing '\"'")),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, GraphdownError> {
        match self.bump() {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('u') => self.read_unicode_escape(4),
            Some('U') => self.read_unicode_escape(8),
            Some(c) => Err(self.error(format!("unknown escape sequence '\\{c}'"))),
            None => Err(self.error("dangling escape at end of header")),
        }
    }

    fn read_unicode_escape(&mut self, width: usize) -> Result<char, GraphdownError> {
        let mut code = 0u32;
        for _ in 0..width {
            let Some(c) = self.bump() else {
                return Err(self.error("truncated unicode escape"));
            };
            let Some(digit) = c.to_digit(16) else {
                return Err(self.error(format!("'{c}' is not a hex digit in unicode escape")));
            };
            code = code * 16 + digit;
        }
        char::from_u32(code)
            .ok_or_else(|| self.error(format!("U+{code:04X} is not a valid character")))
    }

    fn typed_literal(&mut self, lexeme: String, datatype: &Iri) -> Literal {
        let dt = datatype.as_str();
        let local = dt.strip_prefix(vocab::XSD_NS);
        match local {
            Some("integer") | Some("int") | Some("long") => {
                if crate::schema::is_integer_lexeme(&lexeme) {
                    Literal::integer_lexeme(lexeme)
                } else {
                    self.downgraded(lexeme, dt)
                }
            }
            Some("decimal") | Some("double") | Some("float") => {
                if crate::schema::is_decimal_lexeme(&lexeme) {
                    Literal::decimal_lexeme(lexeme)
                } else {
                    self.downgraded(lexeme, dt)
                }
            }
            Some("boolean") => match lexeme.as_str() {
                "true" | "1" => Literal::boolean(true),
                "false" | "0" => Literal::boolean(false),
                _ => self.downgraded(lexeme, dt),
            },
            Some("date") => {
                if crate::model::is_date_lexeme(&lexeme) {
                    Literal::date(lexeme)
                } else {
                    self.downgraded(lexeme, dt)
                }
            }
            Some("string") => Literal::text(lexeme),
            _ => {
                self.out.diagnostics.push(SyncDiagnostic::warning(format!(
                    "unknown datatype <{dt}> at line {}; literal kept as plain text",
                    self.line_offset + self.line
                )));
                Literal::text(lexeme)
            }
        }
    }

    fn downgraded(&mut self, lexeme: String, datatype: &str) -> Literal {
        self.out.diagnostics.push(SyncDiagnostic::warning(format!(
            "'{lexeme}' is not a valid {datatype} lexical form at line {}; literal kept as plain text",
            self.line_offset + self.line
        )));
        Literal::text(lexeme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermPosition {
    Subject,
    Predicate,
    Object,
}

// ---- writer ----

/// Serialize facts as a native-triple header region.
///
/// All facts about one subject form one statement group: the primary
/// subject first, remaining subjects in identifier order. Within a group,
/// predicates follow the layout's first-seen order when available (with
/// unknown predicates appended in identifier order); otherwise `rdf:type`
/// leads and the rest are in identifier order. Objects of one predicate are
/// comma-joined in term order. The output is deterministic: equal inputs
/// produce identical bytes.
pub fn write_header(
    facts: &TripleSet,
    primary: &Iri,
    layout: &StatementLayout,
    doc_prefixes: &BTreeMap<String, String>,
) -> Result<String, GraphdownError> {
    let mut namespaces: Vec<(String, String)> = Vec::new();
    for (name, ns) in vocab::STANDARD_PREFIXES.iter() {
        namespaces.push((name.to_string(), ns.to_string()));
    }
    for (name, ns) in doc_prefixes {
        namespaces.retain(|(n, _)| n != name);
        namespaces.push((name.clone(), ns.clone()));
    }

    let mut subjects: Vec<&Iri> = Vec::new();
    if facts.iter().any(|f| f.subject == *primary) {
        subjects.push(primary);
    }
    for subject in facts.subjects() {
        if subject != primary {
            subjects.push(subject);
        }
    }

    let mut used = std::collections::BTreeSet::new();
    let mut statements = String::new();
    for subject in subjects {
        let slice = facts.filter_subject(subject);
        let predicates = order_predicates(&slice, layout.predicates_of(subject));
        let subject_text = compact(subject, &namespaces, &mut used);
        for (i, predicate) in predicates.iter().enumerate() {
            let objects: Vec<String> = slice
                .iter()
                .filter(|f| f.predicate == *predicate)
                .map(|f| format_term(&f.object, &namespaces, &mut used))
                .collect::<Result<_, _>>()?;
            let predicate_text = if *predicate == *vocab::RDF_TYPE {
                "a".to_string()
            } else {
                compact(predicate, &namespaces, &mut used)
            };
            if i == 0 {
                write!(statements, "{subject_text} {predicate_text} {}", objects.join(", "))?;
            } else {
                write!(statements, " ;\n    {predicate_text} {}", objects.join(", "))?;
            }
        }
        statements.push_str(" .\n");
    }

    let mut header = String::new();
    for (name, ns) in &namespaces {
        if used.contains(name.as_str()) {
            writeln!(header, "@prefix {name}: <{ns}> .")?;
        }
    }
    if !header.is_empty() && !statements.is_empty() {
        header.push('\n');
    }
    header.push_str(&statements);
    Ok(header)
}

/// Deterministic predicate order for one subject's statement group.
fn order_predicates(slice: &TripleSet, known_order: Option<&[Iri]>) -> Vec<Iri> {
    let mut present: std::collections::BTreeSet<Iri> =
        slice.iter().map(|f| f.predicate.clone()).collect();
    let mut ordered = Vec::with_capacity(present.len());
    if let Some(known) = known_order {
        for predicate in known {
            if present.remove(predicate) {
                ordered.push(predicate.clone());
            }
        }
    } else if present.remove(&vocab::RDF_TYPE) {
        ordered.push(vocab::RDF_TYPE.clone());
    }
    ordered.extend(present);
    ordered
}

/// Render an identifier as `prefix:local` when a declared namespace covers
/// it and the local part is safe, falling back to `<full>` form.
fn compact(
    iri: &Iri,
    namespaces: &[(String, String)],
    used: &mut std::collections::BTreeSet<String>,
) -> String {
    let text = iri.as_str();
    let mut best: Option<(&str, &str)> = None;
    for (name, ns) in namespaces {
        if let Some(local) = text.strip_prefix(ns.as_str()) {
            if best.is_none_or(|(_, b)| ns.len() > text.len() - b.len()) {
                best = Some((name, local));
            }
        }
    }
    match best {
        Some((name, local)) if !local.is_empty() && is_safe_local(local) => {
            used.insert(name.to_string());
            format!("{name}:{local}")
        }
        _ => format!("<{text}>"),
    }
}

fn is_safe_local(local: &str) -> bool {
    !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn format_term(
    term: &Term,
    namespaces: &[(String, String)],
    used: &mut std::collections::BTreeSet<String>,
) -> Result<String, GraphdownError> {
    use crate::model::LiteralKind;
    Ok(match term {
        Term::Node(iri) => compact(iri, namespaces, used),
        Term::Value(lit) => match lit.kind() {
            LiteralKind::Text => format!("\"{}\"", escape_text(lit.lexeme())),
            LiteralKind::LangText(tag) => {
                format!("\"{}\"@{tag}", escape_text(lit.lexeme()))
            }
            LiteralKind::Integer => lit.lexeme().to_string(),
            LiteralKind::Boolean => lit.lexeme().to_string(),
            LiteralKind::Decimal => {
                if is_bare_decimal(lit.lexeme()) {
                    lit.lexeme().to_string()
                } else {
                    used.insert("xsd".to_string());
                    format!("\"{}\"^^xsd:decimal", lit.lexeme())
                }
            }
            LiteralKind::Date => {
                used.insert("xsd".to_string());
                format!("\"{}\"^^xsd:date", lit.lexeme())
            }
        },
    })
}

/// True when a decimal lexeme re-parses unquoted as the same decimal:
/// digits on both sides of any dot, a well-formed exponent, and at least
/// one of the two. Forms like `.5`, `5.` or a plain `5` would lex
/// differently and must take the `^^xsd:decimal` route instead.
fn is_bare_decimal(lexeme: &str) -> bool {
    let unsigned = lexeme.strip_prefix(['+', '-']).unwrap_or(lexeme);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (unsigned, None),
    };
    let mantissa_ok = match mantissa.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => !mantissa.is_empty() && mantissa.bytes().all(|b| b.is_ascii_digit()),
    };
    let exponent_ok = exponent.is_none_or(|e| {
        let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    });
    mantissa_ok && exponent_ok && (mantissa.contains('.') || exponent.is_some())
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LiteralKind;

    fn parse(header: &str) -> ParsedHeader {
        parse_header("test.md", header, 0).expect("header should parse")
    }

    fn parse_err(header: &str) -> GraphdownError {
        parse_header("test.md", header, 0).expect_err("header should fail")
    }

    #[test]
    fn test_basic_statement() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:task:T-001> gd:title \"Test Task\" .\n",
        ));
        assert_eq!(parsed.facts.len(), 1);
        assert_eq!(
            parsed.explicit_subject.as_ref().map(|s| s.as_str()),
            Some("urn:task:T-001")
        );
        assert_eq!(parsed.facts[0].predicate, *vocab::TITLE);
        assert_eq!(parsed.facts[0].object, Term::text("Test Task"));
    }

    #[test]
    fn test_a_keyword_and_semicolons() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:x> a gd:Document ;\n",
            "    gd:status \"pending\" ;\n",
            "    gd:priority 1 .\n",
        ));
        assert_eq!(parsed.facts.len(), 3);
        assert_eq!(parsed.facts[0].predicate, *vocab::RDF_TYPE);
        assert_eq!(
            parsed.facts[0].object.as_node().map(|n| n.as_str()),
            Some("https://graphdown.dev/schema/Document")
        );
        assert_eq!(parsed.facts[2].object, Term::integer(1));
    }

    #[test]
    fn test_comma_object_lists() {
        let parsed = parse(concat!(
            "@prefix lab: <https://lab.example/ns#> .\n",
            "<urn:doc:report> lab:specimen \"Serum\", \"Plasma\" .\n",
        ));
        assert_eq!(parsed.facts.len(), 2);
        assert_eq!(parsed.facts[0].object, Term::text("Serum"));
        assert_eq!(parsed.facts[1].object, Term::text("Plasma"));
        assert_eq!(parsed.facts[0].predicate, parsed.facts[1].predicate);
    }

    #[test]
    fn test_sparql_style_prefix() {
        let parsed = parse(concat!(
            "PREFIX gd: <https://graphdown.dev/schema/>\n",
            "<urn:doc:x> gd:title \"t\" .\n",
        ));
        assert_eq!(parsed.facts.len(), 1);
    }

    #[test]
    fn test_base_resolution() {
        let parsed = parse(concat!(
            "@base <https://example.org/docs/> .\n",
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<note-1> gd:title \"t\" .\n",
        ));
        assert_eq!(
            parsed.facts[0].subject.as_str(),
            "https://example.org/docs/note-1"
        );
    }

    #[test]
    fn test_literal_types() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n",
            "<urn:doc:x> gd:count 42 ;\n",
            "    gd:ratio 2.5 ;\n",
            "    gd:flag true ;\n",
            "    gd:when \"2024-06-01\"^^xsd:date ;\n",
            "    gd:greeting \"bonjour\"@fr ;\n",
            "    gd:edge \"5\"^^xsd:decimal .\n",
        ));
        let kinds: Vec<LiteralKind> = parsed
            .facts
            .iter()
            .filter_map(|f| f.object.as_value().map(|l| l.kind().clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                LiteralKind::Integer,
                LiteralKind::Decimal,
                LiteralKind::Boolean,
                LiteralKind::Date,
                LiteralKind::LangText("fr".to_string()),
                LiteralKind::Decimal,
            ]
        );
    }

    #[test]
    fn test_integer_followed_by_terminator_dot() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:x> gd:priority 5.\n",
        ));
        assert_eq!(parsed.facts[0].object, Term::integer(5));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let parsed = parse(concat!(
            "# header comment\n",
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "\n",
            "<urn:doc:x> gd:title \"t\" . # trailing comment\n",
        ));
        assert_eq!(parsed.facts.len(), 1);
    }

    #[test]
    fn test_string_escapes() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:x> gd:title \"say \\\"hi\\\"\\n\\u00e9\" .\n",
        ));
        assert_eq!(parsed.facts[0].object, Term::text("say \"hi\"\né"));
    }

    #[test]
    fn test_long_string() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:x> gd:summary \"\"\"line one\nline \"two\"\"\"\" .\n",
        ));
        assert_eq!(parsed.facts[0].object, Term::text("line one\nline \"two\""));
    }

    #[test]
    fn test_undeclared_prefix_is_fatal() {
        let err = parse_err("<urn:doc:x> gd:title \"t\" .\n");
        match err {
            GraphdownError::MalformedHeader { line, message, .. } => {
                assert_eq!(line, 1);
                assert!(message.contains("'gd:'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_terminator_is_fatal() {
        let err = parse_err(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:x> gd:title \"t\"\n",
        ));
        assert!(matches!(err, GraphdownError::MalformedHeader { .. }));
    }

    #[test]
    fn test_blank_node_rejected() {
        let err = parse_err(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "_:b0 gd:title \"t\" .\n",
        ));
        assert!(matches!(err, GraphdownError::MalformedHeader { .. }));
    }

    #[test]
    fn test_line_offset_in_errors() {
        let err = parse_header("doc.md", "<urn:doc:x> missing-colon \"t\" .\n", 1)
            .expect_err("should fail");
        match err {
            GraphdownError::MalformedHeader { line, path, .. } => {
                assert_eq!(line, 2);
                assert_eq!(path, "doc.md");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_datatype_downgrades_with_warning() {
        let parsed = parse(concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "@prefix ex: <https://example.org/> .\n",
            "<urn:doc:x> gd:odd \"v\"^^ex:custom .\n",
        ));
        assert_eq!(parsed.facts[0].object, Term::text("v"));
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_writer_groups_objects() {
        let lab = "https://lab.example/ns#";
        let subject = Iri::new_unchecked("urn:doc:report");
        let facts: TripleSet = [
            Fact::new(
                subject.clone(),
                Iri::new_unchecked(format!("{lab}specimen")),
                Term::text("Serum"),
            ),
            Fact::new(
                subject.clone(),
                Iri::new_unchecked(format!("{lab}specimen")),
                Term::text("Plasma"),
            ),
        ]
        .into_iter()
        .collect();
        let mut prefixes = BTreeMap::new();
        prefixes.insert("lab".to_string(), lab.to_string());

        let header =
            write_header(&facts, &subject, &StatementLayout::default(), &prefixes).unwrap();
        assert!(header.contains("@prefix lab: <https://lab.example/ns#> ."));
        // One statement, objects comma-joined in term order.
        assert!(header.contains("<urn:doc:report> lab:specimen \"Plasma\", \"Serum\" ."));
        assert_eq!(header.matches("specimen").count(), 1);
    }

    #[test]
    fn test_writer_is_deterministic_and_reparses_equal() {
        let raw = concat!(
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "@prefix lab: <https://lab.example/ns#> .\n",
            "<urn:doc:report> a gd:Document ;\n",
            "    gd:title \"Lab Report\" ;\n",
            "    lab:specimen \"Serum\", \"Plasma\" ;\n",
            "    gd:priority 2 .\n",
        );
        let parsed = parse(raw);
        let set: TripleSet = parsed.facts.iter().cloned().collect();
        let subject = parsed.explicit_subject.clone().unwrap();

        let first = write_header(&set, &subject, &parsed.layout, &parsed.prefixes).unwrap();
        let second = write_header(&set, &subject, &parsed.layout, &parsed.prefixes).unwrap();
        assert_eq!(first, second);

        let reparsed = parse(&first);
        let reparsed_set: TripleSet = reparsed.facts.iter().cloned().collect();
        assert_eq!(set, reparsed_set);
        // Layout preserved: title still precedes specimen.
        let title_at = first.find("gd:title").unwrap();
        let specimen_at = first.find("lab:specimen").unwrap();
        assert!(title_at < specimen_at);
    }

    #[test]
    fn test_decimal_forms_roundtrip() {
        let subject = Iri::new_unchecked("urn:doc:x");
        let p = Iri::new_unchecked("https://graphdown.dev/schema/ratio");
        let facts: TripleSet = [
            Fact::new(subject.clone(), p.clone(), Literal::decimal_lexeme("2.5")),
            Fact::new(subject.clone(), p.clone(), Literal::decimal_lexeme("1e5")),
            Fact::new(subject.clone(), p.clone(), Literal::decimal_lexeme("1.5E-3")),
            Fact::new(subject.clone(), p.clone(), Literal::decimal_lexeme(".5")),
            Fact::new(subject.clone(), p.clone(), Literal::decimal_lexeme("5")),
        ]
        .into_iter()
        .collect();

        let header =
            write_header(&facts, &subject, &StatementLayout::default(), &BTreeMap::new()).unwrap();
        // Forms that would lex differently unquoted go through xsd:decimal.
        assert!(header.contains("\".5\"^^xsd:decimal"));
        assert!(header.contains("\"5\"^^xsd:decimal"));
        assert!(header.contains("1e5"));

        let reparsed = parse(&header);
        let reparsed_set: TripleSet = reparsed.facts.iter().cloned().collect();
        assert_eq!(reparsed_set, facts);
    }

    #[test]
    fn test_writer_orders_secondary_subjects() {
        let p = Iri::new_unchecked("https://graphdown.dev/schema/title");
        let facts: TripleSet = [
            Fact::new(Iri::new_unchecked("urn:doc:b"), p.clone(), Term::text("b")),
            Fact::new(Iri::new_unchecked("urn:doc:a"), p.clone(), Term::text("a")),
            Fact::new(Iri::new_unchecked("urn:doc:z"), p.clone(), Term::text("z")),
        ]
        .into_iter()
        .collect();
        let primary = Iri::new_unchecked("urn:doc:z");
        let header =
            write_header(&facts, &primary, &StatementLayout::default(), &BTreeMap::new()).unwrap();
        let z = header.find("<urn:doc:z>").unwrap();
        let a = header.find("<urn:doc:a>").unwrap();
        let b = header.find("<urn:doc:b>").unwrap();
        assert!(z < a && a < b);
    }
}
