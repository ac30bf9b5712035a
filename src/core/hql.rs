// =============================================================================
// HQL — Le langage de requête texte
// =============================================================================
//
// Le second style des exercices : la requête écrite comme une chaîne.
//
//   select [distinct] <expr> [as label], ...  |  select new Entity(<expr>, ...)
//   from Entity alias
//     [left [outer] | inner] join alias.relation alias [with <prédicat>]
//     [where <prédicat>]
//     [group by <expr>, ...] [having <prédicat>]
//     [order by <expr> [asc|desc], ...]
//
// Littéraux : 'chaîne', 42, 1.6, true, false, null, date '2021-12-11',
// timestamp '2021-12-11 08:30:00', énumérations `CarType.Honda`, paramètres
// nommés `:since` (liés ensuite avec Query::bind).
//
// Les mots-clés ignorent la casse. Une erreur de syntaxe porte la position
// (en octets) du lexème fautif.
//
// Le résultat est un `Query` identique à celui du constructeur typé : les
// deux styles passent par le même évaluateur.
//
// =============================================================================

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::query::{
    AggFunc, CompOp, Expr, FieldRef, Join, JoinKind, OrderItem, Predicate, Query, ResultMode,
    SelectItem, Selection,
};
use super::typeside::{Typeside, Value};
use crate::error::QueryError;

const KEYWORDS: &[&str] = &[
    "select", "distinct", "new", "from", "left", "outer", "inner", "join", "with", "where", "group",
    "by", "having", "order", "asc", "desc", "and", "or", "not", "is", "null", "in", "exists", "case",
    "when", "then", "else", "end", "true", "false", "as",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

// -----------------------------------------------------------------------------
// Lexer
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Dec(Decimal),
    Param(String),
    Sym(&'static str),
    Eof,
}

static EOF: Tok = Tok::Eof;

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn parse_error(offset: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse { offset, message: message.into() }
}

fn lex(text: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token { tok: Tok::Ident(text[start..i].to_string()), offset: start });
            continue;
        }

        if c.is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let is_decimal = i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit();
            if is_decimal {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let d = Decimal::from_str(&text[start..i])
                    .map_err(|e| parse_error(start, format!("nombre invalide : {}", e)))?;
                tokens.push(Token { tok: Tok::Dec(d), offset: start });
            } else {
                let n = text[start..i]
                    .parse::<i64>()
                    .map_err(|e| parse_error(start, format!("entier invalide : {}", e)))?;
                tokens.push(Token { tok: Tok::Int(n), offset: start });
            }
            continue;
        }

        if c == b'\'' {
            let mut value = String::new();
            i += 1;
            loop {
                let Some(rest) = text.get(i..) else {
                    return Err(parse_error(start, "chaîne non terminée"));
                };
                match rest.find('\'') {
                    None => return Err(parse_error(start, "chaîne non terminée")),
                    Some(end) => {
                        value.push_str(&rest[..end]);
                        i += end + 1;
                        // '' dans une chaîne = apostrophe
                        if bytes.get(i) == Some(&b'\'') {
                            value.push('\'');
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            tokens.push(Token { tok: Tok::Str(value), offset: start });
            continue;
        }

        if c == b':' {
            i += 1;
            let name_start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            if i == name_start {
                return Err(parse_error(start, "nom de paramètre attendu après ':'"));
            }
            tokens.push(Token { tok: Tok::Param(text[name_start..i].to_string()), offset: start });
            continue;
        }

        let two = text.get(i..i + 2).unwrap_or_default();
        let sym: &'static str = match two {
            "!=" => "!=",
            "<>" => "!=",
            "<=" => "<=",
            ">=" => ">=",
            _ => match c {
                b'(' => "(",
                b')' => ")",
                b',' => ",",
                b'.' => ".",
                b'[' => "[",
                b']' => "]",
                b'=' => "=",
                b'<' => "<",
                b'>' => ">",
                b'+' => "+",
                b'-' => "-",
                b'*' => "*",
                b'/' => "/",
                _ => {
                    let ch = text[i..].chars().next().unwrap_or('?');
                    return Err(parse_error(start, format!("caractère inattendu '{}'", ch)));
                }
            },
        };
        i += if matches!(two, "!=" | "<>" | "<=" | ">=") { 2 } else { 1 };
        tokens.push(Token { tok: Tok::Sym(sym), offset: start });
    }

    tokens.push(Token { tok: Tok::Eof, offset: text.len() });
    Ok(tokens)
}

// -----------------------------------------------------------------------------
// Parser (descente récursive)
// -----------------------------------------------------------------------------

enum SelectClause {
    Items(Vec<SelectItem>),
    New { entity: String, args: Vec<SelectItem> },
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    typeside: &'a Typeside,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map(|t| &t.tok)
            .unwrap_or(&EOF)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.offset)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        parse_error(self.offset(), message)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("'{}' attendu", keyword)))
        }
    }

    fn is_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.is_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), QueryError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("'{}' attendu", sym)))
        }
    }

    /// Un identifiant qui n'est pas un mot-clé.
    fn identifier(&mut self, what: &str) -> Result<String, QueryError> {
        match self.peek().clone() {
            Tok::Ident(word) if !is_keyword(&word) => {
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.error(format!("{} attendu", what))),
        }
    }

    /// Segment de chemin après un point : les mots-clés sont admis.
    fn segment(&mut self) -> Result<String, QueryError> {
        match self.peek().clone() {
            Tok::Ident(word) => {
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.error("nom d'attribut ou de relation attendu")),
        }
    }

    fn field_ref(&mut self) -> Result<FieldRef, QueryError> {
        let alias = self.identifier("alias")?;
        let mut path = Vec::new();
        while self.eat_sym(".") {
            path.push(self.segment()?);
        }
        Ok(FieldRef { alias, path })
    }

    fn comma_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T, QueryError>) -> Result<Vec<T>, QueryError> {
        let mut items = vec![item(self)?];
        while self.eat_sym(",") {
            items.push(item(self)?);
        }
        Ok(items)
    }

    // --- requête ------------------------------------------------------------

    fn query(&mut self) -> Result<Query, QueryError> {
        let mut distinct = false;
        let select = if self.eat_keyword("select") {
            distinct = self.eat_keyword("distinct");
            Some(self.select_clause()?)
        } else {
            None
        };

        self.expect_keyword("from")?;
        let root = self.identifier("entité")?;
        let alias = self.identifier("alias")?;
        let mut query = Query::from(&root, &alias);

        while self.is_keyword("join") || self.is_keyword("left") || self.is_keyword("inner") {
            let kind = if self.eat_keyword("left") {
                self.eat_keyword("outer");
                JoinKind::Left
            } else {
                self.eat_keyword("inner");
                JoinKind::Inner
            };
            self.expect_keyword("join")?;
            let path = self.field_ref()?;
            let join_alias = self.identifier("alias de jointure")?;
            let filter = if self.eat_keyword("with") { Some(self.predicate()?) } else { None };
            query.joins.push(Join { kind, path, alias: join_alias, filter });
        }

        if self.eat_keyword("where") {
            query.filter = Some(self.predicate()?);
        }
        if self.eat_keyword("group") {
            self.expect_keyword("by")?;
            query.group_by = self.comma_list(Self::expr)?;
        }
        if self.eat_keyword("having") {
            query.having = Some(self.predicate()?);
        }
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            query.order_by = self.comma_list(|p| {
                let expr = p.expr()?;
                let descending = if p.eat_keyword("desc") {
                    true
                } else {
                    p.eat_keyword("asc");
                    false
                };
                Ok(OrderItem { expr, descending })
            })?;
        }
        if *self.peek() != Tok::Eof {
            return Err(self.error("fin de requête attendue"));
        }

        let root_only = |items: &[SelectItem]| {
            matches!(items, [SelectItem { expr: Expr::Field(f), .. }] if f.alias == alias && f.path.is_empty())
        };
        match select {
            None => {}
            Some(SelectClause::Items(items)) if root_only(&items) => {
                if distinct {
                    query.mode = ResultMode::DistinctRootEntity;
                }
            }
            Some(SelectClause::Items(items)) => {
                query.selection = Selection::Columns(items);
                if distinct {
                    query.mode = ResultMode::Distinct;
                }
            }
            Some(SelectClause::New { entity, args }) => {
                query.selection = Selection::New { entity, args };
                if distinct {
                    query.mode = ResultMode::Distinct;
                }
            }
        }
        Ok(query)
    }

    fn select_clause(&mut self) -> Result<SelectClause, QueryError> {
        if self.eat_keyword("new") {
            let entity = self.identifier("entité")?;
            self.expect_sym("(")?;
            let args = self.comma_list(|p| {
                let expr = p.expr()?;
                Ok(SelectItem { label: expr.label(), expr })
            })?;
            self.expect_sym(")")?;
            return Ok(SelectClause::New { entity, args });
        }
        let items = self.comma_list(|p| {
            let expr = p.expr()?;
            let label = if p.eat_keyword("as") { p.identifier("nom de colonne")? } else { expr.label() };
            Ok(SelectItem { expr, label })
        })?;
        Ok(SelectClause::Items(items))
    }

    // --- prédicats ----------------------------------------------------------

    fn predicate(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.and_predicate()?];
        while self.eat_keyword("or") {
            parts.push(self.and_predicate()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::Or(parts) })
    }

    fn and_predicate(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.not_predicate()?];
        while self.eat_keyword("and") {
            parts.push(self.not_predicate()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::And(parts) })
    }

    fn not_predicate(&mut self) -> Result<Predicate, QueryError> {
        if self.eat_keyword("not") {
            return Ok(Predicate::Not(Box::new(self.not_predicate()?)));
        }
        self.primary_predicate()
    }

    fn primary_predicate(&mut self) -> Result<Predicate, QueryError> {
        if self.eat_keyword("exists") {
            self.expect_sym("(")?;
            let path = self.field_ref()?;
            let alias = self.identifier("alias")?;
            self.expect_keyword("where")?;
            let filter = self.predicate()?;
            self.expect_sym(")")?;
            return Ok(Predicate::Any { path, alias, filter: Box::new(filter) });
        }

        // `(` ouvre soit un prédicat groupé, soit une expression : on tente
        // le prédicat, puis on revient en arrière.
        if self.is_sym("(") {
            let saved = self.pos;
            self.pos += 1;
            if let Ok(inner) = self.predicate() {
                if self.eat_sym(")") {
                    return Ok(inner);
                }
            }
            self.pos = saved;
        }

        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate, QueryError> {
        let left = self.expr()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            self.expect_keyword("null")?;
            return Ok(Predicate::IsNull { expr: left, negated });
        }
        if self.is_keyword("not") && matches!(self.peek_at(1), Tok::Ident(w) if w.eq_ignore_ascii_case("in")) {
            self.pos += 2;
            let list = self.in_list()?;
            return Ok(Predicate::Not(Box::new(Predicate::InList { expr: left, list })));
        }
        if self.eat_keyword("in") {
            let list = self.in_list()?;
            return Ok(Predicate::InList { expr: left, list });
        }

        let op = match self.peek() {
            Tok::Sym("=") => CompOp::Eq,
            Tok::Sym("!=") => CompOp::Neq,
            Tok::Sym("<") => CompOp::Lt,
            Tok::Sym(">") => CompOp::Gt,
            Tok::Sym("<=") => CompOp::Lte,
            Tok::Sym(">=") => CompOp::Gte,
            _ => return Err(self.error("opérateur de comparaison attendu")),
        };
        self.pos += 1;
        let right = self.expr()?;
        Ok(Predicate::Compare { left, op, right })
    }

    fn in_list(&mut self) -> Result<Vec<Expr>, QueryError> {
        self.expect_sym("(")?;
        let list = self.comma_list(Self::expr)?;
        self.expect_sym(")")?;
        Ok(list)
    }

    // --- expressions --------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.term()?;
        loop {
            if self.eat_sym("+") {
                left = left + self.term()?;
            } else if self.eat_sym("-") {
                left = left - self.term()?;
            } else {
                return Ok(left);
            }
        }
    }

    fn term(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.atom()?;
        loop {
            if self.eat_sym("*") {
                left = left * self.atom()?;
            } else if self.eat_sym("/") {
                left = left / self.atom()?;
            } else {
                return Ok(left);
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, QueryError> {
        let offset = self.offset();
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Literal(Value::Integer(i))),
            Tok::Dec(d) => Ok(Expr::Literal(Value::Decimal(d))),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Tok::Param(name) => Ok(Expr::Param(name)),
            Tok::Sym("(") => {
                let inner = self.expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Sym("-") => match self.atom()? {
                Expr::Literal(Value::Integer(i)) => Ok(Expr::Literal(Value::Integer(-i))),
                Expr::Literal(Value::Decimal(d)) => Ok(Expr::Literal(Value::Decimal(-d))),
                other => Ok(Expr::Literal(Value::Integer(0)) - other),
            },
            Tok::Ident(word) => self.word(word, offset),
            Tok::Eof => Err(parse_error(offset, "expression attendue, fin de requête")),
            Tok::Sym(s) => Err(parse_error(offset, format!("expression attendue, '{}' trouvé", s))),
        }
    }

    /// Expression commençant par un mot : littéral, fonction ou chemin.
    fn word(&mut self, word: String, offset: usize) -> Result<Expr, QueryError> {
        let lower = word.to_ascii_lowercase();
        let call = self.is_sym("(");
        match lower.as_str() {
            "true" => return Ok(Expr::Literal(Value::Boolean(true))),
            "false" => return Ok(Expr::Literal(Value::Boolean(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            "case" => return self.case_expr(),
            "date" | "timestamp" if matches!(self.peek(), Tok::Str(_)) => {
                let Tok::Str(text) = self.advance() else {
                    return Err(parse_error(offset, "date attendue"));
                };
                return datetime_literal(&lower, &text)
                    .map(|t| Expr::Literal(Value::Timestamp(t)))
                    .ok_or_else(|| parse_error(offset, format!("{} invalide : '{}'", lower, text)));
            }
            "count" | "sum" | "min" | "max" | "avg" if call => return self.aggregate(&lower),
            "size" | "kilometers" if call => {
                self.pos += 1;
                let field = self.field_ref()?;
                self.expect_sym(")")?;
                return Ok(if lower == "size" { Expr::Size(field) } else { Expr::Kilometers(field) });
            }
            _ => {}
        }
        if is_keyword(&word) {
            return Err(parse_error(offset, format!("expression attendue, '{}' trouvé", word)));
        }

        let mut path = Vec::new();
        while self.eat_sym(".") {
            path.push(self.segment()?);
        }

        if let [variant] = path.as_slice() {
            if self.typeside.enums.contains_key(&word) {
                return self
                    .typeside
                    .enum_value(&word, variant)
                    .map(Expr::Literal)
                    .ok_or_else(|| parse_error(offset, format!("{}.{} n'est pas une variante connue", word, variant)));
            }
        }

        let field = FieldRef { alias: word, path };
        if self.eat_sym("[") {
            let key = match self.advance() {
                Tok::Str(key) => key,
                _ => return Err(self.error("clé entre apostrophes attendue")),
            };
            self.expect_sym("]")?;
            return Ok(Expr::MapEntry { field, key });
        }
        Ok(Expr::Field(field))
    }

    fn aggregate(&mut self, name: &str) -> Result<Expr, QueryError> {
        let func = match name {
            "count" => AggFunc::Count,
            "sum" => AggFunc::Sum,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            _ => AggFunc::Avg,
        };
        self.expect_sym("(")?;
        if self.eat_sym("*") {
            if func != AggFunc::Count {
                return Err(self.error(format!("{}(*) n'existe pas", func)));
            }
            self.expect_sym(")")?;
            return Ok(Expr::Aggregate { func, arg: None, distinct: false });
        }
        let distinct = self.eat_keyword("distinct");
        let arg = self.expr()?;
        self.expect_sym(")")?;
        Ok(Expr::Aggregate { func, arg: Some(Box::new(arg)), distinct })
    }

    fn case_expr(&mut self) -> Result<Expr, QueryError> {
        let mut branches = Vec::new();
        while self.eat_keyword("when") {
            let when = self.predicate()?;
            self.expect_keyword("then")?;
            branches.push((when, self.expr()?));
        }
        if branches.is_empty() {
            return Err(self.error("'when' attendu"));
        }
        let otherwise = if self.eat_keyword("else") { self.expr()? } else { Expr::Literal(Value::Null) };
        self.expect_keyword("end")?;
        Ok(Expr::Case { branches, otherwise: Box::new(otherwise) })
    }
}

fn datetime_literal(kind: &str, text: &str) -> Option<NaiveDateTime> {
    if kind == "date" {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::default()));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Compile une requête texte en `Query`.
///
/// Les paramètres `:name` restent à lier avec [`Query::bind`].
pub fn parse(text: &str, typeside: &Typeside) -> Result<Query, QueryError> {
    let tokens = lex(text)?;
    Parser { tokens, pos: 0, typeside }.query()
}

/// Interprète la valeur d'un paramètre écrite en texte libre (ligne de
/// commande) : entier, décimal, booléen, date, uuid, `Enum.Variant`,
/// sinon chaîne.
pub fn parse_value(text: &str, typeside: &Typeside) -> Value {
    let t = text.trim();
    if t.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("false") {
        return Value::Boolean(t.eq_ignore_ascii_case("true"));
    }
    if let Ok(i) = t.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(d) = Decimal::from_str(t) {
        return Value::Decimal(d);
    }
    if let Some(ts) = datetime_literal("date", t).or_else(|| datetime_literal("timestamp", t)) {
        return Value::Timestamp(ts);
    }
    if let Ok(u) = Uuid::parse_str(t) {
        return Value::Uuid(u);
    }
    if let Some(v) = t.split_once('.').and_then(|(e, v)| typeside.enum_value(e, v)) {
        return v;
    }
    Value::String(t.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::core::domain::{fleet_typeside, CarType, DomainEnum, UnitOfMeasure};
    use crate::core::query::{count_distinct, field, kilometers, lit, param, sum};
    use crate::core::seed::midnight;

    fn hql(text: &str) -> Result<Query, QueryError> {
        parse(text, &fleet_typeside())
    }

    #[test]
    fn test_same_tree_as_builder() {
        let parsed = hql("select c.plate_number from Car c where c.type = CarType.Honda").unwrap();
        let built = Query::from("Car", "c")
            .filter(field("c.type").eq(lit(CarType::Honda)))
            .select(field("c.plate_number"));
        assert_eq!(parsed, built);
    }

    #[test]
    fn test_grouped_query_matches_builder() {
        let parsed = hql(
            "select c.plate_number from Car c \
             join c.journeys j \
             join j.segments s with s.is_city = false \
             group by c.plate_number \
             having sum(s.length_meters) > 150000",
        )
        .unwrap();
        let built = Query::from("Car", "c")
            .join("c.journeys", "j")
            .join_with("j.segments", "s", field("s.is_city").eq(false))
            .group_by(field("c.plate_number"))
            .having(sum(field("s.length_meters")).gt(150_000))
            .select(field("c.plate_number"));
        assert_eq!(parsed, built);
    }

    #[test]
    fn test_keywords_ignore_case() {
        let q = hql("SELECT DISTINCT c FROM Car c JOIN c.journeys j WHERE j.started_at > :since").unwrap();
        assert_eq!(q.selection, Selection::Root);
        assert_eq!(q.mode, ResultMode::DistinctRootEntity);
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.filter, Some(field("j.started_at").gt(param("since"))));
    }

    #[test]
    fn test_parenthesised_predicate_and_expression() {
        let q = hql("from Car c where (c.fuel_intake_city + 1) > 10 and (c.type = CarType.Bmw or c.type = CarType.Audi)")
            .unwrap();
        match q.filter {
            Some(Predicate::And(parts)) => {
                assert!(matches!(parts[0], Predicate::Compare { op: CompOp::Gt, .. }));
                assert!(matches!(&parts[1], Predicate::Or(inner) if inner.len() == 2));
            }
            other => panic!("conjonction attendue, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        let q = hql(
            "select c.plate_number as plate from Car c \
             where c.metadata['niCategory'] = 'A' \
             and c.mileage.value >= 1.5 \
             and kilometers(c.mileage) < 250 \
             and c.mileage.unit_of_measure in (UnitOfMeasure.Kilometers, null) \
             and c.fuel_intake_route > -1",
        )
        .unwrap();
        let Some(Predicate::And(parts)) = q.filter else { panic!("conjonction attendue") };
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[2], kilometers("c.mileage").lt(250));
        assert_eq!(
            parts[3],
            field("c.mileage.unit_of_measure").in_list([lit(UnitOfMeasure::Kilometers), Expr::Literal(Value::Null)])
        );
        assert_eq!(parts[4], field("c.fuel_intake_route").gt(-1));
        match q.selection {
            Selection::Columns(items) => assert_eq!(items[0].label, "plate"),
            other => panic!("colonnes attendues, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_date_literal_and_exists() {
        let q = hql(
            "from Car c where exists (c.journeys j where j.started_at > date '2021-12-11' \
             and exists (j.segments s where s.length_meters > 10000))",
        )
        .unwrap();
        let Some(Predicate::Any { alias, filter, .. }) = q.filter else { panic!("exists attendu") };
        assert_eq!(alias, "j");
        let Predicate::And(parts) = *filter else { panic!("conjonction attendue") };
        assert_eq!(parts[0], field("j.started_at").gt(lit(midnight(2021, 12, 11))));
    }

    #[test]
    fn test_select_new_and_count_star() {
        let q = hql("select new Car(c.id, c.plate_number) from Car c").unwrap();
        assert!(matches!(&q.selection, Selection::New { entity, args } if entity == "Car" && args[1].label == "plate_number"));

        let q = hql("select count(*), count(distinct j.id) from Car c left join c.journeys j").unwrap();
        assert_eq!(q.joins[0].kind, JoinKind::Left);
        assert!(q.is_grouped());
        assert!(matches!(&q.selection, Selection::Columns(items) if items[1].expr == count_distinct(field("j.id"))));
    }

    #[test]
    fn test_case_expression() {
        let q = hql(
            "from Car c where case when c.mileage.unit_of_measure = UnitOfMeasure.Miles \
             then c.mileage.value * 1.6 else c.mileage.value end < 250",
        )
        .unwrap();
        assert!(matches!(q.filter, Some(Predicate::Compare { left: Expr::Case { .. }, .. })));
    }

    #[rstest]
    #[case("select from Car c", 7)]
    #[case("from Car c where c.plate_number = 'BI", 34)]
    #[case("from Car c where c.type = CarType.Fiat", 26)]
    #[case("from Car c where c.type ~ 1", 24)]
    #[case("from Car c order c.id", 17)]
    #[case("from Car c where c.id = 1 garbage", 26)]
    fn test_parse_errors_carry_offset(#[case] text: &str, #[case] expected: usize) {
        match hql(text) {
            Err(QueryError::Parse { offset, .. }) => assert_eq!(offset, expected, "{}", text),
            other => panic!("erreur de syntaxe attendue pour {:?}, obtenu {:?}", text, other),
        }
    }

    #[test]
    fn test_parse_value() {
        let ts = fleet_typeside();
        assert_eq!(parse_value("42", &ts), Value::Integer(42));
        assert_eq!(parse_value("1.6", &ts), Value::Decimal(Decimal::new(16, 1)));
        assert_eq!(parse_value("2021-12-11", &ts), Value::Timestamp(midnight(2021, 12, 11)));
        assert_eq!(parse_value("CarType.Bmw", &ts), CarType::Bmw.to_value());
        assert_eq!(parse_value("BI 570CN", &ts), Value::from("BI 570CN"));
        assert_eq!(parse_value("TRUE", &ts), Value::Boolean(true));
    }
}
