// =============================================================================
// QUERY — L'arbre de requête et son constructeur typé
// =============================================================================
//
// Une requête est une racine + des jointures + des filtres, exactement la
// forme d'un SELECT relationnel :
//
//   Query::from("Car", "c")
//       .join("c.journeys", "j")
//       .join_with("j.segments", "s", field("s.is_city").eq(false))
//       .group_by(field("c.plate_number"))
//       .having(sum(field("s.length_meters")).gt(150_000))
//       .select(field("c.plate_number"))
//
//   ≡  select c.plate_number
//      from Car c
//        join c.journeys j
//        join j.segments s with s.is_city = false
//      group by c.plate_number
//      having sum(s.length_meters) > 150000
//
// Le langage texte (hql.rs) produit EXACTEMENT le même arbre : les deux
// styles partagent l'évaluateur.
//
// Un chemin de champ commence toujours par un alias (`c`, `j`...) suivi de
// noms d'arêtes. `c` seul désigne l'identité de la ligne.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::Path;
use super::typeside::Value;

/// Un champ : alias + arêtes à traverser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub alias: String,
    pub path: Vec<String>,
}

impl FieldRef {
    /// `c.journeys.segments` → alias `c`, chemin `[journeys, segments]`.
    pub fn parse(dotted: &str) -> Self {
        let Path { start, edges } = Path::parse(dotted);
        FieldRef { alias: start, path: edges }
    }

    pub fn alias(alias: &str) -> Self {
        FieldRef { alias: alias.to_string(), path: Vec::new() }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alias)?;
        for edge in &self.path {
            write!(f, ".{}", edge)?;
        }
        Ok(())
    }
}

/// Opérateur de comparaison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,  // =
    Neq, // !=
    Lt,  // <
    Gt,  // >
    Lte, // <=
    Gte, // >=
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompOp::Eq => write!(f, "="),
            CompOp::Neq => write!(f, "!="),
            CompOp::Lt => write!(f, "<"),
            CompOp::Gt => write!(f, ">"),
            CompOp::Lte => write!(f, "<="),
            CompOp::Gte => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "+"),
            ArithOp::Sub => write!(f, "-"),
            ArithOp::Mul => write!(f, "*"),
            ArithOp::Div => write!(f, "/"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggFunc::Count => write!(f, "count"),
            AggFunc::Sum => write!(f, "sum"),
            AggFunc::Min => write!(f, "min"),
            AggFunc::Max => write!(f, "max"),
            AggFunc::Avg => write!(f, "avg"),
        }
    }
}

/// Une expression scalaire.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Valeur lue au bout d'un chemin (identité si le chemin finit sur une entité)
    Field(FieldRef),
    Literal(Value),
    /// Paramètre nommé `:name`, lié avant l'exécution
    Param(String),
    /// Entrée d'un dictionnaire : `c.metadata['niCategory']`
    MapEntry { field: FieldRef, key: String },
    Arith { op: ArithOp, left: Box<Expr>, right: Box<Expr> },
    /// `case when p1 then e1 ... else e end`
    Case { branches: Vec<(Predicate, Expr)>, otherwise: Box<Expr> },
    /// Nombre d'éléments d'une collection : `size(c.journeys)`
    Size(FieldRef),
    /// Kilométrage ramené en kilomètres : `kilometers(c.mileage)`
    Kilometers(FieldRef),
    /// Agrégat sur le groupe courant ; `arg = None` pour `count(*)`
    Aggregate { func: AggFunc, arg: Option<Box<Expr>>, distinct: bool },
}

impl Expr {
    fn compare(self, op: CompOp, right: impl Into<Expr>) -> Predicate {
        Predicate::Compare { left: self, op, right: right.into() }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Eq, right)
    }

    pub fn neq(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Neq, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Lt, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Gt, right)
    }

    pub fn lte(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Lte, right)
    }

    pub fn gte(self, right: impl Into<Expr>) -> Predicate {
        self.compare(CompOp::Gte, right)
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull { expr: self, negated: false }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNull { expr: self, negated: true }
    }

    pub fn in_list<I, E>(self, items: I) -> Predicate
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Predicate::InList { expr: self, list: items.into_iter().map(Into::into).collect() }
    }

    /// L'expression contient-elle un agrégat ?
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Arith { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Expr::Case { branches, otherwise } => {
                otherwise.has_aggregate()
                    || branches.iter().any(|(p, e)| p.has_aggregate() || e.has_aggregate())
            }
            Expr::Field(_)
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::MapEntry { .. }
            | Expr::Size(_)
            | Expr::Kilometers(_) => false,
        }
    }

    /// Nom de colonne par défaut dans un résultat.
    pub fn label(&self) -> String {
        match self {
            Expr::Field(f) => f.path.last().cloned().unwrap_or_else(|| f.alias.clone()),
            Expr::MapEntry { key, .. } => key.clone(),
            other => other.to_string(),
        }
    }
}

fn arith(op: ArithOp, left: Expr, right: Expr) -> Expr {
    Expr::Arith { op, left: Box::new(left), right: Box::new(right) }
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        arith(ArithOp::Add, self, rhs.into())
    }
}

impl<R: Into<Expr>> Sub<R> for Expr {
    type Output = Expr;
    fn sub(self, rhs: R) -> Expr {
        arith(ArithOp::Sub, self, rhs.into())
    }
}

impl<R: Into<Expr>> Mul<R> for Expr {
    type Output = Expr;
    fn mul(self, rhs: R) -> Expr {
        arith(ArithOp::Mul, self, rhs.into())
    }
}

impl<R: Into<Expr>> Div<R> for Expr {
    type Output = Expr;
    fn div(self, rhs: R) -> Expr {
        arith(ArithOp::Div, self, rhs.into())
    }
}

macro_rules! literal_into_expr {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Literal(Value::from(v))
                }
            }
        )+
    };
}

literal_into_expr!(&str, String, i64, i32, bool, Decimal, NaiveDateTime, Uuid);

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field(field) => write!(f, "{}", field),
            Expr::Literal(Value::String(s)) => write!(f, "'{}'", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Param(name) => write!(f, ":{}", name),
            Expr::MapEntry { field, key } => write!(f, "{}['{}']", field, key),
            Expr::Arith { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Case { branches, otherwise } => {
                write!(f, "case")?;
                for (when, then) in branches {
                    write!(f, " when {} then {}", when, then)?;
                }
                write!(f, " else {} end", otherwise)
            }
            Expr::Size(field) => write!(f, "size({})", field),
            Expr::Kilometers(field) => write!(f, "kilometers({})", field),
            Expr::Aggregate { func, arg: None, .. } => write!(f, "{}(*)", func),
            Expr::Aggregate { func, arg: Some(arg), distinct } => {
                if *distinct {
                    write!(f, "{}(distinct {})", func, arg)
                } else {
                    write!(f, "{}({})", func, arg)
                }
            }
        }
    }
}

/// Un prédicat (logique à trois valeurs à l'évaluation).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { left: Expr, op: CompOp, right: Expr },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    IsNull { expr: Expr, negated: bool },
    InList { expr: Expr, list: Vec<Expr> },
    /// Au moins un élément atteint par `path` vérifie `filter`, l'élément
    /// étant lié à `alias` dans le filtre.
    Any { path: FieldRef, alias: String, filter: Box<Predicate> },
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    pub fn has_aggregate(&self) -> bool {
        match self {
            Predicate::Compare { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Predicate::And(parts) | Predicate::Or(parts) => parts.iter().any(Predicate::has_aggregate),
            Predicate::Not(inner) => inner.has_aggregate(),
            Predicate::IsNull { expr, .. } => expr.has_aggregate(),
            Predicate::InList { expr, list } => {
                expr.has_aggregate() || list.iter().any(Expr::has_aggregate)
            }
            Predicate::Any { filter, .. } => filter.has_aggregate(),
        }
    }
}

fn join_display(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Predicate::And(parts) => join_display(f, parts, "and"),
            Predicate::Or(parts) => join_display(f, parts, "or"),
            Predicate::Not(inner) => write!(f, "not {}", inner),
            Predicate::IsNull { expr, negated: false } => write!(f, "{} is null", expr),
            Predicate::IsNull { expr, negated: true } => write!(f, "{} is not null", expr),
            Predicate::InList { expr, list } => {
                write!(f, "{} in (", expr)?;
                for (i, e) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Predicate::Any { path, alias, filter } => {
                write!(f, "exists ({} {} where {})", path, alias, filter)
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Fabriques d'expressions
// -----------------------------------------------------------------------------

/// Champ désigné par un chemin pointé : `field("c.mileage.value")`.
pub fn field(dotted: &str) -> Expr {
    Expr::Field(FieldRef::parse(dotted))
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn param(name: &str) -> Expr {
    Expr::Param(name.to_string())
}

pub fn map_entry(dotted: &str, key: &str) -> Expr {
    Expr::MapEntry { field: FieldRef::parse(dotted), key: key.to_string() }
}

pub fn size(dotted: &str) -> Expr {
    Expr::Size(FieldRef::parse(dotted))
}

pub fn kilometers(dotted: &str) -> Expr {
    Expr::Kilometers(FieldRef::parse(dotted))
}

pub fn case(branches: Vec<(Predicate, Expr)>, otherwise: impl Into<Expr>) -> Expr {
    Expr::Case { branches, otherwise: Box::new(otherwise.into()) }
}

/// `exists (path alias where filter)`
pub fn any(dotted: &str, alias: &str, filter: Predicate) -> Predicate {
    Predicate::Any { path: FieldRef::parse(dotted), alias: alias.to_string(), filter: Box::new(filter) }
}

fn aggregate(func: AggFunc, arg: Expr, distinct: bool) -> Expr {
    Expr::Aggregate { func, arg: Some(Box::new(arg)), distinct }
}

pub fn count_all() -> Expr {
    Expr::Aggregate { func: AggFunc::Count, arg: None, distinct: false }
}

pub fn count(arg: Expr) -> Expr {
    aggregate(AggFunc::Count, arg, false)
}

pub fn count_distinct(arg: Expr) -> Expr {
    aggregate(AggFunc::Count, arg, true)
}

pub fn sum(arg: Expr) -> Expr {
    aggregate(AggFunc::Sum, arg, false)
}

pub fn min(arg: Expr) -> Expr {
    aggregate(AggFunc::Min, arg, false)
}

pub fn max(arg: Expr) -> Expr {
    aggregate(AggFunc::Max, arg, false)
}

pub fn avg(arg: Expr) -> Expr {
    aggregate(AggFunc::Avg, arg, false)
}

// -----------------------------------------------------------------------------
// La requête
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Une jointure le long d'une relation, avec filtre `with` optionnel.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub path: FieldRef,
    pub alias: String,
    pub filter: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub label: String,
}

/// Ce que produit chaque ligne du résultat.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// L'entité racine elle-même
    Root,
    /// Des colonnes projetées
    Columns(Vec<SelectItem>),
    /// Une entité partielle reconstruite à partir de colonnes
    New { entity: String, args: Vec<SelectItem> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    /// Une ligne par tuple survivant
    Rows,
    /// Une ligne par entité racine
    DistinctRootEntity,
    /// Une ligne par valeur distincte
    Distinct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

/// Une requête complète.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub root: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub group_by: Vec<Expr>,
    pub having: Option<Predicate>,
    pub order_by: Vec<OrderItem>,
    pub selection: Selection,
    pub mode: ResultMode,
    /// Valeurs des paramètres nommés
    pub params: BTreeMap<String, Value>,
}

fn conjoin(current: Option<Predicate>, next: Predicate) -> Option<Predicate> {
    Some(match current {
        Some(existing) => existing.and(next),
        None => next,
    })
}

impl Query {
    /// `from Entity alias`
    pub fn from(root: &str, alias: &str) -> Self {
        Query {
            root: root.to_string(),
            alias: alias.to_string(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            selection: Selection::Root,
            mode: ResultMode::Rows,
            params: BTreeMap::new(),
        }
    }

    fn push_join(mut self, kind: JoinKind, path: &str, alias: &str, filter: Option<Predicate>) -> Self {
        self.joins.push(Join { kind, path: FieldRef::parse(path), alias: alias.to_string(), filter });
        self
    }

    pub fn join(self, path: &str, alias: &str) -> Self {
        self.push_join(JoinKind::Inner, path, alias, None)
    }

    pub fn left_join(self, path: &str, alias: &str) -> Self {
        self.push_join(JoinKind::Left, path, alias, None)
    }

    /// Jointure interne restreinte aux cibles qui vérifient `filter`.
    pub fn join_with(self, path: &str, alias: &str, filter: Predicate) -> Self {
        self.push_join(JoinKind::Inner, path, alias, Some(filter))
    }

    /// Ajoute une condition WHERE (conjonction avec les précédentes).
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = conjoin(self.filter, predicate);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having = conjoin(self.having, predicate);
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderItem { expr, descending: false });
        self
    }

    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderItem { expr, descending: true });
        self
    }

    /// Ajoute une colonne nommée d'après l'expression.
    pub fn select(self, expr: Expr) -> Self {
        let label = expr.label();
        self.select_as(expr, &label)
    }

    pub fn select_as(mut self, expr: Expr, label: &str) -> Self {
        let item = SelectItem { expr, label: label.to_string() };
        match &mut self.selection {
            Selection::Columns(items) => items.push(item),
            _ => self.selection = Selection::Columns(vec![item]),
        }
        self
    }

    /// `select new Entity(args...)` : chaque argument alimente l'attribut
    /// portant son nom de colonne.
    pub fn select_new(mut self, entity: &str, args: Vec<Expr>) -> Self {
        let args = args
            .into_iter()
            .map(|expr| SelectItem { label: expr.label(), expr })
            .collect();
        self.selection = Selection::New { entity: entity.to_string(), args };
        self
    }

    /// Dédoublonne les lignes projetées.
    pub fn distinct(mut self) -> Self {
        self.mode = ResultMode::Distinct;
        self
    }

    /// Une ligne par entité racine, même à travers une jointure multiple.
    pub fn distinct_root_entity(mut self) -> Self {
        self.mode = ResultMode::DistinctRootEntity;
        self
    }

    /// Lie un paramètre nommé.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// La requête agrège-t-elle (GROUP BY explicite ou agrégat présent) ?
    pub fn is_grouped(&self) -> bool {
        let selected_aggregate = match &self.selection {
            Selection::Root => false,
            Selection::Columns(items) | Selection::New { args: items, .. } => {
                items.iter().any(|i| i.expr.has_aggregate())
            }
        };
        !self.group_by.is_empty()
            || self.having.is_some()
            || selected_aggregate
            || self.order_by.iter().any(|o| o.expr.has_aggregate())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.mode == ResultMode::Rows { "" } else { "distinct " };
        match &self.selection {
            Selection::Root => write!(f, "select {}{}", distinct, self.alias)?,
            Selection::Columns(items) => {
                write!(f, "select {}", distinct)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.expr)?;
                }
            }
            Selection::New { entity, args } => {
                write!(f, "select {}new {}(", distinct, entity)?;
                for (i, item) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.expr)?;
                }
                write!(f, ")")?;
            }
        }
        write!(f, " from {} {}", self.root, self.alias)?;
        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Inner => "join",
                JoinKind::Left => "left join",
            };
            write!(f, " {} {} {}", kind, join.path, join.alias)?;
            if let Some(filter) = &join.filter {
                write!(f, " with {}", filter)?;
            }
        }
        if let Some(filter) = &self.filter {
            write!(f, " where {}", filter)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " group by ")?;
            for (i, e) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", e)?;
            }
        }
        if let Some(having) = &self.having {
            write!(f, " having {}", having)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " order by ")?;
            for (i, o) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}{}", o.expr, if o.descending { " desc" } else { "" })?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse() {
        let f = FieldRef::parse("c.mileage.value");
        assert_eq!(f.alias, "c");
        assert_eq!(f.path, vec!["mileage", "value"]);
        assert_eq!(f.to_string(), "c.mileage.value");
        assert!(FieldRef::parse("c").path.is_empty());
    }

    #[test]
    fn test_filters_are_conjoined() {
        let q = Query::from("Car", "c")
            .filter(field("c.plate_number").eq("BI 570CN"))
            .filter(field("c.fuel_intake_city").gt(5));
        match q.filter {
            Some(Predicate::And(parts)) => assert_eq!(parts.len(), 2),
            other => panic!("conjonction attendue, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_grouped_detection() {
        let plain = Query::from("Car", "c").select(field("c.plate_number"));
        assert!(!plain.is_grouped());

        let counted = Query::from("Car", "c").select(count_all());
        assert!(counted.is_grouped());

        let having = Query::from("Car", "c")
            .join("c.journeys", "j")
            .group_by(field("c.plate_number"))
            .having(count(field("j.id")).gt(1));
        assert!(having.is_grouped());
    }

    #[test]
    fn test_labels() {
        assert_eq!(field("c.mileage.value").label(), "value");
        assert_eq!(field("c").label(), "c");
        assert_eq!(map_entry("c.metadata", "test").label(), "test");
        assert_eq!(sum(field("s.length_meters")).label(), "sum(s.length_meters)");
    }

    #[test]
    fn test_arithmetic_operators_build_tree() {
        let e = field("m.value") * Decimal::new(16, 1);
        assert_eq!(e.to_string(), "(m.value * 1.6)");
        assert!(!e.has_aggregate());
        assert!((sum(field("s.length_meters")) + 1).has_aggregate());
    }

    #[test]
    fn test_display_reads_like_the_text_language() {
        let q = Query::from("Car", "c")
            .join_with("c.journeys", "j", field("j.started_at").gt(param("since")))
            .distinct_root_entity();
        assert_eq!(
            q.to_string(),
            "select distinct c from Car c join c.journeys j with j.started_at > :since"
        );
    }
}
