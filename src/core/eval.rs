// =============================================================================
// EVAL — Évaluateur de requêtes en mémoire
// =============================================================================
//
// Ce module évalue une Query DIRECTEMENT sur l'ObjectGraph, sans base de
// données. L'évaluation se fait en deux temps.
//
// 1. VÉRIFICATION STATIQUE (avant de lire la moindre ligne)
//      - chaque alias et chaque chemin se résout dans le Schema
//      - chaque comparaison oppose des types compatibles
//      - les agrégats n'apparaissent que dans select / having / order by
//      - en requête groupée, tout ce qui est projeté est groupé ou agrégé
//
// 2. EXÉCUTION
//
//   from Car c join c.journeys j join j.segments s with s.is_city = false
//   where ... group by c.plate_number having sum(s.length_meters) > 150000
//
//   Algorithme :
//     1. Un tuple par ligne racine : [c]
//     2. Chaque jointure étend les tuples : [c, j] puis [c, j, s]
//        (interne : tuple abandonné si aucune cible ; gauche : cible NULL)
//     3. WHERE filtre les tuples (logique à trois valeurs : NULL ⇒ rejet)
//     4. GROUP BY regroupe les tuples, dans l'ordre de première apparition
//     5. HAVING filtre les groupes
//     6. Projection, tri stable, dédoublonnage selon le mode
//
// Une requête qui sélectionne l'entité racine à travers une jointure
// multiple peut répéter la racine : c'est une erreur de cardinalité sauf en
// mode distinct_root_entity (ou si la configuration l'assouplit).
//
// =============================================================================

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::slice;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::domain::{DomainEnum, UnitOfMeasure};
use super::graph::{ObjectGraph, RowId};
use super::project::{ResultRow, ResultSet};
use super::query::{
    AggFunc, ArithOp, CompOp, Expr, FieldRef, JoinKind, Predicate, Query, ResultMode, Selection,
};
use super::schema::{Edge, ResolvedPath, Schema};
use super::typeside::{BaseType, Value};
use crate::config::EngineConfig;
use crate::error::QueryError;

/// Résultat de l'évaluation d'une requête
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// Les lignes produites
    pub result: ResultSet,
    /// Nombre de lignes lues (racines + cibles de jointure)
    pub rows_scanned: usize,
    /// Nombre de lignes retournées
    pub rows_returned: usize,
    /// Temps d'évaluation (en microsecondes)
    pub eval_time_us: u128,
}

impl std::fmt::Display for EvalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Résultat : {} lignes retournées ({} scannées, {}µs)",
            self.rows_returned, self.rows_scanned, self.eval_time_us
        )?;
        write!(f, "{}", self.result)
    }
}

/// Un tuple en cours d'évaluation : une ligne (ou NULL) par alias.
type Binding = Vec<Option<RowId>>;

/// Les alias visibles et l'entité qu'ils désignent, dans l'ordre des
/// positions du tuple.
#[derive(Debug, Clone)]
struct Scope {
    slots: Vec<(String, String)>,
}

impl Scope {
    fn root(alias: &str, entity: &str) -> Self {
        Scope { slots: vec![(alias.to_string(), entity.to_string())] }
    }

    fn lookup(&self, alias: &str) -> Result<(usize, &str), QueryError> {
        self.slots
            .iter()
            .position(|(a, _)| a == alias)
            .map(|i| (i, self.slots[i].1.as_str()))
            .ok_or_else(|| QueryError::reference(format!("alias '{}' inconnu", alias)))
    }

    fn with(&self, alias: &str, entity: &str) -> Result<Scope, QueryError> {
        if self.slots.iter().any(|(a, _)| a == alias) {
            return Err(QueryError::reference(format!("alias '{}' déjà utilisé", alias)));
        }
        let mut slots = self.slots.clone();
        slots.push((alias.to_string(), entity.to_string()));
        Ok(Scope { slots })
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

// =============================================================================
// Vérification statique
// =============================================================================

/// Clause dans laquelle apparaît une expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Join,
    Where,
    GroupBy,
    Select,
    Having,
    OrderBy,
}

impl Clause {
    fn allows_aggregates(self) -> bool {
        matches!(self, Clause::Select | Clause::Having | Clause::OrderBy)
    }
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::Join => write!(f, "un filtre de jointure"),
            Clause::Where => write!(f, "le where"),
            Clause::GroupBy => write!(f, "le group by"),
            Clause::Select => write!(f, "le select"),
            Clause::Having => write!(f, "le having"),
            Clause::OrderBy => write!(f, "l'order by"),
        }
    }
}

struct Checker<'a> {
    schema: &'a Schema,
    params: &'a BTreeMap<String, Value>,
}

fn numeric_result(left: Option<&BaseType>, right: Option<&BaseType>, op: ArithOp) -> BaseType {
    if op == ArithOp::Div || left == Some(&BaseType::Decimal) || right == Some(&BaseType::Decimal) {
        BaseType::Decimal
    } else {
        BaseType::Integer
    }
}

impl<'a> Checker<'a> {
    fn resolve(&self, scope: &Scope, field: &FieldRef) -> Result<ResolvedPath, QueryError> {
        let (_, entity) = scope.lookup(&field.alias)?;
        self.schema.resolve(entity, &field.path)
    }

    /// Chemin vers une valeur unique (pas de collection traversée).
    fn scalar_path(&self, scope: &Scope, field: &FieldRef) -> Result<ResolvedPath, QueryError> {
        let path = self.resolve(scope, field)?;
        if path.is_to_many() {
            return Err(QueryError::type_error(format!(
                "{} traverse une collection : utiliser une jointure, size() ou exists",
                field
            )));
        }
        Ok(path)
    }

    /// Chemin vers une collection d'entités.
    fn collection_path(&self, scope: &Scope, field: &FieldRef, usage: &str) -> Result<ResolvedPath, QueryError> {
        let path = self.resolve(scope, field)?;
        if path.attribute.is_some() || path.hops.is_empty() {
            return Err(QueryError::type_error(format!("{} attend une relation, pas {}", usage, field)));
        }
        Ok(path)
    }

    fn attribute_type(&self, entity: &str, name: &str) -> Option<BaseType> {
        match self.schema.edge(entity, name) {
            Ok(Edge::Attribute { target, .. }) => Some(target.clone()),
            _ => None,
        }
    }

    /// Type statique d'une expression ; `None` pour NULL.
    fn expr_type(
        &self,
        expr: &Expr,
        scope: &Scope,
        clause: Clause,
        in_aggregate: bool,
    ) -> Result<Option<BaseType>, QueryError> {
        match expr {
            Expr::Field(field) => {
                let path = self.scalar_path(scope, field)?;
                match path.attribute {
                    Some(attr) => Ok(Some(attr.ty)),
                    None => Ok(Some(self.schema.id_type(&path.end_entity)?)),
                }
            }
            Expr::Literal(v) => Ok(v.get_type()),
            Expr::Param(name) => self
                .params
                .get(name)
                .map(Value::get_type)
                .ok_or_else(|| QueryError::reference(format!("paramètre :{} non lié", name))),
            Expr::MapEntry { field, .. } => {
                let path = self.scalar_path(scope, field)?;
                match path.attribute {
                    Some(attr) if attr.ty == BaseType::Map => Ok(Some(BaseType::String)),
                    _ => Err(QueryError::type_error(format!("{} n'est pas un dictionnaire", field))),
                }
            }
            Expr::Arith { op, left, right } => {
                let l = self.expr_type(left, scope, clause, in_aggregate)?;
                let r = self.expr_type(right, scope, clause, in_aggregate)?;
                for ty in [&l, &r].into_iter().flatten() {
                    if !ty.is_numeric() {
                        return Err(QueryError::type_error(format!("opération {} sur {}", op, ty)));
                    }
                }
                Ok(Some(numeric_result(l.as_ref(), r.as_ref(), *op)))
            }
            Expr::Case { branches, otherwise } => {
                let mut result = self.expr_type(otherwise, scope, clause, in_aggregate)?;
                for (when, then) in branches {
                    self.check_predicate(when, scope, clause, in_aggregate)?;
                    let ty = self.expr_type(then, scope, clause, in_aggregate)?;
                    result = match (result, ty) {
                        (None, t) | (t, None) => t,
                        (Some(a), Some(b)) if a == b => Some(a),
                        (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => Some(BaseType::Decimal),
                        (Some(a), Some(b)) => {
                            return Err(QueryError::type_error(format!(
                                "branches de case incompatibles : {} et {}",
                                a, b
                            )))
                        }
                    };
                }
                Ok(result)
            }
            Expr::Size(field) => {
                self.collection_path(scope, field, "size()")?;
                Ok(Some(BaseType::Integer))
            }
            Expr::Kilometers(field) => {
                let path = self.scalar_path(scope, field)?;
                let value = self.attribute_type(&path.end_entity, "value");
                let unit = self.attribute_type(&path.end_entity, "unit_of_measure");
                let unit_enum = BaseType::Enum(UnitOfMeasure::NAME.to_string());
                match (path.attribute, value, unit) {
                    (None, Some(v), Some(u)) if v.is_numeric() && u == unit_enum => Ok(Some(BaseType::Decimal)),
                    _ => Err(QueryError::type_error(format!("kilometers() attend un kilométrage, pas {}", field))),
                }
            }
            Expr::Aggregate { func, arg, .. } => {
                if !clause.allows_aggregates() {
                    return Err(QueryError::type_error(format!("agrégat {} interdit dans {}", expr, clause)));
                }
                if in_aggregate {
                    return Err(QueryError::type_error(format!("agrégat imbriqué : {}", expr)));
                }
                let Some(arg) = arg else {
                    return Ok(Some(BaseType::Integer));
                };
                let ty = self.expr_type(arg, scope, clause, true)?;
                match func {
                    AggFunc::Count => Ok(Some(BaseType::Integer)),
                    AggFunc::Sum | AggFunc::Avg => match ty {
                        Some(t) if !t.is_numeric() => {
                            Err(QueryError::type_error(format!("{} attend un nombre, pas {}", func, t)))
                        }
                        Some(t) if *func == AggFunc::Sum => Ok(Some(t)),
                        _ => Ok(Some(BaseType::Decimal)),
                    },
                    AggFunc::Min | AggFunc::Max => match ty {
                        Some(BaseType::Map) => Err(QueryError::type_error(format!("{} sur un dictionnaire", func))),
                        other => Ok(other),
                    },
                }
            }
        }
    }

    fn check_comparable(&self, left: &Option<BaseType>, right: &Option<BaseType>, what: &str) -> Result<(), QueryError> {
        if let (Some(l), Some(r)) = (left, right) {
            if !l.comparable_with(r) {
                return Err(QueryError::type_error(format!("{} : {} et {} ne se comparent pas", what, l, r)));
            }
        }
        Ok(())
    }

    fn check_predicate(
        &self,
        predicate: &Predicate,
        scope: &Scope,
        clause: Clause,
        in_aggregate: bool,
    ) -> Result<(), QueryError> {
        match predicate {
            Predicate::Compare { left, op, right } => {
                let l = self.expr_type(left, scope, clause, in_aggregate)?;
                let r = self.expr_type(right, scope, clause, in_aggregate)?;
                self.check_comparable(&l, &r, &format!("{} {} {}", left, op, right))
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().try_for_each(|p| self.check_predicate(p, scope, clause, in_aggregate))
            }
            Predicate::Not(inner) => self.check_predicate(inner, scope, clause, in_aggregate),
            Predicate::IsNull { expr, .. } => self.expr_type(expr, scope, clause, in_aggregate).map(|_| ()),
            Predicate::InList { expr, list } => {
                let ty = self.expr_type(expr, scope, clause, in_aggregate)?;
                for item in list {
                    let item_ty = self.expr_type(item, scope, clause, in_aggregate)?;
                    self.check_comparable(&ty, &item_ty, &format!("{} in (...)", expr))?;
                }
                Ok(())
            }
            Predicate::Any { path, alias, filter } => {
                let resolved = self.collection_path(scope, path, "exists")?;
                let inner = scope.with(alias, &resolved.end_entity)?;
                self.check_predicate(filter, &inner, clause, in_aggregate)
            }
        }
    }

    /// En requête groupée : l'expression est-elle groupée ou agrégée ?
    fn check_grouped_expr(&self, expr: &Expr, group_by: &[Expr]) -> Result<(), QueryError> {
        if group_by.contains(expr) {
            return Ok(());
        }
        match expr {
            Expr::Aggregate { .. } | Expr::Literal(_) | Expr::Param(_) => Ok(()),
            Expr::Arith { left, right, .. } => {
                self.check_grouped_expr(left, group_by)?;
                self.check_grouped_expr(right, group_by)
            }
            Expr::Case { branches, otherwise } => {
                for (when, then) in branches {
                    self.check_grouped_predicate(when, group_by)?;
                    self.check_grouped_expr(then, group_by)?;
                }
                self.check_grouped_expr(otherwise, group_by)
            }
            Expr::Field(_) | Expr::MapEntry { .. } | Expr::Size(_) | Expr::Kilometers(_) => {
                Err(QueryError::type_error(format!(
                    "{} doit figurer dans le group by ou dans un agrégat",
                    expr
                )))
            }
        }
    }

    fn check_grouped_predicate(&self, predicate: &Predicate, group_by: &[Expr]) -> Result<(), QueryError> {
        match predicate {
            Predicate::Compare { left, right, .. } => {
                self.check_grouped_expr(left, group_by)?;
                self.check_grouped_expr(right, group_by)
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().try_for_each(|p| self.check_grouped_predicate(p, group_by))
            }
            Predicate::Not(inner) => self.check_grouped_predicate(inner, group_by),
            Predicate::IsNull { expr, .. } => self.check_grouped_expr(expr, group_by),
            Predicate::InList { expr, list } => {
                self.check_grouped_expr(expr, group_by)?;
                list.iter().try_for_each(|e| self.check_grouped_expr(e, group_by))
            }
            Predicate::Any { .. } => Err(QueryError::type_error(format!(
                "{} ne peut pas suivre un regroupement",
                predicate
            ))),
        }
    }

    /// L'entité racine ne peut être sélectionnée d'un groupe que si le
    /// groupe l'identifie : alias seul, identifiant ou attribut unique.
    fn groups_root_identity(&self, query: &Query) -> Result<bool, QueryError> {
        let node = self.schema.node(&query.root)?;
        Ok(query.group_by.iter().any(|expr| match expr {
            Expr::Field(f) if f.alias == query.alias => match f.path.as_slice() {
                [] => true,
                [name] if *name == node.id_attribute => true,
                [name] => matches!(
                    self.schema.edge(&query.root, name),
                    Ok(Edge::Attribute { constraints, .. }) if constraints.unique
                ),
                _ => false,
            },
            _ => false,
        }))
    }

    fn check_query(&self, query: &Query) -> Result<Scope, QueryError> {
        self.schema.node(&query.root)?;
        let mut scope = Scope::root(&query.alias, &query.root);

        for join in &query.joins {
            let path = self.collection_path(&scope, &join.path, "une jointure")?;
            scope = scope.with(&join.alias, &path.end_entity)?;
            if let Some(filter) = &join.filter {
                self.check_predicate(filter, &scope, Clause::Join, false)?;
            }
        }
        if let Some(filter) = &query.filter {
            self.check_predicate(filter, &scope, Clause::Where, false)?;
        }
        for expr in &query.group_by {
            self.expr_type(expr, &scope, Clause::GroupBy, false)?;
        }
        if let Some(having) = &query.having {
            self.check_predicate(having, &scope, Clause::Having, false)?;
        }
        match &query.selection {
            Selection::Root => {}
            Selection::Columns(items) => {
                for item in items {
                    self.expr_type(&item.expr, &scope, Clause::Select, false)?;
                }
            }
            Selection::New { entity, args } => {
                self.schema.node(entity)?;
                for item in args {
                    self.expr_type(&item.expr, &scope, Clause::Select, false)?;
                    self.schema.edge(entity, &item.label)?;
                }
            }
        }
        for order in &query.order_by {
            self.expr_type(&order.expr, &scope, Clause::OrderBy, false)?;
        }

        if query.is_grouped() {
            match &query.selection {
                Selection::Root => {
                    if !self.groups_root_identity(query)? {
                        return Err(QueryError::type_error(format!(
                            "sélectionner {} exige un group by sur son identité",
                            query.alias
                        )));
                    }
                }
                Selection::Columns(items) | Selection::New { args: items, .. } => {
                    for item in items {
                        self.check_grouped_expr(&item.expr, &query.group_by)?;
                    }
                }
            }
            if let Some(having) = &query.having {
                self.check_grouped_predicate(having, &query.group_by)?;
            }
            for order in &query.order_by {
                self.check_grouped_expr(&order.expr, &query.group_by)?;
            }
        }

        Ok(scope)
    }
}

// =============================================================================
// Exécution
// =============================================================================

struct Executor<'a> {
    graph: &'a ObjectGraph,
    schema: &'a Schema,
    params: &'a BTreeMap<String, Value>,
    mile_to_km: Decimal,
}

fn count_value(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn arith_values(op: ArithOp, left: &Value, right: &Value) -> Result<Value, QueryError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Div => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Integer(v));
        }
    }
    let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
        return Err(QueryError::type_error(format!("opération {} entre {} et {}", op, left, right)));
    };
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
    };
    // division par zéro ⇒ NULL
    Ok(result.map(Value::Decimal).unwrap_or(Value::Null))
}

fn sum_values(func: AggFunc, values: &[Value]) -> Result<Value, QueryError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if func == AggFunc::Sum && values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let exact = values.iter().try_fold(0i64, |acc, v| match v {
            Value::Integer(i) => acc.checked_add(*i),
            _ => None,
        });
        if let Some(total) = exact {
            return Ok(Value::Integer(total));
        }
    }
    let mut total = Decimal::ZERO;
    for v in values {
        let d = v
            .as_decimal()
            .ok_or_else(|| QueryError::type_error(format!("{} attend un nombre, reçu {}", func, v)))?;
        total += d;
    }
    if func == AggFunc::Avg {
        Ok(Value::Decimal(total / Decimal::from(values.len())))
    } else {
        Ok(Value::Decimal(total))
    }
}

/// Ordre de tri : NULL en tête, types incompatibles considérés égaux.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

impl<'a> Executor<'a> {
    /// Lignes atteintes par un champ depuis le tuple courant.
    fn field_rows(&self, scope: &Scope, row: &Binding, field: &FieldRef) -> Result<(ResolvedPath, Vec<RowId>), QueryError> {
        let (slot, entity) = scope.lookup(&field.alias)?;
        let path = self.schema.resolve(entity, &field.path)?;
        let rows = match row.get(slot).copied().flatten() {
            Some(start) => self.graph.traverse(self.schema, start, &path.hops)?,
            None => Vec::new(),
        };
        Ok((path, rows))
    }

    fn eval_expr(&self, expr: &Expr, scope: &Scope, row: &Binding, group: &[Binding]) -> Result<Value, QueryError> {
        match expr {
            Expr::Field(field) => {
                let (path, rows) = self.field_rows(scope, row, field)?;
                let Some(&target) = rows.first() else {
                    return Ok(Value::Null);
                };
                match &path.attribute {
                    Some(attr) => self.graph.attr(self.schema, &attr.entity, target, &attr.name),
                    None => self.graph.id_of(self.schema, &path.end_entity, target),
                }
            }
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Param(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::reference(format!("paramètre :{} non lié", name))),
            Expr::MapEntry { field, key } => match self.eval_expr(&Expr::Field(field.clone()), scope, row, group)? {
                Value::Map(entries) => Ok(entries.get(key).cloned().map(Value::String).unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(QueryError::type_error(format!("{} n'est pas un dictionnaire", other))),
            },
            Expr::Arith { op, left, right } => {
                let l = self.eval_expr(left, scope, row, group)?;
                let r = self.eval_expr(right, scope, row, group)?;
                arith_values(*op, &l, &r)
            }
            Expr::Case { branches, otherwise } => {
                for (when, then) in branches {
                    if self.eval_predicate(when, scope, row, group)? == Some(true) {
                        return self.eval_expr(then, scope, row, group);
                    }
                }
                self.eval_expr(otherwise, scope, row, group)
            }
            Expr::Size(field) => {
                let (_, rows) = self.field_rows(scope, row, field)?;
                Ok(count_value(rows.len()))
            }
            Expr::Kilometers(field) => {
                let (path, rows) = self.field_rows(scope, row, field)?;
                let Some(&mileage) = rows.first() else {
                    return Ok(Value::Null);
                };
                let value = self.graph.attr(self.schema, &path.end_entity, mileage, "value")?;
                let unit = self.graph.attr(self.schema, &path.end_entity, mileage, "unit_of_measure")?;
                Ok(match (value.as_decimal(), UnitOfMeasure::from_value(&unit)) {
                    (Some(v), Some(UnitOfMeasure::Kilometers)) => Value::Decimal(v),
                    (Some(v), Some(UnitOfMeasure::Miles)) => Value::Decimal(v * self.mile_to_km),
                    _ => Value::Null,
                })
            }
            Expr::Aggregate { func, arg, distinct } => {
                let Some(arg) = arg else {
                    return Ok(count_value(group.len()));
                };
                let mut values = Vec::with_capacity(group.len());
                for member in group {
                    let v = self.eval_expr(arg, scope, member, slice::from_ref(member))?;
                    if !v.is_null() {
                        values.push(v);
                    }
                }
                if *distinct {
                    let mut seen = HashSet::new();
                    values.retain(|v| seen.insert(v.clone()));
                }
                match func {
                    AggFunc::Count => Ok(count_value(values.len())),
                    AggFunc::Sum | AggFunc::Avg => sum_values(*func, &values),
                    AggFunc::Min => Ok(values
                        .into_iter()
                        .reduce(|a, b| if b.compare(&a) == Some(Ordering::Less) { b } else { a })
                        .unwrap_or(Value::Null)),
                    AggFunc::Max => Ok(values
                        .into_iter()
                        .reduce(|a, b| if b.compare(&a) == Some(Ordering::Greater) { b } else { a })
                        .unwrap_or(Value::Null)),
                }
            }
        }
    }

    /// Évalue un prédicat : `None` signifie « inconnu » (NULL).
    fn eval_predicate(
        &self,
        predicate: &Predicate,
        scope: &Scope,
        row: &Binding,
        group: &[Binding],
    ) -> Result<Option<bool>, QueryError> {
        match predicate {
            Predicate::Compare { left, op, right } => {
                let l = self.eval_expr(left, scope, row, group)?;
                let r = self.eval_expr(right, scope, row, group)?;
                if l.is_null() || r.is_null() {
                    return Ok(None);
                }
                let ord = l
                    .compare(&r)
                    .ok_or_else(|| QueryError::type_error(format!("{} {} {} : types incompatibles", l, op, r)))?;
                Ok(Some(match op {
                    CompOp::Eq => ord == Ordering::Equal,
                    CompOp::Neq => ord != Ordering::Equal,
                    CompOp::Lt => ord == Ordering::Less,
                    CompOp::Gt => ord == Ordering::Greater,
                    CompOp::Lte => ord != Ordering::Greater,
                    CompOp::Gte => ord != Ordering::Less,
                }))
            }
            Predicate::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match self.eval_predicate(part, scope, row, group)? {
                        Some(false) => return Ok(Some(false)),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                Ok(if unknown { None } else { Some(true) })
            }
            Predicate::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match self.eval_predicate(part, scope, row, group)? {
                        Some(true) => return Ok(Some(true)),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                Ok(if unknown { None } else { Some(false) })
            }
            Predicate::Not(inner) => Ok(self.eval_predicate(inner, scope, row, group)?.map(|b| !b)),
            Predicate::IsNull { expr, negated } => {
                Ok(Some(self.eval_expr(expr, scope, row, group)?.is_null() != *negated))
            }
            Predicate::InList { expr, list } => {
                let v = self.eval_expr(expr, scope, row, group)?;
                if v.is_null() {
                    return Ok(None);
                }
                let mut unknown = false;
                for item in list {
                    let candidate = self.eval_expr(item, scope, row, group)?;
                    if candidate.is_null() {
                        unknown = true;
                        continue;
                    }
                    let ord = v.compare(&candidate).ok_or_else(|| {
                        QueryError::type_error(format!("{} in (...) : {} incompatible", v, candidate))
                    })?;
                    if ord == Ordering::Equal {
                        return Ok(Some(true));
                    }
                }
                Ok(if unknown { None } else { Some(false) })
            }
            Predicate::Any { path, alias, filter } => {
                let (resolved, targets) = self.field_rows(scope, row, path)?;
                let inner = scope.with(alias, &resolved.end_entity)?;
                for target in targets {
                    let mut extended = row.clone();
                    extended.push(Some(target));
                    if self.eval_predicate(filter, &inner, &extended, slice::from_ref(&extended))? == Some(true) {
                        return Ok(Some(true));
                    }
                }
                Ok(Some(false))
            }
        }
    }

    fn keep(&self, predicate: &Predicate, scope: &Scope, row: &Binding) -> Result<bool, QueryError> {
        Ok(self.eval_predicate(predicate, scope, row, slice::from_ref(row))? == Some(true))
    }
}

/// Une ligne projetée avant tri et dédoublonnage.
struct Projected {
    root: Option<RowId>,
    values: Vec<Value>,
    keys: Vec<Value>,
}

fn group_bindings(
    exec: &Executor<'_>,
    query: &Query,
    scope: &Scope,
    bindings: Vec<Binding>,
) -> Result<Vec<Vec<Binding>>, QueryError> {
    if query.group_by.is_empty() {
        return Ok(vec![bindings]);
    }
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<Vec<Binding>> = Vec::new();
    for binding in bindings {
        let key = query
            .group_by
            .iter()
            .map(|e| exec.eval_expr(e, scope, &binding, slice::from_ref(&binding)))
            .collect::<Result<Vec<_>, _>>()?;
        match index.get(&key) {
            Some(&i) => groups[i].push(binding),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![binding]);
            }
        }
    }
    Ok(groups)
}

/// Évalue une Query sur un ObjectGraph, en mémoire.
///
/// C'est LE point d'entrée principal pour l'exécution de requêtes.
///
/// # Arguments
/// * `query` - La requête à évaluer (paramètres déjà liés)
/// * `graph` - Les données
/// * `schema` - Le schéma du graphe
/// * `config` - Facteur miles → km et sévérité sur la cardinalité
pub fn eval_query(
    query: &Query,
    graph: &ObjectGraph,
    schema: &Schema,
    config: &EngineConfig,
) -> Result<EvalResult, QueryError> {
    let start = Instant::now();
    let checker = Checker { schema, params: &query.params };
    let scope = checker.check_query(query)?;
    debug!(query = %query, "requête vérifiée");

    let exec = Executor { graph, schema, params: &query.params, mile_to_km: config.mile_to_km };

    // 1. Les racines
    let roots = graph.rows_of(schema, &query.root)?;
    let mut scanned = roots.len();
    let mut bindings: Vec<Binding> = roots.into_iter().map(|r| vec![Some(r)]).collect();

    // 2. Les jointures
    let mut join_scope = Scope::root(&query.alias, &query.root);
    for join in &query.joins {
        let (slot, entity) = join_scope.lookup(&join.path.alias)?;
        let path = schema.resolve(entity, &join.path.path)?;
        let next_scope = join_scope.with(&join.alias, &path.end_entity)?;

        let mut next = Vec::new();
        for binding in bindings {
            let targets = match binding.get(slot).copied().flatten() {
                Some(row) => graph.traverse(schema, row, &path.hops)?,
                None => Vec::new(),
            };
            scanned += targets.len();
            let mut matched = false;
            for target in targets {
                let mut extended = binding.clone();
                extended.push(Some(target));
                let keep = match &join.filter {
                    Some(filter) => exec.keep(filter, &next_scope, &extended)?,
                    None => true,
                };
                if keep {
                    matched = true;
                    next.push(extended);
                }
            }
            if !matched && join.kind == JoinKind::Left {
                let mut extended = binding;
                extended.push(None);
                next.push(extended);
            }
        }
        bindings = next;
        join_scope = next_scope;
        debug!(alias = %join.alias, tuples = bindings.len(), "jointure");
    }

    // 3. WHERE
    if let Some(filter) = &query.filter {
        let mut kept = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if exec.keep(filter, &scope, &binding)? {
                kept.push(binding);
            }
        }
        bindings = kept;
        debug!(tuples = bindings.len(), "where");
    }

    // 4-5. GROUP BY / HAVING
    let groups: Vec<Vec<Binding>> = if query.is_grouped() {
        let groups = group_bindings(&exec, query, &scope, bindings)?;
        let mut kept = Vec::with_capacity(groups.len());
        for group in groups {
            let representative = group.first().cloned().unwrap_or_else(|| vec![None; scope.len()]);
            let keep = match &query.having {
                Some(having) => exec.eval_predicate(having, &scope, &representative, &group)? == Some(true),
                None => true,
            };
            if keep {
                kept.push(group);
            }
        }
        debug!(groups = kept.len(), "regroupement");
        kept
    } else {
        bindings.into_iter().map(|b| vec![b]).collect()
    };

    // 6. Projection
    let mut projected = Vec::with_capacity(groups.len());
    for group in &groups {
        let row = group.first().cloned().unwrap_or_else(|| vec![None; scope.len()]);
        let values = match &query.selection {
            Selection::Root => Vec::new(),
            Selection::Columns(items) | Selection::New { args: items, .. } => items
                .iter()
                .map(|item| exec.eval_expr(&item.expr, &scope, &row, group))
                .collect::<Result<Vec<_>, _>>()?,
        };
        let keys = query
            .order_by
            .iter()
            .map(|o| exec.eval_expr(&o.expr, &scope, &row, group))
            .collect::<Result<Vec<_>, _>>()?;
        projected.push(Projected { root: row.first().copied().flatten(), values, keys });
    }

    if !query.order_by.is_empty() {
        projected.sort_by(|a, b| {
            for (i, order) in query.order_by.iter().enumerate() {
                let ord = order_values(&a.keys[i], &b.keys[i]);
                let ord = if order.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let selects_entities = matches!(query.selection, Selection::Root | Selection::New { .. });
    match query.mode {
        ResultMode::DistinctRootEntity => {
            let mut seen = HashSet::new();
            projected.retain(|p| seen.insert(p.root));
        }
        ResultMode::Distinct if matches!(query.selection, Selection::Root) => {
            let mut seen = HashSet::new();
            projected.retain(|p| seen.insert(p.root));
        }
        ResultMode::Distinct => {
            let mut seen = HashSet::new();
            projected.retain(|p| seen.insert(p.values.clone()));
        }
        ResultMode::Rows if selects_entities => {
            let mut seen = HashSet::new();
            if let Some(repeated) = projected.iter().find(|p| !seen.insert(p.root)) {
                let message = format!(
                    "{} [{}] apparaît plusieurs fois : utiliser distinct_root_entity",
                    query.root,
                    repeated.root.map(|r| r.to_string()).unwrap_or_default()
                );
                if config.strict_cardinality {
                    return Err(QueryError::cardinality(message));
                }
                warn!("{}", message);
            }
        }
        ResultMode::Rows => {}
    }

    let (entity, columns) = match &query.selection {
        Selection::Root => (Some(query.root.clone()), Vec::new()),
        Selection::Columns(items) => (None, items.iter().map(|i| i.label.clone()).collect()),
        Selection::New { entity, args } => (Some(entity.clone()), args.iter().map(|i| i.label.clone()).collect()),
    };
    let rows: Vec<ResultRow> = projected
        .into_iter()
        .map(|p| ResultRow { root: p.root, values: p.values })
        .collect();
    let returned = rows.len();
    let elapsed = start.elapsed().as_micros();
    debug!(scanned, returned, elapsed_us = elapsed as u64, "requête évaluée");

    Ok(EvalResult {
        result: ResultSet { root_entity: query.root.clone(), entity, columns, rows },
        rows_scanned: scanned,
        rows_returned: returned,
        eval_time_us: elapsed,
    })
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::core::domain::{CarType, FeatureKey};
    use crate::core::mapping::fleet_schema;
    use crate::core::query::*;
    use crate::core::seed::{midnight, SeedLoader, BMW_PLATE, HONDA_PLATE};

    fn fixture() -> (Schema, ObjectGraph) {
        let schema = fleet_schema().unwrap();
        let graph = SeedLoader::new().seed(&schema).unwrap();
        (schema, graph)
    }

    fn run(query: &Query) -> Result<EvalResult, QueryError> {
        let (schema, graph) = fixture();
        eval_query(query, &graph, &schema, &EngineConfig::default())
    }

    #[test]
    fn test_filter_on_enum() {
        let q = Query::from("Car", "c")
            .filter(field("c.type").eq(lit(CarType::Honda)))
            .select(field("c.plate_number"));
        let result = run(&q).unwrap();
        assert_eq!(result.result.strings("plate_number"), vec![HONDA_PLATE]);
        assert_eq!(result.rows_scanned, 2);
    }

    #[rstest]
    #[case(field("c.wheels").eq(4), "wheels")]
    #[case(field("x.plate_number").eq("A"), "alias 'x'")]
    #[case(field("c.plate_number").eq(param("plate")), ":plate")]
    fn test_reference_errors(#[case] predicate: Predicate, #[case] fragment: &str) {
        let err = run(&Query::from("Car", "c").filter(predicate)).unwrap_err();
        match err {
            QueryError::Reference(message) => assert!(message.contains(fragment), "{}", message),
            other => panic!("erreur de référence attendue, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_unknown_root_entity() {
        assert!(matches!(run(&Query::from("Truck", "t")), Err(QueryError::Reference(_))));
    }

    #[rstest]
    #[case(field("c.plate_number").gt(200))]
    #[case(field("c.type").eq(lit(FeatureKey::Aux)))]
    #[case(field("c.journeys.started_at").gt(lit(midnight(2021, 1, 1))))]
    #[case(count(field("c.id")).gt(1))]
    fn test_type_errors_are_static(#[case] predicate: Predicate) {
        let err = run(&Query::from("Car", "c").filter(predicate)).unwrap_err();
        assert!(matches!(err, QueryError::Type(_)), "{:?}", err);
    }

    #[test]
    fn test_mismatched_parameter_is_a_type_error() {
        let q = Query::from("Car", "c").filter(field("c.fuel_intake_city").gt(param("min"))).bind("min", "ten");
        assert!(matches!(run(&q), Err(QueryError::Type(_))));
    }

    #[test]
    fn test_ungrouped_column_is_rejected() {
        let q = Query::from("Car", "c")
            .join("c.journeys", "j")
            .group_by(field("c.plate_number"))
            .select(field("c.fuel_intake_city"))
            .select(count(field("j.id")));
        assert!(matches!(run(&q), Err(QueryError::Type(_))));
    }

    #[test]
    fn test_root_multiplied_by_join_is_a_cardinality_error() {
        let q = Query::from("Car", "c").join("c.journeys", "j");
        assert!(matches!(run(&q), Err(QueryError::Cardinality(_))));

        let distinct = run(&q.clone().distinct_root_entity()).unwrap();
        assert_eq!(distinct.rows_returned, 2);
    }

    #[test]
    fn test_relaxed_cardinality_keeps_duplicates() {
        let (schema, graph) = fixture();
        let config = EngineConfig { strict_cardinality: false, ..EngineConfig::default() };
        let q = Query::from("Car", "c").join("c.journeys", "j");
        let result = eval_query(&q, &graph, &schema, &config).unwrap();
        assert_eq!(result.rows_returned, 4);
    }

    #[test]
    fn test_left_join_keeps_journeys_without_segments() {
        let q = Query::from("Journey", "j")
            .left_join("j.segments", "s")
            .filter(field("s.id").is_null())
            .select(field("j.started_at"));
        let result = run(&q).unwrap();
        assert_eq!(result.rows_returned, 2);

        let inner = Query::from("Journey", "j").join("j.segments", "s").select(field("s.id"));
        assert_eq!(run(&inner).unwrap().rows_returned, 5);
    }

    #[test]
    fn test_null_comparison_rejects_the_row() {
        let q = Query::from("Car", "c")
            .filter(map_entry("c.metadata", "niCategory").neq("B"))
            .select(field("c.plate_number"));
        assert_eq!(run(&q).unwrap().result.strings("plate_number"), vec![HONDA_PLATE]);
    }

    #[test]
    fn test_size_and_order_by() {
        let q = Query::from("Car", "c")
            .select(field("c.plate_number"))
            .select_as(size("c.journeys"), "journeys")
            .order_by_desc(field("c.plate_number"));
        let result = run(&q).unwrap().result;
        assert_eq!(result.strings("plate_number"), vec![BMW_PLATE, HONDA_PLATE]);
        assert_eq!(result.column("journeys").unwrap(), vec![Value::Integer(1), Value::Integer(3)]);
    }

    #[test]
    fn test_aggregates_without_group_by_form_one_group() {
        let q = Query::from("Segment", "s")
            .select(count_all())
            .select(sum(field("s.length_meters")))
            .select(max(field("s.length_meters")))
            .select(avg(field("s.length_meters")));
        let result = run(&q).unwrap().result;
        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.rows[0].values,
            vec![
                Value::Integer(5),
                Value::Integer(387_000),
                Value::Integer(180_000),
                Value::Decimal(Decimal::from(77_400)),
            ]
        );
    }

    #[test]
    fn test_empty_group_counts_zero() {
        let q = Query::from("Segment", "s")
            .filter(field("s.length_meters").gt(1_000_000))
            .select(count_all())
            .select(sum(field("s.length_meters")));
        let result = run(&q).unwrap().result;
        assert_eq!(result.rows[0].values, vec![Value::Integer(0), Value::Null]);
    }

    #[test]
    fn test_distinct_values() {
        let q = Query::from("Segment", "s").select(field("s.is_city")).distinct();
        assert_eq!(run(&q).unwrap().rows_returned, 2);
    }

    #[test]
    fn test_kilometers_uses_configured_factor() {
        let (schema, graph) = fixture();
        let q = Query::from("Car", "c")
            .select(field("c.plate_number"))
            .select_as(kilometers("c.mileage"), "km")
            .order_by(field("c.plate_number"));
        let config = EngineConfig { mile_to_km: Decimal::from(2), ..EngineConfig::default() };
        let result = eval_query(&q, &graph, &schema, &config).unwrap().result;
        assert_eq!(
            result.column("km").unwrap(),
            vec![Value::Decimal(Decimal::from(200)), Value::Decimal(Decimal::from(400))]
        );
    }

    #[test]
    fn test_evaluation_is_pure() {
        let (schema, graph) = fixture();
        let q = Query::from("Car", "c")
            .join("c.features", "f")
            .filter(field("f.id").in_list([lit(FeatureKey::Aux), lit(FeatureKey::SeatBelts)]))
            .select(field("c.plate_number"))
            .select(field("f.name"));
        let config = EngineConfig::default();
        let first = eval_query(&q, &graph, &schema, &config).unwrap();
        let second = eval_query(&q, &graph, &schema, &config).unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(first.rows_returned, 3);
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let q = Query::from("Car", "c").join("c.journeys", "c");
        assert!(matches!(run(&q), Err(QueryError::Reference(_))));
    }

    #[test]
    fn test_division_by_zero_is_null() {
        assert_eq!(arith_values(ArithOp::Div, &Value::Integer(1), &Value::Integer(0)).unwrap(), Value::Null);
        assert_eq!(
            arith_values(ArithOp::Mul, &Value::Integer(200), &Value::Decimal(Decimal::new(16, 1))).unwrap(),
            Value::Decimal(Decimal::from(320))
        );
    }
}
