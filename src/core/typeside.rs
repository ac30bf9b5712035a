// =============================================================================
// TYPESIDE — Les types primitifs et les valeurs du moteur
// =============================================================================
//
// Le Typeside définit les types de base qu'un attribut peut porter
// (String, Int, Decimal, Timestamp...) ainsi que les ÉNUMÉRATIONS connues
// du moteur (CarType, UnitOfMeasure...). Ces énumérations sont stockées
// avec leur code entier, exactement comme une colonne `int` d'une table,
// mais restent typées : on ne compare pas un CarType à un entier.
//
// ANALOGIE : c'est l'équivalent des types SQL (VARCHAR, INTEGER, DECIMAL,
// DATETIME, UNIQUEIDENTIFIER) plus le catalogue des enums du domaine.
//
// =============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Un type de base du moteur.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseType {
    /// Chaîne de caractères (→ NVARCHAR)
    String,
    /// Entier (→ INT / BIGINT)
    Integer,
    /// Nombre décimal exact (→ DECIMAL)
    Decimal,
    /// Booléen (→ BIT)
    Boolean,
    /// Date + heure sans fuseau (→ DATETIME)
    Timestamp,
    /// Identifiant (→ UNIQUEIDENTIFIER)
    Uuid,
    /// Énumération nommée, stockée par son code
    Enum(String),
    /// Dictionnaire ouvert clé → valeur (table annexe en SQL)
    Map,
}

impl BaseType {
    /// Int et Decimal se comparent et se combinent entre eux.
    pub fn is_numeric(&self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Decimal)
    }

    /// Deux types peuvent-ils apparaître de part et d'autre d'une comparaison ?
    pub fn comparable_with(&self, other: &BaseType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::String => write!(f, "String"),
            BaseType::Integer => write!(f, "Int"),
            BaseType::Decimal => write!(f, "Decimal"),
            BaseType::Boolean => write!(f, "Bool"),
            BaseType::Timestamp => write!(f, "Timestamp"),
            BaseType::Uuid => write!(f, "Uuid"),
            BaseType::Enum(name) => write!(f, "{}", name),
            BaseType::Map => write!(f, "Map<String, String>"),
        }
    }
}

/// Valeur d'une énumération : nom de l'enum, variante et code stocké.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub enum_name: String,
    pub variant: String,
    pub code: i64,
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.enum_name, self.variant)
    }
}

impl Serialize for EnumValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Une valeur concrète : le contenu d'une cellule du graphe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Enum(EnumValue),
    Map(BTreeMap<String, String>),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Enum(e) => write!(f, "{}", e),
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl Value {
    /// Le BaseType de cette valeur. NULL n'a pas de type propre.
    pub fn get_type(&self) -> Option<BaseType> {
        match self {
            Value::String(_) => Some(BaseType::String),
            Value::Integer(_) => Some(BaseType::Integer),
            Value::Decimal(_) => Some(BaseType::Decimal),
            Value::Boolean(_) => Some(BaseType::Boolean),
            Value::Timestamp(_) => Some(BaseType::Timestamp),
            Value::Uuid(_) => Some(BaseType::Uuid),
            Value::Enum(e) => Some(BaseType::Enum(e.enum_name.clone())),
            Value::Map(_) => Some(BaseType::Map),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Vue numérique exacte (Int promu en Decimal).
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Ordre entre deux valeurs de types compatibles.
    ///
    /// Retourne `None` si l'une est NULL ou si les types ne se comparent pas
    /// (c'est à l'appelant de transformer ce cas en erreur de type).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) if a.enum_name == b.enum_name => {
                Some(a.code.cmp(&b.code))
            }
            (Value::Map(a), Value::Map(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

/// Une variante déclarée d'une énumération.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub code: i64,
}

/// Le Typeside : types disponibles + catalogue des énumérations.
#[derive(Debug, Clone, Default)]
pub struct Typeside {
    /// Les types de base disponibles
    pub types: Vec<BaseType>,
    /// Énumérations : nom → variantes (dans l'ordre de déclaration)
    pub enums: BTreeMap<String, Vec<EnumVariant>>,
}

impl Typeside {
    /// Les types scalaires standards, sans énumération.
    pub fn standard() -> Self {
        Typeside {
            types: vec![
                BaseType::String,
                BaseType::Integer,
                BaseType::Decimal,
                BaseType::Boolean,
                BaseType::Timestamp,
                BaseType::Uuid,
                BaseType::Map,
            ],
            enums: BTreeMap::new(),
        }
    }

    /// Vérifie qu'un type existe dans ce Typeside
    pub fn has_type(&self, ty: &BaseType) -> bool {
        match ty {
            BaseType::Enum(name) => self.enums.contains_key(name),
            other => self.types.contains(other),
        }
    }

    /// Déclare une énumération et ses variantes `(nom, code)`.
    pub fn add_enum(&mut self, name: &str, variants: &[(&str, i64)]) -> &mut Self {
        self.enums.insert(
            name.to_string(),
            variants
                .iter()
                .map(|(v, code)| EnumVariant { name: v.to_string(), code: *code })
                .collect(),
        );
        self
    }

    /// Construit la valeur `Enum.Variant` si elle est déclarée.
    pub fn enum_value(&self, enum_name: &str, variant: &str) -> Option<Value> {
        self.enums.get(enum_name)?.iter().find(|v| v.name == variant).map(|v| {
            Value::Enum(EnumValue {
                enum_name: enum_name.to_string(),
                variant: v.name.clone(),
                code: v.code,
            })
        })
    }

    /// Retrouve une valeur d'enum à partir de son code stocké.
    pub fn enum_from_code(&self, enum_name: &str, code: i64) -> Option<Value> {
        self.enums.get(enum_name)?.iter().find(|v| v.code == code).map(|v| {
            Value::Enum(EnumValue {
                enum_name: enum_name.to_string(),
                variant: v.name.clone(),
                code,
            })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn typeside() -> Typeside {
        let mut ts = Typeside::standard();
        ts.add_enum("CarType", &[("Audi", 1), ("Honda", 2), ("Bmw", 3)]);
        ts
    }

    #[test]
    fn test_standard_typeside() {
        let ts = Typeside::standard();
        assert!(ts.has_type(&BaseType::String));
        assert!(ts.has_type(&BaseType::Decimal));
        assert!(ts.has_type(&BaseType::Timestamp));
        assert!(!ts.has_type(&BaseType::Enum("CarType".into())));
    }

    #[test]
    fn test_enum_lookup() {
        let ts = typeside();
        let honda = ts.enum_value("CarType", "Honda").unwrap();
        assert_eq!(honda.to_string(), "CarType.Honda");
        assert_eq!(ts.enum_from_code("CarType", 2), Some(honda));
        assert!(ts.enum_value("CarType", "Fiat").is_none());
    }

    #[test]
    fn test_numeric_comparison_crosses_int_and_decimal() {
        let a = Value::Integer(200);
        let b = Value::Decimal(Decimal::new(2501, 1));
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert!(BaseType::Integer.comparable_with(&BaseType::Decimal));
    }

    #[test]
    fn test_incompatible_or_null_comparison_is_none() {
        assert_eq!(Value::from("200").compare(&Value::Integer(200)), None);
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert!(!BaseType::String.comparable_with(&BaseType::Timestamp));
    }

    #[test]
    fn test_enums_of_different_types_do_not_compare() {
        let mut ts = typeside();
        ts.add_enum("UnitOfMeasure", &[("Kilometers", 1), ("Miles", 2)]);
        let audi = ts.enum_value("CarType", "Audi").unwrap();
        let km = ts.enum_value("UnitOfMeasure", "Kilometers").unwrap();
        assert_eq!(audi.compare(&km), None);
    }
}
