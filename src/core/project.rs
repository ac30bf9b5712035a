// =============================================================================
// PROJECT — Des lignes de résultat aux objets du domaine
// =============================================================================
//
// L'évaluateur produit un ResultSet :
//   - sélection de la racine  → une ligne par entité, sans colonnes
//   - sélection de colonnes   → des tuples plats (plaques, sommes...)
//   - `select new Car(...)`   → des colonnes nommées d'après les attributs
//
// Ce module reconstruit les objets typés :
//
//   result.load::<Car>(&graph, &schema)   agrégat complet, relu du graphe
//                                         (Mileage, Journeys + Segments,
//                                          Features, métadonnées)
//   result.partial::<Car>()               entité partielle, SANS références
//                                         (mileage = None, collections vides)
//
// La navigation suit explicitement les liens du graphe : rien n'est chargé
// paresseusement.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::domain::{
    Car, CarMileage, DomainEnum, Feature, File, FileKind, FileRecord, Journey, Segment,
};
use super::graph::{ObjectGraph, RowId};
use super::schema::Schema;
use super::typeside::Value;
use crate::error::QueryError;

/// Une ligne de résultat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Ligne racine dont est issue cette ligne (absente pour un agrégat vide)
    pub root: Option<RowId>,
    pub values: Vec<Value>,
}

/// Le résultat d'une requête.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub root_entity: String,
    /// Entité produite (racine ou `select new`), `None` pour des colonnes
    pub entity: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == label)
    }

    /// Toutes les valeurs d'une colonne.
    pub fn column(&self, label: &str) -> Option<Vec<Value>> {
        let i = self.column_index(label)?;
        Some(self.rows.iter().map(|r| r.values.get(i).cloned().unwrap_or(Value::Null)).collect())
    }

    /// Les chaînes d'une colonne (les autres valeurs sont ignorées).
    pub fn strings(&self, label: &str) -> Vec<String> {
        self.column(label)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Au plus une ligne, sinon erreur de cardinalité.
    pub fn unique_result(&self) -> Result<Option<&ResultRow>, QueryError> {
        match self.rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(row)),
            rows => Err(QueryError::cardinality(format!(
                "résultat unique attendu, {} lignes obtenues",
                rows.len()
            ))),
        }
    }

    /// Les lignes sous forme `colonne → valeur` (la racine sous le nom de
    /// son entité quand aucune colonne n'est projetée).
    pub fn records(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                if self.columns.is_empty() {
                    let entity = self.entity.clone().unwrap_or_else(|| self.root_entity.clone());
                    let id = row.root.map(|r| Value::Integer(i64::try_from(r).unwrap_or(i64::MAX)));
                    BTreeMap::from([(entity, id.unwrap_or(Value::Null))])
                } else {
                    self.columns.iter().cloned().zip(row.values.iter().cloned()).collect()
                }
            })
            .collect()
    }

    /// Recharge les agrégats complets des entités sélectionnées.
    pub fn load<T: Materialize>(&self, graph: &ObjectGraph, schema: &Schema) -> Result<Vec<T>, QueryError> {
        let Some(entity) = &self.entity else {
            return Err(QueryError::type_error("le résultat ne contient que des colonnes"));
        };
        if !self.columns.is_empty() {
            return Err(QueryError::type_error(format!(
                "{} est une projection partielle : utiliser partial()",
                entity
            )));
        }
        if schema.storage_entity(entity)? != schema.storage_entity(T::ENTITY)? {
            return Err(QueryError::type_error(format!("{} ne se lit pas comme {}", entity, T::ENTITY)));
        }
        self.rows
            .iter()
            .filter_map(|r| r.root)
            .map(|row| T::load(graph, schema, row))
            .collect()
    }

    /// Reconstruit les entités partielles d'un `select new`.
    pub fn partial<T: Materialize>(&self) -> Result<Vec<T>, QueryError> {
        match &self.entity {
            Some(entity) if entity == T::ENTITY && !self.columns.is_empty() => self
                .rows
                .iter()
                .map(|r| T::from_fields(&ColumnRow { columns: &self.columns, values: &r.values }))
                .collect(),
            _ => Err(QueryError::type_error(format!("aucune projection new {} dans ce résultat", T::ENTITY))),
        }
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            let entity = self.entity.as_deref().unwrap_or(&self.root_entity);
            for row in &self.rows {
                match row.root {
                    Some(r) => writeln!(f, "  {}[{}]", entity, r)?,
                    None => writeln!(f, "  {}[NULL]", entity)?,
                }
            }
            return Ok(());
        }
        writeln!(f, "  {}", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.values.iter().map(Value::to_string).collect();
            writeln!(f, "  {}", cells.join(" | "))?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Lecture typée des valeurs
// -----------------------------------------------------------------------------

/// Conversion d'une valeur du moteur vers un type Rust.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_decimal()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromValue for BTreeMap<String, String> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Map(m) => Some(m.clone()),
            _ => None,
        }
    }
}

/// Une source de valeurs nommées : une ligne du graphe ou une ligne
/// projetée. NULL et absence se confondent.
pub trait Fields {
    fn value(&self, name: &str) -> Result<Value, QueryError>;

    fn get<T: FromValue>(&self, name: &str) -> Result<Option<T>, QueryError> {
        let value = self.value(name)?;
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(&value)
            .map(Some)
            .ok_or_else(|| QueryError::type_error(format!("'{}' : valeur {} inattendue", name, value)))
    }

    fn require<T: FromValue>(&self, name: &str) -> Result<T, QueryError> {
        self.get(name)?
            .ok_or_else(|| QueryError::reference(format!("'{}' absent ou NULL", name)))
    }

    fn require_enum<E: DomainEnum>(&self, name: &str) -> Result<E, QueryError> {
        let value = self.value(name)?;
        E::from_value(&value)
            .ok_or_else(|| QueryError::type_error(format!("'{}' : {} attendu, reçu {}", name, E::NAME, value)))
    }
}

/// Une ligne projetée : colonnes nommées d'après les attributs.
pub struct ColumnRow<'a> {
    pub columns: &'a [String],
    pub values: &'a [Value],
}

impl Fields for ColumnRow<'_> {
    fn value(&self, name: &str) -> Result<Value, QueryError> {
        Ok(self
            .columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i).cloned())
            .unwrap_or(Value::Null))
    }
}

/// Une ligne stockée du graphe.
pub struct GraphRow<'a> {
    graph: &'a ObjectGraph,
    schema: &'a Schema,
    entity: &'a str,
    row: RowId,
}

impl<'a> GraphRow<'a> {
    pub fn new(graph: &'a ObjectGraph, schema: &'a Schema, entity: &'a str, row: RowId) -> Self {
        GraphRow { graph, schema, entity, row }
    }

    fn related(&self, relation: &str) -> Result<&'a [RowId], QueryError> {
        self.graph.related(self.schema, self.entity, self.row, relation)
    }

    /// Identifiant du propriétaire atteint par une relation vers un seul parent.
    fn owner_id(&self, relation: &str, owner: &str) -> Result<Option<Uuid>, QueryError> {
        match self.related(relation)?.first() {
            Some(&parent) => Ok(Uuid::from_value(&self.graph.id_of(self.schema, owner, parent)?)),
            None => Ok(None),
        }
    }

    fn load_all<T: Materialize>(&self, relation: &str) -> Result<Vec<T>, QueryError> {
        self.related(relation)?
            .iter()
            .map(|&row| T::load(self.graph, self.schema, row))
            .collect()
    }
}

impl Fields for GraphRow<'_> {
    fn value(&self, name: &str) -> Result<Value, QueryError> {
        self.graph.attr(self.schema, self.entity, self.row, name)
    }
}

// -----------------------------------------------------------------------------
// Reconstruction des entités
// -----------------------------------------------------------------------------

/// Une entité du domaine reconstructible depuis un résultat.
pub trait Materialize: Sized {
    /// Entité du schéma correspondante
    const ENTITY: &'static str;

    /// Les attributs seuls, références laissées vides.
    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError>;

    /// L'agrégat complet, relu depuis le graphe.
    fn load(graph: &ObjectGraph, schema: &Schema, row: RowId) -> Result<Self, QueryError> {
        Self::from_fields(&GraphRow::new(graph, schema, Self::ENTITY, row))
    }
}

impl Materialize for CarMileage {
    const ENTITY: &'static str = "Mileage";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        Ok(CarMileage {
            id: fields.get("id")?.unwrap_or_default(),
            value: fields.require("value")?,
            unit: fields.require_enum("unit_of_measure")?,
        })
    }
}

impl Materialize for Feature {
    const ENTITY: &'static str = "Feature";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        Ok(Feature { id: fields.require_enum("id")?, name: fields.require("name")? })
    }
}

impl Materialize for Segment {
    const ENTITY: &'static str = "Segment";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        Ok(Segment {
            id: fields.get("id")?.unwrap_or_default(),
            length_meters: fields.require("length_meters")?,
            is_city: fields.require("is_city")?,
            journey_id: None,
        })
    }

    fn load(graph: &ObjectGraph, schema: &Schema, row: RowId) -> Result<Self, QueryError> {
        let fields = GraphRow::new(graph, schema, Self::ENTITY, row);
        let mut segment = Self::from_fields(&fields)?;
        segment.journey_id = fields.owner_id("journey", "Journey")?;
        Ok(segment)
    }
}

impl Materialize for Journey {
    const ENTITY: &'static str = "Journey";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        Ok(Journey {
            id: fields.get("id")?.unwrap_or_default(),
            started_at: fields.require("started_at")?,
            segments: Vec::new(),
            car_id: None,
        })
    }

    fn load(graph: &ObjectGraph, schema: &Schema, row: RowId) -> Result<Self, QueryError> {
        let fields = GraphRow::new(graph, schema, Self::ENTITY, row);
        let mut journey = Self::from_fields(&fields)?;
        journey.segments = fields.load_all("segments")?;
        journey.car_id = fields.owner_id("car", "Car")?;
        Ok(journey)
    }
}

impl Materialize for Car {
    const ENTITY: &'static str = "Car";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        Ok(Car {
            id: fields.get("id")?.unwrap_or_default(),
            plate_number: fields.require("plate_number")?,
            car_type: fields.require_enum("type")?,
            fuel_intake_city: fields.get("fuel_intake_city")?.unwrap_or_default(),
            fuel_intake_route: fields.get("fuel_intake_route")?.unwrap_or_default(),
            mileage: None,
            features: Vec::new(),
            journeys: Vec::new(),
            metadata: fields.get("metadata")?.unwrap_or_default(),
        })
    }

    fn load(graph: &ObjectGraph, schema: &Schema, row: RowId) -> Result<Self, QueryError> {
        let fields = GraphRow::new(graph, schema, Self::ENTITY, row);
        let mut car = Self::from_fields(&fields)?;
        car.mileage = fields.load_all::<CarMileage>("mileage")?.into_iter().next();
        car.features = fields.load_all("features")?;
        car.journeys = fields.load_all("journeys")?;
        Ok(car)
    }
}

impl Materialize for File {
    const ENTITY: &'static str = "File";

    fn from_fields(fields: &impl Fields) -> Result<Self, QueryError> {
        let kind: FileKind = fields.require_enum("kind")?;
        let record = FileRecord {
            id: fields.get("id")?.unwrap_or_default(),
            path: fields.require("path")?,
            name: fields.require("name")?,
            folder_id: fields.require("folder_id")?,
        };
        Ok(File::new(kind, record))
    }
}
