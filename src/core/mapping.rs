// =============================================================================
// MAPPING — Déclarations fluides entité → schéma
// =============================================================================
//
// Un ClassMap décrit UNE entité à la manière d'un mapping fluide :
//
//   ClassMap::new("Car")
//       .id("id", BaseType::Uuid)
//       .map("plate_number", BaseType::String).not_null().length(9).unique()
//       .has_one("mileage", "Mileage").inverse("car")
//       .has_many("journeys", "Journey").inverse("car")
//
// Les modificateurs (`not_null`, `unique`, `length`, `inverse`) portent sur
// la DERNIÈRE déclaration. Sur une relation, `not_null` signifie « liée à
// exactement une cible ».
//
// `build_schema` enregistre d'abord tous les nœuds puis toutes les arêtes,
// pour qu'une relation puisse viser une entité déclarée plus loin.
//
// =============================================================================

use super::domain::{CarType, DomainEnum, FeatureKey, FileKind, UnitOfMeasure};
use super::schema::{Cardinality, Constraints, Schema};
use super::typeside::{BaseType, Value};
use crate::error::QueryError;

#[derive(Debug, Clone)]
enum Declaration {
    Attribute {
        name: String,
        ty: BaseType,
        constraints: Constraints,
    },
    Relation {
        name: String,
        target: String,
        cardinality: Cardinality,
        inverse: Option<String>,
        required: bool,
    },
}

/// Mapping fluide d'une entité.
#[derive(Debug, Clone)]
pub struct ClassMap {
    entity: String,
    id_attribute: Option<String>,
    declarations: Vec<Declaration>,
    discriminator: Option<String>,
    subclasses: Vec<(String, Value)>,
}

impl ClassMap {
    pub fn new(entity: &str) -> Self {
        ClassMap {
            entity: entity.to_string(),
            id_attribute: None,
            declarations: Vec::new(),
            discriminator: None,
            subclasses: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Identifiant : non nul et unique.
    pub fn id(mut self, name: &str, ty: BaseType) -> Self {
        self.id_attribute = Some(name.to_string());
        self.declarations.push(Declaration::Attribute {
            name: name.to_string(),
            ty,
            constraints: Constraints { not_null: true, unique: true, max_length: None },
        });
        self
    }

    /// Colonne simple.
    pub fn map(mut self, name: &str, ty: BaseType) -> Self {
        self.declarations.push(Declaration::Attribute {
            name: name.to_string(),
            ty,
            constraints: Constraints::default(),
        });
        self
    }

    pub fn not_null(mut self) -> Self {
        match self.declarations.last_mut() {
            Some(Declaration::Attribute { constraints, .. }) => constraints.not_null = true,
            Some(Declaration::Relation { required, .. }) => *required = true,
            None => {}
        }
        self
    }

    pub fn unique(mut self) -> Self {
        if let Some(Declaration::Attribute { constraints, .. }) = self.declarations.last_mut() {
            constraints.unique = true;
        }
        self
    }

    pub fn length(mut self, max: usize) -> Self {
        if let Some(Declaration::Attribute { constraints, .. }) = self.declarations.last_mut() {
            constraints.max_length = Some(max);
        }
        self
    }

    fn relation(mut self, name: &str, target: &str, cardinality: Cardinality) -> Self {
        self.declarations.push(Declaration::Relation {
            name: name.to_string(),
            target: target.to_string(),
            cardinality,
            inverse: None,
            required: false,
        });
        self
    }

    /// Référence vers un parent (n..1).
    pub fn references(self, name: &str, target: &str) -> Self {
        self.relation(name, target, Cardinality::ManyToOne)
    }

    /// Référence possédée exclusivement (1..1).
    pub fn has_one(self, name: &str, target: &str) -> Self {
        self.relation(name, target, Cardinality::OneToOne)
    }

    /// Collection possédée (1..n).
    pub fn has_many(self, name: &str, target: &str) -> Self {
        self.relation(name, target, Cardinality::OneToMany)
    }

    /// Collection partagée (n..n).
    pub fn has_many_to_many(self, name: &str, target: &str) -> Self {
        self.relation(name, target, Cardinality::ManyToMany)
    }

    /// Nomme la relation réciproque côté cible.
    pub fn inverse(mut self, name: &str) -> Self {
        if let Some(Declaration::Relation { inverse, .. }) = self.declarations.last_mut() {
            *inverse = Some(name.to_string());
        }
        self
    }

    /// Colonne discriminante d'une hiérarchie (toujours non nulle).
    pub fn discriminate_by(mut self, name: &str, ty: BaseType) -> Self {
        self.discriminator = Some(name.to_string());
        self.declarations.push(Declaration::Attribute {
            name: name.to_string(),
            ty,
            constraints: Constraints { not_null: true, ..Constraints::default() },
        });
        self
    }

    /// Sous-type repéré par une valeur du discriminant.
    pub fn subclass(mut self, name: &str, discriminator_value: impl Into<Value>) -> Self {
        self.subclasses.push((name.to_string(), discriminator_value.into()));
        self
    }

    fn register_node(&self, schema: &mut Schema) {
        schema.add_node(&self.entity);
        if let (Some(id), Some(node)) = (&self.id_attribute, schema.nodes.get_mut(&self.entity)) {
            node.id_attribute = id.clone();
        }
    }

    fn register_edges(&self, schema: &mut Schema) -> Result<(), QueryError> {
        for declaration in &self.declarations {
            match declaration {
                Declaration::Attribute { name, ty, constraints } => {
                    schema.add_attribute(&self.entity, name, ty.clone(), constraints.clone())?;
                }
                Declaration::Relation { name, target, cardinality, inverse, required } => {
                    schema.add_relation(&self.entity, name, target, *cardinality, inverse.as_deref())?;
                    if *required {
                        schema.require_relation(&self.entity, name)?;
                    }
                }
            }
        }
        if let Some(discriminator) = &self.discriminator {
            schema.set_discriminator(&self.entity, discriminator)?;
        }
        for (name, value) in &self.subclasses {
            schema.add_subtype(name, &self.entity, value.clone())?;
        }
        Ok(())
    }
}

/// Construit un Schema à partir d'un ensemble de ClassMap.
pub fn build_schema(name: &str, maps: &[ClassMap]) -> Result<Schema, QueryError> {
    let mut schema = Schema::new(name);
    for map in maps {
        map.register_node(&mut schema);
    }
    for map in maps {
        map.register_edges(&mut schema)?;
    }
    Ok(schema)
}

fn enum_type<E: DomainEnum>() -> BaseType {
    BaseType::Enum(E::NAME.to_string())
}

/// Les mappings des exercices.
pub fn fleet_mappings() -> Vec<ClassMap> {
    vec![
        ClassMap::new("Car")
            .id("id", BaseType::Uuid)
            .map("type", enum_type::<CarType>()).not_null()
            .map("plate_number", BaseType::String).not_null().length(9).unique()
            .map("fuel_intake_city", BaseType::Decimal).not_null()
            .map("fuel_intake_route", BaseType::Decimal).not_null()
            .map("metadata", BaseType::Map)
            .has_one("mileage", "Mileage").inverse("car")
            .has_many("journeys", "Journey").inverse("car")
            .has_many_to_many("features", "Feature").inverse("cars"),
        ClassMap::new("Mileage")
            .id("id", BaseType::Uuid)
            .map("unit_of_measure", enum_type::<UnitOfMeasure>())
            .map("value", BaseType::Decimal)
            .has_one("car", "Car").inverse("mileage").not_null(),
        ClassMap::new("Journey")
            .id("id", BaseType::Uuid)
            .map("started_at", BaseType::Timestamp).not_null()
            .has_many("segments", "Segment").inverse("journey")
            .references("car", "Car").inverse("journeys").not_null(),
        ClassMap::new("Segment")
            .id("id", BaseType::Uuid)
            .map("length_meters", BaseType::Integer).not_null()
            .map("is_city", BaseType::Boolean).not_null()
            .references("journey", "Journey").inverse("segments").not_null(),
        ClassMap::new("Feature")
            .id("id", enum_type::<FeatureKey>())
            .map("name", BaseType::String).length(255).not_null()
            .has_many_to_many("cars", "Car").inverse("features"),
        ClassMap::new("File")
            .id("id", BaseType::Uuid)
            .map("path", BaseType::String).not_null().length(255)
            .map("name", BaseType::String).not_null().length(64)
            .map("folder_id", BaseType::Integer).not_null()
            .discriminate_by("kind", enum_type::<FileKind>())
            .subclass("CommentFile", FileKind::Comment)
            .subclass("ArticleFile", FileKind::Article),
    ]
}

/// Le schéma des exercices.
pub fn fleet_schema() -> Result<Schema, QueryError> {
    build_schema("Fleet", &fleet_mappings())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Edge;

    #[test]
    fn test_fleet_schema_shape() {
        let schema = fleet_schema().unwrap();
        assert_eq!(schema.nodes.len(), 8); // 6 entités + 2 sous-types
        assert_eq!(schema.storage_entity("ArticleFile").unwrap(), "File");
        assert_eq!(schema.id_type("Feature").unwrap(), BaseType::Enum("FeatureKey".into()));
    }

    #[test]
    fn test_modifiers_apply_to_last_declaration() {
        let schema = fleet_schema().unwrap();
        match schema.edge("Car", "plate_number").unwrap() {
            Edge::Attribute { constraints, .. } => {
                assert!(constraints.not_null);
                assert!(constraints.unique);
                assert_eq!(constraints.max_length, Some(9));
            }
            other => panic!("attribut attendu, obtenu {:?}", other),
        }
        match schema.edge("Segment", "journey").unwrap() {
            Edge::Relation { required, cardinality, inverse, .. } => {
                assert!(*required);
                assert_eq!(*cardinality, Cardinality::ManyToOne);
                assert_eq!(inverse.as_deref(), Some("segments"));
            }
            other => panic!("relation attendue, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_relation_to_undeclared_entity_fails() {
        let maps = vec![ClassMap::new("Car").id("id", BaseType::Uuid).has_many("journeys", "Journey")];
        assert!(matches!(build_schema("Broken", &maps), Err(QueryError::Reference(_))));
    }
}
