// =============================================================================
// VALIDATE — Vérification des contraintes du mapping
// =============================================================================
//
// Ce module vérifie que les structures sont cohérentes :
//   - Un Schema est bien formé (relations réciproques, sous-types rattachés)
//   - Un ObjectGraph respecte les contraintes déclarées par les ClassMap
//     (non nul, longueur, unicité, relations obligatoires, cardinalités)
//
// L'évaluateur suppose ces propriétés : une relation 1..1 avec deux cibles
// ou une référence orpheline fausserait silencieusement les jointures.
//
// =============================================================================

use thiserror::Error;
use tracing::warn;

use super::graph::ObjectGraph;
use super::schema::{Edge, Schema};
use super::typeside::Value;

/// Erreur de validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: String) -> Self {
        ValidationError { message }
    }
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Vérifie qu'un Schema est bien formé.
///
/// Conditions :
/// - Toute relation vise une entité qui existe
/// - Toute relation réciproque existe et revient vers la source
/// - Tout sous-type a un parent muni d'un discriminant
pub fn validate_schema(schema: &Schema) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for edge in schema.relations() {
        let Edge::Relation { name, source, target, inverse, .. } = edge else {
            continue;
        };
        if !schema.nodes.contains_key(target) {
            errors.push(ValidationError::new(format!(
                "relation '{}.{}' : l'entité cible '{}' n'existe pas",
                source, name, target
            )));
            continue;
        }
        let Some(inverse) = inverse else {
            continue;
        };
        match schema.edge(target, inverse) {
            Ok(Edge::Relation { target: back, inverse: back_inverse, .. })
                if back == source && back_inverse.as_deref() == Some(name.as_str()) => {}
            Ok(_) => errors.push(ValidationError::new(format!(
                "relation '{}.{}' : la réciproque '{}.{}' ne revient pas vers {}",
                source, name, target, inverse, source
            ))),
            Err(_) => errors.push(ValidationError::new(format!(
                "relation '{}.{}' : la réciproque '{}.{}' n'existe pas",
                source, name, target, inverse
            ))),
        }
    }

    for node in schema.nodes.values() {
        let Some(sub) = &node.subtype_of else {
            continue;
        };
        match schema.nodes.get(&sub.parent) {
            None => errors.push(ValidationError::new(format!(
                "sous-type '{}' : le parent '{}' n'existe pas",
                node.name, sub.parent
            ))),
            Some(parent) if parent.discriminator.is_none() => errors.push(ValidationError::new(format!(
                "sous-type '{}' : le parent '{}' n'a pas de discriminant",
                node.name, parent.name
            ))),
            Some(_) => {}
        }
    }

    into_result(errors)
}

/// Vérifie qu'un ObjectGraph respecte le Schema.
///
/// Conditions :
/// - Les attributs non nuls sont renseignés
/// - Les chaînes respectent leur longueur maximale
/// - Les attributs uniques ne se répètent pas
/// - Une relation obligatoire a exactement une cible, une relation vers
///   une seule entité en a au plus une
/// - Chaque lien pointe vers une ligne qui existe
pub fn validate_graph(graph: &ObjectGraph, schema: &Schema) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (entity, table) in &graph.tables {
        if !schema.nodes.contains_key(entity) {
            errors.push(ValidationError::new(format!(
                "l'entité '{}' n'existe pas dans le schéma",
                entity
            )));
            continue;
        }

        for edge in schema.edges_from(entity) {
            match edge {
                Edge::Attribute { name, constraints, .. } => {
                    let mut seen: Vec<&Value> = Vec::new();
                    for row in table.row_ids() {
                        let value = table.get_attr(row, name).unwrap_or(&Value::Null);
                        if constraints.not_null && value.is_null() {
                            errors.push(ValidationError::new(format!(
                                "{}[{}] : '{}' ne peut pas être nul",
                                entity, row, name
                            )));
                        }
                        if let (Some(max), Value::String(s)) = (constraints.max_length, value) {
                            if s.chars().count() > max {
                                errors.push(ValidationError::new(format!(
                                    "{}[{}] : '{}' dépasse {} caractères ({:?})",
                                    entity, row, name, max, s
                                )));
                            }
                        }
                        if constraints.unique && !value.is_null() {
                            if seen.contains(&value) {
                                errors.push(ValidationError::new(format!(
                                    "{}[{}] : '{}' = {} existe déjà",
                                    entity, row, name, value
                                )));
                            }
                            seen.push(value);
                        }
                    }
                }
                Edge::Relation { name, target, cardinality, required, .. } => {
                    let target_table = graph.table(schema, target).ok();
                    for row in table.row_ids() {
                        let targets = table.related(row, name);
                        if *required && targets.len() != 1 {
                            errors.push(ValidationError::new(format!(
                                "{}[{}] : '{}' doit viser exactement une ligne ({} trouvées)",
                                entity, row, name, targets.len()
                            )));
                        } else if !cardinality.is_to_many() && targets.len() > 1 {
                            errors.push(ValidationError::new(format!(
                                "{}[{}] : '{}' ({}) vise {} lignes",
                                entity, row, name, cardinality, targets.len()
                            )));
                        }
                        for &t in targets {
                            if !target_table.is_some_and(|tt| tt.contains(t)) {
                                errors.push(ValidationError::new(format!(
                                    "{}[{}] : '{}' pointe vers {}[{}] qui n'existe pas",
                                    entity, row, name, target, t
                                )));
                            }
                        }
                    }
                }
            }
        }
    }

    if !errors.is_empty() {
        warn!(graph = %graph.name, errors = errors.len(), "graphe invalide");
    }
    into_result(errors)
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::core::domain::CarType;
    use crate::core::mapping::fleet_schema;
    use crate::core::seed::{midnight, SeedLoader, HONDA_PLATE};

    fn car_attrs(id: u128, plate: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("id".to_string(), Value::from(Uuid::from_u128(id))),
            ("plate_number".to_string(), Value::from(plate)),
            ("type".to_string(), Value::from(CarType::Audi)),
            ("fuel_intake_city".to_string(), Value::from(Decimal::from(8))),
            ("fuel_intake_route".to_string(), Value::from(Decimal::from(5))),
        ])
    }

    #[test]
    fn test_validate_schema_ok() {
        assert!(validate_schema(&fleet_schema().unwrap()).is_ok());
    }

    #[test]
    fn test_validate_schema_broken_inverse() {
        let mut schema = fleet_schema().unwrap();
        if let Some(Edge::Relation { inverse, .. }) = schema.edges.get_mut("Car.journeys") {
            *inverse = Some("segments".into());
        }
        let errors = validate_schema(&schema).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("Car.journeys")));
    }

    #[test]
    fn test_validate_seeded_graph_ok() {
        let schema = fleet_schema().unwrap();
        let graph = SeedLoader::new().seed(&schema).unwrap();
        assert_eq!(validate_graph(&graph, &schema), Ok(()));
    }

    #[test]
    fn test_duplicate_plate_is_reported() {
        let schema = fleet_schema().unwrap();
        let mut graph = SeedLoader::new().seed(&schema).unwrap();
        graph.insert(&schema, "Car", car_attrs(900, HONDA_PLATE)).unwrap();

        let errors = validate_graph(&graph, &schema).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("plate_number"));
    }

    #[test]
    fn test_plate_too_long_is_reported() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("Test", &schema);
        graph.insert(&schema, "Car", car_attrs(1, "ABCDEFGHIJK")).unwrap();

        let errors = validate_graph(&graph, &schema).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("dépasse 9"));
    }

    #[test]
    fn test_orphan_journey_is_reported() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("Test", &schema);
        graph
            .insert(
                &schema,
                "Journey",
                BTreeMap::from([
                    ("id".to_string(), Value::from(Uuid::from_u128(7))),
                    ("started_at".to_string(), Value::from(midnight(2021, 1, 1))),
                ]),
            )
            .unwrap();

        let errors = validate_graph(&graph, &schema).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'car'"));
    }
}
