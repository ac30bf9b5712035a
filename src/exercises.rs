// =============================================================================
// EXERCISES — Les requêtes de référence, dans les deux styles
// =============================================================================
//
// Chaque exercice s'écrit deux fois : avec le constructeur typé et en texte.
// Les deux formes doivent produire les mêmes plaques sur le graphe de
// référence.
//
//   type = Honda                                  → BI 570CN
//   kilométrage < 250 km (miles convertis)        → BI 570CN
//   trajet après le 11/12/2021 avec un segment
//     de plus de 10 km                            → BI 570CN, WWL 123XX
//   ceintures + segment de plus de 150 km         → WWL 123XX
//   plus d'un trajet                              → BI 570CN
//   plus de 150 km hors ville                     → BI 570CN
//
// =============================================================================

use std::fmt;

use tracing::debug;

use crate::config::EngineConfig;
use crate::core::domain::{CarType, FeatureKey};
use crate::core::eval::eval_query;
use crate::core::graph::ObjectGraph;
use crate::core::hql;
use crate::core::project::ResultSet;
use crate::core::query::{count, field, kilometers, lit, param, sum, Query};
use crate::core::schema::Schema;
use crate::core::seed::{midnight, BMW_PLATE, HONDA_PLATE};
use crate::core::typeside::{Typeside, Value};
use crate::error::QueryError;

/// Un exercice : la même question posée dans les deux styles.
#[derive(Debug, Clone)]
pub struct Exercise {
    pub name: &'static str,
    /// Requête construite (paramètres déjà liés)
    pub builder: Query,
    /// Requête texte
    pub hql: &'static str,
    /// Paramètres liés à la requête texte
    pub params: Vec<(&'static str, Value)>,
    /// Plaques attendues, dans l'ordre
    pub expected: Vec<&'static str>,
}

impl Exercise {
    /// La requête texte compilée, paramètres liés.
    pub fn parsed(&self, typeside: &Typeside) -> Result<Query, QueryError> {
        let query = hql::parse(self.hql, typeside)?;
        Ok(self
            .params
            .iter()
            .fold(query, |q, (name, value)| q.bind(name, value.clone())))
    }
}

/// Les exercices sur le graphe de référence.
pub fn exercises() -> Vec<Exercise> {
    let since = midnight(2021, 12, 11);
    vec![
        Exercise {
            name: "voitures Honda",
            builder: Query::from("Car", "c").filter(field("c.type").eq(lit(CarType::Honda))),
            hql: "from Car c where c.type = CarType.Honda",
            params: vec![],
            expected: vec![HONDA_PLATE],
        },
        Exercise {
            name: "kilométrage inférieur à 250 km",
            builder: Query::from("Car", "c").filter(kilometers("c.mileage").lt(250)),
            hql: "from Car c where kilometers(c.mileage) < 250",
            params: vec![],
            expected: vec![HONDA_PLATE],
        },
        Exercise {
            name: "trajet récent avec un segment de plus de 10 km",
            builder: Query::from("Car", "c")
                .join_with("c.journeys", "j", field("j.started_at").gt(param("since")))
                .join_with("j.segments", "s", field("s.length_meters").gt(10_000))
                .distinct_root_entity()
                .bind("since", since),
            hql: "select distinct c from Car c \
                  join c.journeys j with j.started_at > :since \
                  join j.segments s with s.length_meters > 10000",
            params: vec![("since", Value::Timestamp(since))],
            expected: vec![HONDA_PLATE, BMW_PLATE],
        },
        Exercise {
            name: "ceintures et segment de plus de 150 km",
            builder: Query::from("Car", "c")
                .join_with("c.features", "f", field("f.id").eq(lit(FeatureKey::SeatBelts)))
                .join("c.journeys", "j")
                .join_with("j.segments", "s", field("s.length_meters").gt(150_000))
                .distinct_root_entity(),
            hql: "select distinct c from Car c \
                  join c.features f with f.id = FeatureKey.SeatBelts \
                  join c.journeys j \
                  join j.segments s with s.length_meters > 150000",
            params: vec![],
            expected: vec![BMW_PLATE],
        },
        Exercise {
            name: "plus d'un trajet",
            builder: Query::from("Car", "c")
                .join("c.journeys", "j")
                .group_by(field("c.plate_number"))
                .having(count(field("j.id")).gt(1))
                .select(field("c.plate_number")),
            hql: "select c.plate_number from Car c join c.journeys j \
                  group by c.plate_number having count(j.id) > 1",
            params: vec![],
            expected: vec![HONDA_PLATE],
        },
        Exercise {
            name: "plus de 150 km hors ville",
            builder: Query::from("Car", "c")
                .join("c.journeys", "j")
                .join_with("j.segments", "s", field("s.is_city").eq(false))
                .group_by(field("c.plate_number"))
                .having(sum(field("s.length_meters")).gt(150_000))
                .select(field("c.plate_number")),
            hql: "select c.plate_number from Car c \
                  join c.journeys j \
                  join j.segments s with s.is_city = false \
                  group by c.plate_number \
                  having sum(s.length_meters) > 150000",
            params: vec![],
            expected: vec![HONDA_PLATE],
        },
    ]
}

/// Les plaques d'un résultat : la colonne `plate_number` si elle est
/// projetée, sinon relue sur les voitures racines.
pub fn plates(result: &ResultSet, graph: &ObjectGraph, schema: &Schema) -> Result<Vec<String>, QueryError> {
    if result.column_index("plate_number").is_some() {
        return Ok(result.strings("plate_number"));
    }
    let mut plates = Vec::with_capacity(result.len());
    for row in result.rows.iter().filter_map(|r| r.root) {
        let value = graph.attr(schema, &result.root_entity, row, "plate_number")?;
        plates.extend(value.as_str().map(str::to_string));
    }
    Ok(plates)
}

/// Résultat d'un exercice dans les deux styles.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub name: &'static str,
    pub expected: Vec<String>,
    pub builder: Vec<String>,
    pub hql: Vec<String>,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.builder == self.expected && self.hql == self.expected
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed() { "✓" } else { "✗" };
        write!(f, "{} {} : {:?}", mark, self.name, self.builder)?;
        if self.hql != self.builder {
            write!(f, " (texte : {:?})", self.hql)?;
        }
        if !self.passed() {
            write!(f, " (attendu : {:?})", self.expected)?;
        }
        Ok(())
    }
}

/// Exécute un exercice dans les deux styles.
pub fn run(
    exercise: &Exercise,
    graph: &ObjectGraph,
    schema: &Schema,
    typeside: &Typeside,
    config: &EngineConfig,
) -> Result<Outcome, QueryError> {
    let built = eval_query(&exercise.builder, graph, schema, config)?;
    let parsed = eval_query(&exercise.parsed(typeside)?, graph, schema, config)?;
    debug!(exercise = exercise.name, rows = built.rows_returned, "exercice évalué");
    Ok(Outcome {
        name: exercise.name,
        expected: exercise.expected.iter().map(|p| p.to_string()).collect(),
        builder: plates(&built.result, graph, schema)?,
        hql: plates(&parsed.result, graph, schema)?,
    })
}

/// Exécute toute la suite.
pub fn run_all(
    graph: &ObjectGraph,
    schema: &Schema,
    typeside: &Typeside,
    config: &EngineConfig,
) -> Result<Vec<Outcome>, QueryError> {
    exercises()
        .iter()
        .map(|e| run(e, graph, schema, typeside, config))
        .collect()
}
