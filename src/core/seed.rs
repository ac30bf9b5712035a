// =============================================================================
// SEED — Les données de référence des exercices
// =============================================================================
//
// Deux voitures, leurs trajets, segments, équipements et métadonnées, plus
// une poignée de fichiers sans rapport. Les valeurs sont LITTÉRALES et font
// foi pour tous les tests :
//
//   BI 570CN  Honda  200 km     3 trajets (dont un de 4 segments)
//   WWL 123XX Bmw    200 miles  1 trajet  (1 segment de 156 km en ville)
//
// Les identifiants sont tirés d'un compteur : deux chargements produisent
// exactement le même graphe.
//
// Le chargeur refuse de peupler deux fois sans `reset()` explicite.
//
// =============================================================================

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use super::domain::{
    Car, CarMileage, CarType, DomainEnum, Feature, FeatureKey, File, FileKind, FileRecord, Journey,
    Segment, UnitOfMeasure,
};
use super::graph::{ObjectGraph, RowId};
use super::schema::Schema;
use super::typeside::Value;
use crate::error::{QueryError, SeedError};

pub const HONDA_PLATE: &str = "BI 570CN";
pub const BMW_PLATE: &str = "WWL 123XX";
pub const KM_TO_METER_MULTIPLIER: i64 = 1000;

/// Minuit à la date donnée.
pub fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::default())
}

/// Générateur d'identifiants déterministes.
#[derive(Debug, Default)]
struct IdSequence {
    last: u128,
}

impl IdSequence {
    fn next(&mut self) -> Uuid {
        self.last += 1;
        Uuid::from_u128(self.last)
    }
}

/// Les agrégats typés des données de référence.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub features: Vec<Feature>,
    pub cars: Vec<Car>,
    pub files: Vec<File>,
}

fn segment(ids: &mut IdSequence, length_meters: i64, is_city: bool) -> Segment {
    Segment { id: ids.next(), length_meters, is_city, journey_id: None }
}

fn journey(ids: &mut IdSequence, started_at: NaiveDateTime, segments: Vec<Segment>) -> Journey {
    Journey { id: ids.next(), started_at, segments, car_id: None }
}

fn file(ids: &mut IdSequence, kind: FileKind, folder_id: i64, name: &str, path: &str) -> File {
    File::new(
        kind,
        FileRecord { id: ids.next(), path: path.to_string(), name: name.to_string(), folder_id },
    )
}

/// Construit les données de référence.
pub fn fixture() -> Fixture {
    let mut ids = IdSequence::default();

    let features = vec![
        Feature { id: FeatureKey::AirConditioning, name: "Air conditioning".into() },
        Feature { id: FeatureKey::SeatBelts, name: "Seat belts".into() },
        Feature { id: FeatureKey::Aux, name: "AUX".into() },
        Feature { id: FeatureKey::ElectricWindows, name: "Electric windows".into() },
    ];
    let feature = |key: FeatureKey| {
        features.iter().find(|f| f.id == key).cloned().unwrap_or(Feature { id: key, name: String::new() })
    };

    let honda = Car {
        id: ids.next(),
        plate_number: HONDA_PLATE.into(),
        car_type: CarType::Honda,
        fuel_intake_city: Decimal::from(10),
        fuel_intake_route: Decimal::from(7),
        mileage: Some(CarMileage {
            id: ids.next(),
            value: Decimal::from(200),
            unit: UnitOfMeasure::Kilometers,
        }),
        features: vec![feature(FeatureKey::Aux), feature(FeatureKey::AirConditioning)],
        journeys: vec![
            journey(&mut ids, midnight(2021, 12, 15), vec![]),
            journey(&mut ids, midnight(2020, 1, 1), vec![]),
            {
                let segments = vec![
                    segment(&mut ids, 6_000, true),
                    segment(&mut ids, 180_000, false),
                    segment(&mut ids, 15_000, true),
                    segment(&mut ids, 30_000, false),
                ];
                journey(&mut ids, midnight(2021, 12, 12), segments)
            },
        ],
        metadata: BTreeMap::from([
            ("niCategory".to_string(), "A".to_string()),
            ("test".to_string(), "hehe".to_string()),
        ]),
    };

    let bmw = Car {
        id: ids.next(),
        plate_number: BMW_PLATE.into(),
        car_type: CarType::Bmw,
        fuel_intake_city: Decimal::from(15),
        fuel_intake_route: Decimal::from(11),
        mileage: Some(CarMileage {
            id: ids.next(),
            value: Decimal::from(200),
            unit: UnitOfMeasure::Miles,
        }),
        features: vec![
            feature(FeatureKey::Aux),
            feature(FeatureKey::SeatBelts),
            feature(FeatureKey::ElectricWindows),
        ],
        journeys: vec![{
            let segments = vec![segment(&mut ids, 156_000, true)];
            journey(&mut ids, midnight(2022, 1, 1), segments)
        }],
        metadata: BTreeMap::new(),
    };

    let files = vec![
        file(&mut ids, FileKind::Comment, 1, "photo1.png", "/1/"),
        file(&mut ids, FileKind::Comment, 1, "photo2.png", "/1/"),
        file(&mut ids, FileKind::Comment, 2, "dog.png", "/Desktop/2/"),
        file(&mut ids, FileKind::Article, 1, "article.png", "/1/"),
        file(&mut ids, FileKind::Article, 1, "dog.png", "/1/"),
    ];

    Fixture { features, cars: vec![honda, bmw], files }
}

fn attrs<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Écrit des agrégats typés dans un graphe neuf.
pub fn materialize(schema: &Schema, fixture: &Fixture) -> Result<ObjectGraph, QueryError> {
    let mut graph = ObjectGraph::new("Seed", schema);

    let mut feature_rows: BTreeMap<FeatureKey, RowId> = BTreeMap::new();
    for feature in &fixture.features {
        let row = graph.insert(
            schema,
            "Feature",
            attrs([("id", feature.id.to_value()), ("name", feature.name.as_str().into())]),
        )?;
        feature_rows.insert(feature.id, row);
    }

    for car in &fixture.cars {
        let mut car_attrs = attrs([
            ("id", car.id.into()),
            ("plate_number", car.plate_number.as_str().into()),
            ("type", car.car_type.into()),
            ("fuel_intake_city", car.fuel_intake_city.into()),
            ("fuel_intake_route", car.fuel_intake_route.into()),
        ]);
        if !car.metadata.is_empty() {
            car_attrs.insert("metadata".into(), Value::Map(car.metadata.clone()));
        }
        let car_row = graph.insert(schema, "Car", car_attrs)?;

        if let Some(mileage) = &car.mileage {
            let row = graph.insert(
                schema,
                "Mileage",
                attrs([
                    ("id", mileage.id.into()),
                    ("value", mileage.value.into()),
                    ("unit_of_measure", mileage.unit.into()),
                ]),
            )?;
            graph.link(schema, "Car", car_row, "mileage", row)?;
        }

        for feature in &car.features {
            let row = feature_rows
                .get(&feature.id)
                .copied()
                .ok_or_else(|| QueryError::reference(format!("équipement {:?} non chargé", feature.id)))?;
            graph.link(schema, "Car", car_row, "features", row)?;
        }

        for journey in &car.journeys {
            let journey_row = graph.insert(
                schema,
                "Journey",
                attrs([("id", journey.id.into()), ("started_at", journey.started_at.into())]),
            )?;
            graph.link(schema, "Car", car_row, "journeys", journey_row)?;

            for segment in &journey.segments {
                let row = graph.insert(
                    schema,
                    "Segment",
                    attrs([
                        ("id", segment.id.into()),
                        ("length_meters", segment.length_meters.into()),
                        ("is_city", segment.is_city.into()),
                    ]),
                )?;
                graph.link(schema, "Journey", journey_row, "segments", row)?;
            }
        }
        debug!(plate = %car.plate_number, journeys = car.journeys.len(), "voiture chargée");
    }

    for file in &fixture.files {
        let record = file.record();
        graph.insert(
            schema,
            file.entity_name(),
            attrs([
                ("id", record.id.into()),
                ("path", record.path.as_str().into()),
                ("name", record.name.as_str().into()),
                ("folder_id", record.folder_id.into()),
            ]),
        )?;
    }

    Ok(graph)
}

/// Chargeur protégé contre le double peuplement.
#[derive(Debug, Default)]
pub struct SeedLoader {
    seeded: bool,
}

impl SeedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Autorise un nouveau chargement.
    pub fn reset(&mut self) {
        self.seeded = false;
    }

    /// Construit le graphe des données de référence.
    pub fn seed(&mut self, schema: &Schema) -> Result<ObjectGraph, SeedError> {
        if self.seeded {
            return Err(SeedError::AlreadySeeded);
        }
        let graph = materialize(schema, &fixture())?;
        self.seeded = true;
        info!(rows = graph.total_rows(), "graphe de référence chargé");
        Ok(graph)
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapping::fleet_schema;

    #[test]
    fn test_seed_counts() {
        let schema = fleet_schema().unwrap();
        let graph = SeedLoader::new().seed(&schema).unwrap();
        let count = |e: &str| graph.rows_of(&schema, e).unwrap().len();
        assert_eq!(count("Car"), 2);
        assert_eq!(count("Mileage"), 2);
        assert_eq!(count("Journey"), 4);
        assert_eq!(count("Segment"), 5);
        assert_eq!(count("Feature"), 4);
        assert_eq!(count("File"), 5);
        assert_eq!(count("CommentFile"), 3);
        assert_eq!(count("ArticleFile"), 2);
    }

    #[test]
    fn test_seed_twice_requires_reset() {
        let schema = fleet_schema().unwrap();
        let mut loader = SeedLoader::new();
        loader.seed(&schema).unwrap();
        assert!(loader.is_seeded());
        assert!(matches!(loader.seed(&schema), Err(SeedError::AlreadySeeded)));
        loader.reset();
        assert!(loader.seed(&schema).is_ok());
    }

    #[test]
    fn test_fixture_is_deterministic() {
        assert_eq!(fixture(), fixture());
        let schema = fleet_schema().unwrap();
        let a = materialize(&schema, &fixture()).unwrap();
        let b = materialize(&schema, &fixture()).unwrap();
        assert_eq!(a.display(), b.display());
    }

    #[test]
    fn test_shared_feature_links_both_cars() {
        let schema = fleet_schema().unwrap();
        let graph = SeedLoader::new().seed(&schema).unwrap();
        let features = graph.rows_of(&schema, "Feature").unwrap();
        let aux = features
            .into_iter()
            .find(|&r| graph.attr(&schema, "Feature", r, "id").unwrap() == FeatureKey::Aux.to_value())
            .unwrap();
        assert_eq!(graph.related(&schema, "Feature", aux, "cars").unwrap().len(), 2);
    }

    #[test]
    fn test_bmw_has_no_metadata() {
        let schema = fleet_schema().unwrap();
        let graph = SeedLoader::new().seed(&schema).unwrap();
        assert_eq!(graph.attr(&schema, "Car", 2, "metadata").unwrap(), Value::Null);
        assert_eq!(graph.attr(&schema, "Car", 2, "plate_number").unwrap(), Value::from(BMW_PLATE));
    }
}
