// =============================================================================
// DOMAIN — Les classes du domaine, typées
// =============================================================================
//
// Ce sont les objets que l'on manipule côté Rust : une Car possède son
// Mileage, ses Journeys (qui possèdent leurs Segments), partage des
// Features avec d'autres voitures et porte un dictionnaire de métadonnées.
//
// La hiérarchie File n'est PAS un héritage : c'est une union étiquetée
// dont l'étiquette est exactement le discriminant stocké (FileKind).
//
// Les énumérations gardent les codes entiers du modèle relationnel
// (0 = None réservé, donc non représenté).
//
// =============================================================================

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::typeside::{EnumValue, Typeside, Value};

/// Une énumération du domaine stockée par son code.
pub trait DomainEnum: Copy + Sized + 'static {
    /// Nom de l'enum dans le Typeside
    const NAME: &'static str;

    /// Toutes les variantes, dans l'ordre des codes
    fn all() -> &'static [Self];

    fn code(self) -> i64;

    fn variant(self) -> &'static str;

    fn from_code(code: i64) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.code() == code)
    }

    fn to_value(self) -> Value {
        Value::Enum(EnumValue {
            enum_name: Self::NAME.to_string(),
            variant: self.variant().to_string(),
            code: self.code(),
        })
    }

    /// Relit une valeur du graphe ; `None` si ce n'est pas cette enum.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Enum(e) if e.enum_name == Self::NAME => Self::from_code(e.code),
            _ => None,
        }
    }
}

macro_rules! domain_enum {
    ($name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum $name {
            $($variant),+
        }

        impl DomainEnum for $name {
            const NAME: &'static str = stringify!($name);

            fn all() -> &'static [Self] {
                &[$($name::$variant),+]
            }

            fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            fn variant(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl From<$name> for Value {
            fn from(v: $name) -> Self {
                v.to_value()
            }
        }
    };
}

domain_enum!(CarType { Audi = 1, Honda = 2, Bmw = 3 });
domain_enum!(UnitOfMeasure { Kilometers = 1, Miles = 2 });
domain_enum!(FeatureKey { SeatBelts = 1, Aux = 2, AirConditioning = 3, ElectricWindows = 4 });
domain_enum!(FileKind { Comment = 1, Article = 2 });

fn declare<E: DomainEnum>(typeside: &mut Typeside) {
    let variants: Vec<(&str, i64)> = E::all().iter().map(|v| (v.variant(), v.code())).collect();
    typeside.add_enum(E::NAME, &variants);
}

/// Le Typeside du domaine : types standards + les quatre énumérations.
pub fn fleet_typeside() -> Typeside {
    let mut ts = Typeside::standard();
    declare::<CarType>(&mut ts);
    declare::<UnitOfMeasure>(&mut ts);
    declare::<FeatureKey>(&mut ts);
    declare::<FileKind>(&mut ts);
    ts
}

/// Kilométrage d'une voiture, dans son unité d'origine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarMileage {
    pub id: Uuid,
    pub value: Decimal,
    pub unit: UnitOfMeasure,
}

impl CarMileage {
    /// Valeur ramenée en kilomètres.
    pub fn kilometers(&self, mile_to_km: Decimal) -> Decimal {
        match self.unit {
            UnitOfMeasure::Kilometers => self.value,
            UnitOfMeasure::Miles => self.value * mile_to_km,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub id: FeatureKey,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub id: Uuid,
    pub length_meters: i64,
    pub is_city: bool,
    /// Trajet propriétaire
    pub journey_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Journey {
    pub id: Uuid,
    pub started_at: NaiveDateTime,
    pub segments: Vec<Segment>,
    /// Voiture propriétaire
    pub car_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Car {
    pub id: Uuid,
    pub plate_number: String,
    pub car_type: CarType,
    pub fuel_intake_city: Decimal,
    pub fuel_intake_route: Decimal,
    /// `None` quand la voiture a été projetée sans ses références
    pub mileage: Option<CarMileage>,
    pub features: Vec<Feature>,
    pub journeys: Vec<Journey>,
    pub metadata: BTreeMap<String, String>,
}

/// Colonnes communes à tous les fichiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub path: String,
    pub name: String,
    pub folder_id: i64,
}

/// Union étiquetée par le discriminant stocké.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "file")]
pub enum File {
    Comment(FileRecord),
    Article(FileRecord),
}

impl File {
    pub fn new(kind: FileKind, record: FileRecord) -> Self {
        match kind {
            FileKind::Comment => File::Comment(record),
            FileKind::Article => File::Article(record),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            File::Comment(_) => FileKind::Comment,
            File::Article(_) => FileKind::Article,
        }
    }

    pub fn record(&self) -> &FileRecord {
        match self {
            File::Comment(r) | File::Article(r) => r,
        }
    }

    /// Nom de l'entité (sous-type) correspondant à l'étiquette.
    pub fn entity_name(&self) -> &'static str {
        match self {
            File::Comment(_) => "CommentFile",
            File::Article(_) => "ArticleFile",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typeside::BaseType;

    #[test]
    fn test_enum_codes_match_relational_keys() {
        assert_eq!(CarType::Honda.code(), 2);
        assert_eq!(UnitOfMeasure::Miles.code(), 2);
        assert_eq!(FeatureKey::SeatBelts.code(), 1);
        assert_eq!(FeatureKey::from_code(4), Some(FeatureKey::ElectricWindows));
        assert_eq!(FileKind::from_code(0), None);
    }

    #[test]
    fn test_enum_value_roundtrip_through_typeside() {
        let ts = fleet_typeside();
        assert!(ts.has_type(&BaseType::Enum("FeatureKey".into())));
        let v = ts.enum_value("CarType", "Bmw").unwrap();
        assert_eq!(v, CarType::Bmw.to_value());
        assert_eq!(CarType::from_value(&v), Some(CarType::Bmw));
        assert_eq!(UnitOfMeasure::from_value(&v), None);
    }

    #[test]
    fn test_mileage_in_kilometers() {
        let factor = Decimal::new(16, 1);
        let miles = CarMileage { id: Uuid::nil(), value: Decimal::from(200), unit: UnitOfMeasure::Miles };
        let km = CarMileage { unit: UnitOfMeasure::Kilometers, ..miles.clone() };
        assert_eq!(miles.kilometers(factor), Decimal::from(320));
        assert_eq!(km.kilometers(factor), Decimal::from(200));
    }

    #[test]
    fn test_file_is_tagged_by_kind() {
        let record = FileRecord { id: Uuid::nil(), path: "/1/".into(), name: "dog.png".into(), folder_id: 1 };
        let file = File::new(FileKind::Article, record.clone());
        assert_eq!(file.kind(), FileKind::Article);
        assert_eq!(file.record(), &record);
        assert_eq!(file.entity_name(), "ArticleFile");
    }
}
