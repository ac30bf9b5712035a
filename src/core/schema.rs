// =============================================================================
// SCHEMA — Le registre des entités, attributs et relations
// =============================================================================
//
// Un Schema décrit la FORME du graphe d'objets :
//   - Les NŒUDS sont les entités (Car, Journey, Segment...)
//   - Les ARÊTES sont de deux sortes :
//       1. Relations : entité → entité, avec une cardinalité
//          (ManyToOne, OneToOne, OneToMany, ManyToMany) et un inverse
//       2. Attributs : entité → type de base, avec des contraintes
//          de colonne (non nul, unique, longueur max)
//   - Des SOUS-TYPES discriminés : CommentFile et ArticleFile sont des File
//     distingués par la valeur stockée dans l'attribut `kind`.
//
// EXEMPLE VISUEL :
//
//   Car ──journeys (1..n)──▶ Journey ──segments (1..n)──▶ Segment
//    │ ◀──────car (n..1)───────┘  ◀─────journey (n..1)──────┘
//    │
//    ├──mileage (1..1)──▶ Mileage
//    └──features (n..n)──▶ Feature
//
// Le registre sert surtout à RÉSOUDRE les chemins : `c.journeys.segments`
// devient une suite de sauts de relation suivie éventuellement d'un
// attribut terminal (`length_meters`). Il n'est plus modifié une fois
// construit.
//
// =============================================================================

use std::collections::BTreeMap;

use super::typeside::{BaseType, Value};
use crate::error::QueryError;

/// Un sous-type discriminé : les lignes sont stockées dans la table du
/// parent, filtrées par la valeur du discriminant.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtype {
    pub parent: String,
    pub discriminator_value: Value,
}

/// Un nœud du schéma = une entité.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// Attribut identifiant (`id` par défaut)
    pub id_attribute: String,
    /// Attribut discriminant, pour une racine de hiérarchie
    pub discriminator: Option<String>,
    /// Parent, pour un sous-type
    pub subtype_of: Option<Subtype>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Node {
            name: name.to_string(),
            id_attribute: "id".to_string(),
            discriminator: None,
            subtype_of: None,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Cardinalité d'une relation, vue depuis sa source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Une relation vers plusieurs cibles multiplie les lignes d'une jointure.
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::ManyToOne => write!(f, "n..1"),
            Cardinality::OneToOne => write!(f, "1..1"),
            Cardinality::OneToMany => write!(f, "1..n"),
            Cardinality::ManyToMany => write!(f, "n..n"),
        }
    }
}

/// Contraintes de colonne portées par un attribut.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub not_null: bool,
    pub unique: bool,
    pub max_length: Option<usize>,
}

/// Une arête du schéma.
#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    /// Relation entre deux entités
    Relation {
        name: String,
        source: String,
        target: String,
        cardinality: Cardinality,
        /// Nom de la relation réciproque dans l'entité cible
        inverse: Option<String>,
        /// La source doit être liée à exactement une cible
        required: bool,
    },
    /// Attribut : entité → type de base
    Attribute {
        name: String,
        source: String,
        target: BaseType,
        constraints: Constraints,
    },
}

impl Edge {
    /// Retourne le nom de l'arête
    pub fn name(&self) -> &str {
        match self {
            Edge::Relation { name, .. } => name,
            Edge::Attribute { name, .. } => name,
        }
    }

    /// Retourne le nom du nœud source
    pub fn source(&self) -> &str {
        match self {
            Edge::Relation { source, .. } => source,
            Edge::Attribute { source, .. } => source,
        }
    }

    /// Clé de rangement dans le schéma : `Source.nom`
    pub fn qualified_name(&self) -> String {
        qualify(self.source(), self.name())
    }
}

fn qualify(source: &str, name: &str) -> String {
    format!("{}.{}", source, name)
}

/// Un chemin écrit dans une requête : un point de départ et des noms
/// d'arêtes à traverser (`Car.journeys.segments.length_meters`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    /// Nœud (ou alias) de départ du chemin
    pub start: String,
    /// Séquence des noms d'arêtes à traverser
    pub edges: Vec<String>,
}

impl Path {
    pub fn new(start: &str, edges: Vec<&str>) -> Self {
        Path {
            start: start.to_string(),
            edges: edges.into_iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Chemin identité (ne traverse aucune arête)
    pub fn identity(start: &str) -> Self {
        Path { start: start.to_string(), edges: vec![] }
    }

    /// Découpe `c.journeys.segments` en départ + arêtes.
    pub fn parse(dotted: &str) -> Self {
        let mut parts = dotted.split('.').map(str::trim);
        let start = parts.next().unwrap_or_default().to_string();
        Path { start, edges: parts.map(str::to_string).collect() }
    }

    /// Prolonge le chemin (le second commence là où le premier finit)
    pub fn compose(&self, other: &Path) -> Self {
        let mut edges = self.edges.clone();
        edges.extend(other.edges.clone());
        Path { start: self.start.clone(), edges }
    }

    /// Longueur du chemin (nombre d'arêtes)
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_identity(&self) -> bool {
        self.edges.is_empty()
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.edges.is_empty() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}.{}", self.start, self.edges.join("."))
        }
    }
}

/// Un saut de relation dans un chemin résolu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub relation: String,
    pub source: String,
    pub target: String,
    pub cardinality: Cardinality,
}

/// Attribut terminal d'un chemin résolu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRef {
    pub entity: String,
    pub name: String,
    pub ty: BaseType,
}

/// Un chemin traduit en étapes de parcours du graphe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub start: String,
    pub hops: Vec<Hop>,
    /// Entité atteinte après le dernier saut
    pub end_entity: String,
    /// `None` si le chemin désigne une entité et non une valeur
    pub attribute: Option<AttributeRef>,
}

impl ResolvedPath {
    /// Le chemin traverse-t-il au moins une collection ?
    pub fn is_to_many(&self) -> bool {
        self.hops.iter().any(|h| h.cardinality.is_to_many())
    }
}

/// Le registre complet.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Nom du schéma
    pub name: String,
    /// Les nœuds (entités) : nom → Node
    pub nodes: BTreeMap<String, Node>,
    /// Les arêtes : `Source.nom` → Edge
    pub edges: BTreeMap<String, Edge>,
}

impl Schema {
    /// Crée un nouveau Schema vide
    pub fn new(name: &str) -> Self {
        Schema { name: name.to_string(), nodes: BTreeMap::new(), edges: BTreeMap::new() }
    }

    /// Ajoute un nœud (entité) au schéma
    pub fn add_node(&mut self, name: &str) -> &mut Self {
        self.nodes.insert(name.to_string(), Node::new(name));
        self
    }

    /// Retourne un nœud ou une erreur de référence.
    pub fn node(&self, name: &str) -> Result<&Node, QueryError> {
        self.nodes
            .get(name)
            .ok_or_else(|| QueryError::reference(format!("entité '{}' inconnue", name)))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node, QueryError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| QueryError::reference(format!("entité '{}' inconnue", name)))
    }

    /// Ajoute un attribut (arête vers un type de base)
    pub fn add_attribute(
        &mut self,
        source: &str,
        name: &str,
        ty: BaseType,
        constraints: Constraints,
    ) -> Result<&mut Self, QueryError> {
        self.node(source)?;
        let edge = Edge::Attribute {
            name: name.to_string(),
            source: source.to_string(),
            target: ty,
            constraints,
        };
        self.edges.insert(edge.qualified_name(), edge);
        Ok(self)
    }

    /// Ajoute une relation. L'inverse, s'il est nommé, doit être déclaré
    /// séparément dans l'entité cible.
    pub fn add_relation(
        &mut self,
        source: &str,
        name: &str,
        target: &str,
        cardinality: Cardinality,
        inverse: Option<&str>,
    ) -> Result<&mut Self, QueryError> {
        self.node(source)?;
        self.node(target)?;
        let edge = Edge::Relation {
            name: name.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            cardinality,
            inverse: inverse.map(str::to_string),
            required: false,
        };
        self.edges.insert(edge.qualified_name(), edge);
        Ok(self)
    }

    /// Marque une relation existante comme obligatoire (exactement une cible).
    pub fn require_relation(&mut self, source: &str, name: &str) -> Result<&mut Self, QueryError> {
        match self.edges.get_mut(&qualify(source, name)) {
            Some(Edge::Relation { required, .. }) => {
                *required = true;
                Ok(self)
            }
            _ => Err(QueryError::reference(format!("relation '{}.{}' inconnue", source, name))),
        }
    }

    /// Déclare l'attribut discriminant d'une racine de hiérarchie.
    pub fn set_discriminator(&mut self, entity: &str, attribute: &str) -> Result<&mut Self, QueryError> {
        self.node_mut(entity)?.discriminator = Some(attribute.to_string());
        Ok(self)
    }

    /// Déclare un sous-type stocké dans la table de `parent`.
    pub fn add_subtype(
        &mut self,
        name: &str,
        parent: &str,
        discriminator_value: Value,
    ) -> Result<&mut Self, QueryError> {
        let id_attribute = self.node(parent)?.id_attribute.clone();
        let mut node = Node::new(name);
        node.id_attribute = id_attribute;
        node.subtype_of = Some(Subtype { parent: parent.to_string(), discriminator_value });
        self.nodes.insert(name.to_string(), node);
        Ok(self)
    }

    /// Entité dont la table stocke réellement les lignes de `entity`
    /// (le parent pour un sous-type).
    pub fn storage_entity<'a>(&'a self, entity: &'a str) -> Result<&'a str, QueryError> {
        let node = self.node(entity)?;
        match &node.subtype_of {
            Some(sub) => self.storage_entity(&sub.parent),
            None => Ok(entity),
        }
    }

    /// Cherche une arête de `entity`, en remontant vers le parent pour un
    /// sous-type.
    pub fn edge(&self, entity: &str, name: &str) -> Result<&Edge, QueryError> {
        if let Some(edge) = self.edges.get(&qualify(entity, name)) {
            return Ok(edge);
        }
        match &self.node(entity)?.subtype_of {
            Some(sub) => self.edge(&sub.parent, name),
            None => Err(QueryError::reference(format!(
                "'{}' n'est ni un attribut ni une relation de {}",
                name, entity
            ))),
        }
    }

    /// Type de l'attribut identifiant d'une entité.
    pub fn id_type(&self, entity: &str) -> Result<BaseType, QueryError> {
        let id = &self.node(entity)?.id_attribute;
        match self.edge(entity, id)? {
            Edge::Attribute { target, .. } => Ok(target.clone()),
            Edge::Relation { .. } => {
                Err(QueryError::type_error(format!("l'identifiant de {} n'est pas un attribut", entity)))
            }
        }
    }

    /// Résout une suite de noms d'arêtes depuis `start`.
    ///
    /// Toutes les arêtes sauf la dernière doivent être des relations ; la
    /// dernière peut être un attribut (chemin vers une valeur) ou une
    /// relation (chemin vers une entité).
    pub fn resolve(&self, start: &str, edges: &[String]) -> Result<ResolvedPath, QueryError> {
        self.node(start)?;
        let mut current = start.to_string();
        let mut hops = Vec::new();

        for (i, edge_name) in edges.iter().enumerate() {
            match self.edge(&current, edge_name)? {
                Edge::Relation { name, target, cardinality, .. } => {
                    hops.push(Hop {
                        relation: name.clone(),
                        source: current.clone(),
                        target: target.clone(),
                        cardinality: *cardinality,
                    });
                    current = target.clone();
                }
                Edge::Attribute { name, target, .. } => {
                    if i + 1 != edges.len() {
                        return Err(QueryError::reference(format!(
                            "{}.{} est un attribut : impossible de continuer vers '{}'",
                            current,
                            name,
                            edges[i + 1]
                        )));
                    }
                    return Ok(ResolvedPath {
                        start: start.to_string(),
                        hops,
                        end_entity: current.clone(),
                        attribute: Some(AttributeRef {
                            entity: current,
                            name: name.clone(),
                            ty: target.clone(),
                        }),
                    });
                }
            }
        }

        Ok(ResolvedPath { start: start.to_string(), hops, end_entity: current, attribute: None })
    }

    /// Retourne toutes les relations du schéma
    pub fn relations(&self) -> Vec<&Edge> {
        self.edges.values().filter(|e| matches!(e, Edge::Relation { .. })).collect()
    }

    /// Retourne tous les attributs du schéma
    pub fn attributes(&self) -> Vec<&Edge> {
        self.edges.values().filter(|e| matches!(e, Edge::Attribute { .. })).collect()
    }

    /// Retourne les arêtes sortant d'un nœud donné (sans les hérités)
    pub fn edges_from(&self, node_name: &str) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.source() == node_name).collect()
    }

    /// Retourne les attributs d'un nœud donné (sans les hérités)
    pub fn attributes_of(&self, node_name: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| matches!(e, Edge::Attribute { source, .. } if source == node_name))
            .collect()
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "schema {} = literal {{", self.name)?;

        writeln!(f, "  entities")?;
        for node in self.nodes.values() {
            match &node.subtype_of {
                Some(sub) => writeln!(
                    f,
                    "    {} : {} [{}]",
                    node.name, sub.parent, sub.discriminator_value
                )?,
                None => writeln!(f, "    {}", node.name)?,
            }
        }

        let relations = self.relations();
        if !relations.is_empty() {
            writeln!(f, "  relations")?;
            for rel in relations {
                if let Edge::Relation { name, source, target, cardinality, .. } = rel {
                    writeln!(f, "    {} : {} -> {} ({})", name, source, target, cardinality)?;
                }
            }
        }

        let attrs = self.attributes();
        if !attrs.is_empty() {
            writeln!(f, "  attributes")?;
            for attr in attrs {
                if let Edge::Attribute { name, source, target, .. } = attr {
                    writeln!(f, "    {} : {} -> {}", name, source, target)?;
                }
            }
        }

        write!(f, "}}")
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Un petit schéma Car → Journey → Segment
    fn trips_schema() -> Schema {
        let mut s = Schema::new("Trips");
        s.add_node("Car").add_node("Journey").add_node("Segment");
        s.add_attribute("Car", "id", BaseType::Uuid, Constraints::default())
            .unwrap()
            .add_attribute("Car", "plate_number", BaseType::String, Constraints::default())
            .unwrap()
            .add_attribute("Journey", "id", BaseType::Uuid, Constraints::default())
            .unwrap()
            .add_attribute("Segment", "length_meters", BaseType::Integer, Constraints::default())
            .unwrap()
            .add_relation("Car", "journeys", "Journey", Cardinality::OneToMany, Some("car"))
            .unwrap()
            .add_relation("Journey", "car", "Car", Cardinality::ManyToOne, Some("journeys"))
            .unwrap()
            .add_relation("Journey", "segments", "Segment", Cardinality::OneToMany, None)
            .unwrap();
        s
    }

    fn edges(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_create_schema() {
        let s = trips_schema();
        assert_eq!(s.nodes.len(), 3);
        assert_eq!(s.relations().len(), 3);
        assert_eq!(s.attributes_of("Car").len(), 2);
    }

    #[test]
    fn test_resolve_attribute_path() {
        let s = trips_schema();
        let path = s.resolve("Car", &edges(&["journeys", "segments", "length_meters"])).unwrap();
        assert_eq!(path.hops.len(), 2);
        assert!(path.is_to_many());
        assert_eq!(path.end_entity, "Segment");
        assert_eq!(path.attribute.unwrap().ty, BaseType::Integer);
    }

    #[test]
    fn test_resolve_entity_path() {
        let s = trips_schema();
        let path = s.resolve("Journey", &edges(&["car"])).unwrap();
        assert_eq!(path.end_entity, "Car");
        assert!(path.attribute.is_none());
        assert!(!path.is_to_many());
    }

    #[test]
    fn test_unknown_edge_is_a_reference_error() {
        let s = trips_schema();
        let err = s.resolve("Car", &edges(&["wheels"])).unwrap_err();
        assert!(matches!(err, QueryError::Reference(_)));
    }

    #[test]
    fn test_cannot_walk_past_an_attribute() {
        let s = trips_schema();
        let err = s.resolve("Car", &edges(&["plate_number", "length"])).unwrap_err();
        assert!(matches!(err, QueryError::Reference(_)));
    }

    #[test]
    fn test_relation_to_unknown_entity() {
        let mut s = trips_schema();
        let err = s
            .add_relation("Car", "owner", "Person", Cardinality::ManyToOne, None)
            .unwrap_err();
        assert_eq!(err, QueryError::Reference("entité 'Person' inconnue".into()));
    }

    #[test]
    fn test_subtype_inherits_parent_edges() {
        let mut s = Schema::new("Files");
        s.add_node("File");
        s.add_attribute("File", "id", BaseType::Uuid, Constraints::default())
            .unwrap()
            .add_attribute("File", "kind", BaseType::Integer, Constraints::default())
            .unwrap()
            .set_discriminator("File", "kind")
            .unwrap()
            .add_subtype("CommentFile", "File", Value::Integer(1))
            .unwrap();

        assert_eq!(s.storage_entity("CommentFile").unwrap(), "File");
        assert!(s.edge("CommentFile", "kind").is_ok());
        assert_eq!(s.id_type("CommentFile").unwrap(), BaseType::Uuid);
    }

    #[test]
    fn test_path_display_and_parse() {
        let p = Path::parse("c.journeys.segments");
        assert_eq!(p.start, "c");
        assert_eq!(p.len(), 2);
        assert_eq!(format!("{}", p), "c.journeys.segments");
        assert!(Path::identity("c").is_identity());
        let longer = p.compose(&Path::new("Segment", vec!["length_meters"]));
        assert_eq!(longer.edges, vec!["journeys", "segments", "length_meters"]);
    }

    #[test]
    fn test_schema_display() {
        let s = trips_schema();
        let display = format!("{}", s);
        assert!(display.contains("schema Trips"));
        assert!(display.contains("journeys : Car -> Journey (1..n)"));
    }
}
