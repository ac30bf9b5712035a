// =============================================================================
// GRAPH — Le graphe d'objets en mémoire (les données concrètes)
// =============================================================================
//
// Si le Schema est le « moule », l'ObjectGraph est son contenu :
//   - Pour chaque entité stockée, une TABLE de lignes (EntityTable)
//   - Chaque ligne a ses valeurs d'attributs
//   - Chaque ligne a ses LIENS : relation → liste de lignes cibles
//
// Les liens sont posés des deux côtés : lier Car[1].journeys → Journey[3]
// pose aussi Journey[3].car → Car[1] quand la relation déclare un inverse.
// La navigation est donc toujours un parcours EXPLICITE du graphe, sans
// chargement paresseux.
//
// Les sous-types (CommentFile, ArticleFile) n'ont pas de table propre :
// leurs lignes vivent dans la table du parent avec le discriminant posé.
//
// Les identifiants de ligne sont attribués dans l'ordre d'insertion et les
// tables sont des BTreeMap : tout parcours est déterministe.
//
// =============================================================================

use std::collections::BTreeMap;

use super::schema::{Edge, Hop, Schema};
use super::typeside::Value;
use crate::error::QueryError;

/// Identifiant interne d'une ligne, unique au sein de sa table.
pub type RowId = u64;

/// Les lignes d'une entité.
#[derive(Debug, Clone)]
pub struct EntityTable {
    /// Compteur pour générer les RowId auto-incrémentés
    next_id: RowId,
    /// Les valeurs d'attributs : row_id → (attr_name → Value)
    pub attribute_values: BTreeMap<RowId, BTreeMap<String, Value>>,
    /// Les liens : row_id → (relation → lignes cibles, dans l'ordre de liaison)
    pub links: BTreeMap<RowId, BTreeMap<String, Vec<RowId>>>,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    pub fn new() -> Self {
        EntityTable { next_id: 1, attribute_values: BTreeMap::new(), links: BTreeMap::new() }
    }

    /// Insère une nouvelle ligne. Retourne le RowId attribué.
    pub fn insert(&mut self, attrs: BTreeMap<String, Value>) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        self.attribute_values.insert(id, attrs);
        self.links.insert(id, BTreeMap::new());
        id
    }

    /// Nombre de lignes dans cette table
    pub fn len(&self) -> usize {
        self.attribute_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attribute_values.is_empty()
    }

    pub fn contains(&self, row_id: RowId) -> bool {
        self.attribute_values.contains_key(&row_id)
    }

    /// Tous les RowId, dans l'ordre d'insertion
    pub fn row_ids(&self) -> Vec<RowId> {
        self.attribute_values.keys().copied().collect()
    }

    /// Lit la valeur d'un attribut pour une ligne donnée
    pub fn get_attr(&self, row_id: RowId, attr_name: &str) -> Option<&Value> {
        self.attribute_values.get(&row_id).and_then(|attrs| attrs.get(attr_name))
    }

    /// Les cibles d'une relation pour une ligne donnée
    pub fn related(&self, row_id: RowId, relation: &str) -> &[RowId] {
        self.links
            .get(&row_id)
            .and_then(|links| links.get(relation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn add_link(&mut self, row_id: RowId, relation: &str, target: RowId) {
        let targets = self.links.entry(row_id).or_default().entry(relation.to_string()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
}

/// Le graphe complet : une table par entité stockée.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    pub name: String,
    pub schema_name: String,
    /// Tables par entité stockée : entity_name → EntityTable
    pub tables: BTreeMap<String, EntityTable>,
}

impl ObjectGraph {
    /// Crée un graphe vide pour un schéma donné
    pub fn new(name: &str, schema: &Schema) -> Self {
        let tables = schema
            .nodes
            .values()
            .filter(|n| n.subtype_of.is_none())
            .map(|n| (n.name.clone(), EntityTable::new()))
            .collect();
        ObjectGraph { name: name.to_string(), schema_name: schema.name.clone(), tables }
    }

    /// La table qui stocke les lignes de `entity` (celle du parent pour un
    /// sous-type).
    pub fn table(&self, schema: &Schema, entity: &str) -> Result<&EntityTable, QueryError> {
        let storage = schema.storage_entity(entity)?;
        self.tables
            .get(storage)
            .ok_or_else(|| QueryError::reference(format!("aucune table pour '{}'", storage)))
    }

    fn table_mut(&mut self, schema: &Schema, entity: &str) -> Result<&mut EntityTable, QueryError> {
        let storage = schema.storage_entity(entity)?;
        self.tables
            .get_mut(storage)
            .ok_or_else(|| QueryError::reference(format!("aucune table pour '{}'", storage)))
    }

    /// Insère une ligne après avoir vérifié chaque attribut contre le schéma.
    ///
    /// Pour un sous-type, le discriminant est posé automatiquement.
    pub fn insert(
        &mut self,
        schema: &Schema,
        entity: &str,
        mut attrs: BTreeMap<String, Value>,
    ) -> Result<RowId, QueryError> {
        for (name, value) in &attrs {
            match schema.edge(entity, name)? {
                Edge::Attribute { target, .. } => {
                    if let Some(ty) = value.get_type() {
                        if &ty != target {
                            return Err(QueryError::type_error(format!(
                                "{}.{} attend {}, reçu {}",
                                entity, name, target, value
                            )));
                        }
                    }
                }
                Edge::Relation { .. } => {
                    return Err(QueryError::type_error(format!(
                        "{}.{} est une relation : utiliser link()",
                        entity, name
                    )))
                }
            }
        }

        if let Some(sub) = &schema.node(entity)?.subtype_of {
            let parent = schema.node(schema.storage_entity(entity)?)?;
            if let Some(discriminator) = &parent.discriminator {
                match attrs.get(discriminator).cloned() {
                    Some(v) if v != sub.discriminator_value => {
                        return Err(QueryError::type_error(format!(
                            "discriminant {} incompatible avec {}",
                            v, entity
                        )))
                    }
                    _ => {
                        attrs.insert(discriminator.clone(), sub.discriminator_value.clone());
                    }
                }
            }
        }

        Ok(self.table_mut(schema, entity)?.insert(attrs))
    }

    /// Lie `entity[row] --relation--> target_row`, et l'inverse s'il existe.
    pub fn link(
        &mut self,
        schema: &Schema,
        entity: &str,
        row: RowId,
        relation: &str,
        target_row: RowId,
    ) -> Result<(), QueryError> {
        let (target, inverse) = match schema.edge(entity, relation)? {
            Edge::Relation { target, inverse, .. } => (target.clone(), inverse.clone()),
            Edge::Attribute { .. } => {
                return Err(QueryError::type_error(format!(
                    "{}.{} est un attribut, pas une relation",
                    entity, relation
                )))
            }
        };

        if !self.table(schema, entity)?.contains(row) {
            return Err(QueryError::reference(format!("{}[{}] n'existe pas", entity, row)));
        }
        if !self.table(schema, &target)?.contains(target_row) {
            return Err(QueryError::reference(format!("{}[{}] n'existe pas", target, target_row)));
        }

        self.table_mut(schema, entity)?.add_link(row, relation, target_row);
        if let Some(inverse) = inverse {
            self.table_mut(schema, &target)?.add_link(target_row, &inverse, row);
        }
        Ok(())
    }

    /// Les lignes d'une entité ; pour un sous-type, seules celles qui portent
    /// son discriminant.
    pub fn rows_of(&self, schema: &Schema, entity: &str) -> Result<Vec<RowId>, QueryError> {
        let table = self.table(schema, entity)?;
        let Some(sub) = &schema.node(entity)?.subtype_of else {
            return Ok(table.row_ids());
        };
        let parent = schema.node(schema.storage_entity(entity)?)?;
        let Some(discriminator) = &parent.discriminator else {
            return Ok(table.row_ids());
        };
        Ok(table
            .row_ids()
            .into_iter()
            .filter(|&r| table.get_attr(r, discriminator) == Some(&sub.discriminator_value))
            .collect())
    }

    /// Lit un attribut ; NULL si absent.
    pub fn attr(&self, schema: &Schema, entity: &str, row: RowId, name: &str) -> Result<Value, QueryError> {
        Ok(self.table(schema, entity)?.get_attr(row, name).cloned().unwrap_or(Value::Null))
    }

    /// Valeur de l'identifiant d'une ligne.
    pub fn id_of(&self, schema: &Schema, entity: &str, row: RowId) -> Result<Value, QueryError> {
        let id = &schema.node(entity)?.id_attribute;
        self.attr(schema, entity, row, id)
    }

    /// Les cibles directes d'une relation.
    pub fn related(&self, schema: &Schema, entity: &str, row: RowId, relation: &str) -> Result<&[RowId], QueryError> {
        Ok(self.table(schema, entity)?.related(row, relation))
    }

    /// Suit une suite de sauts depuis une ligne et retourne toutes les
    /// lignes atteintes (aplaties, dans l'ordre des liens).
    pub fn traverse(&self, schema: &Schema, start_row: RowId, hops: &[Hop]) -> Result<Vec<RowId>, QueryError> {
        let mut frontier = vec![start_row];
        for hop in hops {
            let mut next = Vec::new();
            for row in frontier {
                next.extend_from_slice(self.related(schema, &hop.source, row, &hop.relation)?);
            }
            frontier = next;
        }
        Ok(frontier)
    }

    /// Nombre total de lignes dans toutes les tables
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(EntityTable::len).sum()
    }

    /// Affiche le graphe de manière lisible (pour le debug)
    pub fn display(&self) -> String {
        let mut out = format!("graph {} : {} = {{\n", self.name, self.schema_name);

        for (entity_name, table) in &self.tables {
            if table.is_empty() {
                continue;
            }
            out.push_str(&format!("  {} ({} lignes):\n", entity_name, table.len()));

            for row_id in table.row_ids() {
                out.push_str(&format!("    [{}]", row_id));
                if let Some(attrs) = table.attribute_values.get(&row_id) {
                    for (attr_name, value) in attrs {
                        out.push_str(&format!(" {}: {},", attr_name, value));
                    }
                }
                if let Some(links) = table.links.get(&row_id) {
                    for (relation, targets) in links {
                        out.push_str(&format!(" {} -> {:?},", relation, targets));
                    }
                }
                out.push('\n');
            }
        }

        out.push_str("}\n");
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::FileKind;
    use crate::core::mapping::fleet_schema;

    fn attrs(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_link_sets_inverse() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let car = graph.insert(&schema, "Car", attrs(vec![("plate_number", "AB 1".into())])).unwrap();
        let journey = graph.insert(&schema, "Journey", BTreeMap::new()).unwrap();

        graph.link(&schema, "Car", car, "journeys", journey).unwrap();

        assert_eq!(graph.related(&schema, "Car", car, "journeys").unwrap(), &[journey]);
        assert_eq!(graph.related(&schema, "Journey", journey, "car").unwrap(), &[car]);
    }

    #[test]
    fn test_insert_rejects_wrong_type() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let err = graph
            .insert(&schema, "Segment", attrs(vec![("length_meters", "long".into())]))
            .unwrap_err();
        assert!(matches!(err, QueryError::Type(_)));
    }

    #[test]
    fn test_insert_rejects_unknown_attribute() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let err = graph.insert(&schema, "Car", attrs(vec![("colour", "red".into())])).unwrap_err();
        assert!(matches!(err, QueryError::Reference(_)));
    }

    #[test]
    fn test_subtype_rows_are_filtered_by_discriminator() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        graph.insert(&schema, "CommentFile", attrs(vec![("name", "a.png".into())])).unwrap();
        graph.insert(&schema, "ArticleFile", attrs(vec![("name", "b.png".into())])).unwrap();
        graph.insert(&schema, "CommentFile", attrs(vec![("name", "c.png".into())])).unwrap();

        assert_eq!(graph.rows_of(&schema, "File").unwrap().len(), 3);
        assert_eq!(graph.rows_of(&schema, "CommentFile").unwrap(), vec![1, 3]);
        assert_eq!(
            graph.attr(&schema, "ArticleFile", 2, "kind").unwrap(),
            Value::from(FileKind::Article)
        );
    }

    #[test]
    fn test_conflicting_discriminator_is_rejected() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let err = graph
            .insert(&schema, "CommentFile", attrs(vec![("kind", FileKind::Article.into())]))
            .unwrap_err();
        assert!(matches!(err, QueryError::Type(_)));
    }

    #[test]
    fn test_traverse_flattens_collections() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let car = graph.insert(&schema, "Car", BTreeMap::new()).unwrap();
        for _ in 0..2 {
            let j = graph.insert(&schema, "Journey", BTreeMap::new()).unwrap();
            graph.link(&schema, "Car", car, "journeys", j).unwrap();
            for _ in 0..3 {
                let s = graph.insert(&schema, "Segment", BTreeMap::new()).unwrap();
                graph.link(&schema, "Journey", j, "segments", s).unwrap();
            }
        }

        let path = schema
            .resolve("Car", &["journeys".to_string(), "segments".to_string()])
            .unwrap();
        let segments = graph.traverse(&schema, car, &path.hops).unwrap();
        assert_eq!(segments, vec![1, 2, 3, 4, 5, 6]);
        assert!(graph.display().contains("Segment (6 lignes)"));
    }

    #[test]
    fn test_link_to_missing_row() {
        let schema = fleet_schema().unwrap();
        let mut graph = ObjectGraph::new("g", &schema);
        let car = graph.insert(&schema, "Car", BTreeMap::new()).unwrap();
        let err = graph.link(&schema, "Car", car, "journeys", 42).unwrap_err();
        assert!(matches!(err, QueryError::Reference(_)));
    }
}
