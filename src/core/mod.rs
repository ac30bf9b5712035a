// =============================================================================
// CORE — Module principal du moteur de requêtes
// =============================================================================
//
// Ce module regroupe toute la logique pure :
// pas de base de données, pas de réseau, uniquement un graphe d'objets en
// mémoire et des requêtes évaluées dessus.
//
// Architecture :
//   typeside  → les types primitifs et les énumérations (String, Uuid, CarType...)
//   schema    → les entités, attributs et relations (= le "moule")
//   mapping   → les déclarations fluides qui produisent le schéma
//   domain    → les agrégats typés (Car, Journey, Segment, Feature, File)
//   graph     → les lignes et les liens (= les données concrètes)
//   seed      → les données de référence des exercices
//   validate  → la vérification de cohérence
//   query     → le constructeur typé de requêtes
//   hql       → le langage texte, compilé vers le même arbre
//   eval      → l'évaluateur in-memory
//   project   → les résultats et la reconstruction des agrégats
//
// =============================================================================

pub mod typeside;
pub mod schema;
pub mod mapping;
pub mod domain;
pub mod graph;
pub mod seed;
pub mod validate;
pub mod query;
pub mod hql;
pub mod eval;
pub mod project;
