// =============================================================================
// FLEETQL — Évaluateur de requêtes objet en mémoire
// =============================================================================
//
// FleetQL évalue des requêtes de style ORM sur un graphe d'objets en
// mémoire : des voitures, leurs trajets, segments, équipements, plus une
// hiérarchie de fichiers. Chaque requête s'écrit de deux façons, avec le
// constructeur typé ou en texte, et les deux passent par le même
// évaluateur.
//
// Architecture :
//   core/     → schéma, graphe, requêtes, évaluation, projection
//   config    → paramètres lus dans l'environnement
//   error     → taxonomie des erreurs
//   exercises → les requêtes de référence, dans les deux styles
//
// =============================================================================

pub mod config;
pub mod core;
pub mod error;
pub mod exercises;
