// =============================================================================
// ERROR — Taxonomie des erreurs du moteur
// =============================================================================
//
// Trois familles d'erreurs de requête, toutes remontées à l'appelant :
//   Reference   → chemin, alias, entité ou paramètre inconnu
//   Type        → comparaison entre types incompatibles, agrégat mal placé
//   Cardinality → racine multipliée par une jointure sans dédoublonnage
// plus les erreurs de syntaxe du langage texte.
//
// =============================================================================

use thiserror::Error;

/// Erreur levée pendant la résolution, la vérification ou l'évaluation
/// d'une requête.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Chemin, alias, entité ou paramètre introuvable.
    #[error("référence inconnue : {0}")]
    Reference(String),
    /// Comparaison ou opération entre types incompatibles.
    #[error("erreur de type : {0}")]
    Type(String),
    /// Une ligne par entité racine attendue, plusieurs obtenues.
    #[error("cardinalité violée : {0}")]
    Cardinality(String),
    /// Texte de requête mal formé.
    #[error("erreur de syntaxe à l'octet {offset} : {message}")]
    Parse { offset: usize, message: String },
}

impl QueryError {
    pub(crate) fn reference(message: impl Into<String>) -> Self {
        QueryError::Reference(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        QueryError::Type(message.into())
    }

    pub(crate) fn cardinality(message: impl Into<String>) -> Self {
        QueryError::Cardinality(message.into())
    }
}

/// Erreur du chargeur de données de référence.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Le chargeur a déjà peuplé un graphe depuis le dernier `reset()`.
    #[error("le graphe est déjà peuplé ; appeler reset() avant de recommencer")]
    AlreadySeeded,
    /// Une insertion ou une liaison a échoué.
    #[error("échec du chargement : {0}")]
    Query(#[from] QueryError),
}

/// Erreur de lecture de la configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable d'environnement présente mais illisible.
    #[error("variable {name} invalide : {value:?}")]
    InvalidVar { name: &'static str, value: String },
}
