// =============================================================================
// FLEETQL — Point d'entrée : les exercices sur le graphe de référence
// =============================================================================
//
// Sans argument, ce main.rs déroule la suite complète :
//   1. Construire le schéma à partir des mappings et le valider
//   2. Charger les données de référence et valider le graphe
//   3. Poser chaque exercice dans les deux styles (constructeur et texte)
//
// Avec une requête texte en argument, il l'exécute seule :
//
//   fleetql "select distinct c from Car c join c.journeys j with j.started_at > :since" \
//           --param since=2021-12-11 --json
//
// =============================================================================

use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleetql::config::EngineConfig;
use fleetql::core::domain::fleet_typeside;
use fleetql::core::eval::eval_query;
use fleetql::core::graph::ObjectGraph;
use fleetql::core::hql;
use fleetql::core::mapping::fleet_schema;
use fleetql::core::schema::Schema;
use fleetql::core::seed::SeedLoader;
use fleetql::core::typeside::Typeside;
use fleetql::core::validate::{self, ValidationError};
use fleetql::error::{ConfigError, QueryError, SeedError};
use fleetql::exercises;

#[derive(Debug, Parser)]
#[command(
    name = "fleetql",
    about = "Requêtes objet sur le graphe de référence des voitures",
    version
)]
struct Cli {
    /// Requête texte à exécuter (sans requête : la suite d'exercices).
    query: Option<String>,
    /// Paramètre nommé `nom=valeur`, répétable.
    #[arg(short, long = "param", value_name = "NOM=VALEUR")]
    params: Vec<String>,
    /// Affiche les lignes en JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{0} erreur(s) de validation")]
    Invalid(usize),
    #[error("paramètre {0:?} : attendu nom=valeur")]
    Param(String),
    #[error("sérialisation JSON : {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} exercice(s) en échec")]
    Exercises(usize),
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer())
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info");
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn report(what: &str, result: Result<(), Vec<ValidationError>>) -> Result<(), CliError> {
    match result {
        Ok(()) => {
            println!("✓ {} valide", what);
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                println!("✗ {}", e);
            }
            Err(CliError::Invalid(errors.len()))
        }
    }
}

fn run(cli: Cli, config: &EngineConfig) -> Result<(), CliError> {
    let typeside = fleet_typeside();
    let schema = fleet_schema()?;
    let graph = SeedLoader::new().seed(&schema)?;

    match cli.query {
        Some(text) => run_query(&text, &cli.params, cli.json, &graph, &schema, &typeside, config),
        None => run_exercises(&graph, &schema, &typeside, config),
    }
}

fn run_query(
    text: &str,
    params: &[String],
    json: bool,
    graph: &ObjectGraph,
    schema: &Schema,
    typeside: &Typeside,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let mut query = hql::parse(text, typeside)?;
    for raw in params {
        let (name, value) = raw.split_once('=').ok_or_else(|| CliError::Param(raw.clone()))?;
        query = query.bind(name.trim(), hql::parse_value(value, typeside));
    }

    let result = eval_query(&query, graph, schema, config)?;
    info!(rows = result.rows_returned, us = result.eval_time_us, "requête exécutée");
    if json {
        println!("{}", serde_json::to_string_pretty(&result.result.records())?);
    } else {
        println!("{}", result);
    }
    Ok(())
}

fn run_exercises(
    graph: &ObjectGraph,
    schema: &Schema,
    typeside: &Typeside,
    config: &EngineConfig,
) -> Result<(), CliError> {
    println!("╔══════════════════════════════════════════════════╗");
    println!("║      FLEETQL — Requêtes objet en mémoire         ║");
    println!("╚══════════════════════════════════════════════════╝\n");

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 1 : Le schéma
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 1 : Schéma ═══\n");
    println!("{}\n", schema);
    report("Schéma", validate::validate_schema(schema))?;

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 2 : Les données de référence
    // ═══════════════════════════════════════════════════════════
    println!("\n═══ ÉTAPE 2 : Données de référence ═══\n");
    println!("{} lignes chargées", graph.total_rows());
    report("Graphe", validate::validate_graph(graph, schema))?;

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 3 : Les exercices, dans les deux styles
    // ═══════════════════════════════════════════════════════════
    println!("\n═══ ÉTAPE 3 : Exercices ═══\n");
    let outcomes = exercises::run_all(graph, schema, typeside, config)?;
    for outcome in &outcomes {
        println!("{}", outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    if failed > 0 {
        return Err(CliError::Exercises(failed));
    }
    println!("\n✓ {} exercices réussis", outcomes.len());
    Ok(())
}
