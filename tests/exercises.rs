// =============================================================================
// Les exercices de bout en bout, dans les deux styles de requête
// =============================================================================

use rstest::{fixture, rstest};
use rust_decimal::Decimal;

use fleetql::config::EngineConfig;
use fleetql::core::domain::{fleet_typeside, CarType, File, FileKind, UnitOfMeasure};
use fleetql::core::eval::eval_query;
use fleetql::core::graph::ObjectGraph;
use fleetql::core::hql;
use fleetql::core::mapping::fleet_schema;
use fleetql::core::project::ResultSet;
use fleetql::core::query::{field, kilometers, lit, param, Query};
use fleetql::core::schema::Schema;
use fleetql::core::seed::{midnight, SeedLoader, BMW_PLATE, HONDA_PLATE};
use fleetql::core::typeside::{Typeside, Value};
use fleetql::core::validate::{validate_graph, validate_schema};
use fleetql::error::{QueryError, SeedError};
use fleetql::exercises::{exercises, plates, run, run_all};

struct World {
    schema: Schema,
    graph: ObjectGraph,
    typeside: Typeside,
    config: EngineConfig,
}

impl World {
    fn eval(&self, query: &Query) -> Result<ResultSet, QueryError> {
        eval_query(query, &self.graph, &self.schema, &self.config).map(|r| r.result)
    }

    fn hql(&self, text: &str) -> Result<ResultSet, QueryError> {
        self.eval(&hql::parse(text, &self.typeside)?)
    }

    fn plates(&self, result: &ResultSet) -> Vec<String> {
        plates(result, &self.graph, &self.schema).unwrap()
    }
}

#[fixture]
fn world() -> World {
    let schema = fleet_schema().unwrap();
    let graph = SeedLoader::new().seed(&schema).unwrap();
    World { schema, graph, typeside: fleet_typeside(), config: EngineConfig::default() }
}

#[rstest]
#[case::honda_by_type(0)]
#[case::mileage_below_250_km(1)]
#[case::recent_journey_long_segment(2)]
#[case::seat_belts_long_segment(3)]
#[case::more_than_one_journey(4)]
#[case::long_distance_outside_city(5)]
fn test_exercise_in_both_styles(world: World, #[case] index: usize) {
    let exercise = &exercises()[index];
    let outcome = run(exercise, &world.graph, &world.schema, &world.typeside, &world.config).unwrap();
    assert_eq!(outcome.builder, outcome.expected, "{}", exercise.name);
    assert_eq!(outcome.hql, outcome.expected, "{} (texte)", exercise.name);
    assert!(outcome.passed());
}

#[rstest]
fn test_full_suite_passes(world: World) {
    let outcomes = run_all(&world.graph, &world.schema, &world.typeside, &world.config).unwrap();
    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|o| o.passed()), "{:?}", outcomes);
}

#[rstest]
fn test_parsed_matches_builder(world: World) {
    for exercise in exercises() {
        assert_eq!(exercise.parsed(&world.typeside).unwrap(), exercise.builder, "{}", exercise.name);
    }
}

#[rstest]
fn test_honda_is_the_unique_result(world: World) {
    let result = world.hql("from Car c where c.type = CarType.Honda").unwrap();
    let row = result.unique_result().unwrap().unwrap();
    let cars = result.load::<fleetql::core::domain::Car>(&world.graph, &world.schema).unwrap();
    assert_eq!(row.root, Some(1));
    assert_eq!(cars[0].plate_number, HONDA_PLATE);
    assert_eq!(cars[0].car_type, CarType::Honda);
}

#[rstest]
fn test_unique_result_rejects_two_rows(world: World) {
    let result = world.eval(&Query::from("Car", "c")).unwrap();
    assert!(matches!(result.unique_result(), Err(QueryError::Cardinality(_))));
}

#[rstest]
fn test_mileage_converted_to_kilometers(world: World) {
    let result = world
        .eval(&Query::from("Car", "c").select(field("c.plate_number")).select_as(kilometers("c.mileage"), "km"))
        .unwrap();
    assert_eq!(
        result.column("km").unwrap(),
        vec![Value::Decimal(Decimal::from(200)), Value::Decimal(Decimal::from(320))]
    );
    let bmw = world
        .eval(&Query::from("Car", "c").filter(field("c.mileage.unit_of_measure").eq(lit(UnitOfMeasure::Miles))))
        .unwrap();
    assert_eq!(world.plates(&bmw), vec![BMW_PLATE]);
}

#[rstest]
fn test_both_cars_have_a_recent_long_segment(world: World) {
    let query = Query::from("Car", "c")
        .join_with("c.journeys", "j", field("j.started_at").gt(param("since")))
        .join_with("j.segments", "s", field("s.length_meters").gt(10_000))
        .distinct_root_entity()
        .bind("since", midnight(2021, 12, 11));
    assert_eq!(world.plates(&world.eval(&query).unwrap()), vec![HONDA_PLATE, BMW_PLATE]);

    let exists = world
        .hql(
            "from Car c where exists (c.journeys j where j.started_at > date '2021-12-11' \
             and exists (j.segments s where s.length_meters > 10000))",
        )
        .unwrap();
    assert_eq!(world.plates(&exists), vec![HONDA_PLATE, BMW_PLATE]);
}

#[rstest]
fn test_joined_root_without_distinct_is_a_cardinality_error(world: World) {
    let err = world.hql("from Car c join c.journeys j").unwrap_err();
    assert!(matches!(err, QueryError::Cardinality(_)));
}

#[rstest]
fn test_unbound_parameter_is_a_reference_error(world: World) {
    let err = world.hql("from Car c join c.journeys j with j.started_at > :since").unwrap_err();
    assert!(matches!(err, QueryError::Reference(_)));
}

#[rstest]
fn test_queries_are_idempotent(world: World) {
    for exercise in exercises() {
        let first = world.eval(&exercise.builder).unwrap();
        let second = world.eval(&exercise.builder).unwrap();
        assert_eq!(first, second, "{}", exercise.name);
    }
    let before = world.graph.display();
    run_all(&world.graph, &world.schema, &world.typeside, &world.config).unwrap();
    assert_eq!(world.graph.display(), before);
}

#[rstest]
fn test_car_selected_without_references(world: World) {
    let result = world
        .hql(
            "select new Car(c.id, c.plate_number, c.type, c.fuel_intake_city, c.fuel_intake_route) \
             from Car c where c.plate_number = 'BI 570CN'",
        )
        .unwrap();
    let cars = result.partial::<fleetql::core::domain::Car>().unwrap();
    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].plate_number, HONDA_PLATE);
    assert_eq!(cars[0].fuel_intake_city, Decimal::from(10));
    assert!(cars[0].mileage.is_none());
    assert!(cars[0].journeys.is_empty());
    assert!(cars[0].features.is_empty());
}

#[rstest]
fn test_full_aggregate_is_reloaded(world: World) {
    let result = world.hql("from Car c where c.plate_number = 'WWL 123XX'").unwrap();
    let cars = result.load::<fleetql::core::domain::Car>(&world.graph, &world.schema).unwrap();
    let bmw = &cars[0];
    assert_eq!(bmw.mileage.as_ref().map(|m| m.unit), Some(UnitOfMeasure::Miles));
    assert_eq!(bmw.features.len(), 3);
    assert_eq!(bmw.journeys.len(), 1);
    assert_eq!(bmw.journeys[0].segments[0].length_meters, 156_000);
    assert!(bmw.metadata.is_empty());
}

#[rstest]
#[case("from CommentFile f", 3, FileKind::Comment)]
#[case("from ArticleFile f", 2, FileKind::Article)]
fn test_file_subtypes(world: World, #[case] text: &str, #[case] expected: usize, #[case] kind: FileKind) {
    let result = world.hql(text).unwrap();
    let files = result.load::<File>(&world.graph, &world.schema).unwrap();
    assert_eq!(files.len(), expected);
    assert!(files.iter().all(|f| f.kind() == kind));
}

#[rstest]
fn test_comment_files_in_folder(world: World) {
    let result = world
        .hql("select f.name from CommentFile f where f.folder_id = 1 order by f.name desc")
        .unwrap();
    assert_eq!(result.strings("name"), vec!["photo2.png", "photo1.png"]);
}

#[rstest]
fn test_seeded_world_is_valid(world: World) {
    assert!(validate_schema(&world.schema).is_ok());
    assert!(validate_graph(&world.graph, &world.schema).is_ok());
}

#[test]
fn test_seed_requires_reset() {
    let schema = fleet_schema().unwrap();
    let mut loader = SeedLoader::new();
    let first = loader.seed(&schema).unwrap();
    assert!(matches!(loader.seed(&schema), Err(SeedError::AlreadySeeded)));
    loader.reset();
    let second = loader.seed(&schema).unwrap();
    assert_eq!(first.display(), second.display());
}
