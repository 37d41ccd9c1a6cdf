mod common;

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use common::{alice, bob, carol, dave, executor, init_tracing, registry};
use elif_eager::{
    EagerError, EagerLoadConfig, EagerLoader, MemoryExecutor, RelationMapping, RelationRegistry,
    THROUGH_OWNER_KEY,
};
use serde_json::{json, Value as JsonValue};

fn loader(executor: MemoryExecutor) -> EagerLoader<Arc<MemoryExecutor>> {
    init_tracing();
    EagerLoader::new(registry(), Arc::new(executor))
}

fn loader_with(executor: MemoryExecutor, config: EagerLoadConfig) -> EagerLoader<Arc<MemoryExecutor>> {
    init_tracing();
    EagerLoader::with_config(registry(), Arc::new(executor), config).unwrap()
}

fn contains_key_anywhere(value: &JsonValue, key: &str) -> bool {
    match value {
        JsonValue::Object(map) => {
            map.contains_key(key) || map.values().any(|v| contains_key_anywhere(v, key))
        }
        JsonValue::Array(items) => items.iter().any(|v| contains_key_anywhere(v, key)),
        _ => false,
    }
}

#[tokio::test]
async fn test_one_to_many_attaches_and_defaults_to_empty() {
    init_tracing();
    let registry = RelationRegistry::new()
        .with_relation(
            "Person",
            "pets",
            RelationMapping::one_to_many("Animal", "animals", "id", "ownerId"),
        )
        .unwrap();
    let executor =
        MemoryExecutor::new().with_table("animals", vec![json!({"id": 10, "ownerId": 1})]);
    let loader = EagerLoader::new(Arc::new(registry), executor);

    let rows = loader
        .load_related(vec![json!({"id": 1}), json!({"id": 2})], "Person", "pets", None)
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![
            json!({"id": 1, "pets": [{"id": 10, "ownerId": 1}]}),
            json!({"id": 2, "pets": []}),
        ]
    );
}

#[tokio::test]
async fn test_nested_siblings_run_after_parent() {
    let loader = loader_with(
        executor(),
        EagerLoadConfig::default().with_parallel_siblings(false),
    );

    let plan = loader
        .plan("Person", "children.[pets, movies]", None)
        .unwrap();
    assert_eq!(plan.paths(), vec!["children", "children.pets", "children.movies"]);

    let rows = loader
        .load_related(vec![alice()], "Person", "children.[pets, movies]", None)
        .await
        .unwrap();

    let queries = loader.executor().queries().await;
    let relations: Vec<&str> = queries.iter().map(|q| q.query.relation.as_str()).collect();
    assert_eq!(relations, vec!["children", "pets", "movies"]);
    assert_eq!(queries[1].query.keys, vec![json!(2), json!(3)]);
    assert_eq!(queries[2].query.keys, vec![json!(2), json!(3)]);

    let children = rows[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["name"], "Bob");
    assert_eq!(children[0]["pets"], json!([{"id": 10, "name": "Rex", "owner_id": 2}]));
    assert_eq!(children[0]["movies"], json!([{"id": 100, "title": "Alien"}]));
    assert_eq!(children[1]["name"], "Carol");
    assert_eq!(
        children[1]["movies"],
        json!([{"id": 100, "title": "Alien"}, {"id": 101, "title": "Heat"}])
    );
    assert!(rows[0].get("pets").is_none());
}

#[tokio::test]
async fn test_recursion_stops_on_empty_level() {
    let loader = loader(executor());

    let rows = loader
        .load_related(vec![bob()], "Person", "children.^", None)
        .await
        .unwrap();

    assert_eq!(loader.executor().query_count().await, 2);
    assert_eq!(
        rows,
        vec![json!({
            "id": 2,
            "name": "Bob",
            "parent_id": 1,
            "children": [{"id": 4, "name": "Dave", "parent_id": 2, "children": []}]
        })]
    );
}

#[tokio::test]
async fn test_bounded_recursion_stops_at_limit() {
    let loader = loader(executor());

    let rows = loader
        .load_related(vec![dave()], "Person", "parent.^2", None)
        .await
        .unwrap();

    assert_eq!(loader.executor().query_count().await, 2);
    let parent = &rows[0]["parent"];
    assert_eq!(parent["name"], "Bob");
    assert_eq!(parent["parent"]["name"], "Alice");
    assert!(parent["parent"].get("parent").is_none());
}

#[tokio::test]
async fn test_unbounded_recursion_guard() {
    let loader = loader_with(
        executor(),
        EagerLoadConfig::default().with_max_recursion_depth(2),
    );

    let err = loader
        .load_related(vec![alice()], "Person", "children.^", None)
        .await
        .unwrap_err();

    match err {
        EagerError::ExpressionTooDeep { path, max_depth } => {
            assert_eq!(path, vec!["children", "children", "children"]);
            assert_eq!(max_depth, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_disallowed_expression_issues_no_queries() {
    let loader = loader(executor());

    let err = loader
        .load_related(
            vec![alice()],
            "Person",
            "children.movies",
            Some("children.pets"),
        )
        .await
        .unwrap_err();

    match err {
        EagerError::DisallowedExpression { path } => {
            assert_eq!(path, vec!["children", "movies"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(loader.executor().query_count().await, 0);
}

#[tokio::test]
async fn test_allowed_expression_covers_request() {
    let loader = loader(executor());

    let rows = loader
        .load_related(
            vec![alice()],
            "Person",
            "children.pets",
            Some("[children.[pets, movies], parent]"),
        )
        .await
        .unwrap();

    assert_eq!(rows[0]["children"][1]["pets"][0]["name"], "Tom");
}

#[tokio::test]
async fn test_parse_error_reports_unterminated_bracket() {
    let loader = loader(executor());

    let err = loader
        .load_related(vec![alice()], "Person", "a.[b,", None)
        .await
        .unwrap_err();

    assert!(matches!(err, EagerError::Parse { position: 2, .. }));
    assert!(err.is_pre_execution());
    assert_eq!(loader.executor().query_count().await, 0);
}

#[tokio::test]
async fn test_unknown_relation_issues_no_queries() {
    let loader = loader(executor());

    let err = loader
        .load_related(vec![alice()], "Person", "children.cars", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EagerError::UnknownRelation { ref model, ref relation } if model == "Person" && relation == "cars"
    ));
    assert_eq!(loader.executor().query_count().await, 0);
}

#[tokio::test]
async fn test_empty_owner_set_issues_no_query() {
    let loader = loader(executor());

    let result = loader
        .request("Person")
        .with("pets.owner")
        .load(vec![json!({"id": 99})])
        .await
        .unwrap();

    assert_eq!(result.rows, vec![json!({"id": 99, "pets": []})]);
    assert_eq!(result.stats.query_count, 1);
    assert_eq!(result.stats.skipped_steps, 1);
    assert_eq!(loader.executor().queried_relations().await, vec!["pets"]);

    let result = loader
        .request("Person")
        .with("pets")
        .load(vec![json!({"id": null})])
        .await
        .unwrap();
    assert_eq!(result.rows, vec![json!({"id": null, "pets": []})]);
    assert_eq!(result.stats.query_count, 0);
}

#[tokio::test]
async fn test_many_to_many_both_directions() {
    let loader = loader(executor());

    let rows = loader
        .load_related(vec![carol()], "Person", "movies.actors", None)
        .await
        .unwrap();

    let movies = rows[0]["movies"].as_array().unwrap();
    assert_eq!(movies.len(), 2);
    let actors: Vec<&str> = movies[0]["actors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["name"].as_str())
        .collect();
    assert_eq!(actors, vec!["Bob", "Carol"]);
    assert_eq!(movies[1]["actors"][0]["name"], "Carol");
    assert!(!contains_key_anywhere(&rows[0], THROUGH_OWNER_KEY));
}

#[tokio::test]
async fn test_repeated_loads_are_identical() {
    let loader = loader(executor());
    let expression = "[children.[pets, movies.actors], parent, pets.owner]";

    let first = loader
        .load_related(vec![alice(), bob(), carol()], "Person", expression, None)
        .await
        .unwrap();
    let second = loader
        .load_related(vec![alice(), bob(), carol()], "Person", expression, None)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first[1]["parent"]["name"], "Alice");
    assert_eq!(first[0]["parent"], JsonValue::Null);
    assert_eq!(first[0]["pets"][0]["owner"]["name"], "Alice");
}

#[tokio::test]
async fn test_query_failure_aborts_load() {
    let loader = loader(executor().fail_table("movies"));

    let err = loader
        .load_related(vec![alice()], "Person", "children.[pets, movies]", None)
        .await
        .unwrap_err();

    match &err {
        EagerError::QueryExecution { relation, .. } => assert_eq!(relation, "movies"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.source().map(|s| s.to_string()),
        Some("table \"movies\" is unavailable".to_string())
    );
}

#[tokio::test]
async fn test_scope_is_passed_to_every_query() {
    let loader = loader(executor());
    let scope = "tx-7".to_string();

    loader
        .load_related_scoped(vec![alice()], "Person", "children.[pets, movies]", None, &scope)
        .await
        .unwrap();

    let queries = loader.executor().queries().await;
    assert_eq!(queries.len(), 3);
    assert!(queries.iter().all(|q| q.scope.as_deref() == Some("tx-7")));
}

#[tokio::test]
async fn test_builder_merges_expressions() {
    let loader = loader(executor());

    let request = loader
        .request("Person")
        .with("children")
        .with("children.pets")
        .with("parent");
    assert_eq!(request.expression().to_string(), "[children.pets, parent]");

    let result = request.load(vec![bob()]).await.unwrap();
    let bob = &result.rows[0];
    assert_eq!(bob["parent"]["name"], "Alice");
    assert_eq!(bob["children"][0]["name"], "Dave");
    assert_eq!(bob["children"][0]["pets"], json!([]));
    assert_eq!(result.stats.query_count, 3);
}

#[tokio::test]
async fn test_builder_defers_parse_errors() {
    let loader = loader(executor());

    let err = loader
        .request("Person")
        .with("[pets")
        .with("children")
        .load(vec![alice()])
        .await
        .unwrap_err();

    assert!(matches!(err, EagerError::Parse { position: 0, .. }));
    assert_eq!(loader.executor().query_count().await, 0);
}

#[tokio::test]
async fn test_stats_are_collected() {
    let loader = loader(executor());

    let result = loader
        .request("Person")
        .with("children.pets")
        .load(vec![alice()])
        .await
        .unwrap();

    assert_eq!(result.stats.query_count, 2);
    assert_eq!(result.stats.records_loaded, 4);
    assert_eq!(result.stats.depth_loaded, 2);
    assert_eq!(result.stats.skipped_steps, 0);
}

#[tokio::test]
async fn test_batch_size_splits_queries() {
    let loader = loader_with(executor(), EagerLoadConfig::default().with_max_batch_size(1));

    let rows = loader
        .load_related(vec![alice(), bob(), carol()], "Person", "pets", None)
        .await
        .unwrap();

    let queries = loader.executor().queries().await;
    assert_eq!(queries.len(), 3);
    assert!(queries.iter().all(|q| q.query.keys.len() == 1));
    assert_eq!(rows[0]["pets"][0]["name"], "Fido");
    assert_eq!(rows[1]["pets"][0]["name"], "Rex");
    assert_eq!(rows[2]["pets"][0]["name"], "Tom");
}

#[tokio::test]
async fn test_wildcard_loads_every_relation() {
    init_tracing();
    let registry = RelationRegistry::new()
        .with_relation(
            "Person",
            "pets",
            RelationMapping::one_to_many("Animal", "animals", "id", "owner_id"),
        )
        .unwrap()
        .with_relation(
            "Person",
            "movies",
            RelationMapping::many_to_many(
                "Movie",
                "movies",
                "id",
                elif_eager::ThroughTable::new("person_movies", "person_id", "movie_id"),
                "id",
            ),
        )
        .unwrap();
    let loader = EagerLoader::new(Arc::new(registry), executor());

    let rows = loader
        .load_related(vec![alice(), bob()], "Person", "*", None)
        .await
        .unwrap();

    assert_eq!(rows[0]["pets"][0]["name"], "Fido");
    assert_eq!(rows[0]["movies"], json!([]));
    assert_eq!(rows[1]["pets"][0]["name"], "Rex");
    assert_eq!(rows[1]["movies"][0]["title"], "Alien");
    assert_eq!(loader.executor().query_count().await, 2);
}

#[tokio::test]
async fn test_wildcard_on_cyclic_graph_hits_depth_guard() {
    let loader = loader_with(executor(), EagerLoadConfig::default().with_max_depth(2));

    let err = loader
        .load_related(vec![alice()], "Person", "*", None)
        .await
        .unwrap_err();

    match err {
        EagerError::ExpressionTooDeep { path, max_depth } => {
            assert_eq!(path.len(), 3);
            assert_eq!(max_depth, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout() {
    let loader = loader_with(
        executor().with_latency(Duration::from_millis(50)),
        EagerLoadConfig::default().with_query_timeout(Duration::from_millis(10)),
    );

    let err = loader
        .load_related(vec![alice()], "Person", "pets", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EagerError::Timeout { ref relation, after } if relation == "pets" && after == Duration::from_millis(10)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_load_timeout() {
    let loader = loader_with(
        executor().with_latency(Duration::from_millis(50)),
        EagerLoadConfig::default().with_load_timeout(Duration::from_millis(20)),
    );

    let err = loader
        .load_related(vec![alice()], "Person", "children.pets", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn test_non_object_base_rows_rejected() {
    let loader = loader(executor());

    let err = loader
        .load_related(vec![json!(1)], "Person", "pets", None)
        .await
        .unwrap_err();

    assert!(matches!(err, EagerError::InvalidRow(_)));
}
