#![allow(dead_code)]

use std::sync::Arc;

use elif_eager::{MemoryExecutor, RelationMapping, RelationRegistry, ThroughTable};
use serde_json::{json, Value as JsonValue};
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Person / Animal / Movie relation graph
pub fn registry() -> Arc<RelationRegistry> {
    let mut registry = RelationRegistry::new();
    registry
        .register(
            "Person",
            "pets",
            RelationMapping::one_to_many("Animal", "animals", "id", "owner_id"),
        )
        .unwrap();
    registry
        .register(
            "Person",
            "movies",
            RelationMapping::many_to_many(
                "Movie",
                "movies",
                "id",
                ThroughTable::new("person_movies", "person_id", "movie_id"),
                "id",
            ),
        )
        .unwrap();
    registry
        .register(
            "Person",
            "children",
            RelationMapping::one_to_many("Person", "persons", "id", "parent_id"),
        )
        .unwrap();
    registry
        .register(
            "Person",
            "parent",
            RelationMapping::one_to_one("Person", "persons", "parent_id", "id"),
        )
        .unwrap();
    registry
        .register(
            "Animal",
            "owner",
            RelationMapping::one_to_one("Person", "persons", "owner_id", "id"),
        )
        .unwrap();
    registry
        .register(
            "Movie",
            "actors",
            RelationMapping::many_to_many(
                "Person",
                "persons",
                "id",
                ThroughTable::new("person_movies", "movie_id", "person_id"),
                "id",
            ),
        )
        .unwrap();
    Arc::new(registry)
}

pub fn alice() -> JsonValue {
    json!({"id": 1, "name": "Alice", "parent_id": null})
}

pub fn bob() -> JsonValue {
    json!({"id": 2, "name": "Bob", "parent_id": 1})
}

pub fn carol() -> JsonValue {
    json!({"id": 3, "name": "Carol", "parent_id": 1})
}

pub fn dave() -> JsonValue {
    json!({"id": 4, "name": "Dave", "parent_id": 2})
}

/// Alice has Bob and Carol, Bob has Dave
pub fn executor() -> MemoryExecutor {
    MemoryExecutor::new()
        .with_table("persons", vec![alice(), bob(), carol(), dave()])
        .with_table(
            "animals",
            vec![
                json!({"id": 10, "name": "Rex", "owner_id": 2}),
                json!({"id": 11, "name": "Tom", "owner_id": 3}),
                json!({"id": 12, "name": "Fido", "owner_id": 1}),
            ],
        )
        .with_table(
            "movies",
            vec![
                json!({"id": 100, "title": "Alien"}),
                json!({"id": 101, "title": "Heat"}),
            ],
        )
        .with_table(
            "person_movies",
            vec![
                json!({"person_id": 2, "movie_id": 100}),
                json!({"person_id": 3, "movie_id": 100}),
                json!({"person_id": 3, "movie_id": 101}),
            ],
        )
}
