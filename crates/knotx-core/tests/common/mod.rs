use std::sync::Arc;

use knotx_core::filter::Filter;
use knotx_core::{
    ForestConfig, ForestSettings, KnotData, MemoryForest, Properties, SequentialIdGenerator,
    Variation,
};
use serde_json::json;

/// Forest with predictable ids ("id-1", "id-2", ...)
#[allow(dead_code)]
pub fn new_forest() -> MemoryForest {
    forest_with(ForestSettings::default())
}

#[allow(dead_code)]
pub fn forest_with(settings: ForestSettings) -> MemoryForest {
    MemoryForest::in_memory(
        ForestConfig::new(settings).with_id_generator(Arc::new(SequentialIdGenerator::new("id"))),
    )
}

/// Map `key` to a fresh `Valued` knot; returns the knot id
#[allow(dead_code)]
pub fn valued_key(forest: &mut MemoryForest, key: &str, value: &str) -> String {
    let knot = forest
        .create_knot(KnotData::valued(value), Properties::new())
        .unwrap();
    forest.map_key(key, &knot.id).unwrap();
    knot.id
}

/// "greeting": base, with a "bonjour" variation for `lang == fr`
///
/// Returns the root knot id.
#[allow(dead_code)]
pub fn greeting(forest: &mut MemoryForest) -> String {
    let root = valued_key(forest, "greeting", "base");
    forest
        .add_variation(
            &root,
            Variation::onto_new(KnotData::valued("bonjour"))
                .with_filter(Filter::equals("$.lang", json!("fr"))),
        )
        .unwrap();
    root
}
