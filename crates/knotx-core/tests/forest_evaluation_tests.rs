mod common;

use common::{greeting, new_forest, valued_key};
use knotx_core::filter::Filter;
use knotx_core::{
    Edge, EdgeIdentifier, ForestConfig, JsonContext, Knot, KnotData, MemoryForest, Node,
    SeededSampler, TreeEdge, TreeKnot, Variation,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_greeting_follows_lang() {
    let mut forest = new_forest();
    greeting(&mut forest);

    let fr = forest
        .evaluate("greeting", &JsonContext::new(json!({"lang": "fr"})))
        .unwrap();
    assert_eq!(fr.string_or(""), "bonjour");
    assert_eq!(fr.path, vec![0]);

    let en = forest
        .evaluate("greeting", &JsonContext::new(json!({"lang": "en"})))
        .unwrap();
    assert_eq!(en.string_or(""), "base");
    assert!(en.path.is_empty());
}

#[test]
fn test_unmapped_key_is_empty() {
    let forest = new_forest();
    let node = forest
        .evaluate("nope", &JsonContext::new(json!({})))
        .unwrap();
    assert!(node.is_empty());
    assert_eq!(node.string_or("fallback"), "fallback");
    assert!(node.bool_or(true));
}

#[test]
fn test_multi_resolves_each_key_in_context() {
    let mut forest = new_forest();
    greeting(&mut forest);
    valued_key(&mut forest, "farewell", "bye");

    let page = forest
        .create_knot(
            KnotData::multi(["greeting", "farewell", "missing"]),
            Default::default(),
        )
        .unwrap();
    forest.map_key("page", &page.id).unwrap();

    let node = forest
        .evaluate("page", &JsonContext::new(json!({"lang": "fr"})))
        .unwrap();
    let Some(Node::List { children, .. }) = &node.node else {
        panic!("expected a list node, got {:?}", node.node);
    };
    assert_eq!(children.len(), 3);
    assert_eq!(children[0].string_or(""), "bonjour");
    assert_eq!(children[1].string_or(""), "bye");
    assert!(children[2].is_empty());
    assert_eq!(node.to_json(), json!(["bonjour", "bye", null]));
}

#[test]
fn test_lowest_priority_number_wins_among_matches() {
    let mut forest = new_forest();
    let root = valued_key(&mut forest, "banner", "none");
    forest
        .add_variation(
            &root,
            Variation::onto_new(KnotData::valued("late"))
                .with_priority(10)
                .with_filter(Filter::exists("$.user")),
        )
        .unwrap();
    forest
        .add_variation(
            &root,
            Variation::onto_new(KnotData::valued("early"))
                .with_priority(1)
                .with_filter(Filter::exists("$.user")),
        )
        .unwrap();

    let node = forest
        .evaluate("banner", &JsonContext::new(json!({"user": "u1"})))
        .unwrap();
    assert_eq!(node.string_or(""), "early");
}

#[test]
fn test_nested_variations_descend() {
    let mut forest = new_forest();
    let root = greeting(&mut forest);
    let fr_edge = forest.get_knot(&root).unwrap().unwrap().edges.ids()[0].clone();
    let fr_knot = forest.get_edge(&fr_edge).unwrap().unwrap().target;
    forest
        .add_variation(
            &fr_knot,
            Variation::onto_new(KnotData::valued("salut"))
                .with_filter(Filter::equals("$.tone", json!("casual"))),
        )
        .unwrap();

    let node = forest
        .evaluate(
            "greeting",
            &JsonContext::new(json!({"lang": "fr", "tone": "casual"})),
        )
        .unwrap();
    assert_eq!(node.string_or(""), "salut");
    assert_eq!(node.path, vec![0, 0]);
}

#[test]
fn test_percentage_gate_extremes() {
    let mut forest = MemoryForest::in_memory(
        ForestConfig::default().with_sampler(Arc::new(SeededSampler::new(42))),
    );
    let never = forest
        .create_knot(KnotData::valued("control"), Default::default())
        .unwrap();
    forest.map_key("never", &never.id).unwrap();
    forest
        .add_variation(
            &never.id,
            Variation::onto_new(KnotData::valued("treatment")).with_percentage(0),
        )
        .unwrap();

    let always = forest
        .create_knot(KnotData::valued("control"), Default::default())
        .unwrap();
    forest.map_key("always", &always.id).unwrap();
    forest
        .add_variation(
            &always.id,
            Variation::onto_new(KnotData::valued("treatment")).with_percentage(100),
        )
        .unwrap();

    let half = forest
        .create_knot(KnotData::valued("control"), Default::default())
        .unwrap();
    forest.map_key("half", &half.id).unwrap();
    forest
        .add_variation(
            &half.id,
            Variation::onto_new(KnotData::valued("treatment")).with_percentage(50),
        )
        .unwrap();

    let ctx = JsonContext::new(json!({}));
    let mut treated = 0;
    for _ in 0..1000 {
        assert_eq!(forest.evaluate("never", &ctx).unwrap().string_or(""), "control");
        assert_eq!(forest.evaluate("always", &ctx).unwrap().string_or(""), "treatment");
        if forest.evaluate("half", &ctx).unwrap().string_or("") == "treatment" {
            treated += 1;
        }
    }
    assert!((350..=650).contains(&treated), "treated {} of 1000", treated);
}

#[test]
fn test_dead_edge_is_skipped() {
    let mut forest = new_forest();
    let root = greeting(&mut forest);
    let edge_id = forest.get_knot(&root).unwrap().unwrap().edges.ids()[0].clone();
    let mut edge = forest.get_edge(&edge_id).unwrap().unwrap();
    edge.live = false;
    forest.update_edge(edge).unwrap();

    let node = forest
        .evaluate("greeting", &JsonContext::new(json!({"lang": "fr"})))
        .unwrap();
    assert_eq!(node.string_or(""), "base");
}

#[test]
fn test_snapshot_import_then_evaluate() {
    let mut forest = new_forest();
    let leaf = TreeKnot::from_knot(&Knot::new("k-fr", KnotData::valued("bonjour")));
    let edge = Edge::new(EdgeIdentifier::new("e-fr", 0), "k-fr")
        .with_filter(Filter::equals("$.lang", json!("fr")));
    let tree = TreeKnot::from_knot(&Knot::new("k-root", KnotData::valued("base")))
        .with_child(TreeEdge::from_edge(&edge, leaf));

    let stored = forest.create_complete_tree("greeting", &tree).unwrap();
    assert_eq!(stored.strip_versions(), tree.strip_versions());
    assert_eq!(forest.get_key("greeting").unwrap().as_deref(), Some("k-root"));

    let node = forest
        .evaluate("greeting", &JsonContext::new(json!({"lang": "fr"})))
        .unwrap();
    assert_eq!(node.string_or(""), "bonjour");

    let flat = forest
        .evaluate_flat("greeting", &JsonContext::new(json!({"lang": "fr"})))
        .unwrap();
    assert_eq!(flat.root_id.as_deref(), Some("k-fr"));
}

#[test]
fn test_incomplete_snapshot_rejected() {
    let mut forest = new_forest();
    let tree = TreeKnot::from_knot(&Knot::new("k-root", KnotData::valued("base")))
        .with_child(TreeEdge::placeholder(EdgeIdentifier::new("e-x", 0)));
    assert!(matches!(
        forest.create_complete_tree("greeting", &tree),
        Err(knotx_core::KnotXError::InvalidInput { .. })
    ));
    assert!(!forest.contains_key("greeting").unwrap());
}
