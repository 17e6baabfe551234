use jsonld_expand::loader::{NoLoader, StaticLoader};
use jsonld_expand::{
    expand, expand_document, expand_with_warnings, ErrorCode, JsonLdOptions, NodeKind,
};
use serde_json::{json, Value};

async fn expand_default(input: Value) -> jsonld_expand::Result<Value> {
    expand(&input, &JsonLdOptions::default(), &NoLoader).await
}

#[async_std::test]
async fn expansion_is_idempotent() {
    let input = json!({
        "@context": {
            "@vocab": "http://example.org/",
            "tags": {"@container": "@set"},
            "knows": {"@type": "@id"},
            "label": {"@container": "@language"}
        },
        "@id": "http://example.org/a",
        "@type": "Person",
        "name": "A",
        "tags": ["x", "y"],
        "knows": "http://example.org/b",
        "label": {"en": "a", "de": "b"}
    });

    let once = expand_default(input).await.unwrap();
    let twice = expand_default(once.clone()).await.unwrap();
    assert_eq!(once, twice);
}

#[async_std::test]
async fn ordered_expansion_is_deterministic() {
    let options = JsonLdOptions {
        ordered: true,
        ..JsonLdOptions::default()
    };
    let first = json!({
        "@context": {"@vocab": "http://example.org/"},
        "b": 2,
        "a": 1,
        "@id": "http://example.org/x"
    });
    let second = json!({
        "@id": "http://example.org/x",
        "a": 1,
        "@context": {"@vocab": "http://example.org/"},
        "b": 2
    });

    let first = expand(&first, &options, &NoLoader).await.unwrap();
    let second = expand(&second, &options, &NoLoader).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[async_std::test]
async fn free_floating_scalars_are_dropped() {
    assert_eq!(expand_default(json!("hello")).await.unwrap(), json!([]));
    assert_eq!(expand_default(json!([1, true, null])).await.unwrap(), json!([]));
    assert_eq!(
        expand_default(json!({"@value": "orphan"})).await.unwrap(),
        json!([])
    );
}

#[async_std::test]
async fn value_objects_survive_expansion() {
    let input = json!({
        "@context": {"@vocab": "http://example.org/"},
        "p": {"@value": "x", "@language": "en"},
        "q": {"@value": "5", "@type": "http://www.w3.org/2001/XMLSchema#integer"}
    });

    let result = expand_default(input).await.unwrap();
    assert_eq!(
        result,
        json!([{
            "http://example.org/p": [{"@value": "x", "@language": "en"}],
            "http://example.org/q": [{
                "@value": "5",
                "@type": "http://www.w3.org/2001/XMLSchema#integer"
            }]
        }])
    );

    let node = &result[0]["http://example.org/p"][0];
    assert_eq!(NodeKind::of(node), NodeKind::ValueObject);
    assert_eq!(NodeKind::of(&result[0]), NodeKind::NodeObject);
}

#[async_std::test]
async fn language_maps_fan_out() {
    let options = JsonLdOptions {
        ordered: true,
        ..JsonLdOptions::default()
    };
    let input = json!({
        "@context": {
            "label": {"@id": "http://example.org/label", "@container": "@language"}
        },
        "label": {"en": ["a", "b"], "de": "c"}
    });

    let result = expand(&input, &options, &NoLoader).await.unwrap();
    assert_eq!(
        result,
        json!([{
            "http://example.org/label": [
                {"@value": "c", "@language": "de"},
                {"@value": "a", "@language": "en"},
                {"@value": "b", "@language": "en"}
            ]
        }])
    );
}

#[async_std::test]
async fn protected_terms_hold_across_documents() {
    let input = json!({
        "@context": [
            {"@protected": true, "name": "http://schema.org/name"},
            {"name": "http://example.org/name"}
        ],
        "name": "x"
    });

    let err = expand_default(input).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtectedTermRedefinition);
}

#[async_std::test]
async fn top_level_graph_is_unwrapped() {
    let input = json!({
        "@context": {"@vocab": "http://example.org/"},
        "@graph": [
            {"@id": "http://example.org/a", "name": "A"},
            {"@id": "http://example.org/b", "name": "B"}
        ]
    });

    let result = expand_default(input).await.unwrap();
    assert_eq!(
        result,
        json!([
            {"@id": "http://example.org/a", "http://example.org/name": [{"@value": "A"}]},
            {"@id": "http://example.org/b", "http://example.org/name": [{"@value": "B"}]}
        ])
    );
}

#[async_std::test]
async fn remote_documents_and_linked_contexts() {
    let loader = StaticLoader::new()
        .with_linked_document(
            "http://example.org/doc.jsonld",
            json!({"@id": "a", "name": "X"}),
            "http://example.org/ctx.jsonld",
        )
        .with_document(
            "http://example.org/ctx.jsonld",
            json!({"@context": {"name": "http://schema.org/name"}}),
        );

    let result = expand_document("http://example.org/doc.jsonld", &JsonLdOptions::default(), &loader)
        .await
        .unwrap();
    assert_eq!(
        result,
        json!([{
            "@id": "http://example.org/a",
            "http://schema.org/name": [{"@value": "X"}]
        }])
    );

    let err = expand_document("http://example.org/none.jsonld", &JsonLdOptions::default(), &loader)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::LoadingDocumentFailed);
}

#[async_std::test]
async fn expand_context_option_applies_first() {
    let options = JsonLdOptions {
        expand_context: Some(json!({"@context": {"@vocab": "http://example.org/"}})),
        ..JsonLdOptions::default()
    };
    let input = json!({"name": "X"});

    let result = expand(&input, &options, &NoLoader).await.unwrap();
    assert_eq!(
        result,
        json!([{"http://example.org/name": [{"@value": "X"}]}])
    );
}

#[async_std::test]
async fn warnings_are_collected() {
    let options = JsonLdOptions {
        safe_mode: true,
        ..JsonLdOptions::default()
    };
    let input = json!({
        "@context": {"@vocab": "http://example.org/"},
        "@id": "http://example.org/a",
        "@unknown": "dropped",
        "p": "kept"
    });

    let (result, warnings) = expand_with_warnings(&input, &options, &NoLoader)
        .await
        .unwrap();
    assert_eq!(
        result,
        json!([{"@id": "http://example.org/a", "http://example.org/p": [{"@value": "kept"}]}])
    );
    assert!(!warnings.is_empty());
}

#[async_std::test]
async fn relative_ids_resolve_without_normalization() {
    let cases = [
        ("http://example.org/", "ü", "http://example.org/ü"),
        ("http://example.org", "#frag", "http://example.org#frag"),
        ("HTTP://EXAMPLE.org/a/", "b", "HTTP://EXAMPLE.org/a/b"),
        ("urn:x:y", "foo", "urn:foo"),
        ("http://example.org/a/b/", "../c", "http://example.org/a/c"),
    ];

    for (base, id, expected) in cases {
        let input = json!({
            "@context": {"@base": base},
            "@id": id,
            "http://example.org/p": "x"
        });

        let result = expand_default(input).await.unwrap();
        assert_eq!(result[0]["@id"], json!(expected), "{} against {}", id, base);
    }
}
