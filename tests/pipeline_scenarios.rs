//! End-to-end pipeline scenarios against mock chat and search endpoints.
//!
//! These drive the real pipeline through wiremock servers and verify the
//! outcome, proof, sources, and the exact number of external calls each
//! path makes.

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prediction_validator::chat::ChatClient;
use prediction_validator::config::{ChatConfig, SearchConfig, ValidationConfig};
use prediction_validator::search::SearchClient;
use prediction_validator::storage::{
    GoalSlice, LeasedTuple, Outcome, Post, Prediction, PredictionDetails, StaticPosts,
};
use prediction_validator::validation::ValidatorPipeline;

fn pipeline_against(server: &MockServer) -> ValidatorPipeline {
    let chat = ChatClient::new(&ChatConfig {
        api_key: "test-chat-key".to_string(),
        base_url: server.uri(),
        enhancer_model: "enhancer-model".to_string(),
        judge_model: "judge-model".to_string(),
        timeout_ms: 5000,
    })
    .expect("chat client");

    let search = SearchClient::new(&SearchConfig {
        api_key: "test-search-key".to_string(),
        base_url: server.uri(),
        timeout_ms: 5000,
    })
    .expect("search client");

    ValidatorPipeline::new(
        chat,
        search,
        "enhancer-model",
        "judge-model",
        ValidationConfig::default(),
    )
}

fn matured_tuple(text: &str) -> LeasedTuple {
    LeasedTuple {
        prediction: Prediction {
            id: "pred-1".to_string(),
            source_post_id: "post-1".to_string(),
            goal_slices: vec![GoalSlice {
                start: 0,
                end: text.chars().count(),
                source_post_id: None,
            }],
            llm_confidence: Some(0.9),
            prediction_quality: Some(80.0),
            vagueness: Some(0.1),
        },
        details: PredictionDetails {
            prediction_id: "pred-1".to_string(),
            prediction_context: None,
            timeframe_start: None,
            timeframe_end: Some(chrono::Utc::now() - chrono::Duration::days(1)),
            timeframe_status: Some("explicit".to_string()),
            filter_validation_confidence: Some(0.95),
            filter_validation_reasoning: None,
        },
        post: Post {
            id: "post-1".to_string(),
            text: text.to_string(),
        },
    }
}

fn enhancer_reply(query: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": query}}],
        "usage": {"prompt_tokens": 30, "completion_tokens": 8}
    }))
}

fn judge_reply(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": body}}],
        "usage": {"prompt_tokens": 200, "completion_tokens": 60}
    }))
}

fn search_reply(urls: &[&str]) -> ResponseTemplate {
    let results: Vec<_> = urls
        .iter()
        .map(|u| json!({"link": u, "title": "Title", "snippet": "Snippet"}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "organic_results": results }))
}

/// S1: a too-vague prediction is rejected before any external call.
#[tokio::test]
async fn prefilter_rejection_makes_no_external_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(enhancer_reply("should never happen"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let mut tuple = matured_tuple("things will change");
    tuple.prediction.vagueness = Some(0.90);

    let output = pipeline_against(&server)
        .run(&tuple, &StaticPosts::default())
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::Invalid);
    assert!(output
        .record
        .proof
        .starts_with("Prediction too vague: 0.90 (threshold: 0.80)"));
    assert!(output.record.sources.is_empty());
    assert_eq!(output.costs.search_api_calls, 0);
}

/// S2: clear TRUE with a sufficient first judgment takes a single pass.
#[tokio::test]
async fn clear_true_single_pass() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("bitcoin price 2025 100000 close"))
        .expect(2)
        .mount(&server)
        .await;

    let urls: Vec<String> = (0..6)
        .map(|i| format!("https://news.example.com/{}", i))
        .collect();
    let url_refs: Vec<&str> = urls.iter().map(|s| s.as_str()).collect();
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&url_refs))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply(
            "<decision>TRUE</decision><score>10</score>\
             <summary>BTC closed above $100k on 2025-08-03</summary>\
             <sufficient>true</sufficient>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("Bitcoin closes above 100000 in 2025"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::MaturedTrue);
    assert!(output
        .record
        .proof
        .starts_with("BTC closed above $100k on 2025-08-03"));
    // Sources are the first two combined results, in order.
    assert_eq!(output.record.sources.len(), 2);
    assert_eq!(output.record.sources[0].url, "https://news.example.com/0");
    assert_eq!(output.record.sources[1].url, "https://news.example.com/1");
    assert_eq!(output.costs.search_api_calls, 2);
    // Two enhancer calls plus one judge call.
    assert_eq!(output.costs.enhancer_input_tokens, 60);
    assert_eq!(output.costs.judge_input_tokens, 200);
}

/// S3: insufficient first judgment triggers exactly one refinement pass.
#[tokio::test]
async fn refinement_then_mostly_true() {
    let server = MockServer::start().await;

    // Refinement call, matched by its failed-queries prompt. Mounted
    // before the generic enhancer mock so it wins for that call.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .and(body_string_contains("Failed queries"))
        .respond_with(enhancer_reply("bitcoin official exchange closing price"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("bitcoin 100k weak query"))
        .expect(2)
        .mount(&server)
        .await;

    // Initial queries surface 3 results each; the refined query 5 more.
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "bitcoin 100k weak query"))
        .respond_with(search_reply(&[
            "https://weak.example.com/a",
            "https://weak.example.com/b",
            "https://weak.example.com/c",
        ]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "bitcoin official exchange closing price"))
        .respond_with(search_reply(&[
            "https://strong.example.com/1",
            "https://strong.example.com/2",
            "https://strong.example.com/3",
            "https://strong.example.com/4",
            "https://strong.example.com/5",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    // First judgment: insufficient, with a refinement hint.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply(
            "<decision>TRUE</decision><score>8</score>\
             <summary>Reports suggest BTC crossed $100k</summary>\
             <sufficient>false</sufficient>\
             <next_query>add official exchange site</next_query>",
        ))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    // Second judgment over the enlarged set: sufficient.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply(
            "<decision>TRUE</decision><score>8</score>\
             <summary>Exchange data confirms BTC crossed $100k</summary>\
             <sufficient>true</sufficient>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("Bitcoin closes above 100000 in 2025"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::MaturedMostlyTrue);
    // Two fan-outs: 2 initial queries + 1 refined query.
    assert_eq!(output.costs.search_api_calls, 3);
    // Three enhancer calls (2 initial + 1 refine).
    assert_eq!(output.costs.enhancer_input_tokens, 90);
    // Two judgment calls.
    assert_eq!(output.costs.judge_input_tokens, 400);
    assert!(output
        .record
        .proof
        .starts_with("Exchange data confirms BTC crossed $100k"));
}

/// S4: an empty combined result set short-circuits before any judgment.
#[tokio::test]
async fn no_search_results_is_missing_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("a query"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&[]))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply("<score>5</score>"))
        .expect(0)
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("An obscure claim nobody wrote about"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::MissingContext);
    assert_eq!(output.record.proof, "No search results found");
    assert!(output.record.sources.is_empty());
}

/// S5: a judge failure still yields a persistable Invalid record.
#[tokio::test]
async fn judge_failure_becomes_invalid() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("a query"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&["https://example.com/a"]))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("judge exploded"))
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("Bitcoin closes above 100000 in 2025"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::Invalid);
    assert!(output.record.proof.starts_with("Validation error: "));
    assert!(output.record.sources.is_empty());
}

/// INCONCLUSIVE judgments carry no sources even when results exist.
#[tokio::test]
async fn inconclusive_judgment_has_no_sources() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("a query"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&["https://example.com/a", "https://example.com/b"]))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply(
            "<decision>INCONCLUSIVE</decision><score>5</score>\
             <summary>The results do not settle the claim</summary>\
             <sufficient>true</sufficient>",
        ))
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("A claim with ambiguous coverage"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::MissingContext);
    assert!(output.record.sources.is_empty());
}

/// A sufficient judgment never triggers refinement even at low scores.
#[tokio::test]
async fn sufficient_false_judgment_single_pass() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "enhancer-model"})))
        .respond_with(enhancer_reply("a query"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(search_reply(&["https://example.com/a"]))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "judge-model"})))
        .respond_with(judge_reply(
            "<decision>FALSE</decision><score>0</score>\
             <summary>The predicted event never happened</summary>\
             <sufficient>true</sufficient>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let output = pipeline_against(&server)
        .run(
            &matured_tuple("A confidently wrong prediction"),
            &StaticPosts::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.record.outcome, Outcome::MaturedFalse);
    assert_eq!(output.record.sources.len(), 1);
}
