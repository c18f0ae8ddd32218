use crate::extras::{Reply, StubFactory};
use fieldscrape::catalog::{self, Family, ModelSpec, Pricing, Provider};
use fieldscrape::error::{NormalizeError, ScrapeError};
use fieldscrape::normalize::{HtmlOptions, RawContent};
use fieldscrape::pipeline::{PipelineContext, ScrapeOutcome};
use fieldscrape::storage::Storage;
use fieldscrape::{Session, build_schema};
use serde_json::{Value, json};
use spectral::prelude::*;

mod extras;

const WIDGET_REPLY: &str = r#"{"listings": [{"title": "Widget", "price": "9.99"}]}"#;

fn widget_payload() -> RawContent {
    RawContent::JsonPayload {
        status: 200,
        body: json!({ "items": [{ "title": "Widget", "price": 9.99 }] }).to_string(),
    }
}

fn context<'a>(factory: &'a StubFactory, storage: Option<&'a Storage>) -> PipelineContext<'a> {
    PipelineContext {
        factory,
        storage,
        html: HtmlOptions::default(),
    }
}

fn gpt_4o_mini() -> &'static ModelSpec {
    catalog::lookup("gpt-4o-mini").expect("catalog model")
}

#[tokio::test]
async fn successful_run_is_held_by_the_session() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::with_usage(WIDGET_REPLY, 2_000, 500)]);
    let mut session = Session::new();

    let outcome = session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &context(&factory, None))
        .await
        .expect("successful run");

    assert_that(&outcome.bundle.csv).is_equal_to("title,price\nWidget,9.99\n".to_owned());
    assert_that(&outcome.result.usage.input_tokens).is_equal_to(2_000);
    let cost = outcome.cost.expect("known pricing");
    assert!((cost.total_cost - (2_000.0 * 0.15 + 500.0 * 0.6) / 1_000_000.0).abs() < 1e-12);
    assert_that(&outcome.bundle.markdown).is_equal_to(outcome.result.content.text.clone());
    assert_that(&outcome.bundle.timestamp).is_equal_to(outcome.result.timestamp_key());
    assert_that(&session.current().is_some()).is_true();
}

#[tokio::test]
async fn json_export_matches_the_schema_fields() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::text(
        r#"{"listings": [{"price": 9.99, "title": "Widget", "extra": "dropped"}]}"#,
    )]);
    let mut session = Session::new();

    let outcome = session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &context(&factory, None))
        .await
        .expect("successful run");

    let reparsed: Value = serde_json::from_str(&outcome.bundle.json).expect("valid JSON export");
    let records = reparsed["listings"].as_array().expect("records");
    for record in records {
        let keys: Vec<&String> = record.as_object().expect("record").keys().collect();
        let fields: Vec<&String> = schema.fields().iter().collect();
        assert_that(&keys).is_equal_to(fields);
    }
}

#[tokio::test]
async fn malformed_payload_keeps_previous_result() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::text(WIDGET_REPLY)]);
    let ctx = context(&factory, None);
    let mut session = Session::new();
    session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &ctx)
        .await
        .expect("successful run");
    let before = session.current().map(|outcome| outcome.bundle.clone());

    let malformed = RawContent::JsonPayload {
        status: 200,
        body: r#"{"items": [{"a":1,]}"#.to_owned(),
    };
    let result = session
        .run_raw(&malformed, &schema, gpt_4o_mini(), &ctx)
        .await
        .map(|_| ());

    assert!(matches!(
        result,
        Err(ScrapeError::Normalize(NormalizeError::InvalidJson(_)))
    ));
    assert_that(&session.current().map(|outcome| outcome.bundle.clone())).is_equal_to(before);
    assert_that(&factory.requests().len()).is_equal_to(1);
}

#[tokio::test]
async fn backend_failure_keeps_previous_result() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![
        Reply::text(WIDGET_REPLY),
        Reply::Failure("connection reset".to_owned()),
    ]);
    let ctx = context(&factory, None);
    let mut session = Session::new();
    session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &ctx)
        .await
        .expect("successful run");

    let result = session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &ctx)
        .await
        .map(|_| ());

    assert!(matches!(result, Err(ScrapeError::Dispatch(_))));
    let current: Option<&ScrapeOutcome> = session.current();
    assert_that(&current.map(|outcome| outcome.table.rows.len())).is_equal_to(Some(1));
}

#[tokio::test]
async fn unpriced_model_still_returns_data() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::text(WIDGET_REPLY)]);
    let model = ModelSpec {
        id: "made-up-model",
        provider: Provider::Ollama,
        remote_name: "made-up-model",
        family: Family::PromptAndParse,
        pricing: Pricing {
            input_per_million: 1.0,
            output_per_million: 1.0,
        },
        max_chunk_chars: 10_000,
    };
    let mut session = Session::new();

    let outcome = session
        .run_raw(&widget_payload(), &schema, &model, &context(&factory, None))
        .await
        .expect("successful run");

    assert_that(&outcome.cost.is_none()).is_true();
    assert_that(&outcome.display_cost().total_cost).is_equal_to(0.0);
    assert_that(&outcome.table.rows).is_equal_to(vec![vec!["Widget".to_owned(), "9.99".to_owned()]]);
}

#[tokio::test]
async fn run_is_recorded_in_the_audit_store() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::text(WIDGET_REPLY)]);
    let storage = Storage::in_memory().expect("in-memory storage");
    let mut session = Session::new();

    let outcome = session
        .run_raw(
            &widget_payload(),
            &schema,
            gpt_4o_mini(),
            &context(&factory, Some(&storage)),
        )
        .await
        .expect("successful run");

    let key = outcome.bundle.timestamp.clone();
    let raw = storage.get_raw(&key).expect("readable store");
    let formatted = storage.get_formatted(&key).expect("readable store");
    assert_that(&raw).is_equal_to(Some(outcome.result.content.text.clone()));
    assert_that(&formatted).is_equal_to(Some(outcome.result.structured_data.clone()));
}

#[tokio::test]
async fn chat_method_sends_only_an_instruction() {
    let schema = build_schema(Vec::<String>::new()).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::text(r#"{"listings": [{"any": "thing"}]}"#)]);
    let raw = RawContent::Instruction {
        url: "https://example.com/".to_owned(),
    };
    let mut session = Session::new();

    let outcome = session
        .run_raw(&raw, &schema, gpt_4o_mini(), &context(&factory, None))
        .await
        .expect("successful run");

    assert_that(&outcome.bundle.markdown)
        .is_equal_to("Grab all data from https://example.com/".to_owned());
    let requests = factory.requests();
    let prompt = &requests.first().expect("one request").prompt;
    assert_that(prompt).contains("Grab all data from https://example.com/");
    assert_that(&outcome.table.columns).is_equal_to(vec!["any".to_owned()]);
}

#[tokio::test]
async fn caller_built_spec_is_priced_from_the_catalog() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::new(vec![Reply::with_usage(WIDGET_REPLY, 1_000_000, 0)]);
    let model = ModelSpec {
        pricing: Pricing {
            input_per_million: 100.0,
            output_per_million: 100.0,
        },
        ..gpt_4o_mini().clone()
    };
    let mut session = Session::new();

    let outcome = session
        .run_raw(&widget_payload(), &schema, &model, &context(&factory, None))
        .await
        .expect("successful run");

    let cost = outcome.cost.expect("catalog pricing");
    assert!((cost.input_cost - 0.15).abs() < 1e-12);
}

#[tokio::test]
async fn back_to_back_runs_keep_separate_audit_rows() {
    let schema = build_schema(["title", "price"]).expect("valid fields");
    let factory = StubFactory::repeating(WIDGET_REPLY, 2);
    let storage = Storage::in_memory().expect("in-memory storage");
    let ctx = context(&factory, Some(&storage));
    let mut session = Session::new();

    let first = session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &ctx)
        .await
        .expect("successful run")
        .bundle
        .timestamp
        .clone();
    let second = session
        .run_raw(&widget_payload(), &schema, gpt_4o_mini(), &ctx)
        .await
        .expect("successful run")
        .bundle
        .timestamp
        .clone();

    assert_that(&first).is_not_equal_to(&second);
    assert_that(&storage.get_raw(&first).expect("readable store").is_some()).is_true();
    assert_that(&storage.get_raw(&second).expect("readable store").is_some()).is_true();
}
