use crate::extras::{Reply, StubFactory};
use fieldscrape::error::{FetchError, NormalizeError, ScrapeError};
use fieldscrape::fetch::{Source, fetch_html, header_map, parse_json_argument, post_json, retrieve};
use fieldscrape::normalize::{HtmlOptions, RawContent, normalize};
use fieldscrape::pipeline::{PipelineContext, ScrapeRequest};
use fieldscrape::{Method, Session};
use serde_json::json;
use spectral::prelude::*;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod extras;

fn endpoint(server: &MockServer, route: &str) -> Url {
    Url::parse(&server.uri())
        .and_then(|base| base.join(route))
        .expect("valid mock url")
}

#[tokio::test]
async fn post_sends_payload_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "secret"))
        .and(body_json(json!({ "query": "widgets" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"items": [{"title": "Widget", "price": "9.99"}]}"#),
        )
        .mount(&server)
        .await;

    let raw = post_json(
        &endpoint(&server, "/search"),
        &json!({ "query": "widgets" }),
        &json!({ "x-api-key": "secret" }),
    )
    .await
    .expect("successful post");

    assert_that(&raw).is_equal_to(RawContent::JsonPayload {
        status: 200,
        body: r#"{"items": [{"title": "Widget", "price": "9.99"}]}"#.to_owned(),
    });
}

#[tokio::test]
async fn post_error_status_surfaces_at_normalization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let raw = post_json(&endpoint(&server, "/search"), &json!({}), &json!({}))
        .await
        .expect("response received");
    let result = normalize(&raw, &HtmlOptions::default());

    assert!(matches!(result, Err(NormalizeError::UnexpectedStatus(500))));
}

#[tokio::test]
async fn page_fetch_returns_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><h1>Widget</h1></body></html>"),
        )
        .mount(&server)
        .await;

    let raw = fetch_html(&endpoint(&server, "/page")).await.expect("fetched page");

    assert_that(&raw).is_equal_to(RawContent::HtmlPage {
        html: "<html><body><h1>Widget</h1></body></html>".to_owned(),
    });
}

#[tokio::test]
async fn page_fetch_error_status_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = fetch_html(&endpoint(&server, "/missing")).await;

    assert!(matches!(result, Err(FetchError::Status(404))));
}

#[tokio::test]
async fn chat_source_retrieves_nothing() {
    let source = Source::Chat {
        url: Url::parse("https://example.com/shop").expect("valid url"),
    };

    let raw = retrieve(&source).await.expect("instruction");

    assert_that(&source.method()).is_equal_to(Method::Chat);
    assert_that(&raw).is_equal_to(RawContent::Instruction {
        url: "https://example.com/shop".to_owned(),
    });
}

#[tokio::test]
async fn post_request_runs_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "title": "Widget", "price": 9.99 },
                { "title": "Gadget", "price": 19.5 },
            ]
        })))
        .mount(&server)
        .await;

    let factory = StubFactory::new(vec![Reply::text(
        r#"{"listings": [{"title": "Widget", "price": "9.99"}, {"title": "Gadget", "price": "19.5"}]}"#,
    )]);
    let ctx = PipelineContext {
        factory: &factory,
        storage: None,
        html: HtmlOptions::default(),
    };
    let request = ScrapeRequest {
        source: Source::Post {
            url: endpoint(&server, "/api"),
            payload: json!({}),
            headers: json!({}),
        },
        fields: vec!["title".to_owned(), "price".to_owned()],
        model_id: "gpt-4o-mini".to_owned(),
    };
    let mut session = Session::new();

    let outcome = session.run(&request, &ctx).await.expect("successful run");

    assert_that(&outcome.bundle.csv)
        .is_equal_to("title,price\nWidget,9.99\nGadget,19.5\n".to_owned());
    assert_that(&outcome.bundle.markdown).contains("| Widget | 9.99 |");
    let requests = factory.requests();
    assert_that(&requests.first().expect("one request").prompt).contains("| Gadget | 19.5 |");
}

#[tokio::test]
async fn invalid_fields_fail_before_any_request() {
    let factory = StubFactory::default();
    let ctx = PipelineContext {
        factory: &factory,
        storage: None,
        html: HtmlOptions::default(),
    };
    let request = ScrapeRequest {
        source: Source::Link {
            url: Url::parse("http://127.0.0.1:9/never").expect("valid url"),
        },
        fields: vec!["title".to_owned(), "title".to_owned()],
        model_id: "gpt-4o-mini".to_owned(),
    };
    let mut session = Session::new();

    let result = session.run(&request, &ctx).await.map(|_| ());

    assert!(matches!(result, Err(ScrapeError::Schema(_))));
    assert_that(&session.current().is_none()).is_true();
}

#[test]
fn json_arguments_default_to_an_empty_object() {
    assert_that(&parse_json_argument("payload", None).ok()).is_equal_to(Some(json!({})));
    assert_that(&parse_json_argument("payload", Some("  ")).ok()).is_equal_to(Some(json!({})));
    assert!(matches!(
        parse_json_argument("headers", Some("{not json")),
        Err(FetchError::InvalidPayload(_))
    ));
}

#[test]
fn header_values_must_be_valid() {
    assert_that(&header_map(&json!({ "accept": "application/json" })).map(|map| map.len()).ok())
        .is_equal_to(Some(1));
    assert!(matches!(
        header_map(&json!({ "bad header": "x" })),
        Err(FetchError::InvalidHeader(_))
    ));
    assert!(matches!(
        header_map(&json!(["not", "an", "object"])),
        Err(FetchError::InvalidHeader(_))
    ));
}
