use harvest_core::Record;
use harvest_engine::{
    DecodeError, FetchResponse, GraphQlOptions, GraphQlSource, IndexDescriptor, PageSource,
    RequestBody, SourceKind,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const ENDPOINT: &str = "https://api.archive.example/graphql";

fn source() -> GraphQlSource {
    GraphQlSource::new(GraphQlOptions {
        endpoint: ENDPOINT.into(),
        site_base: Some("https://archive.example/".into()),
        ..GraphQlOptions::default()
    })
    .unwrap()
}

fn index() -> IndexDescriptor {
    IndexDescriptor {
        title: "Assisted Immigrants".into(),
        key: "assisted-immigrants".into(),
        search: None,
        category: None,
    }
}

fn json_response(value: Value) -> FetchResponse {
    FetchResponse {
        status: 200,
        body: value.to_string().into_bytes(),
        content_type: Some("application/json".into()),
        final_url: ENDPOINT.into(),
        from_cache: false,
    }
}

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn payload() -> Value {
    json!({
        "data": {
            "indexSearch": {
                "headers": [{"title": "Surname"}, {"title": "Ship"}, {"title": null}],
                "rows": [
                    {"columns": [
                        {"content": "Smith", "link": null},
                        {"content": "Lady Nugent", "link": null},
                        {"content": "Details", "link": "/indexes/assisted-immigrants/42"}
                    ]},
                    {"columns": [
                        {"content": "Brown"},
                        {"content": ""},
                        {"content": "Details", "link": "https://files.example/7"}
                    ]}
                ],
                "pagination": {"page": 1, "pageSize": 100, "totalPages": 12}
            }
        }
    })
}

#[test]
fn total_pages_comes_from_pagination() {
    assert_eq!(source().total_pages(&json_response(payload())), Ok(12));
}

#[test]
fn rows_follow_headers_and_details_links_resolve() {
    let page = source().decode_page(&json_response(payload()), None).unwrap();
    assert_eq!(page.headers, vec!["Surname", "Ship", "Details"]);
    assert_eq!(
        page.rows,
        vec![
            record(&[
                ("Surname", "Smith"),
                ("Ship", "Lady Nugent"),
                ("Details", "https://archive.example/indexes/assisted-immigrants/42"),
            ]),
            record(&[
                ("Surname", "Brown"),
                ("Ship", ""),
                ("Details", "https://files.example/7"),
            ]),
        ]
    );
}

#[test]
fn errors_array_is_a_soft_failure() {
    let body = json!({"data": null, "errors": [{"message": "index temporarily unavailable"}]});
    let err = source().decode_page(&json_response(body.clone()), None).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Upstream(vec!["index temporarily unavailable".into()])
    );
    assert!(err.is_soft());
    assert!(source().total_pages(&json_response(body)).unwrap_err().is_soft());
}

#[test]
fn unparseable_or_empty_payload_is_malformed() {
    let garbage = FetchResponse {
        body: b"<html>gateway</html>".to_vec(),
        ..json_response(Value::Null)
    };
    let err = source().decode_page(&garbage, None).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed(_)));
    assert!(!err.is_soft());

    let missing = json_response(json!({"data": {"indexSearch": null}}));
    assert!(matches!(
        source().total_pages(&missing),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn page_request_overrides_pagination_page() {
    let source = GraphQlSource::new(GraphQlOptions {
        endpoint: ENDPOINT.into(),
        page_size: 50,
        variables: json!({"filters": {"surname": "%"}, "pagination": {"pageSize": 25}}),
        ..GraphQlOptions::default()
    })
    .unwrap();
    let request = source.page_request(&index(), 3).unwrap();

    assert_eq!(request.url, ENDPOINT);
    assert_eq!(request.cache_namespace.as_deref(), Some("assisted-immigrants"));
    let Some(RequestBody::Json(body)) = request.body else {
        panic!("expected a json body");
    };
    assert_eq!(
        body["variables"],
        json!({
            "filters": {"surname": "%"},
            "slug": "assisted-immigrants",
            "pagination": {"pageSize": 25, "page": 3}
        })
    );
    assert!(body["query"].as_str().unwrap().contains("indexSearch"));
}

#[test]
fn default_page_size_is_sent_when_no_template() {
    let request = source().page_request(&index(), 1).unwrap();
    let Some(RequestBody::Json(body)) = request.body else {
        panic!("expected a json body");
    };
    assert_eq!(body["variables"]["pagination"], json!({"pageSize": 100, "page": 1}));
}

#[test]
fn cache_filter_rejects_error_payloads() {
    let filter = GraphQlSource::cache_filter();
    assert!(filter(&json_response(payload())));
    assert!(filter(&json_response(json!({"data": {}, "errors": []}))));
    assert!(!filter(&json_response(json!({"errors": [{"message": "busy"}]}))));
    assert!(!filter(&FetchResponse {
        body: b"not json".to_vec(),
        ..json_response(Value::Null)
    }));
}

#[test]
fn artifact_is_named_after_the_slug() {
    assert_eq!(source().artifact_name(&index()), "assisted-immigrants");
    assert!(!source().clears_cache_after_write());
    assert_eq!(source().kind(), SourceKind::GraphQl);
}

#[test]
fn endpoint_must_be_a_url() {
    assert!(GraphQlSource::new(GraphQlOptions::default()).is_err());
}

#[test]
fn invalid_site_base_is_rejected() {
    let err = GraphQlSource::new(GraphQlOptions {
        endpoint: ENDPOINT.into(),
        site_base: Some("archive.example".into()),
        ..GraphQlOptions::default()
    })
    .unwrap_err();
    assert!(matches!(err, DecodeError::Malformed(_)));
}
