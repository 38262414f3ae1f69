use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harvest_engine::{
    descriptor_from_row, run_all, CatalogRow, FetchSettings, Fetcher, GraphQlOptions,
    GraphQlSource, HarvestError, HarvestEvent, HarvestSettings, HtmlOptions, HtmlSource,
    IndexDescriptor, IndexHarvester, PageSource, ProgressSink, ReqwestFetcher, ResponseCache,
    RetryPolicy, SourceKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<HarvestEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().clone()
    }

    fn pages_harvested(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HarvestEvent::PageHarvested { page, .. } => Some(page),
                _ => None,
            })
            .collect()
    }

    fn soft_failures(&self) -> Vec<(u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HarvestEvent::SoftFailure { page, attempt, .. } => Some((page, attempt)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A results page of `rows` (name, year) pairs; `last` is the zero-based last page.
fn results_page(rows: &[(String, String)], last: Option<u32>) -> String {
    let mut html = String::from(
        "<html><body><table><thead><tr><th>Name</th><th>Year</th></tr></thead><tbody>",
    );
    for (name, year) in rows {
        html.push_str(&format!("<tr><td>{name}</td><td>{year}</td></tr>"));
    }
    html.push_str("</tbody></table>");
    if let Some(last) = last {
        html.push_str(&format!(
            r#"<ul class="pager"><li class="pager__item--last"><a title="Go to last page" href="?id=9&amp;page={last}">Last</a></li></ul>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

fn people(page: u32, count: u32) -> Vec<(String, String)> {
    (0..count)
        .map(|i| (format!("Person {page}-{i}"), format!("{}", 1800 + i)))
        .collect()
}

const BUSY_PAGE: &str = "<html><body><p>Search is temporarily unavailable.</p></body></html>";

async fn mount_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

fn test_index(server: &MockServer, title: &str, id: u32) -> IndexDescriptor {
    descriptor_from_row(
        &CatalogRow {
            title: title.into(),
            url: format!("{}/search?id={id}&Surname=%25", server.uri()),
            category: None,
            status: None,
        },
        SourceKind::Html,
    )
    .unwrap()
}

fn fetch_settings() -> FetchSettings {
    FetchSettings {
        retry: RetryPolicy {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..RetryPolicy::default()
        },
        ..FetchSettings::default()
    }
}

fn html_harvester(cache_dir: &Path, settings: HarvestSettings, sink: Arc<RecordingSink>) -> IndexHarvester {
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        ReqwestFetcher::new(fetch_settings())
            .unwrap()
            .with_cache(ResponseCache::new(cache_dir)),
    );
    let source: Arc<dyn PageSource> = Arc::new(HtmlSource::new(HtmlOptions::default()).unwrap());
    IndexHarvester::new(fetcher, source, settings).with_sink(sink)
}

struct Dirs {
    cache: TempDir,
    output: TempDir,
}

fn dirs() -> Dirs {
    Dirs {
        cache: tempfile::tempdir().unwrap(),
        output: tempfile::tempdir().unwrap(),
    }
}

#[tokio::test]
async fn two_page_index_is_written_to_one_csv() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&people(1, 50), Some(1))).await;
    mount_page(&server, 1, results_page(&people(2, 50), Some(1))).await;

    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let harvester = html_harvester(dirs.cache.path(), HarvestSettings::immediate(), sink.clone());
    let report = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .expect("harvest ok");

    assert_eq!(report.path, dirs.output.path().join("test-index.csv"));
    assert_eq!(report.pages, 2);
    assert_eq!(report.rows_written, 100);
    assert_eq!(report.columns, vec!["Name", "Year"]);

    let csv = std::fs::read_to_string(&report.path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 101);
    assert_eq!(lines[0], "Name,Year");
    assert_eq!(lines[1], "Person 1-0,1800");
    assert_eq!(lines[100], "Person 2-49,1849");

    assert_eq!(sink.pages_harvested(), vec![1, 2]);
    // Discovery doubles as page 1.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    // Namespace cleared once the CSV is in place.
    assert!(!dirs.cache.path().join("9").exists());
}

#[tokio::test]
async fn rerun_produces_identical_bytes() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&people(1, 20), Some(1))).await;
    mount_page(&server, 1, results_page(&people(2, 20), Some(1))).await;

    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let harvester = html_harvester(dirs.cache.path(), HarvestSettings::immediate(), sink);
    let index = test_index(&server, "Test Index", 9);

    let first = harvester.run(&index, dirs.output.path()).await.unwrap();
    let first_bytes = std::fs::read(&first.path).unwrap();
    let second = harvester.run(&index, dirs.output.path()).await.unwrap();
    let second_bytes = std::fs::read(&second.path).unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn soft_failure_holds_the_page_until_it_succeeds() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&people(1, 10), Some(3))).await;
    mount_page(&server, 1, results_page(&people(2, 10), Some(3))).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(BUSY_PAGE, "text/html"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, 2, results_page(&people(3, 10), Some(3))).await;
    mount_page(&server, 3, results_page(&people(4, 10), Some(3))).await;

    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let harvester = html_harvester(dirs.cache.path(), HarvestSettings::immediate(), sink.clone());
    let report = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .unwrap();

    assert_eq!(report.rows_written, 40);
    assert_eq!(sink.pages_harvested(), vec![1, 2, 3, 4]);
    assert_eq!(sink.soft_failures(), vec![(3, 1)]);

    let csv = std::fs::read_to_string(&report.path).unwrap();
    for i in 0..10 {
        assert_eq!(csv.matches(&format!("Person 3-{i},")).count(), 1);
    }
}

#[tokio::test]
async fn soft_failure_during_discovery_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(BUSY_PAGE, "text/html"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, 0, results_page(&people(1, 5), None)).await;

    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let harvester = html_harvester(dirs.cache.path(), HarvestSettings::immediate(), sink.clone());
    let report = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .unwrap();

    assert_eq!(report.rows_written, 5);
    assert_eq!(sink.soft_failures(), vec![(1, 1), (1, 2)]);
    assert!(sink.events().contains(&HarvestEvent::PagesDiscovered {
        title: "Test Index".into(),
        total_pages: 1,
    }));
}

#[tokio::test]
async fn retry_ceiling_fails_the_index_without_writing() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&people(1, 5), Some(1))).await;
    mount_page(&server, 1, BUSY_PAGE.to_string()).await;

    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let settings = HarvestSettings {
        max_soft_retries: Some(2),
        ..HarvestSettings::immediate()
    };
    let harvester = html_harvester(dirs.cache.path(), settings, sink.clone());
    let err = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarvestError::RetriesExhausted { page: 2, attempts: 3 }
    ));
    assert_eq!(sink.soft_failures().len(), 3);
    assert!(!dirs.output.path().join("test-index.csv").exists());
}

#[tokio::test]
async fn duplicate_rows_across_pages_are_written_once() {
    let server = MockServer::start().await;
    let a = ("Alice".to_string(), "1850".to_string());
    let b = ("Bob".to_string(), "1851".to_string());
    let c = ("Carol".to_string(), "1852".to_string());
    mount_page(&server, 0, results_page(&[a.clone(), b.clone()], Some(1))).await;
    mount_page(&server, 1, results_page(&[b, c], Some(1))).await;

    let dirs = dirs();
    let harvester = html_harvester(
        dirs.cache.path(),
        HarvestSettings::immediate(),
        Arc::new(RecordingSink::default()),
    );
    let report = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .unwrap();

    let csv = std::fs::read_to_string(&report.path).unwrap();
    assert_eq!(csv, "Name,Year\nAlice,1850\nBob,1851\nCarol,1852\n");
}

#[tokio::test]
async fn link_columns_are_added_where_links_appear() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&[("Alice".to_string(), "1850".to_string())], Some(1))).await;
    let linked = r#"<table><thead><tr><th>Name</th><th>Year</th></tr></thead><tbody>
        <tr><td><a href="/item/2">Bob</a></td><td>1851</td></tr></tbody></table>"#;
    mount_page(&server, 1, linked.to_string()).await;

    let dirs = dirs();
    let harvester = html_harvester(
        dirs.cache.path(),
        HarvestSettings::immediate(),
        Arc::new(RecordingSink::default()),
    );
    let report = harvester
        .run(&test_index(&server, "Test Index", 9), dirs.output.path())
        .await
        .unwrap();

    assert_eq!(report.columns, vec!["Name", "Year", "Name url"]);
    let csv = std::fs::read_to_string(&report.path).unwrap();
    assert_eq!(
        csv,
        format!(
            "Name,Year,Name url\nAlice,1850,\nBob,1851,{}/item/2\n",
            server.uri()
        )
    );
}

#[tokio::test]
async fn run_all_starts_at_the_requested_position() {
    let server = MockServer::start().await;
    mount_page(&server, 0, results_page(&people(1, 3), None)).await;

    let catalog = vec![
        test_index(&server, "First Index", 1),
        test_index(&server, "Second Index", 2),
        test_index(&server, "Third Index", 3),
    ];
    let dirs = dirs();
    let sink = Arc::new(RecordingSink::default());
    let harvester = html_harvester(dirs.cache.path(), HarvestSettings::immediate(), sink.clone());

    let summary = run_all(&harvester, &catalog, 1, dirs.output.path())
        .await
        .unwrap();

    assert_eq!(summary.start_index, 1);
    assert_eq!(summary.next_index, 3);
    let titles: Vec<&str> = summary.reports.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Second Index", "Third Index"]);
    assert!(!dirs.output.path().join("first-index.csv").exists());
    assert!(dirs.output.path().join("third-index.csv").exists());

    let started: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HarvestEvent::IndexStarted { position, total, .. } => {
                assert_eq!(total, 3);
                Some(position)
            }
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![1, 2]);
}

#[tokio::test]
async fn run_all_past_the_end_harvests_nothing() {
    let server = MockServer::start().await;
    let catalog = vec![test_index(&server, "Only Index", 1)];
    let dirs = dirs();
    let harvester = html_harvester(
        dirs.cache.path(),
        HarvestSettings::immediate(),
        Arc::new(RecordingSink::default()),
    );

    let summary = run_all(&harvester, &catalog, 5, dirs.output.path())
        .await
        .unwrap();

    assert!(summary.reports.is_empty());
    assert_eq!(summary.next_index, 5);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn run_all_stops_at_the_first_hard_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("id", "2"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, 0, results_page(&people(1, 3), None)).await;

    let catalog = vec![
        test_index(&server, "First Index", 1),
        test_index(&server, "Broken Index", 2),
        test_index(&server, "Third Index", 3),
    ];
    let dirs = dirs();
    let harvester = html_harvester(
        dirs.cache.path(),
        HarvestSettings::immediate(),
        Arc::new(RecordingSink::default()),
    );

    let err = run_all(&harvester, &catalog, 0, dirs.output.path())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Fetch(_)));
    assert!(dirs.output.path().join("first-index.csv").exists());
    assert!(!dirs.output.path().join("third-index.csv").exists());
}

fn graphql_page(page: u32, total_pages: u32) -> serde_json::Value {
    let rows: Vec<_> = (0..3)
        .map(|i| {
            json!({"columns": [
                {"content": format!("Passenger {page}-{i}")},
                {"content": "Details", "link": format!("/record/{page}{i}")}
            ]})
        })
        .collect();
    json!({"data": {"indexSearch": {
        "headers": [{"title": "Passenger"}, {"title": ""}],
        "rows": rows,
        "pagination": {"page": page, "pageSize": 3, "totalPages": total_pages}
    }}})
}

#[tokio::test]
async fn graphql_index_survives_an_error_payload() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/graphql", server.uri());
    for page in 1..=2 {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({"variables": {"pagination": {"page": page}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(graphql_page(page, 2)))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"pagination": {"page": 2}}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": null, "errors": [{"message": "busy"}]})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let dirs = dirs();
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        ReqwestFetcher::new(fetch_settings())
            .unwrap()
            .with_cache(ResponseCache::new(dirs.cache.path()))
            .with_cache_filter(GraphQlSource::cache_filter()),
    );
    let source: Arc<dyn PageSource> = Arc::new(
        GraphQlSource::new(GraphQlOptions {
            endpoint,
            page_size: 3,
            ..GraphQlOptions::default()
        })
        .unwrap(),
    );
    let sink = Arc::new(RecordingSink::default());
    let harvester =
        IndexHarvester::new(fetcher, source, HarvestSettings::immediate()).with_sink(sink.clone());
    let index = IndexDescriptor {
        title: "Assisted Immigrants".into(),
        key: "assisted-immigrants".into(),
        search: None,
        category: None,
    };

    let report = harvester.run(&index, dirs.output.path()).await.unwrap();

    assert_eq!(report.path, dirs.output.path().join("assisted-immigrants.csv"));
    assert_eq!(report.rows_written, 6);
    assert_eq!(sink.soft_failures(), vec![(2, 1)]);
    let csv = std::fs::read_to_string(&report.path).unwrap();
    assert!(csv.starts_with("Passenger,Details\nPassenger 1-0,"));
    assert!(csv.contains(&format!("Passenger 2-2,{}/record/22", server.uri())));
    // GraphQL responses stay cached; only good payloads were stored.
    assert!(dirs.cache.path().join("assisted-immigrants").is_dir());
}
