//! Integration tests for the harvester
//!
//! These tests use wiremock to serve listing, observation and location pages
//! and drive discovery, scraping and export end-to-end against the real HTTP
//! stack and the real state files.

use chrono::Utc;
use obs_harvest::config::{parse_config, Config};
use obs_harvest::crawler::{
    build_http_client, HttpListingSource, HttpPageExtractor, LinkDiscoverer, ScrapeExecutor,
    ScrapeReport,
};
use obs_harvest::output::{export_observations, load_statistics, ErrorLog};
use obs_harvest::state::{LinkSet, LinkStateReconciler};
use obs_harvest::storage::{scan_observations, LinkSetStore, LinkStateStore, ObservationStore};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = "/species/197583/photos/";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, data_dir: &TempDir, max_attempts: u32) -> Config {
    parse_config(&format!(
        r#"
[source]
base-url = "{base}"
default-listing-url = "{base}{LISTING}?date_after=2022-01-01"

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[discovery]
default-page-limit = 0
min-delay-ms = 0
max-delay-ms = 0
backoff-base-ms = 0
backoff-max-ms = 0

[scrape]
max-attempts = {max_attempts}
request-timeout-secs = 5

[output]
data-dir = "{dir}"
"#,
        base = server.uri(),
        dir = data_dir.path().display(),
    ))
    .expect("test config is valid")
}

fn listing_page(links: &[&str], last: bool) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}"><img src="/media/photo.jpg"></a>"#, l))
        .collect();
    let last_class = if last { "last disabled" } else { "last" };
    format!(
        r#"<html><body>
        <div class="photos">{anchors}<a href="/species/197583/">species</a></div>
        <ul class="pagination"><li class="{last_class}"><a href="?page=99">last</a></li></ul>
        </body></html>"#
    )
}

fn observation_page(number_cell: &str) -> String {
    format!(
        r#"<html><body>
        <table id="observation_details">
          <tr><th>Date</th><td>2023-06-02 14:10</td></tr>
          <tr><th>Number</th><td>{number_cell}</td></tr>
          <tr><th>Life stage</th><td>imago</td></tr>
          <tr><th>Location</th><td><a href="/locations/10/">Hallerbos</a></td></tr>
          <tr><th>Activity</th><td>foraging</td></tr>
        </table>
        <span class="teramap-coordinates" title="WGS 84">
          <span class="teramap-coordinates-coords">50.6712, 4.2603</span>
        </span>
        </body></html>"#
    )
}

const LOCATION_PAGE: &str = r#"<html><body><table class="table-compact">
  <tr><th>Name</th><td>Hallerbos</td></tr>
  <tr><th>Country</th><td><a href="/countries/be/">Belgium</a></td></tr>
  <tr><th>Province</th><td><a href="/provinces/vb/">Vlaams-Brabant</a></td></tr>
</table></body></html>"#;

async fn mount_page(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &["/observation/1/", "/observation/2/", "/observation/3/"],
            false,
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &["/observation/3/", "/observation/4/"],
            true,
        )))
        .mount(server)
        .await;

    mount_page(server, "/observation/1/", observation_page("1")).await;
    mount_page(
        server,
        "/observation/2/",
        observation_page(r#"1 <i class="icon" title="female"></i>"#),
    )
    .await;
    mount_page(server, "/observation/3/", observation_page("2 imago 1 larva")).await;
    mount_page(server, "/observation/4/", observation_page("3")).await;
    mount_page(server, "/locations/10/", LOCATION_PAGE.to_string()).await;
}

async fn run_discovery(config: &Config, log: &ErrorLog) -> obs_harvest::crawler::DiscoveryReport {
    let client = build_http_client(&config.user_agent, 5).unwrap();
    let source = HttpListingSource::new(client, config.source.link_prefix.clone());
    let store = LinkSetStore::from_config(&config.output);
    let seed = Url::parse(&config.source.default_listing_url).unwrap();

    LinkDiscoverer::new(&store, &source, log, &config.discovery)
        .discover(&seed, 0, &CancellationToken::new())
        .await
        .unwrap()
}

async fn run_scrape(config: &Config, log: Arc<ErrorLog>) -> ScrapeReport {
    let store = LinkSetStore::from_config(&config.output);
    let queue = LinkStateReconciler::new(&store, config.scrape.max_attempts)
        .reconcile()
        .await
        .unwrap();

    let client = build_http_client(&config.user_agent, 5).unwrap();
    let base = Url::parse(&config.source.base_url).unwrap();
    let extractor = HttpPageExtractor::new(client, base, log.clone());
    let mut observations = ObservationStore::open(config.output.observations_path())
        .await
        .unwrap();

    ScrapeExecutor::new(&store, &mut observations, &extractor, &log)
        .run(queue, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_discover_scrape_export() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 5);
    let store = LinkSetStore::from_config(&config.output);

    let log = Arc::new(ErrorLog::new(config.output.error_log_path(), Utc::now()));
    let discovery = run_discovery(&config, &log).await;
    assert_eq!(discovery.pages_visited, 2);
    assert_eq!(discovery.new_links, 4);
    assert_eq!(
        store.load_pending().await.unwrap().as_slice(),
        &[
            "/observation/1/",
            "/observation/2/",
            "/observation/3/",
            "/observation/4/"
        ]
    );

    let report = run_scrape(&config, log.clone()).await;
    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 1);

    let scan = scan_observations(&config.output.observations_path())
        .await
        .unwrap();
    let links: Vec<&str> = scan.records.iter().map(|r| r.link.as_str()).collect();
    assert_eq!(links, vec!["/observation/1/", "/observation/2/", "/observation/4/"]);
    assert_eq!(scan.records[1].sex.as_deref(), Some("female"));
    assert_eq!(scan.records[0].country.as_deref(), Some("Belgium"));
    assert_eq!(scan.records[0].date, "02-06-23");

    // The multi-individual observation is failed, never recorded
    assert_eq!(
        store.load_failed().await.unwrap().as_slice(),
        &["/observation/3/"]
    );
    assert_eq!(
        store.load_pending().await.unwrap().as_slice(),
        &["/observation/3/"]
    );

    let kept = log.finalize().await.unwrap().expect("error log kept");
    let content = std::fs::read_to_string(kept).unwrap();
    assert!(content.contains("[Scraping observation failed]: Item /observation/3/:"));

    let export = export_observations(&config.output.observations_path(), &config.output.export_path())
        .await
        .unwrap();
    assert_eq!(export.rows, 3);
    let csv = std::fs::read_to_string(config.output.export_path()).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.lines().nth(1).unwrap().starts_with("02-06-23,22,1,"));
}

#[tokio::test]
async fn test_resume_skips_recorded_links() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    Mock::given(method("GET"))
        .and(path("/observation/9/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(observation_page("1")))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 5);
    let store = LinkSetStore::from_config(&config.output);

    // A crash after appending /observation/9/ but before the pending file was
    // rewritten, leaving a half-written trailing line as well
    let pending: LinkSet = ["/observation/9/", "/observation/1/"].into_iter().collect();
    store.save_pending(&pending).await.unwrap();
    let recorded = format!(
        "{}\n{{\"link\":\"/observation/1/\",\"da",
        serde_json::json!({
            "link": "/observation/9/",
            "date": "01-06-23",
            "numberText": "1",
            "sex": null,
            "lifeStage": "imago",
            "country": null,
            "location": null,
            "province": null,
            "xEa": null,
            "yN": null,
            "latitude": null,
            "longitude": null,
            "activity": "foraging",
            "onIn": null,
            "hasComments": false,
            "url": format!("{}/observation/9/", server.uri()),
        })
    );
    std::fs::write(config.output.observations_path(), recorded).unwrap();

    let log = Arc::new(ErrorLog::new(config.output.error_log_path(), Utc::now()));
    let report = run_scrape(&config, log.clone()).await;
    assert_eq!(report.total, 1);
    assert_eq!(report.completed, 1);
    assert!(log.finalize().await.unwrap().is_none());

    let scan = scan_observations(&config.output.observations_path())
        .await
        .unwrap();
    let links: Vec<&str> = scan.records.iter().map(|r| r.link.as_str()).collect();
    assert_eq!(links, vec!["/observation/9/", "/observation/1/"]);
    assert_eq!(scan.malformed.len(), 1);
    assert!(store.load_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_attempt_ceiling_and_requeue() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, 1);
    let store = LinkSetStore::from_config(&config.output);

    store
        .save_pending(&["/observation/3/"].into_iter().collect())
        .await
        .unwrap();
    let log = Arc::new(ErrorLog::new(config.output.error_log_path(), Utc::now()));
    let first = run_scrape(&config, log.clone()).await;
    assert_eq!(first.failed, 1);

    // The next reconciliation parks the link instead of retrying it forever
    let second = run_scrape(&config, log.clone()).await;
    assert_eq!(second.total, 0);
    let stats = load_statistics(&store).await.unwrap();
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.queued_next_run, 0);

    let moved = LinkStateReconciler::new(&store, config.scrape.max_attempts)
        .requeue_exhausted()
        .await
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(
        store.load_pending().await.unwrap().as_slice(),
        &["/observation/3/"]
    );
    assert!(store.load_exhausted().await.unwrap().is_empty());
}
