use std::io;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};

use wxchart_dl::app::{App, FetchRequest};
use wxchart_dl::config::ConfigLoader;
use wxchart_dl::credentials::Credentials;
use wxchart_dl::error::ChartError;
use wxchart_dl::output::JsonOutput;
use wxchart_dl::queue::Clock;
use wxchart_dl::store::Store;
use wxchart_dl::transport::{ChartTransport, TransportResponse};

const CATALOG: &str = r#"{
    "sources": [
        {
            "id": "open_chart",
            "name": "Open chart",
            "url": "http://charts.test/open_{stamp}.png",
            "image": "open_{stamp}.png",
            "sidecar_file": "open_{stamp}.xml",
            "time_format": "%Y%m%d%H%M",
            "interval_secs": 300,
            "expected_kib": 20,
            "sidecar": "{file} {time}"
        },
        {
            "id": "gated_chart",
            "name": "Gated chart",
            "url": "http://members.test/gated_{stamp}.png",
            "image": "gated_{stamp}.png",
            "sidecar_file": "gated_{stamp}.xml",
            "time_format": "%Y%m%d%H%M",
            "interval_secs": 300,
            "expected_kib": 20,
            "sidecar": "{file} {time}",
            "realm": "http://members.test/"
        }
    ]
}"#;

/// Serves a fixed status for every URL and records each request.
#[derive(Clone)]
struct StatusTransport {
    status: u16,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StatusTransport {
    fn new(status: u16) -> Self {
        Self {
            status,
            calls: Arc::default(),
        }
    }
}

impl ChartTransport for StatusTransport {
    async fn open(&self, url: &str) -> Result<TransportResponse, ChartError> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(TransportResponse {
            status: self.status,
            content_length: None,
            body: Box::pin(io::Cursor::new(vec![1u8; 4000])),
        })
    }
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        // 2024-01-01 12:03:00 UTC
        DateTime::from_timestamp(1_704_110_580, 0).unwrap()
    }
}

fn app(
    transport: StatusTransport,
    credentials: Credentials,
) -> (App<StatusTransport>, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let catalog = ConfigLoader::parse(CATALOG).unwrap();
    let app = App::new(catalog, credentials, Store::new_with_root(root), transport);
    (app, temp)
}

fn request(id: &str, count: u32) -> FetchRequest {
    FetchRequest {
        id: id.parse().unwrap(),
        count,
    }
}

#[test]
fn list_marks_gated_sources_unavailable() {
    let (app, _temp) = app(StatusTransport::new(200), Credentials::empty());
    let result = app.list();

    assert_eq!(result.sources.len(), 2);
    assert!(result.sources[0].available);
    assert!(!result.sources[1].available);
    assert_eq!(result.sources[1].realm.as_deref(), Some("http://members.test/"));
    JsonOutput::print_list(&result).unwrap();
}

#[tokio::test]
async fn fetch_downloads_requested_slots() {
    let transport = StatusTransport::new(200);
    let (app, temp) = app(transport.clone(), Credentials::empty());
    let (mut downloader, _handle) = app.downloader(FixedClock);

    let result = app
        .fetch(&[request("open_chart", 2)], &mut downloader, &JsonOutput)
        .await
        .unwrap();

    assert_eq!(result.downloaded, 2);
    assert_eq!(result.aborted, 0);
    assert_eq!(
        *transport.calls.lock().unwrap(),
        vec![
            "http://charts.test/open_202401011200.png",
            "http://charts.test/open_202401011155.png",
        ]
    );
    assert!(temp.path().join("open_202401011155.xml").exists());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["items"][0]["status"], "finished");
    assert_eq!(json["items"][0]["source"], "open_chart");
}

#[tokio::test]
async fn unknown_or_gated_sources_fail_before_downloading() {
    let transport = StatusTransport::new(200);
    let (app, _temp) = app(transport.clone(), Credentials::empty());
    let (mut downloader, _handle) = app.downloader(FixedClock);

    let err = app
        .fetch(
            &[request("open_chart", 1), request("missing", 1)],
            &mut downloader,
            &JsonOutput,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ChartError::UnknownSource(_));

    let err = app
        .fetch(&[request("gated_chart", 1)], &mut downloader, &JsonOutput)
        .await
        .unwrap_err();
    assert_matches!(err, ChartError::MissingCredentials { realm, .. } if realm == "http://members.test/");
    assert!(transport.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn aborted_items_are_counted() {
    let credentials = Credentials::parse("me:pw:http://members.test/\n");
    let (app, _temp) = app(StatusTransport::new(403), credentials);
    let (mut downloader, _handle) = app.downloader(FixedClock);

    let result = app
        .fetch(&[request("gated_chart", 3)], &mut downloader, &JsonOutput)
        .await
        .unwrap();

    assert_eq!(result.aborted, 1);
    assert_eq!(result.downloaded, 0);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["items"][0]["status"], "aborted");
    assert!(json["items"][0]["reason"].as_str().unwrap().contains("403"));
}
