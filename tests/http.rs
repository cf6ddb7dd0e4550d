use once_cell::sync::Lazy;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const UPLOAD_LIMIT: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    source: String,
    notices: Vec<Value>,
    columns: Vec<Value>,
    rows: Vec<Vec<Value>>,
    numeric_columns: Vec<String>,
    options: Option<Value>,
    selection: Option<Value>,
    view: Value,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/dashboard")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_data_dashboard"))
        .env("PORT", port.to_string())
        .env("DASHBOARD_MAX_UPLOAD_BYTES", UPLOAD_LIMIT.to_string())
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

/// A client with its own cookie jar, i.e. its own dashboard session.
fn session_client() -> Client {
    Client::builder().cookie_store(true).build().unwrap()
}

async fn dashboard(client: &Client, server: &TestServer, query: &str) -> DashboardResponse {
    client
        .get(format!("{}/api/dashboard?{query}", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn upload(client: &Client, server: &TestServer, csv: &str) -> reqwest::Response {
    let part = Part::bytes(csv.as_bytes().to_vec())
        .file_name("data.csv")
        .mime_str("text/csv")
        .unwrap();
    client
        .post(format!("{}/upload", server.base_url))
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_sample_dashboard_has_line_chart() {
    let server = shared_server().await;
    let client = session_client();

    let body = dashboard(&client, &server, "x=date&y=sales").await;

    assert_eq!(body.source, "sample");
    assert!(body.notices.is_empty());
    assert_eq!(body.rows.len(), 12);
    assert_eq!(body.columns.len(), 4);
    assert_eq!(body.numeric_columns, vec!["sales", "cost"]);
    assert!(body.options.is_some());
    assert_eq!(body.view["status"], "ready");
    assert_eq!(body.view["chart"]["kind"], "line");

    let points = body.view["chart"]["points"].as_array().unwrap();
    assert_eq!(points.len(), 12);
    for (point, row) in points.iter().zip(&body.rows) {
        assert_eq!(point["index"], row[0]);
    }
    assert_eq!(body.view["summary"]["count"], 12);
}

#[tokio::test]
async fn http_sample_is_stable_within_a_session() {
    let server = shared_server().await;
    let client = session_client();

    let first = dashboard(&client, &server, "").await;
    let second = dashboard(&client, &server, "chart=bar&x=city&y=cost").await;
    assert_eq!(first.rows, second.rows);
    assert_eq!(second.view["chart"]["title"], "cost berdasarkan city");
}

#[tokio::test]
async fn http_unknown_source_falls_back_to_sample() {
    let server = shared_server().await;
    let client = session_client();

    let response = client
        .get(format!("{}/api/dashboard?source=bogus", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: DashboardResponse = response.json().await.unwrap();
    assert_eq!(body.source, "sample");
    assert!(body.notices.is_empty());
    assert_eq!(body.rows.len(), 12);
}

#[tokio::test]
async fn http_upload_mode_without_file_falls_back_to_sample() {
    let server = shared_server().await;
    let client = session_client();

    let body = dashboard(&client, &server, "source=upload").await;
    assert_eq!(body.source, "upload");
    assert_eq!(body.notices.len(), 1);
    assert_eq!(body.notices[0]["level"], "warning");
    assert_eq!(body.rows.len(), 12);
}

#[tokio::test]
async fn http_uploaded_csv_is_filtered_by_city() {
    let server = shared_server().await;
    let client = session_client();
    client.get(&server.base_url).send().await.unwrap();

    let csv = "date,city,sales\n2025-01-31,Bandung,120\n2025-02-28,Jakarta,300\n2025-03-31,Bandung,180\n";
    let response = upload(&client, &server, csv).await;
    assert!(response.status().is_success());

    let body = dashboard(
        &client,
        &server,
        "source=upload&chart=bar&x=date&y=sales&city=Bandung",
    )
    .await;
    assert!(body.notices.is_empty());
    assert_eq!(body.rows.len(), 3);
    assert_eq!(body.selection.as_ref().unwrap()["city"], "Bandung");
    assert_eq!(
        body.options.as_ref().unwrap()["cities"],
        serde_json::json!(["Bandung", "Jakarta"])
    );
    assert_eq!(body.view["row_count"], 2);
    assert_eq!(body.view["chart"]["title"], "sales berdasarkan date");
    let labels: Vec<_> = body.view["chart"]["bars"]
        .as_array()
        .unwrap()
        .iter()
        .map(|bar| bar["label"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["2025-01-31", "2025-03-31"]);
    assert_eq!(body.view["summary"]["mean"], 150.0);

    // Sample mode ignores the stored file.
    let sample = dashboard(&client, &server, "source=sample").await;
    assert_eq!(sample.rows.len(), 12);
}

#[tokio::test]
async fn http_upload_without_numeric_columns_shows_error_only() {
    let server = shared_server().await;
    let client = session_client();
    client.get(&server.base_url).send().await.unwrap();

    let response = upload(&client, &server, "name,city\nAna,Bandung\nBudi,Surabaya\n").await;
    assert!(response.status().is_success());

    let body = dashboard(&client, &server, "source=upload").await;
    assert_eq!(body.view["status"], "no_numeric_columns");
    assert!(body.options.is_none());
    assert!(body.selection.is_none());
    assert!(body.numeric_columns.is_empty());

    let html = client
        .get(format!("{}/?source=upload", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("There are no numeric columns"));
    assert!(!html.contains(r#"name="chart""#));
}

#[tokio::test]
async fn http_clearing_upload_restores_warning() {
    let server = shared_server().await;
    let client = session_client();
    client.get(&server.base_url).send().await.unwrap();

    let response = upload(&client, &server, "v\n1\n2\n").await;
    assert!(response.status().is_success());
    let body = dashboard(&client, &server, "source=upload").await;
    assert_eq!(body.rows.len(), 2);

    let response = client
        .post(format!("{}/upload/clear", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body = dashboard(&client, &server, "source=upload").await;
    assert_eq!(body.rows.len(), 12);
    assert_eq!(body.notices[0]["level"], "warning");
}

#[tokio::test]
async fn http_upload_requires_file_field() {
    let server = shared_server().await;
    let client = session_client();

    let response = client
        .post(format!("{}/upload", server.base_url))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_upload_over_limit_is_rejected() {
    let server = shared_server().await;
    let client = session_client();

    let csv = format!("v\n{}", "1\n".repeat(UPLOAD_LIMIT / 2 + 1024));
    let response = upload(&client, &server, &csv).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn http_index_renders_page() {
    let server = shared_server().await;
    let client = session_client();

    let response = client.get(&server.base_url).send().await.unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().get("set-cookie").is_some());

    let html = response.text().await.unwrap();
    assert!(html.contains("Simple Data Visualization Dashboard"));
    assert!(html.contains("Data in use"));
    assert!(html.contains("Summary Statistics"));
}
