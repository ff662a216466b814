use pretty_assertions::assert_eq;
use sensing_core::{
    config::UploadConfig,
    error::ErrorKind,
    upload::{BatchItem, HttpBackend, ReadingBackend},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

/// One request as it arrived on the socket.
struct Captured {
    /// Request line and headers, lowercased.
    head: String,
    body: Vec<u8>,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}:");
        self.head
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .map(str::trim)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Serves exactly one request with `status` and a JSON `body`.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the headers ended");
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
        let mut request = Captured {
            head,
            body: buf[head_end + 4..].to_vec(),
        };

        let length: Option<usize> = request
            .header("content-length")
            .and_then(|value| value.parse().ok());
        loop {
            let done = match length {
                Some(length) => request.body.len() >= length,
                None => request.body.ends_with(b"0\r\n\r\n"),
            };
            if done {
                break;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.body.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (url, server)
}

fn backend(url: &str) -> HttpBackend {
    HttpBackend::new(&UploadConfig {
        base_url: format!("{url}/"),
        request_timeout_ms: 5_000,
        ..UploadConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn batch_post_wire_format() {
    let (url, server) = serve_once("200 OK", r#"[{"id":10,"data":"p1","localId":"abc"}]"#).await;
    let items = vec![BatchItem {
        sensor_type: "Accelerometer".into(),
        data: "p1".into(),
        timestamp: "1000".into(),
        local_id: "abc".into(),
    }];

    let acks = backend(&url).post_batch("secret", &items).await.unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].id, 10);
    assert_eq!(acks[0].local_id.as_deref(), Some("abc"));

    let request = server.await.unwrap();
    assert_eq!(request.request_line(), "post /v1/reading/batch http/1.1");
    assert_eq!(request.header("authorization"), Some("bearer secret"));
    assert_eq!(request.header("content-type"), Some("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!([{
            "sensorType": "Accelerometer",
            "data": "p1",
            "timestamp": "1000",
            "localId": "abc",
        }])
    );
}

#[tokio::test]
async fn file_upload_wire_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.aac");
    std::fs::write(&path, b"AAC!").unwrap();
    let (url, server) = serve_once("200 OK", "").await;

    backend(&url)
        .post_file("secret", 77, &path, "audio/aac")
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.request_line(), "post /v1/reading/77/file http/1.1");
    assert_eq!(request.header("authorization"), Some("bearer secret"));
    assert!(request
        .header("content-type")
        .is_some_and(|value| value.starts_with("multipart/form-data; boundary=")));

    let body = String::from_utf8_lossy(&request.body);
    let lowered = body.to_lowercase();
    assert!(lowered.contains(r#"form-data; name="file"; filename="f.aac""#));
    assert!(lowered.contains("content-type: audio/aac"));
    assert!(body.contains("AAC!"));
}

#[tokio::test]
async fn server_error_is_transient() {
    let (url, server) = serve_once("503 Service Unavailable", "").await;
    let items = vec![BatchItem {
        sensor_type: "A".into(),
        data: "p".into(),
        timestamp: "1".into(),
        local_id: "x".into(),
    }];

    let err = backend(&url).post_batch("secret", &items).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.is_retryable());
    server.await.unwrap();
}
