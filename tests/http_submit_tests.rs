use std::io::Read;
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{json, Value};

use transcode_tune::adapters::HttpSubmitAdapter;
use transcode_tune::ports::{SubmissionRequest, SubmitPort};
use transcode_tune::DomainError;

/// Answer exactly one request, returning the received body from the join handle
fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let handle = std::thread::spawn(move || {
        let mut request = server.recv().unwrap();
        let mut received = String::new();
        request.as_reader().read_to_string(&mut received).unwrap();
        let response = tiny_http::Response::from_string(body).with_status_code(status);
        request.respond(response).unwrap();
        received
    });
    (format!("http://127.0.0.1:{}/api/jobs", port), handle)
}

fn request() -> SubmissionRequest {
    SubmissionRequest {
        run_id: "20240611_142233".to_string(),
        index: 4,
        configuration: json!({"encoder": {"bitrate": 3000}}),
    }
}

#[tokio::test]
async fn test_submission_id_from_response_field() {
    let (url, server) = serve_once(201, r#"{"job": {"id": "tx-981"}}"#);
    let adapter =
        HttpSubmitAdapter::new(url, Duration::from_secs(5), Some("job.id".to_string())).unwrap();

    let id = adapter.submit(&request()).await.unwrap();
    assert_eq!(id, "tx-981");

    let received: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(received, json!({"encoder": {"bitrate": 3000}}));
}

#[tokio::test]
async fn test_submission_id_is_synthesized_without_field() {
    let (url, server) = serve_once(200, "accepted");
    let adapter = HttpSubmitAdapter::new(url, Duration::from_secs(5), None).unwrap();

    let id = adapter.submit(&request()).await.unwrap();
    assert_eq!(id, "20240611_142233-004");
    server.join().unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_submission_error() {
    let (url, server) = serve_once(500, "encoder pool exhausted");
    let adapter = HttpSubmitAdapter::new(url, Duration::from_secs(5), None).unwrap();

    let err = adapter.submit(&request()).await.unwrap_err();
    match err {
        DomainError::Submission(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("encoder pool exhausted"));
        }
        other => panic!("unexpected error: {}", other),
    }
    server.join().unwrap();
}

#[tokio::test]
async fn test_missing_id_field_is_submission_error() {
    let (url, server) = serve_once(200, r#"{"status": "queued"}"#);
    let adapter =
        HttpSubmitAdapter::new(url, Duration::from_secs(5), Some("job.id".to_string())).unwrap();

    let err = adapter.submit(&request()).await.unwrap_err();
    assert!(matches!(err, DomainError::Submission(_)));
    server.join().unwrap();
}

#[tokio::test]
async fn test_unreachable_service_is_submission_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let adapter = HttpSubmitAdapter::new(
        format!("http://127.0.0.1:{}/api/jobs", port),
        Duration::from_secs(2),
        None,
    )
    .unwrap();

    let err = adapter.submit(&request()).await.unwrap_err();
    assert!(matches!(err, DomainError::Submission(_)));
}
