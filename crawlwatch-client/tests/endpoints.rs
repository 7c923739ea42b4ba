use crawlwatch_client::{ApiClient, ApiKey, ClientError};
use crawlwatch_core::domain::job::{JobId, JobKind, JobStatus};
use futures::StreamExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn job(id: &str) -> JobId {
    JobId::new(id).unwrap()
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(server.uri()).with_api_key(ApiKey::new("test-key"))
}

#[tokio::test]
async fn fetch_status_normalizes_crawl_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/crawl/job-1"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"started","completed_pages":3,"total_pages":10}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let update = client(&server)
        .fetch_status(&job("job-1"), JobKind::Crawl)
        .await
        .expect("status ok");

    assert_eq!(update.status, JobStatus::Started);
    assert_eq!(update.completed, Some(3));
    assert_eq!(update.total, Some(10));
}

#[tokio::test]
async fn fetch_status_uses_kind_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch/b-7"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"completed","completed_urls":4,"total_urls":4}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let update = client(&server)
        .fetch_status(&job("b-7"), JobKind::Batch)
        .await
        .expect("status ok");

    assert_eq!(update.status, JobStatus::Completed);
    assert_eq!(update.completed, Some(4));
}

#[tokio::test]
async fn fetch_status_keeps_job_id_in_one_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/crawl/team%2F42%3Fx=1%23top"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"running","completed_pages":1}"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let update = client(&server)
        .fetch_status(&job("team/42?x=1#top"), JobKind::Crawl)
        .await
        .expect("status ok");

    assert_eq!(update.status, JobStatus::Running);
}

#[tokio::test]
async fn fetch_status_does_not_escape_jobs_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/crawl/..%2F..%2Fadmin"))
        .respond_with(ResponseTemplate::new(404).set_body_string("job not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_status(&job("../../admin"), JobKind::Crawl)
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn fetch_status_maps_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_status(&job("job-1"), JobKind::Scrape)
        .await
        .unwrap_err();

    assert!(err.is_auth(), "unexpected error: {err}");
}

#[tokio::test]
async fn fetch_status_maps_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("job not found"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_status(&job("missing"), JobKind::Map)
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn fetch_status_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_status(&job("job-1"), JobKind::Crawl)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(err.is_server_error());
}

#[tokio::test]
async fn fetch_status_garbage_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch_status(&job("job-1"), JobKind::Crawl)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ParseError(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn missing_api_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = ApiClient::new(server.uri())
        .fetch_status(&job("job-1"), JobKind::Crawl)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::MissingCredential));
}

#[tokio::test]
async fn job_stream_yields_frames_with_token_query() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"status\":\"running\",\"completed_pages\":1,\"total_pages\":4}\n\n",
        "event: progress\n",
        "data: {\"status\":\"completed\",\"completed_pages\":4,\"total_pages\":4,\"done\":true}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/jobs/job-1/stream"))
        .and(query_param("token", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = client(&server)
        .open_job_stream(&job("job-1"))
        .await
        .expect("stream opens");
    let frames: Vec<_> = stream.collect().await;

    assert_eq!(frames.len(), 2);
    let first = frames[0].as_ref().unwrap();
    assert_eq!(first.event, "message");
    assert!(first.data.contains("\"completed_pages\":1"));
    let second = frames[1].as_ref().unwrap();
    assert_eq!(second.event, "progress");
    assert!(second.data.contains("\"done\":true"));
}

#[tokio::test]
async fn job_stream_encodes_job_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/a%2Fb%3Fc/stream"))
        .and(query_param("token", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"status\":\"running\"}\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client(&server)
        .open_job_stream(&job("a/b?c"))
        .await
        .expect("stream opens");
    let frames: Vec<_> = stream.collect().await;

    assert_eq!(frames.len(), 1);
}

#[tokio::test]
async fn job_stream_rejected_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-1/stream"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client(&server).open_job_stream(&job("job-1")).await;

    match result {
        Err(err) => assert!(err.is_auth()),
        Ok(_) => panic!("expected the stream to be rejected"),
    }
}
