use std::sync::{Arc, Mutex};
use std::time::Duration;

use assembly_api::{AssemblyClient, HttpTransport, TransportError, TransportErrorKind, TransportRequest, TransportResponse};
use assembly_engine::{CollectError, RequestExecutor, RequestParams, RetryPolicy, Sleeper, ValidationError};
use assembly_types::{FailureKind, OutputFormat, ParameterDescriptor, RequestOutcome, Requirement, ResolvedSpec, ServiceId};
use async_trait::async_trait;
use serde_json::json;

const ENDPOINT: &str = "nzmimeepazxkubdpn";

/// Replays scripted responses in order and records each request.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<Vec<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
    stall: Option<Duration>,
}

impl ScriptedTransport {
    fn new(mut responses: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            ..Self::default()
        })
    }

    fn stalling(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall: Some(stall),
            ..Self::default()
        })
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().expect("requests lock").push(request);
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.responses
            .lock()
            .expect("responses lock")
            .pop()
            .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Other, "script exhausted")))
    }
}

/// Records requested delays without sleeping.
#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("delays lock").push(duration);
    }
}

fn spec() -> ResolvedSpec {
    ResolvedSpec {
        service_id: ServiceId::parse("OK7XM1000938DS17215").expect("valid service id"),
        endpoint_path: ENDPOINT.to_string(),
        endpoint_url: format!("https://open.example.org/portal/openapi/{ENDPOINT}"),
        basic_parameters: Vec::new(),
        request_parameters: vec![ParameterDescriptor::new("AGE", Requirement::Required, "STRING(required)", "대수")],
    }
}

fn executor(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> RequestExecutor {
    let client = AssemblyClient::new("https://open.example.org/portal/openapi", "test-key", transport)
        .expect("client")
        .with_timeout(Duration::from_millis(100));
    RequestExecutor::new(client).with_sleeper(sleeper)
}

fn ok_body(rows: usize) -> TransportResponse {
    let rows: Vec<_> = (0..rows).map(|index| json!({"HG_NM": format!("member-{index}")})).collect();
    let body = json!({
        ENDPOINT: [
            {"head": [{"list_total_count": 3}, {"RESULT": {"CODE": "INFO-000", "MESSAGE": "정상 처리되었습니다."}}]},
            {"row": rows}
        ]
    });
    TransportResponse::new(200, body.to_string())
}

fn age(value: &str) -> RequestParams {
    RequestParams::new().with("AGE", value)
}

#[tokio::test]
async fn missing_required_parameter_makes_no_network_call() {
    let transport = ScriptedTransport::new(vec![Ok(ok_body(1))]);
    let executor = executor(Arc::clone(&transport), Arc::default());

    let error = executor
        .execute(&spec(), &RequestParams::new(), OutputFormat::Json)
        .await
        .expect_err("validation must fail");
    let ValidationError::MissingRequired { names, .. } = error;
    assert_eq!(names, ["AGE"]);
    assert!(transport.requests().is_empty(), "no HTTP call expected");
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse::new(503, "Service Unavailable")),
        Err(TransportError::new(TransportErrorKind::Connect, "connection reset by peer")),
        Ok(ok_body(1)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = executor(Arc::clone(&transport), Arc::clone(&sleeper));

    let outcome = executor.execute(&spec(), &age("22"), OutputFormat::Json).await.expect("valid params");
    assert!(outcome.is_success(), "got {outcome:?}");
    assert_eq!(transport.requests().len(), 3);

    let delays = sleeper.delays.lock().expect("delays lock").clone();
    assert_eq!(delays.len(), 2);
    let policy = RetryPolicy::default();
    for (retry, delay) in (1..).zip(&delays) {
        let (low, high) = policy.delay_bounds(retry);
        assert!(*delay >= low && *delay <= high, "retry {retry}: {delay:?} outside {low:?}..={high:?}");
    }
    assert!(delays[1] > policy.delay_bounds(1).1, "second backoff must grow");
}

#[tokio::test]
async fn exhausted_retries_surface_a_transient_failure() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse::new(502, "")),
        Ok(TransportResponse::new(502, "")),
        Ok(TransportResponse::new(502, "")),
        Ok(ok_body(1)),
    ]);
    let executor = executor(Arc::clone(&transport), Arc::default());

    let failure = executor
        .execute(&spec(), &age("22"), OutputFormat::Json)
        .await
        .expect("valid params")
        .into_result()
        .expect_err("all attempts fail");
    assert_eq!(failure.kind, FailureKind::Transient);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.http_status, Some(502));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(400, "bad request")), Ok(ok_body(1))]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = executor(Arc::clone(&transport), Arc::clone(&sleeper));

    let outcome = executor.execute(&spec(), &age("22"), OutputFormat::Json).await.expect("valid params");
    let failure = outcome.failure().expect("failure");
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert_eq!(failure.attempts, 1);
    assert_eq!(transport.requests().len(), 1);
    assert!(sleeper.delays.lock().expect("delays lock").is_empty());
}

#[tokio::test]
async fn rate_limits_are_retried() {
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(429, "")), Ok(ok_body(1))]);
    let outcome = executor(Arc::clone(&transport), Arc::default())
        .execute(&spec(), &age("22"), OutputFormat::Json)
        .await
        .expect("valid params");
    assert!(outcome.is_success());
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn no_data_code_is_an_empty_success() {
    let body = json!({"RESULT": {"CODE": "INFO-200", "MESSAGE": "해당하는 데이터가 없습니다."}}).to_string();
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(200, body))]);
    let outcome = executor(transport, Arc::default())
        .execute(&spec(), &age("99"), OutputFormat::Json)
        .await
        .expect("valid params");
    match outcome {
        RequestOutcome::Success { payload, embedded, .. } => {
            assert!(payload.is_empty());
            assert_eq!(embedded.expect("embedded status").code, "INFO-200");
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn embedded_errors_are_surfaced_verbatim_without_retry() {
    let body = json!({"RESULT": {"CODE": "ERROR-290", "MESSAGE": "인증키가 유효하지 않습니다."}}).to_string();
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(200, body)), Ok(ok_body(1))]);
    let failure = executor(Arc::clone(&transport), Arc::default())
        .execute(&spec(), &age("22"), OutputFormat::Json)
        .await
        .expect("valid params")
        .into_result()
        .expect_err("embedded error");
    assert_eq!(failure.kind, FailureKind::EmbeddedApplicationError);
    assert_eq!(failure.embedded_code.as_deref(), Some("ERROR-290"));
    assert_eq!(failure.message, "인증키가 유효하지 않습니다.");
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn query_carries_defaults_then_supplied_parameters() {
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(200, "<row/>"))]);
    let params = RequestParams::from_pairs([("KEY", "override"), ("pSize", "5"), ("AGE", "22"), ("Type", "csv")]);
    let outcome = executor(Arc::clone(&transport), Arc::default())
        .execute(&spec(), &params, OutputFormat::Xml)
        .await
        .expect("valid params");
    assert!(outcome.is_success());

    let request = &transport.requests()[0];
    assert_eq!(request.url, format!("https://open.example.org/portal/openapi/{ENDPOINT}"));
    let query: Vec<(&str, &str)> = request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    assert_eq!(
        query,
        [("KEY", "test-key"), ("Type", "xml"), ("pIndex", "1"), ("pSize", "5"), ("AGE", "22")]
    );
}

#[tokio::test]
async fn every_attempt_is_bounded_by_the_timeout() {
    let transport = ScriptedTransport::stalling(Duration::from_secs(30));
    let executor = executor(Arc::clone(&transport), Arc::default()).with_retry_policy(RetryPolicy::default().with_max_attempts(2));

    let failure = executor
        .execute(&spec(), &age("22"), OutputFormat::Json)
        .await
        .expect("valid params")
        .into_result()
        .expect_err("timeout");
    assert_eq!(failure.kind, FailureKind::Transient);
    assert_eq!(failure.attempts, 2);
    assert!(failure.message.contains("timeout"), "message: {}", failure.message);
}

#[tokio::test]
async fn collect_rows_stops_at_a_short_page() {
    let transport = ScriptedTransport::new(vec![Ok(ok_body(2)), Ok(ok_body(1)), Ok(ok_body(2))]);
    let executor = executor(Arc::clone(&transport), Arc::default());

    let rows = executor
        .collect_rows(&spec(), &age("22").with("pSize", "2"), 10)
        .await
        .expect("rows collected");
    assert_eq!(rows.len(), 3);

    let pages: Vec<_> = transport
        .requests()
        .iter()
        .map(|request| request.query_value("pIndex").map(str::to_string))
        .collect();
    assert_eq!(pages, [Some("1".to_string()), Some("2".to_string())]);
}

#[tokio::test]
async fn collect_rows_validates_first() {
    let transport = ScriptedTransport::new(Vec::new());
    let error = executor(Arc::clone(&transport), Arc::default())
        .collect_rows(&spec(), &RequestParams::new(), 3)
        .await
        .expect_err("validation");
    assert!(matches!(error, CollectError::Validation(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn requests_go_to_the_resolved_endpoint_url() {
    let mirrored = ResolvedSpec {
        endpoint_url: format!("https://mirror.example.net/api/{ENDPOINT}"),
        ..spec()
    };
    let transport = ScriptedTransport::new(vec![Ok(ok_body(1)), Ok(ok_body(1))]);
    let exec = executor(Arc::clone(&transport), Arc::default());

    let outcome = exec.execute(&mirrored, &age("22"), OutputFormat::Json).await.expect("valid params");
    assert!(outcome.is_success(), "got {outcome:?}");
    let rows = exec.collect_rows(&mirrored, &age("22"), 1).await.expect("rows");
    assert_eq!(rows.len(), 1);

    let urls: Vec<_> = transport.requests().into_iter().map(|request| request.url).collect();
    assert_eq!(urls, [mirrored.endpoint_url.clone(), mirrored.endpoint_url.clone()]);

    let transport = ScriptedTransport::new(vec![Ok(ok_body(1))]);
    executor(Arc::clone(&transport), Arc::default())
        .execute_endpoint(ENDPOINT, &age("22"), OutputFormat::Json)
        .await;
    assert_eq!(transport.requests()[0].url, format!("https://open.example.org/portal/openapi/{ENDPOINT}"));
}
