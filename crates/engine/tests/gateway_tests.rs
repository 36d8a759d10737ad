use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assembly_api::{AssemblyClient, HttpTransport, TransportError, TransportRequest, TransportResponse};
use assembly_engine::{Gateway, GatewayError, RequestExecutor, RequestParams};
use assembly_registry::{FetchError, MemorySpecCache, SpecDocumentFetcher, SpecParser, SpecResolver};
use assembly_types::{OutputFormat, ServiceId};
use async_trait::async_trait;

const MEMBER_SPEC: &[u8] = include_bytes!("../../registry/tests/data/OK7XM1000938DS17215.xlsx");
const BASE_URL: &str = "https://open.example.org/portal/openapi";

struct FixtureFetcher {
    calls: AtomicUsize,
    document: Result<&'static [u8], FetchError>,
}

#[async_trait]
impl SpecDocumentFetcher for FixtureFetcher {
    async fn fetch(&self, _service_id: &ServiceId) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.document.clone().map(<[u8]>::to_vec)
    }
}

#[derive(Default)]
struct RecordingTransport {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.urls.lock().expect("urls lock").push(request.url);
        let body = r#"{"nzmimeepazxkubdpn":[{"head":[{"list_total_count":1},{"RESULT":{"CODE":"INFO-000","MESSAGE":"정상 처리되었습니다."}}]},{"row":[{"HG_NM":"홍길동"}]}]}"#;
        Ok(TransportResponse::new(200, body))
    }
}

fn gateway(document: Result<&'static [u8], FetchError>) -> (Gateway, Arc<FixtureFetcher>, Arc<RecordingTransport>) {
    let fetcher = Arc::new(FixtureFetcher {
        calls: AtomicUsize::new(0),
        document,
    });
    let resolver = SpecResolver::builder(fetcher.clone(), Arc::new(MemorySpecCache::default()))
        .parser(SpecParser::new(BASE_URL).expect("valid base url"))
        .build();
    let transport = Arc::new(RecordingTransport::default());
    let client = AssemblyClient::new(BASE_URL, "test-key", transport.clone()).expect("client");
    (Gateway::new(resolver, RequestExecutor::new(client)), fetcher, transport)
}

fn member_id() -> ServiceId {
    ServiceId::parse("OK7XM1000938DS17215").expect("valid service id")
}

#[tokio::test]
async fn call_resolves_once_and_hits_the_resolved_endpoint() {
    let (gateway, fetcher, transport) = gateway(Ok(MEMBER_SPEC));
    let params = RequestParams::new().with("AGE", "22");

    for _ in 0..3 {
        let outcome = gateway.call(&member_id(), &params, OutputFormat::Json).await.expect("call");
        assert!(outcome.is_success());
    }

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    let urls = transport.urls.lock().expect("urls lock").clone();
    assert_eq!(urls.len(), 3);
    assert!(urls.iter().all(|url| url == "https://open.example.org/portal/openapi/nzmimeepazxkubdpn"));
}

#[tokio::test]
async fn call_reports_validation_before_any_data_request() {
    let (gateway, _, transport) = gateway(Ok(MEMBER_SPEC));
    let error = gateway
        .call(&member_id(), &RequestParams::new(), OutputFormat::Json)
        .await
        .expect_err("AGE is required");
    assert!(matches!(error, GatewayError::Validation(_)), "got {error:?}");
    assert!(transport.urls.lock().expect("urls lock").is_empty());
}

#[tokio::test]
async fn call_reports_resolution_failures() {
    let (gateway, _, transport) = gateway(Err(FetchError::forbidden(&member_id(), 403)));
    let error = gateway
        .call(&member_id(), &RequestParams::new().with("AGE", "22"), OutputFormat::Json)
        .await
        .expect_err("spec is restricted");
    match error {
        GatewayError::Resolution(error) => assert!(error.is_fetch_failure()),
        other => panic!("expected resolution error, got {other:?}"),
    }
    assert!(transport.urls.lock().expect("urls lock").is_empty());
}

#[tokio::test]
async fn collect_rows_walks_resolved_endpoint() {
    let (gateway, _, _) = gateway(Ok(MEMBER_SPEC));
    let rows = gateway
        .collect_rows(&member_id(), &RequestParams::new().with("AGE", "22"), 5)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["HG_NM"], "홍길동");
}
