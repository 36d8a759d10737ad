use assembly_registry::{ParseError, SpecParser, decode_sheet};
use assembly_types::{Requirement, ServiceId};

const MEMBER_SPEC: &[u8] = include_bytes!("data/OK7XM1000938DS17215.xlsx");
const DRIFTED_SPEC: &[u8] = include_bytes!("data/layout_changed.xlsx");

fn member_id() -> ServiceId {
    ServiceId::parse("OK7XM1000938DS17215").expect("valid service id")
}

#[test]
fn member_spec_resolves_endpoint_and_parameters() {
    let parser = SpecParser::new("https://open.assembly.go.kr/portal/openapi").expect("valid base url");
    let spec = parser.parse(&member_id(), MEMBER_SPEC).expect("parse member spec");

    assert_eq!(spec.endpoint_path, "nzmimeepazxkubdpn");
    assert_eq!(spec.endpoint_url, "https://open.assembly.go.kr/portal/openapi/nzmimeepazxkubdpn");
    assert_ne!(spec.endpoint_path, spec.service_id.as_str());

    let basic: Vec<_> = spec.basic_parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(basic, ["KEY", "Type", "pIndex", "pSize"]);

    assert_eq!(spec.request_parameters.len(), 1, "got {:?}", spec.request_parameters);
    let age = &spec.request_parameters[0];
    assert_eq!(age.name, "AGE");
    assert_eq!(age.requirement, Requirement::Required);
    assert_eq!(age.raw_type_label, "STRING(required)");
    assert_eq!(age.description, "대수");
}

#[test]
fn decoded_sheet_keeps_row_positions() {
    let rows = decode_sheet(MEMBER_SPEC).expect("decode workbook");
    assert_eq!(rows.rows()[2][0], "요청주소");
    assert!(rows.rows()[1].iter().all(String::is_empty));
}

#[test]
fn drifted_layout_is_a_structure_error() {
    let error = SpecParser::default()
        .parse(&member_id(), DRIFTED_SPEC)
        .expect_err("layout without a request address marker must not parse");
    assert!(matches!(error, ParseError::StructureNotFound { .. }), "got {error:?}");
}
