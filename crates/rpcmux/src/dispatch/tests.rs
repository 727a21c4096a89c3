//! Unit tests for request dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mockall::mock;
use rpcmux_config::Config;
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::fault::codes;
use crate::registry::ProcedureDeclaration;
use crate::tests::{
    StubAuthenticator, allow_all, counted_add, dispatcher_with, json_exchange, xml_call,
};

mock! {
    pub Gate {}
    impl Authorizer for Gate {
        fn has_permission(&self, caller: &CallerIdentity, permission: &str) -> bool;
    }
}

#[fixture]
fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

fn add_dispatcher(counter: &Arc<AtomicUsize>) -> Dispatcher {
    dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::clone(counter))],
        allow_all(),
    )
}

fn error_code(response: &serde_json::Value) -> Option<i64> {
    response
        .get("error")
        .and_then(|error| error.get("code"))
        .and_then(serde_json::Value::as_i64)
}

// ---------------------------------------------------------------------------
// Successful calls
// ---------------------------------------------------------------------------

#[rstest]
fn xml_add_returns_sum(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let result = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], None);
    assert_eq!(result, Ok(Value::Int(3)));
    assert_eq!(calls(&counter), 1);
}

#[rstest]
fn json_one_point_zero_add_echoes_id(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"method": "add", "params": [1, 2], "id": 7}),
        None,
    );
    assert_eq!(
        response,
        Some(json!({"result": 3, "error": null, "id": 7}))
    );
}

#[rstest]
fn json_two_point_zero_add_echoes_id(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "add", "params": [1, 2], "id": "abc"}),
        None,
    );
    assert_eq!(
        response,
        Some(json!({"jsonrpc": "2.0", "result": 3, "id": "abc"}))
    );
}

#[rstest]
fn response_carries_protocol_metadata(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(
        br#"{"jsonrpc": "2.0", "method": "add", "params": [1, 2], "id": 1}"#,
        Some("application/json; charset=utf-8"),
        None,
    );
    assert_eq!(response.status, TransportStatus::Success);
    assert_eq!(response.status.http_code(), 200);
    assert_eq!(response.content_type, Some("application/json"));
    assert_eq!(response.session, None);
}

// ---------------------------------------------------------------------------
// Named arguments
// ---------------------------------------------------------------------------

#[rstest]
fn named_arguments_bind_by_declared_name(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "add", "params": {"b": 2, "a": 40}, "id": 1}),
        None,
    )
    .expect("reply");
    assert_eq!(response.get("result"), Some(&json!(42)));
}

#[rstest]
#[case::unknown_name(json!({"a": 1, "c": 2}))]
#[case::missing_name(json!({"a": 1}))]
fn mismatched_named_arguments_are_invalid_params(
    counter: Arc<AtomicUsize>,
    #[case] params: serde_json::Value,
) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "add", "params": params, "id": 1}),
        None,
    )
    .expect("reply");
    assert_eq!(error_code(&response), Some(i64::from(codes::INVALID_PARAMS)));
    assert_eq!(calls(&counter), 0);
}

#[test]
fn named_arguments_need_declared_names() {
    let anonymous = ProcedureDeclaration::new("echo", |params: &[Value]| {
        Ok(params.first().cloned().unwrap_or(Value::Nil))
    });
    let dispatcher = dispatcher_with(&Config::default(), vec![anonymous], allow_all());
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "echo", "params": {"x": 1}, "id": 1}),
        None,
    )
    .expect("reply");
    assert_eq!(error_code(&response), Some(i64::from(codes::INVALID_PARAMS)));
}

// ---------------------------------------------------------------------------
// Resolution and arity
// ---------------------------------------------------------------------------

#[rstest]
fn unknown_method_is_reported_in_xml(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let fault = xml_call(&dispatcher, "nope", &[], None).expect_err("fault");
    assert_eq!(fault.code(), codes::METHOD_NOT_FOUND);
    assert!(fault.message().contains("nope"));
}

#[rstest]
fn unknown_method_is_reported_in_json(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "nope", "id": 3}),
        None,
    )
    .expect("reply");
    assert_eq!(error_code(&response), Some(i64::from(codes::METHOD_NOT_FOUND)));
    assert_eq!(response.get("id"), Some(&json!(3)));
}

#[rstest]
#[case::too_few(vec![Value::Int(1)])]
#[case::too_many(vec![Value::Int(1), Value::Int(2), Value::Int(3)])]
fn arity_mismatch_never_invokes(counter: Arc<AtomicUsize>, #[case] params: Vec<Value>) {
    let dispatcher = add_dispatcher(&counter);
    let fault = xml_call(&dispatcher, "add", &params, None).expect_err("fault");
    assert_eq!(fault.code(), codes::INVALID_PARAMS);
    assert_eq!(calls(&counter), 0);
}

#[test]
fn undeclared_signatures_accept_any_arity() {
    let count = ProcedureDeclaration::new("count", |params: &[Value]| {
        Ok(Value::from(i64::try_from(params.len()).unwrap_or(i64::MAX)))
    });
    let dispatcher = dispatcher_with(&Config::default(), vec![count], allow_all());
    let result = xml_call(
        &dispatcher,
        "count",
        &[Value::Nil, Value::Nil, Value::Nil],
        None,
    );
    assert_eq!(result, Ok(Value::Int(3)));
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[rstest]
fn denied_permission_never_invokes(counter: Arc<AtomicUsize>) {
    let mut gate = MockGate::new();
    gate.expect_has_permission()
        .withf(|caller, permission| caller.subject() == "bob" && permission == "math.add")
        .times(1)
        .return_const(false);
    let dispatcher = dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::clone(&counter)).permission("math.add")],
        Arc::new(gate),
    );

    let bob = CallerIdentity::new("bob");
    let fault = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], Some(&bob))
        .expect_err("denied");
    assert_eq!(fault.code(), codes::NOT_AUTHORIZED);
    assert_eq!(calls(&counter), 0);
}

#[rstest]
fn granted_permission_invokes(counter: Arc<AtomicUsize>) {
    let mut gate = MockGate::new();
    gate.expect_has_permission().times(1).return_const(true);
    let dispatcher = dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::clone(&counter)).permission("math.add")],
        Arc::new(gate),
    );

    let alice = CallerIdentity::new("alice");
    let result = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], Some(&alice));
    assert_eq!(result, Ok(Value::Int(3)));
    assert_eq!(calls(&counter), 1);
}

#[rstest]
fn anonymous_callers_are_refused_without_consulting_the_authorizer(
    counter: Arc<AtomicUsize>,
) {
    let mut gate = MockGate::new();
    gate.expect_has_permission().never();
    let dispatcher = dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::clone(&counter)).permission("math.add")],
        Arc::new(gate),
    );

    let fault = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], None)
        .expect_err("anonymous");
    assert_eq!(fault.code(), codes::NOT_AUTHORIZED);
    assert_eq!(calls(&counter), 0);
}

#[rstest]
fn login_required_accepts_any_identity(counter: Arc<AtomicUsize>) {
    let mut gate = MockGate::new();
    gate.expect_has_permission().never();
    let dispatcher = dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::clone(&counter)).login_required()],
        Arc::new(gate),
    );

    let anonymous = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], None);
    assert_eq!(
        anonymous.map_err(|fault| fault.code()),
        Err(codes::NOT_AUTHORIZED)
    );

    let carol = CallerIdentity::new("carol");
    let known = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], Some(&carol));
    assert_eq!(known, Ok(Value::Int(3)));
    assert_eq!(calls(&counter), 1);
}

// ---------------------------------------------------------------------------
// Procedure failures
// ---------------------------------------------------------------------------

fn failing_procedures() -> Vec<ProcedureDeclaration> {
    vec![
        ProcedureDeclaration::new("explode", |_params: &[Value]| -> Result<Value, ProcedureError> {
            panic!("boom")
        }),
        ProcedureDeclaration::new("broken", |_params: &[Value]| {
            Err(ProcedureError::from(anyhow::anyhow!("disk full")))
        }),
        ProcedureDeclaration::new("teapot", |_params: &[Value]| {
            Err(ProcedureError::fault(418, "short and stout"))
        }),
        ProcedureDeclaration::new("nan", |_params: &[Value]| Ok(Value::Double(f64::NAN))),
    ]
}

#[test]
fn panics_become_application_faults() {
    let dispatcher = dispatcher_with(&Config::default(), failing_procedures(), allow_all());

    let fault = xml_call(&dispatcher, "explode", &[], None).expect_err("fault");
    assert_eq!(fault.code(), codes::APPLICATION_ERROR);
    assert!(fault.message().contains("explode"));

    let listed = xml_call(&dispatcher, crate::LIST_METHODS, &[], None);
    assert!(listed.is_ok(), "dispatcher stays usable after a panic");
}

#[test]
fn procedure_errors_become_application_faults() {
    let dispatcher = dispatcher_with(&Config::default(), failing_procedures(), allow_all());
    let fault = xml_call(&dispatcher, "broken", &[], None).expect_err("fault");
    assert_eq!(fault.code(), codes::APPLICATION_ERROR);
    assert_eq!(fault.message(), "disk full");
}

#[test]
fn explicit_faults_pass_through() {
    let dispatcher = dispatcher_with(&Config::default(), failing_procedures(), allow_all());
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "teapot", "id": 9}),
        None,
    );
    assert_eq!(
        response,
        Some(json!({
            "jsonrpc": "2.0",
            "error": {"code": 418, "message": "short and stout"},
            "id": 9,
        }))
    );
}

#[rstest]
#[case::xml(Some("text/xml"))]
#[case::json(Some("application/json"))]
fn unencodable_results_become_internal_errors(#[case] content_type: Option<&str>) {
    let dispatcher = dispatcher_with(&Config::default(), failing_procedures(), allow_all());
    let body: &[u8] = if content_type == Some("text/xml") {
        b"<?xml version=\"1.0\"?><methodCall><methodName>nan</methodName></methodCall>"
    } else {
        br#"{"jsonrpc": "2.0", "method": "nan", "id": 1}"#
    };
    let response = dispatcher.handle(body, content_type, None);
    assert_eq!(response.status, TransportStatus::Success);
    let text = String::from_utf8(response.body).expect("utf-8 body");
    assert!(
        text.contains(&codes::INTERNAL_ERROR.to_string()),
        "expected an internal error fault, got {text}"
    );
}

// ---------------------------------------------------------------------------
// Batches and notifications
// ---------------------------------------------------------------------------

#[rstest]
fn batch_notifications_run_but_are_not_answered(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!([
            {"jsonrpc": "2.0", "method": "add", "params": [1, 2], "id": 1},
            {"jsonrpc": "2.0", "method": "add", "params": [3, 4]},
            {"jsonrpc": "2.0", "method": "add", "params": [5, 6], "id": 2},
        ]),
        None,
    )
    .expect("reply");

    assert_eq!(
        response,
        json!([
            {"jsonrpc": "2.0", "result": 3, "id": 1},
            {"jsonrpc": "2.0", "result": 11, "id": 2},
        ])
    );
    assert_eq!(calls(&counter), 3);
}

#[rstest]
fn batch_members_fail_independently(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!([
            {"jsonrpc": "2.0", "method": "nope", "id": "a"},
            {"jsonrpc": "2.0", "method": "add", "params": [1, 1], "id": "b"},
            {"jsonrpc": "2.0", "method": 5, "id": "c"},
        ]),
        None,
    )
    .expect("reply");

    let replies = response.as_array().expect("batch reply");
    assert_eq!(replies.len(), 3);
    assert_eq!(
        replies.first().and_then(error_code),
        Some(i64::from(codes::METHOD_NOT_FOUND))
    );
    assert_eq!(replies.get(1).and_then(|reply| reply.get("result")), Some(&json!(2)));
    assert_eq!(
        replies.get(2).and_then(error_code),
        Some(i64::from(codes::INVALID_REQUEST))
    );
}

#[rstest]
fn all_notification_batch_has_empty_body(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(
        br#"[{"jsonrpc": "2.0", "method": "add", "params": [1, 2]}]"#,
        None,
        None,
    );
    assert_eq!(response.status, TransportStatus::Success);
    assert!(response.body.is_empty());
    assert_eq!(response.content_type, Some("application/json"));
    assert_eq!(calls(&counter), 1);
}

#[rstest]
fn lone_call_without_id_is_answered_with_null(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = json_exchange(
        &dispatcher,
        &json!({"jsonrpc": "2.0", "method": "add", "params": [2, 2]}),
        None,
    );
    assert_eq!(
        response,
        Some(json!({"jsonrpc": "2.0", "result": 4, "id": null}))
    );
}

// ---------------------------------------------------------------------------
// Undecodable and unsupported requests
// ---------------------------------------------------------------------------

#[rstest]
#[case::plain_text(b"hello world".as_slice(), None)]
#[case::unknown_media_type(b"{}".as_slice(), Some("text/plain"))]
#[case::empty(b"".as_slice(), None)]
fn unrecognised_bodies_are_unsupported(
    counter: Arc<AtomicUsize>,
    #[case] body: &[u8],
    #[case] content_type: Option<&str>,
) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(body, content_type, None);
    assert_eq!(response, RpcResponse::unsupported());
    assert_eq!(response.status.http_code(), 415);
}

#[rstest]
fn disabled_protocol_is_unsupported(counter: Arc<AtomicUsize>) {
    let config = Config {
        disable_json: true,
        ..Config::default()
    };
    let dispatcher = dispatcher_with(&config, vec![counted_add(Arc::clone(&counter))], allow_all());
    let response = dispatcher.handle(
        br#"{"jsonrpc": "2.0", "method": "add", "params": [1, 2], "id": 1}"#,
        Some("application/json"),
        None,
    );
    assert_eq!(response.status, TransportStatus::Unsupported);
    assert_eq!(calls(&counter), 0);

    let xml = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], None);
    assert_eq!(xml, Ok(Value::Int(3)));
}

#[rstest]
fn malformed_json_yields_parse_error_with_null_id(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(b"{\"method\": ", Some("application/json"), None);
    let parsed: serde_json::Value =
        serde_json::from_slice(&response.body).expect("JSON fault envelope");
    assert_eq!(error_code(&parsed), Some(i64::from(codes::PARSE_ERROR)));
    assert_eq!(parsed.get("id"), Some(&serde_json::Value::Null));
}

#[rstest]
fn malformed_xml_yields_parse_error(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(b"<methodCall><methodName>add", Some("text/xml"), None);
    assert_eq!(response.content_type, Some("text/xml"));
    let fault = XmlCodec::new()
        .decode_response(&response.body)
        .expect("fault document")
        .expect_err("fault");
    assert_eq!(fault.code(), codes::PARSE_ERROR);
}

fn deep_xml_call(levels: usize) -> Vec<u8> {
    format!(
        "<methodCall><methodName>add</methodName><params><param>{}{}</param></params></methodCall>",
        "<value><array><data>".repeat(levels),
        "</data></array></value>".repeat(levels),
    )
    .into_bytes()
}

fn deep_json_call(levels: usize) -> Vec<u8> {
    format!(
        r#"{{"jsonrpc": "2.0", "method": "add", "params": [{}{}], "id": 1}}"#,
        "[".repeat(levels),
        "]".repeat(levels),
    )
    .into_bytes()
}

#[rstest]
fn deeply_nested_xml_is_a_parse_error(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(&deep_xml_call(10_000), Some("text/xml"), None);
    assert_eq!(response.status, TransportStatus::Success);
    let fault = XmlCodec::new()
        .decode_response(&response.body)
        .expect("fault document")
        .expect_err("fault");
    assert_eq!(fault.code(), codes::PARSE_ERROR);
    assert_eq!(calls(&counter), 0);
}

#[rstest]
fn deeply_nested_json_is_a_parse_error_with_null_id(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(&deep_json_call(10_000), Some("application/json"), None);
    let parsed: serde_json::Value =
        serde_json::from_slice(&response.body).expect("JSON fault envelope");
    assert_eq!(error_code(&parsed), Some(i64::from(codes::PARSE_ERROR)));
    assert_eq!(parsed.get("id"), Some(&serde_json::Value::Null));
    assert_eq!(calls(&counter), 0);
}

#[rstest]
#[case::xml(deep_xml_call(10_000))]
#[case::json(deep_json_call(10_000))]
fn deeply_nested_bodies_without_content_type_are_unsupported(
    counter: Arc<AtomicUsize>,
    #[case] body: Vec<u8>,
) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(&body, None, None);
    assert_eq!(response, RpcResponse::unsupported());
}

#[rstest]
fn empty_batch_is_invalid_request(counter: Arc<AtomicUsize>) {
    let dispatcher = add_dispatcher(&counter);
    let response = dispatcher.handle(b"[]", Some("application/json"), None);
    let parsed: serde_json::Value =
        serde_json::from_slice(&response.body).expect("JSON fault envelope");
    assert_eq!(error_code(&parsed), Some(i64::from(codes::INVALID_REQUEST)));
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn login_dispatcher(authenticator: Arc<StubAuthenticator>) -> Dispatcher {
    let config = Config {
        disable_login: false,
        ..Config::default()
    };
    crate::bootstrap::build_dispatcher(
        &config,
        Vec::new(),
        crate::Collaborators::new(allow_all()).with_authenticator(authenticator),
    )
    .expect("registration succeeds")
}

#[test]
fn login_reports_an_established_session() {
    let dispatcher = login_dispatcher(Arc::new(StubAuthenticator::default()));
    let response = dispatcher.handle(
        br#"{"jsonrpc": "2.0", "method": "system.login", "params": ["alice", "secret"], "id": 1}"#,
        None,
        None,
    );
    assert_eq!(
        response.session,
        Some(SessionChange::Established(CallerIdentity::new("alice")))
    );
    let parsed: serde_json::Value = serde_json::from_slice(&response.body).expect("reply");
    assert_eq!(parsed.get("result"), Some(&json!(true)));
}

#[test]
fn rejected_login_leaves_the_session_alone() {
    let dispatcher = login_dispatcher(Arc::new(StubAuthenticator::default()));
    let response = dispatcher.handle(
        br#"{"jsonrpc": "2.0", "method": "system.login", "params": ["alice", "wrong"], "id": 1}"#,
        None,
        None,
    );
    assert_eq!(response.session, None);
    let parsed: serde_json::Value = serde_json::from_slice(&response.body).expect("reply");
    assert_eq!(parsed.get("result"), Some(&json!(false)));
}

#[test]
fn logout_ends_the_session() {
    let authenticator = Arc::new(StubAuthenticator::default());
    let dispatcher = login_dispatcher(Arc::clone(&authenticator));
    let alice = CallerIdentity::new("alice");
    let response = dispatcher.handle(
        br#"{"jsonrpc": "2.0", "method": "system.logout", "id": 1}"#,
        None,
        Some(&alice),
    );
    assert_eq!(response.session, Some(SessionChange::Ended));
    assert_eq!(
        *authenticator.logged_out.lock().expect("logout log"),
        vec![String::from("alice")]
    );
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

#[test]
fn exposes_cross_origin_policy() {
    let config = Config {
        cors_allow_origin: String::from("*"),
        ..Config::default()
    };
    let dispatcher = dispatcher_with(&config, Vec::new(), allow_all());
    assert_eq!(dispatcher.cross_origin().allow_origin(), "*");
    assert!(format!("{dispatcher:?}").contains("Dispatcher"));
}
