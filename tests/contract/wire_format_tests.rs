//! Exact wire shapes of the entrypoint contract.
//!
//! The external entrypoint is a black box; these tests pin the literal
//! JSON the harness sends and accepts so a drift on either side shows up
//! as a failing contract, not a mystery in production.

use std::collections::BTreeMap;

use nanoclaw_harness::models::request::InvocationRequest;
use nanoclaw_harness::models::response::{InvocationResult, WorkloadStatus};

#[test]
fn request_document_matches_the_contract_byte_for_byte() {
    let mut secrets = BTreeMap::new();
    secrets.insert("ANTHROPIC_API_KEY".to_owned(), "sk-1".to_owned());
    let request = InvocationRequest {
        prompt: "Reply with exactly: SMOKE_TEST_OK".into(),
        session_id: Some("abc".into()),
        group_folder: "smoke-test".into(),
        chat_jid: "smoke-test@g.us".into(),
        is_main: true,
        is_scheduled_task: false,
        assistant_name: "Andy".into(),
        secrets,
    };

    let json = serde_json::to_string(&request).expect("encodes");
    assert_eq!(
        json,
        r#"{"prompt":"Reply with exactly: SMOKE_TEST_OK","sessionId":"abc","groupFolder":"smoke-test","chatJid":"smoke-test@g.us","isMain":true,"isScheduledTask":false,"assistantName":"Andy","secrets":{"ANTHROPIC_API_KEY":"sk-1"}}"#
    );
}

#[test]
fn first_turn_document_has_no_session_key_and_an_empty_secrets_map() {
    let request = InvocationRequest::new("hello", "family", "family@g.us", "Andy");
    let json = serde_json::to_string(&request).expect("encodes");
    assert_eq!(
        json,
        r#"{"prompt":"hello","groupFolder":"family","chatJid":"family@g.us","isMain":true,"isScheduledTask":false,"assistantName":"Andy","secrets":{}}"#
    );
}

#[test]
fn the_documented_result_example_parses() {
    let result: InvocationResult = serde_json::from_str(
        r#"{"status": "success", "result": "SMOKE_TEST_OK", "newSessionId": "abc"}"#,
    )
    .expect("contract example parses");
    assert_eq!(result.status, WorkloadStatus::Success);
    assert_eq!(result.result_text(), "SMOKE_TEST_OK");
    assert_eq!(result.new_session_id.as_deref(), Some("abc"));
}

#[test]
fn error_results_carry_their_message_in_result() {
    let result: InvocationResult =
        serde_json::from_str(r#"{"status": "error", "result": "rate limited"}"#)
            .expect("error payload parses");
    assert_eq!(result.status, WorkloadStatus::Error);
    assert_eq!(result.result_text(), "rate limited");
}
