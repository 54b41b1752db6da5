//! Outbound calls
//!
//! Time is paused in every test so deadlines can be checked exactly:
//! - one call in flight at a time
//! - responses for other message ids never resolve a call
//! - the deadline is fixed when the call is sent
//! - timeouts and CALLERRORs release the in-flight slot

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::*;
use ocpp_engine::v201::*;
use ocpp_engine::{CallOptions, ErrorCode, OcppError, PayloadKind, TimeoutPolicy};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Request / response
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_typed_call() {
    let session = start_session(config(), |b| b);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move { cp.call(&HeartbeatRequest {}, CallOptions::default()).await });

    let call = session.next_call().await;
    assert_eq!(call.message_id, "msg-1");
    assert_eq!(call.action, "Heartbeat");
    assert_eq!(call.payload, json!({}));

    session
        .reply(&call, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    let response = assert_ok!(pending.await.unwrap()).unwrap();
    assert_eq!(
        response.current_time,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_raw_call_converts_naming_both_ways() {
    let session = start_session(config(), |b| b);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        let payload = json!({
            "charging_station": { "model": "EK3", "vendor_name": "EK", "serial_number": null },
            "reason": "PowerUp"
        });
        cp.call_raw("BootNotification", payload, CallOptions::default())
            .await
    });

    let call = session.next_call().await;
    assert_eq!(
        call.payload,
        json!({ "chargingStation": { "model": "EK3", "vendorName": "EK" }, "reason": "PowerUp" })
    );

    session
        .reply(
            &call,
            json!({ "currentTime": "2024-05-01T12:00:00Z", "interval": 300, "status": "Accepted" }),
        )
        .await;

    assert_eq!(
        pending.await.unwrap().unwrap(),
        Some(json!({ "current_time": "2024-05-01T12:00:00Z", "interval": 300, "status": "Accepted" }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_explicit_message_id() {
    let session = start_session(config(), |b| b);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(
            &HeartbeatRequest {},
            CallOptions::default().with_message_id("beat-7"),
        )
        .await
    });

    let call = session.next_call().await;
    assert_eq!(call.message_id, "beat-7");
    session
        .reply(&call, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    assert!(pending.await.unwrap().unwrap().is_some());
}

// ============================================================================
// Single flight and correlation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_call_in_flight() {
    let session = start_session(config(), |b| b);

    let first_cp = session.cp.clone();
    let first = tokio::spawn(async move {
        first_cp
            .call(&HeartbeatRequest {}, CallOptions::default())
            .await
    });
    let second_cp = session.cp.clone();
    let second = tokio::spawn(async move {
        second_cp
            .call(&HeartbeatRequest {}, CallOptions::default())
            .await
    });

    let call_a = session.next_call().await;
    assert!(session.silent_for(Duration::from_secs(1)).await);

    session
        .reply(&call_a, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    let call_b = session.next_call().await;
    assert_ne!(call_a.message_id, call_b.message_id);
    session
        .reply(&call_b, json!({ "currentTime": "2024-05-01T12:00:01Z" }))
        .await;

    assert!(first.await.unwrap().unwrap().is_some());
    assert!(second.await.unwrap().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_responses_are_skipped() {
    let session = start_session(
        config().with_response_timeout(Duration::from_secs(2)),
        |b| b,
    );

    let start = Instant::now();
    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });

    let call = session.next_call().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    session
        .send(r#"[3,"someone-else",{"currentTime":"2020-01-01T00:00:00Z"}]"#)
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    session
        .send(r#"[4,"also-not-mine","GenericError","",{}]"#)
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    session
        .reply(&call, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    let response = pending.await.unwrap().unwrap().unwrap();
    assert_eq!(response.current_time.timestamp(), 1714564800);

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_mismatches_do_not_extend_deadline() {
    let session = start_session(
        config().with_response_timeout(Duration::from_secs(2)),
        |b| b,
    );

    let start = Instant::now();
    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });

    let _call = session.next_call().await;
    let peer = tokio::spawn(async move {
        for id in ["x-1", "x-2", "x-3"] {
            tokio::time::sleep(Duration::from_millis(800)).await;
            session
                .send(format!(r#"[3,"{}",{{}}]"#, id))
                .await;
        }
        session
    });

    assert_eq!(pending.await.unwrap().unwrap(), None);

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2400));

    peer.await.unwrap();
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_resolves_to_none_by_default() {
    let session = start_session(
        config().with_response_timeout(Duration::from_secs(1)),
        |b| b,
    );

    let start = Instant::now();
    let cp = session.cp.clone();
    let first = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    session.next_call().await;

    assert_eq!(assert_ok!(first.await.unwrap()), None);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1100));

    // The slot is free again
    let cp = session.cp.clone();
    let second = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    let call = session.next_call().await;
    assert_eq!(call.message_id, "msg-2");
    session
        .reply(&call, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    assert!(second.await.unwrap().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_error_policy_releases_slot() {
    let session = start_session(
        config()
            .with_response_timeout(Duration::from_secs(5))
            .with_timeout_policy(TimeoutPolicy::Error),
        |b| b,
    );

    let cp = session.cp.clone();
    let first = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    let unanswered = session.next_call().await;

    let err = assert_err!(first.await.unwrap());
    assert!(matches!(err, OcppError::Timeout));

    // Late answer to the abandoned call
    session
        .reply(&unanswered, json!({ "currentTime": "2020-01-01T00:00:00Z" }))
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let cp = session.cp.clone();
    let second = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    let call = session.next_call().await;
    assert_eq!(call.message_id, "msg-2");
    session
        .reply(&call, json!({ "currentTime": "2024-05-01T12:00:00Z" }))
        .await;

    let response = second.await.unwrap().unwrap().unwrap();
    assert_eq!(response.current_time.timestamp(), 1714564800);
}

// ============================================================================
// CALLERROR responses
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_call_error_is_suppressed_by_default() {
    let session = start_session(config(), |b| b);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    let call = session.next_call().await;
    session
        .reply_error(&call, ErrorCode::SecurityError, "station not registered")
        .await;

    assert_eq!(pending.await.unwrap().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_unsuppressed_call_error_is_returned() {
    let session = start_session(config(), |b| b);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        let request = AuthorizeRequest {
            id_token: IdToken::central("AB12"),
            certificate: None,
        };
        cp.call(&request, CallOptions::default().unsuppressed()).await
    });
    let call = session.next_call().await;
    assert_eq!(
        call.payload,
        json!({ "idToken": { "idToken": "AB12", "type": "Central" } })
    );
    session
        .reply_error(&call, ErrorCode::SecurityError, "station not registered")
        .await;

    match pending.await.unwrap() {
        Err(OcppError::RemoteError {
            code, description, ..
        }) => {
            assert_eq!(code, ErrorCode::SecurityError);
            assert_eq!(description, "station not registered");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

// ============================================================================
// Schema validation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_never_sent() {
    let session = start_session(config(), |b| {
        b.validator(Arc::new(RejectPayloads {
            action: "Authorize",
            kind: PayloadKind::Request,
        }))
    });

    let request = AuthorizeRequest {
        id_token: IdToken::central("AB12"),
        certificate: None,
    };
    let err = assert_err!(session.cp.call(&request, CallOptions::default()).await);
    assert!(matches!(err, OcppError::SchemaValidation { .. }));
    assert!(session.silent_for(Duration::from_secs(1)).await);

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(&request, CallOptions::default().skip_schema_validation())
            .await
    });
    let call = session.next_call().await;
    assert_eq!(call.action, "Authorize");
    session
        .reply(&call, json!({ "idTokenInfo": { "status": "Accepted" } }))
        .await;

    let response = pending.await.unwrap().unwrap().unwrap();
    assert_eq!(response.id_token_info.status, AuthorizationStatus::Accepted);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_response_fails_the_call() {
    let session = start_session(config(), |b| {
        b.validator(Arc::new(RejectPayloads {
            action: "Heartbeat",
            kind: PayloadKind::Response,
        }))
    });

    let cp = session.cp.clone();
    let pending = tokio::spawn(async move {
        cp.call(&HeartbeatRequest {}, CallOptions::default()).await
    });
    let call = session.next_call().await;
    session.reply(&call, json!({})).await;

    let err = assert_err!(pending.await.unwrap());
    assert!(matches!(
        err,
        OcppError::SchemaValidation {
            code: ErrorCode::OccurrenceConstraintViolation,
            ..
        }
    ));
}
