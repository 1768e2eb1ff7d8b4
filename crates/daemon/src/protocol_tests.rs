// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wfm_core::test_support::{instance, period};
use wfm_core::{InstanceId, StatusId};

fn alice() -> Actor {
    Actor::new("alice")
}

#[test]
fn request_roundtrips_through_json() {
    let request = Request::Transition {
        id: "inst-1".to_string(),
        status: "In Progress".to_string(),
        actor: alice(),
    };

    let encoded = encode(&request).expect("encode failed");
    let decoded: Request = decode(&encoded).expect("decode failed");

    assert_eq!(request, decoded);
}

#[test]
fn request_is_tagged_by_type() {
    let request = Request::ClosePeriod {
        period: period("2024-03"),
        actor: alice(),
    };

    let value: serde_json::Value = serde_json::from_slice(&encode(&request).unwrap()).unwrap();
    assert_eq!(value["type"], "ClosePeriod");
    assert_eq!(value["period"], "2024-03");
    assert_eq!(value["actor"], "alice");
}

#[test]
fn optional_request_fields_default() {
    let decoded: Request = decode(br#"{"type":"ListInstances"}"#).expect("decode failed");
    assert_eq!(
        decoded,
        Request::ListInstances {
            query: InstanceQuery::default()
        }
    );

    let decoded: Request =
        decode(br#"{"type":"Search","query":"payroll"}"#).expect("decode failed");
    assert_eq!(
        decoded,
        Request::Search {
            query: "payroll".to_string(),
            scope: SearchScope::default(),
        }
    );
}

#[test]
fn instance_response_roundtrips() {
    let response = Response::Instance {
        instance: Box::new(instance("inst-1", "monthly-report", "2024-03", "draft")),
    };

    let encoded = encode(&response).expect("encode failed");
    let decoded: Response = decode(&encoded).expect("decode failed");

    assert_eq!(response, decoded);
}

#[test]
fn notification_carries_nested_event() {
    let response = Response::Notification {
        event: Event::StatusChanged {
            instance_id: InstanceId::new("inst-1"),
            period: period("2024-03"),
            from: StatusId::new("pending"),
            to: StatusId::new("done"),
            terminal: true,
            actor: "alice".to_string(),
        },
    };

    let encoded = encode(&response).expect("encode failed");
    let decoded: Response = decode(&encoded).expect("decode failed");

    assert_eq!(response, decoded);
}

#[test]
fn error_response_uses_snake_case_kind() {
    let response = Response::error(ErrorKind::NotFound, "instance not found: x");
    let value: serde_json::Value = serde_json::from_slice(&encode(&response).unwrap()).unwrap();

    assert_eq!(value["type"], "Error");
    assert_eq!(value["kind"], "not_found");
}

#[test]
fn encode_returns_json_without_length_prefix() {
    let encoded = encode(&Response::Ok).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {}", json_str);
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original)
        .await
        .expect("write failed");

    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data)
        .await
        .expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_message_on_empty_stream_reports_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let mut buffer = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
    buffer.extend_from_slice(b"{}");

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge(_)));
}

#[tokio::test]
async fn request_survives_framed_transport() {
    let request = Request::Subscribe {
        patterns: vec![EventPattern::new("task:*")],
    };

    let mut buffer = Vec::new();
    write_message(&mut buffer, &encode(&request).unwrap())
        .await
        .unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_request(&mut cursor, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(read_back, request);
}
