// Integration tests for `RestClient` using wiremock.
#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redcode_api::{Error, NewAckRow, NewAlarmRow, RestClient, RowId, Tables, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let client = RestClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn alarm_json(id: i64, code: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "sender_id": "user-1",
        "department_source": "Emergency",
        "code_type": code,
        "message": code,
        "status": status,
        "created_at": "2025-11-20T08:15:00.000000+00:00"
    })
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_latest_active_alarm_query_shape() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .and(query_param("status", "eq.active"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([alarm_json(5, "FIRE ALARM", "active")])),
        )
        .mount(&server)
        .await;

    let row = client.latest_active_alarm().await.unwrap().unwrap();
    assert_eq!(row.id, RowId::Int(5));
    assert_eq!(row.code_type, "FIRE ALARM");
    assert_eq!(row.department_source.as_deref(), Some("Emergency"));
}

#[tokio::test]
async fn test_latest_active_alarm_none() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(client.latest_active_alarm().await.unwrap().is_none());
}

#[tokio::test]
async fn test_recent_alarms_limit() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            alarm_json(9, "BLUE CODE", "active"),
            alarm_json(8, "RED CODE 1", "resolved"),
        ])))
        .mount(&server)
        .await;

    let rows = client.recent_alarms(20).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].status, "resolved");
}

#[tokio::test]
async fn test_insert_alarm_returns_representation() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/alarms"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!({
            "department_source": "Cardiology",
            "code_type": "RED CODE 2",
            "message": "Room 12",
            "status": "active"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([alarm_json(11, "RED CODE 2", "active")])),
        )
        .mount(&server)
        .await;

    let row = client
        .insert_alarm(&NewAlarmRow {
            sender_id: None,
            department_source: "Cardiology".into(),
            code_type: "RED CODE 2".into(),
            message: "Room 12".into(),
            status: "active".into(),
        })
        .await
        .unwrap();
    assert_eq!(row.id, RowId::Int(11));
}

#[tokio::test]
async fn test_update_alarm_status_patches_by_id() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/alarms"))
        .and(query_param("id", "eq.11"))
        .and(body_json(json!({"status": "resolved"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .update_alarm_status(&RowId::Int(11), "resolved")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_acks_for_receiver_filters() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/acknowledgments"))
        .and(query_param("alarm_id", "eq.11"))
        .and(query_param("receiver_id", "eq.station-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 3,
            "alarm_id": 11,
            "receiver_id": "station-7",
            "receiver_department": "Radiology",
            "created_at": "2025-11-20T08:15:02Z"
        }])))
        .mount(&server)
        .await;

    let acks = client
        .acks_for_receiver(&RowId::Int(11), "station-7")
        .await
        .unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].receiver_department.as_deref(), Some("Radiology"));
}

#[tokio::test]
async fn test_insert_ack() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/acknowledgments"))
        .and(body_json(json!({
            "alarm_id": 11,
            "receiver_id": "station-7",
            "receiver_department": "Radiology"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": 4,
            "alarm_id": 11,
            "receiver_id": "station-7",
            "receiver_department": "Radiology",
            "created_at": "2025-11-20T08:15:03Z"
        }])))
        .mount(&server)
        .await;

    let ack = client
        .insert_ack(&NewAckRow {
            alarm_id: RowId::Int(11),
            receiver_id: "station-7".into(),
            receiver_department: Some("Radiology".into()),
        })
        .await
        .unwrap();
    assert_eq!(ack.id, RowId::Int(4));
}

#[tokio::test]
async fn test_custom_table_names() {
    let (server, client) = setup().await;
    let client = client.with_tables(Tables {
        alarms: "code_alarms".into(),
        acknowledgments: "code_acks".into(),
    });

    Mock::given(method("GET"))
        .and(path("/rest/v1/code_acks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.acks_for_alarm(&RowId::Int(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_key_headers_are_sent() {
    let server = MockServer::start().await;
    let client = RestClient::from_api_key(
        &server.uri(),
        &SecretString::from("anon-key"),
        Some(&SecretString::from("user-jwt")),
        &TransportConfig::default(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client.recent_alarms(1).await.unwrap();
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let err = client.recent_alarms(5).await.unwrap_err();
    match err {
        Error::Authentication { message } => assert_eq!(message, "Invalid API key"),
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn test_postgrest_error_body_is_structured() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/alarms"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "22P02",
            "message": "invalid input syntax for type bigint",
            "details": null,
            "hint": null
        })))
        .mount(&server)
        .await;

    let err = client
        .update_alarm_status(&RowId::Text("abc".into()), "resolved")
        .await
        .unwrap_err();
    assert_eq!(err.api_error_code(), Some("22P02"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client.latest_active_alarm().await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_secs: 7 }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_empty_insert_representation() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/acknowledgments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = client
        .insert_ack(&NewAckRow {
            alarm_id: RowId::Int(1),
            receiver_id: "s".into(),
            receiver_department: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyRepresentation { .. }));
}

#[tokio::test]
async fn test_malformed_body_keeps_raw_text() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client.recent_alarms(1).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>gateway</html>"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}
