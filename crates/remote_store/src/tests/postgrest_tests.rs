use super::*;
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, Method as HttpMethod, StatusCode as HttpStatus},
    routing::any,
    Router,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: HttpMethod,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    body: String,
}

struct Scripted {
    status: HttpStatus,
    headers: Vec<(&'static str, String)>,
    body: String,
}

#[derive(Clone)]
struct MockState {
    recorded: Arc<Mutex<Vec<Recorded>>>,
    reply: Arc<Mutex<Scripted>>,
}

async fn handle(
    State(state): State<MockState>,
    method: HttpMethod,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> (HttpStatus, HeaderMap, String) {
    let params = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .into_owned()
        .collect();
    state.recorded.lock().await.push(Recorded {
        method,
        params,
        headers,
        body,
    });

    let reply = state.reply.lock().await;
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/json".parse().expect("header"));
    for (name, value) in &reply.headers {
        headers.insert(*name, value.parse().expect("header"));
    }
    (reply.status, headers, reply.body.clone())
}

async fn spawn_rest_server(
    status: HttpStatus,
    headers: Vec<(&'static str, String)>,
    body: &str,
) -> (PostgrestTable, Arc<Mutex<Vec<Recorded>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MockState {
        recorded: Arc::new(Mutex::new(Vec::new())),
        reply: Arc::new(Mutex::new(Scripted {
            status,
            headers,
            body: body.to_string(),
        })),
    };
    let recorded = state.recorded.clone();
    let app = Router::new()
        .route("/rest/v1/usuarios", any(handle))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (
        PostgrestTable::new(format!("http://{addr}/"), "anon-key"),
        recorded,
    )
}

fn user_json(id: i64, nombre: &str, email: &str) -> Value {
    serde_json::json!({
        "id": id,
        "nombre": nombre,
        "email": email,
        "telefono": null,
        "edad": 30,
        "ciudad": "Madrid",
        "profesion": null,
        "fecha_creacion": "2026-10-19T14:05:00+00:00"
    })
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[test]
fn encodes_filters_order_and_limit() {
    let query = SelectQuery::new()
        .filter(Filter::AnyContains(
            vec![Column::Nombre, Column::Email, Column::Ciudad],
            "ana".into(),
        ))
        .filter(Filter::Eq(Column::Profesion, "Ingeniero".into()))
        .filter(Filter::NotNull(Column::Ciudad))
        .order_desc(Column::FechaCreacion)
        .order_desc(Column::Id)
        .limit(5);

    let params = query_params(&query);

    assert_eq!(param(&params, "select"), Some("*"));
    assert_eq!(
        param(&params, "or"),
        Some(r#"(nombre.ilike."*ana*",email.ilike."*ana*",ciudad.ilike."*ana*")"#)
    );
    assert_eq!(param(&params, "profesion"), Some("eq.Ingeniero"));
    assert_eq!(param(&params, "ciudad"), Some("not.is.null"));
    assert_eq!(param(&params, "order"), Some("fecha_creacion.desc,id.desc"));
    assert_eq!(param(&params, "limit"), Some("5"));
}

#[test]
fn search_term_with_reserved_characters_is_quoted() {
    let query = SelectQuery::new().filter(Filter::AnyContains(
        vec![Column::Nombre],
        r#"a,"b"(c)"#.into(),
    ));
    let params = query_params(&query);
    assert_eq!(
        param(&params, "or"),
        Some(r#"(nombre.ilike."*a,\"b\"(c)*")"#)
    );
}

#[test]
fn like_wildcards_in_search_term_are_escaped() {
    let query = SelectQuery::new().filter(Filter::AnyContains(
        vec![Column::Email],
        "100%_a".into(),
    ));
    let params = query_params(&query);
    assert_eq!(
        param(&params, "or"),
        Some(r#"(email.ilike."*100\\%\\_a*")"#)
    );
}

#[test]
fn parses_content_range_totals() {
    assert_eq!(parse_content_range_total("0-24/25"), Some(25));
    assert_eq!(parse_content_range_total("*/0"), Some(0));
    assert_eq!(parse_content_range_total("0-9/*"), None);
    assert_eq!(parse_content_range_total("garbage"), None);
}

#[tokio::test]
async fn select_sends_credentials_and_decodes_rows() {
    let body = Value::Array(vec![user_json(2, "Ana", "ana@test.com")]).to_string();
    let (table, recorded) = spawn_rest_server(HttpStatus::OK, Vec::new(), &body).await;

    let users = table
        .select(&SelectQuery::new().filter(Filter::IdEq(UserId(2))))
        .await
        .expect("select");

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, UserId(2));
    assert_eq!(users[0].edad, Some(30));

    let recorded = recorded.lock().await;
    let request = &recorded[0];
    assert_eq!(request.method, HttpMethod::GET);
    assert_eq!(request.headers["apikey"], "anon-key");
    assert_eq!(request.headers["authorization"], "Bearer anon-key");
    assert_eq!(param(&request.params, "id"), Some("eq.2"));
}

#[tokio::test]
async fn insert_maps_unique_violation_body() {
    let body = serde_json::json!({
        "code": "23505",
        "message": "duplicate key value violates unique constraint \"usuarios_email_key\"",
        "details": "Key (email)=(ana@test.com) already exists.",
        "hint": null
    })
    .to_string();
    let (table, recorded) = spawn_rest_server(HttpStatus::CONFLICT, Vec::new(), &body).await;

    let row = UserRow {
        nombre: "Ana".into(),
        email: "ana@test.com".into(),
        telefono: None,
        edad: None,
        ciudad: None,
        profesion: None,
    };
    let err = table.insert(&row).await.expect_err("conflict");

    assert!(err.is_unique_violation());
    assert!(err.message.contains("usuarios_email_key"));

    let recorded = recorded.lock().await;
    assert_eq!(recorded[0].method, HttpMethod::POST);
    assert_eq!(recorded[0].headers["prefer"], "return=representation");
    let sent: Value = serde_json::from_str(&recorded[0].body).expect("json body");
    assert_eq!(sent["telefono"], Value::Null);
    assert!(sent.as_object().expect("object").contains_key("profesion"));
}

#[tokio::test]
async fn plain_text_failures_keep_status_and_body() {
    let (table, _) =
        spawn_rest_server(HttpStatus::BAD_GATEWAY, Vec::new(), "upstream unavailable").await;

    let err = table.select(&SelectQuery::new()).await.expect_err("fail");

    assert_eq!(err.code, None);
    assert!(err.message.contains("502"), "unexpected: {}", err.message);
    assert!(err.message.contains("upstream unavailable"));
}

#[tokio::test]
async fn count_reads_content_range() {
    let (table, recorded) = spawn_rest_server(
        HttpStatus::OK,
        vec![("content-range", "0-2/3".to_string())],
        "",
    )
    .await;

    assert_eq!(table.count().await.expect("count"), 3);

    let recorded = recorded.lock().await;
    assert_eq!(recorded[0].method, HttpMethod::HEAD);
    assert_eq!(recorded[0].headers["prefer"], "count=exact");
}

#[tokio::test]
async fn update_without_matching_row_is_none() {
    let (table, recorded) = spawn_rest_server(HttpStatus::OK, Vec::new(), "[]").await;
    let row = UserRow {
        nombre: "Ana".into(),
        email: "ana@test.com".into(),
        telefono: None,
        edad: Some(40),
        ciudad: None,
        profesion: None,
    };

    let updated = table.update(UserId(77), &row).await.expect("update");

    assert!(updated.is_none());
    let recorded = recorded.lock().await;
    assert_eq!(recorded[0].method, HttpMethod::PATCH);
    assert_eq!(param(&recorded[0].params, "id"), Some("eq.77"));
}

#[tokio::test]
async fn delete_reports_removed_rows() {
    let body = Value::Array(vec![user_json(5, "Luis", "luis@test.com")]).to_string();
    let (table, recorded) = spawn_rest_server(HttpStatus::OK, Vec::new(), &body).await;

    assert_eq!(table.delete(UserId(5)).await.expect("delete"), 1);
    assert_eq!(recorded.lock().await[0].method, HttpMethod::DELETE);
}

#[tokio::test]
async fn select_values_skips_nulls() {
    let body = serde_json::json!([
        {"profesion": "Ingeniero"},
        {"profesion": null},
        {"profesion": "Ingeniero"}
    ])
    .to_string();
    let (table, recorded) = spawn_rest_server(HttpStatus::OK, Vec::new(), &body).await;

    let values = table
        .select_values(Column::Profesion)
        .await
        .expect("values");

    assert_eq!(values, vec!["Ingeniero".to_string(), "Ingeniero".to_string()]);
    let recorded = recorded.lock().await;
    assert_eq!(param(&recorded[0].params, "select"), Some("profesion"));
    assert_eq!(param(&recorded[0].params, "profesion"), Some("not.is.null"));
}
