use std::fs;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use gpiosim::{AppConfig, AppState, GpioManager};
use serde_json::Value;
use tempfile::TempDir;

fn sample_config(dir: &TempDir) -> AppConfig {
    let root = dir.path().join("gpio");
    serde_json::from_value(serde_json::json!({
        "http": {
            "host": "localhost:8080",
            "path": "/api/v1",
            "timeout": 30
        },
        "device": {
            "mockRootDir": root,
            "poll_interval_ms": 10
        },
        "broadcast_capacity": 16,
        "event_history_capacity": 4
    }))
    .expect("valid sample config")
}

fn sample_state(cfg: &AppConfig) -> AppState {
    let manager = Arc::new(GpioManager::from_config(cfg).expect("device init"));
    AppState { manager }
}

#[actix_rt::test]
async fn list_gpios_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response, serde_json::json!({}));
    assert!(dir.path().join("gpio/meta.json").exists());
}

#[actix_rt::test]
async fn open_output_and_write_value() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/5")
        .set_payload(r#"{"direction":1,"option":1}"#)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        resp,
        serde_json::json!({ "input": false, "initialState": { "high": true } })
    );
    let out = dir.path().join("gpio/out/pin5");
    assert_eq!(fs::read_to_string(&out).unwrap(), "1");

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/5/value")
        .set_payload("0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(fs::read_to_string(&out).unwrap(), "0");

    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response["5"]["input"], false);
}

#[actix_rt::test]
async fn open_input_with_pull_and_read_value() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/7")
        .set_payload(r#"{"direction":0,"option":1}"#)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["internalResistor"]["pullUp"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/7/value")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "0");

    fs::write(dir.path().join("gpio/in/pin7"), "1").unwrap();
    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/7/value")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "1");
}

#[actix_rt::test]
async fn invalid_payloads_return_400() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/1")
        .set_payload(r#"{"direction":2}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/1/value")
        .set_payload("2")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/abc")
        .set_payload(r#"{"direction":0}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // nothing was opened by the rejected requests
    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response, serde_json::json!({}));
}

#[actix_rt::test]
async fn unknown_pin_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/gpio/999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/999/value")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/999/watcher")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn wrong_method_returns_405() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::put()
        .uri("/api/v1/gpio/1/value")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);

    let req = test::TestRequest::get()
        .uri("/api/v1/gpios/reset")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);
}

#[actix_rt::test]
async fn watcher_records_events() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/3")
        .set_payload(r#"{"direction":0}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/3/watcher")
        .set_payload(r#"{"trigger":2}"#)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["watcher"]["trigger"], 2);

    fs::write(dir.path().join("gpio/in/pin3"), "1").unwrap();

    let mut events = Vec::new();
    for _ in 0..100 {
        let req = test::TestRequest::get()
            .uri("/api/v1/gpio/3/events")
            .to_request();
        events = test::call_and_read_body_json::<_, _, Vec<Value>>(&app, req).await;
        if !events.is_empty() {
            break;
        }
        actix_rt::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["pin_id"], 3);
    assert_eq!(events[0]["level"], 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/3/event")
        .to_request();
    let last: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(last["pin_id"], 3);

    let req = test::TestRequest::delete()
        .uri("/api/v1/gpio/3/watcher")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/api/v1/gpio/3").to_request();
    let config: Value = test::call_and_read_body_json(&app, req).await;
    assert!(config.get("watcher").is_none());
}

#[actix_rt::test]
async fn close_and_reset_clear_pins() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    for pin in [1, 2, 3] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/gpio/{pin}"))
            .set_payload(r#"{"direction":1}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    let req = test::TestRequest::delete().uri("/api/v1/gpio/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(!dir.path().join("gpio/out/pin1").exists());

    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response.as_object().map(|m| m.len()), Some(2));

    let req = test::TestRequest::delete().uri("/api/v1/gpios").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response, serde_json::json!({}));

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/4")
        .set_payload(r#"{"direction":0}"#)
        .to_request();
    test::call_service(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/api/v1/gpios/reset")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(!dir.path().join("gpio/in/pin4").exists());
}

#[actix_rt::test]
async fn both_edges_report_their_level() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sample_config(&dir);
    let state = sample_state(&cfg);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(state.api_scope(&cfg.http.path)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/6")
        .set_payload(r#"{"direction":0}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/6/watcher")
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["watcher"]["trigger"], 3);

    let input = dir.path().join("gpio/in/pin6");
    let mut events = Vec::new();
    for (value, expected) in [("1", 1), ("0", 2)] {
        fs::write(&input, value).unwrap();
        for _ in 0..100 {
            let req = test::TestRequest::get()
                .uri("/api/v1/gpio/6/events")
                .to_request();
            events = test::call_and_read_body_json::<_, _, Vec<Value>>(&app, req).await;
            if events.len() >= expected {
                break;
            }
            actix_rt::time::sleep(Duration::from_millis(20)).await;
        }
    }

    let levels: Vec<&Value> = events.iter().map(|e| &e["level"]).collect();
    assert_eq!(levels, [&Value::from(1), &Value::from(0)]);
}
