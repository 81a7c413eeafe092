//! Integration tests for the pipeline using wiremock.
//!
//! Open-Meteo and the image generator are both served by mock HTTP servers.

use std::{path::Path, sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, TimeZone, Utc};
use citysky_core::{
    CityRecord, CoreError, ImageOrchestrator, Pipeline, PipelineTimeouts, RunId, Stage,
    provider::{gemini::GeminiImageGenerator, openmeteo::OpenMeteoProvider},
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "test-model";
const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

fn paris() -> CityRecord {
    CityRecord { name: "Paris".into(), country: Some("FR".into()), lat: 48.85, lon: 2.35 }
}

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
}

/// A day of hourly data where only the 10:00 slot carries the interesting values.
fn forecast_body() -> Value {
    let times: Vec<String> = (0..24).map(|h| format!("2024-05-01T{h:02}:00")).collect();
    let pick = |hit: Value, other: Value| -> Vec<Value> {
        (0..24).map(|h| if h == 10 { hit.clone() } else { other.clone() }).collect()
    };
    json!({
        "timezone": "GMT",
        "utc_offset_seconds": 0,
        "hourly": {
            "time": times,
            "temperature_2m": pick(json!(14.26), json!(5.0)),
            "weather_code": pick(json!(61), json!(0)),
            "cloud_cover": pick(json!(80), json!(0)),
            "wind_speed_10m": pick(json!(10.0), json!(60.0)),
            "precipitation_probability": pick(json!(20), json!(90)),
            "precipitation": pick(json!(0.0), json!(3.0)),
            "rain": pick(json!(0.0), json!(3.0)),
            "showers": pick(json!(0.0), json!(0.0)),
            "snowfall": pick(json!(null), json!(1.0))
        }
    })
}

async fn mount_forecast(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("forecast_days", "1"))
        .and(query_param("timezone", "auto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(server)
        .await;
}

fn pipeline(weather: &MockServer, images: &MockServer, key: Option<&str>, out: &Path) -> Pipeline {
    let provider = OpenMeteoProvider::with_base_url(format!("{}/v1", weather.uri()), Duration::from_secs(5))
        .expect("weather client");
    let generator = GeminiImageGenerator::new(
        key.map(str::to_owned),
        MODEL.into(),
        format!("{}/v1beta", images.uri()),
        Duration::from_secs(5),
    )
    .expect("image client");
    let orchestrator =
        ImageOrchestrator::new(Arc::new(generator), out.to_path_buf(), Duration::from_secs(5));

    Pipeline::new(Arc::new(provider), orchestrator)
        .with_timeouts(PipelineTimeouts { weather: Duration::from_secs(5) })
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn paris_light_rain_with_fallback_image() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;
    mount_forecast(&weather).await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot draw today." }] } }]
        })))
        .expect(1)
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());

    let outcome = p.select_at(paris(), reference()).await.expect("run succeeds");

    assert!(outcome.narrative.starts_with("light rain"));
    assert!(outcome.narrative.contains("overcast"));
    assert!(!outcome.narrative.contains("windy"));
    assert!(!outcome.narrative.contains("stormy"));
    assert!(!outcome.narrative.contains("precip. chance"));
    assert_eq!(outcome.narrative, "light rain, overcast");

    assert_eq!(outcome.slot_time.as_deref(), Some("2024-05-01T10:00"));
    assert_eq!(outcome.local_time, "09:30");
    assert_eq!(outcome.headline(), "Paris, FR, 14.3°C (57.7°F)");

    assert!(outcome.image.is_fallback());
    assert!(outcome.image.reason().is_some());
    let svg = std::fs::read_to_string(outcome.image.path()).expect("placeholder readable");
    assert!(svg.contains("<svg"));
    assert!(svg.contains("light rain, overcast"));
    assert_eq!(file_count(out.path()), 1);

    let board = p.board().snapshot();
    assert_eq!(board.stage, Stage::Done);
    assert_eq!(board.result.map(|r| r.run_id), Some(outcome.run_id));
}

#[tokio::test]
async fn prompt_carries_city_conditions_and_local_time() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;
    mount_forecast(&weather).await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());
    p.select_at(paris(), reference()).await.expect("run succeeds");

    let requests = images.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().expect("prompt text");
    assert!(prompt.contains("image of Paris"));
    assert!(prompt.contains("light rain, overcast"));
    assert!(prompt.contains("Time of day: 09:30 (local)."));
}

#[tokio::test]
async fn inline_image_is_written_as_png() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;
    mount_forecast(&weather).await;

    let png = b"\x89PNG\r\n\x1a\nfake-image-bytes";
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is Paris." },
                { "inline_data": { "mime_type": "image/png", "data": BASE64.encode(png) } }
            ]}}]
        })))
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());
    let outcome = p.select_at(paris(), reference()).await.expect("run succeeds");

    assert!(!outcome.image.is_fallback());
    assert_eq!(outcome.image.path().extension().and_then(|e| e.to_str()), Some("png"));
    assert_eq!(std::fs::read(outcome.image.path()).expect("read png"), png);
}

#[tokio::test]
async fn image_upstream_failure_still_completes() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;
    mount_forecast(&weather).await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exhausted"))
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());
    let outcome = p.select_at(paris(), reference()).await.expect("fallback is success");

    assert!(outcome.image.is_fallback());
    let reason = outcome.image.reason().expect("reason");
    assert!(reason.contains("500"));
    assert!(reason.contains("quota exhausted"));
    assert_eq!(p.board().snapshot().stage, Stage::Done);
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .expect(0)
        .mount(&weather)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let img_dir = out.path().join("img");
    let p = pipeline(&weather, &images, None, &img_dir);

    let err = p.select_at(paris(), reference()).await.unwrap_err();

    assert!(matches!(err, CoreError::MissingCredential { .. }));
    let board = p.board().snapshot();
    assert_eq!(board.stage, Stage::Error);
    assert!(board.error.as_deref().is_some_and(|m| m.contains("GOOGLE_API_KEY not configured")));
    assert!(board.result.is_none());
    assert!(!img_dir.exists());
}

#[tokio::test]
async fn weather_failure_ends_in_error_without_image() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&weather)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());

    let err = p.select_at(paris(), reference()).await.unwrap_err();

    assert!(matches!(err, CoreError::Weather(_)));
    assert!(err.to_string().contains("503"));
    let board = p.board().snapshot();
    assert_eq!(board.stage, Stage::Error);
    assert!(board.result.is_none());
    assert_eq!(file_count(out.path()), 0);
}

#[tokio::test]
async fn slow_weather_times_out() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&weather)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path())
        .with_timeouts(PipelineTimeouts { weather: Duration::from_millis(200) });

    let err = p.select_at(paris(), reference()).await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }));
    assert_eq!(p.board().snapshot().stage, Stage::Error);
}

#[tokio::test]
async fn superseded_run_does_not_overwrite_newer_result() {
    let weather = MockServer::start().await;
    let images = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&weather)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&weather)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&images)
        .await;

    let out = tempfile::tempdir().expect("tempdir");
    let p = pipeline(&weather, &images, Some("KEY"), out.path());

    let slow = CityRecord { name: "Slowtown".into(), country: None, lat: 1.0, lon: 1.0 };
    let fast = CityRecord { name: "Fastville".into(), country: None, lat: 2.0, lon: 2.0 };

    let (first, second) =
        tokio::join!(p.select_at(slow, reference()), p.select_at(fast, reference()));
    let first = first.expect("slow run completes");
    let second = second.expect("fast run completes");

    assert_eq!(first.run_id, RunId(1));
    assert_eq!(second.run_id, RunId(2));

    let board = p.board().snapshot();
    assert_eq!(board.latest, RunId(2));
    assert_eq!(board.stage, Stage::Done);
    let shown = board.result.expect("newest result shown");
    assert_eq!(shown.run_id, RunId(2));
    assert_eq!(shown.city.name, "Fastville");
}
