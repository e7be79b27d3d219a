//! JSON-over-HTTP transport for the service.
//!
//! Handlers only translate between wire shapes and [`AffectService`] calls;
//! no state lives here.

use affect_core::{Descriptor, EmotionLabel, EmotionVector, GeoLocation, SampleInput};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ApiError;
use crate::service::{AffectService, RecognitionContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub descriptor: Option<Vec<f64>>,
    pub gender: Option<String>,
    pub gender_probability: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub descriptor: Option<Vec<f64>>,
    pub gender: Option<String>,
    pub gender_probability: Option<f64>,
    pub emotion: Option<EmotionLabel>,
    pub timestamp: Option<String>,
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AppendSampleRequest {
    pub timestamp: f64,
    pub expressions: EmotionVector,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreVideoRequest {
    pub video_id: Option<String>,
    pub emotion_data: Option<Vec<SampleInput>>,
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    pub interval: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct KeyMomentsQuery {
    pub threshold: Option<f64>,
}

/// Build the router with all routes and middleware.
pub fn router(service: AffectService, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/register-face", post(register_face))
        .route("/api/recognize-face", post(recognize_face))
        .route("/api/attendance", get(attendance))
        .route("/api/data", get(data))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(session_info).delete(discard_session))
        .route("/api/sessions/:id/samples", post(append_sample))
        .route("/api/sessions/:id/close", post(close_session))
        .route("/api/sessions/:id/summary", get(summary))
        .route("/api/sessions/:id/timeline", get(timeline))
        .route("/api/sessions/:id/trends", get(trends))
        .route("/api/sessions/:id/key-moments", get(key_moments))
        .route("/api/sessions/:id/transitions", get(transitions))
        .route("/api/sessions/:id/report", get(report))
        .route("/api/video-analytics/store", post(store_video))
        .route("/api/video-analytics/summary/all", get(video_summaries))
        .route("/api/video-analytics/:video_id", get(video))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .with_state(service)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

fn session_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("No session found with id {id}"))
}

async fn health(State(service): State<AffectService>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "faceCount": service.identity_count().await,
        "sessionCount": service.session_count().await,
        "descriptorDim": service.settings().descriptor_dim,
        "matchThreshold": service.settings().match_threshold,
    }))
}

async fn register_face(
    State(service): State<AffectService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(body) = payload?;
    let (Some(name), Some(descriptor)) = (body.name, body.descriptor) else {
        return Err(ApiError::BadRequest("Name and descriptor are required".into()));
    };
    let count = service
        .register(&name, Descriptor::new(descriptor), body.gender, body.gender_probability)
        .await?;

    Ok(Json(RegisterResponse {
        success: true,
        message: format!("Face registered for {name}"),
        count,
    }))
}

async fn recognize_face(
    State(service): State<AffectService>,
    payload: Result<Json<RecognizeRequest>, JsonRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let Json(body) = payload?;
    let descriptor = body
        .descriptor
        .ok_or_else(|| ApiError::BadRequest("Valid descriptor array required".into()))?;
    let context = RecognitionContext {
        gender: body.gender,
        gender_probability: body.gender_probability,
        emotion: body.emotion,
        timestamp: body.timestamp,
        location: body.location,
    };

    let result = service.recognize(&Descriptor::new(descriptor), context).await?;
    let response = if result.matched {
        RecognizeResponse {
            recognized: true,
            name: result.name,
            confidence: result.confidence,
            message: None,
        }
    } else {
        RecognizeResponse {
            recognized: false,
            name: None,
            confidence: None,
            message: Some("No match found".into()),
        }
    };
    Ok(Json(response))
}

async fn attendance(State(service): State<AffectService>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "records": service.attendance().await,
    }))
}

async fn data(State(service): State<AffectService>) -> impl IntoResponse {
    Json(service.stats().await)
}

async fn create_session(
    State(service): State<AffectService>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let duration = body.and_then(|Json(b)| b.duration);
    let info = service.create_session(duration).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn session_info(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let info = service
        .session_info(&id)
        .await
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(info))
}

async fn discard_session(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if service.discard_session(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(&id))
    }
}

async fn append_sample(
    State(service): State<AffectService>,
    Path(id): Path<String>,
    payload: Result<Json<AppendSampleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let count = service
        .append_sample(&id, body.timestamp, body.expressions)
        .await?
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(serde_json::json!({ "success": true, "count": count })))
}

async fn close_session(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !service.close_session(&id).await {
        return Err(session_not_found(&id));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn summary(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = service.summary(&id).await.ok_or_else(|| session_not_found(&id))?;
    Ok(Json(summary))
}

async fn timeline(
    State(service): State<AffectService>,
    Path(id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let segments = service
        .timeline(&id, query.duration)
        .await
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(segments))
}

async fn trends(
    State(service): State<AffectService>,
    Path(id): Path<String>,
    Query(query): Query<TrendsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let buckets = service
        .trends(&id, query.interval)
        .await
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(buckets))
}

async fn key_moments(
    State(service): State<AffectService>,
    Path(id): Path<String>,
    Query(query): Query<KeyMomentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let moments = service
        .key_moments(&id, query.threshold)
        .await
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(moments))
}

async fn transitions(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let transitions = service
        .transitions(&id)
        .await
        .ok_or_else(|| session_not_found(&id))?;
    Ok(Json(transitions))
}

async fn report(
    State(service): State<AffectService>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = service.report(&id).await.ok_or_else(|| session_not_found(&id))?;
    Ok(Json(report))
}

async fn store_video(
    State(service): State<AffectService>,
    payload: Result<Json<StoreVideoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let (Some(video_id), Some(emotion_data), Some(duration)) =
        (body.video_id, body.emotion_data, body.duration)
    else {
        return Err(ApiError::BadRequest(
            "Missing required fields: videoId, emotionData, or duration".into(),
        ));
    };
    let timestamp = service.store_video(&video_id, emotion_data, duration).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Analytics data stored successfully",
        "timestamp": timestamp,
    })))
}

async fn video(
    State(service): State<AffectService>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let video = service.video(&video_id).await.ok_or_else(|| {
        ApiError::NotFound("No analytics data found for the specified video".into())
    })?;
    Ok(Json(video))
}

async fn video_summaries(State(service): State<AffectService>) -> impl IntoResponse {
    Json(service.video_summaries().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceSettings;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(dim: usize) -> Router {
        let config = Config {
            descriptor_dim: dim,
            ..Config::default()
        };
        router(AffectService::new(ServiceSettings::from(&config)), &config)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn zeros_with(first: f64) -> Vec<f64> {
        let mut v = vec![0.0; 128];
        v[0] = first;
        v
    }

    #[tokio::test]
    async fn test_register_and_recognize() {
        let app = app(128);
        let (status, body) = send(
            &app,
            "POST",
            "/api/register-face",
            Some(json!({ "name": "Alice", "descriptor": zeros_with(0.0) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["success"], true);

        let (status, body) = send(
            &app,
            "POST",
            "/api/recognize-face",
            Some(json!({
                "descriptor": zeros_with(0.01),
                "emotion": "happy",
                "location": { "latitude": 52.52, "longitude": 13.405 }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recognized"], true);
        assert_eq!(body["name"], "Alice");
        assert!((body["confidence"].as_f64().unwrap() - 0.98333).abs() < 1e-4);

        let (_, body) = send(&app, "GET", "/api/attendance", None).await;
        let records = body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["location"]["latitude"], 52.52);
    }

    #[tokio::test]
    async fn test_recognize_no_match() {
        let app = app(128);
        let (status, body) = send(
            &app,
            "POST",
            "/api/recognize-face",
            Some(json!({ "descriptor": zeros_with(0.5) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "recognized": false, "message": "No match found" }));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflict() {
        let app = app(2);
        let req = json!({ "name": "bob", "descriptor": [0.1, 0.2] });
        send(&app, "POST", "/api/register-face", Some(req.clone())).await;
        let (status, body) = send(&app, "POST", "/api/register-face", Some(req)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (_, body) = send(&app, "GET", "/api/data", None).await;
        assert_eq!(body["faceCount"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = app(2);
        let (status, _) = send(
            &app,
            "POST",
            "/api/register-face",
            Some(json!({ "descriptor": [0.1, 0.2] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/recognize-face",
            Some(json!({ "descriptor": [0.1, 0.2, 0.3] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("dimension"));

        let (status, _) = send(&app, "POST", "/api/recognize-face", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_bodies_are_json_bad_requests() {
        let app = app(2);

        let (status, body) = send(
            &app,
            "POST",
            "/api/recognize-face",
            Some(json!({ "descriptor": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            "POST",
            "/api/recognize-face",
            Some(json!({ "descriptor": [0.1, 0.2], "emotion": "bored" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            "POST",
            "/api/register-face",
            Some(json!({ "name": "carol", "descriptor": { "x": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, session) = send(&app, "POST", "/api/sessions", None).await;
        let id = session["id"].as_str().unwrap().to_string();
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/sessions/{id}/samples"),
            Some(json!({ "timestamp": 0.0, "expressions": { "bored": 0.5 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("bored"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/video-analytics/store",
            Some(json!({ "videoId": "v", "duration": 1.0, "emotionData": "none" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, info) = send(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(info["sampleCount"], 0);
    }

    #[tokio::test]
    async fn test_extreme_timestamp_does_not_break_trends() {
        let app = app(2);
        let (_, session) = send(&app, "POST", "/api/sessions", None).await;
        let id = session["id"].as_str().unwrap().to_string();
        for t in [1.0, 1e30] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/sessions/{id}/samples"),
                Some(json!({ "timestamp": t, "expressions": { "happy": 1.0 } })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, trends) = send(
            &app,
            "GET",
            &format!("/api/sessions/{id}/trends?interval=0.000001"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trends.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "GET", &format!("/api/sessions/{id}/report"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_flow() {
        let app = app(2);
        let (status, body) = send(&app, "POST", "/api/sessions", Some(json!({ "duration": 3.0 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        for (t, expressions) in [
            (0.0, json!({ "happy": 0.9, "neutral": 0.1 })),
            (1.0, json!({ "happy": 0.8, "neutral": 0.2 })),
            (2.0, json!({ "sad": 0.75, "neutral": 0.25 })),
        ] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/sessions/{id}/samples"),
                Some(json!({ "timestamp": t, "expressions": expressions })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, summary) = send(&app, "GET", &format!("/api/sessions/{id}/summary"), None).await;
        assert_eq!(summary["dominantEmotion"], "happy");
        assert_eq!(summary["numberOfTransitions"], 1);
        assert_eq!(summary["keyMomentsCount"], 3);

        let (_, transitions) =
            send(&app, "GET", &format!("/api/sessions/{id}/transitions"), None).await;
        assert_eq!(
            transitions,
            json!([{ "from": "happy", "to": "sad", "timestamp": 2.0, "intensity": 75 }])
        );

        let (_, timeline) =
            send(&app, "GET", &format!("/api/sessions/{id}/timeline?duration=30"), None).await;
        assert_eq!(timeline.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "POST", &format!("/api/sessions/{id}/close"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/sessions/{id}/samples"),
            Some(json!({ "timestamp": 3.0, "expressions": { "happy": 1.0 } })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/sessions/{id}/summary"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_session_summary() {
        let app = app(2);
        let (_, body) = send(&app, "POST", "/api/sessions", None).await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, summary) = send(&app, "GET", &format!("/api/sessions/{id}/summary"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["engagementScore"], 0);
        assert_eq!(summary["emotionDistribution"], json!({}));
        assert_eq!(summary["numberOfTransitions"], 0);
    }

    #[tokio::test]
    async fn test_video_analytics_store_and_fetch() {
        let app = app(2);
        let (status, _) = send(
            &app,
            "POST",
            "/api/video-analytics/store",
            Some(json!({
                "videoId": "lecture-1",
                "duration": 20.0,
                "emotionData": [
                    { "timestamp": 0.0, "expressions": { "happy": 0.9 }, "dominantEmotion": "happy" },
                    { "timestamp": 5.0, "expressions": { "surprised": 0.7, "happy": 0.3 } }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/api/video-analytics/lecture-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["totalDataPoints"], 2);
        assert_eq!(body["summary"]["peaks"][0]["to"], "surprised");

        let (_, all) = send(&app, "GET", "/api/video-analytics/summary/all", None).await;
        assert_eq!(all[0]["videoId"], "lecture-1");

        let (status, _) = send(&app, "GET", "/api/video-analytics/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/api/video-analytics/store",
            Some(json!({ "videoId": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(128);
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["descriptorDim"], 128);
    }
}
