//! Shared fixtures for the router integration tests
//!
//! Builds the full router over an in-memory SQLite pool with stub AI
//! providers, and issues requests through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use snapvault_common::config::Settings;
use snapvault_server::ai::{
    AnalysisPipeline, DescriptionGenerator, DescriptionSource, ImageLabeler, ImageSource,
    LabelAnalysis, ProviderError,
};
use snapvault_server::api::Diagnostics;
use snapvault_server::auth::Claims;
use snapvault_server::storage::MediaStore;
use snapvault_server::db::metadata::StartOutcome;
use snapvault_server::{build_router, db, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";
pub const MEDIA_BASE: &str = "http://localhost:5800";

/// Serves fixed bytes; URLs containing "missing" fail like a 404
pub struct StubSource;

#[async_trait]
impl ImageSource for StubSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        if url.contains("missing") {
            Err(ProviderError::Fetch("404 Not Found".to_string()))
        } else {
            Ok(vec![0xff, 0xd8, 0xff, 0xe0])
        }
    }
}

/// Always labels Beach/Sunset/Ocean after `delay`, counting calls
#[derive(Default)]
pub struct StubLabeler {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl StubLabeler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageLabeler for StubLabeler {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn label(&self, _image: &[u8]) -> Result<LabelAnalysis, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(LabelAnalysis {
            tags: vec!["Beach".to_string(), "Sunset".to_string(), "Ocean".to_string()],
            colors: vec!["#ff8800".to_string(), "#0033cc".to_string()],
        })
    }
}

/// Describer with a canned reply (or failure)
pub struct StubDescriber {
    pub source: DescriptionSource,
    pub reply: Option<&'static str>,
}

#[async_trait]
impl DescriptionGenerator for StubDescriber {
    fn source(&self) -> DescriptionSource {
        self.source
    }

    async fn describe(&self, _tags: &[String]) -> Result<String, ProviderError> {
        self.reply
            .map(str::to_string)
            .ok_or(ProviderError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = SECRET.to_string();
    settings.server.public_base_url = MEDIA_BASE.to_string();
    settings
}

pub async fn test_pool() -> SqlitePool {
    // Single connection: every `:memory:` connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_tables(&pool).await.unwrap();
    pool
}

pub fn token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub labeler: Arc<StubLabeler>,
}

pub struct TestAppBuilder {
    settings: Settings,
    describers: Vec<Arc<dyn DescriptionGenerator>>,
    media: Option<MediaStore>,
    labeler_delay: Duration,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            settings: settings(),
            describers: Vec::new(),
            media: None,
            labeler_delay: Duration::ZERO,
        }
    }

    pub fn settings(mut self, edit: impl FnOnce(&mut Settings)) -> Self {
        edit(&mut self.settings);
        self
    }

    pub fn describer(mut self, source: DescriptionSource, reply: Option<&'static str>) -> Self {
        self.describers.push(Arc::new(StubDescriber { source, reply }));
        self
    }

    pub fn labeler_delay(mut self, delay: Duration) -> Self {
        self.labeler_delay = delay;
        self
    }

    pub fn media(mut self, media: MediaStore) -> Self {
        self.media = Some(media);
        self
    }

    pub async fn build(self) -> TestApp {
        let pool = test_pool().await;
        let labeler = Arc::new(StubLabeler {
            calls: AtomicUsize::new(0),
            delay: self.labeler_delay,
        });

        let mut pipeline = AnalysisPipeline::new(Arc::new(StubSource), labeler.clone());
        for describer in self.describers {
            pipeline = pipeline.with_describer(describer);
        }

        let diagnostics = Diagnostics::new(&self.settings, None).unwrap();
        let mut state =
            AppState::new(pool.clone(), self.settings, pipeline).with_diagnostics(diagnostics);
        if let Some(media) = self.media {
            state = state.with_media(media);
        }

        TestApp {
            router: build_router(state),
            pool,
            labeler,
        }
    }
}

pub async fn test_app() -> TestApp {
    TestAppBuilder::new().build().await
}

impl TestApp {
    /// Send a request and decode the JSON body (Null when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, body)
    }

    /// JSON request as `user` (None sends no Authorization header)
    pub fn request(
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send(Self::request(method, uri, user, body)).await
    }

    /// Raw-body request as `user` with an explicit content type
    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        user: &str,
        content_type: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, user: &str) -> (StatusCode, Value) {
        self.json(Method::GET, uri, Some(user), None).await
    }

    /// Register an image and return its id
    pub async fn create_image(&self, user: &str, filename: &str) -> i64 {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/images",
                Some(user),
                Some(serde_json::json!({
                    "filename": filename,
                    "original_path": format!("https://cdn.example/{}", filename),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", body);
        body["id"].as_i64().unwrap()
    }

    /// Store analysis results directly, bypassing the pipeline
    pub async fn seed_analysis(
        &self,
        user: &str,
        image_id: i64,
        tags: &[&str],
        colors: &[&str],
        description: &str,
    ) {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let colors: Vec<String> = colors.iter().map(|c| c.to_string()).collect();
        let started =
            db::metadata::begin_processing(&self.pool, user, image_id, chrono::Utc::now(), None)
                .await
                .unwrap();
        assert_eq!(started, StartOutcome::Started);
        db::metadata::complete_analysis(
            &self.pool,
            user,
            image_id,
            description,
            &tags,
            &colors,
            "fallback",
        )
        .await
        .unwrap();
    }
}
