#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;
use vocab_srs::{AlgorithmKind, CardStatus};

use vocab_backend_rust::clock::{Clock, FixedClock};
use vocab_backend_rust::create_app;
use vocab_backend_rust::db::config::DbConfig;
use vocab_backend_rust::db::{self, Store};
use vocab_backend_rust::model::Card;
use vocab_backend_rust::services::cards::{CardService, CreateCardInput};
use vocab_backend_rust::services::study::{ReviewService, ReviewSettings};
use vocab_backend_rust::state::AppState;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
pub struct TestOptions {
    pub algorithm: AlgorithmKind,
    pub lock_timeout: Duration,
    pub deadline: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::FourGrade,
            lock_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
        }
    }
}

/// A migrated SQLite database in a temp dir plus services on a fixed clock.
pub struct TestEnv {
    _dir: TempDir,
    pub options: TestOptions,
    pub store: Arc<dyn Store>,
    pub clock: Arc<FixedClock>,
    pub reviews: ReviewService,
    pub cards: CardService,
}

pub async fn setup() -> TestEnv {
    setup_with(TestOptions::default()).await
}

pub async fn setup_with(options: TestOptions) -> TestEnv {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("vocab.db");

    let mut config =
        DbConfig::for_url(format!("sqlite:{}", path.display())).expect("sqlite url rejected");
    config.max_connections = 5;
    config.lock_timeout = options.lock_timeout;

    let store = db::connect(&config).await.expect("failed to open test store");
    let clock = Arc::new(FixedClock::new(t0()));

    let reviews = ReviewService::new(
        Arc::clone(&store),
        options.algorithm.build(),
        clock.clone() as Arc<dyn Clock>,
        settings(&options),
    );
    let cards = CardService::new(Arc::clone(&store), clock.clone() as Arc<dyn Clock>);

    TestEnv {
        _dir: dir,
        options,
        store,
        clock,
        reviews,
        cards,
    }
}

fn settings(options: &TestOptions) -> ReviewSettings {
    ReviewSettings {
        deadline: options.deadline,
        ..ReviewSettings::default()
    }
}

impl TestEnv {
    pub fn app(&self) -> Router {
        let state = AppState::new(
            Arc::clone(&self.store),
            self.options.algorithm.build(),
            self.clock.clone() as Arc<dyn Clock>,
            settings(&self.options),
        );
        create_app(state)
    }

    /// Registers an entry and a default NEW card for it.
    pub async fn new_card(&self, text: &str) -> Card {
        self.card_with(text, |_| {}).await
    }

    pub async fn card_with(&self, text: &str, customize: impl FnOnce(&mut CreateCardInput)) -> Card {
        let entry = self
            .cards
            .register_entry(text)
            .await
            .expect("register entry");
        let mut input = CreateCardInput {
            entry_id: entry.id,
            ..CreateCardInput::default()
        };
        customize(&mut input);
        self.cards.create_card(input).await.expect("create card")
    }

    /// A card already scheduled for `due_at`.
    pub async fn scheduled_card(
        &self,
        text: &str,
        status: CardStatus,
        due_at: DateTime<Utc>,
        interval_days: i32,
    ) -> Card {
        self.card_with(text, |input| {
            input.status = Some(status);
            input.due_at = Some(due_at);
            input.interval_days = Some(interval_days);
        })
        .await
    }

    pub async fn card(&self, id: Uuid) -> Card {
        self.store
            .get_card(id)
            .await
            .expect("load card")
            .expect("card exists")
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
