use std::sync::Arc;
use std::time::Instant;

use vocab_srs::Scheduler;

use crate::clock::Clock;
use crate::db::Store;
use crate::services::cards::CardService;
use crate::services::study::{ReviewService, ReviewSettings};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    store: Arc<dyn Store>,
    reviews: ReviewService,
    cards: CardService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            reviews: ReviewService::new(
                Arc::clone(&store),
                scheduler,
                Arc::clone(&clock),
                settings,
            ),
            cards: CardService::new(Arc::clone(&store), clock),
            store,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn reviews(&self) -> &ReviewService {
        &self.reviews
    }

    pub fn cards(&self) -> &CardService {
        &self.cards
    }
}
