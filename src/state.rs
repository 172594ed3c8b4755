use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, JwtAuthenticator};
use crate::chat::broker::Broker;
use crate::chat::relay::MessageRelay;
use crate::chat::room::ChatRoomRegistry;
use crate::chat::token::TokenIssuer;
use crate::config::Config;
use crate::engine::retention::RetentionScheduler;
use crate::observability::metrics::Metrics;
use crate::store::MessageStore;
use crate::tracking::LocationStore;

pub struct AppState {
    pub locations: Arc<LocationStore>,
    pub rooms: Arc<ChatRoomRegistry>,
    pub relay: MessageRelay,
    pub retention: Arc<RetentionScheduler>,
    pub authenticator: Arc<dyn Authenticator>,
    pub ws_write_timeout: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn MessageStore>, broker: Arc<dyn Broker>) -> Self {
        Self::with_authenticator(
            config,
            store,
            broker,
            Arc::new(JwtAuthenticator::new(config.jwt_secret.as_deref())),
        )
    }

    pub fn with_authenticator(
        config: &Config,
        store: Arc<dyn MessageStore>,
        broker: Arc<dyn Broker>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let metrics = Metrics::new();
        let rooms = Arc::new(ChatRoomRegistry::new());

        let relay = MessageRelay::new(
            store.clone(),
            broker,
            rooms.clone(),
            TokenIssuer::new(config.broker_token_secret.as_deref()),
            metrics.clone(),
        );
        let retention = Arc::new(RetentionScheduler::new(
            store,
            config.chat_retention,
            metrics.clone(),
        ));

        Self {
            locations: Arc::new(LocationStore::new()),
            rooms,
            relay,
            retention,
            authenticator,
            ws_write_timeout: config.ws_write_timeout,
            metrics,
        }
    }

    /// Samples the gauges that mirror live in-memory state.
    pub fn refresh_gauges(&self) {
        self.metrics
            .couriers_tracked
            .set(self.locations.len() as i64);
        self.metrics
            .chat_room_members
            .set(self.rooms.member_total() as i64);
        self.metrics
            .chat_purges_pending
            .set(self.retention.pending_count() as i64);
    }
}
