use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the coordination server (§4.15).
///
/// Everything here is a best-effort counter read with `Ordering::Relaxed` —
/// these feed a snapshot for operators, not billing or consistency checks.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub clients_connected: AtomicU64,
    pub clients_active: AtomicU64,
    pub clients_disconnected: AtomicU64,
    pub connection_errors: AtomicU64,

    pub lobbies_entered: AtomicU64,
    pub rooms_created: AtomicU64,
    pub rooms_joined: AtomicU64,
    pub rooms_retired: AtomicU64,
    pub room_join_failures: AtomicU64,
    pub games_started: AtomicU64,
    pub games_ended: AtomicU64,

    pub chat_messages: AtomicU64,
    pub game_messages: AtomicU64,
    pub chat_rejections: AtomicU64,

    pub map_cache_hits: AtomicU64,
    pub map_cache_misses: AtomicU64,
    pub map_download_retries: AtomicU64,
    pub map_download_failures: AtomicU64,

    pub validation_errors: AtomicU64,
    pub internal_errors: AtomicU64,

    pub retry_attempts: AtomicU64,
    pub retry_successes: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub clients: ClientMetrics,
    pub scopes: ScopeMetrics,
    pub chat: ChatMetrics,
    pub map_provider: MapProviderMetrics,
    pub errors: ErrorMetrics,
    pub retries: RetryMetrics,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientMetrics {
    pub connected: u64,
    pub active: u64,
    pub disconnected: u64,
    pub connection_errors: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScopeMetrics {
    pub lobbies_entered: u64,
    pub rooms_created: u64,
    pub rooms_joined: u64,
    pub rooms_retired: u64,
    pub room_join_failures: u64,
    pub games_started: u64,
    pub games_ended: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMetrics {
    pub chat_messages: u64,
    pub game_messages: u64,
    pub chat_rejections: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MapProviderMetrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub download_retries: u64,
    pub download_failures: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorMetrics {
    pub validation_errors: u64,
    pub internal_errors: u64,
    pub total_errors: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_clients_connected(&self) {
        self.clients_connected.fetch_add(1, Ordering::Relaxed);
        self.clients_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_clients_active(&self) {
        let _ = self
            .clients_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                if current > 0 {
                    Some(current - 1)
                } else {
                    None
                }
            });
        self.clients_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connection_errors(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lobbies_entered(&self) {
        self.lobbies_entered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_joined(&self) {
        self.rooms_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_retired(&self) {
        self.rooms_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_room_join_failures(&self) {
        self.room_join_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_games_started(&self) {
        self.games_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_games_ended(&self) {
        self.games_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_chat_messages(&self) {
        self.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_game_messages(&self) {
        self.game_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_chat_rejections(&self) {
        self.chat_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_map_cache_hit(&self) {
        self.map_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_map_cache_miss(&self) {
        self.map_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_map_download_retries(&self) {
        self.map_download_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_map_download_failures(&self) {
        self.map_download_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_errors(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_internal_errors(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retry_attempts(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retry_successes(&self) {
        self.retry_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let validation_errors = self.validation_errors.load(Ordering::Relaxed);
        let internal_errors = self.internal_errors.load(Ordering::Relaxed);
        let retry_attempts = self.retry_attempts.load(Ordering::Relaxed);
        let retry_successes = self.retry_successes.load(Ordering::Relaxed);
        let success_rate = if retry_attempts > 0 {
            (retry_successes as f64) / (retry_attempts as f64)
        } else {
            1.0
        };

        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            clients: ClientMetrics {
                connected: self.clients_connected.load(Ordering::Relaxed),
                active: self.clients_active.load(Ordering::Relaxed),
                disconnected: self.clients_disconnected.load(Ordering::Relaxed),
                connection_errors: self.connection_errors.load(Ordering::Relaxed),
            },
            scopes: ScopeMetrics {
                lobbies_entered: self.lobbies_entered.load(Ordering::Relaxed),
                rooms_created: self.rooms_created.load(Ordering::Relaxed),
                rooms_joined: self.rooms_joined.load(Ordering::Relaxed),
                rooms_retired: self.rooms_retired.load(Ordering::Relaxed),
                room_join_failures: self.room_join_failures.load(Ordering::Relaxed),
                games_started: self.games_started.load(Ordering::Relaxed),
                games_ended: self.games_ended.load(Ordering::Relaxed),
            },
            chat: ChatMetrics {
                chat_messages: self.chat_messages.load(Ordering::Relaxed),
                game_messages: self.game_messages.load(Ordering::Relaxed),
                chat_rejections: self.chat_rejections.load(Ordering::Relaxed),
            },
            map_provider: MapProviderMetrics {
                cache_hits: self.map_cache_hits.load(Ordering::Relaxed),
                cache_misses: self.map_cache_misses.load(Ordering::Relaxed),
                download_retries: self.map_download_retries.load(Ordering::Relaxed),
                download_failures: self.map_download_failures.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                validation_errors,
                internal_errors,
                total_errors: validation_errors + internal_errors,
            },
            retries: RetryMetrics {
                attempts: retry_attempts,
                successes: retry_successes,
                success_rate,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn decrement_active_clients_does_not_underflow() {
        let metrics = ServerMetrics::new();
        for _ in 0..10 {
            metrics.decrement_clients_active();
        }
        assert_eq!(metrics.clients_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.clients_disconnected.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn concurrent_increments_tally_correctly() {
        let metrics = Arc::new(ServerMetrics::new());
        let mut handles = Vec::with_capacity(100);
        for _ in 0..100 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                metrics.increment_clients_connected();
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }
        assert_eq!(metrics.clients_connected.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.clients_active.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn snapshot_reports_retry_success_rate() {
        let metrics = ServerMetrics::new();
        metrics.increment_retry_attempts();
        metrics.increment_retry_attempts();
        metrics.increment_retry_successes();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retries.attempts, 2);
        assert_eq!(snapshot.retries.successes, 1);
        assert!((snapshot.retries.success_rate - 0.5).abs() < f64::EPSILON);
    }
}
