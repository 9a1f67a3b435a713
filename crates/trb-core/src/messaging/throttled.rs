use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that rate-limits outbound replies.
///
/// Best-effort defense against Telegram 429 errors when many updates are
/// answered at once. The adapter still retries once on `RetryAfter`.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        if let Some(lim) = map.get(&chat_id) {
            return lim.clone();
        }

        // A limiter whose next slot has passed no longer constrains its chat.
        let now = Instant::now();
        map.retain(|_, lim| match lim.try_lock() {
            Ok(guard) => guard.next > now,
            Err(_) => true,
        });

        let lim = Arc::new(Mutex::new(IntervalLimiter::new(
            self.cfg.per_chat_min_interval,
        )));
        map.insert(chat_id, lim.clone());
        lim
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_html(chat_id, html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    struct Clocked {
        sent: std::sync::Mutex<Vec<(i64, Instant)>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for Clocked {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, _html: &str) -> Result<MessageRef> {
            self.sent.lock().unwrap().push((chat_id.0, Instant::now()));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }
    }

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(100));
        assert!(lim.reserve().is_zero());
        let second = lim.reserve();
        assert!(second > Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_sends_are_spaced() {
        let inner = Arc::new(Clocked {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(10),
                per_chat_min_interval: Duration::from_millis(500),
            },
        );

        throttled.send_html(ChatId(1), "a").await.unwrap();
        throttled.send_html(ChatId(1), "b").await.unwrap();
        throttled.send_html(ChatId(2), "c").await.unwrap();

        let sent = inner.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].1 - sent[0].1 >= Duration::from_millis(500));
        // Another chat only waits for the global slot.
        assert!(sent[2].1 - sent[1].1 < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_chat_limiters_are_pruned() {
        let inner = Arc::new(Clocked {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(1),
                per_chat_min_interval: Duration::from_millis(100),
            },
        );

        for chat in 0..50 {
            throttled.send_html(ChatId(chat), "x").await.unwrap();
        }
        sleep(Duration::from_secs(1)).await;
        throttled.send_html(ChatId(1000), "y").await.unwrap();

        let map = throttled.per_chat.lock().await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&1000));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_chat_keeps_its_limiter() {
        let inner = Arc::new(Clocked {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(1),
                per_chat_min_interval: Duration::from_millis(500),
            },
        );

        throttled.send_html(ChatId(1), "a").await.unwrap();
        throttled.send_html(ChatId(2), "b").await.unwrap();
        throttled.send_html(ChatId(1), "c").await.unwrap();

        let sent = inner.sent.lock().unwrap().clone();
        assert!(sent[2].1 - sent[0].1 >= Duration::from_millis(500));
        assert_eq!(throttled.per_chat.lock().await.len(), 2);
    }
}
