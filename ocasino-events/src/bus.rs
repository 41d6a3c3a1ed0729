use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ocasino_common::PlatformError;
use ocasino_store::model::DeadLetterEntry;
use ocasino_store::repo::DeadLetterRepo;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, warn};

use crate::event::{DomainEvent, Topic};

/// A subscriber to one or more topics. Grounded on the root command bus's
/// dispatch shape (one handler invocation per queued item, failures isolated
/// per handler rather than per queue).
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn topics(&self) -> &[Topic];
    async fn handle(&self, event: &DomainEvent) -> Result<(), PlatformError>;
}

/// How long `publish` will wait for room in a full worker queue before giving
/// up and dead-lettering the event: blocks for a short bounded interval, then
/// drops to a persistent dead-letter table.
const PUBLISH_BACKPRESSURE_TIMEOUT: Duration = Duration::from_millis(50);

/// In-process publish/subscribe bus. Each of `worker_count` workers
/// owns one bounded channel and runs single-threaded, so events routed to the
/// same worker are handled strictly in the order they were published.
/// `publish` hashes the event's player id to pick a worker, which is how
/// per-player ordering is preserved while different players' events can
/// be processed concurrently across workers.
pub struct EventBus {
    senders: Vec<mpsc::Sender<DomainEvent>>,
    subscribers: Arc<RwLock<HashMap<&'static str, Vec<Arc<dyn EventHandler>>>>>,
    dead_letters: Arc<dyn DeadLetterRepo>,
}

impl EventBus {
    pub fn new(worker_count: usize, queue_capacity: usize, dead_letters: Arc<dyn DeadLetterRepo>) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let subscribers: Arc<RwLock<HashMap<&'static str, Vec<Arc<dyn EventHandler>>>>> = Arc::new(RwLock::new(HashMap::new()));
        let mut senders = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(queue_capacity);
            senders.push(tx);
            tokio::spawn(run_worker(worker_id, rx, Arc::clone(&subscribers)));
        }

        Arc::new(Self { senders, subscribers, dead_letters })
    }

    /// Registers `handler` for every topic it names. Safe to call after the
    /// bus has started publishing: subscriber lookups happen per-event inside
    /// each worker.
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        for topic in handler.topics() {
            subscribers.entry(topic.as_str()).or_default().push(Arc::clone(&handler));
        }
    }

    /// Routes `event` to the worker owning its player id. Never fails the
    /// caller: a full queue that doesn't drain within the backpressure window
    /// is recorded to the dead-letter table instead, so publication never
    /// fails the triggering operation.
    pub async fn publish(&self, event: DomainEvent) {
        let worker = self.worker_for(event.player_id());
        let sender = &self.senders[worker];

        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let retry = event.clone();
                match tokio::time::timeout(PUBLISH_BACKPRESSURE_TIMEOUT, sender.send(event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_closed)) => self.dead_letter(retry).await,
                    Err(_timed_out) => {
                        warn!("event worker {worker} queue still full after backpressure window; dead-lettering");
                        self.dead_letter(retry).await;
                    }
                }
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!("event worker {worker} channel closed; dead-lettering");
                self.dead_letter(event).await;
            }
        }
    }

    fn worker_for(&self, player_id: &ocasino_common::ids::PlayerId) -> usize {
        let mut hasher = DefaultHasher::new();
        player_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    async fn dead_letter(&self, event: DomainEvent) {
        let entry = DeadLetterEntry {
            id: uuid::Uuid::new_v4(),
            topic: event.topic().as_str().to_string(),
            payload: event.to_json(),
            failure_reason: "queue full past backpressure window".to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.dead_letters.insert(entry).await {
            error!(error = %e, "failed to persist dead-lettered event; it is now lost");
        }
    }
}

async fn run_worker(
    worker_id: usize,
    mut rx: mpsc::Receiver<DomainEvent>,
    subscribers: Arc<RwLock<HashMap<&'static str, Vec<Arc<dyn EventHandler>>>>>,
) {
    while let Some(event) = rx.recv().await {
        let handlers = subscribers.read().await.get(event.topic().as_str()).cloned().unwrap_or_default();
        for handler in handlers {
            if let Err(e) = handler.handle(&event).await {
                warn!(worker_id, error = %e, topic = event.topic().as_str(), "event handler failed, continuing with remaining handlers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocasino_common::ids::{PartnerId, PlayerId, TransactionId, WalletId};
    use ocasino_common::money::{Amount, Currency};
    use ocasino_store::model::TransactionType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct MemoryDeadLetters(AsyncMutex<Vec<DeadLetterEntry>>);

    #[async_trait]
    impl DeadLetterRepo for MemoryDeadLetters {
        async fn insert(&self, entry: DeadLetterEntry) -> ocasino_common::Result<()> {
            self.0.lock().await.push(entry);
            Ok(())
        }
        async fn list(&self) -> ocasino_common::Result<Vec<DeadLetterEntry>> {
            Ok(self.0.lock().await.clone())
        }
    }

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        topics: Vec<Topic>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn topics(&self) -> &[Topic] {
            &self.topics
        }
        async fn handle(&self, _event: &DomainEvent) -> Result<(), PlatformError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PlatformError::internal("handler boom"));
            }
            Ok(())
        }
    }

    fn sample_event(player: &str) -> DomainEvent {
        DomainEvent::WalletTransactionCreated(crate::event::WalletTransactionCreatedEvent {
            transaction_id: TransactionId::new(),
            wallet_id: WalletId::new(),
            player_id: PlayerId(player.to_string()),
            partner_id: PartnerId::new(),
            tx_type: TransactionType::Deposit,
            currency: Currency::new("USD").unwrap(),
            amount: Amount::from_minor_units(1000),
            updated_balance: Amount::from_minor_units(1000),
            game_id: None,
            game_session_id: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn subscribed_handler_receives_published_event() {
        let dead_letters = Arc::new(MemoryDeadLetters(AsyncMutex::new(Vec::new())));
        let bus = EventBus::new(2, 16, dead_letters);
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingHandler {
            count: Arc::clone(&count),
            topics: vec![Topic::WalletTransactionCreated],
            fail: false,
        }))
        .await;

        bus.publish(sample_event("player-1")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_other_handlers() {
        let dead_letters = Arc::new(MemoryDeadLetters(AsyncMutex::new(Vec::new())));
        let bus = EventBus::new(1, 16, dead_letters);
        let good_count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingHandler {
            count: Arc::new(AtomicUsize::new(0)),
            topics: vec![Topic::WalletTransactionCreated],
            fail: true,
        }))
        .await;
        bus.subscribe(Arc::new(CountingHandler {
            count: Arc::clone(&good_count),
            topics: vec![Topic::WalletTransactionCreated],
            fail: false,
        }))
        .await;

        bus.publish(sample_event("player-1")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(good_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn same_player_events_are_delivered_in_order() {
        let dead_letters = Arc::new(MemoryDeadLetters(AsyncMutex::new(Vec::new())));
        let bus = EventBus::new(4, 16, dead_letters);
        let order = Arc::new(AsyncMutex::new(Vec::new()));

        struct OrderRecorder {
            order: Arc<AsyncMutex<Vec<i64>>>,
            topics: Vec<Topic>,
        }
        #[async_trait]
        impl EventHandler for OrderRecorder {
            fn topics(&self) -> &[Topic] {
                &self.topics
            }
            async fn handle(&self, event: &DomainEvent) -> Result<(), PlatformError> {
                if let DomainEvent::WalletTransactionCreated(e) = event {
                    self.order.lock().await.push(e.amount.minor_units());
                }
                Ok(())
            }
        }

        bus.subscribe(Arc::new(OrderRecorder { order: Arc::clone(&order), topics: vec![Topic::WalletTransactionCreated] }))
            .await;

        for i in 1..=5 {
            let mut event = sample_event("same-player");
            if let DomainEvent::WalletTransactionCreated(ref mut e) = event {
                e.amount = Amount::from_minor_units(i);
            }
            bus.publish(event).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*order.lock().await, vec![1, 2, 3, 4, 5]);
    }
}
