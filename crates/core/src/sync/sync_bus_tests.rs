//! Tests for the synchronization bus and the change feed worker.
//!
//! # Contract points
//!
//! 1. Handlers run against a snapshot; one failing handler never blocks others
//! 2. Operations drain strictly FIFO, one at a time
//! 3. A failing operation is attempted exactly `retries` times, then `<type>_error` fires
//! 4. Change bursts collapse into a single `force_refresh`

#[cfg(test)]
mod tests {
    use crate::clients::{ClientMergeServiceTrait, ClientSummary, ClientView, MergedClientView};
    use crate::collections::{InMemoryCollection, RecordCollection};
    use crate::errors::{Error, Result};
    use crate::sync::{
        operation_commit, ChangeFeedConfig, ChangeFeedWorker, NotifyMetadata, SubscriptionToken,
        SyncBus, SyncBusConfig, SyncNotification, SyncOperationRequest, FORCE_REFRESH_TOPIC,
    };
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    // =========================================================================
    // Helpers
    // =========================================================================

    fn bus() -> SyncBus {
        SyncBus::new(SyncBusConfig::default())
    }

    /// Collects notifications for one topic.
    fn collect(bus: &SyncBus, topic: &str) -> Arc<Mutex<Vec<SyncNotification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(topic, move |notification: &SyncNotification| {
            sink.lock().unwrap().push(notification.clone());
            Ok(())
        });
        seen
    }

    fn always_fails(attempts: Arc<Mutex<Vec<Instant>>>) -> SyncOperationRequest {
        SyncOperationRequest::new("add", json!({"name": "Acme"})).with_commit(operation_commit(
            move |_payload: Value| {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.lock().unwrap().push(Instant::now());
                    Err(Error::Commit("remote write rejected".to_string()))
                }
            },
        ))
    }

    // =========================================================================
    // Publish / subscribe
    // =========================================================================

    #[tokio::test]
    async fn unsubscribe_removes_exactly_one_registration() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move |_: &SyncNotification| -> Result<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let first = bus.subscribe("update", make(Arc::clone(&calls)));
        let _second = bus.subscribe("update", make(Arc::clone(&calls)));

        bus.notify("update", Value::Null, NotifyMetadata::now());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(bus.unsubscribe(&first));
        assert!(!bus.unsubscribe(&first));
        bus.notify("update", Value::Null, NotifyMetadata::now());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(bus.handler_count("update"), 1);
    }

    #[tokio::test]
    async fn handler_may_unsubscribe_itself_during_notify() {
        let bus = bus();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let token: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let self_removing = {
            let handler_bus = bus.clone();
            let calls = Arc::clone(&calls);
            let token = Arc::clone(&token);
            bus.subscribe("update", move |_: &SyncNotification| {
                calls.lock().unwrap().push("once");
                if let Some(token) = token.lock().unwrap().take() {
                    handler_bus.unsubscribe(&token);
                }
                Ok(())
            })
        };
        *token.lock().unwrap() = Some(self_removing);

        let steady_calls = Arc::clone(&calls);
        bus.subscribe("update", move |_: &SyncNotification| {
            steady_calls.lock().unwrap().push("steady");
            Ok(())
        });

        bus.notify("update", Value::Null, NotifyMetadata::now());
        bus.notify("update", Value::Null, NotifyMetadata::now());

        assert_eq!(*calls.lock().unwrap(), vec!["once", "steady", "steady"]);
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_are_isolated() {
        let bus = bus();
        bus.subscribe("update", |_: &SyncNotification| {
            Err(Error::Unexpected("widget crashed".to_string()))
        });
        bus.subscribe("update", |_: &SyncNotification| -> Result<()> {
            panic!("handler bug");
        });
        let seen = collect(&bus, "update");

        bus.notify("update", json!({"id": 1}), NotifyMetadata::now());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].payload, json!({"id": 1}));
    }

    #[tokio::test]
    async fn force_refresh_reaches_subscribers_and_stream() {
        let bus = bus();
        let seen = collect(&bus, FORCE_REFRESH_TOPIC);
        let mut stream = bus.subscribe_stream();

        bus.force_refresh();

        assert_eq!(seen.lock().unwrap().len(), 1);
        let streamed = stream.try_recv().unwrap();
        assert_eq!(streamed.topic, "force_refresh");
        assert_eq!(streamed.payload, Value::Null);
    }

    #[tokio::test]
    async fn dispose_drops_all_handlers() {
        let bus = bus();
        let seen = collect(&bus, "update");
        bus.dispose();
        bus.notify("update", Value::Null, NotifyMetadata::now());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.handler_count("update"), 0);
    }

    // =========================================================================
    // Operation queue
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn operations_drain_in_fifo_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = collect(&bus, "update");

        for (index, delay_ms) in [(0u64, 300u64), (1, 10), (2, 100)] {
            let order = Arc::clone(&order);
            bus.enqueue(
                SyncOperationRequest::new("update", json!({"index": index})).with_commit(
                    operation_commit(move |_payload: Value| {
                        let order = Arc::clone(&order);
                        async move {
                            order.lock().unwrap().push(format!("start {}", index));
                            sleep(Duration::from_millis(delay_ms)).await;
                            order.lock().unwrap().push(format!("end {}", index));
                            Ok(())
                        }
                    }),
                ),
            );
        }
        bus.wait_idle().await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
        let payloads: Vec<Value> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.payload["index"].clone())
            .collect();
        assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(bus.stats().succeeded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_operation_emits_error_and_queue_continues() {
        let bus = bus();
        let errors = collect(&bus, "add_error");
        let successes = collect(&bus, "add");
        let refreshed = collect(&bus, "refresh_list");
        let attempts = Arc::new(Mutex::new(Vec::new()));

        bus.enqueue(always_fails(Arc::clone(&attempts)));
        bus.enqueue(SyncOperationRequest::new("refresh_list", json!({})));
        bus.wait_idle().await;

        let attempts = attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_millis(1000));
        assert_eq!(attempts[2] - attempts[1], Duration::from_millis(2000));

        assert!(successes.lock().unwrap().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].metadata.final_attempt);
        assert_eq!(errors[0].metadata.attempt, Some(3));
        assert_eq!(errors[0].payload["payload"], json!({"name": "Acme"}));
        assert!(errors[0].payload["error"]
            .as_str()
            .unwrap()
            .contains("remote write rejected"));

        assert_eq!(refreshed.lock().unwrap().len(), 1);
        assert_eq!(bus.queue_len(), 0);
        let stats = bus.stats();
        assert_eq!((stats.succeeded, stats.failed), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn operation_succeeds_on_retry() {
        let bus = bus();
        let seen = collect(&bus, "update");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let id = bus.enqueue(
            SyncOperationRequest::new("update", json!({"id": "r1"})).with_commit(
                operation_commit(move |_payload: Value| {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(Error::source_unavailable("clients", "timeout"))
                        } else {
                            Ok(())
                        }
                    }
                }),
            ),
        );
        bus.wait_idle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].metadata.attempt, Some(2));
        assert_eq!(seen[0].metadata.operation_id.as_deref(), Some(id.as_str()));
        assert!(!seen[0].metadata.final_attempt);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_commit_counts_as_failed_attempt() {
        let bus = bus();
        let errors = collect(&bus, "delete_error");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        bus.enqueue(
            SyncOperationRequest::new("delete", json!({"id": "r1"}))
                .with_retries(2)
                .with_commit(operation_commit(move |_payload: Value| {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < usize::MAX {
                            panic!("driver bug");
                        }
                        Ok(())
                    }
                })),
        );
        bus.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_enqueued_during_drain_run_after_current() {
        let bus = bus();
        let seen = collect(&bus, "update");
        let inner_bus = bus.clone();

        bus.enqueue(
            SyncOperationRequest::new("update", json!(1)).with_commit(operation_commit(
                move |_payload: Value| {
                    let bus = inner_bus.clone();
                    async move {
                        bus.enqueue(SyncOperationRequest::new("update", json!(2)));
                        sleep(Duration::from_millis(50)).await;
                        Ok(())
                    }
                },
            )),
        );
        bus.wait_idle().await;

        let payloads: Vec<Value> = seen.lock().unwrap().iter().map(|n| n.payload.clone()).collect();
        assert_eq!(payloads, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let bus = bus();
        bus.wait_idle().await;
        assert!(bus.is_idle());
    }

    // =========================================================================
    // Change feed
    // =========================================================================

    #[derive(Default)]
    struct CountingMergeService {
        invalidations: AtomicUsize,
    }

    #[async_trait]
    impl ClientMergeServiceTrait for CountingMergeService {
        async fn get_entity_by_name(&self, _name: &str) -> Option<Arc<ClientView>> {
            None
        }

        async fn merge_one(
            &self,
            reported: &ClientView,
            _registry: &[ClientView],
        ) -> MergedClientView {
            MergedClientView::passthrough(reported)
        }

        async fn merge_many(
            &self,
            reported: &[ClientView],
            _registry: &[ClientView],
        ) -> Vec<MergedClientView> {
            reported.iter().map(MergedClientView::passthrough).collect()
        }

        async fn get_summary(&self, _name: &str) -> Option<ClientSummary> {
            None
        }

        fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }

        async fn warm_cache(&self) -> bool {
            true
        }

        fn dispose(&self) {}
    }

    fn row(name: &str) -> Map<String, Value> {
        json!({"client_name": name}).as_object().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn change_burst_triggers_one_refresh_and_invalidation() {
        let bus = bus();
        let refreshes = collect(&bus, FORCE_REFRESH_TOPIC);
        let merge = Arc::new(CountingMergeService::default());
        let onboarding = Arc::new(InMemoryCollection::new("client_onboarding"));
        let registry = Arc::new(InMemoryCollection::new("clients"));
        let collections: Vec<Arc<dyn RecordCollection>> = vec![
            Arc::clone(&onboarding) as Arc<dyn RecordCollection>,
            Arc::clone(&registry) as Arc<dyn RecordCollection>,
        ];

        let worker = ChangeFeedWorker::new(
            bus.clone(),
            Arc::clone(&merge) as Arc<dyn ClientMergeServiceTrait>,
            ChangeFeedConfig::default(),
        )
        .spawn(&collections);
        tokio::task::yield_now().await;

        for name in ["Acme", "Globex", "Initech"] {
            onboarding.insert(row(name)).await.unwrap();
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_millis(600)).await;

        assert_eq!(refreshes.lock().unwrap().len(), 1);
        assert_eq!(merge.invalidations.load(Ordering::SeqCst), 1);

        registry.insert(row("Acme")).await.unwrap();
        sleep(Duration::from_millis(600)).await;
        assert_eq!(refreshes.lock().unwrap().len(), 2);
        assert_eq!(
            merge.invalidations.load(Ordering::SeqCst),
            1,
            "registry changes leave the self-reported cache alone"
        );

        worker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn steady_changes_still_refresh_within_batch_window() {
        let bus = bus();
        let refreshes = collect(&bus, FORCE_REFRESH_TOPIC);
        let merge = Arc::new(CountingMergeService::default());
        let registry = Arc::new(InMemoryCollection::new("clients"));
        let collections: Vec<Arc<dyn RecordCollection>> =
            vec![Arc::clone(&registry) as Arc<dyn RecordCollection>];

        let worker = ChangeFeedWorker::new(
            bus.clone(),
            Arc::clone(&merge) as Arc<dyn ClientMergeServiceTrait>,
            ChangeFeedConfig::default(),
        )
        .spawn(&collections);
        tokio::task::yield_now().await;

        // One change every 300 ms never leaves the 500 ms debounce quiet.
        for i in 0..10 {
            registry.insert(row(&format!("Client {}", i))).await.unwrap();
            sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(
            refreshes.lock().unwrap().len(),
            1,
            "the first batch closed at its 2 s cap"
        );

        sleep(Duration::from_millis(600)).await;
        assert_eq!(refreshes.lock().unwrap().len(), 2);
        assert_eq!(merge.invalidations.load(Ordering::SeqCst), 0);

        worker.abort();
    }
}
