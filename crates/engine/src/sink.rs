//! Turns engine output into published tasks.
//!
//! Every emit becomes a follow-up of the origin task with a derived id, so a
//! redelivered origin re-derives the same ids and downstream dedupe can
//! recognise them. The origin id is claimed in [`RecentTasks`] before
//! anything is published. The claim is kept only once every result is
//! published; a failed or abandoned finalize releases it.

use std::sync::Arc;

use {
    switchyard_config::SwitchyardConfig,
    switchyard_plugins::{Destination, Dispatcher, Emit, Stage},
    switchyard_protocol::{MessagePart, Task, TaskBuilder, TaskId},
    switchyard_queue::{Backoff, QueueClient, publish_with_backoff},
    tracing::{debug, info, warn},
};

use crate::{
    dedupe::RecentTasks,
    error::Result,
    history::{HistoryEntry, HistorySink},
    publish_backoff,
};

/// Sent instead of another receiver pass once a chain gets too deep.
pub const CHAIN_LIMIT_MESSAGE: &str = "This request needed too many steps, so I stopped here.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    Published { tasks: Vec<(String, TaskId)> },
    /// The origin was already finalized; nothing was published.
    Duplicate,
}

pub struct ResultSink {
    queue: Arc<dyn QueueClient>,
    dispatcher: Dispatcher,
    recent: Arc<RecentTasks>,
    history: Option<Arc<dyn HistorySink>>,
    inbound: String,
    outbound: String,
    backoff: Backoff,
    max_chain_depth: u32,
}

impl ResultSink {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        dispatcher: Dispatcher,
        recent: Arc<RecentTasks>,
        config: &SwitchyardConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            recent,
            history: None,
            inbound: config.queue.inbound_queue.clone(),
            outbound: config.queue.outbound_queue.clone(),
            backoff: publish_backoff(&config.queue),
            max_chain_depth: config.worker.max_chain_depth,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    #[must_use]
    pub fn recent(&self) -> &Arc<RecentTasks> {
        &self.recent
    }

    pub async fn finalize(&self, origin: &Task, emits: Vec<Emit>) -> Result<Finalized> {
        let Some(claim) = self.recent.claim_scoped(origin.id()) else {
            debug!(task_id = %origin.id(), "task already finalized, not publishing again");
            return Ok(Finalized::Duplicate);
        };

        let mut published = Vec::new();
        for (index, emit) in emits.iter().enumerate() {
            let Some((queue, task)) = self.prepare(origin, index, emit).await else {
                continue;
            };
            if let Err(e) = publish_with_backoff(self.queue.as_ref(), &queue, &task, &self.backoff).await {
                warn!(task_id = %origin.id(), queue = %queue, error = %e, "publishing result failed");
                return Err(e.into());
            }
            published.push((queue, task.id().clone()));
        }

        claim.keep();
        info!(task_id = %origin.id(), published = published.len(), "task finalized");
        self.notify_history(origin, &emits);
        Ok(Finalized::Published { tasks: published })
    }

    /// Address one emit. `None` if the result cannot form a valid task.
    async fn prepare(&self, origin: &Task, index: usize, emit: &Emit) -> Option<(String, Task)> {
        let mut builder = origin.follow_up(index).payload(emit.parts.clone());
        if let Some(location) = &emit.location {
            builder = builder.location(location.clone());
        }
        if let Some(response) = &emit.tool_response {
            builder = builder.map_context(|c| c.tool_responses.push(response.clone()));
        }

        let (queue, builder) = match &emit.destination {
            Destination::Sender => (self.outbound.clone(), builder),
            Destination::Queue(name) => (name.clone(), builder),
            Destination::Receiver => {
                let depth = origin.context().chain_depth.saturating_add(1);
                if depth > self.max_chain_depth {
                    warn!(
                        task_id = %origin.id(),
                        chain_depth = depth,
                        limit = self.max_chain_depth,
                        "chain depth exceeded, replying instead of re-routing"
                    );
                    (self.outbound.clone(), chain_limit(builder))
                } else {
                    (self.inbound.clone(), builder.map_context(|c| c.chain_depth = depth))
                }
            },
        };

        let task = match builder.build() {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %origin.id(), index, error = %e, "dropping invalid result");
                return None;
            },
        };

        if queue != self.outbound {
            return Some((queue, task));
        }
        // A stop ends the hook chain; the task is still delivered.
        let outcome = self.dispatcher.run_hooks(task, Stage::Outbound).await;
        if let Some(halt) = &outcome.halted {
            debug!(task_id = %outcome.task.id(), plugin = %halt.plugin, "outbound hooks stopped early");
        }
        Some((queue, outcome.task))
    }

    fn notify_history(&self, origin: &Task, emits: &[Emit]) {
        let Some(history) = self.history.clone() else {
            return;
        };
        let entry = HistoryEntry::from_outputs(origin, emits);
        tokio::spawn(async move {
            let task_id = entry.task_id.clone();
            if let Err(e) = history.record(entry).await {
                warn!(task_id = %task_id, error = %e, "history notification failed");
            }
        });
    }
}

fn chain_limit(builder: TaskBuilder) -> TaskBuilder {
    builder
        .payload(vec![MessagePart::text(CHAIN_LIMIT_MESSAGE)])
        .map_context(|c| c.tool_responses.clear())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::sync::Mutex,
        switchyard_config::EnvSnapshot,
        switchyard_plugins::{HookAction, PluginDescriptor, PluginRegistry, TaskHook},
        switchyard_protocol::{Location, Platform, RECEIVER_INBOUND, SENDER_OUTBOUND},
        switchyard_queue::InMemoryBroker,
    };

    struct Shout;

    #[async_trait]
    impl TaskHook for Shout {
        fn stages(&self) -> &[Stage] {
            &[Stage::Outbound]
        }

        async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
            Ok(HookAction::Replace(task.revise().map_text(str::to_uppercase).build()?))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<HistoryEntry>>);

    #[async_trait]
    impl HistorySink for Recorder {
        async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    fn sink(broker: &InMemoryBroker, registry: PluginRegistry) -> ResultSink {
        let mut config = SwitchyardConfig::default();
        config.worker.max_chain_depth = 1;
        ResultSink::new(
            Arc::new(broker.clone()),
            Dispatcher::new(Arc::new(registry)),
            Arc::new(RecentTasks::default()),
            &config,
        )
    }

    fn origin(depth: u32) -> Task {
        Task::builder(Location::new(Platform::Discord, "C1", "U1"))
            .id("T1")
            .text("hello")
            .map_context(|c| c.chain_depth = depth)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn replies_get_derived_ids_and_outbound_hooks() {
        let broker = InMemoryBroker::default();
        let mut registry = PluginRegistry::new(EnvSnapshot::default());
        registry.register(PluginDescriptor::hook("shout", Shout)).unwrap();
        let sink = sink(&broker, registry);

        let finalized = sink
            .finalize(&origin(0), vec![Emit::reply("a"), Emit::reply("b")])
            .await
            .unwrap();
        assert_eq!(finalized, Finalized::Published {
            tasks: vec![
                (SENDER_OUTBOUND.to_string(), TaskId::from("T1/0")),
                (SENDER_OUTBOUND.to_string(), TaskId::from("T1/1")),
            ]
        });
        let out = broker.drain(SENDER_OUTBOUND);
        assert_eq!(out[0].text(), "A");
        assert_eq!(out[1].text(), "B");
    }

    #[tokio::test]
    async fn second_finalize_is_duplicate() {
        let broker = InMemoryBroker::default();
        let sink = sink(&broker, PluginRegistry::default());
        sink.finalize(&origin(0), vec![Emit::reply("a")]).await.unwrap();
        let again = sink.finalize(&origin(0), vec![Emit::reply("a")]).await.unwrap();
        assert_eq!(again, Finalized::Duplicate);
        assert_eq!(broker.depth(SENDER_OUTBOUND), 1);
    }

    #[tokio::test]
    async fn reroute_increments_depth_until_limit() {
        let broker = InMemoryBroker::default();
        let sink = sink(&broker, PluginRegistry::default());

        sink.finalize(&origin(0), vec![Emit::reroute("next")]).await.unwrap();
        let rerouted = broker.drain(RECEIVER_INBOUND);
        assert_eq!(rerouted[0].context().chain_depth, 1);

        let deep = origin(1).revise().id("T2").build().unwrap();
        sink.finalize(&deep, vec![Emit::reroute("next")]).await.unwrap();
        assert_eq!(broker.depth(RECEIVER_INBOUND), 0);
        let replies = broker.drain(SENDER_OUTBOUND);
        assert_eq!(replies[0].text(), CHAIN_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn location_override_is_respected() {
        let broker = InMemoryBroker::default();
        let sink = sink(&broker, PluginRegistry::default());
        let elsewhere = Location::new(Platform::Discord, "C2", "U1").in_thread("77");
        sink.finalize(&origin(0), vec![Emit::reply("x").at(elsewhere.clone())])
            .await
            .unwrap();
        assert_eq!(broker.drain(SENDER_OUTBOUND)[0].location(), &elsewhere);
    }

    #[tokio::test]
    async fn publish_failure_releases_claim() {
        let broker = InMemoryBroker::default();
        let mut sink = sink(&broker, PluginRegistry::default());
        sink.backoff = Backoff {
            retries: 0,
            ..Backoff::default()
        };
        broker.disconnect();
        assert!(sink.finalize(&origin(0), vec![Emit::reply("x")]).await.is_err());
        assert!(!sink.recent().contains(&TaskId::from("T1")));

        broker.reconnect();
        let retried = sink.finalize(&origin(0), vec![Emit::reply("x")]).await.unwrap();
        assert!(matches!(retried, Finalized::Published { .. }));
    }

    #[tokio::test]
    async fn history_is_notified() {
        let broker = InMemoryBroker::default();
        let recorder = Arc::new(Recorder::default());
        let sink = sink(&broker, PluginRegistry::default()).with_history(recorder.clone());
        sink.finalize(&origin(0), vec![Emit::reply("hi back")]).await.unwrap();
        for _ in 0..50 {
            if !recorder.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let entries = recorder.0.lock().unwrap();
        assert_eq!(entries[0].response, "hi back");
    }
}
