//! The bundled plugin set driven through the receiver pipeline.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use {
    switchyard_config::{ChannelBehavior, EnvSnapshot, SwitchyardConfig},
    switchyard_engine::{Disposition, ReceiverWorker, RecentTasks, ResultSink, WorkerSettings},
    switchyard_plugins::{
        Dispatcher, EchoCompletionClient, PluginRegistry, bundled::bundled_source, load_plugins,
    },
    switchyard_protocol::{Location, Platform, RECEIVER_INBOUND, SENDER_OUTBOUND, Task},
    switchyard_queue::{InMemoryBroker, QueueClient},
};

fn worker(broker: &InMemoryBroker, config: &SwitchyardConfig, env: EnvSnapshot) -> ReceiverWorker {
    let mut registry = PluginRegistry::new(env);
    let source = bundled_source(config, Arc::new(EchoCompletionClient));
    load_plugins(&mut registry, &[&source], &config.plugins).unwrap();

    let queue: Arc<dyn QueueClient> = Arc::new(broker.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let sink = ResultSink::new(
        queue,
        dispatcher.clone(),
        Arc::new(RecentTasks::from_config(&config.dedupe)),
        config,
    );
    ReceiverWorker::new(dispatcher, sink, &WorkerSettings::receiver(config))
}

fn with_key() -> EnvSnapshot {
    EnvSnapshot::from_pairs([("LLM_API_KEY", "test-key")])
}

fn task(chat: &str, text: &str) -> Task {
    Task::builder(Location::new(Platform::Discord, chat, "U1"))
        .id("T1")
        .text(text)
        .build()
        .unwrap()
}

/// Process the task and every receiver re-route it causes.
async fn settle(worker: &ReceiverWorker, broker: &InMemoryBroker, first: Task) {
    assert_eq!(worker.process(first).await, Disposition::Ack);
    loop {
        let pending = broker.drain(RECEIVER_INBOUND);
        if pending.is_empty() {
            break;
        }
        for task in pending {
            assert_eq!(worker.process(task).await, Disposition::Ack);
        }
    }
}

#[tokio::test]
async fn completion_reply_is_decorated_for_the_channel() {
    let mut config = SwitchyardConfig::default();
    config.channels.insert("C1".into(), ChannelBehavior {
        prefix: Some("[bot]".into()),
        keywords: vec!["hello".into()],
        system_prompt: Some("Answer briefly.".into()),
        ..ChannelBehavior::default()
    });
    let broker = InMemoryBroker::default();
    let worker = worker(&broker, &config, with_key());

    settle(&worker, &broker, task("C1", "hello there")).await;

    let out = broker.drain(SENDER_OUTBOUND);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text(), "[bot] hello there");
    assert_eq!(out[0].context().meta_str("system_prompt"), Some("Answer briefly."));
}

#[tokio::test]
async fn blocked_keyword_keeps_the_bot_silent() {
    let mut config = SwitchyardConfig::default();
    config.channels.insert("C1".into(), ChannelBehavior {
        auto_respond: true,
        blocked_keywords: vec!["spoiler".into()],
        ..ChannelBehavior::default()
    });
    let broker = InMemoryBroker::default();
    let worker = worker(&broker, &config, with_key());

    settle(&worker, &broker, task("C1", "SPOILER: it was the butler")).await;
    assert_eq!(broker.depth(SENDER_OUTBOUND), 0);
}

#[tokio::test]
async fn deep_research_takes_a_second_pass_through_completion() {
    let config = SwitchyardConfig::default();
    let broker = InMemoryBroker::default();
    let worker = worker(&broker, &config, with_key());

    settle(&worker, &broker, task("C2", "please research tidal energy")).await;

    let out = broker.drain(SENDER_OUTBOUND);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id().as_str(), "T1/0/0");
    assert!(
        out[0]
            .text()
            .starts_with("Perform comprehensive research on: please research tidal energy")
    );
    assert_eq!(out[0].context().chain_depth, 1);
    assert!(out[0].context().has_response_from("deep_research"));
}

#[tokio::test]
async fn missing_model_key_disables_completion_quietly() {
    let config = SwitchyardConfig::default();
    let broker = InMemoryBroker::default();
    let worker = worker(&broker, &config, EnvSnapshot::default());

    settle(&worker, &broker, task("C2", "hello")).await;
    assert_eq!(broker.depth(SENDER_OUTBOUND), 0);
}

#[tokio::test]
async fn long_reply_is_chunked_for_the_platform() {
    let mut config = SwitchyardConfig::default();
    config.chunking.discord = 100;
    let broker = InMemoryBroker::default();
    let worker = worker(&broker, &config, with_key());

    let text = (0..20)
        .map(|i| format!("Sentence number {i} is here."))
        .collect::<Vec<_>>()
        .join(" ");
    settle(&worker, &broker, task("C2", &text)).await;

    let out = broker.drain(SENDER_OUTBOUND);
    assert_eq!(out.len(), 1);
    let parts: Vec<_> = out[0].payload().iter().filter_map(|p| p.as_text()).collect();
    assert!(parts.len() > 1);
    assert!(parts[0].starts_with("(Part 1/"));
    assert!(parts.iter().all(|p| p.chars().count() <= 100));
}
