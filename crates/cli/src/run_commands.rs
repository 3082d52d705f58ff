//! `run` and `demo`: start the workers over the in-process broker.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    serde_json::json,
    switchyard_config::SwitchyardConfig,
    switchyard_engine::PlatformAdapter,
    switchyard_protocol::{DeliveryTarget, Location, Platform, Task},
    switchyard_queue::QueueClient,
    tracing::{info, warn},
};

use crate::runtime::{self, Role, Runtime};

// ── Adapters ────────────────────────────────────────────────────────────────

fn target_json(target: DeliveryTarget<'_>) -> serde_json::Value {
    match target {
        DeliveryTarget::Channel { chat_id } => json!({ "chat_id": chat_id }),
        DeliveryTarget::Thread { chat_id, thread_id } => {
            json!({ "chat_id": chat_id, "thread_id": thread_id })
        },
    }
}

/// Prints each delivery as one JSON line on stdout.
struct ConsoleAdapter(Platform);

#[async_trait]
impl PlatformAdapter for ConsoleAdapter {
    fn platform(&self) -> Platform {
        self.0
    }

    async fn deliver(&self, target: DeliveryTarget<'_>, task: &Task) -> anyhow::Result<()> {
        let line = json!({
            "platform": self.0,
            "target": target_json(target),
            "task_id": task.id(),
            "text": task.text(),
        });
        println!("{line}");
        Ok(())
    }
}

/// Keeps deliveries for printing after the run.
struct CollectingAdapter {
    platform: Platform,
    delivered: Arc<Mutex<Vec<serde_json::Value>>>,
}

#[async_trait]
impl PlatformAdapter for CollectingAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn deliver(&self, target: DeliveryTarget<'_>, task: &Task) -> anyhow::Result<()> {
        let entry = json!({
            "target": target_json(target),
            "task": task,
        });
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }
}

// ── run ─────────────────────────────────────────────────────────────────────

pub async fn handle_run(config_path: Option<&Path>, role: Role) -> anyhow::Result<()> {
    role.ensure_in_process()?;
    let config = runtime::load(config_path)?;
    let registry = runtime::build_registry(&config, runtime::completion_client())?;
    let adapters: Vec<Arc<dyn PlatformAdapter>> = Platform::ALL
        .iter()
        .map(|p| Arc::new(ConsoleAdapter(*p)) as Arc<dyn PlatformAdapter>)
        .collect();

    let runtime = Runtime::start(&config, registry, adapters);
    info!(inbound = %config.queue.inbound_queue, outbound = %config.queue.outbound_queue, "switchyard running, ctrl-c to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    runtime.shutdown().await
}

// ── demo ────────────────────────────────────────────────────────────────────

pub struct DemoArgs {
    pub platform: Platform,
    pub chat: String,
    pub user: String,
    pub thread: Option<String>,
    pub text: String,
    pub timeout: Duration,
}

/// Fill required completion keys so the demo answers without real
/// credentials.
fn demo_config(mut config: SwitchyardConfig) -> SwitchyardConfig {
    for key in &config.plugins.completion.required_env {
        if std::env::var(key).is_err() {
            config.env.entry(key.clone()).or_insert_with(|| "demo".into());
        }
    }
    config
}

pub async fn handle_demo(config_path: Option<&Path>, args: DemoArgs) -> anyhow::Result<()> {
    let config = demo_config(runtime::load(config_path)?);
    let delivered = run_demo(&config, &args).await?;
    println!("{}", serde_json::to_string_pretty(&delivered)?);
    Ok(())
}

/// Publish one inbound task and collect what reaches the adapters once the
/// broker is idle.
async fn run_demo(config: &SwitchyardConfig, args: &DemoArgs) -> anyhow::Result<Vec<serde_json::Value>> {
    let registry = runtime::build_registry(config, runtime::completion_client())?;
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let adapters: Vec<Arc<dyn PlatformAdapter>> = Platform::ALL
        .iter()
        .map(|p| {
            Arc::new(CollectingAdapter {
                platform: *p,
                delivered: Arc::clone(&delivered),
            }) as Arc<dyn PlatformAdapter>
        })
        .collect();
    let runtime = Runtime::start(config, registry, adapters);

    let mut location = Location::new(args.platform, &args.chat, &args.user);
    if let Some(thread) = &args.thread {
        location = location.in_thread(thread);
    }
    let task = Task::builder(location).text(&args.text).build()?;
    runtime.queue().publish(&config.queue.inbound_queue, &task).await?;
    info!(task_id = %task.id(), "demo task published");

    let idle = wait_idle(&runtime, config, args.timeout).await;
    runtime.shutdown().await?;
    if !idle {
        warn!(timeout_ms = args.timeout.as_millis() as u64, "demo timed out before the pipeline went idle");
    }
    let collected = std::mem::take(&mut *delivered.lock().unwrap_or_else(|e| e.into_inner()));
    Ok(collected)
}

async fn wait_idle(runtime: &Runtime, config: &SwitchyardConfig, timeout: Duration) -> bool {
    let broker = &runtime.broker;
    // Two quiet polls in a row; a delivery is briefly in neither count
    // between leaving the queue and being tracked.
    let poll = async {
        let mut quiet = 0;
        while quiet < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let idle = broker.depth(&config.queue.inbound_queue) == 0
                && broker.depth(&config.queue.outbound_queue) == 0
                && broker.in_flight() == 0;
            quiet = if idle { quiet + 1 } else { 0 };
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}
