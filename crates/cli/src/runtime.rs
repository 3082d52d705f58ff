//! Process wiring shared by the `run` and `demo` commands.

use std::{path::Path, sync::Arc};

use {
    anyhow::Context,
    switchyard_config::{EnvSnapshot, SwitchyardConfig},
    switchyard_engine::{
        AdapterRegistry, PlatformAdapter, ReceiverWorker, RecentTasks, ResultSink, SenderWorker,
        WorkerSettings, publish_backoff, retry_policy, run_consumers, spawn_timers,
    },
    switchyard_plugins::{
        CompletionClient, Dispatcher, EchoCompletionClient, PluginRegistry, bundled::bundled_source,
        load_plugins,
    },
    switchyard_queue::{InMemoryBroker, QueueClient},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{error, info},
};

/// Which consumer groups this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Receiver,
    Sender,
    Both,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Self::Receiver => "receiver",
            Self::Sender => "sender",
            Self::Both => "both",
        }
    }

    /// The broker lives inside this process, so a receiver or sender on its
    /// own would never see the other half's queue.
    pub fn ensure_in_process(self) -> anyhow::Result<()> {
        if self != Self::Both {
            anyhow::bail!(
                "--role {} needs a broker shared between processes; the in-process broker only supports --role both",
                self.as_str()
            );
        }
        Ok(())
    }
}

/// Load from `path` when given, otherwise search the default locations.
/// No file at all yields the defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<SwitchyardConfig> {
    let config = match path {
        Some(path) => switchyard_config::load_config(path),
        None => switchyard_config::discover_and_load(),
    };
    Ok(config?)
}

/// Keys read from the process environment at startup.
pub fn env_keys(config: &SwitchyardConfig) -> Vec<&str> {
    config
        .plugins
        .completion
        .required_env
        .iter()
        .chain(&config.plugins.env_keys)
        .map(String::as_str)
        .collect()
}

pub fn build_registry(
    config: &SwitchyardConfig,
    client: Arc<dyn CompletionClient>,
) -> anyhow::Result<PluginRegistry> {
    let env = EnvSnapshot::capture(env_keys(config), &config.env);
    let mut registry = PluginRegistry::new(env);
    let bundled = bundled_source(config, client);
    let loaded = load_plugins(&mut registry, &[&bundled], &config.plugins)
        .context("failed to register bundled plugins")?;
    let eligible = registry.iter().filter(|p| p.eligibility.eligible).count();
    info!(loaded, eligible, "plugins registered");
    Ok(registry)
}

/// Language-model client for the completion plugin.
pub fn completion_client() -> Arc<dyn CompletionClient> {
    Arc::new(EchoCompletionClient)
}

/// Receiver, sender and timers over one in-process broker.
pub struct Runtime {
    pub broker: InMemoryBroker,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn start(
        config: &SwitchyardConfig,
        registry: PluginRegistry,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
    ) -> Self {
        let broker = InMemoryBroker::with_dead_letter_suffix(
            retry_policy(&config.queue),
            config.queue.dead_letter_suffix.as_str(),
        );
        let queue: Arc<dyn QueueClient> = Arc::new(broker.clone());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let dispatcher = Dispatcher::new(Arc::new(registry));
        let recent = Arc::new(RecentTasks::from_config(&config.dedupe));
        let sink = ResultSink::new(Arc::clone(&queue), dispatcher.clone(), recent, config);
        let receiver_settings = WorkerSettings::receiver(config);
        let receiver = Arc::new(ReceiverWorker::new(dispatcher, sink, &receiver_settings));
        tasks.push(tokio::spawn(run_consumers(
            receiver,
            Arc::clone(&queue),
            receiver_settings,
            cancel.clone(),
        )));
        tasks.extend(spawn_timers(
            &config.schedules,
            &queue,
            publish_backoff(&config.queue),
            &cancel,
        ));

        let mut adapter_registry = AdapterRegistry::new();
        for adapter in adapters {
            adapter_registry.register(adapter);
        }
        let sender_settings = WorkerSettings::sender(config);
        let sender = Arc::new(SenderWorker::new(
            adapter_registry,
            RecentTasks::from_config(&config.dedupe),
            &sender_settings,
        ));
        tasks.push(tokio::spawn(run_consumers(
            sender,
            Arc::clone(&queue),
            sender_settings,
            cancel.clone(),
        )));

        info!(tasks = tasks.len(), "runtime started");
        Self {
            broker,
            cancel,
            tasks,
        }
    }

    pub fn queue(&self) -> Arc<dyn QueueClient> {
        Arc::new(self.broker.clone())
    }

    /// Cancel every loop and wait for it to finish. Fails if any loop
    /// panicked or was aborted.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        let mut failed = 0usize;
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, panicked = e.is_panic(), "worker task failed");
                failed += 1;
            }
        }
        info!(failed, "runtime stopped");
        anyhow::ensure!(failed == 0, "{failed} worker task(s) failed");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn env_keys_include_completion_and_extras() {
        let mut config = SwitchyardConfig::default();
        config.plugins.env_keys = vec!["SEARCH_KEY".into()];
        assert_eq!(env_keys(&config), vec!["LLM_API_KEY", "SEARCH_KEY"]);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker]\nconcurrency = 0").unwrap();
        let err = load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("worker.concurrency"), "{err}");
    }

    #[test]
    fn only_the_combined_role_runs_in_process() {
        assert!(Role::Both.ensure_in_process().is_ok());
        for role in [Role::Receiver, Role::Sender] {
            let err = role.ensure_in_process().unwrap_err();
            assert!(err.to_string().contains(role.as_str()), "{err}");
        }
    }

    #[tokio::test]
    async fn shutdown_reports_a_panicked_worker() {
        let config = SwitchyardConfig::default();
        let registry = build_registry(&config, completion_client()).unwrap();
        let mut runtime = Runtime::start(&config, registry, Vec::new());
        runtime.tasks.push(tokio::spawn(async { panic!("worker blew up") }));

        let err = runtime.shutdown().await.unwrap_err();
        assert!(err.to_string().contains("1 worker task(s) failed"), "{err}");
    }

    #[tokio::test]
    async fn clean_shutdown_succeeds() {
        let config = SwitchyardConfig::default();
        let registry = build_registry(&config, completion_client()).unwrap();
        let runtime = Runtime::start(&config, registry, Vec::new());
        runtime.shutdown().await.unwrap();
    }

    #[test]
    fn config_override_makes_completion_eligible() {
        let mut config = SwitchyardConfig::default();
        config.env.insert("LLM_API_KEY".into(), "k".into());
        let registry = build_registry(&config, completion_client()).unwrap();
        let completion = registry.get("completion").unwrap();
        assert!(completion.eligibility.eligible);
    }
}
