//! Plugin registry and dispatch pipeline.
//!
//! Plugins are registered once at startup as [`PluginDescriptor`]s and never
//! change afterwards. Two capability kinds exist:
//!
//! - **Hooks** ([`TaskHook`]) see every matching task in priority order and
//!   may replace it or stop the pipeline.
//! - **Triggers** ([`PluginAction`]) contribute an action to the
//!   [`ExecutionPlan`]; triggers in the same exclusive group fill one slot.
//!
//! The [`Dispatcher`] turns a task into a plan; running the plan is the
//! engine's job.

pub mod action;
pub mod bundled;
pub mod completion;
pub mod descriptor;
pub mod dispatcher;
pub mod eligibility;
pub mod error;
pub mod hook;
pub mod registry;
pub mod source;
pub mod stats;

pub use {
    action::{ActionContext, Destination, Emit, PluginAction, PluginOutput},
    completion::{
        ChatMessage, ChatRole, Completion, CompletionClient, CompletionError, CompletionRequest,
        EchoCompletionClient,
    },
    descriptor::{Capability, PluginDescriptor, Stage},
    dispatcher::{Dispatcher, ExecutionPlan, Halt, HookOutcome, PlannedStep},
    eligibility::{Eligibility, check_eligibility},
    error::{PluginError, RegistryError},
    hook::{HookAction, TaskHook},
    registry::{PluginRegistry, RegisteredPlugin},
    source::{PluginSource, StaticSource, load_plugins},
    stats::{PluginStats, StatsSnapshot},
};
