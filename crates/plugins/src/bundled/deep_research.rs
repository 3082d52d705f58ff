//! Deep research trigger.
//!
//! Turns a research request into an instruction for the next completion
//! pass: the instruction goes back to the receiver as a tool response, and
//! the completion plugin writes the actual research on that pass.

use {
    async_trait::async_trait,
    serde::Deserialize,
    switchyard_protocol::{Task, ToolResponse},
    tracing::info,
};

use crate::{
    action::{ActionContext, Emit, PluginAction, PluginOutput},
    bundled::RESPONDER_GROUP,
    descriptor::PluginDescriptor,
    error::PluginError,
};

pub const NAME: &str = "deep_research";

pub const KEYWORDS: &[&str] = &[
    "research",
    "deep research",
    "analyze",
    "comprehensive",
    "detailed analysis",
    "investigate",
    "study",
    "explore",
];

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::trigger(NAME, DeepResearch)
        .with_priority(10)
        .exclusive(RESPONDER_GROUP)
        .matching(wants_research)
        .with_description("Structured research on a topic, answered on a second pass")
}

/// Explicit calls always match; otherwise a keyword must appear. A task
/// that already carries this plugin's response is the second pass and is
/// left to the completion plugin.
fn wants_research(task: &Task) -> bool {
    let context = task.context();
    if context.disable_tools || context.has_response_from(NAME) {
        return false;
    }
    if context
        .pending_call
        .as_ref()
        .is_some_and(|call| call.plugin == NAME)
    {
        return true;
    }
    let text = task.text().to_lowercase();
    KEYWORDS.iter().any(|k| text.contains(k))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Overview,
    #[default]
    Comprehensive,
    Detailed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchArgs {
    pub topic: String,
    #[serde(default)]
    pub aspects: Option<String>,
    #[serde(default)]
    pub depth: Depth,
}

impl ResearchArgs {
    fn from_task(task: &Task) -> Result<Self, PluginError> {
        if let Some(call) = &task.context().pending_call
            && call.plugin == NAME
        {
            return serde_json::from_value(call.arguments.clone())
                .map_err(|e| PluginError::declared(format!("invalid research request: {e}")));
        }
        let topic = task.text().trim().to_string();
        if topic.is_empty() {
            return Err(PluginError::declared("no research topic given"));
        }
        Ok(Self {
            topic,
            aspects: None,
            depth: Depth::default(),
        })
    }

    pub fn instruction(&self) -> String {
        let mut prompt = match self.depth {
            Depth::Overview => format!("Provide a comprehensive overview of: {}", self.topic),
            Depth::Comprehensive => format!("Perform comprehensive research on: {}", self.topic),
            Depth::Detailed => format!("Provide an in-depth, detailed analysis of: {}", self.topic),
        };
        if let Some(aspects) = &self.aspects {
            prompt.push_str(&format!("\n\nFocus on these specific aspects: {aspects}"));
        }
        prompt.push_str(
            "\n\nStructure the research as:\n\
             1. Executive Summary\n\
             2. Key Findings\n\
             3. Detailed Analysis\n\
             4. Insights & Implications\n\
             5. Related Topics\n\
             6. Conclusions",
        );
        prompt
    }
}

pub struct DeepResearch;

#[async_trait]
impl PluginAction for DeepResearch {
    async fn run(&self, cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError> {
        let args = ResearchArgs::from_task(cx.task)?;
        info!(task_id = %cx.task.id(), topic = %args.topic, "starting deep research");

        let instruction = args.instruction();
        let call_id = cx
            .task
            .context()
            .pending_call
            .as_ref()
            .map_or_else(|| format!("{}-{NAME}", cx.task.id()), |c| c.call_id.clone());
        let response = ToolResponse {
            plugin: NAME.to_string(),
            call_id,
            content: format!("Research initiated for: {}. {instruction}", args.topic),
        };
        Ok(PluginOutput::emit(
            Emit::reroute(instruction).with_tool_response(response),
        ))
    }

    fn failed(&self, _cx: &ActionContext<'_>, error: &PluginError) -> Vec<Emit> {
        vec![Emit::reply(format!("Deep research failed: {error}"))]
    }
}
