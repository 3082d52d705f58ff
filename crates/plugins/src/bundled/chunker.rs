//! Splits long replies to fit platform message limits.
//!
//! Paragraphs are kept whole where possible, then sentences, then raw
//! characters. Each chunk is labelled `(Part i/n)`; file parts travel with
//! the first chunk.

use std::sync::LazyLock;

use {
    async_trait::async_trait,
    regex::Regex,
    switchyard_config::ChunkingConfig,
    switchyard_protocol::{MessagePart, Task},
    tracing::debug,
};

use crate::{
    descriptor::{PluginDescriptor, Stage},
    hook::{HookAction, TaskHook},
};

pub const NAME: &str = "chunker";

/// Room kept free in every chunk for the part label.
const LABEL_RESERVE: usize = 24;

static SENTENCE_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[.!?]\s+").ok());

pub fn descriptor(limits: ChunkingConfig) -> PluginDescriptor {
    PluginDescriptor::hook(NAME, Chunker { limits })
        .with_priority(50)
        .with_description("Split replies longer than the platform limit")
}

pub struct Chunker {
    limits: ChunkingConfig,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Sentences of `text`, punctuation kept with the sentence it ends.
fn sentences(text: &str) -> Vec<&str> {
    let Some(re) = SENTENCE_END.as_ref() else {
        return vec![text];
    };
    let mut out = Vec::new();
    let mut start = 0;
    for m in re.find_iter(text) {
        out.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

struct Packer {
    max: usize,
    current: String,
    chunks: Vec<String>,
}

impl Packer {
    fn push(&mut self, piece: &str, separator: &str) {
        let needed = if self.current.is_empty() {
            char_len(piece)
        } else {
            char_len(&self.current) + char_len(separator) + char_len(piece)
        };
        if needed <= self.max {
            if !self.current.is_empty() {
                self.current.push_str(separator);
            }
            self.current.push_str(piece);
            return;
        }
        self.flush();
        if char_len(piece) <= self.max {
            self.current.push_str(piece);
        } else {
            self.chunks.extend(hard_split(piece, self.max));
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
    }
}

/// Split `text` into pieces of at most `max` characters.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    if char_len(text) <= max {
        return vec![text.to_string()];
    }
    let mut packer = Packer {
        max,
        current: String::new(),
        chunks: Vec::new(),
    };
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(paragraph) <= max {
            packer.push(paragraph, "\n\n");
            continue;
        }
        packer.flush();
        for sentence in sentences(paragraph) {
            packer.push(sentence, " ");
        }
        packer.flush();
    }
    packer.flush();
    packer.chunks
}

#[async_trait]
impl TaskHook for Chunker {
    fn stages(&self) -> &[Stage] {
        &[Stage::Outbound]
    }

    async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
        let limit = self.limits.limit_for(task.location().platform);
        let body = limit.saturating_sub(LABEL_RESERVE).max(1);

        let texts: Vec<&str> = task
            .payload()
            .iter()
            .filter_map(MessagePart::as_text)
            .collect();
        if texts.iter().all(|t| char_len(t) <= limit) {
            return Ok(HookAction::Continue);
        }

        let chunks: Vec<String> = texts.iter().flat_map(|t| chunk_text(t, body)).collect();
        let files: Vec<MessagePart> = task
            .payload()
            .iter()
            .filter(|p| p.as_text().is_none())
            .cloned()
            .collect();
        let total = chunks.len();
        debug!(task_id = %task.id(), limit, parts = total, "chunking reply");

        let mut payload = Vec::with_capacity(total + files.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            payload.push(MessagePart::text(format!("(Part {}/{total})\n{chunk}", i + 1)));
            if i == 0 {
                payload.extend(files.iter().cloned());
            }
        }
        Ok(HookAction::Replace(task.revise().payload(payload).build()?))
    }
}
