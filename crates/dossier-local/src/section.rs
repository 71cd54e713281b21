//! Section state and the single-owner aggregator task.
//!
//! A section is mutated by exactly one task, fed discrete messages over an
//! mpsc channel; everyone else sees it through `watch` snapshots. No shared
//! mutable cell is touched from more than one call site.

use crate::repair::repair;
use dossier_core::{ChannelEvent, SearchResult};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lifecycle of a section's in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingSources,
    AwaitingCompletion,
    Streaming,
    Done,
    Failed,
}

/// The unit of conversational turn state: one query, its sources, and the
/// model's two output channels. Immutable once `Done` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub query: String,
    pub search_results: Vec<SearchResult>,
    /// Reasoning channel, appended as it streams.
    pub reasoning: String,
    /// Answer channel after repair. Replaced wholesale on each update — the
    /// repaired text for a longer prefix may rewrite earlier bytes.
    pub response: String,
    pub error: Option<String>,
    pub phase: Phase,
}

impl Section {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_results: Vec::new(),
            reasoning: String::new(),
            response: String::new(),
            error: None,
            phase: Phase::AwaitingSources,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed)
    }
}

/// Everything that may change a section, as discrete messages.
#[derive(Debug)]
pub enum SectionMsg {
    Sources(Vec<SearchResult>),
    Event(ChannelEvent),
    Complete,
    Fail(String),
}

/// Spawn the aggregator task for one section. Returns the message sender,
/// the snapshot receiver, and the task handle (it exits after a terminal
/// message, or when the sender is dropped — a cancelled pipeline simply
/// stops sending and the section freezes in its last published phase).
pub fn spawn(query: &str) -> (mpsc::Sender<SectionMsg>, watch::Receiver<Section>, JoinHandle<()>) {
    let (msg_tx, mut msg_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = watch::channel(Section::new(query));
    let mut agg = Aggregator::new(query);
    let handle = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let terminal = agg.apply(msg);
            state_tx.send_replace(agg.section().clone());
            if terminal {
                break;
            }
        }
    });
    (msg_tx, state_rx, handle)
}

/// The single owner of one section's state. Kept separate from the task so
/// message sequences can be driven synchronously in tests.
#[derive(Debug)]
pub struct Aggregator {
    section: Section,
    /// Raw answer text as streamed, pre-repair. The published `response` is
    /// recomputed from the whole accumulator on every answer delta: repair
    /// rules look across chunk boundaries, so a delta cannot be repaired in
    /// isolation.
    answer_acc: String,
}

impl Aggregator {
    pub fn new(query: &str) -> Self {
        Self {
            section: Section::new(query),
            answer_acc: String::new(),
        }
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    /// Apply one message; returns true when the section reached a terminal
    /// phase. Messages after a terminal phase are ignored.
    pub fn apply(&mut self, msg: SectionMsg) -> bool {
        if self.section.is_terminal() {
            return true;
        }
        match msg {
            SectionMsg::Sources(results) => {
                self.section.search_results = results;
                self.section.phase = Phase::AwaitingCompletion;
            }
            SectionMsg::Event(ChannelEvent::Reasoning(text)) => {
                self.mark_streaming();
                self.section.reasoning.push_str(&text);
            }
            SectionMsg::Event(ChannelEvent::Answer(text)) => {
                self.mark_streaming();
                self.answer_acc.push_str(&text);
                self.section.response = repair(&self.answer_acc);
            }
            SectionMsg::Event(ChannelEvent::Unparseable) => {
                // Dropped at the demultiplexer; tolerated here for safety.
            }
            SectionMsg::Complete => {
                if self.answer_acc.is_empty() {
                    // Valid but degenerate: the stream closed cleanly
                    // without a single answer token.
                    tracing::warn!(query = %self.section.query, "completion finished with an empty report");
                }
                self.section.phase = Phase::Done;
                return true;
            }
            SectionMsg::Fail(message) => {
                // Partial reasoning/response stays; only the phase flips.
                self.section.error = Some(message);
                self.section.phase = Phase::Failed;
                return true;
            }
        }
        false
    }

    fn mark_streaming(&mut self) {
        if matches!(
            self.section.phase,
            Phase::AwaitingSources | Phase::AwaitingCompletion
        ) {
            self.section.phase = Phase::Streaming;
        }
    }
}
