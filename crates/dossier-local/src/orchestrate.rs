//! Query orchestration: one in-flight pipeline per conversation.
//!
//! `submit` cancels the previous request, appends a fresh section, and
//! spawns the pipeline task. The pipeline is the only sender into the
//! section's aggregator, so cancelling it is enough to guarantee that a
//! superseded request's late chunks never reach the section.

use crate::section::{self, Section, SectionMsg};
use crate::{compose, demux, normalize};
use dossier_core::{
    ChannelEvent, CompletionProvider, Error, Result, SearchProvider, SearchQuery,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub max_results: Option<usize>,
    pub include_images: bool,
    pub include_image_descriptions: bool,
    pub timeout_ms: Option<u64>,
}

/// An ordered, append-only sequence of sections. Index is submission order;
/// only the newest section is ever under active mutation.
pub struct Conversation {
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    opts: QueryOptions,
    sections: Vec<watch::Receiver<Section>>,
    active: Option<CancellationToken>,
}

impl Conversation {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
        opts: QueryOptions,
    ) -> Self {
        Self {
            search,
            completion,
            opts,
            sections: Vec::new(),
            active: None,
        }
    }

    /// Submit a query. Rejects empty input before any network call and
    /// cancels whatever request was previously in flight.
    pub fn submit(&mut self, query: &str) -> Result<SectionHandle> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }

        if let Some(prev) = self.active.take() {
            prev.cancel();
        }

        let cancel = CancellationToken::new();
        let (msgs, state, aggregator) = section::spawn(query);
        self.sections.push(state.clone());

        let pipeline = tokio::spawn(run_pipeline(
            self.search.clone(),
            self.completion.clone(),
            query.to_string(),
            self.opts.clone(),
            msgs,
            cancel.clone(),
        ));

        self.active = Some(cancel.clone());
        Ok(SectionHandle {
            state,
            cancel,
            pipeline,
            aggregator,
        })
    }

    /// Snapshot receivers for every section, in submission order.
    pub fn sections(&self) -> &[watch::Receiver<Section>] {
        &self.sections
    }

    /// Current snapshot of every section, in submission order.
    pub fn snapshots(&self) -> Vec<Section> {
        self.sections.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Cancel the in-flight request, if any. Its section freezes as-is.
    pub fn cancel_active(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }
}

/// Observer and completion handle for one submitted query.
pub struct SectionHandle {
    state: watch::Receiver<Section>,
    cancel: CancellationToken,
    pipeline: JoinHandle<Result<()>>,
    aggregator: JoinHandle<()>,
}

impl SectionHandle {
    /// A snapshot receiver for incremental rendering.
    pub fn subscribe(&self) -> watch::Receiver<Section> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> Section {
        self.state.borrow().clone()
    }

    /// Cancel just this request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the pipeline to finish and return the final section.
    /// `Err(Aborted)` means the request was superseded or cancelled; the
    /// section itself is not marked failed in that case.
    pub async fn wait(self) -> Result<Section> {
        let result = match self.pipeline.await {
            Ok(r) => r,
            Err(e) => Err(Error::Completion(format!("pipeline task failed: {e}"))),
        };
        // The aggregator drains its queue once the pipeline's sender drops;
        // waiting for it means the returned snapshot is final.
        let _ = self.aggregator.await;
        let section = self.state.borrow().clone();
        result.map(|()| section)
    }
}

async fn run_pipeline(
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    query: String,
    opts: QueryOptions,
    msgs: mpsc::Sender<SectionMsg>,
    cancel: CancellationToken,
) -> Result<()> {
    let sq = SearchQuery {
        query: query.clone(),
        max_results: opts.max_results,
        include_images: opts.include_images,
        include_image_descriptions: opts.include_image_descriptions,
        timeout_ms: opts.timeout_ms,
    };

    // Every await races the cancellation token: once superseded, this
    // pipeline must not publish another message.
    let set = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Aborted),
        r = search.search(&sq) => match r {
            Ok(set) => set,
            Err(e) => return fail(&msgs, e).await,
        },
    };

    let mut results = normalize::normalize(Some(set.results));
    if results.is_empty() {
        let e = Error::NoResults("search returned no usable results".to_string());
        return fail(&msgs, e).await;
    }
    normalize::attach_images(&mut results, &set.images);
    let _ = msgs.send(SectionMsg::Sources(results.clone())).await;

    let messages = compose::build_messages(&query, &results, set.answer.as_deref());
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Aborted),
        r = completion.complete(&messages) => match r {
            Ok(stream) => stream,
            Err(e) => return fail(&msgs, e).await,
        },
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Aborted),
            n = stream.next() => n,
        };
        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(bytes) => bytes,
            // Mid-stream transport failure: whatever already accumulated
            // stays on the section.
            Err(e) => return fail(&msgs, e).await,
        };
        let text = String::from_utf8_lossy(&chunk);
        for event in demux::events_in_chunk(&text) {
            match event {
                ChannelEvent::Unparseable => {
                    tracing::debug!(query = %query, "skipping unparseable stream line");
                }
                event => {
                    let _ = msgs.send(SectionMsg::Event(event)).await;
                }
            }
        }
    }

    let _ = msgs.send(SectionMsg::Complete).await;
    Ok(())
}

async fn fail(msgs: &mpsc::Sender<SectionMsg>, err: Error) -> Result<()> {
    tracing::debug!(error = %err, "pipeline failed");
    let _ = msgs.send(SectionMsg::Fail(err.message().to_string())).await;
    Err(err)
}
