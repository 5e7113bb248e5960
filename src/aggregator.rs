//! Concurrent fan-out of one prompt to several providers.
//!
//! [`StreamAggregator::start`] spawns one Tokio task per provider. Each task owns the
//! only [`StreamWriter`] for its provider's state and appends fragments in arrival
//! order; readers take point-in-time copies through [`SessionView::snapshot`] and can
//! wait for changes with [`SessionView::subscribe`]. [`ChatSession::await_all`] joins
//! every task.
//!
//! Per-provider failures never escape a session. They become that provider's terminal
//! [`StreamStatus::Failed`] state with an `[error: ...]` marker appended to its text.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::provider::{DynProvider, LLMProvider};
use crate::types::ChatRequest;

/// The message fanned out to every provider of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub message: String,
    /// Overrides every provider's default model.
    pub model: Option<String>,
    /// Overrides every provider's default system prompt.
    pub system_prompt: Option<String>,
}

impl ChatPrompt {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: None,
            system_prompt: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Lifecycle of one provider stream: `Pending -> Streaming -> {Done | Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// No fragment and no failure yet.
    #[default]
    Pending,
    /// At least one fragment arrived.
    Streaming,
    Done,
    Failed,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Failed => "error",
        }
    }
}

#[derive(Debug, Default)]
struct ProviderStreamState {
    text: String,
    status: StreamStatus,
    error: Option<String>,
    chunks: usize,
}

/// Immutable copy of one provider's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSnapshot {
    pub provider: String,
    /// Accumulated text, followed by the error marker when the stream failed.
    pub text: String,
    pub status: StreamStatus,
    /// Display form of the terminal error, if any.
    pub error: Option<String>,
    /// Number of fragments appended.
    pub chunks: usize,
}

impl ProviderSnapshot {
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_error(&self) -> bool {
        self.status == StreamStatus::Failed
    }
}

/// Point-in-time copy of a whole session, in the order providers were given to `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    providers: Vec<ProviderSnapshot>,
}

impl SessionSnapshot {
    pub fn providers(&self) -> &[ProviderSnapshot] {
        &self.providers
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderSnapshot> {
        self.providers.iter()
    }

    /// Looks a provider up by identity.
    pub fn get(&self, provider: &str) -> Option<&ProviderSnapshot> {
        self.providers
            .iter()
            .find(|snapshot| snapshot.provider == provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// `true` once every provider reached `Done` or `Failed`.
    pub fn all_done(&self) -> bool {
        self.providers.iter().all(ProviderSnapshot::is_done)
    }

    /// Unknown identities report `false`.
    pub fn is_done(&self, provider: &str) -> bool {
        self.get(provider).is_some_and(ProviderSnapshot::is_done)
    }

    pub fn has_error(&self, provider: &str) -> bool {
        self.get(provider).is_some_and(ProviderSnapshot::has_error)
    }
}

impl IntoIterator for SessionSnapshot {
    type Item = ProviderSnapshot;
    type IntoIter = std::vec::IntoIter<ProviderSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.providers.into_iter()
    }
}

struct Slot {
    provider: String,
    state: Mutex<ProviderStreamState>,
}

struct SessionShared {
    slots: Vec<Slot>,
    revision: watch::Sender<u64>,
}

impl SessionShared {
    fn lock(&self, index: usize) -> MutexGuard<'_, ProviderStreamState> {
        // The critical sections never panic, so a poisoned lock still holds a valid state.
        self.slots[index]
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let providers = (0..self.slots.len())
            .map(|index| {
                let state = self.lock(index);
                ProviderSnapshot {
                    provider: self.slots[index].provider.clone(),
                    text: state.text.clone(),
                    status: state.status,
                    error: state.error.clone(),
                    chunks: state.chunks,
                }
            })
            .collect();
        SessionSnapshot { providers }
    }

    /// Moves a non-terminal state to `Failed`. Returns `false` when it was already terminal.
    fn fail(&self, index: usize, err: &LLMError) -> bool {
        {
            let mut state = self.lock(index);
            if state.status.is_terminal() {
                return false;
            }
            if !state.text.is_empty() {
                state.text.push('\n');
            }
            state.text.push_str(&format!("[error: {err}]"));
            state.error = Some(err.to_string());
            state.status = StreamStatus::Failed;
        }
        self.publish();
        true
    }
}

/// Unique write handle to one provider's state, owned by that provider's task.
struct StreamWriter {
    shared: Arc<SessionShared>,
    index: usize,
}

impl StreamWriter {
    fn provider(&self) -> &str {
        &self.shared.slots[self.index].provider
    }

    /// Appends one fragment; the first one moves the state to `Streaming`.
    fn append(&mut self, fragment: &str) {
        {
            let mut state = self.shared.lock(self.index);
            if state.status.is_terminal() {
                tracing::debug!(provider = %self.provider(), "fragment after terminal state ignored");
                return;
            }
            state.text.push_str(fragment);
            state.chunks += 1;
            state.status = StreamStatus::Streaming;
        }
        self.shared.publish();
    }

    fn totals(&self) -> (usize, usize) {
        let state = self.shared.lock(self.index);
        (state.chunks, state.text.len())
    }

    fn finish(self) {
        {
            let mut state = self.shared.lock(self.index);
            if state.status.is_terminal() {
                return;
            }
            state.status = StreamStatus::Done;
        }
        self.shared.publish();
    }

    fn fail(self, err: &LLMError) {
        self.shared.fail(self.index, err);
    }
}

/// Starts chat sessions. Cancelling the aggregator's token cancels every session it started.
#[derive(Debug, Clone, Default)]
pub struct StreamAggregator {
    cancel: CancellationToken,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `cancel` as the parent of every session's cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fans `prompt` out to every provider and returns without waiting for any of them.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`LLMError::NoProvidersAvailable`] when `providers` is empty.
    /// - [`LLMError::Validation`] when two providers share an identity or no runtime is
    ///   available.
    ///
    /// Nothing is spawned when an error is returned.
    pub fn start(
        &self,
        providers: Vec<DynProvider>,
        prompt: ChatPrompt,
    ) -> Result<ChatSession, LLMError> {
        if providers.is_empty() {
            return Err(LLMError::NoProvidersAvailable);
        }
        ensure_unique_identities(&providers)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            LLMError::Validation {
                message: format!("chat sessions must start inside a Tokio runtime: {err}"),
            }
        })?;

        let (revision, _) = watch::channel(0);
        let shared = Arc::new(SessionShared {
            slots: providers
                .iter()
                .map(|provider| Slot {
                    provider: provider.name().to_string(),
                    state: Mutex::new(ProviderStreamState::default()),
                })
                .collect(),
            revision,
        });
        let cancel = self.cancel.child_token();
        let prompt = Arc::new(prompt);

        tracing::info!(providers = providers.len(), "chat session started");
        let handles = providers
            .into_iter()
            .enumerate()
            .map(|(index, provider)| {
                let writer = StreamWriter {
                    shared: shared.clone(),
                    index,
                };
                runtime.spawn(run_provider(provider, prompt.clone(), writer, cancel.clone()))
            })
            .collect();

        Ok(ChatSession {
            shared,
            handles,
            cancel,
        })
    }
}

fn ensure_unique_identities(providers: &[DynProvider]) -> Result<(), LLMError> {
    let mut seen = HashSet::new();
    for provider in providers {
        if !seen.insert(provider.name()) {
            return Err(LLMError::Validation {
                message: format!("duplicate provider identity: {}", provider.name()),
            });
        }
    }
    Ok(())
}

async fn run_provider(
    provider: DynProvider,
    prompt: Arc<ChatPrompt>,
    mut writer: StreamWriter,
    cancel: CancellationToken,
) {
    let model = match provider.resolve_model(prompt.model.as_deref()) {
        Ok(model) => model,
        Err(err) => {
            tracing::warn!(provider = %writer.provider(), error = %err, "provider skipped");
            writer.fail(&err);
            return;
        }
    };
    let request = ChatRequest {
        message: prompt.message.clone(),
        model,
        system_prompt: prompt.system_prompt.clone(),
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LLMError::Cancelled),
        result = pump(provider.as_ref(), request, &mut writer) => result,
    };

    match outcome {
        Ok(()) => {
            let (chunks, bytes) = writer.totals();
            tracing::info!(provider = %writer.provider(), chunks, bytes, "stream finished");
            writer.finish();
        }
        Err(err) if err.is_cancelled() => {
            tracing::info!(provider = %writer.provider(), "stream cancelled");
            writer.fail(&err);
        }
        Err(err) => {
            tracing::warn!(provider = %writer.provider(), error = %err, "stream failed");
            writer.fail(&err);
        }
    }
}

// Dropping this future drops the response body, which aborts the HTTP call.
async fn pump(
    provider: &dyn LLMProvider,
    request: ChatRequest,
    writer: &mut StreamWriter,
) -> Result<(), LLMError> {
    tracing::debug!(provider = %writer.provider(), model = %request.model, "opening stream");
    let mut stream = provider.stream_chat(request).await?;
    while let Some(fragment) = stream.next().await {
        writer.append(&fragment?);
    }
    Ok(())
}

/// Cloneable read handle to a running session.
#[derive(Clone)]
pub struct SessionView {
    shared: Arc<SessionShared>,
}

impl SessionView {
    /// Consistent copy of every provider's state. Never waits on network I/O.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    /// Receiver of a revision counter bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Provider identities in session order.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.shared.slots.iter().map(|slot| slot.provider.as_str())
    }
}

/// A running fan-out. Dropping it without [`ChatSession::await_all`] cancels the
/// providers that are still streaming.
pub struct ChatSession {
    shared: Arc<SessionShared>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ChatSession {
    pub fn view(&self) -> SessionView {
        SessionView {
            shared: self.shared.clone(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.shared.slots.iter().map(|slot| slot.provider.as_str())
    }

    /// Aborts every provider that has not finished yet. Finished providers keep their state.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The session's own token, a child of the aggregator's.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for every provider task to finish and returns the final snapshot.
    ///
    /// There is no timeout; race this against a deadline and call [`ChatSession::cancel`]
    /// to stop early.
    pub async fn await_all(mut self) -> SessionSnapshot {
        let handles = std::mem::take(&mut self.handles);
        for (index, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::warn!(provider = %self.shared.slots[index].provider, error = %err, "provider task aborted");
                self.shared.fail(
                    index,
                    &LLMError::Unknown {
                        message: format!("provider task aborted: {err}"),
                    },
                );
            }
        }
        self.shared.snapshot()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.cancel.cancel();
        }
    }
}
