use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chorus_llm::aggregator::{ChatPrompt, StreamAggregator, StreamStatus};
use chorus_llm::types::{CapabilityDescriptor, ChatRequest, ModelInfo};
use chorus_llm::{DynProvider, LLMError, LLMProvider, TextStream};
use futures_util::{StreamExt, stream};

/// Yields fixed fragments with a pause between them, optionally ending in an error.
struct PacedProvider {
    name: &'static str,
    fragments: Vec<&'static str>,
    pause: Duration,
    error: Option<&'static str>,
}

impl PacedProvider {
    fn new(name: &'static str, fragments: Vec<&'static str>) -> Self {
        Self {
            name,
            fragments,
            pause: Duration::from_millis(1),
            error: None,
        }
    }

    fn ending_with_error(mut self, error: &'static str) -> Self {
        self.error = Some(error);
        self
    }

    fn into_dyn(self) -> DynProvider {
        Arc::new(self)
    }
}

#[async_trait]
impl LLMProvider for PacedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn default_model(&self) -> Option<&str> {
        Some("paced-1")
    }

    async fn stream_chat(&self, _request: ChatRequest) -> Result<TextStream, LLMError> {
        let pause = self.pause;
        let mut items: Vec<Result<String, LLMError>> = self
            .fragments
            .iter()
            .map(|fragment| Ok(fragment.to_string()))
            .collect();
        if let Some(error) = self.error {
            items.push(Err(LLMError::transport(error)));
        }
        Ok(Box::pin(stream::iter(items).then(move |item| async move {
            tokio::time::sleep(pause).await;
            item
        })))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        Ok(vec![ModelInfo::new("paced-1")])
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_model_listing: true,
            supports_base_url_override: false,
            supports_system_prompt: false,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hello_hi_oops_scenario() {
    let providers = vec![
        PacedProvider::new("P1", vec!["Hel", "lo"]).into_dyn(),
        PacedProvider::new("P2", vec!["Hi"]).into_dyn(),
        PacedProvider::new("P3", vec!["Oops"])
            .ending_with_error("connection reset by peer")
            .into_dyn(),
    ];

    let snapshot = StreamAggregator::new()
        .start(providers, ChatPrompt::new("greet me"))
        .expect("session")
        .await_all()
        .await;

    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.all_done());
    assert_eq!(snapshot.get("P1").map(|p| p.text.as_str()), Some("Hello"));
    assert!(!snapshot.has_error("P1"));
    assert_eq!(snapshot.get("P2").map(|p| p.text.as_str()), Some("Hi"));
    assert!(!snapshot.has_error("P2"));
    assert_eq!(
        snapshot.get("P3").map(|p| p.text.as_str()),
        Some("Oops\n[error: transport error: connection reset by peer]")
    );
    assert!(snapshot.has_error("P3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_only_see_prefixes_of_the_final_text() {
    let fragments: Vec<&'static str> = vec!["a", "bb", "ccc", "dddd", "eeeee", "ffffff"];
    let providers: Vec<DynProvider> = ["one", "two", "three", "four"]
        .into_iter()
        .map(|name| PacedProvider::new(name, fragments.clone()).into_dyn())
        .collect();

    let session = StreamAggregator::new()
        .start(providers, ChatPrompt::new("count"))
        .expect("session");
    let view = session.view();

    let reader = tokio::spawn(async move {
        let mut observed = Vec::new();
        loop {
            let snapshot = view.snapshot();
            let finished = snapshot.all_done();
            observed.push(snapshot);
            if finished {
                return observed;
            }
            tokio::task::yield_now().await;
        }
    });

    let final_snapshot = session.await_all().await;
    let observed = reader.await.expect("reader");
    let expected: String = fragments.concat();

    for provider in final_snapshot.iter() {
        assert_eq!(provider.text, expected);
        assert_eq!(provider.chunks, fragments.len());
        assert_eq!(provider.status, StreamStatus::Done);
    }
    for snapshot in &observed {
        for provider in snapshot.iter() {
            assert!(expected.starts_with(&provider.text), "torn read: {:?}", provider.text);
            if provider.status == StreamStatus::Pending {
                assert!(provider.text.is_empty());
            }
        }
    }
}

#[tokio::test]
async fn snapshots_are_independent_copies() {
    let session = StreamAggregator::new()
        .start(
            vec![PacedProvider::new("solo", vec!["x", "y"]).into_dyn()],
            ChatPrompt::new("hi"),
        )
        .expect("session");
    let before = session.snapshot();
    let after = session.await_all().await;
    assert_eq!(before.get("solo").map(|p| p.text.as_str()), Some(""));
    assert_eq!(after.get("solo").map(|p| p.text.as_str()), Some("xy"));
}
