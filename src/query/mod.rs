// Query module
// Answers questions from the indexed documents, in one piece or as an event stream

pub mod chat;
pub mod events;


use futures::{StreamExt, stream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::lancedb::{SearchHit, VectorIndex};
use crate::embeddings::ChunkedEmbedder;
use crate::embeddings::generator::preview;
use crate::pipeline::Readiness;
use crate::{RagError, Result, run_blocking};

pub use chat::{ChatClient, ChatMessage, Role};
pub use events::{EventStream, ServerEvent};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "data: [DONE]";
const EVENT_BUFFER: usize = 32;

/// Retrieval-augmented question answering over one collection
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Arc<ChunkedEmbedder>,
    index: Arc<VectorIndex>,
    chat: ChatClient,
    collection: String,
    top_k: usize,
    system_prompt: String,
    readiness: Readiness,
}

impl QueryEngine {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<ChunkedEmbedder>,
        index: Arc<VectorIndex>,
        readiness: Readiness,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            index,
            chat: ChatClient::new(config)?,
            collection: config.vector_db.collection.clone(),
            top_k: config.vector_db.top_k,
            system_prompt: config.chat.system_prompt.clone(),
            readiness,
        })
    }

    /// Answer `question` with a single chat completion
    #[inline]
    pub async fn query(&self, question: &str) -> Result<String> {
        let messages = self.prepare(question).await?;
        let chat = self.chat.clone();
        let answer = run_blocking(move || chat.complete(&messages)).await?;
        info!("Answered question: {}", preview(question, 80));
        Ok(answer)
    }

    /// Answer `question` as a stream of events.
    ///
    /// Nothing happens until the stream is polled. Every failure, including a
    /// pipeline that is not initialized, arrives as the stream's `Error` event.
    #[inline]
    pub fn stream_query(&self, question: &str) -> EventStream {
        let engine = self.clone();
        let question = question.to_string();
        let events = stream::once(async move { engine.start_stream(&question).await }).flat_map(
            |receiver| {
                stream::unfold(receiver, |mut receiver| async move {
                    receiver.recv().await.map(|event| (event, receiver))
                })
            },
        );
        EventStream::new(events.boxed())
    }

    async fn start_stream(self, question: &str) -> mpsc::Receiver<ServerEvent> {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let prepared = self.prepare(question).await;
        match prepared {
            Ok(messages) => {
                let chat = self.chat;
                tokio::spawn(async move { relay_answer(&chat, &messages, &sender).await });
            }
            Err(e) => {
                error!("Streamed query failed before the answer started: {}", e);
                if sender.try_send(ServerEvent::Error(e.to_string())).is_err() {
                    debug!("Event stream closed before the error was delivered");
                }
            }
        }
        receiver
    }

    /// Retrieve context for `question` and build the chat messages
    async fn prepare(&self, question: &str) -> Result<Vec<ChatMessage>> {
        if !self.readiness.is_ready() {
            return Err(RagError::NotInitialized);
        }

        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let embedding = run_blocking(move || embedder.embed(&text)).await?;
        let hits = self
            .index
            .search(&self.collection, &embedding, self.top_k)
            .await?;
        debug!("Retrieved {} documents as context", hits.len());

        Ok(build_messages(
            &self.system_prompt,
            &join_context(&hits),
            question,
        ))
    }
}

/// Hit texts, nearest first, one per line
#[inline]
pub fn join_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[inline]
pub fn build_messages(system_prompt: &str, context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            context, question
        )),
    ]
}

/// Map one upstream line to the event forwarded to the client
pub(crate) fn upstream_event(line: &str) -> Option<ServerEvent> {
    if line.is_empty() || line == DONE_SENTINEL {
        None
    } else if line.starts_with(DATA_PREFIX) {
        Some(ServerEvent::Upstream(line.to_string()))
    } else {
        Some(ServerEvent::Answer(line.to_string()))
    }
}

/// Forwards the upstream answer, then sends the terminal event. Stops and
/// drops the upstream connection as soon as the event stream is dropped.
async fn relay_answer(
    chat: &ChatClient,
    messages: &[ChatMessage],
    sender: &mpsc::Sender<ServerEvent>,
) {
    let terminal = tokio::select! {
        () = sender.closed() => {
            debug!("Event stream dropped, closing upstream connection");
            return;
        }
        result = forward_upstream(chat, messages, sender) => match result {
            Ok(()) => ServerEvent::Done,
            Err(e) => {
                error!("Streamed answer failed: {}", e);
                ServerEvent::Error(e.to_string())
            }
        },
    };

    if sender.send(terminal).await.is_err() {
        debug!("Event stream dropped before the terminal event");
    }
}

async fn forward_upstream(
    chat: &ChatClient,
    messages: &[ChatMessage],
    sender: &mpsc::Sender<ServerEvent>,
) -> Result<()> {
    let mut upstream = chat.open_stream(messages).await?;
    while let Some(line) = upstream.next_line().await? {
        let Some(event) = upstream_event(&line) else {
            continue;
        };
        if sender.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}
