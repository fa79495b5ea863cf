//! gRPC service implementation for the word explanation worker.
//!
//! [`OrdbokService`] implements the generated [`Ordbok`] trait on top of a
//! shared [`GenerationWorker`]. Unary calls only touch the store and the
//! task queue, so they return immediately; generated content is announced
//! on the `Subscribe` stream.
//!
//! ## Responsibilities
//!
//! - Translate protobuf requests into worker calls and domain types back into
//!   protobuf replies.
//! - Map worker errors onto gRPC status codes.
//! - Attach each `Subscribe` call to the event bus for as long as the client
//!   keeps the stream open.

use crate::server::telemetry::{
    decrement_subscriptions_active, increment_request_errors, increment_requests,
    increment_subscriptions_active, record_request_duration,
};
use core::pin::Pin;
use core::task::{Context, Poll};
use ordbok_tonic_core::{
    Error,
    ordbok::{GenerationWorker, SubscriptionStream},
    proto::{
        ItemReply, ListReply, ListRequest, SubmitReply, SubscribeRequest, WordRequest,
        WorkerEvent, ordbok_server::Ordbok,
    },
};
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct OrdbokService {
    worker: Arc<GenerationWorker>,
}

impl OrdbokService {
    pub const fn new(worker: Arc<GenerationWorker>) -> Self {
        Self { worker }
    }

    /// Stops the worker and closes every open `Subscribe` stream.
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }
}

/// Records request metrics and converts the outcome into a gRPC reply.
fn reply<T, R>(started: Instant, result: Result<T, Error>) -> Result<Response<R>, Status>
where
    T: Into<R>,
{
    record_request_duration(started.elapsed().as_secs_f64() * 1_000.0);
    match result {
        Ok(value) => Ok(Response::new(value.into())),
        Err(e) => {
            increment_request_errors();
            tracing::debug!("Request failed: {e}");
            Err(e.into())
        }
    }
}

/// Response stream for one `Subscribe` call.
///
/// Dropping it (client gone or server shutdown) unregisters the subscriber
/// from the event bus and lowers the active-subscription gauge.
struct EventStream {
    events: SubscriptionStream,
}

impl EventStream {
    fn new(events: SubscriptionStream) -> Self {
        increment_subscriptions_active();
        Self { events }
    }
}

impl Stream for EventStream {
    type Item = Result<WorkerEvent, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events)
            .poll_next(cx)
            .map(|event| event.map(|event| Ok(WorkerEvent::from(event))))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        tracing::debug!(
            subscriber = self.events.id().as_u64(),
            "Client unsubscribed from worker events"
        );
        decrement_subscriptions_active();
    }
}

#[tonic::async_trait]
impl Ordbok for OrdbokService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<WorkerEvent, Status>> + Send>>;

    /// Registers a word and queues it for generation when needed.
    #[tracing::instrument(skip_all, fields(word = %req.get_ref().word))]
    async fn submit(&self, req: Request<WordRequest>) -> Result<Response<SubmitReply>, Status> {
        let started = Instant::now();
        increment_requests();
        let result = self.worker.submit(&req.get_ref().word).await;
        reply(started, result.map_err(Error::from))
    }

    /// Queues another explanation for a word that already exists.
    #[tracing::instrument(skip_all, fields(word = %req.get_ref().word))]
    async fn retry(&self, req: Request<WordRequest>) -> Result<Response<ItemReply>, Status> {
        let started = Instant::now();
        increment_requests();
        let result = self.worker.retry(&req.get_ref().word).await;
        reply(started, result.map_err(Error::from))
    }

    #[tracing::instrument(skip_all, fields(word = %req.get_ref().word))]
    async fn get(&self, req: Request<WordRequest>) -> Result<Response<ItemReply>, Status> {
        let started = Instant::now();
        increment_requests();
        let result = self.worker.get(&req.get_ref().word).await;
        reply(started, result.map_err(Error::from))
    }

    #[tracing::instrument(skip_all, fields(pending_only = req.get_ref().pending_only))]
    async fn list(&self, req: Request<ListRequest>) -> Result<Response<ListReply>, Status> {
        let started = Instant::now();
        increment_requests();
        let pending_only = req.get_ref().pending_only;
        let result = self.worker.list().await.map(|items| ListReply {
            items: items
                .into_iter()
                .filter(|item| !pending_only || item.is_pending())
                .map(Into::into)
                .collect(),
        });
        reply(started, result.map_err(Error::from))
    }

    /// Streams worker events until the client goes away or the server shuts
    /// down.
    ///
    /// Dropping the stream unregisters the subscriber right away.
    #[tracing::instrument(skip_all, fields(peer = ?req.remote_addr()))]
    async fn subscribe(
        &self,
        req: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        if self.worker.is_shutdown() {
            return Err(Error::ServiceShutdown.into());
        }

        let subscription = self.worker.subscribe();
        tracing::info!(
            subscriber = subscription.id().as_u64(),
            "Client subscribed to worker events"
        );

        let stream = EventStream::new(subscription.into_stream());
        Ok(Response::new(Box::pin(stream) as Self::SubscribeStream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ordbok_tonic_core::ordbok::{
        BackendError, EventBus, GenerationBackend, GenerationEntry, Item, ItemStore, MemoryStore,
        WorkerConfig,
    };
    use ordbok_tonic_core::proto::EventKind;
    use std::time::Duration;
    use tokio_stream::StreamExt;
    use tonic::Code;

    struct Canned;

    #[async_trait]
    impl GenerationBackend for Canned {
        async fn generate(
            &self,
            key: &str,
            prior: &[GenerationEntry],
        ) -> Result<GenerationEntry, BackendError> {
            if key == "trasig" {
                return Err(BackendError::Request("model offline".into()));
            }
            Ok(GenerationEntry::new(
                format!("förklaring {} av {key}", prior.len() + 1),
                vec!["lycklig".into()],
            ))
        }
    }

    fn service_with(store: Arc<MemoryStore>) -> OrdbokService {
        let worker = GenerationWorker::start(
            WorkerConfig {
                shutdown_timeout: Duration::from_secs(2),
                ..WorkerConfig::default()
            },
            store as Arc<dyn ItemStore>,
            Arc::new(Canned),
            Arc::new(EventBus::new()),
        );
        OrdbokService::new(Arc::new(worker))
    }

    fn word(word: &str) -> Request<WordRequest> {
        Request::new(WordRequest { word: word.into() })
    }

    async fn next_event(stream: &mut <OrdbokService as Ordbok>::SubscribeStream) -> WorkerEvent {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("event arrived in time")
            .expect("stream still open")
            .expect("event is not an error")
    }

    #[tokio::test]
    async fn submit_then_subscribe_delivers_ready_event() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let mut events = service
            .subscribe(Request::new(SubscribeRequest {}))
            .await
            .unwrap()
            .into_inner();

        let reply = service.submit(word(" glad ")).await.unwrap().into_inner();
        assert!(reply.created);
        assert!(reply.enqueued);
        assert_eq!(reply.item.unwrap().key, "glad");

        let event = next_event(&mut events).await;
        assert_eq!(event.kind(), EventKind::Ready);
        assert_eq!(event.key, "glad");
        assert_eq!(event.word, "glad");

        let item = service.get(word("glad")).await.unwrap().into_inner().item.unwrap();
        assert!(!item.pending);
        assert_eq!(item.entries[0].explanation, "förklaring 1 av glad");

        service.shutdown().await;
    }

    #[tokio::test]
    async fn backend_failure_is_streamed_as_error_event() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let mut events = service
            .subscribe(Request::new(SubscribeRequest {}))
            .await
            .unwrap()
            .into_inner();

        service.submit(word("trasig")).await.unwrap();

        let event = next_event(&mut events).await;
        assert_eq!(event.kind(), EventKind::Error);
        assert_eq!(event.key, "trasig");
        assert!(event.error.contains("model offline"), "{}", event.error);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn status_codes_follow_worker_errors() {
        let service = service_with(Arc::new(MemoryStore::new()));

        let missing = service.retry(word("okänd")).await.unwrap_err();
        assert_eq!(missing.code(), Code::NotFound);

        let empty = service.submit(word("   ")).await.unwrap_err();
        assert_eq!(empty.code(), Code::InvalidArgument);

        let too_long = service.get(word(&"a".repeat(101))).await.unwrap_err();
        assert_eq!(too_long.code(), Code::InvalidArgument);

        service.shutdown().await;
        let late = service.submit(word("glad")).await.unwrap_err();
        assert_eq!(late.code(), Code::Unavailable);
        let late = service
            .subscribe(Request::new(SubscribeRequest {}))
            .await
            .err()
            .expect("subscribe refused after shutdown");
        assert_eq!(late.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn list_can_filter_pending_items() {
        let mut done = Item::new("glad");
        done.append(GenerationEntry::new("finns", vec![]));
        let store = Arc::new(MemoryStore::with_items([done]));
        let service = service_with(Arc::clone(&store));
        // Created behind the worker's back; generation for it always fails,
        // so it stays pending whatever the scanner does.
        store.create("trasig").await.unwrap();

        let all = service
            .list(Request::new(ListRequest { pending_only: false }))
            .await
            .unwrap()
            .into_inner();
        let keys: Vec<_> = all.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["glad", "trasig"]);

        let pending = service
            .list(Request::new(ListRequest { pending_only: true }))
            .await
            .unwrap()
            .into_inner();
        let keys: Vec<_> = pending.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["trasig"]);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn dropped_stream_unregisters_subscriber() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let bus = Arc::clone(service.worker.events());

        for _ in 0..3 {
            let events = service
                .subscribe(Request::new(SubscribeRequest {}))
                .await
                .unwrap()
                .into_inner();
            assert_eq!(bus.subscriber_count(), 1);
            drop(events);
            assert_eq!(bus.subscriber_count(), 0);
        }

        service.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let service = service_with(Arc::new(MemoryStore::new()));
        let mut events = service
            .subscribe(Request::new(SubscribeRequest {}))
            .await
            .unwrap()
            .into_inner();

        service.shutdown().await;

        let end = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("stream ended in time");
        assert!(end.is_none());
    }
}
