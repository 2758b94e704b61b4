use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::worker::control::{ControlRequest, ControlResponse};
use crate::worker::events::CacheEvent;
use crate::worker::interceptor::{Intercepted, InterceptingCacheWorker};
use crate::worker::response::InterceptedRequest;

const MAILBOX_CAPACITY: usize = 128;

pub enum WorkerMessage {
    Fetch {
        request: InterceptedRequest,
        reply: oneshot::Sender<Result<Intercepted, WorkerError>>,
    },
    Control {
        request: ControlRequest,
        reply: oneshot::Sender<ControlResponse>,
    },
}

/// Runs the worker on its own task. Old namespaces are purged before the
/// first message is taken; fetches are served concurrently, control messages
/// in arrival order.
pub fn spawn_worker(worker: Arc<InterceptingCacheWorker>) -> (WorkerClient, JoinHandle<()>) {
    let (sender, mut mailbox) = mpsc::channel::<WorkerMessage>(MAILBOX_CAPACITY);
    let client = WorkerClient { sender, worker: worker.clone() };

    let handle = tokio::spawn(async move {
        if let Err(e) = worker.activate().await {
            tracing::error!("cache worker activation failed: {}", e);
        }
        tracing::info!("cache worker active on {}", worker.config().cache_name);

        while let Some(message) = mailbox.recv().await {
            match message {
                WorkerMessage::Fetch { request, reply } => {
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        let result = worker.handle_fetch(request).await;
                        // the page may have navigated away
                        let _ = reply.send(result);
                    });
                }
                WorkerMessage::Control { request, reply } => {
                    let _ = reply.send(worker.handle_control(request).await);
                }
            }
        }
        tracing::info!("cache worker stopped");
    });

    (client, handle)
}

/// Page side of the worker. Cloning is cheap; the worker stops once every
/// client is dropped.
#[derive(Clone)]
pub struct WorkerClient {
    sender: mpsc::Sender<WorkerMessage>,
    worker: Arc<InterceptingCacheWorker>,
}

impl WorkerClient {
    pub async fn fetch(&self, request: InterceptedRequest) -> Result<Intercepted, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Fetch { request, reply })
            .await
            .map_err(|_| WorkerError::Closed)?;
        response.await.map_err(|_| WorkerError::Closed)?
    }

    pub async fn control(&self, request: ControlRequest) -> Result<ControlResponse, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Control { request, reply })
            .await
            .map_err(|_| WorkerError::Closed)?;
        response.await.map_err(|_| WorkerError::Closed)
    }

    /// Raw message entry point: parses `message`, runs it and returns the
    /// JSON reply.
    pub async fn post_message(&self, message: &str) -> Result<serde_json::Value, WorkerError> {
        let request: ControlRequest = message.parse()?;
        let reply = self.control(request).await?;
        Ok(serde_json::to_value(reply)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.worker.events().subscribe()
    }
}
