//! Worker pool handing inbound requests to a [Server].

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use flume::{Receiver, SendError, Sender};
use tracing::{debug, trace};

use crate::common::{Message, PeerId};
use crate::server::Server;
use crate::{Context, Error, Result};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
/// Node settings
pub struct NodeSettings {
    /// Number of threads handling requests concurrently, at least 1.
    ///
    /// Defaults to [DEFAULT_WORKERS]
    pub workers: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone)]
/// Runs a [Server] on a pool of worker threads.
///
/// Every submitted request is handled by whichever worker is free, independently
/// of the others. Clones share the same pool, which stops once the last clone is
/// dropped or [Node::shutdown] is called.
pub struct Node {
    server: Arc<Server>,
    sender: Arc<Mutex<Option<Sender<Request>>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Node {
    /// Spawn the workers.
    pub fn new(server: Server, settings: NodeSettings) -> Result<Self> {
        let server = Arc::new(server);
        let (sender, receiver) = flume::unbounded::<Request>();

        let mut handles = Vec::with_capacity(settings.workers.max(1));

        for index in 0..settings.workers.max(1) {
            let server = server.clone();
            let receiver = receiver.clone();

            let handle = thread::Builder::new()
                .name(format!("kadserve-worker-{}", index))
                .spawn(move || run(server, receiver))?;

            handles.push(handle);
        }

        debug!(id = ?server.id(), workers = handles.len(), "Node started");

        Ok(Node {
            server,
            sender: Arc::new(Mutex::new(Some(sender))),
            handles: Arc::new(Mutex::new(handles)),
        })
    }

    // === Getters ===

    pub fn server(&self) -> &Server {
        &self.server
    }

    // === Public Methods ===

    /// Queue a message received from `from`.
    ///
    /// Cancel `ctx` (or a clone of it) to abort the request.
    pub fn submit(&self, ctx: Context, from: PeerId, message: Message) -> PendingResponse {
        let (reply, receiver) = flume::bounded(1);

        let request = Request {
            ctx,
            from,
            message,
            reply,
        };

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);

        let result = match sender.as_ref() {
            Some(sender) => sender.send(request).map_err(|SendError(request)| request),
            None => Err(request),
        };

        if let Err(request) = result {
            let _ = request.reply.send(Err(Error::NodeShutdown));
        }

        PendingResponse { receiver }
    }

    /// Stop accepting requests, and wait for the queued ones to be handled.
    pub fn shutdown(&self) {
        self.close();

        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Stop accepting requests without waiting for the workers.
    pub(crate) fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[derive(Debug)]
/// Outcome of a submitted request, see [Node::submit].
pub struct PendingResponse {
    pub(crate) receiver: Receiver<Result<Option<Message>>>,
}

impl PendingResponse {
    /// Block until the request is handled.
    pub fn wait(self) -> Result<Option<Message>> {
        self.receiver.recv().unwrap_or(Err(Error::NodeShutdown))
    }
}

#[derive(Debug)]
pub(crate) struct Request {
    ctx: Context,
    from: PeerId,
    message: Message,
    reply: Sender<Result<Option<Message>>>,
}

fn run(server: Arc<Server>, receiver: Receiver<Request>) {
    // Queued requests are still delivered after the sender is dropped.
    while let Ok(request) = receiver.recv() {
        let Request {
            ctx,
            from,
            message,
            reply,
        } = request;

        let message_type = message.message_type;
        let result = server.handle_message(&ctx, &from, message);

        match &result {
            Ok(_) => trace!(?from, %message_type, "Handled request"),
            Err(error) => debug!(?from, %message_type, ?error, "Request failed"),
        }

        let _ = reply.send(result);
    }

    debug!("kadserve::Node worker was shutdown");
}
