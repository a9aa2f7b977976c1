//! AsyncNode.

use crate::common::{Message, PeerId};
use crate::node::Node;
use crate::server::Server;
use crate::{Context, Error, Result};

impl Node {
    /// Return an async version of this node.
    pub fn as_async(self) -> AsyncNode {
        AsyncNode(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the [Node].
pub struct AsyncNode(Node);

impl AsyncNode {
    // === Getters ===

    pub fn server(&self) -> &Server {
        self.0.server()
    }

    // === Public Methods ===

    /// Handle a message received from `from` and await the outcome.
    pub async fn request(
        &self,
        ctx: Context,
        from: PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        self.0
            .submit(ctx, from, message)
            .receiver
            .recv_async()
            .await
            .unwrap_or(Err(Error::NodeShutdown))
    }

    /// Stop accepting requests.
    ///
    /// Queued requests are still handled, but unlike [Node::shutdown] this
    /// doesn't wait for them.
    pub fn shutdown(&self) {
        self.0.close();
    }
}
