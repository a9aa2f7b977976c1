//! Responder side of the DHT: dispatch inbound messages to their handlers.

mod locks;
mod peers;
mod providers;
mod values;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::common::{records_to_wire, Message, MessageType, PeerId, PeerRecord, WirePeer};
use crate::datastore::{Datastore, MemoryDatastore};
use crate::peerstore::{AddressBook, Connectivity, MemoryPeerstore};
use crate::providers::{ProviderIndex, ProviderStore};
use crate::routing_table::{KademliaTable, RoutingTable};
use crate::validator::{NamespacedValidator, Validator};
use crate::{Context, Error, Result};

pub use locks::{StripedLocks, STRIPES};

/// Records older than this are treated as absent, and deleted when read.
pub const MAX_RECORD_AGE: Duration = Duration::from_secs(36 * 60 * 60);
/// Number of closer peers sent along responses.
pub const CLOSER_PEER_COUNT: usize = 20;
/// How long addresses learned from provider announcements are kept.
pub const PROVIDER_ADDR_TTL: Duration = Duration::from_secs(30 * 60);

/// Signature shared by all message handlers.
///
/// `Ok(None)` means the request succeeded without a response payload.
pub type Handler = fn(&Server, &Context, &PeerId, Message) -> Result<Option<Message>>;

#[derive(Debug, Clone)]
/// Server settings
pub struct ServerSettings {
    /// Age after which a stored record is considered absent.
    ///
    /// Defaults to [MAX_RECORD_AGE]
    pub max_record_age: Duration,
    /// Maximum number of closer peers in a response.
    ///
    /// Defaults to [CLOSER_PEER_COUNT]
    pub closer_peer_count: usize,
    /// Time to live of provider addresses added to the address book.
    ///
    /// Defaults to [PROVIDER_ADDR_TTL]
    pub provider_addr_ttl: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_record_age: MAX_RECORD_AGE,
            closer_peer_count: CLOSER_PEER_COUNT,
            provider_addr_ttl: PROVIDER_ADDR_TTL,
        }
    }
}

#[derive(Debug)]
/// Handles inbound DHT requests on behalf of the local peer.
///
/// Every collaborator is shared and synchronizes itself, so a single server
/// can handle many requests at once. The only lock held by the server itself
/// serializes PUT_VALUE requests per key stripe.
pub struct Server {
    id: PeerId,
    addresses: Vec<SocketAddr>,
    datastore: Arc<dyn Datastore>,
    validator: Arc<dyn Validator>,
    providers: Arc<dyn ProviderIndex>,
    routing_table: Arc<dyn RoutingTable>,
    address_book: Arc<dyn AddressBook>,
    connectivity: Arc<dyn Connectivity>,
    put_locks: StripedLocks,
    settings: ServerSettings,
}

impl Server {
    /// Start building a server for the local peer `id`.
    pub fn builder(id: PeerId) -> ServerBuilder {
        ServerBuilder::new(id)
    }

    // === Getters ===

    /// The local peer id.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Addresses this node announces for itself.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    // === Public Methods ===

    /// Returns the handler for a message type, or `None` if the type is unsupported.
    pub fn handler_for(message_type: MessageType) -> Option<Handler> {
        let handler: Handler = match message_type {
            MessageType::GetValue => Server::handle_get_value,
            MessageType::PutValue => Server::handle_put_value,
            MessageType::FindNode => Server::handle_find_node,
            MessageType::AddProvider => Server::handle_add_provider,
            MessageType::GetProviders => Server::handle_get_providers,
            MessageType::Ping => Server::handle_ping,
            MessageType::Unsupported(_) => return None,
        };

        Some(handler)
    }

    /// Handle a message received from `from`.
    pub fn handle_message(
        &self,
        ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        let handler = match Server::handler_for(message.message_type) {
            Some(handler) => handler,
            None => {
                warn!(?from, message_type = ?message.message_type, "Unsupported message type");

                return Err(Error::UnsupportedMessageType(message.message_type.to_i32()));
            }
        };

        handler(self, ctx, from, message)
    }

    // === Private Methods ===

    fn handle_ping(
        &self,
        _ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        debug!(?from, "Responding to ping");

        Ok(Some(message))
    }

    /// This node's own record: its configured addresses, then any the address book knows.
    fn self_record(&self) -> PeerRecord {
        let mut addresses = self.addresses.clone();

        for record in self.address_book.peer_records(std::slice::from_ref(&self.id)) {
            for address in record.addresses {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }

        PeerRecord::new(self.id.clone(), addresses)
    }

    /// Peers closer to `key` than this node, excluding the requester and this node.
    fn closer_peers(&self, ctx: &Context, from: &PeerId, key: &[u8]) -> Result<Vec<PeerId>> {
        ctx.check()?;

        let mut closer = self
            .routing_table
            .closer_peers(key, from, self.settings.closer_peer_count);
        closer.retain(|peer| peer != &self.id);

        Ok(closer)
    }

    /// Closer peers described for a GET_VALUE or GET_PROVIDERS response.
    ///
    /// Peers without addresses are kept, but logged.
    fn closer_wire_peers(
        &self,
        ctx: &Context,
        from: &PeerId,
        key: &[u8],
    ) -> Result<Vec<WirePeer>> {
        let closer = self.closer_peers(ctx, from, key)?;

        if closer.is_empty() {
            return Ok(vec![]);
        }

        ctx.check()?;
        let records = self.address_book.peer_records(&closer);

        for record in &records {
            debug!(peer = ?record.id, "Returning closer peer");

            if record.has_no_addresses() {
                warn!(local = ?self.id, sending = ?record.id, remote = ?from, "No addresses on peer being sent");
            }
        }

        ctx.check()?;
        Ok(records_to_wire(records, self.connectivity.as_ref()))
    }
}

#[derive(Debug)]
/// Builder of a [Server], defaulting every collaborator to its in memory implementation.
pub struct ServerBuilder {
    id: PeerId,
    addresses: Vec<SocketAddr>,
    datastore: Option<Arc<dyn Datastore>>,
    validator: Option<Arc<dyn Validator>>,
    providers: Option<Arc<dyn ProviderIndex>>,
    routing_table: Option<Arc<dyn RoutingTable>>,
    address_book: Option<Arc<dyn AddressBook>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    settings: ServerSettings,
}

impl ServerBuilder {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            addresses: vec![],
            datastore: None,
            validator: None,
            providers: None,
            routing_table: None,
            address_book: None,
            connectivity: None,
            settings: ServerSettings::default(),
        }
    }

    // === Options ===

    /// Addresses this node is reachable at, sent when a peer looks it up.
    pub fn with_addresses(mut self, addresses: Vec<SocketAddr>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_providers(mut self, providers: Arc<dyn ProviderIndex>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn with_routing_table(mut self, routing_table: Arc<dyn RoutingTable>) -> Self {
        self.routing_table = Some(routing_table);
        self
    }

    pub fn with_address_book(mut self, address_book: Arc<dyn AddressBook>) -> Self {
        self.address_book = Some(address_book);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Use the same peerstore as address book and connectivity oracle.
    pub fn with_peerstore<P: AddressBook + Connectivity + 'static>(self, peerstore: Arc<P>) -> Self {
        self.with_address_book(peerstore.clone())
            .with_connectivity(peerstore)
    }

    pub fn with_settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    // === Public Methods ===

    pub fn build(self) -> Server {
        let peerstore = Arc::new(MemoryPeerstore::new());
        let id = self.id;

        Server {
            datastore: self
                .datastore
                .unwrap_or_else(|| Arc::new(MemoryDatastore::new())),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(NamespacedValidator::default())),
            providers: self
                .providers
                .unwrap_or_else(|| Arc::new(ProviderStore::default())),
            routing_table: self
                .routing_table
                .unwrap_or_else(|| Arc::new(KademliaTable::new(id.clone()))),
            address_book: self.address_book.unwrap_or_else(|| peerstore.clone()),
            connectivity: self.connectivity.unwrap_or(peerstore),
            put_locks: StripedLocks::new(),
            settings: self.settings,
            addresses: self.addresses,
            id,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatch_is_total() {
        for message_type in [
            MessageType::GetValue,
            MessageType::PutValue,
            MessageType::FindNode,
            MessageType::AddProvider,
            MessageType::GetProviders,
            MessageType::Ping,
        ] {
            assert!(Server::handler_for(message_type).is_some());
        }

        assert!(Server::handler_for(MessageType::Unsupported(17)).is_none());
    }

    #[test]
    fn unsupported_message_type() {
        let server = Server::builder(PeerId::random()).build();
        let message = Message::new(MessageType::Unsupported(17), &b"key"[..], 0);

        assert!(matches!(
            server.handle_message(&Context::new(), &PeerId::random(), message),
            Err(Error::UnsupportedMessageType(17))
        ));
    }

    #[test]
    fn ping_echoes_request() {
        let server = Server::builder(PeerId::random()).build();
        let message = Message::new(MessageType::Ping, &b"whatever"[..], 7);

        let response = server
            .handle_message(&Context::new(), &PeerId::random(), message.clone())
            .unwrap();

        assert_eq!(response, Some(message));
    }

    #[test]
    fn default_settings() {
        let settings = ServerSettings::default();

        assert_eq!(settings.max_record_age, Duration::from_secs(129_600));
        assert_eq!(settings.closer_peer_count, 20);
        assert_eq!(settings.provider_addr_ttl, Duration::from_secs(1800));
    }
}
