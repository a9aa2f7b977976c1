//! GET_PROVIDERS and ADD_PROVIDER handlers.

use tracing::debug;

use super::Server;
use crate::common::{records_to_wire, ContentId, Message, PeerId};
use crate::datastore::DatastoreKey;
use crate::{Context, Result};

impl Server {
    pub(crate) fn handle_get_providers(
        &self,
        ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        let cid = ContentId::from_bytes(&message.key)?;

        debug!(?from, ?cid, "Handle GET_PROVIDERS");

        // If we have the value, we provide it too.
        ctx.check()?;
        let has = match self
            .datastore
            .has(ctx, &DatastoreKey::from_dht_key(cid.as_bytes()))
        {
            Ok(has) => has,
            Err(error) => {
                debug!(?cid, ?error, "Unexpected datastore error");
                false
            }
        };

        ctx.check()?;
        let mut providers = self.providers.get_providers(ctx, &cid);

        if has && !providers.contains(&self.id) {
            providers.push(self.id.clone());
            debug!(?cid, "Have the value, added self as provider");
        }

        let mut response = Message::new(
            message.message_type,
            message.key.clone(),
            message.cluster_level,
        );

        if !providers.is_empty() {
            ctx.check()?;
            let records: Vec<_> = self
                .address_book
                .peer_records(&providers)
                .into_iter()
                .map(|record| {
                    if record.id == self.id {
                        self.self_record()
                    } else {
                        record
                    }
                })
                .collect();

            debug!(?cid, providers = records.len(), "Have providers");

            ctx.check()?;
            response.provider_peers = records_to_wire(records, self.connectivity.as_ref());
        }

        response.closer_peers = self.closer_wire_peers(ctx, from, &message.key)?;

        Ok(Some(response))
    }

    pub(crate) fn handle_add_provider(
        &self,
        ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        let cid = ContentId::from_bytes(&message.key)?;

        debug!(?from, ?cid, "Adding provider");

        // Only the originator may announce itself, using the addresses it sent.
        for provider in &message.provider_peers {
            if &provider.id != from {
                debug!(provider = ?provider.id, ?from, "Provider record not from originator, ignoring");
                continue;
            }

            if provider.addresses.is_empty() {
                debug!(?from, "No valid addresses for provider, ignoring");
                continue;
            }

            debug!(?from, ?cid, addresses = ?provider.addresses, "Received provider");

            if provider.id != self.id {
                ctx.check()?;
                self.address_book.add_addresses(
                    &provider.id,
                    &provider.addresses,
                    self.settings.provider_addr_ttl,
                );
            }

            ctx.check()?;
            self.providers.add_provider(ctx, &cid, from);
        }

        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::common::{Connectedness, MessageType, WirePeer, RAW, SHA2_256};
    use crate::datastore::{Datastore, MemoryDatastore};
    use crate::peerstore::{Connectivity, MemoryPeerstore};
    use crate::providers::{ProviderIndex, ProviderStore};
    use crate::Error;

    fn cid() -> ContentId {
        ContentId::new_v1(RAW, SHA2_256, &[9; 32])
    }

    fn address(n: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 1, n], 4001))
    }

    fn provider(id: &PeerId, addresses: Vec<SocketAddr>) -> WirePeer {
        WirePeer {
            id: id.clone(),
            addresses,
            connection: Connectedness::Connected,
        }
    }

    fn add_provider(providers: Vec<WirePeer>) -> Message {
        Message::new(MessageType::AddProvider, cid().as_bytes().to_vec(), 0)
            .with_provider_peers(providers)
    }

    #[test]
    fn invalid_cid() {
        let server = Server::builder(PeerId::random()).build();
        let ctx = Context::new();

        for message_type in [MessageType::GetProviders, MessageType::AddProvider] {
            let message = Message::new(message_type, &b"not a cid"[..], 0);

            assert!(matches!(
                server.handle_message(&ctx, &PeerId::random(), message),
                Err(Error::InvalidContentId(_))
            ));
        }
    }

    #[test]
    fn add_provider_from_originator() {
        let providers = Arc::new(ProviderStore::default());
        let peerstore = Arc::new(MemoryPeerstore::new());
        let server = Server::builder(PeerId::random())
            .with_providers(providers.clone())
            .with_peerstore(peerstore.clone())
            .build();
        let ctx = Context::new();
        let from = PeerId::random();

        let response = server
            .handle_add_provider(&ctx, &from, add_provider(vec![provider(&from, vec![address(1)])]))
            .unwrap();

        assert_eq!(response, None);
        assert_eq!(providers.get_providers(&ctx, &cid()), vec![from.clone()]);
        assert_eq!(peerstore.addresses(&from), vec![address(1)]);
        // Connection states are never learned from the wire.
        assert_eq!(peerstore.connectedness(&from), Connectedness::NotConnected);
    }

    #[test]
    fn add_provider_ignores_foreign_and_addressless() {
        let providers = Arc::new(ProviderStore::default());
        let peerstore = Arc::new(MemoryPeerstore::new());
        let server = Server::builder(PeerId::random())
            .with_providers(providers.clone())
            .with_peerstore(peerstore.clone())
            .build();
        let ctx = Context::new();
        let from = PeerId::random();
        let other = PeerId::random();

        server
            .handle_add_provider(
                &ctx,
                &from,
                add_provider(vec![
                    provider(&other, vec![address(2)]),
                    provider(&from, vec![]),
                ]),
            )
            .unwrap();

        assert!(providers.get_providers(&ctx, &cid()).is_empty());
        assert!(peerstore.addresses(&other).is_empty());
    }

    #[test]
    fn own_addresses_are_not_added() {
        let id = PeerId::random();
        let providers = Arc::new(ProviderStore::default());
        let peerstore = Arc::new(MemoryPeerstore::new());
        let server = Server::builder(id.clone())
            .with_providers(providers.clone())
            .with_peerstore(peerstore.clone())
            .build();
        let ctx = Context::new();

        server
            .handle_add_provider(&ctx, &id, add_provider(vec![provider(&id, vec![address(3)])]))
            .unwrap();

        assert!(peerstore.addresses(&id).is_empty());
        assert_eq!(providers.get_providers(&ctx, &cid()), vec![id]);
    }

    #[test]
    fn get_providers_includes_self_when_possessed() {
        let id = PeerId::random();
        let store = Arc::new(MemoryDatastore::new());
        let server = Server::builder(id.clone())
            .with_addresses(vec![address(9)])
            .with_datastore(store.clone())
            .build();
        let ctx = Context::new();

        store
            .put(
                &ctx,
                &DatastoreKey::from_dht_key(cid().as_bytes()),
                Bytes::from_static(b"block"),
            )
            .unwrap();

        let message = Message::new(MessageType::GetProviders, cid().as_bytes().to_vec(), 1);
        let response = server
            .handle_get_providers(&ctx, &PeerId::random(), message)
            .unwrap()
            .unwrap();

        assert_eq!(response.provider_peers.len(), 1);
        assert_eq!(response.provider_peers[0].id, id);
        assert_eq!(response.provider_peers[0].addresses, vec![address(9)]);
        assert_eq!(response.key, Bytes::copy_from_slice(cid().as_bytes()));
        assert_eq!(response.cluster_level, 1);
    }

    #[test]
    fn get_providers_without_any() {
        let server = Server::builder(PeerId::random()).build();

        let message = Message::new(MessageType::GetProviders, cid().as_bytes().to_vec(), 0);
        let response = server
            .handle_get_providers(&Context::new(), &PeerId::random(), message)
            .unwrap()
            .unwrap();

        assert!(response.provider_peers.is_empty());
        assert!(response.closer_peers.is_empty());
    }
}
