//! FIND_NODE handler.

use bytes::Bytes;
use tracing::{debug, info};

use super::Server;
use crate::common::{records_to_wire, Message, PeerId, PeerRecord};
use crate::{Context, Result};

impl Server {
    pub(crate) fn handle_find_node(
        &self,
        ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        let mut response = Message::new(message.message_type, Bytes::new(), message.cluster_level);
        let target = PeerId::from_bytes(message.key.clone());

        if target == self.id {
            // Looking for us, answer with ourselves only, addresses or not.
            ctx.check()?;
            let record = self.self_record();

            debug!(?from, addresses = record.addresses.len(), "Responding to FIND_NODE on self");

            ctx.check()?;
            response.closer_peers = records_to_wire(vec![record], self.connectivity.as_ref());

            return Ok(Some(response));
        }

        let mut closest = self.closer_peers(ctx, from, &message.key)?;

        // Never tell a peer about itself, and never list the target twice.
        if &target != from && !closest.contains(&target) {
            ctx.check()?;

            // Lets the target be found even if it isn't in the routing table.
            if self.connectivity.connectedness(&target).is_reachable() {
                closest.push(target);
            }
        }

        if closest.is_empty() {
            info!(?from, "FIND_NODE could not find anything");
            return Ok(Some(response));
        }

        ctx.check()?;
        let with_addresses: Vec<PeerRecord> = self
            .address_book
            .peer_records(&closest)
            .into_iter()
            .filter(|record| !record.has_no_addresses())
            .collect();

        debug!(?from, closer = with_addresses.len(), "Responding to FIND_NODE");

        ctx.check()?;
        response.closer_peers = records_to_wire(with_addresses, self.connectivity.as_ref());

        Ok(Some(response))
    }
}
