//! GET_VALUE and PUT_VALUE handlers.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::Server;
use crate::common::{Freshness, Message, PeerId, Record};
use crate::datastore::{DatastoreError, DatastoreKey};
use crate::{Context, Error, Result};

impl Server {
    pub(crate) fn handle_get_value(
        &self,
        ctx: &Context,
        from: &PeerId,
        message: Message,
    ) -> Result<Option<Message>> {
        debug!(?from, key = ?message.key, "Handle GET_VALUE");

        if message.key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let record = self.check_local_datastore(ctx, &message.key)?;
        let closer_peers = self.closer_wire_peers(ctx, from, &message.key)?;

        let mut response = Message::new(message.message_type, message.key, message.cluster_level);
        response.record = record;
        response.closer_peers = closer_peers;

        Ok(Some(response))
    }

    pub(crate) fn handle_put_value(
        &self,
        ctx: &Context,
        from: &PeerId,
        mut message: Message,
    ) -> Result<Option<Message>> {
        let mut record = match message.record.take() {
            Some(record) => record,
            None => {
                info!(?from, "Got nil record");
                return Err(Error::MissingRecord);
            }
        };

        if message.key != record.key {
            return Err(Error::KeyMismatch);
        }

        // Never store a receipt time we didn't set ourselves.
        record.clean();

        ctx.check()?;
        if let Err(error) = self.validator.validate(&record.key, &record.value) {
            warn!(?from, ?error, "Bad dht record in PUT");
            return Err(error.into());
        }

        let ds_key = DatastoreKey::from_dht_key(&record.key);

        let _guard = self.put_locks.lock(&record.key);

        // A record the validator prefers must never be overwritten, e.g. by
        // a lower sequence number.
        if let Some(existing) = self.get_record_from_datastore(ctx, &ds_key)? {
            ctx.check()?;
            let selected = self
                .validator
                .select(&record.key, &[&record.value[..], &existing.value[..]])
                .map_err(|error| {
                    warn!(?from, ?error, "Bad dht record in PUT");
                    Error::from(error)
                })?;

            if selected != 0 {
                info!(?from, ?ds_key, "Record in PUT is older than existing record, ignoring");
                return Err(Error::OldRecord);
            }
        }

        record.stamp(Utc::now());
        let bytes = record.to_bytes()?;

        ctx.check()?;
        self.datastore.put(ctx, &ds_key, bytes.into())?;
        debug!(?from, ?ds_key, "Stored record");

        message.record = Some(record);

        Ok(Some(message))
    }

    // === Private Methods ===

    /// Stored record under `key` if it exists and is fresh.
    ///
    /// Stale records are deleted on the way.
    fn check_local_datastore(&self, ctx: &Context, key: &[u8]) -> Result<Option<Record>> {
        let ds_key = DatastoreKey::from_dht_key(key);

        ctx.check()?;
        let bytes = match self.datastore.get(ctx, &ds_key) {
            Ok(bytes) => bytes,
            Err(DatastoreError::NotFound) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let record = Record::from_bytes(&bytes).map_err(|error| {
            debug!(?ds_key, "Failed to decode DHT record from datastore");
            error
        })?;

        // Records aren't validated here, checking them is up to the requester.
        match record.freshness(self.settings.max_record_age, Utc::now()) {
            Freshness::Fresh => return Ok(Some(record)),
            Freshness::Expired => {
                debug!(?ds_key, "Old record found, tossing");
            }
            Freshness::MissingReceiptTime => {
                info!(?ds_key, "Either no receive time set on record, or it was invalid");
            }
        }

        ctx.check()?;
        if let Err(error) = self.datastore.delete(ctx, &ds_key) {
            error!(?ds_key, ?error, "Failed to delete bad record from datastore");
        }

        Ok(None)
    }

    /// Existing record under `ds_key`, if any.
    ///
    /// Undecodable or invalid records count as absent and get overwritten.
    fn get_record_from_datastore(
        &self,
        ctx: &Context,
        ds_key: &DatastoreKey,
    ) -> Result<Option<Record>> {
        ctx.check()?;
        let bytes = match self.datastore.get(ctx, ds_key) {
            Ok(bytes) => bytes,
            Err(DatastoreError::NotFound) => return Ok(None),
            Err(error) => {
                error!(?ds_key, ?error, "Got error retrieving record from datastore");
                return Err(error.into());
            }
        };

        let record = match Record::from_bytes(&bytes) {
            Ok(record) => record,
            Err(_) => {
                error!(?ds_key, "Bad record data stored in datastore");
                return Ok(None);
            }
        };

        ctx.check()?;
        if let Err(error) = self.validator.validate(&record.key, &record.value) {
            debug!(?ds_key, ?error, "Local record verify failed (discarded)");
            return Ok(None);
        }

        Ok(Some(record))
    }
}
