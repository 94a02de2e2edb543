//! The two parties of the channel and their latest channel objects.

use super::client::ChannelService;
use super::object::ChannelObject;
use crate::errors::ControllerError;
use common::types::{ChannelId, PartyIndex};
use std::sync::Arc;

/// One counterparty in the channel.
pub struct Party {
    index: PartyIndex,
    service: Arc<dyn ChannelService>,
    channel_object: Option<ChannelObject>,
}

impl Party {
    fn new(index: PartyIndex, service: Arc<dyn ChannelService>) -> Self {
        Self {
            index,
            service,
            channel_object: None,
        }
    }

    #[must_use]
    pub fn index(&self) -> PartyIndex {
        self.index
    }

    #[must_use]
    pub fn service(&self) -> &dyn ChannelService {
        self.service.as_ref()
    }

    /// Latest channel object, if the channel was opened.
    #[must_use]
    pub fn channel_object(&self) -> Option<&ChannelObject> {
        self.channel_object.as_ref()
    }

    /// Latest channel object, or `ChannelNotInitialised`.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::ChannelNotInitialised` before `init`.
    pub fn require_channel_object(&self) -> Result<&ChannelObject, ControllerError> {
        self.channel_object
            .as_ref()
            .ok_or(ControllerError::ChannelNotInitialised(self.index))
    }
}

/// Fixed pair of parties: the coffee machine (0) and the provider (1).
///
/// Channel objects are only ever replaced for both parties at once.
pub struct ChannelRegistry {
    local: Party,
    provider: Party,
}

impl ChannelRegistry {
    /// Build the registry from both parties' services.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Internal` if a service reports a party index
    /// other than the slot it is placed in.
    pub fn new(
        local: Arc<dyn ChannelService>,
        provider: Arc<dyn ChannelService>,
    ) -> Result<Self, ControllerError> {
        for (expected, service) in [(PartyIndex::LOCAL, &local), (PartyIndex::PROVIDER, &provider)] {
            if service.party() != expected {
                return Err(ControllerError::Internal(format!(
                    "Channel service for party {} placed in slot {expected}",
                    service.party()
                )));
            }
        }

        Ok(Self {
            local: Party::new(PartyIndex::LOCAL, local),
            provider: Party::new(PartyIndex::PROVIDER, provider),
        })
    }

    #[must_use]
    pub fn local(&self) -> &Party {
        &self.local
    }

    #[must_use]
    pub fn provider(&self) -> &Party {
        &self.provider
    }

    /// Parties in index order.
    pub fn parties(&self) -> impl Iterator<Item = &Party> {
        [&self.local, &self.provider].into_iter()
    }

    /// Replace both channel objects, in party order.
    pub fn advance(&mut self, objects: [ChannelObject; 2]) {
        let [local, provider] = objects;
        self.local.channel_object = Some(local);
        self.provider.channel_object = Some(provider);
    }

    /// Latest channel objects in party order.
    #[must_use]
    pub fn channel_objects(&self) -> [Option<&ChannelObject>; 2] {
        [self.local.channel_object(), self.provider.channel_object()]
    }

    /// Assigned channel ids in party order.
    pub async fn channel_ids(&self) -> [Option<ChannelId>; 2] {
        [
            self.local.service.channel_id().await,
            self.provider.service.channel_id().await,
        ]
    }
}

/// Collect exactly one result per party into the array `advance` takes.
///
/// # Errors
///
/// Returns `ControllerError::Internal` if `objects` does not hold two entries.
pub fn into_pair(objects: Vec<ChannelObject>) -> Result<[ChannelObject; 2], ControllerError> {
    let len = objects.len();
    objects
        .try_into()
        .map_err(|_| ControllerError::Internal(format!("Expected 2 channel objects, got {len}")))
}
