//! Account and group lifecycle.

use tracing::{info, warn};

use super::Services;
use crate::acl::{AccessTarget, Actor, Privileges};
use crate::entity::{EntityId, EntityVariant, GroupAccess};
use crate::error::{EntityError, ServiceError};

impl Services {
    pub fn register_account(&mut self, name: &str) -> Result<EntityId, ServiceError> {
        let now = self.clock.now();
        let id = self.entities.register_account(name, now)?;
        info!(account = %name, id = %id, "account registered");
        Ok(id)
    }

    pub fn register_group(&mut self, name: &str) -> Result<EntityId, ServiceError> {
        let now = self.clock.now();
        let id = self.entities.register_group(name, now)?;
        info!(group = %name, id = %id, "group registered");
        Ok(id)
    }

    /// Add `account` to `group`, or update its access there.
    pub fn add_group_member(&mut self, group: &str, account: &str, access: GroupAccess) -> Result<(), ServiceError> {
        let group_id = self.require_entity(group)?;
        let member = self.require_entity(account)?;
        self.entities.add_member(group_id, member, access)?;
        info!(%group, %account, access = ?access, "group membership updated");
        Ok(())
    }

    fn require_entity(&self, name: &str) -> Result<EntityId, EntityError> {
        self.entities
            .lookup(name)
            .filter(|e| e.variant() != EntityVariant::ExtTarget)
            .map(|e| e.id())
            .ok_or_else(|| EntityError::NoSuchEntity(name.to_string()))
    }

    /// Drop an account or group.
    ///
    /// Channels it solely founds pass to a successor or are dropped; its
    /// other records go with it and users logged in to it are logged out.
    pub fn drop_entity(&mut self, name: &str) -> Result<(), ServiceError> {
        let id = self.require_entity(name)?;
        let target = AccessTarget::Entity(id);

        for channel in self.store.channels_of(id) {
            let founder = self
                .store
                .get(&channel, &target)
                .is_some_and(|r| r.level.contains(Privileges::FOUNDER));
            if founder && self.view().founder_count(&channel) == 1 {
                self.succeed(&channel, id);
            }
        }
        for channel in self.store.channels_of(id) {
            self.engine().purge(&channel, &target);
        }

        let nicks: Vec<String> = self
            .network
            .users_logged_in_as(id)
            .map(|u| u.nick.clone())
            .collect();
        for nick in nicks {
            self.network.set_account(&nick, None);
        }

        self.entities.remove(id);
        info!(entity = %name, id = %id, "entity dropped");
        self.settle();
        Ok(())
    }

    /// Hand `channel` from its sole founder `old` to the best candidate.
    fn succeed(&mut self, channel: &str, old: EntityId) {
        let now = self.clock.now();
        let successor = self.view().pick_successor(channel, &self.policy, now);
        // make room under max_founders before the grant
        self.engine().purge(channel, &AccessTarget::Entity(old));

        let Some(id) = successor else {
            info!(%channel, "no successor found");
            if let Err(e) = self.drop_channel(channel) {
                warn!(%channel, error = %e, "drop without successor failed");
            }
            return;
        };

        let result = self.engine().change(
            channel,
            AccessTarget::Entity(id),
            Privileges::FOUNDER | Privileges::FLAGS,
            Privileges::empty(),
            Privileges::ALL_ALL,
            Actor::Services,
        );
        match result {
            Ok(_) => {
                let name = self.entities.name_of(id).unwrap_or_default();
                info!(%channel, successor = %name, "foundership transferred");
            }
            Err(e) => {
                warn!(%channel, error = %e, "succession failed; dropping channel");
                if let Err(e) = self.drop_channel(channel) {
                    warn!(%channel, error = %e, "drop after failed succession failed");
                }
            }
        }
    }
}
