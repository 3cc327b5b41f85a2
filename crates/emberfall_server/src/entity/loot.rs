use glam::Vec2;

use emberfall_shared::{LootView, LOOT_DESPAWN_SECS};

use crate::entity::EntityId;

/// How many items one bag can hold.
pub const BAG_CAPACITY: usize = 8;

// ============================================================================
// LOOT BAG ENTITY
// ============================================================================

pub struct LootBag {
    pub id: EntityId,
    pub pos: Vec2,
    pub items: Vec<String>,
    pub despawn_at: f64,
    pub owner: Option<EntityId>,
    pub soulbound: bool,
    pub removed: bool,
}

impl LootBag {
    /// A public bag, optionally tagged with the dropping player so their
    /// own drops merge back together.
    pub fn public(id: EntityId, pos: Vec2, items: Vec<String>, owner: Option<EntityId>, now: f64) -> Self {
        Self {
            id,
            pos,
            items,
            despawn_at: now + LOOT_DESPAWN_SECS,
            owner,
            soulbound: false,
            removed: false,
        }
    }

    /// A soulbound bag; the owner is mandatory.
    pub fn soulbound(id: EntityId, pos: Vec2, items: Vec<String>, owner: EntityId, now: f64) -> Self {
        Self {
            id,
            pos,
            items,
            despawn_at: now + LOOT_DESPAWN_SECS,
            owner: Some(owner),
            soulbound: true,
            removed: false,
        }
    }

    pub fn update(&mut self, now: f64) {
        if now >= self.despawn_at || self.items.is_empty() {
            self.removed = true;
        }
    }

    /// Soulbound bags exist only for their owner.
    pub fn visible_to(&self, viewer: EntityId) -> bool {
        !self.soulbound || self.owner == Some(viewer)
    }

    /// Pops the first item. An emptied bag flags itself for removal.
    pub fn take_first(&mut self) -> Option<String> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(0);
        if self.items.is_empty() {
            self.removed = true;
        }
        Some(item)
    }

    pub fn has_room(&self) -> bool {
        self.items.len() < BAG_CAPACITY
    }

    pub fn to_view(&self) -> LootView {
        LootView {
            id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            items: self.items.clone(),
            soulbound: self.soulbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::new_entity_id;

    #[test]
    fn test_soulbound_visibility() {
        let owner = new_entity_id();
        let stranger = new_entity_id();
        let bag = LootBag::soulbound(new_entity_id(), Vec2::ZERO, vec!["ring_of_attack".into()], owner, 0.0);
        assert!(bag.visible_to(owner));
        assert!(!bag.visible_to(stranger));

        let open = LootBag::public(new_entity_id(), Vec2::ZERO, vec!["ring_of_attack".into()], None, 0.0);
        assert!(open.visible_to(stranger));
    }

    #[test]
    fn test_empty_bag_removes_itself() {
        let mut bag = LootBag::public(new_entity_id(), Vec2::ZERO, vec!["chain_mail".into()], None, 0.0);
        assert_eq!(bag.take_first().as_deref(), Some("chain_mail"));
        assert!(bag.removed);
        assert!(bag.take_first().is_none());
    }

    #[test]
    fn test_despawn_timer() {
        let mut bag = LootBag::public(new_entity_id(), Vec2::ZERO, vec!["chain_mail".into()], None, 0.0);
        bag.update(LOOT_DESPAWN_SECS - 1.0);
        assert!(!bag.removed);
        bag.update(LOOT_DESPAWN_SECS);
        assert!(bag.removed);
    }
}
