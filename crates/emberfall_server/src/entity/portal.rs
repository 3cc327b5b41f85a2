use glam::Vec2;

use emberfall_shared::{InstanceKind, PortalView};

use crate::entity::EntityId;

// ============================================================================
// PORTAL ENTITY
// ============================================================================

pub struct Portal {
    pub id: EntityId,
    pub pos: Vec2,
    /// Instance id to transfer into; the literal `"vault"` is a sentinel the
    /// orchestrator resolves to the entering account's own vault.
    pub target_instance: String,
    pub target_kind: InstanceKind,
    pub name: String,
    pub expires_at: Option<f64>,
    pub visible: bool,
    pub removed: bool,
}

impl Portal {
    pub fn permanent(
        id: EntityId,
        pos: Vec2,
        target_instance: impl Into<String>,
        target_kind: InstanceKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            pos,
            target_instance: target_instance.into(),
            target_kind,
            name: name.into(),
            expires_at: None,
            visible: true,
            removed: false,
        }
    }

    pub fn expiring(
        id: EntityId,
        pos: Vec2,
        target_instance: impl Into<String>,
        target_kind: InstanceKind,
        name: impl Into<String>,
        expires_at: f64,
    ) -> Self {
        Self {
            expires_at: Some(expires_at),
            ..Self::permanent(id, pos, target_instance, target_kind, name)
        }
    }

    pub fn update(&mut self, now: f64) {
        let Some(expires_at) = self.expires_at else {
            self.visible = true;
            return;
        };
        if now >= expires_at {
            self.removed = true;
            return;
        }
        self.visible = blink_visible(now, expires_at - now);
    }

    pub fn to_view(&self) -> PortalView {
        PortalView {
            id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            name: self.name.clone(),
            kind: self.target_kind,
            visible: self.visible,
        }
    }
}

/// Blink cadence tiers as expiry approaches: steady above 30s remaining,
/// then 500ms / 250ms / 100ms periods below 30s / 10s / 3s. The on/off
/// bucket is taken from the simulation clock so co-located portals blink
/// in phase.
pub fn blink_visible(now: f64, remaining: f64) -> bool {
    if remaining >= 30.0 {
        return true;
    }
    let period = if remaining < 3.0 {
        0.1
    } else if remaining < 10.0 {
        0.25
    } else {
        0.5
    };
    (now / period).floor() as i64 % 2 == 0
}

// ============================================================================
// VAULT CHEST ENTITY
// ============================================================================

/// The static interactable inside a vault instance.
pub struct VaultChest {
    pub id: EntityId,
    pub pos: Vec2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::new_entity_id;

    #[test]
    fn test_blink_tiers() {
        // Steady when far from expiry.
        assert!(blink_visible(0.0, 45.0));
        assert!(blink_visible(0.25, 45.0));

        // <3s tier: 100ms buckets, even bucket visible.
        assert!(blink_visible(2.0, 0.5));
        assert!(!blink_visible(2.1, 0.4));

        // <10s tier: 250ms buckets.
        assert!(blink_visible(0.0, 5.0));
        assert!(!blink_visible(0.25, 5.0));

        // <30s tier: 500ms buckets.
        assert!(blink_visible(0.0, 20.0));
        assert!(!blink_visible(0.5, 20.0));
    }

    #[test]
    fn test_portal_expiry_blink_scenario() {
        // Portal created at t=0 with expiry at 2.5s.
        let mut portal = Portal::expiring(
            new_entity_id(),
            Vec2::ZERO,
            "dungeon-1",
            InstanceKind::Dungeon,
            "Demon Lair",
            2.5,
        );

        // +2000ms: 0.5s remaining, bucket 20 (even) => visible.
        portal.update(2.0);
        assert!(!portal.removed);
        assert!(portal.visible);

        // +2100ms: bucket 21 (odd) => hidden.
        portal.update(2.1);
        assert!(!portal.removed);
        assert!(!portal.visible);

        // At expiry the portal removes itself.
        portal.update(2.5);
        assert!(portal.removed);
    }

    #[test]
    fn test_permanent_portal_is_always_visible() {
        let mut portal = Portal::permanent(
            new_entity_id(),
            Vec2::ZERO,
            "nexus-main",
            InstanceKind::Nexus,
            "Nexus",
        );
        for i in 0..100 {
            portal.update(i as f64 * 0.05);
            assert!(portal.visible);
            assert!(!portal.removed);
        }
    }
}
