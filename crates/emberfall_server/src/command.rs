use std::collections::HashMap;

use tokio::sync::mpsc;

use emberfall_shared::{EntityId, PlayerInput, ServerMessage};

use crate::database::CharacterRecord;

// ============================================================================
// SESSION -> SIMULATION COMMANDS
// ============================================================================
// Network handlers never touch instances directly: they enqueue commands
// that the simulation thread drains at the head of the next tick.

#[derive(Debug)]
pub enum SimCommand {
    Attach {
        session: SessionHandle,
        record: CharacterRecord,
        vault_items: Vec<Option<String>>,
    },
    Detach {
        player_id: EntityId,
    },
    Input {
        player_id: EntityId,
        input: PlayerInput,
    },
    Shoot {
        player_id: EntityId,
        aim_angle: f32,
    },
    UseAbility {
        player_id: EntityId,
    },
    PickupLoot {
        player_id: EntityId,
        loot_id: EntityId,
    },
    EnterPortal {
        player_id: EntityId,
        portal_id: EntityId,
    },
    ReturnToNexus {
        player_id: EntityId,
    },
    Chat {
        player_id: EntityId,
        message: String,
    },
    SwapItems {
        player_id: EntityId,
        from: usize,
        to: usize,
    },
    DropItem {
        player_id: EntityId,
        slot: usize,
    },
    InteractVaultChest {
        player_id: EntityId,
    },
    VaultTransfer {
        player_id: EntityId,
        from_vault: bool,
        from_slot: usize,
        to_slot: usize,
    },
    CloseVault {
        player_id: EntityId,
    },
}

// ============================================================================
// SIMULATION -> SESSION EVENTS
// ============================================================================

#[derive(Debug)]
pub enum SessionEvent {
    Message(ServerMessage),
    /// The player no longer resides in any instance; the session drops back
    /// to character select.
    Detached(DetachReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    Died,
    Rejected,
}

/// The simulation's handle to one connected, character-selected session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub player_id: EntityId,
    pub account_id: i64,
    pub username: String,
    pub sender: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn send(&self, msg: ServerMessage) {
        // A closed receiver means the session is tearing down; the detach
        // command is already in flight.
        let _ = self.sender.send(SessionEvent::Message(msg));
    }

    pub fn detach(&self, reason: DetachReason) {
        let _ = self.sender.send(SessionEvent::Detached(reason));
    }
}

/// The playerId -> session routing table read by snapshot emitters.
#[derive(Default)]
pub struct Router {
    sessions: HashMap<EntityId, SessionHandle>,
}

impl Router {
    pub fn register(&mut self, handle: SessionHandle) {
        self.sessions.insert(handle.player_id, handle);
    }

    pub fn unregister(&mut self, player_id: EntityId) -> Option<SessionHandle> {
        self.sessions.remove(&player_id)
    }

    pub fn get(&self, player_id: EntityId) -> Option<&SessionHandle> {
        self.sessions.get(&player_id)
    }

    pub fn send(&self, player_id: EntityId, msg: ServerMessage) {
        if let Some(handle) = self.sessions.get(&player_id) {
            handle.send(msg);
        }
    }
}

// ============================================================================
// SIMULATION -> PERSISTENCE OPERATIONS
// ============================================================================

/// Fire-and-forget writes drained by the persistence task.
#[derive(Debug)]
pub enum SaveOp {
    Character(CharacterRecord),
    /// Final save of a dead character; the store marks it dead.
    Kill(CharacterRecord),
    Vault {
        account_id: i64,
        items: Vec<Option<String>>,
    },
}
