// ============================================================================
// ADMIN COMMANDS
// ============================================================================
// Chat lines starting with '/' from allowlisted usernames parse into
// commands; everyone else's slashes are just text.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use notify::{RecursiveMode, Watcher};
use parking_lot::RwLock;

/// Parsed admin command.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Give { item: String },
    Items { filter: String },
    Heal,
    Level { level: u32 },
    Spawn { enemy: String },
    Tp { x: f32, y: f32 },
    Help,
    /// Anything unparseable falls through and broadcasts as plain chat.
    Unknown,
}

/// Parses a chat line into an admin command. The caller has already
/// verified the sender is an admin and the line starts with '/'.
pub fn parse_command(line: &str) -> AdminCommand {
    let parts: Vec<&str> = line.trim().split_whitespace().collect();
    let Some(&head) = parts.first() else {
        return AdminCommand::Unknown;
    };

    match head {
        "/give" => match parts.get(1) {
            Some(item) => AdminCommand::Give { item: item.to_string() },
            None => AdminCommand::Unknown,
        },
        "/items" => AdminCommand::Items {
            filter: parts.get(1).unwrap_or(&"").to_string(),
        },
        "/heal" => AdminCommand::Heal,
        "/level" => match parts.get(1).and_then(|n| n.parse().ok()) {
            Some(level) => AdminCommand::Level { level },
            None => AdminCommand::Unknown,
        },
        "/spawn" => match parts.get(1) {
            Some(enemy) => AdminCommand::Spawn { enemy: enemy.to_string() },
            None => AdminCommand::Unknown,
        },
        "/tp" => {
            let x = parts.get(1).and_then(|v| v.parse().ok());
            let y = parts.get(2).and_then(|v| v.parse().ok());
            match (x, y) {
                (Some(x), Some(y)) => AdminCommand::Tp { x, y },
                _ => AdminCommand::Unknown,
            }
        }
        "/help" => AdminCommand::Help,
        _ => AdminCommand::Unknown,
    }
}

pub fn help_text() -> String {
    "Admin commands:\n\
     /give <itemId> - put an item in your inventory\n\
     /items [filter] - list item ids\n\
     /heal - restore hp and mp\n\
     /level <n> - set your level\n\
     /spawn <enemyId> - spawn an enemy next to you\n\
     /tp <x> <y> - teleport within the current map\n\
     /help - this message"
        .to_string()
}

// ============================================================================
// ADMIN ALLOWLIST
// ============================================================================

/// Case-insensitive username allowlist backed by a line-delimited file.
/// Reloads publish a fresh immutable set behind the lock, so readers only
/// ever see complete snapshots.
pub struct AdminList {
    path: PathBuf,
    names: RwLock<Arc<HashSet<String>>>,
}

impl AdminList {
    pub fn load(path: impl Into<PathBuf>) -> Arc<Self> {
        let list = Arc::new(Self {
            path: path.into(),
            names: RwLock::new(Arc::new(HashSet::new())),
        });
        list.reload();
        list
    }

    pub fn reload(&self) {
        let names: HashSet<String> = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents
                .lines()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect(),
            Err(e) => {
                warn!("admin allowlist {:?} unreadable: {}", self.path, e);
                HashSet::new()
            }
        };
        info!("admin allowlist loaded: {} entries", names.len());
        *self.names.write() = Arc::new(names);
    }

    pub fn contains(&self, username: &str) -> bool {
        self.names.read().contains(&username.to_lowercase())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watches the allowlist file and reloads on any change. The returned
/// watcher must be kept alive for the lifetime of the process.
pub fn watch(list: Arc<AdminList>) -> Option<notify::RecommendedWatcher> {
    let reload_list = Arc::clone(&list);
    let mut watcher = match notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
        if event.is_ok() {
            reload_list.reload();
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!("admin allowlist watcher unavailable: {}", e);
            return None;
        }
    };
    // Watch the parent directory so editors that replace the file (rename
    // over it) keep triggering events.
    let target = list
        .path()
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Err(e) = watcher.watch(target, RecursiveMode::NonRecursive) {
        warn!("admin allowlist watch failed: {}", e);
        return None;
    }
    Some(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_give() {
        assert_eq!(
            parse_command("/give starter_staff"),
            AdminCommand::Give { item: "starter_staff".into() }
        );
        assert_eq!(parse_command("/give"), AdminCommand::Unknown);
    }

    #[test]
    fn test_parse_tp_and_level() {
        assert_eq!(parse_command("/tp 10 20.5"), AdminCommand::Tp { x: 10.0, y: 20.5 });
        assert_eq!(parse_command("/tp 10"), AdminCommand::Unknown);
        assert_eq!(parse_command("/level 20"), AdminCommand::Level { level: 20 });
        assert_eq!(parse_command("/level abc"), AdminCommand::Unknown);
    }

    #[test]
    fn test_parse_items_with_and_without_filter() {
        assert_eq!(parse_command("/items"), AdminCommand::Items { filter: "".into() });
        assert_eq!(
            parse_command("/items ring"),
            AdminCommand::Items { filter: "ring".into() }
        );
    }

    #[test]
    fn test_unknown_command_falls_through() {
        assert_eq!(parse_command("/dance"), AdminCommand::Unknown);
        assert_eq!(parse_command("/"), AdminCommand::Unknown);
    }

    #[test]
    fn test_allowlist_is_case_insensitive() {
        let dir = std::env::temp_dir().join(format!("emberfall-admins-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("admins.txt");
        std::fs::write(&path, "Alice\n# comment\n\n  bob  \n").unwrap();

        let list = AdminList::load(&path);
        assert!(list.contains("alice"));
        assert!(list.contains("ALICE"));
        assert!(list.contains("bob"));
        assert!(!list.contains("mallory"));
        assert!(!list.contains("# comment"));

        std::fs::write(&path, "mallory\n").unwrap();
        list.reload();
        assert!(list.contains("mallory"));
        assert!(!list.contains("alice"));
    }
}
