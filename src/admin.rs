//! Admin dialog engine — the multi-turn configuration conversation.
//!
//! A finite-state machine driven by successive private messages from the
//! single privileged admin. Every transition that mutates the store
//! reloads the routing table before the acknowledgement reply is
//! produced, so a concurrent relay lookup never sees a route id without
//! its backing row.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::SourceClient;
use crate::error::StorageError;
use crate::routing::RoutingTable;
use crate::store::Storage;

const HELP_TEXT: &str = "Admin panel:\n\
    /channels - list configured channels\n\
    /addchannel - add a new channel\n\
    /manage <id> - manage one channel\n\
    /cancel - cancel the current operation";

/// Where one operator's conversation currently stands.
///
/// Scratch values collected across steps ride along in the variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogState {
    #[default]
    Idle,
    AwaitingSourceRef,
    AwaitingDestAddress {
        source_ref: String,
    },
    AwaitingManageChoice {
        route_id: i64,
    },
    AwaitingCaption {
        route_id: i64,
    },
    AwaitingDestUpdate {
        route_id: i64,
    },
}

/// The admin conversation engine.
///
/// Sessions are keyed by operator id; only the configured admin ever gets
/// an entry, but nothing here assumes a single global session.
pub struct AdminEngine {
    admin_id: i64,
    store: Arc<dyn Storage>,
    source: Arc<dyn SourceClient>,
    table: Arc<RoutingTable>,
    sessions: HashMap<i64, DialogState>,
}

impl AdminEngine {
    pub fn new(
        admin_id: i64,
        store: Arc<dyn Storage>,
        source: Arc<dyn SourceClient>,
        table: Arc<RoutingTable>,
    ) -> Self {
        Self {
            admin_id,
            store,
            source,
            table,
            sessions: HashMap::new(),
        }
    }

    /// Process one text input and return the reply to send, if any.
    ///
    /// Input from anyone other than the configured admin is ignored
    /// silently.
    pub async fn handle(&mut self, sender_id: i64, text: &str) -> Option<String> {
        if sender_id != self.admin_id {
            return None;
        }

        let text = text.trim();
        let reply = if text.starts_with('/') {
            self.handle_command(sender_id, text).await
        } else {
            self.handle_dialog(sender_id, text).await
        };
        Some(reply)
    }

    async fn handle_command(&mut self, sender_id: i64, text: &str) -> String {
        if text.starts_with("/start") || text.starts_with("/panel") {
            self.sessions.insert(sender_id, DialogState::Idle);
            return HELP_TEXT.to_string();
        }

        if text.starts_with("/cancel") {
            self.sessions.insert(sender_id, DialogState::Idle);
            return "Operation cancelled.".to_string();
        }

        if text.starts_with("/channels") {
            self.sessions.insert(sender_id, DialogState::Idle);
            return self.list_channels();
        }

        if text.starts_with("/addchannel") {
            self.sessions.insert(sender_id, DialogState::AwaitingSourceRef);
            return "Send the Telegram channel @handle or t.me link.".to_string();
        }

        if text.starts_with("/manage") {
            return self.start_manage(sender_id, text);
        }

        // Unknown slash command: show the panel, like any idle input.
        self.sessions.insert(sender_id, DialogState::Idle);
        HELP_TEXT.to_string()
    }

    fn list_channels(&self) -> String {
        let snapshot = self.table.snapshot();
        if snapshot.is_empty() {
            return "No channels registered.".to_string();
        }

        let mut lines = vec!["Configured channels:".to_string()];
        for route in snapshot.sorted_by_id() {
            let enabled = if route.enabled { "✅" } else { "❌" };
            let caption = if route.caption.is_empty() { "✖" } else { "✔" };
            lines.push(format!(
                "{}) {} → {} [{}] caption: {}",
                route.id, route.source_ref, route.dest_address, enabled, caption
            ));
        }
        lines.push("\nUse /manage <id> to manage a channel.".to_string());
        lines.join("\n")
    }

    fn start_manage(&mut self, sender_id: i64, text: &str) -> String {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let route_id: i64 = match parts.as_slice() {
            [_, id] => match id.parse() {
                Ok(id) => id,
                Err(_) => return "Invalid command format. Example:\n/manage 1".to_string(),
            },
            _ => return "Invalid command format. Example:\n/manage 1".to_string(),
        };

        let snapshot = self.table.snapshot();
        let Some(route) = snapshot.find_by_id(route_id) else {
            return "No channel with that id.".to_string();
        };

        self.sessions
            .insert(sender_id, DialogState::AwaitingManageChoice { route_id });
        format!(
            "Managing channel {} ({}):\n\
             1 - set or change the fixed caption\n\
             2 - set or change the Bale destination\n\
             3 - delete the channel\n\
             Send the number of your choice.",
            route_id, route.source_ref
        )
    }

    async fn handle_dialog(&mut self, sender_id: i64, text: &str) -> String {
        let state = self
            .sessions
            .get(&sender_id)
            .cloned()
            .unwrap_or_default();

        match state {
            DialogState::Idle => HELP_TEXT.to_string(),

            DialogState::AwaitingSourceRef => {
                self.sessions.insert(
                    sender_id,
                    DialogState::AwaitingDestAddress {
                        source_ref: text.to_string(),
                    },
                );
                "Send the Bale destination @handle or chat id.".to_string()
            }

            DialogState::AwaitingDestAddress { source_ref } => {
                self.finish_add(sender_id, &source_ref, text).await
            }

            DialogState::AwaitingManageChoice { route_id } => {
                self.manage_choice(sender_id, route_id, text).await
            }

            DialogState::AwaitingCaption { route_id } => {
                let caption = if text == "-" { "" } else { text };
                self.sessions.insert(sender_id, DialogState::Idle);
                match self.store.update_caption(route_id, caption).await {
                    Ok(()) => match self.reload().await {
                        Ok(()) => "Caption saved.".to_string(),
                        Err(e) => storage_failure(e),
                    },
                    Err(e) => storage_failure(e),
                }
            }

            DialogState::AwaitingDestUpdate { route_id } => {
                self.sessions.insert(sender_id, DialogState::Idle);
                match self.store.update_dest(route_id, text).await {
                    Ok(()) => match self.reload().await {
                        Ok(()) => "Destination updated.".to_string(),
                        Err(e) => storage_failure(e),
                    },
                    Err(e) => storage_failure(e),
                }
            }
        }
    }

    async fn finish_add(&mut self, sender_id: i64, source_ref: &str, dest: &str) -> String {
        self.sessions.insert(sender_id, DialogState::Idle);

        let source_chat_id = match self.source.resolve_entity(source_ref).await {
            Ok(id) => id,
            Err(e) => {
                warn!(source_ref, "Failed to resolve channel reference: {e}");
                return "Could not find that channel. Check the handle or link.".to_string();
            }
        };

        let route_id = match self
            .store
            .create_route(source_chat_id, source_ref, dest)
            .await
        {
            Ok(id) => id,
            Err(e) => return storage_failure(e),
        };

        if let Err(e) = self.reload().await {
            return storage_failure(e);
        }

        info!(route_id, source_chat_id, dest, "Channel route added");
        format!("Channel added with id {route_id}.")
    }

    async fn manage_choice(&mut self, sender_id: i64, route_id: i64, choice: &str) -> String {
        match choice {
            "1" => {
                self.sessions
                    .insert(sender_id, DialogState::AwaitingCaption { route_id });
                "Send the caption text (send - to clear it).".to_string()
            }
            "2" => {
                self.sessions
                    .insert(sender_id, DialogState::AwaitingDestUpdate { route_id });
                "Send the new Bale destination.".to_string()
            }
            "3" => {
                self.sessions.insert(sender_id, DialogState::Idle);
                match self.store.delete_route(route_id).await {
                    Ok(()) => match self.reload().await {
                        Ok(()) => {
                            info!(route_id, "Channel route deleted");
                            "Channel deleted.".to_string()
                        }
                        Err(e) => storage_failure(e),
                    },
                    Err(e) => storage_failure(e),
                }
            }
            // Invalid choice re-prompts in place; no progress is lost.
            _ => "Invalid option. Send 1, 2 or 3.".to_string(),
        }
    }

    /// Rebuild the routing table from the store.
    ///
    /// Called after every successful mutation, before the acknowledgement
    /// reply; the publish itself is synchronous, so no relay event can
    /// slip in between the load and the swap.
    async fn reload(&self) -> Result<(), StorageError> {
        let routes = self.store.list_routes().await?;
        self.table.publish(routes);
        Ok(())
    }

    #[cfg(test)]
    fn state_of(&self, sender_id: i64) -> DialogState {
        self.sessions.get(&sender_id).cloned().unwrap_or_default()
    }
}

fn storage_failure(e: StorageError) -> String {
    warn!("Admin operation failed: {e}");
    format!("Storage error, operation aborted: {e}")
}
