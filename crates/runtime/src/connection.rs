//! Local player discovery with bounded retries.
//!
//! The local character usually spawns after the subsystem starts, so the
//! connector polls for it every `retry_delay` up to `max_attempts` times. A
//! connected character that disappears (scene reload) re-arms the search.

use headgear_common::{Backend, CharacterHandle, ConnectionSettings};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Searching { attempts: u32 },
    Connected(CharacterHandle),
    GaveUp { attempts: u32 },
}

pub struct PlayerConnector {
    settings: ConnectionSettings,
    state: ConnectionState,
    next_attempt: Duration,
}

impl PlayerConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            state: ConnectionState::Searching { attempts: 0 },
            next_attempt: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn character(&self) -> Option<CharacterHandle> {
        match self.state {
            ConnectionState::Connected(character) => Some(character),
            _ => None,
        }
    }

    /// Start searching again from the first attempt.
    pub fn rearm(&mut self, now: Duration) {
        self.state = ConnectionState::Searching { attempts: 0 };
        self.next_attempt = now;
    }

    /// Returns the character on the tick it is first found.
    pub fn poll(&mut self, backend: &dyn Backend, now: Duration) -> Option<CharacterHandle> {
        match self.state {
            ConnectionState::Connected(character) => {
                if !backend.is_live(character.key()) {
                    tracing::warn!("Local character went away, searching again");
                    self.rearm(now);
                }
                None
            }
            ConnectionState::GaveUp { .. } => None,
            ConnectionState::Searching { attempts } => {
                if now < self.next_attempt {
                    return None;
                }
                let attempts = attempts + 1;

                if let Some(character) = backend.local_character() {
                    tracing::info!(
                        "Found local character '{}' after {} attempt(s)",
                        backend.character_name(character).unwrap_or_default(),
                        attempts
                    );
                    self.state = ConnectionState::Connected(character);
                    return Some(character);
                }

                if attempts >= self.settings.max_attempts {
                    tracing::warn!(
                        "Local character not found after {} attempts, giving up",
                        attempts
                    );
                    self.state = ConnectionState::GaveUp { attempts };
                } else {
                    tracing::debug!("Local character not spawned yet (attempt {})", attempts);
                    self.state = ConnectionState::Searching { attempts };
                    self.next_attempt = now
                        .checked_add(self.settings.retry_delay())
                        .unwrap_or(Duration::MAX);
                }
                None
            }
        }
    }
}
