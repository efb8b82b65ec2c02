//! Testing utilities for the Agora workspace
//!
//! Shared in-memory backend, fixtures and the session simulator.

#![allow(missing_docs)]

pub mod memory;
pub mod simulator;

pub use memory::{
    MemoryBackend, MemoryConnector, MemoryStore, CONNECT, POPULAR_EVENTS, POST_POINTS, RSVP_POINTS,
    VOTE_POINTS,
};
pub use simulator::{run_session, SimulatorConfig, SimulatorReport, StepRecord};

use agora_core::{EventDraft, Identity};

pub fn alice() -> Identity {
    Identity::new("alice-principal")
}

pub fn bob() -> Identity {
    Identity::new("bob-principal")
}

pub fn admin() -> Identity {
    Identity::new("admin-principal")
}

pub fn event_draft(title: &str) -> EventDraft {
    EventDraft::new(title, format!("{title} description"), "2025-06-01", "Community hall")
}

/// Connector whose store already knows alice and bob (onboarded) and an admin
pub fn seeded_connector() -> MemoryConnector {
    let connector = MemoryConnector::default();
    let store = connector.store();
    store.seed_member(alice().principal(), "Alice");
    store.seed_member(bob().principal(), "Bob");
    store.grant_admin(admin().principal());
    connector
}
