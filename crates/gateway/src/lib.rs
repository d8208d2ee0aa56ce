//! `ra-gateway`: the relay adapter's conversation router, administrative
//! surface, and process wiring.

pub mod admin;
pub mod blocklist;
pub mod bootstrap;
pub mod cli;
pub mod events;
pub mod router;
pub mod settings;
pub mod state;

#[cfg(test)]
mod testing;

pub use router::{ConversationRouter, DropReason, RouteError, RouteOutcome, RouterParts};
pub use state::AdapterState;
