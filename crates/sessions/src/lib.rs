//! Conversation state for the relay adapter.
//!
//! - [`SessionStore`] tracks which rooms have an open thread with the brain
//!   and expires idle threads.
//! - [`HookRegistry`] keeps the brain's hook registrations, written through
//!   to a [`ra_store::Collection`].

pub mod hooks;
pub mod threads;

pub use hooks::{BoxError, Delivery, HookCloseNotifier, HookError, HookRegistry, StoredHook};
pub use threads::{SessionStore, Thread};
