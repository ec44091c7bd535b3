//! Type-state markers.

/// Connected, greeting read, not logged in.
#[derive(Debug, Clone, Copy)]
pub struct NotAuthenticated;

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// A mailbox is selected.
#[derive(Debug, Clone, Copy)]
pub struct Selected;
