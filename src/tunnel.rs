//! Cross-frame message tunnel
//!
//! The host page and the sandboxed game never share memory; they only post
//! messages to each other. These traits abstract that post so the lobby and
//! the SDK can be driven by a browser `postMessage` binding in production and
//! by an in-memory queue in tests.

use crate::protocol::HostMessage;

/// Trait for posting messages across the frame boundary
///
/// Implementations deliver to the other side with the lobby's own origin as
/// the target origin. Posting to a frame that is gone must be a silent no-op.
pub trait Tunnel<M> {
    /// Posts a message to the other side
    fn send_message(&self, message: &M);

    /// Tears down the other side
    ///
    /// On the host this unloads the game frame. Closing an already closed
    /// tunnel does nothing.
    fn close(&self);
}

/// The host's view of the game frame
pub trait GameFrame: Tunnel<HostMessage> {
    /// Navigates the frame to a game page, replacing whatever it showed
    fn load(&self, path: &str);
}
