use async_trait::async_trait;

use crate::state::PlayerState;

/// Receives [`PlayerState`] snapshots from a [`crate::Player`].
///
/// A player has exactly one listener; emissions are serialized, so a slow
/// listener naturally back-pressures the machine. The callback must not call
/// back into the player synchronously; it may schedule such calls.
#[async_trait]
pub trait PlayerListener: Send + Sync + 'static {
    async fn on_state(&self, state: PlayerState);
}
