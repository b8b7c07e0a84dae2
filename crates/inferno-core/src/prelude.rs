pub use crate::bridge::{BridgeFault, BridgeGateway, BridgePort, Capability, GatewayError};
pub use crate::config::{GatewayConfig, PlayerConfig, RadioConfig};
pub use crate::error::{InfernoError, Result};
pub use crate::media::{MediaDeck, MediaElement, MediaFault};
pub use crate::player::{PlaybackController, PlayerError, PlayerEvent, Selection};
pub use crate::session::{IndexPicker, PlaybackSession, PlaybackState, RandomPicker};
pub use crate::track::{Artwork, MediaKind, Playlist, Track};
