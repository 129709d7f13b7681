//! Dialog content loading from `assets/base` and enabled mods.

mod discovery;
mod hashing;
mod loader;
mod types;

pub(crate) use hashing::fingerprint_states;
pub use loader::{
    load_dialog_config, parse_dialog_document, ContentErrorCode, ContentLoadError,
    SourceLocation,
};
pub use types::{ContentRequest, DiscoveryError};
