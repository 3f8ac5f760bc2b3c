//! Typed data model shared by the resolvers, the template builder and the commands.
mod disk;
mod document;
mod image;
mod network;
mod request;
mod resource_id;
mod secret;
mod storage_profile;
mod vault;

pub use disk::*;
pub use document::*;
pub use image::*;
pub use network::*;
pub use request::*;
pub use resource_id::*;
pub use secret::*;
pub use storage_profile::*;
pub use vault::*;

/// Offline copy of the image alias document, used when the published one cannot be fetched.
pub const BUNDLED_ALIAS_DOCUMENT: &str = include_str!("../aliases.json");
