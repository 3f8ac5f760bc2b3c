//! Marketplace image commands.
use crate::dependencies::{AliasDocumentSource, ResourceReader};

pub mod list;
pub mod show;

// Remote dependencies of the image commands
pub trait ImageManagement: ResourceReader + AliasDocumentSource {}
impl<T: ResourceReader + AliasDocumentSource> ImageManagement for T {}
