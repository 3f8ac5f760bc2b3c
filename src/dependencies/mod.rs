//! This module defines traits for external dependencies (the management API, the alias document,
//! the local filesystem) to make them easier to mock and substitute in tests. Resolvers and
//! commands receive these collaborators injected instead of reaching for global clients.
pub mod aliases;
pub mod arm;
pub mod deployments;
pub mod fs;
pub mod resources;

pub use aliases::*;
pub use arm::*;
pub use deployments::*;
pub use fs::*;
pub use resources::*;

#[cfg(test)]
pub mod mocks {
    pub use super::aliases::mocks::*;
    pub use super::deployments::mocks::*;
    pub use super::fs::mocks::*;
    pub use super::resources::mocks::*;
}
