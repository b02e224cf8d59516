pub mod bounds;
pub mod scope;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use scope::*;
pub use time::*;
