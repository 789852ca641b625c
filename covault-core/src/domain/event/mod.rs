pub mod hashes;
pub mod types;
pub mod validation;

pub use hashes::*;
pub use types::*;
pub use validation::*;
