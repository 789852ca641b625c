pub mod encoding;
pub mod time;

pub use encoding::*;
pub use time::*;
