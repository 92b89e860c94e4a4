mod classify;
mod metadata;

pub use classify::*;
pub use metadata::*;
