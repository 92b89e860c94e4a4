mod clip;
mod vectorize;

pub use clip::*;
pub use vectorize::*;
