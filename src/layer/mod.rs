mod feature;
mod key;
mod layer;

pub use feature::*;
pub use key::*;
pub use layer::*;
