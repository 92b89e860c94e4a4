mod bbox;
mod clean;
mod geom;
mod overlay;
mod proj;
mod voronoi;

pub(crate) use bbox::*;
pub use clean::*;
pub(crate) use geom::*;
pub use overlay::*;
pub use proj::*;
pub use voronoi::*;
