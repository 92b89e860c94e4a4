mod csv;
mod geotiff;
mod shp;

pub(crate) use csv::*;
pub(crate) use geotiff::*;
pub(crate) use shp::*;
