use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use shapefile::{self as shp, dbase::{self, FieldName, Record, TableWriterBuilder}, Reader, Shape};

/// WGS84 geographic CRS in ESRI WKT, written as the `.prj` sidecar.
pub(crate) const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// Extensions of every file belonging to one shapefile set.
pub(crate) const SHAPEFILE_SET: [&str; 6] = ["shp", "shx", "dbf", "prj", "cpg", "key.json"];

/// Column type of a written attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Numeric,
    Character,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FieldSpec {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
}

/// Reads all shapes + attribute records from a given `.shp` file path.
pub(crate) fn read_shapefile(path: &Path) -> Result<Vec<(Shape, Record)>> {
    read_shapefile_where(path, |_| true)
}

/// Reads the shapes whose attribute record satisfies `keep`.
pub(crate) fn read_shapefile_where<F>(path: &Path, mut keep: F) -> Result<Vec<(Shape, Record)>>
where
    F: FnMut(&Record) -> bool,
{
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut items = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("Error reading shape+record")?;
        if keep(&record) { items.push((shape, record)) }
    }
    Ok(items)
}

/// Writes polygons and their records, plus `.prj` and `.cpg` sidecars.
pub(crate) fn write_polygon_shapefile(path: &Path, fields: &[FieldSpec], rows: &[(shp::Polygon, Record)]) -> Result<()> {
    let mut table = TableWriterBuilder::new();
    for field in fields {
        let name = FieldName::try_from(field.name.as_str())
            .map_err(|e| anyhow!("invalid dBase field name {:?}: {e:?}", field.name))?;
        table = match field.kind {
            FieldKind::Numeric => table.add_numeric_field(name, 20, 8),
            FieldKind::Character => table.add_character_field(name, 254),
        };
    }

    {
        let mut writer = shp::Writer::from_path(path, table)
            .with_context(|| format!("Failed to create shapefile: {}", path.display()))?;
        for (shape, record) in rows {
            writer.write_shape_and_record(shape, record)
                .with_context(|| format!("Failed to write shape to {}", path.display()))?;
        }
    }

    write_sidecars(path)
}

/// Writes the `.prj` (WGS84) and `.cpg` (UTF-8) files next to a `.shp`.
pub(crate) fn write_sidecars(shp_path: &Path) -> Result<()> {
    fs::write(shp_path.with_extension("prj"), WGS84_PRJ)
        .with_context(|| format!("Failed to write .prj for {}", shp_path.display()))?;
    fs::write(shp_path.with_extension("cpg"), "UTF-8")
        .with_context(|| format!("Failed to write .cpg for {}", shp_path.display()))?;
    Ok(())
}

/// Copies a whole shapefile set to `dest_shp` (renaming every member).
pub(crate) fn copy_shapefile_set(src_shp: &Path, dest_shp: &Path) -> Result<()> {
    for ext in SHAPEFILE_SET {
        let src = src_shp.with_extension(ext);
        if src.exists() {
            let dest = dest_shp.with_extension(ext);
            fs::copy(&src, &dest)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        }
    }
    Ok(())
}

/// Reads the EPSG code declared by a `.prj` sidecar, if any.  ESRI WKT for
/// WGS84 carries no authority code, so it is recognised by datum name.
pub(crate) fn read_prj_epsg(shp_path: &Path) -> Result<Option<u16>> {
    let prj = shp_path.with_extension("prj");
    if !prj.exists() { return Ok(None) }
    let text = fs::read_to_string(&prj)
        .with_context(|| format!("Failed to read {}", prj.display()))?;

    let wgs84 = text.contains("WGS_1984") || text.contains("WGS 84");
    if text.starts_with("GEOGCS") && wgs84 { return Ok(Some(4326)) }
    if let Some(pos) = text.rfind("AUTHORITY[\"EPSG\",") {
        let digits: String = text[pos + 17..].chars()
            .filter(|c| *c != '"')
            .take_while(|c| c.is_ascii_digit())
            .collect();
        return Ok(digits.parse().ok());
    }
    if text.starts_with("PROJCS") { return Ok(Some(0)) }
    if wgs84 { return Ok(Some(4326)) }
    Ok(None)
}

/// Get the value of a character field from a Record
pub(crate) fn character_field(record: &Record, field: &str) -> Option<String> {
    match record.get(field) {
        Some(dbase::FieldValue::Character(Some(s))) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Convert shapefile::Polygon to geo::MultiPolygon<f64>
pub(crate) fn shp_to_geo(p: &shp::Polygon) -> geo::MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn ensure_closed(coords: &mut Vec<geo::Coord<f64>>) {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0])
        }
    }

    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<geo::LineString<f64>> = None;
    let mut current_holes: Vec<geo::LineString<f64>> = Vec::new();

    // Shapefile stores each outer ring followed by its holes.
    for ring in p.rings() {
        let mut coords: Vec<geo::Coord<f64>> = ring.points().iter().map(|pt| geo::Coord { x: pt.x, y: pt.y }).collect();
        ensure_closed(&mut coords);
        let ls = geo::LineString(coords);
        match ring {
            shp::PolygonRing::Outer(_) => {
                if let Some(ext) = current_exterior.take() {
                    polys.push(geo::Polygon::new(ext, std::mem::take(&mut current_holes)));
                }
                current_exterior = Some(ls);
            }
            shp::PolygonRing::Inner(_) => current_holes.push(ls),
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(geo::Polygon::new(ext, current_holes));
    }

    geo::MultiPolygon(polys)
}

/// Convert geo::MultiPolygon<f64> to shapefile::Polygon
pub(crate) fn geo_to_shp(mp: &geo::MultiPolygon<f64>) -> shp::Polygon {
    #[inline] fn shp_point(x: f64, y: f64) -> shp::Point { shp::Point { x, y } }

    // Outer rings clockwise, holes counter-clockwise.
    let mut rings: Vec<shp::PolygonRing<shp::Point>> = Vec::new();
    for poly in &mp.0 {
        let ext_pts = poly.exterior().points().map(|c| shp_point(c.x(), c.y())).collect::<Vec<_>>();
        rings.push(shp::PolygonRing::Outer(ext_pts));

        for hole in poly.interiors() {
            let hole_pts = hole.points().map(|c| shp_point(c.x(), c.y())).collect::<Vec<_>>();
            rings.push(shp::PolygonRing::Inner(hole_pts));
        }
    }

    // `with_rings` closes and reorients each ring to match its variant.
    shp::Polygon::with_rings(rings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    #[test]
    fn polygon_with_hole_survives_conversion() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0)]],
        );
        let mp = geo::MultiPolygon(vec![poly]);
        let back = shp_to_geo(&geo_to_shp(&mp));
        assert_eq!(back.0.len(), 1);
        assert_eq!(back.0[0].interiors().len(), 1);
        assert!((back.unsigned_area() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn prj_written_by_us_reads_as_wgs84() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("a.shp");
        write_sidecars(&shp).unwrap();
        assert_eq!(read_prj_epsg(&shp).unwrap(), Some(4326));
        assert_eq!(read_prj_epsg(&dir.path().join("missing.shp")).unwrap(), None);
    }
}
