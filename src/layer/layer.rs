use std::{collections::{BTreeMap, BTreeSet}, path::Path};

use anyhow::{Context, Result};
use geo::{BoundingRect, MultiPolygon};
use shapefile::{self as shp, dbase::{FieldValue, Record}, Shape};

use crate::{
    common::{self, FieldKind, FieldSpec},
    error::StageError,
    geom::{self, Geometries, OverlayOp, WebMercator},
    layer::{AttrValue, Feature},
};

/// EPSG code every vector layer is expected to carry.
pub const LAYER_EPSG: u16 = 4326;

/// An in-memory polygon layer in EPSG:4326.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layer {
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(features: Vec<Feature>) -> Self { Self { features } }

    #[inline] pub fn len(&self) -> usize { self.features.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.features.is_empty() }

    /// Geometries of all features.
    pub fn shapes(&self) -> Vec<MultiPolygon<f64>> {
        self.features.iter().map(|f| f.geometry.clone()).collect()
    }

    /// Names of every attribute present on any feature, in name order.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.features.iter().flat_map(|f| f.attrs.keys().cloned()).collect()
    }

    /// Dissolve every feature into one geometry.
    pub fn dissolve(&self) -> MultiPolygon<f64> {
        geom::union_all(self.features.iter().map(|f| &f.geometry))
    }

    /// Drop features whose geometry is empty or degenerate.
    pub fn drop_empty(self) -> Self {
        Self::new(
            self.features.into_iter()
                .map(|mut f| { f.geometry = geom::drop_degenerate(f.geometry); f })
                .filter(|f| !geom::is_empty(&f.geometry))
                .collect(),
        )
    }

    /// Areas in EPSG:3857 square metres, one per feature.
    pub fn areas_m2(&self, merc: &WebMercator) -> Result<Vec<f64>> {
        self.features.iter().map(|f| merc.area(&f.geometry)).collect()
    }

    // -----------------------------------------------------------------------
    // Shapefile I/O
    // -----------------------------------------------------------------------

    /// Read a polygon shapefile, validating its declared CRS.
    pub fn read(path: &Path) -> Result<Self> {
        Self::read_filtered(path, |_| true)
    }

    /// Read only the features whose text attribute `field` equals `value`.
    pub fn read_where(path: &Path, field: &str, value: &str) -> Result<Self> {
        Self::read_filtered(path, |record| common::character_field(record, field).as_deref() == Some(value))
    }

    fn read_filtered(path: &Path, keep: impl FnMut(&Record) -> bool) -> Result<Self> {
        ensure_layer_crs(path)?;

        let items = common::read_shapefile_where(path, keep)
            .map_err(|e| StageError::decode(path, format!("{e:#}")))?;

        let mut features = Vec::with_capacity(items.len());
        for (shape, record) in items {
            let geometry = match shape {
                Shape::Polygon(p) => common::shp_to_geo(&p),
                Shape::PolygonZ(p) => common::shp_to_geo(&flatten_rings(p.rings(), |pt| shp::Point { x: pt.x, y: pt.y })),
                Shape::PolygonM(p) => common::shp_to_geo(&flatten_rings(p.rings(), |pt| shp::Point { x: pt.x, y: pt.y })),
                Shape::NullShape => MultiPolygon(vec![]),
                other => return Err(StageError::MalformedGeometry {
                    context: format!("{} holds {:?} shapes, expected polygons", path.display(), other.shapetype()),
                }.into()),
            };
            features.push(Feature { geometry, attrs: record_to_attrs(record) });
        }
        Ok(Self { features })
    }

    /// Write the layer as a shapefile set (`.shp/.shx/.dbf/.prj/.cpg`).
    pub fn write(&self, path: &Path) -> Result<()> {
        common::ensure_parent_exists(path)?;

        // Column types come from the first feature carrying each field.
        let mut kinds: BTreeMap<String, FieldKind> = BTreeMap::new();
        for feature in &self.features {
            for (name, value) in &feature.attrs {
                kinds.entry(name.clone()).or_insert(match value {
                    AttrValue::Number(_) => FieldKind::Numeric,
                    AttrValue::Text(_) => FieldKind::Character,
                });
            }
        }
        let fields: Vec<FieldSpec> = kinds.iter()
            .map(|(name, kind)| FieldSpec { name: name.clone(), kind: *kind })
            .collect();

        let rows: Vec<(shp::Polygon, Record)> = self.features.iter()
            .map(|feature| {
                let mut record = Record::default();
                for field in &fields {
                    let value = match (field.kind, feature.attrs.get(&field.name)) {
                        (FieldKind::Numeric, Some(v)) => FieldValue::Numeric(v.as_number()),
                        (FieldKind::Numeric, None) => FieldValue::Numeric(None),
                        (FieldKind::Character, Some(AttrValue::Text(s))) => FieldValue::Character(Some(s.clone())),
                        (FieldKind::Character, Some(AttrValue::Number(n))) => FieldValue::Character(Some(n.to_string())),
                        (FieldKind::Character, None) => FieldValue::Character(None),
                    };
                    record.insert(field.name.clone(), value);
                }
                (common::geo_to_shp(&feature.geometry), record)
            })
            .collect();

        common::write_polygon_shapefile(path, &fields, &rows)
            .with_context(|| format!("Failed to write layer {}", path.display()))
    }

    // -----------------------------------------------------------------------
    // Overlay
    // -----------------------------------------------------------------------

    /// Feature-wise overlay of two layers.
    ///
    /// Attributes present on both sides are renamed `{name}_1` (left) and
    /// `{name}_2` (right); other names are kept.  Intersection emits one
    /// feature per overlapping pair; difference keeps each left feature minus
    /// all right features; symmetric difference emits both one-sided remainders.
    /// Empty results are dropped.
    pub fn overlay(&self, other: &Layer, op: OverlayOp) -> Layer {
        let left_names = self.field_names();
        let right_names = other.field_names();
        let shared: BTreeSet<String> = left_names.intersection(&right_names).cloned().collect();

        let rename = |attrs: &BTreeMap<String, AttrValue>, suffix: &str| -> BTreeMap<String, AttrValue> {
            attrs.iter()
                .map(|(k, v)| {
                    let name = if shared.contains(k) { format!("{k}_{suffix}") } else { k.clone() };
                    (name, v.clone())
                })
                .collect()
        };

        let left_shapes = self.shapes();
        let right_shapes = other.shapes();
        let right_index = Geometries::new(&right_shapes);

        let mut out = Vec::new();
        match op {
            OverlayOp::Intersection => {
                for (i, left) in self.features.iter().enumerate() {
                    let Some(rect) = left_shapes[i].bounding_rect() else { continue };
                    for j in right_index.candidates(&rect) {
                        let geometry = op.apply(&left.geometry, &other.features[j].geometry);
                        let mut attrs = rename(&left.attrs, "1");
                        attrs.extend(rename(&other.features[j].attrs, "2"));
                        out.push(Feature { geometry, attrs });
                    }
                }
            }
            OverlayOp::Difference | OverlayOp::SymmetricDifference => {
                let mut one_sided = |features: &[Feature], shapes: &[MultiPolygon<f64>], index: &Geometries<'_>, suffix: &str| {
                    for (i, feature) in features.iter().enumerate() {
                        let Some(rect) = shapes[i].bounding_rect() else { continue };
                        let hits = index.candidates(&rect);
                        let geometry = if hits.is_empty() {
                            feature.geometry.clone()
                        } else {
                            let cutter = geom::union_all(hits.iter().map(|&j| &index.shapes()[j]));
                            OverlayOp::Difference.apply(&feature.geometry, &cutter)
                        };
                        let attrs = if op == OverlayOp::Difference { feature.attrs.clone() } else { rename(&feature.attrs, suffix) };
                        out.push(Feature { geometry, attrs });
                    }
                };
                one_sided(&self.features, &left_shapes, &right_index, "1");
                if op == OverlayOp::SymmetricDifference {
                    let left_index = Geometries::new(&left_shapes);
                    one_sided(&other.features, &right_shapes, &left_index, "2");
                }
            }
        }

        Layer::new(out).drop_empty()
    }
}

/// Fail unless `path` exists and its `.prj` (if any) declares EPSG:4326.
pub(crate) fn ensure_layer_crs(path: &Path) -> Result<()> {
    if !path.exists() { return Err(StageError::MissingInput(path.to_path_buf()).into()) }
    match common::read_prj_epsg(path)? {
        Some(found) if found != LAYER_EPSG => {
            Err(StageError::CrsMismatch { path: path.to_path_buf(), expected: LAYER_EPSG, found }.into())
        }
        _ => Ok(()),
    }
}

fn flatten_rings<P>(rings: &[shp::PolygonRing<P>], to_2d: impl Fn(&P) -> shp::Point) -> shp::Polygon {
    shp::Polygon::with_rings(
        rings.iter()
            .map(|ring| match ring {
                shp::PolygonRing::Outer(pts) => shp::PolygonRing::Outer(pts.iter().map(&to_2d).collect()),
                shp::PolygonRing::Inner(pts) => shp::PolygonRing::Inner(pts.iter().map(&to_2d).collect()),
            })
            .collect(),
    )
}

fn record_to_attrs(record: Record) -> BTreeMap<String, AttrValue> {
    record.into_iter()
        .filter_map(|(name, value)| AttrValue::from_field(value).map(|v| (name, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
    }

    #[test]
    fn shared_attribute_names_get_suffixes() {
        let pop = Layer::new(vec![Feature::new(rect(0.0, 0.0, 2.0, 2.0)).with_attr("value", 100.0)]);
        let haz = Layer::new(vec![
            Feature::new(rect(1.0, 1.0, 3.0, 3.0)).with_attr("value", 50.0),
            Feature::new(rect(10.0, 10.0, 11.0, 11.0)).with_attr("value", 7.0),
        ]);
        let out = pop.overlay(&haz, OverlayOp::Intersection);
        assert_eq!(out.len(), 1);
        assert_eq!(out.features[0].number("value_1"), Some(100.0));
        assert_eq!(out.features[0].number("value_2"), Some(50.0));
        assert!((out.features[0].geometry.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn distinct_names_are_kept() {
        let a = Layer::new(vec![Feature::new(rect(0.0, 0.0, 1.0, 1.0)).with_attr("value_1", 3.0)]);
        let b = Layer::new(vec![Feature::new(rect(0.0, 0.0, 1.0, 1.0)).with_attr("rwi", -0.2)]);
        let out = a.overlay(&b, OverlayOp::Intersection);
        assert_eq!(out.features[0].number("value_1"), Some(3.0));
        assert_eq!(out.features[0].number("rwi"), Some(-0.2));
    }

    #[test]
    fn difference_keeps_left_attributes_only() {
        let a = Layer::new(vec![Feature::new(rect(0.0, 0.0, 2.0, 1.0)).with_attr("value", 9.0)]);
        let b = Layer::new(vec![Feature::new(rect(1.0, 0.0, 3.0, 1.0)).with_attr("value", 1.0)]);
        let out = a.overlay(&b, OverlayOp::Difference);
        assert_eq!(out.len(), 1);
        assert_eq!(out.features[0].number("value"), Some(9.0));
        assert!((out.features[0].geometry.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_difference_emits_both_sides() {
        let a = Layer::new(vec![Feature::new(rect(0.0, 0.0, 2.0, 1.0)).with_attr("GID_1", "KEN.1_1")]);
        let b = Layer::new(vec![Feature::new(rect(1.0, 0.0, 3.0, 1.0)).with_attr("value", 1.0)]);
        let out = a.overlay(&b, OverlayOp::SymmetricDifference);
        assert_eq!(out.len(), 2);
        let total: f64 = out.features.iter().map(|f| f.geometry.unsigned_area()).sum();
        assert!((total - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fully_covered_feature_is_dropped() {
        let a = Layer::new(vec![Feature::new(rect(0.0, 0.0, 1.0, 1.0))]);
        let b = Layer::new(vec![Feature::new(rect(-1.0, -1.0, 2.0, 2.0))]);
        assert!(a.overlay(&b, OverlayOp::Difference).is_empty());
    }

    #[test]
    fn layer_round_trips_through_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("KEN.1_1.shp");
        let layer = Layer::new(vec![
            Feature::new(rect(36.0, -1.0, 37.0, 0.0)).with_attr("value", 12.5).with_attr("GID_1", "KEN.1_1"),
            Feature::new(rect(37.0, -1.0, 38.0, 0.0)).with_attr("value", 3.0),
        ]);
        layer.write(&path).unwrap();
        assert!(path.with_extension("prj").exists());
        assert!(path.with_extension("cpg").exists());

        let back = Layer::read(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.features[0].number("value"), Some(12.5));
        assert_eq!(back.features[0].text("GID_1"), Some("KEN.1_1"));
        assert_eq!(back.features[1].text("GID_1"), None);
        assert!((back.features[1].geometry.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn projected_prj_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.shp");
        Layer::new(vec![Feature::new(rect(0.0, 0.0, 1.0, 1.0)).with_attr("value", 1.0)]).write(&path).unwrap();
        std::fs::write(path.with_extension("prj"), r#"PROJCS["WGS 84 / Pseudo-Mercator",AUTHORITY["EPSG","3857"]]"#).unwrap();
        let err = Layer::read(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<StageError>(), Some(StageError::CrsMismatch { found: 3857, .. })));
    }
}
