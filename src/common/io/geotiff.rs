use std::{fs::File, io::{BufReader, BufWriter}, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use ndarray::{s, Array2};
use polygonize::GeoTransform;
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

// GeoKey ids (GeoTIFF 1.0, section 6.2).
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Georeferencing read from the GeoTIFF tags of one file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GeoTiffHeader {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) transform: GeoTransform,
    /// Declared EPSG code; `None` when the file carries no GeoKeys.
    pub(crate) epsg: Option<u16>,
    pub(crate) nodata: Option<f64>,
}

/// Lazily reads single-band GeoTIFFs chunk by chunk, so that a window of a
/// global raster never requires decoding the whole image.
pub(crate) struct GeoTiffReader {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    header: GeoTiffHeader,
}

impl GeoTiffReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open GeoTIFF {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("Failed to decode TIFF header of {}", path.display()))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let transform = read_transform(&mut decoder)
            .with_context(|| format!("Missing georeferencing in {}", path.display()))?;
        let (epsg, raster_type) = read_geokeys(&mut decoder)?;
        let nodata = match decoder.find_tag(Tag::GdalNodata)? {
            Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse::<f64>().ok(),
            None => None,
        };

        // Pixel-is-point rasters tie the centre, not the corner, of pixel (0, 0).
        let transform = if raster_type == Some(RASTER_PIXEL_IS_POINT) {
            let corner = transform.apply(-0.5, -0.5);
            GeoTransform { c: corner.x, f: corner.y, ..transform }
        } else {
            transform
        };

        let header = GeoTiffHeader { width: width as usize, height: height as usize, transform, epsg, nodata };
        Ok(Self { path: path.to_path_buf(), decoder, header })
    }

    #[inline]
    pub(crate) fn header(&self) -> &GeoTiffHeader { &self.header }

    #[inline]
    pub(crate) fn path(&self) -> &Path { &self.path }

    /// Read the `width × height` window whose top-left pixel is
    /// `(col_off, row_off)`.  The window may extend past the image; pixels
    /// outside it are set to `fill`.
    pub(crate) fn read_window(&mut self, col_off: i64, row_off: i64, width: usize, height: usize, fill: f32) -> Result<Array2<f32>> {
        let mut out = Array2::from_elem((height, width), fill);

        let (img_w, img_h) = (self.header.width as i64, self.header.height as i64);
        let c0 = col_off.max(0);
        let r0 = row_off.max(0);
        let c1 = (col_off + width as i64).min(img_w);
        let r1 = (row_off + height as i64).min(img_h);
        if c0 >= c1 || r0 >= r1 { return Ok(out) }

        let (cw, ch) = self.decoder.chunk_dimensions();
        let (cw, ch) = (cw.max(1) as i64, ch.max(1) as i64);
        let across = (img_w + cw - 1) / cw;

        for cy in (r0 / ch)..=((r1 - 1) / ch) {
            for cx in (c0 / cw)..=((c1 - 1) / cw) {
                let index = (cy * across + cx) as u32;
                let (dw, dh) = self.decoder.chunk_data_dimensions(index);
                let chunk = self.decoder.read_chunk(index)
                    .with_context(|| format!("Failed to read chunk {index} of {}", self.path.display()))?;
                let values = decoding_to_f32(chunk)?;
                let (dw, dh) = (dw as i64, dh as i64);
                if values.len() < (dw * dh) as usize {
                    bail!("multi-band or truncated chunk {index} in {}", self.path.display());
                }

                // Intersection of this chunk with the requested window.
                let (x0, y0) = (cx * cw, cy * ch);
                let xa = c0.max(x0);
                let xb = c1.min(x0 + dw);
                let ya = r0.max(y0);
                let yb = r1.min(y0 + dh);
                for y in ya..yb {
                    let src = ((y - y0) * dw + (xa - x0)) as usize;
                    let len = (xb - xa) as usize;
                    let dst_row = (y - row_off) as usize;
                    let dst_col = (xa - col_off) as usize;
                    out.slice_mut(s![dst_row, dst_col..dst_col + len])
                        .iter_mut()
                        .zip(&values[src..src + len])
                        .for_each(|(d, v)| *d = *v);
                }
            }
        }
        Ok(out)
    }

    /// Read the whole image.
    pub(crate) fn read_all(&mut self) -> Result<Array2<f32>> {
        let (w, h) = (self.header.width, self.header.height);
        let values = decoding_to_f32(self.decoder.read_image()
            .with_context(|| format!("Failed to decode image data of {}", self.path.display()))?)?;
        if values.len() != w * h {
            bail!("expected {} samples in {}, found {}", w * h, self.path.display(), values.len());
        }
        Ok(Array2::from_shape_vec((h, w), values)?)
    }
}

/// Write a single-band Float32 GeoTIFF in EPSG:4326.
pub(crate) fn write_geotiff(path: &Path, data: &Array2<f32>, transform: &GeoTransform, nodata: f64) -> Result<()> {
    let (height, width) = data.dim();
    let file = File::create(path)
        .with_context(|| format!("Failed to create GeoTIFF {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;

    if transform.is_north_up() {
        image.encoder().write_tag(Tag::ModelPixelScaleTag, &[transform.a, -transform.e, 0.0][..])?;
        image.encoder().write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, transform.c, transform.f, 0.0][..])?;
    } else {
        let t = transform;
        let matrix = [
            t.a, t.b, 0.0, t.c,
            t.d, t.e, 0.0, t.f,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image.encoder().write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }
    let geokeys: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, 2,
        GT_RASTER_TYPE, 0, 1, 1,
        GEOGRAPHIC_TYPE, 0, 1, 4326,
    ];
    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
    image.encoder().write_tag(Tag::GdalNodata, format!("{nodata}").as_str())?;

    let samples: Vec<f32> = data.iter().copied().collect();
    image.write_data(&samples)
        .with_context(|| format!("Failed to write image data to {}", path.display()))?;
    Ok(())
}

fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = value.into_f64_vec()?;
        if m.len() < 8 { bail!("ModelTransformationTag has {} values", m.len()) }
        return Ok(GeoTransform { a: m[0], b: m[1], c: m[3], d: m[4], e: m[5], f: m[7] });
    }

    let scale = decoder.find_tag(Tag::ModelPixelScaleTag)?.map(|v| v.into_f64_vec()).transpose()?;
    let tie = decoder.find_tag(Tag::ModelTiepointTag)?.map(|v| v.into_f64_vec()).transpose()?;
    match (scale, tie) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(GeoTransform::north_up(x - i * sx, y + j * sy, sx, sy))
        }
        _ => bail!("no ModelTransformation or ModelPixelScale/ModelTiepoint tags"),
    }
}

/// Returns the declared EPSG code and the raster type GeoKey.
fn read_geokeys<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<(Option<u16>, Option<u16>)> {
    let Some(value) = decoder.find_tag(Tag::GeoKeyDirectoryTag)? else { return Ok((None, None)) };
    let keys = value.into_u16_vec()?;

    let mut geographic = None;
    let mut projected = None;
    let mut raster_type = None;
    for entry in keys.chunks_exact(4).skip(1) {
        // Inline SHORT values only (tag location 0).
        if entry[1] != 0 { continue }
        match entry[0] {
            GEOGRAPHIC_TYPE => geographic = Some(entry[3]),
            PROJECTED_CS_TYPE => projected = Some(entry[3]),
            GT_RASTER_TYPE => raster_type = Some(entry[3]),
            _ => {}
        }
    }
    Ok((projected.or(geographic), raster_type))
}

#[allow(unreachable_patterns)]
fn decoding_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => bail!("unsupported TIFF sample format"),
    })
}
