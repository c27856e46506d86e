//! Single-band GeoTIFF I/O for `RasterGrid`.
//!
//! Georeferencing is carried by ModelPixelScale + ModelTiepoint (north-up, no
//! rotation) and the CRS by the GeoKey directory. Nodata values named by the
//! GDAL_NODATA tag become NaN on read; NaN is written as nodata.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use heatrisk_core::coords::Crs;
use heatrisk_core::{GridSpec, RasterGrid};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u32 = 1024;
const GT_RASTER_TYPE: u32 = 1025;
const GEOGRAPHIC_TYPE: u32 = 2048;
const PROJECTED_CS_TYPE: u32 = 3072;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

pub fn read_geotiff(path: &Path) -> Result<RasterGrid> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    decode(file).with_context(|| format!("Invalid GeoTIFF {}", path.display()))
}

/// Decode a GeoTIFF held in memory (e.g. an archive entry; tar entries do not seek).
pub fn read_geotiff_bytes(bytes: Vec<u8>) -> Result<RasterGrid> {
    decode(Cursor::new(bytes))
}

fn decode<R: Read + Seek>(reader: R) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(reader).context("not a TIFF")?;
    let (width, height) = decoder.dimensions()?;

    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .context("missing ModelPixelScale tag")?;
    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .context("missing ModelTiepoint tag")?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        bail!("malformed georeferencing tags");
    }
    let crs = match decoder.get_tag_u32_vec(tag(GEO_KEY_DIRECTORY)) {
        Ok(keys) => crs_from_geokeys(&keys)?,
        Err(_) => Crs::Wgs84,
    };
    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
        .filter(|v| !v.is_nan());

    // Tiepoint [I, J, K, X, Y, Z] pins raster (I, J) to model (X, Y).
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    let spec = GridSpec::new(width as usize, height as usize, origin_x, origin_y, scale[0], scale[1], crs);

    let data: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        _ => bail!("unsupported sample format"),
    };
    let data = data
        .into_iter()
        .map(|v| if Some(v) == nodata { f32::NAN } else { v as f32 })
        .collect();
    Ok(RasterGrid::from_data(spec, data)?)
}

/// CRS from a GeoKey directory: header `[version, rev, minor, count]` then
/// `count` entries of `[key, location, count, value]`.
fn crs_from_geokeys(keys: &[u32]) -> Result<Crs> {
    if keys.len() < 4 {
        bail!("truncated GeoKey directory");
    }
    let count = keys[3] as usize;
    for entry in keys[4..].chunks_exact(4).take(count) {
        if (entry[0] == GEOGRAPHIC_TYPE || entry[0] == PROJECTED_CS_TYPE) && entry[1] == 0 {
            return Crs::from_epsg(entry[3]).with_context(|| format!("unsupported EPSG:{}", entry[3]));
        }
    }
    Ok(Crs::Wgs84)
}

fn geokeys_for(crs: Crs) -> Vec<u16> {
    let (model_type, crs_key) = if crs.is_geographic() {
        (2, GEOGRAPHIC_TYPE)
    } else {
        (1, PROJECTED_CS_TYPE)
    };
    vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE as u16, 0, 1, model_type,
        GT_RASTER_TYPE as u16, 0, 1, 1, // RasterPixelIsArea
        crs_key as u16, 0, 1, crs.epsg() as u16,
    ]
}

pub fn write_geotiff(raster: &RasterGrid, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    encode(raster, &mut writer).with_context(|| format!("Cannot write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Encode as an in-memory GeoTIFF, for archive entries.
pub fn geotiff_bytes(raster: &RasterGrid) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    encode(raster, &mut buf)?;
    Ok(buf.into_inner())
}

fn encode<W: Write + Seek>(raster: &RasterGrid, writer: W) -> Result<()> {
    let spec = raster.spec;
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32Float>(spec.width as u32, spec.height as u32)?;

    let scale = [spec.cell_width, spec.cell_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, spec.origin_x, spec.origin_y, 0.0];
    let geokeys = geokeys_for(spec.crs);
    image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
    image.encoder().write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())?;
    image.encoder().write_tag(tag(GDAL_NODATA), "nan")?;

    image.write_data(&raster.data)?;
    Ok(())
}
