//! Georeferenced raster loaded from a GeoTIFF file.

use crate::{Result, TopoError};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

/// Affine transform from pixel `(col, row)` to map `(x, y)`, GDAL ordering:
/// `x = t[0] + col * t[1] + row * t[2]`, `y = t[3] + col * t[4] + row * t[5]`.
pub type GeoTransform = [f64; 6];

/// A raster's first band plus the metadata needed to re-encode it.
#[derive(Debug)]
pub struct GeoRaster {
    /// Band 1 values in row-major order (north row first).
    data: Vec<f32>,
    /// Width in pixels.
    width: u32,
    /// Height in pixels.
    height: u32,
    /// Samples per pixel in the source file.
    band_count: u16,
    /// Pixel-to-map transform.
    transform: GeoTransform,
    /// No-data value, if the file declares one.
    no_data_value: Option<f64>,
}

impl GeoRaster {
    /// Load band 1 and the georeferencing of a GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let mut decoder = Decoder::new(std::io::BufReader::new(file))?;

        // Exports can be large; lift the default 256 MB decoding cap.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let band_count = decoder
            .get_tag_u32(Tag::SamplesPerPixel)
            .map(|n| n as u16)
            .unwrap_or(1)
            .max(1);

        let transform = Self::read_geotransform(&mut decoder)?;
        let no_data_value = Self::read_nodata_value(&mut decoder);

        let samples = Self::decode_samples(&mut decoder)?;
        let data = Self::first_band(samples, width, height, band_count)?;

        Ok(Self {
            data,
            width,
            height,
            band_count,
            transform,
            no_data_value,
        })
    }

    /// Build a raster directly from values and metadata.
    pub fn from_parts(
        data: Vec<f32>,
        width: u32,
        height: u32,
        transform: GeoTransform,
        no_data_value: Option<f64>,
    ) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(TopoError::InvalidGeoTiff(format!(
                "{} values for a {}x{} raster",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            band_count: 1,
            transform,
            no_data_value,
        })
    }

    /// Read the geotransform from ModelPixelScale + ModelTiepoint, or ModelTransformation.
    fn read_geotransform<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<GeoTransform> {
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);
        let pixel_scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);

        if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
            if tiepoint.len() >= 6 && scale.len() >= 2 {
                // Tiepoint format: [i, j, k, x, y, z], pixel (i, j) sits at map (x, y)
                let (i, j) = (tiepoint[0], tiepoint[1]);
                let (x, y) = (tiepoint[3], tiepoint[4]);
                let (sx, sy) = (scale[0], scale[1]);
                return Ok([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]);
            }
        }

        if let Ok(m) = decoder.get_tag_f64_vec(Tag::ModelTransformationTag) {
            if m.len() >= 16 {
                // Row-major 4x4 matrix; the 2D affine part maps onto the GDAL layout.
                return Ok([m[3], m[0], m[1], m[7], m[4], m[5]]);
            }
        }

        Err(TopoError::InvalidGeoTiff(
            "no ModelPixelScale/ModelTiepoint or ModelTransformation tags".to_string(),
        ))
    }

    /// Try to read the no-data value from the GDAL_NODATA tag (ASCII).
    fn read_nodata_value<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Option<f64> {
        decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse().ok())
    }

    /// Decode all samples of the first image as `f32`.
    fn decode_samples<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<Vec<f32>> {
        let result = decoder.read_image()?;

        match result {
            DecodingResult::F32(data) => Ok(data),
            DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
            DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        }
    }

    /// Keep only band 1 of pixel-interleaved samples.
    fn first_band(samples: Vec<f32>, width: u32, height: u32, bands: u16) -> Result<Vec<f32>> {
        let pixels = width as usize * height as usize;
        let bands = bands as usize;

        if samples.len() == pixels {
            return Ok(samples);
        }
        if samples.len() == pixels * bands {
            return Ok(samples.into_iter().step_by(bands).collect());
        }

        Err(TopoError::InvalidGeoTiff(format!(
            "{} samples for a {}x{} raster with {} bands",
            samples.len(),
            width,
            height,
            bands
        )))
    }

    /// Band 1 values, north row first.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// One row of band 1, `0` being the northernmost.
    pub fn row(&self, row: u32) -> &[f32] {
        let start = row as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    /// Dimensions `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of bands in the source file. Only band 1 is kept.
    pub fn band_count(&self) -> u16 {
        self.band_count
    }

    /// Pixel-to-map transform.
    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    /// Declared no-data value.
    pub fn no_data_value(&self) -> Option<f64> {
        self.no_data_value
    }
}
