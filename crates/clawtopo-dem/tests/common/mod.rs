//! Shared helpers for the integration tests: an in-memory GeoTIFF builder
//! and a scripted HTTP client standing in for the image service.

#![allow(dead_code)]

use clawtopo_dem::http::Params;
use clawtopo_dem::{DomainConfig, HttpClient, HttpResponse, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use tiff::encoder::colortype::{Gray32Float, RGB32Float};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

pub const RESULT_URL: &str = "https://files.example/export/raster.tif";

/// A north-up GeoTIFF description.
pub struct TiffSpec {
    pub width: u32,
    pub height: u32,
    pub origin: (f64, f64),
    pub pixel: (f64, f64),
    pub no_data: Option<&'static str>,
}

impl TiffSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            origin: (-100.0, 200.0),
            pixel: (10.0, 10.0),
            no_data: Some("-9999"),
        }
    }

    fn write_geo_tags<W: std::io::Write + std::io::Seek, K: tiff::encoder::TiffKind>(
        &self,
        dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    ) {
        let scale = [self.pixel.0, self.pixel.1, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, self.origin.0, self.origin.1, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, scale.as_slice()).unwrap();
        dir.write_tag(Tag::ModelTiepointTag, tiepoint.as_slice()).unwrap();
        if let Some(no_data) = self.no_data {
            dir.write_tag(Tag::GdalNodata, no_data).unwrap();
        }
    }

    /// Single-band float32 GeoTIFF bytes.
    pub fn gray(&self, data: &[f32]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder
                .new_image::<Gray32Float>(self.width, self.height)
                .unwrap();
            self.write_geo_tags(image.encoder());
            image.write_data(data).unwrap();
        }
        buf.into_inner()
    }

    /// Three-band, pixel-interleaved float32 GeoTIFF bytes.
    pub fn rgb(&self, data: &[f32]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder
                .new_image::<RGB32Float>(self.width, self.height)
                .unwrap();
            self.write_geo_tags(image.encoder());
            image.write_data(data).unwrap();
        }
        buf.into_inner()
    }
}

/// Replays canned responses: every export call gets `export`, polls of the
/// result URL pop from `polls` and fall back to `fallback`.
pub struct ScriptedService {
    pub export: HttpResponse,
    pub polls: RefCell<VecDeque<HttpResponse>>,
    pub fallback: HttpResponse,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedService {
    /// Export succeeds immediately and the raster is ready on the first poll.
    pub fn serving(raster: Vec<u8>) -> Self {
        Self::with_polls(vec![ok(raster)])
    }

    pub fn with_polls(polls: Vec<HttpResponse>) -> Self {
        Self {
            export: ok(format!(r#"{{"href":"{}"}}"#, RESULT_URL).into_bytes()),
            polls: RefCell::new(polls.into()),
            fallback: status(404),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl HttpClient for ScriptedService {
    fn get(&self, url: &str, _query: &Params) -> Result<HttpResponse> {
        self.calls.borrow_mut().push(url.to_string());
        if url == RESULT_URL {
            let next = self.polls.borrow_mut().pop_front();
            return Ok(next.unwrap_or_else(|| self.fallback.clone()));
        }
        Ok(self.export.clone())
    }

    fn post_form(&self, url: &str, _form: &Params) -> Result<HttpResponse> {
        self.calls.borrow_mut().push(url.to_string());
        Ok(status(405))
    }
}

pub fn ok(body: Vec<u8>) -> HttpResponse {
    HttpResponse { status: 200, body }
}

pub fn status(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        body: Vec::new(),
    }
}

pub fn no_sleep(_: Duration) {}

/// A 4 x 3 cell domain on 10 m cells, with one level of 2x refinement: 5 m pixels.
pub fn small_domain() -> DomainConfig {
    DomainConfig {
        lower: [0.0, 0.0],
        upper: [40.0, 30.0],
        num_cells: [4, 3],
        amr_levels_max: 2,
        refinement_ratios_x: vec![2],
        refinement_ratios_y: vec![2],
        topo_file: PathBuf::from("topo/topo.asc"),
    }
}
