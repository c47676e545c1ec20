//! Common test utilities for fa-dataset integration tests
//!
//! Provides:
//! - A decoder that writes synthetic output instead of running R
//! - A small Lambert fixture on the Belgian domain
//! - Placeholder FA files and an isolated scratch configuration

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use fa_dataset::{DecodeRequest, DecodeSelection, FaConfig, FaDecoder, FaError, Result};
use projection::Crs;
use test_utils::{fields, lambert, requests_from_selection, FaFixture};

/// Decoder backed by an [`FaFixture`]. Records every selection it receives.
pub struct FixtureDecoder {
    fixture: FaFixture,
    calls: RefCell<Vec<DecodeSelection>>,
}

impl FixtureDecoder {
    pub fn new(fixture: FaFixture) -> Self {
        Self {
            fixture,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DecodeSelection> {
        self.calls.borrow().clone()
    }
}

impl FaDecoder for FixtureDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<()> {
        self.calls.borrow_mut().push(request.selection.clone());
        match &request.selection {
            DecodeSelection::Metadata => self.fixture.write_catalog(request.output_dir)?,
            selection => {
                let arg = selection.as_arg();
                let requests = requests_from_selection(&arg.to_string_lossy())?;
                self.fixture.write_data(request.output_dir, &requests)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Decoder that exits without writing anything.
pub struct SilentDecoder;

impl FaDecoder for SilentDecoder {
    fn decode(&self, _request: &DecodeRequest<'_>) -> Result<()> {
        Ok(())
    }
}

/// Decoder whose process cannot be started.
pub struct BrokenDecoder;

impl FaDecoder for BrokenDecoder {
    fn decode(&self, _request: &DecodeRequest<'_>) -> Result<()> {
        Err(FaError::decode_failure("could not start Rscript"))
    }
}

/// Projected coordinates of an `nx` x `ny` grid centred on the reference point.
pub fn lambert_coords(nx: usize, ny: usize) -> (Vec<f64>, Vec<f64>) {
    let crs = Crs::parse(lambert::PROJ4).expect("valid PROJ4");
    let (cx, cy) = crs.forward(lambert::LON, lambert::LAT).expect("centre projects");
    let half_x = (nx as f64 - 1.0) / 2.0;
    let half_y = (ny as f64 - 1.0) / 2.0;
    let xs = (0..nx)
        .map(|i| cx + (i as f64 - half_x) * lambert::SPACING)
        .collect();
    let ys = (0..ny)
        .map(|j| cy + (j as f64 - half_y) * lambert::SPACING)
        .collect();
    (xs, ys)
}

/// 6x5 grid, 3 levels: two 2D fields, one 3D field along every level and
/// one pseudo-3D field present on levels 1 and 3.
pub fn belgian_fixture() -> FaFixture {
    let (xs, ys) = lambert_coords(6, 5);
    let mut fixture = FaFixture::new(6, 5, 3);
    fixture
        .lambert(lambert::LAT, lambert::LON, lambert::RADIUS)
        .coords(xs, ys)
        .meta("origin", serde_json::json!(["ICMSHAR13+0014"]))
        .field_2d(fields::CLS_TEMPERATURE)
        .field_2d(fields::RAIN)
        .field_3d(fields::WIND_U)
        .field_levels(fields::RAYT_SOL, &[1, 3]);
    fixture
}

/// Empty file standing in for an FA file (the fixture decoder ignores it).
pub fn placeholder_fa_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").expect("write placeholder");
    path
}

/// Configuration creating scratch directories under `scratch`.
pub fn scratch_config(scratch: &Path) -> FaConfig {
    FaConfig {
        scratch_location: scratch.to_path_buf(),
        ..Default::default()
    }
}

/// Number of entries left in a directory.
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
