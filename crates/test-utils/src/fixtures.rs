//! Common test fixtures for FA tests.
//!
//! Names and grid parameters taken from the ALARO Belgian domain
//! (`ICMSHAR13+0014`), the reference file of the scenario tests.

/// Reference FA file used by the scenario tests.
pub const REFERENCE_FA_FILE: &str = "ICMSHAR13+0014";

/// Field names.
pub mod fields {
    /// 2m temperature
    pub const CLS_TEMPERATURE: &str = "CLSTEMPERATURE";

    /// 10m zonal wind
    pub const CLS_WIND_U: &str = "CLSVENT.ZONAL";

    /// Accumulated rain
    pub const RAIN: &str = "SURFACCPLUIE";

    /// Zonal wind on model levels (3D basename)
    pub const WIND_U: &str = "WIND.U.PHYS";

    /// Pseudo-3D basename (only some levels present)
    pub const RAYT_SOL: &str = "RAYT SOL CL";
}

/// Lambert grid of the reference domain.
pub mod lambert {
    /// Reference (and standard) latitude.
    pub const LAT: f64 = 50.8;

    /// Reference longitude.
    pub const LON: f64 = 4.55;

    /// Earth radius used by the model.
    pub const RADIUS: f64 = 6_371_229.0;

    /// Grid spacing in metres.
    pub const SPACING: f64 = 1300.0;

    pub const PROJ4: &str = "+proj=lcc +lat_1=50.8 +lat_2=50.8 +lon_0=4.55 +R=6371229";
}

/// Common time values.
pub mod time {
    pub const BASEDATE: &str = "2023-11-20 00:00:00";
    pub const VALIDATE_14H: &str = "2023-11-20 14:00:00";
    pub const VALIDATE_15H: &str = "2023-11-20 15:00:00";
    pub const VALIDATE_16H: &str = "2023-11-20 16:00:00";
}

/// Common CRS identifiers.
pub mod crs {
    /// WGS84 geographic
    pub const EPSG_4326: &str = "EPSG:4326";
}
