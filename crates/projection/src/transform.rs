//! Point transformation between two coordinate reference systems.

use crate::Crs;

/// Transforms points from a source CRS to a target CRS through lon/lat.
#[derive(Debug, Clone)]
pub struct Transformer {
    src: Crs,
    dst: Crs,
    identity: bool,
}

impl Transformer {
    pub fn new(src: Crs, dst: Crs) -> Self {
        let identity = src == dst;
        Self { src, dst, identity }
    }

    /// Transformer going the opposite direction.
    pub fn inverse(&self) -> Self {
        Self::new(self.dst.clone(), self.src.clone())
    }

    pub fn source(&self) -> &Crs {
        &self.src
    }

    pub fn target(&self) -> &Crs {
        &self.dst
    }

    /// True when source and target are the same CRS.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Transform a single point. Returns `None` when the point falls outside
    /// the domain of either projection.
    pub fn transform(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.identity {
            return Some((x, y));
        }
        let (lon, lat) = self.src.inverse(x, y)?;
        let (tx, ty) = self.dst.forward(lon, lat)?;
        if tx.is_finite() && ty.is_finite() {
            Some((tx, ty))
        } else {
            None
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` in the target CRS of the
    /// rectangle spanned by `xs` and `ys` in the source CRS.
    ///
    /// The whole perimeter is sampled, because edges of a projected grid are
    /// curved in most other projections.
    pub fn transform_bounds(&self, xs: &[f64], ys: &[f64]) -> Option<(f64, f64, f64, f64)> {
        let (first_x, last_x) = (*xs.first()?, *xs.last()?);
        let (first_y, last_y) = (*ys.first()?, *ys.last()?);

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut any = false;

        let edges = xs
            .iter()
            .flat_map(|&x| [(x, first_y), (x, last_y)])
            .chain(ys.iter().flat_map(|&y| [(first_x, y), (last_x, y)]));

        for (x, y) in edges {
            if let Some((tx, ty)) = self.transform(x, y) {
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
                any = true;
            }
        }

        any.then_some((min_x, min_y, max_x, max_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lambert() -> Crs {
        Crs::parse("+proj=lcc +lat_1=50.8 +lat_2=50.8 +lon_0=4.55 +R=6371229").unwrap()
    }

    #[test]
    fn test_identity() {
        let t = Transformer::new(lambert(), lambert());
        assert!(t.is_identity());
        assert_eq!(t.transform(1234.5, -99.0), Some((1234.5, -99.0)));
    }

    #[test]
    fn test_lambert_to_geographic_and_back() {
        let crs = lambert();
        let (x, y) = crs.forward(4.35, 50.85).unwrap();

        let to_geo = Transformer::new(crs, Crs::Geographic);
        let (lon, lat) = to_geo.transform(x, y).unwrap();
        assert!((lon - 4.35).abs() < 1e-9);
        assert!((lat - 50.85).abs() < 1e-9);

        let (x2, y2) = to_geo.inverse().transform(lon, lat).unwrap();
        assert!((x - x2).abs() < 1e-6);
        assert!((y - y2).abs() < 1e-6);
    }

    #[test]
    fn test_transform_bounds_covers_corners() {
        let crs = lambert();
        let (x0, y0) = crs.forward(2.0, 49.0).unwrap();
        let (x1, y1) = crs.forward(7.0, 52.0).unwrap();
        let xs: Vec<f64> = (0..=10).map(|i| x0 + (x1 - x0) * i as f64 / 10.0).collect();
        let ys: Vec<f64> = (0..=10).map(|i| y0 + (y1 - y0) * i as f64 / 10.0).collect();

        let t = Transformer::new(crs, Crs::Geographic);
        let (min_lon, min_lat, max_lon, max_lat) = t.transform_bounds(&xs, &ys).unwrap();
        assert!(min_lon <= 2.0 + 1e-9 && max_lon >= 7.0 - 1e-9);
        assert!(min_lat <= 49.0 + 1e-9 && max_lat >= 52.0 - 1e-9);
    }

    #[test]
    fn test_transform_bounds_empty_input() {
        let t = Transformer::new(Crs::Geographic, Crs::Geographic);
        assert!(t.transform_bounds(&[], &[1.0]).is_none());
    }
}
