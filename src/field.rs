// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, ArrayView1, Axis};
use tracing::debug;

use crate::core::SplineCenters;
use crate::error::{Result, TomoError};
use crate::solver::DampedSolution;
use crate::spline::{QueryPoints, SphericalSplineBasis, SplineGeometry};

/// Rectangular lon/lat window in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapExtent {
    /// Western edge.
    pub lon_min: f64,
    /// Eastern edge.
    pub lon_max: f64,
    /// Southern edge.
    pub lat_min: f64,
    /// Northern edge.
    pub lat_max: f64,
}

impl Default for MapExtent {
    /// Southern California study window.
    fn default() -> Self {
        MapExtent {
            lon_min: -121.0,
            lon_max: -114.0,
            lat_min: 31.0,
            lat_max: 37.0,
        }
    }
}

/// Plotting grid: latitude and longitude of every node, shape `(numy, numx)`.
#[derive(Debug, Clone)]
pub struct MapGrid {
    lats: Array2<f64>,
    lons: Array2<f64>,
}

impl MapGrid {
    /// Wrap existing coordinate arrays.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the arrays differ in shape.
    pub fn new(lats: Array2<f64>, lons: Array2<f64>) -> Result<Self> {
        if lats.shape() != lons.shape() {
            return Err(TomoError::ShapeMismatch {
                expected: lats.shape().to_vec(),
                got: lons.shape().to_vec(),
            });
        }
        Ok(MapGrid { lats, lons })
    }

    /// Regular grid over `extent`: row `i` has latitude `i` of `numy`
    /// evenly spaced values, column `j` longitude `j` of `numx`.
    ///
    /// # Errors
    /// Returns `InvalidGrid` for fewer than two nodes per axis or an empty extent.
    pub fn from_extent(extent: MapExtent, numx: usize, numy: usize) -> Result<Self> {
        if numx < 2 || numy < 2 {
            return Err(TomoError::InvalidGrid(format!(
                "need at least 2 nodes per axis, got {}x{}",
                numx, numy
            )));
        }
        if !(extent.lon_min < extent.lon_max) || !(extent.lat_min < extent.lat_max) {
            return Err(TomoError::InvalidGrid(format!("empty extent {:?}", extent)));
        }
        let dlon = (extent.lon_max - extent.lon_min) / (numx - 1) as f64;
        let dlat = (extent.lat_max - extent.lat_min) / (numy - 1) as f64;
        let lons = Array2::from_shape_fn((numy, numx), |(_, j)| extent.lon_min + dlon * j as f64);
        let lats = Array2::from_shape_fn((numy, numx), |(i, _)| extent.lat_min + dlat * i as f64);
        Ok(MapGrid { lats, lons })
    }

    /// Grid shape `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.lats.dim()
    }

    /// Node latitudes.
    pub fn lats(&self) -> &Array2<f64> {
        &self.lats
    }

    /// Node longitudes.
    pub fn lons(&self) -> &Array2<f64> {
        &self.lons
    }

    fn query_points(&self) -> Result<QueryPoints> {
        let lons: Vec<f64> = self.lons.iter().copied().collect();
        let lats: Vec<f64> = self.lats.iter().copied().collect();
        QueryPoints::new(&lons, &lats)
    }
}

/// Every basis function evaluated on a plotting grid, shape `(rows, cols, splines)`.
#[derive(Debug, Clone)]
pub struct SensitivityField {
    values: Array3<f64>,
}

impl SensitivityField {
    /// Evaluate each basis function once over the grid.
    ///
    /// # Errors
    /// Returns `RegionPartition` if a basis evaluation fails.
    pub fn evaluate(grid: &MapGrid, centers: &SplineCenters) -> Result<Self> {
        let (rows, cols) = grid.shape();
        let query = grid.query_points()?;
        let geometry = SplineGeometry::new(centers.scale())?;

        let mut values = Array3::zeros((rows, cols, centers.len()));
        values
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(k, mut plane)| -> Result<()> {
                let basis = SphericalSplineBasis::with_geometry(centers.center(k), geometry);
                let ff = basis
                    .values(&query)?
                    .into_shape((rows, cols))
                    .map_err(|e| TomoError::Other(format!("shape error: {}", e)))?;
                plane.assign(&ff);
                Ok(())
            })?;
        debug!(rows, cols, splines = centers.len(), "evaluated sensitivity field");
        Ok(SensitivityField { values })
    }

    /// Wrap a precomputed field.
    pub fn from_array(values: Array3<f64>) -> Self {
        SensitivityField { values }
    }

    /// The raw field.
    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Number of basis functions.
    pub fn num_splines(&self) -> usize {
        self.values.shape()[2]
    }

    /// Spatial map `sum_k field[.., .., k] * coefficients[k]`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the coefficient count differs from the number of splines.
    pub fn expand(&self, coefficients: ArrayView1<f64>) -> Result<Array2<f64>> {
        let (rows, cols, n) = self.values.dim();
        if coefficients.len() != n {
            return Err(TomoError::ShapeMismatch {
                expected: vec![n],
                got: vec![coefficients.len()],
            });
        }
        let flat = self
            .values
            .view()
            .into_shape((rows * cols, n))
            .map_err(|e| TomoError::Other(format!("shape error: {}", e)))?;
        flat.dot(&coefficients)
            .into_shape((rows, cols))
            .map_err(|e| TomoError::Other(format!("shape error: {}", e)))
    }

    /// One map per damping value, in sweep order.
    ///
    /// # Errors
    /// See [`SensitivityField::expand`].
    pub fn expand_all(&self, solution: &DampedSolution) -> Result<Vec<(f64, Array2<f64>)>> {
        solution
            .iter()
            .map(|(lambda, m)| -> Result<(f64, Array2<f64>)> { Ok((lambda, self.expand(m)?)) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn centers() -> SplineCenters {
        SplineCenters::new(vec![33.0, 35.0], vec![-119.0, -116.0], 5).unwrap()
    }

    #[test]
    fn grid_layout() {
        let grid = MapGrid::from_extent(MapExtent::default(), 8, 7).unwrap();
        assert_eq!(grid.shape(), (7, 8));
        assert_eq!(grid.lons()[[0, 0]], -121.0);
        assert!((grid.lons()[[3, 7]] + 114.0).abs() < 1e-12);
        assert_eq!(grid.lats()[[0, 5]], 31.0);
        assert!((grid.lats()[[6, 0]] - 37.0).abs() < 1e-12);
        assert!(matches!(
            MapGrid::from_extent(MapExtent::default(), 1, 5),
            Err(TomoError::InvalidGrid(_))
        ));
    }

    #[test]
    fn field_peaks_at_centers() {
        let extent = MapExtent {
            lon_min: -120.0,
            lon_max: -115.0,
            lat_min: 32.0,
            lat_max: 36.0,
        };
        // 1-degree spacing puts nodes exactly on both centers
        let grid = MapGrid::from_extent(extent, 6, 5).unwrap();
        let field = SensitivityField::evaluate(&grid, &centers()).unwrap();
        assert_eq!(field.values().dim(), (5, 6, 2));
        assert_eq!(field.values()[[1, 1, 0]], 1.0);
        assert_eq!(field.values()[[3, 4, 1]], 1.0);
        assert!(field.values().iter().all(|&v| v > -1e-12 && v <= 1.0));
    }

    #[test]
    fn expand_is_weighted_sum() {
        let grid = MapGrid::from_extent(MapExtent::default(), 10, 9).unwrap();
        let field = SensitivityField::evaluate(&grid, &centers()).unwrap();
        let map = field.expand(array![2.0, -1.0].view()).unwrap();
        for i in 0..9 {
            for j in 0..10 {
                let expected =
                    2.0 * field.values()[[i, j, 0]] - field.values()[[i, j, 1]];
                assert!((map[[i, j]] - expected).abs() < 1e-12);
            }
        }
        assert!(matches!(
            field.expand(array![1.0].view()),
            Err(TomoError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn expand_all_follows_sweep() {
        let grid = MapGrid::from_extent(MapExtent::default(), 5, 5).unwrap();
        let field = SensitivityField::evaluate(&grid, &centers()).unwrap();
        let sol = DampedSolution::new(vec![0.1, 1.0], vec![array![1.0, 0.0], array![0.0, 0.0]])
            .unwrap();
        let maps = field.expand_all(&sol).unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].0, 0.1);
        assert!(maps[1].1.iter().all(|&v| v == 0.0));
    }
}
