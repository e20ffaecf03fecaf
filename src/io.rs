// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::{BufRead, Write};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayBase, ArrayD, Data, Dimension, Ix2, IxDyn, ShapeBuilder};

use crate::core::{SplineCenters, Stations};
use crate::design::{DesignMatrix, RayPaths};
use crate::error::{Result, TomoError};
use crate::field::SensitivityField;
use crate::solver::DampedSolution;

/// MAT variable name for the design matrix.
pub const DESIGN_MATRIX_VAR: &str = "G";

/// Output file format, inferred from the extension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy `.npy`.
    Npy,
    /// MATLAB Level 5 `.mat`.
    Mat,
}

/// Infer the file format from a path's extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(TomoError::UnsupportedFileFormat(ext.to_string())),
        None => Err(TomoError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Read whitespace-separated numeric rows, skipping `skip` header lines and blank lines.
fn read_rows(path: &Path, skip: usize, min_cols: usize) -> Result<Vec<Vec<f64>>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut rows = Vec::new();
    for (n, line) in reader.lines().enumerate().skip(skip) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TomoError::Parse {
                line: n + 1,
                reason: e.to_string(),
            })?;
        if row.len() < min_cols {
            return Err(TomoError::Parse {
                line: n + 1,
                reason: format!("expected at least {} columns, got {}", min_cols, row.len()),
            });
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Load sources or receivers from a `lon lat index` table with one header line.
pub fn load_stations(path: &Path) -> Result<Stations> {
    let rows = read_rows(path, 1, 2)?;
    let lons = rows.iter().map(|r| r[0]).collect();
    let lats = rows.iter().map(|r| r[1]).collect();
    Stations::new(lats, lons)
}

/// Load spline centers from a headerless `lon lat` table.
pub fn load_centers(path: &Path, scale: u32) -> Result<SplineCenters> {
    let rows = read_rows(path, 0, 2)?;
    let lons = rows.iter().map(|r| r[0]).collect();
    let lats = rows.iter().map(|r| r[1]).collect();
    SplineCenters::new(lats, lons, scale)
}

/// Load a measurement vector: every number in the file, in reading order.
pub fn load_measurements(path: &Path) -> Result<Array1<f64>> {
    let rows = read_rows(path, 0, 1)?;
    Ok(rows.into_iter().flatten().collect())
}

/// Load a 2-D matrix from `.npy` (f64 or f32) or from variable `var` of a `.mat` file.
pub fn load_matrix(path: &Path, var: &str) -> Result<Array2<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => {
            let arr: Array2<f64> = match ndarray_npy::read_npy(path) {
                Ok(a) => a,
                Err(_) => {
                    let arr32: Array2<f32> = ndarray_npy::read_npy(path)
                        .map_err(|e| TomoError::UnsupportedDtype(format!("{}", e)))?;
                    arr32.mapv(f64::from)
                }
            };
            Ok(arr.as_standard_layout().to_owned())
        }
        FileFormat::Mat => {
            let arr = load_mat_array(path, var)?;
            let dims = arr.shape().to_vec();
            arr.into_dimensionality::<Ix2>()
                .map_err(|_| TomoError::ShapeMismatch {
                    expected: vec![0, 0],
                    got: dims,
                })
        }
    }
}

/// Load the design matrix saved by [`save_design_matrix`].
pub fn load_design_matrix(path: &Path, index: crate::core::RayIndex) -> Result<DesignMatrix> {
    DesignMatrix::from_array(load_matrix(path, DESIGN_MATRIX_VAR)?, index)
}

/// Read variable `var` of a `.mat` file into a row-major array.
pub fn load_mat_array(path: &Path, var: &str) -> Result<ArrayD<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| TomoError::Other(format!("MAT parse error: {}", e)))?;

    let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();
    let array = mat
        .find_by_name(var)
        .ok_or_else(|| TomoError::MatVariableNotFound {
            expected: var.to_string(),
            available,
        })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, imag: _ } => real.clone(),
        matfile::NumericData::Single { real, imag: _ } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(TomoError::UnsupportedDtype(
                "MAT file array is not f64 or f32".to_string(),
            ))
        }
    };

    // MAT data is column-major
    let dims: Vec<usize> = array.size().to_vec();
    let arr = ArrayD::from_shape_vec(IxDyn(&dims).f(), data)
        .map_err(|e| TomoError::Other(format!("shape error: {}", e)))?;
    Ok(arr.as_standard_layout().to_owned())
}

/// Save a numeric array as `.npy` or as variable `var` of a `.mat` file.
pub fn save_array<S, D>(arr: &ArrayBase<S, D>, path: &Path, var: &str) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    match infer_format(path)? {
        FileFormat::Npy => ndarray_npy::write_npy(path, arr)
            .map_err(|e| TomoError::Other(format!("npy write error: {}", e))),
        FileFormat::Mat => write_mat_level5(path, &[MatArray::from_array(var, arr)]),
    }
}

/// Save the design matrix (`.npy`, or variable `G` in `.mat`).
pub fn save_design_matrix(g: &DesignMatrix, path: &Path) -> Result<()> {
    save_array(g.matrix(), path, DESIGN_MATRIX_VAR)
}

/// Save the waypoint tensor `(rays, npts, [lat, lon])`.
pub fn save_ray_paths(paths: &RayPaths, path: &Path) -> Result<()> {
    save_array(paths.points(), path, "waypoints")
}

/// Save the sensitivity field `(rows, cols, splines)`.
pub fn save_field(field: &SensitivityField, path: &Path) -> Result<()> {
    save_array(field.values(), path, "spline_sensitivity")
}

/// Save a damped-solution sweep.
///
/// `.mat` files get two variables, `lambdas` (k) and `delta_m` (k x n).
/// `.npy` files get one `(k, 1 + n)` array whose first column is lambda.
pub fn save_damped_solution(solution: &DampedSolution, path: &Path) -> Result<()> {
    let lambdas = Array1::from_vec(solution.lambdas().to_vec());
    match infer_format(path)? {
        FileFormat::Npy => {
            let (k, n) = solution.coefficients().dim();
            let mut table = Array2::zeros((k, n + 1));
            table.column_mut(0).assign(&lambdas);
            table
                .slice_mut(ndarray::s![.., 1..])
                .assign(solution.coefficients());
            save_array(&table, path, "")
        }
        FileFormat::Mat => write_mat_level5(
            path,
            &[
                MatArray::from_array("lambdas", &lambdas),
                MatArray::from_array("delta_m", solution.coefficients()),
            ],
        ),
    }
}

/// Load a sweep written by [`save_damped_solution`].
pub fn load_damped_solution(path: &Path) -> Result<DampedSolution> {
    let (lambdas, coefficients) = match infer_format(path)? {
        FileFormat::Npy => {
            let table = load_matrix(path, "")?;
            let lambdas = table.column(0).to_vec();
            (lambdas, table.slice(ndarray::s![.., 1..]).to_owned())
        }
        FileFormat::Mat => {
            let lambdas = load_mat_array(path, "lambdas")?.iter().copied().collect();
            (lambdas, load_matrix(path, "delta_m")?)
        }
    };
    let solutions = coefficients.outer_iter().map(|row| row.to_owned()).collect();
    DampedSolution::new(lambdas, solutions)
}

/// One named real double array in column-major order.
struct MatArray {
    name: String,
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl MatArray {
    fn from_array<S, D>(name: &str, arr: &ArrayBase<S, D>) -> Self
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let mut dims = arr.shape().to_vec();
        // MATLAB arrays have at least two dimensions
        if dims.len() < 2 {
            dims.push(1);
        }
        // iterating the transpose yields column-major order
        let data = arr.t().iter().copied().collect();
        MatArray {
            name: name.to_string(),
            dims,
            data,
        }
    }
}

/// Minimal MAT-File Level 5 writer for real double arrays.
///
/// The `matfile` crate only reads, so the writer is hand-rolled. It writes an
/// uncompressed 128-byte header followed by one `miMATRIX` element per array:
/// array flags, dimensions, name, and real part, each padded to 8 bytes.
///
/// Reference: <https://www.mathworks.com/help/pdf_doc/matlab/matfile_format.pdf>
fn write_mat_level5(path: &Path, arrays: &[MatArray]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    // Header: 116 bytes text, 8 bytes subsystem offset, version, endian marker.
    let desc = b"MATLAB 5.0 MAT-file, created by spline-tomo";
    let mut header_text = [b' '; 116];
    let copy_len = desc.len().min(116);
    header_text[..copy_len].copy_from_slice(&desc[..copy_len]);
    w.write_all(&header_text)?;
    w.write_all(&[0u8; 8])?;
    w.write_all(&0x0100u16.to_le_bytes())?;
    w.write_all(b"IM")?;

    for arr in arrays {
        write_mat_matrix(&mut w, arr)?;
    }

    w.flush()?;
    Ok(())
}

fn padded(size: u32) -> u32 {
    size.div_ceil(8) * 8
}

fn write_padding<W: Write>(w: &mut W, size: u32) -> Result<()> {
    let pad = (padded(size) - size) as usize;
    if pad > 0 {
        w.write_all(&vec![0u8; pad])?;
    }
    Ok(())
}

fn write_mat_matrix<W: Write>(w: &mut W, arr: &MatArray) -> Result<()> {
    let flags_total: u32 = 16;
    let dims_size = (arr.dims.len() * 4) as u32;
    let name_bytes = arr.name.as_bytes();
    let name_size = name_bytes.len() as u32;
    let real_size = (arr.data.len() * 8) as u32;
    let matrix_size =
        flags_total + (8 + padded(dims_size)) + (8 + padded(name_size)) + (8 + padded(real_size));

    w.write_all(&14u32.to_le_bytes())?; // miMATRIX
    w.write_all(&matrix_size.to_le_bytes())?;

    // array flags: miUINT32, mxDOUBLE_CLASS, no flags
    w.write_all(&6u32.to_le_bytes())?;
    w.write_all(&8u32.to_le_bytes())?;
    w.write_all(&6u32.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?;

    // dimensions: miINT32
    w.write_all(&5u32.to_le_bytes())?;
    w.write_all(&dims_size.to_le_bytes())?;
    for &d in &arr.dims {
        w.write_all(&(d as i32).to_le_bytes())?;
    }
    write_padding(w, dims_size)?;

    // name: miINT8
    w.write_all(&1u32.to_le_bytes())?;
    w.write_all(&name_size.to_le_bytes())?;
    w.write_all(name_bytes)?;
    write_padding(w, name_size)?;

    // real part: miDOUBLE
    w.write_all(&9u32.to_le_bytes())?;
    w.write_all(&real_size.to_le_bytes())?;
    for &val in &arr.data {
        w.write_all(&val.to_le_bytes())?;
    }
    write_padding(w, real_size)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RayIndex;
    use ndarray::array;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("spline_tomo_{}", name))
    }

    #[test]
    fn stations_from_text() {
        let path = tmp("events.dat");
        std::fs::write(
            &path,
            "lon lat idx\n-118.0 34.0 1\n\n-117.5 33.25 2\n",
        )
        .unwrap();
        let s = load_stations(&path).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.point(1).lat, 33.25);
        assert_eq!(s.point(1).lon, -117.5);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn centers_and_measurements_from_text() {
        let path = tmp("centers.dat");
        std::fs::write(&path, "-118.0 34.0\n-117.0 35.0\n-116.0 36.0\n").unwrap();
        let c = load_centers(&path, 8).unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c.scale(), 8);
        assert_eq!(c.lats(), &[34.0, 35.0, 36.0]);
        std::fs::remove_file(&path).ok();

        let path = tmp("measure.dat");
        std::fs::write(&path, "0.5\n-1.25\n3e-2\n").unwrap();
        let d = load_measurements(&path).unwrap();
        assert_eq!(d.to_vec(), vec![0.5, -1.25, 0.03]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn parse_error_reports_line() {
        let path = tmp("bad_centers.dat");
        std::fs::write(&path, "-118.0 34.0\n-117.0 abc\n").unwrap();
        let result = load_centers(&path, 8);
        assert!(matches!(result, Err(TomoError::Parse { line: 2, .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn npy_matrix_roundtrip() {
        let g = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let dm = DesignMatrix::from_array(g.clone(), RayIndex::new(1, 2)).unwrap();
        let path = tmp("g.npy");
        save_design_matrix(&dm, &path).unwrap();
        let loaded = load_design_matrix(&path, RayIndex::new(1, 2)).unwrap();
        assert_eq!(loaded.matrix(), &g);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mat_matrix_roundtrip() {
        let g = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let path = tmp("g.mat");
        save_array(&g, &path, DESIGN_MATRIX_VAR).unwrap();
        let loaded = load_matrix(&path, DESIGN_MATRIX_VAR).unwrap();
        assert_eq!(loaded, g);
        let missing = load_matrix(&path, "H");
        assert!(matches!(
            missing,
            Err(TomoError::MatVariableNotFound { .. })
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn damped_solution_roundtrip_both_formats() {
        let sol = DampedSolution::new(
            vec![0.1, 1.0, 10.0],
            vec![array![1.0, 2.0], array![0.5, 0.25], array![0.0, -1.0]],
        )
        .unwrap();
        for name in ["dm.npy", "dm.mat"] {
            let path = tmp(name);
            save_damped_solution(&sol, &path).unwrap();
            let loaded = load_damped_solution(&path).unwrap();
            assert_eq!(loaded.lambdas(), sol.lambdas());
            assert_eq!(loaded.coefficients(), sol.coefficients());
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn mat_field_keeps_three_dimensions() {
        let values = ndarray::Array3::from_shape_fn((2, 3, 4), |(i, j, k)| {
            (i * 100 + j * 10 + k) as f64
        });
        let field = SensitivityField::from_array(values.clone());
        let path = tmp("field.mat");
        save_field(&field, &path).unwrap();
        let loaded = load_mat_array(&path, "spline_sensitivity").unwrap();
        assert_eq!(loaded.shape(), &[2, 3, 4]);
        assert_eq!(loaded[[1, 2, 3]], 123.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unsupported_format() {
        let result = infer_format(Path::new("test.xyz"));
        assert!(matches!(result, Err(TomoError::UnsupportedFileFormat(_))));
    }
}
