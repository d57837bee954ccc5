//! In-memory datacube representation and metacube assembly.

use crate::error::DatacubeError;
use crate::models::Collection;

use ndarray::{s, Array4};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// A multi-dimensional array of observations indexed by time, band and space.
///
/// Values are laid out as `[time, band, y, x]`. Masked and unobserved cells are NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct Datacube {
    /// Observation timestamps, ascending
    pub times: Vec<OffsetDateTime>,
    /// Band labels, in requested order
    pub bands: Vec<String>,
    /// Northing coordinate of each row
    pub y: Vec<f64>,
    /// Easting coordinate of each column
    pub x: Vec<f64>,
    /// Observation values
    pub values: Array4<f32>,
}

impl Datacube {
    /// Return a new Datacube.
    ///
    /// Fails if the value shape does not match the coordinate lengths.
    pub fn new(
        times: Vec<OffsetDateTime>,
        bands: Vec<String>,
        y: Vec<f64>,
        x: Vec<f64>,
        values: Array4<f32>,
    ) -> Result<Self, DatacubeError> {
        if values.dim() != (times.len(), bands.len(), y.len(), x.len()) {
            return Err(DatacubeError::CubeShapeMismatch);
        }
        Ok(Datacube {
            times,
            bands,
            y,
            x,
            values,
        })
    }
}

/// Merge per-collection datacubes into a single metacube on a shared coordinate system.
///
/// All inputs must share the same x/y grid. The time axis of the result is the sorted union of
/// the input time axes and the band axis is the concatenation of the input bands, each prefixed
/// with its collection identifier. Cells a sensor did not observe are NaN.
pub fn merge(cubes: Vec<(Datacube, Collection)>) -> Result<Datacube, DatacubeError> {
    let (first, _) = cubes.first().ok_or(DatacubeError::MergeEmpty)?;
    let x = first.x.clone();
    let y = first.y.clone();
    if cubes.iter().any(|(cube, _)| cube.x != x || cube.y != y) {
        return Err(DatacubeError::GridMismatch);
    }

    let times: Vec<OffsetDateTime> = cubes
        .iter()
        .flat_map(|(cube, _)| cube.times.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let bands: Vec<String> = cubes
        .iter()
        .flat_map(|(cube, collection)| {
            cube.bands
                .iter()
                .map(move |band| format!("{}:{}", collection, band))
        })
        .collect();

    let mut values = Array4::<f32>::from_elem((times.len(), bands.len(), y.len(), x.len()), f32::NAN);
    let mut band_offset = 0;
    for (cube, _) in &cubes {
        for (index, timestamp) in cube.times.iter().enumerate() {
            let aligned = times
                .binary_search(timestamp)
                .expect("merged time axis contains every input time");
            values
                .slice_mut(s![
                    aligned,
                    band_offset..band_offset + cube.bands.len(),
                    ..,
                    ..
                ])
                .assign(&cube.values.slice(s![index, .., .., ..]));
        }
        band_offset += cube.bands.len();
    }

    Datacube::new(times, bands, y, x, values)
}
