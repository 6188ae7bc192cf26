use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Calibration – physical size of one voxel
// ---------------------------------------------------------------------------

/// Per-axis voxel size in a physical unit (typically micrometers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub voxel_width: f64,
    pub voxel_height: f64,
    pub voxel_depth: f64,
    /// Unit label, e.g. `"micron"`.
    pub unit: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            voxel_width: 1.0,
            voxel_height: 1.0,
            voxel_depth: 1.0,
            unit: "pixel".to_string(),
        }
    }
}

impl Calibration {
    /// Physical volume of one voxel, in unit³.
    pub fn voxel_volume(&self) -> f64 {
        self.voxel_width * self.voxel_height * self.voxel_depth
    }

    /// Reject sizes that would make physical volumes meaningless.
    pub fn validate(&self) -> Result<()> {
        for (axis, size) in [
            ("width", self.voxel_width),
            ("height", self.voxel_height),
            ("depth", self.voxel_depth),
        ] {
            if !size.is_finite() || size <= 0.0 {
                bail!("voxel {axis} must be a positive finite number, got {size}");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dims – grid extent
// ---------------------------------------------------------------------------

/// Extent of a 3D grid. Samples are stored x-fastest, then y, then z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dims {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let plane = self.width * self.height;
        let z = index / plane;
        let rem = index % plane;
        [rem % self.width, rem / self.width, z]
    }
}

// ---------------------------------------------------------------------------
// Grid – calibrated 3D samples
// ---------------------------------------------------------------------------

/// A calibrated 3D grid of samples. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    dims: Dims,
    calibration: Calibration,
    data: Vec<T>,
}

/// Intensity volume of one channel.
pub type Volume = Grid<f32>;

/// Segmentation output: 0 is background, every positive value one candidate.
pub type LabeledVolume = Grid<u32>;

impl<T> Grid<T> {
    pub fn new(dims: Dims, calibration: Calibration, data: Vec<T>) -> Result<Self> {
        let grid = Self {
            dims,
            calibration,
            data,
        };
        grid.check_shape()?;
        Ok(grid)
    }

    /// Build a grid by evaluating `f(x, y, z)` at every voxel.
    pub fn from_fn(
        dims: Dims,
        calibration: Calibration,
        mut f: impl FnMut(usize, usize, usize) -> T,
    ) -> Self {
        let mut data = Vec::with_capacity(dims.len());
        for z in 0..dims.depth {
            for y in 0..dims.height {
                for x in 0..dims.width {
                    data.push(f(x, y, z));
                }
            }
        }
        Self {
            dims,
            calibration,
            data,
        }
    }

    /// Verify that the sample count matches the extent.
    ///
    /// Grids arriving through serde bypass [`Grid::new`], so readers call this.
    pub fn check_shape(&self) -> Result<()> {
        if self.data.len() != self.dims.len() {
            bail!(
                "grid of {}x{}x{} expects {} samples, got {}",
                self.dims.width,
                self.dims.height,
                self.dims.depth,
                self.dims.len(),
                self.data.len()
            );
        }
        Ok(())
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> &T {
        &self.data[self.dims.index(x, y, z)]
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub(crate) fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_coords_agree() {
        let dims = Dims::new(4, 3, 2);
        for i in 0..dims.len() {
            let [x, y, z] = dims.coords(i);
            assert_eq!(dims.index(x, y, z), i);
        }
        assert_eq!(dims.index(1, 2, 1), 12 + 8 + 1);
    }

    #[test]
    fn new_rejects_wrong_sample_count() {
        let err = Grid::new(Dims::new(2, 2, 2), Calibration::default(), vec![0u32; 7]);
        assert!(err.is_err());
    }

    #[test]
    fn calibration_rejects_zero_voxel() {
        let cal = Calibration {
            voxel_depth: 0.0,
            ..Calibration::default()
        };
        assert!(cal.validate().is_err());
        assert!(Calibration::default().validate().is_ok());
    }

    #[test]
    fn voxel_volume_multiplies_axes() {
        let cal = Calibration {
            voxel_width: 0.5,
            voxel_height: 0.5,
            voxel_depth: 2.0,
            unit: "micron".into(),
        };
        assert!((cal.voxel_volume() - 0.5).abs() < 1e-12);
    }
}
