use super::volume::{Grid, Volume};

// ---------------------------------------------------------------------------
// Per-slice median smoothing of the structural channel
// ---------------------------------------------------------------------------

/// Row half-widths of a circular kernel: pixels with `dx² + dy² <= r² + 1`.
///
/// Entry `i` belongs to row offset `dy = i - r`. Radius 3 gives 37 pixels.
fn kernel_half_widths(radius: usize) -> Vec<usize> {
    let r2 = radius * radius + 1;
    (0..=2 * radius)
        .map(|i| {
            let dy = i.abs_diff(radius);
            let mut dx = 0;
            while (dx + 1) * (dx + 1) + dy * dy <= r2 {
                dx += 1;
            }
            dx
        })
        .collect()
}

/// Median of an odd-sized, non-empty scratch buffer.
fn window_median(window: &mut [f32]) -> f32 {
    let mid = window.len() / 2;
    let (_, m, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Apply a circular 2D median of the given radius to every slice independently.
///
/// Pixels outside the slice take the value of the nearest edge pixel, so every
/// window holds the full kernel. Radius 0 returns a copy.
pub fn median_filter_slices(volume: &Volume, radius: usize) -> Volume {
    if radius == 0 {
        return volume.clone();
    }
    let dims = volume.dims();
    let half_widths = kernel_half_widths(radius);
    let mut window = Vec::with_capacity(half_widths.iter().map(|w| 2 * w + 1).sum());
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

    Grid::from_fn(dims, volume.calibration().clone(), |x, y, z| {
        window.clear();
        for (i, &half) in half_widths.iter().enumerate() {
            let yy = clamp(y as isize + i as isize - radius as isize, dims.height);
            for dx in -(half as isize)..=half as isize {
                let xx = clamp(x as isize + dx, dims.width);
                window.push(*volume.get(xx, yy, z));
            }
        }
        window_median(&mut window)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::volume::{Calibration, Dims};

    #[test]
    fn removes_isolated_spike() {
        let dims = Dims::new(5, 5, 2);
        let vol = Volume::from_fn(dims, Calibration::default(), |x, y, z| {
            if x == 2 && y == 2 && z == 0 {
                100.0
            } else {
                1.0
            }
        });
        let out = median_filter_slices(&vol, 1);
        assert_eq!(*out.get(2, 2, 0), 1.0);
        assert!(out.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn kernel_is_circular() {
        let widths = kernel_half_widths(3);
        assert_eq!(widths, vec![1, 2, 3, 3, 3, 2, 1]);
        assert_eq!(widths.iter().map(|w| 2 * w + 1).sum::<usize>(), 37);
        assert_eq!(kernel_half_widths(1), vec![1, 1, 1]);
    }

    #[test]
    fn square_corners_do_not_vote() {
        // Around (6, 6): every pixel outside the radius-3 disk is high, plus 16
        // of the 37 inside it. A 7x7 square would see 28 of 49 high.
        let dims = Dims::new(13, 13, 1);
        let vol = Volume::from_fn(dims, Calibration::default(), |x, y, _| {
            let (dx, dy) = (x as i32 - 6, y as i32 - 6);
            let outside = dx * dx + dy * dy > 10;
            if outside || dy < 0 || (dy == 0 && dx == -3) {
                100.0
            } else {
                0.0
            }
        });
        let out = median_filter_slices(&vol, 3);
        assert_eq!(*out.get(6, 6, 0), 0.0);
    }

    #[test]
    fn edges_repeat_the_nearest_pixel() {
        // At (0, 0) the padded 3x3 window takes three of its nine entries from
        // row 1, so the high pixels there stay a minority.
        let dims = Dims::new(4, 4, 1);
        let vol = Volume::from_fn(dims, Calibration::default(), |x, y, _| {
            if y == 1 && x < 2 {
                100.0
            } else {
                0.0
            }
        });
        let out = median_filter_slices(&vol, 1);
        assert_eq!(*out.get(0, 0, 0), 0.0);
    }

    #[test]
    fn radius_zero_is_identity() {
        let dims = Dims::new(3, 2, 1);
        let vol = Volume::from_fn(dims, Calibration::default(), |x, y, _| (x + 3 * y) as f32);
        assert_eq!(median_filter_slices(&vol, 0), vol);
    }

    #[test]
    fn slices_are_filtered_independently() {
        let dims = Dims::new(3, 3, 2);
        let vol = Volume::from_fn(dims, Calibration::default(), |_, _, z| z as f32 * 10.0);
        let out = median_filter_slices(&vol, 1);
        assert_eq!(*out.get(1, 1, 0), 0.0);
        assert_eq!(*out.get(1, 1, 1), 10.0);
    }
}
