use std::path::PathBuf;

use bact_measure::data::loader::write_parquet;
use bact_measure::data::model::{SeriesGeometry, SeriesImage};
use bact_measure::data::volume::Calibration;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// A rod-shaped cell: ellipsoid in pixel units with per-channel brightness.
struct Bacterium {
    center: [f64; 3],
    radii: [f64; 3],
    /// In-plane orientation of the long axis.
    angle: f64,
    gfp: f64,
    mcherry: f64,
}

impl Bacterium {
    fn random(rng: &mut SimpleRng, width: usize, height: usize, slices: usize) -> Self {
        Bacterium {
            // Some cells are allowed to straddle the image edge.
            center: [
                rng.uniform(2.0, width as f64 - 2.0),
                rng.uniform(2.0, height as f64 - 2.0),
                rng.uniform(1.5, slices as f64 - 1.5),
            ],
            radii: [rng.uniform(4.0, 7.0), rng.uniform(1.8, 2.6), rng.uniform(1.2, 1.8)],
            angle: rng.uniform(0.0, std::f64::consts::PI),
            gfp: rng.uniform(200.0, 1200.0),
            mcherry: rng.uniform(300.0, 900.0),
        }
    }

    /// 1 at the centre, falling to 0 at the surface, negative outside.
    fn profile(&self, x: f64, y: f64, z: f64) -> f64 {
        let (dx, dy, dz) = (x - self.center[0], y - self.center[1], z - self.center[2]);
        let (sin, cos) = self.angle.sin_cos();
        let u = dx * cos + dy * sin;
        let v = -dx * sin + dy * cos;
        1.0 - ((u / self.radii[0]).powi(2) + (v / self.radii[1]).powi(2) + (dz / self.radii[2]).powi(2))
    }
}

fn generate_series(
    name: &str,
    rng: &mut SimpleRng,
    geometry: SeriesGeometry,
    cells: usize,
) -> SeriesImage {
    let SeriesGeometry {
        width,
        height,
        slices,
        ..
    } = geometry;
    let bacteria: Vec<Bacterium> = (0..cells)
        .map(|_| Bacterium::random(rng, width, height, slices))
        .collect();

    let samples = geometry.samples_per_channel();
    // Channel 1 is transmitted light, 2 mCherry (also segmented), 3 GFP.
    let mut stacks = vec![Vec::with_capacity(samples); geometry.channels];
    for z in 0..slices {
        for y in 0..height {
            for x in 0..width {
                let (mut red, mut green) = (0.0, 0.0);
                for b in &bacteria {
                    let p = b.profile(x as f64, y as f64, z as f64);
                    if p > 0.0 {
                        let weight = p.sqrt();
                        red += b.mcherry * weight;
                        green += b.gfp * weight;
                    }
                }
                stacks[0].push((1000.0 + rng.gauss(0.0, 25.0)) as f32);
                stacks[1].push((100.0 + red + rng.gauss(0.0, 12.0)).max(0.0) as f32);
                stacks[2].push((80.0 + green + rng.gauss(0.0, 15.0)).max(0.0) as f32);
            }
        }
    }

    SeriesImage {
        name: name.to_string(),
        calibration: Calibration {
            voxel_width: 0.13,
            voxel_height: 0.13,
            voxel_depth: 0.3,
            unit: "micron".to_string(),
        },
        geometry,
        stacks,
    }
}

fn main() {
    let output_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_acquisition.parquet"));

    let mut rng = SimpleRng::new(42);
    let geometry = SeriesGeometry {
        width: 96,
        height: 96,
        slices: 10,
        channels: 3,
        frames: 1,
    };

    let series = vec![
        generate_series("Position 1", &mut rng, geometry, 14),
        generate_series("Position 2", &mut rng, geometry, 9),
    ];

    write_parquet(&output_path, &series).expect("Failed to write acquisition");

    println!(
        "Wrote {} series ({}x{}x{}, {} channels) to {}",
        series.len(),
        geometry.width,
        geometry.height,
        geometry.slices,
        geometry.channels,
        output_path.display()
    );
}
