use std::path::PathBuf;

use anyhow::{Context, Result};

use mocap_vae::data::model::{JointObservation, JointTable};
use mocap_vae::data::skeleton::SkeletonConfig;
use mocap_vae::data::writer::write_file;

const FRAMES: i64 = 600;

/// Deterministic SplitMix64 stream with Marsaglia polar sampling, so the
/// sample file is identical on every run.
struct Jitter {
    state: u64,
    spare: Option<f64>,
}

impl Jitter {
    fn seeded(seed: u64) -> Self {
        Self { state: seed, spare: None }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    fn normal(&mut self, std_dev: f64) -> f64 {
        if let Some(z) = self.spare.take() {
            return z * std_dev;
        }
        loop {
            let u = 2.0 * self.uniform() - 1.0;
            let v = 2.0 * self.uniform() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let scale = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * scale);
                return u * scale * std_dev;
            }
        }
    }
}

/// Resting offset of each joint from the hip, in enclosure units.
fn rest_offset(joint: &str) -> [f64; 3] {
    match joint {
        "nose" => [0.35, 0.30, 0.0],
        "head" => [0.28, 0.32, 0.0],
        "neck" => [0.20, 0.25, 0.0],
        "rshoulder" => [0.15, 0.18, -0.08],
        "rhand" => [0.22, -0.05, -0.10],
        "lshoulder" => [0.15, 0.18, 0.08],
        "lhand" => [0.22, -0.05, 0.10],
        "rknee" => [-0.05, -0.12, -0.07],
        "rfoot" => [-0.02, -0.25, -0.08],
        "lknee" => [-0.05, -0.12, 0.07],
        "lfoot" => [-0.02, -0.25, 0.08],
        "tail" => [-0.30, 0.05, 0.0],
        _ => [0.0; 3],
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let output: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/joints/sample_data.parquet"));

    let skeleton = SkeletonConfig::default();
    let mut rng = Jitter::seeded(42);

    // The animal wanders around the enclosure; joints jitter around a rest pose.
    let mut hip = [0.0, 1.0, 0.0];
    let mut rows = Vec::with_capacity(FRAMES as usize * skeleton.joints.len());

    for frame in 0..FRAMES {
        for axis in &mut hip {
            *axis = (*axis + rng.normal(0.02)).clamp(-3.5, 3.5);
        }
        // Roughly one frame in fifty carries a tracking glitch on one joint.
        let glitch = (rng.uniform() < 0.02).then(|| (rng.next_u64() as usize) % skeleton.joints.len());

        for (j, joint) in skeleton.joints.iter().enumerate() {
            let offset = rest_offset(joint);
            let mut p: [f64; 3] = std::array::from_fn(|a| hip[a] + offset[a] + rng.normal(0.01));
            if glitch == Some(j) && !skeleton.is_reference(joint) {
                p[0] += 40.0;
            }
            rows.push(JointObservation::new(frame, joint.as_str(), p[0], p[1], p[2]));
        }
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let table = JointTable::from_rows(rows);
    write_file(&table, &output)?;

    println!(
        "Wrote {} frames ({} joints each) to {}",
        FRAMES,
        skeleton.joints.len(),
        output.display()
    );
    Ok(())
}
