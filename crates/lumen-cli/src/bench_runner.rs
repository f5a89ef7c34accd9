use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use lumen_core::Surface;
use lumen_render::{build_passes, Composer, FrameInputs};

use super::{backend_for, load_config};

const PROFILES: [(&str, u32, u32); 3] = [("360p", 640, 360), ("720p", 1280, 720), ("1080p", 1920, 1080)];

pub fn run_benchmark(
    config_path: PathBuf,
    frames: u32,
    baseline_path: PathBuf,
    update_baseline: bool,
) -> Result<()> {
    println!("⚡ Lumen Pipeline Benchmark");
    println!("   Config: {}", config_path.display());

    let (config, bundle) = load_config(&config_path)?;
    let backend = backend_for(&config.render.backend)?;

    println!("\n▶ Running {} profiles, {} frames each...\n", PROFILES.len(), frames);

    let mut results = Vec::new();
    for (name, w, h) in PROFILES {
        print!("   Measuring {} ({}x{}) ... ", name, w, h);
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut composer = Composer::new(w, h).with_backend(backend.clone());
        for pass in build_passes(&config, &bundle)? {
            composer.add_pass(pass)?;
        }
        let frame = test_card(w, h);

        let start = Instant::now();
        for index in 0..frames {
            let inputs = FrameInputs::new(&frame).at(index as f32 / 60.0, index);
            composer
                .render(&inputs)
                .with_context(|| format!("frame {index} of profile {name} failed"))?;
        }
        let elapsed = start.elapsed();
        let fps = frames as f64 / elapsed.as_secs_f64();
        println!("{:.1}ms ({:.0} fps)", elapsed.as_secs_f64() * 1000.0, fps);

        results.push(BenchResult {
            profile: name.to_string(),
            width: w,
            height: h,
            frames,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            fps,
        });
    }

    report(&results, &baseline_path, update_baseline)
}

/// Hard diagonal edges over a gradient, so every pass has work to do.
fn test_card(width: u32, height: u32) -> Surface {
    Surface::from_fn(width, height, |x, y| {
        let g = x as f32 / width.max(1) as f32;
        if (x + y / 2) / 32 % 2 == 0 {
            [g, 0.8, 0.3, 1.0]
        } else {
            [0.1, g * 0.5, 0.9, 1.0]
        }
    })
}

fn report(results: &[BenchResult], baseline_path: &Path, update_baseline: bool) -> Result<()> {
    println!("\n📊 Benchmark Report:");
    println!("{:<10} | {:<10} | {:<10} | {:<10} | {}", "Profile", "Resolution", "Render (ms)", "FPS", "Regression");
    println!("{:-<10}-+-{:-<10}-+-{:-<10}-+-{:-<10}-+-{:-<10}", "", "", "", "", "");

    let mut baselines = std::collections::HashMap::new();
    if let Ok(raw) = std::fs::read_to_string(baseline_path) {
        match serde_json::from_str::<Vec<BenchResult>>(&raw) {
            Ok(parsed) => {
                for res in parsed {
                    baselines.insert(res.key(), res);
                }
            }
            Err(e) => tracing::warn!(path = %baseline_path.display(), "ignoring unreadable baseline: {e}"),
        }
    }

    let mut failed = false;
    for res in results {
        let mut reg_str = String::from("-");
        if let Some(baseline) = baselines.get(&res.key()) {
            let percent = (res.duration_ms - baseline.duration_ms) / baseline.duration_ms * 100.0;
            if percent > 5.0 {
                reg_str = format!("❌ +{:.1}%", percent);
                failed = true;
            } else if percent < -5.0 {
                reg_str = format!("✅ {:.1}%", percent);
            } else {
                reg_str = format!("➖ {:.1}%", percent);
            }
        }
        println!(
            "{:<10} | {:>4}x{:<4}  | {:>10.1} | {:>10.0} | {}",
            res.profile, res.width, res.height, res.duration_ms, res.fps, reg_str
        );
    }
    println!();

    if update_baseline {
        if let Some(parent) = baseline_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(baseline_path, serde_json::to_string_pretty(results)?)?;
        println!("📸 Updated baseline at {}", baseline_path.display());
    } else if failed {
        anyhow::bail!("Performance regression detected. See report above.");
    }
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct BenchResult {
    profile: String,
    width: u32,
    height: u32,
    frames: u32,
    duration_ms: f64,
    fps: f64,
}

impl BenchResult {
    fn key(&self) -> String {
        format!("{}@{}x{}", self.profile, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_has_edges() {
        let card = test_card(64, 8);
        assert_ne!(card.at(0, 0), card.at(40, 0));
    }

    #[test]
    fn test_regression_fails_without_update() {
        let dir = std::env::temp_dir().join(format!("lumen-bench-{}", std::process::id()));
        let path = dir.join("baseline.json");
        let fast = BenchResult {
            profile: "360p".into(),
            width: 640,
            height: 360,
            frames: 10,
            duration_ms: 10.0,
            fps: 1000.0,
        };
        report(&[fast.clone()], &path, true).unwrap();

        let slow = BenchResult { duration_ms: 20.0, ..fast };
        assert!(report(&[slow.clone()], &path, false).is_err());
        report(&[slow], &path, true).unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
