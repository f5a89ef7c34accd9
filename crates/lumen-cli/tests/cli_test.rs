use std::path::PathBuf;
use std::process::Command;

fn lumen() -> Command {
    let bin = std::env::var("CARGO_BIN_EXE_lumen").unwrap_or_else(|_| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/debug/lumen")
            .to_string_lossy()
            .to_string()
    });
    Command::new(bin)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lumen-cli-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
    dir
}

const CONFIG: &str = r##"
[[pass]]
[[pass.effect]]
kind = "color_overlay"
color = "#3366FF"
blend = "screen"
opacity = 0.5
[[pass.effect]]
kind = "vignette"
"##;

#[test]
fn fuse_json_stdout_is_pure_json() {
    let dir = scratch_dir("fuse");
    let config = dir.join("lumen.toml");
    std::fs::write(&config, CONFIG).unwrap();

    let out = lumen()
        .args(["fuse", "--json", "--config"])
        .arg(&config)
        .output()
        .expect("failed to spawn lumen fuse");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let meta: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout is not JSON");
    assert_eq!(meta["label"], "color_overlay+vignette");
    assert_eq!(meta["stages"].as_array().map(Vec::len), Some(2));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn lut_writes_both_textures() {
    let dir = scratch_dir("lut");
    let status = lumen().arg("lut").arg(&dir).status().expect("failed to spawn lumen lut");
    assert!(status.success());
    assert!(dir.join("smaa-search.png").exists());
    assert!(dir.join("smaa-area.png").exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn unknown_blend_fails_setup() {
    let dir = scratch_dir("bad");
    let config = dir.join("lumen.toml");
    std::fs::write(&config, "[[pass]]\n[[pass.effect]]\nkind = \"vignette\"\nblend = \"plasma\"\n").unwrap();
    let out = lumen().args(["fuse", "--config"]).arg(&config).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("plasma"));
    std::fs::remove_dir_all(&dir).ok();
}
