// Reproducibility tests.
//
// The converter must produce byte-identical files for identical inputs,
// independent of where the input lives.

use std::path::PathBuf;
use std::process::Command;

use g2csd::encode::PatchBuilder;
use g2csd::patch::{Area, CableColor, CableType};

fn g2csd_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_g2csd"))
}

fn patch() -> Vec<u8> {
    PatchBuilder::new()
        .description(0, 4, false)
        .modules(Area::Voice, &[(1, 1), (7, 2), (92, 3), (4, 4)])
        .modules(Area::Fx, &[(127, 1), (3, 2)])
        .cables(
            Area::Voice,
            &[
                (CableType::OutToIn, CableColor::Blue, (1, 0), (2, 0)),
                (CableType::OutToIn, CableColor::Red, (2, 0), (3, 2)),
                (CableType::OutToIn, CableColor::Blue, (1, 0), (3, 0)),
                (CableType::OutToIn, CableColor::Red, (3, 0), (4, 0)),
                (CableType::InToIn, CableColor::White, (4, 0), (4, 1)),
            ],
        )
        .params(Area::Voice, 2, &[64, 64, 0, 0, 2, 0, 1])
        .params(Area::Voice, 3, &[80, 127, 0, 1, 1, 0])
        .params(Area::Fx, 1, &[64, 1])
        .build()
}

fn convert_in(dir_name: &str) -> Vec<u8> {
    let dir = std::env::temp_dir().join(format!(
        "g2csd_repro_{}_{}",
        std::process::id(),
        dir_name
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("voice.pch2");
    std::fs::write(&input, patch()).unwrap();

    let output = Command::new(g2csd_binary())
        .arg(&input)
        .env_remove("G2CSD_TEMPLATES")
        .output()
        .expect("failed to run g2csd");
    assert!(
        output.status.success(),
        "g2csd failed\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    std::fs::read(dir.join("voice.pch2.csd")).unwrap()
}

#[test]
fn repeated_conversion_is_byte_identical() {
    let first = convert_in("a");
    let second = convert_in("a");
    assert_eq!(first, second);
}

#[test]
fn output_does_not_depend_on_input_directory() {
    let a = convert_in("left");
    let b = convert_in("right");
    assert_eq!(a, b);
    let text = String::from_utf8(a).unwrap();
    assert!(text.contains("; source: voice.pch2\n"));
}

#[test]
fn provenance_hash_tracks_input_bytes() {
    let bytes = patch();
    let p = g2csd::pipeline::Provenance::of(&bytes);
    let text = String::from_utf8(convert_in("hash")).unwrap();
    assert!(text.contains(&format!("; source sha256: {}\n", p.source_hash_hex())));
}
