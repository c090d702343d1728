//! Whole-pipeline tests: source text in, published bundle out.

use core_config::Config;
use core_package::{AssetGeometry, AssetInfo, AssetProbe, DirBundler, ProbeError};
use core_pipeline::{
    CompileFailure, CompileRequest, Compiler, NamedAsset, SpriteSource, single_sprite_request,
};
use std::fs;

/// Deterministic stand-in for the real asset prober: classifies by a magic
/// first byte and "hashes" by payload length.
struct StubProbe;

impl AssetProbe for StubProbe {
    fn probe(&self, name: &str, data: &[u8]) -> Result<AssetInfo, ProbeError> {
        match data.first() {
            Some(b'P') => Ok(AssetInfo {
                content_hash: format!("img{:04}", data.len()),
                extension: "png".into(),
                geometry: AssetGeometry::Image {
                    center_x: 2.0,
                    center_y: 2.0,
                },
            }),
            Some(b'R') => Ok(AssetInfo {
                content_hash: format!("snd{:04}", data.len()),
                extension: "wav".into(),
                geometry: AssetGeometry::Audio {
                    sample_count: 441,
                    rate: 44100,
                },
            }),
            _ => Err(ProbeError {
                name: name.to_string(),
                reason: "unrecognised payload".into(),
            }),
        }
    }
}

fn compile(request: &CompileRequest) -> (tempfile::TempDir, anyhow::Result<core_pipeline::CompileOutcome>) {
    let out = tempfile::tempdir().unwrap();
    let compiler =
        Compiler::from_config(&Config::default(), &StubProbe, &DirBundler, out.path()).unwrap();
    let outcome = compiler.compile(request);
    (out, outcome)
}

fn project_json(bundle: &std::path::Path) -> serde_json::Value {
    let text = fs::read_to_string(bundle.join("project.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn empty_script_compiles_to_stage_only_project() {
    let (_out, outcome) = compile(&single_sprite_request("S1", ""));
    let outcome = outcome.unwrap();
    let value = project_json(&outcome.bundle_path);
    assert_eq!(value["targets"].as_array().unwrap().len(), 2);
    assert_eq!(value["targets"][0]["isStage"], true);
    assert_eq!(
        value["targets"][1]["blocks"].as_object().unwrap().len(),
        0
    );
    assert_eq!(value["monitors"].as_array().unwrap().len(), 0);
}

#[test]
fn bundle_contains_exactly_the_manifest_files() {
    let request = CompileRequest {
        sprites: vec![(
            "S1".to_string(),
            SpriteSource {
                script: "events.onflag() {\nmotion.move(10)\n}".into(),
                costumes: vec![NamedAsset {
                    name: "Smile".into(),
                    data: b"P-fake-image".to_vec(),
                }],
                sounds: vec![NamedAsset {
                    name: "Pop".into(),
                    data: b"R-fake-audio".to_vec(),
                }],
            },
        )],
    };
    let (_out, outcome) = compile(&request);
    let outcome = outcome.unwrap();
    let bundle = &outcome.bundle_path;

    let value = project_json(bundle);
    let costume = &value["targets"][1]["costumes"][0];
    assert_eq!(costume["name"], "Smile");
    assert_eq!(costume["dataFormat"], "png");
    let md5ext = costume["md5ext"].as_str().unwrap();
    assert!(bundle.join(md5ext).exists(), "costume file beside project.json");

    let sound = &value["targets"][1]["sounds"][0];
    assert_eq!(sound["rate"], 44100);
    assert_eq!(sound["sampleCount"], 441);
    assert!(bundle.join(sound["md5ext"].as_str().unwrap()).exists());

    assert!(bundle.join(format!("log_{}.txt", outcome.id)).exists());
    assert!(bundle.join(format!("hierarchy_{}.txt", outcome.id)).exists());
}

#[test]
fn pen_extension_included_only_when_used() {
    let (_out, outcome) = compile(&single_sprite_request("S1", "pen.down()"));
    let value = project_json(&outcome.unwrap().bundle_path);
    assert_eq!(value["extensions"][0], "pen");

    let (_out, outcome) = compile(&single_sprite_request("S1", "motion.move(1)"));
    let value = project_json(&outcome.unwrap().bundle_path);
    assert_eq!(value["extensions"].as_array().unwrap().len(), 0);
}

#[test]
fn stage_sprite_takes_root_role() {
    let request = CompileRequest {
        sprites: vec![
            (
                "Stage".to_string(),
                SpriteSource {
                    script: "events.onbgswitch(\"backdrop1\") {\nlooks.backdrop.next()\n}".into(),
                    ..Default::default()
                },
            ),
            (
                "S1".to_string(),
                SpriteSource {
                    script: "var.set(\"x\", 1)".into(),
                    ..Default::default()
                },
            ),
        ],
    };
    let (_out, outcome) = compile(&request);
    let value = project_json(&outcome.unwrap().bundle_path);
    let targets = value["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0]["isStage"], true);
    assert!(!targets[0]["blocks"].as_object().unwrap().is_empty());
    // Variables declared anywhere live on the stage.
    assert_eq!(targets[0]["variables"].as_object().unwrap().len(), 1);
    assert_eq!(targets[1]["variables"].as_object().unwrap().len(), 0);
}

#[test]
fn unknown_command_aborts_with_logged_error() {
    let (_out, outcome) = compile(&single_sprite_request("S1", "foo.bar()"));
    let err = outcome.unwrap_err();
    let failure = err.downcast_ref::<CompileFailure>().expect("compile failure");
    assert_eq!(failure.failure.errors.len(), 1);
    assert!(failure.failure.errors[0].message.contains("foo.bar"));

    let log_path = failure.log_path.as_ref().expect("failure log published");
    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("foo.bar"));
    assert!(log.contains("[1]"), "log cites the source line");
}

#[test]
fn lex_errors_stop_the_pipeline_before_parsing() {
    let (_out, outcome) = compile(&single_sprite_request("S1", "looks.say(\"unterminated"));
    let err = outcome.unwrap_err();
    let failure = err.downcast_ref::<CompileFailure>().unwrap();
    assert_eq!(failure.failure.phase, core_report::Phase::Lex);
}

#[test]
fn unsupported_asset_fails_packaging() {
    let request = CompileRequest {
        sprites: vec![(
            "S1".to_string(),
            SpriteSource {
                script: String::new(),
                costumes: vec![NamedAsset {
                    name: "Bad".into(),
                    data: b"Zzz".to_vec(),
                }],
                sounds: Vec::new(),
            },
        )],
    };
    let (_out, outcome) = compile(&request);
    let err = outcome.unwrap_err();
    let failure = err.downcast_ref::<CompileFailure>().unwrap();
    assert_eq!(failure.failure.phase, core_report::Phase::Package);
    assert_eq!(
        failure.failure.errors[0].kind,
        core_report::ErrorKind::UnsupportedAsset
    );
}

#[test]
fn forward_referenced_procedure_round_trips_through_the_bundle() {
    let script = "fn.F(n:1)\nfunc:F(warp=false, n[exp]) {\nlooks.say(a.n)\n}";
    let (_out, outcome) = compile(&single_sprite_request("S1", script));
    let value = project_json(&outcome.unwrap().bundle_path);
    let blocks = value["targets"][1]["blocks"].as_object().unwrap();
    let call = blocks
        .values()
        .find(|b| b["opcode"] == "procedures_call")
        .expect("call block present");
    assert_eq!(call["mutation"]["proccode"], "F %s");
}

#[test]
fn hierarchy_file_reflects_the_emitted_tree() {
    let (_out, outcome) =
        compile(&single_sprite_request("S1", "events.onflag() {\nmotion.move(10)\n}"));
    let outcome = outcome.unwrap();
    let tree = fs::read_to_string(
        outcome
            .bundle_path
            .join(format!("hierarchy_{}.txt", outcome.id)),
    )
    .unwrap();
    assert!(tree.contains("S1 >"));
    assert!(tree.contains("event_whenflagclicked"));
    assert!(tree.contains("STEPS [Number]: 10"));
}
