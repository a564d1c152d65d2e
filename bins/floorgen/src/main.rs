//! AI-assisted analog floorplanning driver.
//!
//! Reads a SPICE netlist, asks Gemini for an ALIGN-ready rewrite and
//! placement constraints, runs ALIGN, reviews the resulting symmetry pairs,
//! renders an annotated floorplan, and collects everything into a versioned
//! results directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use align::{FlowMode, Pdk, PlaceParams, PlacementArtifact, PortLocation};
use constraints::{ConstraintSet, SymmetricPair, SymmetryLimit};
use gemini::{GeminiClient, InstanceContext, Synthesizer, Validator};
use netlist::writer::netlist_to_string;
use netlist::{Ast, Elem, Parser, reference_sizing};
use viz::RenderInput;

mod config;
mod store;

use config::Config;
use store::RunStore;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
    run(Args::parse())
}

/// Arguments to the floorgen pipeline.
#[derive(ClapParser)]
#[command(
    version,
    about,
    long_about = "Generate and evaluate an analog floorplan for a SPICE netlist"
)]
struct Args {
    /// The path to the input SPICE netlist.
    netlist: PathBuf,
    /// How much physical work to ask of the placer.
    #[arg(short, long, value_enum, default_value_t = Mode::Floorplan)]
    mode: Mode,
    /// The PDK to place against.
    #[arg(short, long, value_enum, default_value_t = PdkChoice::Sky130)]
    pdk: PdkChoice,
    /// The root directory for run workspaces and collected results.
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
    /// The path to the configuration file.
    ///
    /// If unspecified, `floorgen.toml` in the working directory is used
    /// when present.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The largest device count for which symmetry constraints are kept.
    #[arg(long)]
    symmetry_limit: Option<usize>,
    /// The Gemini model to use.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
enum Mode {
    /// Placement only; routing disabled.
    Floorplan,
    /// Full place and route.
    Pnr,
}

impl From<Mode> for FlowMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Floorplan => FlowMode::Floorplan,
            Mode::Pnr => FlowMode::Pnr,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
enum PdkChoice {
    /// The bundled mock PDK.
    Mock,
    /// The sky130 PDK.
    Sky130,
}

impl From<PdkChoice> for Pdk {
    fn from(pdk: PdkChoice) -> Self {
        match pdk {
            PdkChoice::Mock => Pdk::Mock,
            PdkChoice::Sky130 => Pdk::Sky130,
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let mode = FlowMode::from(args.mode);

    let raw_spice = fs::read_to_string(&args.netlist)
        .with_context(|| format!("failed to read netlist {:?}", args.netlist))?;
    let parsed = Parser::parse_file(&args.netlist)
        .with_context(|| format!("failed to parse netlist {:?}", args.netlist))?;
    let circuit = parsed.name.to_lowercase();
    let design = parsed.name.to_uppercase();
    println!("input netlist: {:?}", args.netlist);
    println!("design: {design} ({} devices)", parsed.ast.device_count());

    let client = match args.model.as_deref() {
        Some(model) => GeminiClient::with_model(config.api_key()?, model),
        None => GeminiClient::new(config.api_key()?),
    };

    // One model call rewrites the netlist and proposes constraints.
    let synthesis = Synthesizer::new(&client)
        .synthesize(&design, &raw_spice)
        .context("constraint synthesis failed")?;
    let mut generated = Parser::parse(synthesis.spice.clone())
        .context("generated SPICE did not parse")?
        .ast;
    reference_sizing::apply(&mut generated);

    let instance_names = generated.align_instance_names();
    let mut constraint_set =
        ConstraintSet::from_raw(&synthesis.constraints, Some(&instance_names));
    let limit = args
        .symmetry_limit
        .map(SymmetryLimit::new)
        .unwrap_or_default();
    if limit.apply(&mut constraint_set, generated.device_count()) {
        println!("symmetry constraints dropped: device count exceeds {}", limit.max_devices);
    }

    let store = RunStore::new(&args.out);
    let workspace = store.create_workspace(&circuit, mode.suffix())?;
    let spice_path = workspace.input_dir.join(format!("{circuit}.sp"));
    let const_path = workspace.input_dir.join(format!("{circuit}.const.json"));
    fs::write(&spice_path, netlist_to_string(&generated))
        .with_context(|| format!("failed to write {spice_path:?}"))?;
    fs::write(&const_path, constraint_set.to_json()?)
        .with_context(|| format!("failed to write {const_path:?}"))?;

    let pdk_dir = config.pdk_dir(args.pdk.into())?;
    let params = PlaceParams {
        design_name: &design,
        input_dir: &workspace.input_dir,
        work_dir: &workspace.dir,
        pdk_dir: &pdk_dir,
        mode,
    };
    align::run_place(&config.align_exec(), &params).context("ALIGN run failed")?;
    let outputs = align::collect_outputs(&params)?;

    let mut to_collect = vec![spice_path, const_path];
    to_collect.extend(outputs.iter().cloned());

    if mode == FlowMode::Floorplan {
        let png = review_floorplan(
            &client,
            &design,
            &generated,
            &constraint_set,
            &outputs,
            &workspace.dir.join(format!("{circuit}_floorplan.png")),
        )?;
        to_collect.push(png);
    }

    let collected = store.collect(&circuit, &to_collect)?;
    println!("collected {} files:", collected.len());
    for path in &collected {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Validates the placed symmetry pairs and renders the annotated floorplan.
///
/// Returns the rendered PNG path.
fn review_floorplan(
    client: &GeminiClient,
    design: &str,
    generated: &Ast,
    constraint_set: &ConstraintSet,
    outputs: &[PathBuf],
    png: &Path,
) -> anyhow::Result<PathBuf> {
    let artifact_path = outputs
        .iter()
        .find(|p| has_suffix(p, "scaled_placement_verilog.json"))
        .or_else(|| outputs.iter().find(|p| has_suffix(p, ".json")))
        .context("ALIGN produced no placement artifact")?;
    let artifact = PlacementArtifact::from_file(artifact_path)?;
    let ports: Vec<PortLocation> = match outputs.iter().find(|p| has_suffix(p, ".pl")) {
        Some(path) => align::artifact::parse_pl_file(path)?,
        None => Vec::new(),
    };

    let kinds: HashMap<_, _> = generated
        .devices()
        .map(|m| (format!("X_{}", m.name.to_uppercase()), m.kind))
        .collect();
    let instances: Vec<InstanceContext> = artifact
        .top()
        .instances
        .iter()
        .map(|inst| InstanceContext {
            name: inst.instance_name.clone(),
            template: inst.abstract_template_name.clone(),
            nets: inst.fa_map.iter().map(|e| e.actual.clone()).collect(),
        })
        .collect();
    let port_names: Vec<String> = generated
        .elems
        .iter()
        .find_map(|elem| match elem {
            Elem::Subckt(s) => Some(s.ports.iter().map(|p| p.to_string()).collect()),
            Elem::Component(_) => None,
        })
        .unwrap_or_default();

    let pairs = review_pairs(&artifact, &constraint_set.pairs);
    let report = Validator::new(client).validate(design, &pairs, &kinds, &instances, &port_names);
    for (i, verdict) in report.verdicts.iter().enumerate() {
        let badge = if verdict.valid { "ok" } else { "INVALID" };
        println!(
            "P{} {} [{badge}] {}",
            i + 1,
            verdict.pair,
            verdict.explanation
        );
    }
    if !report.summary.is_empty() {
        println!("summary: {}", report.summary);
    }
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }

    viz::render_floorplan(
        &RenderInput {
            design,
            artifact: &artifact,
            ports: &ports,
            kinds: &kinds,
            report: &report,
            mode: FlowMode::Floorplan,
        },
        png,
    )?;
    Ok(png.to_path_buf())
}

/// The symmetry pairs to review: the ones ALIGN embedded into the placement
/// artifact, since those reflect what was actually placed. Falls back to
/// the sanitized request when the artifact carries none.
fn review_pairs(artifact: &PlacementArtifact, requested: &[SymmetricPair]) -> Vec<SymmetricPair> {
    let placed = artifact.symmetric_pairs();
    if placed.is_empty() {
        requested.to_vec()
    } else {
        placed
    }
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(constraints: &str) -> PlacementArtifact {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("placement.json");
        fs::write(
            &path,
            format!(
                r#"{{
                    "modules": [{{
                        "abstract_name": "OTA5",
                        "bbox": [0, 0, 4480, 4704],
                        "instances": [],
                        "constraints": {constraints}
                    }}],
                    "leaves": []
                }}"#
            ),
        )
        .unwrap();
        PlacementArtifact::from_file(&path).unwrap()
    }

    #[test]
    fn placed_pairs_take_precedence_over_requested() {
        let artifact = artifact(
            r#"[{"constraint": "SymmetricBlocks", "direction": "V",
                "pairs": [["X_MN0", "X_MN1"]]}]"#,
        );
        let requested = vec![SymmetricPair::new("mn2", "mn3")];
        assert_eq!(
            review_pairs(&artifact, &requested),
            vec![SymmetricPair::new("X_MN0", "X_MN1")]
        );
    }

    #[test]
    fn requested_pairs_reviewed_when_artifact_has_none() {
        let artifact = artifact("[]");
        let requested = vec![SymmetricPair::new("mn0", "mn1")];
        assert_eq!(review_pairs(&artifact, &requested), requested);
    }
}
