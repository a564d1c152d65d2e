//! Out-of-process driver for the ALIGN analog place-and-route engine.
//!
//! ALIGN does the actual placement and routing; this crate builds its
//! command line, captures its output, surfaces its failures, and parses the
//! placement artifacts it leaves behind.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

pub mod artifact;
pub mod error;

pub use artifact::{PlacementArtifact, PortLocation, Rect};
pub use error::{Error, Result};

/// How much physical work ALIGN is asked to do.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlowMode {
    /// Placement only; routing is disabled (`--router_mode no_op`).
    Floorplan,
    /// Full placement and routing, producing a physical layout.
    Pnr,
}

impl FlowMode {
    /// The suffix used in run directory names.
    pub fn suffix(&self) -> &'static str {
        match self {
            FlowMode::Floorplan => "floorplan",
            FlowMode::Pnr => "pnr",
        }
    }

    /// The output file extensions this mode produces.
    pub fn output_extensions(&self) -> &'static [&'static str] {
        match self {
            FlowMode::Floorplan => &[".json", ".plt", ".pl"],
            FlowMode::Pnr => &[".gds", ".lef", ".python.gds"],
        }
    }
}

impl std::fmt::Display for FlowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowMode::Floorplan => write!(f, "floorplanning only"),
            FlowMode::Pnr => write!(f, "full place and route"),
        }
    }
}

/// The process design kit ALIGN places against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Pdk {
    /// The bundled mock PDK; no physical rule enforcement.
    Mock,
    /// The sky130 PDK; enforces isolation and layer rules.
    Sky130,
}

impl Pdk {
    /// The configuration key naming this kit's directory.
    pub fn name(&self) -> &'static str {
        match self {
            Pdk::Mock => "mock",
            Pdk::Sky130 => "sky130",
        }
    }
}

/// Parameters for one ALIGN invocation.
#[derive(Clone, Debug)]
pub struct PlaceParams<'a> {
    /// The subcircuit to place. ALIGN matches this against `.subckt` names.
    pub design_name: &'a str,
    /// The directory holding `<design>.sp` and `<design>.const.json`.
    pub input_dir: &'a Path,
    /// The directory ALIGN runs in; logs and results land here.
    pub work_dir: &'a Path,
    /// The PDK directory to place against.
    pub pdk_dir: &'a Path,
    /// Placement-only or full P&R.
    pub mode: FlowMode,
}

/// The captured side files of a completed ALIGN run.
#[derive(Clone, Debug)]
pub struct PlaceRun {
    /// ALIGN's captured stdout.
    pub out_log: PathBuf,
    /// ALIGN's captured stderr.
    pub err_log: PathBuf,
}

/// How many trailing stderr lines to carry into a [`Error::Align`].
const STDERR_TAIL_LINES: usize = 30;

/// Runs ALIGN's `schematic2layout.py` entry point.
///
/// A non-zero exit is fatal and surfaces ALIGN's own crash reason; the
/// caller must not swallow it. Constraint documents naming instances that
/// ALIGN's internal grouping renamed are a known way to get here.
pub fn run_place(exec: &Path, params: &PlaceParams) -> Result<PlaceRun> {
    fs::create_dir_all(params.work_dir)?;
    let out_log = params.work_dir.join("align.out");
    let err_log = params.work_dir.join("align.err");
    let out_file = fs::File::create(&out_log)?;
    let err_file = fs::File::create(&err_log)?;

    let mut command = Command::new(exec);
    command
        .arg(params.input_dir)
        .arg("-p")
        .arg(params.pdk_dir)
        .arg("-s")
        .arg(params.design_name)
        .args(["--placer", "python"]);
    if params.mode == FlowMode::Floorplan {
        command.args(["--router_mode", "no_op"]);
    }

    tracing::info!(
        design = params.design_name,
        mode = %params.mode,
        "launching ALIGN: {:?}",
        command
    );
    let status = command
        .current_dir(params.work_dir)
        .stdout(out_file)
        .stderr(err_file)
        .status()?;

    if !status.success() {
        return Err(Error::Align {
            status,
            stderr_tail: tail_lines(&err_log, STDERR_TAIL_LINES)?,
        });
    }

    Ok(PlaceRun { out_log, err_log })
}

fn tail_lines(path: &Path, n: usize) -> Result<String> {
    let file = fs::File::open(path)?;
    let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

/// Locates the files an ALIGN run produced for collection.
///
/// In floorplan mode, ALIGN writes placement results under a fixed
/// `3_pnr/Results` directory inside the work directory; in full P&R mode,
/// layout files named after the design land in the work directory itself.
pub fn collect_outputs(params: &PlaceParams) -> Result<Vec<PathBuf>> {
    let src_dir = match params.mode {
        FlowMode::Floorplan => params.work_dir.join("3_pnr").join("Results"),
        FlowMode::Pnr => params.work_dir.to_path_buf(),
    };
    let mut found = Vec::new();
    if !src_dir.exists() {
        tracing::warn!("ALIGN results directory missing: {:?}", src_dir);
        return Ok(found);
    }
    let design_upper = params.design_name.to_uppercase();
    for entry in fs::read_dir(&src_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if params.mode == FlowMode::Pnr && !fname.to_uppercase().starts_with(&design_upper) {
            continue;
        }
        if params
            .mode
            .output_extensions()
            .iter()
            .any(|ext| fname.ends_with(ext))
        {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floorplan_mode_collects_placement_results() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("3_pnr").join("Results");
        fs::create_dir_all(&results).unwrap();
        fs::write(results.join("ota5_0.json"), "{}").unwrap();
        fs::write(results.join("ota5_0.pl"), "").unwrap();
        fs::write(results.join("notes.txt"), "").unwrap();

        let input_dir = tmp.path().join("in");
        let pdk_dir = tmp.path().join("pdk");
        let params = PlaceParams {
            design_name: "OTA5",
            input_dir: &input_dir,
            work_dir: tmp.path(),
            pdk_dir: &pdk_dir,
            mode: FlowMode::Floorplan,
        };
        let outputs = collect_outputs(&params).unwrap();
        let names: Vec<_> = outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ota5_0.json", "ota5_0.pl"]);
    }

    #[test]
    fn pnr_mode_filters_by_design_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("OTA5_0.gds"), "").unwrap();
        fs::write(tmp.path().join("OTA5.lef"), "").unwrap();
        fs::write(tmp.path().join("OTHER.gds"), "").unwrap();

        let input_dir = tmp.path().join("in");
        let pdk_dir = tmp.path().join("pdk");
        let params = PlaceParams {
            design_name: "ota5",
            input_dir: &input_dir,
            work_dir: tmp.path(),
            pdk_dir: &pdk_dir,
            mode: FlowMode::Pnr,
        };
        let outputs = collect_outputs(&params).unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|p| p
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("OTA5")));
    }

    #[test]
    fn missing_results_directory_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let input_dir = tmp.path().join("in");
        let pdk_dir = tmp.path().join("pdk");
        let params = PlaceParams {
            design_name: "OTA5",
            input_dir: &input_dir,
            work_dir: tmp.path(),
            pdk_dir: &pdk_dir,
            mode: FlowMode::Floorplan,
        };
        assert!(collect_outputs(&params).unwrap().is_empty());
    }

    #[test]
    fn failed_run_carries_stderr_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let input_dir = tmp.path().join("in");
        let pdk_dir = tmp.path().join("pdk");
        let params = PlaceParams {
            design_name: "OTA5",
            input_dir: &input_dir,
            work_dir: tmp.path(),
            pdk_dir: &pdk_dir,
            mode: FlowMode::Floorplan,
        };
        // `false` exits 1 without output; the error must still surface the
        // exit status.
        let err = run_place(Path::new("false"), &params).unwrap_err();
        match err {
            Error::Align { status, .. } => assert!(!status.success()),
            other => panic!("expected Error::Align, got {other:?}"),
        }
    }
}
