//! Parsing of ALIGN placement artifacts.
//!
//! ALIGN's floorplan output is a `*_scaled_placement_verilog.json` file
//! describing the top module's bounding box, each placed instance's
//! transform, and the leaf templates' dimensions, plus a `.pl` file with
//! port locations. Everything here is read-only extraction for rendering;
//! the artifact is otherwise opaque to the pipeline.

use std::path::Path;

use serde::Deserialize;

use constraints::{ConstraintSet, SymmetricPair};

use crate::error::{Error, Result};

/// The fallback leaf dimensions used when a template is missing from the
/// artifact's leaf table (ALIGN's usual primitive cell size).
pub const DEFAULT_LEAF_SIZE: (i64, i64) = (640, 2352);

/// A parsed placement artifact.
#[derive(Clone, Debug, Deserialize)]
pub struct PlacementArtifact {
    /// The placed modules; the first entry is the top module.
    pub modules: Vec<Module>,
    /// The leaf templates referenced by instances.
    #[serde(default)]
    pub leaves: Vec<Leaf>,
}

/// One placed module.
#[derive(Clone, Debug, Deserialize)]
pub struct Module {
    /// The module name.
    pub abstract_name: String,
    /// The die bounding box `[x0, y0, x1, y1]`.
    pub bbox: [i64; 4],
    /// The placed instances.
    #[serde(default)]
    pub instances: Vec<PlacedInstance>,
    /// The constraints ALIGN embedded into the artifact.
    #[serde(default)]
    pub constraints: Vec<serde_json::Value>,
}

/// One placed instance.
#[derive(Clone, Debug, Deserialize)]
pub struct PlacedInstance {
    /// The post-import instance name (e.g. `X_MN0`).
    pub instance_name: String,
    /// The leaf template this instance maps to.
    pub abstract_template_name: String,
    /// The placement transform.
    pub transformation: Transform,
    /// Formal-to-actual net mapping.
    #[serde(default)]
    pub fa_map: Vec<FaMapEntry>,
}

/// A formal-to-actual net mapping entry.
#[derive(Clone, Debug, Deserialize)]
pub struct FaMapEntry {
    /// The formal terminal name.
    pub formal: String,
    /// The connected net.
    pub actual: String,
}

/// An instance placement transform: an origin plus axis mirror flags.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct Transform {
    /// Origin x.
    #[serde(rename = "oX")]
    pub ox: i64,
    /// Origin y.
    #[serde(rename = "oY")]
    pub oy: i64,
    /// X mirror flag: `1` upright, `-1` mirrored.
    #[serde(rename = "sX")]
    pub sx: i64,
    /// Y mirror flag: `1` upright, `-1` mirrored.
    #[serde(rename = "sY")]
    pub sy: i64,
}

/// A leaf template and its bounding box.
#[derive(Clone, Debug, Deserialize)]
pub struct Leaf {
    /// The template name.
    pub abstract_name: String,
    /// The bounding box `[x0, y0, x1, y1]`.
    pub bbox: [i64; 4],
}

/// An axis-aligned placed rectangle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rect {
    /// Lower-left x.
    pub x: i64,
    /// Lower-left y.
    pub y: i64,
    /// Width.
    pub w: i64,
    /// Height.
    pub h: i64,
}

/// A named port location from a `.pl` file.
#[derive(Clone, Debug, PartialEq)]
pub struct PortLocation {
    /// The port name.
    pub name: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl PlacementArtifact {
    /// Parses the placement JSON at the given path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("reading placement artifact: {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let artifact: PlacementArtifact = serde_json::from_str(&contents)?;
        if artifact.modules.is_empty() {
            return Err(Error::EmptyArtifact(path.to_path_buf()));
        }
        Ok(artifact)
    }

    /// The top placed module.
    ///
    /// Only call on artifacts produced by [`PlacementArtifact::from_file`],
    /// which rejects module-less artifacts.
    pub fn top(&self) -> &Module {
        &self.modules[0]
    }

    /// The dimensions of a leaf template, falling back to
    /// [`DEFAULT_LEAF_SIZE`] for unknown templates.
    pub fn leaf_size(&self, template: &str) -> (i64, i64) {
        self.leaves
            .iter()
            .find(|l| l.abstract_name == template)
            .map(|l| (l.bbox[2] - l.bbox[0], l.bbox[3] - l.bbox[1]))
            .unwrap_or(DEFAULT_LEAF_SIZE)
    }

    /// The rectangle an instance occupies, accounting for mirroring.
    ///
    /// A mirrored axis places the origin at the far edge, so the rectangle
    /// extends backwards from it.
    pub fn placed_rect(&self, inst: &PlacedInstance) -> Rect {
        let (w, h) = self.leaf_size(&inst.abstract_template_name);
        let t = inst.transformation;
        Rect {
            x: if t.sx == 1 { t.ox } else { t.ox - w },
            y: if t.sy == 1 { t.oy } else { t.oy - h },
            w,
            h,
        }
    }

    /// The symmetry pairs embedded in the top module's constraints.
    ///
    /// Only well-formed two-member pairs are returned; ALIGN sometimes
    /// emits self-symmetric singleton groups.
    pub fn symmetric_pairs(&self) -> Vec<SymmetricPair> {
        ConstraintSet::from_raw(&self.top().constraints, None).pairs
    }
}

impl Rect {
    /// The rectangle's center.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 / 2.0,
            self.y as f64 + self.h as f64 / 2.0,
        )
    }
}

/// Parses a `.pl` port location file.
///
/// Each port line is `name x y`; lines for instances (`X_` prefix) and the
/// die outline (`DIE`) are skipped, as are unparseable coordinate lines.
pub fn parse_pl(contents: &str) -> Vec<PortLocation> {
    let mut ports = Vec::new();
    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 || parts[0].starts_with("X_") || parts[0] == "DIE" {
            continue;
        }
        let (Ok(x), Ok(y)) = (parts[1].parse::<f64>(), parts[2].parse::<f64>()) else {
            continue;
        };
        ports.push(PortLocation {
            name: parts[0].to_string(),
            x,
            y,
        });
    }
    ports
}

/// Reads port locations from the `.pl` file at the given path.
pub fn parse_pl_file(path: impl AsRef<Path>) -> Result<Vec<PortLocation>> {
    Ok(parse_pl(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const OTA5_ARTIFACT: &str = r#"{
        "modules": [
            {
                "abstract_name": "OTA5",
                "bbox": [0, 0, 4480, 4704],
                "instances": [
                    {
                        "instance_name": "X_MN0",
                        "abstract_template_name": "DP_NMOS_B",
                        "transformation": {"oX": 640, "oY": 0, "sX": 1, "sY": 1},
                        "fa_map": [{"formal": "D", "actual": "NET1"}]
                    },
                    {
                        "instance_name": "X_MN1",
                        "abstract_template_name": "DP_NMOS_B",
                        "transformation": {"oX": 1920, "oY": 0, "sX": -1, "sY": 1},
                        "fa_map": []
                    }
                ],
                "constraints": [
                    {"constraint": "SymmetricBlocks", "direction": "V",
                     "pairs": [["X_MN0", "X_MN1"], ["X_MN2"]]}
                ]
            }
        ],
        "leaves": [
            {"abstract_name": "DP_NMOS_B", "bbox": [0, 0, 1280, 2352]}
        ]
    }"#;

    #[test]
    fn parses_artifact_fixture() {
        let artifact: PlacementArtifact = serde_json::from_str(OTA5_ARTIFACT).unwrap();
        let top = artifact.top();
        assert_eq!(top.abstract_name, "OTA5");
        assert_eq!(top.bbox, [0, 0, 4480, 4704]);
        assert_eq!(top.instances.len(), 2);
        assert_eq!(artifact.leaf_size("DP_NMOS_B"), (1280, 2352));
        assert_eq!(artifact.leaf_size("UNKNOWN"), DEFAULT_LEAF_SIZE);
    }

    #[test]
    fn upright_and_mirrored_rects() {
        let artifact: PlacementArtifact = serde_json::from_str(OTA5_ARTIFACT).unwrap();
        let top = artifact.top();

        let upright = artifact.placed_rect(&top.instances[0]);
        assert_eq!(
            upright,
            Rect {
                x: 640,
                y: 0,
                w: 1280,
                h: 2352
            }
        );

        // sX = -1 mirrors about the origin, so the rect extends backwards.
        let mirrored = artifact.placed_rect(&top.instances[1]);
        assert_eq!(
            mirrored,
            Rect {
                x: 640,
                y: 0,
                w: 1280,
                h: 2352
            }
        );
    }

    #[test]
    fn embedded_pairs_keep_only_two_member_groups() {
        let artifact: PlacementArtifact = serde_json::from_str(OTA5_ARTIFACT).unwrap();
        let pairs = artifact.symmetric_pairs();
        assert_eq!(pairs, vec![SymmetricPair::new("X_MN0", "X_MN1")]);
    }

    #[test]
    fn empty_artifact_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("placement.json");
        std::fs::write(&path, r#"{"modules": [], "leaves": []}"#).unwrap();
        let err = PlacementArtifact::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::EmptyArtifact(_)));
    }

    #[test]
    fn pl_parsing_skips_instances_and_die() {
        let ports = parse_pl(
            "VDD 0 4704\nVSS 0 0\nX_MN0 640 0\nDIE 4480 4704\nVIN 0 2352\nBAD a b\n",
        );
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0], PortLocation { name: "VDD".into(), x: 0.0, y: 4704.0 });
    }
}
