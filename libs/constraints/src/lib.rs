//! Placement constraint modeling for the ALIGN flow.
//!
//! Models the subset of ALIGN's `const.json` schema used by the floorgen
//! flow (`SymmetricBlocks`, `PowerPorts`, `GroundPorts`), sanitizes
//! model-generated constraint documents, and applies the symmetry device
//! limit before constraints reach the placer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// The result type returned by constraint functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible constraint errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Error serializing or deserializing a constraint document.
    #[error("error serializing constraint document")]
    Serde(#[from] serde_json::Error),
}

/// The mirror axis of a symmetry constraint.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    /// Mirror about a vertical axis.
    #[default]
    #[serde(rename = "V")]
    Vertical,
    /// Mirror about a horizontal axis.
    #[serde(rename = "H")]
    Horizontal,
}

impl Direction {
    /// Normalizes a free-form direction label.
    ///
    /// `"v"` and `"vertical"` (any case) map to [`Direction::Vertical`];
    /// everything else maps to [`Direction::Horizontal`], matching the
    /// model's occasional free spelling of the direction field.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "v" | "vertical" => Direction::Vertical,
            _ => Direction::Horizontal,
        }
    }
}

/// An entry in an ALIGN `const.json` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint")]
pub enum Constraint {
    /// Pairs of blocks to place as mirror images.
    SymmetricBlocks {
        /// The mirror axis.
        direction: Direction,
        /// Instance name pairs.
        pairs: Vec<Vec<String>>,
    },
    /// The design's power ports.
    PowerPorts {
        /// Port names.
        ports: Vec<String>,
    },
    /// The design's ground ports.
    GroundPorts {
        /// Port names.
        ports: Vec<String>,
    },
}

/// Two device instances asserted to require mirrored placement.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SymmetricPair {
    /// The first instance name.
    pub a: String,
    /// The second instance name.
    pub b: String,
}

impl SymmetricPair {
    /// Creates a new pair.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Whether `name` is one of the pair's members.
    pub fn contains(&self, name: &str) -> bool {
        self.a == name || self.b == name
    }
}

impl std::fmt::Display for SymmetricPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.a, self.b)
    }
}

/// The sanitized constraints for one circuit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintSet {
    /// Symmetry pairs, in document order.
    pub pairs: Vec<SymmetricPair>,
    /// The mirror axis shared by all pairs.
    pub direction: Direction,
    /// Power port names.
    pub power_ports: Vec<String>,
    /// Ground port names.
    pub ground_ports: Vec<String>,
}

/// The instance name a constraint member maps to after ALIGN import.
///
/// ALIGN prefixes flattened device names with `X_` and uppercases them, so
/// `mn0`, `MN0`, and `x_mn0` all refer to `X_MN0`.
pub fn align_name(inst: &str) -> String {
    let upper = inst.to_uppercase();
    let stripped = upper.trim_start_matches(['X', '_']);
    let norm = format!("X_{stripped}");
    if norm.starts_with("X_M") {
        norm
    } else {
        format!("X_{upper}")
    }
}

impl ConstraintSet {
    /// Sanitizes a raw, model-generated constraint document.
    ///
    /// Entries that are not objects and constraint types outside the
    /// supported set are dropped. Symmetry pairs are kept only when they
    /// have exactly two members, and, if `valid_instances` is given, only
    /// when both members (in their post-import `X_` form) exist in the
    /// generated netlist: the generator occasionally names instances that
    /// the netlist rewrite renamed or removed.
    pub fn from_raw(
        raw: &[serde_json::Value],
        valid_instances: Option<&HashSet<String>>,
    ) -> Self {
        let mut set = ConstraintSet::default();
        for value in raw {
            if !value.is_object() {
                tracing::debug!("dropping non-object constraint entry: {value}");
                continue;
            }
            let constraint: Constraint = match serde_json::from_value(value.clone()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!("dropping unrecognized constraint entry: {e}");
                    continue;
                }
            };
            match constraint {
                Constraint::SymmetricBlocks { direction, pairs } => {
                    set.direction = direction;
                    for pair in pairs {
                        let [a, b]: [String; 2] = match pair.try_into() {
                            Ok(p) => p,
                            Err(p) => {
                                tracing::debug!("dropping malformed symmetry group: {p:?}");
                                continue;
                            }
                        };
                        if let Some(valid) = valid_instances {
                            if !valid.contains(&align_name(&a)) || !valid.contains(&align_name(&b))
                            {
                                tracing::warn!(
                                    "dropping symmetry pair referencing unknown instances: \
                                     {a} / {b}"
                                );
                                continue;
                            }
                        }
                        set.pairs.push(SymmetricPair::new(a, b));
                    }
                }
                Constraint::PowerPorts { ports } => set.power_ports.extend(ports),
                Constraint::GroundPorts { ports } => set.ground_ports.extend(ports),
            }
        }
        set
    }

    /// Re-encodes the set in ALIGN's `const.json` schema.
    ///
    /// Empty sections are omitted; ALIGN rejects empty pair lists.
    pub fn to_align(&self) -> Vec<Constraint> {
        let mut out = Vec::new();
        if !self.pairs.is_empty() {
            out.push(Constraint::SymmetricBlocks {
                direction: self.direction,
                pairs: self
                    .pairs
                    .iter()
                    .map(|p| vec![p.a.clone(), p.b.clone()])
                    .collect(),
            });
        }
        if !self.power_ports.is_empty() {
            out.push(Constraint::PowerPorts {
                ports: self.power_ports.clone(),
            });
        }
        if !self.ground_ports.is_empty() {
            out.push(Constraint::GroundPorts {
                ports: self.ground_ports.clone(),
            });
        }
        out
    }

    /// Renders the ALIGN `const.json` document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_align())?)
    }
}

/// The outcome of validating one symmetry pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    /// The pair under validation.
    pub pair: SymmetricPair,
    /// Whether the pair is a legitimate symmetry constraint.
    ///
    /// Always `false` for pairs whose members have differing device types,
    /// regardless of what the generative model said.
    pub valid: bool,
    /// Explanatory text. Supplementary only; never the source of truth
    /// for `valid`.
    pub explanation: String,
}

/// The full validation output for one circuit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationReport {
    /// Per-pair verdicts, in constraint order.
    pub verdicts: Vec<Verdict>,
    /// Short circuit-role descriptions per instance name.
    pub roles: std::collections::HashMap<String, String>,
    /// Warnings raised during validation.
    pub warnings: Vec<String>,
    /// A short plain-English summary of the circuit and floorplan.
    pub summary: String,
}

impl ValidationReport {
    /// Looks up the verdict covering the given instance name, if any.
    pub fn verdict_for(&self, instance: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.pair.contains(instance))
    }
}

/// The device-count limit above which symmetry constraints are dropped.
///
/// ALIGN regroups circuits with many devices into an internal hierarchy and
/// does not remap constraint instance names into the regrouped tree, so
/// `SymmetricBlocks` constraints naming pre-grouping instances fail its
/// schema validation. Above the limit we forward only port constraints.
/// This is a workaround for the downstream tool, not a design choice; no
/// remapping is attempted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SymmetryLimit {
    /// The maximum device count for which symmetry constraints are kept.
    pub max_devices: usize,
}

impl Default for SymmetryLimit {
    fn default() -> Self {
        Self {
            max_devices: Self::DEFAULT_MAX_DEVICES,
        }
    }
}

impl SymmetryLimit {
    /// The largest device count ALIGN handles without regrouping.
    pub const DEFAULT_MAX_DEVICES: usize = 12;

    /// Creates a limit with the given maximum device count.
    pub fn new(max_devices: usize) -> Self {
        Self { max_devices }
    }

    /// Applies the limit to a constraint set.
    ///
    /// Returns `true` if symmetry pairs were discarded.
    pub fn apply(&self, set: &mut ConstraintSet, device_count: usize) -> bool {
        if device_count > self.max_devices && !set.pairs.is_empty() {
            tracing::warn!(
                device_count,
                max_devices = self.max_devices,
                "complex circuit: dropping {} symmetry pair(s); ALIGN cannot remap \
                 symmetry constraints onto its internal grouping of large circuits",
                set.pairs.len()
            );
            set.pairs.clear();
            true
        } else {
            false
        }
    }
}
