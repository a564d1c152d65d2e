//! Symmetry-pair validation: a model review layered over a local structural
//! check.
//!
//! The structural check (both members share a device type) is the source of
//! truth for the pass/fail verdict. The model's opinion can only downgrade a
//! structurally sound pair; it can never rescue a mismatched one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tera::Context;

use constraints::{SymmetricPair, ValidationReport, Verdict, align_name};
use netlist::MosKind;

use crate::{Error, Result, TEMPLATES, TextModel, strip_code_fence};

/// Context for one placed instance, as presented to the model.
#[derive(Clone, Debug, Serialize)]
pub struct InstanceContext {
    /// The post-import instance name (e.g. `X_MN0`).
    pub name: String,
    /// The primitive template the instance maps to.
    pub template: String,
    /// The nets the instance connects to.
    pub nets: Vec<String>,
}

/// The model's floorplan analysis, parsed from its JSON reply.
#[derive(Debug, Default, Deserialize)]
struct Analysis {
    #[serde(default)]
    roles: HashMap<String, String>,
    #[serde(default)]
    pair_valid: HashMap<String, bool>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    summary: String,
}

/// Validates symmetry pairs against device types and a model review.
pub struct Validator<'a, M> {
    model: &'a M,
}

impl<'a, M: TextModel> Validator<'a, M> {
    /// Creates a validator backed by the given model.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Validates every pair and collects the model's annotations.
    ///
    /// `kinds` maps post-import instance names (see
    /// [`constraints::align_name`]) to device types. Pair names in the
    /// returned report are normalized to the post-import form.
    ///
    /// Each pair's verdict is independent of the others; a model failure
    /// degrades to structural-only verdicts rather than failing the run.
    pub fn validate(
        &self,
        design: &str,
        pairs: &[SymmetricPair],
        kinds: &HashMap<String, MosKind>,
        instances: &[InstanceContext],
        ports: &[String],
    ) -> ValidationReport {
        let pairs: Vec<SymmetricPair> = pairs
            .iter()
            .map(|p| SymmetricPair::new(align_name(&p.a), align_name(&p.b)))
            .collect();

        let analysis = match self.analyze(design, &pairs, instances, ports) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("model review unavailable, using structural checks only: {e}");
                Analysis {
                    warnings: vec![format!("AI analysis failed: {e}")],
                    ..Default::default()
                }
            }
        };

        let verdicts = pairs
            .into_iter()
            .map(|pair| judge(pair, kinds, &analysis.pair_valid))
            .collect();

        ValidationReport {
            verdicts,
            roles: analysis.roles,
            warnings: analysis.warnings,
            summary: analysis.summary,
        }
    }

    fn analyze(
        &self,
        design: &str,
        pairs: &[SymmetricPair],
        instances: &[InstanceContext],
        ports: &[String],
    ) -> Result<Analysis> {
        let mut ctx = Context::new();
        ctx.insert("design", design);
        ctx.insert("ports", ports);
        ctx.insert("instances", instances);
        ctx.insert("pairs", pairs);
        let prompt = TEMPLATES.render("validate.prompt", &ctx)?;

        tracing::info!(design, pairs = pairs.len(), "requesting floorplan review");
        let reply = self.model.generate(&prompt)?;
        let json = strip_code_fence(&reply);
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("analysis JSON did not parse: {e}")))
    }
}

fn judge(
    pair: SymmetricPair,
    kinds: &HashMap<String, MosKind>,
    pair_valid: &HashMap<String, bool>,
) -> Verdict {
    let ka = kinds.get(&pair.a).copied();
    let kb = kinds.get(&pair.b).copied();
    if let (Some(a), Some(b)) = (ka, kb) {
        if a != b {
            return Verdict {
                explanation: format!(
                    "device type mismatch: {} is {a}, {} is {b}",
                    pair.a, pair.b
                ),
                valid: false,
                pair,
            };
        }
    }

    match model_opinion(pair_valid, &pair) {
        Some(false) => Verdict {
            explanation: "flagged by model review: members do not play matching circuit roles"
                .to_string(),
            valid: false,
            pair,
        },
        opinion => Verdict {
            explanation: match (ka, opinion) {
                (Some(kind), Some(true)) => format!("confirmed {kind} pair"),
                (Some(kind), _) => format!("{kind} pair, types match"),
                _ => "accepted".to_string(),
            },
            valid: true,
            pair,
        },
    }
}

/// Looks up the model's opinion on a pair.
///
/// The reply keys pairs as `"A,B"` in either member order and sometimes in
/// the model's own spelling, so both sides are normalized before comparing.
fn model_opinion(pair_valid: &HashMap<String, bool>, pair: &SymmetricPair) -> Option<bool> {
    pair_valid.iter().find_map(|(key, &valid)| {
        let (x, y) = key.split_once(',')?;
        let x = align_name(x.trim());
        let y = align_name(y.trim());
        ((x == pair.a && y == pair.b) || (x == pair.b && y == pair.a)).then_some(valid)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);
    impl TextModel for Canned {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;
    impl TextModel for Failing {
        fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::EmptyResponse)
        }
    }

    fn inverter_kinds() -> HashMap<String, MosKind> {
        HashMap::from_iter([
            ("X_MP0".to_string(), MosKind::Pmos),
            ("X_MN0".to_string(), MosKind::Nmos),
        ])
    }

    fn ota_kinds() -> HashMap<String, MosKind> {
        HashMap::from_iter([
            ("X_MP0".to_string(), MosKind::Pmos),
            ("X_MP1".to_string(), MosKind::Pmos),
            ("X_MN0".to_string(), MosKind::Nmos),
            ("X_MN1".to_string(), MosKind::Nmos),
            ("X_MN2".to_string(), MosKind::Nmos),
        ])
    }

    #[test]
    fn mismatched_pair_is_invalid_even_if_model_approves() {
        // The model insists the cross-type pair is fine; the structural
        // check must win.
        let model = Canned(
            r#"{"roles": {}, "pair_valid": {"X_MP0,X_MN0": true}, "warnings": [], "summary": ""}"#,
        );
        let report = Validator::new(&model).validate(
            "INV",
            &[SymmetricPair::new("mp0", "mn0")],
            &inverter_kinds(),
            &[],
            &[],
        );
        assert_eq!(report.verdicts.len(), 1);
        assert!(!report.verdicts[0].valid);
        assert!(report.verdicts[0].explanation.contains("device type mismatch"));
    }

    #[test]
    fn matched_pair_confirmed_by_model_is_valid() {
        let model = Canned(
            r#"```json
{"roles": {"X_MN0": "input device"}, "pair_valid": {"X_MN0,X_MN1": true},
 "warnings": [], "summary": "A five-transistor OTA."}
```"#,
        );
        let report = Validator::new(&model).validate(
            "OTA5",
            &[SymmetricPair::new("mn0", "mn1")],
            &ota_kinds(),
            &[],
            &[],
        );
        assert!(report.verdicts[0].valid);
        assert_eq!(report.summary, "A five-transistor OTA.");
        assert_eq!(report.roles["X_MN0"], "input device");
    }

    #[test]
    fn model_rejection_downgrades_matched_pair() {
        let model = Canned(
            r#"{"roles": {}, "pair_valid": {"X_MN1,X_MN0": false}, "warnings": [], "summary": ""}"#,
        );
        let report = Validator::new(&model).validate(
            "OTA5",
            &[SymmetricPair::new("mn0", "mn1")],
            &ota_kinds(),
            &[],
            &[],
        );
        assert!(!report.verdicts[0].valid);
    }

    #[test]
    fn transport_failure_degrades_to_structural_check() {
        let report = Validator::new(&Failing).validate(
            "INV",
            &[SymmetricPair::new("mp0", "mn0")],
            &inverter_kinds(),
            &[],
            &[],
        );
        assert!(!report.verdicts[0].valid);
        assert!(report.warnings.iter().any(|w| w.contains("AI analysis failed")));
    }

    #[test]
    fn malformed_reply_degrades_to_structural_check() {
        let model = Canned("this is not json");
        let report = Validator::new(&model).validate(
            "OTA5",
            &[SymmetricPair::new("mn0", "mn1")],
            &ota_kinds(),
            &[],
            &[],
        );
        // Structurally fine pair stays valid; the failure is recorded.
        assert!(report.verdicts[0].valid);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn unknown_kinds_fall_back_to_model_opinion() {
        let model = Canned(r#"{"pair_valid": {"X_MA0,X_MB0": true}}"#);
        let report = Validator::new(&model).validate(
            "MYSTERY",
            &[SymmetricPair::new("ma0", "mb0")],
            &HashMap::new(),
            &[],
            &[],
        );
        assert!(report.verdicts[0].valid);
    }
}
