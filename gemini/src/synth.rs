//! Constraint synthesis: one model call that rewrites the raw netlist into
//! ALIGN-ready SPICE and proposes placement constraints.

use tera::Context;

use crate::{Error, Result, TEMPLATES, TextModel, strip_code_fence};

const SPICE_START: &str = "===SPICE===";
const SPICE_END: &str = "===END SPICE===";
const JSON_START: &str = "===JSON===";
const JSON_END: &str = "===END JSON===";

/// The parsed output of one synthesis call.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// The rewritten SPICE netlist text.
    pub spice: String,
    /// The raw constraint document, prior to sanitization.
    pub constraints: Vec<serde_json::Value>,
}

/// Sends netlists to a [`TextModel`] and parses constraint documents out of
/// the replies.
pub struct Synthesizer<'a, M> {
    model: &'a M,
}

impl<'a, M: TextModel> Synthesizer<'a, M> {
    /// Creates a synthesizer backed by the given model.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Asks the model to rewrite `raw_spice` and generate constraints.
    ///
    /// The model performs all semantic inference (e.g. spotting the
    /// differential pair); this function only frames the request and parses
    /// the marker-delimited reply.
    pub fn synthesize(&self, design_name: &str, raw_spice: &str) -> Result<Synthesis> {
        let mut ctx = Context::new();
        ctx.insert("design_name", design_name);
        ctx.insert("raw_spice", raw_spice);
        let prompt = TEMPLATES.render("synthesize.prompt", &ctx)?;

        tracing::info!(design = design_name, "requesting SPICE rewrite and constraints");
        let reply = self.model.generate(&prompt)?;
        parse_reply(&reply)
    }
}

/// Parses a marker-delimited synthesis reply.
pub fn parse_reply(reply: &str) -> Result<Synthesis> {
    let spice = section(reply, SPICE_START, SPICE_END)?;
    if spice.is_empty() {
        return Err(Error::Synthesis("empty SPICE section".to_string()));
    }

    let json = section(reply, JSON_START, JSON_END)?;
    let json = strip_code_fence(json);
    let constraints: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| Error::Synthesis(format!("constraint JSON did not parse: {e}")))?;

    Ok(Synthesis {
        spice: spice.to_string(),
        constraints,
    })
}

fn section<'a>(reply: &'a str, start: &str, end: &str) -> Result<&'a str> {
    let (_, rest) = reply
        .split_once(start)
        .ok_or_else(|| Error::Synthesis(format!("missing {start} marker")))?;
    let (body, _) = rest
        .split_once(end)
        .ok_or_else(|| Error::Synthesis(format!("missing {end} marker")))?;
    Ok(body.trim())
}
