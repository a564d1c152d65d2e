//! Annotated floorplan rendering.
//!
//! Draws a placed design to a PNG: device rectangles colored by type,
//! full-height dashed symmetry axes, port markers, and a side panel
//! carrying the review verdicts, roles, warnings, summary, cell-type
//! legend, and flow status.

use std::collections::HashMap;
use std::path::Path;

use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use thiserror::Error;

use align::FlowMode;
use align::artifact::{PlacementArtifact, PortLocation, Rect};
use constraints::ValidationReport;
use netlist::MosKind;

/// The result type returned by rendering functions.
pub type Result<T> = std::result::Result<T, self::Error>;

/// Possible rendering errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// Error drawing to the image backend.
    #[error("rendering failed: {0}")]
    Draw(String),
}

/// Everything needed to render one annotated floorplan.
pub struct RenderInput<'a> {
    /// The design name, used in the plot title.
    pub design: &'a str,
    /// The placement to draw.
    pub artifact: &'a PlacementArtifact,
    /// Port locations from the placer's `.pl` output.
    pub ports: &'a [PortLocation],
    /// Device types keyed by post-import instance name.
    pub kinds: &'a HashMap<String, MosKind>,
    /// The symmetry review to annotate with.
    pub report: &'a ValidationReport,
    /// The flow mode, reported in the panel's status section.
    pub mode: FlowMode,
}

const IMAGE_SIZE: (u32, u32) = (1500, 950);
const PANEL_WIDTH: u32 = 440;

const PMOS_FILL: RGBColor = RGBColor(222, 125, 125);
const NMOS_FILL: RGBColor = RGBColor(121, 157, 216);
const UNKNOWN_FILL: RGBColor = RGBColor(180, 180, 180);

/// Distinct colors for valid symmetry axes; invalid axes are always red.
const AXIS_PALETTE: [RGBColor; 4] = [
    RGBColor(46, 139, 87),
    RGBColor(65, 105, 225),
    RGBColor(148, 87, 190),
    RGBColor(205, 133, 0),
];

fn device_fill(kind: Option<MosKind>) -> RGBColor {
    match kind {
        Some(MosKind::Pmos) => PMOS_FILL,
        Some(MosKind::Nmos) => NMOS_FILL,
        None => UNKNOWN_FILL,
    }
}

fn axis_color(valid: bool, index: usize) -> RGBColor {
    if valid {
        AXIS_PALETTE[index % AXIS_PALETTE.len()]
    } else {
        RED
    }
}

/// Renders the annotated floorplan to a PNG at the given path.
pub fn render_floorplan(input: &RenderInput, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    tracing::info!(design = input.design, "rendering floorplan to {:?}", path);

    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(to_draw_err)?;
    let (plot, panel) = root.split_horizontally(IMAGE_SIZE.0 - PANEL_WIDTH);

    draw_placement(&plot, input)?;
    draw_panel(&panel, input)?;

    root.present().map_err(to_draw_err)?;
    Ok(())
}

fn to_draw_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Draw(e.to_string())
}

fn draw_placement<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    input: &RenderInput,
) -> Result<()> {
    let top = input.artifact.top();
    let bbox = top.bbox;
    let pad_x = ((bbox[2] - bbox[0]) as f64 * 0.08).max(1.0);
    let pad_y = ((bbox[3] - bbox[1]) as f64 * 0.08).max(1.0);
    let x_range = (bbox[0] as f64 - pad_x)..(bbox[2] as f64 + pad_x);
    let y_range = (bbox[1] as f64 - pad_y)..(bbox[3] as f64 + pad_y);

    let mut chart = ChartBuilder::on(area)
        .caption(
            format!("{} floorplan", input.design),
            ("sans-serif", 24).into_font(),
        )
        .margin(14)
        .x_label_area_size(34)
        .y_label_area_size(56)
        .build_cartesian_2d(x_range, y_range)
        .map_err(to_draw_err)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .label_style(("sans-serif", 12))
        .draw()
        .map_err(to_draw_err)?;

    // Die outline.
    chart
        .draw_series(std::iter::once(Rectangle::new(
            [
                (bbox[0] as f64, bbox[1] as f64),
                (bbox[2] as f64, bbox[3] as f64),
            ],
            BLACK.stroke_width(2),
        )))
        .map_err(to_draw_err)?;

    // Device rectangles with name labels at their centers.
    let mut rects: HashMap<String, Rect> = HashMap::new();
    for inst in &top.instances {
        let rect = input.artifact.placed_rect(inst);
        let (cx, cy) = rect.center();
        rects.insert(inst.instance_name.clone(), rect);
        let fill = device_fill(input.kinds.get(&inst.instance_name).copied());
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [
                    (rect.x as f64, rect.y as f64),
                    ((rect.x + rect.w) as f64, (rect.y + rect.h) as f64),
                ],
                fill.mix(0.45).filled(),
            )))
            .map_err(to_draw_err)?;
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [
                    (rect.x as f64, rect.y as f64),
                    ((rect.x + rect.w) as f64, (rect.y + rect.h) as f64),
                ],
                fill.stroke_width(1),
            )))
            .map_err(to_draw_err)?;
        chart
            .draw_series(std::iter::once(Text::new(
                inst.instance_name.clone(),
                (cx, cy),
                ("sans-serif", 13).into_font().color(&BLACK),
            )))
            .map_err(to_draw_err)?;
    }

    // Full-height dashed axes at each pair's mean x, labeled P1, P2, ...
    // Invalid pairs get a translucent red overlay on both devices and the
    // verdict explanation next to the axis.
    for (i, verdict) in input.report.verdicts.iter().enumerate() {
        let (Some(ra), Some(rb)) = (rects.get(&verdict.pair.a), rects.get(&verdict.pair.b))
        else {
            tracing::warn!(pair = %verdict.pair, "symmetry pair not in placement, skipping axis");
            continue;
        };
        let (a, b) = (ra.center(), rb.center());
        let color = axis_color(verdict.valid, i);
        let axis_x = (a.0 + b.0) / 2.0;
        chart
            .draw_series(DashedLineSeries::new(
                [(axis_x, bbox[1] as f64), (axis_x, bbox[3] as f64)],
                8,
                5,
                color.stroke_width(2).into(),
            ))
            .map_err(to_draw_err)?;
        chart
            .draw_series(std::iter::once(Text::new(
                format!("P{}", i + 1),
                (axis_x, bbox[3] as f64),
                ("sans-serif", 15).into_font().color(&color),
            )))
            .map_err(to_draw_err)?;
        if !verdict.valid {
            for rect in [ra, rb] {
                chart
                    .draw_series(std::iter::once(Rectangle::new(
                        [
                            (rect.x as f64, rect.y as f64),
                            ((rect.x + rect.w) as f64, (rect.y + rect.h) as f64),
                        ],
                        RED.mix(0.25).filled(),
                    )))
                    .map_err(to_draw_err)?;
            }
            chart
                .draw_series(std::iter::once(Text::new(
                    verdict.explanation.clone(),
                    (axis_x, (a.1 + b.1) / 2.0),
                    ("sans-serif", 12).into_font().color(&RED),
                )))
                .map_err(to_draw_err)?;
        }
    }

    // Port markers along the die boundary.
    for port in input.ports {
        chart
            .draw_series(std::iter::once(Circle::new(
                (port.x, port.y),
                4,
                BLACK.filled(),
            )))
            .map_err(to_draw_err)?;
        chart
            .draw_series(std::iter::once(Text::new(
                port.name.clone(),
                (port.x, port.y),
                ("sans-serif", 12).into_font().color(&BLACK),
            )))
            .map_err(to_draw_err)?;
    }

    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    input: &RenderInput,
) -> Result<()> {
    area.fill(&RGBColor(245, 245, 245)).map_err(to_draw_err)?;

    let heading = ("sans-serif", 18).into_font();
    let body = ("sans-serif", 13).into_font();
    let mut y = 20i32;

    let top = input.artifact.top();
    panel_line(area, &mut y, format!("Design: {}", input.design), &heading, &BLACK)?;
    panel_line(area, &mut y, die_size_label(top.bbox), &body, &BLACK)?;
    panel_line(
        area,
        &mut y,
        format!(
            "{} devices, {} ports, {} symmetry pairs",
            top.instances.len(),
            input.ports.len(),
            input.report.verdicts.len()
        ),
        &body,
        &BLACK,
    )?;
    y += 8;

    panel_line(area, &mut y, "Cell types".to_string(), &heading, &BLACK)?;
    panel_swatch(area, &mut y, "PMOS", PMOS_FILL, &body)?;
    panel_swatch(area, &mut y, "NMOS", NMOS_FILL, &body)?;
    y += 8;

    panel_line(area, &mut y, "Symmetry review".to_string(), &heading, &BLACK)?;
    if input.report.verdicts.is_empty() {
        panel_line(area, &mut y, "(no pairs constrained)".to_string(), &body, &BLACK)?;
    }
    for (i, verdict) in input.report.verdicts.iter().enumerate() {
        let color = axis_color(verdict.valid, i);
        let badge = if verdict.valid { "ok" } else { "INVALID" };
        panel_line(
            area,
            &mut y,
            format!("P{} {} [{badge}]", i + 1, verdict.pair),
            &body,
            &color,
        )?;
        for chunk in wrap_text(&verdict.explanation, 52) {
            panel_line(area, &mut y, format!("   {chunk}"), &body, &color)?;
        }
    }
    y += 8;

    if !input.report.roles.is_empty() {
        panel_line(area, &mut y, "Roles".to_string(), &heading, &BLACK)?;
        let mut names: Vec<_> = input.report.roles.keys().collect();
        names.sort();
        for name in names {
            panel_line(
                area,
                &mut y,
                format!("{name}: {}", input.report.roles[name]),
                &body,
                &BLACK,
            )?;
        }
        y += 8;
    }

    if !input.report.warnings.is_empty() {
        panel_line(area, &mut y, "Warnings".to_string(), &heading, &RED)?;
        for warning in &input.report.warnings {
            for chunk in wrap_text(warning, 52) {
                panel_line(area, &mut y, chunk, &body, &RED)?;
            }
        }
        y += 8;
    }

    if !input.report.summary.is_empty() {
        panel_line(area, &mut y, "Summary".to_string(), &heading, &BLACK)?;
        for chunk in wrap_text(&input.report.summary, 52) {
            panel_line(area, &mut y, chunk, &body, &BLACK)?;
        }
        y += 8;
    }

    panel_line(area, &mut y, "Flow status".to_string(), &heading, &BLACK)?;
    for (stage, status) in flow_status(input.mode) {
        panel_line(area, &mut y, format!("{stage}: {status}"), &body, &BLACK)?;
    }

    Ok(())
}

fn panel_line<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    y: &mut i32,
    text: String,
    font: &FontDesc<'_>,
    color: &RGBColor,
) -> Result<()> {
    area.draw(&Text::new(text, (16, *y), font.color(color)))
        .map_err(to_draw_err)?;
    *y += font.get_size() as i32 + 8;
    Ok(())
}

fn panel_swatch<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    y: &mut i32,
    label: &str,
    fill: RGBColor,
    font: &FontDesc<'_>,
) -> Result<()> {
    area.draw(&Rectangle::new(
        [(16, *y), (34, *y + 12)],
        fill.mix(0.45).filled(),
    ))
    .map_err(to_draw_err)?;
    area.draw(&Rectangle::new(
        [(16, *y), (34, *y + 12)],
        fill.stroke_width(1),
    ))
    .map_err(to_draw_err)?;
    area.draw(&Text::new(label.to_string(), (42, *y), font.color(&BLACK)))
        .map_err(to_draw_err)?;
    *y += font.get_size() as i32 + 8;
    Ok(())
}

/// The die dimensions line for the side panel.
fn die_size_label(bbox: [i64; 4]) -> String {
    format!("die: {} x {}", bbox[2] - bbox[0], bbox[3] - bbox[1])
}

/// The per-stage status lines for the side panel.
fn flow_status(mode: FlowMode) -> [(&'static str, &'static str); 2] {
    match mode {
        FlowMode::Floorplan => [("placement", "done"), ("routing", "skipped")],
        FlowMode::Pnr => [("placement", "done"), ("routing", "done")],
    }
}

/// Greedy word wrap for panel text.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use constraints::{SymmetricPair, Verdict};

    const ARTIFACT: &str = r#"{
        "modules": [
            {
                "abstract_name": "OTA5",
                "bbox": [0, 0, 4480, 4704],
                "instances": [
                    {
                        "instance_name": "X_MN0",
                        "abstract_template_name": "DP",
                        "transformation": {"oX": 0, "oY": 0, "sX": 1, "sY": 1}
                    },
                    {
                        "instance_name": "X_MN1",
                        "abstract_template_name": "DP",
                        "transformation": {"oX": 1280, "oY": 0, "sX": 1, "sY": 1}
                    },
                    {
                        "instance_name": "X_MP0",
                        "abstract_template_name": "CM",
                        "transformation": {"oX": 0, "oY": 2352, "sX": 1, "sY": 1}
                    }
                ],
                "constraints": []
            }
        ],
        "leaves": []
    }"#;

    fn report() -> ValidationReport {
        ValidationReport {
            verdicts: vec![
                Verdict {
                    pair: SymmetricPair::new("X_MN0", "X_MN1"),
                    valid: true,
                    explanation: "confirmed nmos pair".to_string(),
                },
                Verdict {
                    pair: SymmetricPair::new("X_MN0", "X_MP0"),
                    valid: false,
                    explanation: "device type mismatch: X_MN0 is nmos, X_MP0 is pmos".to_string(),
                },
            ],
            roles: HashMap::from_iter([("X_MN0".to_string(), "input device".to_string())]),
            warnings: vec![],
            summary: "A five-transistor OTA.".to_string(),
        }
    }

    #[test]
    fn renders_annotated_png() {
        let artifact: PlacementArtifact = serde_json::from_str(ARTIFACT).unwrap();
        let kinds = HashMap::from_iter([
            ("X_MN0".to_string(), MosKind::Nmos),
            ("X_MN1".to_string(), MosKind::Nmos),
            ("X_MP0".to_string(), MosKind::Pmos),
        ]);
        let ports = vec![PortLocation {
            name: "VDD".to_string(),
            x: 0.0,
            y: 4704.0,
        }];
        let report = report();
        let input = RenderInput {
            design: "OTA5",
            artifact: &artifact,
            ports: &ports,
            kinds: &kinds,
            report: &report,
            mode: FlowMode::Floorplan,
        };

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ota5.png");
        render_floorplan(&input, &path).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn axis_colors_distinguish_invalid_pairs() {
        assert_eq!(axis_color(false, 0), RED);
        assert_eq!(axis_color(false, 3), RED);
        assert_ne!(axis_color(true, 0), RED);
        assert_ne!(axis_color(true, 0), axis_color(true, 1));
    }

    #[test]
    fn panel_reports_die_size() {
        assert_eq!(die_size_label([0, 0, 4480, 4704]), "die: 4480 x 4704");
        assert_eq!(die_size_label([100, 200, 4580, 4904]), "die: 4480 x 4704");
    }

    #[test]
    fn flow_status_reflects_mode() {
        assert_eq!(
            flow_status(FlowMode::Floorplan),
            [("placement", "done"), ("routing", "skipped")]
        );
        assert_eq!(
            flow_status(FlowMode::Pnr),
            [("placement", "done"), ("routing", "done")]
        );
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("a five transistor operational transconductance amplifier", 20);
        assert!(lines.iter().all(|l| l.len() <= 20));
        assert_eq!(lines.join(" "), "a five transistor operational transconductance amplifier");
    }
}
