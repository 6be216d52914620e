use crate::{Atom, Bond, Element, MoleculeGraph};
use petgraph::visit::EdgeRef;

/// World-space length every drawn bond is laid out at.
const BOND_LENGTH: f64 = 1.5;
/// Non-bonded atoms closer than this are pushed apart during layout.
const NONBOND_MIN: f64 = 2.4;
const LAYOUT_STEPS: usize = 500;
const LAYOUT_STEP_SIZE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct DepictOptions {
    pub width: u32,
    pub height: u32,
    pub padding_px: f64,
    pub background: String,
    /// Caption drawn under the structure.
    pub legend: Option<String>,
}

impl Default for DepictOptions {
    fn default() -> Self {
        DepictOptions {
            width: 400,
            height: 400,
            padding_px: 28.0,
            background: "#ffffff".to_string(),
            legend: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Vec2 {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

#[derive(Debug, Clone, Copy)]
struct Transform {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    max_y: f64,
    min_x: f64,
}

impl Transform {
    fn to_screen(&self, p: Vec2) -> Vec2 {
        Vec2 {
            x: self.offset_x + (p.x - self.min_x) * self.scale,
            y: self.offset_y + (self.max_y - p.y) * self.scale,
        }
    }
}

/// Deterministic planar coordinates for depiction.
///
/// Atoms start on a circle in index order and relax under springs pulling
/// every bond to [`BOND_LENGTH`] plus a soft repulsion between non-bonded
/// pairs. No randomness is involved, so the same graph always draws the
/// same way.
pub fn layout_2d(graph: &MoleculeGraph) -> Vec<[f64; 2]> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![[0.0, 0.0]];
    }

    let radius = (BOND_LENGTH * n as f64 / (2.0 * std::f64::consts::PI)).max(BOND_LENGTH);
    let mut coords: Vec<[f64; 2]> = (0..n)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            [radius * angle.cos(), radius * angle.sin()]
        })
        .collect();

    for _ in 0..LAYOUT_STEPS {
        let mut forces = vec![[0.0f64; 2]; n];
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let dx = coords[a][0] - coords[b][0];
            let dy = coords[a][1] - coords[b][1];
            let distance = (dx * dx + dy * dy).sqrt().max(1e-9);
            let stretch = distance - BOND_LENGTH;
            let fx = -stretch * dx / distance;
            let fy = -stretch * dy / distance;
            forces[a][0] += fx;
            forces[a][1] += fy;
            forces[b][0] -= fx;
            forces[b][1] -= fy;
        }
        for a in 0..n {
            for b in (a + 1)..n {
                if graph
                    .find_edge(petgraph::graph::NodeIndex::new(a), petgraph::graph::NodeIndex::new(b))
                    .is_some()
                {
                    continue;
                }
                let dx = coords[a][0] - coords[b][0];
                let dy = coords[a][1] - coords[b][1];
                let distance = (dx * dx + dy * dy).sqrt().max(1e-9);
                if distance < NONBOND_MIN {
                    let push = 0.3 * (NONBOND_MIN - distance);
                    forces[a][0] += push * dx / distance;
                    forces[a][1] += push * dy / distance;
                    forces[b][0] -= push * dx / distance;
                    forces[b][1] -= push * dy / distance;
                }
            }
        }
        for (position, force) in coords.iter_mut().zip(&forces) {
            position[0] += LAYOUT_STEP_SIZE * force[0];
            position[1] += LAYOUT_STEP_SIZE * force[1];
        }
    }

    coords
}

/// Renders a molecule as a standalone SVG document.
pub fn depict_svg(graph: &MoleculeGraph, options: &DepictOptions) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{}' height='{}' viewBox='0 0 {} {}'>",
        options.width, options.height, options.width, options.height
    ));
    svg.push_str(&render_cell(graph, options));
    svg.push_str("</svg>");
    svg
}

/// Renders several molecules as one tiled SVG document, `columns` cells per
/// row, each `cell_width` x `cell_height` with its own legend.
pub fn grid_svg(
    entries: &[(&MoleculeGraph, &str)],
    columns: usize,
    cell_width: u32,
    cell_height: u32,
) -> String {
    let columns = columns.max(1);
    let used_columns = entries.len().min(columns).max(1);
    let rows = entries.len().div_ceil(columns).max(1);
    let total_width = used_columns as u32 * cell_width;
    let total_height = rows as u32 * cell_height;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{}' height='{}' viewBox='0 0 {} {}'>",
        total_width, total_height, total_width, total_height
    ));
    for (index, (graph, name)) in entries.iter().enumerate() {
        let x = (index % columns) as u32 * cell_width;
        let y = (index / columns) as u32 * cell_height;
        let cell_options = DepictOptions {
            width: cell_width,
            height: cell_height,
            padding_px: 18.0,
            background: "#ffffff".to_string(),
            legend: Some(name.to_string()),
        };
        svg.push_str(&format!("<g transform='translate({x},{y})'>"));
        svg.push_str(&render_cell(graph, &cell_options));
        svg.push_str(&format!(
            "<rect width='{}' height='{}' fill='none' stroke='#dddddd'/>",
            cell_width, cell_height
        ));
        svg.push_str("</g>");
    }
    svg.push_str("</svg>");
    svg
}

/// The shapes of one molecule drawing, relative to the cell origin.
fn render_cell(graph: &MoleculeGraph, options: &DepictOptions) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        "<rect width='{}' height='{}' fill='{}'/>",
        options.width, options.height, options.background
    ));

    let coords = layout_2d(graph);
    if coords.is_empty() {
        svg.push_str(&format!(
            "<text x='{:.2}' y='{:.2}' text-anchor='middle' fill='#888888' font-size='12' font-family='DejaVu Sans, Arial, sans-serif'>(no atoms)</text>",
            options.width as f64 / 2.0,
            options.height as f64 / 2.0
        ));
        if let Some(legend) = options.legend.as_ref() {
            svg.push_str(&legend_text(legend, options));
        }
        return svg;
    }

    let points: Vec<Vec2> = coords.iter().map(|c| Vec2 { x: c[0], y: c[1] }).collect();
    let transform = fit_transform(&points, options);
    let screen: Vec<Vec2> = points.iter().map(|p| transform.to_screen(*p)).collect();

    svg.push_str("<g stroke='#3c3c3c' stroke-width='1.6' fill='none'>");
    for edge in graph.edge_references() {
        let a = screen[edge.source().index()];
        let b = screen[edge.target().index()];
        svg.push_str(&bond_svg(a, b, *edge.weight()));
    }
    svg.push_str("</g>");

    for (index, node) in graph.node_indices().enumerate() {
        let atom = &graph[node];
        let label = match atom_label(atom) {
            Some(label) => label,
            None => continue,
        };
        let center = screen[index];
        let info = atom.element.info();
        svg.push_str(&format!(
            "<circle cx='{:.2}' cy='{:.2}' r='8.5' fill='{}'/>",
            center.x, center.y, options.background
        ));
        svg.push_str(&format!(
            "<text x='{:.2}' y='{:.2}' text-anchor='middle' dominant-baseline='middle' fill='{}' font-size='12' font-weight='600' font-family='DejaVu Sans, Arial, sans-serif'>{}</text>",
            center.x,
            center.y,
            label_color(&info.cpk_color),
            escape_xml(&label)
        ));
    }

    if let Some(legend) = options.legend.as_ref() {
        svg.push_str(&legend_text(legend, options));
    }
    svg
}

fn legend_text(legend: &str, options: &DepictOptions) -> String {
    format!(
        "<text x='{:.2}' y='{:.2}' text-anchor='middle' fill='#222222' font-size='12' font-family='DejaVu Sans, Arial, sans-serif'>{}</text>",
        options.width as f64 / 2.0,
        options.height as f64 - 6.0,
        escape_xml(legend)
    )
}

fn fit_transform(points: &[Vec2], options: &DepictOptions) -> Transform {
    let bounds = compute_bounds(points);
    let range_x = (bounds.max_x - bounds.min_x).max(1e-6);
    let range_y = (bounds.max_y - bounds.min_y).max(1e-6);
    let width = options.width as f64;
    let height = options.height as f64;
    let scale_x = (width - 2.0 * options.padding_px) / range_x;
    let scale_y = (height - 2.0 * options.padding_px) / range_y;
    let scale = scale_x.min(scale_y);

    // Center the drawing along the slack axis.
    let offset_x = (width - range_x * scale) / 2.0;
    let offset_y = (height - range_y * scale) / 2.0;
    Transform {
        scale,
        offset_x,
        offset_y,
        max_y: bounds.max_y,
        min_x: bounds.min_x,
    }
}

fn compute_bounds(points: &[Vec2]) -> Bounds {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    if min_x == max_x {
        min_x -= 1.0;
        max_x += 1.0;
    }
    if min_y == max_y {
        min_y -= 1.0;
        max_y += 1.0;
    }
    Bounds {
        min_x,
        max_x,
        min_y,
        max_y,
    }
}

/// One bond as SVG lines. Double and triple bonds become parallel lines and
/// aromatic bonds a solid line paired with a dashed companion.
fn bond_svg(a: Vec2, b: Vec2, bond: Bond) -> String {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length = (dx * dx + dy * dy).sqrt().max(1e-9);
    let normal = Vec2 {
        x: -dy / length,
        y: dx / length,
    };
    let shifted = |offset: f64| -> (Vec2, Vec2) {
        (
            Vec2 {
                x: a.x + normal.x * offset,
                y: a.y + normal.y * offset,
            },
            Vec2 {
                x: b.x + normal.x * offset,
                y: b.y + normal.y * offset,
            },
        )
    };
    let line = |from: Vec2, to: Vec2, dashed: bool| -> String {
        if dashed {
            format!(
                "<line x1='{:.2}' y1='{:.2}' x2='{:.2}' y2='{:.2}' stroke-dasharray='4 3'/>",
                from.x, from.y, to.x, to.y
            )
        } else {
            format!(
                "<line x1='{:.2}' y1='{:.2}' x2='{:.2}' y2='{:.2}'/>",
                from.x, from.y, to.x, to.y
            )
        }
    };

    match bond {
        Bond::Single => line(a, b, false),
        Bond::Double => {
            let (a1, b1) = shifted(2.2);
            let (a2, b2) = shifted(-2.2);
            format!("{}{}", line(a1, b1, false), line(a2, b2, false))
        }
        Bond::Triple => {
            let (a1, b1) = shifted(3.2);
            let (a2, b2) = shifted(-3.2);
            format!(
                "{}{}{}",
                line(a, b, false),
                line(a1, b1, false),
                line(a2, b2, false)
            )
        }
        Bond::Aromatic => {
            let (a1, b1) = shifted(3.4);
            format!("{}{}", line(a, b, false), line(a1, b1, true))
        }
    }
}

/// The label drawn on an atom, or `None` for plain carbons.
fn atom_label(atom: &Atom) -> Option<String> {
    let decorated = atom.charge != 0 || atom.isotope.is_some();
    if atom.element == Element::C && !decorated {
        return None;
    }
    let mut label = String::new();
    if let Some(isotope) = atom.isotope {
        label.push_str(&isotope.to_string());
    }
    label.push_str(atom.symbol());
    match atom.charge {
        0 => {}
        1 => label.push('+'),
        -1 => label.push('-'),
        charge if charge > 1 => label.push_str(&format!("+{charge}")),
        charge => label.push_str(&charge.to_string()),
    }
    Some(label)
}

/// CPK colors that are too light to read on white fall back to gray.
fn label_color(cpk_color: &str) -> String {
    match luminance(cpk_color) {
        Some(l) if l > 200.0 => "#555555".to_string(),
        Some(_) => cpk_color.to_string(),
        None => "#000000".to_string(),
    }
}

fn luminance(hex: &str) -> Option<f64> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()? as f64;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()? as f64;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()? as f64;
    Some(0.299 * r + 0.587 * g + 0.114 * b)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_smiles;

    #[test]
    fn test_layout_is_deterministic() {
        let molecule = parse_smiles("CCO").expect("Failed to parse SMILES");
        assert_eq!(layout_2d(&molecule), layout_2d(&molecule));
    }

    #[test]
    fn test_layout_bond_lengths() {
        let molecule = parse_smiles("c1ccccc1").expect("Failed to parse SMILES");
        let coords = layout_2d(&molecule);
        for edge in molecule.edge_references() {
            let a = coords[edge.source().index()];
            let b = coords[edge.target().index()];
            let dx = a[0] - b[0];
            let dy = a[1] - b[1];
            let length = (dx * dx + dy * dy).sqrt();
            assert!(
                (length - BOND_LENGTH).abs() < 0.3,
                "bond drawn at length {length}"
            );
        }
    }

    #[test]
    fn test_depict_svg_structure() {
        let molecule = parse_smiles("CCO").expect("Failed to parse SMILES");
        let svg = depict_svg(&molecule, &DepictOptions::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("width='400'"));
        assert!(svg.contains("<line"));
        // The oxygen is labeled, the carbons are not.
        assert!(svg.contains(">O</text>"));
        assert!(!svg.contains(">C</text>"));
    }

    #[test]
    fn test_depict_aromatic_bonds_are_dashed() {
        let molecule = parse_smiles("c1ccccc1").expect("Failed to parse SMILES");
        let svg = depict_svg(&molecule, &DepictOptions::default());
        assert!(svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_depict_charge_labels() {
        let molecule = parse_smiles("[NH4+]").expect("Failed to parse SMILES");
        let svg = depict_svg(&molecule, &DepictOptions::default());
        assert!(svg.contains(">N+</text>"));
    }

    #[test]
    fn test_legend_is_escaped() {
        let molecule = parse_smiles("C").expect("Failed to parse SMILES");
        let options = DepictOptions {
            legend: Some("salt & <pepper>".to_string()),
            ..DepictOptions::default()
        };
        let svg = depict_svg(&molecule, &options);
        assert!(svg.contains("salt &amp; &lt;pepper&gt;"));
    }

    #[test]
    fn test_grid_dimensions() {
        let benzene = parse_smiles("c1ccccc1").expect("Failed to parse SMILES");
        let ethanol = parse_smiles("CCO").expect("Failed to parse SMILES");

        let two = grid_svg(
            &[(&benzene, "Benzene"), (&ethanol, "Ethanol")],
            3,
            250,
            250,
        );
        assert!(two.contains("width='500' height='250'"));
        assert!(two.contains("Benzene"));
        assert!(two.contains("Ethanol"));

        let entries: Vec<(&MoleculeGraph, &str)> = vec![
            (&benzene, "a"),
            (&benzene, "b"),
            (&benzene, "c"),
            (&benzene, "d"),
        ];
        let four = grid_svg(&entries, 3, 250, 250);
        assert!(four.contains("width='750' height='500'"));
        assert!(four.contains("translate(0,250)"));
    }
}
