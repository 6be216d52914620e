use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::{grid_svg, DepictOptions, Molecule, MoleculeGraph};

/// Renders a molecule to a 2D SVG depiction on disk.
pub fn show_2d(molecule: &Molecule, output: &Path) -> Result<()> {
    let svg = molecule.to_svg(&DepictOptions::default());
    write_artifact(output, svg.as_bytes())?;
    println!("2D depiction written to {}", output.display());
    Ok(())
}

/// Writes a self-contained HTML page with an interactive 3D view of the
/// molecule. The page pulls the 3Dmol.js viewer from its CDN and embeds
/// the molecule's PDB block directly, so it needs no local server.
pub fn show_3d(molecule: &Molecule, output: &Path) -> Result<()> {
    let pdb = molecule.to_pdb_block()?;
    let page = viewer_page(molecule.name(), &molecule.formula(), &pdb);
    write_artifact(output, page.as_bytes())?;
    println!(
        "3D view written to {} (open it in a browser)",
        output.display()
    );
    Ok(())
}

/// Renders a set of molecules as one SVG grid, three per row.
pub fn show_grid(molecules: &[Molecule], output: &Path) -> Result<()> {
    let entries: Vec<(&MoleculeGraph, &str)> = molecules
        .iter()
        .map(|molecule| (molecule.graph(), molecule.name()))
        .collect();
    let svg = grid_svg(&entries, 3, 250, 250);
    write_artifact(output, svg.as_bytes())?;
    println!("Grid image written to {}", output.display());
    Ok(())
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn viewer_page(name: &str, formula: &str, pdb: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="https://3dmol.org/build/3Dmol-min.js"></script>
<style>
body {{ font-family: sans-serif; margin: 16px; }}
#viewer {{ width: 640px; height: 480px; position: relative; }}
</style>
</head>
<body>
<h1>{title} ({formula})</h1>
<div id="viewer"></div>
<script>
const pdb = `{pdb}`;
const viewer = $3Dmol.createViewer("viewer");
viewer.addModel(pdb, "pdb");
viewer.setStyle({{}}, {{ stick: {{ radius: 0.12 }}, sphere: {{ scale: 0.25 }} }});
viewer.zoomTo();
viewer.render();
</script>
</body>
</html>
"#,
        title = escape_html(name),
        formula = escape_html(formula),
        pdb = escape_js_template(pdb),
    )
}

/// The PDB block lands inside a JS template literal, so the literal's own
/// metacharacters have to be escaped.
fn escape_js_template(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
