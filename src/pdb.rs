use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use anyhow::{bail, Result};
use petgraph::visit::EdgeRef;

use crate::{MoleculeGraph, Vec3};

/// Serializes a molecule as a PDB-format text block: a COMPND record, one
/// HETATM record per atom, the CONECT table, then TER and END.
///
/// Atoms get names like `C1`, `C2`, `O1`, counted per element in graph
/// order, in residue `UNL 1`. Missing coordinates are written as the
/// origin so the block stays well-formed.
pub fn write_pdb_block(graph: &MoleculeGraph, coords: Option<&[Vec3]>, name: &str) -> Result<String> {
    if graph.node_count() == 0 {
        bail!("cannot write a PDB block for an empty molecule");
    }

    let mut out = String::new();
    writeln!(out, "COMPND    {}", name)?;

    let mut per_element: BTreeMap<&str, usize> = BTreeMap::new();
    for node in graph.node_indices() {
        let atom = &graph[node];
        let symbol = atom.symbol();
        let count = per_element.entry(symbol).or_insert(0);
        *count += 1;
        let atom_name = format_atom_name(&format!("{}{}", symbol, count), symbol);
        let position = coords
            .and_then(|c| c.get(node.index()).copied())
            .unwrap_or_default();
        writeln!(
            out,
            "HETATM{:5} {:4} {:3} {}{:4}{}   {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}          {:>2}{}",
            node.index() + 1,
            atom_name,
            "UNL",
            " ",
            1,
            " ",
            position.x,
            position.y,
            position.z,
            1.00,
            0.00,
            symbol,
            format_charge(atom.charge)
        )?;
    }

    let mut bonds_by_atom: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for edge in graph.edge_references() {
        let a = edge.source().index() + 1;
        let b = edge.target().index() + 1;
        bonds_by_atom.entry(a).or_default().push(b);
        bonds_by_atom.entry(b).or_default().push(a);
    }
    for (serial, bonded) in &mut bonds_by_atom {
        bonded.sort_unstable();
        for chunk in bonded.chunks(4) {
            write!(out, "CONECT{:5}", serial)?;
            for neighbor in chunk {
                write!(out, "{:5}", neighbor)?;
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "TER")?;
    writeln!(out, "END")?;
    Ok(out)
}

/// Format an atom name according to PDB conventions: names of one-letter
/// elements start one column in.
fn format_atom_name(name: &str, element: &str) -> String {
    if name.len() >= 4 {
        name[..4].to_string()
    } else if element.len() == 1 {
        format!(" {:<3}", name)
    } else {
        format!("{:<4}", name)
    }
}

/// Format a formal charge for columns 79-80, e.g. `2+` or `1-`.
fn format_charge(charge: i8) -> String {
    match charge {
        0 => "  ".to_string(),
        c if c > 0 => format!("{}+", c),
        c => format!("{}-", -c),
    }
}
