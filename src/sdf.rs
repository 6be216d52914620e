use std::fmt::Write as FmtWrite;
use std::io::Write;

use anyhow::{bail, Context, Result};
use petgraph::visit::EdgeRef;

use crate::{Bond, Molecule, MoleculeGraph, Vec3};

/// Serializes a molecule as one MDL V2000 structure-data record: header
/// block, counts line, atom and bond tables, charge properties, `M  END`,
/// a `NAME` data item, and the `$$$$` terminator.
///
/// Missing coordinates are written as the origin so the record stays
/// well-formed. V2000 caps both tables at 999 entries.
pub fn sdf_record(graph: &MoleculeGraph, coords: Option<&[Vec3]>, name: &str) -> Result<String> {
    if graph.node_count() == 0 {
        bail!("cannot write an SDF record for an empty molecule");
    }
    if graph.node_count() > 999 || graph.edge_count() > 999 {
        bail!(
            "molecule with {} atoms and {} bonds does not fit the V2000 format (max 999 each)",
            graph.node_count(),
            graph.edge_count()
        );
    }

    let mut out = String::new();
    writeln!(out, "{}", name)?;
    writeln!(out, "  smiview          3D")?;
    writeln!(out)?;
    writeln!(
        out,
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
        graph.node_count(),
        graph.edge_count()
    )?;

    for node in graph.node_indices() {
        let atom = &graph[node];
        let position = coords
            .and_then(|all| all.get(node.index()))
            .copied()
            .unwrap_or(Vec3::new(0.0, 0.0, 0.0));
        writeln!(
            out,
            "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
            position.x,
            position.y,
            position.z,
            atom.symbol()
        )?;
    }

    for edge in graph.edge_references() {
        let code = match edge.weight() {
            Bond::Single => 1,
            Bond::Double => 2,
            Bond::Triple => 3,
            Bond::Aromatic => 4,
        };
        writeln!(
            out,
            "{:>3}{:>3}{:>3}  0  0  0  0",
            edge.source().index() + 1,
            edge.target().index() + 1,
            code
        )?;
    }

    // Formal charges go in M  CHG property lines, at most eight per line.
    let charged: Vec<(usize, i8)> = graph
        .node_indices()
        .filter(|node| graph[*node].charge != 0)
        .map(|node| (node.index() + 1, graph[node].charge))
        .collect();
    for chunk in charged.chunks(8) {
        write!(out, "M  CHG{:>3}", chunk.len())?;
        for (serial, charge) in chunk {
            write!(out, " {:>3} {:>3}", serial, charge)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "M  END")?;
    writeln!(out, "> <NAME>")?;
    writeln!(out, "{}", name)?;
    writeln!(out)?;
    writeln!(out, "$$$$")?;
    Ok(out)
}

/// Streams molecules into a multi-record SDF file and keeps count of how
/// many records were written.
pub struct SdfWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> SdfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Appends one molecule as a complete SDF record.
    pub fn write_molecule(&mut self, molecule: &Molecule) -> Result<()> {
        let record = sdf_record(molecule.graph(), molecule.coords(), molecule.name())?;
        self.inner
            .write_all(record.as_bytes())
            .context("failed to write SDF record")?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes buffered output and hands the underlying writer back.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush().context("failed to flush SDF output")?;
        Ok(self.inner)
    }
}
