use std::collections::BTreeMap;

use anyhow::Result;
use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::{
    depict_svg, embed_coordinates, minimize, parse_smiles, sdf_record, write_pdb_block, Atom,
    Bond, DepictOptions, Element, EmbedError, MoleculeGraph, Vec3,
};

/// A molecule plus everything the viewer accumulates around it: an optional
/// 3D conformer and a display name.
///
/// The graph itself stays the single source of structure. Coordinates are
/// attached, never merged in, and are dropped whenever the structure
/// changes underneath them.
#[derive(Debug, Clone)]
pub struct Molecule {
    graph: MoleculeGraph,
    coords: Option<Vec<Vec3>>,
    name: String,
}

impl Molecule {
    /// Parses a SMILES string into a named, conformer-less molecule.
    pub fn from_smiles(smiles: &str) -> Result<Self> {
        let graph = parse_smiles(smiles)?;
        Ok(Self::from_graph(graph))
    }

    pub fn from_graph(graph: MoleculeGraph) -> Self {
        Self {
            graph,
            coords: None,
            name: "Molécula".to_string(),
        }
    }

    pub fn graph(&self) -> &MoleculeGraph {
        &self.graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn coords(&self) -> Option<&[Vec3]> {
        self.coords.as_deref()
    }

    pub fn has_conformer(&self) -> bool {
        self.coords.is_some()
    }

    /// How many hydrogens an atom still implies but does not carry as
    /// graph nodes. Bracket atoms pin the count explicitly; for the
    /// organic subset it is the element's usual valence minus the bond
    /// orders already in use.
    fn implicit_hydrogens(&self, node: NodeIndex) -> u8 {
        let atom = &self.graph[node];
        if let Some(count) = atom.explicit_h {
            return count;
        }
        if !atom.element.in_organic_subset() {
            return 0;
        }
        let bonded: f64 = self
            .graph
            .edges(node)
            .map(|edge| edge.weight().order())
            .sum();
        let free = atom.element.info().valence as i32 - bonded.floor() as i32;
        free.max(0) as u8
    }

    /// Turns every implied hydrogen into a real `H` node bonded to its
    /// heavy atom. Calling this twice is a no-op, and any conformer is
    /// discarded because the old coordinates no longer cover the graph.
    pub fn add_hydrogens(&mut self) {
        let existing: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut added = 0usize;
        for node in existing {
            let count = self.implicit_hydrogens(node);
            for _ in 0..count {
                let hydrogen = self.graph.add_node(Atom::new(Element::H));
                self.graph.add_edge(node, hydrogen, Bond::Single);
                added += 1;
            }
            self.graph[node].explicit_h = Some(0);
        }
        if added > 0 {
            self.coords = None;
            debug!("added {added} explicit hydrogens");
        }
    }

    /// Generates a deterministic 3D conformer for the current graph.
    pub fn embed_3d(&mut self, seed: u64) -> Result<(), EmbedError> {
        let coords = embed_coordinates(&self.graph, seed)?;
        self.coords = Some(coords);
        Ok(())
    }

    /// Relaxes the current conformer and returns its final energy.
    pub fn minimize_energy(&mut self) -> Result<f64, EmbedError> {
        match self.coords.as_mut() {
            Some(coords) => minimize(&self.graph, coords),
            None => Err(EmbedError::NoCoordinates),
        }
    }

    pub fn to_svg(&self, options: &DepictOptions) -> String {
        depict_svg(&self.graph, options)
    }

    pub fn to_pdb_block(&self) -> Result<String> {
        write_pdb_block(&self.graph, self.coords(), &self.name)
    }

    pub fn to_sdf_record(&self) -> Result<String> {
        sdf_record(&self.graph, self.coords(), &self.name)
    }

    /// Molecular formula in Hill order, counting hydrogens that are still
    /// implicit: `C2H6O` for ethanol whether or not hydrogens have been
    /// added as nodes.
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in self.graph.node_indices() {
            let atom = &self.graph[node];
            *counts.entry(atom.symbol()).or_insert(0) += 1;
            let implied = self.implicit_hydrogens(node) as usize;
            if implied > 0 {
                *counts.entry("H").or_insert(0) += implied;
            }
        }

        let mut formula = String::new();
        if counts.contains_key("C") {
            for symbol in ["C", "H"] {
                if let Some(count) = counts.remove(symbol) {
                    formula.push_str(symbol);
                    push_count(&mut formula, count);
                }
            }
        }
        for (symbol, count) in counts {
            formula.push_str(symbol);
            push_count(&mut formula, count);
        }
        formula
    }
}

fn push_count(formula: &mut String, count: usize) {
    if count > 1 {
        formula.push_str(&count.to_string());
    }
}
