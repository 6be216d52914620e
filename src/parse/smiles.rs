use anyhow::{Context, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, success, value},
    error::{convert_error, VerboseError},
    multi::many1,
    sequence::{pair, preceded, tuple},
    IResult,
};
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{Atom, Bond, Element, MoleculeGraph};

#[derive(Error, Debug)]
pub enum SmilesError {
    #[error("Branch start '(' at position {0} without a current atom")]
    BranchNoCurrentAtom(usize),
    #[error("Branch end ')' at position {0} without a matching '('")]
    BranchEndNoStart(usize),
    #[error("Branch '(' left open at end of input")]
    UnclosedBranch,
    #[error("Ring closure '{0}' at position {1} without a current atom")]
    RingClosureNoCurrentAtom(u8, usize),
    #[error("Ring bond {0} opens and closes on the same atom")]
    SelfRingBond(u8),
    #[error("Ring bond {0} left open at end of input")]
    UnclosedRingBond(u8),
    #[error("Incomplete ring closure after '%' at position {0}")]
    IncompleteRingClosure(usize),
    #[error("Unclosed bracket '[' at position {0}")]
    UnclosedBracket(usize),
    #[error("Invalid bracket atom '[{0}]': {1}")]
    InvalidBracketAtom(String, String),
    #[error("Unknown element symbol '{0}' at position {1}")]
    UnknownElement(String, usize),
    #[error("Element '{0}' at position {1} must be written in brackets")]
    ElementNeedsBrackets(String, usize),
    #[error("Bond symbol '{0}' at position {1} has no atom to connect to")]
    DanglingBond(char, usize),
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
}

/// Parses a SMILES string into a [`MoleculeGraph`].
///
/// Covers the organic subset written bare (`B C N O P S F Cl Br I`),
/// aromatic lowercase atoms, branches, single- and two-digit ring closures,
/// explicit bond symbols, dot-separated components, and bracket atoms with
/// isotope, hydrogen count, and charge. Stereo markers (`@`, `/`, `\`) are
/// accepted and ignored. An empty string parses to an empty graph.
pub fn parse_smiles(smiles: &str) -> Result<MoleculeGraph> {
    parse_smiles_helper(smiles).with_context(|| format!("Failed to parse SMILES string {smiles}"))
}

fn parse_smiles_helper(smiles: &str) -> Result<MoleculeGraph, SmilesError> {
    let mut graph = MoleculeGraph::new_undirected();
    let mut current_atom: Option<NodeIndex> = None;
    // A bond symbol waits here, with its source position, until the next
    // atom or ring closure consumes it.
    let mut pending_bond: Option<(Bond, char, usize)> = None;
    let mut branch_stack: Vec<NodeIndex> = Vec::new();
    let mut ring_map: BTreeMap<u8, (NodeIndex, Option<Bond>)> = BTreeMap::new();

    let chars: Vec<char> = smiles.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                match current_atom {
                    Some(atom) => branch_stack.push(atom),
                    None => return Err(SmilesError::BranchNoCurrentAtom(i)),
                }
                i += 1;
            }
            ')' => {
                current_atom = Some(
                    branch_stack
                        .pop()
                        .ok_or(SmilesError::BranchEndNoStart(i))?,
                );
                i += 1;
            }
            '-' | '=' | '#' | ':' => {
                let bond = match c {
                    '-' => Bond::Single,
                    '=' => Bond::Double,
                    '#' => Bond::Triple,
                    _ => Bond::Aromatic,
                };
                pending_bond = Some((bond, c, i));
                i += 1;
            }
            '%' => {
                // Two-digit ring label.
                if i + 2 >= chars.len() {
                    return Err(SmilesError::IncompleteRingClosure(i));
                }
                let digits: String = chars[i + 1..i + 3].iter().collect();
                let ring_number: u8 = digits
                    .parse()
                    .map_err(|_| SmilesError::IncompleteRingClosure(i))?;
                ring_bond(
                    &mut graph,
                    &mut ring_map,
                    &mut pending_bond,
                    current_atom,
                    ring_number,
                    i,
                )?;
                i += 3;
            }
            '0'..='9' => {
                let ring_number = c as u8 - b'0';
                ring_bond(
                    &mut graph,
                    &mut ring_map,
                    &mut pending_bond,
                    current_atom,
                    ring_number,
                    i,
                )?;
                i += 1;
            }
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|&x| x == ']')
                    .map(|rel| i + rel)
                    .ok_or(SmilesError::UnclosedBracket(i))?;
                let content: String = chars[i + 1..end].iter().collect();
                let atom = bracket_atom(&content)?;
                attach_atom(&mut graph, &mut current_atom, &mut pending_bond, atom)?;
                i = end + 1;
            }
            '@' | '/' | '\\' => {
                // Stereochemistry markers carry no connectivity.
                i += 1;
            }
            '.' => {
                // A dot starts a disconnected component.
                if let Some((_, symbol, position)) = pending_bond {
                    return Err(SmilesError::DanglingBond(symbol, position));
                }
                current_atom = None;
                branch_stack.clear();
                i += 1;
            }
            _ => {
                let (atom, width) = organic_atom(&chars, i)?;
                attach_atom(&mut graph, &mut current_atom, &mut pending_bond, atom)?;
                i += width;
            }
        }
    }

    if let Some((_, symbol, position)) = pending_bond {
        return Err(SmilesError::DanglingBond(symbol, position));
    }
    if !branch_stack.is_empty() {
        return Err(SmilesError::UnclosedBranch);
    }
    if let Some((&number, _)) = ring_map.iter().next() {
        return Err(SmilesError::UnclosedRingBond(number));
    }

    Ok(graph)
}

/// Adds `atom` to the graph and bonds it to the current atom. An explicit
/// bond symbol wins; otherwise two adjacent aromatic atoms get an aromatic
/// bond and everything else a single bond.
fn attach_atom(
    graph: &mut MoleculeGraph,
    current_atom: &mut Option<NodeIndex>,
    pending_bond: &mut Option<(Bond, char, usize)>,
    atom: Atom,
) -> Result<(), SmilesError> {
    let new_atom = graph.add_node(atom);
    match *current_atom {
        Some(prev_atom) => {
            let bond_to_use = match pending_bond.take() {
                Some((bond, _, _)) => bond,
                None => default_bond(&graph[prev_atom], &atom),
            };
            graph.add_edge(prev_atom, new_atom, bond_to_use);
        }
        None => {
            if let Some((_, symbol, position)) = pending_bond.take() {
                return Err(SmilesError::DanglingBond(symbol, position));
            }
        }
    }
    *current_atom = Some(new_atom);
    Ok(())
}

fn default_bond(a: &Atom, b: &Atom) -> Bond {
    if a.is_aromatic() && b.is_aromatic() {
        Bond::Aromatic
    } else {
        Bond::Single
    }
}

/// Opens a ring bond on the current atom, or closes a previously opened one.
/// A bond symbol written at either end of the ring bond applies to it.
fn ring_bond(
    graph: &mut MoleculeGraph,
    ring_map: &mut BTreeMap<u8, (NodeIndex, Option<Bond>)>,
    pending_bond: &mut Option<(Bond, char, usize)>,
    current_atom: Option<NodeIndex>,
    ring_number: u8,
    position: usize,
) -> Result<(), SmilesError> {
    let current = current_atom
        .ok_or(SmilesError::RingClosureNoCurrentAtom(ring_number, position))?;
    match ring_map.remove(&ring_number) {
        Some((start_atom, opening_bond)) => {
            if start_atom == current {
                return Err(SmilesError::SelfRingBond(ring_number));
            }
            let bond_to_use = pending_bond
                .take()
                .map(|(bond, _, _)| bond)
                .or(opening_bond)
                .unwrap_or_else(|| default_bond(&graph[start_atom], &graph[current]));
            graph.add_edge(current, start_atom, bond_to_use);
        }
        None => {
            let opening_bond = pending_bond.take().map(|(bond, _, _)| bond);
            ring_map.insert(ring_number, (current, opening_bond));
        }
    }
    Ok(())
}

/// Reads an unbracketed atom at `chars[i..]`. Only the organic subset may be
/// written bare; the two-letter cases are `Cl` and `Br`.
fn organic_atom(chars: &[char], i: usize) -> Result<(Atom, usize), SmilesError> {
    let c = chars[i];
    if c.is_ascii_uppercase() {
        // Prefer the two-letter candidate when it names a known element.
        if let Some(&next) = chars.get(i + 1) {
            if next.is_ascii_lowercase() {
                let candidate: String = [c, next].iter().collect();
                if let Ok(element) = candidate.parse::<Element>() {
                    if element.in_organic_subset() {
                        return Ok((Atom::new(element), 2));
                    }
                }
            }
        }
        let symbol = c.to_string();
        let element = symbol
            .parse::<Element>()
            .map_err(|_| SmilesError::UnknownElement(symbol.clone(), i))?;
        if !element.in_organic_subset() {
            return Err(SmilesError::ElementNeedsBrackets(symbol, i));
        }
        Ok((Atom::new(element), 1))
    } else if c.is_ascii_lowercase() {
        let element = match c {
            'b' => Element::B,
            'c' => Element::C,
            'n' => Element::N,
            'o' => Element::O,
            'p' => Element::P,
            's' => Element::S,
            _ => return Err(SmilesError::UnknownElement(c.to_string(), i)),
        };
        Ok((Atom::aromatic(element), 1))
    } else {
        Err(SmilesError::UnexpectedChar(c, i))
    }
}

// ---------------------------------------------------------------------
// Bracket atom grammar
// ---------------------------------------------------------------------

/// The error type used by the bracket atom combinators.
pub type Error<'a> = VerboseError<&'a str>;

/// A convenient alias for our IResult with that error type.
pub type Res<'a, T> = IResult<&'a str, T, Error<'a>>;

/// The pieces of a bracket atom body, e.g. `13CH2+` or `nH`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BracketAtom {
    isotope: Option<u16>,
    element: Element,
    aromatic: bool,
    hydrogens: u8,
    charge: i8,
}

fn parse_isotope(input: &str) -> Res<u16> {
    map_res(digit1, |digits: &str| digits.parse::<u16>())(input)
}

/// An element written normally, e.g. `Cl`, `Fe`, `C`.
fn parse_standard_symbol(input: &str) -> Res<(Element, bool)> {
    map_res(
        recognize(pair(
            satisfy(|c| c.is_ascii_uppercase()),
            opt(satisfy(|c| c.is_ascii_lowercase())),
        )),
        |symbol: &str| symbol.parse::<Element>().map(|element| (element, false)),
    )(input)
}

/// An aromatic lowercase element, e.g. `c`, `n`, `se`.
fn parse_aromatic_symbol(input: &str) -> Res<(Element, bool)> {
    alt((
        value((Element::Se, true), tag("se")),
        value((Element::B, true), char('b')),
        value((Element::C, true), char('c')),
        value((Element::N, true), char('n')),
        value((Element::O, true), char('o')),
        value((Element::P, true), char('p')),
        value((Element::S, true), char('s')),
    ))(input)
}

fn parse_element_symbol(input: &str) -> Res<(Element, bool)> {
    alt((parse_standard_symbol, parse_aromatic_symbol))(input)
}

/// Chirality markers are parsed so that bracket atoms carrying them stay
/// valid, but they are not recorded.
fn parse_chirality(input: &str) -> Res<()> {
    value((), alt((tag("@@"), tag("@"))))(input)
}

/// `H` with an optional count; a bare `H` means one hydrogen.
fn parse_h_count(input: &str) -> Res<u8> {
    preceded(
        char('H'),
        alt((map_res(digit1, |digits: &str| digits.parse::<u8>()), success(1))),
    )(input)
}

/// `+`/`-` with an optional magnitude, or a run like `++`.
fn parse_charge(input: &str) -> Res<i8> {
    alt((
        map_res(preceded(char('+'), digit1), |digits: &str| {
            digits.parse::<i8>()
        }),
        map_res(preceded(char('-'), digit1), |digits: &str| {
            digits.parse::<i8>().map(|magnitude| -magnitude)
        }),
        map(many1(char('+')), |signs| signs.len() as i8),
        map(many1(char('-')), |signs| -(signs.len() as i8)),
    ))(input)
}

fn parse_bracket_body(input: &str) -> Res<BracketAtom> {
    map(
        tuple((
            opt(parse_isotope),
            parse_element_symbol,
            opt(parse_chirality),
            opt(parse_h_count),
            opt(parse_charge),
            opt(preceded(char(':'), digit1)),
        )),
        |(isotope, (element, aromatic), _chirality, hydrogens, charge, _class)| BracketAtom {
            isotope,
            element,
            aromatic,
            hydrogens: hydrogens.unwrap_or(0),
            charge: charge.unwrap_or(0),
        },
    )(input)
}

/// Parses the text between `[` and `]` into an [`Atom`]. Bracket atoms carry
/// an exact hydrogen count, so `explicit_h` is always set.
fn bracket_atom(content: &str) -> Result<Atom, SmilesError> {
    match all_consuming(parse_bracket_body)(content) {
        Ok((_, bracket)) => Ok(Atom {
            element: bracket.element,
            aromatic: bracket.aromatic,
            isotope: bracket.isotope,
            charge: bracket.charge,
            explicit_h: Some(bracket.hydrogens),
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(
            SmilesError::InvalidBracketAtom(content.to_string(), convert_error(content, e)),
        ),
        Err(nom::Err::Incomplete(_)) => Err(SmilesError::InvalidBracketAtom(
            content.to_string(),
            "incomplete input".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::visit::EdgeRef;

    #[test]
    fn test_parse_ethanol() {
        let smiles = "CCO"; // Ethanol
        let molecule = parse_smiles(smiles).expect("Failed to parse SMILES");

        assert_eq!(molecule.node_count(), 3); // 2 Carbons, 1 Oxygen

        // Check elements
        assert_eq!(molecule[NodeIndex::new(0)].element, Element::C);
        assert_eq!(molecule[NodeIndex::new(1)].element, Element::C);
        assert_eq!(molecule[NodeIndex::new(2)].element, Element::O);

        // Check bonds
        let edges: Vec<_> = molecule.edge_references().collect();
        assert_eq!(edges.len(), 2); // C-C and C-O

        for edge in edges {
            let source = edge.source().index();
            let target = edge.target().index();
            let bond = edge.weight();

            match (source, target) {
                (0, 1) | (1, 0) => assert_eq!(bond, &Bond::Single),
                (1, 2) | (2, 1) => assert_eq!(bond, &Bond::Single),
                _ => panic!("Unexpected bond between {:?} and {:?}", source, target),
            }
        }
    }

    #[test]
    fn test_parse_cyclohexane() {
        let smiles = "C1CCCCC1"; // Cyclohexane
        let molecule = parse_smiles(smiles).expect("Failed to parse SMILES");

        assert_eq!(molecule.node_count(), 6); // 6 Carbons

        for node in molecule.node_indices() {
            assert_eq!(molecule[node].element, Element::C);
            assert!(!molecule[node].is_aromatic());
        }

        // C-C bonds forming a ring
        let edges: Vec<_> = molecule.edge_references().collect();
        assert_eq!(edges.len(), 6);

        // Each carbon should have two bonds (since it's a ring)
        for node in molecule.node_indices() {
            let degree = molecule.edges(node).count();
            assert_eq!(degree, 2, "Node {} has degree {}", node.index(), degree);
        }
    }

    #[test]
    fn test_parse_benzene() {
        let molecule = parse_smiles("c1ccccc1").expect("Failed to parse SMILES");

        assert_eq!(molecule.node_count(), 6);
        assert_eq!(molecule.edge_count(), 6);
        for node in molecule.node_indices() {
            assert_eq!(molecule[node].element, Element::C);
            assert!(molecule[node].is_aromatic());
            assert_eq!(molecule.edges(node).count(), 2);
        }
        for edge in molecule.edge_references() {
            assert_eq!(edge.weight(), &Bond::Aromatic);
        }
    }

    #[test]
    fn test_parse_isobutane() {
        let smiles = "CC(C)C"; // Isobutane
        let molecule = parse_smiles(smiles).expect("Failed to parse SMILES");

        assert_eq!(molecule.node_count(), 4);
        assert_eq!(molecule.edge_count(), 3);

        // The second carbon is the branch point.
        let center = NodeIndex::new(1);
        assert_eq!(molecule.edges(center).count(), 3);
        for node in [0, 2, 3] {
            assert_eq!(molecule.edges(NodeIndex::new(node)).count(), 1);
        }
    }

    #[test]
    fn test_parse_double_and_triple_bonds() {
        let ethene = parse_smiles("C=C").expect("Failed to parse SMILES");
        assert_eq!(ethene.edge_count(), 1);
        for edge in ethene.edge_references() {
            assert_eq!(edge.weight(), &Bond::Double);
        }

        let ethyne = parse_smiles("C#C").expect("Failed to parse SMILES");
        for edge in ethyne.edge_references() {
            assert_eq!(edge.weight(), &Bond::Triple);
        }
    }

    #[test]
    fn test_parse_pyridine() {
        let molecule = parse_smiles("c1ccncc1").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 6);
        let nitrogens: Vec<_> = molecule
            .node_indices()
            .filter(|&node| molecule[node].element == Element::N)
            .collect();
        assert_eq!(nitrogens.len(), 1);
        assert!(molecule[nitrogens[0]].is_aromatic());
    }

    #[test]
    fn test_parse_bracket_atoms() {
        let methane = parse_smiles("[13CH4]").expect("Failed to parse SMILES");
        assert_eq!(methane.node_count(), 1);
        let atom = &methane[NodeIndex::new(0)];
        assert_eq!(atom.element, Element::C);
        assert_eq!(atom.isotope, Some(13));
        assert_eq!(atom.explicit_h, Some(4));
        assert_eq!(atom.charge, 0);

        let ammonium = parse_smiles("[NH4+]").expect("Failed to parse SMILES");
        let atom = &ammonium[NodeIndex::new(0)];
        assert_eq!(atom.element, Element::N);
        assert_eq!(atom.explicit_h, Some(4));
        assert_eq!(atom.charge, 1);

        let iron = parse_smiles("[Fe+2]").expect("Failed to parse SMILES");
        let atom = &iron[NodeIndex::new(0)];
        assert_eq!(atom.element, Element::Fe);
        assert_eq!(atom.charge, 2);

        let pyrrole_n = parse_smiles("[nH]").expect("Failed to parse SMILES");
        let atom = &pyrrole_n[NodeIndex::new(0)];
        assert_eq!(atom.element, Element::N);
        assert!(atom.is_aromatic());
        assert_eq!(atom.explicit_h, Some(1));
    }

    #[test]
    fn test_parse_disconnected_salt() {
        let molecule = parse_smiles("[Na+].[Cl-]").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 2);
        assert_eq!(molecule.edge_count(), 0);
        assert_eq!(molecule[NodeIndex::new(0)].charge, 1);
        assert_eq!(molecule[NodeIndex::new(1)].charge, -1);
    }

    #[test]
    fn test_parse_percent_ring_closure() {
        let molecule = parse_smiles("C%10CCC%10").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 4);
        assert_eq!(molecule.edge_count(), 4);
        for node in molecule.node_indices() {
            assert_eq!(molecule.edges(node).count(), 2);
        }
    }

    #[test]
    fn test_parse_ring_bond_order() {
        // The double bond written on the ring-opening digit applies to the
        // closing bond.
        let molecule = parse_smiles("C=1CCCCC=1").expect("Failed to parse SMILES");
        let double_bonds = molecule
            .edge_references()
            .filter(|edge| edge.weight() == &Bond::Double)
            .count();
        assert_eq!(double_bonds, 1);
    }

    #[test]
    fn test_parse_ignores_stereo_markers() {
        let molecule = parse_smiles("N[C@@H](C)C(=O)O").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 6);
        let molecule = parse_smiles("F/C=C/F").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 4);
    }

    #[test]
    fn test_parse_ciprofloxacin() {
        let smiles = "C1CNCCN1c(c2)c(F)cc3c2N(C4CC4)C=C(C3=O)C(=O)O";
        let molecule = parse_smiles(smiles).expect("Failed to parse SMILES");
        assert!(molecule.node_count() > 20);
        assert!(molecule
            .node_indices()
            .any(|node| molecule[node].element == Element::F));
    }

    #[test]
    fn test_parse_empty_string() {
        let molecule = parse_smiles("").expect("Failed to parse SMILES");
        assert_eq!(molecule.node_count(), 0);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(parse_smiles("C1CC").is_err()); // unclosed ring bond
        assert!(parse_smiles("C(C").is_err()); // unclosed branch
        assert!(parse_smiles(")C").is_err()); // stray branch end
        assert!(parse_smiles("(CC)").is_err()); // branch before any atom
        assert!(parse_smiles("C=").is_err()); // trailing bond symbol
        assert!(parse_smiles("=C").is_err()); // leading bond symbol
        assert!(parse_smiles("C=.C").is_err()); // bond across a dot
        assert!(parse_smiles("C[OH").is_err()); // unclosed bracket
        assert!(parse_smiles("[]").is_err()); // empty bracket
        assert!(parse_smiles("[Xy]").is_err()); // unknown element in bracket
        assert!(parse_smiles("Xx").is_err()); // unknown element
        assert!(parse_smiles("H").is_err()); // hydrogen needs brackets
        assert!(parse_smiles("C11").is_err()); // ring bond onto itself
        assert!(parse_smiles("C%1").is_err()); // truncated two-digit closure
        assert!(parse_smiles("C&C").is_err()); // stray symbol
    }

    #[test]
    fn test_error_positions() {
        let err = parse_smiles_helper("CC)C").unwrap_err();
        assert!(matches!(err, SmilesError::BranchEndNoStart(2)));

        let err = parse_smiles_helper("CC=").unwrap_err();
        assert!(matches!(err, SmilesError::DanglingBond('=', 2)));

        let err = parse_smiles_helper("C1CC2C1").unwrap_err();
        assert!(matches!(err, SmilesError::UnclosedRingBond(2)));
    }
}
