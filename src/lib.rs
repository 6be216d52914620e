use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod elements;
pub use elements::*;

mod parse;
pub use parse::*;

mod molecule;
pub use molecule::*;

mod embed;
pub use embed::*;

mod depict;
pub use depict::*;

mod pdb;
pub use pdb::*;

mod sdf;
pub use sdf::*;

mod smi;
pub use smi::*;

mod visualize;
pub use visualize::*;

mod ops;
pub use ops::*;

/// The chemical elements this crate knows about, in atomic-number order.
///
/// Reference data (mass, valence, radii, display color) lives in the
/// compiled-in periodic table and is reached through [`Element::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Element {
    H,
    He,
    Li,
    Be,
    B,
    C,
    N,
    O,
    F,
    Na,
    Mg,
    Al,
    Si,
    P,
    S,
    Cl,
    K,
    Ca,
    Fe,
    Cu,
    Zn,
    Se,
    Br,
    I,
}

impl Element {
    pub const ALL: [Element; 24] = [
        Element::H,
        Element::He,
        Element::Li,
        Element::Be,
        Element::B,
        Element::C,
        Element::N,
        Element::O,
        Element::F,
        Element::Na,
        Element::Mg,
        Element::Al,
        Element::Si,
        Element::P,
        Element::S,
        Element::Cl,
        Element::K,
        Element::Ca,
        Element::Fe,
        Element::Cu,
        Element::Zn,
        Element::Se,
        Element::Br,
        Element::I,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Element::H => "H",
            Element::He => "He",
            Element::Li => "Li",
            Element::Be => "Be",
            Element::B => "B",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::F => "F",
            Element::Na => "Na",
            Element::Mg => "Mg",
            Element::Al => "Al",
            Element::Si => "Si",
            Element::P => "P",
            Element::S => "S",
            Element::Cl => "Cl",
            Element::K => "K",
            Element::Ca => "Ca",
            Element::Fe => "Fe",
            Element::Cu => "Cu",
            Element::Zn => "Zn",
            Element::Se => "Se",
            Element::Br => "Br",
            Element::I => "I",
        }
    }

    /// True for the organic-subset elements that may be written without
    /// brackets in SMILES.
    pub fn in_organic_subset(&self) -> bool {
        matches!(
            self,
            Element::B
                | Element::C
                | Element::N
                | Element::O
                | Element::P
                | Element::S
                | Element::F
                | Element::Cl
                | Element::Br
                | Element::I
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown element symbol '{0}'")]
pub struct ParseElementError(pub String);

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Element::ALL
            .into_iter()
            .find(|element| element.symbol() == s)
            .ok_or_else(|| ParseElementError(s.to_string()))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One atom of a molecular graph.
///
/// `explicit_h` is `Some` when the hydrogen count was fixed by a bracket
/// atom (or by a previous hydrogen-addition pass); `None` means the implicit
/// valence rule still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    pub explicit_h: Option<u8>,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Atom {
            element,
            aromatic: false,
            isotope: None,
            charge: 0,
            explicit_h: None,
        }
    }

    pub fn aromatic(element: Element) -> Self {
        Atom {
            aromatic: true,
            ..Atom::new(element)
        }
    }

    pub fn is_aromatic(&self) -> bool {
        self.aromatic
    }

    pub fn symbol(&self) -> &'static str {
        self.element.symbol()
    }
}

impl From<Element> for Atom {
    fn from(element: Element) -> Self {
        Atom::new(element)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bond {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl Bond {
    /// Bond order as used by the valence model. Aromatic bonds count as 1.5.
    pub fn order(&self) -> f64 {
        match self {
            Bond::Single => 1.0,
            Bond::Double => 2.0,
            Bond::Triple => 3.0,
            Bond::Aromatic => 1.5,
        }
    }
}

pub type MoleculeGraph = petgraph::graph::UnGraph<Atom, Bond>;

/// Installs the global tracing subscriber. The default `level` is overridden
/// by `RUST_LOG` when set. Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_symbols_round_trip() {
        for element in Element::ALL {
            assert_eq!(element.symbol().parse::<Element>(), Ok(element));
        }
        assert!("Xx".parse::<Element>().is_err());
        assert!("c".parse::<Element>().is_err());
    }

    #[test]
    fn test_organic_subset() {
        assert!(Element::C.in_organic_subset());
        assert!(Element::Cl.in_organic_subset());
        assert!(!Element::H.in_organic_subset());
        assert!(!Element::Na.in_organic_subset());
    }

    #[test]
    fn test_bond_orders() {
        assert_eq!(Bond::Single.order(), 1.0);
        assert_eq!(Bond::Double.order(), 2.0);
        assert_eq!(Bond::Triple.order(), 3.0);
        assert_eq!(Bond::Aromatic.order(), 1.5);
    }
}
