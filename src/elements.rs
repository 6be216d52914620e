use std::collections::BTreeMap;

use csv::ReaderBuilder;
use lazy_static::lazy_static;
use tracing::warn;

use crate::Element;

/// Per-element reference data backing the valence model, conformer
/// generation, and depiction.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub symbol: String,
    pub atomic_number: u8,
    /// Standard atomic weight in daltons.
    pub mass: f64,
    /// Default valence used when counting implicit hydrogens.
    pub valence: u8,
    /// Single-bond covalent radius in angstroms.
    pub covalent_radius: f64,
    /// Van der Waals radius in angstroms.
    pub vdw_radius: f64,
    /// CPK display color as a hex string usable in SVG and HTML.
    pub cpk_color: String,
}

fn read_element_table(csv_data: &str) -> BTreeMap<Element, ElementInfo> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let mut table = BTreeMap::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable element record: {e}");
                continue;
            }
        };
        let symbol = record.get(0).unwrap_or("").to_string();
        let element = match symbol.parse::<Element>() {
            Ok(element) => element,
            Err(e) => {
                warn!("Skipping element record: {e}");
                continue;
            }
        };
        let fields = (|| {
            Some(ElementInfo {
                symbol: symbol.clone(),
                atomic_number: record.get(1)?.parse().ok()?,
                mass: record.get(2)?.parse().ok()?,
                valence: record.get(3)?.parse().ok()?,
                covalent_radius: record.get(4)?.parse().ok()?,
                vdw_radius: record.get(5)?.parse().ok()?,
                cpk_color: record.get(6)?.to_string(),
            })
        })();
        match fields {
            Some(info) => {
                table.insert(element, info);
            }
            None => warn!("Skipping element record with malformed fields: {symbol}"),
        }
    }
    table
}

lazy_static! {
    /// The periodic table, parsed once from the CSV data compiled into the
    /// binary. Every [`Element`] variant is guaranteed to have an entry.
    static ref PERIODIC_TABLE: BTreeMap<Element, ElementInfo> = {
        let table = read_element_table(include_str!("elements.csv"));
        for element in Element::ALL {
            assert!(
                table.contains_key(&element),
                "elements.csv has no entry for {element}"
            );
        }
        table
    };
}

impl Element {
    /// Reference data for this element.
    pub fn info(&self) -> &'static ElementInfo {
        &PERIODIC_TABLE[self]
    }
}
