use std::collections::VecDeque;
use std::ops::{Add, Mul, Neg, Sub};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use thiserror::Error;
use tracing::debug;

use crate::{Bond, MoleculeGraph};

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("cannot embed an empty molecule")]
    EmptyMolecule,
    #[error("molecule has no conformer to minimize")]
    NoCoordinates,
    #[error("conformer has {0} coordinates for {1} atoms")]
    CoordinateMismatch(usize, usize),
    #[error("minimization diverged to a non-finite energy")]
    Diverged,
}

/// A point or direction in 3-space, in angstroms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn norm_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

// Knuth's MMIX constants. A tiny linear congruential generator is enough
// here because the only requirement on initial placement is that the same
// seed always yields the same conformer.
const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        let mut rng = Lcg {
            state: seed ^ 0x9E3779B97F4A7C15,
        };
        rng.next_u64();
        rng
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// A direction uniformly distributed on the unit sphere.
    fn unit_vector(&mut self) -> Vec3 {
        let z = 2.0 * self.next_f64() - 1.0;
        let phi = 2.0 * std::f64::consts::PI * self.next_f64();
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * phi.cos(), r * phi.sin(), z)
    }
}

/// Ideal length of a bond: the sum of the covalent radii, shortened for
/// higher bond orders.
fn ideal_bond_length(graph: &MoleculeGraph, a: NodeIndex, b: NodeIndex, bond: Bond) -> f64 {
    let radii = graph[a].element.info().covalent_radius + graph[b].element.info().covalent_radius;
    let factor = match bond {
        Bond::Single => 1.0,
        Bond::Aromatic => 0.93,
        Bond::Double => 0.87,
        Bond::Triple => 0.78,
    };
    radii * factor
}

/// Distance below which two non-bonded atoms start repelling each other.
fn contact_distance(graph: &MoleculeGraph, a: NodeIndex, b: NodeIndex) -> f64 {
    0.8 * (graph[a].element.info().vdw_radius + graph[b].element.info().vdw_radius)
}

/// Generates an initial 3D conformer, deterministically from `seed`.
///
/// Atoms are placed breadth-first from the first atom of each component,
/// one ideal bond length from their parent in a seeded random direction.
/// Disconnected components are offset along x so they cannot overlap. The
/// result is rough; [`minimize`] refines it.
pub fn embed_coordinates(graph: &MoleculeGraph, seed: u64) -> Result<Vec<Vec3>, EmbedError> {
    let n = graph.node_count();
    if n == 0 {
        return Err(EmbedError::EmptyMolecule);
    }

    let mut rng = Lcg::new(seed);
    let mut coords = vec![Vec3::default(); n];
    let mut placed = vec![false; n];
    let mut component_origin = Vec3::default();

    for start in graph.node_indices() {
        if placed[start.index()] {
            continue;
        }
        coords[start.index()] = component_origin;
        placed[start.index()] = true;
        let mut extent: f64 = 0.0;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let mut neighbors: Vec<NodeIndex> = graph.neighbors(node).collect();
            neighbors.sort();
            for next in neighbors {
                if placed[next.index()] {
                    continue;
                }
                let bond = graph
                    .find_edge(node, next)
                    .and_then(|edge| graph.edge_weight(edge).copied())
                    .unwrap_or(Bond::Single);
                let length = ideal_bond_length(graph, node, next, bond);
                coords[next.index()] = coords[node.index()] + rng.unit_vector() * length;
                placed[next.index()] = true;
                extent = extent.max((coords[next.index()] - component_origin).norm());
                queue.push_back(next);
            }
        }
        component_origin = component_origin + Vec3::new(2.0 * extent + 4.0, 0.0, 0.0);
    }

    debug!("embedded {n} atoms with seed {seed}");
    Ok(coords)
}

const BOND_FORCE: f64 = 300.0;
const REPULSION_FORCE: f64 = 60.0;
const MAX_STEPS: usize = 1000;
const GRADIENT_TOLERANCE: f64 = 1e-4;

/// Refines `coords` by steepest descent under a harmonic force field:
/// bond-stretch terms toward the ideal lengths plus a soft repulsion
/// between non-bonded pairs closer than their contact distance. Returns
/// the final energy.
pub fn minimize(graph: &MoleculeGraph, coords: &mut [Vec3]) -> Result<f64, EmbedError> {
    let n = graph.node_count();
    if n == 0 {
        return Err(EmbedError::EmptyMolecule);
    }
    if coords.len() != n {
        return Err(EmbedError::CoordinateMismatch(coords.len(), n));
    }

    let mut step = 0.02;
    let mut energy = field_energy(graph, coords);
    if !energy.is_finite() {
        return Err(EmbedError::Diverged);
    }

    for iteration in 0..MAX_STEPS {
        let gradient = field_gradient(graph, coords);
        let gradient_norm = gradient
            .iter()
            .map(|g| g.norm_squared())
            .sum::<f64>()
            .sqrt();
        if gradient_norm < GRADIENT_TOLERANCE {
            debug!("minimization converged after {iteration} steps at energy {energy:.4}");
            return Ok(energy);
        }

        let trial: Vec<Vec3> = coords
            .iter()
            .zip(&gradient)
            .map(|(position, g)| *position - *g * step)
            .collect();
        let trial_energy = field_energy(graph, &trial);
        if !trial_energy.is_finite() || trial.iter().any(|position| !position.is_finite()) {
            return Err(EmbedError::Diverged);
        }

        if trial_energy < energy {
            coords.copy_from_slice(&trial);
            energy = trial_energy;
            step = (step * 1.1).min(0.05);
        } else {
            // Overshot; retry the same direction with a shorter step.
            step *= 0.5;
            if step < 1e-6 {
                break;
            }
        }
    }

    debug!("minimization stopped at energy {energy:.4}");
    Ok(energy)
}

fn field_energy(graph: &MoleculeGraph, coords: &[Vec3]) -> f64 {
    let mut energy = 0.0;
    for edge in graph.edge_references() {
        let (a, b) = (edge.source(), edge.target());
        let distance = (coords[a.index()] - coords[b.index()]).norm();
        let ideal = ideal_bond_length(graph, a, b, *edge.weight());
        energy += BOND_FORCE * (distance - ideal) * (distance - ideal);
    }
    for a in 0..coords.len() {
        for b in (a + 1)..coords.len() {
            let (node_a, node_b) = (NodeIndex::new(a), NodeIndex::new(b));
            if graph.find_edge(node_a, node_b).is_some() {
                continue;
            }
            let contact = contact_distance(graph, node_a, node_b);
            let distance = (coords[a] - coords[b]).norm();
            if distance < contact {
                energy += REPULSION_FORCE * (contact - distance) * (contact - distance);
            }
        }
    }
    energy
}

fn field_gradient(graph: &MoleculeGraph, coords: &[Vec3]) -> Vec<Vec3> {
    let mut gradient = vec![Vec3::default(); coords.len()];
    for edge in graph.edge_references() {
        let (a, b) = (edge.source(), edge.target());
        let delta = coords[a.index()] - coords[b.index()];
        let distance = delta.norm().max(1e-9);
        let ideal = ideal_bond_length(graph, a, b, *edge.weight());
        let force = delta * (2.0 * BOND_FORCE * (distance - ideal) / distance);
        gradient[a.index()] = gradient[a.index()] + force;
        gradient[b.index()] = gradient[b.index()] - force;
    }
    for a in 0..coords.len() {
        for b in (a + 1)..coords.len() {
            let (node_a, node_b) = (NodeIndex::new(a), NodeIndex::new(b));
            if graph.find_edge(node_a, node_b).is_some() {
                continue;
            }
            let contact = contact_distance(graph, node_a, node_b);
            let delta = coords[a] - coords[b];
            let distance = delta.norm().max(1e-9);
            if distance < contact {
                let force = delta * (-2.0 * REPULSION_FORCE * (contact - distance) / distance);
                gradient[a] = gradient[a] + force;
                gradient[b] = gradient[b] - force;
            }
        }
    }
    gradient
}
