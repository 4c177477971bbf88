use nalgebra::Vector3;

use crate::{gravity, Particles};

/// Depth at which cells stop splitting and keep all their particles.
/// Only reached by (nearly) coincident particles.
const MAX_DEPTH: usize = 48;

#[derive(Clone, Debug, PartialEq)]
pub struct PointMass {
    pub mass: f64,
    pub position: Vector3<f64>,
}

impl PointMass {
    #[must_use]
    pub fn new(mass: f64, position: Vector3<f64>) -> Self {
        Self { mass, position }
    }

    fn zero() -> Self {
        Self::new(0., Vector3::zeros())
    }

    /// Combine two point masses into one at their center of mass.
    fn merge(self, other: &PointMass) -> Self {
        let mass = self.mass + other.mass;
        if mass == 0. {
            return Self::new(0., (self.position + other.position) / 2.);
        }
        Self::new(
            mass,
            (self.position * self.mass + other.position * other.mass) / mass,
        )
    }
}

type Subnodes = [Option<Node>; 8];

/// Barnes-Hut octree over a set of particles.
///
/// The tree stores particle indices, so it borrows nothing and stays valid
/// as long as the particles don't move.
#[derive(Clone, Debug)]
pub struct Octree {
    root: Option<Node>,
    theta: f64,
}

impl Octree {
    #[must_use]
    pub fn new(particles: &Particles, theta: f64) -> Self {
        let root = (!particles.is_empty()).then(|| {
            let (center, width) = get_center_and_width(&particles.positions);
            Node::from_indices(particles, (0..particles.len()).collect(), center, width, 0)
        });

        Self { root, theta }
    }

    /// Total mass and center of mass of the whole tree.
    #[must_use]
    pub fn pseudoparticle(&self) -> Option<&PointMass> {
        self.root.as_ref().map(|node| &node.pseudoparticle)
    }

    /// Acceleration of particle `index` caused by all other particles.
    #[must_use]
    pub fn calculate_acceleration(
        &self,
        particles: &Particles,
        index: usize,
        epsilon_squared: f64,
    ) -> Vector3<f64> {
        self.root.as_ref().map_or_else(Vector3::zeros, |root| {
            root.calculate_acceleration(particles, index, epsilon_squared, self.theta)
        })
    }
}

#[derive(Clone, Debug)]
struct Node {
    subnodes: Option<Box<Subnodes>>,
    pseudoparticle: PointMass,
    /// Particles of a leaf, empty for inner nodes.
    particles: Vec<usize>,
    center: Vector3<f64>,
    width: f64,
}

impl Node {
    fn from_indices(
        particles: &Particles,
        indices: Vec<usize>,
        center: Vector3<f64>,
        width: f64,
        depth: usize,
    ) -> Self {
        if indices.len() <= 1 || depth >= MAX_DEPTH {
            let pseudoparticle = indices.iter().fold(PointMass::zero(), |acc, &i| {
                acc.merge(&PointMass::new(particles.masses[i], particles.positions[i]))
            });
            return Self {
                subnodes: None,
                pseudoparticle,
                particles: indices,
                center,
                width,
            };
        }

        let mut buckets: [Vec<usize>; 8] = Default::default();
        for i in indices {
            buckets[choose_subnode(&center, &particles.positions[i])].push(i);
        }

        let mut subnodes: Subnodes = Default::default();
        let mut pseudoparticle = PointMass::zero();
        for (i, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let node = Node::from_indices(
                particles,
                bucket,
                center_from_subnode(width, center, i),
                width / 2.,
                depth + 1,
            );
            pseudoparticle = pseudoparticle.merge(&node.pseudoparticle);
            subnodes[i] = Some(node);
        }

        Self {
            subnodes: Some(Box::new(subnodes)),
            pseudoparticle,
            particles: Vec::new(),
            center,
            width,
        }
    }

    fn contains(&self, position: &Vector3<f64>) -> bool {
        (position - self.center).amax() <= self.width / 2.
    }

    fn calculate_acceleration(
        &self,
        particles: &Particles,
        index: usize,
        epsilon_squared: f64,
        theta: f64,
    ) -> Vector3<f64> {
        let position = particles.positions[index];

        match &self.subnodes {
            // leaf, sum up exactly
            None => self
                .particles
                .iter()
                .filter(|&&j| j != index)
                .fold(Vector3::zeros(), |acc, &j| {
                    acc + gravity::acceleration(
                        position,
                        particles.masses[j],
                        particles.positions[j],
                        epsilon_squared,
                    )
                }),
            Some(subnodes) => {
                let distance = (self.pseudoparticle.position - position).norm();

                if !self.contains(&position) && self.width < theta * distance {
                    // node is far enough away
                    gravity::acceleration(
                        position,
                        self.pseudoparticle.mass,
                        self.pseudoparticle.position,
                        epsilon_squared,
                    )
                } else {
                    // near field forces, go deeper into tree
                    subnodes
                        .iter()
                        .flatten()
                        .fold(Vector3::zeros(), |acc, node| {
                            acc + node.calculate_acceleration(
                                particles,
                                index,
                                epsilon_squared,
                                theta,
                            )
                        })
                }
            }
        }
    }
}

/// Center and side length of the smallest cube containing all positions.
fn get_center_and_width(positions: &[Vector3<f64>]) -> (Vector3<f64>, f64) {
    let mut v_min = Vector3::repeat(f64::INFINITY);
    let mut v_max = Vector3::repeat(f64::NEG_INFINITY);
    for pos in positions {
        v_min = v_min.inf(pos);
        v_max = v_max.sup(pos);
    }

    let width = (v_max - v_min).max().max(f64::MIN_POSITIVE);
    let center = (v_min + v_max) / 2.;

    (center, width)
}

/// Octant index: bit 0 for x, bit 1 for y, bit 2 for z above the center.
fn choose_subnode(center: &Vector3<f64>, position: &Vector3<f64>) -> usize {
    usize::from(position.x > center.x)
        | usize::from(position.y > center.y) << 1
        | usize::from(position.z > center.z) << 2
}

fn center_from_subnode(width: f64, center: Vector3<f64>, i: usize) -> Vector3<f64> {
    let step_size = width / 4.;
    let sign = |bit: usize| if i & bit == 0 { -step_size } else { step_size };
    center + Vector3::new(sign(1), sign(2), sign(4))
}
