use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Vector2};
use std::collections::{HashMap, VecDeque};

/// Direction of a neighbor along the estimated grid axes: `Right`/`Left`
/// follow ±u, `Down`/`Up` follow ±v.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    fn lattice_step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Angle between an undirected axis `axis_angle` (defined modulo π) and a
/// directed vector angle `vec_angle`, in `[0, π/2]`.
fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;

    let mut diff = (vec_angle - axis_angle).rem_euclid(two_pi);
    if diff >= std::f32::consts::PI {
        diff -= two_pi;
    }
    let diff_abs = diff.abs();

    diff_abs.min(std::f32::consts::PI - diff_abs)
}

fn build_tree(positions: &[Point2<f32>]) -> KdTree<f32, 2> {
    let coords = positions.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
    (&coords).into()
}

/// Median nearest-neighbor distance.
fn median_spacing(tree: &KdTree<f32, 2>, positions: &[Point2<f32>]) -> Option<f32> {
    let mut nearest: Vec<f32> = positions
        .iter()
        .filter_map(|p| {
            tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], 2)
                .into_iter()
                .map(|nn| nn.distance.sqrt())
                .find(|&d| d > 1e-3)
        })
        .collect();
    if nearest.is_empty() {
        return None;
    }
    nearest.sort_by(|a, b| a.total_cmp(b));
    Some(nearest[nearest.len() / 2])
}

/// Estimate the grid's u axis angle from short edges.
///
/// Grid edges come in two orthogonal families, so their angles agree modulo
/// π/2; averaging in quad-angle space folds both families onto one mode.
/// Only edges shorter than 1.2x each node's own nearest distance are used,
/// which keeps diagonals out. Returns an angle in `(-π/4, π/4]`.
fn estimate_axis_angle(
    tree: &KdTree<f32, 2>,
    positions: &[Point2<f32>],
    k: usize,
) -> Option<f32> {
    let mut sum = Vector2::<f32>::zeros();
    for p in positions {
        let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], k);
        let dists: Vec<(u64, f32)> = results
            .into_iter()
            .map(|nn| (nn.item, nn.distance.sqrt()))
            .filter(|&(_, d)| d > 1e-3)
            .collect();
        let Some(&(_, d0)) = dists.first() else {
            continue;
        };
        for &(item, d) in &dists {
            if d > 1.2 * d0 {
                break;
            }
            let q = positions[item as usize];
            let theta = (q.y - p.y).atan2(q.x - p.x);
            sum += Vector2::new((4.0 * theta).cos(), (4.0 * theta).sin());
        }
    }
    if sum.norm_squared() < 1e-6 {
        // No dominant orientation.
        return None;
    }
    Some(0.25 * sum.y.atan2(sum.x))
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates.into_iter() {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbor graph over corner candidates.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>, // For each node, list of neighbors
    /// Unit vector of the +u (`Right`) axis in image space.
    pub axis_u: Vector2<f32>,
    /// Median nearest-neighbor spacing in pixels.
    pub spacing: f32,
}

impl GridGraph {
    /// Link candidates along the estimated grid axes. Returns `None` when
    /// there are too few points to estimate spacing or axes.
    pub fn new(positions: &[Point2<f32>], params: &GridGraphParams) -> Option<Self> {
        if positions.len() < 2 {
            return None;
        }
        let tree = build_tree(positions);
        let spacing = median_spacing(&tree, positions)?;
        let theta_u = estimate_axis_angle(&tree, positions, params.k_neighbors.max(2))?;
        let theta_v = theta_u + std::f32::consts::FRAC_PI_2;
        let axis_u = Vector2::new(theta_u.cos(), theta_u.sin());
        let axis_v = Vector2::new(theta_v.cos(), theta_v.sin());
        let tol = params.orientation_tolerance_deg.to_radians();
        let min_d = params.min_spacing_ratio * spacing;
        let max_d = params.max_spacing_ratio * spacing;

        let mut neighbors = Vec::with_capacity(positions.len());
        for (i, p) in positions.iter().enumerate() {
            let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], params.k_neighbors);
            let mut candidates = Vec::new();
            for nn in results.into_iter() {
                let index = nn.item as usize;
                if index == i {
                    continue; // Skip self
                }
                let e = positions[index] - p;
                let distance = e.norm();
                if distance < min_d || distance > max_d {
                    continue;
                }
                let angle = e.y.atan2(e.x);
                let dev_u = axis_vec_diff(theta_u, angle);
                let dev_v = axis_vec_diff(theta_v, angle);
                let (direction, dev) = if dev_u <= tol && dev_u <= dev_v {
                    let dir = if e.dot(&axis_u) >= 0.0 {
                        NeighborDirection::Right
                    } else {
                        NeighborDirection::Left
                    };
                    (dir, dev_u)
                } else if dev_v <= tol {
                    let dir = if e.dot(&axis_v) >= 0.0 {
                        NeighborDirection::Down
                    } else {
                        NeighborDirection::Up
                    };
                    (dir, dev_v)
                } else {
                    continue;
                };
                candidates.push(NodeNeighbor {
                    direction,
                    index,
                    distance,
                    score: distance / spacing + dev,
                });
            }
            neighbors.push(select_neighbors(candidates));
        }

        // Keep only mutual links so every edge is walked consistently from
        // both ends.
        let mutual: Vec<Vec<NodeNeighbor>> = neighbors
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| {
                        neighbors[n.index]
                            .iter()
                            .any(|back| back.index == i && back.direction == n.direction.opposite())
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Some(Self {
            neighbors: mutual,
            axis_u,
            spacing,
        })
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer lattice coordinates `(node, i, j)` over one component.
///
/// Returns `None` when the walk is inconsistent: a node reached at two
/// different coordinates, or two nodes landing on the same cell.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut coords_of: HashMap<usize, (i32, i32)> = HashMap::new();
    let mut node_at: HashMap<(i32, i32), usize> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0, 0)); // (node index, i, j)

    while let Some((node_idx, i, j)) = queue.pop_front() {
        if let Some(&prev) = coords_of.get(&node_idx) {
            if prev != (i, j) {
                return None;
            }
            continue;
        }
        if node_at.insert((i, j), node_idx).is_some() {
            return None;
        }
        coords_of.insert(node_idx, (i, j));

        for neighbor in &graph.neighbors[node_idx] {
            let (di, dj) = neighbor.direction.lattice_step();
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    let mut coords: Vec<(usize, i32, i32)> = coords_of
        .into_iter()
        .map(|(node, (i, j))| (node, i, j))
        .collect();
    coords.sort_unstable();
    Some(coords)
}
