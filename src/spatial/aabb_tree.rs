//! Axis-aligned bounding box tree over the facets of one structure.
//!
//! Built top-down into a flat node array. Each split cuts the node box at
//! its midpoint on the axis that divides facet centers most evenly; a node
//! becomes a leaf when one side would be empty or the depth limit is reached.

use smallvec::SmallVec;

use crate::geometry::Facet;
use crate::util::{det33, safe_recip, BBox3d, DVec3};

/// Maximum tree depth. Deeper nodes are forced into leaves.
pub const MAX_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    /// Range `first..first + count` of [`AabbTree::facet_indices`].
    Leaf { first: usize, count: usize },
    Inner { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct AabbNode {
    bbox: BBox3d,
    kind: NodeKind,
}

/// Geometric intersection of a ray with a facet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub facet: usize,
    /// Distance along the (unit) ray direction [cm].
    pub distance: f64,
    pub u: f64,
    pub v: f64,
}

/// Result of a tree query.
#[derive(Debug, Clone, Default)]
pub struct TreeHits {
    /// Closest hit that stops the ray.
    pub hard: Option<RayHit>,
    /// Crossings resolved as transparent, in traversal order.
    pub transparent: SmallVec<[RayHit; 4]>,
}

impl TreeHits {
    /// Transparent crossings in front of the hard hit.
    ///
    /// Empty when the ray leaks.
    pub fn passes_before_hit(&self) -> impl Iterator<Item = &RayHit> {
        let limit = self.hard.map(|h| h.distance);
        self.transparent
            .iter()
            .filter(move |t| limit.is_some_and(|d| t.distance < d))
    }
}

/// Spatial index of one structure. Stores facet indices, not facets.
#[derive(Debug, Clone)]
pub struct AabbTree {
    nodes: Vec<AabbNode>,
    facet_indices: Vec<usize>,
    depth: usize,
}

impl AabbTree {
    /// Build the tree over `members`, indices into `facets`.
    #[tracing::instrument(skip_all, fields(facet_count = members.len()))]
    pub fn build(facets: &[Facet], members: &[usize]) -> Self {
        let mut indices = members.to_vec();
        let mut nodes = vec![AabbNode {
            bbox: BBox3d::EMPTY,
            kind: NodeKind::Leaf { first: 0, count: 0 },
        }];
        let mut max_depth = 0;

        struct Task {
            node: usize,
            start: usize,
            end: usize,
            depth: usize,
        }

        let mut stack = vec![Task {
            node: 0,
            start: 0,
            end: indices.len(),
            depth: 0,
        }];

        while let Some(task) = stack.pop() {
            let range = &mut indices[task.start..task.end];
            max_depth = max_depth.max(task.depth);

            let mut bbox = BBox3d::EMPTY;
            for &i in range.iter() {
                bbox.expand_by_box(&facets[i].frame.bbox);
            }
            nodes[task.node].bbox = bbox;

            let leaf = NodeKind::Leaf {
                first: task.start,
                count: range.len(),
            };
            if task.depth + 1 >= MAX_DEPTH || range.len() < 2 {
                nodes[task.node].kind = leaf;
                continue;
            }

            let mid = bbox.center();
            let axis = best_axis(facets, range, mid);
            let left_count = partition(range, |&i| facets[i].frame.center[axis] <= mid[axis]);
            if left_count == 0 || left_count == range.len() {
                nodes[task.node].kind = leaf;
                continue;
            }

            let left_idx = nodes.len();
            for _ in 0..2 {
                nodes.push(AabbNode {
                    bbox: BBox3d::EMPTY,
                    kind: NodeKind::Leaf { first: 0, count: 0 },
                });
            }
            nodes[task.node].kind = NodeKind::Inner {
                left: left_idx,
                right: left_idx + 1,
            };

            let split = task.start + left_count;
            stack.push(Task {
                node: left_idx + 1,
                start: split,
                end: task.end,
                depth: task.depth + 1,
            });
            stack.push(Task {
                node: left_idx,
                start: task.start,
                end: split,
                depth: task.depth + 1,
            });
        }

        tracing::debug!(nodes = nodes.len(), depth = max_depth, "aabb tree built");
        Self {
            nodes,
            facet_indices: indices,
            depth: max_depth,
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Facets referenced by the tree, in leaf order.
    pub fn facet_indices(&self) -> &[usize] {
        &self.facet_indices
    }

    /// Find the closest hard hit along a ray.
    ///
    /// `dir` must be normalized. `exclude` is never tested. Every geometric
    /// intersection is passed to `resolve(facet, distance)`, which decides
    /// whether it stops the ray (`true`) or is a transparent pass.
    pub fn intersect<F>(
        &self,
        facets: &[Facet],
        origin: DVec3,
        dir: DVec3,
        exclude: Option<usize>,
        mut resolve: F,
    ) -> TreeHits
    where
        F: FnMut(usize, f64) -> bool,
    {
        let mut hits = TreeHits::default();
        let inv_dir = safe_recip(dir);
        let mut min_dist = f64::INFINITY;

        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(0);
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !node.bbox.intersects_ray(origin, dir, inv_dir) {
                continue;
            }
            match node.kind {
                NodeKind::Inner { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Leaf { first, count } => {
                    for &id in &self.facet_indices[first..first + count] {
                        if Some(id) == exclude {
                            continue;
                        }
                        let Some((u, v, d)) = ray_facet(&facets[id], origin, dir) else {
                            continue;
                        };
                        let hit = RayHit {
                            facet: id,
                            distance: d,
                            u,
                            v,
                        };
                        if resolve(id, d) {
                            if d < min_dist {
                                min_dist = d;
                                hits.hard = Some(hit);
                            }
                        } else {
                            hits.transparent.push(hit);
                        }
                    }
                }
            }
        }
        hits
    }
}

/// Axis whose midpoint splits facet centers closest to half and half.
///
/// Ties keep the first axis in X, Y, Z order.
fn best_axis(facets: &[Facet], members: &[usize], mid: DVec3) -> usize {
    let half = members.len() as f64 / 2.0;
    let mut best = (0, f64::INFINITY);
    for axis in 0..3 {
        let right = members
            .iter()
            .filter(|&&i| facets[i].frame.center[axis] > mid[axis])
            .count();
        let deviation = (right as f64 - half).abs();
        if deviation < best.1 {
            best = (axis, deviation);
        }
    }
    best.0
}

/// Ray/facet intersection: local `(u, v)` and distance.
///
/// Solves `O + uU + vV = origin + d dir` by Cramer's rule. One-sided facets
/// only see rays coming from the front.
pub fn ray_facet(facet: &Facet, origin: DVec3, dir: DVec3) -> Option<(f64, f64, f64)> {
    let fr = &facet.frame;
    let opposite = -dir;
    let det = fr.nuv.dot(opposite);
    if det == 0.0 || (!facet.props.two_sided && det < 0.0) {
        return None;
    }
    let inv_det = 1.0 / det;
    let int_z = origin - fr.o;

    let u = inv_det * det33(int_z, fr.v, opposite);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let v = inv_det * det33(fr.u, int_z, opposite);
    if !(0.0..=1.0).contains(&v) {
        return None;
    }
    let d = inv_det * fr.nuv.dot(int_z);
    if d <= 0.0 || !facet.contains(u, v) {
        return None;
    }
    Some((u, v, d))
}

/// Partition slice in-place. Returns count of elements where predicate is true.
fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}
