//! Contour extraction and curvature (§4.5 steps 2-3): Moore-neighbor
//! boundary tracing over the edge map, then a three-point angle
//! estimate of curvature at each traced vertex.

use crate::edge::EdgeMap;

/// Clockwise 8-neighborhood offsets, starting north, used by the
/// Moore-neighbor boundary tracing algorithm.
const NEIGHBORS: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Trace every boundary contour in the edge map as an ordered polyline
/// of pixel-space vertices (§4.5 step 2). Each edge pixel is visited
/// at most once, so total cost across all contours is O(edge pixels).
pub fn trace_contours(edges: &EdgeMap) -> Vec<Vec<(f32, f32)>> {
    let mut visited = vec![false; edges.edges.len()];
    let mut contours = Vec::new();

    for y in 0..edges.height as i64 {
        for x in 0..edges.width as i64 {
            let idx = (y as u32 * edges.width + x as u32) as usize;
            if visited[idx] || !edges.is_edge(x, y) {
                continue;
            }
            let contour = trace_one_contour(edges, &mut visited, x, y);
            if contour.len() >= 3 {
                contours.push(contour);
            }
        }
    }

    contours
}

/// Moore-neighbor tracing starting from `(start_x, start_y)`: walk the
/// boundary by searching the 8-neighborhood in a fixed rotational
/// order from the direction of arrival, stopping when we return to the
/// start or exhaust a generous step budget (guards against a
/// degenerate single-pixel loop).
fn trace_one_contour(
    edges: &EdgeMap,
    visited: &mut [bool],
    start_x: i64,
    start_y: i64,
) -> Vec<(f32, f32)> {
    let mut path = vec![(start_x as f32, start_y as f32)];
    mark_visited(edges, visited, start_x, start_y);

    let mut current = (start_x, start_y);
    let mut arrival_dir = 6usize; // pretend we arrived from the west
    let max_steps = edges.width as usize * edges.height as usize;

    for _ in 0..max_steps {
        let mut found = None;
        for offset in 1..=NEIGHBORS.len() {
            let dir = (arrival_dir + offset) % NEIGHBORS.len();
            let (dx, dy) = NEIGHBORS[dir];
            let (nx, ny) = (current.0 + dx, current.1 + dy);
            if edges.is_edge(nx, ny) {
                found = Some((nx, ny, dir));
                break;
            }
        }

        match found {
            Some((nx, ny, dir)) => {
                if (nx, ny) == (start_x, start_y) {
                    break;
                }
                let idx = (ny as u32 * edges.width + nx as u32) as usize;
                if visited[idx] {
                    break;
                }
                mark_visited(edges, visited, nx, ny);
                path.push((nx as f32, ny as f32));
                current = (nx, ny);
                // Re-enter the neighbor search from behind the step we
                // just took, per the standard Moore-tracing rule.
                arrival_dir = (dir + NEIGHBORS.len() / 2 + 1) % NEIGHBORS.len();
            }
            None => break,
        }
    }

    path
}

#[inline]
fn mark_visited(edges: &EdgeMap, visited: &mut [bool], x: i64, y: i64) {
    let idx = (y as u32 * edges.width + x as u32) as usize;
    visited[idx] = true;
}

/// Select the longest contour by vertex count, per §4.5 step 3's
/// "select the longest contour (or top-k merged)" — this crate takes
/// the simpler single-longest-contour reading.
pub fn longest_contour(contours: &[Vec<(f32, f32)>]) -> Option<&[(f32, f32)]> {
    contours
        .iter()
        .max_by_key(|c| c.len())
        .map(|c| c.as_slice())
}

/// Per-vertex curvature in [0, 1] from the local three-point turning
/// angle, normalized by pi. The endpoints reuse their neighbor's value
/// since a three-point angle isn't defined there.
pub fn compute_curvatures(contour: &[(f32, f32)]) -> Vec<f32> {
    let n = contour.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let mut curvatures = vec![0.0f32; n];
    for i in 1..n - 1 {
        let prev = contour[i - 1];
        let cur = contour[i];
        let next = contour[i + 1];

        let v1 = (cur.0 - prev.0, cur.1 - prev.1);
        let v2 = (next.0 - cur.0, next.1 - cur.1);

        let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
        let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();

        curvatures[i] = if len1 < 1e-6 || len2 < 1e-6 {
            0.0
        } else {
            let cosine = ((v1.0 * v2.0 + v1.1 * v2.1) / (len1 * len2)).clamp(-1.0, 1.0);
            let angle = cosine.acos();
            (angle / std::f32::consts::PI).clamp(0.0, 1.0)
        };
    }
    curvatures[0] = curvatures[1];
    curvatures[n - 1] = curvatures[n - 2];
    curvatures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_edge_map() -> EdgeMap {
        let width = 6u32;
        let height = 6u32;
        let mut edges = vec![false; (width * height) as usize];
        for x in 1..5 {
            edges[(1 * width + x) as usize] = true;
            edges[(4 * width + x) as usize] = true;
        }
        for y in 1..5 {
            edges[(y * width + 1) as usize] = true;
            edges[(y * width + 4) as usize] = true;
        }
        EdgeMap {
            width,
            height,
            edges,
        }
    }

    #[test]
    fn traces_a_square_loop() {
        let edges = square_edge_map();
        let contours = trace_contours(&edges);
        assert!(!contours.is_empty());
        let longest = longest_contour(&contours).unwrap();
        assert!(longest.len() >= 12);
    }

    #[test]
    fn straight_segment_has_low_curvature() {
        let contour: Vec<(f32, f32)> = (0..10).map(|i| (i as f32, 0.0)).collect();
        let curvatures = compute_curvatures(&contour);
        assert!(curvatures[5] < 0.1);
    }

    #[test]
    fn sharp_corner_has_high_curvature() {
        let mut contour: Vec<(f32, f32)> = (0..5).map(|i| (i as f32, 0.0)).collect();
        for i in 1..5 {
            contour.push((4.0, i as f32));
        }
        let curvatures = compute_curvatures(&contour);
        assert!(curvatures[4] > 0.5);
    }

    #[test]
    fn short_contour_yields_zero_curvatures() {
        let contour = vec![(0.0, 0.0), (1.0, 0.0)];
        let curvatures = compute_curvatures(&contour);
        assert_eq!(curvatures, vec![0.0, 0.0]);
    }
}
