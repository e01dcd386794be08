//! Clustering of near-duplicate detections.
//!
//! Raw detection lists contain bursts of overlapping hits around every real
//! object. Grouping runs union-find over all pairs under a caller-supplied
//! nearness predicate, reduces each cluster to a representative via a
//! caller-supplied averaging function, and reports the cluster size as a
//! support count. Inputs are already-filtered sparse lists, so the O(n^2)
//! pair scan is the cheap part of a detection cycle.

use crate::util::Rect;

/// A cluster of near-duplicate detections.
#[derive(Clone, Debug)]
pub struct GroupMatch<T> {
    /// Every raw detection that joined this cluster.
    pub detections: Vec<T>,
    /// The averaged representative detection.
    pub representative: T,
    /// Support count, equal to `detections.len()`.
    pub neighbors: usize,
}

/// Groups detections by transitive nearness.
///
/// Clusters with fewer than `min_neighbors` members are dropped when
/// `min_neighbors > 0`; sparse, unsupported detections are usually false
/// positives.
pub fn group_by<T, N, A>(items: &[T], min_neighbors: usize, near: N, average: A) -> Vec<GroupMatch<T>>
where
    T: Clone,
    N: Fn(&T, &T) -> bool,
    A: Fn(&[T]) -> T,
{
    if items.is_empty() {
        return Vec::new();
    }

    let mut parent: Vec<usize> = (0..items.len()).collect();
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            if near(&items[i], &items[j]) {
                union(&mut parent, i, j);
            }
        }
    }

    // Relabel roots to dense cluster indices, preserving first-seen order.
    let mut cluster_of_root: Vec<(usize, usize)> = Vec::new();
    let mut buckets: Vec<Vec<T>> = Vec::new();
    for idx in 0..items.len() {
        let root = find(&mut parent, idx);
        let cluster = match cluster_of_root.iter().find(|(r, _)| *r == root) {
            Some(&(_, cluster)) => cluster,
            None => {
                cluster_of_root.push((root, buckets.len()));
                buckets.push(Vec::new());
                buckets.len() - 1
            }
        };
        buckets[cluster].push(items[idx].clone());
    }

    buckets
        .into_iter()
        .filter(|members| min_neighbors == 0 || members.len() >= min_neighbors)
        .map(|members| GroupMatch {
            representative: average(&members),
            neighbors: members.len(),
            detections: members,
        })
        .collect()
}

fn find(parent: &mut [usize], mut idx: usize) -> usize {
    while parent[idx] != idx {
        // Path halving keeps later lookups short.
        parent[idx] = parent[parent[idx]];
        idx = parent[idx];
    }
    idx
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra == rb {
        return;
    }
    // The higher-numbered root attaches under the lower one.
    if ra < rb {
        parent[rb] = ra;
    } else {
        parent[ra] = rb;
    }
}

/// Nearness predicate for rectangles.
///
/// Two rectangles are near when one contains the other, or when all four
/// edges differ by no more than
/// `threshold * (min(height_a, height_b) + min(width_a, width_b))`.
pub fn near_rectangles(a: &Rect, b: &Rect, threshold: f32) -> bool {
    if a.contains_rect(b) || b.contains_rect(a) {
        return true;
    }
    let delta = threshold * (a.height.min(b.height) + a.width.min(b.width)) as f32;
    (a.x - b.x).abs() as f32 <= delta
        && (a.y - b.y).abs() as f32 <= delta
        && (a.right() - b.right()).abs() as f32 <= delta
        && (a.bottom() - b.bottom()).abs() as f32 <= delta
}

/// Field-wise mean of a rectangle group, each field rounded up.
pub fn average_rectangles(rects: &[Rect]) -> Rect {
    let count = rects.len() as f64;
    let ceil_mean = |sum: i64| (sum as f64 / count).ceil() as i32;
    Rect::new(
        ceil_mean(rects.iter().map(|r| i64::from(r.x)).sum()),
        ceil_mean(rects.iter().map(|r| i64::from(r.y)).sum()),
        ceil_mean(rects.iter().map(|r| i64::from(r.width)).sum()),
        ceil_mean(rects.iter().map(|r| i64::from(r.height)).sum()),
    )
}

/// Rectangle clustering with the standard predicate and averaging.
pub fn group_rectangles(
    rects: &[Rect],
    threshold: f32,
    min_neighbors: usize,
) -> Vec<GroupMatch<Rect>> {
    group_by(
        rects,
        min_neighbors,
        |a, b| near_rectangles(a, b, threshold),
        average_rectangles,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_rectangles_share_a_group() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(1, 1, 10, 10),
            Rect::new(100, 100, 5, 5),
        ];
        let groups = group_rectangles(&rects, 0.2, 1);
        assert_eq!(groups.len(), 2);

        let pair = groups.iter().find(|g| g.neighbors == 2).expect("pair group");
        assert_eq!(pair.representative, Rect::new(1, 1, 10, 10));
        let single = groups.iter().find(|g| g.neighbors == 1).expect("singleton");
        assert_eq!(single.representative, Rect::new(100, 100, 5, 5));
    }

    #[test]
    fn min_neighbors_suppresses_singletons() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(1, 1, 10, 10),
            Rect::new(100, 100, 5, 5),
        ];
        let groups = group_rectangles(&rects, 0.2, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].neighbors, 2);
    }

    #[test]
    fn containment_counts_as_near() {
        let outer = Rect::new(0, 0, 100, 100);
        let inner = Rect::new(40, 40, 5, 5);
        assert!(near_rectangles(&outer, &inner, 0.0));
    }

    #[test]
    fn nearness_is_transitive_through_union_find() {
        // a~b and b~c but a!~c directly: all three must merge.
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(3, 0, 10, 10),
            Rect::new(6, 0, 10, 10),
        ];
        let groups = group_rectangles(&rects, 0.2, 0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].neighbors, 3);
    }

    #[test]
    fn average_rounds_up() {
        let rects = [Rect::new(0, 0, 10, 10), Rect::new(1, 1, 10, 10)];
        assert_eq!(average_rectangles(&rects), Rect::new(1, 1, 10, 10));
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let groups = group_rectangles(&[], 0.2, 0);
        assert!(groups.is_empty());
    }
}
