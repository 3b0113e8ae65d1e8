//! Greedy single-linkage clustering over 2-D positions.
//!
//! Not globally optimal, but deterministic and O(n²), which is acceptable because the
//! adaptive sampler bounds the population before clustering ever runs.

/// Partition `positions` into clusters: start a new cluster at each unvisited point and
/// absorb every unvisited point within `radius` of any member, repeating until the
/// cluster stops growing. Returns index lists into `positions`.
pub(crate) fn single_linkage(positions: &[(f32, f32)], radius: f32) -> Vec<Vec<usize>> {
    let radius_squared = radius * radius;
    let mut visited = vec![false; positions.len()];
    let mut clusters = Vec::new();

    for seed in 0..positions.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut cluster = vec![seed];

        let mut frontier = 0;
        while frontier < cluster.len() {
            let (member_x, member_y) = positions[cluster[frontier]];
            for (index, &(x, y)) in positions.iter().enumerate() {
                if visited[index] {
                    continue;
                }
                let dx = x - member_x;
                let dy = y - member_y;
                if dx * dx + dy * dy <= radius_squared {
                    visited[index] = true;
                    cluster.push(index);
                }
            }
            frontier += 1;
        }
        clusters.push(cluster);
    }
    clusters
}

/// Mean position of the given cluster members.
pub(crate) fn centroid(positions: &[(f32, f32)], members: &[usize]) -> (f32, f32) {
    debug_assert!(!members.is_empty());
    let (sum_x, sum_y) = members.iter().fold((0.0, 0.0), |(sx, sy), &i| {
        (sx + positions[i].0, sy + positions[i].1)
    });
    let inv_len = 1.0 / members.len() as f32;
    (sum_x * inv_len, sum_y * inv_len)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_groups_form_separate_clusters() {
        let positions = vec![
            (0.0, 0.0),
            (5.0, 0.0),
            (10.0, 0.0), // chained into the first cluster via (5, 0)
            (100.0, 100.0),
            (103.0, 100.0),
        ];
        let clusters = single_linkage(&positions, 6.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![0, 1, 2]);
        assert_eq!(clusters[1], vec![3, 4]);
    }

    #[test]
    fn every_point_lands_in_exactly_one_cluster() {
        let positions: Vec<(f32, f32)> = (0..50)
            .map(|i| ((i * 13 % 40) as f32 * 7.0, (i * 29 % 35) as f32 * 9.0))
            .collect();
        let clusters = single_linkage(&positions, 25.0);
        let mut all: Vec<usize> = clusters.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn centroid_is_member_mean() {
        let positions = vec![(0.0, 0.0), (10.0, 0.0), (5.0, 9.0)];
        let (cx, cy) = centroid(&positions, &[0, 1]);
        assert_eq!((cx, cy), (5.0, 0.0));
    }
}
