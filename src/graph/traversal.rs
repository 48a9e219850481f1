//! Graph traversal helpers

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Breadth-first traversal from `start`, at most `max_depth` levels deep
pub fn bfs<T, F>(
    start: &[T],
    max_depth: usize,
    mut get_neighbors: F,
) -> Vec<T>
where
    T: Clone + Eq + Hash,
    F: FnMut(&T) -> Vec<T>,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from_iter(start.iter().cloned());
    let mut result = Vec::new();
    let mut depth = 0;

    while !queue.is_empty() && depth <= max_depth {
        let level_size = queue.len();

        for _ in 0..level_size {
            if let Some(node) = queue.pop_front() {
                if !visited.insert(node.clone()) {
                    continue;
                }

                // Queue unvisited neighbors
                for neighbor in get_neighbors(&node) {
                    if !visited.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }

                result.push(node);
            }
        }

        depth += 1;
    }

    result
}
