//! Index-based adjacency arena built once per analysis

use std::collections::{HashMap, VecDeque};
use topology::HostId;

/// Undirected graph over host ids; nodes are addressed by dense index
pub(crate) struct Graph {
    ids: Vec<HostId>,
    index: HashMap<HostId, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl Graph {
    /// Nodes are indexed in ascending host id order
    pub fn new(host_ids: impl IntoIterator<Item = HostId>) -> Self {
        let mut ids: Vec<HostId> = host_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let index = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let adjacency = vec![Vec::new(); ids.len()];
        Self {
            ids,
            index,
            adjacency,
        }
    }

    /// Add an edge; ignored when either endpoint is not a node
    pub fn connect(&mut self, a: HostId, b: HostId) {
        if let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) {
            self.adjacency[ia].push(ib);
            self.adjacency[ib].push(ia);
        }
    }

    pub fn index_of(&self, id: HostId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn id(&self, index: usize) -> HostId {
        self.ids[index]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Multi-source BFS; `None` for nodes no source reaches
    pub fn depths_from(&self, sources: &[usize]) -> Vec<Option<u32>> {
        let mut depth = vec![None; self.len()];
        let mut queue = VecDeque::with_capacity(self.len());
        for &source in sources {
            if depth[source].is_none() {
                depth[source] = Some(0);
                queue.push_back(source);
            }
        }
        while let Some(node) = queue.pop_front() {
            let next = depth[node].map_or(0, |d| d + 1);
            for &neighbour in &self.adjacency[node] {
                if depth[neighbour].is_none() {
                    depth[neighbour] = Some(next);
                    queue.push_back(neighbour);
                }
            }
        }
        depth
    }

    /// Connected components, each listing node indices in ascending order
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.len()];
        let mut components = Vec::new();
        let mut queue = VecDeque::new();
        for start in 0..self.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            queue.push_back(start);
            let mut members = Vec::new();
            while let Some(node) = queue.pop_front() {
                members.push(node);
                for &neighbour in &self.adjacency[node] {
                    if !seen[neighbour] {
                        seen[neighbour] = true;
                        queue.push_back(neighbour);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depths_from_multiple_sources() {
        let mut graph = Graph::new([1, 2, 3, 4, 5]);
        graph.connect(1, 2);
        graph.connect(2, 3);
        graph.connect(3, 4);
        let depths = graph.depths_from(&[0, 3]);
        assert_eq!(depths, vec![Some(0), Some(1), Some(1), Some(0), None]);
    }

    #[test]
    fn test_components_are_ordered() {
        let mut graph = Graph::new([30, 10, 20, 40]);
        graph.connect(40, 10);
        graph.connect(99, 20);
        let components = graph.components();
        assert_eq!(components, vec![vec![0, 3], vec![1], vec![2]]);
        assert_eq!(graph.id(3), 40);
    }
}
