//! Adjacency graph of a symmetric sparsity pattern.

use std::collections::BTreeSet;

use sprs::{CsMatI, SpIndex};

/// Undirected graph over the rows of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct SparsityGraph {
    /// Matrix dimension
    pub n: usize,
    /// Adjacency list (sorted for each vertex)
    pub adj: Vec<BTreeSet<usize>>,
    /// Number of edges
    pub num_edges: usize,
}

impl SparsityGraph {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            adj: vec![BTreeSet::new(); n],
            num_edges: 0,
        }
    }

    /// Graph of the off-diagonal pattern of `a`; either triangle may be stored.
    pub fn from_matrix<T, I, Iptr>(a: &CsMatI<T, I, Iptr>) -> Self
    where
        I: SpIndex,
        Iptr: SpIndex,
    {
        let mut g = Self::new(a.rows());
        for (_, (r, c)) in a.iter() {
            g.add_edge(r.index(), c.index());
        }
        g
    }

    /// Add an undirected edge.
    pub fn add_edge(&mut self, i: usize, j: usize) {
        if i != j && self.adj[i].insert(j) {
            self.adj[j].insert(i);
            self.num_edges += 1;
        }
    }

    pub fn degree(&self, v: usize) -> usize {
        self.adj[v].len()
    }

    /// Minimum degree elimination order, `order[step] = vertex`.
    ///
    /// Ties go to the lowest vertex index, so the result is deterministic.
    pub fn minimum_degree_ordering(&self) -> Vec<usize> {
        let mut ordering = Vec::with_capacity(self.n);
        let mut eliminated = vec![false; self.n];
        let mut adj = self.adj.clone();

        for _ in 0..self.n {
            let Some(v) = (0..self.n)
                .filter(|&u| !eliminated[u])
                .min_by_key(|&u| adj[u].len())
            else {
                break;
            };
            ordering.push(v);
            eliminated[v] = true;

            // Neighbours of v become a clique
            let neighbors: Vec<usize> = adj[v].iter().copied().collect();
            for (a, &u) in neighbors.iter().enumerate() {
                for &w in &neighbors[a + 1..] {
                    adj[u].insert(w);
                    adj[w].insert(u);
                }
            }
            for &u in &neighbors {
                adj[u].remove(&v);
            }
            adj[v].clear();
        }

        ordering
    }
}
