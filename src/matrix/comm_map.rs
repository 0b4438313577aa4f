//! Halo-exchange communication maps.
//!
//! A [`CommMap`] carries the per-neighbor send/receive index lists a
//! distributed matrix needs for halo exchange: which locally owned rows are
//! shipped to each neighbor rank, and which halo slots are filled from each
//! neighbor in return. [`CommMapBuilder`] derives these maps from raw
//! partition data and the global sparsity structure, ring by ring.
//!
//! Send and receive lists are stored as prefix arrays over a shared neighbor
//! list: segment `i` of `send_maps` (between `send_ptrs[i]` and
//! `send_ptrs[i + 1]`) belongs to `neighbors[i]`, and likewise for the
//! receive side. Receive entries address halo slots, so they are allowed to
//! exceed the owned-row count.

use crate::error::AmgError;

/// Halo-exchange metadata attached to a distributed matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommMap {
    /// Ring count the halo storage was allocated for.
    pub allocated_halo_depth: usize,
    /// Ring count actually imported during exchange.
    pub num_import_rings: usize,
    /// Neighbor ranks, ascending.
    pub neighbors: Vec<u32>,
    /// Prefix array into `send_maps`, length `neighbors.len() + 1`.
    pub send_ptrs: Vec<usize>,
    /// Row indices shipped to each neighbor.
    pub send_maps: Vec<usize>,
    /// Prefix array into `recv_maps`, length `neighbors.len() + 1`.
    pub recv_ptrs: Vec<usize>,
    /// Halo-slot indices filled from each neighbor.
    pub recv_maps: Vec<usize>,
}

impl CommMap {
    /// Check the structural invariants before the map is handed to the
    /// engine: neighbor count within budget, both prefix arrays monotone,
    /// sized `neighbors.len() + 1`, and ending exactly at their map lengths.
    pub fn validate(&self, max_num_neighbors: usize) -> Result<(), AmgError> {
        if self.neighbors.len() > max_num_neighbors {
            return Err(AmgError::InvalidCommunicationMap(format!(
                "{} neighbors exceed the budget of {max_num_neighbors}",
                self.neighbors.len()
            )));
        }
        check_prefix("send_ptrs", &self.send_ptrs, self.neighbors.len(), self.send_maps.len())?;
        check_prefix("recv_ptrs", &self.recv_ptrs, self.neighbors.len(), self.recv_maps.len())?;
        Ok(())
    }

    /// Send segment for neighbor index `i`.
    pub fn send_segment(&self, i: usize) -> &[usize] {
        &self.send_maps[self.send_ptrs[i]..self.send_ptrs[i + 1]]
    }

    /// Receive segment for neighbor index `i`.
    pub fn recv_segment(&self, i: usize) -> &[usize] {
        &self.recv_maps[self.recv_ptrs[i]..self.recv_ptrs[i + 1]]
    }
}

fn check_prefix(
    name: &str,
    ptrs: &[usize],
    num_neighbors: usize,
    map_len: usize,
) -> Result<(), AmgError> {
    if ptrs.len() != num_neighbors + 1 {
        return Err(AmgError::InvalidCommunicationMap(format!(
            "{name} has length {}, expected {}",
            ptrs.len(),
            num_neighbors + 1
        )));
    }
    if ptrs[0] != 0 {
        return Err(AmgError::InvalidCommunicationMap(format!(
            "{name} must start at 0, starts at {}",
            ptrs[0]
        )));
    }
    if ptrs.windows(2).any(|w| w[0] > w[1]) {
        return Err(AmgError::InvalidCommunicationMap(format!(
            "{name} is not monotonically non-decreasing"
        )));
    }
    if ptrs[num_neighbors] != map_len {
        return Err(AmgError::InvalidCommunicationMap(format!(
            "{name} ends at {}, map holds {map_len} entries",
            ptrs[num_neighbors]
        )));
    }
    Ok(())
}

/// Derives send/receive maps and neighbor lists from a partition vector and
/// the global CSR structure, for one rank.
///
/// Ring 1 of the import set is every off-rank row referenced by an owned
/// row; ring `k` is every off-rank row referenced by ring `k - 1` that was
/// not already reached. Send maps are the mirror image: the rows this rank
/// owns that land in each neighbor's import set.
#[derive(Debug, Clone)]
pub struct CommMapBuilder {
    rank: u32,
    halo_depth: usize,
}

impl CommMapBuilder {
    pub fn new(rank: u32) -> Self {
        CommMapBuilder { rank, halo_depth: 1 }
    }

    /// Number of import rings to expand. Defaults to 1.
    pub fn with_halo_depth(mut self, halo_depth: usize) -> Self {
        self.halo_depth = halo_depth;
        self
    }

    /// Build the map for this rank from the global structure.
    ///
    /// `partition[i]` is the rank owning global row `i`; it must cover every
    /// row of the structure. Map entries are in global row numbering, the
    /// numbering the globally partitioned upload path establishes.
    pub fn build(
        &self,
        row_ptrs: &[usize],
        col_indices: &[usize],
        partition: &[u32],
    ) -> Result<CommMap, AmgError> {
        if row_ptrs.is_empty() {
            return Err(AmgError::ShapeMismatch { expected: 1, actual: 0 });
        }
        let n = row_ptrs.len() - 1;
        if partition.len() != n {
            return Err(AmgError::ShapeMismatch { expected: n, actual: partition.len() });
        }
        if let Some(&c) = col_indices.iter().find(|&&c| c >= n) {
            return Err(AmgError::InvalidCommunicationMap(format!(
                "column index {c} outside the {n}-row global structure"
            )));
        }

        // Import set: off-rank rows reached within halo_depth rings of our
        // owned rows, in ring-then-row order.
        let imports = self.expand_rings(row_ptrs, col_indices, partition, self.rank);

        // Export side: rows we own that fall inside each peer's import set.
        let mut peers: Vec<u32> = partition.to_vec();
        peers.sort_unstable();
        peers.dedup();
        let mut exports: Vec<(u32, Vec<usize>)> = Vec::new();
        for &peer in peers.iter().filter(|&&p| p != self.rank) {
            let theirs = self.expand_rings(row_ptrs, col_indices, partition, peer);
            let to_peer: Vec<usize> = theirs
                .into_iter()
                .filter(|&row| partition[row] == self.rank)
                .collect();
            if !to_peer.is_empty() {
                exports.push((peer, to_peer));
            }
        }

        // Neighbor list is the union of receive and send partners.
        let mut neighbors: Vec<u32> = imports.iter().map(|&row| partition[row]).collect();
        neighbors.extend(exports.iter().map(|&(peer, _)| peer));
        neighbors.sort_unstable();
        neighbors.dedup();

        let mut send_ptrs = vec![0];
        let mut send_maps = Vec::new();
        let mut recv_ptrs = vec![0];
        let mut recv_maps = Vec::new();
        for &nb in &neighbors {
            if let Some((_, rows)) = exports.iter().find(|(peer, _)| *peer == nb) {
                send_maps.extend_from_slice(rows);
            }
            send_ptrs.push(send_maps.len());
            recv_maps.extend(imports.iter().copied().filter(|&row| partition[row] == nb));
            recv_ptrs.push(recv_maps.len());
        }

        Ok(CommMap {
            allocated_halo_depth: self.halo_depth,
            num_import_rings: self.halo_depth,
            neighbors,
            send_ptrs,
            send_maps,
            recv_ptrs,
            recv_maps,
        })
    }

    /// Off-rank rows within `halo_depth` rings of `rank`'s owned rows,
    /// ring by ring, ascending within each ring.
    fn expand_rings(
        &self,
        row_ptrs: &[usize],
        col_indices: &[usize],
        partition: &[u32],
        rank: u32,
    ) -> Vec<usize> {
        let n = partition.len();
        let mut reached = vec![false; n];
        let mut frontier: Vec<usize> = (0..n).filter(|&i| partition[i] == rank).collect();
        for &row in &frontier {
            reached[row] = true;
        }
        let mut imports = Vec::new();
        for _ring in 0..self.halo_depth {
            let mut next = Vec::new();
            for &row in &frontier {
                for &col in &col_indices[row_ptrs[row]..row_ptrs[row + 1]] {
                    if !reached[col] {
                        reached[col] = true;
                        next.push(col);
                    }
                }
            }
            next.sort_unstable();
            imports.extend(next.iter().copied().filter(|&row| partition[row] != rank));
            frontier = next;
        }
        imports
    }
}
