use serde::{Deserialize, Serialize};

/// A mapping from process-local to global degree-of-freedom numbering.
///
/// Locally stored dofs consist of a contiguous globally numbered *owned*
/// range followed by *ghost* dofs whose owning partition is elsewhere. The
/// map is built by the external mesh/dof layer and consumed read-only here;
/// assembly uses it to size vectors and to perform the reverse scatter-add of
/// ghost contributions.
///
/// Indices count dof *blocks*; the number of scalar entries per block is
/// [`IndexMap::block_size`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMap {
    owned_start: usize,
    owned_size: usize,
    block_size: usize,
    ghosts: Vec<usize>,
}

impl IndexMap {
    /// A map owning the contiguous global range `0 .. owned_size`, without
    /// ghosts.
    pub fn new(owned_size: usize, block_size: usize) -> Self {
        assert!(block_size >= 1, "Block size must be at least 1");
        Self {
            owned_start: 0,
            owned_size,
            block_size,
            ghosts: Vec::new(),
        }
    }

    /// A map owning the global range `owned_start .. owned_start + owned_size`
    /// with the given ghost dofs.
    ///
    /// A ghost referencing a global dof outside the owned range belongs to a
    /// remote partition. A ghost referencing an *owned* global dof is a local
    /// alias slot: contributions accumulated into it are folded onto the
    /// owned entry by the reverse scatter-add, which is the one-rank
    /// rendition of the ghost exchange.
    pub fn with_ghosts(
        owned_start: usize,
        owned_size: usize,
        block_size: usize,
        ghosts: Vec<usize>,
    ) -> Self {
        assert!(block_size >= 1, "Block size must be at least 1");
        Self {
            owned_start,
            owned_size,
            block_size,
            ghosts,
        }
    }

    /// Number of dof blocks owned by this process.
    pub fn owned_size(&self) -> usize {
        self.owned_size
    }

    /// Number of scalar entries per dof block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_ghosts(&self) -> usize {
        self.ghosts.len()
    }

    /// Number of locally stored dof blocks, owned and ghost.
    pub fn local_size(&self) -> usize {
        self.owned_size + self.ghosts.len()
    }

    /// Global indices of the ghost dof blocks, in local storage order.
    pub fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }

    pub fn is_owned_local(&self, local: usize) -> bool {
        local < self.owned_size
    }

    /// The global index of the locally stored dof block `local`.
    ///
    /// # Panics
    ///
    /// Panics if `local` is out of bounds.
    pub fn local_to_global(&self, local: usize) -> usize {
        if local < self.owned_size {
            self.owned_start + local
        } else {
            self.ghosts[local - self.owned_size]
        }
    }

    /// The local storage index of the global dof block, if it is stored on
    /// this process (owned or ghost).
    pub fn global_to_local(&self, global: usize) -> Option<usize> {
        if global >= self.owned_start && global < self.owned_start + self.owned_size {
            Some(global - self.owned_start)
        } else {
            self.ghosts
                .iter()
                .position(|&g| g == global)
                .map(|i| self.owned_size + i)
        }
    }
}
