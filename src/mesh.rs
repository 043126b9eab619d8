


/**
 * The number of neighbor slots that can participate in flux correction:
 * faces and edges of a 3D block (2 sides x 4 sub-slots per face pair, 4
 * side combinations x 2 sub-slots per edge pair), corners excluded.
 */
pub const NUM_FLUX_SLOTS: usize = 48;




#[derive(Clone, Debug)]


/**
 * Index bookkeeping for the blocks on a mesh. Every block carries the same
 * number of interior cells per axis (`nx1 x nx2 x nx3`) plus `ng` ghost
 * layers on each non-degenerate axis. Interior indices run `is..=ie` etc.;
 * `cis..=cie` etc. are the corresponding bounds on the next-coarser
 * representation of the same block (half as many cells). Degenerate axes
 * (extent 1) collapse to index zero on both representations, so the
 * fine/coarse mapping `f = 2c - c_start` holds uniformly.
 */
pub struct MeshIndices {
    pub nx1: usize,
    pub nx2: usize,
    pub nx3: usize,
    pub ng: usize,
    pub is: usize,
    pub ie: usize,
    pub js: usize,
    pub je: usize,
    pub ks: usize,
    pub ke: usize,
    pub cis: usize,
    pub cie: usize,
    pub cjs: usize,
    pub cje: usize,
    pub cks: usize,
    pub cke: usize,
}




// ============================================================================
impl MeshIndices {


    pub fn new(nx1: usize, nx2: usize, nx3: usize, ng: usize) -> Self {

        assert!(ng >= 1, "at least one ghost layer is required");
        assert!(nx1 >= 2 && nx1 % 2 == 0, "nx1 must be even and at least 2");
        assert!(nx2 == 1 || nx2 % 2 == 0, "nx2 must be 1 or even");
        assert!(nx3 == 1 || nx3 % 2 == 0, "nx3 must be 1 or even");
        assert!(nx3 == 1 || nx2 > 1, "nx3 > 1 requires nx2 > 1");

        let (is, js, ks) = (ng, if nx2 > 1 { ng } else { 0 }, if nx3 > 1 { ng } else { 0 });
        let (cis, cjs, cks) = (is, js, ks);

        Self {
            nx1, nx2, nx3, ng,
            is, ie: is + nx1 - 1,
            js, je: js + nx2 - 1,
            ks, ke: ks + nx3 - 1,
            cis, cie: cis + nx1 / 2 - 1,
            cjs, cje: cjs + if nx2 > 1 { nx2 / 2 - 1 } else { 0 },
            cks, cke: cks + if nx3 > 1 { nx3 / 2 - 1 } else { 0 },
        }
    }


    pub fn one_d(&self) -> bool {
        self.nx2 == 1
    }


    pub fn two_d(&self) -> bool {
        self.nx2 > 1 && self.nx3 == 1
    }


    pub fn three_d(&self) -> bool {
        self.nx3 > 1
    }


    /**
     * Return the number of addressable points per axis for an edge-located
     * field array (one more than the cell extent, so staggered positions
     * one past the last interior cell are in range).
     */
    pub fn edge_extent(&self) -> (usize, usize, usize) {
        let n1 = self.nx1 + 2 * self.ng;
        let n2 = if self.nx2 > 1 { self.nx2 + 2 * self.ng } else { 1 };
        let n3 = if self.nx3 > 1 { self.nx3 + 2 * self.ng } else { 1 };
        (n3 + 1, n2 + 1, n1 + 1)
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * Descriptor for the block adjacent to one of a block's neighbor slots:
 * its global id, the rank that owns it, its refinement level, and the slot
 * index in *its* neighbor table where this block appears (the destination
 * buffer for anything we deposit or send there). Produced by the mesh-tree
 * layer; read-only here.
 */
pub struct Neighbor {
    pub gid: usize,
    pub rank: usize,
    pub level: u32,
    pub dest: usize,
}




/**
 * One block's neighbor table. Slots without an adjacent block are `None`.
 */
pub type NeighborSet = [Option<Neighbor>; NUM_FLUX_SLOTS];




#[derive(Clone, Debug, Default)]


/**
 * The blocks owned by this process, stored in ascending global-id order so
 * that a block's index in these vectors equals its local id.
 */
pub struct BlockSet {
    pub gids: Vec<usize>,
    pub levels: Vec<u32>,
    pub neighbors: Vec<NeighborSet>,
}




// ============================================================================
impl BlockSet {


    pub fn new() -> Self {
        Self::default()
    }


    pub fn push(&mut self, gid: usize, level: u32, neighbors: NeighborSet) {
        if let Some(last) = self.gids.last() {
            assert!(gid == last + 1, "blocks must be pushed in contiguous gid order");
        }
        self.gids.push(gid);
        self.levels.push(level);
        self.neighbors.push(neighbors);
    }


    pub fn len(&self) -> usize {
        self.gids.len()
    }


    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }
}




#[derive(Clone, Debug)]


/**
 * Immutable per-process configuration for one exchange: the rank of this
 * process, the first global id owned by every rank (so local ids can be
 * computed for any gid), and the shared block index bookkeeping.
 */
pub struct ExchangeConfig {
    pub rank: usize,
    pub first_gids: Vec<usize>,
    pub indices: MeshIndices,
}




// ============================================================================
impl ExchangeConfig {


    /**
     * Return the local id of the given block on the rank that owns it.
     */
    pub fn local_id(&self, gid: usize, rank: usize) -> usize {
        gid - self.first_gids[rank]
    }
}
