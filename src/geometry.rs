use crate::edge_field::Component;
use crate::mesh::{MeshIndices, NUM_FLUX_SLOTS};




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * Classification of a neighbor slot by the kind of interface it crosses.
 * Faces are 2D interfaces orthogonal to one axis; edges are 1D interfaces
 * where two fixed axes meet. Flux correction exchanges data across faces
 * and across x1x2 edges; the x3x1 and x2x3 edge classes are inert for the
 * supported refinement topologies and every operation on them is a no-op.
 */
pub enum SlotClass {
    X1Face,
    X2Face,
    X3Face,
    X1X2Edge,
    X3X1Edge,
    X2X3Edge,
}




// ============================================================================
impl SlotClass {


    /**
     * Whether any flux data crosses interfaces of this class.
     */
    pub fn active(self) -> bool {
        !matches!(self, SlotClass::X3X1Edge | SlotClass::X2X3Edge)
    }


    /**
     * Whether the given component is exchanged across this class of
     * interface. Only components tangential to the interface participate:
     * the component aligned with a face's orthogonal axis lies in the
     * interface plane and is already double-valued there.
     */
    pub fn participates(self, c: Component) -> bool {
        match self {
            SlotClass::X1Face => matches!(c, Component::E2 | Component::E3),
            SlotClass::X2Face => matches!(c, Component::E1 | Component::E3),
            SlotClass::X3Face => matches!(c, Component::E1 | Component::E2),
            SlotClass::X1X2Edge => matches!(c, Component::E3),
            SlotClass::X3X1Edge | SlotClass::X2X3Edge => false,
        }
    }
}




#[derive(Clone, Copy, Debug)]


/**
 * A fully decoded neighbor slot: its class, which side of the block the
 * interface sits on per fixed axis (`s1`, and `s2` for edges), and the
 * sub-slot bits (`f1`, `f2`) selecting the quadrant of the interface that
 * a finer neighbor occupies. The 48 slots are laid out in groups: x1 faces
 * `0..8`, x2 faces `8..16`, x1x2 edges `16..24`, x3 faces `24..32`, x3x1
 * edges `32..40`, x2x3 edges `40..48`. Face groups hold 2 sides x 4
 * sub-slots; edge groups hold 4 side combinations x 2 sub-slots.
 */
pub struct FluxSlot {
    pub index: usize,
    pub class: SlotClass,
    s1: usize,
    s2: usize,
    f1: usize,
    f2: usize,
}




// ============================================================================
impl FluxSlot {


    /**
     * Decode a slot index. Total for all indices below `NUM_FLUX_SLOTS`;
     * anything else is a neighbor-table construction error.
     */
    pub fn decode(index: usize) -> Self {
        let face = |class, m: usize| Self {
            index,
            class,
            s1: m / 4,
            s2: 0,
            f1: (m % 4) % 2,
            f2: (m % 4) / 2,
        };
        let edge = |class, m: usize| Self {
            index,
            class,
            s1: (m / 2) % 2,
            s2: (m / 2) / 2,
            f1: m % 2,
            f2: 0,
        };
        match index {
            0..=7 => face(SlotClass::X1Face, index),
            8..=15 => face(SlotClass::X2Face, index - 8),
            16..=23 => edge(SlotClass::X1X2Edge, index - 16),
            24..=31 => face(SlotClass::X3Face, index - 24),
            32..=39 => edge(SlotClass::X3X1Edge, index - 32),
            40..=47 => edge(SlotClass::X2X3Edge, index - 40),
            _ => panic!("neighbor slot {} out of range (max {})", index, NUM_FLUX_SLOTS),
        }
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * Inclusive index bounds on the three axes, in `(k, j, i)` order of
 * significance. Iteration is row-major with `i` fastest, which is also the
 * flattened layout of a buffer region.
 */
pub struct IndexBounds {
    pub i0: usize,
    pub i1: usize,
    pub j0: usize,
    pub j1: usize,
    pub k0: usize,
    pub k1: usize,
}




// ============================================================================
impl IndexBounds {


    pub fn len(&self) -> usize {
        (self.i1 - self.i0 + 1) * (self.j1 - self.j0 + 1) * (self.k1 - self.k0 + 1)
    }


    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        let Self { i0, i1, j0, j1, k0, k1 } = *self;
        (k0..=k1).flat_map(move |k| {
            (j0..=j1).flat_map(move |j| (i0..=i1).map(move |i| (k, j, i)))
        })
    }
}




// ============================================================================
// Axis helpers. Axes are numbered 0, 1, 2 for x1, x2, x3. Cell-type ranges
// span the n/2 coarse cells of the interface; position-type ranges span the
// n/2 + 1 staggered positions. Degenerate axes collapse to 0..=0 on both
// representations.

fn extent(ix: &MeshIndices, axis: usize) -> usize {
    [ix.nx1, ix.nx2, ix.nx3][axis]
}

fn fine_start(ix: &MeshIndices, axis: usize) -> usize {
    [ix.is, ix.js, ix.ks][axis]
}

fn coarse_start(ix: &MeshIndices, axis: usize) -> usize {
    [ix.cis, ix.cjs, ix.cks][axis]
}

fn coarse_cells(ix: &MeshIndices, axis: usize) -> (usize, usize) {
    let n = extent(ix, axis);
    let c = coarse_start(ix, axis);
    if n > 1 { (c, c + n / 2 - 1) } else { (0, 0) }
}

fn coarse_positions(ix: &MeshIndices, axis: usize) -> (usize, usize) {
    let n = extent(ix, axis);
    let c = coarse_start(ix, axis);
    if n > 1 { (c, c + n / 2) } else { (0, 0) }
}

fn coarse_face(ix: &MeshIndices, axis: usize, side: usize) -> usize {
    let c = coarse_start(ix, axis);
    if side == 0 { c } else { c + extent(ix, axis) / 2 }
}

fn half_cells(ix: &MeshIndices, axis: usize, f: usize) -> (usize, usize) {
    let n = extent(ix, axis);
    let s = fine_start(ix, axis);
    if n > 1 { (s + f * (n / 2), s + (f + 1) * (n / 2) - 1) } else { (0, 0) }
}

fn half_positions(ix: &MeshIndices, axis: usize, f: usize) -> (usize, usize) {
    let n = extent(ix, axis);
    let s = fine_start(ix, axis);
    if n > 1 { (s + f * (n / 2), s + (f + 1) * (n / 2)) } else { (0, 0) }
}

fn fine_face(ix: &MeshIndices, axis: usize, side: usize) -> usize {
    let s = fine_start(ix, axis);
    if side == 0 { s } else { s + extent(ix, axis) }
}

fn bounds(i: (usize, usize), j: (usize, usize), k: (usize, usize)) -> IndexBounds {
    IndexBounds { i0: i.0, i1: i.1, j0: j.0, j1: j.1, k0: k.0, k1: k.1 }
}




/**
 * Return the coarse-representation bounds of the data a fine block sends
 * across the given slot for the given component. The fixed axes sit at the
 * interface position on the slot's side; cell-type varying axes run over
 * the component's own (averaged) direction, position-type axes over the
 * staggered direction within the interface.
 */
pub fn send_bounds(ix: &MeshIndices, slot: &FluxSlot, c: Component) -> IndexBounds {
    let at = |axis, side| {
        let p = coarse_face(ix, axis, side);
        (p, p)
    };
    match (slot.class, c) {
        (SlotClass::X1Face, Component::E2) => {
            bounds(at(0, slot.s1), coarse_cells(ix, 1), coarse_positions(ix, 2))
        }
        (SlotClass::X1Face, Component::E3) => {
            bounds(at(0, slot.s1), coarse_positions(ix, 1), coarse_cells(ix, 2))
        }
        (SlotClass::X2Face, Component::E1) => {
            bounds(coarse_cells(ix, 0), at(1, slot.s1), coarse_positions(ix, 2))
        }
        (SlotClass::X2Face, Component::E3) => {
            bounds(coarse_positions(ix, 0), at(1, slot.s1), coarse_cells(ix, 2))
        }
        (SlotClass::X3Face, Component::E1) => {
            bounds(coarse_cells(ix, 0), coarse_positions(ix, 1), at(2, slot.s1))
        }
        (SlotClass::X3Face, Component::E2) => {
            bounds(coarse_positions(ix, 0), coarse_cells(ix, 1), at(2, slot.s1))
        }
        (SlotClass::X1X2Edge, Component::E3) => {
            bounds(at(0, slot.s1), at(1, slot.s2), coarse_cells(ix, 2))
        }
        (class, c) => panic!("component {:?} does not participate on {:?}", c, class),
    }
}




/**
 * Return the regular-mesh bounds at which a coarse block scatters the data
 * received from the finer neighbor in the given slot. The sub-slot bits
 * select which quadrant (face) or half (edge) of the interface the
 * neighbor covers; the per-axis sample counts match `send_bounds` exactly.
 */
pub fn recv_bounds(ix: &MeshIndices, slot: &FluxSlot, c: Component) -> IndexBounds {
    let at = |axis, side| {
        let p = fine_face(ix, axis, side);
        (p, p)
    };
    match (slot.class, c) {
        (SlotClass::X1Face, Component::E2) => {
            bounds(at(0, slot.s1), half_cells(ix, 1, slot.f1), half_positions(ix, 2, slot.f2))
        }
        (SlotClass::X1Face, Component::E3) => {
            bounds(at(0, slot.s1), half_positions(ix, 1, slot.f1), half_cells(ix, 2, slot.f2))
        }
        (SlotClass::X2Face, Component::E1) => {
            bounds(half_cells(ix, 0, slot.f1), at(1, slot.s1), half_positions(ix, 2, slot.f2))
        }
        (SlotClass::X2Face, Component::E3) => {
            bounds(half_positions(ix, 0, slot.f1), at(1, slot.s1), half_cells(ix, 2, slot.f2))
        }
        (SlotClass::X3Face, Component::E1) => {
            bounds(half_cells(ix, 0, slot.f1), half_positions(ix, 1, slot.f2), at(2, slot.s1))
        }
        (SlotClass::X3Face, Component::E2) => {
            bounds(half_positions(ix, 0, slot.f1), half_cells(ix, 1, slot.f2), at(2, slot.s1))
        }
        (SlotClass::X1X2Edge, Component::E3) => {
            bounds(at(0, slot.s1), at(1, slot.s2), half_cells(ix, 2, slot.f1))
        }
        (class, c) => panic!("component {:?} does not participate on {:?}", c, class),
    }
}




/**
 * Map a coarse-representation index triple to the fine index of the first
 * sample it covers, via `f = 2c - c_start` per axis.
 */
pub fn fine_map(ix: &MeshIndices, k: usize, j: usize, i: usize) -> (usize, usize, usize) {
    (2 * k - ix.cks, 2 * j - ix.cjs, 2 * i - ix.cis)
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * How fine samples restrict onto one coarse sample: the arithmetic mean of
 * the adjacent pair along the component's own axis, or a direct copy when
 * that axis is degenerate.
 */
pub enum Restriction {
    Copy,
    PairI,
    PairJ,
    PairK,
}




/**
 * Select the restriction operator for a component under the given
 * dimensionality.
 */
pub fn restriction(ix: &MeshIndices, c: Component) -> Restriction {
    match c {
        Component::E1 => Restriction::PairI,
        Component::E2 => if ix.nx2 > 1 { Restriction::PairJ } else { Restriction::Copy },
        Component::E3 => if ix.nx3 > 1 { Restriction::PairK } else { Restriction::Copy },
    }
}




/**
 * Return the per-component payload capacity for slots of the given class:
 * the largest sub-range any participating component requires. Inert
 * classes require no payload at all. Buffer rows hold three regions of
 * this size whether or not all three components participate.
 */
pub fn payload_len(ix: &MeshIndices, class: SlotClass) -> usize {
    let slot = FluxSlot { index: 0, class, s1: 0, s2: 0, f1: 0, f2: 0 };
    Component::ALL
        .iter()
        .filter(|c| class.participates(**c))
        .map(|c| send_bounds(ix, &slot, *c).len())
        .max()
        .unwrap_or(0)
}
