use crate::mesh::MeshIndices;




#[derive(Clone, Copy, Debug, PartialEq, Eq)]


/**
 * Selector for one of the three edge-aligned flux components. `E1` samples
 * live on edges parallel to x1, `E2` on edges parallel to x2, `E3` on edges
 * parallel to x3.
 */
pub enum Component {
    E1,
    E2,
    E3,
}




// ============================================================================
impl Component {

    pub const ALL: [Component; 3] = [Component::E1, Component::E2, Component::E3];


    /**
     * Return the position of this component in the wire payload (component
     * `v` occupies the `v`-th region of a buffer row).
     */
    pub fn index(self) -> usize {
        match self {
            Component::E1 => 0,
            Component::E2 => 1,
            Component::E3 => 2,
        }
    }
}




#[derive(Clone, Debug, serde::Serialize)]


/**
 * The three edge-aligned flux component arrays of a single block, spanning
 * the interior plus ghost layers, addressed `(k, j, i)` with the final
 * index increasing fastest. All three components share one cubic extent
 * (one point past the cell count on every axis) so staggered positions at
 * the upper interfaces are addressable. Read during pack; written in place
 * during unpack.
 */
pub struct EdgeField {
    extent: (usize, usize, usize),
    e1: Vec<f64>,
    e2: Vec<f64>,
    e3: Vec<f64>,
}




// ============================================================================
impl EdgeField {


    pub fn zeros(indices: &MeshIndices) -> Self {
        let extent = indices.edge_extent();
        let len = extent.0 * extent.1 * extent.2;
        Self {
            extent,
            e1: vec![0.0; len],
            e2: vec![0.0; len],
            e3: vec![0.0; len],
        }
    }


    /**
     * Generate a field whose components are defined from a closure of the
     * component selector and the `(k, j, i)` address.
     */
    pub fn from_function<F>(indices: &MeshIndices, f: F) -> Self
    where
        F: Fn(Component, usize, usize, usize) -> f64
    {
        let mut field = Self::zeros(indices);
        for c in Component::ALL {
            for k in 0..field.extent.0 {
                for j in 0..field.extent.1 {
                    for i in 0..field.extent.2 {
                        let value = f(c, k, j, i);
                        field.set(c, k, j, i, value);
                    }
                }
            }
        }
        field
    }


    pub fn extent(&self) -> (usize, usize, usize) {
        self.extent
    }


    pub fn get(&self, c: Component, k: usize, j: usize, i: usize) -> f64 {
        let n = self.offset(k, j, i);
        match c {
            Component::E1 => self.e1[n],
            Component::E2 => self.e2[n],
            Component::E3 => self.e3[n],
        }
    }


    pub fn set(&mut self, c: Component, k: usize, j: usize, i: usize, value: f64) {
        let n = self.offset(k, j, i);
        match c {
            Component::E1 => self.e1[n] = value,
            Component::E2 => self.e2[n] = value,
            Component::E3 => self.e3[n] = value,
        }
    }


    fn offset(&self, k: usize, j: usize, i: usize) -> usize {
        let (nk, nj, ni) = self.extent;
        if k >= nk || j >= nj || i >= ni {
            panic!("index ({} {} {}) out of range on field ({} {} {})", k, j, i, nk, nj, ni);
        }
        (k * nj + j) * ni + i
    }
}
