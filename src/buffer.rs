//! Per-slot exchange buffers shared by all blocks on a process. Each pool
//! owns a flat arena with one row per local block; a row holds three
//! equally-sized component regions whether or not all three components
//! participate on that slot class. Rows are exclusively written by one
//! (block, slot) work unit per phase, so the arena needs no locking and is
//! reset wholesale between phases rather than region by region.

/// Completion state of one expected incoming transfer. `Waiting` from the
/// moment a receive is posted until the data lands, `Received` afterwards;
/// never regresses within a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommStatus {
    Waiting,
    Received,
}

/// A posted asynchronous receive that has not yet resolved. Stored as
/// `Option<RecvTicket>` and taken when the matching message arrives, so
/// "nothing in flight" is the type-checked empty state rather than a
/// sentinel value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecvTicket {
    pub tag: u64,
}

/// A posted asynchronous send awaiting completion confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendTicket {
    pub rank: usize,
    pub tag: u64,
}

/// The send side of one slot's exchange buffer.
pub struct SendPool {
    ndat: usize,
    data: Vec<f64>,
    tickets: Vec<Option<SendTicket>>,
}

impl SendPool {
    pub fn new(ndat: usize, num_blocks: usize) -> Self {
        Self {
            ndat,
            data: vec![0.0; 3 * ndat * num_blocks],
            tickets: vec![None; num_blocks],
        }
    }

    pub fn ndat(&self) -> usize {
        self.ndat
    }

    pub fn row(&self, block: usize) -> &[f64] {
        let w = 3 * self.ndat;
        &self.data[block * w..(block + 1) * w]
    }

    pub fn row_mut(&mut self, block: usize) -> &mut [f64] {
        let w = 3 * self.ndat;
        &mut self.data[block * w..(block + 1) * w]
    }

    pub fn ticket(&self, block: usize) -> Option<SendTicket> {
        self.tickets[block]
    }

    pub fn set_ticket(&mut self, block: usize, ticket: SendTicket) {
        self.tickets[block] = Some(ticket);
    }

    pub fn take_ticket(&mut self, block: usize) -> Option<SendTicket> {
        self.tickets[block].take()
    }
}

/// The receive side of one slot's exchange buffer, with per-block
/// completion status. Status entries start out `Received` so an idle pool
/// (nothing posted) reads as complete.
pub struct RecvPool {
    ndat: usize,
    data: Vec<f64>,
    status: Vec<CommStatus>,
    tickets: Vec<Option<RecvTicket>>,
}

impl RecvPool {
    pub fn new(ndat: usize, num_blocks: usize) -> Self {
        Self {
            ndat,
            data: vec![0.0; 3 * ndat * num_blocks],
            status: vec![CommStatus::Received; num_blocks],
            tickets: vec![None; num_blocks],
        }
    }

    pub fn ndat(&self) -> usize {
        self.ndat
    }

    pub fn row(&self, block: usize) -> &[f64] {
        let w = 3 * self.ndat;
        &self.data[block * w..(block + 1) * w]
    }

    pub fn row_mut(&mut self, block: usize) -> &mut [f64] {
        let w = 3 * self.ndat;
        &mut self.data[block * w..(block + 1) * w]
    }

    pub fn status(&self, block: usize) -> CommStatus {
        self.status[block]
    }

    pub fn mark_waiting(&mut self, block: usize) {
        self.status[block] = CommStatus::Waiting;
    }

    pub fn mark_received(&mut self, block: usize) {
        self.status[block] = CommStatus::Received;
    }

    pub fn ticket(&self, block: usize) -> Option<RecvTicket> {
        self.tickets[block]
    }

    pub fn set_ticket(&mut self, block: usize, ticket: RecvTicket) {
        self.tickets[block] = Some(ticket);
    }

    pub fn take_ticket(&mut self, block: usize) -> Option<RecvTicket> {
        self.tickets[block].take()
    }

    /// Whether any posted receive on this pool is still unresolved.
    pub fn outstanding(&self) -> bool {
        self.tickets.iter().any(|t| t.is_some())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rows_are_disjoint_and_three_components_wide() {
        let mut pool = SendPool::new(5, 3);
        pool.row_mut(1).iter_mut().for_each(|x| *x = 2.0);
        assert_eq!(pool.row(0), &[0.0; 15][..]);
        assert_eq!(pool.row(1), &[2.0; 15][..]);
        assert_eq!(pool.row(2), &[0.0; 15][..]);
    }

    #[test]
    fn status_starts_received_and_tracks_posting() {
        let mut pool = RecvPool::new(4, 2);
        assert_eq!(pool.status(0), CommStatus::Received);
        pool.mark_waiting(0);
        assert_eq!(pool.status(0), CommStatus::Waiting);
        pool.mark_received(0);
        assert_eq!(pool.status(0), CommStatus::Received);
    }

    #[test]
    fn tickets_are_consumed_exactly_once() {
        let mut pool = RecvPool::new(1, 1);
        pool.set_ticket(0, RecvTicket { tag: 7 });
        assert!(pool.outstanding());
        assert_eq!(pool.take_ticket(0), Some(RecvTicket { tag: 7 }));
        assert_eq!(pool.take_ticket(0), None);
        assert!(!pool.outstanding());
    }

    #[test]
    fn zero_capacity_pools_are_valid_for_inert_slots() {
        let pool = RecvPool::new(0, 4);
        assert_eq!(pool.row(3), &[] as &[f64]);
    }
}
