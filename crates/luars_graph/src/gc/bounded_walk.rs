use std::collections::VecDeque;

/// Order in which deferred items come back out of a [`BoundedWalk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOrder {
    /// First deferred, first resumed. Used by the persistence writer so
    /// populate records follow the order their partial headers were written.
    Fifo,
    /// Last deferred, first resumed. Used by the memory counter.
    Lifo,
}

/// Explicit work list for graph walks that recurse only to a fixed depth.
///
/// A walker recurses while its depth budget lasts; anything reached with
/// the budget spent is parked here and resumed later from a fresh budget.
/// Recursion depth stays bounded no matter how deep the graph is.
#[derive(Debug)]
pub struct BoundedWalk<T> {
    pending: VecDeque<T>,
    order: DrainOrder,
    deferred_total: usize,
}

impl<T> BoundedWalk<T> {
    pub fn new(order: DrainOrder) -> Self {
        BoundedWalk {
            pending: VecDeque::new(),
            order,
            deferred_total: 0,
        }
    }

    /// Budget left for a child one level below `budget`, or `None` when
    /// the child must be deferred instead of visited.
    #[inline]
    pub fn admit(budget: u32) -> Option<u32> {
        budget.checked_sub(1)
    }

    pub fn defer(&mut self, item: T) {
        self.deferred_total += 1;
        self.pending.push_back(item);
    }

    pub fn next_deferred(&mut self) -> Option<T> {
        match self.order {
            DrainOrder::Fifo => self.pending.pop_front(),
            DrainOrder::Lifo => self.pending.pop_back(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of items ever deferred, drained or not.
    pub fn deferred_total(&self) -> usize {
        self.deferred_total
    }

    /// Drop everything still pending, returning how many items were abandoned.
    pub fn abandon(&mut self) -> usize {
        let abandoned = self.pending.len();
        self.pending.clear();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_and_lifo() {
        let mut fifo = BoundedWalk::new(DrainOrder::Fifo);
        let mut lifo = BoundedWalk::new(DrainOrder::Lifo);
        for i in 0..3 {
            fifo.defer(i);
            lifo.defer(i);
        }
        assert_eq!(fifo.next_deferred(), Some(0));
        assert_eq!(lifo.next_deferred(), Some(2));
        assert_eq!(fifo.deferred_total(), 3);
        assert_eq!(lifo.abandon(), 2);
        assert!(lifo.is_empty());
    }

    #[test]
    fn admit_spends_budget() {
        assert_eq!(BoundedWalk::<()>::admit(2), Some(1));
        assert_eq!(BoundedWalk::<()>::admit(0), None);
    }
}
