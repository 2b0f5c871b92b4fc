mod bounded_walk;
mod gc_id;
mod gc_object;

pub use bounded_walk::{BoundedWalk, DrainOrder};
pub use gc_id::GcRef;
pub use gc_object::{Gc, GcHeader, GcWeak, UNMARKED};
