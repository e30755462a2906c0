//! Order state management.

mod transition;

pub use transition::{StateCoordinator, TransitionError};
