//! Active order bookkeeping: shared entries, state lists, the registry and
//! dependency tracking.

mod dependencies;
mod entry;
mod list;
mod registry;

pub use dependencies::OrderDependencies;
pub use entry::{OrderEntry, SharedOrder};
pub use list::CursorList;
pub use registry::{LazyRegistry, OrderRegistry, RegistryError};

/// List of active orders sharing a state.
pub type OrderList = CursorList<OrderEntry>;
