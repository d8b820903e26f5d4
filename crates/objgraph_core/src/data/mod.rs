//! Per-object persisted field state.

mod container;
mod state;

pub use container::DataContainer;
pub use state::{DataContainerState, ObjectChange, ObjectState};
