//! Controller layer: view events, state transitions, and orchestration over the data layer.

pub mod events;
pub mod orchestration;
pub mod reducer;
