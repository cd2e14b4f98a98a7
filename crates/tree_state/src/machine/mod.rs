//! Node activity - which nodes have a completion in flight

pub mod states;
pub mod tracker;

pub use states::NodeActivity;
pub use tracker::{ActivityGuard, ActivityTracker};
