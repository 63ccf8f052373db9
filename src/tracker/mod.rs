pub mod lifecycle;
pub mod state;
pub mod store;

pub use lifecycle::{LifecycleTracker, Thresholds};
pub use state::{OrderState, Phase};
pub use store::StateStore;
