pub mod model;
pub mod state;

pub use model::{AdminState, AdminStateUpdate, CvCounts, CvCountsUpdate, Theme};
pub use state::StateStore;
