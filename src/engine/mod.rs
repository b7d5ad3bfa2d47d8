pub mod classifier;
pub mod drift;
pub mod features;
pub mod feedback;
pub mod handle;
pub mod kelly;
pub mod pipeline;
pub mod point;
pub mod probability;
pub mod score;
pub mod state;
pub mod tuner;
pub mod volatility;

pub use handle::{CycleReport, EngineHandle};
pub use pipeline::Engine;
