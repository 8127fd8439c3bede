// src/analysis/mod.rs

pub mod state_machine;
pub mod window;

pub use state_machine::CastBarStateMachine;
pub use window::{FrameWindow, GrayFrame, WindowSlot};
