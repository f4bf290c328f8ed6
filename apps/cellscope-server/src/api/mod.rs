pub mod charts;
pub mod state;
