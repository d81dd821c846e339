pub mod action;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod state;
