pub mod audit;
pub mod conversation;
pub mod dispatch;
pub mod orchestrator;
pub mod state;
