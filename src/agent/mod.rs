pub mod gateway;
pub mod prompt;
pub mod provider;
