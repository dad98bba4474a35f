pub mod credits;
pub mod health;
pub mod metrics;
pub mod nodes;
pub mod tasks;
pub mod workers;
