pub mod cost;
pub mod external;
pub mod repository;

pub use cost::*;
pub use external::*;
pub use repository::*;
