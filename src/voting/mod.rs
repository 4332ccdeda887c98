pub mod backend;
pub mod outcome;
pub mod service;

pub use backend::*;
pub use outcome::*;
pub use service::*;
