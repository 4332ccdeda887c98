pub mod feed;
pub mod models;
pub mod pg_feed;
pub mod subscriber;

pub use feed::*;
pub use models::*;
pub use pg_feed::*;
pub use subscriber::*;
