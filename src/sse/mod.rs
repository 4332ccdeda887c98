pub mod models;
pub use models::*;

mod live_updates_sse;

pub use live_updates_sse::live_updates_sse;
