pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod live;
pub mod routes;
pub mod shows;
pub mod sse;
pub mod startup;
pub mod throttle;
pub mod voting;

pub use routes::app;
pub use startup::AppState;
