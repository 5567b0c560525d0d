pub mod glideins;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod sites;

pub use routes::create_router;
