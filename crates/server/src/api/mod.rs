pub mod batch;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod selection;
pub mod torrents;
pub mod view;
pub mod ws;

pub use routes::create_router;
