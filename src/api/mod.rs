mod health;
mod push;
mod routes;

pub use routes::api_routes;
