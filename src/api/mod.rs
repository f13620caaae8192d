pub mod extract;
pub mod handlers;
pub mod responses;
pub mod routes;

pub use extract::{ValidatedJson, ValidatedQuery};
pub use routes::{apply_layers, create_router, AppState};
