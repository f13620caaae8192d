pub mod errors;
pub mod request_id;
pub mod security_headers;

pub use errors::{envelope_framework_errors, handle_panic};
pub use request_id::{propagate_request_id, REQUEST_ID_HEADER};
pub use security_headers::with_security_headers;
