use axum::{response::Response, Extension};

use crate::gate::Gate;

// Ends the session and sends the visitor to the site root.
pub async fn sign_out(Extension(gate): Extension<Gate>) -> Response {
    gate.sign_out_response("/")
}
