use axum::{response::Json, Extension};
use serde_json::{json, Value};

use crate::gate::CurrentUser;

// The session as the protected site sees it. Behind the gate, so the
// extension is always present.
pub async fn whoami(Extension(user): Extension<CurrentUser>) -> Json<Value> {
    Json(json!({
        "logged_in": user.claim("logged_in"),
        "claims": user.claims(),
    }))
}
