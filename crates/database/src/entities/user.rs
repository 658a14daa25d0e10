//! User entity definitions

use serde::{Deserialize, Serialize};

/// Minimal user record used to resolve display names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub public_id: String,
    pub email: Option<String>,
    pub full_name: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub email: Option<String>,
    pub role: Option<String>,
}
