use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The acting identity, as verified by the identity provider.
/// Content services never look past `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: bool,
}
