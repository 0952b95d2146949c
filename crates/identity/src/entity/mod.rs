//! SeaORM entities for the identity store.

pub mod identity_purpose_token;
pub mod identity_role;
pub mod identity_role_claim;
pub mod identity_user;
pub mod identity_user_claim;
pub mod identity_user_login;
pub mod identity_user_role;
pub mod identity_user_token;
