//! Access and refresh token types plus the signing codec.

pub mod claims;
pub mod codec;

pub use claims::{
    ADMINISTRATOR, AccessToken, AccessTokenData, Claim, DEFAULT_APP_ID, Principal,
    REFRESH_TOKEN_PROVIDER, RefreshToken, claim_types,
};
pub use codec::{TokenCodec, TokenError};
