pub mod token_auth;
