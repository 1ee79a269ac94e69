// Crypto module declarations

pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod signing;
pub mod x25519;
