//! Column encryption seam
//!
//! Encrypted columns pass through a [`FieldCipher`] on their way in and out
//! of storage. No algorithm ships with the crate; [`PlainText`] stores values
//! unchanged.

use crate::core::error::Result;

/// Encrypts and decrypts the textual form of an encrypted column
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, column: &str, plain: &str) -> Result<String>;

    fn decrypt(&self, column: &str, stored: &str) -> Result<String>;
}

/// Identity cipher
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl FieldCipher for PlainText {
    fn encrypt(&self, _column: &str, plain: &str) -> Result<String> {
        Ok(plain.to_string())
    }

    fn decrypt(&self, _column: &str, stored: &str) -> Result<String> {
        Ok(stored.to_string())
    }
}
