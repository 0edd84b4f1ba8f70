//! Secret masking for tool output
//!
//! External tools echo their arguments, configuration and server responses.
//! Anything they print passes through `SecretMasker` before it is logged or
//! placed in an error message.

use secrecy::{ExposeSecret, SecretString};

/// Replacement text for a masked secret
const MASK: &str = "****";

/// Masks registered secrets in arbitrary text
#[derive(Default)]
pub struct SecretMasker {
    secrets: Vec<SecretString>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret to be masked. Empty secrets are ignored.
    pub fn register(&mut self, secret: &SecretString) {
        if !secret.expose_secret().is_empty() {
            self.secrets
                .push(SecretString::new(secret.expose_secret().into()));
        }
    }

    /// Replace every occurrence of every registered secret with `****`
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in &self.secrets {
            masked = masked.replace(secret.expose_secret(), MASK);
        }
        masked
    }

    /// Lossy-decode tool output and mask it
    pub fn mask_bytes(&self, bytes: &[u8]) -> String {
        self.mask(&String::from_utf8_lossy(bytes))
    }
}

impl std::fmt::Debug for SecretMasker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMasker")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}
