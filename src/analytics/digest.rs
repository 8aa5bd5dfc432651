//! Privacy-preserving address digests
//!
//! Visitor addresses are never stored. Each one is run through
//! HMAC-SHA256 keyed with a server-held salt and truncated, which is enough
//! to approximate unique visitors and useless for recovering the address.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Length of the stored digest in hex characters
pub const DIGEST_LEN: usize = 16;

/// Keyed, one-way hasher for client addresses
#[derive(Clone)]
pub struct IpHasher {
    mac: Hmac<Sha256>,
}

impl IpHasher {
    pub fn new(salt: impl AsRef<[u8]>) -> Result<Self> {
        let mac = Hmac::<Sha256>::new_from_slice(salt.as_ref())
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
        Ok(Self { mac })
    }

    /// Build from an optional configured salt.
    /// Without one a random key is generated (WARNING: digests won't survive restarts)
    pub fn from_config(salt: Option<&str>) -> Result<Self> {
        match salt {
            Some(s) => Self::new(s),
            None => {
                use rand::RngExt;
                let mut rng = rand::rng();
                let key: Vec<u8> = (0..32).map(|_| rng.random::<u8>()).collect();
                Self::new(key)
            }
        }
    }

    /// Hex digest of `address`, truncated to [`DIGEST_LEN`] characters
    pub fn digest(&self, address: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(address.as_bytes());
        let mut digest = hex::encode(mac.finalize().into_bytes());
        digest.truncate(DIGEST_LEN);
        digest
    }
}

impl std::fmt::Debug for IpHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpHasher").finish_non_exhaustive()
    }
}
