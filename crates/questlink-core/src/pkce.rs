use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

/// Length of the PKCE verifier string.
const DEFAULT_VERIFIER_LEN: usize = 64;

/// Length of the CSRF state token echoed through the authorize redirect.
const STATE_TOKEN_LEN: usize = 32;

/// A generated PKCE verifier/challenge pair.
///
/// The verifier stays on this side of the redirect; only the challenge is
/// sent to the provider's authorize endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a PKCE pair using the thread-local RNG.
    pub fn generate() -> Self {
        Self::generate_with_len(DEFAULT_VERIFIER_LEN)
    }

    /// Generate a verifier/challenge pair with a custom verifier length.
    pub fn generate_with_len(len: usize) -> Self {
        let mut rng = rand::rng();
        Self::generate_with_rng(len, &mut rng)
    }

    /// Generate a PKCE pair using the provided RNG.
    pub fn generate_with_rng<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let verifier: String = (0..len).map(|_| rng.sample(Alphanumeric) as char).collect();

        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Compute the S256 challenge for an arbitrary verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// Everything minted for a single login attempt: the PKCE pair plus the
/// CSRF state token the provider echoes back on the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub pkce: PkcePair,
    pub csrf_state: String,
}

impl LoginChallenge {
    /// Mint a fresh challenge. Successive calls yield unrelated values.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        Self::generate_with_rng(&mut rng)
    }

    /// Mint a challenge using the provided RNG.
    pub fn generate_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let pkce = PkcePair::generate_with_rng(DEFAULT_VERIFIER_LEN, rng);
        let csrf_state: String = (0..STATE_TOKEN_LEN)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();
        Self { pkce, csrf_state }
    }
}
