use pgp::{
    composed::{ArmorOptions, Deserializable, DetachedSignature, SignedPublicKey, SignedSecretKey},
    crypto::hash::HashAlgorithm,
    types::{KeyDetails, Password},
};
use tracing::debug;

use crate::spec::Fingerprint;

use super::{SignatureBackend, SignatureError, SigningKey};

/// A [SignatureBackend] built on rPGP, which needs no external `gpg`
/// install or keyring
#[derive(Debug, Clone, Copy, Default)]
pub struct PgpBackend;

impl PgpBackend {
    fn secret_key(&self, key: &SigningKey) -> Result<SignedSecretKey, SignatureError> {
        let (secret, _) = SignedSecretKey::from_string(key.armored())
            .map_err(|e| SignatureError::SigningFailed(format!("unreadable secret key: {e}")))?;

        secret
            .verify()
            .map_err(|e| SignatureError::SigningFailed(format!("invalid secret key: {e}")))?;

        Ok(secret)
    }

    fn public_key(&self, armored: &str) -> Result<SignedPublicKey, SignatureError> {
        let (public, _) = SignedPublicKey::from_string(armored)
            .map_err(|e| SignatureError::KeyNotFound(format!("unreadable public key: {e}")))?;

        public
            .verify()
            .map_err(|e| SignatureError::KeyNotFound(format!("invalid public key: {e}")))?;

        Ok(public)
    }

    fn to_fingerprint(fp: pgp::types::Fingerprint) -> Result<Fingerprint, SignatureError> {
        Fingerprint::from_bytes(fp.as_bytes())
            .map_err(|e| SignatureError::KeyNotFound(format!("unsupported key version: {e}")))
    }
}

impl SignatureBackend for PgpBackend {
    fn sign(&self, data: &[u8], key: &SigningKey) -> Result<String, SignatureError> {
        let secret = self.secret_key(key)?;
        let password = key.passphrase().map(Password::from).unwrap_or_default();

        let signature = DetachedSignature::sign_binary_data(
            rand::thread_rng(),
            &secret.primary_key,
            &password,
            HashAlgorithm::Sha256,
            data,
        )
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;

        signature
            .to_armored_string(ArmorOptions::default())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))
    }

    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> Result<bool, SignatureError> {
        let (signature, _) = DetachedSignature::from_string(signature)
            .map_err(|e| SignatureError::VerificationFailed(format!("unreadable signature: {e}")))?;
        let key = self.public_key(public_key)?;

        match signature.verify(&key, data) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "Signature did not verify");
                Ok(false)
            }
        }
    }

    fn fingerprint(&self, public_key: &str) -> Result<Fingerprint, SignatureError> {
        Self::to_fingerprint(self.public_key(public_key)?.fingerprint())
    }

    fn signer_fingerprint(&self, key: &SigningKey) -> Result<Fingerprint, SignatureError> {
        let public = self.secret_key(key)?.signed_public_key();
        Self::to_fingerprint(public.fingerprint())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))
    }

    fn export_public_key(&self, key: &SigningKey) -> Result<String, SignatureError> {
        self.secret_key(key)?
            .signed_public_key()
            .to_armored_string(ArmorOptions::default())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use testlibs::keys::{ALICE, BOB, MALLORY, TestKey};

    use super::*;

    fn signing_key(key: &TestKey) -> SigningKey {
        let signing = SigningKey::new(key.secret);
        match key.passphrase {
            Some(p) => signing.with_passphrase(p),
            None => signing,
        }
    }

    #[test]
    fn sign_and_verify() {
        let backend = PgpBackend;
        let signature = backend
            .sign(b"canonical bytes", &signing_key(&ALICE))
            .expect("Can sign");

        assert!(signature.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(
            backend
                .verify(b"canonical bytes", &signature, ALICE.public)
                .expect("Can check"),
            "Signature over the same data verifies"
        );
        assert!(
            !backend
                .verify(b"canonical bytes!", &signature, ALICE.public)
                .expect("Can check"),
            "Signature over other data does not verify"
        );
    }

    #[test]
    fn wrong_key_does_not_verify() {
        let backend = PgpBackend;
        let signature = backend
            .sign(b"data", &signing_key(&MALLORY))
            .expect("Can sign");

        assert_eq!(
            backend.verify(b"data", &signature, ALICE.public),
            Ok(false),
            "Someone else's key does not verify the signature"
        );
    }

    #[test]
    fn unreadable_inputs_are_errors() {
        let backend = PgpBackend;

        assert!(matches!(
            backend.verify(b"data", "not a signature", ALICE.public),
            Err(SignatureError::VerificationFailed(_))
        ));

        let signature = backend.sign(b"data", &signing_key(&ALICE)).expect("Can sign");
        assert!(matches!(
            backend.verify(b"data", &signature, "not a key"),
            Err(SignatureError::KeyNotFound(_))
        ));
    }

    #[test]
    fn passphrase_protected_key() {
        let backend = PgpBackend;

        let signature = backend.sign(b"data", &signing_key(&BOB)).expect("Can sign");
        assert_eq!(backend.verify(b"data", &signature, BOB.public), Ok(true));

        let wrong = SigningKey::new(BOB.secret).with_passphrase("battery staple");
        assert!(matches!(
            backend.sign(b"data", &wrong),
            Err(SignatureError::SigningFailed(_))
        ));
    }

    #[test]
    fn fingerprints() {
        let backend = PgpBackend;

        for key in [ALICE, BOB, MALLORY] {
            let expected: Fingerprint = key.fingerprint.parse().expect("Valid fingerprint");

            assert_eq!(
                backend.fingerprint(key.public).expect("Readable key"),
                expected,
                "Fingerprint of {}'s public key",
                key.name
            );
            assert_eq!(
                backend
                    .signer_fingerprint(&signing_key(&key))
                    .expect("Readable key"),
                expected,
                "Fingerprint of {}'s secret key",
                key.name
            );
        }
    }

    #[test]
    fn exported_key_verifies() {
        let backend = PgpBackend;
        let key = signing_key(&ALICE);

        let public = backend.export_public_key(&key).expect("Can export");
        let signature = backend.sign(b"data", &key).expect("Can sign");

        assert_eq!(backend.verify(b"data", &signature, &public), Ok(true));
        assert_eq!(
            backend.fingerprint(&public).expect("Readable key").to_hex(),
            ALICE.fingerprint
        );
    }
}
