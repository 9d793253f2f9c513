//! OpenPGP keys used across the tests, all of them ed25519 primary keys

/// A key pair along with what is known about it
#[derive(Debug, Clone, Copy)]
pub struct TestKey {
    pub name: &'static str,
    pub email: &'static str,
    pub secret: &'static str,
    pub public: &'static str,
    pub fingerprint: &'static str,
    pub passphrase: Option<&'static str>,
}

pub const ALICE: TestKey = TestKey {
    name: "Alice",
    email: "alice@example.org",
    secret: include_str!("../keys/alice.sec.asc"),
    public: include_str!("../keys/alice.pub.asc"),
    fingerprint: "C775429BD6BB754F95C9F1102BB22E532EE9916C",
    passphrase: None,
};

/// Protected with a passphrase
pub const BOB: TestKey = TestKey {
    name: "Bob",
    email: "bob@example.org",
    secret: include_str!("../keys/bob.sec.asc"),
    public: include_str!("../keys/bob.pub.asc"),
    fingerprint: "A8D2ADDE6AC550BA6DD871D3FC919E33B40CB90D",
    passphrase: Some("correct horse"),
};

/// Plays the part of an attacker
pub const MALLORY: TestKey = TestKey {
    name: "Mallory",
    email: "mallory@example.org",
    secret: include_str!("../keys/mallory.sec.asc"),
    public: include_str!("../keys/mallory.pub.asc"),
    fingerprint: "9102E2DA968A16D4862EA8F744D7EF6F61443B07",
    passphrase: None,
};
