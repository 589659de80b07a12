//! QUIC transaction state
//!
//! gQUIC client hellos carry a CYU fingerprint: the version followed by
//! the tag list, e.g. `46,PAD-SNI-VER-CCS-UAID-...`. A single transaction
//! may hold several of them, in the order the decoder saw them.

use super::tls::Ja3;

/// One CYU fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cyu {
    /// `<version>,<tag-list>`
    pub string: Vec<u8>,
    /// MD5 of `string`, lowercase hex
    pub hash: String,
}

impl Cyu {
    pub fn new(string: &str, hash: &str) -> Self {
        Self {
            string: string.as_bytes().to_vec(),
            hash: hash.to_string(),
        }
    }
}

/// Decoded QUIC client hello fields
#[derive(Debug, Clone, Default)]
pub struct QuicState {
    /// JA3 computed over the embedded TLS client hello (IETF QUIC)
    pub ja3: Option<Ja3>,
    /// CYU fingerprints in decode order
    pub cyu: Vec<Cyu>,
    /// User agent id (UAID tag)
    pub ua: Option<Vec<u8>>,
}

impl QuicState {
    pub fn with_ja3(mut self, ja3: Ja3) -> Self {
        self.ja3 = Some(ja3);
        self
    }

    pub fn with_cyu(mut self, cyu: Cyu) -> Self {
        self.cyu.push(cyu);
        self
    }

    pub fn with_ua(mut self, ua: &str) -> Self {
        self.ua = Some(ua.as_bytes().to_vec());
        self
    }
}
