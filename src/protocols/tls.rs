//! TLS transaction state

/// A JA3 (or JA3S) fingerprint: the field string and its MD5 hex digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja3 {
    /// Comma separated fingerprint fields
    pub string: String,
    /// MD5 of `string`, lowercase hex
    pub hash: String,
}

impl Ja3 {
    pub fn new(string: &str, hash: &str) -> Self {
        Self {
            string: string.to_string(),
            hash: hash.to_string(),
        }
    }
}

/// Decoded TLS handshake fields
#[derive(Debug, Clone, Default)]
pub struct TlsState {
    /// Client fingerprint (from ClientHello)
    pub ja3: Option<Ja3>,
    /// Server fingerprint (from ServerHello)
    pub ja3s: Option<Ja3>,
    /// Server name indication
    pub sni: Option<String>,
}

impl TlsState {
    pub fn with_ja3(mut self, ja3: Ja3) -> Self {
        self.ja3 = Some(ja3);
        self
    }

    pub fn with_ja3s(mut self, ja3s: Ja3) -> Self {
        self.ja3s = Some(ja3s);
        self
    }

    pub fn with_sni(mut self, sni: &str) -> Self {
        self.sni = Some(sni.to_string());
        self
    }
}
