//! Buffer transforms
//!
//! Transforms rewrite an extracted buffer before it is cached. They are a
//! closed set of byte-to-byte functions, applied in registration order with
//! each stage consuming the previous stage's output.

/// A single transform stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// ASCII uppercase to lowercase
    ToLowercase,
    /// ASCII lowercase to uppercase
    ToUppercase,
    /// Drop every ASCII whitespace byte
    StripWhitespace,
    /// Collapse each run of ASCII whitespace into one space
    CompressWhitespace,
    /// Prepend a `.` (domain suffix matching)
    DotPrefix,
    /// Decode `%XX` escapes and `+`
    UrlDecode,
    /// XOR with a repeating key
    Xor(Vec<u8>),
}

impl Transform {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Transform::ToLowercase => "to_lowercase",
            Transform::ToUppercase => "to_uppercase",
            Transform::StripWhitespace => "strip_whitespace",
            Transform::CompressWhitespace => "compress_whitespace",
            Transform::DotPrefix => "dotprefix",
            Transform::UrlDecode => "url_decode",
            Transform::Xor(_) => "xor",
        }
    }

    /// Apply this stage to `input`
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        match self {
            Transform::ToLowercase => input.to_ascii_lowercase(),
            Transform::ToUppercase => input.to_ascii_uppercase(),
            Transform::StripWhitespace => input
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect(),
            Transform::CompressWhitespace => compress_whitespace(input),
            Transform::DotPrefix => {
                let mut out = Vec::with_capacity(input.len() + 1);
                out.push(b'.');
                out.extend_from_slice(input);
                out
            }
            Transform::UrlDecode => url_decode(input),
            Transform::Xor(key) => {
                if key.is_empty() {
                    return input.to_vec();
                }
                input
                    .iter()
                    .zip(key.iter().cycle())
                    .map(|(b, k)| b ^ k)
                    .collect()
            }
        }
    }
}

fn compress_whitespace(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_run = false;

    for &b in input {
        if b.is_ascii_whitespace() {
            if !in_run {
                out.push(b' ');
            }
            in_run = true;
        } else {
            out.push(b);
            in_run = false;
        }
    }

    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn url_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            b'%' if i + 2 < input.len() => {
                match (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    // Malformed escapes are kept verbatim
                    _ => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }

    out
}

/// Ordered list of transforms registered for a buffer type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformPipeline {
    stages: Vec<Transform>,
}

impl TransformPipeline {
    /// Create a pipeline from stages in application order
    pub fn new(stages: Vec<Transform>) -> Self {
        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Transform] {
        &self.stages
    }

    /// Comma-separated stage names, for logs
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(Transform::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Run every stage over `input`; with no stages the bytes are copied unchanged
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        let mut current = input.to_vec();
        for stage in &self.stages {
            current = stage.apply(&current);
        }
        current
    }
}
