// web-server/src/siwe.rs
//! Sign-In with Ethereum (EIP-4361) messages.
//!
//! Parsing follows the EIP-4361 text layout; signatures are EIP-191
//! `personal_sign` signatures over the exact message text, recovered with
//! secp256k1 and compared against the message's EIP-55 address.

use chrono::{DateTime, FixedOffset, Utc};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TIME_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiweError {
    #[error("missing or malformed header line")]
    Header,
    #[error("invalid domain")]
    Domain,
    #[error("invalid address")]
    Address,
    #[error("address is not EIP-55 checksummed")]
    Checksum,
    #[error("missing `{0}` field")]
    MissingField(&'static str),
    #[error("invalid `{0}` field")]
    InvalidField(&'static str),
    #[error("unexpected content: {0}")]
    UnexpectedLine(String),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not recover to a valid key")]
    Unrecoverable,
}

/// A parsed EIP-4361 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    pub address: String,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<FixedOffset>,
    pub expiration_time: Option<DateTime<FixedOffset>>,
    pub not_before: Option<DateTime<FixedOffset>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// Whether `now` falls inside the message's validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(expiration) = self.expiration_time {
            if now >= expiration {
                return false;
            }
        }
        if let Some(not_before) = self.not_before {
            if now < not_before {
                return false;
            }
        }
        true
    }
}

/// Cursor over message lines
struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.peek();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn expect_blank(&mut self, field: &'static str) -> Result<(), SiweError> {
        match self.next() {
            Some("") => Ok(()),
            Some(other) => Err(SiweError::UnexpectedLine(other.to_string())),
            None => Err(SiweError::MissingField(field)),
        }
    }

    fn tagged(&mut self, tag: &'static str, field: &'static str) -> Result<&'a str, SiweError> {
        self.optional_tagged(tag).ok_or(SiweError::MissingField(field))
    }

    fn optional_tagged(&mut self, tag: &'static str) -> Option<&'a str> {
        let value = self.peek()?.strip_prefix(tag)?;
        self.pos += 1;
        Some(value)
    }
}

impl FromStr for SiweMessage {
    type Err = SiweError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.strip_suffix('\n').unwrap_or(s);
        let mut lines = Lines {
            lines: text.split('\n').collect(),
            pos: 0,
        };

        let header = lines.next().ok_or(SiweError::Header)?;
        let authority = header.strip_suffix(HEADER_SUFFIX).ok_or(SiweError::Header)?;
        let (scheme, domain) = match authority.split_once("://") {
            Some((scheme, domain)) => (Some(scheme.to_string()), domain),
            None => (None, authority),
        };
        if domain.is_empty() || domain.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(SiweError::Domain);
        }

        let address = lines.next().ok_or(SiweError::MissingField("address"))?;
        if !is_hex_address(address) {
            return Err(SiweError::Address);
        }
        if !is_valid_checksum(address) {
            return Err(SiweError::Checksum);
        }

        lines.expect_blank("statement")?;

        // Statement is optional and may be written with or without its own
        // blank line when absent.
        let statement = match lines.peek() {
            Some("") => {
                lines.next();
                None
            },
            Some(line) if line.starts_with(URI_TAG) => None,
            Some(line) => {
                lines.next();
                lines.expect_blank("uri")?;
                Some(line.to_string())
            },
            None => return Err(SiweError::MissingField("uri")),
        };

        let uri = lines.tagged(URI_TAG, "uri")?;
        Url::parse(uri).map_err(|_| SiweError::InvalidField("uri"))?;

        let version = lines.tagged(VERSION_TAG, "version")?;
        if version != "1" {
            return Err(SiweError::InvalidField("version"));
        }

        let chain_id = lines.tagged(CHAIN_ID_TAG, "chainId")?
            .parse::<u64>()
            .map_err(|_| SiweError::InvalidField("chainId"))?;

        let nonce = lines.tagged(NONCE_TAG, "nonce")?;
        // Any token is accepted here; matching against the issued nonce is
        // the verifier's job.
        if nonce.is_empty() || nonce.chars().any(char::is_whitespace) {
            return Err(SiweError::InvalidField("nonce"));
        }

        let issued_at = parse_timestamp(lines.tagged(ISSUED_AT_TAG, "issuedAt")?, "issuedAt")?;
        let expiration_time = lines.optional_tagged(EXPIRATION_TIME_TAG)
            .map(|v| parse_timestamp(v, "expirationTime"))
            .transpose()?;
        let not_before = lines.optional_tagged(NOT_BEFORE_TAG)
            .map(|v| parse_timestamp(v, "notBefore"))
            .transpose()?;
        let request_id = lines.optional_tagged(REQUEST_ID_TAG).map(str::to_string);

        let mut resources = Vec::new();
        if lines.peek() == Some(RESOURCES_TAG) {
            lines.next();
            while let Some(resource) = lines.peek().and_then(|l| l.strip_prefix("- ")) {
                Url::parse(resource).map_err(|_| SiweError::InvalidField("resources"))?;
                resources.push(resource.to_string());
                lines.next();
            }
        }

        if let Some(extra) = lines.next() {
            return Err(SiweError::UnexpectedLine(extra.to_string()));
        }

        Ok(SiweMessage {
            scheme,
            domain: domain.to_string(),
            address: address.to_string(),
            statement,
            uri: uri.to_string(),
            version: version.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(scheme) => writeln!(f, "{}://{}{}", scheme, self.domain, HEADER_SUFFIX)?,
            None => writeln!(f, "{}{}", self.domain, HEADER_SUFFIX)?,
        }
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;
        writeln!(f, "{}{}", URI_TAG, self.uri)?;
        writeln!(f, "{}{}", VERSION_TAG, self.version)?;
        writeln!(f, "{}{}", CHAIN_ID_TAG, self.chain_id)?;
        writeln!(f, "{}{}", NONCE_TAG, self.nonce)?;
        write!(f, "{}{}", ISSUED_AT_TAG, self.issued_at.to_rfc3339())?;
        if let Some(expiration) = &self.expiration_time {
            write!(f, "\n{}{}", EXPIRATION_TIME_TAG, expiration.to_rfc3339())?;
        }
        if let Some(not_before) = &self.not_before {
            write!(f, "\n{}{}", NOT_BEFORE_TAG, not_before.to_rfc3339())?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\n{}{}", REQUEST_ID_TAG, request_id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{}", RESOURCES_TAG)?;
            for resource in &self.resources {
                write!(f, "\n- {}", resource)?;
            }
        }
        Ok(())
    }
}

fn parse_timestamp(value: &str, field: &'static str) -> Result<DateTime<FixedOffset>, SiweError> {
    DateTime::parse_from_rfc3339(value).map_err(|_| SiweError::InvalidField(field))
}

fn is_hex_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// EIP-55 mixed-case encoding of a 20-byte address
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether a `0x`-prefixed hex address carries a correct EIP-55 checksum
pub fn is_valid_checksum(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else {
        return false;
    };
    let Ok(bytes) = hex::decode(hex_part) else {
        return false;
    };
    let Ok(bytes) = <[u8; 20]>::try_from(bytes.as_slice()) else {
        return false;
    };
    to_checksum_address(&bytes) == address
}

/// EIP-191 `personal_sign` digest of a message
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Ethereum address of a secp256k1 public key
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    to_checksum_address(&address)
}

/// Split a 65-byte `r || s || v` hex signature
pub fn parse_signature(signature: &str) -> Result<(Signature, RecoveryId), SiweError> {
    let raw = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(raw).map_err(|_| SiweError::MalformedSignature)?;
    if bytes.len() != 65 {
        return Err(SiweError::MalformedSignature);
    }

    let v = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        0 | 1 => bytes[64],
        _ => return Err(SiweError::MalformedSignature),
    };
    let signature = Signature::from_slice(&bytes[..64]).map_err(|_| SiweError::MalformedSignature)?;
    let recovery_id = RecoveryId::from_byte(v).ok_or(SiweError::MalformedSignature)?;

    // High-S signatures recover with the opposite parity once normalized
    match signature.normalize_s() {
        Some(normalized) => Ok((normalized, RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()))),
        None => Ok((signature, recovery_id)),
    }
}

/// Recover the checksummed address that signed `message`
pub fn recover_address(message: &str, signature: &str) -> Result<String, SiweError> {
    let (signature, recovery_id) = parse_signature(signature)?;
    let digest = eip191_hash(message.as_bytes());
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| SiweError::Unrecoverable)?;
    Ok(address_of(&key))
}
