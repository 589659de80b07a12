//! Built-in TLS and QUIC sticky buffers

use super::extract::Extractor;
use super::registry::{BufferRegistry, BufferRegistryBuilder, BufferTypeDef, RegistryError};
use crate::content::{Canonicalizer, Validator};
use crate::protocols::{AppProto, DirectionMask};

const TLS_AND_QUIC: &[AppProto] = &[AppProto::Tls, AppProto::Quic];

/// Register every built-in buffer type
pub fn register_builtin(builder: &mut BufferRegistryBuilder) -> Result<(), RegistryError> {
    builder.register(
        BufferTypeDef::new("ja3.hash", Extractor::Ja3Hash)
            .alias("ja3_hash")
            .description("TLS JA3 hash")
            .protocols(TLS_AND_QUIC)
            .directions(DirectionMask::TO_SERVER)
            .requires_ja3(),
    )?;
    builder.set_setup_callback("ja3.hash", Canonicalizer::AsciiLowercase)?;
    builder.set_validate_callback("ja3.hash", Validator::Md5Hex)?;

    builder.register(
        BufferTypeDef::new("ja3.string", Extractor::Ja3String)
            .alias("ja3_string")
            .description("TLS JA3 string")
            .protocols(TLS_AND_QUIC)
            .directions(DirectionMask::TO_SERVER)
            .requires_ja3(),
    )?;

    builder.register(
        BufferTypeDef::new("ja3s.hash", Extractor::Ja3sHash)
            .alias("ja3s_hash")
            .description("TLS JA3S hash")
            .protocols(&[AppProto::Tls])
            .directions(DirectionMask::TO_CLIENT)
            .requires_ja3(),
    )?;
    builder.set_setup_callback("ja3s.hash", Canonicalizer::AsciiLowercase)?;
    builder.set_validate_callback("ja3s.hash", Validator::Md5Hex)?;

    builder.register(
        BufferTypeDef::new("ja3s.string", Extractor::Ja3sString)
            .alias("ja3s_string")
            .description("TLS JA3S string")
            .protocols(&[AppProto::Tls])
            .directions(DirectionMask::TO_CLIENT)
            .requires_ja3(),
    )?;

    builder.register(
        BufferTypeDef::new("tls.sni", Extractor::TlsSni)
            .alias("tls_sni")
            .description("TLS Server Name Indication")
            .protocols(&[AppProto::Tls])
            .directions(DirectionMask::TO_SERVER),
    )?;

    builder.register(
        BufferTypeDef::new("quic.cyu.string", Extractor::QuicCyuString)
            .description("QUIC CYU String")
            .protocols(&[AppProto::Quic])
            .directions(DirectionMask::TO_SERVER)
            .multi_instance(),
    )?;

    builder.register(
        BufferTypeDef::new("quic.cyu.hash", Extractor::QuicCyuHash)
            .description("QUIC CYU Hash")
            .protocols(&[AppProto::Quic])
            .directions(DirectionMask::TO_SERVER)
            .multi_instance(),
    )?;
    builder.set_setup_callback("quic.cyu.hash", Canonicalizer::AsciiLowercase)?;
    builder.set_validate_callback("quic.cyu.hash", Validator::Md5Hex)?;

    builder.register(
        BufferTypeDef::new("quic.ua", Extractor::QuicUserAgent)
            .description("QUIC User Agent")
            .protocols(&[AppProto::Quic])
            .directions(DirectionMask::TO_SERVER),
    )?;

    Ok(())
}

/// Registry holding only the built-in buffer types
pub fn builtin_registry() -> Result<BufferRegistry, RegistryError> {
    let mut builder = BufferRegistry::builder();
    register_builtin(&mut builder)?;
    Ok(builder.build())
}
