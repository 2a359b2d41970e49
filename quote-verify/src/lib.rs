/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
//! Attestation evidence verification shim.
//!
//! The host does not make trust decisions itself: production verification is
//! delegated to an external quote-verification library behind the
//! [`VerificationLibrary`] trait, pinned to the ECDSA root-of-trust format.
//! The `allow-any-root` cargo feature swaps [`verify_quote`] to an internal
//! structural check that accepts any signing root; it exists for
//! pre-production bring-up only and never produces supplemental data.
//!
//! The container parsing here is the minimum needed by that internal path
//! and by endorsement extraction: quote header, attested body, and the
//! signature section carrying the certification data.

#![deny(warnings)]

use anyhow::{bail, format_err};
use byteorder::{ByteOrder, LE};
use chrono::{DateTime, Utc};
use log::debug;
use ocall_abi::VerifyOutcome;
use std::borrow::Cow;
use std::mem;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Format id the production path hands to the external library: ECDSA
/// quotes rooted in the platform vendor's Provisioning Certification Key.
pub const ECDSA_ROOT_OF_TRUST_ID: [u8; 16] = [
    0xa3, 0xa2, 0x1e, 0x87, 0x1b, 0x4d, 0x40, 0x14, 0xb7, 0x0a, 0xa1, 0x25, 0xd2, 0xfb, 0xcd, 0x8c,
];

/// The external library never returns more supplemental data than this.
pub const MAX_SUPPLEMENTAL_DATA_SIZE: usize = 1000;

/// `result_code` values in [`VerifyOutcome`].
pub mod result {
    pub const OK: u32 = 0;
    pub const FAILURE: u32 = 1;
    pub const INVALID_PARAMETER: u32 = 2;
    pub const QUOTE_PARSE_ERROR: u32 = 3;
    pub const VERIFY_FAILED: u32 = 4;
    pub const UNSUPPORTED: u32 = 5;
}

const QUOTE_VERSION_3: u16 = 3;
const QUOTE_VERSION_4: u16 = 4;
const QE_VENDOR_ID_LEN: usize = 16;
const USER_DATA_LEN: usize = 20;
const SGX_BODY_LEN: usize = 384;
const TDX_BODY_LEN: usize = 584;
const ECDSA_P256_SIGNATURE_LEN: usize = 64;
const ECDSA_P256_PUBLIC_KEY_LEN: usize = 64;

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttestationKeyType {
    EcdsaP256 = 2,
    EcdsaP384 = 3,
}

impl AttestationKeyType {
    fn from_u16(v: u16) -> Option<AttestationKeyType> {
        match v {
            2 => Some(AttestationKeyType::EcdsaP256),
            3 => Some(AttestationKeyType::EcdsaP384),
            _ => None,
        }
    }
}

/// Kind of trusted execution environment the quote attests.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TeeType {
    Sgx = 0x0000_0000,
    Tdx = 0x0000_0081,
}

impl TeeType {
    fn from_u32(v: u32) -> Option<TeeType> {
        match v {
            0x0000_0000 => Some(TeeType::Sgx),
            0x0000_0081 => Some(TeeType::Tdx),
            _ => None,
        }
    }

    fn body_len(self) -> usize {
        match self {
            TeeType::Sgx => SGX_BODY_LEN,
            TeeType::Tdx => TDX_BODY_LEN,
        }
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CertificationDataType {
    PpidCleartext = 1,
    PpidEncryptedRsa2048 = 2,
    PpidEncryptedRsa3072 = 3,
    PckCertificate = 4,
    PckCertificateChain = 5,
    EcdsaSignatureAuxiliaryData = 6,
    PlatformManifest = 7,
}

impl CertificationDataType {
    fn from_u16(v: u16) -> Option<CertificationDataType> {
        use CertificationDataType::*;
        match v {
            1 => Some(PpidCleartext),
            2 => Some(PpidEncryptedRsa2048),
            3 => Some(PpidEncryptedRsa3072),
            4 => Some(PckCertificate),
            5 => Some(PckCertificateChain),
            6 => Some(EcdsaSignatureAuxiliaryData),
            7 => Some(PlatformManifest),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Quote<'a> {
    header: QuoteHeader<'a>,
    body: Cow<'a, [u8]>,
    signature: Cow<'a, [u8]>,
}

#[derive(Debug)]
pub struct QuoteHeader<'a> {
    pub version: u16,
    pub attestation_key_type: AttestationKeyType,
    pub tee_type: TeeType,
    pub qe_vendor_id: Cow<'a, [u8]>,
    pub user_data: Cow<'a, [u8]>,
}

/// Signature section of an ECDSA-P256 quote.
#[derive(Debug)]
pub struct EcdsaSignature<'a> {
    pub signature: Cow<'a, [u8]>,
    pub attestation_public_key: Cow<'a, [u8]>,
    pub qe_report: Cow<'a, [u8]>,
    pub qe_signature: Cow<'a, [u8]>,
    pub authentication_data: Cow<'a, [u8]>,
    pub certification_data_type: CertificationDataType,
    pub certification_data: Cow<'a, [u8]>,
}

trait TakePrefix: Sized {
    fn take_prefix(&mut self, mid: usize) -> Result<Self>;
}

impl<'a, T: 'a + Clone> TakePrefix for Cow<'a, [T]> {
    fn take_prefix(&mut self, mid: usize) -> Result<Self> {
        if mid <= self.len() {
            match self {
                &mut Cow::Borrowed(ref mut slice) => {
                    let (prefix, rest) = slice.split_at(mid);
                    *slice = rest;
                    Ok(Cow::Borrowed(prefix))
                }
                &mut Cow::Owned(ref mut vec) => {
                    let rest = vec.split_off(mid);
                    Ok(Cow::Owned(mem::replace(vec, rest)))
                }
            }
        } else {
            bail!("Unexpected end of quote")
        }
    }
}

impl<'a> Quote<'a> {
    pub fn parse<T: Into<Cow<'a, [u8]>>>(quote: T) -> Result<Quote<'a>> {
        let mut quote = quote.into();

        let version = quote.take_prefix(mem::size_of::<u16>()).map(|v| LE::read_u16(&v))?;
        if version != QUOTE_VERSION_3 && version != QUOTE_VERSION_4 {
            bail!("Unknown quote version: {}", version);
        }
        let att_key_type = quote.take_prefix(mem::size_of::<u16>()).map(|v| LE::read_u16(&v))?;
        let attestation_key_type = AttestationKeyType::from_u16(att_key_type)
            .ok_or_else(|| format_err!("Unknown attestation key type: {}", att_key_type))?;
        let raw_tee_type = quote.take_prefix(mem::size_of::<u32>()).map(|v| LE::read_u32(&v))?;
        let tee_type = TeeType::from_u32(raw_tee_type)
            .ok_or_else(|| format_err!("Unknown TEE type: {:#x}", raw_tee_type))?;
        let reserved = quote.take_prefix(mem::size_of::<u32>()).map(|v| LE::read_u32(&v))?;
        if reserved != 0 {
            bail!("Data in reserved field: {:08x}", reserved);
        }
        let qe_vendor_id = quote.take_prefix(QE_VENDOR_ID_LEN)?;
        let user_data = quote.take_prefix(USER_DATA_LEN)?;
        let body = quote.take_prefix(tee_type.body_len())?;

        Ok(Quote {
            header: QuoteHeader {
                version,
                attestation_key_type,
                tee_type,
                qe_vendor_id,
                user_data,
            },
            body,
            signature: quote,
        })
    }

    pub fn header(&self) -> &QuoteHeader<'a> {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the signature section. Deferred so header-only consumers
    /// don't pay for it.
    pub fn try_signature(&self) -> Result<EcdsaSignature<'a>> {
        EcdsaSignature::parse(self.header.attestation_key_type, self.signature.clone())
    }
}

impl<'a> EcdsaSignature<'a> {
    pub fn parse(type_: AttestationKeyType, mut data: Cow<'a, [u8]>) -> Result<Self> {
        if type_ != AttestationKeyType::EcdsaP256 {
            bail!("Unsupported attestation key type: {:?}", type_);
        }

        let sig_len = data.take_prefix(mem::size_of::<u32>()).map(|v| LE::read_u32(&v))?;
        if sig_len as usize != data.len() {
            bail!(
                "Invalid signature length. Got {}, expected {}",
                data.len(),
                sig_len
            );
        }
        let signature = data.take_prefix(ECDSA_P256_SIGNATURE_LEN)?;
        let attestation_public_key = data.take_prefix(ECDSA_P256_PUBLIC_KEY_LEN)?;
        let qe_report = data.take_prefix(SGX_BODY_LEN)?;
        let qe_signature = data.take_prefix(ECDSA_P256_SIGNATURE_LEN)?;
        let authdata_len = data.take_prefix(mem::size_of::<u16>()).map(|v| LE::read_u16(&v))?;
        let authentication_data = data.take_prefix(authdata_len as _)?;
        let cd_type = data.take_prefix(mem::size_of::<u16>()).map(|v| LE::read_u16(&v))?;
        let certification_data_type = CertificationDataType::from_u16(cd_type)
            .ok_or_else(|| format_err!("Unknown certification data type: {}", cd_type))?;
        let certdata_len = data.take_prefix(mem::size_of::<u32>()).map(|v| LE::read_u32(&v))?;
        if certdata_len as usize != data.len() {
            bail!(
                "Invalid certification data length. Got {}, expected {}",
                data.len(),
                certdata_len
            );
        }

        Ok(EcdsaSignature {
            signature,
            attestation_public_key,
            qe_report,
            qe_signature,
            authentication_data,
            certification_data_type,
            certification_data: data,
        })
    }
}

/// Extracts the embedded endorsement material (the certification data
/// section) from serialized evidence. Used by the endorsement tool.
pub fn extract_endorsements(evidence: &[u8]) -> Result<Vec<u8>> {
    let quote = Quote::parse(evidence)?;
    let sig = quote.try_signature()?;
    Ok(sig.certification_data.into_owned())
}

/// Production trust decision, performed by an external library.
///
/// The caller owns both input buffers; the implementation allocates any
/// supplemental data and the caller takes ownership of it through the
/// outcome.
pub trait VerificationLibrary {
    fn verify(
        &self,
        root_of_trust: &[u8; 16],
        quote: &[u8],
        endorsements: &[u8],
        validation_time: DateTime<Utc>,
    ) -> Result<VerifyOutcome>;
}

/// Verifies serialized evidence against endorsements at `validation_time`
/// (host-observed time when `None`).
///
/// Without the `allow-any-root` feature this delegates every trust decision
/// to `library` with the pinned ECDSA root-of-trust id; with it, the
/// structural path runs instead and `library` is ignored.
#[cfg(not(feature = "allow-any-root"))]
pub fn verify_quote<L: VerificationLibrary>(
    library: &L,
    quote: &[u8],
    endorsements: &[u8],
    validation_time: Option<DateTime<Utc>>,
) -> Result<VerifyOutcome> {
    verify_quote_with_library(library, quote, endorsements, validation_time)
}

#[cfg(feature = "allow-any-root")]
pub fn verify_quote<L: VerificationLibrary>(
    _library: &L,
    quote: &[u8],
    endorsements: &[u8],
    validation_time: Option<DateTime<Utc>>,
) -> Result<VerifyOutcome> {
    verify_quote_internal(quote, endorsements, validation_time)
}

pub fn verify_quote_with_library<L: VerificationLibrary>(
    library: &L,
    quote: &[u8],
    endorsements: &[u8],
    validation_time: Option<DateTime<Utc>>,
) -> Result<VerifyOutcome> {
    if quote.is_empty() {
        return Ok(VerifyOutcome {
            result_code: result::INVALID_PARAMETER,
            supplemental_data: None,
        });
    }
    let time = validation_time.unwrap_or_else(Utc::now);
    debug!("delegating verification, validation time {}", time);
    let outcome = library.verify(&ECDSA_ROOT_OF_TRUST_ID, quote, endorsements, time)?;
    if let Some(ref supp) = outcome.supplemental_data {
        if supp.len() > MAX_SUPPLEMENTAL_DATA_SIZE {
            bail!(
                "supplemental data exceeds maximum size: {} > {}",
                supp.len(),
                MAX_SUPPLEMENTAL_DATA_SIZE
            );
        }
    }
    Ok(outcome)
}

/// Structural verification: parses the container and checks internal
/// consistency without anchoring the signing chain to any root. Suitable for
/// pre-production bring-up only. Never returns supplemental data.
pub fn verify_quote_internal(
    quote: &[u8],
    _endorsements: &[u8],
    _validation_time: Option<DateTime<Utc>>,
) -> Result<VerifyOutcome> {
    if quote.is_empty() {
        return Ok(VerifyOutcome {
            result_code: result::INVALID_PARAMETER,
            supplemental_data: None,
        });
    }
    let parsed = match Quote::parse(quote) {
        Ok(q) => q,
        Err(e) => {
            debug!("quote parse failed: {}", e);
            return Ok(VerifyOutcome {
                result_code: result::QUOTE_PARSE_ERROR,
                supplemental_data: None,
            });
        }
    };
    let code = match parsed.try_signature() {
        Ok(sig) if sig.certification_data.is_empty() => result::VERIFY_FAILED,
        Ok(_) => result::OK,
        Err(e) => {
            debug!("signature section parse failed: {}", e);
            result::QUOTE_PARSE_ERROR
        }
    };
    Ok(VerifyOutcome {
        result_code: code,
        supplemental_data: None,
    })
}
