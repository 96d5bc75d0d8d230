//! This module contains the request and response objects that are exchanged
//! between mint and wallet on the v1 API. All of them are serializable and
//! deserializable using serde.

use std::collections::BTreeMap;
use std::fmt;

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::blind::{BlindedMessage, BlindedSignature};
use crate::keyset::KeysetInfo;
use crate::proof::Proofs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyUnit {
    Sat,
    Msat,
    Usd,
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sat => write!(f, "sat"),
            Self::Msat => write!(f, "msat"),
            Self::Usd => write!(f, "usd"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bolt11,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bolt11 => write!(f, "bolt11"),
        }
    }
}

/// State machine of a mint quote: `UNPAID -> PAID -> ISSUED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    Unpaid,
    Paid,
    Issued,
}

impl fmt::Display for MintQuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Paid => write!(f, "PAID"),
            Self::Issued => write!(f, "ISSUED"),
        }
    }
}

/// State machine of a melt quote: `UNPAID -> PENDING -> {PAID | UNPAID}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeltQuoteState {
    Unpaid,
    Pending,
    Paid,
}

impl fmt::Display for MeltQuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "UNPAID"),
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
        }
    }
}

/// Spend state of a proof as reported by `POST /v1/checkstate`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofState {
    Unspent,
    Pending,
    Spent,
}

// --- keys and keysets (Nut-01, Nut-02)

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct KeysResponse {
    pub keysets: Vec<KeyResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct KeyResponse {
    pub id: String,
    pub unit: CurrencyUnit,
    #[schema(value_type = std::collections::BTreeMap<String, String>)]
    pub keys: BTreeMap<u64, PublicKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct KeysetsResponse {
    pub keysets: Vec<KeysetInfo>,
}

// --- swap (Nut-03)

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostSwapRequest {
    pub inputs: Proofs,
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostSwapResponse {
    pub signatures: Vec<BlindedSignature>,
}

// --- mint quote (Nut-04)

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintQuoteBolt11Request {
    pub amount: u64,
    pub unit: CurrencyUnit,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintQuoteBolt11Response {
    pub quote: String,
    /// bolt11 payment request
    pub request: String,
    pub state: MintQuoteState,
    pub expiry: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMintBolt11Request {
    pub quote: String,
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostMintBolt11Response {
    pub signatures: Vec<BlindedSignature>,
}

// --- melt quote (Nut-05, Nut-08, Nut-15)

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltQuoteBolt11Request {
    /// bolt11 payment request to be paid
    pub request: String,
    pub unit: CurrencyUnit,
    pub options: Option<MeltOptions>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct MeltOptions {
    pub mpp: Option<Mpp>,
}

/// Multi path payment option: the partial amount this mint contributes,
/// in millisatoshis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Mpp {
    pub amount: u64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltQuoteBolt11Response {
    pub quote: String,
    pub amount: u64,
    pub fee_reserve: u64,
    pub state: MeltQuoteState,
    pub expiry: u64,
    pub payment_preimage: Option<String>,
    pub change: Option<Vec<BlindedSignature>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMeltBolt11Request {
    pub quote: String,
    pub inputs: Proofs,
    /// blank outputs reserved for overpaid fee change
    pub outputs: Option<Vec<BlindedMessage>>,
}

// --- checkstate (Nut-07)

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCheckStateRequest {
    #[serde(rename = "Ys")]
    pub ys: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ProofStateEntry {
    #[serde(rename = "Y")]
    pub y: String,
    pub state: ProofState,
    pub witness: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostCheckStateResponse {
    pub states: Vec<ProofStateEntry>,
}

// --- restore (Nut-09)

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostRestoreRequest {
    pub outputs: Vec<BlindedMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostRestoreResponse {
    pub outputs: Vec<BlindedMessage>,
    pub signatures: Vec<BlindedSignature>,
}

// --- info (Nut-06)

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MintInfoResponse {
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub pubkey: Option<PublicKey>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub description_long: Option<String>,
    pub contact: Option<Vec<ContactInfoResponse>>,
    pub motd: Option<String>,
    pub nuts: Nuts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ContactInfoResponse {
    pub method: String,
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct Nuts {
    #[serde(rename = "4")]
    pub nut4: PaymentMethodSettings,
    #[serde(rename = "5")]
    pub nut5: PaymentMethodSettings,
    #[serde(rename = "7")]
    pub nut7: NutSupported,
    #[serde(rename = "8")]
    pub nut8: NutSupported,
    #[serde(rename = "9")]
    pub nut9: NutSupported,
    #[serde(rename = "10")]
    pub nut10: NutSupported,
    #[serde(rename = "11")]
    pub nut11: NutSupported,
    #[serde(rename = "12")]
    pub nut12: NutSupported,
    #[serde(rename = "14")]
    pub nut14: NutSupported,
    #[serde(rename = "15")]
    pub nut15: MppSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct PaymentMethodSettings {
    pub methods: Vec<PaymentMethodConfig>,
    pub disabled: bool,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PaymentMethodConfig {
    pub method: PaymentMethod,
    pub unit: CurrencyUnit,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct NutSupported {
    pub supported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct MppSettings {
    pub methods: Vec<MppMethodConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MppMethodConfig {
    pub method: PaymentMethod,
    pub unit: CurrencyUnit,
}
