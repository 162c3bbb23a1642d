//! Common Types Module
//!
//! 프로토콜 전반에서 사용되는 식별자/시간 타입 정의
//!
//! - `Address`: 주체(borrower, lender, attestation subject) 식별자
//! - `AssetId`: 대체 가능 자산 denomination (예: USDC, WETH)
//! - `LoanId`: 대출 생성자가 부여하는 고유 ID
//! - `Nullifier`: 동일한 private computation 재사용 방지 값

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LendingError;

/// Unix timestamp (초)
pub type Timestamp = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Ethereum 스타일 주소 (0x + 40 hex, lowercase 정규화)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    pub fn new(addr: &str) -> Result<Self, LendingError> {
        let addr = addr.trim().to_lowercase();
        let valid = addr.len() == 42
            && addr.starts_with("0x")
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit());

        if valid {
            Ok(Self(addr))
        } else {
            Err(LendingError::InvalidAddress(addr))
        }
    }

    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    /// null identity 여부 (zero address)
    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 서명 복구 결과 (H160)를 정규화된 주소로
impl From<ethers::types::Address> for Address {
    fn from(value: ethers::types::Address) -> Self {
        Self(format!("0x{}", hex::encode(value.as_bytes())))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// 식별자 검증: 비어있지 않고, 공백 없이, 최대 64자
fn validate_identifier(raw: &str) -> Result<String, LendingError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 64 || raw.chars().any(char::is_whitespace) {
        return Err(LendingError::InvalidIdentifier(raw.to_string()));
    }
    Ok(raw.to_string())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: &str) -> Result<Self, LendingError> {
                validate_identifier(raw).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = LendingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                $name::new(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_id!(
    /// 자산 denomination (loan asset / collateral asset)
    AssetId
);

string_id!(
    /// 대출 ID (생성자가 부여, 기존 대출과 충돌 불가)
    LoanId
);

/// Nullifier (32 bytes)
///
/// 하나의 private computation에 묶인 값. subject별로 한 번만 수락됨.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nullifier([u8; 32]);

impl Nullifier {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// 새 랜덤 nullifier (클라이언트/테스트용)
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Nullifier {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LendingError::InvalidIdentifier(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Nullifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// "0x" prefix 허용 hex 디코딩
pub fn decode_hex(s: &str) -> Result<Vec<u8>, LendingError> {
    hex::decode(s.trim().trim_start_matches("0x"))
        .map_err(|_| LendingError::InvalidIdentifier(s.to_string()))
}

/// u128 금액을 문자열로 직렬화 (JS number 정밀도 손실 방지)
///
/// 역직렬화는 문자열과 숫자 모두 허용
pub mod amount_str {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s
                .trim()
                .parse::<u128>()
                .map_err(|_| de::Error::custom(format!("Invalid number: {}", s))),
            Raw::Number(n) => Ok(n as u128),
        }
    }
}
