use std::fmt;
use std::str::FromStr;

use ethers::types::Address;
use ethers::utils::to_checksum;
use thiserror::Error;

const PREFIX: &str = "0x";
const HEX_LEN: usize = 40;

/// Total length of a `0x`-prefixed address as typed by a user.
pub const ADDRESS_LEN: usize = PREFIX.len() + HEX_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidAddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {0}")]
    WrongLength(usize),
    #[error("address contains non-hex character {0:?}")]
    InvalidCharacter(char),
}

/// A syntactically valid wallet address.
///
/// Input casing is not trusted: a mixed-case string whose casing does not
/// match its EIP-55 checksum is accepted and corrected. `Display` always
/// renders the checksummed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletAddress(Address);

impl WalletAddress {
    pub fn parse(input: &str) -> Result<Self, InvalidAddressError> {
        let digits = input
            .strip_prefix(PREFIX)
            .ok_or(InvalidAddressError::MissingPrefix)?;

        let len = digits.chars().count();
        if len != HEX_LEN {
            return Err(InvalidAddressError::WrongLength(len));
        }

        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(InvalidAddressError::InvalidCharacter(bad));
        }

        let address = digits
            .parse::<Address>()
            .map_err(|_| InvalidAddressError::WrongLength(len))?;
        Ok(Self(address))
    }

    pub fn as_address(&self) -> Address {
        self.0
    }

    pub fn checksummed(&self) -> String {
        to_checksum(&self.0, None)
    }
}

impl FromStr for WalletAddress {
    type Err = InvalidAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksummed())
    }
}

/// Cheap pre-check used before attempting a lookup on free text:
/// `0x` followed by enough characters to be an address.
pub fn looks_like_address(text: &str) -> bool {
    text.starts_with(PREFIX) && text.chars().count() == ADDRESS_LEN
}
