use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::account::EthAddress;

/// Used when the node reports the minimal gas price of 1.
pub const DEFAULT_MIN_CURRENT_GAS_PRICE: u128 = 200;
// tier price = current price * RATE / 10
const LOW_RATE_IN_10: u128 = 5;
const EVEN_RATE_IN_10: u128 = 11;
const HIGH_RATE_IN_10: u128 = 20;

const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
const ERC20_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// Not a method of the ERC20 contract, the call reverts.
pub const WRONG_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x32];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GasPriceTier {
    Low,
    Even,
    High,
}

impl GasPriceTier {
    pub const ALL: [GasPriceTier; 3] = [GasPriceTier::Low, GasPriceTier::Even, GasPriceTier::High];
}

impl fmt::Display for GasPriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GasPriceTier::Low => "low",
            GasPriceTier::Even => "even",
            GasPriceTier::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Round-robin tier of the `index`th account.
pub fn tier_for_index(index: usize) -> GasPriceTier {
    GasPriceTier::ALL[index % GasPriceTier::ALL.len()]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPriceTiers {
    pub low: u128,
    pub even: u128,
    pub high: u128,
}

impl GasPriceTiers {
    pub fn from_network_price(gas_price: u128) -> Self {
        let current = if gas_price == 1 {
            DEFAULT_MIN_CURRENT_GAS_PRICE
        } else {
            gas_price
        };
        Self {
            low: current * LOW_RATE_IN_10 / 10,
            even: current * EVEN_RATE_IN_10 / 10,
            high: current * HIGH_RATE_IN_10 / 10,
        }
    }

    pub fn price(&self, tier: GasPriceTier) -> u128 {
        match tier {
            GasPriceTier::Low => self.low,
            GasPriceTier::Even => self.even,
            GasPriceTier::High => self.high,
        }
    }
}

fn abi_address(address: &EthAddress) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

fn abi_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `transfer(address,uint256)`
pub fn erc20_transfer_data(to: &EthAddress, amount: u128) -> Bytes {
    let mut data = ERC20_TRANSFER_SELECTOR.to_vec();
    data.extend_from_slice(&abi_address(to));
    data.extend_from_slice(&abi_uint(amount));
    data.into()
}

/// `balanceOf(address)`
pub fn erc20_balance_of_data(owner: &EthAddress) -> Bytes {
    erc20_call_data(ERC20_BALANCE_OF_SELECTOR, owner)
}

pub fn erc20_call_data(selector: [u8; 4], address: &EthAddress) -> Bytes {
    let mut data = selector.to_vec();
    data.extend_from_slice(&abi_address(address));
    data.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_robin() {
        assert_eq!(tier_for_index(0), GasPriceTier::Low);
        assert_eq!(tier_for_index(1), GasPriceTier::Even);
        assert_eq!(tier_for_index(2), GasPriceTier::High);
        for n in 3..40 {
            let tiers: Vec<GasPriceTier> = (0..n).map(tier_for_index).collect();
            for group in tiers.windows(3) {
                let mut group = group.to_vec();
                group.sort();
                assert_eq!(group, GasPriceTier::ALL.to_vec());
            }
        }
    }

    #[test]
    fn test_gas_price_tiers() {
        let tiers = GasPriceTiers::from_network_price(1000);
        assert_eq!(tiers.price(GasPriceTier::Low), 500);
        assert_eq!(tiers.price(GasPriceTier::Even), 1100);
        assert_eq!(tiers.price(GasPriceTier::High), 2000);

        let tiers = GasPriceTiers::from_network_price(1);
        assert_eq!(
            tiers,
            GasPriceTiers {
                low: 100,
                even: 220,
                high: 400
            }
        );
    }

    #[test]
    fn test_erc20_transfer_data() {
        let data = erc20_transfer_data(&[0x11; 20], 1);
        let expected = format!(
            "a9059cbb000000000000000000000000{}{}",
            "11".repeat(20),
            format!("{:064x}", 1)
        );
        assert_eq!(hex::encode(&data), expected);
    }

    #[test]
    fn test_erc20_balance_of_data() {
        let data = erc20_balance_of_data(&[0x22; 20]);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(&data[16..], &[0x22; 20][..]);
    }
}
