//! Molecule encodings of the layer-2 transaction types submitted through the
//! Polyjuice web3 endpoint.
//!
//! Only the serializing half is needed here: the benchmark never reads these
//! structures back from the chain.

use bytes::Bytes;
use molecule::{pack_number, Number, NUMBER_SIZE};

/// Polyjuice arguments header, `0xFFFFFF` followed by `POLY`.
const POLYJUICE_ARGS_HEADER: &[u8; 7] = b"\xFF\xFF\xFFPOLY";
/// EVMC_CALL
const CALL_KIND_CALL: u8 = 0;
/// EVMC_CREATE
const CALL_KIND_CREATE: u8 = 3;

pub const SIGNATURE_SIZE: usize = 65;

fn table(fields: &[&[u8]]) -> Vec<u8> {
    let header_size = NUMBER_SIZE * (fields.len() + 1);
    let total_size = header_size + fields.iter().map(|f| f.len()).sum::<usize>();
    let mut buf = Vec::with_capacity(total_size);
    buf.extend_from_slice(&pack_number(total_size as Number));
    let mut offset = header_size;
    for field in fields {
        buf.extend_from_slice(&pack_number(offset as Number));
        offset += field.len();
    }
    for field in fields {
        buf.extend_from_slice(field);
    }
    buf
}

/// `fixvec<byte>`
fn bytes(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NUMBER_SIZE + data.len());
    buf.extend_from_slice(&pack_number(data.len() as Number));
    buf.extend_from_slice(data);
    buf
}

fn uint32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawL2Transaction {
    pub from_id: u32,
    pub to_id: u32,
    pub nonce: u32,
    pub args: Bytes,
}

impl RawL2Transaction {
    pub fn as_bytes(&self) -> Bytes {
        table(&[
            &uint32(self.from_id)[..],
            &uint32(self.to_id)[..],
            &uint32(self.nonce)[..],
            &bytes(&self.args)[..],
        ])
        .into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2Transaction {
    pub raw: RawL2Transaction,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl L2Transaction {
    pub fn as_bytes(&self) -> Bytes {
        table(&[&self.raw.as_bytes()[..], &self.signature[..]]).into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressMappingItem {
    pub eth_address: [u8; 20],
    pub gw_short_address: [u8; 20],
}

impl AddressMappingItem {
    fn as_bytes(&self) -> Vec<u8> {
        table(&[&self.eth_address[..], &self.gw_short_address[..]])
    }
}

/// Maps eth addresses used inside call data to godwoken short addresses.
/// The benchmark never aliases addresses, so it always sends an empty one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressMapping {
    pub data: Vec<AddressMappingItem>,
}

impl AddressMapping {
    pub fn as_bytes(&self) -> Bytes {
        let items: Vec<Vec<u8>> = self.data.iter().map(|item| item.as_bytes()).collect();
        let item_refs: Vec<&[u8]> = items.iter().map(|item| item.as_slice()).collect();
        // dynvec shares the table layout
        let data = if item_refs.is_empty() {
            pack_number(NUMBER_SIZE as Number).to_vec()
        } else {
            table(&item_refs)
        };
        table(&[&uint32(self.data.len() as u32)[..], &data[..]]).into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2TransactionWithAddressMapping {
    pub tx: L2Transaction,
    pub addresses: AddressMapping,
    pub extra: Bytes,
}

impl L2TransactionWithAddressMapping {
    pub fn new(tx: L2Transaction, addresses: AddressMapping) -> Self {
        Self {
            tx,
            addresses,
            extra: Bytes::new(),
        }
    }

    pub fn as_bytes(&self) -> Bytes {
        table(&[
            &self.tx.as_bytes()[..],
            &self.addresses.as_bytes()[..],
            &bytes(&self.extra)[..],
        ])
        .into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawL2TransactionWithAddressMapping {
    pub raw_tx: RawL2Transaction,
    pub addresses: AddressMapping,
    pub extra: Bytes,
}

impl RawL2TransactionWithAddressMapping {
    pub fn new(raw_tx: RawL2Transaction, addresses: AddressMapping) -> Self {
        Self {
            raw_tx,
            addresses,
            extra: Bytes::new(),
        }
    }

    pub fn as_bytes(&self) -> Bytes {
        table(&[
            &self.raw_tx.as_bytes()[..],
            &self.addresses.as_bytes()[..],
            &bytes(&self.extra)[..],
        ])
        .into()
    }
}

/// The Polyjuice transaction arguments
///
/// see: https://github.com/nervosnetwork/godwoken-polyjuice/blob/main/README.md#polyjuice-arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyjuiceArgs {
    pub is_create: bool,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub value: u128,
    pub input: Bytes,
}

impl PolyjuiceArgs {
    pub fn as_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(52 + self.input.len());
        buf.extend_from_slice(POLYJUICE_ARGS_HEADER);
        buf.push(if self.is_create {
            CALL_KIND_CREATE
        } else {
            CALL_KIND_CALL
        });
        buf.extend_from_slice(&self.gas_limit.to_le_bytes());
        buf.extend_from_slice(&self.gas_price.to_le_bytes());
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(&(self.input.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.input);
        buf.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tx() -> RawL2Transaction {
        RawL2Transaction {
            from_id: 2,
            to_id: 5,
            nonce: 7,
            args: Bytes::from_static(&[0xaa, 0xbb]),
        }
    }

    #[test]
    fn test_raw_l2_transaction_layout() {
        let data = raw_tx().as_bytes();
        // header: total size + 4 offsets, then 3 * Uint32 + fixvec(2)
        assert_eq!(data.len(), 20 + 12 + 4 + 2);
        assert_eq!(&data[0..4], &(38u32).to_le_bytes());
        assert_eq!(&data[4..8], &(20u32).to_le_bytes());
        assert_eq!(&data[8..12], &(24u32).to_le_bytes());
        assert_eq!(&data[12..16], &(28u32).to_le_bytes());
        assert_eq!(&data[16..20], &(32u32).to_le_bytes());
        assert_eq!(&data[20..24], &2u32.to_le_bytes());
        assert_eq!(&data[24..28], &5u32.to_le_bytes());
        assert_eq!(&data[28..32], &7u32.to_le_bytes());
        assert_eq!(&data[32..36], &2u32.to_le_bytes());
        assert_eq!(&data[36..], &[0xaa, 0xbb]);
    }

    #[test]
    fn test_empty_address_mapping() {
        let data = AddressMapping::default().as_bytes();
        // table header (12) + Uint32 length + empty dynvec (4)
        assert_eq!(
            data.to_vec(),
            vec![20, 0, 0, 0, 12, 0, 0, 0, 16, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0]
        );
    }

    #[test]
    fn test_l2_transaction_with_address_mapping_embeds_signature() {
        let tx = L2Transaction {
            raw: raw_tx(),
            signature: [9u8; SIGNATURE_SIZE],
        };
        let raw_len = tx.raw.as_bytes().len();
        let tx_bytes = tx.as_bytes();
        assert_eq!(tx_bytes.len(), 12 + raw_len + SIGNATURE_SIZE);
        assert_eq!(&tx_bytes[12 + raw_len..], &[9u8; SIGNATURE_SIZE][..]);

        let wrapped = L2TransactionWithAddressMapping::new(tx, AddressMapping::default());
        let data = wrapped.as_bytes();
        assert_eq!(data.len(), 16 + tx_bytes.len() + 20 + 4);
        assert_eq!(&data[16..16 + tx_bytes.len()], &tx_bytes[..]);
        // empty extra
        assert_eq!(&data[data.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_polyjuice_args_layout() {
        let args = PolyjuiceArgs {
            is_create: false,
            gas_limit: 0xffffff,
            gas_price: 110,
            value: 0,
            input: Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb]),
        }
        .as_bytes();
        assert_eq!(args.len(), 56);
        assert_eq!(&args[0..7], b"\xFF\xFF\xFFPOLY");
        assert_eq!(args[7], 0);
        assert_eq!(&args[8..16], &0xffffffu64.to_le_bytes());
        assert_eq!(&args[16..32], &110u128.to_le_bytes());
        assert_eq!(&args[32..48], &0u128.to_le_bytes());
        assert_eq!(&args[48..52], &4u32.to_le_bytes());
        assert_eq!(&args[52..], &[0xa9, 0x05, 0x9c, 0xbb]);
    }
}
