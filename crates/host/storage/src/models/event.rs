//! Models for the event log relevance index.
//!
//! Each stored log records which end-user accounts it references in its indexed topics. A log
//! referencing no account is a lifecycle event and is visible to everyone; any other log is
//! visible only to the accounts it references.
//!
//! Topics and relevant addresses are kept twice: a 4-byte short hash used as the index key and
//! the full value used to confirm a match. The short hash is a prefix of the keccak256 of the
//! value, so address-shaped topics (which share twelve leading zero bytes) still spread evenly
//! across the index.

use super::{read_array, read_u32, read_u64};
use alloy_primitives::{Address, B256, Bytes, FixedBytes, keccak256};
use alloy_rlp::{
    Buf, BufMut, Decodable, EMPTY_LIST_CODE, Encodable, Header, RlpDecodable, RlpEncodable,
};
use derive_more::Constructor;
use reth_db_api::{
    DatabaseError,
    table::{Decode, Encode, Table},
};
use serde::{Deserialize, Serialize};

/// Length in bytes of the short hash of an indexed value.
pub const SHORT_HASH_LEN: usize = 4;

/// Number of topics, after the event signature, that may reference an account.
pub const RELEVANT_ADDRESS_SLOTS: usize = 4;

fn short_hash(value: &[u8]) -> FixedBytes<SHORT_HASH_LEN> {
    FixedBytes::from_slice(&keccak256(value)[..SHORT_HASH_LEN])
}

/// A topic with its short hash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, RlpEncodable,
    RlpDecodable,
)]
pub struct IndexedTopic {
    /// Short hash of the topic.
    pub short: FixedBytes<SHORT_HASH_LEN>,
    /// The full topic.
    pub full: B256,
}

impl IndexedTopic {
    /// Creates an [`IndexedTopic`] from a full topic.
    pub fn new(full: B256) -> Self {
        Self { short: short_hash(full.as_slice()), full }
    }
}

/// An account address with its short hash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, RlpEncodable,
    RlpDecodable,
)]
pub struct IndexedAddress {
    /// Short hash of the address.
    pub short: FixedBytes<SHORT_HASH_LEN>,
    /// The full address.
    pub full: Address,
}

impl IndexedAddress {
    /// Creates an [`IndexedAddress`] from a full address.
    pub fn new(full: Address) -> Self {
        Self { short: short_hash(full.as_slice()), full }
    }
}

/// Position of a log: `(batch height, batch sequence, tx index, log index)`.
///
/// The derived ordering is the order logs are returned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventLogKey {
    /// Height of the emitting batch.
    pub number: u64,
    /// Sequence number of the emitting batch.
    pub sequence: u64,
    /// Index of the emitting transaction in the batch.
    pub tx_index: u32,
    /// Index of the log in the batch.
    pub log_index: u32,
}

impl EventLogKey {
    /// Creates a new [`EventLogKey`].
    pub const fn new(number: u64, sequence: u64, tx_index: u32, log_index: u32) -> Self {
        Self { number, sequence, tx_index, log_index }
    }

    /// Smallest key at `number`.
    pub const fn first_at_height(number: u64) -> Self {
        Self::new(number, 0, 0, 0)
    }

    /// Largest key at `number`.
    pub const fn last_at_height(number: u64) -> Self {
        Self::new(number, u64::MAX, u32::MAX, u32::MAX)
    }

    /// Smallest key of a batch.
    pub const fn first_in_batch(number: u64, sequence: u64) -> Self {
        Self::new(number, sequence, 0, 0)
    }

    /// Largest key of a batch.
    pub const fn last_in_batch(number: u64, sequence: u64) -> Self {
        Self::new(number, sequence, u32::MAX, u32::MAX)
    }

    const ENCODED_LEN: usize = 24;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.number.to_be_bytes());
        buf[8..16].copy_from_slice(&self.sequence.to_be_bytes());
        buf[16..20].copy_from_slice(&self.tx_index.to_be_bytes());
        buf[20..24].copy_from_slice(&self.log_index.to_be_bytes());
    }

    fn read_from(value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self {
            number: read_u64(value, 0)?,
            sequence: read_u64(value, 8)?,
            tx_index: read_u32(value, 16)?,
            log_index: read_u32(value, 20)?,
        })
    }
}

impl Encode for EventLogKey {
    type Encoded = [u8; 24];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 24];
        self.write_to(&mut buf);
        buf
    }
}

impl Decode for EventLogKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != Self::ENCODED_LEN {
            return Err(DatabaseError::Decode);
        }
        Self::read_from(value)
    }
}

/// A stored log with its relevance metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Address of the emitting contract.
    pub address: Address,
    /// Indexed topics, the event signature first.
    pub topics: Vec<IndexedTopic>,
    /// Accounts referenced by topics one to four, by topic position.
    pub relevant_addresses: [Option<IndexedAddress>; RELEVANT_ADDRESS_SLOTS],
    /// Non-indexed log data.
    pub data: Bytes,
    /// Hash of the emitting transaction.
    pub tx_hash: B256,
    /// Hash of the emitting batch.
    pub batch_hash: B256,
}

impl EventLogEntry {
    /// Creates a new [`EventLogEntry`].
    ///
    /// `relevant_addresses[i]` holds the account referenced by topic `i + 1`, if any.
    pub fn new(
        address: Address,
        topics: &[B256],
        relevant_addresses: [Option<Address>; RELEVANT_ADDRESS_SLOTS],
        data: Bytes,
        tx_hash: B256,
        batch_hash: B256,
    ) -> Self {
        Self {
            address,
            topics: topics.iter().copied().map(IndexedTopic::new).collect(),
            relevant_addresses: relevant_addresses.map(|slot| slot.map(IndexedAddress::new)),
            data,
            tx_hash,
            batch_hash,
        }
    }

    /// Returns `true` if the log references no account and is therefore visible to everyone.
    pub fn is_lifecycle(&self) -> bool {
        self.relevant_addresses.iter().all(Option::is_none)
    }

    /// Returns `true` if the log is visible to `account`.
    pub fn is_visible_to(&self, account: &IndexedAddress) -> bool {
        self.is_lifecycle() ||
            self.relevant_addresses
                .iter()
                .flatten()
                .any(|relevant| relevant.short == account.short && relevant.full == account.full)
    }

    /// Returns the full topics, the event signature first.
    pub fn full_topics(&self) -> Vec<B256> {
        self.topics.iter().map(|topic| topic.full).collect()
    }

    fn slots_payload_length(&self) -> usize {
        self.relevant_addresses.iter().map(slot_length).sum()
    }

    fn rlp_payload_length(&self) -> usize {
        let slots_payload_length = self.slots_payload_length();
        self.address.length() +
            self.topics.length() +
            Header { list: true, payload_length: slots_payload_length }.length_with_payload() +
            self.is_lifecycle().length() +
            self.data.length() +
            self.tx_hash.length() +
            self.batch_hash.length()
    }
}

fn slot_length(slot: &Option<IndexedAddress>) -> usize {
    slot.as_ref().map_or(1, Encodable::length)
}

fn encode_slot(slot: &Option<IndexedAddress>, out: &mut dyn BufMut) {
    match slot {
        Some(address) => address.encode(out),
        None => out.put_u8(EMPTY_LIST_CODE),
    }
}

fn decode_slot(buf: &mut &[u8]) -> alloy_rlp::Result<Option<IndexedAddress>> {
    if buf.first() == Some(&EMPTY_LIST_CODE) {
        buf.advance(1);
        return Ok(None);
    }
    IndexedAddress::decode(buf).map(Some)
}

impl Encodable for EventLogEntry {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.rlp_payload_length() }.encode(out);
        self.address.encode(out);
        self.topics.encode(out);
        Header { list: true, payload_length: self.slots_payload_length() }.encode(out);
        for slot in &self.relevant_addresses {
            encode_slot(slot, out);
        }
        self.is_lifecycle().encode(out);
        self.data.encode(out);
        self.tx_hash.encode(out);
        self.batch_hash.encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.rlp_payload_length() }.length_with_payload()
    }
}

impl Decodable for EventLogEntry {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let rlp_head = Header::decode(buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let address = Address::decode(buf)?;
        let topics = Vec::<IndexedTopic>::decode(buf)?;

        let slots_head = Header::decode(buf)?;
        if !slots_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if buf.len() < slots_head.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let mut slots = &buf[..slots_head.payload_length];
        let mut relevant_addresses = [None; RELEVANT_ADDRESS_SLOTS];
        for slot in &mut relevant_addresses {
            *slot = decode_slot(&mut slots)?;
        }
        if !slots.is_empty() {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: slots_head.payload_length,
                got: slots_head.payload_length - slots.len(),
            });
        }
        buf.advance(slots_head.payload_length);

        let is_lifecycle = bool::decode(buf)?;
        let this = Self {
            address,
            topics,
            relevant_addresses,
            data: Bytes::decode(buf)?,
            tx_hash: B256::decode(buf)?,
            batch_hash: B256::decode(buf)?,
        };

        let consumed = started_len - buf.len();
        if consumed != rlp_head.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: rlp_head.payload_length,
                got: consumed,
            });
        }
        if is_lifecycle != this.is_lifecycle() {
            return Err(alloy_rlp::Error::Custom("lifecycle flag contradicts relevant addresses"));
        }
        Ok(this)
    }
}

/// A log together with its position, as handed to and returned from the store.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct EventLogRecord {
    /// Position of the log.
    pub key: EventLogKey,
    /// The log and its relevance metadata.
    pub entry: EventLogEntry,
}

/// Stored logs by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct EventLogs;

impl Table for EventLogs {
    const NAME: &'static str = "event_logs";
    const DUPSORT: bool = false;
    type Key = EventLogKey;
    type Value = EventLogEntry;
}

/// Composite `(address short hash, log position)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelevantAddressKey {
    /// Short hash of the relevant address.
    pub short: FixedBytes<SHORT_HASH_LEN>,
    /// Position of the log.
    pub log: EventLogKey,
}

impl RelevantAddressKey {
    /// Creates a new [`RelevantAddressKey`].
    pub const fn new(short: FixedBytes<SHORT_HASH_LEN>, log: EventLogKey) -> Self {
        Self { short, log }
    }
}

impl Encode for RelevantAddressKey {
    type Encoded = [u8; 28];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 28];
        buf[..SHORT_HASH_LEN].copy_from_slice(self.short.as_slice());
        self.log.write_to(&mut buf[SHORT_HASH_LEN..]);
        buf
    }
}

impl Decode for RelevantAddressKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != SHORT_HASH_LEN + EventLogKey::ENCODED_LEN {
            return Err(DatabaseError::Decode);
        }
        Ok(Self {
            short: FixedBytes::from(read_array::<SHORT_HASH_LEN>(value, 0)?),
            log: EventLogKey::read_from(&value[SHORT_HASH_LEN..])?,
        })
    }
}

/// Index from relevant address to the logs referencing it.
///
/// - **Key**: [`RelevantAddressKey`]
/// - **Value**: [`super::AddressRef`]: the full address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct RelevantAddresses;

impl Table for RelevantAddresses {
    const NAME: &'static str = "relevant_addresses";
    const DUPSORT: bool = false;
    type Key = RelevantAddressKey;
    type Value = super::AddressRef;
}

/// Composite `(topic position, topic short hash, log position)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventTopicKey {
    /// Position of the topic in the log.
    pub position: u8,
    /// Short hash of the topic.
    pub short: FixedBytes<SHORT_HASH_LEN>,
    /// Position of the log.
    pub log: EventLogKey,
}

impl EventTopicKey {
    /// Creates a new [`EventTopicKey`].
    pub const fn new(position: u8, short: FixedBytes<SHORT_HASH_LEN>, log: EventLogKey) -> Self {
        Self { position, short, log }
    }
}

impl Encode for EventTopicKey {
    type Encoded = [u8; 29];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 29];
        buf[0] = self.position;
        buf[1..1 + SHORT_HASH_LEN].copy_from_slice(self.short.as_slice());
        self.log.write_to(&mut buf[1 + SHORT_HASH_LEN..]);
        buf
    }
}

impl Decode for EventTopicKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 1 + SHORT_HASH_LEN + EventLogKey::ENCODED_LEN {
            return Err(DatabaseError::Decode);
        }
        Ok(Self {
            position: value[0],
            short: FixedBytes::from(read_array::<SHORT_HASH_LEN>(value, 1)?),
            log: EventLogKey::read_from(&value[1 + SHORT_HASH_LEN..])?,
        })
    }
}

/// Index from `(position, topic)` to the logs carrying that topic.
///
/// - **Key**: [`EventTopicKey`]
/// - **Value**: [`super::HashRef`]: the full topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct EventTopics;

impl Table for EventTopics {
    const NAME: &'static str = "event_topics";
    const DUPSORT: bool = false;
    type Key = EventTopicKey;
    type Value = super::HashRef;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(relevant: [Option<Address>; 4]) -> EventLogEntry {
        EventLogEntry::new(
            Address::repeat_byte(0xc0),
            &[B256::repeat_byte(0x01), B256::repeat_byte(0x02)],
            relevant,
            Bytes::from_static(b"payload"),
            B256::repeat_byte(0x0a),
            B256::repeat_byte(0x0b),
        )
    }

    #[test]
    fn test_lifecycle_follows_relevant_addresses() {
        assert!(entry([None; 4]).is_lifecycle());
        assert!(!entry([None, Some(Address::repeat_byte(7)), None, None]).is_lifecycle());
    }

    #[test]
    fn test_visibility() {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let private = entry([Some(alice), None, None, None]);
        let lifecycle = entry([None; 4]);

        assert!(private.is_visible_to(&IndexedAddress::new(alice)));
        assert!(!private.is_visible_to(&IndexedAddress::new(bob)));
        assert!(lifecycle.is_visible_to(&IndexedAddress::new(bob)));
    }

    #[test]
    fn test_rlp_decode_restores_slots() {
        let original = entry([None, Some(Address::repeat_byte(3)), None, Some(Address::ZERO)]);
        let encoded = alloy_rlp::encode(&original);
        assert_eq!(encoded.len(), original.length());

        let decoded = EventLogEntry::decode(&mut encoded.as_slice()).expect("decode entry");
        assert_eq!(decoded, original);
        assert_eq!(decoded.relevant_addresses[0], None);
        assert_eq!(decoded.relevant_addresses[3], Some(IndexedAddress::new(Address::ZERO)));
    }

    #[test]
    fn test_short_hash_spreads_address_topics() {
        let first = IndexedTopic::new(Address::repeat_byte(1).into_word());
        let second = IndexedTopic::new(Address::repeat_byte(2).into_word());
        assert_ne!(first.short, second.short);
    }

    #[test]
    fn test_topic_key_orders_by_position_then_short_hash() {
        let log = EventLogKey::new(1, 1, 0, 0);
        let low = EventTopicKey::new(0, FixedBytes::repeat_byte(0xff), log).encode();
        let high = EventTopicKey::new(1, FixedBytes::ZERO, log).encode();
        assert!(low < high);

        let key = EventTopicKey::new(3, FixedBytes::repeat_byte(9), EventLogKey::new(4, 5, 6, 7));
        assert_eq!(EventTopicKey::decode(&key.encode()).expect("decode key"), key);
    }

    #[test]
    fn test_relevant_address_key_decode() {
        let key = RelevantAddressKey::new(
            IndexedAddress::new(Address::repeat_byte(0x33)).short,
            EventLogKey::new(10, 11, 2, 3),
        );
        assert_eq!(RelevantAddressKey::decode(&key.encode()).expect("decode key"), key);
    }
}
