use alloy_primitives::{Address, B256};

/// Fewest leading zero bytes of an address-shaped topic.
const MIN_LEADING_ZEROS: usize = 12;

/// Most leading zero bytes of an address-shaped topic.
const MAX_LEADING_ZEROS: usize = 22;

/// Returns the address carried by `topic`, if the topic looks like a left-padded address.
///
/// A topic is address-shaped when it has between 12 and 22 leading zero bytes. The address is
/// its last 20 bytes.
pub fn extract_potential_address(topic: &B256) -> Option<Address> {
    let leading_zeros = topic.iter().take_while(|byte| **byte == 0).count();
    (MIN_LEADING_ZEROS..=MAX_LEADING_ZEROS)
        .contains(&leading_zeros)
        .then(|| Address::from_slice(&topic[MIN_LEADING_ZEROS..]))
}
