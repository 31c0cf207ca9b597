//! Utility functions for id generation

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique user id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// same, for internal ids with a compile-time-known prefix
pub(crate) fn new_id(prefix: &str) -> String {
    let hrp = bech32::Hrp::parse_unchecked(prefix);
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .expect("16 uuid bytes are always within bech32 length limits")
}
