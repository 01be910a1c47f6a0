//! Record identifiers: a fresh uuid7 encoded as bech32 under a per-collection prefix

use bech32::Bech32m;
use uuid7::uuid7;

pub const LISTING_PREFIX: &str = "listing_";
pub const CONTRACT_PREFIX: &str = "contract_";

pub fn new_record_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

/// True when `id` decodes as bech32 with the given human readable part and a 16 byte payload.
pub fn is_record_id(id: &str, hrp: &str) -> bool {
    match bech32::decode(id) {
        Ok((decoded, payload)) => decoded.as_str() == hrp && payload.len() == 16,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let id = new_record_id(LISTING_PREFIX).unwrap();

        assert!(id.starts_with("listing_1"));
        assert!(is_record_id(&id, LISTING_PREFIX));
        assert!(!is_record_id(&id, CONTRACT_PREFIX));
    }

    #[test]
    fn garbage_is_not_an_id() {
        assert!(!is_record_id("listing_1abc", LISTING_PREFIX));
        assert!(!is_record_id("", LISTING_PREFIX));
    }
}
