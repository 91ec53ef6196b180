//! BIP68 relative timelocks and quantized-timeout reconstruction
//!
//! A time-based relative lock is stored in 512-second units, so the exact
//! number of seconds a script was built with cannot be read back from the
//! chain. To spend an output locked to a committed script hash, the script
//! is rebuilt for successive candidate timeouts until its HASH160 matches.

use crate::constants::*;
use crate::error::{BetError, Result};
use crate::script::Script;
use crate::types::Hash160;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// BIP68 sequence number for a relative lock of `seconds`
pub fn encode_relative_seconds(seconds: u32) -> Result<u32> {
    let units = seconds >> SEQUENCE_LOCKTIME_GRANULARITY;
    if units > SEQUENCE_LOCKTIME_MASK {
        return Err(BetError::malformed(format!(
            "relative timeout of {} seconds exceeds the {} unit limit",
            seconds, SEQUENCE_LOCKTIME_MASK
        )));
    }
    Ok(SEQUENCE_LOCKTIME_TYPE_FLAG | units)
}

/// Seconds encoded by a time-based relative sequence number
pub fn decode_relative_sequence(sequence: u32) -> Option<u32> {
    const DISABLE_FLAG: u32 = 1 << 31;
    if sequence & DISABLE_FLAG != 0 || sequence & SEQUENCE_LOCKTIME_TYPE_FLAG == 0 {
        return None;
    }
    Some((sequence & SEQUENCE_LOCKTIME_MASK) << SEQUENCE_LOCKTIME_GRANULARITY)
}

/// Round `seconds` down to the granularity the chain keeps
pub fn quantize(seconds: u32) -> u32 {
    (seconds >> SEQUENCE_LOCKTIME_GRANULARITY) << SEQUENCE_LOCKTIME_GRANULARITY
}

/// Iteration bounds of the reconstruction search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBounds {
    /// Offsets tried for scripts with one timeout
    pub single: u32,
    /// Offsets tried per dimension for scripts with two timeouts
    pub pair: u32,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            single: DEFAULT_SEARCH_BOUND,
            pair: DEFAULT_SEARCH_BOUND,
        }
    }
}

/// `nominal + offset*512`, or `None` once it no longer fits a sequence lock
fn candidate(nominal: u32, offset: u32) -> Option<u32> {
    offset
        .checked_mul(SEQUENCE_UNIT_SECONDS)
        .and_then(|step| nominal.checked_add(step))
        .filter(|timeout| encode_relative_seconds(*timeout).is_ok())
}

/// Find the timeout `nominal + i*512`, `0 ≤ i < bound`, whose script hashes
/// to `expected`. The first match wins.
pub fn search_single<F>(
    label: &str,
    nominal: u32,
    bound: u32,
    expected: &Hash160,
    mut build: F,
) -> Result<(Script, u32)>
where
    F: FnMut(u32) -> Result<Script>,
{
    for i in 0..bound {
        let Some(timeout) = candidate(nominal, i) else {
            break;
        };
        let script = build(timeout)?;
        if script.script_hash() == *expected {
            debug!(label, nominal, offset = i, timeout, "reconstructed redeem script");
            return Ok((script, timeout));
        }
    }
    warn!(label, nominal, bound, "redeem script reconstruction exhausted its bound");
    Err(BetError::ReconstructionFailure(format!(
        "no {label} script within {bound} steps of {nominal}s matches the committed hash"
    )))
}

/// Two-timeout variant of `search_single`. `i` offsets the first timeout in
/// the outer loop and `j` the second in the inner loop; the first match in
/// that order wins.
pub fn search_pair<F>(
    label: &str,
    nominal: (u32, u32),
    bound: u32,
    expected: &Hash160,
    mut build: F,
) -> Result<(Script, u32, u32)>
where
    F: FnMut(u32, u32) -> Result<Script>,
{
    for i in 0..bound {
        let Some(first) = candidate(nominal.0, i) else {
            break;
        };
        for j in 0..bound {
            let Some(second) = candidate(nominal.1, j) else {
                break;
            };
            let script = build(first, second)?;
            if script.script_hash() == *expected {
                debug!(label, first, second, outer = i, inner = j, "reconstructed redeem script");
                return Ok((script, first, second));
            }
        }
    }
    warn!(label, ?nominal, bound, "redeem script reconstruction exhausted its bound");
    Err(BetError::ReconstructionFailure(format!(
        "no {label} script within {bound}x{bound} steps of {nominal:?}s matches the committed hash"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptBuilder;

    fn lock_script(seconds: u32) -> Result<Script> {
        ScriptBuilder::new()
            .push_relative_timelock(encode_relative_seconds(seconds)?)
            .into_script()
    }

    fn pair_script(first: u32, second: u32) -> Result<Script> {
        ScriptBuilder::new()
            .push_relative_timelock(encode_relative_seconds(first)?)
            .push_relative_timelock(encode_relative_seconds(second)?)
            .into_script()
    }

    #[test]
    fn test_encode_relative_seconds() {
        assert_eq!(encode_relative_seconds(0).unwrap(), 0x0040_0000);
        assert_eq!(encode_relative_seconds(511).unwrap(), 0x0040_0000);
        assert_eq!(encode_relative_seconds(512).unwrap(), 0x0040_0001);
        assert_eq!(encode_relative_seconds(86_400).unwrap(), 0x0040_00a8);
    }

    #[test]
    fn test_encode_overflow() {
        assert!(encode_relative_seconds(0xffff * 512).is_ok());
        assert!(matches!(
            encode_relative_seconds(0x1_0000 * 512),
            Err(BetError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_decode_relative_sequence() {
        assert_eq!(decode_relative_sequence(0x0040_0003), Some(1536));
        assert_eq!(decode_relative_sequence(0x0000_0003), None);
        assert_eq!(decode_relative_sequence(SEQUENCE_FINAL), None);
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(1000), 512);
        assert_eq!(quantize(1024), 1024);
    }

    #[test]
    fn test_search_single_recovers_offset() {
        let nominal = 3_600;
        let actual = nominal + 7 * 512;
        let expected = lock_script(actual).unwrap().script_hash();
        let (script, timeout) = search_single("test", nominal, 100, &expected, lock_script).unwrap();
        assert_eq!(timeout, actual);
        assert_eq!(script, lock_script(actual).unwrap());
    }

    #[test]
    fn test_search_single_exhausted() {
        let expected = lock_script(3_600 + 50 * 512).unwrap().script_hash();
        let result = search_single("test", 3_600, 50, &expected, lock_script);
        assert!(matches!(result, Err(BetError::ReconstructionFailure(_))));
    }

    #[test]
    fn test_search_single_never_accepts_below_nominal() {
        let expected = lock_script(1_024).unwrap().script_hash();
        assert!(search_single("test", 2_048, 10, &expected, lock_script).is_err());
    }

    #[test]
    fn test_search_stops_at_sequence_limit() {
        let limit = SEQUENCE_LOCKTIME_MASK << SEQUENCE_LOCKTIME_GRANULARITY;
        let expected = lock_script(1_024).unwrap().script_hash();
        assert!(matches!(
            search_single("test", limit - 512, 10, &expected, lock_script),
            Err(BetError::ReconstructionFailure(_))
        ));
        assert!(matches!(
            search_pair("test", (3_600, limit), 10, &expected, pair_script),
            Err(BetError::ReconstructionFailure(_))
        ));
    }

    #[test]
    fn test_search_pair_recovers_offsets() {
        let nominal = (3_600, 7_200);
        let expected = pair_script(3_600 + 2 * 512, 7_200 + 5 * 512).unwrap().script_hash();
        let (_, first, second) = search_pair("test", nominal, 10, &expected, pair_script).unwrap();
        assert_eq!((first, second), (3_600 + 1_024, 7_200 + 2_560));
    }

    #[test]
    fn test_search_pair_exhausted() {
        let expected = pair_script(3_600, 7_200 + 10 * 512).unwrap().script_hash();
        let result = search_pair("test", (3_600, 7_200), 10, &expected, pair_script);
        assert!(matches!(result, Err(BetError::ReconstructionFailure(_))));
    }
}
