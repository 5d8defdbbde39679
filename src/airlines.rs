//! Callsign → airline inference and tail-number derivation.
//!
//! Airlines load from a CSV (`icao,iata,name`) into two in-memory maps.
//! Callsigns shaped like `ACA1234` resolve through the ICAO prefix first,
//! then IATA. Aircraft transmitting no callsign get a registration derived
//! from their ICAO hex where an algorithm exists (US N-numbers), marked
//! with a trailing `*`.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Airline callsigns: three letters then 1–4 digits (e.g. `ACA1234`)
static CALLSIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{3})\d{1,4}$").expect("callsign regex is valid"));

#[derive(Debug, Deserialize)]
struct AirlineRecord {
    icao: String,
    #[serde(default)]
    iata: String,
    name: String,
}

/// In-memory airline lookup
#[derive(Debug, Default)]
pub struct AirlineDb {
    by_icao: HashMap<String, String>,
    by_iata: HashMap<String, String>,
}

impl AirlineDb {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open airline database {}", path.display()))?;

        let mut db = AirlineDb::default();
        for row in reader.deserialize::<AirlineRecord>() {
            let record = row.with_context(|| "unreadable airline row")?;
            if !record.icao.trim().is_empty() {
                db.by_icao
                    .insert(record.icao.trim().to_uppercase(), record.name.clone());
            }
            if !record.iata.trim().is_empty() {
                db.by_iata
                    .insert(record.iata.trim().to_uppercase(), record.name);
            }
        }
        info!(
            "loaded {} airlines ({} IATA aliases) from {}",
            db.by_icao.len(),
            db.by_iata.len(),
            path.display()
        );
        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.by_icao.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_icao.is_empty()
    }

    /// Resolve an airline name from a callsign. The callsign must be 4–7
    /// characters shaped letters-then-digits; ICAO prefix wins over IATA.
    pub fn airline_for_callsign(&self, callsign: &str) -> Option<&str> {
        let trimmed = callsign.trim();
        if !(4..=7).contains(&trimmed.len()) {
            return None;
        }
        let upper = trimmed.to_uppercase();
        let caps = CALLSIGN_RE.captures(&upper)?;
        let prefix = caps.get(1)?.as_str().to_string();
        self.by_icao
            .get(&prefix)
            .or_else(|| self.by_iata.get(&prefix[..2.min(prefix.len())]))
            .map(|s| s.as_str())
    }
}

/// Best displayable identity for an aircraft: the transmitted callsign, or
/// a derived registration suffixed `*` when the callsign is empty.
pub fn display_identity(callsign: &str, hex: &str) -> String {
    let trimmed = callsign.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    match tail_from_icao_hex(hex) {
        Some(tail) => format!("{tail}*"),
        None => String::new(),
    }
}

// US registry constants: sequential allocation over N1 .. N99999 within
// ICAO block A00001..ADF7C7. No I or O in registration letters.
const TAIL_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const SUFFIX_SIZE: i64 = 601; // empty + 24 single letters + 24*24 pairs
const BUCKET_1: i64 = 101711;
const BUCKET_2: i64 = 10111;
const BUCKET_3: i64 = 951;
const BUCKET_4: i64 = 35;
const US_BLOCK_START: i64 = 0xA00001;
const US_BLOCK_END: i64 = 0xADF7C7;

/// 0..600 → "", "A".."Z", "AA".."ZZ"
fn tail_suffix(offset: i64) -> String {
    if offset == 0 {
        return String::new();
    }
    let index = offset - 1;
    let first = TAIL_CHARSET[(index / 25) as usize] as char;
    let rem = index % 25;
    if rem == 0 {
        first.to_string()
    } else {
        format!("{first}{}", TAIL_CHARSET[(rem - 1) as usize] as char)
    }
}

/// Derive a US N-number from an ICAO hex address. Returns `None` for hexes
/// outside the US sequential block (other registries are not algorithmic).
pub fn tail_from_icao_hex(hex: &str) -> Option<String> {
    let value = i64::from_str_radix(hex.trim(), 16).ok()?;
    if !(US_BLOCK_START..=US_BLOCK_END).contains(&value) {
        return None;
    }
    let mut rem = value - US_BLOCK_START;
    let mut tail = format!("N{}", rem / BUCKET_1 + 1);
    rem %= BUCKET_1;

    if rem < SUFFIX_SIZE {
        tail.push_str(&tail_suffix(rem));
        return Some(tail);
    }
    rem -= SUFFIX_SIZE;
    tail.push_str(&(rem / BUCKET_2).to_string());
    rem %= BUCKET_2;

    if rem < SUFFIX_SIZE {
        tail.push_str(&tail_suffix(rem));
        return Some(tail);
    }
    rem -= SUFFIX_SIZE;
    tail.push_str(&(rem / BUCKET_3).to_string());
    rem %= BUCKET_3;

    if rem < SUFFIX_SIZE {
        tail.push_str(&tail_suffix(rem));
        return Some(tail);
    }
    rem -= SUFFIX_SIZE;
    tail.push_str(&(rem / BUCKET_4).to_string());
    rem %= BUCKET_4;

    if rem == 0 {
        Some(tail)
    } else if rem <= 24 {
        tail.push(TAIL_CHARSET[(rem - 1) as usize] as char);
        Some(tail)
    } else {
        tail.push_str(&(rem - 25).to_string());
        Some(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> AirlineDb {
        let mut db = AirlineDb::default();
        db.by_icao
            .insert("ACA".to_string(), "Air Canada".to_string());
        db.by_icao
            .insert("JZA".to_string(), "Jazz Aviation".to_string());
        db.by_iata.insert("WS".to_string(), "WestJet".to_string());
        db
    }

    #[test]
    fn resolves_icao_prefix() {
        let db = test_db();
        assert_eq!(db.airline_for_callsign("ACA1234"), Some("Air Canada"));
        assert_eq!(db.airline_for_callsign("JZA891"), Some("Jazz Aviation"));
    }

    #[test]
    fn trims_and_uppercases() {
        let db = test_db();
        assert_eq!(db.airline_for_callsign(" aca101 "), Some("Air Canada"));
    }

    #[test]
    fn rejects_malformed_callsigns() {
        let db = test_db();
        assert_eq!(db.airline_for_callsign(""), None);
        assert_eq!(db.airline_for_callsign("ACA"), None);
        assert_eq!(db.airline_for_callsign("A1234"), None);
        assert_eq!(db.airline_for_callsign("ACA12345"), None);
        assert_eq!(db.airline_for_callsign("1234ACA"), None);
    }

    #[test]
    fn unknown_prefix_is_none() {
        let db = test_db();
        assert_eq!(db.airline_for_callsign("ZZZ999"), None);
    }

    #[test]
    fn tail_for_first_us_hex() {
        assert_eq!(tail_from_icao_hex("a00001"), Some("N1".to_string()));
        assert_eq!(tail_from_icao_hex("A00002"), Some("N1A".to_string()));
    }

    #[test]
    fn tail_for_known_registration() {
        // a835af is registered as N628TS
        assert_eq!(tail_from_icao_hex("a835af"), Some("N628TS".to_string()));
    }

    #[test]
    fn tail_outside_us_block_is_none() {
        // Canadian block
        assert_eq!(tail_from_icao_hex("c01234"), None);
        // Past the sequential US block
        assert_eq!(tail_from_icao_hex("adf7c8"), None);
        assert_eq!(tail_from_icao_hex("not-hex"), None);
    }

    #[test]
    fn display_identity_prefers_callsign() {
        assert_eq!(display_identity("ACA101", "a835af"), "ACA101");
        assert_eq!(display_identity("  ", "a835af"), "N628TS*");
        assert_eq!(display_identity("", "c01234"), "");
    }
}
