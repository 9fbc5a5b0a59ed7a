use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const NEW_ACCOUNT_SOURCE: &str = "New Account";

/// One stored credential. Entries carry no identity of their own; they are
/// addressed by their current position in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Entry {
    pub source: String,
    #[serde(rename = "date", deserialize_with = "deserialize_timestamp")]
    #[zeroize(skip)]
    pub modified_at: DateTime<Utc>,
    pub password: String,
}

impl Entry {
    pub fn new(source: impl Into<String>, password: impl Into<String>) -> Self {
        Self::at(source, password, Utc::now())
    }

    pub fn at(
        source: impl Into<String>,
        password: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            password: password.into(),
            modified_at,
        }
    }

    /// Fresh placeholder appended by the editor's "new" action.
    pub fn new_account() -> Self {
        Self::new(NEW_ACCOUNT_SOURCE, "")
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Sorts newest first, keeping the prior relative order of equal timestamps.
///
/// Returns the applied permutation: `order[new_position] == old_position`.
pub fn sort_newest_first(entries: &mut Vec<Entry>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| entries[b].modified_at.cmp(&entries[a].modified_at));

    let mut slots: Vec<Option<Entry>> = entries.drain(..).map(Some).collect();
    entries.extend(order.iter().filter_map(|&old| slots[old].take()));
    order
}

pub fn is_sorted_newest_first(entries: &[Entry]) -> bool {
    entries
        .windows(2)
        .all(|pair| pair[0].modified_at >= pair[1].modified_at)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Epoch(f64),
}

/// Unix time of 2001-01-01T00:00:00Z, the epoch numeric dates are counted from.
pub const REFERENCE_DATE_UNIX_SECS: i64 = 978_307_200;

// Older blobs stored the date as seconds since 2001-01-01 UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid date {text:?}: {e}"))),
        RawTimestamp::Epoch(secs) => {
            if !secs.is_finite() {
                return Err(D::Error::custom("non-finite epoch timestamp"));
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
            (whole as i64)
                .checked_add(REFERENCE_DATE_UNIX_SECS)
                .and_then(|unix| Utc.timestamp_opt(unix, nanos.min(999_999_999)).single())
                .ok_or_else(|| D::Error::custom(format!("epoch timestamp out of range: {secs}")))
        }
    }
}
