//! Serde helpers which pin timestamps to `YYYY-MM-DDTHH:MM:SSZ`, so that the
//! text being signed never depends on how a library chooses to render
//! fractional seconds or offsets

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error};

use super::TIMESTAMP_FORMAT;

/// The current time, truncated to whole seconds
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn serialize<S>(x: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.collect_str(&x.format(TIMESTAMP_FORMAT))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;

    let naive = NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(D::Error::custom)?;
    Ok(naive.and_utc())
}
