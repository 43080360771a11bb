//! Response payloads of the scoring service.
//!
//! The service encodes every number as a string (`"score_id": "2177560145"`)
//! and dates as `"%Y-%m-%d %H:%M:%S"` in UTC. The field deserializers here
//! accept both strings and plain JSON numbers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::mods::ModCombination;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Judgment counts of one score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCounts {
    #[serde(rename = "count300", deserialize_with = "de_u32")]
    pub count_300: u32,
    #[serde(rename = "count100", deserialize_with = "de_u32")]
    pub count_100: u32,
    #[serde(rename = "count50", deserialize_with = "de_u32")]
    pub count_50: u32,
    #[serde(rename = "countgeki", deserialize_with = "de_u32")]
    pub count_geki: u32,
    #[serde(rename = "countkatu", deserialize_with = "de_u32")]
    pub count_katu: u32,
    #[serde(rename = "countmiss", deserialize_with = "de_u32")]
    pub count_miss: u32,
}

/// One entry of a leaderboard or top-play listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreInfo {
    #[serde(rename = "score_id", deserialize_with = "de_u64")]
    pub replay_id: u64,
    /// Absent on leaderboard listings, where the map is implied by the query
    #[serde(
        rename = "beatmap_id",
        default,
        deserialize_with = "de_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub map_id: Option<u32>,
    #[serde(deserialize_with = "de_u32")]
    pub user_id: u32,
    /// Absent on top-play listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "enabled_mods", deserialize_with = "de_mods")]
    pub mods: ModCombination,
    #[serde(rename = "date", deserialize_with = "de_date", serialize_with = "ser_date")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_bool")]
    pub replay_available: bool,
    #[serde(deserialize_with = "de_u64")]
    pub score: u64,
    #[serde(rename = "maxcombo", deserialize_with = "de_u32")]
    pub max_combo: u32,
    #[serde(deserialize_with = "de_bool")]
    pub perfect: bool,
    #[serde(default, deserialize_with = "de_opt_f64", skip_serializing_if = "Option::is_none")]
    pub pp: Option<f64>,
    #[serde(flatten)]
    pub counts: HitCounts,
}

/// Replay endpoint payload: a base64 encoded, compressed frame stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayPayload {
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "de_u32")]
    pub user_id: u32,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BeatmapRecord {
    #[serde(deserialize_with = "de_u32")]
    pub beatmap_id: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(serde_json::Number),
    Text(String),
}

impl Lenient {
    fn text(self) -> String {
        match self {
            Lenient::Number(n) => n.to_string(),
            Lenient::Text(s) => s,
        }
    }
}

fn parse_lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let text = Lenient::deserialize(deserializer)?.text();
    text.trim().parse::<T>().map_err(de::Error::custom)
}

fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    parse_lenient(deserializer)
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    parse_lenient(deserializer)
}

fn de_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<Lenient>::deserialize(deserializer)? {
        Some(value) => value
            .text()
            .trim()
            .parse()
            .map(Some)
            .map_err(de::Error::custom),
        None => Ok(None),
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Lenient>::deserialize(deserializer)? {
        Some(value) => value
            .text()
            .trim()
            .parse()
            .map(Some)
            .map_err(de::Error::custom),
        None => Ok(None),
    }
}

fn de_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Other(Lenient),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Other(value) => match value.text().trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag '{}'", other))),
        },
    }
}

fn de_mods<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ModCombination, D::Error> {
    de_u32(deserializer).map(ModCombination::from_bits)
}

fn de_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let text = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&text, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(de::Error::custom)
}

fn ser_date<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_leaderboard_entry() {
        let json = r#"{
            "score_id": "2177560145",
            "score": "132408001",
            "username": "Cookiezi",
            "count300": "1165",
            "count100": "8",
            "count50": "0",
            "countmiss": "0",
            "maxcombo": "1773",
            "countkatu": "7",
            "countgeki": "251",
            "perfect": "1",
            "enabled_mods": "24",
            "user_id": "124493",
            "date": "2016-07-04 19:27:05",
            "rank": "XH",
            "pp": "727.575",
            "replay_available": "1"
        }"#;

        let info: ScoreInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.replay_id, 2177560145);
        assert_eq!(info.user_id, 124493);
        assert_eq!(info.username.as_deref(), Some("Cookiezi"));
        assert_eq!(info.mods.to_string(), "HDHR");
        assert_eq!(info.map_id, None);
        assert!(info.replay_available);
        assert!(info.perfect);
        assert_eq!(info.counts.count_300, 1165);
        assert_eq!(info.counts.count_geki, 251);
        assert_eq!(info.pp, Some(727.575));
        assert_eq!(
            info.timestamp,
            Utc.with_ymd_and_hms(2016, 7, 4, 19, 27, 5).unwrap()
        );
    }

    #[test]
    fn test_parse_top_play_entry() {
        let json = r#"{
            "beatmap_id": 129891,
            "score_id": 2177560145,
            "score": 132408001,
            "maxcombo": 1773,
            "count50": 0, "count100": 8, "count300": 1165,
            "countmiss": 0, "countkatu": 7, "countgeki": 251,
            "perfect": true,
            "enabled_mods": 24,
            "user_id": 124493,
            "date": "2016-07-04 19:27:05",
            "rank": "XH",
            "pp": null,
            "replay_available": "0"
        }"#;

        let info: ScoreInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.map_id, Some(129891));
        assert_eq!(info.username, None);
        assert!(!info.replay_available);
        assert_eq!(info.pp, None);
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let json = r#"{"score_id":"1","user_id":"1","enabled_mods":"0","date":"yesterday",
            "score":"1","maxcombo":"1","perfect":"0","count300":"0","count100":"0",
            "count50":"0","countmiss":"0","countkatu":"0","countgeki":"0"}"#;
        assert!(serde_json::from_str::<ScoreInfo>(json).is_err());
    }
}
