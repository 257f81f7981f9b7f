//! Next-episode computation
//!
//! Episode metadata comes from scraped sources that encode season and
//! episode numbers inconsistently: `2`, `2.0`, `"02"`, `"S2"`, `"Episode 2"`.
//! Everything is normalized to an integer before comparing.

use serde::{Deserialize, Deserializer, Serialize};

/// Season or episode number after normalization. `None` when the source
/// value carried no usable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct EpisodeNumber(Option<u32>);

impl EpisodeNumber {
    pub fn new(value: u32) -> Self {
        EpisodeNumber(Some(value))
    }

    pub fn unknown() -> Self {
        EpisodeNumber(None)
    }

    pub fn get(&self) -> Option<u32> {
        self.0
    }
}

impl From<u32> for EpisodeNumber {
    fn from(value: u32) -> Self {
        EpisodeNumber::new(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for EpisodeNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawNumber>::deserialize(deserializer)?;
        let value = match raw {
            Some(RawNumber::Int(n)) => u32::try_from(n).ok(),
            Some(RawNumber::Float(f)) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
                u32::try_from(f as i64).ok()
            }
            Some(RawNumber::Float(_)) => None,
            Some(RawNumber::Text(s)) => parse_episode_number(&s),
            None => None,
        };
        Ok(EpisodeNumber(value))
    }
}

/// Extract the first run of digits: `"01"` -> 1, `"S2"` -> 2, `"Episode 3"` -> 3
pub fn parse_episode_number(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub season_number: EpisodeNumber,
    #[serde(default)]
    pub episode_number: EpisodeNumber,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Episode {
    pub fn new(id: &str, season: u32, episode: u32) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            season_number: season.into(),
            episode_number: episode.into(),
            image_url: None,
        }
    }
}

/// Episode to offer after `current`: the next one in the same season, else
/// the first of the following season. `None` disables "Next Episode".
pub fn compute_next_episode<'a>(current: &Episode, all: &'a [Episode]) -> Option<&'a Episode> {
    let season = current.season_number.get()?;
    let episode = current.episode_number.get()?;

    let find = |s: u32, e: u32| {
        all.iter()
            .find(|ep| ep.season_number.get() == Some(s) && ep.episode_number.get() == Some(e))
    };

    find(season, episode.checked_add(1)?).or_else(|| find(season.checked_add(1)?, 1))
}
