//! Programme records
//!
//! A programme is kept as one flat record of optional fields. The store, the
//! XMLTV codec and the synthesizer all map it field by field, so there is no
//! nested object graph to walk.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Credits;
use crate::utils::datetime::parse_xmltv_datetime;

/// One scheduled broadcast, as decoded from or encoded to XMLTV
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Programme {
    /// Upstream channel id this programme belongs to
    pub channel_id: String,
    pub start: Option<String>,
    pub stop: Option<String>,
    pub start_timestamp: Option<i64>,
    pub stop_timestamp: Option<i64>,
    pub title: Option<String>,
    pub sub_title: Option<String>,
    pub desc: Option<String>,
    pub series_desc: Option<String>,
    pub country: Option<String>,
    pub icon_url: Option<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    /// Value and units joined by a space, e.g. "60 minutes"
    pub length: Option<String>,
    pub credits: Credits,
    pub episode_num_system: Option<String>,
    pub episode_num_value: Option<String>,
    pub rating_system: Option<String>,
    pub rating_value: Option<String>,
    pub star_rating: Option<String>,
    pub video_present: Option<bool>,
    pub video_colour: Option<bool>,
    pub video_aspect: Option<String>,
    pub video_quality: Option<String>,
    pub audio_present: Option<bool>,
    pub audio_stereo: Option<String>,
    pub subtitles_type: Option<String>,
    pub audio_described: bool,
    pub is_premiere: bool,
    pub is_new: bool,
    pub previously_shown: Option<String>,
    pub review_type: Option<String>,
    pub review_value: Option<String>,
}

/// A programme row together with its storage identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredProgramme {
    pub id: Uuid,
    pub guide_channel_id: Uuid,
    pub source_id: Uuid,
    #[serde(flatten)]
    pub programme: Programme,
}

impl Programme {
    pub fn new<S: Into<String>>(channel_id: S) -> Self {
        Self {
            channel_id: channel_id.into(),
            ..Default::default()
        }
    }

    /// Only programmes with no subtitle, description or icon are looked up externally
    pub fn needs_enrichment(&self) -> bool {
        self.sub_title.is_none() && self.desc.is_none() && self.icon_url.is_none()
    }

    /// Fill missing epoch timestamps from the formatted start/stop values
    pub fn derive_timestamps(&mut self) {
        if self.start_timestamp.is_none() {
            self.start_timestamp = self
                .start
                .as_deref()
                .and_then(parse_xmltv_datetime)
                .map(|dt| dt.timestamp());
        }
        if self.stop_timestamp.is_none() {
            self.stop_timestamp = self
                .stop
                .as_deref()
                .and_then(parse_xmltv_datetime)
                .map(|dt| dt.timestamp());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_candidate_rule() {
        let mut programme = Programme::new("ch1");
        programme.title = Some("News".to_string());
        assert!(programme.needs_enrichment());

        programme.icon_url = Some("http://img/news.png".to_string());
        assert!(!programme.needs_enrichment());
    }

    #[test]
    fn test_timestamps_derived_from_start_and_stop() {
        let mut programme = Programme::new("ch1");
        programme.start = Some("20240101120000 +0000".to_string());
        programme.stop = Some("20240101130000 +0100".to_string());
        programme.derive_timestamps();

        assert_eq!(programme.start_timestamp, Some(1704110400));
        assert_eq!(programme.stop_timestamp, Some(1704110400));
    }

    #[test]
    fn test_explicit_timestamps_are_kept() {
        let mut programme = Programme::new("ch1");
        programme.start = Some("20240101120000 +0000".to_string());
        programme.start_timestamp = Some(42);
        programme.derive_timestamps();

        assert_eq!(programme.start_timestamp, Some(42));
        assert_eq!(programme.stop_timestamp, None);
    }
}
