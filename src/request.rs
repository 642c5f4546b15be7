//! Request types for the three media operations.
//!
//! Front ends receive loosely typed query strings. We decode them once, at the boundary, into
//! a closed [`Action`] so the core never sees an unknown operation or a half-parsed number.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Output container profile for sub-clips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Fragmented MP4 suited to Apple HLS clients.
    #[default]
    Apple,
}

impl Profile {
    /// Container format name handed to the muxer.
    pub fn container(self) -> &'static str {
        match self {
            Profile::Apple => "mp4",
        }
    }

    /// Header options for the container.
    pub fn mux_options(self) -> crate::media::MuxOptions {
        match self {
            Profile::Apple => crate::media::MuxOptions::default()
                .with("movflags", "empty_moov+frag_keyframe+faststart")
                .with("fflags", "flush_packets"),
        }
    }

    /// MIME type of the produced container.
    pub fn content_type(self) -> &'static str {
        match self {
            Profile::Apple => "video/mp4",
        }
    }

    /// Value used for this profile in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Apple => "apple",
        }
    }
}

/// A sub-clip request.
///
/// Start/end bounds are either byte positions or timestamps in the primary video stream's
/// time base. Absent bounds mean "from the start" / "to the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    #[serde(rename = "startPos", default)]
    pub start_position: Option<i64>,
    #[serde(rename = "endPos", default)]
    pub end_position: Option<i64>,
    #[serde(rename = "startTs", default)]
    pub start_timestamp: Option<i64>,
    #[serde(rename = "endTs", default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub profile: Profile,
}

/// How a sub-clip positions the source before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipStart {
    /// Seek to a video-stream timestamp.
    Timestamp(i64),
    /// Seek to a byte position.
    Position(i64),
    /// Read from the start of the container.
    Beginning,
}

impl TranscodeRequest {
    /// A request for `[start_ts, end_ts]` in video time base units.
    pub fn timestamps(start_ts: i64, end_ts: i64) -> Self {
        Self {
            start_timestamp: Some(start_ts),
            end_timestamp: Some(end_ts),
            ..Self::default()
        }
    }

    /// Seek strategy. A start timestamp wins over a start position.
    pub fn clip_start(&self) -> ClipStart {
        match (self.start_timestamp, self.start_position) {
            (Some(ts), _) => ClipStart::Timestamp(ts),
            (None, Some(pos)) => ClipStart::Position(pos),
            (None, None) => ClipStart::Beginning,
        }
    }

    /// Whether a packet at `position` / `video_pts` lies past the requested end.
    pub fn is_past_end(&self, position: Option<i64>, video_pts: Option<i64>) -> bool {
        let past_pos = matches!((self.end_position, position), (Some(end), Some(pos)) if pos > end);
        let past_ts = matches!((self.end_timestamp, video_pts), (Some(end), Some(pts)) if pts > end);
        past_pos || past_ts
    }
}

/// One supported media operation, decoded from a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A still image of the frame at `time` seconds.
    Image { time: f64 },
    /// A sub-clip container.
    Transcode(TranscodeRequest),
    /// A VOD playlist of keyframe-aligned sub-clips.
    Playlist,
}

/// Raw query parameters as they arrive from a front end.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "startPos", default)]
    pub start_pos: Option<String>,
    #[serde(rename = "endPos", default)]
    pub end_pos: Option<String>,
    #[serde(rename = "startTs", default)]
    pub start_ts: Option<String>,
    #[serde(rename = "endTs", default)]
    pub end_ts: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

impl ActionQuery {
    /// Decode into an [`Action`], rejecting unknown actions and malformed numbers.
    pub fn into_action(self) -> Result<Action> {
        let action = self.action.as_deref().map(str::trim).unwrap_or_default();
        match action {
            "image" => {
                let time = parse_number::<f64>("time", self.time.as_deref())?
                    .ok_or_else(|| Error::msg("missing 'time' for action 'image'"))?;
                Ok(Action::Image { time })
            }
            "transcode" => Ok(Action::Transcode(TranscodeRequest {
                start_position: parse_number("startPos", self.start_pos.as_deref())?,
                end_position: parse_number("endPos", self.end_pos.as_deref())?,
                start_timestamp: parse_number("startTs", self.start_ts.as_deref())?,
                end_timestamp: parse_number("endTs", self.end_ts.as_deref())?,
                profile: parse_profile(self.profile.as_deref())?,
            })),
            "playlist" => Ok(Action::Playlist),
            "" => Err(Error::msg("missing 'action'")),
            other => Err(Error::msg(format!("Unsupported action {other}"))),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: Option<&str>) -> Result<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::msg(format!("invalid '{name}': '{value}'"))),
    }
}

fn parse_profile(raw: Option<&str>) -> Result<Profile> {
    match raw.map(|p| p.trim().to_ascii_lowercase()) {
        None => Ok(Profile::Apple),
        Some(p) if p.is_empty() || p == "apple" => Ok(Profile::Apple),
        Some(other) => Err(Error::msg(format!(
            "unknown profile '{other}' (expected 'apple')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ActionQuery {
        let mut q = ActionQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "action" => q.action = v,
                "time" => q.time = v,
                "startPos" => q.start_pos = v,
                "endPos" => q.end_pos = v,
                "startTs" => q.start_ts = v,
                "endTs" => q.end_ts = v,
                "profile" => q.profile = v,
                _ => {}
            }
        }
        q
    }

    #[test]
    fn decodes_image_action() -> anyhow::Result<()> {
        let action = query(&[("action", "image"), ("time", "10.5")]).into_action()?;
        assert_eq!(action, Action::Image { time: 10.5 });
        Ok(())
    }

    #[test]
    fn decodes_transcode_action() -> anyhow::Result<()> {
        let action = query(&[
            ("action", "transcode"),
            ("startTs", "5000"),
            ("endTs", "15000"),
            ("profile", "apple"),
        ])
        .into_action()?;

        assert_eq!(
            action,
            Action::Transcode(TranscodeRequest::timestamps(5_000, 15_000))
        );
        Ok(())
    }

    #[test]
    fn rejects_unknown_action_and_bad_numbers() {
        let err = query(&[("action", "explode")]).into_action().unwrap_err();
        assert!(err.to_string().contains("Unsupported action explode"));

        let err = query(&[("action", "transcode"), ("startTs", "abc")])
            .into_action()
            .unwrap_err();
        assert!(err.to_string().contains("invalid 'startTs'"));

        assert!(query(&[("action", "image")]).into_action().is_err());
        assert!(query(&[]).into_action().is_err());
    }

    #[test]
    fn start_timestamp_wins_over_position() {
        let req = TranscodeRequest {
            start_position: Some(4096),
            start_timestamp: Some(5_000),
            ..TranscodeRequest::default()
        };
        assert_eq!(req.clip_start(), ClipStart::Timestamp(5_000));

        let req = TranscodeRequest {
            start_position: Some(4096),
            ..TranscodeRequest::default()
        };
        assert_eq!(req.clip_start(), ClipStart::Position(4096));
        assert_eq!(TranscodeRequest::default().clip_start(), ClipStart::Beginning);
    }

    #[test]
    fn past_end_checks_whichever_bound_is_given() {
        let req = TranscodeRequest::timestamps(0, 100);
        assert!(!req.is_past_end(Some(1 << 40), Some(100)));
        assert!(req.is_past_end(None, Some(101)));
        assert!(!req.is_past_end(None, None));

        let req = TranscodeRequest {
            end_position: Some(500),
            ..TranscodeRequest::default()
        };
        assert!(req.is_past_end(Some(501), Some(0)));
        assert!(!req.is_past_end(Some(500), Some(1 << 40)));
    }

    #[test]
    fn apple_profile_uses_fragmented_mp4() {
        let opts = Profile::Apple.mux_options();
        assert_eq!(Profile::Apple.container(), "mp4");
        assert_eq!(
            opts.get("movflags"),
            Some("empty_moov+frag_keyframe+faststart")
        );
    }
}
