//! XMLTV encoder
//!
//! Output is tab indented. Programme attributes are written as start, stop,
//! start_timestamp, stop_timestamp, channel. Children follow the fixed order
//! of [`XmltvWriter::write_programme`], so identical input yields identical bytes.

use quick_xml::escape::escape;
use std::fmt::Write;

use crate::models::{ChannelDecl, Programme};

/// Root element identification and channel flags
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub generator_info_name: String,
    pub source_info_name: String,
    /// Emit `<live>true</live><active>true</active>` on every channel
    pub mark_channels_live: bool,
}

/// Incremental writer for a single XMLTV document
pub struct XmltvWriter {
    out: String,
    mark_channels_live: bool,
}

impl XmltvWriter {
    pub fn new(options: &EncodeOptions) -> Self {
        let mut out = String::with_capacity(64 * 1024);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
        let _ = writeln!(
            out,
            "<tv generator-info-name=\"{}\" source-info-name=\"{}\">",
            escape(&options.generator_info_name),
            escape(&options.source_info_name)
        );
        Self {
            out,
            mark_channels_live: options.mark_channels_live,
        }
    }

    pub fn write_channel(&mut self, channel: &ChannelDecl) {
        let _ = writeln!(self.out, "\t<channel id=\"{}\">", escape(&channel.id));
        if let Some(name) = &channel.display_name {
            self.text_element(2, "display-name", name.trim(), &[]);
        }
        if let Some(icon) = &channel.icon_url {
            self.empty_element(2, "icon", &[("src", icon.as_str())]);
        }
        if self.mark_channels_live {
            self.text_element(2, "live", "true", &[]);
            self.text_element(2, "active", "true", &[]);
        }
        self.out.push_str("\t</channel>\n");
    }

    /// Write one programme under `channel_ref`, which replaces the record's own
    /// upstream channel id. `extra_categories` are appended after the
    /// programme's own categories.
    pub fn write_programme(
        &mut self,
        channel_ref: &str,
        programme: &Programme,
        extra_categories: &[String],
    ) {
        let p = programme;

        self.out.push_str("\t<programme");
        if let Some(start) = &p.start {
            self.attribute("start", start);
        }
        if let Some(stop) = &p.stop {
            self.attribute("stop", stop);
        }
        if let Some(ts) = p.start_timestamp {
            self.attribute("start_timestamp", &ts.to_string());
        }
        if let Some(ts) = p.stop_timestamp {
            self.attribute("stop_timestamp", &ts.to_string());
        }
        self.attribute("channel", channel_ref);
        self.out.push_str(">\n");

        for (tag, value) in [
            ("title", &p.title),
            ("sub-title", &p.sub_title),
            ("desc", &p.desc),
            ("series-desc", &p.series_desc),
            ("country", &p.country),
            ("url", &p.url),
            ("date", &p.date),
        ] {
            if let Some(value) = value {
                self.text_element(2, tag, value, &[]);
            }
        }

        if let Some(length) = &p.length {
            let (value, units) = length.split_once(' ').unwrap_or((length.as_str(), "minutes"));
            self.text_element(2, "length", value, &[("units", units)]);
        }

        if !p.credits.is_empty() {
            self.out.push_str("\t\t<credits>\n");
            for (role, names) in p.credits.roles() {
                for name in names {
                    self.text_element(3, role, name, &[]);
                }
            }
            self.out.push_str("\t\t</credits>\n");
        }

        if let Some(value) = &p.episode_num_value {
            match &p.episode_num_system {
                Some(system) => self.text_element(2, "episode-num", value, &[("system", system.as_str())]),
                None => self.text_element(2, "episode-num", value, &[]),
            }
        }

        if let Some(value) = &p.rating_value {
            match &p.rating_system {
                Some(system) => self.open_element(2, "rating", &[("system", system.as_str())]),
                None => self.open_element(2, "rating", &[]),
            }
            self.text_element(3, "value", value, &[]);
            self.out.push_str("\t\t</rating>\n");
        }

        if let Some(value) = &p.star_rating {
            self.open_element(2, "star-rating", &[]);
            self.text_element(3, "value", value, &[]);
            self.out.push_str("\t\t</star-rating>\n");
        }

        let mut video: Vec<(&str, &str)> = Vec::new();
        if let Some(present) = p.video_present {
            video.push(("present", yes_no(present)));
        }
        if let Some(colour) = p.video_colour {
            video.push(("colour", yes_no(colour)));
        }
        if let Some(aspect) = &p.video_aspect {
            video.push(("aspect", aspect.as_str()));
        }
        if let Some(quality) = &p.video_quality {
            video.push(("quality", quality.as_str()));
        }
        self.group(2, "video", &video);

        let mut audio: Vec<(&str, &str)> = Vec::new();
        if let Some(present) = p.audio_present {
            audio.push(("present", yes_no(present)));
        }
        if let Some(stereo) = &p.audio_stereo {
            audio.push(("stereo", stereo.as_str()));
        }
        self.group(2, "audio", &audio);

        if let Some(kind) = &p.subtitles_type {
            self.empty_element(2, "subtitles", &[("type", kind.as_str())]);
        }
        if p.audio_described {
            self.empty_element(2, "audio-described", &[]);
        }
        if p.is_premiere {
            self.empty_element(2, "premiere", &[]);
        }
        if p.is_new {
            self.empty_element(2, "new", &[]);
        }
        if let Some(start) = &p.previously_shown {
            self.empty_element(2, "previously-shown", &[("start", start.as_str())]);
        }

        if let Some(value) = &p.review_value {
            match &p.review_type {
                Some(kind) => self.text_element(2, "review", value, &[("type", kind.as_str())]),
                None => self.text_element(2, "review", value, &[]),
            }
        }

        if let Some(icon) = &p.icon_url {
            self.empty_element(2, "icon", &[("src", icon.as_str()), ("height", ""), ("width", "")]);
        }

        for keyword in &p.keywords {
            self.text_element(2, "keyword", keyword, &[("lang", "en")]);
        }
        for category in p.categories.iter().chain(extra_categories) {
            self.text_element(2, "category", category, &[("lang", "en")]);
        }

        self.out.push_str("\t</programme>\n");
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("</tv>\n");
        self.out
    }

    fn attribute(&mut self, name: &str, value: &str) {
        let _ = write!(self.out, " {}=\"{}\"", name, escape(value));
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push('\t');
        }
    }

    fn open_element(&mut self, depth: usize, tag: &str, attrs: &[(&str, &str)]) {
        self.indent(depth);
        let _ = write!(self.out, "<{tag}");
        for (name, value) in attrs {
            self.attribute(name, value);
        }
        self.out.push_str(">\n");
    }

    fn text_element(&mut self, depth: usize, tag: &str, text: &str, attrs: &[(&str, &str)]) {
        self.indent(depth);
        let _ = write!(self.out, "<{tag}");
        for (name, value) in attrs {
            self.attribute(name, value);
        }
        let _ = writeln!(self.out, ">{}</{tag}>", escape(text));
    }

    fn empty_element(&mut self, depth: usize, tag: &str, attrs: &[(&str, &str)]) {
        self.indent(depth);
        let _ = write!(self.out, "<{tag}");
        for (name, value) in attrs {
            self.attribute(name, value);
        }
        self.out.push_str("/>\n");
    }

    fn group(&mut self, depth: usize, tag: &str, children: &[(&str, &str)]) {
        if children.is_empty() {
            return;
        }
        self.open_element(depth, tag, &[]);
        for (child, value) in children {
            self.text_element(depth + 1, child, value, &[]);
        }
        self.indent(depth);
        let _ = writeln!(self.out, "</{tag}>");
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Encode a complete document. Each programme references its own `channel_id`.
pub fn encode(options: &EncodeOptions, channels: &[ChannelDecl], programmes: &[Programme]) -> String {
    let mut writer = XmltvWriter::new(options);
    for channel in channels {
        writer.write_channel(channel);
    }
    for programme in programmes {
        writer.write_programme(&programme.channel_id, programme, &[]);
    }
    writer.finish()
}
