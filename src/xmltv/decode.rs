//! Streaming XMLTV decoder built on quick-xml
//!
//! Only the root `<tv>` and its `<channel>`/`<programme>` children are
//! interpreted. Unknown elements are skipped. Absent elements stay `None`;
//! empty ones are treated as absent too.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::ops::ControlFlow;

use super::XmltvDocument;
use crate::errors::{ParseError, ParseResult};
use crate::models::{ChannelDecl, Programme};

/// One top-level declaration, handed out as soon as its closing tag is read
#[derive(Debug, Clone, PartialEq)]
pub enum XmltvItem {
    Channel(ChannelDecl),
    Programme(Programme),
}

/// Decode a whole document from any buffered reader
pub fn decode<R: BufRead>(source: R) -> ParseResult<XmltvDocument> {
    let mut document = XmltvDocument::default();
    decode_streaming(source, |item| {
        match item {
            XmltvItem::Channel(channel) => document.channels.push(channel),
            XmltvItem::Programme(programme) => document.programmes.push(programme),
        }
        ControlFlow::Continue(())
    })?;
    Ok(document)
}

/// Decode incrementally, passing each channel and programme to `sink` in
/// document order. Returning `ControlFlow::Break` from the sink stops reading
/// early without an error.
pub fn decode_streaming<R, F>(source: R, mut sink: F) -> ParseResult<()>
where
    R: BufRead,
    F: FnMut(XmltvItem) -> ControlFlow<()>,
{
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut decoder = Decoder::default();
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(position, e))?;

        match event {
            Event::Start(ref e) => {
                let (name, attrs) = element_parts(e, position)?;
                decoder.open(name, attrs)?;
            }
            Event::Empty(ref e) => {
                let (name, attrs) = element_parts(e, position)?;
                decoder.open(name, attrs)?;
                decoder.close();
            }
            Event::End(_) => decoder.close(),
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| malformed(position, e))?;
                decoder.text.push_str(&text);
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(&e).map_err(|e| malformed(position, e))?;
                decoder.text.push_str(text);
            }
            Event::Eof => break,
            _ => {} // declarations, doctype, comments, processing instructions
        }
        buf.clear();

        if let Some(item) = decoder.ready.take() {
            if sink(item).is_break() {
                return Ok(());
            }
        }
    }

    decoder.finish(reader.buffer_position() as u64)
}

pub fn decode_bytes(bytes: &[u8]) -> ParseResult<XmltvDocument> {
    decode(bytes)
}

fn malformed(position: u64, err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        position,
        message: err.to_string(),
    }
}

fn element_parts(
    element: &BytesStart,
    position: u64,
) -> ParseResult<(String, HashMap<String, String>)> {
    let name = std::str::from_utf8(element.name().as_ref())
        .map_err(|e| malformed(position, format!("Invalid UTF-8 in element name: {e}")))?
        .to_string();

    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(position, format!("bad attribute on <{name}>: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| malformed(position, e))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, e))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok((name, attrs))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn yes_no(text: &str) -> Option<bool> {
    if text.is_empty() {
        None
    } else {
        Some(text.eq_ignore_ascii_case("yes"))
    }
}

fn set_once(slot: &mut Option<String>, text: &str) {
    if slot.is_none() && !text.is_empty() {
        *slot = Some(text.to_string());
    }
}

/// How many times a single-valued element has been opened in the current programme
#[derive(Default)]
struct Occurrences {
    episode_num: usize,
    rating: usize,
    star_rating: usize,
    review: usize,
}

struct ProgrammeState {
    programme: Programme,
    length_units: String,
    seen: Occurrences,
}

#[derive(Default)]
struct Decoder {
    stack: Vec<String>,
    text: String,
    saw_root: bool,
    channel: Option<ChannelDecl>,
    programme: Option<ProgrammeState>,
    ready: Option<XmltvItem>,
}

impl Decoder {
    fn open(&mut self, name: String, attrs: HashMap<String, String>) -> ParseResult<()> {
        match (self.stack.len(), name.as_str()) {
            (0, "tv") => self.saw_root = true,
            (0, other) => {
                return Err(ParseError::MissingElement {
                    element: "tv".to_string(),
                    context: format!("document root (found <{other}>)"),
                })
            }
            (1, "channel") => {
                let id = non_empty(attrs.get("id"))
                    .ok_or_else(|| ParseError::missing_attribute("id", "channel"))?;
                self.channel = Some(ChannelDecl {
                    id,
                    display_name: None,
                    icon_url: None,
                });
            }
            (1, "programme") => {
                let channel = non_empty(attrs.get("channel"))
                    .ok_or_else(|| ParseError::missing_attribute("channel", "programme"))?;
                let start = non_empty(attrs.get("start"))
                    .ok_or_else(|| ParseError::missing_attribute("start", "programme"))?;

                let mut programme = Programme::new(channel);
                programme.start = Some(start);
                programme.stop = non_empty(attrs.get("stop"));
                programme.start_timestamp = attrs
                    .get("start_timestamp")
                    .and_then(|v| v.trim().parse().ok());
                programme.stop_timestamp = attrs
                    .get("stop_timestamp")
                    .and_then(|v| v.trim().parse().ok());
                programme.derive_timestamps();

                self.programme = Some(ProgrammeState {
                    programme,
                    length_units: "minutes".to_string(),
                    seen: Occurrences::default(),
                });
            }
            (2, "icon") if self.channel.is_some() => {
                if let Some(channel) = self.channel.as_mut() {
                    if channel.icon_url.is_none() {
                        channel.icon_url = non_empty(attrs.get("src"));
                    }
                }
            }
            (2, _) => self.open_programme_child(&name, &attrs),
            _ => {}
        }

        self.stack.push(name);
        self.text.clear();
        Ok(())
    }

    fn open_programme_child(&mut self, name: &str, attrs: &HashMap<String, String>) {
        let Some(state) = self.programme.as_mut() else {
            return;
        };
        let programme = &mut state.programme;

        match name {
            "icon" => {
                if programme.icon_url.is_none() {
                    programme.icon_url = non_empty(attrs.get("src"));
                }
            }
            "episode-num" => {
                state.seen.episode_num += 1;
                if state.seen.episode_num == 1 {
                    programme.episode_num_system = non_empty(attrs.get("system"));
                }
            }
            "rating" => {
                state.seen.rating += 1;
                if state.seen.rating == 1 {
                    programme.rating_system = non_empty(attrs.get("system"));
                }
            }
            "star-rating" => state.seen.star_rating += 1,
            "review" => {
                state.seen.review += 1;
                if state.seen.review == 1 {
                    programme.review_type = non_empty(attrs.get("type"));
                }
            }
            "subtitles" => {
                if programme.subtitles_type.is_none() {
                    programme.subtitles_type = non_empty(attrs.get("type"));
                }
            }
            "previously-shown" => {
                if programme.previously_shown.is_none() {
                    programme.previously_shown = non_empty(attrs.get("start"));
                }
            }
            "length" => {
                state.length_units =
                    non_empty(attrs.get("units")).unwrap_or_else(|| "minutes".to_string());
            }
            "audio-described" => programme.audio_described = true,
            "premiere" => programme.is_premiere = true,
            "new" => programme.is_new = true,
            _ => {}
        }
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        let depth = self.stack.len();

        match (depth, name.as_str()) {
            (1, "channel") => {
                self.ready = self.channel.take().map(XmltvItem::Channel);
            }
            (1, "programme") => {
                self.ready = self
                    .programme
                    .take()
                    .map(|state| XmltvItem::Programme(state.programme));
            }
            (2, "display-name") => {
                if let Some(channel) = self.channel.as_mut() {
                    set_once(&mut channel.display_name, text);
                }
            }
            (2, _) => self.close_programme_child(&name, text),
            (3, _) => {
                let parent = self.stack.last().cloned().unwrap_or_default();
                self.close_programme_grandchild(&parent, &name, text);
            }
            _ => {}
        }
    }

    fn close_programme_child(&mut self, name: &str, text: &str) {
        let Some(state) = self.programme.as_mut() else {
            return;
        };
        let programme = &mut state.programme;

        match name {
            "title" => set_once(&mut programme.title, text),
            "sub-title" => set_once(&mut programme.sub_title, text),
            "desc" => set_once(&mut programme.desc, text),
            "series-desc" => set_once(&mut programme.series_desc, text),
            "country" => set_once(&mut programme.country, text),
            "url" => set_once(&mut programme.url, text),
            "date" => set_once(&mut programme.date, text),
            "category" if !text.is_empty() => programme.categories.push(text.to_string()),
            "keyword" if !text.is_empty() => programme.keywords.push(text.to_string()),
            "episode-num" if state.seen.episode_num == 1 => {
                set_once(&mut programme.episode_num_value, text)
            }
            "review" if state.seen.review == 1 => set_once(&mut programme.review_value, text),
            "length" if programme.length.is_none() && !text.is_empty() => {
                programme.length = Some(format!("{} {}", text, state.length_units));
            }
            _ => {}
        }
    }

    fn close_programme_grandchild(&mut self, parent: &str, name: &str, text: &str) {
        let Some(state) = self.programme.as_mut() else {
            return;
        };
        let programme = &mut state.programme;

        match (parent, name) {
            ("credits", role) if !text.is_empty() => {
                programme.credits.push(role, text.to_string())
            }
            ("rating", "value") if state.seen.rating == 1 => {
                set_once(&mut programme.rating_value, text)
            }
            ("star-rating", "value") if state.seen.star_rating == 1 => {
                set_once(&mut programme.star_rating, text)
            }
            ("video", "present") => programme.video_present = yes_no(text),
            ("video", "colour") => programme.video_colour = yes_no(text),
            ("video", "aspect") => set_once(&mut programme.video_aspect, text),
            ("video", "quality") => set_once(&mut programme.video_quality, text),
            ("audio", "present") => programme.audio_present = yes_no(text),
            ("audio", "stereo") => set_once(&mut programme.audio_stereo, text),
            _ => {}
        }
    }

    fn finish(self, position: u64) -> ParseResult<()> {
        if !self.saw_root {
            return Err(ParseError::MissingElement {
                element: "tv".to_string(),
                context: "document".to_string(),
            });
        }
        if let Some(open) = self.stack.last() {
            return Err(malformed(
                position,
                format!("unexpected end of document inside <{open}>"),
            ));
        }
        Ok(())
    }
}
