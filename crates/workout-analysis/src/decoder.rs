//! Decoding of recorded tracks from heterogeneous sources.
//!
//! Three payload shapes are supported: a GPX-style XML track, a flat or
//! nested JSON point list, and a vendor export embedding a feature list.
//! Detection runs an ordered list of predicates and returns a typed
//! variant, so a payload is decoded by exactly one path. Unrecognized or
//! unparsable input decodes to an empty point sequence: "no track" is a
//! valid state (manually entered workouts), not a failure.

use bytes::Bytes;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::LocalName;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc3339};
use tracing::{debug, warn};

use crate::models::Point;

/// The payload shape a byte buffer was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    GpxTrack,
    PointList,
    VendorFeatureSet,
}

/// Detect the payload shape without fully decoding it.
///
/// Predicates are tried in a fixed order; the first match wins. Returns
/// `None` when no shape matches.
pub fn detect_format(content: &[u8]) -> Option<TrackFormat> {
    let trimmed = trim_leading_whitespace(content);
    if trimmed.first() == Some(&b'<') {
        if contains(trimmed, b"<trkpt") || contains(trimmed, b"<gpx") {
            return Some(TrackFormat::GpxTrack);
        }
        return None;
    }

    let value: Value = serde_json::from_slice(trimmed).ok()?;
    if value
        .as_object()
        .and_then(|obj| obj.get("features"))
        .and_then(Value::as_array)
        .is_some()
    {
        return Some(TrackFormat::VendorFeatureSet);
    }
    if find_point_list(&value).is_some() {
        return Some(TrackFormat::PointList);
    }
    None
}

/// Decode raw bytes into an ordered point sequence.
///
/// Callers must treat empty output as "no track available".
pub fn decode(content: &Bytes) -> Vec<Point> {
    match detect_format(content) {
        Some(TrackFormat::GpxTrack) => decode_gpx(content),
        Some(TrackFormat::PointList) => decode_point_list(content),
        Some(TrackFormat::VendorFeatureSet) => decode_vendor(content),
        None => {
            debug!("payload matched no known track format");
            Vec::new()
        }
    }
}

fn trim_leading_whitespace(content: &[u8]) -> &[u8] {
    let start = content
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(content.len());
    &content[start..]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Parse an ISO-8601 timestamp into seconds since the Unix epoch.
///
/// Accepts `Z`-suffixed and offset-qualified strings; a string without an
/// offset is assumed UTC. Returns `None` rather than failing the decode.
pub(crate) fn parse_iso_timestamp(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(unix_seconds(dt));
    }
    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT) {
        return Some(unix_seconds(dt));
    }
    // No offset at all: assume UTC.
    time::PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT)
        .ok()
        .map(|dt| unix_seconds(dt.assume_utc()))
}

fn unix_seconds(dt: OffsetDateTime) -> f64 {
    dt.unix_timestamp_nanos() as f64 / 1e9
}

// --- GPX ---

/// Which child element's text is currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Elevation,
    Time,
    Cadence,
    HeartRate,
}

fn local_name_lower(name: LocalName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).to_ascii_lowercase()
}

fn decode_gpx(content: &[u8]) -> Vec<Point> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();

    let mut points = Vec::new();
    let mut current: Option<Point> = None;
    let mut in_extensions = false;
    let mut target: Option<TextTarget> = None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(event) => event.into_owned(),
            Err(e) => {
                // Mirror whole-document parsing: malformed XML means no track.
                warn!(
                    position = reader.buffer_position(),
                    "malformed track XML: {e}"
                );
                return Vec::new();
            }
        };

        match event {
            Event::Start(ref e) => {
                let name = local_name_lower(e.local_name());
                if name == "trkpt" {
                    current = point_from_trkpt_attrs(e);
                } else if current.is_some() {
                    match name.as_str() {
                        "ele" => target = Some(TextTarget::Elevation),
                        "time" => target = Some(TextTarget::Time),
                        "extensions" => in_extensions = true,
                        // Extension namespaces vary by vendor; match on the
                        // namespace-stripped local name only.
                        "cad" | "cadence" if in_extensions => target = Some(TextTarget::Cadence),
                        "hr" | "heartrate" if in_extensions => target = Some(TextTarget::HeartRate),
                        _ => {}
                    }
                    text.clear();
                }
            }
            Event::Empty(ref e) => {
                if local_name_lower(e.local_name()) == "trkpt" {
                    if let Some(pt) = point_from_trkpt_attrs(e) {
                        points.push(pt);
                    }
                }
            }
            Event::Text(ref e) => {
                if target.is_some() {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Event::End(ref e) => {
                let name = local_name_lower(e.local_name());
                if name == "trkpt" {
                    if let Some(pt) = current.take() {
                        points.push(pt);
                    }
                    in_extensions = false;
                    target = None;
                } else if name == "extensions" {
                    in_extensions = false;
                } else if let (Some(t), Some(pt)) = (target.take(), current.as_mut()) {
                    apply_text(pt, t, &text);
                    text.clear();
                }
            }
            _ => {}
        }

        buf.clear();
    }

    points
}

fn point_from_trkpt_attrs(e: &BytesStart<'_>) -> Option<Point> {
    let mut lat = None;
    let mut lon = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok();
        match attr.key.local_name().as_ref() {
            b"lat" => lat = value.and_then(|v| v.parse::<f64>().ok()),
            b"lon" => lon = value.and_then(|v| v.parse::<f64>().ok()),
            _ => {}
        }
    }
    // A position without valid coordinates is skipped, not fatal.
    Some(Point::new(lat?, lon?))
}

fn apply_text(pt: &mut Point, target: TextTarget, text: &str) {
    match target {
        TextTarget::Elevation => pt.elevation = text.trim().parse().ok(),
        TextTarget::Time => pt.timestamp = parse_iso_timestamp(text),
        TextTarget::Cadence => pt.cadence = text.trim().parse().ok(),
        TextTarget::HeartRate => pt.heart_rate = text.trim().parse().ok(),
    }
}

// --- JSON point lists ---

/// Recurse through wrapper objects/arrays until an array whose first
/// element looks like a point is found.
fn find_point_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => {
            if items.first().is_some_and(looks_like_point) {
                return Some(items);
            }
            items.iter().find_map(find_point_list)
        }
        Value::Object(map) => map.values().find_map(find_point_list),
        _ => None,
    }
}

fn looks_like_point(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        (obj.contains_key("latitude") && obj.contains_key("longitude"))
            || obj.contains_key("timestamp")
    })
}

fn decode_point_list(content: &[u8]) -> Vec<Point> {
    let Ok(value) = serde_json::from_slice::<Value>(content) else {
        return Vec::new();
    };
    find_point_list(&value).map_or_else(Vec::new, |items| points_from_items(items))
}

fn decode_vendor(content: &[u8]) -> Vec<Point> {
    let Ok(value) = serde_json::from_slice::<Value>(content) else {
        return Vec::new();
    };
    // The point list lives somewhere inside the feature attributes; probe
    // only below `features` so unrelated top-level arrays cannot shadow it.
    value
        .as_object()
        .and_then(|obj| obj.get("features"))
        .and_then(find_point_list)
        .map_or_else(Vec::new, |items| points_from_items(items))
}

fn points_from_items(items: &[Value]) -> Vec<Point> {
    items.iter().filter_map(point_from_json).collect()
}

fn point_from_json(value: &Value) -> Option<Point> {
    let obj = value.as_object()?;
    // Geometry is required; a timestamp-only entry cannot contribute.
    let lat = obj.get("latitude").and_then(Value::as_f64)?;
    let lon = obj.get("longitude").and_then(Value::as_f64)?;
    let mut point = Point::new(lat, lon);
    point.timestamp = obj.get("timestamp").and_then(json_timestamp_seconds);
    Some(point)
}

fn json_timestamp_seconds(value: &Value) -> Option<f64> {
    match value {
        // Point lists carry epoch milliseconds.
        Value::Number(n) => n.as_f64().map(|ms| ms / 1000.0),
        Value::String(s) => parse_iso_timestamp(s),
        _ => None,
    }
}
