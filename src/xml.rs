//! S3 XML documents.
//!
//! Responses are rendered with `quick-xml`'s event writer; request bodies
//! are parsed either with the event reader or, for structured
//! configuration documents, with `quick-xml`'s serde support.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use std::io::Cursor;

use crate::data::{CorsConfiguration, ObjectLockConfiguration};

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

// ── Error response ──────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The resource you requested does not exist</Message>
///   <Resource>/photos/cat.jpg</Resource>
///   <RequestId>4B5D1C0E9A7F3D21</RequestId>
/// </Error>
/// ```
pub fn render_error(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    let mut writer = new_document();

    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", code),
            ("Message", message),
            ("Resource", resource),
            ("RequestId", request_id),
        ],
    );

    finish(writer)
}

// ── Bucket configuration ────────────────────────────────────────────

/// Render `<CORSConfiguration>` for GetBucketCors and for the CORS system
/// object.
pub fn render_cors_configuration(config: &CorsConfiguration) -> String {
    let mut writer = new_document();

    let root = BytesStart::new("CORSConfiguration").with_attributes([("xmlns", S3_XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    for rule in &config.cors_rules {
        writer
            .write_event(Event::Start(BytesStart::new("CORSRule")))
            .expect("start CORSRule");
        if let Some(id) = &rule.id {
            write_text_element(&mut writer, "ID", id);
        }
        for header in &rule.allowed_headers {
            write_text_element(&mut writer, "AllowedHeader", header);
        }
        for method in &rule.allowed_methods {
            write_text_element(&mut writer, "AllowedMethod", method);
        }
        for origin in &rule.allowed_origins {
            write_text_element(&mut writer, "AllowedOrigin", origin);
        }
        for header in &rule.expose_headers {
            write_text_element(&mut writer, "ExposeHeader", header);
        }
        if let Some(max_age) = rule.max_age_seconds {
            write_text_element(&mut writer, "MaxAgeSeconds", &max_age.to_string());
        }
        writer
            .write_event(Event::End(BytesEnd::new("CORSRule")))
            .expect("end CORSRule");
    }

    writer
        .write_event(Event::End(BytesEnd::new("CORSConfiguration")))
        .expect("end root");

    finish(writer)
}

/// Render `<VersioningConfiguration>` for GetBucketVersioning.
///
/// A bucket that never had versioning configured returns an empty document
/// without `<Status>`.
pub fn render_versioning_configuration(status: Option<&str>) -> String {
    let mut writer = new_document();

    let root = BytesStart::new("VersioningConfiguration").with_attributes([("xmlns", S3_XMLNS)]);
    match status {
        Some(status) => {
            writer.write_event(Event::Start(root)).expect("start root");
            write_text_element(&mut writer, "Status", status);
            writer
                .write_event(Event::End(BytesEnd::new("VersioningConfiguration")))
                .expect("end root");
        }
        None => {
            writer.write_event(Event::Empty(root)).expect("empty root");
        }
    }

    finish(writer)
}

/// Render `<ObjectLockConfiguration>` for GetObjectLockConfiguration.
pub fn render_object_lock_configuration(config: &ObjectLockConfiguration) -> String {
    let mut writer = new_document();

    let root = BytesStart::new("ObjectLockConfiguration").with_attributes([("xmlns", S3_XMLNS)]);
    writer.write_event(Event::Start(root)).expect("start root");

    if let Some(enabled) = &config.object_lock_enabled {
        write_text_element(&mut writer, "ObjectLockEnabled", enabled);
    }
    if let Some(retention) = config.rule.as_ref().and_then(|r| r.default_retention.as_ref()) {
        writer
            .write_event(Event::Start(BytesStart::new("Rule")))
            .expect("start Rule");
        writer
            .write_event(Event::Start(BytesStart::new("DefaultRetention")))
            .expect("start DefaultRetention");
        write_text_element(&mut writer, "Mode", &retention.mode);
        if let Some(days) = retention.days {
            write_text_element(&mut writer, "Days", &days.to_string());
        }
        if let Some(years) = retention.years {
            write_text_element(&mut writer, "Years", &years.to_string());
        }
        writer
            .write_event(Event::End(BytesEnd::new("DefaultRetention")))
            .expect("end DefaultRetention");
        writer
            .write_event(Event::End(BytesEnd::new("Rule")))
            .expect("end Rule");
    }

    writer
        .write_event(Event::End(BytesEnd::new("ObjectLockConfiguration")))
        .expect("end root");

    finish(writer)
}

// ── Request bodies ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VersioningConfiguration {
    #[serde(rename = "Status", default)]
    status: Option<String>,
}

/// Parse a `<VersioningConfiguration>` body into its `<Status>` value.
///
/// Returns `None` for malformed XML or a missing status.
pub fn parse_versioning_status(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    let config: VersioningConfiguration = quick_xml::de::from_str(text).ok()?;
    config.status.map(|s| s.trim().to_string())
}

/// Parse `<CreateBucketConfiguration>` XML body to extract `<LocationConstraint>`.
pub fn parse_location_constraint(body: &[u8]) -> Option<String> {
    use quick_xml::Reader;

    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut in_location = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"LocationConstraint" => {
                in_location = true;
            }
            Ok(Event::Text(ref e)) if in_location => {
                let text = e.unescape().ok()?.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                return Some(text);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"LocationConstraint" => {
                return None;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn new_document() -> XmlWriter {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");
    writer
}

fn finish(writer: XmlWriter) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

/// Write a `<tag>text</tag>` element.
fn write_text_element(writer: &mut XmlWriter, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start tag");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("text");
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .expect("end tag");
}

/// Write a parent element containing a flat list of child text elements.
fn write_simple_element_group(writer: &mut XmlWriter, parent: &str, children: &[(&str, &str)]) {
    writer
        .write_event(Event::Start(BytesStart::new(parent)))
        .expect("start parent");
    for (tag, value) in children {
        write_text_element(writer, tag, value);
    }
    writer
        .write_event(Event::End(BytesEnd::new(parent)))
        .expect("end parent");
}
