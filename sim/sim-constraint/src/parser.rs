//! Model-file parser for rigid connectors.
//!
//! Reads `<rigid_connector>` blocks from a model document:
//!
//! ```xml
//! <rigid_connector type="rigid lock">
//!     <body_a>0</body_a>
//!     <body_b>1</body_b>
//!     <tolerance>0.01</tolerance>
//!     <force_penalty>1e6</force_penalty>
//!     <joint_origin>0.5, 0, 0</joint_origin>
//! </rigid_connector>
//! ```
//!
//! Only `rigid lock` connectors are returned. Elements the parser does not
//! know are skipped.

use nalgebra::Vector3;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sim_types::{BodyId, SimError};
use std::io::BufRead;

use crate::{AugmentationSettings, LockConnector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of the `type` attribute that selects a lock.
pub const LOCK_TYPE: &str = "rigid lock";

/// Parameters of one lock as read from a model file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LockConnectorConfig {
    /// Optional `name` attribute.
    pub name: Option<String>,
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Augmentation controls.
    pub settings: AugmentationSettings,
    /// Force penalty.
    pub force_penalty: f64,
    /// Moment penalty.
    pub moment_penalty: f64,
    /// Joint origin.
    pub joint_origin: Vector3<f64>,
    /// First basis axis.
    pub first_axis: Vector3<f64>,
    /// Second basis axis.
    pub second_axis: Vector3<f64>,
}

impl LockConnectorConfig {
    /// Default parameters for a lock between two bodies.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            name: None,
            body_a,
            body_b,
            settings: AugmentationSettings::default(),
            force_penalty: 1.0,
            moment_penalty: 1.0,
            joint_origin: Vector3::zeros(),
            first_axis: Vector3::x(),
            second_axis: Vector3::y(),
        }
    }

    /// Build the connector. The basis is validated by
    /// [`RigidConnector::init`](crate::RigidConnector::init).
    #[must_use]
    pub fn build(&self) -> LockConnector {
        LockConnector::new(self.body_a, self.body_b)
            .with_joint_origin(self.joint_origin)
            .with_axes(self.first_axis, self.second_axis)
            .with_penalties(self.force_penalty, self.moment_penalty)
            .with_settings(self.settings)
    }
}

/// Parse every lock connector in a model document.
///
/// # Errors
///
/// Returns [`SimError::ConfigParse`] for malformed XML, a missing body
/// reference, or a value that fails to parse.
pub fn parse_rigid_connectors_str(xml: &str) -> sim_types::Result<Vec<LockConnectorConfig>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    parse_rigid_connectors_reader(&mut reader)
}

fn parse_rigid_connectors_reader<R: BufRead>(
    reader: &mut Reader<R>,
) -> sim_types::Result<Vec<LockConnectorConfig>> {
    let mut buf = Vec::new();
    let mut connectors = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"rigid_connector" => {
                if get_attribute_opt(e, "type").as_deref() == Some(LOCK_TYPE) {
                    connectors.push(parse_lock(reader, e)?);
                } else {
                    skip_element(reader, b"rigid_connector")?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SimError::ConfigParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(connectors)
}

/// Parse the children of one `<rigid_connector type="rigid lock">`.
fn parse_lock<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
) -> sim_types::Result<LockConnectorConfig> {
    let mut config = LockConnectorConfig::new(BodyId::new(0), BodyId::new(0));
    config.name = get_attribute_opt(start, "name");
    let mut body_a = None;
    let mut body_b = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                let text = read_text(reader, &elem_name)?;
                let tag = String::from_utf8_lossy(&elem_name);
                match elem_name.as_slice() {
                    b"body_a" => body_a = Some(BodyId::new(parse_value(&tag, &text)?)),
                    b"body_b" => body_b = Some(BodyId::new(parse_value(&tag, &text)?)),
                    b"tolerance" => config.settings.force_tol = parse_tolerance(&tag, &text)?,
                    b"gaptol" => config.settings.gap_tol = parse_tolerance(&tag, &text)?,
                    b"angtol" => config.settings.angle_tol = parse_tolerance(&tag, &text)?,
                    b"force_penalty" => config.force_penalty = parse_value(&tag, &text)?,
                    b"moment_penalty" => config.moment_penalty = parse_value(&tag, &text)?,
                    b"joint_origin" => config.joint_origin = parse_vector3(&tag, &text)?,
                    b"first_axis" => config.first_axis = parse_vector3(&tag, &text)?,
                    b"second_axis" => config.second_axis = parse_vector3(&tag, &text)?,
                    b"minaug" => config.settings.min_augmentations = parse_value(&tag, &text)?,
                    b"maxaug" => config.settings.max_augmentations = parse_value(&tag, &text)?,
                    b"auto_penalty" => config.settings.auto_penalty = parse_bool(&tag, &text)?,
                    // Unknown parameters are ignored
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"rigid_connector" => break,
            Ok(Event::Eof) => {
                return Err(SimError::ConfigParse(
                    "unexpected EOF in rigid_connector".into(),
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(SimError::ConfigParse(e.to_string())),
        }
        buf.clear();
    }

    config.body_a = body_a.ok_or_else(|| missing_element("body_a"))?;
    config.body_b = body_b.ok_or_else(|| missing_element("body_b"))?;
    Ok(config)
}

fn missing_element(name: &str) -> SimError {
    SimError::ConfigParse(format!("rigid_connector is missing <{name}>"))
}

/// Collect the text content of an element up to its end tag. Nested
/// elements are skipped.
fn read_text<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> sim_types::Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(ref t)) => {
                let s = t
                    .unescape()
                    .map_err(|e| SimError::ConfigParse(e.to_string()))?;
                text.push_str(&s);
            }
            Ok(Event::Start(ref e)) => {
                let inner = e.name().as_ref().to_vec();
                skip_element(reader, &inner)?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == name => break,
            Ok(Event::Eof) => {
                return Err(SimError::ConfigParse(format!(
                    "unexpected EOF in {}",
                    String::from_utf8_lossy(name)
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(SimError::ConfigParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(text)
}

/// Parse a scalar value.
fn parse_value<T: std::str::FromStr>(tag: &str, text: &str) -> sim_types::Result<T> {
    text.trim()
        .parse()
        .map_err(|_| SimError::ConfigParse(format!("invalid value for <{tag}>: {text:?}")))
}

/// Parse a tolerance; zero disables the check, negative values are rejected.
fn parse_tolerance(tag: &str, text: &str) -> sim_types::Result<f64> {
    let tol: f64 = parse_value(tag, text)?;
    if tol < 0.0 {
        return Err(SimError::ConfigParse(format!(
            "tolerance <{tag}> must not be negative: {text:?}"
        )));
    }
    Ok(tol)
}

/// Parse `0`/`1`/`true`/`false`.
fn parse_bool(tag: &str, text: &str) -> sim_types::Result<bool> {
    match text.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(SimError::ConfigParse(format!(
            "invalid boolean for <{tag}>: {text:?}"
        ))),
    }
}

/// Parse a comma- or whitespace-separated vector3.
fn parse_vector3(tag: &str, text: &str) -> sim_types::Result<Vector3<f64>> {
    let parts: Vec<f64> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(str::parse::<f64>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| SimError::ConfigParse(format!("invalid vector for <{tag}>: {text:?}")))?;

    if parts.len() != 3 {
        return Err(SimError::ConfigParse(format!(
            "expected 3 values for <{tag}>, got {}",
            parts.len()
        )));
    }

    Ok(Vector3::new(parts[0], parts[1], parts[2]))
}

/// Get an optional attribute value.
fn get_attribute_opt(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return String::from_utf8(attr.value.to_vec()).ok();
        }
    }
    None
}

/// Skip an element and all its children.
fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> sim_types::Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name => {
                depth += 1;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SimError::ConfigParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}
