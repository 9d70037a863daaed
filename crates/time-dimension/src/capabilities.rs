//! GetCapabilities scanning for a single layer's TIME dimension.
//!
//! Handles both document shapes seen in the wild:
//!
//! - WMS 1.3.0: `<Dimension name="time" default="...">values</Dimension>`
//! - WMS 1.1.1: `<Dimension name="time"/>` plus `<Extent name="time" default="...">values</Extent>`
//!
//! A nested layer without its own TIME dimension inherits the nearest
//! ancestor's, as WMS prescribes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::dimension::TimeDimension;
use crate::error::{DimensionError, DimensionResult};

#[derive(Debug, Default)]
struct LayerFrame {
    name: Option<String>,
    time_text: Option<String>,
    time_default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Name,
    Time,
}

/// Parse the TIME dimension of `layer_name` from a capabilities document.
pub fn parse_capabilities(xml: &str, layer_name: &str) -> DimensionResult<TimeDimension> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut layers: Vec<LayerFrame> = Vec::new();
    let mut elements: Vec<Vec<u8>> = Vec::new();
    let mut capture = Capture::None;
    let mut content = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            DimensionError::Xml(format!("at position {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"Layer" => layers.push(LayerFrame::default()),
                    b"Name" if elements.last().map(Vec::as_slice) == Some(&b"Layer"[..]) => {
                        capture = Capture::Name;
                        content.clear();
                    }
                    b"Dimension" | b"Extent" if !layers.is_empty() && is_time_element(&e)? => {
                        if let Some(frame) = layers.last_mut() {
                            if let Some(default) = attribute(&e, b"default")? {
                                frame.time_default = Some(default);
                            }
                        }
                        capture = Capture::Time;
                        content.clear();
                    }
                    _ => {}
                }
                elements.push(local);
            }
            Event::Empty(e) => {
                let local = e.local_name();
                if matches!(local.as_ref(), b"Dimension" | b"Extent") && is_time_element(&e)? {
                    if let (Some(frame), Some(default)) = (layers.last_mut(), attribute(&e, b"default")?) {
                        frame.time_default = Some(default);
                    }
                }
            }
            Event::Text(t) if capture != Capture::None => {
                content.push_str(&t.unescape()?);
            }
            Event::CData(c) if capture != Capture::None => {
                content.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(e) => {
                elements.pop();
                match e.local_name().as_ref() {
                    b"Name" if capture == Capture::Name => {
                        if let Some(frame) = layers.last_mut() {
                            frame.name = Some(content.trim().to_string());
                        }
                        capture = Capture::None;
                    }
                    b"Dimension" | b"Extent" if capture == Capture::Time => {
                        let text = content.trim();
                        if let (Some(frame), false) = (layers.last_mut(), text.is_empty()) {
                            frame.time_text = Some(text.to_string());
                        }
                        capture = Capture::None;
                    }
                    b"Layer" => {
                        let Some(frame) = layers.pop() else { continue };
                        if frame.name.as_deref() != Some(layer_name) {
                            continue;
                        }
                        return match inherited_time(&frame, &layers) {
                            Some((text, default)) => {
                                Ok(TimeDimension::from_dimension_text(text, default))
                            }
                            None => Err(DimensionError::MissingTimeDimension {
                                layer: layer_name.to_string(),
                            }),
                        };
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(DimensionError::MissingTimeDimension {
        layer: layer_name.to_string(),
    })
}

/// The layer's own TIME values, else the nearest ancestor's.
fn inherited_time<'a>(
    frame: &'a LayerFrame,
    ancestors: &'a [LayerFrame],
) -> Option<(&'a str, Option<&'a str>)> {
    std::iter::once(frame)
        .chain(ancestors.iter().rev())
        .find_map(|f| {
            f.time_text
                .as_deref()
                .map(|text| (text, f.time_default.as_deref()))
        })
}

fn is_time_element(e: &BytesStart<'_>) -> DimensionResult<bool> {
    Ok(attribute(e, b"name")?.is_some_and(|name| name.eq_ignore_ascii_case("time")))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> DimensionResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DimensionError::Xml(err.to_string()))?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_dimension_list() {
        let xml = r#"
<Layer>
    <Name>goes18_CMI_C13</Name>
    <Title>GOES18 - Clean IR</Title>
    <Dimension name="TIME" units="ISO8601" default="2025-12-02T19:21:00Z">2025-12-02T19:21:00Z,2025-12-02T19:16:00Z,2025-12-02T19:11:00Z</Dimension>
</Layer>
        "#;

        let dim = parse_capabilities(xml, "goes18_CMI_C13").unwrap();
        assert_eq!(dim.values.len(), 3);
        assert_eq!(dim.values[0], "2025-12-02T19:21:00Z");
        assert_eq!(dim.default.as_deref(), Some("2025-12-02T19:21:00Z"));
    }

    #[test]
    fn test_missing_dimension() {
        let xml = "<Layer><Name>basemap</Name><Title>Basemap</Title></Layer>";
        let err = parse_capabilities(xml, "basemap").unwrap_err();
        assert!(matches!(err, DimensionError::MissingTimeDimension { ref layer } if layer == "basemap"));
    }

    #[test]
    fn test_unknown_layer_is_missing() {
        let xml = r#"<Layer><Name>a</Name><Dimension name="time">2025-01-01T00:00:00Z</Dimension></Layer>"#;
        assert!(matches!(
            parse_capabilities(xml, "b"),
            Err(DimensionError::MissingTimeDimension { .. })
        ));
    }

    #[test]
    fn test_style_name_does_not_shadow_layer_name() {
        let xml = r#"
<Layer>
  <Name>radar</Name>
  <Style><Name>default</Name></Style>
  <Dimension name="time">2025-01-01T00:00:00Z/2025-01-01T00:20:00Z/PT10M</Dimension>
</Layer>"#;
        let dim = parse_capabilities(xml, "radar").unwrap();
        assert_eq!(dim.len(), 3);
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<Layer><Name>radar</Name></Dimension>";
        assert!(matches!(parse_capabilities(xml, "radar"), Err(DimensionError::Xml(_))));
    }
}
