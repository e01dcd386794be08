//! Persisted template format.
//!
//! One XML document stores every template pyramid of one class:
//!
//! ```xml
//! <TemplatePyramidClass classLabel="gear" numOfTemplatePyrs="1">
//!   <TemplatePyramid>
//!     <Template width="64" height="48" pyramidLevel="0" numOfFeatures="2">
//!       <Feature X="3" Y="5" AngleLabel="2"/>
//!       <Feature X="10" Y="2" AngleLabel="0"/>
//!     </Template>
//!   </TemplatePyramid>
//! </TemplatePyramidClass>
//! ```
//!
//! `AngleLabel` carries the quantized bucket index, not the one-hot byte.
//! Templates may carry an opaque `AditionalData` child (spelling is part of
//! the format) which round-trips verbatim. Loading is strict: malformed
//! documents, missing attributes and count mismatches fail the whole load.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::template::{Feature, Template, TemplatePyramid};
use crate::util::{OriMatchError, OriMatchResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

fn xml_err(err: impl Display) -> OriMatchError {
    OriMatchError::Xml {
        reason: err.to_string(),
    }
}

/// Serializes one class's template pyramids to an XML document.
pub fn write_class(label: &str, pyramids: &[TemplatePyramid]) -> OriMatchResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("TemplatePyramidClass");
    root.push_attribute(("classLabel", label));
    root.push_attribute(("numOfTemplatePyrs", pyramids.len().to_string().as_str()));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;

    for pyramid in pyramids {
        writer
            .write_event(Event::Start(BytesStart::new("TemplatePyramid")))
            .map_err(xml_err)?;

        for template in pyramid.levels() {
            let mut el = BytesStart::new("Template");
            el.push_attribute(("width", template.width.to_string().as_str()));
            el.push_attribute(("height", template.height.to_string().as_str()));
            el.push_attribute(("pyramidLevel", template.pyramid_level.to_string().as_str()));
            el.push_attribute(("numOfFeatures", template.features.len().to_string().as_str()));
            writer.write_event(Event::Start(el)).map_err(xml_err)?;

            for feature in &template.features {
                let mut fe = BytesStart::new("Feature");
                fe.push_attribute(("X", feature.x.to_string().as_str()));
                fe.push_attribute(("Y", feature.y.to_string().as_str()));
                fe.push_attribute(("AngleLabel", feature.label().to_string().as_str()));
                writer.write_event(Event::Empty(fe)).map_err(xml_err)?;
            }

            if let Some(data) = &template.additional_data {
                writer
                    .write_event(Event::Start(BytesStart::new("AditionalData")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(data)))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("AditionalData")))
                    .map_err(xml_err)?;
            }

            writer
                .write_event(Event::End(BytesEnd::new("Template")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("TemplatePyramid")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("TemplatePyramidClass")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

struct PendingTemplate {
    width: i32,
    height: i32,
    pyramid_level: usize,
    declared_features: usize,
    features: Vec<Feature>,
    additional_data: Option<String>,
}

/// Parses one class document back into `(label, pyramids)`.
pub fn read_class(xml: &str) -> OriMatchResult<(String, Vec<TemplatePyramid>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut label: Option<String> = None;
    let mut declared_pyramids: usize = 0;
    let mut pyramids: Vec<TemplatePyramid> = Vec::new();
    let mut current_levels: Option<Vec<Template>> = None;
    let mut current_template: Option<PendingTemplate> = None;
    let mut in_additional_data = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(el) => match el.name().as_ref() {
                b"TemplatePyramidClass" => {
                    label = Some(required_attr(&el, "TemplatePyramidClass", "classLabel")?);
                    declared_pyramids =
                        parsed_attr(&el, "TemplatePyramidClass", "numOfTemplatePyrs")?;
                }
                b"TemplatePyramid" => {
                    current_levels = Some(Vec::new());
                }
                b"Template" => {
                    current_template = Some(PendingTemplate {
                        width: parsed_attr(&el, "Template", "width")?,
                        height: parsed_attr(&el, "Template", "height")?,
                        pyramid_level: parsed_attr(&el, "Template", "pyramidLevel")?,
                        declared_features: parsed_attr(&el, "Template", "numOfFeatures")?,
                        features: Vec::new(),
                        additional_data: None,
                    });
                }
                b"Feature" => {
                    push_feature(&el, current_template.as_mut())?;
                }
                b"AditionalData" => {
                    in_additional_data = true;
                }
                other => {
                    return Err(OriMatchError::Xml {
                        reason: format!(
                            "unexpected element <{}>",
                            String::from_utf8_lossy(other)
                        ),
                    });
                }
            },
            Event::Empty(el) => match el.name().as_ref() {
                b"Feature" => {
                    push_feature(&el, current_template.as_mut())?;
                }
                b"AditionalData" => {}
                other => {
                    return Err(OriMatchError::Xml {
                        reason: format!(
                            "unexpected element <{}/>",
                            String::from_utf8_lossy(other)
                        ),
                    });
                }
            },
            Event::Text(text) => {
                if in_additional_data {
                    if let Some(pending) = current_template.as_mut() {
                        pending.additional_data =
                            Some(text.unescape().map_err(xml_err)?.into_owned());
                    }
                }
            }
            Event::End(el) => match el.name().as_ref() {
                b"AditionalData" => {
                    in_additional_data = false;
                }
                b"Template" => {
                    let pending = current_template.take().ok_or_else(|| xml_err("stray </Template>"))?;
                    if pending.features.len() != pending.declared_features {
                        return Err(OriMatchError::Xml {
                            reason: format!(
                                "template declares {} features but carries {}",
                                pending.declared_features,
                                pending.features.len()
                            ),
                        });
                    }
                    let class_label = label
                        .clone()
                        .ok_or_else(|| xml_err("template outside TemplatePyramidClass"))?;
                    let levels = current_levels
                        .as_mut()
                        .ok_or_else(|| xml_err("template outside TemplatePyramid"))?;
                    levels.push(Template {
                        class_label,
                        pyramid_level: pending.pyramid_level,
                        width: pending.width,
                        height: pending.height,
                        features: pending.features,
                        additional_data: pending.additional_data,
                    });
                }
                b"TemplatePyramid" => {
                    let levels = current_levels
                        .take()
                        .ok_or_else(|| xml_err("stray </TemplatePyramid>"))?;
                    pyramids.push(TemplatePyramid::from_levels(levels)?);
                }
                b"TemplatePyramidClass" => {}
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let label = label.ok_or_else(|| xml_err("missing TemplatePyramidClass root"))?;
    if pyramids.len() != declared_pyramids {
        return Err(OriMatchError::Xml {
            reason: format!(
                "document declares {} pyramids but carries {}",
                declared_pyramids,
                pyramids.len()
            ),
        });
    }
    Ok((label, pyramids))
}

fn push_feature(
    el: &BytesStart<'_>,
    current_template: Option<&mut PendingTemplate>,
) -> OriMatchResult<()> {
    let pending = current_template.ok_or_else(|| xml_err("feature outside Template"))?;
    let x: i32 = parsed_attr(el, "Feature", "X")?;
    let y: i32 = parsed_attr(el, "Feature", "Y")?;
    let angle_label: u8 = parsed_attr(el, "Feature", "AngleLabel")?;
    let feature =
        Feature::from_label(x, y, angle_label).ok_or(OriMatchError::MalformedAttribute {
            element: "Feature",
            attribute: "AngleLabel",
        })?;
    pending.features.push(feature);
    Ok(())
}

fn required_attr(
    el: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> OriMatchResult<String> {
    let attr = el
        .try_get_attribute(attribute)
        .map_err(xml_err)?
        .ok_or(OriMatchError::MissingAttribute { element, attribute })?;
    Ok(attr.unescape_value().map_err(xml_err)?.into_owned())
}

fn parsed_attr<T: FromStr>(
    el: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> OriMatchResult<T> {
    required_attr(el, element, attribute)?
        .parse()
        .map_err(|_| OriMatchError::MalformedAttribute { element, attribute })
}

/// Writes one class document to a file.
pub fn write_class_file<P: AsRef<Path>>(
    path: P,
    label: &str,
    pyramids: &[TemplatePyramid],
) -> OriMatchResult<()> {
    let document = write_class(label, pyramids)?;
    std::fs::write(path, document).map_err(|err| OriMatchError::Io {
        reason: err.to_string(),
    })
}

/// Reads one class document from a file.
pub fn read_class_file<P: AsRef<Path>>(path: P) -> OriMatchResult<(String, Vec<TemplatePyramid>)> {
    let document = std::fs::read_to_string(path).map_err(|err| OriMatchError::Io {
        reason: err.to_string(),
    })?;
    read_class(&document)
}

/// Reads a batch of class documents, in parallel under the `rayon` feature.
///
/// Any failing file fails the whole batch.
pub fn read_class_files<P: AsRef<Path> + Sync>(
    paths: &[P],
) -> OriMatchResult<Vec<(String, Vec<TemplatePyramid>)>> {
    #[cfg(feature = "rayon")]
    {
        paths.par_iter().map(read_class_file).collect()
    }

    #[cfg(not(feature = "rayon"))]
    {
        paths.iter().map(read_class_file).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pyramid(label: &str) -> TemplatePyramid {
        let features = vec![
            Feature::from_label(3, 5, 2).unwrap(),
            Feature::from_label(10, 2, 0).unwrap(),
        ];
        let levels = (0..2)
            .map(|level| Template {
                class_label: label.to_owned(),
                pyramid_level: level,
                width: 11,
                height: 6,
                features: features.clone(),
                additional_data: None,
            })
            .collect();
        TemplatePyramid::from_levels(levels).unwrap()
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let pyramids = vec![sample_pyramid("gear"), sample_pyramid("gear")];
        let document = write_class("gear", &pyramids).unwrap();
        let (label, restored) = read_class(&document).unwrap();
        assert_eq!(label, "gear");
        assert_eq!(restored, pyramids);
    }

    #[test]
    fn additional_data_roundtrips_verbatim() {
        let mut pyramid = sample_pyramid("gear");
        let payload = "mask:0011";
        let levels: Vec<Template> = pyramid
            .levels()
            .iter()
            .cloned()
            .map(|mut t| {
                t.additional_data = Some(payload.to_owned());
                t
            })
            .collect();
        pyramid = TemplatePyramid::from_levels(levels).unwrap();

        let document = write_class("gear", &[pyramid.clone()]).unwrap();
        assert!(document.contains("<AditionalData>"));
        let (_, restored) = read_class(&document).unwrap();
        assert_eq!(restored[0], pyramid);
    }

    #[test]
    fn missing_attribute_fails_the_load() {
        let document = r#"<?xml version="1.0"?>
            <TemplatePyramidClass classLabel="gear" numOfTemplatePyrs="1">
              <TemplatePyramid>
                <Template width="4" height="4" pyramidLevel="0" numOfFeatures="1">
                  <Feature X="1" AngleLabel="3"/>
                </Template>
              </TemplatePyramid>
            </TemplatePyramidClass>"#;
        assert_eq!(
            read_class(document),
            Err(OriMatchError::MissingAttribute {
                element: "Feature",
                attribute: "Y",
            })
        );
    }

    #[test]
    fn bad_angle_label_fails_the_load() {
        let document = r#"<TemplatePyramidClass classLabel="gear" numOfTemplatePyrs="1">
              <TemplatePyramid>
                <Template width="4" height="4" pyramidLevel="0" numOfFeatures="1">
                  <Feature X="1" Y="2" AngleLabel="9"/>
                </Template>
              </TemplatePyramid>
            </TemplatePyramidClass>"#;
        assert_eq!(
            read_class(document),
            Err(OriMatchError::MalformedAttribute {
                element: "Feature",
                attribute: "AngleLabel",
            })
        );
    }

    #[test]
    fn pyramid_count_mismatch_fails_the_load() {
        let document = r#"<TemplatePyramidClass classLabel="gear" numOfTemplatePyrs="2">
              <TemplatePyramid>
                <Template width="4" height="4" pyramidLevel="0" numOfFeatures="1">
                  <Feature X="1" Y="2" AngleLabel="3"/>
                </Template>
              </TemplatePyramid>
            </TemplatePyramidClass>"#;
        assert!(matches!(
            read_class(document),
            Err(OriMatchError::Xml { .. })
        ));
    }
}
