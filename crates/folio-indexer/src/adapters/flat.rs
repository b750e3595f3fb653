//! Flat XML dialect
//!
//! The simplest of the supported source dialects: one `<record>` element
//! carrying metadata, optionally nested `<structure>` elements with page
//! references, and a `<physical>` section declaring the page sequence.
//!
//! ```xml
//! <record id="PPN1" type="monograph" label="Faust">
//!   <metadata name="MD_TITLE" lang="de">Faust</metadata>
//!   <accessCondition>OPENACCESS</accessCondition>
//!   <group type="person" value="Goethe">
//!     <metadata name="MD_ROLE">author</metadata>
//!     <authority name="NORM_NAME">Goethe, Johann Wolfgang von</authority>
//!   </group>
//!   <representative ref="phys1"/>
//!   <structure type="chapter" id="LOG1" label="Chapter One">
//!     <page ref="phys1"/>
//!     <page ref="phys2"/>
//!   </structure>
//!   <page ref="phys3"/>
//!   <physical>
//!     <page id="phys1" order="1" orderLabel="1" file="00000001.tif" mime="image/tiff"/>
//!   </physical>
//! </record>
//! ```

use async_trait::async_trait;
use chrono::DateTime;
use folio_common::{IndexError, Result};
use folio_core::model::{GroupedMetadata, PageOrder, PhysicalPage};
use folio_core::{FormatAdapter, MetadataField, PhysicalManifest, StructureNode};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::hotfolder::is_purge_file;

#[derive(Default)]
pub struct FlatXmlAdapter;

impl FlatXmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FormatAdapter for FlatXmlAdapter {
    fn name(&self) -> &'static str {
        "flat-xml"
    }

    fn supports(&self, path: &Path) -> bool {
        if is_purge_file(path) || path.extension().and_then(|e| e.to_str()) != Some("xml") {
            return false;
        }
        // Peek at the document head for the record root element
        let mut head = [0u8; 512];
        let Ok(mut file) = File::open(path) else {
            return false;
        };
        let read = file.read(&mut head).unwrap_or(0);
        String::from_utf8_lossy(&head[..read]).contains("<record")
    }

    async fn parse(&self, path: &Path) -> Result<(StructureNode, PhysicalManifest)> {
        let xml = tokio::fs::read_to_string(path).await?;
        parse_record(&xml)
    }
}

fn parse_error(message: impl Into<String>) -> IndexError {
    IndexError::Parse(message.into())
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Text-carrying element currently open
enum TextTarget {
    Metadata { name: String, language: Option<String> },
    GroupMetadata { name: String },
    GroupAuthority { name: String },
    AccessCondition,
    DateCreated,
    DateUpdated,
}

fn parse_record(xml: &str) -> Result<(StructureNode, PhysicalManifest)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    // Self-closing elements arrive as Start/End pairs; `<record .../>` and
    // `<structure .../>` are valid shapes
    reader.config_mut().expand_empty_elements = true;

    // Bottom of the stack is the root; `structure` elements nest
    let mut stack: Vec<StructureNode> = Vec::new();
    let mut manifest = PhysicalManifest::default();
    let mut in_physical = false;
    let mut group: Option<GroupedMetadata> = None;
    let mut target: Option<TextTarget> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"record" => {
                    let id = attr(&e, "id")
                        .ok_or_else(|| parse_error("record element without id attribute"))?;
                    let node_type = attr(&e, "type").unwrap_or_else(|| "monograph".to_string());
                    let label = attr(&e, "label").unwrap_or_else(|| id.clone());
                    stack.push(StructureNode::new(node_type, label, id));
                },
                b"structure" => {
                    let id = attr(&e, "id")
                        .ok_or_else(|| parse_error("structure element without id attribute"))?;
                    let node_type = attr(&e, "type").unwrap_or_else(|| "other".to_string());
                    let label = attr(&e, "label").unwrap_or_default();
                    stack.push(StructureNode::new(node_type, label, id));
                },
                b"physical" => in_physical = true,
                b"page" if in_physical => manifest.pages.push(physical_page(&e)?),
                b"page" => {
                    let reference = attr(&e, "ref")
                        .ok_or_else(|| parse_error("page element without ref attribute"))?;
                    current(&mut stack)?.linked_physical_ids.push(reference);
                },
                b"representative" => {
                    current(&mut stack)?.representative = attr(&e, "ref");
                },
                b"anchor" => {
                    let node = current(&mut stack)?;
                    node.anchor_id = attr(&e, "pi");
                    node.volume_order = attr(&e, "order").and_then(|o| o.parse().ok());
                },
                b"group" => {
                    let group_type = attr(&e, "type")
                        .ok_or_else(|| parse_error("group element without type attribute"))?;
                    let value = attr(&e, "value").unwrap_or_default();
                    let mut g = GroupedMetadata::new(group_type, value);
                    g.merge_into_owner = attr(&e, "merge").as_deref() == Some("true");
                    group = Some(g);
                },
                b"metadata" => {
                    let name = attr(&e, "name")
                        .ok_or_else(|| parse_error("metadata element without name attribute"))?;
                    text.clear();
                    target = Some(if group.is_some() {
                        TextTarget::GroupMetadata { name }
                    } else {
                        TextTarget::Metadata {
                            name,
                            language: attr(&e, "lang"),
                        }
                    });
                },
                b"authority" => {
                    let name = attr(&e, "name")
                        .ok_or_else(|| parse_error("authority element without name attribute"))?;
                    text.clear();
                    target = Some(TextTarget::GroupAuthority { name });
                },
                b"accessCondition" => {
                    text.clear();
                    target = Some(TextTarget::AccessCondition);
                },
                b"dateCreated" => {
                    text.clear();
                    target = Some(TextTarget::DateCreated);
                },
                b"dateUpdated" => {
                    text.clear();
                    target = Some(TextTarget::DateUpdated);
                },
                _ => {},
            },
            Event::Text(t) => {
                if target.is_some() {
                    text.push_str(
                        &t.unescape()
                            .map_err(|e| parse_error(format!("malformed text content: {e}")))?,
                    );
                }
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"structure" => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| parse_error("unbalanced structure element"))?;
                    current(&mut stack)?.children.push(node);
                },
                b"physical" => in_physical = false,
                b"group" => {
                    if let Some(g) = group.take() {
                        current(&mut stack)?.grouped.push(g);
                    }
                },
                b"metadata" | b"authority" | b"accessCondition" | b"dateCreated"
                | b"dateUpdated" => {
                    apply_text(&mut stack, &mut group, target.take(), text.trim())?;
                },
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    let root = match stack.len() {
        1 => stack
            .pop()
            .ok_or_else(|| parse_error("document has no record element"))?,
        0 => return Err(parse_error("document has no record element")),
        _ => return Err(parse_error("unbalanced structure elements")),
    };
    Ok((root, manifest))
}

fn current<'a>(stack: &'a mut [StructureNode]) -> Result<&'a mut StructureNode> {
    stack
        .last_mut()
        .ok_or_else(|| parse_error("element outside of record"))
}

fn apply_text(
    stack: &mut [StructureNode],
    group: &mut Option<GroupedMetadata>,
    target: Option<TextTarget>,
    value: &str,
) -> Result<()> {
    let Some(target) = target else {
        return Ok(());
    };
    match target {
        TextTarget::Metadata { name, language } => {
            let mut field = MetadataField::new(name, value);
            if let Some(language) = language {
                field = field.with_language(language);
            }
            current(stack)?.fields.push(field);
        },
        TextTarget::GroupMetadata { name } => {
            if let Some(g) = group.as_mut() {
                g.fields.push(MetadataField::new(name, value));
            }
        },
        TextTarget::GroupAuthority { name } => {
            if let Some(g) = group.as_mut() {
                g.authority_fields.push(MetadataField::new(name, value));
            }
        },
        TextTarget::AccessCondition => {
            if !value.is_empty() {
                current(stack)?.access_conditions.insert(value.to_string());
            }
        },
        TextTarget::DateCreated => {
            current(stack)?.date_created = DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.to_utc());
        },
        TextTarget::DateUpdated => {
            current(stack)?.date_updated = DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.to_utc());
        },
    }
    Ok(())
}

fn physical_page(e: &BytesStart<'_>) -> Result<PhysicalPage> {
    let id = attr(e, "id").ok_or_else(|| parse_error("physical page without id attribute"))?;
    let order: u32 = attr(e, "order")
        .ok_or_else(|| parse_error("physical page without order attribute"))?
        .parse()
        .map_err(|_| parse_error("physical page with non-numeric order"))?;
    let sub_order: u32 = attr(e, "subOrder")
        .map(|s| {
            s.parse()
                .map_err(|_| parse_error("physical page with non-numeric subOrder"))
        })
        .transpose()?
        .unwrap_or(0);

    Ok(PhysicalPage {
        physical_id: id,
        order: PageOrder::with_sub_order(order, sub_order),
        order_label: attr(e, "orderLabel").unwrap_or_else(|| order.to_string()),
        file_name: attr(e, "file"),
        mime_type: attr(e, "mime"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"
        <record id="PPN1" type="monograph" label="Faust">
          <metadata name="MD_TITLE" lang="de">Faust</metadata>
          <accessCondition>OPENACCESS</accessCondition>
          <group type="person" value="Goethe">
            <metadata name="MD_ROLE">author</metadata>
            <authority name="NORM_NAME">Goethe, Johann Wolfgang von</authority>
          </group>
          <representative ref="phys1"/>
          <structure type="chapter" id="LOG1" label="Chapter One">
            <metadata name="MD_TITLE">Chapter One</metadata>
            <page ref="phys1"/>
            <page ref="phys2"/>
          </structure>
          <page ref="phys3"/>
          <physical>
            <page id="phys1" order="1" orderLabel="1" file="00000001.tif" mime="image/tiff"/>
            <page id="phys2" order="2" orderLabel="2" file="00000002.tif" mime="image/tiff"/>
            <page id="phys3" order="3" orderLabel="3" file="00000003.tif" mime="image/tiff"/>
          </physical>
        </record>"#;

    #[test]
    fn test_parse_full_record() {
        let (root, manifest) = parse_record(BOOK).unwrap();

        assert_eq!(root.logical_id, "PPN1");
        assert_eq!(root.node_type, "monograph");
        assert_eq!(root.label, "Faust");
        assert_eq!(root.field_values("MD_TITLE"), vec!["Faust"]);
        assert_eq!(root.fields[0].language.as_deref(), Some("de"));
        assert!(root.access_conditions.contains("OPENACCESS"));
        assert_eq!(root.representative.as_deref(), Some("phys1"));
        assert_eq!(root.linked_physical_ids, vec!["phys3"]);

        assert_eq!(root.grouped.len(), 1);
        let person = &root.grouped[0];
        assert_eq!(person.primary_value, "Goethe");
        assert_eq!(person.fields[0].name, "MD_ROLE");
        assert_eq!(person.authority_fields[0].name, "NORM_NAME");

        assert_eq!(root.children.len(), 1);
        let chapter = &root.children[0];
        assert_eq!(chapter.node_type, "chapter");
        assert_eq!(chapter.linked_physical_ids, vec!["phys1", "phys2"]);

        assert_eq!(manifest.pages.len(), 3);
        assert_eq!(manifest.pages[0].physical_id, "phys1");
        assert_eq!(manifest.pages[0].file_name.as_deref(), Some("00000001.tif"));
    }

    #[test]
    fn test_nested_structures() {
        let xml = r#"
            <record id="PPN1" type="monograph">
              <structure type="chapter" id="LOG1">
                <structure type="section" id="LOG2">
                  <page ref="phys1"/>
                </structure>
              </structure>
            </record>"#;
        let (root, _) = parse_record(xml).unwrap();

        assert_eq!(root.children[0].children[0].logical_id, "LOG2");
        assert_eq!(
            root.children[0].children[0].linked_physical_ids,
            vec!["phys1"]
        );
    }

    #[test]
    fn test_anchor_declaration() {
        let xml = r#"
            <record id="PPN1" type="volume">
              <anchor pi="ANCHOR1" order="2"/>
            </record>"#;
        let (root, _) = parse_record(xml).unwrap();

        assert_eq!(root.anchor_id.as_deref(), Some("ANCHOR1"));
        assert_eq!(root.volume_order, Some(2));
    }

    #[test]
    fn test_self_closing_record_parses() {
        let (root, manifest) =
            parse_record(r#"<record id="PPN9" type="monograph" label="Book"/>"#).unwrap();

        assert_eq!(root.logical_id, "PPN9");
        assert_eq!(root.label, "Book");
        assert!(root.children.is_empty());
        assert!(manifest.pages.is_empty());
    }

    #[test]
    fn test_self_closing_structure_is_kept() {
        let xml = r#"
            <record id="PPN1" type="monograph">
              <structure type="chapter" id="LOG1" label="Empty Chapter"/>
            </record>"#;
        let (root, _) = parse_record(xml).unwrap();

        // A structure without page references still contributes a node
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].logical_id, "LOG1");
        assert!(root.children[0].linked_physical_ids.is_empty());
    }

    #[test]
    fn test_missing_record_id_is_parse_error() {
        let err = parse_record(r#"<record type="monograph"/>"#).unwrap_err();
        assert!(matches!(err, IndexError::Parse(_)));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = parse_record("<record id=\"PPN1\"><metadata").unwrap_err();
        assert!(matches!(err, IndexError::Parse(_)));
    }
}
