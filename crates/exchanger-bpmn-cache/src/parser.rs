//! Streaming BPMN 2.0 XML parser that extracts per-activity metadata
//! (spec §4.4): display name, documentation, and `camunda:properties`
//! extension values, keyed by element id.

use std::collections::HashMap;

use exchanger_shared::DiagramElementMetadata;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::BpmnCacheError;

const TASK_LIKE_SUFFIXES: &[&str] = &["Task", "Event", "Gateway"];
const TASK_LIKE_EXACT: &[&str] = &["subProcess", "callActivity", "process"];

fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

fn is_element_of_interest(local: &[u8]) -> bool {
    let name = String::from_utf8_lossy(local);
    TASK_LIKE_EXACT.contains(&name.as_ref()) || TASK_LIKE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

struct ElementFrame {
    metadata: Option<DiagramElementMetadata>,
}

/// Parses a BPMN 2.0 XML document into a map of `activity_id -> metadata`
/// for every task/event/gateway/subprocess element that carries an `id`
/// attribute.
pub fn parse_bpmn_xml(xml: &str) -> Result<HashMap<String, DiagramElementMetadata>, BpmnCacheError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut results = HashMap::new();
    let mut stack: Vec<ElementFrame> = Vec::new();
    let mut in_documentation_depth: Option<usize> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(BpmnCacheError::Xml)? {
            Event::Eof => break,
            Event::Start(e) => {
                let qname = e.name().as_ref().to_vec();
                let local = local_name(&qname).to_vec();

                if local == b"documentation" {
                    in_documentation_depth = Some(stack.len());
                }
                if local == b"property" {
                    apply_camunda_property(&e, &mut stack);
                }

                let metadata = element_metadata(&e, &local);
                stack.push(ElementFrame { metadata });
            }
            Event::Empty(e) => {
                let qname = e.name().as_ref().to_vec();
                let local = local_name(&qname).to_vec();

                if local == b"property" {
                    apply_camunda_property(&e, &mut stack);
                }
                if let Some(metadata) = element_metadata(&e, &local) {
                    results.insert(metadata.element_id.clone(), metadata);
                }
            }
            Event::Text(t) => {
                if let Some(depth) = in_documentation_depth {
                    let text = t.unescape().unwrap_or_default().into_owned();
                    if depth > 0 {
                        if let Some(frame) = stack.get_mut(depth - 1) {
                            if let Some(metadata) = frame.metadata.as_mut() {
                                metadata.documentation.push_str(&text);
                            }
                        }
                    }
                }
            }
            Event::End(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                if local == b"documentation" {
                    in_documentation_depth = None;
                }
                if let Some(frame) = stack.pop() {
                    if let Some(metadata) = frame.metadata {
                        results.insert(metadata.element_id.clone(), metadata);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(results)
}

fn element_metadata(e: &quick_xml::events::BytesStart<'_>, local: &[u8]) -> Option<DiagramElementMetadata> {
    if !is_element_of_interest(local) {
        return None;
    }
    let mut id = None;
    let mut name = None;
    for attr in e.attributes().flatten() {
        match local_name(attr.key.as_ref()) {
            b"id" => id = Some(attr.unescape_value().unwrap_or_default().into_owned()),
            b"name" => name = Some(attr.unescape_value().unwrap_or_default().into_owned()),
            _ => {}
        }
    }
    id.map(|id| DiagramElementMetadata {
        element_id: id,
        display_name: name.unwrap_or_default(),
        extension_properties: HashMap::new(),
        documentation: String::new(),
    })
}

fn apply_camunda_property(e: &quick_xml::events::BytesStart<'_>, stack: &mut [ElementFrame]) {
    let mut prop_name = None;
    let mut prop_value = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().unwrap_or_default().into_owned();
        match local_name(attr.key.as_ref()) {
            b"name" => prop_name = Some(value),
            b"value" => prop_value = Some(value),
            _ => {}
        }
    }
    if let (Some(name), Some(value)) = (prop_name, prop_value) {
        if let Some(frame) = stack.iter_mut().rev().find(|f| f.metadata.is_some()) {
            if let Some(metadata) = frame.metadata.as_mut() {
                metadata.extension_properties.insert(name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:camunda="http://camunda.org/schema/1.0/bpmn">
  <bpmn:process id="Process_1">
    <bpmn:userTask id="Activity_1" name="Create task">
      <bpmn:documentation>Creates the downstream task.</bpmn:documentation>
      <bpmn:extensionElements>
        <camunda:properties>
          <camunda:property name="templateId" value="tpl-42" />
        </camunda:properties>
      </bpmn:extensionElements>
    </bpmn:userTask>
    <bpmn:serviceTask id="Activity_2" name="Track result" />
  </bpmn:process>
</bpmn:definitions>"#;

    #[test]
    fn extracts_display_name_and_documentation_for_user_task() {
        let metadata = parse_bpmn_xml(SAMPLE).unwrap();
        let activity_1 = metadata.get("Activity_1").unwrap();
        assert_eq!(activity_1.display_name, "Create task");
        assert_eq!(activity_1.documentation, "Creates the downstream task.");
    }

    #[test]
    fn extracts_camunda_property_values() {
        let metadata = parse_bpmn_xml(SAMPLE).unwrap();
        let activity_1 = metadata.get("Activity_1").unwrap();
        assert_eq!(activity_1.extension_properties.get("templateId"), Some(&"tpl-42".to_string()));
    }

    #[test]
    fn empty_elements_without_children_are_still_captured() {
        let metadata = parse_bpmn_xml(SAMPLE).unwrap();
        let activity_2 = metadata.get("Activity_2").unwrap();
        assert_eq!(activity_2.display_name, "Track result");
    }

    #[test]
    fn malformed_xml_returns_error() {
        let result = parse_bpmn_xml("<bpmn:definitions><unterminated>");
        assert!(result.is_err());
    }
}
