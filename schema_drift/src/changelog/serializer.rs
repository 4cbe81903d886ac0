//! Changelog serializers
//!
//! XML follows the Liquibase `databaseChangeLog` layout. YAML and JSON use the
//! same document shape Liquibase reads for those formats.

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde_json::{json, Map, Value};

use crate::changelog::{ChangeLog, ChangeSet};
use crate::error::{Error, Result};

const CHANGELOG_NS: &str = "http://www.liquibase.org/xml/ns/dbchangelog";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.liquibase.org/xml/ns/dbchangelog http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-latest.xsd";

/// Renders a changelog as text
pub trait ChangeLogSerializer: Send + Sync {
    fn serialize(&self, change_log: &ChangeLog) -> Result<String>;

    /// Conventional file extension for the format
    fn extension(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlChangeLogSerializer;

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlChangeLogSerializer;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonChangeLogSerializer;

fn xml_error<E: Display>(err: E) -> Error {
    Error::SerializationFailure(format!("Failed to write changelog XML: {}", err))
}

/// Document shape shared by the YAML and JSON formats
fn document(change_log: &ChangeLog) -> Result<Value> {
    let change_sets = change_log
        .change_sets()
        .iter()
        .map(|change_set| Ok(json!({ "changeSet": change_set_value(change_set)? })))
        .collect::<Result<Vec<_>>>()?;

    Ok(json!({ "databaseChangeLog": change_sets }))
}

fn change_set_value(change_set: &ChangeSet) -> Result<Value> {
    Ok(json!({
        "id": change_set.id,
        "author": change_set.author,
        "changes": serde_json::to_value(&change_set.changes)?,
    }))
}

impl ChangeLogSerializer for YamlChangeLogSerializer {
    fn serialize(&self, change_log: &ChangeLog) -> Result<String> {
        Ok(serde_yaml::to_string(&document(change_log)?)?)
    }

    fn extension(&self) -> &'static str {
        "yaml"
    }
}

impl ChangeLogSerializer for JsonChangeLogSerializer {
    fn serialize(&self, change_log: &ChangeLog) -> Result<String> {
        Ok(serde_json::to_string_pretty(&document(change_log)?)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

impl ChangeLogSerializer for XmlChangeLogSerializer {
    fn serialize(&self, change_log: &ChangeLog) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.1", Some("UTF-8"), Some("no"))))
            .map_err(xml_error)?;

        let mut root = BytesStart::new("databaseChangeLog");
        root.push_attribute(("xmlns", CHANGELOG_NS));
        root.push_attribute(("xmlns:xsi", XSI_NS));
        root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));

        if change_log.is_empty() {
            writer.write_event(Event::Empty(root)).map_err(xml_error)?;
        } else {
            writer.write_event(Event::Start(root)).map_err(xml_error)?;
            for change_set in change_log.change_sets() {
                write_change_set(&mut writer, change_set)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("databaseChangeLog")))
                .map_err(xml_error)?;
        }

        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }

    fn extension(&self) -> &'static str {
        "xml"
    }
}

fn write_change_set(writer: &mut Writer<Vec<u8>>, change_set: &ChangeSet) -> Result<()> {
    let mut start = BytesStart::new("changeSet");
    start.push_attribute(("author", change_set.author.as_str()));
    start.push_attribute(("id", change_set.id.as_str()));
    writer.write_event(Event::Start(start)).map_err(xml_error)?;

    for change in &change_set.changes {
        // Externally tagged: a single `{tag: body}` entry
        if let Value::Object(map) = serde_json::to_value(change)? {
            for (tag, body) in &map {
                write_element(writer, tag, body)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("changeSet")))
        .map_err(xml_error)?;
    Ok(())
}

/// Scalars become attributes, objects and tagged arrays become children
fn write_element(writer: &mut Writer<Vec<u8>>, tag: &str, body: &Value) -> Result<()> {
    let mut start = BytesStart::new(tag);
    let mut children: Vec<(&str, &Value)> = Vec::new();

    if let Value::Object(fields) = body {
        for (key, value) in fields {
            match value {
                Value::Null => {}
                Value::Object(_) => children.push((key.as_str(), value)),
                Value::Array(items) => children.extend(items.iter().filter_map(tagged_child)),
                scalar => {
                    let text = scalar_text(scalar);
                    start.push_attribute((key.as_str(), text.as_str()));
                }
            }
        }
    }

    if children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_error)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    for (child_tag, child) in children {
        write_element(writer, child_tag, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_error)?;
    Ok(())
}

fn tagged_child(item: &Value) -> Option<(&str, &Value)> {
    let map: &Map<String, Value> = item.as_object()?;
    map.iter().next().map(|(tag, body)| (tag.as_str(), body))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{Change, ChangeColumn, ColumnConstraints, CreateTable, DropColumn};
    use pretty_assertions::assert_eq;

    fn sample() -> ChangeLog {
        ChangeLog::new(vec![
            ChangeSet {
                id: "20240101-01-1".to_string(),
                author: "dev (generated)".to_string(),
                changes: vec![Change::CreateTable(CreateTable {
                    schema_name: None,
                    table_name: "b".to_string(),
                    remarks: None,
                    columns: vec![ChangeColumn {
                        name: "id".to_string(),
                        data_type: Some("BIGINT".to_string()),
                        constraints: Some(ColumnConstraints {
                            nullable: Some(false),
                            primary_key: Some(true),
                            primary_key_name: None,
                        }),
                        ..ChangeColumn::default()
                    }],
                })],
            },
            ChangeSet {
                id: "20240101-01-2".to_string(),
                author: "dev (generated)".to_string(),
                changes: vec![Change::DropColumn(DropColumn {
                    schema_name: None,
                    table_name: "a".to_string(),
                    column_name: "name".to_string(),
                })],
            },
        ])
    }

    #[test]
    fn test_xml_layout() {
        let xml = XmlChangeLogSerializer.serialize(&sample()).expect("xml");

        assert!(xml.starts_with("<?xml version=\"1.1\" encoding=\"UTF-8\" standalone=\"no\"?>"));
        assert!(xml.contains("xmlns=\"http://www.liquibase.org/xml/ns/dbchangelog\""));
        assert!(xml.contains("<changeSet author=\"dev (generated)\" id=\"20240101-01-1\">"));
        assert!(xml.contains("<createTable tableName=\"b\">"));
        assert!(xml.contains("<column name=\"id\" type=\"BIGINT\">"));
        assert!(xml.contains("<constraints nullable=\"false\" primaryKey=\"true\"/>"));
        assert!(xml.contains("<dropColumn tableName=\"a\" columnName=\"name\"/>"));
        assert!(xml.trim_end().ends_with("</databaseChangeLog>"));
    }

    #[test]
    fn test_empty_xml_changelog() {
        let xml = XmlChangeLogSerializer.serialize(&ChangeLog::default()).expect("xml");

        assert!(xml.contains("<databaseChangeLog "));
        assert!(xml.trim_end().ends_with("/>"));
        assert!(!xml.contains("changeSet"));
    }

    #[test]
    fn test_json_document_shape() {
        let json = JsonChangeLogSerializer.serialize(&sample()).expect("json");
        let value: Value = serde_json::from_str(&json).expect("valid json");

        let change_sets = value["databaseChangeLog"].as_array().expect("array");
        assert_eq!(change_sets.len(), 2);
        assert_eq!(change_sets[1]["changeSet"]["id"], "20240101-01-2");
        assert_eq!(
            change_sets[0]["changeSet"]["changes"][0]["createTable"]["columns"][0]["column"]["name"],
            "id"
        );
    }

    #[test]
    fn test_yaml_document_shape() {
        let yaml = YamlChangeLogSerializer.serialize(&sample()).expect("yaml");
        let value: Value = serde_yaml::from_str(&yaml).expect("valid yaml");

        assert_eq!(
            value["databaseChangeLog"][1]["changeSet"]["changes"][0]["dropColumn"]["columnName"],
            "name"
        );
    }
}
