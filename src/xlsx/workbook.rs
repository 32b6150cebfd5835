//! Sheet listing from xl/workbook.xml.

use crate::container::OoxmlContainer;
use crate::error::{Error, Result};
use quick_xml::events::Event;

pub(crate) const WORKBOOK_PATH: &str = "xl/workbook.xml";

/// A sheet declared by the workbook, resolved to its part path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// Display name
    pub name: String,
    /// Relationship id in workbook.xml.rels
    pub rel_id: String,
    /// Package path of the worksheet part
    pub path: String,
}

/// Parse workbook.xml and resolve every sheet to its worksheet part.
///
/// Sheets whose relationship cannot be resolved are dropped with a warning;
/// chart sheets and dialog sheets show up this way too.
pub(crate) fn read_sheets(container: &OoxmlContainer) -> Result<Vec<SheetInfo>> {
    let rels = container.read_relationships(WORKBOOK_PATH)?;
    let xml = container.read_xml(WORKBOOK_PATH)?;

    let mut sheets = Vec::new();
    for (name, rel_id) in parse_sheet_entries(&xml)? {
        match rels.get(&rel_id) {
            Some(rel) => {
                let path = OoxmlContainer::resolve_path(WORKBOOK_PATH, &rel.target);
                sheets.push(SheetInfo { name, rel_id, path });
            }
            None => {
                tracing::warn!(sheet = %name, rel_id = %rel_id, "sheet has no worksheet relationship");
            }
        }
    }

    Ok(sheets)
}

/// `(name, r:id)` pairs of `<sheet>` elements in document order.
fn parse_sheet_entries(xml: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = String::new();

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = attr.unescape_value()?.into_owned(),
                        b"r:id" => rel_id = String::from_utf8_lossy(&attr.value).into_owned(),
                        // Strict documents bind the relationships namespace to another prefix
                        key if key.ends_with(b":id") && rel_id.is_empty() => {
                            rel_id = String::from_utf8_lossy(&attr.value).into_owned()
                        }
                        _ => {}
                    }
                }

                if !name.is_empty() {
                    entries.push((name, rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}
