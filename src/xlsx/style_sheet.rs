//! Style sheet assembly for written workbooks.

use crate::schema::Rgb;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Writer;
use std::collections::HashMap;
use std::io::{self, Write};

use super::writer::{end, start_counted, write_declaration, write_empty, NS_MAIN};

/// First id available to custom number formats.
const FIRST_CUSTOM_FORMAT_ID: u32 = 164;

/// Visual attributes of a written cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStyle<'a> {
    /// Number format code; `None` is General
    pub num_fmt: Option<&'a str>,
    pub bold: bool,
    pub fill: Option<Rgb>,
    pub border: bool,
    pub wrap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct XfKey {
    num_fmt_id: u32,
    font_id: u32,
    fill_id: u32,
    border_id: u32,
    wrap: bool,
}

const DEFAULT_XF: XfKey = XfKey {
    num_fmt_id: 0,
    font_id: 0,
    fill_id: 0,
    border_id: 0,
    wrap: false,
};

/// Registry of number formats, fills and cell formats used by a workbook.
///
/// Style index 0 is always the default General cell.
#[derive(Debug)]
pub struct StyleRegistry {
    custom_formats: Vec<(u32, String)>,
    format_ids: HashMap<String, u32>,
    fills: Vec<Rgb>,
    xfs: Vec<XfKey>,
    xf_ids: HashMap<XfKey, u32>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    /// Create a registry holding only the default cell format.
    pub fn new() -> Self {
        let mut xf_ids = HashMap::new();
        xf_ids.insert(DEFAULT_XF, 0);
        Self {
            custom_formats: Vec::new(),
            format_ids: HashMap::new(),
            fills: Vec::new(),
            xfs: vec![DEFAULT_XF],
            xf_ids,
        }
    }

    /// Style index for `style`, registering it on first use.
    pub fn register(&mut self, style: &CellStyle<'_>) -> u32 {
        let key = XfKey {
            num_fmt_id: style.num_fmt.map_or(0, |code| self.num_fmt_id(code)),
            font_id: u32::from(style.bold),
            fill_id: style.fill.map_or(0, |rgb| self.fill_id(rgb)),
            border_id: u32::from(style.border),
            wrap: style.wrap,
        };

        if let Some(&id) = self.xf_ids.get(&key) {
            return id;
        }
        let id = self.xfs.len() as u32;
        self.xfs.push(key);
        self.xf_ids.insert(key, id);
        id
    }

    /// Number format id of a format code.
    pub fn num_fmt_id(&mut self, code: &str) -> u32 {
        if let Some(id) = builtin_format_id(code) {
            return id;
        }
        if let Some(&id) = self.format_ids.get(code) {
            return id;
        }
        let id = FIRST_CUSTOM_FORMAT_ID + self.custom_formats.len() as u32;
        self.custom_formats.push((id, code.to_string()));
        self.format_ids.insert(code.to_string(), id);
        id
    }

    fn fill_id(&mut self, rgb: Rgb) -> u32 {
        // 0 and 1 are the mandatory none and gray125 fills
        let idx = match self.fills.iter().position(|&f| f == rgb) {
            Some(idx) => idx,
            None => {
                self.fills.push(rgb);
                self.fills.len() - 1
            }
        };
        idx as u32 + 2
    }

    /// Number of registered cell formats.
    pub fn len(&self) -> usize {
        self.xfs.len()
    }

    /// Never true; the default format is always present.
    pub fn is_empty(&self) -> bool {
        self.xfs.is_empty()
    }

    /// Write xl/styles.xml.
    pub fn write_xml<W: Write>(&self, xml: &mut Writer<W>) -> io::Result<()> {
        write_declaration(xml)?;
        xml.write_event(Event::Start(
            BytesStart::new("styleSheet").with_attributes([("xmlns", NS_MAIN)]),
        ))?;

        if !self.custom_formats.is_empty() {
            start_counted(xml, "numFmts", self.custom_formats.len())?;
            for (id, code) in &self.custom_formats {
                let id = id.to_string();
                write_empty(
                    xml,
                    "numFmt",
                    &[("numFmtId", id.as_str()), ("formatCode", code.as_str())],
                )?;
            }
            end(xml, "numFmts")?;
        }

        start_counted(xml, "fonts", 2)?;
        for bold in [false, true] {
            xml.write_event(Event::Start(BytesStart::new("font")))?;
            if bold {
                write_empty(xml, "b", &[])?;
            }
            write_empty(xml, "sz", &[("val", "11")])?;
            write_empty(xml, "name", &[("val", "Calibri")])?;
            write_empty(xml, "family", &[("val", "2")])?;
            end(xml, "font")?;
        }
        end(xml, "fonts")?;

        // 0 and 1 are the mandatory none and gray125 fills
        start_counted(xml, "fills", self.fills.len() + 2)?;
        write_fill(xml, "none", None)?;
        write_fill(xml, "gray125", None)?;
        for &rgb in &self.fills {
            write_fill(xml, "solid", Some(rgb))?;
        }
        end(xml, "fills")?;

        start_counted(xml, "borders", 2)?;
        write_border(xml, None)?;
        write_border(xml, Some("thin"))?;
        end(xml, "borders")?;

        start_counted(xml, "cellStyleXfs", 1)?;
        write_empty(
            xml,
            "xf",
            &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")],
        )?;
        end(xml, "cellStyleXfs")?;

        start_counted(xml, "cellXfs", self.xfs.len())?;
        for xf in &self.xfs {
            write_xf(xml, xf)?;
        }
        end(xml, "cellXfs")?;

        start_counted(xml, "cellStyles", 1)?;
        write_empty(
            xml,
            "cellStyle",
            &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")],
        )?;
        end(xml, "cellStyles")?;

        end(xml, "styleSheet")
    }
}

fn write_fill<W: Write>(xml: &mut Writer<W>, pattern: &str, rgb: Option<Rgb>) -> io::Result<()> {
    xml.write_event(Event::Start(BytesStart::new("fill")))?;
    match rgb {
        None => write_empty(xml, "patternFill", &[("patternType", pattern)])?,
        Some(rgb) => {
            xml.write_event(Event::Start(
                BytesStart::new("patternFill").with_attributes([("patternType", pattern)]),
            ))?;
            write_empty(xml, "fgColor", &[("rgb", rgb.argb().as_str())])?;
            write_empty(xml, "bgColor", &[("indexed", "64")])?;
            end(xml, "patternFill")?;
        }
    }
    end(xml, "fill")
}

fn write_border<W: Write>(xml: &mut Writer<W>, style: Option<&str>) -> io::Result<()> {
    xml.write_event(Event::Start(BytesStart::new("border")))?;
    for side in ["left", "right", "top", "bottom"] {
        match style {
            None => write_empty(xml, side, &[])?,
            Some(style) => {
                xml.write_event(Event::Start(
                    BytesStart::new(side).with_attributes([("style", style)]),
                ))?;
                write_empty(xml, "color", &[("auto", "1")])?;
                end(xml, side)?;
            }
        }
    }
    write_empty(xml, "diagonal", &[])?;
    end(xml, "border")
}

fn write_xf<W: Write>(xml: &mut Writer<W>, xf: &XfKey) -> io::Result<()> {
    let ids = [xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id].map(|id| id.to_string());
    let mut element = BytesStart::new("xf").with_attributes([
        ("numFmtId", ids[0].as_str()),
        ("fontId", ids[1].as_str()),
        ("fillId", ids[2].as_str()),
        ("borderId", ids[3].as_str()),
        ("xfId", "0"),
    ]);
    let flags = [
        ("applyNumberFormat", xf.num_fmt_id != 0),
        ("applyFont", xf.font_id != 0),
        ("applyFill", xf.fill_id != 0),
        ("applyBorder", xf.border_id != 0),
    ];
    for (flag, applied) in flags {
        if applied {
            element.push_attribute((flag, "1"));
        }
    }

    if !xf.wrap {
        return xml.write_event(Event::Empty(element));
    }
    element.push_attribute(("applyAlignment", "1"));
    xml.write_event(Event::Start(element))?;
    write_empty(xml, "alignment", &[("wrapText", "1")])?;
    end(xml, "xf")
}

fn builtin_format_id(code: &str) -> Option<u32> {
    match code {
        "General" => Some(0),
        "0" => Some(1),
        "0.00" => Some(2),
        "#,##0" => Some(3),
        "#,##0.00" => Some(4),
        "@" => Some(49),
        _ => None,
    }
}
