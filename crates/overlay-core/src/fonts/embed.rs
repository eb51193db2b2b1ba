//! Font objects written into the output document

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::outline::{OutlineFont, FIRST_CHAR, LAST_CHAR};
use super::{ResolvedFont, StandardFont};

/// Add the font dictionary (and for outline faces its descriptor and font
/// file) to `doc`, returning the id of the font dictionary.
pub fn add_font_objects(doc: &mut Document, font: &ResolvedFont) -> ObjectId {
    match font {
        ResolvedFont::Standard(font) => add_standard_font(doc, *font),
        ResolvedFont::Outline(font) => add_outline_font(doc, font),
    }
}

fn add_standard_font(doc: &mut Document, font: StandardFont) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font_name(),
        "Encoding" => "WinAnsiEncoding",
    })
}

fn add_outline_font(doc: &mut Document, font: &OutlineFont) -> ObjectId {
    let file_key = if font.is_cff { "FontFile3" } else { "FontFile2" };
    let mut file_dict = Dictionary::new();
    if font.is_cff {
        file_dict.set("Subtype", "OpenType");
    } else {
        file_dict.set("Length1", font.data.len() as i64);
    }
    let file_id = doc.add_object(Stream::new(file_dict, font.data.as_ref().clone()));

    let base_font = Object::Name(font.postscript_name.as_bytes().to_vec());
    let bbox: Vec<Object> = font.bbox.iter().map(|v| Object::Integer(i64::from(*v))).collect();

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => font.descriptor_flags(),
        "FontBBox" => bbox,
        "ItalicAngle" => if font.italic { -12 } else { 0 },
        "Ascent" => i64::from(font.ascent),
        "Descent" => i64::from(font.descent),
        "CapHeight" => i64::from(font.cap_height),
        "StemV" => 80,
        file_key => Object::Reference(file_id),
    });

    let widths: Vec<Object> = font
        .widths
        .iter()
        .map(|w| Object::Integer(i64::from(*w)))
        .collect();

    // CFF outlines make a simple Type1 font; glyf outlines a TrueType one
    let subtype = if font.is_cff { "Type1" } else { "TrueType" };
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => subtype,
        "BaseFont" => base_font,
        "FirstChar" => i64::from(FIRST_CHAR),
        "LastChar" => i64::from(LAST_CHAR),
        "Widths" => widths,
        "Encoding" => "WinAnsiEncoding",
        "FontDescriptor" => Object::Reference(descriptor_id),
    })
}
