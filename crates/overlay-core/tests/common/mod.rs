//! Shared fixtures for overlay-core integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use overlay_core::fonts::encoding;
use overlay_core::geometry::page_object_id;

/// `page_count` pages of `width` x `height` points, each with a line of text
/// and a shared resource dictionary
pub fn create_test_pdf(page_count: usize, width: i64, height: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    });

    let mut kids = Vec::new();
    for n in 0..page_count {
        let content = format!("BT /F1 18 Tf 72 {} Td (Page {}) Tj ET\n", height - 72, n + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => page_count as i64,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => Object::Reference(resources_id),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn page_operations(bytes: &[u8], page_index: u32) -> Vec<Operation> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = page_object_id(&doc, page_index).unwrap();
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content).unwrap().operations
}

pub fn number(obj: &Object) -> f64 {
    match obj {
        Object::Integer(n) => *n as f64,
        Object::Real(n) => f64::from(*n),
        other => panic!("not a number: {:?}", other),
    }
}

/// Every `Tj` string on the page, decoded back from WinAnsi
pub fn drawn_strings(bytes: &[u8], page_index: u32) -> Vec<String> {
    page_operations(bytes, page_index)
        .into_iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(raw, _)) => Some(
                raw.iter()
                    .filter_map(|b| encoding::decode_byte(*b))
                    .collect::<String>(),
            ),
            _ => None,
        })
        .collect()
}

/// `(x, y)` of every `Tm` on the page, in drawing order
pub fn text_origins(bytes: &[u8], page_index: u32) -> Vec<(f64, f64)> {
    page_operations(bytes, page_index)
        .into_iter()
        .filter(|op| op.operator == "Tm")
        .map(|op| (number(&op.operands[4]), number(&op.operands[5])))
        .collect()
}
