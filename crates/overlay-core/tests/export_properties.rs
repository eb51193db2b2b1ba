//! End-to-end export behaviour over real files

mod common;

use common::{create_test_pdf, drawn_strings, text_origins, write_fixture};
use lopdf::Document;
use overlay_core::fonts::{ResolvedFont, StandardFont};
use overlay_core::geometry::page_object_id;
use overlay_core::{
    export_annotated_page, export_annotated_pages, Alignment, CancellationToken, DisplaySize,
    EditSession, ExportOptions, OverlayError, PageOverlay, PageRenderer, SkipReason,
    TextAnnotation,
};
use pretty_assertions::assert_eq;

fn annotation(content: &str, x: f64, y: f64) -> TextAnnotation {
    TextAnnotation {
        box_width: Some(300.0),
        font_size: 24.0,
        ..TextAnnotation::new(content, x, y)
    }
}

/// 500x700pt pages previewed at 1000px wide: 0.5 points per pixel
fn half_scale_overlay(annotations: Vec<TextAnnotation>) -> PageOverlay {
    PageOverlay::new(0, DisplaySize::width_only(1000.0)).with_annotations(annotations)
}

#[test]
fn empty_annotation_list_leaves_document_identical() {
    let dir = tempfile::tempdir().unwrap();
    let source_bytes = create_test_pdf(2, 500, 700);
    let source = write_fixture(dir.path(), "in.pdf", &source_bytes);
    let destination = dir.path().join("out.pdf");

    let report = export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![]),
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(std::fs::read(&destination).unwrap(), source_bytes);
    assert_eq!(report.annotations_drawn, 0);
    assert!(report.is_clean());
}

#[test]
fn exporting_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let overlay = half_scale_overlay(vec![
        annotation("First note", 40.0, 60.0),
        annotation("Second note\nwith two lines", 300.0, 500.0),
    ]);

    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    export_annotated_page(&source, &a, &overlay, &ExportOptions::default()).unwrap();
    export_annotated_page(&source, &b, &overlay, &ExportOptions::default()).unwrap();

    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
}

#[test]
fn unresolvable_font_does_not_drop_other_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("out.pdf");

    let mut exotic = annotation("middle", 0.0, 200.0);
    exotic.font_family = "NoSuchTypeface".to_string();
    let overlay = half_scale_overlay(vec![
        annotation("top", 0.0, 0.0),
        exotic,
        annotation("bottom", 0.0, 400.0),
    ]);

    let report =
        export_annotated_page(&source, &destination, &overlay, &ExportOptions::default()).unwrap();
    assert_eq!(report.annotations_drawn, 3);
    assert_eq!(report.font_fallbacks.len(), 1);
    assert_eq!(report.font_fallbacks[0].index, 1);

    let output = std::fs::read(&destination).unwrap();
    let strings = drawn_strings(&output, 0);
    for expected in ["Page 1", "top", "middle", "bottom"] {
        assert!(strings.iter().any(|s| s == expected), "missing {expected}: {strings:?}");
    }
}

#[test]
fn pixel_x_200_maps_to_point_100_at_half_scale() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("out.pdf");

    export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![annotation("x", 200.0, 0.0)]),
        &ExportOptions::default(),
    )
    .unwrap();

    let origins = text_origins(&std::fs::read(&destination).unwrap(), 0);
    assert_eq!(origins.len(), 1);
    assert!((origins[0].0 - 100.0).abs() < 1e-3, "{:?}", origins);
    // top of the page minus a 12pt first line
    assert!((origins[0].1 - 688.0).abs() < 1e-3, "{:?}", origins);
}

#[test]
fn right_alignment_anchors_at_box_edge() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("out.pdf");

    let mut right = annotation("Total", 200.0, 100.0);
    right.alignment = Alignment::Right;
    export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![right]),
        &ExportOptions::default(),
    )
    .unwrap();

    let origins = text_origins(&std::fs::read(&destination).unwrap(), 0);
    let line_width = ResolvedFont::Standard(StandardFont::Helvetica).text_width("Total", 12.0);
    // box starts at 100pt and is 300px * 0.5 = 150pt wide
    let right_edge = origins[0].0 + line_width;
    assert!((right_edge - 250.0).abs() < 1e-3, "right edge {}", right_edge);
}

#[test]
fn wrapped_lines_step_down_by_line_height() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("out.pdf");

    export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![annotation("one\ntwo\nthree", 0.0, 0.0)]),
        &ExportOptions::default(),
    )
    .unwrap();

    let baselines: Vec<f64> = text_origins(&std::fs::read(&destination).unwrap(), 0)
        .into_iter()
        .map(|(_, y)| y)
        .collect();
    assert_eq!(baselines.len(), 3);
    assert!((baselines[0] - baselines[1] - 14.4).abs() < 1e-3);
    assert!((baselines[1] - baselines[2] - 14.4).abs() < 1e-3);
}

#[test]
fn other_pages_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let source_bytes = create_test_pdf(3, 500, 700);
    let source = write_fixture(dir.path(), "in.pdf", &source_bytes);
    let destination = dir.path().join("out.pdf");

    export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![annotation("only on page one", 10.0, 10.0)]),
        &ExportOptions::default(),
    )
    .unwrap();

    let before = Document::load_mem(&source_bytes).unwrap();
    let after = Document::load_mem(&std::fs::read(&destination).unwrap()).unwrap();
    assert_eq!(after.get_pages().len(), 3);

    for page_index in 1..3 {
        let id_before = page_object_id(&before, page_index).unwrap();
        let id_after = page_object_id(&after, page_index).unwrap();
        assert_eq!(
            format!("{:?}", before.get_dictionary(id_before).unwrap()),
            format!("{:?}", after.get_dictionary(id_after).unwrap())
        );
        assert_eq!(
            before.get_page_content(id_before).unwrap(),
            after.get_page_content(id_after).unwrap()
        );
    }

    // the shared, inherited resources were copied rather than edited
    let pages_root = before.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
    assert_eq!(
        format!("{:?}", before.get_object(pages_root).unwrap()),
        format!("{:?}", after.get_object(pages_root).unwrap())
    );
}

#[test]
fn invalid_annotations_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("out.pdf");

    let mut infinite = annotation("inf", 0.0, 0.0);
    infinite.y = f64::INFINITY;
    let mut tiny = annotation("tiny", 0.0, 0.0);
    tiny.font_size = 0.0;

    let report = export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![infinite, annotation("kept", 0.0, 0.0), tiny]),
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(report.annotations_drawn, 1);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].reason, SkipReason::NonFinite { field: "y" });
    assert_eq!(report.skipped[1].reason, SkipReason::NonPositiveFontSize(0.0));
}

#[test]
fn unreadable_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.pdf");

    let missing = export_annotated_page(
        &dir.path().join("missing.pdf"),
        &destination,
        &half_scale_overlay(vec![]),
        &ExportOptions::default(),
    );
    assert!(matches!(missing, Err(OverlayError::DocumentUnreadable(_))));

    let garbage = write_fixture(dir.path(), "garbage.pdf", b"%PDF-1.7 nonsense");
    let parsed = export_annotated_page(
        &garbage,
        &destination,
        &half_scale_overlay(vec![]),
        &ExportOptions::default(),
    );
    assert!(matches!(parsed, Err(OverlayError::DocumentUnreadable(_))));
    assert!(!destination.exists());
}

#[test]
fn page_index_out_of_range_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(2, 500, 700));
    let destination = dir.path().join("out.pdf");

    let overlay = PageOverlay::new(2, DisplaySize::width_only(1000.0))
        .with_annotations(vec![annotation("x", 0.0, 0.0)]);
    let result = export_annotated_page(&source, &destination, &overlay, &ExportOptions::default());
    assert!(matches!(result, Err(OverlayError::DocumentUnreadable(_))));
    assert!(!destination.exists());
}

#[test]
fn unwritable_destination_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(1, 500, 700));
    let destination = dir.path().join("no-such-dir").join("out.pdf");

    let result = export_annotated_page(
        &source,
        &destination,
        &half_scale_overlay(vec![annotation("x", 0.0, 0.0)]),
        &ExportOptions::default(),
    );
    assert!(matches!(
        result,
        Err(OverlayError::DestinationUnwritable { .. })
    ));
}

#[test]
fn cancelled_export_writes_nothing_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(2, 500, 700));
    let destination = dir.path().join("out.pdf");
    let token = CancellationToken::new();
    token.cancel();

    let overlays = vec![
        half_scale_overlay(vec![annotation("a", 0.0, 0.0)]),
        PageOverlay::new(1, DisplaySize::width_only(1000.0))
            .with_annotations(vec![annotation("b", 0.0, 0.0)]),
    ];
    let result = export_annotated_pages(
        &source,
        &destination,
        &overlays,
        &ExportOptions::default(),
        &token,
    );

    assert!(matches!(
        result,
        Err(OverlayError::Cancelled { pages_composed: 0 })
    ));
    assert!(!destination.exists());
}

#[test]
fn cancelled_export_commits_when_partial_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let source_bytes = create_test_pdf(2, 500, 700);
    let source = write_fixture(dir.path(), "in.pdf", &source_bytes);
    let destination = dir.path().join("out.pdf");
    let token = CancellationToken::new();
    token.cancel();

    let options = ExportOptions {
        allow_partial: true,
        ..ExportOptions::default()
    };
    let report = export_annotated_pages(
        &source,
        &destination,
        &[half_scale_overlay(vec![annotation("a", 0.0, 0.0)])],
        &options,
        &token,
    )
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(std::fs::read(&destination).unwrap(), source_bytes);
}

#[test]
fn multi_page_export_draws_on_each_page() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_fixture(dir.path(), "in.pdf", &create_test_pdf(3, 500, 700));
    let destination = dir.path().join("out.pdf");

    let overlays = vec![
        half_scale_overlay(vec![annotation("on one", 0.0, 0.0)]),
        PageOverlay::new(2, DisplaySize::new(250.0, 350.0))
            .with_annotations(vec![annotation("on three", 50.0, 0.0)]),
    ];
    let report = export_annotated_pages(
        &source,
        &destination,
        &overlays,
        &ExportOptions::default(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(report.pages_composed, 2);

    let output = std::fs::read(&destination).unwrap();
    assert!(drawn_strings(&output, 0).contains(&"on one".to_string()));
    assert!(!drawn_strings(&output, 1).contains(&"on one".to_string()));
    assert!(drawn_strings(&output, 2).contains(&"on three".to_string()));
    // 250px preview of a 500pt page: two points per pixel
    assert!((text_origins(&output, 2)[0].0 - 100.0).abs() < 1e-3);
}

#[test]
fn session_round_trip_through_preview() {
    let dir = tempfile::tempdir().unwrap();
    let source_bytes = create_test_pdf(1, 612, 792);
    let source = write_fixture(dir.path(), "in.pdf", &source_bytes);
    let destination = dir.path().join("out.pdf");

    let preview = PageRenderer::blank(2.0).render_page(&source, 0, 1.0).unwrap();
    let mut session = EditSession::for_rendered_page(0, &preview);
    session.add_box_at(244.8, 0.0);
    session.set_text("Signed");

    // zooming out afterwards must not move the box on the page
    session.set_display(DisplaySize::new(612.0, 792.0));

    export_annotated_page(
        &source,
        &destination,
        &session.snapshot(),
        &ExportOptions::default(),
    )
    .unwrap();

    let origins = text_origins(&std::fs::read(&destination).unwrap(), 0);
    assert!((origins[0].0 - 122.4).abs() < 1e-3, "{:?}", origins);
}
