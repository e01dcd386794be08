use orimatch::{CancelToken, Detector, OriMatchError, OwnedImage, SourceImage};

/// Gray image with a filled bright square at the given position.
fn square_image(size: usize, sx: usize, sy: usize, side: usize) -> SourceImage {
    let mut data = vec![0u8; size * size];
    for y in sy..sy + side {
        for x in sx..sx + side {
            data[y * size + x] = 255;
        }
    }
    SourceImage::Gray(OwnedImage::from_vec(data, size, size).unwrap())
}

fn square_detector() -> Detector {
    let mut detector = Detector::with_default_config();
    detector
        .add_class("square", &[square_image(24, 6, 6, 12)])
        .unwrap();
    detector
}

#[test]
fn detects_the_trained_shape_near_its_true_position() {
    let detector = square_detector();
    // Same 12x12 square placed at (23, 17) in a 64x64 query; the template
    // bounding box starts one pixel before the square's edge band.
    let query = square_image(64, 23, 17, 12);

    let matches = detector.detect(&query, 60.0).unwrap();
    assert!(!matches.is_empty(), "expected at least one detection");

    let best = matches
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .unwrap();
    assert!(
        (best.x - 22).abs() <= 4 && (best.y - 16).abs() <= 4,
        "best match at ({}, {}) too far from (22, 16)",
        best.x,
        best.y
    );
    assert!(best.score >= 60.0);

    let rect = detector.bounding_rect(best);
    assert_eq!(rect.width, detector.template(best.handle).unwrap().width);
}

#[test]
fn every_reported_score_clears_the_floor() {
    let detector = square_detector();
    let query = square_image(64, 23, 17, 12);

    for min_pct in [30.0f32, 60.0, 80.0] {
        let matches = detector.detect(&query, min_pct).unwrap();
        assert!(
            matches.iter().all(|m| m.score >= min_pct),
            "score below the requested floor at {min_pct}"
        );
    }
}

#[test]
fn blank_query_yields_no_matches() {
    let detector = square_detector();
    let query = SourceImage::Gray(OwnedImage::from_vec(vec![128u8; 64 * 64], 64, 64).unwrap());
    let matches = detector.detect(&query, 50.0).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn template_larger_than_query_is_empty_not_an_error() {
    let detector = square_detector();
    // 8x8 query: the coarse template no longer fits the searchable region.
    let query = square_image(8, 1, 1, 4);
    let matches = detector.detect(&query, 50.0).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn grouping_reduces_duplicate_detections() {
    let detector = square_detector();
    let query = square_image(64, 23, 17, 12);

    let matches = detector.detect(&query, 55.0).unwrap();
    let groups = detector.group_matches(&matches, 0.3, 1);

    assert!(!groups.is_empty());
    let total: usize = groups.iter().map(|g| g.neighbors).sum();
    assert_eq!(total, matches.len(), "every detection lands in one group");
    for group in &groups {
        assert_eq!(group.neighbors, group.detections.len());
        assert!(group.representative.score >= 55.0);
    }
}

#[test]
fn pre_cancelled_token_aborts_detection() {
    let detector = square_detector();
    let query = square_image(64, 23, 17, 12);

    let token = CancelToken::new();
    token.cancel();
    let err = detector
        .detect_with_cancel(&query, 50.0, &token)
        .err()
        .unwrap();
    assert_eq!(err, OriMatchError::Cancelled);
}

#[test]
fn multiple_classes_detect_independently() {
    let mut detector = Detector::with_default_config();
    detector
        .add_class("square", &[square_image(24, 6, 6, 12)])
        .unwrap();

    // Second class: a wide bright bar.
    let mut bar = vec![0u8; 32 * 24];
    for y in 8..16 {
        for x in 4..28 {
            bar[y * 32 + x] = 255;
        }
    }
    detector
        .add_class(
            "bar",
            &[SourceImage::Gray(OwnedImage::from_vec(bar, 32, 24).unwrap())],
        )
        .unwrap();

    let query = square_image(64, 23, 17, 12);
    let matches = detector.detect(&query, 70.0).unwrap();
    assert!(!matches.is_empty());

    // The square class must account for the best detection.
    let best = matches
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .unwrap();
    assert_eq!(detector.classes()[best.handle.class].label(), "square");
}

#[test]
fn rebuilt_detector_from_serialized_templates_detects_the_same() {
    let detector = square_detector();
    let query = square_image(64, 23, 17, 12);
    let direct = detector.detect(&query, 60.0).unwrap();

    let document = orimatch::template::xml::write_class(
        "square",
        detector.classes()[0].pyramids(),
    )
    .unwrap();
    let (label, pyramids) = orimatch::template::xml::read_class(&document).unwrap();

    let mut rebuilt = Detector::with_default_config();
    rebuilt.add_pyramids(&label, pyramids).unwrap();
    let reloaded = rebuilt.detect(&query, 60.0).unwrap();

    assert_eq!(direct.len(), reloaded.len());
    for (a, b) in direct.iter().zip(&reloaded) {
        assert_eq!((a.x, a.y), (b.x, b.y));
        assert!((a.score - b.score).abs() < 1e-5);
    }
}
