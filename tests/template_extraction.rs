use orimatch::{Detector, DetectorConfig, OwnedImage, SourceImage, TemplatePyramid};

/// Gray source with a filled bright square on a dark background.
fn square_source(size: usize, square: (usize, usize, usize)) -> SourceImage {
    let (sx, sy, side) = square;
    let mut data = vec![0u8; size * size];
    for y in sy..sy + side {
        for x in sx..sx + side {
            data[y * size + x] = 255;
        }
    }
    SourceImage::Gray(OwnedImage::from_vec(data, size, size).unwrap())
}

#[test]
fn pyramid_has_one_template_per_level() {
    let cfg = DetectorConfig::default();
    let source = square_source(24, (6, 6, 12));
    let pyramid = TemplatePyramid::build(&source, "square", &cfg).unwrap();

    assert_eq!(pyramid.levels().len(), cfg.num_levels());
    for (level, template) in pyramid.levels().iter().enumerate() {
        assert_eq!(template.pyramid_level, level);
        assert_eq!(template.class_label, "square");
        assert!(!template.features.is_empty());
    }
}

#[test]
fn features_are_bounding_box_relative() {
    let source = square_source(24, (6, 6, 12));
    let pyramid =
        TemplatePyramid::build(&source, "square", &DetectorConfig::default()).unwrap();

    for template in pyramid.levels() {
        let min_x = template.features.iter().map(|f| f.x).min().unwrap();
        let min_y = template.features.iter().map(|f| f.y).min().unwrap();
        assert_eq!(min_x, 0, "level {}", template.pyramid_level);
        assert_eq!(min_y, 0, "level {}", template.pyramid_level);
        assert!(template
            .features
            .iter()
            .all(|f| f.x < template.width && f.y < template.height));
    }
}

#[test]
fn feature_quota_is_respected() {
    let cfg = DetectorConfig {
        max_features_per_level: vec![10, 5],
        ..DetectorConfig::default()
    };
    let source = square_source(24, (6, 6, 12));
    let pyramid = TemplatePyramid::build(&source, "square", &cfg).unwrap();

    assert!(pyramid.level(0).unwrap().features.len() <= 10);
    assert!(pyramid.level(1).unwrap().features.len() <= 5);
}

#[test]
fn every_feature_carries_one_orientation_bit() {
    let source = square_source(24, (6, 6, 12));
    let pyramid =
        TemplatePyramid::build(&source, "square", &DetectorConfig::default()).unwrap();

    for template in pyramid.levels() {
        for feature in &template.features {
            assert_eq!(feature.angle_bits.count_ones(), 1);
            assert!(feature.label() < 8);
        }
    }
}

#[test]
fn coarse_levels_shrink_the_bounding_box() {
    let source = square_source(24, (6, 6, 12));
    let pyramid =
        TemplatePyramid::build(&source, "square", &DetectorConfig::default()).unwrap();

    let fine = pyramid.level(0).unwrap();
    let coarse = pyramid.level(1).unwrap();
    assert!(coarse.width < fine.width);
    assert!(coarse.height < fine.height);
}

#[test]
fn failed_class_does_not_disturb_registered_ones() {
    let mut detector = Detector::with_default_config();
    detector
        .add_class("square", &[square_source(24, (6, 6, 12))])
        .unwrap();

    let blank = SourceImage::Gray(OwnedImage::from_vec(vec![0u8; 24 * 24], 24, 24).unwrap());
    assert!(detector.add_class("blank", &[blank]).is_err());

    assert_eq!(detector.classes().len(), 1);
    assert_eq!(detector.classes()[0].label(), "square");
    assert_eq!(detector.classes()[0].pyramids().len(), 1);
}

#[test]
fn same_label_accumulates_pyramids() {
    let mut detector = Detector::with_default_config();
    let idx_a = detector
        .add_class("square", &[square_source(24, (6, 6, 12))])
        .unwrap();
    let idx_b = detector
        .add_class("square", &[square_source(28, (8, 8, 12))])
        .unwrap();

    assert_eq!(idx_a, idx_b);
    assert_eq!(detector.classes()[idx_a].pyramids().len(), 2);
}
