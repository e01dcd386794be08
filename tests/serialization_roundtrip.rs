use orimatch::template::xml::{
    read_class, read_class_file, read_class_files, write_class, write_class_file,
};
use orimatch::{DetectorConfig, Feature, OwnedImage, SourceImage, Template, TemplatePyramid};

fn pyramid_from_features(label: &str, features: Vec<Feature>) -> TemplatePyramid {
    let max_x = features.iter().map(|f| f.x).max().unwrap();
    let max_y = features.iter().map(|f| f.y).max().unwrap();
    let levels = (0..2)
        .map(|level| Template {
            class_label: label.to_owned(),
            pyramid_level: level,
            width: max_x + 1,
            height: max_y + 1,
            features: features.clone(),
            additional_data: None,
        })
        .collect();
    TemplatePyramid::from_levels(levels).unwrap()
}

#[test]
fn roundtrip_reproduces_features_size_and_label() {
    // Features (3,5,bit=4) and (10,2,bit=1), i.e. labels 2 and 0.
    let features = vec![
        Feature { x: 3, y: 5, angle_bits: 4 },
        Feature { x: 10, y: 2, angle_bits: 1 },
    ];
    let pyramid = pyramid_from_features("gear", features);

    let document = write_class("gear", std::slice::from_ref(&pyramid)).unwrap();
    let (label, restored) = read_class(&document).unwrap();

    assert_eq!(label, "gear");
    assert_eq!(restored.len(), 1);
    for (orig, back) in pyramid.levels().iter().zip(restored[0].levels()) {
        assert_eq!(back.features, orig.features);
        assert_eq!((back.width, back.height), (orig.width, orig.height));
        assert_eq!(back.class_label, orig.class_label);
        assert_eq!(back.pyramid_level, orig.pyramid_level);
    }
}

#[test]
fn angle_label_attribute_stores_bucket_index_not_bits() {
    let features = vec![Feature { x: 1, y: 2, angle_bits: 1 << 6 }];
    let pyramid = pyramid_from_features("gear", features);
    let document = write_class("gear", std::slice::from_ref(&pyramid)).unwrap();

    assert!(document.contains(r#"AngleLabel="6""#));
    assert!(!document.contains(r#"AngleLabel="64""#));
}

#[test]
fn extracted_pyramids_survive_the_roundtrip() {
    let mut data = vec![0u8; 32 * 32];
    for y in 8..24 {
        for x in 8..24 {
            data[y * 32 + x] = 255;
        }
    }
    let source = SourceImage::Gray(OwnedImage::from_vec(data, 32, 32).unwrap());
    let pyramid =
        TemplatePyramid::build(&source, "square", &DetectorConfig::default()).unwrap();

    let document = write_class("square", std::slice::from_ref(&pyramid)).unwrap();
    let (label, restored) = read_class(&document).unwrap();
    assert_eq!(label, "square");
    assert_eq!(restored, vec![pyramid]);
}

#[test]
fn file_and_batch_loading() {
    let dir = std::env::temp_dir().join("orimatch-roundtrip-test");
    std::fs::create_dir_all(&dir).unwrap();

    let gear = pyramid_from_features(
        "gear",
        vec![Feature { x: 0, y: 0, angle_bits: 1 }, Feature { x: 60, y: 0, angle_bits: 2 }],
    );
    let bolt = pyramid_from_features(
        "bolt",
        vec![Feature { x: 0, y: 0, angle_bits: 8 }, Feature { x: 0, y: 55, angle_bits: 16 }],
    );

    let gear_path = dir.join("gear.xml");
    let bolt_path = dir.join("bolt.xml");
    write_class_file(&gear_path, "gear", std::slice::from_ref(&gear)).unwrap();
    write_class_file(&bolt_path, "bolt", std::slice::from_ref(&bolt)).unwrap();

    let (label, restored) = read_class_file(&gear_path).unwrap();
    assert_eq!(label, "gear");
    assert_eq!(restored, vec![gear.clone()]);

    let batch = read_class_files(&[gear_path, bolt_path]).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].0, "gear");
    assert_eq!(batch[1].0, "bolt");
    assert_eq!(batch[0].1, vec![gear]);
    assert_eq!(batch[1].1, vec![bolt]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn malformed_document_fails_without_partial_results() {
    let document = r#"<TemplatePyramidClass classLabel="gear" numOfTemplatePyrs="1">
          <TemplatePyramid>
            <Template width="4" height="4" pyramidLevel="0" numOfFeatures="2">
              <Feature X="1" Y="2" AngleLabel="3"/>
            </Template>
          </TemplatePyramid>
        </TemplatePyramidClass>"#;
    // Declared two features, carries one.
    assert!(read_class(document).is_err());
}
