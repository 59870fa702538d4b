use super::{format_mac, parse_mac, Category, DebugSpec};

#[test]
fn presets_parse() {
    let all = DebugSpec::parse("all").unwrap();
    for category in Category::ALL {
        assert!(all.contains(category), "{} missing from 'all'", category.name());
    }

    let none = DebugSpec::parse("none").unwrap();
    assert_eq!(none, DebugSpec::errors_only());

    let quick = DebugSpec::parse("quick").unwrap();
    assert!(quick.contains(Category::Input));
    assert!(quick.contains(Category::Usb));
    assert!(quick.contains(Category::State));
    assert!(!quick.contains(Category::Lightbar));
}

#[test]
fn category_lists_parse() {
    let spec = DebugSpec::parse("bt, lightbar").unwrap();
    assert!(spec.contains(Category::Bt));
    assert!(spec.contains(Category::Lightbar));
    assert!(!spec.contains(Category::Input));

    // Case is ignored.
    let spec = DebugSpec::parse("INPUT").unwrap();
    assert!(spec.contains(Category::Input));
}

#[test]
fn hex_masks_parse() {
    let spec = DebugSpec::parse("0x05").unwrap();
    assert!(spec.contains(Category::Input));
    assert!(spec.contains(Category::Bt));
    assert!(!spec.contains(Category::Usb));

    // Bits outside the category range fall away.
    let spec = DebugSpec::parse("0xffff").unwrap();
    assert_eq!(spec, DebugSpec::parse("all").unwrap());
}

#[test]
fn bad_specs_are_rejected() {
    assert!(DebugSpec::parse("verbose").is_err());
    assert!(DebugSpec::parse("input,bogus").is_err());
    assert!(DebugSpec::parse("0xzz").is_err());
}

#[test]
fn mac_addresses_round_trip() {
    let mac = parse_mac("00:1b:dc:0f:60:4f").unwrap();
    assert_eq!(mac, [0x00, 0x1B, 0xDC, 0x0F, 0x60, 0x4F]);
    assert_eq!(format_mac(&mac), "00:1b:dc:0f:60:4f");

    assert!(parse_mac("00:1b:dc:0f:60").is_none());
    assert!(parse_mac("00:1b:dc:0f:60:4f:aa").is_none());
    assert!(parse_mac("not-a-mac").is_none());
}
