use super::gadget::{descriptors_blob, strings_blob, SetupRequest};

#[test]
fn descriptor_blob_length_field_matches() {
    let blob = descriptors_blob();
    let length = u32::from_le_bytes(blob[4..8].try_into().unwrap());
    assert_eq!(length as usize, blob.len());
    // magic v2, fs+hs flags
    assert_eq!(u32::from_le_bytes(blob[0..4].try_into().unwrap()), 3);
    assert_eq!(u32::from_le_bytes(blob[8..12].try_into().unwrap()), 3);
}

#[test]
fn strings_blob_length_field_matches() {
    let blob = strings_blob();
    let length = u32::from_le_bytes(blob[4..8].try_into().unwrap());
    assert_eq!(length as usize, blob.len());
    assert_eq!(*blob.last().unwrap(), 0);
}

#[test]
fn setup_request_parses_little_endian() {
    let raw = [0xA1, 0x01, 0xF2, 0x03, 0x00, 0x00, 0x40, 0x00];
    let setup = SetupRequest::from_bytes(&raw);
    assert!(setup.is_in());
    assert_eq!(setup.request, 0x01);
    assert_eq!(setup.value, 0x03F2);
    assert_eq!(setup.length, 0x0040);
}
