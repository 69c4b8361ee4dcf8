// Signed backend path unit tests

use thumbgate::signing::*;
use thumbgate::transform::{parse_transformation, DirectiveSet};

const ORIGIN: &str = "https://img.example.com/assets";

fn sign_request(smart: bool) -> SignRequest<'static> {
    SignRequest {
        origin_url: ORIGIN,
        origin_path: "photos/cat.jpg",
        secret: "MY_SECURE_KEY",
        smart,
        result_storage: "results",
    }
}

#[test]
fn test_crop_policy_segment_order() {
    let set = parse_transformation("s:300x200/p:crop-top-left/q:80/f:webp").unwrap();
    let signed = build_signed_path(&set, &sign_request(false)).unwrap();

    assert_eq!(
        signed.unsigned_path,
        "300x200/trim/left/top/filters:quality(80):format(webp)/https://img.example.com/assets/photos/cat.jpg"
    );
    assert_eq!(signed.signature, sign("MY_SECURE_KEY", &signed.unsigned_path));
}

#[test]
fn test_smart_flag_without_filters() {
    let set = parse_transformation("s:0x150").unwrap();
    let signed = build_signed_path(&set, &sign_request(true)).unwrap();

    assert_eq!(
        signed.unsigned_path,
        "0x150/smart/https://img.example.com/assets/photos/cat.jpg"
    );
}

#[test]
fn test_missing_size_is_rejected() {
    let err = build_signed_path(&DirectiveSet::default(), &sign_request(false)).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_cdn_path_uses_sanitized_signature_and_filename() {
    let set = DirectiveSet::with_size(10, 10);
    let signed = build_signed_path(&set, &sign_request(false)).unwrap();

    assert_eq!(
        signed.cdn_relative_path,
        format!("/results/{}/cat.jpg", sanitize_signature(&signed.signature))
    );
    assert!(signed.cdn_relative_path[1..]
        .split('/')
        .nth(1)
        .unwrap()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_'));
}

#[test]
fn test_signing_is_deterministic_and_secret_dependent() {
    let set = parse_transformation("s:64x64,e:brightness(10)").unwrap();
    let a = build_signed_path(&set, &sign_request(false)).unwrap();
    let b = build_signed_path(&set, &sign_request(false)).unwrap();
    assert_eq!(a, b);

    let other = SignRequest {
        secret: "ANOTHER_KEY",
        ..sign_request(false)
    };
    let c = build_signed_path(&set, &other).unwrap();
    assert_eq!(a.unsigned_path, c.unsigned_path);
    assert_ne!(a.signature, c.signature);
}

#[test]
fn test_url_helpers() {
    assert_eq!(join_url("https://a.test/", "/x/y.png"), "https://a.test/x/y.png");
    assert_eq!(filename_of("a/b/c.webp"), "c.webp");
    assert_eq!(filename_of("c.webp"), "c.webp");
    assert_eq!(sanitize_signature("ab-_=cd+/"), "ab_cd_");
    assert_eq!(cdn_public_path("/results/abc/cat.jpg", "results"), "/abc/cat.jpg");
    assert_eq!(cdn_public_path("/other/abc/cat.jpg", "results"), "/other/abc/cat.jpg");
}
