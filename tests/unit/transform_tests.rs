// Transformation parser unit tests

use thumbgate::error::ResolveError;
use thumbgate::transform::*;

#[test]
fn test_crop_top_left_webp() {
    let set = parse_transformation("s:300x200/p:crop-top-left/q:80/f:webp").unwrap();

    assert_eq!(set.size, Some(Size::new(300, 200)));
    let policy = set.policy.unwrap();
    assert_eq!(policy.mode, PolicyMode::Crop);
    assert_eq!(policy.valign, VAlign::Top);
    assert_eq!(policy.halign, HAlign::Left);
    assert_eq!(set.quality, Some(80));
    assert_eq!(set.format, Some(ImageFormat::Webp));
}

#[test]
fn test_tokens_are_order_independent() {
    let a = parse_transformation("f:jpeg,q:60,s:50x40,p:fit").unwrap();
    let b = parse_transformation("s:50x40/p:fit/q:60/f:jpeg").unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_policy_defaults_to_top_left() {
    let policy = parse_transformation("s:1x1,p:crop").unwrap().policy.unwrap();
    assert_eq!(policy, Policy::new(PolicyMode::Crop));
    assert_eq!(policy.valign, VAlign::Top);
    assert_eq!(policy.halign, HAlign::Left);
}

#[test]
fn test_no_size_is_malformed_and_fatal() {
    for input in ["", "p:fit", "q:80/f:webp", "e:noise()"] {
        let err = parse_transformation(input).unwrap_err();
        assert!(matches!(err, ResolveError::MalformedTransformation { .. }));
        assert!(err.is_fatal());
        assert_eq!(err.to_http_status(), 400);
    }
}

#[test]
fn test_unknown_effect_is_ignored() {
    let set = parse_transformation("s:1x1,e:sepia(1)").unwrap();
    assert_eq!(set.effect, None);
}

#[test]
fn test_round_corner_effect_keeps_raw_arguments() {
    let set = parse_transformation("s:120x80,e:round_corner(10,255,255,255)").unwrap();
    let effect = set.effect.unwrap();
    assert_eq!(effect.name, EffectName::RoundCorner);
    assert_eq!(effect.args.as_deref(), Some("10,255,255,255"));
}

#[test]
fn test_format_names() {
    for (input, format) in [
        ("s:1x1,f:webp", ImageFormat::Webp),
        ("s:1x1,f:jpeg", ImageFormat::Jpeg),
        ("s:1x1,f:gif", ImageFormat::Gif),
        ("s:1x1,f:png", ImageFormat::Png),
    ] {
        assert_eq!(parse_transformation(input).unwrap().format, Some(format));
    }
}
