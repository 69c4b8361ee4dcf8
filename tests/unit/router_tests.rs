// Router module unit tests

use thumbgate::router::{parse_route, Route};

#[test]
fn test_route_with_nested_image_path() {
    assert_eq!(
        parse_route("/4d7c3c9e/s:300x200/p:crop-top-left/q:80/f:webp/cat.jpg"),
        Some(Route {
            project_uuid: "4d7c3c9e".to_string(),
            transformation: "s:300x200".to_string(),
            image: "p:crop-top-left/q:80/f:webp/cat.jpg".to_string(),
            smart: false,
        })
    );
}

#[test]
fn test_route_with_encoded_slashes_in_transformation() {
    let route = parse_route("/4d7c3c9e/s:300x200%2Fp:crop-top-left%2Fq:80/cat.jpg").unwrap();
    assert_eq!(route.transformation, "s:300x200/p:crop-top-left/q:80");
    assert_eq!(route.image, "cat.jpg");
}

#[test]
fn test_route_with_smart_marker() {
    let route = parse_route("/p/s:0x150/smart/gallery/dog.png").unwrap();
    assert!(route.smart);
    assert_eq!(route.image, "gallery/dog.png");
}

#[test]
fn test_incomplete_routes_are_rejected() {
    assert_eq!(parse_route("/"), None);
    assert_eq!(parse_route("/p"), None);
    assert_eq!(parse_route("/p/s:1x1"), None);
    assert_eq!(parse_route("/p/s:1x1/"), None);
    assert_eq!(parse_route("/p/s:1x1/smart/"), None);
    assert_eq!(parse_route("//s:1x1/cat.jpg"), None);
}
