// Router module - maps request paths to transformation routes

/// Marker segment that turns on content-aware cropping
const SMART_SEGMENT: &str = "smart";

/// A parsed `/{project}/{transformation}[/smart]/{image...}` request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub project_uuid: String,
    /// Percent-decoded transformation string
    pub transformation: String,
    /// Percent-decoded image path relative to the project origin
    pub image: String,
    pub smart: bool,
}

/// Parse a request path into a route.
///
/// Returns `None` when the project, transformation or image is missing.
/// A literal `smart` directly after the transformation sets the smart flag
/// and is not part of the image path.
pub fn parse_route(path: &str) -> Option<Route> {
    let mut parts = path.trim_start_matches('/').splitn(3, '/');
    let project_uuid = parts.next().filter(|s| !s.is_empty())?;
    let transformation = parts.next().filter(|s| !s.is_empty())?;
    let rest = parts.next()?;

    let (smart, image) = match rest.split_once('/') {
        Some((SMART_SEGMENT, image)) => (true, image),
        _ => (false, rest),
    };
    if image.is_empty() {
        return None;
    }

    Some(Route {
        project_uuid: decode(project_uuid),
        transformation: decode(transformation),
        image: decode(image),
        smart,
    })
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
