//! Signed backend path construction
//!
//! Turns a parsed [`DirectiveSet`] and an origin image into the canonical
//! path the image backend expects, signs it, and derives the CDN location
//! the backend's result storage will publish the rendered image under.
//!
//! ```text
//! /{signature}/{size}[/{trim|fit-in}/{halign}/{valign}][/smart][/filters:...]/{image_url}
//! ```
//!
//! The segment order and formatting are part of the signature contract:
//! the signature is computed over the exact bytes following the first
//! `/{signature}/`, so any deviation produces a path the backend rejects.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use sha1::Sha1;
use std::sync::OnceLock;

use crate::error::ResolveError;
use crate::transform::{DirectiveSet, PolicyMode};

type HmacSha1 = Hmac<Sha1>;

/// Bytes escaped when a path goes on the wire; `/`, `:` and the other
/// path delimiters stay literal. Non-ASCII is always escaped.
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Matches every maximal run of characters that may not appear in a CDN key
static NON_ALNUM_RUN: OnceLock<Regex> = OnceLock::new();

fn non_alnum_run() -> &'static Regex {
    NON_ALNUM_RUN.get_or_init(|| {
        // Compile-time constant pattern; covered by test_sanitize_signature.
        Regex::new(r"[^a-zA-Z0-9]+").expect("Invalid sanitize regex - this is a compile-time bug")
    })
}

/// Inputs to a signing run besides the directive set
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    /// Fully-qualified project origin, e.g. `https://img.example.com/assets`
    pub origin_url: &'a str,
    /// Image path relative to the origin
    pub origin_path: &'a str,
    /// HMAC key shared with the backend
    pub secret: &'a str,
    /// Content-aware cropping requested by the caller
    pub smart: bool,
    /// Result-storage prefix the backend writes rendered images under
    pub result_storage: &'a str,
}

/// Output of a signing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPath {
    /// `/{signature}/{unsigned_path}`, sent to the backend
    pub backend_path: String,
    /// URL-safe base64 HMAC over `unsigned_path`
    pub signature: String,
    /// `/{result_storage}/{sanitized signature}/{filename}`
    pub cdn_relative_path: String,
    /// Origin URL joined with the origin path
    pub image_url: String,
    /// The exact byte string that was signed
    pub unsigned_path: String,
}

/// Build and sign the backend path for a directive set
///
/// Byte-identical inputs always yield byte-identical output, which is what
/// lets two racing cache misses converge on the same stored row.
pub fn build_signed_path(
    directives: &DirectiveSet,
    request: &SignRequest<'_>,
) -> Result<SignedPath, ResolveError> {
    let size = directives.size.ok_or_else(|| {
        ResolveError::malformed(directives.to_string(), "directive set has no size")
    })?;

    let mut path = format!("{}x{}", size.width, size.height);

    if let Some(policy) = directives.policy {
        let mode = match policy.mode {
            PolicyMode::Fit => "fit-in",
            PolicyMode::Crop => "trim",
        };
        path.push_str(&format!(
            "/{}/{}/{}",
            mode,
            policy.halign.as_str(),
            policy.valign.as_str()
        ));
    }

    if request.smart {
        path.push_str("/smart");
    }

    let filters = filters_segment(directives);
    if !filters.is_empty() {
        path.push_str("/filters");
        path.push_str(&filters);
    }

    let image_url = join_url(request.origin_url, request.origin_path);
    path.push('/');
    path.push_str(&image_url);

    let signature = sign(request.secret, &path);
    let backend_path = format!("/{}/{}", signature, path);
    let cdn_relative_path = format!(
        "/{}/{}/{}",
        request.result_storage.trim_matches('/'),
        sanitize_signature(&signature),
        filename_of(request.origin_path)
    );

    Ok(SignedPath {
        backend_path,
        signature,
        cdn_relative_path,
        image_url,
        unsigned_path: path,
    })
}

/// `:quality(q):format(f):effect(args)` in that fixed order
fn filters_segment(directives: &DirectiveSet) -> String {
    let mut filters = String::new();

    if let Some(quality) = directives.quality {
        filters.push_str(&format!(":quality({})", quality));
    }
    if let Some(format) = directives.format {
        filters.push_str(&format!(":format({})", format.as_str()));
    }
    if let Some(ref effect) = directives.effect {
        match effect.args {
            Some(ref args) => filters.push_str(&format!(":{}({})", effect.name.as_str(), args)),
            None => filters.push_str(&format!(":{}", effect.name.as_str())),
        }
    }

    filters
}

/// HMAC-SHA1 over `message`, URL-safe base64 with padding
pub fn sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    URL_SAFE.encode(mac.finalize().into_bytes())
}

/// Join an origin URL and a relative path with exactly one slash
pub fn join_url(origin: &str, path: &str) -> String {
    format!(
        "{}/{}",
        origin.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Percent-encode a decoded path for use in a request URI or `Location`.
///
/// The signature covers the decoded form; only the wire form is escaped.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPE).to_string()
}

/// Replace each run of non-alphanumeric characters with a single `_`
pub fn sanitize_signature(signature: &str) -> String {
    non_alnum_run().replace_all(signature, "_").into_owned()
}

/// Final path segment, directories discarded
pub fn filename_of(origin_path: &str) -> &str {
    origin_path.rsplit('/').next().unwrap_or(origin_path)
}

/// Path of a stored result on the CDN, which serves result storage at its root
pub fn cdn_public_path(cdn_relative_path: &str, result_storage: &str) -> String {
    let prefix = format!("/{}", result_storage.trim_matches('/'));
    match cdn_relative_path.strip_prefix(&prefix) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => cdn_relative_path.to_string(),
    }
}
