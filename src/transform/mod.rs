//! Transformation micro-language parsing
//!
//! A transformation string is a loose bag of directives, for example
//! `s:300x200,p:crop-top-left,q:80,f:webp,e:brightness(10)`. Each directive
//! type is searched for independently across the whole input; the leftmost
//! occurrence that matches wins and anything unrecognised is ignored.
//!
//! | Directive | Form                                              |
//! |-----------|---------------------------------------------------|
//! | size      | `s:{width}x{height}` (empty side = 0 = auto)      |
//! | policy    | `p:{crop,fit}[-{top,middle,bottom}][-{left,center,right}]` |
//! | quality   | `q:{0-100}`                                       |
//! | format    | `f:{webp,jpeg,gif,png}`                           |
//! | effect    | `e:{name}(args)`                                  |
//!
//! Only the size directive is mandatory.

use std::fmt;
use std::str::FromStr;

use crate::error::ResolveError;

/// Target dimensions, 0 on either side means "auto"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// How the image is fitted into the target size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Crop,
    Fit,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Fit => "fit",
        }
    }
}

/// Vertical anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Middle => "middle",
            Self::Bottom => "bottom",
        }
    }
}

/// Horizontal anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl HAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub mode: PolicyMode,
    pub valign: VAlign,
    pub halign: HAlign,
}

impl Policy {
    pub fn new(mode: PolicyMode) -> Self {
        Self {
            mode,
            valign: VAlign::default(),
            halign: HAlign::default(),
        }
    }
}

/// Output format understood by the backend's `format()` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Webp,
    Jpeg,
    Gif,
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Png => "png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match take_keyword(s, FORMATS) {
            Some((format, "")) => Ok(format),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

/// Backend filters that can be requested with `e:`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectName {
    Brightness,
    Contrast,
    Rgb,
    RoundCorner,
    Noise,
    Watermark,
}

impl EffectName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Rgb => "rgb",
            Self::RoundCorner => "round_corner",
            Self::Noise => "noise",
            Self::Watermark => "watermark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub name: EffectName,
    /// Raw argument list, `None` when the parentheses were empty
    pub args: Option<String>,
}

/// Structured result of parsing a transformation string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectiveSet {
    pub size: Option<Size>,
    pub policy: Option<Policy>,
    pub quality: Option<u8>,
    pub format: Option<ImageFormat>,
    pub effect: Option<Effect>,
}

impl DirectiveSet {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: Some(Size::new(width, height)),
            ..Default::default()
        }
    }
}

/// Canonical transformation string, parses back to the same directive set
impl fmt::Display for DirectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(size) = self.size {
            parts.push(format!("s:{}x{}", size.width, size.height));
        }
        if let Some(policy) = self.policy {
            parts.push(format!(
                "p:{}-{}-{}",
                policy.mode.as_str(),
                policy.valign.as_str(),
                policy.halign.as_str()
            ));
        }
        if let Some(quality) = self.quality {
            parts.push(format!("q:{}", quality));
        }
        if let Some(format) = self.format {
            parts.push(format!("f:{}", format.as_str()));
        }
        if let Some(ref effect) = self.effect {
            parts.push(format!(
                "e:{}({})",
                effect.name.as_str(),
                effect.args.as_deref().unwrap_or_default()
            ));
        }
        write!(f, "{}", parts.join("/"))
    }
}

const POLICY_MODES: &[(&str, PolicyMode)] =
    &[("crop", PolicyMode::Crop), ("fit", PolicyMode::Fit)];

const VALIGNS: &[(&str, VAlign)] = &[
    ("top", VAlign::Top),
    ("middle", VAlign::Middle),
    ("bottom", VAlign::Bottom),
];

const HALIGNS: &[(&str, HAlign)] = &[
    ("left", HAlign::Left),
    ("center", HAlign::Center),
    ("right", HAlign::Right),
];

const FORMATS: &[(&str, ImageFormat)] = &[
    ("webp", ImageFormat::Webp),
    ("jpeg", ImageFormat::Jpeg),
    ("gif", ImageFormat::Gif),
    ("png", ImageFormat::Png),
];

const EFFECTS: &[(&str, EffectName)] = &[
    ("brightness", EffectName::Brightness),
    ("contrast", EffectName::Contrast),
    ("rgb", EffectName::Rgb),
    ("round_corner", EffectName::RoundCorner),
    ("noise", EffectName::Noise),
    ("watermark", EffectName::Watermark),
];

/// Parse a transformation string into a directive set
///
/// Pure and deterministic. Fails only when no usable size directive is
/// present.
pub fn parse_transformation(input: &str) -> Result<DirectiveSet, ResolveError> {
    let size = match find_first(input, "s:", match_size) {
        Some(Ok(size)) => size,
        Some(Err(reason)) => return Err(ResolveError::malformed(input, reason)),
        None => {
            return Err(ResolveError::malformed(
                input,
                "missing size directive (s:{width}x{height})",
            ))
        }
    };

    Ok(DirectiveSet {
        size: Some(size),
        policy: find_first(input, "p:", match_policy),
        quality: find_first(input, "q:", match_quality),
        format: find_first(input, "f:", |rest| take_keyword(rest, FORMATS).map(|(f, _)| f)),
        effect: find_first(input, "e:", match_effect),
    })
}

/// Try `matcher` on the text after each occurrence of `prefix`, leftmost first
fn find_first<T>(input: &str, prefix: &str, matcher: impl Fn(&str) -> Option<T>) -> Option<T> {
    input
        .match_indices(prefix)
        .find_map(|(idx, _)| matcher(&input[idx + prefix.len()..]))
}

fn take_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn take_keyword<'a, T: Copy>(s: &'a str, table: &[(&str, T)]) -> Option<(T, &'a str)> {
    table
        .iter()
        .find_map(|(keyword, value)| s.strip_prefix(keyword).map(|rest| (*value, rest)))
}

fn match_size(rest: &str) -> Option<Result<Size, String>> {
    let (width, rest) = take_digits(rest);
    let rest = rest.strip_prefix('x')?;
    let (height, _) = take_digits(rest);

    Some(parse_dimension(width).and_then(|w| parse_dimension(height).map(|h| Size::new(w, h))))
}

fn parse_dimension(digits: &str) -> Result<u32, String> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|_| format!("dimension {} is out of range", digits))
}

fn match_policy(rest: &str) -> Option<Policy> {
    let (mode, rest) = take_keyword(rest, POLICY_MODES)?;
    let mut policy = Policy::new(mode);

    let rest = rest.strip_prefix('-').unwrap_or(rest);
    let rest = match take_keyword(rest, VALIGNS) {
        Some((valign, rest)) => {
            policy.valign = valign;
            rest
        }
        None => rest,
    };
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    if let Some((halign, _)) = take_keyword(rest, HALIGNS) {
        policy.halign = halign;
    }

    Some(policy)
}

fn match_quality(rest: &str) -> Option<u8> {
    let (digits, _) = take_digits(rest);
    let quality: u32 = digits.parse().ok()?;
    if quality > 100 {
        return None;
    }
    u8::try_from(quality).ok()
}

fn match_effect(rest: &str) -> Option<Effect> {
    let (name, rest) = take_keyword(rest, EFFECTS)?;
    let rest = rest.strip_prefix('(').unwrap_or(rest);
    let close = rest.find(')')?;
    let args = &rest[..close];

    Some(Effect {
        name,
        args: (!args.is_empty()).then(|| args.to_string()),
    })
}
