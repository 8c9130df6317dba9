//! SVG overlay serializer.
//!
//! Turns a [`FrameOverlay`] into a standalone SVG document in image pixel
//! coordinates, so it can be laid over the source frame. Each measured
//! role becomes a group holding:
//!
//! - a `<path>` along the fitted line, long enough to cross the frame,
//! - a filled `<circle>` on the line's reference point,
//! - a `<text>` caption such as `Line1: 12.500000` at the role's anchor.
//!
//! Unmeasured roles are left out. The document is built with the [`svg`]
//! crate, which also takes care of XML escaping.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Group, Path, Text as Caption, Title};
use svg::node::{Node, Text, Value};

use anglemeter_pipeline::overlay::{FrameOverlay, OverlayLine, RoleOverlay};
use anglemeter_pipeline::{Dimensions, Point};

/// Stroke width of the fitted line, in pixels.
const LINE_WIDTH: u32 = 2;
/// Radius of the reference point marker, in pixels.
const MARKER_RADIUS: u32 = 4;
/// Caption font size, in pixels.
const CAPTION_SIZE: u32 = 20;

/// Metadata to embed in the SVG document.
///
/// All fields are optional. `title` and `description` become `<title>`
/// and `<desc>`; `config_json` is wrapped in a namespaced
/// `<anglemeter:config>` element inside `<metadata>` so overlays carry the
/// settings they were measured with.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub config_json: Option<&'a str>,
}

/// Path data for a two-point segment.
///
/// # Examples
///
/// ```
/// use anglemeter_pipeline::Point;
/// use anglemeter_export::svg::segment_path_data;
///
/// let d = segment_path_data(Point::new(10.0, 20.0), Point::new(30.0, 40.0));
/// assert_eq!(d, "M10,20 L30,40");
/// ```
#[must_use]
pub fn segment_path_data(start: Point, end: Point) -> String {
    let data = Data::new()
        .move_to((start.x, start.y))
        .line_to((end.x, end.y));
    String::from(Value::from(data))
}

fn role_group(role: &RoleOverlay, line: &OverlayLine) -> Group {
    let color = role.color.hex();

    let path = Path::new()
        .set("d", segment_path_data(line.start, line.end))
        .set("fill", "none")
        .set("stroke", color.clone())
        .set("stroke-width", LINE_WIDTH);

    let marker = Circle::new()
        .set("cx", line.reference.x)
        .set("cy", line.reference.y)
        .set("r", MARKER_RADIUS)
        .set("fill", color.clone());

    let mut group = Group::new()
        .set("class", "role")
        .set("data-label", role.label.clone())
        .add(path)
        .add(marker);

    if let Some(caption) = role.caption() {
        group = group.add(
            Caption::new(caption)
                .set("x", role.label_anchor.x)
                .set("y", role.label_anchor.y)
                .set("fill", color)
                .set("font-family", "sans-serif")
                .set("font-size", CAPTION_SIZE),
        );
    }
    group
}

/// Serialize one frame's overlay into an SVG document string.
///
/// The `viewBox` matches `dimensions`, so coordinates are image pixels.
/// Fitted lines extend past the frame edges and are clipped by the
/// viewport.
///
/// # Examples
///
/// ```
/// use anglemeter_pipeline::overlay::{FrameOverlay, RoleOverlay};
/// use anglemeter_pipeline::{Dimensions, FitResult, LineModel, LineRole, Point, Vector};
/// use anglemeter_export::{SvgMetadata, to_overlay_svg};
///
/// let role = &LineRole::default_roles()[0];
/// let model = LineModel::new(Vector::new(0.0, 1.0), Point::new(320.0, 240.0)).unwrap();
/// let result = FitResult::Measured { model, angle: 0.0, inliers: 12 };
/// let overlay = FrameOverlay {
///     frame_index: 0,
///     roles: vec![RoleOverlay::new(role, &result, 2000.0)],
/// };
/// let dims = Dimensions { width: 640, height: 480 };
/// let svg = to_overlay_svg(&overlay, dims, &SvgMetadata::default());
/// assert!(svg.contains("Line1: 0.000000"));
/// assert!(svg.contains(r##"stroke="#0000ff""##));
/// ```
#[must_use]
pub fn to_overlay_svg(
    overlay: &FrameOverlay,
    dimensions: Dimensions,
    metadata: &SvgMetadata<'_>,
) -> String {
    let w = dimensions.width;
    let h = dimensions.height;
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h))
        .set("data-frame", overlay.frame_index);

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("anglemeter:config");
        config_el.assign("xmlns:anglemeter", "urn:anglemeter:config:1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    for role in &overlay.roles {
        if let Some(line) = &role.line {
            doc = doc.add(role_group(role, line));
        }
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
