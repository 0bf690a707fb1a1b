//! Overpass QL script templating.

use crate::models::EntityKind;

/// Token replaced by the requested bounding box
pub const BBOX_PLACEHOLDER: &str = "{{bbox}}";

const TIMEOUT_START: &str = "[timeout:";
const OUTPUT_MARKER: &str = "out ";
const DEFAULT_OUTPUT: &str = "out meta;";

/// Build a script for `kind` entities matching every filter clause.
///
/// `way` + `["highway"]` gives `way[highway]({{bbox}});(._;>>;);out meta;`;
/// the recursion clause pulls in the nodes a way references.
pub fn generate_script(kind: EntityKind, filters: &[String]) -> String {
    let mut script = String::from(kind.query_keyword());

    for condition in filters {
        script.push('[');
        script.push_str(condition);
        script.push(']');
    }

    script.push('(');
    script.push_str(BBOX_PLACEHOLDER);
    script.push_str(");");
    script.push_str("(._;>>;);");
    script.push_str(DEFAULT_OUTPUT);

    script
}

pub fn has_placeholder(script: &str) -> bool {
    script.contains(BBOX_PLACEHOLDER)
}

/// Replace an existing `[timeout:..]` value or prepend a new directive.
///
/// An unterminated `[timeout:` is left alone and a fresh directive is prepended.
pub fn apply_timeout(script: &str, timeout_s: u64) -> String {
    if let Some(start) = script.find(TIMEOUT_START) {
        if let Some(len) = script[start..].find(']') {
            let end = start + len;
            return format!(
                "{}{}{}{}",
                &script[..start],
                TIMEOUT_START,
                timeout_s,
                &script[end..]
            );
        }
    }

    format!("{}{}];{}", TIMEOUT_START, timeout_s, script)
}

/// Append `out meta;` unless the literal `out ` is already present.
///
/// Scripts ending in a bare `out;` get a second output statement.
pub fn apply_default_output(script: &str) -> String {
    if script.contains(OUTPUT_MARKER) {
        script.to_string()
    } else {
        format!("{}{}", script, DEFAULT_OUTPUT)
    }
}

/// Substitute every placeholder with `bbox`, or strip it for an unbounded query
pub fn substitute_bbox(script: &str, bbox: Option<&str>) -> String {
    match bbox {
        Some(bbox) => script.replace(BBOX_PLACEHOLDER, bbox),
        None => script
            .replace(&format!("({})", BBOX_PLACEHOLDER), "")
            .replace(BBOX_PLACEHOLDER, ""),
    }
}

/// `south,west,north,east`
pub fn format_bbox(south: f64, west: f64, north: f64, east: f64) -> String {
    format!("{},{},{},{}", south, west, north, east)
}
