use std::fmt::Display;
use std::str::FromStr;

use xml::Xml::ElementNode;
use xml::{Element, Xml};

/// Parse a whitespace separated list of values.
///
/// Returns `None` as soon as one token fails to parse, so a malformed array
/// makes the element fail to load instead of aborting the process.
pub fn parse_string_to_vector<T: FromStr>(string: &str) -> Option<Vec<T>> {
    string
        .split_whitespace()
        .map(|s| s.parse().ok())
        .collect()
}

pub fn get_array_content<T: FromStr>(element: &Element) -> Option<Vec<T>> {
    parse_string_to_vector(&element.content_str())
}

pub fn get_text(element: &Element) -> String {
    element.content_str().trim().to_string()
}

pub fn get_float(element: &Element) -> Option<f32> {
    get_text(element).parse().ok()
}

pub fn has_attribute_with_value(e: &Element, name: &str, value: &str) -> bool {
    if let Some(s) = e.get_attribute(name, None) {
        s == value
    } else {
        false
    }
}

/// Iterate over the element children of `e`, whatever their name.
pub fn child_elements(e: &Element) -> impl Iterator<Item = &Element> {
    e.children.iter().filter_map(|node| match node {
        ElementNode(child) => Some(child),
        _ => None,
    })
}

/// Iterate over the element children of `e` called `name`.
///
/// COLLADA keeps every element in its one namespace, so lookups go by local
/// name only.
pub fn children_named<'a>(e: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    child_elements(e).filter(move |child| child.name == name)
}

pub fn child_named<'a>(e: &'a Element, name: &str) -> Option<&'a Element> {
    child_elements(e).find(|child| child.name == name)
}

/// Split a COLLADA url into its document part and its fragment.
///
/// `"#cam"` gives `(None, "cam")`, `"other.dae#cam"` gives
/// `(Some("other.dae"), "cam")` and a url without `#` is taken to be a bare id.
pub fn split_url(url: &str) -> (Option<&str>, &str) {
    match url.find('#') {
        Some(0) => (None, &url[1..]),
        Some(i) => (Some(&url[..i]), &url[i + 1..]),
        None => (None, url),
    }
}

/// The `<source>` child of `container` that `input` reads from.
pub fn get_input_source<'a>(container: &'a Element, input: &Element) -> Option<&'a Element> {
    let (_, source_id) = split_url(input.get_attribute("source", None)?);
    children_named(container, "source").find(|e| has_attribute_with_value(e, "id", source_id))
}

pub fn get_name_array(container: &Element, input: &Element) -> Option<Vec<String>> {
    let source = get_input_source(container, input)?;
    let array = child_elements(source).find(|e| e.name == "Name_array" || e.name == "IDREF_array")?;
    get_array_content(array)
}

pub fn get_float_array(container: &Element, input: &Element) -> Option<Vec<f32>> {
    let source = get_input_source(container, input)?;
    get_array_content(child_named(source, "float_array")?)
}

/// Stride of the accessor reading `source`, one when absent.
pub fn get_accessor_stride(source: &Element) -> usize {
    child_named(source, "technique_common")
        .and_then(|t| child_named(t, "accessor"))
        .and_then(|a| a.get_attribute("stride", None))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}

/// `<extra><technique profile="...">` of `e`.
pub fn get_extra_technique<'a>(e: &'a Element, profile: &str) -> Option<&'a Element> {
    children_named(e, "extra")
        .flat_map(|extra| children_named(extra, "technique"))
        .find(|t| has_attribute_with_value(t, "profile", profile))
}

pub fn new_element(name: &str) -> Element {
    Element::new(name.to_string(), None, Vec::new())
}

pub fn set_attribute(e: &mut Element, name: &str, value: impl Into<String>) {
    e.set_attribute(name.to_string(), None, value.into());
}

pub fn set_text(e: &mut Element, text: impl Into<String>) {
    e.children.push(Xml::CharacterNode(text.into()));
}

pub fn push_child(parent: &mut Element, child: Element) {
    parent.children.push(ElementNode(child));
}

/// Append `<name>text</name>` to `parent`.
pub fn push_text_child(parent: &mut Element, name: &str, text: impl Into<String>) {
    let mut child = new_element(name);
    set_text(&mut child, text);
    push_child(parent, child);
}

pub fn join_values<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_to_vector() {
        let v: Vec<f32> = parse_string_to_vector(" 1 2.5\n -3 ").unwrap();
        assert_eq!(v, vec![1.0, 2.5, -3.0]);
        assert!(parse_string_to_vector::<f32>("1 two 3").is_none());
        assert_eq!(parse_string_to_vector::<usize>("").unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("#cam1"), (None, "cam1"));
        assert_eq!(split_url("b.dae#cam1"), (Some("b.dae"), "cam1"));
        assert_eq!(split_url("cam1"), (None, "cam1"));
    }

    #[test]
    fn test_text_children() {
        let mut root = new_element("root");
        push_text_child(&mut root, "value", join_values(&[1.0f32, 2.5]));
        let value = child_named(&root, "value").unwrap();
        assert_eq!(get_text(value), "1 2.5");
        let parsed: Vec<f32> = get_array_content(value).unwrap();
        assert_eq!(parsed, vec![1.0, 2.5]);
    }
}
