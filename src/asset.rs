//! `<asset>` metadata carried by documents and entities.

use xml::Element;

use crate::utils::{child_named, get_text, new_element, push_child, push_text_child, set_attribute};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpAxis {
    X,
    Y,
    Z,
}

impl UpAxis {
    fn name(self) -> &'static str {
        match self {
            UpAxis::X => "X_UP",
            UpAxis::Y => "Y_UP",
            UpAxis::Z => "Z_UP",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub author: Option<String>,
    pub authoring_tool: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub unit_name: String,
    pub unit_meter: f32,
    pub up_axis: UpAxis,
}

impl Default for Asset {
    fn default() -> Asset {
        Asset {
            author: None,
            authoring_tool: None,
            created: None,
            modified: None,
            unit_name: "meter".to_string(),
            unit_meter: 1.0,
            up_axis: UpAxis::Y,
        }
    }
}

impl Asset {
    pub fn load_from_node(element: &Element) -> Asset {
        let mut asset = Asset::default();
        if let Some(contributor) = child_named(element, "contributor") {
            asset.author = child_named(contributor, "author").map(get_text);
            asset.authoring_tool = child_named(contributor, "authoring_tool").map(get_text);
        }
        asset.created = child_named(element, "created").map(get_text);
        asset.modified = child_named(element, "modified").map(get_text);
        if let Some(unit) = child_named(element, "unit") {
            if let Some(name) = unit.get_attribute("name", None) {
                asset.unit_name = name.to_string();
            }
            if let Some(meter) = unit.get_attribute("meter", None).and_then(|m| m.parse().ok()) {
                asset.unit_meter = meter;
            }
        }
        asset.up_axis = match child_named(element, "up_axis").map(get_text).as_deref() {
            Some("X_UP") => UpAxis::X,
            Some("Z_UP") => UpAxis::Z,
            _ => UpAxis::Y,
        };
        asset
    }

    pub fn write_to_node(&self, parent: &mut Element) {
        let mut asset = new_element("asset");
        if self.author.is_some() || self.authoring_tool.is_some() {
            let mut contributor = new_element("contributor");
            if let Some(author) = &self.author {
                push_text_child(&mut contributor, "author", author.as_str());
            }
            if let Some(tool) = &self.authoring_tool {
                push_text_child(&mut contributor, "authoring_tool", tool.as_str());
            }
            push_child(&mut asset, contributor);
        }
        if let Some(created) = &self.created {
            push_text_child(&mut asset, "created", created.as_str());
        }
        if let Some(modified) = &self.modified {
            push_text_child(&mut asset, "modified", modified.as_str());
        }
        let mut unit = new_element("unit");
        set_attribute(&mut unit, "name", self.unit_name.as_str());
        set_attribute(&mut unit, "meter", self.unit_meter.to_string());
        push_child(&mut asset, unit);
        push_text_child(&mut asset, "up_axis", self.up_axis.name());
        push_child(parent, asset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_round_trip() {
        let asset = Asset {
            author: Some("someone".to_string()),
            authoring_tool: None,
            created: Some("2020-01-01T00:00:00Z".to_string()),
            modified: None,
            unit_name: "centimeter".to_string(),
            unit_meter: 0.01,
            up_axis: UpAxis::Z,
        };
        let mut root = new_element("root");
        asset.write_to_node(&mut root);
        let loaded = Asset::load_from_node(child_named(&root, "asset").unwrap());
        assert_eq!(loaded, asset);
    }
}
