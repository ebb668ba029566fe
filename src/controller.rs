//! The `<controller>` entity: skin binding data.

use log::warn;
use vecmath::Matrix4;
use xml::Element;

use crate::animated::ValueSlots;
use crate::entity::EntityContent;
use crate::geometry::{get_input, get_input_offset, input_stride, write_input, write_source};
use crate::utils::{
    child_named, get_array_content, get_float_array, get_name_array, join_values,
    new_element, push_child, push_text_child, set_attribute, set_text,
};

/// Weights whose sum lies within this distance of 0 or 1 are left alone.
const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

pub type JointIndex = usize;

/// Influence of one joint over one vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointWeight {
    pub joint: JointIndex,
    pub weight: f32,
}

/// Skin binding data. Matrices are stored row-major, as written in the
/// file.
#[derive(Clone, Debug, PartialEq)]
pub struct Skin {
    /// Url of the skinned geometry, `#id` for a local one.
    pub source: String,
    pub bind_shape_matrix: Matrix4<f32>,
    pub joint_names: Vec<String>,
    pub inverse_bind_poses: Vec<Matrix4<f32>>,
    /// One influence list per vertex of the source geometry.
    pub vertex_weights: Vec<Vec<JointWeight>>,
}

fn identity() -> Matrix4<f32> {
    vecmath::mat4_id()
}

fn matrix_from_slice(values: &[f32]) -> Matrix4<f32> {
    let mut m = [[0.0; 4]; 4];
    for (i, v) in values.iter().take(16).enumerate() {
        m[i / 4][i % 4] = *v;
    }
    m
}

fn matrix_values(m: &Matrix4<f32>) -> Vec<f32> {
    m.iter().flat_map(|row| row.iter().copied()).collect()
}

impl Default for Skin {
    fn default() -> Skin {
        Skin {
            source: String::new(),
            bind_shape_matrix: identity(),
            joint_names: Vec::new(),
            inverse_bind_poses: Vec::new(),
            vertex_weights: Vec::new(),
        }
    }
}

impl Skin {
    /// Scale every vertex's weights to sum to one.
    ///
    /// Vertices whose weights already sum to about one are untouched. So are
    /// vertices whose weights sum to about zero, which are logged. Returns
    /// the number of vertices rescaled.
    pub fn normalize_weights(&mut self) -> usize {
        let mut rescaled = 0;
        let mut unweighted = 0;
        for influences in &mut self.vertex_weights {
            let sum: f32 = influences.iter().map(|w| w.weight).sum();
            if sum.abs() <= WEIGHT_SUM_TOLERANCE {
                unweighted += 1;
                continue;
            }
            if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
                continue;
            }
            for w in influences.iter_mut() {
                w.weight /= sum;
            }
            rescaled += 1;
        }
        if unweighted > 0 {
            warn!("skin of {} has {} vertices without weight", self.source, unweighted);
        }
        rescaled
    }

    /// Keep at most `max` influences per vertex, dropping the lightest and
    /// any below `min_weight`. Remaining weights are renormalized.
    pub fn reduce_influences(&mut self, max: usize, min_weight: f32) {
        for influences in &mut self.vertex_weights {
            influences.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
            influences.retain(|w| w.weight >= min_weight);
            influences.truncate(max);
        }
        self.normalize_weights();
    }

    fn load(skin: &Element) -> Option<Skin> {
        let source = skin.get_attribute("source", None)?.to_string();
        let bind_shape_matrix = match child_named(skin, "bind_shape_matrix") {
            Some(e) => matrix_from_slice(&get_array_content::<f32>(e)?),
            None => identity(),
        };

        let joints = child_named(skin, "joints")?;
        let joint_input = get_input(joints, "JOINT")?;
        let joint_names = get_name_array(skin, joint_input)?;
        let inverse_bind_poses = match get_input(joints, "INV_BIND_MATRIX") {
            Some(input) => get_float_array(skin, input)?
                .chunks_exact(16)
                .map(matrix_from_slice)
                .collect(),
            None => Vec::new(),
        };

        let vertex_weights_element = child_named(skin, "vertex_weights")?;
        let vertex_weights = get_vertex_weights(skin, vertex_weights_element)?;

        Some(Skin {
            source,
            bind_shape_matrix,
            joint_names,
            inverse_bind_poses,
            vertex_weights,
        })
    }

    fn write(&self, controller_id: &str) -> Element {
        let joints_id = format!("{}-joints", controller_id);
        let poses_id = format!("{}-bind_poses", controller_id);
        let weights_id = format!("{}-weights", controller_id);

        let mut skin = new_element("skin");
        set_attribute(&mut skin, "source", self.source.as_str());
        push_text_child(&mut skin, "bind_shape_matrix", join_values(&matrix_values(&self.bind_shape_matrix)));

        let mut name_array = new_element("Name_array");
        set_attribute(&mut name_array, "id", format!("{}-array", joints_id));
        set_attribute(&mut name_array, "count", self.joint_names.len().to_string());
        set_text(&mut name_array, self.joint_names.join(" "));
        let mut joints_source = new_element("source");
        set_attribute(&mut joints_source, "id", joints_id.as_str());
        push_child(&mut joints_source, name_array);
        push_child(&mut skin, joints_source);

        let poses: Vec<f32> = self.inverse_bind_poses.iter().flat_map(matrix_values).collect();
        push_child(&mut skin, write_source(&poses_id, &poses, &["TRANSFORM"]));
        let mut weights = Vec::new();
        let mut v = Vec::new();
        for influences in &self.vertex_weights {
            for w in influences {
                v.push(w.joint);
                v.push(weights.len());
                weights.push(w.weight);
            }
        }
        push_child(&mut skin, write_source(&weights_id, &weights, &["WEIGHT"]));

        let mut joints = new_element("joints");
        push_child(&mut joints, write_input("JOINT", &joints_id, None));
        push_child(&mut joints, write_input("INV_BIND_MATRIX", &poses_id, None));
        push_child(&mut skin, joints);

        let mut vertex_weights = new_element("vertex_weights");
        set_attribute(&mut vertex_weights, "count", self.vertex_weights.len().to_string());
        push_child(&mut vertex_weights, write_input("JOINT", &joints_id, Some(0)));
        push_child(&mut vertex_weights, write_input("WEIGHT", &weights_id, Some(1)));
        let vcount: Vec<usize> = self.vertex_weights.iter().map(Vec::len).collect();
        push_text_child(&mut vertex_weights, "vcount", join_values(&vcount));
        push_text_child(&mut vertex_weights, "v", join_values(&v));
        push_child(&mut skin, vertex_weights);
        skin
    }
}

fn get_vertex_weights(skin: &Element, vertex_weights: &Element) -> Option<Vec<Vec<JointWeight>>> {
    let joint_offset = get_input_offset(vertex_weights, "JOINT")?;
    let weight_offset = get_input_offset(vertex_weights, "WEIGHT")?;
    let weights = get_float_array(skin, get_input(vertex_weights, "WEIGHT")?)?;
    let stride = input_stride(vertex_weights);

    let weights_per_vertex: Vec<usize> = get_array_content(child_named(vertex_weights, "vcount")?)?;
    let joint_weight_indices: Vec<i64> = get_array_content(child_named(vertex_weights, "v")?)?;
    let mut joint_weight_iter = joint_weight_indices.chunks_exact(stride);

    let mut result = Vec::with_capacity(weights_per_vertex.len());
    for count in weights_per_vertex {
        let mut influences = Vec::with_capacity(count);
        for _ in 0..count {
            let pair = joint_weight_iter.next()?;
            let weight = *weights.get(usize::try_from(*pair.get(weight_offset)?).ok()?)?;
            // A joint index of -1 binds to the bind shape itself.
            if let Ok(joint) = usize::try_from(*pair.get(joint_offset)?) {
                influences.push(JointWeight { joint, weight });
            }
        }
        result.push(influences);
    }
    Some(result)
}

/// The `<controller>` entity. Morph controllers are not kept.
#[derive(Clone, Debug, Default)]
pub struct Controller {
    pub skin: Option<Skin>,
}

impl EntityContent for Controller {
    fn load_from_node(&mut self, element: &Element, _slots: &mut ValueSlots) -> bool {
        let skin_element = match child_named(element, "skin") {
            Some(skin) => skin,
            None => {
                self.skin = None;
                return true;
            }
        };
        match Skin::load(skin_element) {
            Some(skin) => {
                self.skin = Some(skin);
                true
            }
            None => {
                warn!("could not read skin of controller {:?}", element.get_attribute("id", None));
                false
            }
        }
    }

    fn write_to_node(&self, element: &mut Element, _slots: &ValueSlots) {
        if let Some(skin) = &self.skin {
            let id = element.get_attribute("id", None).unwrap_or("controller").to_string();
            push_child(element, skin.write(&id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: &str = r##"<controller id="skin1">
        <skin source="#mesh">
            <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
            <source id="skin1-joints"><Name_array count="2">root arm</Name_array></source>
            <source id="skin1-weights"><float_array count="3">0.5 0.25 1</float_array></source>
            <joints><input semantic="JOINT" source="#skin1-joints"/></joints>
            <vertex_weights count="3">
                <input semantic="JOINT" source="#skin1-joints" offset="0"/>
                <input semantic="WEIGHT" source="#skin1-weights" offset="1"/>
                <vcount>2 1 0</vcount>
                <v>0 0 1 1 1 2</v>
            </vertex_weights>
        </skin>
    </controller>"##;

    fn load() -> Controller {
        let element: Element = SKIN.parse().unwrap();
        let mut slots = ValueSlots::new();
        let mut controller = Controller::default();
        assert!(controller.load_from_node(&element, &mut slots));
        controller
    }

    #[test]
    fn test_load_skin() {
        let controller = load();
        let skin = controller.skin.as_ref().unwrap();
        assert_eq!(skin.source, "#mesh");
        assert_eq!(skin.joint_names, vec!["root", "arm"]);
        assert_eq!(skin.vertex_weights.len(), 3);
        assert_eq!(
            skin.vertex_weights[0],
            vec![
                JointWeight { joint: 0, weight: 0.5 },
                JointWeight { joint: 1, weight: 0.25 }
            ]
        );
        assert_eq!(skin.vertex_weights[1], vec![JointWeight { joint: 1, weight: 1.0 }]);
        assert!(skin.vertex_weights[2].is_empty());
    }

    #[test]
    fn test_normalize_leaves_unweighted_vertices() {
        let mut controller = load();
        let skin = controller.skin.as_mut().unwrap();
        assert_eq!(skin.normalize_weights(), 1);
        let sum: f32 = skin.vertex_weights[0].iter().map(|w| w.weight).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(skin.vertex_weights[1][0].weight, 1.0);
        assert!(skin.vertex_weights[2].is_empty());
    }

    #[test]
    fn test_reduce_influences() {
        let mut controller = load();
        let skin = controller.skin.as_mut().unwrap();
        skin.reduce_influences(1, 0.0);
        assert_eq!(skin.vertex_weights[0], vec![JointWeight { joint: 0, weight: 1.0 }]);
    }

    #[test]
    fn test_weight_offset_past_inputs_is_refused() {
        let text = SKIN.replace(
            r##"<input semantic="WEIGHT" source="#skin1-weights" offset="1"/>"##,
            r##"<input semantic="WEIGHT" source="#skin1-weights" offset="3"/>"##,
        );
        let element: Element = text.parse().unwrap();
        let mut controller = Controller::default();
        assert!(!controller.load_from_node(&element, &mut ValueSlots::new()));
        assert!(controller.skin.is_none());
    }

    #[test]
    fn test_write_then_load() {
        let controller = load();
        let mut element = new_element("controller");
        set_attribute(&mut element, "id", "skin1");
        controller.write_to_node(&mut element, &ValueSlots::new());

        let mut reloaded = Controller::default();
        assert!(reloaded.load_from_node(&element, &mut ValueSlots::new()));
        assert_eq!(reloaded.skin, controller.skin);
    }
}
