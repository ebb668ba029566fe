//! The `<geometry>` entity and its mesh.

use log::warn;
use xml::Element;

use crate::animated::ValueSlots;
use crate::entity::EntityContent;
use crate::utils::{
    child_elements, child_named, children_named, get_array_content, has_attribute_with_value,
    join_values, new_element, push_child, push_text_child, set_attribute, set_text, split_url,
};

/// A single 3-dimensional point on the corner of an object.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A single 3-dimensional normal
pub type Normal = Vertex;

/// A single 2-dimensional point on a texture. "Texture Vertex".
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TVertex {
    pub x: f64,
    pub y: f64,
}

/// An index into the `vertices` array of a mesh.
pub type VertexIndex = usize;

/// An index into the `tex_vertices` array of a mesh.
pub type TextureIndex = usize;

/// An index into the `normals` array of a mesh.
pub type NormalIndex = usize;

/// An index into the vertex array, with optional indices into the texture
/// and normal arrays.
pub type VTNIndex = (VertexIndex, Option<TextureIndex>, Option<NormalIndex>);

/// The shapes a primitive list is made of. Polygons with more than three
/// corners are split into a fan of triangles on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A point specified by its position.
    Point(VTNIndex),
    /// A line specified by its endpoints.
    Line(VTNIndex, VTNIndex),
    /// A triangle specified by its three vertices.
    Triangle(VTNIndex, VTNIndex, VTNIndex),
}

impl Shape {
    fn corners(&self) -> Vec<VTNIndex> {
        match *self {
            Shape::Point(a) => vec![a],
            Shape::Line(a, b) => vec![a, b],
            Shape::Triangle(a, b, c) => vec![a, b, c],
        }
    }
}

/// A list of shapes sharing one material symbol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Primitive {
    pub material: Option<String>,
    pub shapes: Vec<Shape>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub normals: Vec<Normal>,
    pub tex_vertices: Vec<TVertex>,
    pub primitives: Vec<Primitive>,
}

/// The `<geometry>` entity. Only meshes are kept; other geometry kinds load
/// as an empty geometry.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub mesh: Option<Mesh>,
}

const PRIMITIVE_ELEMENTS: &[&str] = &["polylist", "triangles", "polygons"];

pub(crate) fn get_input<'a>(parent: &'a Element, semantic: &str) -> Option<&'a Element> {
    children_named(parent, "input").find(|i| has_attribute_with_value(i, "semantic", semantic))
}

pub(crate) fn get_input_offset(parent: &Element, semantic: &str) -> Option<usize> {
    get_input(parent, semantic)?
        .get_attribute("offset", None)
        .and_then(|offset| offset.parse().ok())
}

/// How many indices each vertex takes in a `<p>` or `<v>` list: one past
/// the largest input offset.
pub(crate) fn input_stride(parent: &Element) -> usize {
    children_named(parent, "input")
        .filter_map(|i| i.get_attribute("offset", None).and_then(|o| o.parse::<usize>().ok()))
        .max()
        .map_or(1, |max| max + 1)
}

/// Follow an input's `source` to the `<source>` element holding its data,
/// chasing through `<vertices>` indirection.
fn get_input_source<'a>(mesh: &'a Element, input: &'a Element) -> Option<&'a Element> {
    let (_, source_id) = split_url(input.get_attribute("source", None)?);
    let element = child_elements(mesh).find(|e| has_attribute_with_value(e, "id", source_id))?;
    if element.name == "source" {
        Some(element)
    } else {
        let input = get_input(element, "POSITION").or_else(|| child_named(element, "input"))?;
        get_input_source(mesh, input)
    }
}

fn get_float_array(mesh: &Element, primitive: &Element, semantic: &str) -> Option<Vec<f64>> {
    let input = get_input(primitive, semantic)?;
    let source = get_input_source(mesh, input)?;
    get_array_content(child_named(source, "float_array")?)
}

fn get_coords_array<T, F>(mesh: &Element, primitive: &Element, stride: usize, semantic: &str, constructor: F) -> Vec<T>
where
    F: Fn(&[f64]) -> T,
{
    match get_float_array(mesh, primitive, semantic) {
        Some(floats) => floats.chunks_exact(stride).map(constructor).collect(),
        None => Vec::new(),
    }
}

fn get_vtn_indices(primitive: &Element) -> Option<Vec<VTNIndex>> {
    let mut indices: Vec<usize> = Vec::new();
    for p in children_named(primitive, "p") {
        indices.extend(get_array_content::<usize>(p)?);
    }
    let input_count = input_stride(primitive);
    let position_offset = get_input_offset(primitive, "VERTEX")?;
    let normal_offset = get_input_offset(primitive, "NORMAL");
    let texcoord_offset = get_input_offset(primitive, "TEXCOORD");

    Some(
        indices
            .chunks_exact(input_count)
            .map(|corner| {
                (
                    corner[position_offset],
                    texcoord_offset.map(|offset| corner[offset]),
                    normal_offset.map(|offset| corner[offset]),
                )
            })
            .collect(),
    )
}

fn get_shapes(primitive: &Element) -> Option<Vec<Shape>> {
    let vtn_indices = get_vtn_indices(primitive)?;
    let vertex_counts: Vec<usize> = match child_named(primitive, "vcount") {
        Some(vcount) => get_array_content(vcount)?,
        None if primitive.name == "triangles" => {
            let count = primitive
                .get_attribute("count", None)
                .and_then(|c| c.parse().ok())
                .unwrap_or(vtn_indices.len() / 3);
            vec![3; count]
        }
        None => children_named(primitive, "p")
            .map(|p| get_array_content::<usize>(p).map_or(0, |v| v.len()))
            .collect(),
    };

    let mut shapes = Vec::new();
    let mut vtn_iter = vtn_indices.into_iter();
    for count in vertex_counts {
        let corners: Vec<VTNIndex> = vtn_iter.by_ref().take(count).collect();
        if corners.len() != count {
            warn!("primitive has fewer indices than its vertex counts require");
            return None;
        }
        match corners.len() {
            0 => {}
            1 => shapes.push(Shape::Point(corners[0])),
            2 => shapes.push(Shape::Line(corners[0], corners[1])),
            n => {
                for i in 1..n - 1 {
                    shapes.push(Shape::Triangle(corners[0], corners[i], corners[i + 1]));
                }
            }
        }
    }
    Some(shapes)
}

impl Mesh {
    fn load(mesh_element: &Element) -> Option<Mesh> {
        let primitive_elements: Vec<&Element> = child_elements(mesh_element)
            .filter(|e| PRIMITIVE_ELEMENTS.contains(&e.name.as_str()))
            .collect();
        let first = *primitive_elements.first()?;

        let vertices = get_coords_array(mesh_element, first, 3, "VERTEX", |coords| Vertex {
            x: coords[0],
            y: coords[1],
            z: coords[2],
        });
        let normals = get_coords_array(mesh_element, first, 3, "NORMAL", |coords| Normal {
            x: coords[0],
            y: coords[1],
            z: coords[2],
        });
        let tex_vertices = get_coords_array(mesh_element, first, 2, "TEXCOORD", |coords| TVertex {
            x: coords[0],
            y: coords[1],
        });

        let mut primitives = Vec::new();
        for element in primitive_elements {
            primitives.push(Primitive {
                material: element.get_attribute("material", None).map(str::to_string),
                shapes: get_shapes(element)?,
            });
        }

        Some(Mesh {
            vertices,
            normals,
            tex_vertices,
            primitives,
        })
    }

    fn write(&self, geometry_id: &str) -> Element {
        let mut mesh = new_element("mesh");
        let positions_id = format!("{}-positions", geometry_id);
        let normals_id = format!("{}-normals", geometry_id);
        let texcoords_id = format!("{}-texcoords", geometry_id);
        let vertices_id = format!("{}-vertices", geometry_id);

        let positions: Vec<f64> = self.vertices.iter().flat_map(|v| vec![v.x, v.y, v.z]).collect();
        push_child(&mut mesh, write_source(&positions_id, &positions, &["X", "Y", "Z"]));
        if !self.normals.is_empty() {
            let normals: Vec<f64> = self.normals.iter().flat_map(|v| vec![v.x, v.y, v.z]).collect();
            push_child(&mut mesh, write_source(&normals_id, &normals, &["X", "Y", "Z"]));
        }
        if !self.tex_vertices.is_empty() {
            let texcoords: Vec<f64> = self.tex_vertices.iter().flat_map(|v| vec![v.x, v.y]).collect();
            push_child(&mut mesh, write_source(&texcoords_id, &texcoords, &["S", "T"]));
        }

        let mut vertices = new_element("vertices");
        set_attribute(&mut vertices, "id", vertices_id.as_str());
        push_child(&mut vertices, write_input("POSITION", &positions_id, None));
        push_child(&mut mesh, vertices);

        for primitive in &self.primitives {
            let with_normals = !self.normals.is_empty();
            let with_texcoords = !self.tex_vertices.is_empty();
            let mut polylist = new_element("polylist");
            set_attribute(&mut polylist, "count", primitive.shapes.len().to_string());
            if let Some(material) = &primitive.material {
                set_attribute(&mut polylist, "material", material.as_str());
            }
            let mut offset = 0;
            push_child(&mut polylist, write_input("VERTEX", &vertices_id, Some(offset)));
            if with_normals {
                offset += 1;
                push_child(&mut polylist, write_input("NORMAL", &normals_id, Some(offset)));
            }
            if with_texcoords {
                offset += 1;
                push_child(&mut polylist, write_input("TEXCOORD", &texcoords_id, Some(offset)));
            }

            let vcount: Vec<usize> = primitive.shapes.iter().map(|s| s.corners().len()).collect();
            let mut p = Vec::new();
            for (position, texcoord, normal) in primitive.shapes.iter().flat_map(Shape::corners) {
                p.push(position);
                if with_normals {
                    p.push(normal.unwrap_or(0));
                }
                if with_texcoords {
                    p.push(texcoord.unwrap_or(0));
                }
            }
            push_text_child(&mut polylist, "vcount", join_values(&vcount));
            push_text_child(&mut polylist, "p", join_values(&p));
            push_child(&mut mesh, polylist);
        }
        mesh
    }
}

pub(crate) fn write_input(semantic: &str, source_id: &str, offset: Option<usize>) -> Element {
    let mut input = new_element("input");
    set_attribute(&mut input, "semantic", semantic);
    set_attribute(&mut input, "source", format!("#{}", source_id));
    if let Some(offset) = offset {
        set_attribute(&mut input, "offset", offset.to_string());
    }
    input
}

/// A `<source>` holding a float array read through an accessor with one
/// named param per component.
pub(crate) fn write_source<T: std::fmt::Display>(id: &str, values: &[T], params: &[&str]) -> Element {
    let array_id = format!("{}-array", id);
    let mut array = new_element("float_array");
    set_attribute(&mut array, "id", array_id.as_str());
    set_attribute(&mut array, "count", values.len().to_string());
    set_text(&mut array, join_values(values));

    let stride = params.len().max(1);
    let mut accessor = new_element("accessor");
    set_attribute(&mut accessor, "source", format!("#{}", array_id));
    set_attribute(&mut accessor, "count", (values.len() / stride).to_string());
    set_attribute(&mut accessor, "stride", stride.to_string());
    for name in params {
        let mut param = new_element("param");
        set_attribute(&mut param, "name", *name);
        set_attribute(&mut param, "type", "float");
        push_child(&mut accessor, param);
    }
    let mut technique = new_element("technique_common");
    push_child(&mut technique, accessor);

    let mut source = new_element("source");
    set_attribute(&mut source, "id", id);
    push_child(&mut source, array);
    push_child(&mut source, technique);
    source
}

impl EntityContent for Geometry {
    fn load_from_node(&mut self, element: &Element, _slots: &mut ValueSlots) -> bool {
        match child_named(element, "mesh") {
            Some(mesh_element) => match Mesh::load(mesh_element) {
                Some(mesh) => {
                    self.mesh = Some(mesh);
                    true
                }
                None => {
                    warn!("could not read mesh of geometry {:?}", element.get_attribute("id", None));
                    false
                }
            },
            None => {
                self.mesh = None;
                true
            }
        }
    }

    fn write_to_node(&self, element: &mut Element, _slots: &ValueSlots) {
        if let Some(mesh) = &self.mesh {
            let id = element.get_attribute("id", None).unwrap_or("geometry").to_string();
            push_child(element, mesh.write(&id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOX_SIDE: &str = r##"<geometry id="quad">
        <mesh>
            <source id="quad-positions">
                <float_array id="quad-positions-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
            </source>
            <source id="quad-normals">
                <float_array id="quad-normals-array" count="3">0 0 1</float_array>
            </source>
            <vertices id="quad-vertices">
                <input semantic="POSITION" source="#quad-positions"/>
            </vertices>
            <polylist material="wood" count="1">
                <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                <input semantic="NORMAL" source="#quad-normals" offset="1"/>
                <vcount>4</vcount>
                <p>0 0 1 0 2 0 3 0</p>
            </polylist>
        </mesh>
    </geometry>"##;

    #[test]
    fn test_load_polylist() {
        let element: Element = BOX_SIDE.parse().unwrap();
        let mut slots = ValueSlots::new();
        let mut geometry = Geometry::default();
        assert!(geometry.load_from_node(&element, &mut slots));

        let mesh = geometry.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.normals.len(), 1);
        assert!(mesh.tex_vertices.is_empty());
        assert_eq!(mesh.primitives.len(), 1);

        let primitive = &mesh.primitives[0];
        assert_eq!(primitive.material.as_deref(), Some("wood"));
        assert_eq!(
            primitive.shapes,
            vec![
                Shape::Triangle((0, None, Some(0)), (1, None, Some(0)), (2, None, Some(0))),
                Shape::Triangle((0, None, Some(0)), (2, None, Some(0)), (3, None, Some(0))),
            ]
        );
    }

    #[test]
    fn test_write_then_load() {
        let element: Element = BOX_SIDE.parse().unwrap();
        let mut slots = ValueSlots::new();
        let mut geometry = Geometry::default();
        assert!(geometry.load_from_node(&element, &mut slots));

        let mut written = new_element("geometry");
        set_attribute(&mut written, "id", "quad");
        geometry.write_to_node(&mut written, &slots);

        let mut reloaded = Geometry::default();
        assert!(reloaded.load_from_node(&written, &mut slots));
        assert_eq!(reloaded.mesh, geometry.mesh);
    }

    #[test]
    fn test_short_index_list_fails() {
        let element: Element = r##"<geometry><mesh>
            <source id="s"><float_array>0 0 0</float_array></source>
            <vertices id="v"><input semantic="POSITION" source="#s"/></vertices>
            <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 0</p></triangles>
        </mesh></geometry>"##
            .parse()
            .unwrap();
        let mut slots = ValueSlots::new();
        let mut geometry = Geometry::default();
        assert!(!geometry.load_from_node(&element, &mut slots));
    }
}
