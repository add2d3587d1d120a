//! Recursive flattening of block member trees into dotted paths.

use super::bindings::{MemberInfo, MemberMap, NumericShape};
use super::{MemberTree, MemberType, ScalarKind};

/// Flatten `members` into `out`, prefixing every path with `prefix`.
///
/// Nested structs recurse with absolute offsets (`base_offset + member.offset`).
/// Arrays are skipped. Only float scalars, float vectors and 4x4 float
/// matrices are recorded; any other numeric shape is skipped with a warning.
/// Skipped members never invalidate the enclosing binding.
///
/// Member paths are expected to be unique within one block; if they are not,
/// the last one visited wins.
pub fn flatten_members(prefix: &str, base_offset: u32, members: &[MemberTree], out: &mut MemberMap) {
    for member in members {
        let path = if prefix.is_empty() {
            member.name.clone()
        } else {
            format!("{prefix}.{}", member.name)
        };
        let offset = base_offset + member.offset;

        match &member.ty {
            MemberType::Struct(children) => flatten_members(&path, offset, children, out),
            MemberType::Array { length, .. } => {
                log::debug!("Skipping array member '{path}' (length {length:?})");
            }
            ty => match parameter_shape(ty) {
                Some(shape) => {
                    let info = MemberInfo::new(offset, shape.byte_size(), shape);
                    if out.insert(path.clone(), info).is_some() {
                        log::debug!("Duplicate member path '{path}', keeping the last one");
                    }
                }
                None => log::warn!("Skipping member '{path}': unsupported numeric shape {ty:?}"),
            },
        }
    }
}

/// Shape of a member that can be written through the material API.
fn parameter_shape(ty: &MemberType) -> Option<NumericShape> {
    match *ty {
        MemberType::Scalar(ScalarKind::Float) => Some(NumericShape::Float),
        MemberType::Vector {
            kind: ScalarKind::Float,
            components,
        } => NumericShape::from_components(components),
        MemberType::Matrix {
            kind: ScalarKind::Float,
            columns: 4,
            rows: 4,
        } => Some(NumericShape::Mat4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_block() {
        let members = vec![
            MemberTree::float("tint_r", 0),
            MemberTree::float("tint_g", 4),
            MemberTree::float("tint_b", 8),
        ];
        let mut out = MemberMap::new();
        flatten_members("Material", 0, &members, &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out["Material.tint_g"].offset, 4);
        assert_eq!(out["Material.tint_b"].shape, NumericShape::Float);
    }

    #[test]
    fn test_nested_struct_offsets_are_absolute() {
        let members = vec![
            MemberTree::mat4("model", 0),
            MemberTree::structure(
                "light",
                64,
                vec![
                    MemberTree::vector("color", 0, 3),
                    MemberTree::structure("falloff", 16, vec![MemberTree::float("radius", 4)]),
                ],
            ),
        ];
        let mut out = MemberMap::new();
        flatten_members("Object", 0, &members, &mut out);

        assert_eq!(out["Object.model"], MemberInfo::new(0, 64, NumericShape::Mat4));
        assert_eq!(out["Object.light.color"], MemberInfo::new(64, 12, NumericShape::Vec3));
        assert_eq!(out["Object.light.falloff.radius"].offset, 84);
    }

    #[test]
    fn test_arrays_and_unsupported_shapes_are_skipped() {
        let members = vec![
            MemberTree::new(
                "weights",
                0,
                MemberType::Array {
                    element: Box::new(MemberType::Scalar(ScalarKind::Float)),
                    length: Some(4),
                    stride: 16,
                },
            ),
            MemberTree::new("count", 64, MemberType::Scalar(ScalarKind::Uint)),
            MemberTree::new(
                "normal_matrix",
                80,
                MemberType::Matrix {
                    kind: ScalarKind::Float,
                    columns: 3,
                    rows: 3,
                },
            ),
            MemberTree::vector("color", 128, 4),
        ];
        let mut out = MemberMap::new();
        flatten_members("Block", 0, &members, &mut out);

        assert_eq!(out.len(), 1);
        assert!(out.contains_key("Block.color"));
    }

    #[test]
    fn test_empty_prefix() {
        let mut out = MemberMap::new();
        flatten_members("", 16, &[MemberTree::vector("offset", 0, 2)], &mut out);
        assert_eq!(out["offset"].offset, 16);
    }
}
