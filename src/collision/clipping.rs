use glam::Vec2;

use super::contact::{ContactFeature, FeatureType};

/// Incident-edge endpoint carried through clipping together with its feature id.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactFeature,
}

/// Clips a segment against the half-plane `dot(normal, x) <= offset`.
///
/// Returns `None` when fewer than two points survive. A point created on the
/// clip line is tagged with `vertex_index_a`, the reference vertex owning that
/// side plane.
pub fn clip_segment_to_line(
    input: [ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> Option<[ClipVertex; 2]> {
    let mut output = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(input[0].v) - offset;
    let distance1 = normal.dot(input[1].v) - offset;

    if distance0 <= 0.0 {
        output[count] = input[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        output[count] = input[1];
        count += 1;
    }

    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        output[count] = ClipVertex {
            v: input[0].v + (input[1].v - input[0].v) * interp,
            id: ContactFeature::new(
                vertex_index_a,
                FeatureType::Vertex,
                input[0].id.index_b as usize,
                FeatureType::Face,
            ),
        };
        count += 1;
    }

    (count == 2).then_some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, index_b: usize) -> ClipVertex {
        ClipVertex {
            v: Vec2::new(x, 0.0),
            id: ContactFeature::new(0, FeatureType::Face, index_b, FeatureType::Vertex),
        }
    }

    #[test]
    fn segment_inside_is_unchanged() {
        let input = [vertex(-1.0, 0), vertex(1.0, 1)];
        let out = clip_segment_to_line(input, Vec2::X, 2.0, 5).expect("two points");
        assert_eq!(out, input);
    }

    #[test]
    fn crossing_segment_gets_new_feature() {
        let input = [vertex(-1.0, 0), vertex(1.0, 1)];
        let out = clip_segment_to_line(input, Vec2::X, 0.5, 3).expect("two points");
        assert_eq!(out[0], input[0]);
        assert!((out[1].v.x - 0.5).abs() < 1e-6);
        assert_eq!(out[1].id.index_a, 3);
        assert_eq!(out[1].id.type_a, FeatureType::Vertex);
        assert_eq!(out[1].id.type_b, FeatureType::Face);
    }

    #[test]
    fn segment_outside_is_rejected() {
        let input = [vertex(1.0, 0), vertex(2.0, 1)];
        assert!(clip_segment_to_line(input, Vec2::X, 0.5, 0).is_none());
    }
}
