//! Seam edge detection.
//!
//! A seam edge is a position edge shared by two triangles that address
//! different texture coordinates at one or both of its endpoints. Rendering
//! samples the texture independently on either side, so any colour mismatch
//! between the two UV segments shows up as a visible line on the surface.

use std::collections::BTreeMap;

use log::warn;
use nalgebra::Point2;

use super::textured::TexturedMesh;

/// Texture coordinates closer than this are treated as the same point.
const UV_EPSILON: f64 = 1e-9;

/// An edge that is continuous in 3D but split in UV space.
#[derive(Debug, Clone, PartialEq)]
pub struct SeamEdge {
    /// Position indices of the edge endpoints, ascending.
    pub positions: [usize; 2],
    /// The two faces sharing the edge.
    pub faces: [usize; 2],
    /// UV segment of the first face; `side_a[i]` is the image of `positions[i]`.
    pub side_a: [Point2<f64>; 2],
    /// UV segment of the second face; `side_b[i]` is the image of `positions[i]`.
    pub side_b: [Point2<f64>; 2],
}

/// One face's view of an undirected position edge.
#[derive(Debug, Clone, Copy)]
struct EdgeSide {
    face: usize,
    /// UV of the lower position index.
    uv_lo: Point2<f64>,
    /// UV of the higher position index.
    uv_hi: Point2<f64>,
}

pub(crate) fn find_seam_edges(mesh: &TexturedMesh) -> Vec<SeamEdge> {
    let mut edges: BTreeMap<(usize, usize), Vec<EdgeSide>> = BTreeMap::new();

    for (fi, face) in mesh.faces().iter().enumerate() {
        let uvs = mesh.face_uvs(fi);
        for i in 0..3 {
            let j = (i + 1) % 3;
            let (p0, p1) = (face.positions[i], face.positions[j]);
            if p0 == p1 {
                continue; // Degenerate corner pair
            }
            let side = if p0 < p1 {
                EdgeSide {
                    face: fi,
                    uv_lo: uvs[i],
                    uv_hi: uvs[j],
                }
            } else {
                EdgeSide {
                    face: fi,
                    uv_lo: uvs[j],
                    uv_hi: uvs[i],
                }
            };
            edges.entry((p0.min(p1), p0.max(p1))).or_default().push(side);
        }
    }

    let mut seams = Vec::new();
    for ((lo, hi), sides) in edges {
        match sides.as_slice() {
            [a, b] => {
                if a.face == b.face {
                    continue;
                }
                let split = (a.uv_lo - b.uv_lo).norm() > UV_EPSILON
                    || (a.uv_hi - b.uv_hi).norm() > UV_EPSILON;
                if split {
                    seams.push(SeamEdge {
                        positions: [lo, hi],
                        faces: [a.face, b.face],
                        side_a: [a.uv_lo, a.uv_hi],
                        side_b: [b.uv_lo, b.uv_hi],
                    });
                }
            }
            [_] => {} // Mesh boundary, nothing on the other side
            _ => warn!(
                "edge ({}, {}) has {} incident faces; skipping it as a seam",
                lo,
                hi,
                sides.len()
            ),
        }
    }

    seams
}
