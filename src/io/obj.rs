//! Wavefront OBJ format support.
//!
//! Only what the seam pipeline needs is read: `v` positions, `vt` texture
//! coordinates and `f` faces with `v/vt` or `v/vt/vn` corners. Polygons are
//! fan-triangulated and negative (relative) indices are resolved. Normals,
//! groups, materials and smoothing groups are ignored.
//!
//! Writing produces a mesh that references a texture through a companion MTL
//! file, so the result of a run can be opened in a viewer as-is.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{Point2, Point3};

use crate::error::{Result, SeamError};
use crate::mesh::{TexturedFace, TexturedMesh};

/// Load a textured mesh from an OBJ file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a line is malformed, a face
/// corner has no texture coordinate or an index is out of range.
///
/// # Example
///
/// ```no_run
/// use texseam::io::obj;
///
/// let mesh = obj::load("model.obj").unwrap();
/// println!("{} faces", mesh.num_faces());
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<TexturedMesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read(BufReader::new(file), path)
}

/// Parse OBJ data from a reader. `path` is only used in error messages.
pub fn read<R: BufRead>(reader: R, path: &Path) -> Result<TexturedMesh> {
    let mut positions: Vec<Point3<f64>> = Vec::new();
    let mut uvs: Vec<Point2<f64>> = Vec::new();
    let mut faces: Vec<TexturedFace> = Vec::new();
    let mut polygon: Vec<(usize, usize)> = Vec::new();

    let parse_error = |line_num: usize, message: String| SeamError::LoadError {
        path: path.to_path_buf(),
        message: format!("line {}: {}", line_num + 1, message),
    };

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "v" => {
                let coords = parse_floats(parts, 3)
                    .map_err(|m| parse_error(line_num, format!("invalid vertex: {}", m)))?;
                positions.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            "vt" => {
                let coords = parse_floats(parts, 2).map_err(|m| {
                    parse_error(line_num, format!("invalid texture coordinate: {}", m))
                })?;
                uvs.push(Point2::new(coords[0], coords[1]));
            }
            "f" => {
                polygon.clear();
                for corner in parts {
                    let mut refs = corner.split('/');
                    let position = refs.next().unwrap_or_default();
                    let position = resolve_index(position, positions.len())
                        .map_err(|m| parse_error(line_num, m))?;
                    let uv = match refs.next() {
                        Some(t) if !t.is_empty() => {
                            resolve_index(t, uvs.len()).map_err(|m| parse_error(line_num, m))?
                        }
                        _ => return Err(SeamError::MissingUvs { face: faces.len() }),
                    };
                    polygon.push((position, uv));
                }

                if polygon.len() < 3 {
                    return Err(parse_error(
                        line_num,
                        "face must have at least 3 corners".to_string(),
                    ));
                }

                // Fan triangulation from the first corner
                for i in 1..polygon.len() - 1 {
                    let corners = [polygon[0], polygon[i], polygon[i + 1]];
                    faces.push(TexturedFace::new(
                        corners.map(|(p, _)| p),
                        corners.map(|(_, t)| t),
                    ));
                }
            }
            _ => {}
        }
    }

    TexturedMesh::new(positions, uvs, faces)
}

fn parse_floats<'a>(
    parts: impl Iterator<Item = &'a str>,
    count: usize,
) -> std::result::Result<Vec<f64>, String> {
    let values: Vec<f64> = parts
        .take(count)
        .map(|s| match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => Err(format!("'{}' is not finite", s)),
            Err(_) => Err(format!("'{}' is not a number", s)),
        })
        .collect::<std::result::Result<_, _>>()?;
    if values.len() < count {
        return Err(format!("expected {} values, found {}", count, values.len()));
    }
    Ok(values)
}

/// Resolve a 1-based or negative OBJ index against the current pool size.
fn resolve_index(token: &str, len: usize) -> std::result::Result<usize, String> {
    let index: i64 = token
        .parse()
        .map_err(|_| format!("'{}' is not an index", token))?;
    let resolved = match index {
        0 => None,
        i if i > 0 => Some(i as usize - 1),
        i => len.checked_sub(i.unsigned_abs() as usize),
    };
    match resolved {
        Some(r) if r < len => Ok(r),
        _ => Err(format!("index {} out of range ({} defined)", index, len)),
    }
}

/// Save a mesh as OBJ with a companion MTL file referencing `texture`.
///
/// The material library is written next to `path` with the same stem and
/// an `.mtl` extension. `texture` is written into the MTL verbatim, so it
/// should be relative to the OBJ's directory. Texture coordinates are
/// written exactly as stored in the mesh.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn save_with_material<P: AsRef<Path>>(
    mesh: &TexturedMesh,
    path: P,
    texture: &str,
) -> Result<()> {
    let path = path.as_ref();
    let mtl_path = path.with_extension("mtl");
    let material = material_name(path);

    let mtl_file_name = mtl_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SeamError::SaveError {
            path: path.to_path_buf(),
            message: "output path has no valid file name".to_string(),
        })?
        .to_string();

    save_mtl(&mtl_path, &material, texture)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Generated by texseam")?;
    writeln!(writer, "mtllib {}", mtl_file_name)?;

    for p in mesh.positions() {
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for uv in mesh.uvs() {
        writeln!(writer, "vt {} {}", uv.x, uv.y)?;
    }

    writeln!(writer, "usemtl {}", material)?;
    for face in mesh.faces() {
        writeln!(
            writer,
            "f {}/{} {}/{} {}/{}",
            face.positions[0] + 1,
            face.uvs[0] + 1,
            face.positions[1] + 1,
            face.uvs[1] + 1,
            face.positions[2] + 1,
            face.uvs[2] + 1
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a single-material MTL file with a diffuse texture map.
pub fn save_mtl<P: AsRef<Path>>(path: P, material: &str, texture: &str) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Generated by texseam")?;
    writeln!(writer, "newmtl {}", material)?;
    writeln!(writer, "Ka 1 1 1")?;
    writeln!(writer, "Kd 1 1 1")?;
    writeln!(writer, "Ks 0 0 0")?;
    writeln!(writer, "illum 1")?;
    writeln!(writer, "map_Kd {}", texture)?;

    writer.flush()?;
    Ok(())
}

fn material_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("material")
        .replace(char::is_whitespace, "_")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use approx::assert_relative_eq;

    use super::*;

    fn parse(text: &str) -> Result<TexturedMesh> {
        read(Cursor::new(text), Path::new("test.obj"))
    }

    const QUAD: &str = "\
# a textured quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl whatever
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_fan_triangulation() {
        let mesh = parse(QUAD).unwrap();
        assert_eq!(mesh.num_positions(), 4);
        assert_eq!(mesh.num_uvs(), 4);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.faces()[1].positions, [0, 2, 3]);
        assert_eq!(mesh.faces()[1].uvs, [0, 2, 3]);
    }

    #[test]
    fn test_negative_indices() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf -3/-3 -2/-2 -1/-1\n";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.faces()[0].positions, [0, 1, 2]);
        assert_eq!(mesh.faces()[0].uvs, [0, 1, 2]);
    }

    #[test]
    fn test_missing_uvs() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert!(matches!(parse(text), Err(SeamError::MissingUvs { face: 0 })));

        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2//1 3/1\n";
        assert!(matches!(parse(text), Err(SeamError::MissingUvs { .. })));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            parse("v 0 zero 0\n"),
            Err(SeamError::LoadError { .. })
        ));
        assert!(matches!(
            parse("v 0 0 0\nvt 0 0\nf 1/1 2/1 3/1\n"),
            Err(SeamError::LoadError { .. })
        ));
        assert!(matches!(parse("# nothing\n"), Err(SeamError::EmptyMesh)));
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt inf 1\nvt 0 1\nf 1/1 2/2 3/3\n";
        match parse(text) {
            Err(SeamError::LoadError { message, .. }) => {
                assert!(message.starts_with("line 5:"), "{}", message)
            }
            other => panic!("expected LoadError, got {:?}", other),
        }
        assert!(matches!(
            parse("v 0 NaN 0\n"),
            Err(SeamError::LoadError { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let obj_path = dir.path().join("quad_s.obj");
        let mesh = parse(QUAD).unwrap();

        save_with_material(&mesh, &obj_path, "quad_s.png").unwrap();

        let mtl = std::fs::read_to_string(dir.path().join("quad_s.mtl")).unwrap();
        assert!(mtl.contains("newmtl quad_s"));
        assert!(mtl.contains("map_Kd quad_s.png"));

        let obj = std::fs::read_to_string(&obj_path).unwrap();
        assert!(obj.contains("mtllib quad_s.mtl"));

        let reloaded = load(&obj_path).unwrap();
        assert_eq!(reloaded.num_faces(), mesh.num_faces());
        assert_eq!(reloaded.faces(), mesh.faces());
        for (a, b) in reloaded.uvs().iter().zip(mesh.uvs()) {
            assert_relative_eq!(a.x, b.x);
            assert_relative_eq!(a.y, b.y);
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load("/nonexistent/path/model.obj"),
            Err(SeamError::Io(_))
        ));
    }
}
