//! Minimal Wavefront OBJ support for triangle meshes.
//!
//! Reading keeps `v` and `f` records only.  Face tokens may be `i`, `i/t`,
//! `i/t/n` or `i//n`; negative indices count back from the last vertex;
//! polygons are fan-triangulated.

use crate::types::RodError;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

pub fn read_obj<P: AsRef<Path>>(path: P) -> Result<ObjMesh, RodError> {
    let file = File::open(path.as_ref())?;
    parse_obj(BufReader::new(file))
}

pub fn parse_obj<R: BufRead>(reader: R) -> Result<ObjMesh, RodError> {
    let mut mesh = ObjMesh::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords = tokens
                    .map(|s| s.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| RodError::Mesh(format!("line {}: {e}", lineno + 1)))?;
                if coords.len() < 3 {
                    return Err(RodError::Mesh(format!(
                        "line {}: vertex has {} coordinates, mesh must be 3D",
                        lineno + 1,
                        coords.len()
                    )));
                }
                mesh.vertices.push([coords[0], coords[1], coords[2]]);
            }
            Some("f") => {
                let nv = mesh.vertices.len();
                let corners = tokens
                    .map(|tok| face_index(tok, nv))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| RodError::Mesh(format!("line {}: bad face index", lineno + 1)))?;
                if corners.len() < 3 {
                    return Err(RodError::Mesh(format!("line {}: face has fewer than 3 corners", lineno + 1)));
                }
                for k in 1..corners.len() - 1 {
                    mesh.faces.push([corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok(mesh)
}

/// Resolve one face token against `nv` vertices read so far.
fn face_index(token: &str, nv: usize) -> Option<usize> {
    let idx: i64 = token.split('/').next()?.parse().ok()?;
    let resolved = if idx > 0 {
        idx - 1
    } else if idx < 0 {
        nv as i64 + idx
    } else {
        return None;
    };
    (resolved >= 0 && (resolved as usize) < nv).then_some(resolved as usize)
}

pub fn write_obj<P: AsRef<Path>>(path: P, vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Result<(), RodError> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    for v in vertices {
        writeln!(w, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for f in faces {
        writeln!(w, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    w.flush()?;
    Ok(())
}
