//! Minimal text mesh format.
//!
//! Two line types are understood:
//!
//! - `v x y z` adds a vertex `[x, y, z, 0, 0]` (position plus zero texcoords)
//! - `f a b c` adds `[a, b, c, 0, 0]` to the index list as written
//!
//! Everything else, including lines whose numbers do not parse, is ignored.
//! Face values are taken verbatim: they are not shifted from one-based to
//! zero-based indices.

use std::str::FromStr;

fn three<T: FromStr>(mut parts: std::str::SplitWhitespace<'_>) -> Option<[T; 3]> {
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    let c = parts.next()?.parse().ok()?;
    Some([a, b, c])
}

/// Parses `text` into interleaved vertices and indices.
pub fn parse(text: &str) -> (Vec<f32>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => match three::<f32>(parts) {
                Some([x, y, z]) => vertices.extend_from_slice(&[x, y, z, 0.0, 0.0]),
                None => log::debug!("skipping malformed vertex on line {}", number + 1),
            },
            Some("f") => match three::<u32>(parts) {
                Some([a, b, c]) => indices.extend_from_slice(&[a, b, c, 0, 0]),
                None => log::debug!("skipping malformed face on line {}", number + 1),
            },
            _ => (),
        }
    }
    (vertices, indices)
}
