//! PCLOUD: minimal PLY point-cloud reader.
//!
//! - Reads the `vertex` element of ASCII or binary little-endian PLY files.
//! - Required properties: `x`, `y`, `z` (any scalar type).
//! - Optional color: `red`/`green`/`blue`, `r`/`g`/`b` or `diffuse_red`/... .
//!   Colors are returned *as stored* (0–255 for byte colors, 0–1 for floats);
//!   normalization is the caller's decision.
//! - Other elements are skipped; list properties are skipped item by item.
//!
//! Header layout (text, one declaration per line):
//!   ply
//!   format ascii 1.0 | format binary_little_endian 1.0
//!   comment ...                          (ignored)
//!   element <name> <count>
//!   property <type> <name>
//!   property list <count-type> <item-type> <name>
//!   end_header
//!
//! Scalar types: char/int8, uchar/uint8, short/int16, ushort/uint16,
//! int/int32, uint/uint32, float/float32, double/float64.

use std::io::{self, ErrorKind};
use std::path::Path;

pub const PLY_MAGIC: &[u8] = b"ply";

/// Body encoding declared by the `format` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    /// Size of one binary value in bytes.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Scalar { name: String, ty: ScalarType },
    List { name: String, count_ty: ScalarType, item_ty: ScalarType },
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Scalar { name, .. } | Property::List { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub count: usize,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub format: Format,
    pub elements: Vec<Element>,
}

/// Decoded point cloud: one entry per vertex.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub positions: Vec<[f32; 3]>,
    /// Raw color values, in whatever range the file stored them.
    pub colors: Option<Vec<[f32; 3]>>,
}

impl PointCloud {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    if buf.len() < n {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PLY body"));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline]
fn le_scalar(buf: &mut &[u8], ty: ScalarType) -> io::Result<f64> {
    let b = take(buf, ty.size())?;
    Ok(match ty {
        ScalarType::I8 => b[0] as i8 as f64,
        ScalarType::U8 => b[0] as f64,
        ScalarType::I16 => i16::from_le_bytes([b[0], b[1]]) as f64,
        ScalarType::U16 => u16::from_le_bytes([b[0], b[1]]) as f64,
        ScalarType::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        ScalarType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        ScalarType::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        ScalarType::F64 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
    })
}

/// Splits the header from the body. Returns the header and the body bytes.
pub fn parse_header(bytes: &[u8]) -> io::Result<(Header, &[u8])> {
    const END: &[u8] = b"end_header";

    let end_pos = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| bad("missing end_header"))?;

    // The body starts after the newline that terminates `end_header`.
    let mut body_start = end_pos + END.len();
    if bytes.get(body_start) == Some(&b'\r') {
        body_start += 1;
    }
    if bytes.get(body_start) == Some(&b'\n') {
        body_start += 1;
    }

    let text = std::str::from_utf8(&bytes[..end_pos]).map_err(|_| bad("header is not UTF-8"))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next().map(str::as_bytes) != Some(PLY_MAGIC) {
        return Err(bad("bad PLY magic"));
    }

    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();

    for line in lines {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("format") => {
                format = Some(match words.next() {
                    Some("ascii") => Format::Ascii,
                    Some("binary_little_endian") => Format::BinaryLittleEndian,
                    Some(other) => return Err(bad(&format!("unsupported PLY format {}", other))),
                    None => return Err(bad("empty format line")),
                });
            }
            Some("comment") | Some("obj_info") => {}
            Some("element") => {
                let name = words.next().ok_or_else(|| bad("element without name"))?;
                let count = words
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| bad("element without count"))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| bad("property before any element"))?;
                let first = words.next().ok_or_else(|| bad("empty property line"))?;
                let property = if first == "list" {
                    let count_ty = words.next().and_then(ScalarType::parse);
                    let item_ty = words.next().and_then(ScalarType::parse);
                    let name = words.next();
                    match (count_ty, item_ty, name) {
                        (Some(count_ty), Some(item_ty), Some(name)) => Property::List {
                            name: name.to_string(),
                            count_ty,
                            item_ty,
                        },
                        _ => return Err(bad("malformed list property")),
                    }
                } else {
                    let ty = ScalarType::parse(first)
                        .ok_or_else(|| bad(&format!("unknown property type {}", first)))?;
                    let name = words.next().ok_or_else(|| bad("property without name"))?;
                    Property::Scalar {
                        name: name.to_string(),
                        ty,
                    }
                };
                element.properties.push(property);
            }
            Some(other) => return Err(bad(&format!("unexpected header keyword {}", other))),
            None => {}
        }
    }

    let format = format.ok_or_else(|| bad("missing format line"))?;

    Ok((Header { format, elements }, &bytes[body_start..]))
}

/// Column indices of the properties we extract from the vertex element.
struct VertexColumns {
    xyz: [usize; 3],
    rgb: Option<[usize; 3]>,
}

fn vertex_columns(element: &Element) -> io::Result<VertexColumns> {
    let find = |names: &[&str]| {
        element
            .properties
            .iter()
            .position(|p| matches!(p, Property::Scalar { .. }) && names.contains(&p.name()))
    };

    let xyz = match (find(&["x"]), find(&["y"]), find(&["z"])) {
        (Some(x), Some(y), Some(z)) => [x, y, z],
        _ => return Err(bad("vertex element lacks x/y/z")),
    };

    let rgb = match (
        find(&["red", "r", "diffuse_red"]),
        find(&["green", "g", "diffuse_green"]),
        find(&["blue", "b", "diffuse_blue"]),
    ) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    Ok(VertexColumns { xyz, rgb })
}

/// Parse a PLY file held in memory. This is the single source of truth for parsing.
pub fn parse_ply_bytes(bytes: &[u8]) -> io::Result<PointCloud> {
    let (header, body) = parse_header(bytes)?;

    let vertex_at = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| bad("no vertex element"))?;

    match header.format {
        Format::BinaryLittleEndian => decode_binary(&header, vertex_at, body),
        Format::Ascii => decode_ascii(&header, vertex_at, body),
    }
}

fn decode_binary(header: &Header, vertex_at: usize, mut p: &[u8]) -> io::Result<PointCloud> {
    // Skip every element declared before the vertices.
    for element in &header.elements[..vertex_at] {
        for _ in 0..element.count {
            skip_binary_record(&mut p, &element.properties)?;
        }
    }

    let vertex = &header.elements[vertex_at];
    let cols = vertex_columns(vertex)?;

    // Fast path: vertex record is exactly `float x, float y, float z`.
    let packed_xyz = vertex.properties.len() == 3
        && cols.xyz == [0, 1, 2]
        && vertex
            .properties
            .iter()
            .all(|p| matches!(p, Property::Scalar { ty: ScalarType::F32, .. }));

    if packed_xyz {
        let n_bytes = vertex
            .count
            .checked_mul(12)
            .ok_or_else(|| bad("vertex block size overflow"))?;
        let raw = take(&mut p, n_bytes)?;

        #[cfg(target_endian = "little")]
        {
            // Only when the body happens to be 4-aligned in memory.
            if let Ok(as_f32x3) = bytemuck::try_cast_slice::<u8, [f32; 3]>(raw) {
                return Ok(PointCloud {
                    positions: as_f32x3.to_vec(),
                    colors: None,
                });
            }
        }

        // Misaligned or big-endian host: portable decode.
        let positions = raw
            .chunks_exact(12)
            .map(|c| {
                [
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                    f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
                ]
            })
            .collect();
        return Ok(PointCloud {
            positions,
            colors: None,
        });
    }

    // The header count is untrusted; reserve only what the body can hold.
    let capacity = vertex.count.min(p.len() / min_record_size(&vertex.properties));
    let mut positions = Vec::with_capacity(capacity);
    let mut colors = cols.rgb.map(|_| Vec::with_capacity(capacity));
    let mut record = vec![0.0f64; vertex.properties.len()];

    for _ in 0..vertex.count {
        for (slot, property) in record.iter_mut().zip(&vertex.properties) {
            *slot = match property {
                Property::Scalar { ty, .. } => le_scalar(&mut p, *ty)?,
                Property::List { count_ty, item_ty, .. } => {
                    let n = le_scalar(&mut p, *count_ty)? as usize;
                    take(&mut p, n.saturating_mul(item_ty.size()))?;
                    0.0
                }
            };
        }
        push_record(&record, &cols, &mut positions, colors.as_mut());
    }

    Ok(PointCloud { positions, colors })
}

/// Smallest encoded size of one record: scalars plus empty lists. Never 0.
fn min_record_size(properties: &[Property]) -> usize {
    let bytes: usize = properties
        .iter()
        .map(|p| match p {
            Property::Scalar { ty, .. } => ty.size(),
            Property::List { count_ty, .. } => count_ty.size(),
        })
        .sum();
    bytes.max(1)
}

fn skip_binary_record(p: &mut &[u8], properties: &[Property]) -> io::Result<()> {
    for property in properties {
        match property {
            Property::Scalar { ty, .. } => {
                take(p, ty.size())?;
            }
            Property::List { count_ty, item_ty, .. } => {
                let n = le_scalar(p, *count_ty)? as usize;
                take(p, n.saturating_mul(item_ty.size()))?;
            }
        }
    }
    Ok(())
}

fn decode_ascii(header: &Header, vertex_at: usize, body: &[u8]) -> io::Result<PointCloud> {
    let text = std::str::from_utf8(body).map_err(|_| bad("ASCII body is not UTF-8"))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    // One record per line in ASCII bodies.
    let skip = header.elements[..vertex_at]
        .iter()
        .fold(0usize, |n, e| n.saturating_add(e.count));
    for _ in 0..skip {
        lines
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "truncated PLY body"))?;
    }

    let vertex = &header.elements[vertex_at];
    let cols = vertex_columns(vertex)?;

    // At most one record per remaining line, whatever the header claims.
    let capacity = vertex.count.min(body.iter().filter(|&&b| b == b'\n').count() + 1);
    let mut positions = Vec::with_capacity(capacity);
    let mut colors = cols.rgb.map(|_| Vec::with_capacity(capacity));
    let mut record = vec![0.0f64; vertex.properties.len()];

    for _ in 0..vertex.count {
        let line = lines
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "truncated PLY body"))?;
        let mut tokens = line.split_whitespace();

        for (slot, property) in record.iter_mut().zip(&vertex.properties) {
            let mut next_number = || -> io::Result<f64> {
                tokens
                    .next()
                    .and_then(|t| t.parse::<f64>().ok())
                    .ok_or_else(|| bad("malformed vertex line"))
            };
            *slot = match property {
                Property::Scalar { .. } => next_number()?,
                Property::List { .. } => {
                    let n = next_number()? as usize;
                    for _ in 0..n {
                        next_number()?;
                    }
                    0.0
                }
            };
        }
        push_record(&record, &cols, &mut positions, colors.as_mut());
    }

    Ok(PointCloud { positions, colors })
}

#[inline]
fn push_record(
    record: &[f64],
    cols: &VertexColumns,
    positions: &mut Vec<[f32; 3]>,
    colors: Option<&mut Vec<[f32; 3]>>,
) {
    positions.push([
        record[cols.xyz[0]] as f32,
        record[cols.xyz[1]] as f32,
        record[cols.xyz[2]] as f32,
    ]);
    if let (Some(colors), Some(rgb)) = (colors, cols.rgb) {
        colors.push([
            record[rgb[0]] as f32,
            record[rgb[1]] as f32,
            record[rgb[2]] as f32,
        ]);
    }
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PointCloud> {
    let file = std::fs::File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_ply_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PointCloud> {
    let bytes = std::fs::read(path)?;
    parse_ply_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_with_byte_colors() {
        let src = b"ply\nformat ascii 1.0\ncomment spirit\nelement vertex 2\n\
property float x\nproperty float y\nproperty float z\n\
property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n\
0 1 2 255 128 0\n-1.5 0.25 3 10 20 30\n";

        let cloud = parse_ply_bytes(src).unwrap();
        assert_eq!(cloud.positions, vec![[0.0, 1.0, 2.0], [-1.5, 0.25, 3.0]]);
        assert_eq!(
            cloud.colors.unwrap(),
            vec![[255.0, 128.0, 0.0], [10.0, 20.0, 30.0]]
        );
    }

    #[test]
    fn ascii_without_color_skips_faces() {
        let src = b"ply\nformat ascii 1.0\nelement vertex 3\n\
property double x\nproperty double y\nproperty double z\n\
element face 1\nproperty list uchar int vertex_indices\nend_header\n\
0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";

        let cloud = parse_ply_bytes(src).unwrap();
        assert_eq!(cloud.len(), 3);
        assert!(cloud.colors.is_none());
    }

    #[test]
    fn binary_mixed_types_and_leading_element() {
        let mut bytes = b"ply\r\nformat binary_little_endian 1.0\r\n\
element camera 1\r\nproperty list uchar float params\r\n\
element vertex 2\r\nproperty float x\r\nproperty float y\r\nproperty float z\r\n\
property float nx\r\nproperty uchar r\r\nproperty uchar g\r\nproperty uchar b\r\n\
end_header\r\n"
            .to_vec();

        // camera: two floats in a list
        bytes.push(2);
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());

        for (xyz, rgb) in [([1.0f32, 2.0, 3.0], [255u8, 0, 7]), ([4.0, 5.0, 6.0], [1, 2, 3])] {
            for v in xyz {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            bytes.extend_from_slice(&0.5f32.to_le_bytes());
            bytes.extend_from_slice(&rgb);
        }

        let cloud = parse_ply_bytes(&bytes).unwrap();
        assert_eq!(cloud.positions, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(cloud.colors.unwrap()[0], [255.0, 0.0, 7.0]);
    }

    #[test]
    fn binary_packed_xyz_fast_path() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
property float x\nproperty float y\nproperty float z\nend_header\n"
            .to_vec();
        for i in 0..9 {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }

        let cloud = parse_ply_bytes(&bytes).unwrap();
        assert_eq!(cloud.positions[2], [6.0, 7.0, 8.0]);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n\
property float x\nproperty float y\nproperty float z\nend_header\n"
            .to_vec();
        bytes.extend_from_slice(&[0u8; 12]);

        let err = parse_ply_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_vertex_count_is_an_error() {
        let ascii = b"ply\nformat ascii 1.0\nelement vertex 18446744073709551615\n\
property float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n";
        assert_eq!(parse_ply_bytes(ascii).unwrap_err().kind(), ErrorKind::UnexpectedEof);

        let mut binary = b"ply\nformat binary_little_endian 1.0\n\
element vertex 18446744073709551615\n\
property float x\nproperty float y\nproperty float z\n\
property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n"
            .to_vec();
        binary.extend_from_slice(&[0u8; 15]);
        assert_eq!(parse_ply_bytes(&binary).unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_leading_element_is_an_error() {
        let src = b"ply\nformat ascii 1.0\nelement camera 18446744073709551615\n\
property float f\nelement vertex 18446744073709551615\n\
property float x\nproperty float y\nproperty float z\nend_header\n1\n";
        assert_eq!(parse_ply_bytes(src).unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn rejects_big_endian_and_missing_xyz() {
        let be = b"ply\nformat binary_big_endian 1.0\nelement vertex 0\nend_header\n";
        assert_eq!(parse_ply_bytes(be).unwrap_err().kind(), ErrorKind::InvalidData);

        let no_z = b"ply\nformat ascii 1.0\nelement vertex 1\n\
property float x\nproperty float y\nend_header\n0 0\n";
        assert_eq!(parse_ply_bytes(no_z).unwrap_err().kind(), ErrorKind::InvalidData);
    }
}
