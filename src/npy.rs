//! Reader for NumPy `.npy` files holding 2D float arrays.
//!
//! Only the subset of the format produced by `np.save` for `float32` and
//! `float64` matrices is understood; `float64` payloads are narrowed to `f32`.

use crate::error::Error;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use ndarray::prelude::*;
use std::io::{Cursor, Read};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32Le,
    F32Be,
    F64Le,
    F64Be,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(Dtype::F32Le),
            ">f4" => Some(Dtype::F32Be),
            "<f8" => Some(Dtype::F64Le),
            ">f8" => Some(Dtype::F64Be),
            _ => None,
        }
    }

    #[inline]
    fn item_size(self) -> usize {
        match self {
            Dtype::F32Le | Dtype::F32Be => 4,
            Dtype::F64Le | Dtype::F64Be => 8,
        }
    }

    fn read_into(self, src: &[u8], dst: &mut Vec<f32>) {
        match self {
            Dtype::F32Le => dst.extend(src.chunks_exact(4).map(LittleEndian::read_f32)),
            Dtype::F32Be => dst.extend(src.chunks_exact(4).map(BigEndian::read_f32)),
            Dtype::F64Le => {
                dst.extend(src.chunks_exact(8).map(|c| LittleEndian::read_f64(c) as f32))
            }
            Dtype::F64Be => dst.extend(src.chunks_exact(8).map(|c| BigEndian::read_f64(c) as f32)),
        }
    }
}

#[derive(Debug)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Pulls the raw text of `'key': value` out of the header dict literal
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let quoted = format!("'{}'", key);
    let start = dict.find(&quoted)? + quoted.len();
    let rest = dict[start..].trim_start().strip_prefix(':')?.trim_start();

    let end = match rest.chars().next()? {
        '(' => rest.find(')')? + 1,
        '\'' => rest[1..].find('\'')? + 2,
        _ => rest.find(|c| c == ',' || c == '}')?,
    };

    Some(rest[..end].trim())
}

fn parse_header(dict: &str, path: &Path) -> Result<Header, Error> {
    let descr = dict_value(dict, "descr")
        .ok_or_else(|| Error::decode(path, "header has no `descr`"))?
        .trim_matches('\'');
    let dtype = Dtype::parse(descr)
        .ok_or_else(|| Error::decode(path, format!("unsupported dtype `{}`", descr)))?;

    let fortran_order = match dict_value(dict, "fortran_order") {
        Some("True") => true,
        Some("False") => false,
        _ => return Err(Error::decode(path, "header has no valid `fortran_order`")),
    };

    let shape = dict_value(dict, "shape")
        .ok_or_else(|| Error::decode(path, "header has no `shape`"))?
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| Error::decode(path, format!("bad shape dimension `{}`", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

/// Decodes an in-memory `.npy` image. `path` is only used for error reporting.
pub fn decode(bytes: &[u8], path: &Path) -> Result<Array2<f32>, Error> {
    let mut cursor = Cursor::new(bytes);
    let eof = |_: std::io::Error| Error::decode(path, "truncated header");

    let mut magic = [0u8; 6];
    cursor.read_exact(&mut magic).map_err(eof)?;
    if &magic != MAGIC {
        return Err(Error::decode(path, "bad magic string"));
    }

    let major = cursor.read_u8().map_err(eof)?;
    let _minor = cursor.read_u8().map_err(eof)?;
    let header_len = match major {
        1 => cursor.read_u16::<LittleEndian>().map_err(eof)? as usize,
        2 | 3 => cursor.read_u32::<LittleEndian>().map_err(eof)? as usize,
        v => return Err(Error::decode(path, format!("unsupported format version {}", v))),
    };

    let offset = cursor.position() as usize;
    let dict = bytes
        .get(offset..offset + header_len)
        .ok_or_else(|| Error::decode(path, "truncated header"))?;
    let dict = std::str::from_utf8(dict).map_err(|_| Error::decode(path, "header is not utf-8"))?;
    let header = parse_header(dict, path)?;

    let (rows, cols) = match *header.shape.as_slice() {
        [rows, cols] => (rows, cols),
        _ => {
            return Err(Error::ShapeMismatch {
                path: path.to_path_buf(),
                shape: header.shape.clone(),
            })
        }
    };

    let count = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::decode(path, "shape too large"))?;
    let expected = count
        .checked_mul(header.dtype.item_size())
        .ok_or_else(|| Error::decode(path, "shape too large"))?;

    let payload = &bytes[offset + header_len..];
    if payload.len() != expected {
        return Err(Error::decode(
            path,
            format!("payload is {} bytes, expected {}", payload.len(), expected),
        ));
    }

    let mut data = Vec::with_capacity(count);
    header.dtype.read_into(payload, &mut data);

    let shape = if header.fortran_order {
        (rows, cols).f()
    } else {
        (rows, cols).into_shape()
    };

    Array2::from_shape_vec(shape, data).map_err(|e| Error::decode(path, e.to_string()))
}

pub fn read(path: impl AsRef<Path>) -> Result<Array2<f32>, Error> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::open(path, e))?;

    decode(&bytes, path)
}

/// Serializes a matrix as a version 1 little-endian `float32` `.npy` image
pub fn encode(arr: ArrayView2<'_, f32>) -> Vec<u8> {
    let (rows, cols) = arr.dim();
    let mut dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );

    // magic + version + length prefix + dict + '\n' is padded to 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    dict.extend(std::iter::repeat(' ').take((64 - unpadded % 64) % 64));
    dict.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + dict.len() + rows * cols * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    for v in arr.iter() {
        out.extend_from_slice(&v.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn raw(descr: &str, fortran: bool, shape: &str, payload: &[u8]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}\n",
            descr,
            if fortran { "True" } else { "False" },
            shape
        );
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn path() -> PathBuf {
        PathBuf::from("test.npy")
    }

    #[test]
    fn decode_encoded() {
        let arr = array![[0.0f32, 1.5, 2.0], [3.0, 4.25, 5.0]];
        let bytes = encode(arr.view());

        assert_eq!((bytes.len() - 6 * 4) % 64, 0);
        assert_eq!(decode(&bytes, &path()).unwrap(), arr);
    }

    #[test]
    fn decode_f8_big_endian() {
        let mut payload = vec![];
        for v in [1.0f64, 2.0, 3.0, 4.0] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let bytes = raw(">f8", false, "(2, 2)", &payload);

        assert_eq!(
            decode(&bytes, &path()).unwrap(),
            array![[1.0f32, 2.0], [3.0, 4.0]]
        );
    }

    #[test]
    fn decode_fortran_order() {
        let mut payload = vec![];
        // column-major [[1, 2, 3], [4, 5, 6]]
        for v in [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let bytes = raw("<f4", true, "(2, 3)", &payload);
        let arr = decode(&bytes, &path()).unwrap();

        assert_eq!(arr, array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(arr[[1, 0]], 4.0);
    }

    #[test]
    fn one_dimensional_is_shape_mismatch() {
        let payload = [0u8; 12];
        let bytes = raw("<f4", false, "(3,)", &payload);

        match decode(&bytes, &path()) {
            Err(Error::ShapeMismatch { shape, .. }) => assert_eq!(shape, vec![3]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_payload_is_decode_error() {
        let bytes = raw("<f4", false, "(2, 2)", &[0u8; 12]);
        assert!(matches!(decode(&bytes, &path()), Err(Error::Decode { .. })));
    }

    #[test]
    fn oversized_shape_is_decode_error() {
        for shape in ["(4611686018427387904, 4)", "(2305843009213693952, 2)"] {
            let bytes = raw("<f4", false, shape, &[0u8; 16]);
            assert!(matches!(decode(&bytes, &path()), Err(Error::Decode { .. })));
        }
    }

    #[test]
    fn unsupported_dtype() {
        let bytes = raw("<i8", false, "(1, 1)", &[0u8; 8]);
        assert!(matches!(decode(&bytes, &path()), Err(Error::Decode { .. })));
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            decode(b"not an npy file at all", &path()),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(decode(b"\x93NU", &path()), Err(Error::Decode { .. })));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read("/definitely/not/here.npy"),
            Err(Error::FileNotFound { .. })
        ));
    }
}
