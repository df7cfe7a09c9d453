#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Encodes `text` as UTF-16 with a BOM, little- or big-endian units.
    pub fn write_utf16(&self, name: &str, text: &str, little_endian: bool) -> PathBuf {
        let mut bytes = if little_endian {
            vec![0xFE, 0xFF]
        } else {
            vec![0xFF, 0xFE]
        };
        for unit in text.encode_utf16() {
            if little_endian {
                bytes.extend_from_slice(&unit.to_le_bytes());
            } else {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
        }
        self.write(name, &bytes)
    }
}

/// Splits a page file into its header dict and raw body.
pub fn read_npy(path: &Path) -> (String, Vec<u8>) {
    let bytes = std::fs::read(path).expect("read page");
    assert_eq!(&bytes[..6], b"\x93NUMPY", "bad magic in {path:?}");
    assert_eq!(bytes[6], 1);
    assert_eq!(bytes[7], 0);
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let prelude_len = 10 + header_len;
    assert_eq!(prelude_len % 64, 0, "prelude not 64-aligned in {path:?}");
    assert_eq!(bytes[prelude_len - 1], b'\n');
    let dict = String::from_utf8(bytes[10..prelude_len].to_vec()).expect("ascii header");
    (dict, bytes[prelude_len..].to_vec())
}

pub fn npy_i64_body(path: &Path) -> Vec<i64> {
    let (dict, body) = read_npy(path);
    assert!(dict.contains("'<i8'"), "{dict}");
    body.chunks(8)
        .map(|c| i64::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn npy_f64_body(path: &Path) -> Vec<f64> {
    let (dict, body) = read_npy(path);
    assert!(dict.contains("'<f8'"), "{dict}");
    body.chunks(8)
        .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

/// Decodes a `<Uw>` body back into strings.
pub fn npy_unicode_body(path: &Path) -> Vec<String> {
    let (dict, body) = read_npy(path);
    let width: usize = dict
        .split("'<U")
        .nth(1)
        .and_then(|rest| rest.split('\'').next())
        .expect("unicode dtype")
        .parse()
        .expect("width");
    body.chunks(4 * width)
        .map(|element| {
            element
                .chunks(4)
                .map(|cp| u32::from_le_bytes(cp.try_into().unwrap()))
                .take_while(|&cp| cp != 0)
                .map(|cp| char::from_u32(cp).expect("code point"))
                .collect()
        })
        .collect()
}

/// Minimal Python-object model for the reference unpickler below.
#[derive(Debug, Clone, PartialEq)]
pub enum Py {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Py>),
    List(Vec<Py>),
    Global(String, String),
    /// `callable(*args)` from a REDUCE.
    Reduced(Box<Py>, Box<Py>),
    /// `obj.__setstate__(state)` from a BUILD.
    Built(Box<Py>, Box<Py>),
    Mark,
}

/// Reference loader for exactly the protocol-3 subset the page writer
/// emits. Strict about stack discipline: any malformed stream panics the
/// test.
pub fn unpickle(bytes: &[u8]) -> Py {
    let mut pos = 0usize;
    let mut stack: Vec<Py> = Vec::new();
    let next = |pos: &mut usize, n: usize| {
        let slice = &bytes[*pos..*pos + n];
        *pos += n;
        slice
    };
    assert_eq!(next(&mut pos, 2), b"\x80\x03", "missing PROTO 3");
    loop {
        let opcode = next(&mut pos, 1)[0];
        match opcode {
            b'.' => {
                assert_eq!(stack.len(), 1, "STOP with deep stack");
                return stack.pop().unwrap();
            }
            b'c' => {
                let mut read_line = || {
                    let start = pos;
                    while bytes[pos] != b'\n' {
                        pos += 1;
                    }
                    let text = String::from_utf8(bytes[start..pos].to_vec()).unwrap();
                    pos += 1;
                    text
                };
                let module = read_line();
                let name = read_line();
                stack.push(Py::Global(module, name));
            }
            b'q' => {
                next(&mut pos, 1);
            }
            b'r' => {
                next(&mut pos, 4);
            }
            b'(' => stack.push(Py::Mark),
            b']' => stack.push(Py::List(Vec::new())),
            b'e' => {
                let mark = stack
                    .iter()
                    .rposition(|item| *item == Py::Mark)
                    .expect("APPENDS without MARK");
                let items: Vec<Py> = stack.drain(mark + 1..).collect();
                stack.remove(mark);
                match stack.last_mut() {
                    Some(Py::List(list)) => list.extend(items),
                    other => panic!("APPENDS onto {other:?}"),
                }
            }
            b't' => {
                let mark = stack
                    .iter()
                    .rposition(|item| *item == Py::Mark)
                    .expect("TUPLE without MARK");
                let items: Vec<Py> = stack.drain(mark + 1..).collect();
                stack.remove(mark);
                stack.push(Py::Tuple(items));
            }
            0x85 => {
                let a = stack.pop().unwrap();
                stack.push(Py::Tuple(vec![a]));
            }
            0x86 => {
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                stack.push(Py::Tuple(vec![a, b]));
            }
            0x87 => {
                let c = stack.pop().unwrap();
                let b = stack.pop().unwrap();
                let a = stack.pop().unwrap();
                stack.push(Py::Tuple(vec![a, b, c]));
            }
            b'R' => {
                let args = stack.pop().unwrap();
                let callable = stack.pop().unwrap();
                assert!(matches!(args, Py::Tuple(_)), "REDUCE args not a tuple");
                stack.push(Py::Reduced(Box::new(callable), Box::new(args)));
            }
            b'b' => {
                let state = stack.pop().unwrap();
                let obj = stack.pop().unwrap();
                stack.push(Py::Built(Box::new(obj), Box::new(state)));
            }
            b'N' => stack.push(Py::None),
            0x88 => stack.push(Py::Bool(true)),
            0x89 => stack.push(Py::Bool(false)),
            b'K' => stack.push(Py::Int(next(&mut pos, 1)[0] as i64)),
            b'M' => {
                let v = u16::from_le_bytes(next(&mut pos, 2).try_into().unwrap());
                stack.push(Py::Int(v as i64));
            }
            b'J' => {
                let v = i32::from_le_bytes(next(&mut pos, 4).try_into().unwrap());
                stack.push(Py::Int(v as i64));
            }
            0x8a => {
                let len = next(&mut pos, 1)[0] as usize;
                let raw = next(&mut pos, len);
                let mut buf = [0u8; 8];
                let sign_fill = if raw.last().is_some_and(|b| b & 0x80 != 0) {
                    0xFF
                } else {
                    0x00
                };
                buf.fill(sign_fill);
                buf[..len].copy_from_slice(raw);
                stack.push(Py::Int(i64::from_le_bytes(buf)));
            }
            b'G' => {
                let v = f64::from_be_bytes(next(&mut pos, 8).try_into().unwrap());
                stack.push(Py::Float(v));
            }
            b'X' => {
                let len = u32::from_le_bytes(next(&mut pos, 4).try_into().unwrap()) as usize;
                let text = String::from_utf8(next(&mut pos, len).to_vec()).unwrap();
                stack.push(Py::Str(text));
            }
            b'C' => {
                let len = next(&mut pos, 1)[0] as usize;
                stack.push(Py::Bytes(next(&mut pos, len).to_vec()));
            }
            other => panic!("unsupported opcode {other:#04x} at {}", pos - 1),
        }
    }
}

/// Unpacks an object-page stream down to its element list.
pub fn object_elements(body: &[u8]) -> Vec<Py> {
    let Py::Built(obj, state) = unpickle(body) else {
        panic!("object page did not end in BUILD");
    };
    let Py::Reduced(callable, _) = *obj else {
        panic!("expected a reconstructed ndarray stub");
    };
    assert_eq!(
        *callable,
        Py::Global("numpy.core.multiarray".into(), "_reconstruct".into())
    );
    let Py::Tuple(state) = *state else {
        panic!("ndarray state is not a tuple");
    };
    assert_eq!(state.len(), 5, "ndarray state arity");
    assert_eq!(state[0], Py::Int(1));
    let Py::List(elements) = state[4].clone() else {
        panic!("ndarray data is not a list");
    };
    let Py::Tuple(shape) = &state[1] else {
        panic!("ndarray shape is not a tuple");
    };
    assert_eq!(shape[0], Py::Int(elements.len() as i64));
    elements
}

/// The reduce pattern `datetime.date(payload)` etc., unpacked.
pub fn reduced_datetime(py: &Py) -> Option<(&str, &[u8])> {
    let Py::Reduced(callable, args) = py else {
        return None;
    };
    let Py::Global(module, name) = callable.as_ref() else {
        return None;
    };
    if module != "datetime" {
        return None;
    }
    let Py::Tuple(args) = args.as_ref() else {
        return None;
    };
    let Py::Bytes(payload) = &args[0] else {
        return None;
    };
    Some((name.as_str(), payload.as_slice()))
}
