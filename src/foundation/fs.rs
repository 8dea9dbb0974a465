use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::foundation::error::{ReportError, ReportResult};

const TAIL_CHUNK: u64 = 4096;

/// Read the last non-blank line of a text file by seeking backwards from the end.
///
/// Trailing newlines, `\r` and whitespace-only lines are skipped. Returns `None` for a file
/// with no non-blank line.
pub fn read_last_line(path: &Path) -> ReportResult<Option<String>> {
    let mut f = File::open(path).map_err(|e| open_error(path, e))?;
    let len = f.metadata().map_err(|e| ReportError::io(path, e))?.len();

    let mut tail: Vec<u8> = Vec::new();
    let mut pos = len;
    loop {
        if let Some(line) = last_nonblank_line(&tail, pos == 0) {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            return Ok(Some(String::from_utf8_lossy(line).into_owned()));
        }
        if pos == 0 {
            return Ok(None);
        }

        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        let mut chunk = vec![0u8; step as usize];
        f.seek(SeekFrom::Start(pos))
            .and_then(|_| f.read_exact(&mut chunk))
            .map_err(|e| ReportError::io(path, e))?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
    }
}

/// Find the last non-blank line in `buf`. A line not preceded by `\n` only counts when
/// `complete` says `buf` starts at the beginning of the file.
fn last_nonblank_line(buf: &[u8], complete: bool) -> Option<&[u8]> {
    let mut end = buf.len();
    loop {
        match buf[..end].iter().rposition(|&b| b == b'\n') {
            Some(nl) => {
                let line = &buf[nl + 1..end];
                if !is_blank(line) {
                    return Some(line);
                }
                end = nl;
            }
            None => {
                let line = &buf[..end];
                return (complete && !is_blank(line)).then_some(line);
            }
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Map an open failure to `NotFound` when the file is absent, `Io` otherwise.
pub fn open_error(path: &Path, e: std::io::Error) -> ReportError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ReportError::not_found(path)
    } else {
        ReportError::io(path, e)
    }
}

/// Directory a sibling temp file for `path` should live in.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create a temp file next to `dest` whose name ends in `suffix` (e.g. `".png"`), so tools
/// that infer the format from the extension still work.
pub fn temp_sibling(dest: &Path, suffix: &str) -> ReportResult<NamedTempFile> {
    let dir = parent_dir(dest);
    tempfile::Builder::new()
        .prefix(".lbreport-")
        .suffix(suffix)
        .tempfile_in(&dir)
        .map_err(|e| ReportError::io(&dir, e))
}

/// Atomically move a finished temp file onto `dest`.
pub fn persist(tmp: NamedTempFile, dest: &Path) -> ReportResult<()> {
    tmp.persist(dest)
        .map(|_| ())
        .map_err(|e| ReportError::io(dest, e.error))
}

/// Write `bytes` to `path` via write-then-rename; an interrupted write never leaves a
/// truncated file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ReportResult<()> {
    let mut tmp = temp_sibling(path, "")?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| ReportError::io(tmp.path(), e))?;
    persist(tmp, path)
}

pub fn ensure_dir(dir: &Path) -> ReportResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn last_line_ignores_trailing_newlines_and_crlf() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a.txt", "0\t0\n9\t4\t1.5\n");
        let b = write(tmp.path(), "b.txt", "0\t0\r\n9\t4\t1.5\r\n\r\n");
        let c = write(tmp.path(), "c.txt", "9\t4\t1.5");
        for p in [a, b, c] {
            assert_eq!(read_last_line(&p).unwrap().as_deref(), Some("9\t4\t1.5"));
        }
    }

    #[test]
    fn last_line_spans_chunk_boundaries() {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = String::new();
        for i in 0..2000 {
            body.push_str(&format!("{i}\t{i}\t0\t0\t0\t1.0\n"));
        }
        let long_last = format!("{}\t7\t{}\n", 1999, "x".repeat(10_000));
        body.push_str(&long_last);
        let p = write(tmp.path(), "long.txt", &body);
        assert_eq!(
            read_last_line(&p).unwrap().as_deref(),
            Some(long_last.trim_end())
        );
    }

    #[test]
    fn last_line_of_empty_or_blank_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = write(tmp.path(), "empty.txt", "");
        let blank = write(tmp.path(), "blank.txt", "\n \n\t\n");
        assert_eq!(read_last_line(&empty).unwrap(), None);
        assert_eq!(read_last_line(&blank).unwrap(), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_last_line(&tmp.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, ReportError::NotFound { .. }));
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("out.bin");
        write_atomic(&p, b"first").unwrap();
        write_atomic(&p, b"second").unwrap();
        assert_eq!(std::fs::read(&p).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }
}
