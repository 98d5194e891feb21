//! IO helper: 文件探测、按编码读写JSON、原子替换写入

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::model::document::DocError;
use crate::model::options::{DocumentOptions, TextEncoding};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];

/// 一次stat的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileProbe {
    pub exists: bool,
    pub size_bytes: u64,
}

/// 探测文件是否存在及其大小；不存在不算错误，其他stat错误原样返回。
/// 路径中间某段是普通文件（ENOTDIR）时同样视为不存在
pub fn probe_file(p: &Path) -> Result<FileProbe, DocError> {
    match fs::metadata(p) {
        Ok(meta) => Ok(FileProbe {
            exists: true,
            size_bytes: meta.len(),
        }),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(FileProbe::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// 按编码把字节解码为文本。`Utf8` 原样保留BOM（随后的JSON解析会失败），
/// `Utf8Bom` 与 `Utf16Le` 去掉开头的BOM
pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String, DocError> {
    let decode_err = |reason: String| DocError::Decode {
        encoding: encoding.label(),
        reason,
    };
    match encoding {
        TextEncoding::Utf8 => {
            String::from_utf8(bytes.to_vec()).map_err(|e| decode_err(e.to_string()))
        }
        TextEncoding::Utf8Bom => {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            String::from_utf8(body.to_vec()).map_err(|e| decode_err(e.to_string()))
        }
        TextEncoding::Utf16Le => {
            let body = bytes.strip_prefix(UTF16_LE_BOM).unwrap_or(bytes);
            if body.len() % 2 != 0 {
                return Err(decode_err(format!("字节数为奇数: {}", body.len())));
            }
            let units = body
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .collect::<Result<String, _>>()
                .map_err(|e| decode_err(e.to_string()))
        }
    }
}

/// 按编码把文本编码为字节
pub fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Utf8Bom => {
            let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
            out.extend_from_slice(UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            out
        }
        TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
    }
}

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path, encoding: TextEncoding) -> Result<Value, DocError> {
    let bytes = fs::read(p)?;
    let text = decode_text(&bytes, encoding)?;
    serde_json::from_str(&text).map_err(DocError::Parse)
}

/// 把JSON序列化为待写入的字节
pub fn serialize_json(value: &Value, opts: &DocumentOptions) -> Result<Vec<u8>, DocError> {
    let text = if opts.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(DocError::Serialize)?;
    Ok(encode_text(&text, opts.encoding))
}

/// 将JSON数据整体写入文件，覆盖原内容
pub fn write_json_file(p: &Path, value: &Value, opts: &DocumentOptions) -> Result<(), DocError> {
    // 先序列化，失败时目标文件保持不变
    let bytes = serialize_json(value, opts)?;
    if opts.atomic_writes {
        write_atomic(p, &bytes)?;
    } else {
        fs::write(p, &bytes)?;
    }
    Ok(())
}

/// 同目录临时文件 + fsync + rename
fn write_atomic(p: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    // 临时文件默认只有属主可读写；沿用目标文件的权限，目标不存在时
    // 先按普通方式创建，让新文件获得 0666 减去 umask 的默认权限
    let perms = match fs::metadata(p) {
        Ok(meta) => meta.permissions(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            OpenOptions::new().write(true).create(true).open(p)?.metadata()?.permissions()
        }
        Err(e) => return Err(e),
    };
    tmp.as_file().set_permissions(perms)?;
    tmp.persist(p).map_err(|e| e.error)?;
    Ok(())
}

/// 删除文件
pub fn remove_json_file(p: &Path) -> Result<(), DocError> {
    fs::remove_file(p)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_probe_missing_file() {
        let dir = tempdir().expect("创建临时目录失败");
        let probe = probe_file(&dir.path().join("none.json")).expect("探测不应失败");
        assert_eq!(probe, FileProbe { exists: false, size_bytes: 0 });
    }

    #[test]
    fn test_probe_existing_file() {
        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("data.json");
        fs::write(&path, b"{}").expect("写入失败");

        let probe = probe_file(&path).expect("探测不应失败");
        assert!(probe.exists);
        assert_eq!(probe.size_bytes, 2);
    }

    #[test]
    fn test_utf8_bom_stripped_only_for_utf8_sig() {
        let raw = b"\xEF\xBB\xBF{\"a\":1}";
        let decoded = decode_text(raw, TextEncoding::Utf8Bom).expect("解码失败");
        assert_eq!(decoded, "{\"a\":1}");

        let kept = decode_text(raw, TextEncoding::Utf8).expect("解码失败");
        assert!(kept.starts_with('\u{feff}'), "utf-8 不去掉BOM");
    }

    #[test]
    fn test_utf8_file_with_bom_is_parse_error() {
        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("bom.json");
        fs::write(&path, b"\xEF\xBB\xBF{}").expect("写入失败");

        let err = read_json_file(&path, TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, DocError::Parse(_)), "utf-8 读取带BOM的文件应该解析失败");
        assert_eq!(read_json_file(&path, TextEncoding::Utf8Bom).expect("读取失败"), json!({}));
    }

    #[test]
    fn test_probe_path_under_regular_file_is_absent() {
        let dir = tempdir().expect("创建临时目录失败");
        let file = dir.path().join("plain");
        fs::write(&file, b"x").expect("写入失败");

        let probe = probe_file(&file.join("x.json")).expect("ENOTDIR 应视为不存在");
        assert_eq!(probe, FileProbe::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_propagates_other_stat_errors() {
        let dir = tempdir().expect("创建临时目录失败");
        let link = dir.path().join("loop.json");
        // 指向自身的符号链接，stat 返回 ELOOP
        std::os::unix::fs::symlink(&link, &link).expect("创建符号链接失败");

        let err = probe_file(&link).unwrap_err();
        assert!(matches!(err, DocError::Io(_)), "非NotFound错误应该原样返回");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_new_file_gets_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("创建临时目录失败");
        let atomic = dir.path().join("atomic.json");
        let plain = dir.path().join("plain.json");

        write_json_file(&atomic, &json!({}), &DocumentOptions::default()).expect("原子写入失败");
        fs::write(&plain, b"{}").expect("写入失败");

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&atomic), mode(&plain), "新文件权限应与普通写入一致");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("shared.json");
        fs::write(&path, b"{}").expect("写入失败");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("设置权限失败");

        write_json_file(&path, &json!({"a": 1}), &DocumentOptions::default()).expect("原子写入失败");

        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let err = decode_text(&[0x7B, 0xFF, 0x7D], TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, DocError::Decode { encoding: "utf-8", .. }));
    }

    #[test]
    fn test_utf16_odd_length_rejected() {
        let err = decode_text(&[0x7B, 0x00, 0x7D], TextEncoding::Utf16Le).unwrap_err();
        assert!(matches!(err, DocError::Decode { .. }));
    }

    #[test]
    fn test_utf16_file_content() {
        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("wide.json");
        let opts = DocumentOptions::default()
            .encoding(TextEncoding::Utf16Le)
            .pretty(false);

        write_json_file(&path, &json!({"名字": "张三"}), &opts).expect("写入失败");

        let raw = fs::read(&path).expect("读取失败");
        assert_eq!(&raw[..2], &[b'{', 0x00], "UTF-16LE 不写BOM");
        let back = read_json_file(&path, TextEncoding::Utf16Le).expect("读取JSON失败");
        assert_eq!(back, json!({"名字": "张三"}));
    }

    #[test]
    fn test_utf8_bom_written() {
        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("bom.json");
        let opts = DocumentOptions::default().encoding(TextEncoding::Utf8Bom);

        write_json_file(&path, &json!({}), &opts).expect("写入失败");

        let raw = fs::read(&path).expect("读取失败");
        assert!(raw.starts_with(UTF8_BOM));
        assert_eq!(read_json_file(&path, TextEncoding::Utf8Bom).expect("读取失败"), json!({}));
    }

    #[test]
    fn test_atomic_and_in_place_writes_agree() {
        let dir = tempdir().expect("创建临时目录失败");
        let atomic = dir.path().join("atomic.json");
        let in_place = dir.path().join("in_place.json");
        let value = json!({"list": [1, 2, {"x": null}]});

        write_json_file(&atomic, &value, &DocumentOptions::default()).expect("原子写入失败");
        write_json_file(&in_place, &value, &DocumentOptions::default().atomic_writes(false))
            .expect("直接写入失败");

        assert_eq!(fs::read(&atomic).unwrap(), fs::read(&in_place).unwrap());
        // 原子写入不应残留临时文件
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_invalid_json_content() {
        let dir = tempdir().expect("创建临时目录失败");
        let path = dir.path().join("bad.json");
        fs::write(&path, br#"{"invalid": json content}"#).expect("写入失败");

        let err = read_json_file(&path, TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, DocError::Parse(_)), "无效JSON应该返回解析错误");
    }
}
