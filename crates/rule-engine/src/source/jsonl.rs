//! JSON Lines 行加载器
//!
//! 打开时只扫描一遍文件记录每行的字节偏移，之后按需读取并解析指定范围的行。
//! 空白行会被跳过，不计入行号。

use super::lazy::RowLoader;
use crate::error::{Result, RuleError};
use crate::models::Row;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct LineSpan {
    offset: u64,
    len: usize,
}

/// JSON Lines 加载器
pub struct JsonLinesLoader {
    path: PathBuf,
    lines: Vec<LineSpan>,
    file: Mutex<File>,
}

impl JsonLinesLoader {
    /// 打开文件并建立行偏移索引
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut lines = Vec::new();
        let mut offset = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            if !buf.trim_ascii().is_empty() {
                lines.push(LineSpan { offset, len: read });
            }
            offset += read as u64;
        }

        debug!(path = %path.display(), rows = lines.len(), "建立 JSON Lines 行索引");

        Ok(Self {
            path,
            lines,
            file: Mutex::new(reader.into_inner()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部行
    pub fn read_all(&self) -> Result<Vec<Row>> {
        self.load_range(0, self.lines.len())
    }
}

impl RowLoader for JsonLinesLoader {
    fn total_rows(&self) -> usize {
        self.lines.len()
    }

    fn load_range(&self, start: usize, len: usize) -> Result<Vec<Row>> {
        let start = start.min(self.lines.len());
        let end = start.saturating_add(len).min(self.lines.len());
        let spans = &self.lines[start..end];
        let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
            return Ok(Vec::new());
        };

        // 范围内的行在文件中连续，一次读出整段
        let block_len = (last.offset - first.offset) as usize + last.len;
        let mut block = vec![0u8; block_len];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(first.offset))?;
            file.read_exact(&mut block)?;
        }

        spans
            .iter()
            .enumerate()
            .map(|(i, span)| {
                let from = (span.offset - first.offset) as usize;
                let bytes = &block[from..from + span.len];
                serde_json::from_slice::<Row>(bytes).map_err(|e| {
                    RuleError::DataSource(format!(
                        "{} 第 {} 行解析失败: {}",
                        self.path.display(),
                        start + i + 1,
                        e
                    ))
                })
            })
            .collect()
    }
}
