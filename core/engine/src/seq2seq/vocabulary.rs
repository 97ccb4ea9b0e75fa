use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN: &str = "<end>";
pub const UNK_TOKEN: &str = "<unk>";
/// 填充值，词表中不会有词占用 0
pub const PAD_ID: i64 = 0;

/// 分词前替换成空格的字符（与训练时 tokenizer 的 filters 一致）
const FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// 词表：word -> id 以及严格的反向映射 id -> word
#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_index: HashMap<String, i64>,
    index_word: HashMap<i64, String>,
    pub start_id: i64,
    pub end_id: i64,
    pub unk_id: i64,
}

impl Vocabulary {
    /// 从 vocab.json（`{ "word": id, ... }`）加载词表
    pub fn from_file(vocab_path: &Path) -> EngineResult<Self> {
        let map = read_word_index(vocab_path)
            .map_err(|e| EngineError::artifact(format!("{e:#}")))?;
        Self::from_word_index(map)
    }

    pub fn from_word_index(word_index: HashMap<String, i64>) -> EngineResult<Self> {
        let mut index_word: HashMap<i64, String> = HashMap::with_capacity(word_index.len());
        for (word, &id) in word_index.iter() {
            if id <= PAD_ID {
                return Err(EngineError::artifact(format!(
                    "vocabulary id {id} for {word:?} collides with the pad id"
                )));
            }
            if let Some(previous) = index_word.insert(id, word.clone()) {
                return Err(EngineError::artifact(format!(
                    "vocabulary id {id} is assigned to both {previous:?} and {word:?}"
                )));
            }
        }

        let special = |token: &str| {
            word_index
                .get(token)
                .copied()
                .ok_or_else(|| EngineError::artifact(format!("vocabulary is missing {token}")))
        };
        let start_id = special(START_TOKEN)?;
        let end_id = special(END_TOKEN)?;
        let unk_id = special(UNK_TOKEN)?;

        Ok(Self {
            word_index,
            index_word,
            start_id,
            end_id,
            unk_id,
        })
    }

    pub fn len(&self) -> usize {
        self.word_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_index.is_empty()
    }

    pub fn id_of(&self, word: &str) -> Option<i64> {
        self.word_index.get(word).copied()
    }

    /// 文本 -> id 序列；词表外的词映射为 `<unk>`，空输入返回空序列
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let lowered = text.to_lowercase();
        let cleaned: String = lowered
            .chars()
            .map(|c| if FILTERS.contains(c) { ' ' } else { c })
            .collect();

        cleaned
            .split_whitespace()
            .map(|word| self.word_index.get(word).copied().unwrap_or(self.unk_id))
            .collect()
    }

    /// 固定长度：后补 0；过长时丢弃前面的 id，只保留最后 `target_length` 个
    pub fn pad(ids: &[i64], target_length: usize) -> Vec<i64> {
        let kept = if ids.len() > target_length {
            &ids[ids.len() - target_length..]
        } else {
            ids
        };
        let mut padded = Vec::with_capacity(target_length);
        padded.extend_from_slice(kept);
        padded.resize(target_length, PAD_ID);
        padded
    }

    pub fn encode_padded(&self, text: &str, target_length: usize) -> Vec<i64> {
        Self::pad(&self.encode(text), target_length)
    }

    pub fn decode(&self, id: i64) -> Option<&str> {
        self.index_word.get(&id).map(String::as_str)
    }

    /// id 序列 -> 文本：跳过特殊符号和没有反向映射的 id
    pub fn detokenize(&self, ids: &[i64]) -> String {
        let words: Vec<&str> = ids
            .iter()
            .filter_map(|&id| self.decode(id))
            .filter(|word| !matches!(*word, START_TOKEN | END_TOKEN | UNK_TOKEN))
            .collect();
        words.join(" ").trim().to_string()
    }
}

fn read_word_index(vocab_path: &Path) -> Result<HashMap<String, i64>> {
    if !vocab_path.exists() {
        return Err(anyhow!("vocab.json not found at {}", vocab_path.display()));
    }
    let data = fs::read_to_string(vocab_path)
        .map_err(|e| anyhow!("failed to read {}: {e}", vocab_path.display()))?;
    let map: HashMap<String, i64> = serde_json::from_str(&data)
        .map_err(|e| anyhow!("failed to parse {}: {e}", vocab_path.display()))?;
    Ok(map)
}
