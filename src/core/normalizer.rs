use crate::domain::model::Identifier;
use regex::Regex;
use std::collections::HashSet;

/// 正規化後的輸入：有效序列號（保持輸入順序、去重）加上被拒絕的 token
#[derive(Debug, Clone, Default)]
pub struct NormalizedInput {
    pub identifiers: Vec<Identifier>,
    pub invalid: Vec<String>,
    pub duplicates: Vec<String>,
}

impl NormalizedInput {
    pub fn has_rejects(&self) -> bool {
        !self.invalid.is_empty() || !self.duplicates.is_empty()
    }
}

/// 把原始輸入文字切成序列號清單，支援換行、逗號、空白、tab 混用
pub fn parse_serial_input(text: &str) -> NormalizedInput {
    let splitter = Regex::new(r"[,\s]+").unwrap();

    let mut normalized = NormalizedInput::default();
    let mut seen: HashSet<Identifier> = HashSet::new();

    for line in text.lines() {
        for token in splitter.split(line.trim()) {
            if token.is_empty() {
                continue;
            }
            match Identifier::parse(token) {
                Some(identifier) => {
                    if seen.contains(&identifier) {
                        normalized.duplicates.push(identifier.to_string());
                    } else {
                        seen.insert(identifier.clone());
                        normalized.identifiers.push(identifier);
                    }
                }
                None => normalized.invalid.push(token.to_string()),
            }
        }
    }

    normalized
}
