use crate::utils::error::{DivinationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one yarrow-stalk division round.
///
/// Old lines (6, 9) are "changing": they transform into their opposite in
/// the extended interpretation. Young lines (7, 8) are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LineValue {
    OldYin = 6,
    YoungYang = 7,
    YoungYin = 8,
    OldYang = 9,
}

impl LineValue {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Solid (yang) lines map to '1' in the hexagram code.
    pub fn is_solid(self) -> bool {
        matches!(self, Self::YoungYang | Self::OldYang)
    }

    pub fn is_changing(self) -> bool {
        matches!(self, Self::OldYin | Self::OldYang)
    }
}

impl From<LineValue> for u8 {
    fn from(value: LineValue) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for LineValue {
    type Error = DivinationError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            6 => Ok(Self::OldYin),
            7 => Ok(Self::YoungYang),
            8 => Ok(Self::YoungYin),
            9 => Ok(Self::OldYang),
            other => Err(DivinationError::InvalidCast {
                message: format!("line value {other} is not one of 6, 7, 8, 9"),
            }),
        }
    }
}

/// Six cast lines in casting order: index 0 is the first cast, which sits at
/// the bottom of the hexagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct CastSequence([LineValue; 6]);

impl CastSequence {
    pub fn new(lines: [LineValue; 6]) -> Self {
        Self(lines)
    }

    pub fn from_values(values: &[u8]) -> Result<Self> {
        if values.len() != 6 {
            return Err(DivinationError::InvalidCast {
                message: format!("expected 6 lines, got {}", values.len()),
            });
        }
        let mut lines = [LineValue::YoungYin; 6];
        for (slot, &raw) in lines.iter_mut().zip(values) {
            *slot = LineValue::try_from(raw)?;
        }
        Ok(Self(lines))
    }

    pub fn lines(&self) -> &[LineValue; 6] {
        &self.0
    }

    pub fn values(&self) -> [u8; 6] {
        self.0.map(LineValue::value)
    }

    /// Classical label for the line at a 1-based bottom-up position, e.g.
    /// 初九 for a yang first line, 六二 for a yin second line, 上六 at the top.
    pub fn line_label(&self, position: u8) -> Option<String> {
        let line = *self.0.get(usize::from(position).checked_sub(1)?)?;
        let yao = if line.is_solid() { "九" } else { "六" };
        Some(match position {
            1 => format!("初{yao}"),
            6 => format!("上{yao}"),
            2 => format!("{yao}二"),
            3 => format!("{yao}三"),
            4 => format!("{yao}四"),
            _ => format!("{yao}五"),
        })
    }
}

impl From<CastSequence> for Vec<u8> {
    fn from(cast: CastSequence) -> Self {
        cast.values().to_vec()
    }
}

impl TryFrom<Vec<u8>> for CastSequence {
    type Error = DivinationError;

    fn try_from(values: Vec<u8>) -> Result<Self> {
        Self::from_values(&values)
    }
}

/// Six-character binary string, top line first (reverse of casting order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexagramCode(String);

impl HexagramCode {
    pub fn new(code: &str) -> Result<Self> {
        crate::utils::validation::validate_hexagram_code(code)?;
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// For the encoder, whose output is well-formed by construction.
    pub(crate) fn new_unchecked(code: String) -> Self {
        debug_assert!(code.len() == 6 && code.bytes().all(|b| b == b'0' || b == b'1'));
        Self(code)
    }
}

impl std::fmt::Display for HexagramCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for HexagramCode {
    type Err = DivinationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for HexagramCode {
    type Error = DivinationError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<HexagramCode> for String {
    fn from(code: HexagramCode) -> Self {
        code.0
    }
}

/// Encoder output: the binary code plus 1-based positions of changing lines,
/// ascending in casting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexagramEncoding {
    pub code: HexagramCode,
    pub changing_lines: Vec<u8>,
}

/// Reference row from the hexagram table. Read-only after dataset load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexagramRecord {
    pub id: u32,
    /// Raw name field, e.g. "屯 水雷屯": display name, then trigram title.
    pub name: String,
    pub binary_code: String,
    pub judgment: String,
}

/// Reference row from the line-text table, keyed by (hexagram_id, position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTextRecord {
    pub hexagram_id: u32,
    /// Classical label such as 初九 or 上六.
    pub position: String,
    pub position_num: u8,
    pub text: String,
}

/// Ephemeral lookup result, built fresh per repository call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HexagramContext {
    pub hexagram_id: u32,
    pub hexagram_code: String,
    pub hexagram_name: String,
    pub display_name: String,
    pub trigram_title: String,
    pub judgment: String,
    pub changing_lines: Vec<u8>,
    pub changing_line_texts: Vec<String>,
}

/// Trailing usage payload of an interpretation stream. Appears at most once,
/// behind the sentinel; numeric fields default to zero when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreamUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub thoughts_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Result of one consumed interpretation stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterpretationOutcome {
    /// Concatenation of all narrative fragments, in arrival order.
    pub content: String,
    pub usage: Option<StreamUsage>,
}

/// A reading to be persisted locally; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub question: String,
    pub throws: CastSequence,
    pub hexagram_id: u32,
    pub hexagram_code: String,
    pub hexagram_name: String,
    pub display_name: String,
    pub trigram_title: String,
    pub judgment: String,
    pub changing_lines: Vec<u8>,
    pub changing_line_texts: Vec<String>,
}

impl NewReading {
    pub fn from_context(question: &str, throws: CastSequence, context: &HexagramContext) -> Self {
        Self {
            question: question.to_string(),
            throws,
            hexagram_id: context.hexagram_id,
            hexagram_code: context.hexagram_code.clone(),
            hexagram_name: context.hexagram_name.clone(),
            display_name: context.display_name.clone(),
            trigram_title: context.trigram_title.clone(),
            judgment: context.judgment.clone(),
            changing_lines: context.changing_lines.clone(),
            changing_line_texts: context.changing_line_texts.clone(),
        }
    }
}

/// Locally persisted reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReading {
    pub id: i64,
    pub question: String,
    pub throws: CastSequence,
    pub hexagram_id: u32,
    pub hexagram_code: String,
    pub hexagram_name: String,
    pub display_name: String,
    pub trigram_title: String,
    pub judgment: String,
    pub changing_lines: Vec<u8>,
    pub changing_line_texts: Vec<String>,
    pub created_at: DateTime<Utc>,
}
