//! Script transcoder: scorecard ⇄ human-editable rule script.
//!
//! The script is a closed DSL. It is parsed back into the same
//! characteristic/bin model used everywhere else and is never executed.
//!
//! Shape of one block:
//!
//! ```text
//! # Characteristic: AGE - Applicant Age (field: age)
//! # weight: 1
//! if age >= 18 and age < 25:
//!     points += -20  # 18-24
//! elif age >= 40:
//!     points += 30  # 40+
//! ```
//!
//! Characteristics are re-identified by code, bins by label. Any other
//! `#` line is a free comment. A script that fails to parse is rejected
//! whole with the offending line number.

use crate::{
    error::{EngineError, EngineResult},
    model::{is_valid_code, is_valid_field, Bin, BinCondition, Characteristic, Scorecard},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::OnceLock;

// ── Contract A: model → text ────────────────────────────────────────

pub fn to_script(scorecard: &Scorecard) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Scorecard: {}", scorecard.name);
    let _ = writeln!(out, "# Blocks are matched to characteristics by code.");

    for c in &scorecard.characteristics {
        out.push('\n');
        let _ = writeln!(
            out,
            "# Characteristic: {} - {} (field: {})",
            c.code, c.name, c.data_field
        );
        let _ = writeln!(out, "# weight: {}", c.weight_multiplier);
        if !c.is_active {
            let _ = writeln!(out, "# status: inactive");
        }
        for (i, bin) in c.bins.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "elif" };
            let _ = writeln!(out, "{keyword} {}:", condition_text(&c.data_field, &bin.condition));
            let _ = writeln!(out, "    points += {}  # {}", bin.points, bin.label);
        }
    }
    out
}

fn condition_text(field: &str, condition: &BinCondition) -> String {
    match condition {
        BinCondition::NumericRange {
            min_value: Some(lo),
            max_value: Some(hi),
        } => format!("{field} >= {lo} and {field} < {hi}"),
        BinCondition::NumericRange {
            min_value: Some(lo),
            max_value: None,
        } => format!("{field} >= {lo}"),
        BinCondition::NumericRange {
            min_value: None,
            max_value: Some(hi),
        } => format!("{field} < {hi}"),
        BinCondition::NumericRange {
            min_value: None,
            max_value: None,
        } => format!("{field} is not None"),
        BinCondition::Categorical { category_value } => {
            format!("{field} == \"{}\"", escape(category_value))
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── Contract B: text → patch ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBin {
    pub label:     String,
    pub points:    f64,
    pub condition: BinCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCharacteristic {
    pub code:              String,
    pub name:              String,
    pub data_field:        String,
    pub is_active:         bool,
    pub weight_multiplier: f64,
    pub bins:              Vec<ParsedBin>,
    /// Line of the marker comment.
    pub line:              usize,
}

/// The structured content of a script, not yet applied to a scorecard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptPatch {
    pub characteristics: Vec<ParsedCharacteristic>,
}

pub fn from_script(text: &str) -> EngineResult<ScriptPatch> {
    let mut parser = Parser::default();
    for (idx, raw) in text.lines().enumerate() {
        parser.line(idx + 1, raw)?;
    }
    parser.finish()
}

// ── Line grammar ────────────────────────────────────────────────────

static MARKER_START: OnceLock<Regex> = OnceLock::new();
static MARKER_RE: OnceLock<Regex> = OnceLock::new();
static DIRECTIVE_RE: OnceLock<Regex> = OnceLock::new();
static CONDITION_RE: OnceLock<Regex> = OnceLock::new();
static NOT_NONE_RE: OnceLock<Regex> = OnceLock::new();
static CATEGORY_RE: OnceLock<Regex> = OnceLock::new();
static AND_RE: OnceLock<Regex> = OnceLock::new();
static BOUND_RE: OnceLock<Regex> = OnceLock::new();
static POINTS_RE: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("script grammar pattern compiles"))
}

/// `Characteristic:` at the start of a comment, and nothing looser.
fn marker_start() -> &'static Regex {
    compiled(&MARKER_START, r"^Characteristic\s*:")
}

/// `Characteristic: CODE - Name (field: data_field)`
fn marker_re() -> &'static Regex {
    compiled(
        &MARKER_RE,
        r"^Characteristic\s*:\s*(?P<code>[^\s-]*)\s*(?:-\s*(?P<name>.*?))?\s*\(field:\s*(?P<field>[^()]*?)\s*\)\s*$",
    )
}

/// `weight: 1.5` / `status: inactive`
fn directive_re() -> &'static Regex {
    compiled(&DIRECTIVE_RE, r"^(?P<key>weight|status)\s*:\s*(?P<value>.*?)\s*$")
}

/// `if <body>:` / `elif <body>:`
fn condition_re() -> &'static Regex {
    compiled(&CONDITION_RE, r"^(?P<keyword>if|elif)\s+(?P<body>.+?)\s*:$")
}

fn not_none_re() -> &'static Regex {
    compiled(&NOT_NONE_RE, r"^(?P<field>\S+)\s+is\s+not\s+None$")
}

fn category_re() -> &'static Regex {
    compiled(&CATEGORY_RE, r#"^(?P<field>[^\s=]+)\s*==\s*(?P<value>".*)$"#)
}

fn and_re() -> &'static Regex {
    compiled(&AND_RE, r"\s+and\s+")
}

fn bound_re() -> &'static Regex {
    compiled(&BOUND_RE, r"^(?P<field>[^\s<>=]+)\s*(?P<op>>=|<=|<|>)\s*(?P<value>\S+)$")
}

/// `points += 10  # label` or `points -= 10  # label`
fn points_re() -> &'static Regex {
    compiled(&POINTS_RE, r"^points\s*(?P<op>\+=|-=)\s*(?P<value>[^\s#]+)\s*#\s*(?P<label>.*\S)\s*$")
}

#[derive(Default)]
struct Parser {
    done:    Vec<ParsedCharacteristic>,
    current: Option<Block>,
    codes:   HashSet<String>,
}

struct Block {
    parsed:  ParsedCharacteristic,
    weight:  bool,
    status:  bool,
    pending: Option<(usize, BinCondition)>,
}

impl Parser {
    fn line(&mut self, n: usize, raw: &str) -> EngineResult<()> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(comment) = line.strip_prefix('#') {
            return self.comment(n, comment.trim());
        }

        if let Some(caps) = condition_re().captures(line) {
            let elif = &caps["keyword"] == "elif";
            let block = self.block(n, "condition")?;
            if let Some((open, _)) = &block.pending {
                return Err(EngineError::parse(
                    n,
                    format!("condition on line {open} has no points assignment"),
                ));
            }
            if elif && block.parsed.bins.is_empty() {
                return Err(EngineError::parse(n, "elif without a preceding if"));
            }
            let condition = parse_condition(n, &caps["body"], &block.parsed.data_field)?;
            block.pending = Some((n, condition));
            return Ok(());
        }

        if let Some(caps) = points_re().captures(line) {
            let block = self.block(n, "points assignment")?;
            let (_, condition) = block
                .pending
                .take()
                .ok_or_else(|| EngineError::parse(n, "points assignment without a condition"))?;
            let magnitude = parse_number(n, &caps["value"])?;
            let points = if &caps["op"] == "-=" { -magnitude } else { magnitude };
            block.parsed.bins.push(ParsedBin {
                label: caps["label"].to_string(),
                points,
                condition,
            });
            return Ok(());
        }

        let keyword = line.split(|c: char| c.is_whitespace() || c == ':').next().unwrap_or(line);
        let message = match keyword {
            "if" | "elif" => "condition must read 'if <condition>:'".to_string(),
            "points" => "expected 'points += <number>  # label'".to_string(),
            "else" => "else branches are not supported; use an open-ended range instead".to_string(),
            _ => format!("unrecognised statement {line:?}"),
        };
        Err(EngineError::parse(n, message))
    }

    fn comment(&mut self, n: usize, comment: &str) -> EngineResult<()> {
        if marker_start().is_match(comment) {
            self.close_block()?;
            let parsed = parse_marker(n, comment)?;
            if !self.codes.insert(parsed.code.clone()) {
                return Err(EngineError::parse(
                    n,
                    format!("duplicate marker for characteristic {}", parsed.code),
                ));
            }
            self.current = Some(Block {
                parsed,
                weight: false,
                status: false,
                pending: None,
            });
            return Ok(());
        }

        let Some(caps) = directive_re().captures(comment) else {
            return Ok(());
        };
        let value = &caps["value"];
        if &caps["key"] == "weight" {
            let block = self.block(n, "weight directive")?;
            if block.weight {
                return Err(EngineError::parse(n, "weight given twice"));
            }
            block.parsed.weight_multiplier = parse_number(n, value)?;
            block.weight = true;
        } else {
            let block = self.block(n, "status directive")?;
            if block.status {
                return Err(EngineError::parse(n, "status given twice"));
            }
            block.parsed.is_active = match value {
                "active" => true,
                "inactive" => false,
                other => {
                    return Err(EngineError::parse(
                        n,
                        format!("status must be active or inactive, got {other:?}"),
                    ))
                }
            };
            block.status = true;
        }
        Ok(())
    }

    fn block(&mut self, n: usize, what: &str) -> EngineResult<&mut Block> {
        self.current
            .as_mut()
            .ok_or_else(|| EngineError::parse(n, format!("{what} outside a characteristic block")))
    }

    fn close_block(&mut self) -> EngineResult<()> {
        if let Some(block) = self.current.take() {
            if let Some((open, _)) = block.pending {
                return Err(EngineError::parse(
                    open,
                    format!("condition for {} has no points assignment", block.parsed.code),
                ));
            }
            self.done.push(block.parsed);
        }
        Ok(())
    }

    fn finish(mut self) -> EngineResult<ScriptPatch> {
        self.close_block()?;
        Ok(ScriptPatch {
            characteristics: self.done,
        })
    }
}

fn parse_marker(n: usize, comment: &str) -> EngineResult<ParsedCharacteristic> {
    let caps = marker_re().captures(comment).ok_or_else(|| {
        EngineError::parse(
            n,
            "malformed marker: expected 'Characteristic: CODE - Name (field: data_field)'",
        )
    })?;

    let code = &caps["code"];
    if code.is_empty() {
        return Err(EngineError::parse(n, "malformed marker: missing characteristic code"));
    }
    if !is_valid_code(code) {
        return Err(EngineError::parse(n, format!("malformed marker: invalid code {code:?}")));
    }
    let field = &caps["field"];
    if !is_valid_field(field) {
        return Err(EngineError::parse(n, format!("malformed marker: invalid data field {field:?}")));
    }
    let name = caps
        .name("name")
        .map(|m| m.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(code);

    Ok(ParsedCharacteristic {
        code: code.to_string(),
        name: name.to_string(),
        data_field: field.to_string(),
        is_active: true,
        weight_multiplier: 1.0,
        bins: Vec::new(),
        line: n,
    })
}

fn parse_condition(n: usize, body: &str, field: &str) -> EngineResult<BinCondition> {
    if let Some(caps) = not_none_re().captures(body) {
        expect_field(n, &caps["field"], field)?;
        return Ok(BinCondition::NumericRange {
            min_value: None,
            max_value: None,
        });
    }

    if let Some(caps) = category_re().captures(body) {
        expect_field(n, &caps["field"], field)?;
        return Ok(BinCondition::Categorical {
            category_value: parse_string(n, &caps["value"])?,
        });
    }

    let mut min_value = None;
    let mut max_value = None;
    for part in and_re().split(body) {
        let caps = bound_re()
            .captures(part)
            .ok_or_else(|| EngineError::parse(n, format!("cannot parse condition {part:?}")))?;
        expect_field(n, &caps["field"], field)?;
        let value = parse_number(n, &caps["value"])?;
        match &caps["op"] {
            ">=" if min_value.is_none() => min_value = Some(value),
            "<" if max_value.is_none() => max_value = Some(value),
            ">=" | "<" => return Err(EngineError::parse(n, "each bound may appear only once")),
            _ => {
                return Err(EngineError::parse(
                    n,
                    "only '>=' and '<' comparisons are allowed; bins are half-open [min, max)",
                ))
            }
        }
    }
    Ok(BinCondition::NumericRange {
        min_value,
        max_value,
    })
}

fn expect_field(n: usize, lhs: &str, field: &str) -> EngineResult<()> {
    if lhs == field {
        Ok(())
    } else {
        Err(EngineError::parse(
            n,
            format!("condition reads {lhs:?} but the block's field is {field:?}"),
        ))
    }
}

fn parse_number(n: usize, text: &str) -> EngineResult<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EngineError::parse(n, format!("invalid number {text:?}")))
}

fn parse_string(n: usize, text: &str) -> EngineResult<String> {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| text.len() >= 2)
        .ok_or_else(|| EngineError::parse(n, format!("expected a quoted string, got {text:?}")))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(e @ ('\\' | '"')) => out.push(e),
                other => {
                    return Err(EngineError::parse(
                        n,
                        format!("unsupported escape sequence \\{}", other.unwrap_or(' ')),
                    ))
                }
            },
            '"' => return Err(EngineError::parse(n, "unescaped quote inside string")),
            c => out.push(c),
        }
    }
    Ok(out)
}

// ── Structural diff ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharacteristicChange {
    pub code:         String,
    /// Header fields that differ (name, data_field, weight_multiplier, is_active, bin_order).
    pub fields:       Vec<String>,
    pub bins_added:   Vec<String>,
    pub bins_removed: Vec<String>,
    pub bins_changed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptDiff {
    pub added:     Vec<String>,
    /// Deletion proposals. Applying them needs explicit confirmation.
    pub removed:   Vec<String>,
    pub changed:   Vec<CharacteristicChange>,
    pub reordered: bool,
}

impl ScriptDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && !self.reordered
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("added {}", self.added.join(",")));
        }
        if !self.removed.is_empty() {
            parts.push(format!("removed {}", self.removed.join(",")));
        }
        if !self.changed.is_empty() {
            let codes: Vec<&str> = self.changed.iter().map(|c| c.code.as_str()).collect();
            parts.push(format!("changed {}", codes.join(",")));
        }
        if self.reordered {
            parts.push("reordered".to_string());
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join("; ")
        }
    }
}

impl ScriptPatch {
    pub fn diff(&self, current: &Scorecard) -> ScriptDiff {
        let in_script: HashSet<&str> = self.characteristics.iter().map(|c| c.code.as_str()).collect();
        let mut diff = ScriptDiff::default();

        for parsed in &self.characteristics {
            match current.characteristic_by_code(&parsed.code) {
                None => diff.added.push(parsed.code.clone()),
                Some(existing) => {
                    let change = compare(existing, parsed);
                    if change != CharacteristicChange::default() {
                        diff.changed.push(CharacteristicChange {
                            code: parsed.code.clone(),
                            ..change
                        });
                    }
                }
            }
        }

        diff.removed = current
            .characteristics
            .iter()
            .filter(|c| !in_script.contains(c.code.as_str()))
            .map(|c| c.code.clone())
            .collect();

        let current_order: Vec<&str> = current
            .characteristics
            .iter()
            .map(|c| c.code.as_str())
            .filter(|code| in_script.contains(code))
            .collect();
        let script_order: Vec<&str> = self
            .characteristics
            .iter()
            .map(|c| c.code.as_str())
            .filter(|code| current.characteristic_by_code(code).is_some())
            .collect();
        diff.reordered = current_order != script_order;

        diff
    }

    /// Rebuild `current`'s characteristics from the script. Ids survive
    /// for characteristics (by code) and bins (by label). Version and
    /// cached script are left to the change auditor.
    pub fn apply(&self, current: &Scorecard, confirm_deletions: bool) -> EngineResult<Scorecard> {
        let diff = self.diff(current);
        if !diff.removed.is_empty() && !confirm_deletions {
            return Err(EngineError::validation(format!(
                "script removes characteristics {}; deletion requires explicit confirmation",
                diff.removed.join(", ")
            )));
        }

        let existing: HashMap<&str, &Characteristic> = current
            .characteristics
            .iter()
            .map(|c| (c.code.as_str(), c))
            .collect();

        let mut next = current.clone();
        next.characteristics = self
            .characteristics
            .iter()
            .map(|parsed| build(parsed, existing.get(parsed.code.as_str()).copied()))
            .collect();
        Ok(next)
    }
}

fn compare(existing: &Characteristic, parsed: &ParsedCharacteristic) -> CharacteristicChange {
    let mut change = CharacteristicChange::default();
    if existing.name != parsed.name {
        change.fields.push("name".into());
    }
    if existing.data_field != parsed.data_field {
        change.fields.push("data_field".into());
    }
    if existing.weight_multiplier != parsed.weight_multiplier {
        change.fields.push("weight_multiplier".into());
    }
    if existing.is_active != parsed.is_active {
        change.fields.push("is_active".into());
    }

    for bin in &parsed.bins {
        match existing.bin_by_label(&bin.label) {
            None => change.bins_added.push(bin.label.clone()),
            Some(old) if old.points != bin.points || old.condition != bin.condition => {
                change.bins_changed.push(bin.label.clone())
            }
            Some(_) => {}
        }
    }
    for old in &existing.bins {
        if !parsed.bins.iter().any(|b| b.label == old.label) {
            change.bins_removed.push(old.label.clone());
        }
    }

    let old_order: Vec<&str> = existing
        .bins
        .iter()
        .map(|b| b.label.as_str())
        .filter(|l| parsed.bins.iter().any(|b| b.label == *l))
        .collect();
    let new_order: Vec<&str> = parsed
        .bins
        .iter()
        .map(|b| b.label.as_str())
        .filter(|l| existing.bin_by_label(l).is_some())
        .collect();
    if old_order != new_order {
        change.fields.push("bin_order".into());
    }
    change
}

fn build(parsed: &ParsedCharacteristic, existing: Option<&Characteristic>) -> Characteristic {
    let mut characteristic = match existing {
        Some(c) => Characteristic {
            bins: Vec::new(),
            ..c.clone()
        },
        None => Characteristic::new(&parsed.code, &parsed.name, &parsed.data_field),
    };
    characteristic.name = parsed.name.clone();
    characteristic.data_field = parsed.data_field.clone();
    characteristic.is_active = parsed.is_active;
    characteristic.weight_multiplier = parsed.weight_multiplier;
    characteristic.bins = parsed
        .bins
        .iter()
        .map(|bin| Bin {
            bin_id: existing
                .and_then(|c| c.bin_by_label(&bin.label))
                .map_or_else(|| uuid::Uuid::new_v4().to_string(), |old| old.bin_id.clone()),
            label: bin.label.clone(),
            points: bin.points,
            condition: bin.condition.clone(),
        })
        .collect();
    characteristic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorecard() -> Scorecard {
        Scorecard::new("Retail", 300.0, 0.0, 600.0)
            .unwrap()
            .with_characteristic(
                Characteristic::new("AGE", "Applicant Age", "age")
                    .with_bin(Bin::range("18-24", Some(18.0), Some(25.0), -20.0))
                    .with_bin(Bin::range("25-39", Some(25.0), Some(40.0), 10.0))
                    .with_bin(Bin::range("40+", Some(40.0), None, 30.0)),
            )
            .with_characteristic(
                Characteristic::new("HOME", "Home - Ownership", "home")
                    .with_weight(1.5)
                    .with_bin(Bin::category("Owner", "own", 25.0))
                    .with_bin(Bin::category("Quoted", "say \"hi\" \\ bye", -5.5)),
            )
            .with_characteristic(
                Characteristic::new("INC", "Income", "applicant.income")
                    .inactive()
                    .with_bin(Bin::range("low", None, Some(1000.0), -0.25))
                    .with_bin(Bin::range("any", Some(1000.0), None, 0.0)),
            )
    }

    #[test]
    fn emits_marker_and_conditions() {
        let text = to_script(&scorecard());
        assert!(text.contains("# Characteristic: AGE - Applicant Age (field: age)"));
        assert!(text.contains("if age >= 18 and age < 25:\n    points += -20  # 18-24"));
        assert!(text.contains("elif age >= 40:"));
        assert!(text.contains("if home == \"own\":"));
        assert!(text.contains("# status: inactive"));
        assert!(text.contains("if applicant.income < 1000:"));
    }

    #[test]
    fn round_trip_reproduces_the_model() {
        let model = scorecard();
        let patch = from_script(&to_script(&model)).unwrap();
        assert!(patch.diff(&model).is_empty(), "{:?}", patch.diff(&model));
        assert_eq!(patch.apply(&model, false).unwrap(), model);
    }

    #[test]
    fn name_with_dash_survives() {
        let patch = from_script(&to_script(&scorecard())).unwrap();
        assert_eq!(patch.characteristics[1].name, "Home - Ownership");
    }

    #[test]
    fn unknown_code_is_an_addition() {
        let model = scorecard();
        let text = format!(
            "{}\n# Characteristic: DEP - Dependants (field: dependants)\nif dependants == \"0\":\n    points += 5  # none\n",
            to_script(&model)
        );
        let diff = from_script(&text).unwrap().diff(&model);
        assert_eq!(diff.added, vec!["DEP".to_string()]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn missing_block_needs_confirmation() {
        let model = scorecard();
        let text = to_script(&model);
        let cut = text.find("# Characteristic: INC").unwrap();
        let patch = from_script(&text[..cut]).unwrap();

        assert_eq!(patch.diff(&model).removed, vec!["INC".to_string()]);
        assert!(matches!(patch.apply(&model, false), Err(EngineError::Validation { .. })));
        let applied = patch.apply(&model, true).unwrap();
        assert!(applied.characteristic_by_code("INC").is_none());
    }

    #[test]
    fn changed_points_keep_bin_identity() {
        let model = scorecard();
        let text = to_script(&model).replace("points += 10  # 25-39", "points += 12  # 25-39");
        let patch = from_script(&text).unwrap();
        let diff = patch.diff(&model);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].bins_changed, vec!["25-39".to_string()]);

        let applied = patch.apply(&model, false).unwrap();
        let old = model.characteristic_by_code("AGE").unwrap().bin_by_label("25-39").unwrap();
        let new = applied.characteristic_by_code("AGE").unwrap().bin_by_label("25-39").unwrap();
        assert_eq!(old.bin_id, new.bin_id);
        assert_eq!(new.points, 12.0);
    }

    #[test]
    fn marker_without_field_is_rejected_with_line() {
        let text = "# Scorecard: x\n\n# Characteristic: AGE - Age\nif age >= 1:\n    points += 1  # a\n";
        match from_script(text) {
            Err(EngineError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn marker_without_code_is_rejected() {
        let text = "# Characteristic:  - Age (field: age)\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 1, .. })));
    }

    #[test]
    fn duplicate_marker_is_rejected() {
        let text = "# Characteristic: AGE - Age (field: age)\n# Characteristic: AGE - Again (field: age)\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 2, .. })));
    }

    #[test]
    fn wrong_field_and_bad_operator_are_rejected() {
        let wrong = "# Characteristic: AGE - Age (field: age)\nif income >= 1:\n    points += 1  # a\n";
        assert!(matches!(from_script(wrong), Err(EngineError::Parse { line: 2, .. })));

        let op = "# Characteristic: AGE - Age (field: age)\nif age > 1:\n    points += 1  # a\n";
        assert!(matches!(from_script(op), Err(EngineError::Parse { line: 2, .. })));
    }

    #[test]
    fn dangling_condition_is_rejected() {
        let text = "# Characteristic: AGE - Age (field: age)\nif age >= 1:\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 2, .. })));
    }

    #[test]
    fn rules_outside_a_block_are_rejected() {
        let text = "if age >= 1:\n    points += 1  # a\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 1, .. })));
    }

    #[test]
    fn arbitrary_code_is_not_accepted() {
        let text = "# Characteristic: AGE - Age (field: age)\nimport os\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 2, .. })));
    }

    #[test]
    fn minus_equals_negates_points() {
        let text = "# Characteristic: AGE - Age (field: age)\nif age < 18:\n    points -= 40  # minor\n";
        let patch = from_script(text).unwrap();
        assert_eq!(patch.characteristics[0].bins[0].points, -40.0);
    }

    /// Only a full `Characteristic:` prefix opens a block.
    #[test]
    fn free_comment_mentioning_characteristics_is_ignored() {
        let text = "# Characteristics below were reviewed in Q3\n\
                    # Characteristic: AGE - Age (field: age)\n\
                    # Characteristic notes: none\n\
                    if age >= 18:\n    points += 5  # adult\n";
        let patch = from_script(text).unwrap();
        assert_eq!(patch.characteristics.len(), 1);
        assert_eq!(patch.characteristics[0].line, 2);
        assert_eq!(patch.characteristics[0].bins[0].label, "adult");
    }

    #[test]
    fn marker_without_name_uses_the_code() {
        let text = "# Characteristic: DTI (field: dti)\nif dti < 0.4:\n    points += 8  # low\n";
        let parsed = &from_script(text).unwrap().characteristics[0];
        assert_eq!((parsed.code.as_str(), parsed.name.as_str()), ("DTI", "DTI"));
        assert_eq!(parsed.data_field, "dti");
    }

    #[test]
    fn points_line_needs_a_label() {
        let text = "# Characteristic: AGE - Age (field: age)\nif age >= 1:\n    points += 1\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 3, .. })));
    }

    #[test]
    fn condition_without_colon_is_rejected() {
        let text = "# Characteristic: AGE - Age (field: age)\nif age >= 1\n    points += 1  # a\n";
        assert!(matches!(from_script(text), Err(EngineError::Parse { line: 2, .. })));
    }

    #[test]
    fn category_value_may_contain_colons_and_operators() {
        let text = "# Characteristic: HOME - Home (field: home)\nif home == \"a: b >= c\":\n    points += 2  # odd\n";
        let bin = &from_script(text).unwrap().characteristics[0].bins[0];
        assert_eq!(
            bin.condition,
            BinCondition::Categorical {
                category_value: "a: b >= c".to_string()
            }
        );
    }
}
