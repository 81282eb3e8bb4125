//! D&D dice rolling system.
//!
//! Every roll draws from an injected [`DieSource`] so encounters can be
//! replayed from a seed and tests can script exact faces. Supports the d20
//! advantage/disadvantage protocol, critical detection, and standard dice
//! notation (`XdY+Z`) for authoring damage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

/// Most dice a single roll may draw.
pub const MAX_DICE: u32 = 1_000;

/// Error type for dice parsing and rolling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid advantage token: {0:?} (expected none, adv or dis)")]
    InvalidAdvantage(String),
    #[error("Advantage and disadvantage apply only to a single d20 (got {count}d{sides})")]
    AdvantageRequiresSingleD20 { sides: u32, count: u32 },
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Too many dice: {0} (at most {MAX_DICE})")]
    TooManyDice(u32),
    #[error("Cannot combine d{left} and d{right} rolls")]
    MismatchedDice { left: u32, right: u32 },
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Fold any number of sources: one of each cancels, however many of
    /// either there are.
    pub fn from_sources(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Advantage::Normal)
    }
}

impl FromStr for Advantage {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "normal" => Ok(Advantage::Normal),
            "adv" | "advantage" => Ok(Advantage::Advantage),
            "dis" | "disadvantage" => Ok(Advantage::Disadvantage),
            other => Err(DiceError::InvalidAdvantage(other.to_string())),
        }
    }
}

impl fmt::Display for Advantage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Advantage::Normal => "normal",
            Advantage::Advantage => "advantage",
            Advantage::Disadvantage => "disadvantage",
        };
        write!(f, "{label}")
    }
}

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Source of die faces.
///
/// Any [`rand::Rng`] is a die source, so a seeded `StdRng` makes a whole
/// encounter reproducible. [`crate::testing::ScriptedDice`] plays back fixed
/// faces for tests.
pub trait DieSource {
    /// Draw one face uniformly from `1..=sides`.
    fn draw(&mut self, sides: u32) -> u32;
}

impl<R: Rng> DieSource for R {
    fn draw(&mut self, sides: u32) -> u32 {
        self.gen_range(1..=sides)
    }
}

/// Outcome of a single roll request.
///
/// `rolls` is every face drawn, in draw order (both dice for advantage, plus
/// any rerolls). `kept` holds the faces that count toward the total. The
/// kept faces only change through rule effects ([`RollOutcome::set_kept`],
/// [`RollOutcome::reroll_kept`]) or [`RollOutcome::combine`], and the flat
/// modifier only accumulates through [`RollOutcome::add_modifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollOutcome {
    sides: u32,
    rolls: Vec<u32>,
    kept: Vec<u32>,
    base_total: i32,
    modifier: i32,
    advantage: Advantage,
    critical: bool,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl RollOutcome {
    fn from_parts(sides: u32, rolls: Vec<u32>, kept: Vec<u32>, advantage: Advantage) -> Self {
        let mut outcome = Self {
            sides,
            rolls,
            kept,
            base_total: 0,
            modifier: 0,
            advantage,
            critical: false,
            metadata: BTreeMap::new(),
        };
        outcome.recompute();
        outcome
    }

    /// Build an outcome from known faces, as if they had just been rolled
    /// without advantage.
    pub fn fixed(sides: u32, faces: Vec<u32>) -> Self {
        Self::from_parts(sides, faces.clone(), faces, Advantage::Normal)
    }

    fn recompute(&mut self) {
        self.base_total = self.kept.iter().fold(0i32, |total, &face| {
            total.saturating_add(i32::try_from(face).unwrap_or(i32::MAX))
        });
        self.critical = self.is_single_d20() && self.kept[0] == self.sides;
    }

    fn is_single_d20(&self) -> bool {
        self.sides == 20 && self.kept.len() == 1
    }

    pub fn sides(&self) -> u32 {
        self.sides
    }

    pub fn rolls(&self) -> &[u32] {
        &self.rolls
    }

    pub fn kept(&self) -> &[u32] {
        &self.kept
    }

    pub fn base_total(&self) -> i32 {
        self.base_total
    }

    pub fn modifier(&self) -> i32 {
        self.modifier
    }

    pub fn total(&self) -> i32 {
        self.base_total.saturating_add(self.modifier)
    }

    pub fn advantage(&self) -> Advantage {
        self.advantage
    }

    /// Natural 20 on the kept die of a single d20 roll.
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Natural 1 on the kept die of a single d20 roll.
    pub fn is_fumble(&self) -> bool {
        self.is_single_d20() && self.kept[0] == 1
    }

    /// The kept face of a single d20 roll.
    pub fn natural(&self) -> Option<u32> {
        self.is_single_d20().then(|| self.kept[0])
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Accumulate a flat modifier. Dice and critical state are untouched.
    pub fn add_modifier(&mut self, amount: i32) {
        self.modifier = self.modifier.saturating_add(amount);
    }

    pub fn with_modifier(mut self, amount: i32) -> Self {
        self.add_modifier(amount);
        self
    }

    /// Substitute a kept face as a rule effect. Returns the replaced face.
    ///
    /// Critical state follows the new face: a substituted 20 on a single d20
    /// is a critical.
    pub fn set_kept(&mut self, index: usize, face: u32) -> Option<u32> {
        let face = face.clamp(1, self.sides.max(1));
        let slot = self.kept.get_mut(index)?;
        let previous = std::mem::replace(slot, face);
        self.recompute();
        Some(previous)
    }

    /// Reroll a kept die, keeping the new face. The new draw is appended to
    /// `rolls`. Returns the replaced face.
    pub fn reroll_kept(&mut self, index: usize, source: &mut dyn DieSource) -> Option<u32> {
        if index >= self.kept.len() {
            return None;
        }
        let face = source.draw(self.sides);
        trace!(sides = self.sides, index, face, "reroll");
        self.rolls.push(face);
        self.set_kept(index, face)
    }

    /// Merge another roll of the same die size into this one (for example a
    /// bonus die of the same type). Modifiers and metadata accumulate.
    pub fn combine(mut self, other: RollOutcome) -> Result<Self, DiceError> {
        if self.sides != other.sides {
            return Err(DiceError::MismatchedDice {
                left: self.sides,
                right: other.sides,
            });
        }
        self.rolls.extend(other.rolls);
        self.kept.extend(other.kept);
        self.modifier += other.modifier;
        self.metadata.extend(other.metadata);
        self.advantage = Advantage::Normal;
        self.recompute();
        Ok(self)
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets(&self, dc: i32) -> bool {
        self.total() >= dc
    }

    /// Format the individual dice for display, with discarded dice in
    /// parentheses.
    pub fn dice_display(&self) -> String {
        let mut kept_used = vec![false; self.kept.len()];
        let shown: Vec<String> = self
            .rolls
            .iter()
            .map(|&face| {
                let slot = self
                    .kept
                    .iter()
                    .enumerate()
                    .position(|(i, &k)| k == face && !kept_used[i]);
                match slot {
                    Some(i) => {
                        kept_used[i] = true;
                        face.to_string()
                    }
                    None => format!("({face})"),
                }
            })
            .collect();

        let dice_str = format!("[{}]", shown.join(", "));
        match self.modifier {
            0 => dice_str,
            m if m > 0 => format!("{dice_str} + {m}"),
            m => format!("{dice_str} - {}", m.abs()),
        }
    }
}

impl fmt::Display for RollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total())
    }
}

/// Roll `count` dice with `sides` faces.
///
/// Advantage and disadvantage are only defined for a single d20.
pub fn roll(
    source: &mut dyn DieSource,
    sides: u32,
    count: u32,
    advantage: Advantage,
) -> Result<RollOutcome, DiceError> {
    // Faces must fit a signed total.
    if sides == 0 || sides > i32::MAX as u32 {
        return Err(DiceError::InvalidDieSize(sides));
    }
    if count == 0 {
        return Err(DiceError::NoDice);
    }
    if count > MAX_DICE {
        return Err(DiceError::TooManyDice(count));
    }

    let outcome = match advantage {
        Advantage::Normal => {
            let rolls: Vec<u32> = (0..count).map(|_| source.draw(sides)).collect();
            RollOutcome::from_parts(sides, rolls.clone(), rolls, advantage)
        }
        Advantage::Advantage | Advantage::Disadvantage => {
            if count != 1 || sides != 20 {
                return Err(DiceError::AdvantageRequiresSingleD20 { sides, count });
            }
            draw_d20(source, advantage)
        }
    };

    trace!(
        sides,
        count,
        %advantage,
        rolls = ?outcome.rolls,
        total = outcome.total(),
        "dice rolled"
    );
    Ok(outcome)
}

/// Roll using a textual advantage token (`none`, `adv`, `dis`).
pub fn roll_with_token(
    source: &mut dyn DieSource,
    sides: u32,
    count: u32,
    token: &str,
) -> Result<RollOutcome, DiceError> {
    let advantage = token.parse::<Advantage>()?;
    roll(source, sides, count, advantage)
}

/// Roll a single d20. Cannot fail: a single d20 is always a valid
/// advantage target.
pub fn d20(source: &mut dyn DieSource, advantage: Advantage) -> RollOutcome {
    let outcome = draw_d20(source, advantage);
    trace!(%advantage, rolls = ?outcome.rolls, total = outcome.total(), "d20 rolled");
    outcome
}

fn draw_d20(source: &mut dyn DieSource, advantage: Advantage) -> RollOutcome {
    let first = source.draw(20);
    if advantage.is_normal() {
        return RollOutcome::from_parts(20, vec![first], vec![first], advantage);
    }
    let second = source.draw(20);
    let kept = if advantage == Advantage::Advantage {
        first.max(second)
    } else {
        first.min(second)
    };
    RollOutcome::from_parts(20, vec![first, second], vec![kept], advantage)
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub die_type: DieType,
}

/// A parsed dice expression (e.g., `2d6+1d4+3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_component(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_component(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
            original: notation,
        })
    }

    fn parse_component(
        s: &str,
        sign: i32,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        if let Some(d_pos) = s.find('d') {
            if sign < 0 {
                return Err(DiceError::InvalidNotation(format!("-{s}")));
            }
            let count_str = &s[..d_pos];
            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };
            if count == 0 {
                return Err(DiceError::NoDice);
            }

            let sides: u32 = s[d_pos + 1..]
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

            components.push(DiceComponent { count, die_type });
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier += sign * value;
        }

        Ok(())
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
