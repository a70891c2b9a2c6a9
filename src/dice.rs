//! Dice notation parser and roller.
//!
//! Accepts `[count]d<sides>[kh|kl N][+|-modifier]` plus the `adv`/`dis` aliases
//! for a d20 with advantage or disadvantage. Input is case- and
//! whitespace-insensitive: `" 4D6 KH3 + 2 "` and `"4d6kh3+2"` are the same roll.
//!
//! Rolling takes any [rand::Rng] so tests can seed the source.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Most dice a single expression may roll.
pub const MAX_COUNT: u32 = 100;
/// Largest die accepted.
pub const MAX_SIDES: u32 = 1000;
/// Largest absolute flat modifier accepted.
pub const MAX_MODIFIER: i64 = 1_000_000;

/// Why an expression was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice expression '{0}' (try 2d6+1, d20, 4d6kh3, adv)")]
    Malformed(String),
    #[error("Dice out of bounds: {0}")]
    OutOfBounds(String),
}

/// Which end of the rolled set to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// A parsed, validated expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub keep: Option<Keep>,
    pub modifier: i64,
}

/// Result of one evaluation: the raw dice, the dice that counted, and the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub expression: String,
    pub rolls: Vec<u32>,
    pub used: Vec<u32>,
    pub modifier: i64,
    pub total: i64,
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn number<T: std::str::FromStr>(digits: &str, expr: &str) -> Result<T, DiceError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DiceError::Malformed(expr.to_string()));
    }
    // Digits only, so a parse failure means the number overflowed.
    digits
        .parse()
        .map_err(|_| DiceError::OutOfBounds(format!("'{}' is too large", digits)))
}

/// Parse an expression without rolling it.
pub fn parse(raw: &str) -> Result<DiceSpec, DiceError> {
    let expr = normalize(raw);
    let canonical = match expr.as_str() {
        "adv" => "2d20kh1",
        "dis" => "2d20kl1",
        other => other,
    };
    if canonical.is_empty() {
        return Err(DiceError::Malformed(expr.clone()));
    }

    let d_pos = canonical
        .find('d')
        .ok_or_else(|| DiceError::Malformed(expr.clone()))?;
    let count: u32 = if d_pos == 0 {
        1
    } else {
        number(&canonical[..d_pos], &expr)?
    };
    let rest = &canonical[d_pos + 1..];

    // Split off a trailing signed modifier.
    let (body, modifier) = match rest.find(['+', '-']) {
        Some(sign_pos) => {
            let magnitude: i64 = number(&rest[sign_pos + 1..], &expr)?;
            let signed = if rest.as_bytes()[sign_pos] == b'-' {
                -magnitude
            } else {
                magnitude
            };
            (&rest[..sign_pos], signed)
        }
        None => (rest, 0),
    };

    let (sides_str, keep) = if let Some(pos) = body.find("kh") {
        let n: u32 = number(&body[pos + 2..], &expr)?;
        (&body[..pos], Some(Keep::Highest(n)))
    } else if let Some(pos) = body.find("kl") {
        let n: u32 = number(&body[pos + 2..], &expr)?;
        (&body[..pos], Some(Keep::Lowest(n)))
    } else {
        (body, None)
    };
    let sides: u32 = number(sides_str, &expr)?;

    if count == 0 || count > MAX_COUNT {
        return Err(DiceError::OutOfBounds(format!(
            "dice count must be 1-{}, got {}",
            MAX_COUNT, count
        )));
    }
    if sides == 0 || sides > MAX_SIDES {
        return Err(DiceError::OutOfBounds(format!(
            "die size must be 1-{}, got {}",
            MAX_SIDES, sides
        )));
    }
    if let Some(Keep::Highest(n) | Keep::Lowest(n)) = keep {
        if n == 0 || n > count {
            return Err(DiceError::OutOfBounds(format!(
                "cannot keep {} of {} dice",
                n, count
            )));
        }
    }
    if modifier.abs() > MAX_MODIFIER {
        return Err(DiceError::OutOfBounds(format!(
            "modifier must be within ±{}",
            MAX_MODIFIER
        )));
    }

    Ok(DiceSpec {
        count,
        sides,
        keep,
        modifier,
    })
}

impl DiceSpec {
    /// Roll this spec with the given random source.
    pub fn roll_with<R: Rng>(&self, expression: String, rng: &mut R) -> RollOutcome {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let used = match self.keep {
            Some(Keep::Highest(n)) => {
                let mut sorted = rolls.clone();
                sorted.sort_by(|a, b| b.cmp(a));
                sorted.truncate(n as usize);
                sorted
            }
            Some(Keep::Lowest(n)) => {
                let mut sorted = rolls.clone();
                sorted.sort();
                sorted.truncate(n as usize);
                sorted
            }
            None => rolls.clone(),
        };
        let total = used.iter().map(|&d| i64::from(d)).sum::<i64>() + self.modifier;
        RollOutcome {
            expression,
            rolls,
            used,
            modifier: self.modifier,
            total,
        }
    }
}

/// Parse and roll in one step.
pub fn roll<R: Rng>(raw: &str, rng: &mut R) -> Result<RollOutcome, DiceError> {
    let spec = parse(raw)?;
    Ok(spec.roll_with(normalize(raw), rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_die_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for (expr, n, s) in [("3d6", 3, 6), ("d20", 1, 20), ("100d1000", 100, 1000), ("1d1", 1, 1)] {
            for _ in 0..50 {
                let out = roll(expr, &mut rng).unwrap();
                assert_eq!(out.rolls.len(), n);
                assert!(out.rolls.iter().all(|&r| r >= 1 && r <= s), "{expr}: {:?}", out.rolls);
                assert_eq!(out.total, out.used.iter().map(|&d| d as i64).sum::<i64>() + out.modifier);
            }
        }
    }

    #[test]
    fn modifiers_and_whitespace() {
        let spec = parse(" 2D8 - 3 ").unwrap();
        assert_eq!(spec, DiceSpec { count: 2, sides: 8, keep: None, modifier: -3 });
        let spec = parse("4d6kh3+2").unwrap();
        assert_eq!(spec.keep, Some(Keep::Highest(3)));
        assert_eq!(spec.modifier, 2);
    }

    #[test]
    fn aliases_match_explicit_keep() {
        assert_eq!(parse("adv").unwrap(), parse("2d20kh1").unwrap());
        assert_eq!(parse(" DIS ").unwrap(), parse("2d20kl1").unwrap());

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let alias = roll("adv", &mut a).unwrap();
        let explicit = roll("2d20kh1", &mut b).unwrap();
        assert_eq!(alias.rolls, explicit.rolls);
        assert_eq!(alias.used, explicit.used);
        assert_eq!(alias.total, explicit.total);
        assert_eq!(alias.used[0], *alias.rolls.iter().max().unwrap());
    }

    #[test]
    fn keep_lowest_takes_smallest() {
        let mut rng = StdRng::seed_from_u64(3);
        let out = roll("4d6kl2", &mut rng).unwrap();
        let mut sorted = out.rolls.clone();
        sorted.sort();
        assert_eq!(out.used, sorted[..2].to_vec());
    }

    #[test]
    fn bounds_errors() {
        assert!(matches!(parse("200d6"), Err(DiceError::OutOfBounds(_))));
        assert!(matches!(parse("d20kh2"), Err(DiceError::OutOfBounds(_))));
        assert!(matches!(parse("2d1001"), Err(DiceError::OutOfBounds(_))));
        assert!(matches!(parse("0d6"), Err(DiceError::OutOfBounds(_))));
        assert!(matches!(parse("2d6kh0"), Err(DiceError::OutOfBounds(_))));
        assert!(matches!(parse("99999999999d6"), Err(DiceError::OutOfBounds(_))));
    }

    #[test]
    fn syntax_errors() {
        for bad in ["", "banana", "2d", "d", "2x6", "2d6+", "2d6kh", "-2d6", "2d6+1+1", "d6kq1"] {
            assert!(matches!(parse(bad), Err(DiceError::Malformed(_))), "{bad}");
        }
    }
}
